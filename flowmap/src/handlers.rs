use anyhow::{Context, Result, anyhow};
use clap::ArgMatches;
use colored::Colorize;
use flowmap_core::report::{ReportFormat, gather_report_data, generate_report, save_report};
use flowmap_core::{
    MonitorConfig, MonitorEvent, ServiceClassifier, ServiceDescriptor, TrafficMonitor,
};
use flowmap_intercept::{
    EventRequest, EventTransport, FetchRequest, FetchTransport, ReqwestEventTransport,
    ReqwestTransport,
};
use futures::future::join_all;
use indicatif::{ProgressBar, ProgressStyle};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::sync::mpsc::UnboundedReceiver;
use tracing::{debug, warn};
use tracing_subscriber::EnvFilter;
use url::Url;

// Helper functions for the watch handler

/// Collect URLs from either a file or the positional arguments
pub fn load_urls_from_source(
    urls: &[String],
    urls_file: Option<&PathBuf>,
) -> Result<Vec<String>, String> {
    if let Some(urls_file_path) = urls_file {
        load_urls_from_file(urls_file_path)
    } else if !urls.is_empty() {
        let parsed: Vec<String> = urls
            .iter()
            .filter_map(|url| parse_url_line(url.trim()))
            .collect();
        if parsed.is_empty() {
            return Err("None of the given URLs are valid".to_string());
        }
        Ok(parsed)
    } else {
        Err("Either URLs or --urls-file must be provided".to_string())
    }
}

/// Load and parse URLs from a file
pub fn load_urls_from_file(path: &PathBuf) -> Result<Vec<String>, String> {
    let content = fs::read_to_string(path)
        .map_err(|e| format!("Failed to read URLs file {}: {}", path.display(), e))?;

    let urls: Vec<String> = content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .filter_map(parse_url_line)
        .collect();

    if urls.is_empty() {
        return Err(format!("No valid URLs found in {}", path.display()));
    }

    Ok(urls)
}

/// Parse a single line as a URL, trying to add http:// if needed
pub fn parse_url_line(line: &str) -> Option<String> {
    if let Ok(url) = Url::parse(line)
        && url.has_host()
    {
        return Some(line.to_string());
    }

    let with_scheme = format!("http://{}", line);
    if Url::parse(&with_scheme).is_ok() {
        return Some(with_scheme);
    }

    eprintln!("⚠️  Skipping invalid URL '{}'", line);
    None
}

/// Read a monitor config, expanding `~` in the path. No path means defaults.
pub fn load_config(path: Option<&str>) -> Result<MonitorConfig> {
    let Some(path) = path else {
        return Ok(MonitorConfig::default());
    };

    let expanded = shellexpand::tilde(path);
    let config_path = Path::new(expanded.as_ref());
    MonitorConfig::load(config_path)
        .with_context(|| format!("Failed to load config from {}", config_path.display()))
}

pub fn init_tracing(verbose: bool, quiet: bool) {
    let default_level = if verbose {
        "debug"
    } else if quiet {
        "warn"
    } else {
        "info"
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    // a second init in the same process is harmless
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}

pub fn print_banner() {
    println!("{}", "═".repeat(60).bright_blue().bold());
    println!(
        "{}  {}",
        "  FLOWMAP".bright_white().bold(),
        "outbound traffic map".bright_black()
    );
    println!("{}", "═".repeat(60).bright_blue().bold());
    println!();
}

fn print_divider() {
    println!("{}", "─".repeat(60).bright_blue());
}

/// One line per classified URL: icon, name, category and the rule that matched.
pub fn describe_service(url: &str, service: &ServiceDescriptor) -> String {
    format!(
        "{} {}  {}  [{}, by {}]",
        service.icon,
        service.name.bold(),
        url.cyan(),
        service.category,
        service.detected_by.as_str()
    )
}

pub fn handle_classify(args: &ArgMatches) -> Result<()> {
    let classifier = ServiceClassifier::new();
    let urls: Vec<&String> = args
        .get_many::<String>("URL")
        .map(|values| values.collect())
        .unwrap_or_default();

    let mut invalid = 0;
    for raw in urls {
        match Url::parse(raw) {
            Ok(url) => println!("{}", describe_service(raw, &classifier.classify(&url))),
            Err(e) => {
                invalid += 1;
                println!("{} {}  {}", "✗".red().bold(), raw, e.to_string().bright_black());
            }
        }
    }

    if invalid > 0 {
        return Err(anyhow!("{} URL(s) could not be parsed", invalid));
    }
    Ok(())
}

/// What `watch` should send.
pub struct WatchOptions {
    pub urls: Vec<String>,
    pub method: String,
    pub use_events: bool,
    pub timeout_secs: u64,
}

/// Start monitoring, send every URL through an intercepted client, wait for
/// all of them to settle, then stop. Returns how many calls produced a
/// response.
pub async fn run_watch(monitor: &TrafficMonitor, options: &WatchOptions) -> Result<usize> {
    let transport = ReqwestTransport::with_timeout(options.timeout_secs)
        .context("Failed to build HTTP client")?;

    monitor.start();

    let answered = if options.use_events {
        let events = monitor.intercept_events(ReqwestEventTransport::new(&transport));
        let mut requests = Vec::with_capacity(options.urls.len());
        let mut completions = Vec::with_capacity(options.urls.len());

        for url in &options.urls {
            let mut request = events.create();
            request.open(&options.method, url);
            request.send(None);
            if let Some(handle) = request.take_completion() {
                completions.push(handle);
            }
            requests.push(request);
        }

        for outcome in join_all(completions).await {
            if let Err(e) = outcome {
                warn!("Request task failed: {}", e);
            }
        }

        requests.iter().filter(|request| request.status() != 0).count()
    } else {
        let fetch = monitor.intercept_fetch(transport);
        let calls = options.urls.iter().map(|url| {
            fetch.fetch(FetchRequest::get(url.clone()).with_method(options.method.clone()))
        });

        let mut answered = 0;
        for (url, outcome) in options.urls.iter().zip(join_all(calls).await) {
            match outcome {
                Ok(response) => {
                    debug!("{} -> {}", url, response.status());
                    answered += 1;
                }
                Err(e) => warn!("{} failed: {}", url, e),
            }
        }
        answered
    };

    monitor.stop();
    Ok(answered)
}

fn show_event(spinner: &ProgressBar, event: MonitorEvent) {
    match event {
        MonitorEvent::NodeUpserted(node) => {
            if let Some(hostname) = node.hostname {
                spinner.println(format!(
                    "  {} {}  {}",
                    "+".green().bold(),
                    node.label,
                    hostname.cyan()
                ));
            }
        }
        MonitorEvent::EdgeUpserted(edge) => {
            spinner.set_message(format!("{} → {}", edge.label(), edge.to));
        }
        MonitorEvent::StatsUpdated(totals) => {
            spinner.set_prefix(format!(
                "{} req / {} hosts",
                totals.request_count, totals.destination_count
            ));
        }
        MonitorEvent::Reset => {}
    }
}

async fn watch_with_progress(
    monitor: &TrafficMonitor,
    options: &WatchOptions,
    mut events: UnboundedReceiver<MonitorEvent>,
    quiet: bool,
) -> Result<usize> {
    let spinner = if quiet {
        ProgressBar::hidden()
    } else {
        ProgressBar::new_spinner()
    };
    spinner.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.cyan} [{prefix}] {msg}")
            .context("Invalid progress template")?,
    );
    spinner.enable_steady_tick(Duration::from_millis(100));
    spinner.set_message("Waiting for responses...");

    let watch = run_watch(monitor, options);
    tokio::pin!(watch);

    let result = loop {
        tokio::select! {
            result = &mut watch => break result,
            Some(event) = events.recv() => show_event(&spinner, event),
        }
    };
    while let Ok(event) = events.try_recv() {
        show_event(&spinner, event);
    }

    spinner.finish_and_clear();
    result
}

pub fn render_report(monitor: &TrafficMonitor, format: ReportFormat) -> Result<String> {
    let data = gather_report_data(monitor);
    generate_report(&data, format).context("Failed to render report")
}

pub async fn handle_watch(args: &ArgMatches) -> Result<()> {
    let quiet = args.get_flag("quiet");
    let positional: Vec<String> = args
        .get_many::<String>("URL")
        .map(|values| values.cloned().collect())
        .unwrap_or_default();
    let urls_file = args.get_one::<PathBuf>("urls-file");
    let urls = load_urls_from_source(&positional, urls_file).map_err(|e| anyhow!(e))?;

    let config = load_config(args.get_one::<String>("config").map(String::as_str))?;
    let monitor = TrafficMonitor::from_config(&config)?;

    let format_name = args
        .get_one::<String>("format")
        .map(String::as_str)
        .unwrap_or("text");
    let format = ReportFormat::from_str(format_name)
        .ok_or_else(|| anyhow!("Unknown report format '{}'", format_name))?;

    let options = WatchOptions {
        urls,
        method: args
            .get_one::<String>("method")
            .cloned()
            .unwrap_or_else(|| "GET".to_string())
            .to_uppercase(),
        use_events: args.get_flag("event"),
        timeout_secs: args.get_one::<u64>("timeout").copied().unwrap_or(30),
    };

    if !quiet {
        println!(
            "{} Watching {} request(s) via the {} client",
            "→".blue(),
            options.urls.len(),
            if options.use_events { "event-style" } else { "promise-style" }
        );
        print_divider();
    }

    let events = monitor.subscribe();
    let answered = watch_with_progress(&monitor, &options, events, quiet).await?;

    if !quiet {
        print_divider();
        println!(
            "{} {} of {} request(s) answered\n",
            "✓".green().bold(),
            answered,
            options.urls.len()
        );
    }

    let report = render_report(&monitor, format)?;
    match args.get_one::<PathBuf>("output") {
        Some(path) => {
            save_report(&report, path)
                .with_context(|| format!("Failed to write report to {}", path.display()))?;
            if !quiet {
                println!("{} Report saved to {}", "✓".green().bold(), path.display());
            }
        }
        None => print!("{}", report),
    }

    if let Some(dir) = args.get_one::<PathBuf>("export") {
        let path = monitor.export().write_to_dir(dir)?;
        if !quiet {
            println!("{} Export written to {}", "✓".green().bold(), path.display());
        }
    }

    Ok(())
}
