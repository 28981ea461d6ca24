use flowmap::handlers::*;
use flowmap_core::TrafficMonitor;
use flowmap_core::report::ReportFormat;
use std::io::Write;
use std::path::PathBuf;
use tempfile::NamedTempFile;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

// ============================================================================
// URL Loading Tests
// ============================================================================

#[test]
fn test_parse_url_line_with_scheme() {
    let result = parse_url_line("https://example.com");
    assert_eq!(result, Some("https://example.com".to_string()));
}

#[test]
fn test_parse_url_line_without_scheme() {
    let result = parse_url_line("example.com");
    assert_eq!(result, Some("http://example.com".to_string()));
}

#[test]
fn test_parse_url_line_host_with_port() {
    let result = parse_url_line("localhost:8080");
    assert_eq!(result, Some("http://localhost:8080".to_string()));
}

#[test]
fn test_parse_url_line_invalid() {
    let result = parse_url_line("not a valid url!!!");
    assert_eq!(result, None);
}

#[test]
fn test_load_urls_from_file() -> Result<(), Box<dyn std::error::Error>> {
    let mut temp_file = NamedTempFile::new()?;
    writeln!(temp_file, "https://example.com")?;
    writeln!(temp_file, "httpbin.org")?;
    writeln!(temp_file)?; // Empty line
    writeln!(temp_file, "# comment")?;
    writeln!(temp_file, "https://api.example.com")?;

    let path = PathBuf::from(temp_file.path());
    let urls = load_urls_from_file(&path)?;

    assert_eq!(urls.len(), 3);
    assert_eq!(urls[0], "https://example.com");
    assert_eq!(urls[1], "http://httpbin.org");
    assert_eq!(urls[2], "https://api.example.com");

    Ok(())
}

#[test]
fn test_load_urls_from_file_empty() {
    let mut temp_file = NamedTempFile::new().unwrap();
    writeln!(temp_file).unwrap();
    writeln!(temp_file, "   ").unwrap();

    let path = PathBuf::from(temp_file.path());
    let result = load_urls_from_file(&path);

    assert!(result.is_err());
    assert!(result.unwrap_err().contains("No valid URLs"));
}

#[test]
fn test_load_urls_from_file_missing() {
    let path = PathBuf::from("/nonexistent/flowmap/urls.txt");
    let result = load_urls_from_file(&path);
    assert!(result.unwrap_err().contains("Failed to read URLs file"));
}

#[test]
fn test_load_urls_from_source_positional() {
    let urls = vec!["https://example.com/a".to_string(), "example.org".to_string()];
    let result = load_urls_from_source(&urls, None).unwrap();
    assert_eq!(result, vec!["https://example.com/a", "http://example.org"]);
}

#[test]
fn test_load_urls_from_source_no_input() {
    let result = load_urls_from_source(&[], None);
    assert!(result.is_err());
    assert!(result.unwrap_err().contains("must be provided"));
}

// ============================================================================
// Config Tests
// ============================================================================

#[test]
fn test_load_config_defaults_without_path() {
    let config = load_config(None).unwrap();
    assert_eq!(config.root_id, "client");
    assert!(config.passive_collection);
}

#[test]
fn test_load_config_from_file() -> Result<(), Box<dyn std::error::Error>> {
    let mut temp_file = NamedTempFile::new()?;
    writeln!(
        temp_file,
        r#"{{"root_id": "browser", "extra_database_ports": [{{"port": 9042, "name": "Cassandra"}}]}}"#
    )?;

    let config = load_config(temp_file.path().to_str())?;
    assert_eq!(config.root_id, "browser");

    let url = url::Url::parse("http://10.0.0.5:9042/")?;
    assert_eq!(config.classifier().classify(&url).name, "Cassandra");
    Ok(())
}

#[test]
fn test_load_config_invalid_json() {
    let mut temp_file = NamedTempFile::new().unwrap();
    writeln!(temp_file, "{{ not json").unwrap();

    let err = load_config(temp_file.path().to_str()).unwrap_err();
    assert!(format!("{:#}", err).contains("Failed to load config"));
}

// ============================================================================
// Watch Tests
// ============================================================================

async fn mock_backend() -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/items"))
        .respond_with(ResponseTemplate::new(200).set_body_string("[]"))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/missing"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;
    server
}

#[tokio::test]
async fn test_run_watch_promise_client() {
    let server = mock_backend().await;
    let monitor = TrafficMonitor::new();
    let options = WatchOptions {
        urls: vec![
            format!("{}/api/items", server.uri()),
            format!("{}/missing", server.uri()),
        ],
        method: "GET".to_string(),
        use_events: false,
        timeout_secs: 5,
    };

    let answered = run_watch(&monitor, &options).await.unwrap();

    assert_eq!(answered, 2);
    assert!(!monitor.is_monitoring());
    assert_eq!(monitor.request_count(), 2);
    assert_eq!(monitor.node_count(), 2);
    assert_eq!(monitor.edge_count(), 1);

    let snapshot = monitor.snapshot();
    let statuses: Vec<u16> = snapshot.requests.iter().map(|r| r.status).collect();
    assert!(statuses.contains(&200));
    assert!(statuses.contains(&404));
}

#[tokio::test]
async fn test_run_watch_event_client() {
    let server = mock_backend().await;
    let monitor = TrafficMonitor::new();
    let options = WatchOptions {
        urls: vec![format!("{}/api/items", server.uri())],
        method: "GET".to_string(),
        use_events: true,
        timeout_secs: 5,
    };

    let answered = run_watch(&monitor, &options).await.unwrap();

    assert_eq!(answered, 1);
    let snapshot = monitor.snapshot();
    assert_eq!(snapshot.requests.len(), 1);
    assert_eq!(snapshot.requests[0].status, 200);
    assert_eq!(snapshot.requests[0].source_kind, flowmap_core::SourceKind::EventRequest);
}

#[tokio::test]
async fn test_run_watch_unreachable_host_recorded_as_failure() {
    let monitor = TrafficMonitor::new();
    let options = WatchOptions {
        urls: vec!["http://127.0.0.1:9/".to_string()],
        method: "GET".to_string(),
        use_events: false,
        timeout_secs: 2,
    };

    let answered = run_watch(&monitor, &options).await.unwrap();

    assert_eq!(answered, 0);
    let snapshot = monitor.snapshot();
    assert_eq!(snapshot.requests.len(), 1);
    assert_eq!(snapshot.requests[0].status, 0);
    assert!(snapshot.requests[0].error_message.is_some());
}

#[tokio::test]
async fn test_render_report_after_watch() {
    let server = mock_backend().await;
    let monitor = TrafficMonitor::new();
    let options = WatchOptions {
        urls: vec![format!("{}/api/items", server.uri())],
        method: "GET".to_string(),
        use_events: false,
        timeout_secs: 5,
    };
    run_watch(&monitor, &options).await.unwrap();

    let csv = render_report(&monitor, ReportFormat::Csv).unwrap();
    assert!(csv.contains("127.0.0.1,API Server,api,path,1,"));
}

// ============================================================================
// Output Tests
// ============================================================================

#[test]
fn test_describe_service() {
    let url = url::Url::parse("https://fonts.googleapis.com/css").unwrap();
    let service = flowmap_core::classify(&url);
    let line = describe_service("https://fonts.googleapis.com/css", &service);

    assert!(line.contains("🔤"));
    assert!(line.contains("Google Fonts"));
    assert!(line.contains("font, by domain"));
}
