pub mod handlers;

// Re-export commonly used handler functions for convenience
pub use handlers::{
    WatchOptions, describe_service, load_config, load_urls_from_file, load_urls_from_source,
    parse_url_line, render_report, run_watch,
};
