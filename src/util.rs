use tracing::level_filters::LevelFilter;

/// Join a base URL and an endpoint path with exactly one `/` between them
pub fn urljoin(base: &str, path: &str) -> String {
    let base = base.trim_end_matches('/');
    let path = path.trim_start_matches('/');

    if path.is_empty() {
        base.to_string()
    } else {
        format!("{base}/{path}")
    }
}

const MONITOR_CONFIG: &str = "MONITOR_CONFIG";

pub fn get_config_path() -> Option<String> {
    std::env::var(MONITOR_CONFIG).ok()
}

const MONITOR_LOG_LEVEL: &str = "MONITOR_LOG_LEVEL";

const DEFAULT_LOG_LEVEL: LevelFilter = LevelFilter::INFO;

pub fn get_log_level() -> LevelFilter {
    let level_from_env = std::env::var(MONITOR_LOG_LEVEL);
    level_from_env.map_or(DEFAULT_LOG_LEVEL, |res| {
        res.parse().unwrap_or(DEFAULT_LOG_LEVEL)
    })
}
