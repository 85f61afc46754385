use tracing_subscriber::EnvFilter;

pub const LOG_LEVEL_ENV: &str = "HUBHQ_LOG_LEVEL";

/// Flag, then `HUBHQ_LOG_LEVEL`, then the config file, then `info`.
pub fn resolve_level(flag: Option<&str>, env: Option<String>, config: Option<&str>) -> String {
    flag.map(str::to_string)
        .or(env)
        .or_else(|| config.map(str::to_string))
        .unwrap_or_else(|| "info".to_string())
}

/// Logs go to stderr so command output on stdout stays clean. `RUST_LOG`
/// overrides the resolved level.
pub fn init_logging(flag: Option<&str>, config: Option<&str>) {
    let level = resolve_level(flag, std::env::var(LOG_LEVEL_ENV).ok(), config);
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .finish();
    if tracing::subscriber::set_global_default(subscriber).is_err() {
        eprintln!("logging already initialized");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flag_beats_env_beats_config() {
        assert_eq!(
            resolve_level(Some("debug"), Some("warn".to_string()), Some("error")),
            "debug"
        );
        assert_eq!(resolve_level(None, Some("warn".to_string()), Some("error")), "warn");
        assert_eq!(resolve_level(None, None, Some("error")), "error");
        assert_eq!(resolve_level(None, None, None), "info");
    }
}
