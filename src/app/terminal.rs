pub(crate) fn resolve_default_log_level(verbose: u8, quiet: bool) -> &'static str {
    if quiet {
        "error"
    } else {
        match verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    }
}

/// `RUST_LOG` wins over the CLI-derived level. Logs go to stderr so stdout
/// carries only progress lines.
pub(crate) fn init_tracing(default_level: &str) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));
    let _ = tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(filter)
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::resolve_default_log_level;

    #[test]
    fn test_quiet_overrides_verbose() {
        assert_eq!(resolve_default_log_level(2, true), "error");
    }

    #[test]
    fn test_verbose_count_maps_to_levels() {
        assert_eq!(resolve_default_log_level(0, false), "info");
        assert_eq!(resolve_default_log_level(1, false), "debug");
        assert_eq!(resolve_default_log_level(2, false), "trace");
        assert_eq!(resolve_default_log_level(9, false), "trace");
    }
}
