//! Log subscriber setup for the `vasm` binary.

use tracing_subscriber::EnvFilter;

use crate::config::JitConfig;

const DEFAULT_FILTER: &str = "warn";

/// Pick the filter directive: tracing requested on the command line or in
/// the config wins, then `RUST_LOG`, then the config's `log_filter`.
pub fn filter_for(config: &JitConfig, trace_jit: bool) -> EnvFilter {
    if trace_jit || config.trace {
        return EnvFilter::new("vasm=trace");
    }
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return filter;
    }
    config
        .log_filter
        .as_deref()
        .and_then(|directive| EnvFilter::try_new(directive).ok())
        .unwrap_or_else(|| EnvFilter::new(DEFAULT_FILTER))
}

/// Install a stderr fmt subscriber. Later calls are ignored.
pub fn init(config: &JitConfig, trace_jit: bool) {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter_for(config, trace_jit))
        .with_writer(std::io::stderr)
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trace_flag_wins() {
        let config = JitConfig {
            log_filter: Some("error".to_string()),
            ..JitConfig::default()
        };
        assert_eq!(filter_for(&config, true).to_string(), "vasm=trace");

        let config = JitConfig {
            trace: true,
            ..JitConfig::default()
        };
        assert_eq!(filter_for(&config, false).to_string(), "vasm=trace");
    }
}
