use std::sync::Once;

use log::LevelFilter;

/// Where log records go and how verbose they are.
///
/// Per-frame pacing decisions are logged at `trace` under `cadence_engine::pacing`; the fps
/// report and setup summary at `info`.
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    /// `env_logger` directives, e.g. `"cadence_engine::pacing=trace"`. Wins over `RUST_LOG`.
    pub env_filter: Option<String>,
    /// Level used when neither a filter nor `RUST_LOG` is given.
    pub default_level: LevelFilter,
    pub write_style: env_logger::WriteStyle,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            env_filter: None,
            default_level: LevelFilter::Info,
            write_style: env_logger::WriteStyle::Auto,
        }
    }
}

/// GPU stack modules that flood `info` with adapter chatter.
const QUIET_MODULES: [&str; 2] = ["wgpu_core", "wgpu_hal"];

static INIT: Once = Once::new();

/// Picks the directives to parse: the configured filter, else the environment's.
fn directives(config: &LoggingConfig, env: Option<String>) -> Option<String> {
    config.env_filter.clone().or(env).filter(|d| !d.trim().is_empty())
}

/// Installs the `env_logger` backend; only the first call has any effect.
///
/// Timestamps carry microseconds so vblank-scale intervals stay readable.
pub fn init_logging(config: LoggingConfig) {
    INIT.call_once(|| {
        let mut builder = env_logger::Builder::new();
        for module in QUIET_MODULES {
            builder.filter_module(module, LevelFilter::Warn);
        }

        match directives(&config, std::env::var("RUST_LOG").ok()) {
            Some(d) => {
                builder.parse_filters(&d);
            }
            None => {
                builder.filter_level(config.default_level);
            }
        }

        builder
            .write_style(config.write_style)
            .format_timestamp_micros();

        // A test harness may own the logger already.
        if builder.try_init().is_ok() {
            log::debug!("logger installed");
        }
    });
}
