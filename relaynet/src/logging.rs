use slog::Logger;
use sloggers::{Config, LoggerConfig};

/// Builds a terminal logger at the given level. `level` accepts any of
/// sloggers' level names (`"debug"`, `"info"`, `"warning"`, `"error"`, ...).
///
/// Endpoints default to this when no logger is supplied explicitly; tests
/// and embedding applications can build their own `slog::Logger` and pass
/// it in instead.
pub fn terminal(level: &str) -> Logger {
    let toml = format!(
        r#"
type = "terminal"
level = "{level}"
destination = "stderr"
"#
    );
    let config: LoggerConfig = serdeconv::from_toml_str(&toml).expect("invalid logger config");
    config.build_logger().expect("failed to build terminal logger")
}

/// A logger that discards everything, for tests that don't want log noise
/// on stderr.
pub fn discard() -> Logger {
    Logger::root(slog::Discard, slog::o!())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_builds_at_each_known_level() {
        for level in ["debug", "info", "warning", "error"] {
            terminal(level);
        }
    }
}
