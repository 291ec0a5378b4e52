use std::path::PathBuf;

const DEFAULT_WRAPPER_COMMAND: &str = "uv";
const DEFAULT_WRAPPER_ARGS: &[&str] = &["run", "claude_sdk_wrapper.py"];

/// Fixed PATH handed to the wrapper child. The child never inherits the
/// host environment — this is the whole of it, plus the working directory.
pub const RESTRICTED_PATH: &str = "/usr/local/bin:/usr/bin:/bin";

/// Configuration for the wrapper subprocess bridge.
#[derive(Debug, Clone)]
pub struct BridgeConfig {
    /// Executable that runs the wrapper (e.g. `"uv"`, `"python3"`).
    pub command: String,
    /// Arguments passed to the command.
    pub args: Vec<String>,
    /// Working directory for the child process.
    pub working_dir: PathBuf,
}

impl BridgeConfig {
    /// Build a config from optional overrides, falling back to defaults.
    pub fn new(
        command: Option<String>,
        args: Option<Vec<String>>,
        working_dir: Option<PathBuf>,
    ) -> Self {
        Self {
            command: command.unwrap_or_else(|| DEFAULT_WRAPPER_COMMAND.to_string()),
            args: args.unwrap_or_else(|| {
                DEFAULT_WRAPPER_ARGS.iter().map(|s| s.to_string()).collect()
            }),
            working_dir: working_dir
                .or_else(|| std::env::current_dir().ok())
                .unwrap_or_else(|| PathBuf::from(".")),
        }
    }
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self::new(None, None, None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = BridgeConfig::default();
        assert_eq!(config.command, "uv");
        assert_eq!(config.args, vec!["run", "claude_sdk_wrapper.py"]);
    }

    #[test]
    fn overrides_win() {
        let config = BridgeConfig::new(
            Some("sh".into()),
            Some(vec!["-c".into(), "true".into()]),
            Some(PathBuf::from("/tmp")),
        );
        assert_eq!(config.command, "sh");
        assert_eq!(config.args, vec!["-c", "true"]);
        assert_eq!(config.working_dir, PathBuf::from("/tmp"));
    }
}
