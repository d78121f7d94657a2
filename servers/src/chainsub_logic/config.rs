use clap::Parser;
use lib_chainsub::{Backoff, SessionConfig, Timeouts};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Parser, Deserialize, Serialize, Debug, Clone, Default, PartialEq, Eq)]
#[clap(about = "Blockchain node head subscription daemon", version)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    #[clap(long, env = "CHAINSUB_ENDPOINT", help = "Node WebSocket endpoint (ws:// or wss://).")]
    pub endpoint: Option<String>,

    #[clap(long, env = "CHAINSUB_CONFIG_PATH", help = "Path to the JSON configuration file.")]
    pub config_path: Option<PathBuf>,

    #[clap(long, env = "CHAINSUB_LOG_DIR", help = "Directory for log files.")]
    pub log_dir: Option<PathBuf>,

    #[clap(long, env = "CHAINSUB_LOG_LEVEL", help = "Logging level (trace, debug, info, warn, error).")]
    pub log_level: Option<String>,

    #[clap(long, env = "CHAINSUB_LOG_KEEP", help = "Number of log files to keep, including the current one.")]
    pub log_keep: Option<usize>,

    #[clap(long, env = "CHAINSUB_DIAL_TIMEOUT_MS", help = "Timeout in milliseconds for a single dial attempt.")]
    pub dial_timeout_ms: Option<u64>,

    #[clap(long, env = "CHAINSUB_READ_TIMEOUT_MS", help = "Read timeout in milliseconds.")]
    pub read_timeout_ms: Option<u64>,

    #[clap(long, env = "CHAINSUB_WRITE_TIMEOUT_MS", help = "Write timeout in milliseconds.")]
    pub write_timeout_ms: Option<u64>,

    #[clap(long, env = "CHAINSUB_KEEPALIVE_MS", help = "Keepalive ping period in milliseconds; 0 disables keepalive.")]
    pub keepalive_ms: Option<u64>,

    #[clap(long, env = "CHAINSUB_RECONNECT_BASE_DELAY_MS", help = "Base delay in milliseconds between dial attempts.")]
    pub reconnect_base_delay_ms: Option<u64>,

    #[clap(long, env = "CHAINSUB_RECONNECT_MAX_DELAY_MS", help = "Maximum delay in milliseconds between dial attempts.")]
    pub reconnect_max_delay_ms: Option<u64>,

    #[clap(long, env = "CHAINSUB_HEARTBEAT_INTERVAL_MS", help = "Interval in milliseconds between system_health probes.")]
    pub heartbeat_interval_ms: Option<u64>,

    #[clap(long, env = "CHAINSUB_SETTLE_PAUSE_MS", help = "Pause in milliseconds before reads resume after a reconnect.")]
    pub settle_pause_ms: Option<u64>,

    #[clap(long, env = "CHAINSUB_LIVE_POLL_INTERVAL_MS", help = "Interval in milliseconds for link liveness polling.")]
    pub live_poll_interval_ms: Option<u64>,
}

impl Config {
    // Merge two Config structs, where 'other' overrides 'self' for Some values
    fn merge(self, other: Config) -> Config {
        Config {
            endpoint: other.endpoint.or(self.endpoint),
            config_path: other.config_path.or(self.config_path),
            log_dir: other.log_dir.or(self.log_dir),
            log_level: other.log_level.or(self.log_level),
            log_keep: other.log_keep.or(self.log_keep),
            dial_timeout_ms: other.dial_timeout_ms.or(self.dial_timeout_ms),
            read_timeout_ms: other.read_timeout_ms.or(self.read_timeout_ms),
            write_timeout_ms: other.write_timeout_ms.or(self.write_timeout_ms),
            keepalive_ms: other.keepalive_ms.or(self.keepalive_ms),
            reconnect_base_delay_ms: other.reconnect_base_delay_ms.or(self.reconnect_base_delay_ms),
            reconnect_max_delay_ms: other.reconnect_max_delay_ms.or(self.reconnect_max_delay_ms),
            heartbeat_interval_ms: other.heartbeat_interval_ms.or(self.heartbeat_interval_ms),
            settle_pause_ms: other.settle_pause_ms.or(self.settle_pause_ms),
            live_poll_interval_ms: other.live_poll_interval_ms.or(self.live_poll_interval_ms),
        }
    }

    pub fn defaults() -> Config {
        let session = SessionConfig::default();
        Config {
            endpoint: Some(session.endpoint),
            log_dir: Some(PathBuf::from("./logs")),
            log_level: Some("info".to_string()),
            log_keep: Some(1),
            dial_timeout_ms: Some(millis(session.timeouts.dial)),
            read_timeout_ms: Some(millis(session.timeouts.read)),
            write_timeout_ms: Some(millis(session.timeouts.write)),
            keepalive_ms: Some(session.timeouts.keepalive.map_or(0, millis)),
            reconnect_base_delay_ms: Some(millis(session.backoff.base)),
            reconnect_max_delay_ms: Some(millis(session.backoff.max)),
            heartbeat_interval_ms: Some(millis(session.heartbeat_interval)),
            settle_pause_ms: Some(millis(session.settle_pause)),
            live_poll_interval_ms: Some(millis(session.live_poll_interval)),
            ..Default::default()
        }
    }

    pub fn log_dir(&self) -> PathBuf {
        self.log_dir.clone().unwrap_or_else(|| PathBuf::from("./logs"))
    }

    pub fn log_level(&self) -> &str {
        self.log_level.as_deref().unwrap_or("info")
    }

    pub fn log_keep(&self) -> usize {
        self.log_keep.unwrap_or(1).max(1)
    }

    /// Session settings; anything still unset falls back to the library defaults.
    pub fn session(&self) -> SessionConfig {
        let base = SessionConfig::default();
        let ms = |value: Option<u64>, fallback: Duration| value.map_or(fallback, Duration::from_millis);
        SessionConfig {
            endpoint: self.endpoint.clone().unwrap_or(base.endpoint),
            timeouts: Timeouts {
                dial: ms(self.dial_timeout_ms, base.timeouts.dial),
                read: ms(self.read_timeout_ms, base.timeouts.read),
                write: ms(self.write_timeout_ms, base.timeouts.write),
                keepalive: match self.keepalive_ms {
                    Some(0) => None,
                    Some(period) => Some(Duration::from_millis(period)),
                    None => base.timeouts.keepalive,
                },
            },
            backoff: Backoff {
                base: ms(self.reconnect_base_delay_ms, base.backoff.base),
                max: ms(self.reconnect_max_delay_ms, base.backoff.max),
            },
            heartbeat_interval: ms(self.heartbeat_interval_ms, base.heartbeat_interval),
            settle_pause: ms(self.settle_pause_ms, base.settle_pause),
            live_poll_interval: ms(self.live_poll_interval_ms, base.live_poll_interval),
        }
    }
}

fn millis(duration: Duration) -> u64 {
    duration.as_millis() as u64
}

pub fn load_config() -> Config {
    resolve(Config::parse())
}

// Defaults, then the config file (server_chainsub.conf unless overridden),
// then environment variables and CLI arguments, which clap has already merged.
pub fn resolve(cli: Config) -> Config {
    let config_file_path = cli
        .config_path
        .clone()
        .unwrap_or_else(|| PathBuf::from("server_chainsub.conf"));

    let mut current_config = Config::defaults();
    if let Some(file_config) = read_config_file(&config_file_path) {
        current_config = current_config.merge(file_config);
    }

    current_config.merge(cli)
}

fn read_config_file(path: &Path) -> Option<Config> {
    if !path.exists() {
        log::info!("Config file not found at {}. Using defaults and environment/CLI variables.", path.display());
        return None;
    }

    let config_str = match fs::read_to_string(path) {
        Ok(text) => text,
        Err(e) => {
            log::warn!("Failed to read config file: {} ({}). Falling back to other sources.", path.display(), e);
            return None;
        }
    };

    match serde_json::from_str::<Config>(&config_str) {
        Ok(file_config) => Some(file_config),
        Err(e) => {
            log::warn!("Failed to parse config file: {} ({}). Falling back to other sources.", path.display(), e);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn cli(args: &[&str]) -> Config {
        let mut argv = vec!["server_chainsub"];
        argv.extend_from_slice(args);
        Config::try_parse_from(argv).unwrap()
    }

    fn write_conf(dir: &tempfile::TempDir, body: &str) -> PathBuf {
        let path = dir.path().join("server_chainsub.conf");
        let mut file = fs::File::create(&path).unwrap();
        file.write_all(body.as_bytes()).unwrap();
        path
    }

    #[test]
    fn defaults_mirror_the_library() {
        let config = Config::defaults();
        assert_eq!(config.session(), SessionConfig::default());
        assert_eq!(config.keepalive_ms, Some(5_000));
    }

    #[test]
    fn file_overrides_defaults_and_cli_overrides_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_conf(
            &dir,
            r#"{ "endpoint": "wss://rpc.example.org", "settlePauseMs": 2500, "heartbeatIntervalMs": 1000 }"#,
        );

        let config = resolve(cli(&[
            "--config-path",
            path.to_str().unwrap(),
            "--heartbeat-interval-ms",
            "4000",
        ]));

        let session = config.session();
        assert_eq!(session.endpoint, "wss://rpc.example.org");
        assert_eq!(session.settle_pause, Duration::from_millis(2_500));
        assert_eq!(session.heartbeat_interval, Duration::from_secs(4));
        assert_eq!(session.timeouts.read, Duration::from_secs(10));
        assert_eq!(config.config_path, Some(path));
    }

    #[test]
    fn unreadable_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_conf(&dir, "{ not json");

        let config = resolve(cli(&["--config-path", path.to_str().unwrap()]));
        assert_eq!(config.session(), SessionConfig::default());
        assert_eq!(config.log_level(), "info");
    }

    #[test]
    fn zero_intervals_do_not_pass_validation() {
        for flag in ["--heartbeat-interval-ms", "--live-poll-interval-ms", "--reconnect-base-delay-ms"] {
            let config = resolve(cli(&[flag, "0"]));
            assert!(
                config.session().validate().is_err(),
                "{flag} 0 should be rejected"
            );
        }
        assert!(resolve(cli(&["--keepalive-ms", "0"])).session().validate().is_ok());
    }

    #[test]
    fn zero_keepalive_disables_pings() {
        let config = Config {
            keepalive_ms: Some(0),
            ..Config::defaults()
        };
        assert_eq!(config.session().timeouts.keepalive, None);
    }
}
