//! Configuration for broadcastd

use crate::gossip::RetryPolicy;
use clap::Parser;
use std::time::Duration;

/// broadcastd - broadcast gossip node
#[derive(Parser, Debug, Clone)]
#[command(name = "broadcastd")]
#[command(author, version, about = "Broadcast gossip node speaking JSON lines on stdin/stdout")]
pub struct Config {
    /// Wait this long for a gossip acknowledgment before re-sending (0 = fire-and-forget)
    #[arg(long, env = "BROADCAST_ACK_TIMEOUT_MS", default_value = "0")]
    pub ack_timeout_ms: u64,

    /// Maximum sends per forward in acknowledged mode (0 = unlimited: forwards
    /// to a neighbor that never answers stay pending and are re-sent forever)
    #[arg(long, env = "BROADCAST_MAX_ATTEMPTS", default_value = "10")]
    pub max_attempts: u32,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Log format (json or pretty)
    #[arg(long, default_value = "pretty")]
    pub log_format: String,
}

impl Config {
    /// Validate configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if !matches!(self.log_format.as_str(), "pretty" | "json") {
            anyhow::bail!("Unknown log format: {}", self.log_format);
        }
        if (1..10).contains(&self.ack_timeout_ms) {
            anyhow::bail!("Ack timeout must be 0 (disabled) or at least 10ms");
        }
        Ok(())
    }

    /// Retry policy for acknowledged gossip, if enabled
    pub fn retry_policy(&self) -> Option<RetryPolicy> {
        (self.ack_timeout_ms > 0).then(|| {
            RetryPolicy::new(Duration::from_millis(self.ack_timeout_ms), self.max_attempts)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_fire_and_forget() {
        let config = Config::parse_from(["broadcastd"]);
        assert!(config.validate().is_ok());
        assert_eq!(config.retry_policy(), None);
        assert_eq!(config.log_format, "pretty");
    }

    #[test]
    fn test_ack_timeout_enables_retry() {
        let config = Config::parse_from([
            "broadcastd",
            "--ack-timeout-ms",
            "250",
            "--max-attempts",
            "5",
        ]);
        assert!(config.validate().is_ok());
        assert_eq!(
            config.retry_policy(),
            Some(RetryPolicy::new(Duration::from_millis(250), 5))
        );
    }

    #[test]
    fn test_ack_mode_gives_up_by_default() {
        let config = Config::parse_from(["broadcastd", "--ack-timeout-ms", "100"]);
        let policy = config.retry_policy().unwrap();
        assert_eq!(policy.max_attempts, 10);

        let config = Config::parse_from([
            "broadcastd",
            "--ack-timeout-ms",
            "100",
            "--max-attempts",
            "0",
        ]);
        assert_eq!(config.retry_policy().unwrap().max_attempts, 0);
    }

    #[test]
    fn test_validation() {
        let config = Config::parse_from(["broadcastd", "--log-format", "xml"]);
        assert!(config.validate().is_err());

        let config = Config::parse_from(["broadcastd", "--ack-timeout-ms", "3"]);
        assert!(config.validate().is_err());
    }
}
