//! Layered configuration: compiled-in defaults, optional `config/*.toml`
//! file, then environment overrides under the `NODECORE_` prefix.
//!
//! A `config::Config` seeded with defaults and merged with an externally
//! supplied file, exposed as a strongly typed [`RuntimeConfig`] instead
//! of a loosely typed map.

use config::{Config, Environment, File};
use serde::Deserialize;
use std::time::Duration;

use crate::error::CoreError;

/// What `ActorRef::tell` does when a mailbox is at capacity. `tell`
/// ignores this for the strict, always-immediate-failure case — use
/// `try_tell` for that regardless of the configured policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverflowPolicy {
    /// Wait up to `send_timeout_millis` for room, then fail with
    /// `MailboxFull`. The default: callers get back-pressure instead of
    /// an unbounded queue, but a slow receiver can't block a sender
    /// forever.
    BlockWithTimeout,
    /// Drop the message being sent and keep the queued ones, publishing
    /// a dead letter for the drop.
    DropNewest,
    /// Evict the oldest queued message to make room, publishing a dead
    /// letter for the eviction.
    DropOldest,
    /// Fail immediately, same as `try_tell`.
    Fail,
}

impl Default for OverflowPolicy {
    fn default() -> Self {
        OverflowPolicy::BlockWithTimeout
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MailboxConfig {
    pub capacity: usize,
    pub overflow: OverflowPolicy,
    /// Only consulted by `OverflowPolicy::BlockWithTimeout`.
    pub send_timeout_millis: u64,
}

impl Default for MailboxConfig {
    fn default() -> Self {
        MailboxConfig {
            capacity: 1024,
            overflow: OverflowPolicy::default(),
            send_timeout_millis: 5_000,
        }
    }
}

impl MailboxConfig {
    pub fn send_timeout(&self) -> Duration {
        Duration::from_millis(self.send_timeout_millis)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SupervisorConfig {
    pub max_restarts: u32,
    pub window_secs: u64,
    /// Whether a restarted actor keeps its queued mailbox messages.
    pub reset_mailbox: bool,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        SupervisorConfig {
            max_restarts: 5,
            window_secs: 60,
            reset_mailbox: false,
        }
    }
}

impl SupervisorConfig {
    pub fn window(&self) -> Duration {
        Duration::from_secs(self.window_secs)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BusConfig {
    pub max_size: usize,
    pub max_age_secs: u64,
    pub cleanup_interval_millis: u64,
    pub subscriber_buffer: usize,
}

impl Default for BusConfig {
    fn default() -> Self {
        BusConfig {
            max_size: 10_000,
            max_age_secs: 3600,
            cleanup_interval_millis: 500,
            subscriber_buffer: 256,
        }
    }
}

impl BusConfig {
    pub fn max_age(&self) -> Option<Duration> {
        if self.max_age_secs == 0 {
            None
        } else {
            Some(Duration::from_secs(self.max_age_secs))
        }
    }

    pub fn cleanup_interval(&self) -> Duration {
        Duration::from_millis(self.cleanup_interval_millis)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    pub debug: bool,
    pub shutdown_deadline_millis: u64,
    /// When true, `spawn_root`/`spawn_child` fail with `DuplicateName` on
    /// any path collision. When false (the default), a colliding name is
    /// suffixed (`-2`, `-3`, ...) until a free path is found.
    pub strict_unique_naming: bool,
    pub mailbox: MailboxConfig,
    pub supervisor: SupervisorConfig,
    pub bus: BusConfig,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        RuntimeConfig {
            debug: false,
            shutdown_deadline_millis: 5_000,
            strict_unique_naming: false,
            mailbox: MailboxConfig::default(),
            supervisor: SupervisorConfig::default(),
            bus: BusConfig::default(),
        }
    }
}

impl RuntimeConfig {
    pub fn shutdown_deadline(&self) -> Duration {
        Duration::from_millis(self.shutdown_deadline_millis)
    }

    /// Loads defaults, then an optional `config/nodecore.toml`, then
    /// environment variables prefixed `NODECORE__` (double underscore
    /// separates nesting, e.g. `NODECORE__BUS__MAX_SIZE=500`).
    pub fn load() -> crate::error::Result<Self> {
        let builder = Config::builder()
            .add_source(File::with_name("config/nodecore").required(false))
            .add_source(Environment::with_prefix("NODECORE").separator("__"));

        let built = builder
            .build()
            .map_err(|e| CoreError::Validation(e.to_string()))?;

        built
            .try_deserialize()
            .map_err(|e| CoreError::Validation(e.to_string()))
    }
}
