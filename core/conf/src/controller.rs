//! Registry watch controller configuration.
use std::time::Duration;

use serde::Deserialize;
use serde::Serialize;

/// Backoff configuration for retrying failed operations of background components.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct BackoffConf {
    /// Maximum time, in seconds, to wait before retrying after an error.
    #[serde(default = "BackoffConf::default_max_delay")]
    pub max_delay: u64,

    /// Maximum number of retries before the error is reported.
    #[serde(default = "BackoffConf::default_max_retries")]
    pub max_retries: u16,

    /// Backoff multiplier every time a subsequent error is encountered.
    #[serde(default = "BackoffConf::default_multiplier")]
    pub multiplier: u32,

    /// Initial delay, in milliseconds, to wait before the first retry.
    #[serde(default = "BackoffConf::default_start_delay")]
    pub start_delay: u64,
}

impl Default for BackoffConf {
    fn default() -> Self {
        BackoffConf {
            max_delay: BackoffConf::default_max_delay(),
            max_retries: BackoffConf::default_max_retries(),
            multiplier: BackoffConf::default_multiplier(),
            start_delay: BackoffConf::default_start_delay(),
        }
    }
}

impl BackoffConf {
    fn default_max_delay() -> u64 {
        30
    }

    fn default_max_retries() -> u16 {
        10
    }

    fn default_multiplier() -> u32 {
        2
    }

    fn default_start_delay() -> u64 {
        200
    }
}

/// Registry watch controller configuration.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct ControllerConf {
    /// Backoff for per-event operations and for re-establishing the registry subscription.
    #[serde(default)]
    pub backoff: BackoffConf,

    /// Interval, in seconds, between full re-list and re-diff passes.
    #[serde(default = "ControllerConf::default_resync_interval")]
    pub resync_interval_sec: u64,

    /// Time, in seconds, to wait for the registry to be ready before subscribing.
    #[serde(default = "ControllerConf::default_startup_grace")]
    pub startup_grace_sec: u64,
}

impl Default for ControllerConf {
    fn default() -> Self {
        ControllerConf {
            backoff: Default::default(),
            resync_interval_sec: Self::default_resync_interval(),
            startup_grace_sec: Self::default_startup_grace(),
        }
    }
}

impl ControllerConf {
    fn default_resync_interval() -> u64 {
        600
    }

    fn default_startup_grace() -> u64 {
        3
    }

    /// Interval between full re-list and re-diff passes.
    pub fn resync_interval(&self) -> Duration {
        Duration::from_secs(self.resync_interval_sec)
    }

    /// Time to wait for the registry to be ready before subscribing.
    pub fn startup_grace(&self) -> Duration {
        Duration::from_secs(self.startup_grace_sec)
    }
}
