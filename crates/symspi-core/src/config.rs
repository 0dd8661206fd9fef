use std::time::Duration;

use symspi_hal::{Polarity, Role};

/// Which deferred-work runner backing is requested (spec §6, "runner mode").
/// `symspi-hal::DeferredRunner` implementations interpret this; the core
/// itself only threads the value through to whichever runner `init` wires
/// up.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RunnerMode {
    SharedDefault,
    SharedHighPriority,
    PrivateHighPriority,
}

/// Build/runtime tunables (spec §6 "Configuration"). Defaults match the
/// spec verbatim; setters clamp to the documented ranges rather than
/// panicking on out-of-range input, since these values are as likely to
/// come from a config file as from a literal in code.
#[derive(Clone, Copy, Debug)]
pub struct Config {
    pub role: Role,
    pub hardware_ready: bool,
    pub polarity: Polarity,
    pub inactive_minimum: Duration,
    pub peer_wait_timeout: Duration,
    pub recovery_silence: Duration,
    pub close_wait_timeout: Duration,
    pub runner_mode: RunnerMode,
    pub verbosity: u8,
    pub error_decay_half_life: Duration,
    pub min_report_interval: Duration,
}

impl Config {
    const PEER_WAIT_MIN: Duration = Duration::from_millis(20);
    const PEER_WAIT_MAX: Duration = Duration::from_millis(1000);
    const VERBOSITY_MAX: u8 = 6;

    pub fn new(role: Role, hardware_ready: bool, polarity: Polarity) -> Self {
        Self {
            role,
            hardware_ready,
            polarity,
            inactive_minimum: Duration::from_micros(750),
            peer_wait_timeout: Duration::from_millis(60),
            recovery_silence: Duration::from_millis(10),
            close_wait_timeout: Duration::from_millis(500),
            runner_mode: RunnerMode::SharedDefault,
            verbosity: 0,
            error_decay_half_life: Duration::from_secs(2),
            min_report_interval: Duration::from_secs(10),
        }
    }

    #[must_use]
    pub fn with_peer_wait_timeout(mut self, d: Duration) -> Self {
        self.peer_wait_timeout = d.clamp(Self::PEER_WAIT_MIN, Self::PEER_WAIT_MAX);
        self
    }

    #[must_use]
    pub fn with_verbosity(mut self, v: u8) -> Self {
        self.verbosity = v.min(Self::VERBOSITY_MAX);
        self
    }

    #[must_use]
    pub fn with_runner_mode(mut self, mode: RunnerMode) -> Self {
        self.runner_mode = mode;
        self
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::new(Role::Master, false, Polarity::ActiveHigh)
    }
}
