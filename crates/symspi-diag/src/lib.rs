//! C10 diagnostics readout (spec §4.10): a byte-oriented read surface over a
//! formatted snapshot of a device's counters and configuration, plus a
//! structured form for machine consumption. Modeled on the teacher's
//! `flux-ctl`, which prints an operational snapshot of a live system in
//! both a human table and `serde_json` form.

use serde::Serialize;
use symspi_core::{Config, Dev, ErrorKind, RunnerMode, State};

/// Snapshot is capped at one sysfs-style page; `read_at` serves partial
/// reads out of this fixed buffer the way a debugfs attribute does.
const MAX_SNAPSHOT_LEN: usize = 4096;

#[must_use]
const fn role_label(role: symspi_hal::Role) -> &'static str {
    match role {
        symspi_hal::Role::Master => "master",
        symspi_hal::Role::Slave => "slave",
    }
}

#[must_use]
const fn polarity_label(polarity: symspi_hal::Polarity) -> &'static str {
    match polarity {
        symspi_hal::Polarity::ActiveHigh => "active-high",
        symspi_hal::Polarity::ActiveLow => "active-low",
    }
}

#[must_use]
const fn runner_mode_label(mode: RunnerMode) -> &'static str {
    match mode {
        RunnerMode::SharedDefault => "shared-default",
        RunnerMode::SharedHighPriority => "shared-high-priority",
        RunnerMode::PrivateHighPriority => "private-high-priority",
    }
}

#[must_use]
const fn state_label(state: State) -> &'static str {
    match state {
        State::Cold => "cold",
        State::Idle => "idle",
        State::XferPrepare => "xfer-prepare",
        State::WaitingPrev => "waiting-prev",
        State::WaitingRdy => "waiting-rdy",
        State::Xfer => "xfer",
        State::Postprocessing => "postprocessing",
        State::Error => "error",
    }
}

#[must_use]
const fn error_kind_label(kind: ErrorKind) -> &'static str {
    match kind {
        ErrorKind::OtherSide => "other-side",
        ErrorKind::WaitOtherSide => "wait-other-side",
        ErrorKind::BusLayer => "bus-layer",
        ErrorKind::Logical => "logical",
    }
}

/// Plain-data, `serde`-serializable snapshot of a device's counters and
/// configuration (spec §4.10: "statistics... and configuration"), plus the
/// `last_error` readout the feature supplement adds.
#[derive(Clone, Debug, Serialize)]
pub struct Snapshot {
    pub role: String,
    pub polarity: String,
    pub state: String,
    pub last_error: Option<String>,
    pub max_single_burst: Option<usize>,
    pub inactive_minimum_us: u128,
    pub peer_wait_timeout_ms: u128,
    pub recovery_silence_ms: u128,
    pub runner_mode: String,
    pub verbosity: u8,
    pub other_side_indicated_errors: u64,
    pub other_side_no_reaction_errors: u64,
    pub bus_xfers_done_ok: u64,
    pub peer_flag_edges_observed: u64,
}

/// Wraps a `Dev` to produce diagnostics readouts without touching the
/// transport's own public surface beyond the plain accessors it already
/// exposes (`state`, `config`, `last_error`, `info_snapshot`,
/// `current_size`).
pub struct Diagnostics<'a> {
    dev: &'a Dev,
}

impl<'a> Diagnostics<'a> {
    #[must_use]
    pub const fn new(dev: &'a Dev) -> Self {
        Self { dev }
    }

    #[must_use]
    pub fn snapshot(&self) -> Snapshot {
        let config: Config = self.dev.config();
        let info = self.dev.info_snapshot();
        Snapshot {
            role: role_label(config.role).to_string(),
            polarity: polarity_label(config.polarity).to_string(),
            state: state_label(self.dev.state()).to_string(),
            last_error: self.dev.last_error().map(|k| error_kind_label(k).to_string()),
            max_single_burst: self.dev.current_size(),
            inactive_minimum_us: config.inactive_minimum.as_micros(),
            peer_wait_timeout_ms: config.peer_wait_timeout.as_millis(),
            recovery_silence_ms: config.recovery_silence.as_millis(),
            runner_mode: runner_mode_label(config.runner_mode).to_string(),
            verbosity: config.verbosity,
            other_side_indicated_errors: info.other_side_indicated_errors,
            other_side_no_reaction_errors: info.other_side_no_reaction_errors,
            bus_xfers_done_ok: info.bus_xfers_done_ok,
            peer_flag_edges_observed: info.peer_flag_edges_observed,
        }
    }

    /// Human-readable rendering of [`Snapshot`], truncated to
    /// [`MAX_SNAPSHOT_LEN`] bytes (spec §4.10 "truncates at a fixed buffer
    /// size").
    #[must_use]
    pub fn render(&self) -> String {
        let s = self.snapshot();
        let mut out = format!(
            "role: {}\n\
             polarity: {}\n\
             state: {}\n\
             last_error: {}\n\
             max_single_burst: {}\n\
             inactive_minimum_us: {}\n\
             peer_wait_timeout_ms: {}\n\
             recovery_silence_ms: {}\n\
             runner_mode: {}\n\
             verbosity: {}\n\
             other_side_indicated_errors: {}\n\
             other_side_no_reaction_errors: {}\n\
             bus_xfers_done_ok: {}\n\
             peer_flag_edges_observed: {}\n",
            s.role,
            s.polarity,
            s.state,
            s.last_error.as_deref().unwrap_or("none"),
            s.max_single_burst.map_or_else(|| "none".to_string(), |v| v.to_string()),
            s.inactive_minimum_us,
            s.peer_wait_timeout_ms,
            s.recovery_silence_ms,
            s.runner_mode,
            s.verbosity,
            s.other_side_indicated_errors,
            s.other_side_no_reaction_errors,
            s.bus_xfers_done_ok,
            s.peer_flag_edges_observed,
        );
        out.truncate(MAX_SNAPSHOT_LEN);
        out
    }

    /// Byte-oriented partial read (spec §4.10 "supports partial reads with
    /// offset"): copies as much of the rendered text as fits starting at
    /// `offset` into `buf`, returning the number of bytes written. Returns
    /// 0 once `offset` is past the end, the `read(2)`-style EOF signal.
    pub fn read_at(&self, offset: usize, buf: &mut [u8]) -> usize {
        let rendered = self.render();
        let bytes = rendered.as_bytes();
        if offset >= bytes.len() {
            return 0;
        }
        let available = &bytes[offset..];
        let n = available.len().min(buf.len());
        buf[..n].copy_from_slice(&available[..n]);
        n
    }

    #[must_use]
    pub fn to_json(&self) -> String {
        serde_json::to_string_pretty(&self.snapshot()).unwrap_or_else(|_| "{}".to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use symspi_core::XferTemplate;
    use symspi_hal::{Polarity, Role};
    use symspi_sim::SimPair;

    #[test]
    fn snapshot_reflects_config_and_state() {
        let pair = SimPair::new(Config::new(Role::Master, false, Polarity::ActiveHigh), Config::new(Role::Slave, false, Polarity::ActiveHigh));
        pair.master.init(XferTemplate::new(vec![0_u8; 16])).unwrap();

        let diag = Diagnostics::new(&pair.master);
        let snap = diag.snapshot();
        assert_eq!(snap.role, "master");
        assert_eq!(snap.state, "idle");
        assert_eq!(snap.max_single_burst, Some(16));
    }

    #[test]
    fn read_at_serves_partial_reads_and_signals_eof() {
        let pair = SimPair::new(Config::new(Role::Master, false, Polarity::ActiveHigh), Config::new(Role::Slave, false, Polarity::ActiveHigh));
        pair.master.init(XferTemplate::new(vec![0_u8; 8])).unwrap();
        let diag = Diagnostics::new(&pair.master);

        let full = diag.render();
        let mut buf = vec![0_u8; 16];
        let n = diag.read_at(0, &mut buf);
        assert_eq!(&buf[..n], &full.as_bytes()[..n]);

        let mut tail = vec![0_u8; full.len()];
        let n2 = diag.read_at(n, &mut tail);
        assert_eq!(&tail[..n2], &full.as_bytes()[n..n + n2]);

        assert_eq!(diag.read_at(full.len(), &mut buf), 0);
    }

    #[test]
    fn to_json_round_trips_through_serde_json() {
        let pair = SimPair::new(Config::new(Role::Master, false, Polarity::ActiveHigh), Config::new(Role::Slave, false, Polarity::ActiveHigh));
        pair.master.init(XferTemplate::new(vec![0_u8; 4])).unwrap();
        let diag = Diagnostics::new(&pair.master);
        let json = diag.to_json();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["role"], "master");
    }
}
