use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};

use crate::error::{ErrorKind, LastError};
use crate::state::{State, StateController};

/// One per-kind record (spec §3 "Error record"). All fields are atomics so
/// `report`/`handle` stay callable from interrupt context; only `total` uses
/// relaxed ordering since it is a best-effort statistic, the rest use
/// `SeqCst` because they gate the suppression/classification decision.
#[derive(Debug, Default)]
struct LedgerEntry {
    total: AtomicU64,
    suppressed: AtomicU64,
    last_report_ms: AtomicU64,
    last_occurrence_ms: AtomicU64,
    interval_ms: AtomicU64,
    last_report_reached: AtomicBool,
}

impl LedgerEntry {
    const NEVER: u64 = u64::MAX;

    fn new() -> Self {
        Self {
            last_report_ms: AtomicU64::new(Self::NEVER),
            last_occurrence_ms: AtomicU64::new(Self::NEVER),
            ..Default::default()
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Classification {
    Warning,
    Error,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Verdict {
    Logged { classification: Classification, suppressed: u64 },
    Suppressed,
}

/// C5: per-kind counters, exponentially-smoothed inter-arrival interval,
/// rate-threshold classification, log suppression, and the state-walk that
/// drives recovery. The EWMA/threshold math is fully prescriptive in spec
/// §4.5; the log emission style (`tracing` fields `kind`/`site`/`rate`/
/// suppressed count) follows the teacher's structured-field logging
/// convention.
pub struct ErrorLedger {
    entries: [LedgerEntry; ErrorKind::COUNT],
    decay_half_life: Duration,
    decay_min_alpha: u64,
    min_report_interval: Duration,
    thresholds_hz: [f64; ErrorKind::COUNT],
    epoch: Instant,
}

impl ErrorLedger {
    #[must_use]
    pub fn new(decay_half_life: Duration, min_report_interval: Duration) -> Self {
        Self {
            entries: std::array::from_fn(|_| LedgerEntry::new()),
            decay_half_life,
            decay_min_alpha: 5,
            min_report_interval,
            thresholds_hz: [1.0; ErrorKind::COUNT],
            epoch: Instant::now(),
        }
    }

    #[must_use]
    pub fn with_threshold_hz(mut self, kind: ErrorKind, hz: f64) -> Self {
        self.thresholds_hz[kind.index()] = hz;
        self
    }

    fn now_ms(&self) -> u64 {
        self.epoch.elapsed().as_millis() as u64
    }

    /// `report(kind, sub_code, site)` (spec §4.5, steps 1-4).
    pub fn report(&self, kind: ErrorKind, sub_code: i32, site: &'static str) -> Verdict {
        let entry = &self.entries[kind.index()];
        let now = self.now_ms();
        entry.total.fetch_add(1, Ordering::Relaxed);

        let last_occurrence = entry.last_occurrence_ms.swap(now, Ordering::SeqCst);
        let half_life_ms = (self.decay_half_life.as_millis() as u64).max(1);
        let prev_interval = entry.interval_ms.load(Ordering::SeqCst);
        let new_interval = if last_occurrence == LedgerEntry::NEVER {
            half_life_ms
        } else {
            let delta = now.saturating_sub(last_occurrence);
            let alpha = ((50 * delta) / half_life_ms).clamp(self.decay_min_alpha, 100);
            (((100 - alpha) * prev_interval + alpha * delta) / 100).max(1)
        };
        entry.interval_ms.store(new_interval, Ordering::SeqCst);
        let rate_hz = 1000.0 / new_interval as f64;

        let threshold_hz = self.thresholds_hz[kind.index()];
        let reaches_error = rate_hz >= threshold_hz;
        let was_error = entry.last_report_reached.load(Ordering::SeqCst);
        let crossing_upward = reaches_error && !was_error;

        let last_report = entry.last_report_ms.load(Ordering::SeqCst);
        let quiet = last_report != LedgerEntry::NEVER
            && now.saturating_sub(last_report) < self.min_report_interval.as_millis() as u64;

        if quiet && !crossing_upward {
            entry.suppressed.fetch_add(1, Ordering::SeqCst);
            return Verdict::Suppressed;
        }

        let suppressed = entry.suppressed.swap(0, Ordering::SeqCst);
        entry.last_report_ms.store(now, Ordering::SeqCst);
        entry.last_report_reached.store(reaches_error, Ordering::SeqCst);

        let classification = if reaches_error { Classification::Error } else { Classification::Warning };
        match classification {
            Classification::Error => {
                tracing::error!(?kind, site, sub_code, rate_hz, suppressed, "symspi error rate reached threshold");
            }
            Classification::Warning => {
                tracing::warn!(?kind, site, sub_code, rate_hz, suppressed, "symspi error");
            }
        }
        Verdict::Logged { classification, suppressed }
    }

    /// `handle(kind, sub_code)` (spec §4.5, steps 1-3). `site` is threaded
    /// through to `report` for the log line; `bump_info` records the kind
    /// against `Dev`'s named info counters (spec §4.10); `enqueue_recover`
    /// is the deferred-work enqueue for the `recover` callable.
    pub fn handle(
        &self,
        kind: ErrorKind,
        sub_code: i32,
        site: &'static str,
        state: &StateController,
        last_error: &LastError,
        bump_info: impl FnOnce(),
        mut enqueue_recover: impl FnMut(),
    ) {
        bump_info();
        self.report(kind, sub_code, site);

        loop {
            let current = state.load();
            match current {
                State::Cold | State::Error => return,
                State::Xfer => {
                    last_error.set(kind);
                    if state.load() == State::Postprocessing && state.switch_strict(State::Postprocessing, State::Error) {
                        enqueue_recover();
                    }
                    return;
                }
                State::Idle | State::XferPrepare | State::WaitingPrev | State::WaitingRdy | State::Postprocessing => {
                    if state.switch_strict(current, State::Error) {
                        last_error.set(kind);
                        enqueue_recover();
                        return;
                    }
                    // Observed state changed underneath us; re-read and retry.
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU32;
    use std::sync::Arc;

    #[test]
    fn first_report_always_logs() {
        let ledger = ErrorLedger::new(Duration::from_secs(2), Duration::from_secs(10));
        let verdict = ledger.report(ErrorKind::OtherSide, 0, "test");
        assert!(matches!(verdict, Verdict::Logged { .. }));
    }

    #[test]
    fn rapid_repeats_are_suppressed_below_threshold_crossing() {
        let ledger = ErrorLedger::new(Duration::from_secs(2), Duration::from_secs(10)).with_threshold_hz(ErrorKind::OtherSide, 1000.0);
        let _unused = ledger.report(ErrorKind::OtherSide, 0, "test");
        let verdict = ledger.report(ErrorKind::OtherSide, 0, "test");
        assert_eq!(verdict, Verdict::Suppressed);
    }

    #[test]
    fn handle_from_idle_moves_to_error_and_enqueues_recovery() {
        let ledger = ErrorLedger::new(Duration::from_secs(2), Duration::from_secs(10));
        let state = StateController::new();
        state.switch_forced(State::Idle);
        let last_error = LastError::new();
        let recovered = Arc::new(AtomicU32::new(0));
        let r = Arc::clone(&recovered);
        ledger.handle(ErrorKind::WaitOtherSide, 0, "test", &state, &last_error, || {}, || {
            r.fetch_add(1, Ordering::SeqCst);
        });
        assert_eq!(state.load(), State::Error);
        assert_eq!(last_error.get(), Some(ErrorKind::WaitOtherSide));
        assert_eq!(recovered.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn handle_is_a_no_op_in_cold_and_error() {
        let ledger = ErrorLedger::new(Duration::from_secs(2), Duration::from_secs(10));
        let state = StateController::new();
        let last_error = LastError::new();
        ledger.handle(ErrorKind::Logical, 0, "test", &state, &last_error, || {}, || {
            panic!("must not enqueue recovery from Cold");
        });
        assert_eq!(state.load(), State::Cold);
        assert_eq!(last_error.get(), None);
    }

    #[test]
    fn handle_from_xfer_defers_until_postprocessing() {
        let ledger = ErrorLedger::new(Duration::from_secs(2), Duration::from_secs(10));
        let state = StateController::new();
        state.switch_forced(State::Xfer);
        let last_error = LastError::new();
        let recovered = Arc::new(AtomicU32::new(0));
        let r = Arc::clone(&recovered);
        ledger.handle(ErrorKind::OtherSide, 0, "test", &state, &last_error, || {}, || {
            r.fetch_add(1, Ordering::SeqCst);
        });
        // Still Xfer: the bus-completion callback owns the handoff.
        assert_eq!(state.load(), State::Xfer);
        assert_eq!(last_error.get(), Some(ErrorKind::OtherSide));
        assert_eq!(recovered.load(Ordering::SeqCst), 0);
    }
}
