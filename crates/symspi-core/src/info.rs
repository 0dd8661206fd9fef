use std::sync::atomic::{AtomicU64, Ordering};

/// The "info counters" named in spec §3 ("Core device") and read out by
/// C10: best-effort statistics, not part of the state-word serialization
/// (spec §5 groups them with buffers/ledger entries as fields the current
/// state owner, or the interrupt/timer domain for these four specifically,
/// may mutate).
#[derive(Debug, Default)]
pub struct InfoCounters {
    pub other_side_indicated_errors: AtomicU64,
    pub other_side_no_reaction_errors: AtomicU64,
    pub bus_xfers_done_ok: AtomicU64,
    pub peer_flag_edges_observed: AtomicU64,
}

/// Plain-data snapshot of [`InfoCounters`] for diagnostics readout.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct InfoSnapshot {
    pub other_side_indicated_errors: u64,
    pub other_side_no_reaction_errors: u64,
    pub bus_xfers_done_ok: u64,
    pub peer_flag_edges_observed: u64,
}

impl InfoCounters {
    #[must_use]
    pub fn snapshot(&self) -> InfoSnapshot {
        InfoSnapshot {
            other_side_indicated_errors: self.other_side_indicated_errors.load(Ordering::Relaxed),
            other_side_no_reaction_errors: self.other_side_no_reaction_errors.load(Ordering::Relaxed),
            bus_xfers_done_ok: self.bus_xfers_done_ok.load(Ordering::Relaxed),
            peer_flag_edges_observed: self.peer_flag_edges_observed.load(Ordering::Relaxed),
        }
    }
}
