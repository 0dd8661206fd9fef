use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::{Condvar, Mutex};
use std::time::{Duration, Instant};

/// Transport states (spec §3). Exactly one value at any time; transitions
/// only via [`StateController::switch_strict`] or
/// [`StateController::switch_forced`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum State {
    Cold = 0,
    Idle = 1,
    XferPrepare = 2,
    WaitingPrev = 3,
    WaitingRdy = 4,
    Xfer = 5,
    Postprocessing = 6,
    Error = 7,
}

impl State {
    const fn from_u8(v: u8) -> Self {
        match v {
            0 => Self::Cold,
            1 => Self::Idle,
            2 => Self::XferPrepare,
            3 => Self::WaitingPrev,
            4 => Self::WaitingRdy,
            5 => Self::Xfer,
            6 => Self::Postprocessing,
            _ => Self::Error,
        }
    }

    /// Our flag is asserted in these states (spec §8 universal invariant);
    /// `Error` is excluded because there it follows the pulse train instead.
    #[must_use]
    pub const fn our_flag_asserted(self) -> bool {
        matches!(
            self,
            Self::XferPrepare | Self::WaitingPrev | Self::WaitingRdy | Self::Xfer | Self::Postprocessing
        )
    }
}

/// The state word (C6): a single `AtomicU8` that is the sole serialization
/// point across interrupt, timer, bus-callback, and consumer-thread
/// contexts (spec §5, §9 "Atomic state over locks"). Same CAS technique as
/// `symspi_sync::Seqlock`'s version counter, narrowed to the eight-state
/// enum spec §3 defines.
pub struct StateController {
    state: AtomicU8,
    closing: AtomicBool,
    leave_xfer: Mutex<bool>,
    leave_xfer_cv: Condvar,
}

impl StateController {
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: AtomicU8::new(State::Cold as u8),
            closing: AtomicBool::new(false),
            leave_xfer: Mutex::new(false),
            leave_xfer_cv: Condvar::new(),
        }
    }

    #[must_use]
    pub fn load(&self) -> State {
        State::from_u8(self.state.load(Ordering::SeqCst))
    }

    #[must_use]
    pub fn is_closing(&self) -> bool {
        self.closing.load(Ordering::SeqCst)
    }

    /// `switch_strict` (spec §4.6): CAS `from -> to`. While the closing
    /// latch is set, the only transition that may still succeed is leaving
    /// `Xfer` for any non-`Xfer` state; every other attempt fails even if
    /// the bare CAS would have succeeded, and a successful Xfer-leaving
    /// transition fires the one-shot completion signal `close` waits on.
    pub fn switch_strict(&self, from: State, to: State) -> bool {
        if self.closing.load(Ordering::SeqCst) && !(from == State::Xfer && to != State::Xfer) {
            return false;
        }
        let ok = self
            .state
            .compare_exchange(from as u8, to as u8, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok();
        if ok {
            tracing::debug!(?from, ?to, "state transition");
            if from == State::Xfer && to != State::Xfer && self.closing.load(Ordering::SeqCst) {
                self.signal_leave_xfer();
            }
        }
        ok
    }

    /// `switch_forced` (spec §4.6): unconditional exchange, used only
    /// during construction and teardown. Returns the previous state.
    pub fn switch_forced(&self, to: State) -> State {
        let prev = State::from_u8(self.state.swap(to as u8, Ordering::SeqCst));
        tracing::debug!(?prev, ?to, "forced state transition");
        prev
    }

    /// Idempotent: returns `true` the first time it is called, `false` on
    /// every subsequent call (used by `close`'s `AlreadyClosing` check).
    pub fn begin_closing(&self) -> bool {
        self.closing
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }

    pub fn end_closing(&self) {
        self.closing.store(false, Ordering::SeqCst);
        *self.leave_xfer.lock().unwrap() = false;
    }

    fn signal_leave_xfer(&self) {
        *self.leave_xfer.lock().unwrap() = true;
        self.leave_xfer_cv.notify_all();
    }

    /// Blocks up to `timeout` for a leave-`Xfer` transition to fire the
    /// completion signal (spec §4.8 `close`, "wait up to a bounded timeout
    /// on the leave-Xfer completion signal"). Returns `true` if the signal
    /// fired, `false` on timeout.
    #[must_use]
    pub fn wait_leave_xfer(&self, timeout: Duration) -> bool {
        let guard = self.leave_xfer.lock().unwrap();
        if *guard {
            return true;
        }
        let deadline = Instant::now() + timeout;
        let (guard, _) = self
            .leave_xfer_cv
            .wait_timeout_while(guard, timeout, |fired| {
                !*fired && Instant::now() < deadline
            })
            .unwrap();
        *guard
    }
}

impl Default for StateController {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn strict_switch_respects_cas() {
        let sc = StateController::new();
        assert!(sc.switch_strict(State::Cold, State::Idle));
        assert_eq!(sc.load(), State::Idle);
        assert!(!sc.switch_strict(State::Cold, State::Idle));
    }

    #[test]
    fn forced_switch_always_succeeds() {
        let sc = StateController::new();
        sc.switch_strict(State::Cold, State::Idle);
        let prev = sc.switch_forced(State::Cold);
        assert_eq!(prev, State::Idle);
        assert_eq!(sc.load(), State::Cold);
    }

    #[test]
    fn closing_blocks_all_but_leave_xfer() {
        let sc = StateController::new();
        sc.switch_forced(State::Xfer);
        assert!(sc.begin_closing());
        assert!(!sc.switch_strict(State::Xfer, State::Xfer));
        assert!(!sc.switch_strict(State::Idle, State::XferPrepare));
        assert!(sc.switch_strict(State::Xfer, State::Postprocessing));
    }

    #[test]
    fn begin_closing_is_idempotent() {
        let sc = StateController::new();
        assert!(sc.begin_closing());
        assert!(!sc.begin_closing());
    }

    #[test]
    fn leave_xfer_signal_wakes_waiter() {
        let sc = Arc::new(StateController::new());
        sc.switch_forced(State::Xfer);
        sc.begin_closing();
        let sc2 = Arc::clone(&sc);
        let handle = thread::spawn(move || sc2.wait_leave_xfer(Duration::from_millis(500)));
        thread::sleep(Duration::from_millis(20));
        assert!(sc.switch_strict(State::Xfer, State::Idle));
        assert!(handle.join().unwrap());
    }

    #[test]
    fn wait_leave_xfer_times_out() {
        let sc = StateController::new();
        sc.switch_forced(State::Xfer);
        sc.begin_closing();
        let fired = sc.wait_leave_xfer(Duration::from_millis(20));
        assert!(!fired);
    }
}
