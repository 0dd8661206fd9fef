use std::sync::atomic::{AtomicBool, AtomicI32, AtomicU32, AtomicU8, Ordering};
use std::sync::{Arc, Mutex, OnceLock, Weak};
use std::time::Duration;

use rand::Rng;
use symspi_hal::{
    BusChannel, DeferredJob, DeferredRunner, EdgeMask, FlagError, InterruptSubscription,
    NativeDescriptor, NativeDescriptorConfigurer, SignalLine, SubmitError,
};

use crate::config::{Config, RunnerMode};
use crate::error::{ErrorKind, LastError, SymspiError};
use crate::error_ledger::ErrorLedger;
use crate::info::{InfoCounters, InfoSnapshot};
use crate::state::{State, StateController};
use crate::xfer::{buffers, AcceptCallback, DoneOutcome, FailOutcome, Xfer, XferTemplate};

/// Ordered cleanup milestones (spec §3 "the init-level marker"): `close`
/// unwinds only what `init` actually reached, so a partial init (one that
/// failed partway and is being rolled back) does not try to tear down
/// resources it never built.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
enum InitLevel {
    Cold = 0,
    XferAllocated = 1,
    RunnerConstructed = 2,
    IrqRegistered = 3,
    TimerStarted = 4,
    Ready = 5,
}

type RunnerFactory =
    dyn Fn(RunnerMode) -> Result<Box<dyn DeferredRunner>, symspi_hal::RunnerInitError> + Send + Sync;

/// The core device (spec §3 "Core device"). Bus channel, flag-line handles,
/// and the native-descriptor configure hook are supplied once at
/// construction and persist across `init`/`close` cycles; everything else
/// is "private state" allocated in `init` and torn down in `close`.
///
/// Built as `Arc<Dev>` because the interrupt handler, the timer-expiry
/// callback, and every deferred-work closure all need to call back into
/// `Dev` from a different thread than the one that registered them; each
/// holds only a [`Weak`] reference so `close`'s teardown is never blocked
/// by a cycle keeping `Dev` alive.
pub struct Dev {
    config: Config,
    bus: Option<Arc<dyn BusChannel>>,
    our_flag: Option<Arc<dyn SignalLine>>,
    peer_flag: Option<Arc<dyn SignalLine>>,
    configurer: Option<Arc<dyn NativeDescriptorConfigurer>>,
    runner_factory: Box<RunnerFactory>,

    runner: Mutex<Option<Box<dyn DeferredRunner>>>,
    irq: Mutex<Option<Box<dyn InterruptSubscription>>>,
    timer: Mutex<Option<crate::timer::Timer>>,
    current: Mutex<Option<Xfer>>,
    native: Mutex<NativeDescriptor>,

    next_xfer_id: AtomicU32,
    drop_counter: AtomicI32,
    pending_request: AtomicBool,
    init_level: AtomicU8,

    state: StateController,
    ledger: ErrorLedger,
    last_error: LastError,
    info: InfoCounters,

    self_weak: OnceLock<Weak<Dev>>,
}

impl Dev {
    #[must_use]
    pub fn new(
        config: Config,
        bus: Option<Arc<dyn BusChannel>>,
        our_flag: Option<Arc<dyn SignalLine>>,
        peer_flag: Option<Arc<dyn SignalLine>>,
        configurer: Option<Arc<dyn NativeDescriptorConfigurer>>,
        runner_factory: Box<RunnerFactory>,
    ) -> Arc<Self> {
        let ledger = ErrorLedger::new(config.error_decay_half_life, config.min_report_interval);
        let dev = Arc::new(Self {
            config,
            bus,
            our_flag,
            peer_flag,
            configurer,
            runner_factory,
            runner: Mutex::new(None),
            irq: Mutex::new(None),
            timer: Mutex::new(None),
            current: Mutex::new(None),
            native: Mutex::new(NativeDescriptor::default()),
            next_xfer_id: AtomicU32::new(1),
            drop_counter: AtomicI32::new(0),
            pending_request: AtomicBool::new(false),
            init_level: AtomicU8::new(InitLevel::Cold as u8),
            state: StateController::new(),
            ledger,
            last_error: LastError::new(),
            info: InfoCounters::default(),
            self_weak: OnceLock::new(),
        });
        let _unused = dev.self_weak.set(Arc::downgrade(&dev));
        dev
    }

    fn weak_self(&self) -> Weak<Dev> {
        self.self_weak.get().cloned().unwrap_or_default()
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        self.state.load() != State::Cold
    }

    #[must_use]
    pub fn state(&self) -> State {
        self.state.load()
    }

    #[must_use]
    pub fn last_error(&self) -> Option<ErrorKind> {
        self.last_error.get()
    }

    #[must_use]
    pub fn info_snapshot(&self) -> InfoSnapshot {
        self.info.snapshot()
    }

    #[must_use]
    pub fn config(&self) -> Config {
        self.config
    }

    /// Size in bytes of the currently-installed descriptor, if any (spec
    /// §4.10's "max single burst" diagnostic stat).
    #[must_use]
    pub fn current_size(&self) -> Option<usize> {
        self.current.lock().unwrap().as_ref().map(|x| x.size)
    }

    // ------------------------------------------------------------------
    // C8 Request API
    // ------------------------------------------------------------------

    /// `init(default_xfer)` (spec §4.8). Single-threaded with no other
    /// calls in flight, as the spec requires.
    pub fn init(self: &Arc<Self>, default_xfer: XferTemplate) -> Result<(), SymspiError> {
        if self.state.load() != State::Cold {
            return Err(SymspiError::NotReady);
        }
        if self.bus.is_none() {
            return Err(SymspiError::NoBus);
        }
        let our_flag = self.our_flag.clone().ok_or(SymspiError::NoSignalLine)?;
        let peer_flag = self.peer_flag.clone().ok_or(SymspiError::NoSignalLine)?;

        match Xfer::from_template(0, default_xfer) {
            Ok(xfer) => *self.current.lock().unwrap() = Some(xfer),
            Err(e) => return Err(e),
        }
        self.init_level.store(InitLevel::XferAllocated as u8, Ordering::SeqCst);

        let runner = match (self.runner_factory)(self.config.runner_mode) {
            Ok(r) => r,
            Err(_unused) => {
                self.teardown_partial_init(InitLevel::XferAllocated);
                return Err(SymspiError::RunnerInit);
            }
        };
        *self.runner.lock().unwrap() = Some(runner);
        self.init_level.store(InitLevel::RunnerConstructed as u8, Ordering::SeqCst);

        our_flag.set_level(self.config.polarity.level_for_asserted(false));

        let edges = if self.config.hardware_ready { EdgeMask::FALLING_ONLY } else { EdgeMask::BOTH };
        let weak = self.weak_self();
        let sub = peer_flag.subscribe(
            edges,
            Box::new(move || {
                if let Some(dev) = weak.upgrade() {
                    dev.on_peer_edge();
                }
            }),
        );
        let sub = match sub {
            Ok(s) => s,
            Err(FlagError::IrqAcquisition) => {
                self.teardown_partial_init(InitLevel::RunnerConstructed);
                return Err(SymspiError::IrqAcquisition);
            }
            Err(FlagError::IsrSetup) => {
                self.teardown_partial_init(InitLevel::RunnerConstructed);
                return Err(SymspiError::IsrSetup);
            }
        };
        *self.irq.lock().unwrap() = Some(sub);
        self.init_level.store(InitLevel::IrqRegistered as u8, Ordering::SeqCst);

        let weak = self.weak_self();
        let timer = crate::timer::Timer::start(move || {
            if let Some(dev) = weak.upgrade() {
                dev.on_timer_expiry();
            }
        });
        *self.timer.lock().unwrap() = Some(timer);
        self.init_level.store(InitLevel::TimerStarted as u8, Ordering::SeqCst);

        self.drop_counter.store(1, Ordering::SeqCst);
        self.next_xfer_id.store(1, Ordering::SeqCst);
        self.pending_request.store(false, Ordering::SeqCst);
        self.last_error.clear();
        self.state.end_closing();
        self.state.switch_forced(State::Idle);
        self.init_level.store(InitLevel::Ready as u8, Ordering::SeqCst);

        if self.peer_asserted() {
            let _unused = self.exchange(None, false);
        }
        Ok(())
    }

    /// `close()` (spec §4.8).
    pub fn close(self: &Arc<Self>) -> Result<(), SymspiError> {
        if !self.state.begin_closing() {
            return Err(SymspiError::AlreadyClosing);
        }
        if self.state.load() == State::Xfer && !self.state.wait_leave_xfer(self.config.close_wait_timeout) {
            tracing::warn!("close timed out waiting to leave Xfer, proceeding with teardown anyway");
        }
        self.teardown_irq_and_timer(InitLevel::Ready);
        self.state.switch_forced(State::Cold);
        self.teardown_runner_and_buffers(InitLevel::Ready);
        self.state.end_closing();
        Ok(())
    }

    /// `reset(default_xfer?)` (spec §4.8): preserve the current descriptor
    /// template when the caller passes `None`, otherwise use the provided
    /// one, then `close` followed by `init`.
    pub fn reset(self: &Arc<Self>, default_xfer: Option<XferTemplate>) -> Result<(), SymspiError> {
        let template = match default_xfer {
            Some(t) => t,
            None => {
                let preserved = self.current.lock().unwrap().take();
                let preserved = preserved.ok_or(SymspiError::NoXfer)?;
                XferTemplate {
                    tx: preserved.tx,
                    done: preserved.done,
                    fail: preserved.fail,
                    accept: preserved.accept,
                    handle: preserved.handle,
                }
            }
        };
        match self.close() {
            Ok(()) | Err(SymspiError::AlreadyClosing) => {}
            Err(e) => return Err(e),
        }
        self.init(template)
    }

    /// `exchange(new_xfer?, force_size_change)` (spec §4.8).
    pub fn exchange(self: &Arc<Self>, new_xfer: Option<XferTemplate>, force_size_change: bool) -> Result<u32, SymspiError> {
        if self.state.is_closing() {
            return Err(SymspiError::NotReady);
        }
        if !self.state.switch_strict(State::Idle, State::XferPrepare) {
            if new_xfer.is_none() {
                self.pending_request.store(true, Ordering::SeqCst);
            }
            return Err(SymspiError::NotReady);
        }
        if let Some(template) = new_xfer {
            if let Err(e) = self.replace_xfer(template, force_size_change) {
                self.state.switch_strict(State::XferPrepare, State::Idle);
                return Err(e);
            }
        }
        let id = self.next_id();
        {
            let mut current = self.current.lock().unwrap();
            if let Some(xfer) = current.as_mut() {
                xfer.id = id;
                xfer.completed_count = 0;
            }
        }
        self.drive_xfer_prepare();
        Ok(id)
    }

    /// `update_default(new_xfer, force_size_change)` (spec §4.8).
    pub fn update_default(self: &Arc<Self>, new_xfer: XferTemplate, force_size_change: bool) -> Result<(), SymspiError> {
        if self.state.is_closing() {
            return Err(SymspiError::NotReady);
        }
        if !self.state.switch_strict(State::Idle, State::XferPrepare) {
            return Err(SymspiError::NotReady);
        }
        let result = self.replace_xfer(new_xfer, force_size_change);
        self.state.switch_strict(State::XferPrepare, State::Idle);
        result
    }

    fn replace_xfer(&self, template: XferTemplate, force_size_change: bool) -> Result<(), SymspiError> {
        let mut current = self.current.lock().unwrap();
        let current_size = current.as_ref().map(|x| x.size);
        buffers::validate_replace(current_size, template.tx.len(), self.state.load(), force_size_change)?;
        let id = current.as_ref().map_or(0, |x| x.id);
        let xfer = Xfer::from_template(id, template)?;
        *current = Some(xfer);
        Ok(())
    }

    /// First half of teardown (spec §4.8 `close`: "unregister interrupt,
    /// deassert our flag, cancel-and-wait timeout" — all of which happen
    /// *before* state is forced to `Cold`).
    fn teardown_irq_and_timer(&self, reached: InitLevel) {
        if reached >= InitLevel::IrqRegistered {
            self.irq.lock().unwrap().take();
        }
        self.deassert_our_flag();
        if reached >= InitLevel::TimerStarted {
            if let Some(timer) = self.timer.lock().unwrap().take() {
                timer.cancel_and_wait();
            }
        }
    }

    /// Second half (spec §4.8 `close`: "cancel-and-wait all deferred work,
    /// destroy runner, free buffers, destroy private state" — all of which
    /// happen *after* state is forced to `Cold`).
    fn teardown_runner_and_buffers(&self, reached: InitLevel) {
        if reached >= InitLevel::RunnerConstructed {
            if let Some(runner) = self.runner.lock().unwrap().take() {
                runner.cancel_sync(DeferredJob::DoXferNow);
                runner.cancel_sync(DeferredJob::Postprocess);
                runner.cancel_sync(DeferredJob::Recover);
            }
        }
        self.current.lock().unwrap().take();
        *self.native.lock().unwrap() = NativeDescriptor::default();
        self.init_level.store(InitLevel::Cold as u8, Ordering::SeqCst);
    }

    /// Unwind a partially-completed `init` (state never left `Cold`, so
    /// ordering relative to the state word does not matter here).
    fn teardown_partial_init(&self, reached: InitLevel) {
        self.teardown_irq_and_timer(reached);
        self.teardown_runner_and_buffers(reached);
    }

    // ------------------------------------------------------------------
    // C7 Handshake protocol engine
    // ------------------------------------------------------------------

    fn drive_xfer_prepare(self: &Arc<Self>) {
        self.assert_our_flag();
        if !self.state.switch_strict(State::XferPrepare, State::WaitingPrev) {
            return;
        }
        if let Some(timer) = self.timer.lock().unwrap().as_ref() {
            timer.arm(self.config.peer_wait_timeout);
        }
        self.try_leave_waiting_prev();
    }

    fn try_leave_waiting_prev(self: &Arc<Self>) {
        let dc = self.drop_counter.load(Ordering::SeqCst);
        let ready = dc == 1 || self.config.role.is_slave();
        if !ready {
            return;
        }
        if self.config.role.is_slave() || (self.config.role.is_master() && self.config.hardware_ready) {
            if self.state.switch_strict(State::WaitingPrev, State::Xfer) {
                if let Some(timer) = self.timer.lock().unwrap().as_ref() {
                    timer.cancel();
                }
                self.submit_bus_transfer();
            }
        } else if self.state.switch_strict(State::WaitingPrev, State::WaitingRdy) {
            if let Some(timer) = self.timer.lock().unwrap().as_ref() {
                timer.arm(self.config.peer_wait_timeout);
            }
            if self.peer_asserted() && self.state.switch_strict(State::WaitingRdy, State::Xfer) {
                if let Some(timer) = self.timer.lock().unwrap().as_ref() {
                    timer.cancel();
                }
                self.submit_bus_transfer();
            }
        }
    }

    fn submit_bus_transfer(self: &Arc<Self>) {
        self.drop_counter.store(0, Ordering::SeqCst);
        let Some(bus) = self.bus.clone() else {
            self.raise(ErrorKind::Logical, 0, "submit:no-bus");
            return;
        };
        let mut current = self.current.lock().unwrap();
        let Some(xfer) = current.as_mut() else {
            drop(current);
            self.raise(ErrorKind::Logical, 0, "submit:no-xfer");
            return;
        };
        let mut native = self.native.lock().unwrap();
        xfer.update_native_descriptor(&mut native, self.configurer.as_deref().map(|c| c as &dyn NativeDescriptorConfigurer));
        let weak = self.weak_self();
        let result = bus.submit(
            &native,
            Box::new(move |completion| {
                if let Some(dev) = weak.upgrade() {
                    dev.on_bus_complete(completion);
                }
            }),
        );
        drop(native);
        drop(current);
        if let Err(SubmitError(code)) = result {
            self.raise(ErrorKind::BusLayer, code, "submit");
        }
    }

    fn on_bus_complete(self: &Arc<Self>, completion: symspi_hal::BusCompletion) {
        if !self.state.switch_strict(State::Xfer, State::Postprocessing) {
            self.raise(ErrorKind::Logical, 0, "completion:cas-failed");
            return;
        }
        if let Some(kind) = self.last_error.get() {
            self.raise(kind, 0, "completion:deferred-error");
            return;
        }
        if completion.status != 0 {
            self.raise(ErrorKind::BusLayer, completion.status, "completion:native-status");
            return;
        }
        self.enqueue_postprocess();
    }

    fn postprocess(self: &Arc<Self>) {
        symspi_utils::safe_assert_eq!(self.state.load(), State::Postprocessing);
        self.info.bus_xfers_done_ok.fetch_add(1, Ordering::Relaxed);

        let next_id = self.peek_next_id();
        let mut start_immediately = false;
        let outcome = {
            let mut current = self.current.lock().unwrap();
            let Some(xfer) = current.as_mut() else {
                symspi_utils::safe_panic!("Postprocessing entered with no current xfer");
            };
            xfer.bump_completed();
            xfer.done.clone().map(|done| done(xfer, next_id, &mut start_immediately, xfer.handle))
        };

        match outcome {
            Some(DoneOutcome::Halt) => return,
            Some(DoneOutcome::Replace(template)) => self.apply_postprocess_replacement(template),
            Some(DoneOutcome::Reuse) | None => {}
        }

        if start_immediately {
            self.pending_request.store(true, Ordering::SeqCst);
        }
        self.deassert_our_flag();
        self.sleep_flag_silence();
        self.return_to_idle();
    }

    fn apply_postprocess_replacement(&self, template: XferTemplate) {
        let old = self.current.lock().unwrap().take();
        match self.replace_xfer(template, true) {
            Ok(()) => {
                if let Some(old_xfer) = old {
                    invoke_accept(old_xfer);
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "replacement descriptor rejected in postprocess, resuming with previous");
                if let Some(old_xfer) = old {
                    *self.current.lock().unwrap() = Some(old_xfer);
                }
            }
        }
    }

    fn return_to_idle(self: &Arc<Self>) {
        if let Some(timer) = self.timer.lock().unwrap().as_ref() {
            timer.cancel_and_wait();
        }
        let from = self.state.load();
        if !self.state.switch_strict(from, State::Idle) {
            return;
        }
        self.maybe_retrigger();
    }

    fn maybe_retrigger(self: &Arc<Self>) {
        let pending = self.pending_request.swap(false, Ordering::SeqCst);
        let peer_initiated = self.peer_asserted() && self.drop_counter.load(Ordering::SeqCst) == 1;
        if (pending || peer_initiated) && self.state.switch_strict(State::Idle, State::XferPrepare) {
            self.drive_xfer_prepare();
        }
    }

    /// `recover` (spec §4.7 "Error-recovery pulse train"), run as the
    /// `Recover` deferred-work callable.
    fn recover(self: &Arc<Self>) {
        symspi_utils::safe_assert_eq!(self.state.load(), State::Error);
        if let Some(timer) = self.timer.lock().unwrap().as_ref() {
            timer.cancel_and_wait();
        }
        for asserted in [false, true, false, true, false] {
            self.set_our_flag(asserted);
            self.sleep_flag_silence();
        }
        self.sleep_error_silence();

        let kind = self.last_error.take();
        let next_id = self.peek_next_id();
        let outcome = {
            let mut current = self.current.lock().unwrap();
            match (current.as_mut(), kind) {
                (Some(xfer), Some(kind)) => xfer.fail.clone().map(|fail| fail(xfer, next_id, kind, xfer.handle)),
                _ => None,
            }
        };

        if let Some(FailOutcome::Halt) = outcome {
            self.drop_counter.store(1, Ordering::SeqCst);
            self.last_error.clear();
            return;
        }
        if let Some(FailOutcome::Resume(template)) = outcome {
            if let Err(e) = self.replace_xfer(template, true) {
                tracing::warn!(error = %e, "replacement descriptor rejected during recovery, keeping previous");
            }
        }

        self.drop_counter.store(1, Ordering::SeqCst);
        self.last_error.clear();
        if !self.state.switch_strict(State::Error, State::Idle) {
            return;
        }
        self.maybe_retrigger();
    }

    // ------------------------------------------------------------------
    // C9 Interrupt glue
    // ------------------------------------------------------------------

    fn on_peer_edge(self: &Arc<Self>) {
        if self.peer_asserted() {
            if self.state.switch_strict(State::Idle, State::XferPrepare) {
                self.enqueue_do_xfer_now();
            } else if self.state.load() == State::WaitingRdy
                && self.config.role.is_master()
                && !self.config.hardware_ready
                && self.state.switch_strict(State::WaitingRdy, State::Xfer)
            {
                if let Some(timer) = self.timer.lock().unwrap().as_ref() {
                    timer.cancel();
                }
                self.submit_bus_transfer();
            }
        } else {
            self.info.peer_flag_edges_observed.fetch_add(1, Ordering::Relaxed);
            let new_value = self.drop_counter.fetch_add(1, Ordering::SeqCst) + 1;
            if new_value == 1 && self.config.role.is_master() {
                self.try_leave_waiting_prev();
            } else if new_value >= 2 {
                self.raise(ErrorKind::OtherSide, 0, "interrupt:drop-counter");
            } else if new_value <= 0 {
                self.raise(ErrorKind::Logical, 0, "interrupt:drop-counter");
            }
        }
    }

    fn on_timer_expiry(self: &Arc<Self>) {
        self.raise(ErrorKind::WaitOtherSide, 0, "timer:expiry");
    }

    // ------------------------------------------------------------------
    // Deferred-work enqueue helpers
    // ------------------------------------------------------------------

    fn enqueue_do_xfer_now(self: &Arc<Self>) {
        let weak = self.weak_self();
        if let Some(runner) = self.runner.lock().unwrap().as_ref() {
            runner.enqueue(
                DeferredJob::DoXferNow,
                Box::new(move || {
                    if let Some(dev) = weak.upgrade() {
                        dev.drive_xfer_prepare();
                    }
                }),
            );
        }
    }

    fn enqueue_postprocess(self: &Arc<Self>) {
        let weak = self.weak_self();
        if let Some(runner) = self.runner.lock().unwrap().as_ref() {
            runner.enqueue(
                DeferredJob::Postprocess,
                Box::new(move || {
                    if let Some(dev) = weak.upgrade() {
                        dev.postprocess();
                    }
                }),
            );
        }
    }

    fn raise(self: &Arc<Self>, kind: ErrorKind, sub_code: i32, site: &'static str) {
        let weak = self.weak_self();
        self.ledger.handle(
            kind,
            sub_code,
            site,
            &self.state,
            &self.last_error,
            || self.bump_info(kind),
            || {
                if let Some(runner) = self.runner.lock().unwrap().as_ref() {
                    let weak = weak.clone();
                    runner.enqueue(
                        DeferredJob::Recover,
                        Box::new(move || {
                            if let Some(dev) = weak.upgrade() {
                                dev.recover();
                            }
                        }),
                    );
                }
            },
        );
    }

    fn bump_info(&self, kind: ErrorKind) {
        match kind {
            ErrorKind::OtherSide => {
                self.info.other_side_indicated_errors.fetch_add(1, Ordering::Relaxed);
            }
            ErrorKind::WaitOtherSide => {
                self.info.other_side_no_reaction_errors.fetch_add(1, Ordering::Relaxed);
            }
            ErrorKind::BusLayer | ErrorKind::Logical => {}
        }
    }

    // ------------------------------------------------------------------
    // C1 Flag I/O adapter
    // ------------------------------------------------------------------

    fn assert_our_flag(&self) {
        self.set_our_flag(true);
    }

    fn deassert_our_flag(&self) {
        self.set_our_flag(false);
    }

    fn set_our_flag(&self, asserted: bool) {
        if let Some(flag) = &self.our_flag {
            flag.set_level(self.config.polarity.level_for_asserted(asserted));
        }
    }

    fn peer_asserted(&self) -> bool {
        self.peer_flag.as_ref().is_some_and(|f| self.config.polarity.asserted_level(f.read_level()))
    }

    fn sleep_flag_silence(&self) {
        std::thread::sleep(jitter(self.config.inactive_minimum, 0.10));
    }

    fn sleep_error_silence(&self) {
        std::thread::sleep(jitter(self.config.recovery_silence, 0.05));
    }

    // ------------------------------------------------------------------
    // xfer id sequencing
    // ------------------------------------------------------------------

    fn next_id(&self) -> u32 {
        loop {
            let cur = self.next_xfer_id.load(Ordering::SeqCst);
            let mut advanced = cur.wrapping_add(1);
            if advanced == 0 {
                advanced = 1;
            }
            if self
                .next_xfer_id
                .compare_exchange(cur, advanced, Ordering::SeqCst, Ordering::SeqCst)
                .is_ok()
            {
                return cur;
            }
        }
    }

    fn peek_next_id(&self) -> u32 {
        let v = self.next_xfer_id.load(Ordering::SeqCst);
        if v == 0 {
            1
        } else {
            v
        }
    }
}

fn invoke_accept(xfer: Xfer) {
    if let Some(accept) = xfer.accept.clone() {
        let accept: AcceptCallback = accept;
        accept(xfer);
    }
}

/// ±`frac` jitter around `base` (spec §4.7 "750 µs ±10%" / §6 "10 ms ±5%").
fn jitter(base: Duration, frac: f64) -> Duration {
    let mut rng = rand::rng();
    let factor = (1.0 + rng.random_range(-frac..=frac)).max(0.0);
    Duration::from_secs_f64(base.as_secs_f64() * factor)
}

