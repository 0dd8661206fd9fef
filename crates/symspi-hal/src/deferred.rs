use thiserror::Error;

/// The three callables the core ever schedules on the deferred-work runner
/// (spec §4.3). At most one instance of each is running at any moment;
/// the runner is single-threaded so this falls out of FIFO execution on
/// one worker rather than needing per-job locking.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum DeferredJob {
    DoXferNow,
    Postprocess,
    Recover,
}

#[derive(Error, Debug, Clone, Copy)]
#[error("deferred-work runner failed to initialize")]
pub struct RunnerInitError;

/// The deferred-work runner named in spec §1/§4.3: "enqueue a callable for
/// later execution on a sleep-capable thread". Out of scope for the core;
/// specified here only by the interface it consumes. Backing
/// implementation must be single-threaded and high-priority (spec §4.3) so
/// operations that may sleep never run in interrupt or bus-callback
/// context (spec §5).
pub trait DeferredRunner: Send + Sync {
    /// Enqueue `task` to run under `job`'s identity. Must not block the
    /// caller past enqueueing.
    fn enqueue(&self, job: DeferredJob, task: Box<dyn FnOnce() + Send>);

    /// Cancel any pending or in-flight instance of `job` and block until
    /// it is guaranteed not to be running. Only ever called from a
    /// sleep-capable context (spec §4.2, §4.3).
    fn cancel_sync(&self, job: DeferredJob);
}
