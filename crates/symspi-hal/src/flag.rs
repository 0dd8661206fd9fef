use thiserror::Error;

/// Which edges an interrupt subscription should fire on.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct EdgeMask {
    pub rising: bool,
    pub falling: bool,
}

impl EdgeMask {
    pub const FALLING_ONLY: Self = Self { rising: false, falling: true };
    pub const BOTH: Self = Self { rising: true, falling: true };
}

#[derive(Error, Debug, Clone, Copy)]
pub enum FlagError {
    #[error("could not acquire the edge interrupt")]
    IrqAcquisition,
    #[error("interrupt handler setup failed")]
    IsrSetup,
}

/// A handle whose `Drop` releases the subscription (spec §1: "release").
/// Implementors must make `Drop` safe to call from the sleep-capable
/// domain only — the core never drops one from interrupt context.
pub trait InterruptSubscription: Send {}

/// The signal-line driver named in spec §1: "set level, read level,
/// register an edge-triggered interrupt handler, release". Out of scope
/// for the core; specified here only by the interface it consumes.
///
/// `handler` is invoked from the interrupt domain (spec §5): it must not
/// block, allocate with waiting, or acquire a contended lock.
pub trait SignalLine: Send + Sync {
    fn set_level(&self, high: bool);
    fn read_level(&self) -> bool;
    fn subscribe(
        &self,
        edges: EdgeMask,
        handler: Box<dyn Fn() + Send + Sync>,
    ) -> Result<Box<dyn InterruptSubscription>, FlagError>;
}
