//! Trait boundary between the symspi transport core (`symspi-core`) and
//! the hardware/runtime collaborators spec §1 places out of scope: the
//! bus driver, the signal-line driver, and the deferred-work runner.

mod bus;
mod deferred;
mod flag;
mod role;

pub use bus::{BusChannel, BusCompletion, NativeDescriptor, NativeDescriptorConfigurer, SubmitError};
pub use deferred::{DeferredJob, DeferredRunner, RunnerInitError};
pub use flag::{EdgeMask, FlagError, InterruptSubscription, SignalLine};
pub use role::{Polarity, Role};
