//! Symmetric full-duplex bus transport state machine: the handshake
//! protocol engine, request API, interrupt glue, error ledger, timeout
//! timer, and transfer buffer manager. The hardware/runtime collaborators
//! (bus driver, signal-line driver, deferred-work runner) are consumed
//! only through `symspi_hal`'s traits; this crate has no hardware binding
//! of its own.

mod config;
mod dev;
mod error;
mod error_ledger;
mod info;
mod state;
mod timer;
mod xfer;

pub use config::{Config, RunnerMode};
pub use dev::Dev;
pub use error::{ErrorClass, ErrorKind, SymspiError};
pub use error_ledger::{Classification, Verdict};
pub use info::{InfoCounters, InfoSnapshot};
pub use state::State;
pub use xfer::{
    AcceptCallback, ConsumerHandle, DoneCallback, DoneOutcome, FailCallback, FailOutcome, Xfer, XferTemplate,
};
