//! In-process loopback implementation of `symspi_hal`'s traits: a shared
//! flag-line pair, a bus channel that performs the symmetric full-duplex
//! copy once both sides submit, and a single-threaded deferred-work
//! runner. Used by integration tests and `symspi-diag`'s demo mode; not
//! part of the transport core (spec §1 names the bus/flag/runner
//! backings "out of scope").

mod bus;
mod flag;
mod pair;
mod runner;

pub use bus::SimBusChannel;
pub use flag::SimFlagLine;
pub use pair::{zero_template, SimPair};
pub use runner::SimRunner;
