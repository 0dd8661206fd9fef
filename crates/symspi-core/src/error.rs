use std::sync::atomic::{AtomicU8, Ordering};

use thiserror::Error;

/// Exit/error codes (spec §6), grouped into one `thiserror` enum rather than
/// scattered types, the way the teacher's `QueueError` gathers every queue
/// failure cause behind one `#[error(...)]`-tagged enum.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum SymspiError {
    #[error("device not ready to accept a request")]
    NotReady,
    #[error("no device")]
    NoDevice,
    #[error("no bus channel configured")]
    NoBus,
    #[error("no signal line configured")]
    NoSignalLine,
    #[error("no transfer descriptor")]
    NoXfer,
    #[error("allocation failed")]
    NoMemory,
    #[error("transfer size mismatch")]
    XferSizeMismatch,
    #[error("transfer size is zero")]
    XferSizeZero,
    #[error("tx/rx buffers overlap")]
    Overlap,
    #[error("other side signalled an error")]
    OtherSide,
    #[error("timed out waiting for the other side")]
    WaitOtherSide,
    #[error("bus layer rejected the transfer (code {0})")]
    BusLayer(i32),
    #[error("could not acquire the edge interrupt")]
    IrqAcquisition,
    #[error("interrupt handler setup failed")]
    IsrSetup,
    #[error("deferred-work runner failed to initialize")]
    RunnerInit,
    #[error("internal logic error")]
    Logical,
    #[error("close already in progress")]
    AlreadyClosing,
}

/// Classification from spec §7; drives propagation (direct return vs.
/// ledger/recovery) rather than anything about the wire encoding.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorClass {
    Transient,
    Configuration,
    Input,
    Resource,
    Internal,
}

impl SymspiError {
    #[must_use]
    pub const fn class(self) -> ErrorClass {
        match self {
            Self::OtherSide | Self::WaitOtherSide | Self::BusLayer(_) => ErrorClass::Transient,
            Self::NoDevice
            | Self::NoBus
            | Self::NoSignalLine
            | Self::NoXfer
            | Self::IrqAcquisition
            | Self::IsrSetup
            | Self::RunnerInit => ErrorClass::Configuration,
            Self::XferSizeMismatch | Self::XferSizeZero | Self::Overlap | Self::NotReady | Self::AlreadyClosing => {
                ErrorClass::Input
            }
            Self::NoMemory => ErrorClass::Resource,
            Self::Logical => ErrorClass::Internal,
        }
    }
}

/// The subset of `SymspiError` the error ledger tracks (spec §4.5's
/// `kind`). Only transient and internal kinds ever reach `handle()`; the
/// rest are returned directly to the caller per spec §7 and never touch
/// the ledger.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ErrorKind {
    OtherSide = 0,
    WaitOtherSide = 1,
    BusLayer = 2,
    Logical = 3,
}

impl ErrorKind {
    pub const COUNT: usize = 4;

    #[must_use]
    pub const fn index(self) -> usize {
        self as usize
    }

    #[must_use]
    pub const fn as_error(self, sub_code: i32) -> SymspiError {
        match self {
            Self::OtherSide => SymspiError::OtherSide,
            Self::WaitOtherSide => SymspiError::WaitOtherSide,
            Self::BusLayer => SymspiError::BusLayer(sub_code),
            Self::Logical => SymspiError::Logical,
        }
    }

    const fn from_u8(v: u8) -> Option<Self> {
        match v {
            0 => Some(Self::OtherSide),
            1 => Some(Self::WaitOtherSide),
            2 => Some(Self::BusLayer),
            3 => Some(Self::Logical),
            _ => None,
        }
    }
}

/// `Dev`'s `last_error` field (spec §3 "Core device"): the most recent
/// [`ErrorKind`] observed, mutated only by the interrupt/timer domains and
/// the error ledger (spec §5). Lock-free so it stays legal to write from
/// interrupt context.
#[derive(Debug, Default)]
pub struct LastError(AtomicU8);

impl LastError {
    const NONE: u8 = u8::MAX;

    #[must_use]
    pub const fn new() -> Self {
        Self(AtomicU8::new(Self::NONE))
    }

    #[must_use]
    pub fn get(&self) -> Option<ErrorKind> {
        ErrorKind::from_u8(self.0.load(Ordering::SeqCst))
    }

    pub fn set(&self, kind: ErrorKind) {
        self.0.store(kind as u8, Ordering::SeqCst);
    }

    /// Reads and clears in one step (used by the recovery pulse train,
    /// spec §4.7 "Clears `last_error`").
    pub fn take(&self) -> Option<ErrorKind> {
        ErrorKind::from_u8(self.0.swap(Self::NONE, Ordering::SeqCst))
    }

    pub fn clear(&self) {
        self.0.store(Self::NONE, Ordering::SeqCst);
    }
}
