use std::sync::Arc;

use symspi_hal::NativeDescriptor;

use crate::error::{ErrorKind, SymspiError};

/// Opaque token the consumer attaches to a transfer and gets back unchanged
/// in every callback (spec §3, "an opaque consumer handle").
pub type ConsumerHandle = u64;

/// What the consumer's done-callback may return (spec §6 "done"): reuse the
/// current descriptor, replace it, or halt with our flag left asserted.
pub enum DoneOutcome {
    Reuse,
    Replace(XferTemplate),
    Halt,
}

/// What the consumer's fail-callback may return (spec §6 "fail"): resume
/// with a (possibly new) descriptor, or halt permanently.
pub enum FailOutcome {
    Resume(XferTemplate),
    Halt,
}

pub type DoneCallback =
    Arc<dyn Fn(&Xfer, u32, &mut bool, ConsumerHandle) -> DoneOutcome + Send + Sync>;
pub type FailCallback =
    Arc<dyn Fn(&Xfer, u32, ErrorKind, ConsumerHandle) -> FailOutcome + Send + Sync>;
pub type AcceptCallback = Arc<dyn Fn(Xfer) + Send + Sync>;

/// Consumer-supplied template for a transfer (spec §3: "created by the core
/// as a deep copy of a consumer-supplied template at init"). Holds owned TX
/// content; RX is always allocated fresh, zeroed, by the core.
pub struct XferTemplate {
    pub tx: Vec<u8>,
    pub done: Option<DoneCallback>,
    pub fail: Option<FailCallback>,
    pub accept: Option<AcceptCallback>,
    pub handle: ConsumerHandle,
}

impl XferTemplate {
    #[must_use]
    pub fn new(tx: Vec<u8>) -> Self {
        Self { tx, done: None, fail: None, accept: None, handle: 0 }
    }

    #[must_use]
    pub fn with_done(mut self, cb: DoneCallback) -> Self {
        self.done = Some(cb);
        self
    }

    #[must_use]
    pub fn with_fail(mut self, cb: FailCallback) -> Self {
        self.fail = Some(cb);
        self
    }

    #[must_use]
    pub fn with_accept(mut self, cb: AcceptCallback) -> Self {
        self.accept = Some(cb);
        self
    }

    #[must_use]
    pub fn with_handle(mut self, handle: ConsumerHandle) -> Self {
        self.handle = handle;
        self
    }
}

/// Transfer descriptor (spec §3 "Xfer"). Ownership of its buffers is
/// exclusive to `Dev`; only the owner of the current state may mutate them
/// (spec §5).
pub struct Xfer {
    pub size: usize,
    pub tx: Vec<u8>,
    pub rx: Vec<u8>,
    pub id: u32,
    pub completed_count: u32,
    pub done: Option<DoneCallback>,
    pub fail: Option<FailCallback>,
    pub accept: Option<AcceptCallback>,
    pub handle: ConsumerHandle,
}

impl Xfer {
    pub(crate) fn from_template(id: u32, template: XferTemplate) -> Result<Self, SymspiError> {
        if template.tx.is_empty() {
            return Err(SymspiError::XferSizeZero);
        }
        let size = template.tx.len();
        let mut rx = Vec::new();
        rx.try_reserve_exact(size).map_err(|_| SymspiError::NoMemory)?;
        rx.resize(size, 0);
        check_overlap(&template.tx, &rx)?;
        Ok(Self {
            size,
            tx: template.tx,
            rx,
            id,
            completed_count: 0,
            done: template.done,
            fail: template.fail,
            accept: template.accept,
            handle: template.handle,
        })
    }

    /// Saturating bump (spec §3: "counter of completed transfers using this
    /// descriptor... saturating reset to 1 on overflow").
    pub(crate) fn bump_completed(&mut self) {
        self.completed_count = self.completed_count.checked_add(1).unwrap_or(1);
    }

    /// C4 `update_native_descriptor`: copies TX/RX pointers and length, then
    /// invokes the optional caller hook for bus-level fields the core is
    /// oblivious to (word width, polarity, chip-select behavior).
    pub(crate) fn update_native_descriptor(
        &mut self,
        desc: &mut NativeDescriptor,
        configure: Option<&dyn symspi_hal::NativeDescriptorConfigurer>,
    ) {
        // Safety: `self.tx`/`self.rx` outlive `desc`'s use, which never
        // escapes a single submit-and-complete cycle owned by this Xfer.
        unsafe {
            desc.point_at(&self.tx, &mut self.rx);
        }
        if let Some(configurer) = configure {
            configurer.configure(desc);
        }
    }
}

fn check_overlap(tx: &[u8], rx: &[u8]) -> Result<(), SymspiError> {
    let (tx_start, tx_end) = (tx.as_ptr() as usize, tx.as_ptr() as usize + tx.len());
    let (rx_start, rx_end) = (rx.as_ptr() as usize, rx.as_ptr() as usize + rx.len());
    if tx_start < rx_end && rx_start < tx_end {
        return Err(SymspiError::Overlap);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::State;

    #[test]
    fn from_template_rejects_empty_tx() {
        let err = Xfer::from_template(1, XferTemplate::new(Vec::new())).unwrap_err();
        assert_eq!(err, SymspiError::XferSizeZero);
    }

    #[test]
    fn from_template_allocates_fresh_zeroed_rx() {
        let xfer = Xfer::from_template(1, XferTemplate::new(vec![1, 2, 3])).unwrap();
        assert_eq!(xfer.rx, vec![0, 0, 0]);
        assert_eq!(xfer.size, 3);
        assert_eq!(xfer.completed_count, 0);
    }

    #[test]
    fn bump_completed_saturates_back_to_one_on_overflow() {
        let mut xfer = Xfer::from_template(1, XferTemplate::new(vec![0])).unwrap();
        xfer.completed_count = u32::MAX;
        xfer.bump_completed();
        assert_eq!(xfer.completed_count, 1);
    }

    #[test]
    fn validate_replace_rejects_zero_size() {
        let err = buffers::validate_replace(Some(4), 0, State::Idle, false).unwrap_err();
        assert_eq!(err, SymspiError::XferSizeZero);
    }

    #[test]
    fn validate_replace_allows_first_init_at_any_size() {
        buffers::validate_replace(None, 64, State::Cold, false).unwrap();
    }

    #[test]
    fn validate_replace_rejects_size_change_outside_xfer_or_error_without_force() {
        let err = buffers::validate_replace(Some(4), 8, State::Idle, false).unwrap_err();
        assert_eq!(err, SymspiError::XferSizeMismatch);
    }

    #[test]
    fn validate_replace_allows_size_change_when_forced() {
        buffers::validate_replace(Some(4), 8, State::Idle, true).unwrap();
    }

    #[test]
    fn validate_replace_allows_size_change_from_xfer_and_error_without_force() {
        buffers::validate_replace(Some(4), 8, State::Xfer, false).unwrap();
        buffers::validate_replace(Some(4), 8, State::Error, false).unwrap();
    }
}

/// C4 Transfer buffer manager: `replace`/`resize`/`free` validation rules
/// (spec §4.4). Implemented as free functions rather than a struct since
/// the buffers they validate live directly on `Dev`'s current `Xfer`, and
/// `Dev` is the only thing ever holding exclusive access to it (spec §5).
pub(crate) mod buffers {
    use crate::error::SymspiError;
    use crate::state::State;

    /// Validates a `replace(new_xfer, force_size_change)` request before
    /// the caller actually swaps the descriptor in. `current_size` is
    /// `None` only before the very first `init`.
    pub(crate) fn validate_replace(
        current_size: Option<usize>,
        new_size: usize,
        state: State,
        force_size_change: bool,
    ) -> Result<(), SymspiError> {
        if new_size == 0 {
            return Err(SymspiError::XferSizeZero);
        }
        let Some(current_size) = current_size else {
            return Ok(());
        };
        if new_size == current_size {
            return Ok(());
        }
        let size_change_allowed =
            force_size_change || matches!(state, State::Xfer | State::Error);
        if size_change_allowed {
            Ok(())
        } else {
            Err(SymspiError::XferSizeMismatch)
        }
    }
}
