use thiserror::Error;

/// Bus-level transfer descriptor as the bus controller sees it: raw
/// pointers, a shared length, and the handful of bus-level knobs the core
/// is deliberately oblivious to (word width, clock polarity/phase, burst
/// width). Mirrored from the consumer's owned `Xfer` buffers by
/// `update_native_descriptor` (spec §4.4); never outlives the `Xfer` it was
/// derived from.
#[derive(Debug)]
pub struct NativeDescriptor {
    pub tx_ptr: *const u8,
    pub rx_ptr: *mut u8,
    pub len: usize,
    pub word_width_bits: u8,
    pub clock_polarity: bool,
    pub clock_phase: bool,
    pub burst_width: u8,
}

// Safety: the pointers only ever point into the `Xfer` buffers that own
// this descriptor's submission, which `Dev` guards with its state word so
// at most one thread touches them at a time; the descriptor itself just
// rides along to whichever thread the bus/interrupt/timer/runner domain
// calls back on.
unsafe impl Send for NativeDescriptor {}

impl Default for NativeDescriptor {
    fn default() -> Self {
        Self {
            tx_ptr: std::ptr::null(),
            rx_ptr: std::ptr::null_mut(),
            len: 0,
            word_width_bits: 8,
            clock_polarity: false,
            clock_phase: false,
            burst_width: 1,
        }
    }
}

impl NativeDescriptor {
    /// # Safety
    /// `tx` and `rx` must remain valid and non-aliasing for as long as this
    /// descriptor is submitted to a [`BusChannel`].
    pub unsafe fn point_at(&mut self, tx: &[u8], rx: &mut [u8]) {
        debug_assert_eq!(tx.len(), rx.len());
        self.tx_ptr = tx.as_ptr();
        self.rx_ptr = rx.as_mut_ptr();
        self.len = tx.len();
    }
}

/// Lets the consumer set transport-level fields on the native descriptor
/// before each submission (spec §6, "native-descriptor-configure hook").
pub trait NativeDescriptorConfigurer: Send + Sync {
    fn configure(&self, desc: &mut NativeDescriptor);
}

/// Result handed to the completion callback by the bus driver.
#[derive(Clone, Copy, Debug, Default)]
pub struct BusCompletion {
    /// Native status code; zero means success (spec §4.7 "Completion
    /// handoff": "If the native status is non-zero, raise SpiLayer").
    pub status: i32,
}

#[derive(Error, Debug, Clone, Copy)]
#[error("bus layer rejected submission (code {0})")]
pub struct SubmitError(pub i32);

/// The bus driver: "submits a transfer, invokes a completion callback"
/// (spec §1). Out of scope for this crate's core; specified here only by
/// the interface the core consumes. `submit` must not block past
/// synchronous-rejection detection — the actual transfer completes
/// asynchronously, and `on_complete` is invoked from a non-sleeping
/// context (spec §5).
pub trait BusChannel: Send + Sync {
    fn submit(
        &self,
        desc: &NativeDescriptor,
        on_complete: Box<dyn FnOnce(BusCompletion) + Send>,
    ) -> Result<(), SubmitError>;
}
