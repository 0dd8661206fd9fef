use std::sync::Mutex;

use symspi_hal::{BusChannel, BusCompletion, NativeDescriptor, SubmitError};

/// Raw descriptor fields copied out of a `NativeDescriptor`, carried across
/// the completion-dispatch thread. Valid because the caller's contract
/// (`NativeDescriptor::point_at`'s safety note) guarantees the buffers
/// outlive one submit-and-complete cycle, and here that cycle ends the
/// moment both sides' completion closures run.
struct PendingSide {
    tx_ptr: *const u8,
    rx_ptr: *mut u8,
    len: usize,
    on_complete: Box<dyn FnOnce(BusCompletion) + Send>,
}

// Safety: the raw pointers point into buffers owned by the `Xfer` that
// issued this submission, which is never touched again until the paired
// completion closure runs on the dispatch thread below.
unsafe impl Send for PendingSide {}

/// Loopback bus shared by exactly two devices (spec §1's "out of scope"
/// bus controller): the physical transaction only actually happens once
/// both sides have submitted, at which point it is one symmetric
/// full-duplex copy — A's TX becomes B's RX and vice versa — dispatched to
/// a worker thread so `submit` itself never blocks (spec §5).
pub struct SimBusChannel {
    pending: Mutex<Option<PendingSide>>,
    sender: Option<crossbeam_channel::Sender<Box<dyn FnOnce() + Send>>>,
    worker: Option<std::thread::JoinHandle<()>>,
}

impl SimBusChannel {
    #[must_use]
    pub fn new() -> Self {
        let (sender, receiver) = crossbeam_channel::unbounded::<Box<dyn FnOnce() + Send>>();
        let worker = std::thread::Builder::new()
            .name("symspi-sim-bus".into())
            .spawn(move || {
                for job in receiver {
                    job();
                }
            })
            .expect("spawn symspi-sim-bus thread");
        Self { pending: Mutex::new(None), sender: Some(sender), worker: Some(worker) }
    }
}

impl Default for SimBusChannel {
    fn default() -> Self {
        Self::new()
    }
}

impl BusChannel for SimBusChannel {
    fn submit(
        &self,
        desc: &NativeDescriptor,
        on_complete: Box<dyn FnOnce(BusCompletion) + Send>,
    ) -> Result<(), SubmitError> {
        let side = PendingSide { tx_ptr: desc.tx_ptr, rx_ptr: desc.rx_ptr, len: desc.len, on_complete };
        let mut guard = self.pending.lock().unwrap();
        let Some(other) = guard.take() else {
            *guard = Some(side);
            return Ok(());
        };
        drop(guard);

        symspi_utils::safe_assert_eq!(other.len, side.len);
        let len = other.len.min(side.len);
        // Safety: both sides point into still-live Xfer buffers of exactly
        // `len` bytes, and neither alias the other (enforced at allocation
        // by `check_overlap` within each device, on buffers owned by
        // different devices here).
        unsafe {
            std::ptr::copy_nonoverlapping(side.tx_ptr, other.rx_ptr, len);
            std::ptr::copy_nonoverlapping(other.tx_ptr, side.rx_ptr, len);
        }

        let first = other.on_complete;
        let second = side.on_complete;
        let sender = self.sender.as_ref().expect("bus worker still running");
        let _unused = sender.send(Box::new(move || first(BusCompletion { status: 0 })));
        let _unused = sender.send(Box::new(move || second(BusCompletion { status: 0 })));
        Ok(())
    }
}

impl Drop for SimBusChannel {
    fn drop(&mut self) {
        self.sender.take();
        if let Some(worker) = self.worker.take() {
            let _unused = worker.join();
        }
    }
}
