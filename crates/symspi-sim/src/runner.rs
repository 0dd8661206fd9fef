use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Condvar, Mutex};

use symspi_core::RunnerMode;
use symspi_hal::{DeferredJob, DeferredRunner, RunnerInitError};

type Task = Box<dyn FnOnce() + Send>;

struct Slot {
    generation: AtomicU64,
    running: Mutex<bool>,
    cv: Condvar,
}

impl Slot {
    fn new() -> Self {
        Self { generation: AtomicU64::new(0), running: Mutex::new(false), cv: Condvar::new() }
    }
}

fn slot_index(job: DeferredJob) -> usize {
    match job {
        DeferredJob::DoXferNow => 0,
        DeferredJob::Postprocess => 1,
        DeferredJob::Recover => 2,
    }
}

enum Message {
    Run { slot: usize, generation: u64, task: Task },
    Shutdown,
}

/// Single-threaded, FIFO deferred-work runner (spec §4.3: "a sleep-capable
/// thread"). `cancel_sync` bumps the slot's generation so any
/// not-yet-started instance of that job is skipped by the worker, then
/// blocks until an already-running instance finishes — the same
/// generation-counter technique `symspi_core::timer::Timer` uses to
/// close the stale-wakeup race (spec §9 "Open questions" item (a)).
pub struct SimRunner {
    slots: std::sync::Arc<[Slot; 3]>,
    sender: Option<crossbeam_channel::Sender<Message>>,
    worker: Option<std::thread::JoinHandle<()>>,
}

impl SimRunner {
    /// Construct a runner, ignoring `mode` beyond acknowledging it exists —
    /// this simulation runs every mode as one plain OS thread; real
    /// backings would honor the shared/private and priority distinctions.
    pub fn new(_mode: RunnerMode) -> Result<Self, RunnerInitError> {
        let slots: std::sync::Arc<[Slot; 3]> =
            std::sync::Arc::new([Slot::new(), Slot::new(), Slot::new()]);
        let (sender, receiver) = crossbeam_channel::unbounded::<Message>();
        let worker_slots = std::sync::Arc::clone(&slots);
        let worker = std::thread::Builder::new()
            .name("symspi-sim-runner".into())
            .spawn(move || {
                for msg in receiver {
                    match msg {
                        Message::Shutdown => break,
                        Message::Run { slot, generation, task } => {
                            let s = &worker_slots[slot];
                            if s.generation.load(Ordering::SeqCst) != generation {
                                continue;
                            }
                            *s.running.lock().unwrap() = true;
                            task();
                            *s.running.lock().unwrap() = false;
                            s.cv.notify_all();
                        }
                    }
                }
            })
            .map_err(|_unused| RunnerInitError)?;
        Ok(Self { slots, sender: Some(sender), worker: Some(worker) })
    }
}

impl DeferredRunner for SimRunner {
    fn enqueue(&self, job: DeferredJob, task: Task) {
        let idx = slot_index(job);
        let generation = self.slots[idx].generation.fetch_add(1, Ordering::SeqCst) + 1;
        if let Some(sender) = &self.sender {
            let _unused = sender.send(Message::Run { slot: idx, generation, task });
        }
    }

    fn cancel_sync(&self, job: DeferredJob) {
        let slot = &self.slots[slot_index(job)];
        slot.generation.fetch_add(1, Ordering::SeqCst);
        let guard = slot.running.lock().unwrap();
        let _unused = slot.cv.wait_while(guard, |running| *running).unwrap();
    }
}

impl Drop for SimRunner {
    fn drop(&mut self) {
        if let Some(sender) = self.sender.take() {
            let _unused = sender.send(Message::Shutdown);
        }
        if let Some(worker) = self.worker.take() {
            let _unused = worker.join();
        }
    }
}
