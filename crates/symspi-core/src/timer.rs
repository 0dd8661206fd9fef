use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

/// Floor below which an armed duration is rejected (spec §4.2, "floor 30 ms
/// to avoid jiffy-granularity false positives").
const FLOOR: Duration = Duration::from_millis(30);

struct Shared {
    mutex: Mutex<Inner>,
    cv: Condvar,
    generation: AtomicU64,
    firing: AtomicBool,
    shutdown: AtomicBool,
}

struct Inner {
    deadline: Option<Instant>,
    generation: u64,
}

/// Single-shot, restartable timeout timer (C2). Grounded on the teacher's
/// `Repeater`, reshaped from a polled `fired()` value into an actively
/// fired callback since spec §4.2 requires the timer itself to "enqueue an
/// error-handler call" on expiry rather than have the protocol engine poll
/// it.
///
/// Runs a dedicated thread parked on a condvar; `arm`/`cancel` only touch
/// the mutex-protected deadline and bump a generation counter so a stale
/// wakeup from a just-cancelled deadline never fires spuriously.
pub struct Timer {
    shared: Arc<Shared>,
    thread: Option<JoinHandle<()>>,
}

impl Timer {
    pub fn start(on_expire: impl Fn() + Send + 'static) -> Self {
        let shared = Arc::new(Shared {
            mutex: Mutex::new(Inner { deadline: None, generation: 0 }),
            cv: Condvar::new(),
            generation: AtomicU64::new(0),
            firing: AtomicBool::new(false),
            shutdown: AtomicBool::new(false),
        });
        let worker = Arc::clone(&shared);
        let thread = std::thread::Builder::new()
            .name("symspi-timer".into())
            .spawn(move || Self::run(&worker, &on_expire))
            .expect("spawning the timer thread must not fail");
        Self { shared, thread: Some(thread) }
    }

    fn run(shared: &Arc<Shared>, on_expire: &dyn Fn()) {
        loop {
            if shared.shutdown.load(Ordering::SeqCst) {
                return;
            }
            let mut guard = shared.mutex.lock().unwrap();
            let Some(deadline) = guard.deadline else {
                let (g, _) = shared.cv.wait_timeout(guard, Duration::from_millis(200)).unwrap();
                guard = g;
                drop(guard);
                continue;
            };
            let now = Instant::now();
            if now < deadline {
                let wait = deadline - now;
                let (g, _) = shared.cv.wait_timeout(guard, wait).unwrap();
                guard = g;
                if guard.deadline != Some(deadline) {
                    drop(guard);
                    continue;
                }
            }
            if guard.deadline != Some(deadline) {
                drop(guard);
                continue;
            }
            let gen = guard.generation;
            guard.deadline = None;
            drop(guard);
            if shared.generation.load(Ordering::SeqCst) == gen {
                shared.firing.store(true, Ordering::SeqCst);
                on_expire();
                shared.firing.store(false, Ordering::SeqCst);
                shared.cv.notify_all();
            }
        }
    }

    /// Arms (or re-arms) the timer for `duration`, floored to [`FLOOR`].
    /// Callable from any context: only touches the mutex-protected deadline.
    pub fn arm(&self, duration: Duration) {
        let duration = duration.max(FLOOR);
        let mut guard = self.shared.mutex.lock().unwrap();
        guard.generation += 1;
        self.shared.generation.store(guard.generation, Ordering::SeqCst);
        guard.deadline = Some(Instant::now() + duration);
        drop(guard);
        self.shared.cv.notify_all();
    }

    /// Clears any pending deadline without waiting for an in-flight
    /// expiry callback to finish. Safe from interrupt/timer context (spec
    /// §4.2: "must be cancellable from any context").
    pub fn cancel(&self) {
        let mut guard = self.shared.mutex.lock().unwrap();
        guard.generation += 1;
        self.shared.generation.store(guard.generation, Ordering::SeqCst);
        guard.deadline = None;
        drop(guard);
        self.shared.cv.notify_all();
    }

    /// As [`Self::cancel`], but additionally blocks until any in-flight
    /// expiry callback has returned. Only called from the sleep-capable
    /// domain (spec §4.2, §9 "Timer vs interrupt race").
    pub fn cancel_and_wait(&self) {
        self.cancel();
        let guard = self.shared.mutex.lock().unwrap();
        let _unused = self
            .shared
            .cv
            .wait_timeout_while(guard, Duration::from_secs(5), |_| self.shared.firing.load(Ordering::SeqCst))
            .unwrap();
    }
}

impl Drop for Timer {
    fn drop(&mut self) {
        self.shared.shutdown.store(true, Ordering::SeqCst);
        self.shared.cv.notify_all();
        if let Some(handle) = self.thread.take() {
            let _unused = handle.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU32;

    #[test]
    fn fires_after_duration() {
        let count = Arc::new(AtomicU32::new(0));
        let c = Arc::clone(&count);
        let timer = Timer::start(move || {
            c.fetch_add(1, Ordering::SeqCst);
        });
        timer.arm(Duration::from_millis(30));
        std::thread::sleep(Duration::from_millis(150));
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn cancel_suppresses_expiry() {
        let count = Arc::new(AtomicU32::new(0));
        let c = Arc::clone(&count);
        let timer = Timer::start(move || {
            c.fetch_add(1, Ordering::SeqCst);
        });
        timer.arm(Duration::from_millis(60));
        std::thread::sleep(Duration::from_millis(10));
        timer.cancel();
        std::thread::sleep(Duration::from_millis(120));
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn rearm_restarts_the_window() {
        let count = Arc::new(AtomicU32::new(0));
        let c = Arc::clone(&count);
        let timer = Timer::start(move || {
            c.fetch_add(1, Ordering::SeqCst);
        });
        timer.arm(Duration::from_millis(60));
        std::thread::sleep(Duration::from_millis(40));
        timer.arm(Duration::from_millis(60));
        std::thread::sleep(Duration::from_millis(40));
        assert_eq!(count.load(Ordering::SeqCst), 0);
        std::thread::sleep(Duration::from_millis(60));
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn floors_very_short_durations() {
        let count = Arc::new(AtomicU32::new(0));
        let c = Arc::clone(&count);
        let timer = Timer::start(move || {
            c.fetch_add(1, Ordering::SeqCst);
        });
        timer.arm(Duration::from_millis(1));
        std::thread::sleep(Duration::from_millis(10));
        assert_eq!(count.load(Ordering::SeqCst), 0);
        std::thread::sleep(Duration::from_millis(40));
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }
}
