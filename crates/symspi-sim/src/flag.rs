use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use symspi_hal::{EdgeMask, FlagError, InterruptSubscription, SignalLine};

struct Subscription {
    edges: EdgeMask,
    handler: Box<dyn Fn() + Send + Sync>,
}

/// One physical flag line: an `AtomicBool` level plus at most one
/// subscriber, standing in for the GPIO pin spec §1 calls "out of scope".
/// Whichever side didn't write the level is the one that subscribes to it,
/// same as two real SymSPI boards wired flag-to-flag.
pub struct SimFlagLine {
    level: AtomicBool,
    subscription: Arc<Mutex<Option<Subscription>>>,
}

impl SimFlagLine {
    #[must_use]
    pub fn new() -> Self {
        Self { level: AtomicBool::new(false), subscription: Arc::new(Mutex::new(None)) }
    }
}

impl Default for SimFlagLine {
    fn default() -> Self {
        Self::new()
    }
}

impl SignalLine for SimFlagLine {
    fn set_level(&self, high: bool) {
        let prev = self.level.swap(high, Ordering::SeqCst);
        if prev == high {
            return;
        }
        let guard = self.subscription.lock().unwrap();
        let Some(sub) = guard.as_ref() else { return };
        let fires = (high && sub.edges.rising) || (!high && sub.edges.falling);
        if fires {
            (sub.handler)();
        }
    }

    fn read_level(&self) -> bool {
        self.level.load(Ordering::SeqCst)
    }

    fn subscribe(
        &self,
        edges: EdgeMask,
        handler: Box<dyn Fn() + Send + Sync>,
    ) -> Result<Box<dyn InterruptSubscription>, FlagError> {
        *self.subscription.lock().unwrap() = Some(Subscription { edges, handler });
        Ok(Box::new(SimFlagSubscription { subscription: Arc::clone(&self.subscription) }))
    }
}

struct SimFlagSubscription {
    subscription: Arc<Mutex<Option<Subscription>>>,
}

impl InterruptSubscription for SimFlagSubscription {}

impl Drop for SimFlagSubscription {
    fn drop(&mut self) {
        self.subscription.lock().unwrap().take();
    }
}
