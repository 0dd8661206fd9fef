use std::sync::Arc;

use symspi_core::{Config, Dev, XferTemplate};
use symspi_hal::{BusChannel, DeferredRunner, SignalLine};

use crate::bus::SimBusChannel;
use crate::flag::SimFlagLine;
use crate::runner::SimRunner;

/// A master and slave `Dev` wired together through one [`SimBusChannel`]
/// and a crossed pair of [`SimFlagLine`]s — each side's own flag is the
/// other side's peer flag, exactly as two real SymSPI boards are wired.
pub struct SimPair {
    pub master: Arc<Dev>,
    pub slave: Arc<Dev>,
    /// The master's own flag line, concretely typed so tests can toggle
    /// either side's line directly to simulate a peer that misbehaves —
    /// something neither `Dev` ever needs to do to its own line.
    pub master_flag: Arc<SimFlagLine>,
    pub slave_flag: Arc<SimFlagLine>,
}

impl SimPair {
    #[must_use]
    pub fn new(master_config: Config, slave_config: Config) -> Self {
        let bus: Arc<dyn BusChannel> = Arc::new(SimBusChannel::new());
        let master_flag = Arc::new(SimFlagLine::new());
        let slave_flag = Arc::new(SimFlagLine::new());

        let master = Dev::new(
            master_config,
            Some(Arc::clone(&bus)),
            Some(Arc::clone(&master_flag) as Arc<dyn SignalLine>),
            Some(Arc::clone(&slave_flag) as Arc<dyn SignalLine>),
            None,
            Box::new(|mode| SimRunner::new(mode).map(|r| Box::new(r) as Box<dyn DeferredRunner>)),
        );
        let slave = Dev::new(
            slave_config,
            Some(bus),
            Some(Arc::clone(&slave_flag) as Arc<dyn SignalLine>),
            Some(Arc::clone(&master_flag) as Arc<dyn SignalLine>),
            None,
            Box::new(|mode| SimRunner::new(mode).map(|r| Box::new(r) as Box<dyn DeferredRunner>)),
        );
        Self { master, slave, master_flag, slave_flag }
    }

    /// Init both sides with a zeroed default descriptor of `size` bytes.
    ///
    /// # Panics
    /// Panics if either side fails to init — tests use this only with
    /// configurations known to succeed.
    pub fn init_both(&self, size: usize) {
        self.master.init(zero_template(size)).expect("master init");
        self.slave.init(zero_template(size)).expect("slave init");
    }
}

#[must_use]
pub fn zero_template(size: usize) -> XferTemplate {
    XferTemplate::new(vec![0_u8; size])
}
