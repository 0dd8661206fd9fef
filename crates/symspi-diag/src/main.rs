//! Small CLI that drives a simulated master/slave pair through one
//! transfer and prints their diagnostics readout, human or JSON.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use clap::Parser;
use symspi_core::{Config, DoneOutcome, XferTemplate};
use symspi_diag::Diagnostics;
use symspi_hal::{Polarity, Role};
use symspi_sim::SimPair;

/// Drive a simulated symspi pair and print their diagnostics.
#[derive(Parser)]
#[command(name = "symspi-diag", version, about = "symspi transport diagnostics CLI")]
struct Args {
    /// Transfer size in bytes for the demo exchange.
    #[arg(short, long, default_value_t = 32)]
    size: usize,

    /// Print the snapshot as JSON instead of a human-readable table.
    #[arg(long)]
    json: bool,
}

fn main() {
    tracing_subscriber::fmt::init();
    let args = Args::parse();

    let pair = SimPair::new(
        Config::new(Role::Master, false, Polarity::ActiveHigh),
        Config::new(Role::Slave, false, Polarity::ActiveHigh),
    );
    pair.init_both(args.size);

    let done = Arc::new(AtomicBool::new(false));
    let done_in_callback = Arc::clone(&done);
    pair.master
        .update_default(
            XferTemplate::new(vec![0_u8; args.size]).with_done(Arc::new(move |_xfer, _next_id, _start, _handle| {
                done_in_callback.store(true, Ordering::SeqCst);
                DoneOutcome::Reuse
            })),
            false,
        )
        .expect("install demo done callback");

    pair.master
        .exchange(Some(XferTemplate::new((0..args.size as u8).collect())), false)
        .expect("start demo exchange");

    let deadline = Instant::now() + Duration::from_secs(1);
    while !done.load(Ordering::SeqCst) && Instant::now() < deadline {
        thread::sleep(Duration::from_millis(1));
    }

    for (label, dev) in [("master", &pair.master), ("slave", &pair.slave)] {
        let diag = Diagnostics::new(dev);
        if args.json {
            println!("{}", diag.to_json());
        } else {
            println!("== {label} ==");
            print!("{}", diag.render());
        }
    }

    pair.master.close().expect("close master");
    pair.slave.close().expect("close slave");
}
