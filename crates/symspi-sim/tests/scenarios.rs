use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use symspi_core::{Config, DoneOutcome, ErrorKind, FailOutcome, State, SymspiError, Xfer, XferTemplate};
use symspi_hal::{Polarity, Role, SignalLine};
use symspi_sim::SimPair;

fn wait_until(timeout: Duration, mut poll: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if poll() {
            return true;
        }
        thread::sleep(Duration::from_millis(1));
    }
    poll()
}

fn master_config() -> Config {
    Config::new(Role::Master, false, Polarity::ActiveHigh)
}

fn slave_config() -> Config {
    Config::new(Role::Slave, false, Polarity::ActiveHigh)
}

#[test]
fn single_64_byte_round_trip() {
    let pair = SimPair::new(master_config(), slave_config());
    pair.init_both(64);

    let observed: Arc<Mutex<Option<(u32, usize)>>> = Arc::new(Mutex::new(None));
    let observed_in_callback = Arc::clone(&observed);
    let done_count = Arc::new(AtomicU32::new(0));
    let done_count_in_callback = Arc::clone(&done_count);

    let tx: Vec<u8> = (0..64).collect();
    let template = XferTemplate::new(tx).with_done(Arc::new(move |xfer: &Xfer, next_id: u32, _start_immediately: &mut bool, _handle| {
        *observed_in_callback.lock().unwrap() = Some((next_id, xfer.rx.len()));
        done_count_in_callback.fetch_add(1, Ordering::SeqCst);
        DoneOutcome::Reuse
    }));

    let id = pair.master.exchange(Some(template), false).unwrap();
    assert_eq!(id, 1);

    assert!(wait_until(Duration::from_secs(1), || done_count.load(Ordering::SeqCst) == 1));
    let (next_id, rx_len) = observed.lock().unwrap().unwrap();
    assert_eq!(next_id, 2);
    assert_eq!(rx_len, 64);

    assert!(wait_until(Duration::from_secs(1), || pair.master.state() == State::Idle));
    assert_eq!(done_count.load(Ordering::SeqCst), 1);
}

#[test]
fn sized_swap_mid_flight_rejected() {
    let pair = SimPair::new(master_config(), slave_config());
    pair.init_both(64);

    let err = pair.master.exchange(Some(XferTemplate::new(vec![0_u8; 1])), false).unwrap_err();
    assert_eq!(err, SymspiError::XferSizeMismatch);
    assert_eq!(pair.master.state(), State::Idle);
}

#[test]
fn peer_initiated_transfer_while_idle() {
    let pair = SimPair::new(master_config(), slave_config());
    pair.init_both(32);

    let rx_capture: Arc<Mutex<Vec<u8>>> = Arc::new(Mutex::new(Vec::new()));
    let rx_capture_in_callback = Arc::clone(&rx_capture);
    let done = Arc::new(AtomicBool::new(false));
    let done_in_callback = Arc::clone(&done);
    pair.master
        .update_default(
            XferTemplate::new(vec![0_u8; 32]).with_done(Arc::new(move |xfer: &Xfer, _next_id, _start, _handle| {
                *rx_capture_in_callback.lock().unwrap() = xfer.rx.clone();
                done_in_callback.store(true, Ordering::SeqCst);
                DoneOutcome::Reuse
            })),
            false,
        )
        .unwrap();
    assert_eq!(pair.master.state(), State::Idle);

    let slave_tx = vec![7_u8; 32];
    pair.slave.exchange(Some(XferTemplate::new(slave_tx.clone())), false).unwrap();

    assert!(wait_until(Duration::from_secs(1), || done.load(Ordering::SeqCst)));
    assert_eq!(*rx_capture.lock().unwrap(), slave_tx);
    assert!(wait_until(Duration::from_secs(1), || pair.master.state() == State::Idle));
}

#[test]
fn spurious_peer_falling_edge_pushes_drop_counter_past_one() {
    // hardware_ready=true: the master only subscribes to falling edges on
    // its peer flag (spec's edge-interrupt registration rule), so the
    // injected edge below cannot also be mistaken for a peer-asserted
    // rising edge and drag the device into a real handshake.
    let config = Config::new(Role::Master, true, Polarity::ActiveHigh);
    let pair = SimPair::new(config, slave_config());
    // Only the master is initialized: `slave_flag` is driven directly below
    // to simulate a peer that mis-signals, rather than the real (uninited)
    // slave `Dev`, which would otherwise race to participate legitimately.
    pair.master.init(symspi_sim::zero_template(32)).unwrap();
    assert_eq!(pair.master.state(), State::Idle);

    let fail_count = Arc::new(AtomicU32::new(0));
    let fail_count_in_callback = Arc::clone(&fail_count);
    let seen_kind: Arc<Mutex<Option<ErrorKind>>> = Arc::new(Mutex::new(None));
    let seen_kind_in_callback = Arc::clone(&seen_kind);
    pair.master
        .update_default(
            XferTemplate::new(vec![0_u8; 32]).with_fail(Arc::new(move |_xfer, _next_id, kind, _handle| {
                *seen_kind_in_callback.lock().unwrap() = Some(kind);
                fail_count_in_callback.fetch_add(1, Ordering::SeqCst);
                FailOutcome::Resume(XferTemplate::new(vec![0_u8; 32]))
            })),
            false,
        )
        .unwrap();

    // `init` already counted one legitimate release, so the drop counter
    // starts at 1; one more spurious falling edge crosses the ">= 2"
    // threshold (spec's universal drop-counter invariant) with no transfer
    // in flight at all.
    pair.slave_flag.set_level(true);
    pair.slave_flag.set_level(false);

    assert!(wait_until(Duration::from_secs(1), || fail_count.load(Ordering::SeqCst) == 1));
    assert_eq!(*seen_kind.lock().unwrap(), Some(ErrorKind::OtherSide));
    assert!(wait_until(Duration::from_secs(1), || pair.master.state() == State::Idle));
}

#[test]
fn peer_timeout_raises_wait_other_side() {
    let config = master_config().with_peer_wait_timeout(Duration::from_millis(20));
    let pair = SimPair::new(config, slave_config());
    // Only the master is initialized: the slave never asserts its flag, so
    // the master's peer-wait timer is guaranteed to expire.
    pair.master.init(symspi_sim::zero_template(16)).unwrap();

    let fail_count = Arc::new(AtomicU32::new(0));
    let fail_count_in_callback = Arc::clone(&fail_count);
    let seen_kind: Arc<Mutex<Option<ErrorKind>>> = Arc::new(Mutex::new(None));
    let seen_kind_in_callback = Arc::clone(&seen_kind);
    pair.master
        .update_default(
            XferTemplate::new(vec![0_u8; 16]).with_fail(Arc::new(move |_xfer, _next_id, kind, _handle| {
                *seen_kind_in_callback.lock().unwrap() = Some(kind);
                fail_count_in_callback.fetch_add(1, Ordering::SeqCst);
                FailOutcome::Resume(XferTemplate::new(vec![0_u8; 16]))
            })),
            false,
        )
        .unwrap();

    pair.master.exchange(None, false).unwrap();

    assert!(wait_until(Duration::from_secs(1), || fail_count.load(Ordering::SeqCst) == 1));
    assert_eq!(*seen_kind.lock().unwrap(), Some(ErrorKind::WaitOtherSide));
    assert!(wait_until(Duration::from_secs(1), || pair.master.state() == State::Idle));
}

#[test]
fn close_during_xfer_waits_for_leave_xfer_then_tears_down() {
    let pair = SimPair::new(master_config(), slave_config());
    pair.init_both(16);

    let slave_tx = vec![9_u8; 16];
    pair.slave.exchange(Some(XferTemplate::new(slave_tx)), false).unwrap();
    // The slave's handshake drives master automatically through the
    // peer-initiated path (no explicit `master.exchange` call here, which
    // would otherwise race the one already underway and return NotReady).
    assert!(wait_until(Duration::from_secs(1), || pair.master.state() != State::Idle));

    // Close right away: the bus's completion dispatch runs on its own
    // worker thread, so there is a real window here where `master` may
    // still be sitting in `Xfer`, exercising `close`'s bounded wait.
    pair.master.close().unwrap();

    assert_eq!(pair.master.state(), State::Cold);
    assert!(!pair.master.is_running());
}

#[test]
fn init_close_init_is_clean() {
    let pair = SimPair::new(master_config(), slave_config());
    pair.master.init(symspi_sim::zero_template(8)).unwrap();
    pair.master.close().unwrap();
    assert_eq!(pair.master.close().unwrap_err(), SymspiError::AlreadyClosing);
    pair.master.init(symspi_sim::zero_template(8)).unwrap();
    assert_eq!(pair.master.state(), State::Idle);
    assert_eq!(pair.master.info_snapshot().bus_xfers_done_ok, 0);
}
