use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::mpsc::{self, Receiver};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use aero_net_slirp::{
    DescriptorSets, Holder, MacAddr, OutputSink, PollState, SlirpBackend, SlirpConfig,
    SlirpError, StackError, UserNetStack,
};

const MAC_A: MacAddr = MacAddr([0x52, 0x54, 0x00, 0x12, 0x34, 0x56]);

/// Generous bound for "should happen promptly" assertions on loaded CI machines.
const PROMPT: Duration = Duration::from_millis(250);

/// Readiness timeout reported by [`ScriptedStack`].
const SCRIPTED_READINESS: Duration = Duration::from_micros(1_000);

/// Allowance for thread wakeup latency on a loaded machine.
const SCHEDULING_SLACK: Duration = Duration::from_millis(40);

/// Observable state of [`ScriptedStack`], shared with the test body.
#[derive(Default)]
struct Probe {
    output: Mutex<Option<OutputSink>>,
    ingested: Mutex<Vec<Vec<u8>>>,
    shutdowns: Mutex<Vec<i32>>,
    dispatches: AtomicUsize,
    /// When set, the next dispatch emits `stall_frame`, reports itself through `stalled_tx` and
    /// then blocks for `stall_for`.
    stall: AtomicBool,
    stall_for: Mutex<Duration>,
    stall_frame: Mutex<Option<Vec<u8>>>,
    stalled_tx: Mutex<Option<mpsc::Sender<()>>>,
}

impl Probe {
    fn output(&self) -> OutputSink {
        self.output
            .lock()
            .unwrap()
            .clone()
            .expect("stack was initialized")
    }
}

/// Stand-in for the user-mode stack: no sockets, a 1ms readiness timeout, echoes nothing.
struct ScriptedStack {
    probe: Arc<Probe>,
    timeout_us: i64,
}

impl ScriptedStack {
    fn new() -> (Self, Arc<Probe>) {
        let probe = Arc::new(Probe::default());
        (
            Self {
                probe: Arc::clone(&probe),
                timeout_us: SCRIPTED_READINESS.as_micros() as i64,
            },
            probe,
        )
    }
}

impl UserNetStack for ScriptedStack {
    fn initialize(&mut self, output: OutputSink) -> Result<(), StackError> {
        *self.probe.output.lock().unwrap() = Some(output);
        Ok(())
    }

    fn shutdown(&mut self, code: i32) {
        self.probe.shutdowns.lock().unwrap().push(code);
    }

    fn ingest(&mut self, frame: &[u8]) {
        self.probe.ingested.lock().unwrap().push(frame.to_vec());
    }

    fn query_readiness(&mut self, _sets: &mut DescriptorSets) -> i64 {
        self.timeout_us
    }

    fn dispatch(&mut self, _sets: &DescriptorSets) -> Result<(), StackError> {
        self.probe.dispatches.fetch_add(1, Ordering::SeqCst);
        if self.probe.stall.swap(false, Ordering::SeqCst) {
            if let Some(frame) = self.probe.stall_frame.lock().unwrap().take() {
                self.probe.output().emit(&frame);
            }
            if let Some(tx) = self.probe.stalled_tx.lock().unwrap().take() {
                let _ = tx.send(());
            }
            let stall_for = *self.probe.stall_for.lock().unwrap();
            std::thread::sleep(stall_for);
        }
        Ok(())
    }
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn started_backend(
    config: SlirpConfig,
) -> (SlirpBackend<ScriptedStack>, Arc<Probe>, Receiver<Vec<u8>>) {
    init_tracing();
    let (stack, probe) = ScriptedStack::new();
    let mut backend = SlirpBackend::with_config(stack, config);
    backend.init().expect("init");

    let (nic_tx, nic_rx) = mpsc::channel();
    backend.reset(nic_tx, MAC_A).expect("reset");
    (backend, probe, nic_rx)
}

fn wait_until(deadline: Duration, mut cond: impl FnMut() -> bool) -> bool {
    let start = Instant::now();
    while start.elapsed() < deadline {
        if cond() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(1));
    }
    cond()
}

#[test]
fn inbound_frame_is_ingested_exactly_once() {
    let (mut backend, probe, _nic_rx) = started_backend(SlirpConfig::default());
    assert_eq!(backend.poll_state(), PollState::Running);
    assert_eq!(backend.mac(), Some(MAC_A));

    backend.inbound(&[0xAA, 0xBB, 0xCC]);

    assert_eq!(*probe.ingested.lock().unwrap(), vec![vec![0xAA, 0xBB, 0xCC]]);
    assert_eq!(backend.stats().tx_ingested_frames, 1);

    backend.close();
    assert_eq!(probe.ingested.lock().unwrap().len(), 1);
}

#[test]
fn stack_output_reaches_the_nic_while_idle() {
    let (mut backend, probe, nic_rx) = started_backend(SlirpConfig::default());

    // Let the loop settle into its idle backoff.
    assert!(wait_until(PROMPT, || probe.dispatches.load(Ordering::SeqCst) >= 2));

    let frame: Vec<u8> = (0..64u8).collect();
    let start = Instant::now();
    assert!(probe.output().emit(&frame));

    // One idle backoff plus one iteration (the scripted 1ms readiness wait), plus CI slack.
    let bound = backend.config().idle_backoff + SCRIPTED_READINESS + SCHEDULING_SLACK;
    let got = nic_rx.recv_timeout(bound).expect("frame delivered");
    assert!(start.elapsed() < bound, "delivery took {:?}", start.elapsed());
    assert_eq!(got, frame);

    // Exactly once.
    assert!(nic_rx.recv_timeout(Duration::from_millis(50)).is_err());
    let stats = backend.stats();
    assert_eq!(stats.rx_queued_frames, 1);
    assert_eq!(stats.rx_delivered_frames, 1);
    assert_eq!(stats.rx_delivered_bytes, 64);

    backend.close();
}

#[test]
fn emit_wakes_the_loop_before_the_idle_backoff_expires() {
    let idle_backoff = Duration::from_secs(2);
    let (mut backend, probe, nic_rx) =
        started_backend(SlirpConfig::default().with_idle_backoff(idle_backoff));

    assert!(wait_until(PROMPT, || probe.dispatches.load(Ordering::SeqCst) >= 1));
    std::thread::sleep(Duration::from_millis(20));

    // Only the wake from `emit` can beat the two-second backoff.
    let bound = SCRIPTED_READINESS + PROMPT;
    assert!(bound < idle_backoff);
    let start = Instant::now();
    assert!(probe.output().emit(&[0x77; 64]));

    let got = nic_rx.recv_timeout(bound).expect("frame delivered");
    assert!(start.elapsed() < bound, "delivery took {:?}", start.elapsed());
    assert_eq!(got, vec![0x77; 64]);

    backend.close();
}

#[test]
fn frames_are_delivered_in_emit_order() {
    let (mut backend, probe, nic_rx) = started_backend(SlirpConfig::default());

    let output = probe.output();
    for i in 1..=20u8 {
        assert!(output.emit(&[i; 60]));
    }

    for i in 1..=20u8 {
        let got = nic_rx.recv_timeout(Duration::from_secs(2)).expect("frame delivered");
        assert_eq!(got, vec![i; 60]);
    }
    assert!(wait_until(PROMPT, || backend.queued_frames() == 0));

    backend.close();
}

#[test]
fn larger_frame_budget_keeps_fifo_order() {
    let (mut backend, probe, nic_rx) =
        started_backend(SlirpConfig::default().with_frames_per_iteration(8));

    // Hold the gate so the whole batch is queued before the loop drains anything.
    backend.gate().acquire(Holder::Controller);
    let output = probe.output();
    for i in 0..32u8 {
        assert!(output.emit(&[i]));
    }
    backend.gate().release(Holder::Controller);

    for i in 0..32u8 {
        assert_eq!(nic_rx.recv_timeout(Duration::from_secs(2)).unwrap(), vec![i]);
    }

    backend.close();
}

#[test]
fn close_during_dispatch_exits_within_the_readiness_timeout() {
    let (mut backend, probe, nic_rx) = started_backend(SlirpConfig::default());

    let (stalled_tx, stalled_rx) = mpsc::channel();
    *probe.stalled_tx.lock().unwrap() = Some(stalled_tx);
    *probe.stall_for.lock().unwrap() = Duration::from_millis(100);
    *probe.stall_frame.lock().unwrap() = Some(vec![0x5A; 64]);
    probe.stall.store(true, Ordering::SeqCst);

    stalled_rx
        .recv_timeout(Duration::from_secs(2))
        .expect("poll loop entered dispatch");

    let start = Instant::now();
    backend.close();
    let elapsed = start.elapsed();

    assert!(
        elapsed < backend.config().default_poll_timeout + PROMPT,
        "close took {elapsed:?}"
    );
    assert!(!backend.is_active());
    assert!(!backend.is_polling());

    // The frame emitted mid-dispatch was discarded with the queue, never delivered.
    assert!(nic_rx.try_recv().is_err());
    assert_eq!(backend.stats().rx_discarded_on_close, 1);
    assert_eq!(*probe.shutdowns.lock().unwrap(), vec![0]);
}

#[test]
fn close_with_empty_queue_terminates() {
    let (mut backend, probe, _nic_rx) = started_backend(SlirpConfig::default());
    assert_eq!(backend.queued_frames(), 0);

    let start = Instant::now();
    backend.close();
    assert!(start.elapsed() < backend.config().default_poll_timeout + PROMPT);
    assert_eq!(backend.poll_state(), PollState::Stopped);
    assert_eq!(*probe.shutdowns.lock().unwrap(), vec![0]);
}

#[test]
fn close_without_session_is_a_no_op() {
    let (stack, probe) = ScriptedStack::new();
    let mut backend = SlirpBackend::new(stack);

    let start = Instant::now();
    backend.close();
    backend.close();
    assert!(start.elapsed() < PROMPT);
    assert!(probe.shutdowns.lock().unwrap().is_empty());

    backend.init().unwrap();
    backend.close();
    backend.close();
    assert_eq!(*probe.shutdowns.lock().unwrap(), vec![0]);
}

#[test]
fn reset_is_rejected_before_init_and_while_polling() {
    let (stack, _probe) = ScriptedStack::new();
    let mut backend = SlirpBackend::new(stack);
    assert!(matches!(
        backend.reset((), MAC_A),
        Err(SlirpError::NoActiveSession)
    ));

    backend.init().unwrap();
    backend.reset((), MAC_A).unwrap();
    assert!(matches!(
        backend.reset((), MacAddr::BROADCAST),
        Err(SlirpError::SessionAlreadyActive)
    ));
    assert_eq!(backend.mac(), Some(MAC_A));
    backend.close();
}

#[test]
fn backend_can_be_restarted_after_close() {
    let (mut backend, probe, nic_rx) = started_backend(SlirpConfig::default());
    backend.close();
    drop(nic_rx);

    // Output from a stale sink goes nowhere.
    let stale = probe.output();
    assert!(!stale.can_output());
    assert!(!stale.emit(&[1, 2, 3]));

    backend.init().unwrap();
    let (nic_tx, nic_rx) = mpsc::channel();
    backend.reset(nic_tx, MAC_A).unwrap();

    let fresh = probe.output();
    assert!(fresh.can_output());
    assert!(fresh.emit(&[4, 5, 6]));
    assert_eq!(nic_rx.recv_timeout(Duration::from_secs(2)).unwrap(), vec![4, 5, 6]);

    backend.close();
    assert_eq!(*probe.shutdowns.lock().unwrap(), vec![0, 0]);
}

#[test]
fn negative_stack_timeout_uses_configured_default() {
    let (mut stack, probe) = ScriptedStack::new();
    stack.timeout_us = -1;
    let mut backend = SlirpBackend::with_config(
        stack,
        SlirpConfig::default().with_default_poll_timeout(Duration::from_millis(5)),
    );
    backend.init().unwrap();
    backend.reset((), MAC_A).unwrap();

    assert!(wait_until(PROMPT, || probe.dispatches.load(Ordering::SeqCst) >= 3));
    backend.close();
}

#[test]
fn paced_loop_waits_for_poll_requests() {
    let (mut backend, probe, _nic_rx) = started_backend(
        SlirpConfig::default()
            .with_paced(true)
            .with_default_poll_timeout(Duration::from_secs(5)),
    );

    // Without requests the loop sits in its pacing wait.
    std::thread::sleep(Duration::from_millis(50));
    assert_eq!(probe.dispatches.load(Ordering::SeqCst), 0);

    backend.request_poll();
    assert!(wait_until(PROMPT, || probe.dispatches.load(Ordering::SeqCst) == 1));

    // Closing wakes the pacing wait instead of sitting out the 5s bound.
    let start = Instant::now();
    backend.close();
    assert!(start.elapsed() < Duration::from_secs(1));
}

#[test]
fn dropping_the_backend_stops_the_poll_thread() {
    let (backend, probe, nic_rx) = started_backend(SlirpConfig::default());
    drop(backend);

    assert_eq!(*probe.shutdowns.lock().unwrap(), vec![0]);
    // The NIC (channel sender) was released with the thread.
    assert!(matches!(
        nic_rx.recv_timeout(Duration::from_millis(50)),
        Err(mpsc::RecvTimeoutError::Disconnected)
    ));
}

#[test]
fn inbound_waits_for_the_poll_loop_to_leave_the_stack() {
    let (mut backend, probe, _nic_rx) = started_backend(SlirpConfig::default());

    let (stalled_tx, stalled_rx) = mpsc::channel();
    *probe.stalled_tx.lock().unwrap() = Some(stalled_tx);
    *probe.stall_for.lock().unwrap() = Duration::from_millis(60);
    probe.stall.store(true, Ordering::SeqCst);
    stalled_rx.recv_timeout(Duration::from_secs(2)).unwrap();

    let start = Instant::now();
    backend.inbound(&[0xEE; 14]);
    assert!(start.elapsed() >= Duration::from_millis(30));
    assert_eq!(probe.ingested.lock().unwrap().len(), 1);

    backend.close();
}
