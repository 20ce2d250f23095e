//! Integration tests for the supervised status bar
//!
//! These tests drive a complete run: scripted producers on one side, an
//! in-memory bar on the other (click events written into a duplex pipe, block
//! stream read back line by line). Tests cover:
//! - Snapshot content and framing on the wire
//! - Click routing, including handlers that emit
//! - Every way a run can end: shutdown, end of input, producer failure,
//!   panics, malformed input
//! - Early producer exit and the shutdown grace period

use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, DuplexStream};
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;

use statusbar_core::{
    producer_fn, Block, BlockKey, ClickEvent, Header, LifecycleState, Producer, ShutdownHandle,
    Snapshot, StatusError, Supervisor, SupervisorConfig,
};

const WAIT: Duration = Duration::from_secs(5);

// =============================================================================
// Harness
// =============================================================================

struct Harness {
    bar_input: Option<DuplexStream>,
    lines: mpsc::UnboundedReceiver<String>,
    seen: Vec<String>,
    shutdown: ShutdownHandle,
    snapshots: watch::Receiver<Snapshot>,
    state: watch::Receiver<LifecycleState>,
    run: JoinHandle<Result<(), StatusError>>,
}

fn boxed(producer: impl Producer) -> Box<dyn Producer> {
    Box::new(producer)
}

fn start(config: SupervisorConfig, producers: Vec<Box<dyn Producer>>) -> Harness {
    let (bar_input, our_input) = tokio::io::duplex(4096);
    let (our_output, bar_output) = tokio::io::duplex(64 * 1024);

    let mut supervisor = Supervisor::new(config);
    for producer in producers {
        supervisor.add_boxed_producer(producer);
    }
    let shutdown = supervisor.shutdown_handle();
    let snapshots = supervisor.subscribe();
    let state = supervisor.subscribe_state();

    let (line_tx, lines) = mpsc::unbounded_channel();
    tokio::spawn(async move {
        let mut reader = BufReader::new(bar_output).lines();
        while let Ok(Some(line)) = reader.next_line().await {
            if line_tx.send(line).is_err() {
                break;
            }
        }
    });

    let run = tokio::spawn(supervisor.run(our_input, our_output));

    Harness {
        bar_input: Some(bar_input),
        lines,
        seen: Vec::new(),
        shutdown,
        snapshots,
        state,
        run,
    }
}

impl Harness {
    /// Wait for a block stream line matching `pred`
    async fn wait_for_line(&mut self, pred: impl Fn(&str) -> bool) -> String {
        loop {
            let line = tokio::time::timeout(WAIT, self.lines.recv())
                .await
                .expect("timed out waiting for block stream line")
                .expect("block stream ended before expected line");
            self.seen.push(line.clone());
            if pred(&line) {
                return line;
            }
        }
    }

    /// Wait for a snapshot whose blocks match `pred`
    async fn wait_for_snapshot(&mut self, pred: impl Fn(&[Block]) -> bool) -> Snapshot {
        tokio::time::timeout(WAIT, self.snapshots.wait_for(|s| pred(&s.blocks)))
            .await
            .expect("timed out waiting for snapshot")
            .expect("aggregator gone")
            .clone()
    }

    /// Write raw bytes as the bar would on our stdin
    async fn bar_writes(&mut self, bytes: &[u8]) {
        let input = self.bar_input.as_mut().expect("bar input already closed");
        input.write_all(bytes).await.unwrap();
        input.flush().await.unwrap();
    }

    /// Open the click event array and send one click
    async fn click(&mut self, event: &ClickEvent, first: bool) {
        let mut bytes = Vec::new();
        if first {
            bytes.extend_from_slice(b"[\n");
        } else {
            bytes.push(b',');
        }
        bytes.extend_from_slice(&serde_json::to_vec(event).unwrap());
        bytes.push(b'\n');
        self.bar_writes(&bytes).await;
    }

    /// Wait for the run to end and collect the whole block stream
    async fn finish(mut self) -> (Result<(), StatusError>, Vec<String>, LifecycleState) {
        let result = tokio::time::timeout(WAIT, &mut self.run)
            .await
            .expect("run did not drain")
            .expect("run task panicked");
        drop(self.bar_input.take());

        while let Some(line) = tokio::time::timeout(WAIT, self.lines.recv())
            .await
            .expect("block stream never ended")
        {
            self.seen.push(line);
        }
        let state = *self.state.borrow();
        (result, self.seen, state)
    }
}

/// Parse one body line (with or without its leading comma)
fn parse_body(line: &str) -> Option<Vec<Block>> {
    let json = line.strip_prefix(',').unwrap_or(line);
    if !json.starts_with('[') || json == "[" {
        return None;
    }
    serde_json::from_str(json).ok()
}

fn texts(blocks: &[Block]) -> Vec<(&str, &str)> {
    blocks
        .iter()
        .map(|b| (b.name.as_str(), b.full_text.as_str()))
        .collect()
}

fn quick_config() -> SupervisorConfig {
    SupervisorConfig {
        shutdown_grace: Duration::from_millis(200),
        ..SupervisorConfig::default()
    }
}

// =============================================================================
// Snapshot Content
// =============================================================================

/// The canonical upsert / upsert / remove sequence ends with only the volume
/// block on the wire, and a clean shutdown closes the array.
#[tokio::test]
async fn test_upsert_upsert_remove_reaches_the_bar() {
    let producer = producer_fn("demo", |ctx| async move {
        let emitter = ctx.emitter();
        emitter.emit(Block::new("00-time").with_full_text("12:00"))?;
        emitter.emit(Block::new("10-volume").with_full_text("🔊80%"))?;
        emitter.remove(BlockKey::new("00-time"))?;
        ctx.cancelled().await;
        anyhow::Ok(())
    });
    let mut harness = start(quick_config(), vec![boxed(producer)]);

    harness
        .wait_for_line(|line| {
            parse_body(line).is_some_and(|blocks| texts(&blocks) == vec![("10-volume", "🔊80%")])
        })
        .await;

    harness.shutdown.shutdown();
    let (result, lines, state) = harness.finish().await;

    assert!(result.is_ok(), "unexpected error: {result:?}");
    assert_eq!(state, LifecycleState::Drained);

    let header: Header = serde_json::from_str(&lines[0]).unwrap();
    assert_eq!(header, Header::default());
    assert_eq!(lines[1], "[");
    assert!(!lines[2].starts_with(','), "first snapshot has no comma");
    assert!(lines[3..lines.len() - 1].iter().all(|l| l.starts_with(',')));
    assert_eq!(lines.last().map(String::as_str), Some("]"));
}

/// Instances of the same name appear in ascending order, after lower names.
#[tokio::test]
async fn test_blocks_are_ordered_by_name_then_instance() {
    let producer = producer_fn("network", |ctx| async move {
        let emitter = ctx.emitter();
        emitter.emit(
            Block::new("30-net")
                .with_instance("wlan0")
                .with_full_text("📶 wlan0 up"),
        )?;
        emitter.emit(
            Block::new("30-net")
                .with_instance("eth0")
                .with_full_text("🖧 eth0 up"),
        )?;
        emitter.emit(Block::new("00-time").with_full_text("12:00"))?;
        ctx.cancelled().await;
        anyhow::Ok(())
    });
    let mut harness = start(quick_config(), vec![boxed(producer)]);

    let snapshot = harness.wait_for_snapshot(|blocks| blocks.len() == 3).await;
    assert_eq!(
        snapshot.keys(),
        vec![
            BlockKey::new("00-time"),
            BlockKey::with_instance("30-net", "eth0"),
            BlockKey::with_instance("30-net", "wlan0"),
        ]
    );

    harness.shutdown.shutdown();
    let (result, _, _) = harness.finish().await;
    assert!(result.is_ok());
}

/// With click events disabled the header says so and stdin is never read,
/// so an input already at end-of-file does not stop the bar.
#[tokio::test]
async fn test_click_events_disabled_ignores_input() {
    let config = SupervisorConfig {
        header: Header {
            click_events: false,
            ..Header::default()
        },
        ..quick_config()
    };
    let producer = producer_fn("clock", |ctx| async move {
        ctx.emitter()
            .emit(Block::new("00-time").with_full_text("12:00"))?;
        ctx.cancelled().await;
        anyhow::Ok(())
    });

    let mut supervisor = Supervisor::new(config);
    supervisor.add_producer(producer);
    let shutdown = supervisor.shutdown_handle();
    let mut state = supervisor.subscribe_state();
    let mut snapshots = supervisor.subscribe();
    let (our_output, bar_output) = tokio::io::duplex(64 * 1024);
    let run = tokio::spawn(supervisor.run(tokio::io::empty(), our_output));

    tokio::time::timeout(WAIT, snapshots.wait_for(|s| s.len() == 1))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(*state.borrow_and_update(), LifecycleState::Running);

    shutdown.shutdown();
    assert!(tokio::time::timeout(WAIT, run).await.unwrap().unwrap().is_ok());

    let mut reader = BufReader::new(bar_output).lines();
    let header = reader.next_line().await.unwrap().unwrap();
    assert_eq!(header, "{\"version\":1}");
}

// =============================================================================
// Click Routing
// =============================================================================

/// A handler that upserts its own block while being invoked does not
/// deadlock, and its upsert shows up in a later snapshot. A click on a block
/// nobody knows is dropped without stopping anything.
#[tokio::test]
async fn test_reentrant_click_handler_updates_bar() {
    let producer = producer_fn("clock", |ctx| async move {
        let emitter = ctx.emitter().clone();
        let key = BlockKey::new("00-time");

        let inner = emitter.clone();
        emitter.on_click(key.clone(), move |event| {
            if event.button == 1 {
                let _ = inner.emit(Block::new("00-time").with_full_text("Mon Jan 2"));
            }
        })?;
        emitter.emit(Block::for_key(&key).with_full_text("12:00"))?;

        ctx.cancelled().await;
        anyhow::Ok(())
    });
    let mut harness = start(quick_config(), vec![boxed(producer)]);

    harness.wait_for_line(|line| line.contains("12:00")).await;

    harness
        .click(&ClickEvent::left_click(&BlockKey::new("99-gone")), true)
        .await;
    harness
        .click(&ClickEvent::left_click(&BlockKey::new("00-time")), false)
        .await;

    let line = harness
        .wait_for_line(|line| line.contains("Mon Jan 2"))
        .await;
    assert!(line.starts_with(','));
    assert_eq!(*harness.state.borrow(), LifecycleState::Running);

    harness.shutdown.shutdown();
    let (result, lines, _) = harness.finish().await;
    assert!(result.is_ok());
    assert_eq!(lines.last().map(String::as_str), Some("]"));
}

/// The handler receives the full event payload, and only the handler of the
/// clicked instance runs.
#[tokio::test]
async fn test_click_reaches_matching_instance_with_payload() {
    let (seen_tx, mut seen_rx) = mpsc::unbounded_channel::<ClickEvent>();
    let producer = producer_fn("network", move |ctx| async move {
        let emitter = ctx.emitter().clone();
        for iface in ["eth0", "wlan0"] {
            let key = BlockKey::with_instance("30-net", iface);
            let tx = seen_tx.clone();
            emitter.on_click(key.clone(), move |event| {
                let _ = tx.send(event);
            })?;
            emitter.emit(Block::for_key(&key).with_full_text(format!("{iface} up")))?;
        }
        ctx.cancelled().await;
        anyhow::Ok(())
    });
    let mut harness = start(quick_config(), vec![boxed(producer)]);
    harness
        .wait_for_line(|line| parse_body(line).is_some_and(|blocks| blocks.len() == 2))
        .await;

    let event = ClickEvent {
        button: 3,
        x: 1200,
        y: 8,
        relative_x: 14,
        relative_y: 8,
        width: 90,
        height: 22,
        ..ClickEvent::left_click(&BlockKey::with_instance("30-net", "wlan0"))
    };
    harness.click(&event, true).await;

    let received = tokio::time::timeout(WAIT, seen_rx.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(received, event);

    harness.shutdown.shutdown();
    let (result, _, _) = harness.finish().await;
    assert!(result.is_ok());
    assert!(seen_rx.try_recv().is_err(), "handler ran more than once");
}

// =============================================================================
// Termination
// =============================================================================

/// The bar closing our stdin ends the run successfully.
#[tokio::test]
async fn test_input_eof_shuts_down_cleanly() {
    let producer = producer_fn("clock", |ctx| async move {
        ctx.emitter()
            .emit(Block::new("00-time").with_full_text("12:00"))?;
        ctx.cancelled().await;
        anyhow::Ok(())
    });
    let mut harness = start(quick_config(), vec![boxed(producer)]);
    harness.wait_for_line(|line| line.contains("12:00")).await;

    harness.bar_writes(b"[\n").await;
    drop(harness.bar_input.take());

    let (result, lines, state) = harness.finish().await;
    assert!(result.is_ok(), "unexpected error: {result:?}");
    assert_eq!(state, LifecycleState::Drained);
    assert_eq!(lines.last().map(String::as_str), Some("]"));
}

/// A failing producer stops the bar, its error is the run result, and the
/// block stream is still terminated.
#[tokio::test]
async fn test_producer_failure_is_run_result() {
    let healthy = producer_fn("clock", |ctx| async move {
        ctx.emitter()
            .emit(Block::new("00-time").with_full_text("12:00"))?;
        ctx.cancelled().await;
        anyhow::Ok(())
    });
    let failing = producer_fn("battery", |ctx| async move {
        ctx.emitter().emit(Block::new("20-battery"))?;
        Err::<(), _>(anyhow::anyhow!("no such device: BAT9"))
    });
    let harness = start(quick_config(), vec![boxed(healthy), boxed(failing)]);

    let (result, lines, state) = harness.finish().await;
    match result {
        Err(StatusError::Producer { name, source }) => {
            assert_eq!(name, "battery");
            assert!(source.to_string().contains("BAT9"));
        }
        other => panic!("unexpected result: {other:?}"),
    }
    assert_eq!(state, LifecycleState::Drained);
    assert_eq!(lines.last().map(String::as_str), Some("]"));
}

/// A producer that panics is reported as `TaskPanicked`.
#[tokio::test]
async fn test_producer_panic_is_fatal() {
    let producer = producer_fn("boom", |_ctx| async move {
        if true {
            panic!("producer bug");
        }
        anyhow::Ok(())
    });
    let harness = start(quick_config(), vec![boxed(producer)]);

    let (result, lines, _) = harness.finish().await;
    match result {
        Err(StatusError::TaskPanicked { task, message }) => {
            assert_eq!(task, "producer boom");
            assert_eq!(message, "producer bug");
        }
        other => panic!("unexpected result: {other:?}"),
    }
    assert_eq!(lines.last().map(String::as_str), Some("]"));
}

/// Garbage on stdin is a decode error.
#[tokio::test]
async fn test_malformed_input_is_decode_error() {
    let producer = producer_fn("idle", |ctx| async move {
        ctx.cancelled().await;
        anyhow::Ok(())
    });
    let mut harness = start(quick_config(), vec![boxed(producer)]);
    harness.bar_writes(b"this is not json\n").await;

    let (result, _, _) = harness.finish().await;
    assert!(matches!(result, Err(StatusError::Decode(_))));
}

/// A producer returning `Ok` early is retired: its blocks disappear and the
/// rest of the bar keeps running.
#[tokio::test]
async fn test_early_producer_exit_removes_its_blocks() {
    let (release_tx, release_rx) = oneshot::channel::<()>();
    let oneshot_producer = producer_fn("once", |ctx| async move {
        ctx.emitter()
            .emit(Block::new("05-once").with_full_text("hello"))?;
        let _ = release_rx.await;
        anyhow::Ok(())
    });
    let clock = producer_fn("clock", |ctx| async move {
        ctx.emitter()
            .emit(Block::new("00-time").with_full_text("12:00"))?;
        ctx.cancelled().await;
        anyhow::Ok(())
    });
    let mut harness = start(quick_config(), vec![boxed(oneshot_producer), boxed(clock)]);

    harness
        .wait_for_snapshot(|blocks| blocks.len() == 2)
        .await;
    release_tx.send(()).unwrap();

    let snapshot = harness
        .wait_for_snapshot(|blocks| texts(blocks) == vec![("00-time", "12:00")])
        .await;
    assert_eq!(snapshot.len(), 1);
    assert_eq!(*harness.state.borrow(), LifecycleState::Running);

    harness.shutdown.shutdown();
    let (result, _, _) = harness.finish().await;
    assert!(result.is_ok());
}

/// A producer that ignores cancellation delays drain past the grace period
/// but is waited for, never aborted.
#[tokio::test]
async fn test_slow_producer_is_waited_for() {
    let (release_tx, release_rx) = oneshot::channel::<()>();
    let (finished_tx, mut finished_rx) = oneshot::channel::<()>();
    let stubborn = producer_fn("stubborn", |_ctx| async move {
        let _ = release_rx.await;
        let _ = finished_tx.send(());
        anyhow::Ok(())
    });
    let config = SupervisorConfig {
        shutdown_grace: Duration::from_millis(10),
        ..SupervisorConfig::default()
    };
    let mut harness = start(config, vec![boxed(stubborn)]);

    harness.shutdown.shutdown();
    tokio::time::timeout(
        WAIT,
        harness.state.wait_for(|s| *s == LifecycleState::Canceling),
    )
    .await
    .unwrap()
    .unwrap();

    // Well past the grace period, still waiting on the producer
    assert!(tokio::time::timeout(Duration::from_millis(100), &mut harness.run)
        .await
        .is_err());
    assert!(finished_rx.try_recv().is_err());

    release_tx.send(()).unwrap();
    let (result, lines, state) = harness.finish().await;
    assert!(result.is_ok());
    assert_eq!(state, LifecycleState::Drained);
    assert_eq!(lines.last().map(String::as_str), Some("]"));
}
