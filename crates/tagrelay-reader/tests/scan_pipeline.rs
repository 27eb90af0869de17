//! End-to-end tests for the reader worker: command serialization, lifecycle
//! validation, and the detection → dedup → stream pipeline.

use std::time::Duration;

use tagrelay_core::{Error, MemoryBank, RawDetection, ReaderState};
use tagrelay_reader::mock::{MockReader, MockReaderHandle};
use tagrelay_reader::processor::TagStreams;
use tagrelay_reader::{AnyReader, ReaderChannel, ReaderChannelConfig, ReaderHandle, filter_for_value};
use tokio::sync::mpsc;

fn spawn_reader(config: ReaderChannelConfig) -> (ReaderHandle, MockReaderHandle, TagStreams) {
    let (raw_tx, raw_rx) = mpsc::channel(256);
    let (reader, mock) = MockReader::new(raw_tx);
    let (handle, streams, _join) = ReaderChannel::spawn(AnyReader::Mock(reader), raw_rx, config);
    (handle, mock, streams)
}

async fn settle() {
    // Give the worker a turn to drain forwarded detections.
    tokio::time::sleep(Duration::from_millis(50)).await;
}

#[tokio::test]
async fn continuous_scan_dedups_and_counts() {
    let (handle, mock, mut streams) = spawn_reader(ReaderChannelConfig::default());

    handle.initialize().await.unwrap();
    handle.start_continuous_scan(None).await.unwrap();
    assert_eq!(handle.state(), ReaderState::Scanning);
    assert!(mock.inventory_running());

    mock.present_tag("TIDA", "3000AAAA", -52.0, 915.25).await;
    mock.present_tag("TIDA", "3000AAAA", -47.0, 915.25).await;
    mock.present_tag("TIDB", "3000BBBB", -60.0, 916.75).await;
    settle().await;

    let summary = handle.processor().summary();
    assert_eq!(summary.tag_count, 3);
    assert_eq!(summary.unique_count, 2);

    // Exactly 2 first-seen emissions in first-arrival order.
    assert_eq!(streams.first_seen.recv().await.unwrap().tag_id, "TIDA");
    assert_eq!(streams.first_seen.recv().await.unwrap().tag_id, "TIDB");
    assert!(streams.first_seen.try_recv().is_err());

    // Exactly 3 every-read emissions in arrival order.
    let mut seen = Vec::new();
    while let Ok(event) = streams.every_read.try_recv() {
        seen.push(event.tag_id);
    }
    assert_eq!(seen, vec!["TIDA", "TIDA", "TIDB"]);

    handle.stop_continuous_scan().await.unwrap();
    assert_eq!(handle.state(), ReaderState::Ready);
    assert!(!mock.inventory_running());
}

#[tokio::test]
async fn restart_resets_the_round() {
    let (handle, mock, mut streams) = spawn_reader(ReaderChannelConfig::default());

    handle.initialize().await.unwrap();
    handle.start_continuous_scan(None).await.unwrap();
    mock.present_tag("TIDA", "3000AAAA", -52.0, 915.25).await;
    settle().await;
    let first = streams.first_seen.recv().await.unwrap();

    handle.stop_continuous_scan().await.unwrap();
    handle.start_continuous_scan(None).await.unwrap();
    mock.present_tag("TIDA", "3000AAAA", -52.0, 915.25).await;
    settle().await;
    let again = streams.first_seen.recv().await.unwrap();

    // Previously-seen tag is first-seen again in the new round.
    assert_eq!(again.tag_id, "TIDA");
    assert_eq!(again.seen_count, 1);
    assert!(again.round_id > first.round_id);
}

#[tokio::test]
async fn detections_outside_scanning_are_dropped() {
    let (handle, mock, mut streams) = spawn_reader(ReaderChannelConfig::default());

    handle.initialize().await.unwrap();
    // Never started scanning; a stray callback must not reach the streams.
    mock.present_tag("TIDA", "3000AAAA", -52.0, 915.25).await;
    settle().await;

    assert_eq!(handle.processor().summary().tag_count, 0);
    assert!(streams.every_read.try_recv().is_err());
    assert!(streams.first_seen.try_recv().is_err());
}

#[tokio::test]
async fn operations_are_rejected_in_wrong_states() {
    let (handle, _mock, _streams) = spawn_reader(ReaderChannelConfig::default());

    let target = filter_for_value(MemoryBank::Tid, "E280").unwrap();

    // Writing is only reachable from Ready, never from Init.
    let err = handle
        .write_tag_epc(target.clone(), "3000CCCC")
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Lifecycle { .. }));
    assert_eq!(handle.state(), ReaderState::Init);

    handle.initialize().await.unwrap();
    handle.start_continuous_scan(None).await.unwrap();

    // ... and never from Scanning either; the state is left unchanged.
    let err = handle.write_tag_epc(target, "3000CCCC").await.unwrap_err();
    assert!(matches!(err, Error::Lifecycle { .. }));
    assert_eq!(handle.state(), ReaderState::Scanning);
}

#[tokio::test]
async fn scan_applies_filter_then_inventory() {
    let (handle, mock, _streams) = spawn_reader(ReaderChannelConfig::default());

    handle.initialize().await.unwrap();
    let spec = filter_for_value(MemoryBank::Epc, "3000AB").unwrap();
    handle.start_continuous_scan(Some(spec.clone())).await.unwrap();

    let applied = mock.applied_filters();
    assert_eq!(applied.last().unwrap(), &spec);
    assert!(mock.inventory_running());
}

#[tokio::test]
async fn tag_hunt_uses_target_bank() {
    let (handle, mock, _streams) = spawn_reader(ReaderChannelConfig::default());

    handle.initialize().await.unwrap();
    handle.start_tag_hunt(MemoryBank::Tid, "E28011").await.unwrap();

    let expected = filter_for_value(MemoryBank::Tid, "E28011").unwrap();
    assert_eq!(mock.applied_filters().last().unwrap(), &expected);
    handle.stop_tag_hunt().await.unwrap();
    assert_eq!(handle.state(), ReaderState::Ready);
}

#[tokio::test]
async fn tag_hunt_rejects_bad_hex_without_reaching_hardware() {
    let (handle, mock, _streams) = spawn_reader(ReaderChannelConfig::default());

    handle.initialize().await.unwrap();
    let err = handle.start_tag_hunt(MemoryBank::Tid, "NOPE").await.unwrap_err();
    assert!(matches!(err, Error::InvalidFilter { .. }));
    assert!(mock.applied_filters().is_empty());
    assert_eq!(handle.state(), ReaderState::Ready);
}

#[tokio::test]
async fn inventory_scan_clears_filter() {
    let (handle, mock, _streams) = spawn_reader(ReaderChannelConfig::default());

    handle.initialize().await.unwrap();
    handle.start_inventory_scan().await.unwrap();

    let applied = mock.applied_filters();
    assert!(applied.last().unwrap().is_clear());
    handle.stop_inventory_scan().await.unwrap();
}

#[tokio::test]
async fn write_epc_round_trips_through_writing_state() {
    let (handle, mock, _streams) = spawn_reader(ReaderChannelConfig::default());

    handle.initialize().await.unwrap();
    let target = filter_for_value(MemoryBank::Tid, "E2801160").unwrap();
    handle.write_tag_epc(target.clone(), "3000DDDD").await.unwrap();

    let written = mock.written_epcs();
    assert_eq!(written.len(), 1);
    assert_eq!(written[0].0, target);
    assert_eq!(written[0].1, "3000DDDD");

    // Write leaves no target filter behind.
    assert!(mock.applied_filters().last().unwrap().is_clear());
    assert_eq!(handle.state(), ReaderState::Ready);
}

#[tokio::test]
async fn read_single_tag_returns_queued_detection() {
    let (handle, mock, _streams) = spawn_reader(ReaderChannelConfig::default());

    handle.initialize().await.unwrap();
    mock.queue_single_read(RawDetection {
        tid: "E2801160".into(),
        epc: "3000EEEE".into(),
        rssi: -44.0,
        frequency: 915.25,
    });

    let event = handle.read_single_tag().await.unwrap().unwrap();
    assert_eq!(event.tag_id, "E2801160");
    assert_eq!(event.seen_count, 1);
    assert_eq!(handle.state(), ReaderState::Ready);

    let none = handle.read_single_tag().await.unwrap();
    assert!(none.is_none());
}

#[tokio::test]
async fn hardware_fault_moves_reader_to_error() {
    let (handle, mock, _streams) = spawn_reader(ReaderChannelConfig::default());

    handle.initialize().await.unwrap();
    mock.fail_next_op("radio fault");

    let err = handle.start_continuous_scan(None).await.unwrap_err();
    assert!(matches!(err, Error::Hardware { .. }));
    assert_eq!(handle.state(), ReaderState::Error);
}

#[tokio::test]
async fn slow_operation_times_out_without_killing_the_worker() {
    let config = ReaderChannelConfig {
        op_timeout: Duration::from_millis(50),
        ..ReaderChannelConfig::default()
    };
    let (handle, mock, _streams) = spawn_reader(config);

    mock.hang_next_op(Duration::from_millis(300));
    let err = handle.initialize().await.unwrap_err();
    assert!(matches!(err, Error::Timeout { duration_ms: 50 }));

    // The worker finished the abandoned op on its own schedule and stays
    // consistent: the next operation still works.
    tokio::time::sleep(Duration::from_millis(400)).await;
    assert_eq!(handle.state(), ReaderState::Ready);
}

#[tokio::test]
async fn full_command_queue_still_honors_the_deadline() {
    let config = ReaderChannelConfig {
        op_timeout: Duration::from_millis(50),
        ..ReaderChannelConfig::default()
    };
    let (handle, mock, _streams) = spawn_reader(config);

    // Wedge the worker, then stack up more commands than the queue holds so
    // a late caller has to wait for queue space, not just for its reply.
    mock.hang_next_op(Duration::from_millis(500));
    let mut backlog = Vec::new();
    for _ in 0..40 {
        let h = handle.clone();
        backlog.push(tokio::spawn(async move { h.set_power(20).await }));
    }
    settle().await;

    let started = std::time::Instant::now();
    let err = handle.set_power(21).await.unwrap_err();
    assert!(matches!(err, Error::Timeout { duration_ms: 50 }));
    assert!(
        started.elapsed() < Duration::from_millis(400),
        "deadline must cover queue wait, not start after it"
    );

    for task in backlog {
        let _ = task.await;
    }
}

#[tokio::test]
async fn shutdown_then_fail_fast_then_reinitialize() {
    let (handle, mock, _streams) = spawn_reader(ReaderChannelConfig::default());

    handle.initialize().await.unwrap();
    handle.shutdown().await.unwrap();
    assert_eq!(handle.state(), ReaderState::Sleeping);
    assert!(!mock.initialized());

    // Operations after shutdown fail fast instead of queuing.
    let err = handle.start_continuous_scan(None).await.unwrap_err();
    assert!(matches!(err, Error::NotReady { .. }));

    // Sleeping -> Configuring: a new initialize wakes the reader.
    handle.initialize().await.unwrap();
    assert_eq!(handle.state(), ReaderState::Ready);
}

#[tokio::test]
async fn suspend_stops_scanning_but_keeps_the_worker() {
    let (handle, mock, _streams) = spawn_reader(ReaderChannelConfig::default());

    handle.initialize().await.unwrap();
    handle.start_continuous_scan(None).await.unwrap();

    handle.suspend().await.unwrap();
    assert_eq!(handle.state(), ReaderState::Ready);
    assert!(!mock.inventory_running());

    // Idempotent when idle.
    handle.suspend().await.unwrap();

    // Scanning can resume afterwards.
    handle.start_continuous_scan(None).await.unwrap();
    assert_eq!(handle.state(), ReaderState::Scanning);
}

#[tokio::test]
async fn commands_execute_in_submission_order() {
    let (handle, mock, _streams) = spawn_reader(ReaderChannelConfig::default());
    handle.initialize().await.unwrap();

    // Submit start and stop concurrently; join! polls in order so the start
    // command enters the queue first, and FIFO execution means the stop
    // observes the started state.
    let (start, stop) = tokio::join!(
        handle.start_continuous_scan(None),
        handle.stop_continuous_scan()
    );

    start.unwrap();
    stop.unwrap();
    assert_eq!(handle.state(), ReaderState::Ready);
    assert!(!mock.inventory_running());
}
