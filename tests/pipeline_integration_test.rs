//! End-to-end behaviour of the pipeline runner over in-memory items.

mod common;

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use common::{seq_source, wait_until, AckLedger, RecordingPublisher, Script, ScriptedProcessor};
use reactive_tools::config::PipelineConfig;
use reactive_tools::error::ToolkitError;
use reactive_tools::pipeline::PipelineRunner;

const WAIT: Duration = Duration::from_secs(5);

#[tokio::test]
async fn test_five_items_parallelism_two_publish_once_and_ack_highest() {
    let ledger = AckLedger::new();
    let (_hold_open, source) = seq_source(5, &ledger);
    let processor = Arc::new(ScriptedProcessor::new().with_default_delay(Duration::from_millis(3)));
    let publisher = Arc::new(RecordingPublisher::new());

    let runner = PipelineRunner::new(PipelineConfig::for_test(2), source, processor.clone())
        .unwrap()
        .with_publisher(publisher.clone());
    let stats = runner.stats();

    let cancel = CancellationToken::new();
    let handle = tokio::spawn(runner.run(cancel.clone()));

    assert!(wait_until(WAIT, || ledger.last_acked() == Some(5)).await);
    cancel.cancel();
    let result = tokio::time::timeout(WAIT, handle).await.unwrap().unwrap();
    assert!(result.is_ok());

    assert_eq!(processor.outcomes(), vec![1, 2, 3, 4, 5]);
    assert_eq!(publisher.published(), vec![1, 2, 3, 4, 5]);
    assert_eq!(publisher.calls(), 5);
    assert!(processor.peak() <= 2);

    // Acknowledgments only ever move forward
    let acked = ledger.acked();
    assert!(acked.windows(2).all(|pair| pair[0] < pair[1]));
    assert_eq!(stats.get_dispatched(), 5);
    assert_eq!(stats.get_published(), 5);
}

#[tokio::test]
async fn test_always_skip_publishes_nothing_but_still_acks() {
    let ledger = AckLedger::new();
    let (tx, source) = seq_source(4, &ledger);
    drop(tx);
    let processor = Arc::new(ScriptedProcessor::skipping_everything());
    let publisher = Arc::new(RecordingPublisher::new());

    let runner = PipelineRunner::new(PipelineConfig::for_test(2), source, processor.clone())
        .unwrap()
        .with_publisher(publisher.clone());
    let stats = runner.stats();

    runner.run(CancellationToken::new()).await.unwrap();

    assert!(processor.outcomes().is_empty());
    assert_eq!(publisher.calls(), 0);
    assert_eq!(stats.get_skipped(), 4);
    assert_eq!(ledger.last_acked(), Some(4));
}

#[tokio::test]
async fn test_failing_processor_retries_while_holding_its_slot() {
    let ledger = AckLedger::new();
    let (tx, source) = seq_source(2, &ledger);
    drop(tx);
    let processor = Arc::new(ScriptedProcessor::new().with_script(
        1,
        Script {
            failures: 3,
            ..Script::default()
        },
    ));
    let publisher = Arc::new(RecordingPublisher::new());

    let runner = PipelineRunner::new(PipelineConfig::for_test(1), source, processor.clone())
        .unwrap()
        .with_publisher(publisher.clone());
    let stats = runner.stats();

    runner.run(CancellationToken::new()).await.unwrap();

    // Item 2 is not admitted until item 1 finally succeeds
    assert_eq!(processor.attempts(), vec![1, 1, 1, 1, 2]);
    assert_eq!(processor.outcomes(), vec![1, 2]);
    assert_eq!(publisher.published(), vec![1, 2]);
    assert_eq!(stats.get_process_failures(), 3);
    assert_eq!(ledger.last_acked(), Some(2));
}

#[tokio::test]
async fn test_publish_failures_are_retried() {
    let ledger = AckLedger::new();
    let (tx, source) = seq_source(1, &ledger);
    drop(tx);
    let publisher = Arc::new(RecordingPublisher::failing_first(2));

    let runner = PipelineRunner::new(
        PipelineConfig::for_test(1),
        source,
        Arc::new(ScriptedProcessor::new()),
    )
    .unwrap()
    .with_publisher(publisher.clone());
    let stats = runner.stats();

    runner.run(CancellationToken::new()).await.unwrap();

    assert_eq!(publisher.calls(), 3);
    assert_eq!(publisher.published(), vec![1]);
    assert_eq!(stats.get_publish_failures(), 2);
    assert_eq!(ledger.acked(), vec![1]);
}

#[tokio::test]
async fn test_parallelism_is_never_exceeded() {
    for parallelism in [1, 3, 8] {
        let ledger = AckLedger::new();
        let (tx, source) = seq_source(24, &ledger);
        drop(tx);
        let processor =
            Arc::new(ScriptedProcessor::new().with_default_delay(Duration::from_millis(2)));

        let runner = PipelineRunner::new(
            PipelineConfig::for_test(parallelism),
            source,
            processor.clone(),
        )
        .unwrap();
        runner.run(CancellationToken::new()).await.unwrap();

        assert!(processor.peak() <= parallelism);
        assert_eq!(processor.outcomes().len(), 24);
        assert_eq!(ledger.last_acked(), Some(24));
    }
}

#[tokio::test]
async fn test_queued_acknowledgments_are_coalesced() {
    let ledger = AckLedger::new();
    let (tx, source) = seq_source(4, &ledger);
    drop(tx);

    // Item 1 finishes first; its ack keeps failing while 2..4 finish and queue up
    let slow = Script {
        delay: Duration::from_millis(20),
        ..Script::default()
    };
    let processor = Arc::new(
        ScriptedProcessor::new()
            .with_script(2, slow.clone())
            .with_script(3, slow.clone())
            .with_script(4, slow),
    );
    ledger.fail_next_acks(20);

    let runner = PipelineRunner::new(PipelineConfig::for_test(4), source, processor).unwrap();
    let stats = runner.stats();
    runner.run(CancellationToken::new()).await.unwrap();

    assert_eq!(ledger.acked(), vec![1, 4]);
    assert_eq!(stats.get_coalesced(), 2);
    assert_eq!(stats.get_ack_failures(), 20);
}

#[tokio::test]
async fn test_nothing_acknowledged_past_an_unfinished_item() {
    let ledger = AckLedger::new();
    let (_hold_open, source) = seq_source(3, &ledger);
    let processor = Arc::new(ScriptedProcessor::new().with_script(
        1,
        Script {
            delay: Duration::from_millis(80),
            ..Script::default()
        },
    ));

    let runner = PipelineRunner::new(PipelineConfig::for_test(3), source, processor.clone())
        .unwrap();
    let cancel = CancellationToken::new();
    let handle = tokio::spawn(runner.run(cancel.clone()));

    // Items 2 and 3 are done long before item 1
    assert!(wait_until(WAIT, || processor.outcomes() == vec![2, 3]).await);
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(ledger.acked().is_empty());

    assert!(wait_until(WAIT, || ledger.last_acked() == Some(3)).await);
    cancel.cancel();
    tokio::time::timeout(WAIT, handle).await.unwrap().unwrap().unwrap();
}

#[tokio::test]
async fn test_item_without_outcome_is_never_committed_past() {
    let ledger = AckLedger::new();
    let (tx, source) = seq_source(3, &ledger);
    drop(tx);
    let processor = Arc::new(ScriptedProcessor::new().with_script(
        1,
        Script {
            panic: true,
            ..Script::default()
        },
    ));
    let publisher = Arc::new(RecordingPublisher::new());

    let runner = PipelineRunner::new(PipelineConfig::for_test(3), source, processor.clone())
        .unwrap()
        .with_publisher(publisher.clone());

    let result = tokio::time::timeout(WAIT, runner.run(CancellationToken::new()))
        .await
        .unwrap();

    // Items 2 and 3 finished, but acknowledging them would commit past item 1
    assert!(matches!(result, Err(ToolkitError::Internal { .. })));
    assert!(ledger.acked().is_empty());
    assert!(!publisher.published().contains(&1));
}

#[tokio::test]
async fn test_cancel_returns_promptly_with_stuck_processor() {
    let ledger = AckLedger::new();
    let (_hold_open, source) = seq_source(2, &ledger);
    let processor = Arc::new(ScriptedProcessor::new().with_script(
        1,
        Script {
            failures: u32::MAX,
            ..Script::default()
        },
    ));

    let runner = PipelineRunner::new(PipelineConfig::for_test(1), source, processor.clone())
        .unwrap();
    let cancel = CancellationToken::new();
    let handle = tokio::spawn(runner.run(cancel.clone()));

    assert!(wait_until(WAIT, || processor.attempts().len() >= 3).await);
    cancel.cancel();

    let result = tokio::time::timeout(Duration::from_secs(1), handle).await;
    assert!(result.unwrap().unwrap().is_ok());
    assert!(ledger.acked().is_empty());
}

#[tokio::test]
async fn test_closed_source_drains_before_returning() {
    let ledger = AckLedger::new();
    let (tx, source) = seq_source(6, &ledger);
    drop(tx);
    let processor =
        Arc::new(ScriptedProcessor::new().with_default_delay(Duration::from_millis(5)));
    let publisher = Arc::new(RecordingPublisher::new());

    let runner = PipelineRunner::new(PipelineConfig::for_test(3), source, processor)
        .unwrap()
        .with_publisher(publisher.clone());

    tokio::time::timeout(WAIT, runner.run(CancellationToken::new()))
        .await
        .unwrap()
        .unwrap();

    assert_eq!(publisher.published(), vec![1, 2, 3, 4, 5, 6]);
    assert_eq!(ledger.last_acked(), Some(6));
}
