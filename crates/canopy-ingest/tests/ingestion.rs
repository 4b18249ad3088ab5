//! End-to-end ingestion tests over a channel-backed fake transport.
//!
//! Exercises the full pipeline: raw events arrive out of order and with
//! duplicates, the dispatcher hands writes off the delivery path, and a
//! fresh coordinator resumes from the right block afterwards.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use canopy_ingest::{
    HeadReader, Ingestor, IngestionDispatcher, LeafEvent, LedgerTransport, ParamValue, RawEvent,
    RecoveryCoordinator, ResumeBasis, Subscription, TransportError,
};
use canopy_store::{CheckpointStore, LeafStore, StorageEngine};
use canopy_types::config::TreeConfig;
use tokio::sync::{mpsc, oneshot};

/// In-process transport: events are pushed by the test, and
/// unsubscribing closes the stream.
#[derive(Clone, Default)]
struct FakeLedger {
    channels: Arc<Mutex<HashMap<String, mpsc::Sender<RawEvent>>>>,
}

impl FakeLedger {
    async fn emit(&self, event: RawEvent) {
        let sender = {
            let channels = self.channels.lock().unwrap();
            channels.get(&event.name).expect("active subscription").clone()
        };
        sender.send(event).await.expect("subscriber alive");
    }
}

impl LedgerTransport for FakeLedger {
    fn subscribe(
        &self,
        event_name: &str,
        _from_block: u64,
    ) -> Result<(Subscription, mpsc::Receiver<RawEvent>), TransportError> {
        let (tx, rx) = mpsc::channel(64);
        let (stop_tx, stop_rx) = oneshot::channel();
        self.channels.lock().unwrap().insert(event_name.to_string(), tx);

        let channels = Arc::clone(&self.channels);
        let name = event_name.to_string();
        tokio::spawn(async move {
            let _ = stop_rx.await;
            channels.lock().unwrap().remove(&name);
        });

        Ok((Subscription::new(event_name, stop_tx), rx))
    }
}

struct FixedHead(u64);

impl HeadReader for FixedHead {
    fn head_block(&self) -> Result<u64, TransportError> {
        Ok(self.0)
    }
}

fn stores() -> (LeafStore, CheckpointStore, TreeConfig) {
    let engine = StorageEngine::in_memory().expect("engine");
    let config = TreeConfig::new(8, 50).expect("config");
    let layout = config.layout().expect("layout");
    (LeafStore::new(&engine, layout), CheckpointStore::new(&engine), config)
}

fn new_leaf(block_number: u64, leaf_index: u64, value: [u8; 32]) -> RawEvent {
    RawEvent {
        name: "NewLeaf".to_string(),
        block_number,
        params: [
            ("leafIndex".to_string(), ParamValue::Uint(leaf_index)),
            ("leafValue".to_string(), ParamValue::Word(value)),
        ]
        .into_iter()
        .collect(),
    }
}

fn new_leaves(block_number: u64, min_leaf_index: u64, values: Vec<[u8; 32]>) -> RawEvent {
    RawEvent {
        name: "NewLeaves".to_string(),
        block_number,
        params: [
            ("minLeafIndex".to_string(), ParamValue::Uint(min_leaf_index)),
            ("leafValues".to_string(), ParamValue::Words(values)),
        ]
        .into_iter()
        .collect(),
    }
}

async fn wait_for_count(leaves: &LeafStore, expected: u64) {
    for _ in 0..200 {
        if leaves.count().expect("count") == expected {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("store never reached {expected} leaves");
}

/// The checkpoint advances after the leaves commit, so it can lag the
/// count briefly even once all writes are visible.
async fn wait_for_checkpoint(checkpoints: &CheckpointStore, leaf_index: u64) {
    for _ in 0..200 {
        if let Some(cp) = checkpoints.get().expect("get checkpoint") {
            if cp.latest_leaf.map(|l| l.leaf_index) == Some(leaf_index) {
                return;
            }
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("checkpoint never reached leaf {leaf_index}");
}

#[tokio::test]
async fn test_out_of_order_and_duplicate_delivery() {
    let (leaves, checkpoints, _) = stores();
    checkpoints.init().unwrap();
    let ledger = FakeLedger::default();
    let dispatcher = IngestionDispatcher::new(leaves.clone(), checkpoints.clone());
    let handle = Ingestor::start(&ledger, dispatcher, 50).expect("start");

    // later leaf first, then the earlier one, then a redelivery
    ledger.emit(new_leaf(101, 1, [0x11; 32])).await;
    ledger.emit(new_leaf(100, 0, [0x00; 32])).await;
    ledger.emit(new_leaf(101, 1, [0x11; 32])).await;
    ledger.emit(new_leaves(102, 2, vec![[0x22; 32], [0x33; 32], [0x44; 32]])).await;

    wait_for_count(&leaves, 5).await;
    wait_for_checkpoint(&checkpoints, 4).await;
    handle.shutdown().await;

    let indices: Vec<u64> = leaves.all().unwrap().iter().map(|r| r.leaf_index).collect();
    assert_eq!(indices, vec![0, 1, 2, 3, 4]);
    assert_eq!(leaves.get_by_index(1).unwrap().unwrap().block_number, 101);

    let latest = checkpoints.get().unwrap().unwrap().latest_leaf.unwrap();
    assert_eq!(latest.leaf_index, 4);
    assert_eq!(latest.block_number, 102);
}

#[tokio::test]
async fn test_dispatch_ticket_reports_outcome() {
    let (leaves, checkpoints, _) = stores();
    checkpoints.init().unwrap();
    let dispatcher = IngestionDispatcher::new(leaves.clone(), checkpoints.clone());

    let batch = LeafEvent::Batch {
        block_number: 200,
        min_leaf_index: 10,
        values: vec![[1u8; 32], [2u8; 32], [3u8; 32]],
    };
    let outcome = dispatcher.dispatch(batch.clone()).unwrap().wait().await.unwrap();
    assert_eq!((outcome.inserted, outcome.duplicates), (3, 0));

    // at-least-once redelivery of the same block
    let outcome = dispatcher.dispatch(batch).unwrap().wait().await.unwrap();
    assert_eq!((outcome.inserted, outcome.duplicates), (0, 3));
    assert_eq!(leaves.count().unwrap(), 3);
}

#[tokio::test]
async fn test_dispatch_rejects_over_capacity_event_synchronously() {
    let (leaves, checkpoints, _) = stores();
    let dispatcher = IngestionDispatcher::new(leaves.clone(), checkpoints);

    // tree height 8 holds 256 leaves; index 256 cannot exist
    let err = dispatcher
        .dispatch(LeafEvent::Single { block_number: 90, leaf_index: 256, value: [9u8; 32] })
        .unwrap_err();
    assert!(err.to_string().contains("mapping failed"));
    assert_eq!(leaves.count().unwrap(), 0);
}

#[tokio::test]
async fn test_dispatch_rejects_wrapping_batch_synchronously() {
    let (leaves, checkpoints, _) = stores();
    let dispatcher = IngestionDispatcher::new(leaves.clone(), checkpoints);

    // minLeafIndex at the top of the index space with two values would
    // wrap the second index back to 0; the event must be refused whole
    let err = dispatcher
        .dispatch(LeafEvent::Batch {
            block_number: 90,
            min_leaf_index: u64::MAX,
            values: vec![[1u8; 32], [2u8; 32]],
        })
        .unwrap_err();
    assert!(err.to_string().contains("overflow"));
    assert_eq!(leaves.count().unwrap(), 0);
    assert!(leaves.get_by_index(0).unwrap().is_none());
}

#[tokio::test]
async fn test_restart_resumes_from_checkpoint_then_repairs_gap() {
    let (leaves, checkpoints, config) = stores();
    checkpoints.init().unwrap();
    let dispatcher = IngestionDispatcher::new(leaves.clone(), checkpoints.clone());

    for (leaf_index, block) in [(0u64, 100u64), (1, 100), (2, 110)] {
        dispatcher
            .dispatch(LeafEvent::Single {
                block_number: block,
                leaf_index,
                value: [leaf_index as u8; 32],
            })
            .unwrap()
            .wait()
            .await
            .unwrap();
    }

    // restart: contiguous history resumes from the checkpointed block
    let mut coordinator =
        RecoveryCoordinator::new(leaves.clone(), checkpoints.clone(), config);
    let resume = coordinator.compute_resume_block(&FixedHead(1000)).unwrap();
    assert_eq!(resume.from_block, 110);
    assert_eq!(resume.basis, ResumeBasis::Checkpoint);

    // leaf 3 (block 115) is lost; leaf 4 at block 120 lands and is
    // checkpointed — the next restart must not skip leaf 3
    dispatcher
        .dispatch(LeafEvent::Single { block_number: 120, leaf_index: 4, value: [4u8; 32] })
        .unwrap()
        .wait()
        .await
        .unwrap();

    let mut coordinator = RecoveryCoordinator::new(leaves, checkpoints, config);
    let resume = coordinator.compute_resume_block(&FixedHead(1000)).unwrap();
    assert_eq!(resume.basis, ResumeBasis::GapRepair { first_missing: 3 });
    assert_eq!(resume.from_block, 110);
}
