//! Event-driven leaf ingestion and recovery for canopy.
//!
//! The pipeline: a ledger subscription delivers raw events
//! (at-least-once, possibly out of order); [`IngestionDispatcher`]
//! decodes and maps them to leaf records and hands the idempotent
//! writes off without blocking the delivery callback;
//! [`RecoveryCoordinator`] decides, at startup, the block to resume
//! the subscription from; [`GapDetector`] reports missing leaf indices
//! for reconciliation.
//!
//! No lock coordinates concurrent writers — the leaf store's unique
//! key on `leaf_index` makes replays and reordering safe, and the
//! checkpoint only ever advances.

#![deny(unsafe_code)]

pub mod dispatcher;
pub mod event;
pub mod gaps;
pub mod recovery;
pub mod subscriber;
pub mod transport;

pub use dispatcher::{
    DispatchError, IngestError, IngestFailure, IngestOutcome, IngestTicket, IngestionDispatcher,
};
pub use event::{DecodeError, LeafEvent, ParamValue, RawEvent};
pub use gaps::{GapDetector, GapReport};
pub use recovery::{RecoveryCoordinator, RecoveryError, RecoveryState, ResumeBasis, ResumePoint};
pub use subscriber::{Ingestor, IngestorHandle};
pub use transport::{HeadReader, LedgerTransport, Subscription, TransportError};
