//! Ledger events and their decoding into typed leaf events.
//!
//! The transport delivers loosely shaped [`RawEvent`]s: a name, the
//! emitting block, and named parameters. Decoding into a [`LeafEvent`]
//! is an explicit step with its own error kind, so a malformed event is
//! distinguishable from a record that fails integrity validation later.

use std::collections::BTreeMap;

use canopy_types::leaf::LeafCandidate;
use canopy_types::value::LeafValue;
use snafu::Snafu;

/// Event announcing a single appended leaf.
pub const NEW_LEAF_EVENT: &str = "NewLeaf";

/// Event announcing a contiguous batch of appended leaves.
pub const NEW_LEAVES_EVENT: &str = "NewLeaves";

/// A decoded event parameter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParamValue {
    /// An unsigned integer parameter.
    Uint(u64),
    /// A single 32-byte word.
    Word(LeafValue),
    /// An ordered sequence of 32-byte words.
    Words(Vec<LeafValue>),
}

/// An event as delivered by the subscription transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawEvent {
    /// The contract event name.
    pub name: String,
    /// Ledger block the event was emitted in.
    pub block_number: u64,
    /// Decoded parameters, by name.
    pub params: BTreeMap<String, ParamValue>,
}

/// Event decoding error types. Distinct from integrity errors: a
/// decode failure means the event itself is malformed or unknown.
#[derive(Debug, Snafu, PartialEq, Eq)]
pub enum DecodeError {
    /// The event name maps to no known leaf event.
    #[snafu(display("unknown event {name:?}"))]
    UnknownEvent {
        /// The unrecognized name.
        name: String,
    },

    /// A required parameter is absent.
    #[snafu(display("event {event} is missing parameter {param:?}"))]
    MissingParam {
        /// The event being decoded.
        event: &'static str,
        /// The absent parameter.
        param: &'static str,
    },

    /// A parameter is present with the wrong shape.
    #[snafu(display("event {event} parameter {param:?} is not a {expected}"))]
    ParamType {
        /// The event being decoded.
        event: &'static str,
        /// The offending parameter.
        param: &'static str,
        /// The shape that was expected.
        expected: &'static str,
    },

    /// A batch's leaf indices run past the end of the index space.
    /// The event is malformed; wrapping would file values under wrong
    /// indices.
    #[snafu(display(
        "event {event} leaf indices overflow: minLeafIndex {min_leaf_index} with {values} values"
    ))]
    IndexOverflow {
        /// The event being decoded.
        event: &'static str,
        /// The batch's first index.
        min_leaf_index: u64,
        /// Number of values in the batch.
        values: usize,
    },
}

/// A strongly typed leaf event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LeafEvent {
    /// One leaf at a known index.
    Single {
        /// Block the leaf was emitted in.
        block_number: u64,
        /// Index assigned by the ledger.
        leaf_index: u64,
        /// The leaf content.
        value: LeafValue,
    },
    /// A contiguous run of leaves: the value at offset `i` has index
    /// `min_leaf_index + i`, all sharing the event's block.
    Batch {
        /// Block the leaves were emitted in.
        block_number: u64,
        /// Index of the first value.
        min_leaf_index: u64,
        /// The leaf contents, in index order.
        values: Vec<LeafValue>,
    },
}

impl LeafEvent {
    /// Decodes a raw transport event.
    pub fn decode(raw: &RawEvent) -> Result<Self, DecodeError> {
        match raw.name.as_str() {
            NEW_LEAF_EVENT => Ok(Self::Single {
                block_number: raw.block_number,
                leaf_index: uint(raw, NEW_LEAF_EVENT, "leafIndex")?,
                value: word(raw, NEW_LEAF_EVENT, "leafValue")?,
            }),
            NEW_LEAVES_EVENT => Ok(Self::Batch {
                block_number: raw.block_number,
                min_leaf_index: uint(raw, NEW_LEAVES_EVENT, "minLeafIndex")?,
                values: words(raw, NEW_LEAVES_EVENT, "leafValues")?,
            }),
            other => Err(DecodeError::UnknownEvent { name: other.to_string() }),
        }
    }

    /// The block this event was emitted in.
    pub fn block_number(&self) -> u64 {
        match self {
            Self::Single { block_number, .. } | Self::Batch { block_number, .. } => *block_number,
        }
    }

    /// Expands the event into unvalidated leaf candidates, in index
    /// order. Node indices are left for the mapper to derive.
    ///
    /// # Errors
    ///
    /// Returns [`DecodeError::IndexOverflow`] when a batch's indices
    /// would wrap past `u64::MAX`; such an event is rejected whole.
    pub fn candidates(&self) -> Result<Vec<LeafCandidate>, DecodeError> {
        match self {
            Self::Single { block_number, leaf_index, value } => Ok(vec![LeafCandidate {
                value: *value,
                leaf_index: *leaf_index,
                node_index: None,
                block_number: *block_number,
            }]),
            Self::Batch { block_number, min_leaf_index, values } => values
                .iter()
                .enumerate()
                .map(|(offset, value)| {
                    let leaf_index =
                        min_leaf_index.checked_add(offset as u64).ok_or_else(|| {
                            DecodeError::IndexOverflow {
                                event: NEW_LEAVES_EVENT,
                                min_leaf_index: *min_leaf_index,
                                values: values.len(),
                            }
                        })?;
                    Ok(LeafCandidate {
                        value: *value,
                        leaf_index,
                        node_index: None,
                        block_number: *block_number,
                    })
                })
                .collect(),
        }
    }
}

fn param<'a>(
    raw: &'a RawEvent,
    event: &'static str,
    name: &'static str,
) -> Result<&'a ParamValue, DecodeError> {
    raw.params.get(name).ok_or(DecodeError::MissingParam { event, param: name })
}

fn uint(raw: &RawEvent, event: &'static str, name: &'static str) -> Result<u64, DecodeError> {
    match param(raw, event, name)? {
        ParamValue::Uint(v) => Ok(*v),
        _ => Err(DecodeError::ParamType { event, param: name, expected: "uint" }),
    }
}

fn word(raw: &RawEvent, event: &'static str, name: &'static str) -> Result<LeafValue, DecodeError> {
    match param(raw, event, name)? {
        ParamValue::Word(v) => Ok(*v),
        _ => Err(DecodeError::ParamType { event, param: name, expected: "32-byte word" }),
    }
}

fn words(
    raw: &RawEvent,
    event: &'static str,
    name: &'static str,
) -> Result<Vec<LeafValue>, DecodeError> {
    match param(raw, event, name)? {
        ParamValue::Words(v) => Ok(v.clone()),
        _ => Err(DecodeError::ParamType { event, param: name, expected: "word array" }),
    }
}
