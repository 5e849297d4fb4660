//! Snowflake generator for public UIDs.
//!
//! Produces 63-bit monotonic identifiers: 41 bits of milliseconds since a
//! custom epoch, 10 bits of node id, 12 bits of per-millisecond sequence.
//! The node id comes from configuration so that multiple instances never
//! collide; tests inject a fixed node.

use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};

/// Generator epoch in unix milliseconds (2010-11-04T01:42:54.657Z).
const EPOCH_MS: i64 = 1_288_834_974_657;

const NODE_BITS: u8 = 10;
const SEQ_BITS: u8 = 12;

const MAX_NODE: i64 = (1 << NODE_BITS) - 1;
const MAX_SEQ: i64 = (1 << SEQ_BITS) - 1;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum SnowflakeError {
    #[error("node id {0} out of range 0..={MAX_NODE}")]
    NodeOutOfRange(i64),

    /// The wall clock moved behind the last observed timestamp. Generating
    /// an id here could collide with one already handed out, so we refuse.
    #[error("clock moved backwards by {0} ms, refusing to generate id")]
    ClockMovedBackwards(i64),
}

#[derive(Debug)]
struct NodeState {
    last_ms: i64,
    sequence: i64,
}

/// A single snowflake node. Safe to share across request handlers.
#[derive(Debug)]
pub struct SnowflakeNode {
    node: i64,
    state: Mutex<NodeState>,
}

impl SnowflakeNode {
    pub fn new(node: i64) -> Result<Self, SnowflakeError> {
        if !(0..=MAX_NODE).contains(&node) {
            return Err(SnowflakeError::NodeOutOfRange(node));
        }

        Ok(Self {
            node,
            state: Mutex::new(NodeState {
                last_ms: 0,
                sequence: 0,
            }),
        })
    }

    /// Allocate the next identifier.
    ///
    /// Within one millisecond the sequence counter disambiguates; when it
    /// overflows we spin until the next millisecond.
    pub fn generate(&self) -> Result<i64, SnowflakeError> {
        let mut state = self.state.lock().expect("snowflake state poisoned");

        let mut now = current_millis();
        if now < state.last_ms {
            return Err(SnowflakeError::ClockMovedBackwards(state.last_ms - now));
        }

        if now == state.last_ms {
            state.sequence = (state.sequence + 1) & MAX_SEQ;
            if state.sequence == 0 {
                while now <= state.last_ms {
                    now = current_millis();
                }
            }
        } else {
            state.sequence = 0;
        }

        state.last_ms = now;

        Ok(((now - EPOCH_MS) << (NODE_BITS + SEQ_BITS)) | (self.node << SEQ_BITS) | state.sequence)
    }
}

fn current_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_node_range() {
        assert!(SnowflakeNode::new(0).is_ok());
        assert!(SnowflakeNode::new(MAX_NODE).is_ok());
        assert_eq!(
            SnowflakeNode::new(-1).unwrap_err(),
            SnowflakeError::NodeOutOfRange(-1)
        );
        assert_eq!(
            SnowflakeNode::new(MAX_NODE + 1).unwrap_err(),
            SnowflakeError::NodeOutOfRange(MAX_NODE + 1)
        );
    }

    #[test]
    fn test_ids_are_positive_and_monotonic() {
        let node = SnowflakeNode::new(1).unwrap();

        let mut prev = 0;
        for _ in 0..10_000 {
            let id = node.generate().unwrap();
            assert!(id > 0, "id must fit in 63 bits");
            assert!(id > prev, "ids must be strictly increasing");
            prev = id;
        }
    }

    #[test]
    fn test_node_bits_embedded() {
        let node = SnowflakeNode::new(42).unwrap();
        let id = node.generate().unwrap();
        assert_eq!((id >> SEQ_BITS) & MAX_NODE, 42);
    }
}
