//! In-memory broker with AMQP-style topic routing
//!
//! Mirrors the production topology closely enough for dispatch semantics:
//! published messages are routed to every working queue whose binding
//! pattern matches, fetches hand out delivery tags, and rejected messages
//! land on the failed queue the way the dead-letter exchange would forward
//! them.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::client::{BrokerMessage, MessageBroker};
use crate::error::BrokerResult;
use crate::topology::{WorkQueue, FAILED_QUEUE};

#[derive(Default)]
struct State {
    queues: HashMap<&'static str, VecDeque<Vec<u8>>>,
    unacked: HashMap<u64, Vec<u8>>,
    next_tag: u64,
}

/// Test double for [`MessageBroker`]
#[derive(Default)]
pub struct InMemoryBroker {
    state: Mutex<State>,
}

impl InMemoryBroker {
    /// Creates an empty broker
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of messages waiting in the given working queue
    ///
    /// # Panics
    ///
    /// Panics if the internal lock is poisoned.
    #[must_use]
    pub fn queue_depth(&self, queue: WorkQueue) -> usize {
        let state = self.state.lock().unwrap();
        state.queues.get(queue.name()).map_or(0, VecDeque::len)
    }

    /// Messages forwarded to the failed queue by rejections
    ///
    /// # Panics
    ///
    /// Panics if the internal lock is poisoned.
    #[must_use]
    pub fn failed_messages(&self) -> Vec<Vec<u8>> {
        let state = self.state.lock().unwrap();
        state
            .queues
            .get(FAILED_QUEUE)
            .map(|queue| queue.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Fetched messages that were neither acked nor rejected
    ///
    /// # Panics
    ///
    /// Panics if the internal lock is poisoned.
    #[must_use]
    pub fn unacked_count(&self) -> usize {
        self.state.lock().unwrap().unacked.len()
    }
}

#[async_trait]
impl MessageBroker for InMemoryBroker {
    async fn declare_topology(&self) -> BrokerResult<()> {
        Ok(())
    }

    async fn publish(&self, routing_key: &str, payload: &[u8]) -> BrokerResult<()> {
        let mut state = self.state.lock().unwrap();
        for queue in WorkQueue::ALL {
            if topic_matches(queue.binding_pattern(), routing_key) {
                state
                    .queues
                    .entry(queue.name())
                    .or_default()
                    .push_back(payload.to_vec());
            }
        }
        Ok(())
    }

    async fn get(&self, queue: WorkQueue) -> BrokerResult<Option<BrokerMessage>> {
        let mut state = self.state.lock().unwrap();
        let Some(body) = state
            .queues
            .get_mut(queue.name())
            .and_then(VecDeque::pop_front)
        else {
            return Ok(None);
        };

        state.next_tag += 1;
        let delivery_tag = state.next_tag;
        state.unacked.insert(delivery_tag, body.clone());
        Ok(Some(BrokerMessage { body, delivery_tag }))
    }

    async fn ack(&self, delivery_tag: u64) -> BrokerResult<()> {
        self.state.lock().unwrap().unacked.remove(&delivery_tag);
        Ok(())
    }

    async fn reject(&self, delivery_tag: u64) -> BrokerResult<()> {
        let mut state = self.state.lock().unwrap();
        if let Some(body) = state.unacked.remove(&delivery_tag) {
            state.queues.entry(FAILED_QUEUE).or_default().push_back(body);
        }
        Ok(())
    }
}

/// AMQP topic match: `*` matches one word, `#` matches the rest
fn topic_matches(pattern: &str, key: &str) -> bool {
    let mut pattern_words = pattern.split('.');
    let mut key_words = key.split('.');
    loop {
        match (pattern_words.next(), key_words.next()) {
            (Some("#"), _) => return true,
            (Some("*"), Some(_)) => {}
            (Some(pattern_word), Some(key_word)) if pattern_word == key_word => {}
            (None, None) => return true,
            _ => return false,
        }
    }
}
