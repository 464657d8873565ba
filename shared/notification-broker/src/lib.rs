//! Broker plumbing for the notification dispatch pipeline
//!
//! This crate declares the exchange and queue topology, wraps the AMQP
//! client behind a broker trait, and provides the producer that classifies
//! events onto routing keys.

#![deny(
    clippy::all,
    clippy::pedantic,
    clippy::nursery,
    missing_docs,
    dead_code
)]

/// Broker trait and AMQP-backed client
pub mod client;
/// Error types for broker operations
pub mod error;
/// Event producer
pub mod publisher;
/// Exchange, queue, and binding declarations
pub mod topology;

/// In-memory broker with topic routing, for tests
#[cfg(any(test, feature = "test-utils"))]
pub mod memory;

pub use client::{BrokerMessage, MessageBroker, RabbitBroker};
pub use error::{BrokerError, BrokerResult};
pub use publisher::EventPublisher;
pub use topology::{
    routing_key, WorkQueue, DEAD_LETTER_EXCHANGE, FAILED_QUEUE, NOTIFICATION_EXCHANGE,
};
