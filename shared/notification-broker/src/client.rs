//! Broker trait and AMQP-backed implementation
//!
//! The dispatcher and producer talk to the broker through [`MessageBroker`]
//! so consumption semantics can be exercised without a live AMQP server.

use async_trait::async_trait;
use lapin::options::{
    BasicAckOptions, BasicGetOptions, BasicPublishOptions, BasicQosOptions, BasicRejectOptions,
    ConfirmSelectOptions, ExchangeDeclareOptions, QueueBindOptions, QueueDeclareOptions,
};
use lapin::publisher_confirm::Confirmation;
use lapin::types::{AMQPValue, FieldTable};
use lapin::{BasicProperties, Channel, Connection, ConnectionProperties, ExchangeKind};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::error::BrokerResult;
use crate::topology::{WorkQueue, DEAD_LETTER_EXCHANGE, FAILED_QUEUE, NOTIFICATION_EXCHANGE};
use crate::BrokerError;

/// A message fetched from a working queue
#[derive(Debug, Clone)]
pub struct BrokerMessage {
    /// Raw message body
    pub body: Vec<u8>,
    /// Tag used to ack or reject the message
    pub delivery_tag: u64,
}

/// Operations the dispatch pipeline needs from a broker
#[async_trait]
pub trait MessageBroker: Send + Sync {
    /// Declares exchanges, queues, and bindings; idempotent
    ///
    /// # Errors
    ///
    /// Returns `BrokerError` if the broker rejects a declaration or cannot
    /// be reached.
    async fn declare_topology(&self) -> BrokerResult<()>;

    /// Publishes a message to the notifications exchange
    ///
    /// # Errors
    ///
    /// Returns `BrokerError` if the broker cannot be reached or does not
    /// confirm the message.
    async fn publish(&self, routing_key: &str, payload: &[u8]) -> BrokerResult<()>;

    /// Fetches at most one message from the given queue without auto-ack
    ///
    /// # Errors
    ///
    /// Returns `BrokerError` if the fetch fails.
    async fn get(&self, queue: WorkQueue) -> BrokerResult<Option<BrokerMessage>>;

    /// Acknowledges a fetched message
    ///
    /// # Errors
    ///
    /// Returns `BrokerError` if the acknowledgement fails.
    async fn ack(&self, delivery_tag: u64) -> BrokerResult<()>;

    /// Rejects a fetched message without requeue, forwarding it to the
    /// dead-letter exchange
    ///
    /// # Errors
    ///
    /// Returns `BrokerError` if the rejection fails.
    async fn reject(&self, delivery_tag: u64) -> BrokerResult<()>;
}

/// AMQP broker client
///
/// Holds one connection with a single channel. A lost channel is
/// re-established on the next operation, redeclaring the topology, so a
/// broker restart degrades to failed operations instead of killing the
/// process. Unacked deliveries from the old channel are redelivered by the
/// broker.
pub struct RabbitBroker {
    url: String,
    state: Mutex<Option<(Connection, Channel)>>,
}

impl RabbitBroker {
    /// Connects to the broker and declares the topology
    ///
    /// # Errors
    ///
    /// Returns `BrokerError` if the connection or any declaration fails.
    pub async fn connect(url: impl Into<String>) -> BrokerResult<Self> {
        let broker = Self {
            url: url.into(),
            state: Mutex::new(None),
        };
        broker.channel().await?;
        Ok(broker)
    }

    /// Returns the live channel, re-establishing it if necessary
    async fn channel(&self) -> BrokerResult<Channel> {
        let mut state = self.state.lock().await;

        if let Some((_, channel)) = state.as_ref() {
            if channel.status().connected() {
                return Ok(channel.clone());
            }
            warn!("Broker channel lost, reconnecting");
        }

        let connection = Connection::connect(&self.url, ConnectionProperties::default()).await?;
        let channel = connection.create_channel().await?;
        channel
            .confirm_select(ConfirmSelectOptions::default())
            .await?;
        channel.basic_qos(1, BasicQosOptions::default()).await?;
        declare_topology_on(&channel).await?;

        info!("Connected to broker at {}", self.url);
        *state = Some((connection, channel.clone()));
        Ok(channel)
    }
}

#[async_trait]
impl MessageBroker for RabbitBroker {
    async fn declare_topology(&self) -> BrokerResult<()> {
        // Declarations run as part of channel establishment.
        self.channel().await.map(|_| ())
    }

    async fn publish(&self, routing_key: &str, payload: &[u8]) -> BrokerResult<()> {
        let channel = self.channel().await?;
        let confirmation = channel
            .basic_publish(
                NOTIFICATION_EXCHANGE,
                routing_key,
                BasicPublishOptions::default(),
                payload,
                BasicProperties::default()
                    .with_content_type("application/json".into())
                    .with_delivery_mode(2),
            )
            .await?
            .await?;

        if let Confirmation::Nack(_) = confirmation {
            return Err(BrokerError::Unconfirmed(format!(
                "broker nacked message with routing key {routing_key}"
            )));
        }

        debug!("Published message with routing key {routing_key}");
        Ok(())
    }

    async fn get(&self, queue: WorkQueue) -> BrokerResult<Option<BrokerMessage>> {
        let channel = self.channel().await?;
        let message = channel
            .basic_get(queue.name(), BasicGetOptions::default())
            .await?;

        Ok(message.map(|get_message| {
            let delivery = get_message.delivery;
            BrokerMessage {
                delivery_tag: delivery.delivery_tag,
                body: delivery.data,
            }
        }))
    }

    async fn ack(&self, delivery_tag: u64) -> BrokerResult<()> {
        let channel = self.channel().await?;
        channel
            .basic_ack(delivery_tag, BasicAckOptions::default())
            .await?;
        Ok(())
    }

    async fn reject(&self, delivery_tag: u64) -> BrokerResult<()> {
        let channel = self.channel().await?;
        channel
            .basic_reject(delivery_tag, BasicRejectOptions { requeue: false })
            .await?;
        Ok(())
    }
}

/// Declares both exchanges, the four working queues with their dead-letter
/// arguments, and the failed queue
async fn declare_topology_on(channel: &Channel) -> BrokerResult<()> {
    for exchange in [NOTIFICATION_EXCHANGE, DEAD_LETTER_EXCHANGE] {
        channel
            .exchange_declare(
                exchange,
                ExchangeKind::Topic,
                ExchangeDeclareOptions {
                    durable: true,
                    ..Default::default()
                },
                FieldTable::default(),
            )
            .await?;
    }

    for queue in WorkQueue::ALL {
        let mut arguments = FieldTable::default();
        arguments.insert(
            "x-dead-letter-exchange".into(),
            AMQPValue::LongString(DEAD_LETTER_EXCHANGE.into()),
        );
        arguments.insert(
            "x-dead-letter-routing-key".into(),
            AMQPValue::LongString(queue.dead_letter_routing_key().into()),
        );

        channel
            .queue_declare(
                queue.name(),
                QueueDeclareOptions {
                    durable: true,
                    ..Default::default()
                },
                arguments,
            )
            .await?;
        channel
            .queue_bind(
                queue.name(),
                NOTIFICATION_EXCHANGE,
                queue.binding_pattern(),
                QueueBindOptions::default(),
                FieldTable::default(),
            )
            .await?;
    }

    channel
        .queue_declare(
            FAILED_QUEUE,
            QueueDeclareOptions {
                durable: true,
                ..Default::default()
            },
            FieldTable::default(),
        )
        .await?;
    channel
        .queue_bind(
            FAILED_QUEUE,
            DEAD_LETTER_EXCHANGE,
            "failed.#",
            QueueBindOptions::default(),
            FieldTable::default(),
        )
        .await?;

    Ok(())
}
