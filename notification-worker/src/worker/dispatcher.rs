//! Cooperative consumer loop over the four working queues
//!
//! One logical consumer polls `immediate, admin, batch, summary` in a fixed
//! order every round, fetching at most one message per queue per round so
//! no queue starves another. Settlement happens per message: ack when the
//! handler processed it, reject without requeue otherwise, which forwards
//! the message to the dead-letter exchange.

use std::sync::Arc;
use std::time::Duration;

use strum::Display;
use tokio::sync::watch;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use notification_broker::{BrokerMessage, MessageBroker, WorkQueue};

use crate::worker::config::DispatchConfig;
use crate::worker::processor::{Disposition, EventProcessor};

/// Lifecycle of the consumer loop
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "lowercase")]
pub enum DispatcherState {
    /// Created, not yet polling
    Starting,
    /// Polling the working queues
    Running,
    /// Shutdown observed, finishing the in-flight message
    Stopping,
    /// Loop exited
    Stopped,
}

/// The dispatch consumer loop
pub struct Dispatcher {
    broker: Arc<dyn MessageBroker>,
    processor: Arc<EventProcessor>,
    poll_timeout: Duration,
    idle_sleep: Duration,
    shutdown: CancellationToken,
    state_tx: Arc<watch::Sender<DispatcherState>>,
}

impl Dispatcher {
    /// Creates a dispatcher over the given broker and processor
    #[must_use]
    pub fn new(
        broker: Arc<dyn MessageBroker>,
        processor: Arc<EventProcessor>,
        config: &DispatchConfig,
        shutdown: CancellationToken,
    ) -> Self {
        let (state_tx, _) = watch::channel(DispatcherState::Starting);
        Self {
            broker,
            processor,
            poll_timeout: config.poll_timeout,
            idle_sleep: config.idle_sleep,
            shutdown,
            state_tx: Arc::new(state_tx),
        }
    }

    /// Returns a receiver observing the loop state
    #[must_use]
    pub fn state(&self) -> watch::Receiver<DispatcherState> {
        self.state_tx.subscribe()
    }

    /// Runs the loop until the shutdown token fires
    ///
    /// The in-flight message of the current round is settled before the
    /// loop exits.
    pub async fn run(&self) {
        self.state_tx.send_replace(DispatcherState::Running);
        info!("Started notification dispatcher");

        while !self.shutdown.is_cancelled() {
            self.run_round().await;

            tokio::select! {
                () = self.shutdown.cancelled() => {}
                () = tokio::time::sleep(self.idle_sleep) => {}
            }
        }

        self.state_tx.send_replace(DispatcherState::Stopping);
        info!("Dispatcher shutting down");
        self.state_tx.send_replace(DispatcherState::Stopped);
        info!("Dispatcher stopped");
    }

    /// One fairness round: every working queue is visited once, in order,
    /// regardless of whether earlier queues yielded a message
    pub async fn run_round(&self) {
        for queue in WorkQueue::ALL {
            if self.shutdown.is_cancelled() {
                break;
            }
            self.poll_queue(queue).await;
        }
    }

    async fn poll_queue(&self, queue: WorkQueue) {
        let fetched = timeout(self.poll_timeout, self.broker.get(queue)).await;
        let message = match fetched {
            Err(_) => {
                debug!("Queue {} fetch timed out", queue.name());
                return;
            }
            Ok(Err(e)) => {
                error!("Error fetching from queue {}: {e}", queue.name());
                return;
            }
            Ok(Ok(None)) => {
                debug!("Queue {} empty", queue.name());
                return;
            }
            Ok(Ok(Some(message))) => message,
        };

        self.handle_message(queue, message).await;
    }

    /// Settles one fetched message: the handler is selected by the queue
    /// the broker routed the message to, not by the event payload
    async fn handle_message(&self, queue: WorkQueue, message: BrokerMessage) {
        let payload = String::from_utf8_lossy(&message.body).into_owned();

        let disposition = match queue {
            WorkQueue::Immediate => self.processor.process_immediate(&payload).await,
            WorkQueue::Admin => self.processor.process_admin(&payload).await,
            WorkQueue::Batch => self.processor.process_batch(&payload).await,
            WorkQueue::Summary => self.processor.process_summary(&payload).await,
        };

        let settled = match disposition {
            Ok(Disposition::Ack) => self.broker.ack(message.delivery_tag).await,
            Ok(Disposition::DeadLetter) => self.broker.reject(message.delivery_tag).await,
            Err(e) => {
                error!(
                    "Error processing message from queue {}, rejecting: {e}",
                    queue.name()
                );
                self.broker.reject(message.delivery_tag).await
            }
        };

        if let Err(e) = settled {
            error!(
                "Failed to settle message from queue {}; it will be redelivered or must be removed manually: {e}",
                queue.name()
            );
        }
    }
}
