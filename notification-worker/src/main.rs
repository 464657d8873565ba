use std::sync::Arc;

use dotenvy::dotenv;
use tokio_util::sync::CancellationToken;
use tracing::info;

use notification_broker::{EventPublisher, MessageBroker, RabbitBroker};
use notification_worker::alerts::{AlertSink, DiscordWebhookSink};
use notification_worker::email::{
    EmailSender, FrontendUnsubscribeLinks, HttpEmailSender, UnsubscribeLinkGenerator,
};
use notification_worker::server;
use notification_worker::store::{NotificationStore, PlatformStoreClient};
use notification_worker::types::Environment;
use notification_worker::worker::{DispatchConfig, Dispatcher, EventProcessor, ScheduledTriggers};

fn env_or(var: &str, default: &str) -> String {
    std::env::var(var).unwrap_or_else(|_| default.to_string())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .init();

    let environment = Environment::from_env();
    info!("Starting notification dispatch service in {environment:?} environment");
    let config = DispatchConfig::from_environment(&environment);

    let amqp_url = env_or("AMQP_URL", environment.amqp_url());
    let broker: Arc<dyn MessageBroker> = Arc::new(RabbitBroker::connect(amqp_url).await?);

    let store: Arc<dyn NotificationStore> = Arc::new(PlatformStoreClient::new(env_or(
        "PLATFORM_API_URL",
        environment.platform_api_url(),
    )));
    let email_sender: Arc<dyn EmailSender> = Arc::new(HttpEmailSender::new(env_or(
        "EMAIL_API_URL",
        environment.email_api_url(),
    )));
    let unsubscribe: Arc<dyn UnsubscribeLinkGenerator> = Arc::new(FrontendUnsubscribeLinks::new(
        env_or("FRONTEND_BASE_URL", environment.frontend_base_url()),
    ));

    let webhook_url = std::env::var("DISCORD_ALERT_WEBHOOK_URL").unwrap_or_default();
    if webhook_url.is_empty() {
        tracing::warn!("DISCORD_ALERT_WEBHOOK_URL is not set; system alerts will fail");
    }
    let alerts: Arc<dyn AlertSink> = Arc::new(DiscordWebhookSink::new(webhook_url));

    let processor = Arc::new(EventProcessor::new(
        store.clone(),
        email_sender,
        unsubscribe,
        config.clone(),
    ));
    let publisher = Arc::new(EventPublisher::new(broker.clone()));
    let triggers = Arc::new(ScheduledTriggers::new(
        store,
        publisher.clone(),
        processor.clone(),
    ));

    let shutdown_token = CancellationToken::new();
    let dispatcher = Arc::new(Dispatcher::new(
        broker,
        processor,
        &config,
        shutdown_token.clone(),
    ));
    let dispatcher_state = dispatcher.state();

    let dispatcher_task = tokio::spawn({
        let dispatcher = dispatcher.clone();
        async move {
            dispatcher.run().await;
        }
    });

    let router = server::router(publisher, triggers, alerts, dispatcher_state);
    let server_task = tokio::spawn(server::start(
        environment.default_service_port(),
        router,
        shutdown_token.clone(),
    ));

    tokio::signal::ctrl_c().await?;
    info!("Shutting down notification dispatch service");
    shutdown_token.cancel();

    dispatcher_task.await?;
    server_task.await??;
    Ok(())
}
