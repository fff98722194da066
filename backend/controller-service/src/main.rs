use actix_web::{middleware::Logger, web, App, HttpServer};
use controller_service::{
    broadcast::{Broadcaster, RedisBackplane, SubscriberHub},
    config::Config,
    error::AppError,
    ingest::{self, IngestLoop, KafkaMessageSource},
    logging, routes, shutdown,
    state::AppState,
};
use std::sync::Arc;
use std::time::Duration;

#[actix_web::main]
async fn main() -> Result<(), AppError> {
    logging::init_tracing();
    let cfg = Config::from_env()?;

    let identity = ingest::instance_identity();
    let group_id = ingest::group_id(&identity);
    tracing::info!(
        instance = %identity,
        group_id = %group_id,
        topic = %cfg.kafka.topic,
        bootstrap_servers = %cfg.kafka.bootstrap_servers,
        "Starting controller-service"
    );

    let backplane = RedisBackplane::new(&cfg.redis_url, cfg.backplane_channel.clone(), identity.clone())
        .map_err(|e| AppError::Config(format!("redis url: {e}")))?;
    // Not fatal: publishes and the relay keep retrying until Redis is up
    match tokio::time::timeout(Duration::from_secs(5), backplane.ping()).await {
        Ok(Ok(())) => tracing::info!(channel = %backplane.channel(), "Backplane connected"),
        Ok(Err(e)) => tracing::warn!(
            channel = %backplane.channel(),
            error = %e,
            "Backplane unreachable at startup, continuing"
        ),
        Err(_) => tracing::warn!(
            channel = %backplane.channel(),
            "Backplane ping timed out at startup, continuing"
        ),
    }

    let hub = SubscriberHub::new();
    let (shutdown_tx, shutdown_rx) = shutdown::channel();
    let shutdown_tx = Arc::new(shutdown_tx);

    let relay_backplane = backplane.clone();
    let relay_hub = hub.clone();
    let relay_shutdown = shutdown_rx.clone();
    let relay_backoff = cfg.backoff;
    let relay_handle = tokio::spawn(async move {
        relay_backplane
            .run_relay(relay_hub, relay_shutdown, relay_backoff)
            .await;
    });

    let broadcaster: Arc<dyn Broadcaster> = Arc::new(backplane);
    let ingest_loop = IngestLoop::new(
        cfg.ingest_config(group_id),
        KafkaMessageSource::new(cfg.kafka_source_config()),
        broadcaster,
        shutdown_rx.clone(),
    );
    let state = AppState::new(hub, ingest_loop.state(), shutdown_rx);
    let ingest_handle = tokio::spawn(ingest_loop.run());

    let bind_addr = format!("0.0.0.0:{}", cfg.port);
    tracing::info!(%bind_addr, "HTTP server listening");

    let server = HttpServer::new(move || {
        App::new()
            .wrap(Logger::default())
            .app_data(web::Data::new(state.clone()))
            .configure(routes::configure)
    })
    .bind(&bind_addr)
    .map_err(|e| AppError::StartServer(format!("bind {bind_addr}: {e}")))?
    .disable_signals()
    .shutdown_timeout(5)
    .run();

    let server_handle = server.handle();
    let signal_tx = shutdown_tx.clone();
    tokio::spawn(async move {
        shutdown::shutdown_signal().await;
        // Cancel ingest first so readiness flips while connections drain
        tracing::info!("Shutdown signal received, stopping ingest and HTTP server");
        let _ = signal_tx.send(true);
        server_handle.stop(true).await;
    });

    let result = server
        .await
        .map_err(|e| AppError::StartServer(format!("HTTP server: {e}")));

    tracing::info!("Server stopped. Waiting for background tasks...");
    let _ = shutdown_tx.send(true);

    match tokio::time::timeout(Duration::from_secs(5), ingest_handle).await {
        Ok(Ok(())) => tracing::info!("Ingest loop shut down gracefully"),
        Ok(Err(e)) => tracing::error!(error = %e, "Ingest loop task failed"),
        Err(_) => tracing::warn!("Ingest loop did not shut down within timeout"),
    }

    match tokio::time::timeout(Duration::from_secs(5), relay_handle).await {
        Ok(Ok(())) => tracing::info!("Backplane relay shut down gracefully"),
        Ok(Err(e)) => tracing::error!(error = %e, "Backplane relay task failed"),
        Err(_) => tracing::warn!("Backplane relay did not shut down within timeout"),
    }

    result
}
