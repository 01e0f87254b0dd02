use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use color_eyre::eyre::{Result, WrapErr};
use tokio::net::TcpListener;
use tokio::sync::{mpsc, oneshot};
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};
use zeroize::Zeroizing;

use xavatar::application::services::AvatarCache;
use xavatar::application::use_cases::AvatarGateway;
use xavatar::domain::ports::SystemClock;
use xavatar::infrastructure::{
    AppConfig, CliArgs, ComponentConnection, ConfigLoader, DiskAvatarStore, ProtocolSession,
    SessionEvent, avatar_router, serve,
};

fn init_logging(config: &AppConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.log_level.to_string()));

    if let Some(log_path) = &config.log_path {
        if let Some(parent) = log_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(log_path)?;

        let file_layer = fmt::layer()
            .with_writer(file)
            .with_ansi(false)
            .with_target(true)
            .with_thread_ids(false);

        tracing_subscriber::registry()
            .with(filter)
            .with(file_layer)
            .init();

        info!(path = %log_path.display(), "Logging initialized");
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_writer(std::io::stderr))
            .init();
    }

    Ok(())
}

fn load_config() -> Result<AppConfig> {
    let args = CliArgs::parse();

    let loader = ConfigLoader::new().unwrap_or_else(|_| ConfigLoader::with_dir(PathBuf::from(".")));
    let mut config = loader
        .load_config(args.config.as_deref())
        .wrap_err("failed to load configuration")?;
    config.merge_with_args(args);
    config.validate()?;

    Ok(config)
}

async fn log_session_events(mut events: mpsc::UnboundedReceiver<SessionEvent>) {
    while let Some(event) = events.recv().await {
        match event {
            SessionEvent::Connected => info!("XMPP session up"),
            SessionEvent::Disconnected { reason } => warn!(reason = %reason, "XMPP session down"),
            SessionEvent::Reconnecting { attempt, delay } => {
                info!(attempt, delay_ms = delay.as_millis(), "XMPP session retrying");
            }
            SessionEvent::Error {
                message,
                recoverable,
            } => {
                if recoverable {
                    warn!(error = %message, "XMPP session error");
                } else {
                    error!(error = %message, "XMPP session failed");
                }
            }
        }
    }
}

async fn shutdown_signal(session_done: oneshot::Receiver<()>) {
    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            if let Err(e) = result {
                error!(error = %e, "Failed to listen for Ctrl-C");
            }
            info!("Received Ctrl-C, shutting down");
        }
        _ = session_done => {
            warn!("XMPP session stopped, shutting down");
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    let _ = dotenvy::dotenv();

    let config = load_config()?;
    init_logging(&config)?;

    let config_path = config
        .effective_config_path()
        .map_or_else(|| "-".to_string(), |path| path.display().to_string());
    info!(
        version = xavatar::VERSION,
        jid = %config.jid,
        config = %config_path,
        "Starting xavatar"
    );

    let store = Arc::new(DiskAvatarStore::new(&config.directory).await?);
    let cache = Arc::new(AvatarCache::new(store));
    cache.rebuild().await?;

    let connection = ComponentConnection::new(
        config.jid.clone(),
        Zeroizing::new(config.password.expose().to_string()),
        config.host.clone(),
        config.port,
    );
    let mut session = ProtocolSession::new(Box::new(connection), config.session_config());
    let handle = session.handle();
    if let Some(events) = session.take_events() {
        tokio::spawn(log_session_events(events));
    }

    let gateway = AvatarGateway::new(
        cache,
        Arc::new(handle.clone()),
        Arc::new(SystemClock),
        config.gateway_config(),
    );

    let (session_done_tx, session_done_rx) = oneshot::channel();
    let handler = Arc::new(gateway.clone());
    let session_task = tokio::spawn(async move {
        let result = session.run(handler).await;
        let _ = session_done_tx.send(());
        result
    });

    let listener = TcpListener::bind(config.listen)
        .await
        .wrap_err_with(|| format!("failed to bind {}", config.listen))?;
    info!(addr = %config.listen, "HTTP server listening");

    serve(
        listener,
        avatar_router(gateway),
        shutdown_signal(session_done_rx),
    )
    .await?;

    handle.shutdown();
    match session_task.await {
        Ok(Ok(())) => info!("Stopped"),
        Ok(Err(e)) => {
            error!(error = %e, "XMPP session ended with an error");
            return Err(e.into());
        }
        Err(e) => error!(error = %e, "XMPP session task failed"),
    }

    Ok(())
}
