use anyhow::Result;
use lib_chainsub::{LoggerLocal, ReconnectingSocket, Session, SessionReport, SubscriberError};
use std::sync::Arc;
use tokio::signal;
use tokio::task::JoinError;

mod chainsub_logic;
use chainsub_logic::{config, decoder, logger};

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let config = config::load_config();
    let log_path = logger::setup_logging(&config.log_dir(), config.log_level(), config.log_keep())?;
    log::info!("Logging to {}", log_path.display());

    let session_config = config.session();
    session_config.validate()?;
    log::info!("Subscribing to {}", session_config.endpoint);

    let loggers = LoggerLocal::new("chainsub");
    let socket = Arc::new(ReconnectingSocket::new(session_config.backoff, loggers.shared("connection")));
    let session = Session::new(
        socket,
        decoder::EnvelopeLogger::new(loggers.shared("decoder")),
        session_config,
        loggers.shared("session"),
    );

    let (shutdown_tx, _) = tokio::sync::broadcast::channel(1);
    let mut session_handle = tokio::spawn(session.run(shutdown_tx.subscribe()));

    // Wait for shutdown signal, unless the session ends first
    tokio::select! {
        received = shutdown_signal() => {
            log::info!("{} received, initiating shutdown.", received?);
            let _ = shutdown_tx.send(());
        }
        finished = &mut session_handle => {
            return report(finished);
        }
    }

    report(session_handle.await)
}

async fn shutdown_signal() -> Result<&'static str> {
    #[cfg(unix)]
    {
        let mut term_signal = signal::unix::signal(signal::unix::SignalKind::terminate())?;
        tokio::select! {
            result = signal::ctrl_c() => result.map(|_| "Ctrl-C").map_err(Into::into),
            _ = term_signal.recv() => Ok("SIGTERM"),
        }
    }
    #[cfg(not(unix))]
    {
        signal::ctrl_c().await?;
        Ok("Ctrl-C")
    }
}

fn report(finished: Result<Result<SessionReport, SubscriberError>, JoinError>) -> Result<()> {
    let report = finished??;
    let stats = &report.stats;
    log::info!(
        "Session ended ({:?}): {} reconnects, {} subscription rounds, {} heartbeats, {} frames forwarded, {} decode failures",
        report.exit,
        stats.reconnect_cycles,
        stats.subscription_rounds,
        stats.heartbeats_sent,
        stats.messages_forwarded,
        stats.decode_failures
    );
    log::info!("Shutdown complete.");
    Ok(())
}
