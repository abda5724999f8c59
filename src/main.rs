use clap::Parser;
use lantern::{Args, BoxError, Message, Server, ServerConfig, ServerState};
use std::error::Error as StdError;
use tracing_subscriber::EnvFilter;

/// Logs each request and never answers; lease logic belongs to a real handler.
fn log_request(request: Message) -> Result<Option<Message>, BoxError> {
    match request.options.message_type() {
        Ok(kind) => tracing::info!(
            xid = format_args!("{:#010x}", request.xid),
            mac = %request.mac_string(),
            "{}",
            kind
        ),
        Err(e) => tracing::info!(
            xid = format_args!("{:#010x}", request.xid),
            mac = %request.mac_string(),
            "BOOTP message ({})",
            e
        ),
    }
    Ok(None)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn StdError>> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level)),
        )
        .init();

    let mut server = Server::new(ServerConfig::from(&args));
    server.register_callback(log_request);
    server.start().await?;

    let mut state = server.subscribe();
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Received shutdown signal, stopping server...");
        }
        _ = state.wait_for(|s| *s == ServerState::Faulted) => {
            tracing::error!("Receive loop failed, shutting down");
        }
    }

    server.stop().await?;
    Ok(())
}
