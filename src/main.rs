//! CLI for Fanout
//!
//! Subcommands:
//! - `serve`: run the WebSocket relay
//! - `client`: send one frame to a running relay and print what comes back
//!   (useful for smoke tests)

use std::process::ExitCode;

use clap::{Parser, Subcommand};
use fanout::config::{Settings, load_config, load_config_from};
use fanout::relay::{self, Relay};
use fanout::transport::start_websocket_server;
use fanout::utils::error::RelayError;
use fanout::utils::logging;
use tracing::{error, info};

#[derive(Parser)]
#[command(name = "fanout", version, about = "WebSocket broadcast relay")]
struct Cli {
    /// Configuration file, without extension [default: config/default]
    #[arg(long, global = true)]
    config: Option<String>,

    /// Overrides `logging.level` from the configuration
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Start the relay
    Serve {
        #[arg(long)]
        host: Option<String>,
        #[arg(long)]
        port: Option<u16>,
    },
    /// Connect, send one frame and print the first frame relayed back
    Client {
        /// WebSocket URL of the relay
        #[arg(long, default_value = "ws://127.0.0.1:8080")]
        url: String,
        /// Frame to send; the relay only forwards valid JSON
        #[arg(long, default_value = r#"{"type":"ping"}"#)]
        message: String,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();

    let loaded = match cli.config.as_deref() {
        Some(path) => load_config_from(path),
        None => load_config(),
    };
    let settings = match loaded {
        Ok(settings) => settings,
        Err(e) => {
            logging::init("info");
            error!("Failed to load configuration: {e}");
            return ExitCode::FAILURE;
        }
    };
    logging::init(cli.log_level.as_deref().unwrap_or(&settings.logging.level));

    let result = match cli.command {
        Command::Serve { host, port } => run_server(settings, host, port).await,
        Command::Client { url, message } => run_client(&url, &message).await,
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e}");
            ExitCode::FAILURE
        }
    }
}

async fn run_server(
    mut settings: Settings,
    host: Option<String>,
    port: Option<u16>,
) -> Result<(), RelayError> {
    if let Some(host) = host {
        settings.server.host = host;
    }
    if let Some(port) = port {
        settings.server.port = port;
    }

    let addr = settings.server.addr();
    let relay = relay::shared(Relay::with_max_peers(settings.relay.max_connections));

    tokio::select! {
        result = start_websocket_server(&addr, relay) => result,
        _ = tokio::signal::ctrl_c() => {
            info!("Shutdown signal received. Exiting gracefully.");
            Ok(())
        }
    }
}

async fn run_client(url: &str, message: &str) -> Result<(), RelayError> {
    use futures_util::{SinkExt, StreamExt};
    use tokio_tungstenite::connect_async;
    use tokio_tungstenite::tungstenite::Message as WsMessage;

    let (mut ws_stream, _response) = connect_async(url).await?;
    ws_stream.send(WsMessage::text(message)).await?;

    match ws_stream.next().await {
        Some(Ok(WsMessage::Text(text))) => println!("Relayed: {}", text.as_str()),
        Some(Ok(other)) => println!("Received: {other:?}"),
        Some(Err(e)) => return Err(e.into()),
        None => println!("Connection closed without a reply"),
    }

    // The relay may already have closed the socket.
    let _ = ws_stream.close(None).await;
    Ok(())
}
