//! `r0n-ws-loopback`: echo session over the in-process socket facility.

use clap::Parser;
use r0n_ws_transport::config::{BasicValidator, Config, ConfigError, ConfigLoader};
use r0n_ws_transport::context::Context;
use r0n_ws_transport::logging;
use r0n_ws_transport::native::{LoopbackNative, NativeWebSocketApi};
use r0n_ws_transport::websocket::{CloseCode, FrameType, TransportError, WebSocketTransport};
use std::io;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use thiserror::Error;
use tracing::{error, info};

/// Upper bound on the whole session.
const SESSION_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Parser, Debug)]
#[command(name = "r0n-ws-loopback")]
#[command(about = "Echo binary messages over an in-process WebSocket pair")]
#[command(version)]
struct Cli {
    /// Configuration file; defaults apply if it does not exist
    #[arg(long, short)]
    config: Option<PathBuf>,

    /// Number of messages to echo
    #[arg(long, default_value_t = 10)]
    messages: usize,

    /// Size of each message in bytes
    #[arg(long, default_value_t = 1024)]
    payload_size: usize,
}

#[derive(Debug, Error)]
enum SessionError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("failed to start loopback facility: {0}")]
    Io(#[from] io::Error),

    #[error("failed to encode statistics: {0}")]
    Json(#[from] serde_json::Error),

    #[error("message {index} came back altered")]
    EchoMismatch { index: usize },

    #[error("peer closed before message {index} was echoed")]
    PeerClosed { index: usize },

    #[error("echo peer panicked")]
    PeerPanicked,
}

fn load_config(path: Option<&PathBuf>) -> Result<Config, ConfigError> {
    let loader = ConfigLoader::new().with_validator(BasicValidator::new());
    match path {
        Some(path) => loader.load_or_default(path),
        None => Ok(Config::default()),
    }
}

/// Read frames until a complete message or a close frame arrives.
fn read_message(
    transport: &WebSocketTransport,
    context: &Context,
) -> Result<Option<Vec<u8>>, TransportError> {
    let mut message = Vec::new();
    loop {
        let frame = transport.receive(context)?;
        if frame.is_close() {
            return Ok(None);
        }
        message.extend_from_slice(&frame.payload);
        if !frame.frame_type.is_fragment() {
            return Ok(Some(message));
        }
    }
}

/// Echo every message back until the other side closes, then answer the
/// close with the same status.
fn echo(transport: &WebSocketTransport, context: &Context) -> Result<usize, TransportError> {
    let mut echoed = 0;
    while let Some(message) = read_message(transport, context)? {
        transport.send(FrameType::Binary, message, context)?;
        echoed += 1;
    }

    let info = transport.query_close_info(context)?;
    transport.native_close_socket(info.status_code, &info.reason, context)?;
    Ok(echoed)
}

fn run(cli: &Cli, config: &Config) -> Result<serde_json::Value, SessionError> {
    let native = LoopbackNative::new()?;
    let (client_request, server_request) = native.connect_pair();
    let facility: Arc<dyn NativeWebSocketApi> = Arc::new(native);

    let client = WebSocketTransport::new(Arc::clone(&facility), config.transport.clone());
    let server = Arc::new(WebSocketTransport::new(facility, config.transport.clone()));
    client.upgrade(client_request)?;
    server.upgrade(server_request)?;

    let context = Context::new().with_timeout(SESSION_TIMEOUT);
    let peer = {
        let server = Arc::clone(&server);
        let context = context.clone();
        thread::Builder::new()
            .name("loopback-peer".to_string())
            .spawn(move || echo(&server, &context))?
    };

    for index in 0..cli.messages {
        let payload: Vec<u8> = (0..cli.payload_size)
            .map(|offset| (offset + index) as u8)
            .collect();
        client.send(FrameType::Binary, payload.clone(), &context)?;
        match read_message(&client, &context)? {
            Some(echoed) if echoed == payload => {},
            Some(_) => return Err(SessionError::EchoMismatch { index }),
            None => return Err(SessionError::PeerClosed { index }),
        }
    }

    let close = client.native_close_socket(CloseCode::Normal.into(), "done", &context)?;
    let echoed = peer.join().map_err(|_| SessionError::PeerPanicked)??;
    info!(
        messages = echoed,
        status = close.status_code,
        reason = %close.reason,
        "Echo session complete"
    );

    client.close();
    server.close();

    Ok(serde_json::json!({
        "messages": echoed,
        "close_status": close.status_code,
        "client": client.stats().snapshot(),
        "server": server.stats().snapshot(),
    }))
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match load_config(cli.config.as_ref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("error: {e}");
            return ExitCode::FAILURE;
        },
    };
    if let Err(e) = logging::init(&config.logging) {
        eprintln!("warning: {e}");
    }

    let report = run(&cli, &config).and_then(|report| Ok(serde_json::to_string_pretty(&report)?));
    match report {
        Ok(report) => {
            println!("{report}");
            ExitCode::SUCCESS
        },
        Err(e) => {
            error!(error = %e, "Echo session failed");
            eprintln!("error: {e}");
            ExitCode::FAILURE
        },
    }
}
