//! IPC server - the transport in front of the gateway
//!
//! The server accepts connections on a Unix socket. Each connection carries
//! exactly one call, selected by its first line:
//!
//! - `get_version` answers immediately without touching the queue
//! - `process_action` turns the connection into one action stream and
//!   submits it to the [`Gateway`]
//!
//! # Threading Model
//!
//! - Server accepts connections on its own task
//! - Each connection runs in its own spawned task, with a reader task feeding
//!   parsed messages to the worker and a writer loop flushing its replies
//! - Only the action worker touches domain state

use std::path::PathBuf;

use futures::{SinkExt, StreamExt};
use tokio::net::{UnixListener, UnixStream};
use tokio_util::{
  codec::{Framed, LinesCodec},
  sync::CancellationToken,
};
use tracing::{debug, error, info, trace, warn};

use crate::{
  actor::{ClientEnd, ClientHandle, Gateway},
  ipc::{ActionMessage, CallOpen, IpcError, system::VersionReply},
};

/// Bound of the per-call inbound and outbound channels
const CALL_CHANNEL_CAPACITY: usize = 32;

// ============================================================================
// Server Configuration
// ============================================================================

pub struct ServerConfig {
  /// Path to the Unix socket for IPC
  pub socket_path: PathBuf,
  /// Front door of the action worker
  pub gateway: Gateway,
}

#[derive(Debug, thiserror::Error)]
pub enum ServerError {
  #[error("Failed to bind {}: {source}", path.display())]
  Bind { path: PathBuf, source: std::io::Error },
  #[error("IO error: {0}")]
  Io(#[from] std::io::Error),
}

// ============================================================================
// Server
// ============================================================================

pub struct Server {
  config: ServerConfig,
}

impl Server {
  pub fn new(config: ServerConfig) -> Self {
    Self { config }
  }

  /// Run the server until the cancellation token is triggered.
  ///
  /// Removes a stale socket file before binding and the socket file on exit.
  pub async fn run(&self, cancel: CancellationToken) -> Result<(), ServerError> {
    let socket_path = &self.config.socket_path;
    if socket_path.exists() {
      tokio::fs::remove_file(socket_path).await?;
    }
    if let Some(parent) = socket_path.parent() {
      tokio::fs::create_dir_all(parent).await?;
    }

    let listener = UnixListener::bind(socket_path).map_err(|source| ServerError::Bind {
      path: socket_path.clone(),
      source,
    })?;
    info!("Server listening on {:?}", socket_path);

    loop {
      tokio::select! {
        biased;

        _ = cancel.cancelled() => {
          info!("Server shutting down (cancelled)");
          break;
        }

        result = listener.accept() => {
          match result {
            Ok((stream, _)) => {
              let gateway = self.config.gateway.clone();
              let cancel = cancel.child_token();
              tokio::spawn(async move {
                if let Err(e) = handle_connection(stream, gateway, cancel).await {
                  warn!(error = %e, "Connection ended with error");
                }
              });
            }
            Err(e) => {
              error!("Accept error: {}", e);
            }
          }
        }
      }
    }

    if socket_path.exists() {
      tokio::fs::remove_file(socket_path).await?;
    }

    Ok(())
  }
}

// ============================================================================
// Connection Handler
// ============================================================================

type FramedStream = Framed<UnixStream, LinesCodec>;

async fn handle_connection(stream: UnixStream, gateway: Gateway, cancel: CancellationToken) -> Result<(), IpcError> {
  let mut framed = Framed::new(stream, LinesCodec::new());

  let open: CallOpen = match framed.next().await {
    Some(Ok(line)) => serde_json::from_str(line.trim())?,
    Some(Err(e)) => return Err(e.into()),
    None => {
      debug!("Client disconnected before opening a call");
      return Ok(());
    }
  };
  trace!(?open, "Call opened");

  match open {
    CallOpen::GetVersion => {
      framed.send(serde_json::to_string(&VersionReply::current())?).await?;
      Ok(())
    }
    CallOpen::ProcessAction => process_action(framed, gateway, cancel).await,
  }
}

/// Bridge one action stream between the socket and the worker.
///
/// The call is cancelled when reading from or writing to the client fails.
/// End of input only closes the inbound channel so a client may half-close
/// and still read its replies.
async fn process_action(framed: FramedStream, gateway: Gateway, cancel: CancellationToken) -> Result<(), IpcError> {
  let (handle, ClientEnd { inbound, mut outbound }) = ClientHandle::channel(CALL_CHANNEL_CAPACITY);
  let (mut sink, mut lines) = framed.split();

  let reader_cancel = cancel.clone();
  let reader = tokio::spawn(async move {
    while let Some(line) = lines.next().await {
      match line {
        Ok(line) => {
          let line = line.trim();
          if line.is_empty() {
            continue;
          }
          if inbound.send(ActionMessage::parse(line)).await.is_err() {
            break;
          }
        }
        Err(e) => {
          warn!(error = %e, "Error reading from client");
          reader_cancel.cancel();
          break;
        }
      }
    }
  });

  let writer_cancel = cancel.clone();
  let writer = async move {
    while let Some(reply) = outbound.recv().await {
      let json = match serde_json::to_string(&reply) {
        Ok(json) => json,
        Err(e) => {
          error!(error = %e, "Failed to serialize reply");
          writer_cancel.cancel();
          break;
        }
      };
      if let Err(e) = sink.send(json).await {
        debug!(error = %e, "Client went away while writing");
        writer_cancel.cancel();
        break;
      }
    }
    let _ = sink.close().await;
  };

  let (submitted, ()) = tokio::join!(gateway.submit(handle, cancel), writer);
  reader.abort();

  submitted.map_err(|e| IpcError::Protocol(e.to_string()))
}
