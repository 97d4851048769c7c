use std::path::{Path, PathBuf};

use futures::{SinkExt, StreamExt};
use tokio::net::UnixStream;
use tokio_util::codec::{Framed, LinesCodec};
use tracing::{debug, trace};

use super::{ActionMessage, ActionReply, CallOpen, IpcError, system::VersionReply};

type FramedStream = Framed<UnixStream, LinesCodec>;

/// Client for talking to the daemon. Every call opens its own connection.
#[derive(Debug, Clone)]
pub struct Client {
  socket_path: PathBuf,
}

impl Client {
  pub async fn connect() -> Result<Self, IpcError> {
    Self::connect_to(&crate::dirs::default_socket_path()).await
  }

  /// Check the daemon is reachable at `socket_path`.
  pub async fn connect_to(socket_path: &Path) -> Result<Self, IpcError> {
    UnixStream::connect(socket_path)
      .await
      .map_err(|e| IpcError::Connection(format!("{}: {e}", socket_path.display())))?;
    Ok(Self {
      socket_path: socket_path.to_path_buf(),
    })
  }

  pub fn socket_path(&self) -> &Path {
    &self.socket_path
  }

  async fn open(&self, call: CallOpen) -> Result<FramedStream, IpcError> {
    let stream = UnixStream::connect(&self.socket_path)
      .await
      .map_err(|e| IpcError::Connection(e.to_string()))?;
    let mut framed = Framed::new(stream, LinesCodec::new());
    framed.send(serde_json::to_string(&call)?).await?;
    trace!(?call, "Opened call");
    Ok(framed)
  }

  /// Unary version query.
  pub async fn get_version(&self) -> Result<VersionReply, IpcError> {
    let mut framed = self.open(CallOpen::GetVersion).await?;
    match framed.next().await {
      Some(Ok(line)) => Ok(serde_json::from_str(&line)?),
      Some(Err(e)) => Err(e.into()),
      None => Err(IpcError::Closed),
    }
  }

  /// Open a bidirectional action stream.
  pub async fn open_action(&self) -> Result<ActionStream, IpcError> {
    let framed = self.open(CallOpen::ProcessAction).await?;
    Ok(ActionStream { framed })
  }

  /// Send one message and collect the replies of a call that doesn't prompt.
  pub async fn call(&self, message: impl Into<ActionMessage>) -> Result<Vec<ActionReply>, IpcError> {
    let mut stream = self.open_action().await?;
    stream.send(message).await?;
    stream.collect().await
  }
}

/// One action call. Dropping it closes the connection, which cancels the
/// action on the server.
#[derive(Debug)]
pub struct ActionStream {
  framed: FramedStream,
}

impl ActionStream {
  pub async fn send(&mut self, message: impl Into<ActionMessage>) -> Result<(), IpcError> {
    let json = serde_json::to_string(&message.into())?;
    self.framed.send(json).await?;
    Ok(())
  }

  /// Next reply, or `None` once the server has closed the call.
  pub async fn next_reply(&mut self) -> Result<Option<ActionReply>, IpcError> {
    match self.framed.next().await {
      Some(Ok(line)) => Ok(Some(serde_json::from_str(&line)?)),
      Some(Err(e)) => Err(e.into()),
      None => {
        debug!("Action stream closed");
        Ok(None)
      }
    }
  }

  /// Read replies until the call ends or the server asks for a continuation.
  ///
  /// A prompt is returned as the last element; answer it with [`Self::send`]
  /// and keep reading.
  pub async fn collect(&mut self) -> Result<Vec<ActionReply>, IpcError> {
    let mut replies = Vec::new();
    while let Some(reply) = self.next_reply().await? {
      let is_prompt = reply.is_prompt();
      replies.push(reply);
      if is_prompt {
        break;
      }
    }
    Ok(replies)
  }
}
