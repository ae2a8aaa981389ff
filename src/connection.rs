//! Protocol connection to a Groonga server

use bytes::Bytes;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::command::{Command, OutputType};
use crate::config::ClientConfig;
use crate::raw_response::{PendingResponse, RawResponse};
use crate::response::Response;
use crate::transport::{GqtpTransport, Transport};
use crate::{Error, Result};

/// A single logical connection to a Groonga server.
///
/// One request is in flight at a time: [`send`](Connection::send) takes
/// `&mut self` and resolves once the reply has been rendered and decoded.
/// After [`close`](Connection::close) the connection rejects further
/// commands with [`Error::NotConnected`].
#[derive(Debug)]
pub struct Connection<T: Transport = GqtpTransport> {
    transport: Option<T>,
}

impl Connection<GqtpTransport> {
    /// Open a GQTP connection to the server named by `config`
    pub async fn open(config: ClientConfig) -> Result<Self> {
        let transport = GqtpTransport::connect(&config)
            .await
            .map_err(Error::transport(format!("failed to connect to {}", config.address())))?;
        Ok(Self::with_transport(transport))
    }

    /// Open a GQTP connection to `host:port` with default timeouts
    pub async fn connect(host: impl Into<String>, port: u16) -> Result<Self> {
        Self::open(ClientConfig::new(host, port)).await
    }
}

impl<T: Transport> Connection<T> {
    /// Wrap an already established transport
    pub fn with_transport(transport: T) -> Self {
        Self {
            transport: Some(transport),
        }
    }

    /// Whether a live transport is held
    pub fn is_connected(&self) -> bool {
        self.transport.is_some()
    }

    /// Send a command and decode its reply.
    ///
    /// JSON output is decoded into a typed [`Response`]; XML and `none`
    /// output come back as [`Response::Raw`]. A JSON reply with a non-zero
    /// status is returned as [`Error::Server`].
    pub async fn send(&mut self, command: &Command) -> Result<Response> {
        let raw = self.execute(command).await?;

        let status = raw.reply().return_code();
        if status != 0 && command.output_type() == OutputType::Json {
            return Err(Error::Server {
                command: command.name().to_string(),
                status,
                message: raw.reply().body_text().trim().to_string(),
            });
        }

        Response::parse(command, &raw.render())
    }

    /// Send a command and return the rendered reply text.
    ///
    /// The elapsed time in the rendered header is measured when rendering,
    /// which happens as soon as the reply arrives.
    pub async fn send_raw(&mut self, command: &Command) -> Result<String> {
        let raw = self.execute(command).await?;
        Ok(raw.render())
    }

    async fn execute<'a>(&mut self, command: &'a Command) -> Result<RawResponse<'a>> {
        let transport = self.transport.as_mut().ok_or(Error::NotConnected)?;

        let formatted = command.to_command_format();
        debug!(
            "Executing command: {} ({} bytes, output_type={})",
            command.name(),
            formatted.len(),
            command.output_type()
        );

        let pending = PendingResponse::new(command);
        let reply = transport
            .transmit(Bytes::from(formatted))
            .await
            .map_err(Error::transport(format!("failed to execute `{}`", command.name())));
        if let Err(error) = &reply {
            // Unread reply bytes may remain on the socket, so it is never reused.
            warn!("Discarding connection: {}", error);
            self.transport = None;
        }

        Ok(pending.complete(reply?))
    }

    /// Close the connection and wait for the transport to confirm.
    ///
    /// Returns `Ok(true)` when an open connection was closed and
    /// `Ok(false)` when there was nothing to close.
    pub async fn close(&mut self) -> Result<bool> {
        match self.transport.take() {
            Some(transport) => {
                transport
                    .close()
                    .await
                    .map_err(Error::transport("failed to close connection"))?;
                info!("Connection closed");
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Close the connection on a background task.
    ///
    /// `on_closed` runs once the transport has confirmed the close. When
    /// the connection is not open the returned handle is already resolved
    /// and `on_closed` is not called. Must be called within a Tokio runtime.
    pub fn close_with<F>(&mut self, on_closed: F) -> CloseHandle
    where
        F: FnOnce() + Send + 'static,
    {
        match self.transport.take() {
            Some(transport) => {
                let task = tokio::spawn(async move {
                    let result = transport
                        .close()
                        .await
                        .map_err(Error::transport("failed to close connection"));
                    if result.is_ok() {
                        info!("Connection closed");
                        on_closed();
                    }
                    result
                });
                CloseHandle { task: Some(task) }
            }
            None => CloseHandle::resolved(),
        }
    }

    /// Close the connection on a background task without a callback
    pub fn close_in_background(&mut self) -> CloseHandle {
        self.close_with(|| {})
    }
}

impl<T: Transport> Drop for Connection<T> {
    fn drop(&mut self) {
        if self.transport.is_some() {
            warn!("Connection dropped without being closed");
        }
    }
}

/// Handle for a close running in the background
#[derive(Debug)]
#[must_use = "a close handle does nothing unless waited on or dropped deliberately"]
pub struct CloseHandle {
    task: Option<JoinHandle<Result<()>>>,
}

impl CloseHandle {
    /// A handle with nothing to wait for
    pub fn resolved() -> Self {
        Self { task: None }
    }

    /// Whether this handle had no connection to close
    pub fn is_noop(&self) -> bool {
        self.task.is_none()
    }

    /// Wait until the close has completed
    pub async fn wait(self) -> Result<()> {
        match self.task {
            Some(task) => task.await.map_err(std::io::Error::from)?,
            None => Ok(()),
        }
    }
}
