//! GQTP transport.
//!
//! The protocol connection only needs three things from below it: open a
//! connection, send bytes and get back one header+body reply, and close.
//! [`Transport`] is that seam; [`GqtpTransport`] is the implementation
//! over a plain TCP socket.
//!
//! ## Frame format
//! ```text
//! ┌──────────┬───────────┬──────────┬─────────┬─────────┬──────────┐
//! │ 0xc7 (1) │ qtype (1) │ klen (2) │ lvl (1) │ flg (1) │ stat (2) │
//! ├──────────┴───────────┴──────────┴─────────┴─────────┴──────────┤
//! │ size (4)  │ opaque (4) │ cas (8)  │          body ...           │
//! └───────────┴────────────┴──────────┴─────────────────────────────┘
//! ```
//! All integers are big-endian.

use std::future::Future;
use std::time::Duration;

use bytes::{Buf, BufMut, Bytes, BytesMut};
use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::{debug, info};

use crate::config::ClientConfig;

/// Protocol marker, first byte of every frame
pub const GQTP_PROTOCOL: u8 = 0xc7;
/// Header size in bytes
pub const HEADER_SIZE: usize = 24;

/// Frame flags
pub mod flags {
    /// More frames follow for the same reply
    pub const MORE: u8 = 0x01;
    /// Last frame of a request
    pub const TAIL: u8 = 0x02;
    /// First frame of a request
    pub const HEAD: u8 = 0x04;
    /// Suppress the reply
    pub const QUIET: u8 = 0x08;
    /// Ask the server to close the session
    pub const QUIT: u8 = 0x10;
}

/// Error raised by a transport
#[derive(Debug, Error)]
pub enum TransportError {
    /// I/O error on the socket
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Operation timed out
    #[error("Operation timed out: {0}")]
    Timeout(#[from] tokio::time::error::Elapsed),

    /// Peer sent something that is not a GQTP frame
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Reply larger than the configured maximum
    #[error("Reply too large: {size} bytes (max: {max})")]
    FrameTooLarge {
        /// Announced size
        size: usize,
        /// Configured limit
        max: usize,
    },
}

/// GQTP frame header
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Header {
    /// Content type of the body
    pub query_type: u8,
    /// Key length, always 0 for commands
    pub key_length: u16,
    /// Priority level
    pub level: u8,
    /// Frame flags, see [`flags`]
    pub flags: u8,
    /// Status code, 0 is success
    pub status: u16,
    /// Body size in bytes
    pub size: u32,
    /// Opaque value echoed by the server
    pub opaque: u32,
    /// Compare-and-swap value
    pub cas: u64,
}

impl Header {
    /// Header for a single-frame request of `size` bytes
    pub fn request(size: u32) -> Self {
        Self {
            flags: flags::TAIL,
            size,
            ..Default::default()
        }
    }

    /// Whether more frames follow this one
    pub fn has_more(&self) -> bool {
        self.flags & flags::MORE != 0
    }

    /// Encode the header (24 bytes, big-endian)
    pub fn to_bytes(&self) -> [u8; HEADER_SIZE] {
        let mut buf = BytesMut::with_capacity(HEADER_SIZE);
        buf.put_u8(GQTP_PROTOCOL);
        buf.put_u8(self.query_type);
        buf.put_u16(self.key_length);
        buf.put_u8(self.level);
        buf.put_u8(self.flags);
        buf.put_u16(self.status);
        buf.put_u32(self.size);
        buf.put_u32(self.opaque);
        buf.put_u64(self.cas);

        let mut out = [0u8; HEADER_SIZE];
        out.copy_from_slice(&buf);
        out
    }

    /// Decode a header
    pub fn from_bytes(mut data: &[u8]) -> Result<Self, TransportError> {
        if data.len() < HEADER_SIZE {
            return Err(TransportError::Protocol(format!(
                "Header too short: {} bytes",
                data.len()
            )));
        }

        let protocol = data.get_u8();
        if protocol != GQTP_PROTOCOL {
            return Err(TransportError::Protocol(format!(
                "Unexpected protocol byte: {:#04x}",
                protocol
            )));
        }

        Ok(Self {
            query_type: data.get_u8(),
            key_length: data.get_u16(),
            level: data.get_u8(),
            flags: data.get_u8(),
            status: data.get_u16(),
            size: data.get_u32(),
            opaque: data.get_u32(),
            cas: data.get_u64(),
        })
    }
}

/// One complete reply: the header and the body arrive together
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    /// Header of the final frame, `size` covering the whole body
    pub header: Header,
    /// Reply body
    pub body: Bytes,
}

impl Reply {
    /// Create a reply
    pub fn new(header: Header, body: impl Into<Bytes>) -> Self {
        Self {
            header,
            body: body.into(),
        }
    }

    /// Status code from the header
    pub fn status(&self) -> u16 {
        self.header.status
    }

    /// Status as a Groonga return code.
    ///
    /// The wire field is unsigned but carries a signed 16-bit code, so
    /// `65514` reads back as `-22`.
    pub fn return_code(&self) -> i64 {
        i64::from(self.header.status as i16)
    }

    /// Body as text, with invalid UTF-8 replaced
    pub fn body_text(&self) -> std::borrow::Cow<'_, str> {
        String::from_utf8_lossy(&self.body)
    }
}

/// The collaborator below the protocol connection.
///
/// Implementations own their socket exclusively. `close` consumes the
/// transport so it can be moved onto a background task.
pub trait Transport: Sized + Send + 'static {
    /// Send a formatted command and resolve with its reply
    fn transmit(&mut self, payload: Bytes)
        -> impl Future<Output = Result<Reply, TransportError>> + Send;

    /// Close the underlying connection
    fn close(self) -> impl Future<Output = Result<(), TransportError>> + Send;
}

/// [`Transport`] speaking GQTP over TCP
#[derive(Debug)]
pub struct GqtpTransport {
    stream: TcpStream,
    address: String,
    request_timeout: Duration,
    max_frame_size: usize,
}

impl GqtpTransport {
    /// Connect to the server named by `config`
    pub async fn connect(config: &ClientConfig) -> Result<Self, TransportError> {
        let address = config.address();
        info!("Connecting to Groonga server at {}", address);

        let stream = timeout(config.connect_timeout, TcpStream::connect(address.as_str())).await??;
        stream.set_nodelay(true)?;

        info!("Connected to Groonga server at {}", address);
        Ok(Self {
            stream,
            address,
            request_timeout: config.request_timeout,
            max_frame_size: config.max_frame_size,
        })
    }

    /// Address this transport is connected to
    pub fn address(&self) -> &str {
        &self.address
    }

    async fn write_frame(&mut self, payload: &[u8]) -> Result<(), TransportError> {
        let size = u32::try_from(payload.len()).map_err(|_| TransportError::FrameTooLarge {
            size: payload.len(),
            max: u32::MAX as usize,
        })?;

        let mut frame = Vec::with_capacity(HEADER_SIZE + payload.len());
        frame.extend_from_slice(&Header::request(size).to_bytes());
        frame.extend_from_slice(payload);

        debug!("Sending frame: {} bytes", frame.len());
        timeout(self.request_timeout, self.stream.write_all(&frame)).await??;
        timeout(self.request_timeout, self.stream.flush()).await??;
        Ok(())
    }

    async fn read_frame(&mut self, received: usize) -> Result<(Header, Vec<u8>), TransportError> {
        let mut header_buf = [0u8; HEADER_SIZE];
        timeout(self.request_timeout, self.stream.read_exact(&mut header_buf)).await??;
        let header = Header::from_bytes(&header_buf)?;

        let size = header.size as usize;
        if received + size > self.max_frame_size {
            return Err(TransportError::FrameTooLarge {
                size: received + size,
                max: self.max_frame_size,
            });
        }

        let mut body = vec![0u8; size];
        if size > 0 {
            timeout(self.request_timeout, self.stream.read_exact(&mut body)).await??;
        }
        Ok((header, body))
    }
}

impl Transport for GqtpTransport {
    async fn transmit(&mut self, payload: Bytes) -> Result<Reply, TransportError> {
        self.write_frame(&payload).await?;

        let mut body = BytesMut::new();
        loop {
            let (mut header, chunk) = self.read_frame(body.len()).await?;
            body.extend_from_slice(&chunk);
            if !header.has_more() {
                header.size = body.len() as u32;
                debug!("Received reply: {} bytes, status {}", body.len(), header.status);
                return Ok(Reply::new(header, body.freeze()));
            }
        }
    }

    async fn close(mut self) -> Result<(), TransportError> {
        debug!("Closing connection to {}", self.address);
        self.stream.shutdown().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    #[test]
    fn test_header_layout() {
        let header = Header::request(6);
        let bytes = header.to_bytes();

        assert_eq!(bytes[0], GQTP_PROTOCOL);
        assert_eq!(bytes[5], flags::TAIL);
        assert_eq!(&bytes[8..12], &6u32.to_be_bytes());
        assert_eq!(Header::from_bytes(&bytes).unwrap(), header);
    }

    #[test]
    fn test_reply_return_code_is_signed() {
        let header = Header {
            status: 65514,
            ..Default::default()
        };
        let reply = Reply::new(header, "");
        assert_eq!(reply.status(), 65514);
        assert_eq!(reply.return_code(), -22);
        assert_eq!(Reply::new(Header::default(), "").return_code(), 0);
    }

    #[test]
    fn test_header_rejects_wrong_protocol() {
        let mut bytes = Header::request(0).to_bytes();
        bytes[0] = 0x00;
        assert!(matches!(
            Header::from_bytes(&bytes),
            Err(TransportError::Protocol(_))
        ));
        assert!(matches!(
            Header::from_bytes(&bytes[..10]),
            Err(TransportError::Protocol(_))
        ));
    }

    async fn write_reply_frame(socket: &mut TcpStream, flags: u8, status: u16, body: &[u8]) {
        let header = Header {
            flags,
            status,
            size: body.len() as u32,
            ..Default::default()
        };
        socket.write_all(&header.to_bytes()).await.unwrap();
        socket.write_all(body).await.unwrap();
    }

    #[tokio::test]
    async fn test_transmit_joins_continued_frames() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let server = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut header_buf = [0u8; HEADER_SIZE];
            socket.read_exact(&mut header_buf).await.unwrap();
            let header = Header::from_bytes(&header_buf).unwrap();
            let mut request = vec![0u8; header.size as usize];
            socket.read_exact(&mut request).await.unwrap();

            write_reply_frame(&mut socket, flags::MORE, 0, b"[[1],").await;
            write_reply_frame(&mut socket, flags::TAIL, 0, b"[2]]").await;
            String::from_utf8(request).unwrap()
        });

        let config = ClientConfig::new("127.0.0.1", port);
        let mut transport = GqtpTransport::connect(&config).await.unwrap();
        let reply = transport.transmit(Bytes::from_static(b"status")).await.unwrap();

        assert_eq!(reply.body_text(), "[[1],[2]]");
        assert_eq!(reply.header.size, 9);
        assert_eq!(reply.status(), 0);
        assert_eq!(server.await.unwrap(), "status");

        transport.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_transmit_rejects_oversized_reply() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; HEADER_SIZE + 6];
            socket.read_exact(&mut buf).await.unwrap();
            write_reply_frame(&mut socket, flags::TAIL, 0, &[b'x'; 32]).await;
        });

        let config = ClientConfig::new("127.0.0.1", port).with_max_frame_size(16);
        let mut transport = GqtpTransport::connect(&config).await.unwrap();
        let error = transport
            .transmit(Bytes::from_static(b"status"))
            .await
            .unwrap_err();

        assert!(matches!(error, TransportError::FrameTooLarge { size: 32, max: 16 }));
    }
}
