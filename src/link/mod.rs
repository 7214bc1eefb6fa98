//! Byte-level transport to one device
//!
//! A [`Link`] wraps one bidirectional stream — a TCP connection or a
//! serial port — behind a uniform read/write/close surface. Both
//! realisations signal closure the same way: reads yield `None`, writes
//! fail with [`Error::LinkClosed`]. Each link is owned by exactly one
//! device session.

use std::net::SocketAddr;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, ReadHalf, WriteHalf};
use tokio::net::TcpStream;
use tokio_serial::SerialStream;

use crate::{Error, Result};

/// Read buffer size for link chunks
const READ_BUF: usize = 256;

/// Stream types a link can wrap
pub trait LinkStream: AsyncRead + AsyncWrite + Send + Unpin {}

impl<T: AsyncRead + AsyncWrite + Send + Unpin> LinkStream for T {}

/// A byte transport to one device
pub struct Link {
    identity: String,
    usb_info: Option<(u16, u16)>,
    stream: Box<dyn LinkStream>,
}

impl Link {
    /// Wrap an accepted TCP connection.
    ///
    /// The identity is the remote `address:port`.
    #[must_use]
    pub fn tcp(stream: TcpStream, peer: SocketAddr) -> Self {
        Self {
            identity: peer.to_string(),
            usb_info: None,
            stream: Box::new(stream),
        }
    }

    /// Wrap an opened serial port.
    ///
    /// The identity is the port path; USB vendor/product ids come from
    /// port enumeration when available.
    #[must_use]
    pub fn serial(stream: SerialStream, path: &str, usb_info: Option<(u16, u16)>) -> Self {
        Self {
            identity: path.to_string(),
            usb_info,
            stream: Box::new(stream),
        }
    }

    /// Wrap an arbitrary stream (used by tests via `tokio::io::duplex`)
    #[must_use]
    pub fn from_stream(
        identity: impl Into<String>,
        usb_info: Option<(u16, u16)>,
        stream: Box<dyn LinkStream>,
    ) -> Self {
        Self {
            identity: identity.into(),
            usb_info,
            stream,
        }
    }

    /// Stable identity derived from the link endpoint
    #[must_use]
    pub fn identity(&self) -> &str {
        &self.identity
    }

    /// USB vendor/product ids, when the transport knows them
    #[must_use]
    pub fn usb_info(&self) -> Option<(u16, u16)> {
        self.usb_info
    }

    /// Split into independently owned read and write halves
    #[must_use]
    pub fn split(self) -> (LinkReader, LinkWriter) {
        let (reader, writer) = tokio::io::split(self.stream);
        (
            LinkReader {
                identity: self.identity.clone(),
                inner: reader,
            },
            LinkWriter {
                identity: self.identity,
                inner: writer,
                closed: false,
            },
        )
    }
}

/// Read half of a link
pub struct LinkReader {
    identity: String,
    inner: ReadHalf<Box<dyn LinkStream>>,
}

impl LinkReader {
    /// Yield the next chunk of bytes, or `None` once the transport closed
    ///
    /// # Errors
    ///
    /// Returns error if the underlying read fails
    pub async fn read_chunk(&mut self) -> Result<Option<Vec<u8>>> {
        let mut buf = [0u8; READ_BUF];
        match self.inner.read(&mut buf).await {
            Ok(0) => Ok(None),
            Ok(n) => Ok(Some(buf[..n].to_vec())),
            Err(e) => {
                tracing::debug!(link = %self.identity, error = %e, "link read failed");
                Err(Error::Io(e))
            }
        }
    }
}

/// Write half of a link
pub struct LinkWriter {
    identity: String,
    inner: WriteHalf<Box<dyn LinkStream>>,
    closed: bool,
}

impl LinkWriter {
    /// Enqueue bytes for transmission
    ///
    /// # Errors
    ///
    /// Returns [`Error::LinkClosed`] if the transport is down
    pub async fn write_all(&mut self, bytes: &[u8]) -> Result<()> {
        if self.closed {
            return Err(Error::LinkClosed);
        }
        if let Err(e) = self.inner.write_all(bytes).await {
            tracing::debug!(link = %self.identity, error = %e, "link write failed");
            self.closed = true;
            return Err(Error::LinkClosed);
        }
        if let Err(e) = self.inner.flush().await {
            tracing::debug!(link = %self.identity, error = %e, "link flush failed");
            self.closed = true;
            return Err(Error::LinkClosed);
        }
        Ok(())
    }

    /// Close the transport. Idempotent; later writes fail with `LinkClosed`.
    pub async fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        if let Err(e) = self.inner.shutdown().await {
            tracing::trace!(link = %self.identity, error = %e, "link shutdown error");
        }
    }
}
