//! Connection wrapper with TLS sniffing and STARTTLS.
//!
//! One listener serves both implicit-TLS and cleartext clients. Nothing is
//! decided at accept time; the first read pulls a single byte and, if it is
//! a TLS handshake record, the connection is handed to the acceptor with
//! that byte replayed in front. Anything else is cleartext and the byte is
//! returned to the reader unchanged.

#![allow(clippy::missing_errors_doc)]

use std::future::Future;
use std::io;
use std::pin::Pin;
use std::task::{Context, Poll, ready};

use bytes::{Buf, Bytes};
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio_rustls::server::TlsStream;
use tokio_rustls::{Accept, TlsAcceptor};

use crate::{Error, Result};

/// First byte of a TLS handshake record.
pub const TLS_HANDSHAKE_RECORD: u8 = 0x16;

/// Stream that yields `prefix` before reading from the inner stream.
///
/// Writes go straight through.
#[derive(Debug)]
pub struct Prefixed<S> {
    prefix: Bytes,
    inner: S,
}

impl<S> Prefixed<S> {
    /// Wraps `inner` behind `prefix`.
    pub fn new(prefix: impl Into<Bytes>, inner: S) -> Self {
        Self {
            prefix: prefix.into(),
            inner,
        }
    }
}

impl<S: AsyncRead + Unpin> AsyncRead for Prefixed<S> {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        if this.prefix.has_remaining() {
            let n = this.prefix.len().min(buf.remaining());
            buf.put_slice(&this.prefix.split_to(n));
            return Poll::Ready(Ok(()));
        }
        Pin::new(&mut this.inner).poll_read(cx, buf)
    }
}

impl<S: AsyncWrite + Unpin> AsyncWrite for Prefixed<S> {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        Pin::new(&mut self.get_mut().inner).poll_write(cx, buf)
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().inner).poll_flush(cx)
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().inner).poll_shutdown(cx)
    }
}

enum State<S> {
    /// Nothing read yet.
    Detecting(S),
    /// TLS handshake in progress.
    Handshaking(Accept<Prefixed<S>>),
    /// Cleartext.
    Plain(Prefixed<S>),
    /// TLS established.
    Tls(Box<TlsStream<Prefixed<S>>>),
    /// Handshake failed; the connection is unusable.
    Closed,
}

impl<S> State<S> {
    const fn name(&self) -> &'static str {
        match self {
            Self::Detecting(_) => "detecting",
            Self::Handshaking(_) => "handshaking",
            Self::Plain(_) => "plain",
            Self::Tls(_) => "tls",
            Self::Closed => "closed",
        }
    }
}

/// Server side of an IMAP connection.
///
/// Writes issued before the first read go to the raw stream, so a server
/// greeting can be sent while detection is still pending. Writes issued
/// during a handshake wait for it to finish.
pub struct ImapStream<S> {
    state: State<S>,
    acceptor: Option<TlsAcceptor>,
}

impl<S> ImapStream<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Wraps an accepted connection.
    ///
    /// Without an acceptor the connection is always cleartext and
    /// [`start_tls`](Self::start_tls) fails.
    pub const fn new(stream: S, acceptor: Option<TlsAcceptor>) -> Self {
        Self {
            state: State::Detecting(stream),
            acceptor,
        }
    }

    /// Returns true once TLS is established.
    #[must_use]
    pub const fn is_tls(&self) -> bool {
        matches!(self.state, State::Tls(_))
    }

    /// Returns true if an upgrade is possible on this connection.
    #[must_use]
    pub const fn can_start_tls(&self) -> bool {
        self.acceptor.is_some() && matches!(self.state, State::Detecting(_) | State::Plain(_))
    }

    /// Waits for the first byte and completes a TLS handshake if the
    /// client opened with one.
    ///
    /// Cancelling this future loses no data.
    pub async fn detect(&mut self) -> Result<()> {
        std::future::poll_fn(|cx| self.poll_detect(cx)).await?;
        Ok(())
    }

    /// Upgrades a cleartext connection to TLS.
    ///
    /// The caller must already have written its tagged OK. A handshake
    /// failure leaves the stream closed.
    pub async fn start_tls(&mut self) -> Result<()> {
        let acceptor = self
            .acceptor
            .clone()
            .ok_or_else(|| Error::InvalidState("TLS is not configured".to_string()))?;

        let stream = match std::mem::replace(&mut self.state, State::Closed) {
            State::Detecting(stream) => Prefixed::new(Bytes::new(), stream),
            State::Plain(stream) => stream,
            other => {
                let name = other.name();
                self.state = other;
                return Err(Error::InvalidState(format!(
                    "cannot start TLS on a {name} connection"
                )));
            }
        };

        tracing::debug!("starting TLS handshake");
        self.state = State::Handshaking(acceptor.accept(stream));
        self.detect().await
    }

    /// Drives the connection out of `Detecting` and `Handshaking`.
    fn poll_detect(&mut self, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        loop {
            match &mut self.state {
                State::Detecting(stream) => {
                    let mut byte = [0u8; 1];
                    let mut peek = ReadBuf::new(&mut byte);
                    ready!(Pin::new(stream).poll_read(cx, &mut peek))?;
                    let first = peek.filled().first().copied();

                    let State::Detecting(stream) = std::mem::replace(&mut self.state, State::Closed)
                    else {
                        return Poll::Ready(Err(closed()));
                    };

                    self.state = match (first, &self.acceptor) {
                        (Some(TLS_HANDSHAKE_RECORD), Some(acceptor)) => {
                            tracing::debug!("TLS client hello detected");
                            let replay = Prefixed::new(vec![TLS_HANDSHAKE_RECORD], stream);
                            State::Handshaking(acceptor.accept(replay))
                        }
                        (Some(byte), _) => State::Plain(Prefixed::new(vec![byte], stream)),
                        (None, _) => State::Plain(Prefixed::new(Bytes::new(), stream)),
                    };
                }
                State::Handshaking(accept) => match ready!(Pin::new(accept).poll(cx)) {
                    Ok(tls) => {
                        tracing::debug!("TLS established");
                        self.state = State::Tls(Box::new(tls));
                    }
                    Err(e) => {
                        tracing::debug!(error = %e, "TLS handshake failed");
                        self.state = State::Closed;
                        return Poll::Ready(Err(e));
                    }
                },
                State::Plain(_) | State::Tls(_) => return Poll::Ready(Ok(())),
                State::Closed => return Poll::Ready(Err(closed())),
            }
        }
    }

    fn poll_writer(
        &mut self,
        cx: &mut Context<'_>,
    ) -> Poll<io::Result<&mut (dyn AsyncWrite + Unpin + '_)>> {
        if matches!(self.state, State::Handshaking(_)) {
            ready!(self.poll_detect(cx))?;
        }
        match &mut self.state {
            State::Detecting(stream) => Poll::Ready(Ok(stream)),
            State::Plain(stream) => Poll::Ready(Ok(stream)),
            State::Tls(stream) => Poll::Ready(Ok(stream.as_mut())),
            State::Handshaking(_) | State::Closed => Poll::Ready(Err(closed())),
        }
    }
}

fn closed() -> io::Error {
    io::Error::new(io::ErrorKind::NotConnected, "connection closed after TLS failure")
}

impl<S> AsyncRead for ImapStream<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        if buf.remaining() == 0 {
            return Poll::Ready(Ok(()));
        }
        ready!(this.poll_detect(cx))?;
        match &mut this.state {
            State::Plain(stream) => Pin::new(stream).poll_read(cx, buf),
            State::Tls(stream) => Pin::new(stream.as_mut()).poll_read(cx, buf),
            _ => Poll::Ready(Err(closed())),
        }
    }
}

impl<S> AsyncWrite for ImapStream<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        let writer = ready!(self.get_mut().poll_writer(cx))?;
        Pin::new(writer).poll_write(cx, buf)
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        let writer = ready!(self.get_mut().poll_writer(cx))?;
        Pin::new(writer).poll_flush(cx)
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        let writer = ready!(self.get_mut().poll_writer(cx))?;
        Pin::new(writer).poll_shutdown(cx)
    }
}

impl<S> std::fmt::Debug for ImapStream<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImapStream")
            .field("state", &self.state.name())
            .field("tls_configured", &self.acceptor.is_some())
            .finish()
    }
}
