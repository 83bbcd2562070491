//! Per-connection command loop.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use imapd_wire::{
    Command, ContinuationReply, Error, ImapStream, Line, Liner, Outbox, Request, Response, Status,
    Tag, parse_request, request_tag,
};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::time::timeout;
use tracing::{debug, error, info, warn};

use crate::config::Config;

/// What the loop does after a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flow {
    Continue,
    Close,
}

/// One client connection in the not-authenticated state.
pub struct Session<S> {
    liner: Liner<ImapStream<S>>,
    outbox: Outbox,
    config: Arc<Config>,
}

impl<S> Session<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Creates a session over an accepted connection.
    pub fn new(stream: ImapStream<S>, config: Arc<Config>) -> Self {
        Self {
            liner: Liner::new(stream).with_max_command_size(config.max_command_size),
            outbox: Outbox::new(),
            config,
        }
    }

    /// Greets the client and serves commands until it leaves.
    pub async fn run(mut self) -> imapd_wire::Result<()> {
        if self.liner.get_ref().can_start_tls() {
            // Implicit-TLS clients speak first; cleartext ones wait for the greeting.
            let window = self.config.detect_timeout;
            if let Ok(detected) = timeout(window, self.liner.get_mut().detect()).await {
                detected?;
            }
        }
        info!(tls = self.liner.get_ref().is_tls(), "session started");

        let capabilities = self.capabilities().join(" ");
        self.outbox.push(
            Response::untagged(Status::Ok, self.config.greeting.clone())
                .with_code(format!("CAPABILITY {capabilities}")),
        );
        // Also finishes a handshake the detection window cut short.
        handshake_bounded(self.config.idle_timeout, self.flush()).await?;

        loop {
            let read = timeout(
                self.config.idle_timeout,
                self.liner.read_line(&mut ContinuationReply),
            )
            .await;

            let flow = match read {
                Err(_) => {
                    info!("idle timeout");
                    self.outbox
                        .push(Response::untagged(Status::Bye, "Autologout; idle for too long"));
                    self.flush().await?;
                    return Ok(());
                }
                Ok(Ok(None)) => {
                    debug!("client closed connection");
                    return Ok(());
                }
                Ok(Ok(Some(line))) => self.handle_line(&line).await?,
                Ok(Err(Error::Rejected { line, reason })) => {
                    warn!(%reason, "line rejected");
                    self.reject(&line, reason.to_string());
                    Flow::Continue
                }
                Ok(Err(Error::LineTooLong)) => {
                    warn!("line too long");
                    self.outbox
                        .push(Response::untagged(Status::Bye, "Line too long"));
                    self.flush().await?;
                    return Err(Error::LineTooLong);
                }
                Ok(Err(e)) => return Err(e),
            };

            self.flush().await?;
            if flow == Flow::Close {
                info!("session ended");
                return Ok(());
            }
        }
    }

    async fn handle_line(&mut self, line: &Line) -> imapd_wire::Result<Flow> {
        match parse_request(line) {
            Ok(request) => self.dispatch(request).await,
            Err(Error::Parse(e)) => {
                debug!(error = %e, "unparseable command");
                self.reject(&line.text, e.to_string());
                Ok(Flow::Continue)
            }
            Err(e) => Err(e),
        }
    }

    async fn dispatch(&mut self, request: Request) -> imapd_wire::Result<Flow> {
        let Request { tag, command } = request;
        debug!(%tag, command = ?command, "command");

        match command {
            Command::Capability => {
                self.outbox.push(Response::Capability(self.capabilities()));
                self.complete(tag, Status::Ok, "CAPABILITY completed");
            }
            Command::Noop => self.complete(tag, Status::Ok, "NOOP completed"),
            Command::Logout => {
                self.outbox.push(Response::untagged(
                    Status::Bye,
                    "IMAP4rev1 Server logging out",
                ));
                self.complete(tag, Status::Ok, "LOGOUT completed");
                return Ok(Flow::Close);
            }
            Command::StartTls => self.start_tls(tag).await?,
            Command::Login { username, .. } => {
                if self.login_allowed() {
                    debug!(user = %String::from_utf8_lossy(&username), "login refused");
                    self.complete(tag, Status::No, "Authentication not available");
                } else {
                    self.outbox.push(
                        Response::tagged(tag, Status::No, "LOGIN requires TLS")
                            .with_code("PRIVACYREQUIRED"),
                    );
                }
            }
            Command::Select(ref mailbox) | Command::Examine(ref mailbox) => {
                debug!(%mailbox, "no mailbox store");
                let text = format!("{} not available", command.name());
                self.complete(tag, Status::No, text);
            }
            other => {
                let text = format!("{} not available", other.name());
                self.complete(tag, Status::No, text);
            }
        }
        Ok(Flow::Continue)
    }

    async fn start_tls(&mut self, tag: Tag) -> imapd_wire::Result<()> {
        if !self.liner.get_ref().can_start_tls() {
            self.complete(tag, Status::Bad, "STARTTLS not available");
            return Ok(());
        }

        self.complete(tag, Status::Ok, "Begin TLS negotiation now");
        self.flush().await?;
        handshake_bounded(self.config.idle_timeout, self.liner.get_mut().start_tls()).await?;
        let discarded = self.liner.reset();
        if discarded > 0 {
            warn!(discarded, "dropped plaintext pipelined after STARTTLS");
        }
        info!("TLS established via STARTTLS");
        Ok(())
    }

    fn capabilities(&self) -> Vec<String> {
        let mut caps = vec![imapd_wire::IMAP_VERSION.to_string()];
        if self.liner.get_ref().can_start_tls() {
            caps.push("STARTTLS".to_string());
        }
        if !self.login_allowed() {
            caps.push("LOGINDISABLED".to_string());
        }
        caps
    }

    fn login_allowed(&self) -> bool {
        self.config.allow_plaintext_login || self.liner.get_ref().is_tls()
    }

    fn complete(&mut self, tag: Tag, status: Status, text: impl Into<String>) {
        self.outbox.push(Response::tagged(tag, status, text));
    }

    /// Answers an unusable line with BAD, tagged if the tag survived.
    fn reject(&mut self, line: &[u8], text: String) {
        let response = match request_tag(line) {
            Some(tag) => Response::tagged(tag, Status::Bad, text),
            None => Response::untagged(Status::Bad, text),
        };
        self.outbox.push(response);
    }

    async fn flush(&mut self) -> imapd_wire::Result<()> {
        if self.outbox.is_empty() {
            return Ok(());
        }
        if let Err(e) = self.outbox.flush(self.liner.get_mut()).await {
            if matches!(e, Error::MergeInvariant { .. }) {
                error!(error = %e, "response merge failed");
            }
            return Err(e);
        }
        Ok(())
    }
}

/// Runs a step that may be waiting on a TLS handshake, giving up after
/// `bound`.
async fn handshake_bounded<T>(
    bound: Duration,
    step: impl Future<Output = imapd_wire::Result<T>>,
) -> imapd_wire::Result<T> {
    match timeout(bound, step).await {
        Ok(result) => result,
        Err(_) => {
            warn!(?bound, "TLS handshake stalled");
            Err(Error::Timeout(bound))
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use imapd_wire::connection::{TLS_HANDSHAKE_RECORD, tls_acceptor_from_pem};
    use tokio::io::{AsyncReadExt, AsyncWriteExt, duplex};
    use tokio_rustls::rustls::pki_types::{CertificateDer, ServerName};
    use tokio_rustls::rustls::{ClientConfig, RootCertStore};
    use tokio_rustls::{TlsAcceptor, TlsConnector};
    use tokio_test::io::Builder;

    use super::*;
    use crate::config::DEFAULT_DETECT_TIMEOUT;

    fn config(allow_plaintext_login: bool) -> Arc<Config> {
        Arc::new(
            Config::builder()
                .greeting("test ready")
                .idle_timeout(Duration::from_secs(60))
                .allow_plaintext_login(allow_plaintext_login)
                .build(),
        )
    }

    async fn run(mock: tokio_test::io::Mock, allow_plaintext_login: bool) -> imapd_wire::Result<()> {
        Session::new(ImapStream::new(mock, None), config(allow_plaintext_login))
            .run()
            .await
    }

    #[tokio::test]
    async fn test_capability_and_logout() {
        let mock = Builder::new()
            .write(b"* OK [CAPABILITY IMAP4rev1] test ready\r\n")
            .read(b"a1 CAPABILITY\r\n")
            .write(b"* CAPABILITY IMAP4rev1\r\na1 OK CAPABILITY completed\r\n")
            .read(b"a2 LOGOUT\r\n")
            .write(b"* BYE IMAP4rev1 Server logging out\r\na2 OK LOGOUT completed\r\n")
            .build();
        run(mock, true).await.unwrap();
    }

    #[tokio::test]
    async fn test_login_disabled_without_tls() {
        let mock = Builder::new()
            .write(b"* OK [CAPABILITY IMAP4rev1 LOGINDISABLED] test ready\r\n")
            .read(b"a1 LOGIN {4}\r\n")
            .write(b"+ Ready for literal data\r\n")
            .read(b"fred secret\r\n")
            .write(b"a1 NO [PRIVACYREQUIRED] LOGIN requires TLS\r\n")
            .build();
        run(mock, false).await.unwrap();
    }

    #[tokio::test]
    async fn test_login_refused_when_allowed() {
        let mock = Builder::new()
            .write(b"* OK [CAPABILITY IMAP4rev1] test ready\r\n")
            .read(b"a1 LOGIN fred secret\r\n")
            .write(b"a1 NO Authentication not available\r\n")
            .read(b"a2 select INBOX\r\n")
            .write(b"a2 NO SELECT not available\r\n")
            .build();
        run(mock, true).await.unwrap();
    }

    #[tokio::test]
    async fn test_noop_and_unknown() {
        let mock = Builder::new()
            .write(b"* OK [CAPABILITY IMAP4rev1] test ready\r\n")
            .read(b"a1 NOOP\r\na2 FETCH 1 FLAGS\r\n")
            .write(b"a1 OK NOOP completed\r\n")
            .write(b"a2 NO FETCH not available\r\n")
            .build();
        run(mock, true).await.unwrap();
    }

    #[tokio::test]
    async fn test_parse_errors_answered_with_bad() {
        let mock = Builder::new()
            .write(b"* OK [CAPABILITY IMAP4rev1] test ready\r\n")
            .read(b"a1 NOOP junk\r\n")
            .write(b"a1 BAD expected CRLF at offset 7 (found Space)\r\n")
            .read(b" NOOP\r\n")
            .write(b"* BAD expected tag at offset 0 (found Space)\r\n")
            .read(b"a3 NOOP\r\n")
            .write(b"a3 OK NOOP completed\r\n")
            .build();
        run(mock, true).await.unwrap();
    }

    #[tokio::test]
    async fn test_rejected_literal_size() {
        let mock = Builder::new()
            .write(b"* OK [CAPABILITY IMAP4rev1] test ready\r\n")
            .read(b"a1 LOGIN {0}\r\n")
            .write(b"a1 BAD literal size 0 out of range\r\n")
            .read(b"a2 NOOP\r\n")
            .write(b"a2 OK NOOP completed\r\n")
            .build();
        run(mock, true).await.unwrap();
    }

    #[tokio::test]
    async fn test_starttls_unavailable() {
        let mock = Builder::new()
            .write(b"* OK [CAPABILITY IMAP4rev1] test ready\r\n")
            .read(b"a1 STARTTLS\r\n")
            .write(b"a1 BAD STARTTLS not available\r\n")
            .build();
        run(mock, true).await.unwrap();
    }

    #[tokio::test]
    async fn test_eof_mid_line_is_error() {
        let mock = Builder::new()
            .write(b"* OK [CAPABILITY IMAP4rev1] test ready\r\n")
            .read(b"a1 NO")
            .build();
        assert!(run(mock, true).await.unwrap_err().is_eof());
    }

    #[tokio::test(start_paused = true)]
    async fn test_idle_timeout() {
        let (mut client, server) = duplex(1024);
        let session = tokio::spawn(
            Session::new(ImapStream::new(server, None), config(true)).run(),
        );

        let mut output = Vec::new();
        client.read_to_end(&mut output).await.unwrap();
        assert_eq!(
            output,
            b"* OK [CAPABILITY IMAP4rev1] test ready\r\n* BYE Autologout; idle for too long\r\n"
        );
        session.await.unwrap().unwrap();
    }

    fn tls_pair() -> (TlsAcceptor, TlsConnector) {
        let generated = rcgen::generate_simple_self_signed(vec!["localhost".to_string()]).unwrap();
        let acceptor = tls_acceptor_from_pem(
            generated.cert.pem().as_bytes(),
            generated.key_pair.serialize_pem().as_bytes(),
        )
        .unwrap();

        let mut roots = RootCertStore::empty();
        roots
            .add(CertificateDer::from(generated.cert.der().to_vec()))
            .unwrap();
        let config = ClientConfig::builder()
            .with_root_certificates(roots)
            .with_no_client_auth();
        (acceptor, TlsConnector::from(Arc::new(config)))
    }

    fn localhost() -> ServerName<'static> {
        ServerName::try_from("localhost").unwrap()
    }

    fn tls_config(detect_timeout: Duration) -> Arc<Config> {
        Arc::new(
            Config::builder()
                .greeting("test ready")
                .idle_timeout(Duration::from_secs(60))
                .detect_timeout(detect_timeout)
                .build(),
        )
    }

    async fn expect<R: AsyncRead + Unpin>(stream: &mut R, expected: &[u8]) {
        let mut buf = vec![0u8; expected.len()];
        stream.read_exact(&mut buf).await.unwrap();
        assert_eq!(
            String::from_utf8_lossy(&buf),
            String::from_utf8_lossy(expected)
        );
    }

    #[tokio::test]
    async fn test_implicit_tls_greeted_over_tls() {
        let (acceptor, connector) = tls_pair();
        let (client, server) = duplex(16 * 1024);
        let session = tokio::spawn(
            Session::new(
                ImapStream::new(server, Some(acceptor)),
                tls_config(Duration::from_secs(5)),
            )
            .run(),
        );

        let mut tls = connector.connect(localhost(), client).await.unwrap();
        // No STARTTLS and no LOGINDISABLED once TLS is up.
        expect(&mut tls, b"* OK [CAPABILITY IMAP4rev1] test ready\r\n").await;

        tls.write_all(b"a1 LOGIN fred secret\r\n").await.unwrap();
        tls.flush().await.unwrap();
        expect(&mut tls, b"a1 NO Authentication not available\r\n").await;

        tls.write_all(b"a2 STARTTLS\r\n").await.unwrap();
        tls.flush().await.unwrap();
        expect(&mut tls, b"a2 BAD STARTTLS not available\r\n").await;

        tls.write_all(b"a3 LOGOUT\r\n").await.unwrap();
        tls.flush().await.unwrap();
        expect(
            &mut tls,
            b"* BYE IMAP4rev1 Server logging out\r\na3 OK LOGOUT completed\r\n",
        )
        .await;
        session.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_starttls_upgrade_discards_pipelined_plaintext() {
        let (acceptor, connector) = tls_pair();
        let (mut client, server) = duplex(16 * 1024);
        let session = tokio::spawn(
            Session::new(
                ImapStream::new(server, Some(acceptor)),
                tls_config(Duration::from_millis(20)),
            )
            .run(),
        );

        expect(
            &mut client,
            b"* OK [CAPABILITY IMAP4rev1 STARTTLS LOGINDISABLED] test ready\r\n",
        )
        .await;

        client
            .write_all(b"a1 STARTTLS\r\na9 NOOP\r\n")
            .await
            .unwrap();
        expect(&mut client, b"a1 OK Begin TLS negotiation now\r\n").await;

        let mut tls = connector.connect(localhost(), client).await.unwrap();
        tls.write_all(b"a2 CAPABILITY\r\n").await.unwrap();
        tls.flush().await.unwrap();
        // The plaintext a9 never gets an answer.
        expect(
            &mut tls,
            b"* CAPABILITY IMAP4rev1\r\na2 OK CAPABILITY completed\r\n",
        )
        .await;

        tls.write_all(b"a3 LOGOUT\r\n").await.unwrap();
        tls.flush().await.unwrap();
        expect(
            &mut tls,
            b"* BYE IMAP4rev1 Server logging out\r\na3 OK LOGOUT completed\r\n",
        )
        .await;
        session.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_failed_handshake_closes_without_greeting() {
        let (acceptor, _) = tls_pair();
        let (mut client, server) = duplex(4096);
        // Handshake record holding an empty ServerHello.
        client
            .write_all(&[TLS_HANDSHAKE_RECORD, 0x03, 0x01, 0x00, 0x04, 0x02, 0x00, 0x00, 0x00])
            .await
            .unwrap();

        let result = Session::new(
            ImapStream::new(server, Some(acceptor)),
            tls_config(Duration::from_secs(5)),
        )
        .run()
        .await;
        assert!(result.is_err());

        let mut output = Vec::new();
        client.read_to_end(&mut output).await.unwrap();
        // At most a TLS alert record, never IMAP text.
        assert!(output.is_empty() || output[0] == 0x15, "{output:?}");
    }

    #[tokio::test(start_paused = true)]
    async fn test_stalled_handshake_bounded_by_idle_timeout() {
        let (acceptor, _) = tls_pair();
        let (mut client, server) = duplex(4096);
        client.write_all(&[TLS_HANDSHAKE_RECORD]).await.unwrap();

        let session = Session::new(
            ImapStream::new(server, Some(acceptor)),
            tls_config(DEFAULT_DETECT_TIMEOUT),
        )
        .run();
        let result = timeout(Duration::from_secs(24 * 60 * 60), session)
            .await
            .unwrap();
        assert!(matches!(result, Err(Error::Timeout(d)) if d == Duration::from_secs(60)));

        let mut output = Vec::new();
        client.read_to_end(&mut output).await.unwrap();
        assert!(output.is_empty());
    }
}
