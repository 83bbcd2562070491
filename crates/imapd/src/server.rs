//! TCP listener and connection tasks.

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use imapd_wire::{ImapStream, load_tls_acceptor};
use tokio::net::TcpListener;
use tokio_rustls::TlsAcceptor;
use tracing::{Instrument, debug, info, info_span, warn};

use crate::config::Config;
use crate::session::Session;

/// Global connection ID counter.
static CONNECTION_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Accepts connections and runs a session task for each.
pub struct Server {
    config: Arc<Config>,
    acceptor: Option<TlsAcceptor>,
}

impl Server {
    /// Prepares a server, loading TLS material if configured.
    pub fn new(config: Config) -> imapd_wire::Result<Self> {
        let acceptor = match &config.tls {
            Some(tls) => Some(load_tls_acceptor(&tls.cert_path, &tls.key_path)?),
            None => None,
        };
        Ok(Self {
            config: Arc::new(config),
            acceptor,
        })
    }

    /// Binds the configured address and serves until `shutdown` resolves.
    pub async fn run(self, shutdown: impl Future<Output = ()>) -> std::io::Result<()> {
        let listener = TcpListener::bind(self.config.listen).await?;
        self.serve(listener, shutdown).await
    }

    /// Serves on an already bound listener until `shutdown` resolves.
    ///
    /// Sessions already running are left to finish on their own.
    pub async fn serve(
        self,
        listener: TcpListener,
        shutdown: impl Future<Output = ()>,
    ) -> std::io::Result<()> {
        info!(
            addr = %listener.local_addr()?,
            tls = self.config.tls_enabled(),
            "listening"
        );

        tokio::pin!(shutdown);
        loop {
            tokio::select! {
                () = &mut shutdown => {
                    info!("shutting down");
                    return Ok(());
                }
                accepted = listener.accept() => {
                    let (socket, peer) = match accepted {
                        Ok(conn) => conn,
                        Err(e) => {
                            warn!(error = %e, "accept failed");
                            continue;
                        }
                    };
                    let id = CONNECTION_ID_COUNTER.fetch_add(1, Ordering::Relaxed);
                    if let Err(e) = socket.set_nodelay(true) {
                        debug!(error = %e, "cannot set TCP_NODELAY");
                    }

                    let stream = ImapStream::new(socket, self.acceptor.clone());
                    let session = Session::new(stream, Arc::clone(&self.config));
                    tokio::spawn(
                        async move {
                            info!("connection accepted");
                            match session.run().await {
                                Ok(()) => debug!("connection closed"),
                                Err(e) if e.is_eof() => debug!("client vanished"),
                                Err(e) => warn!(error = %e, "connection failed"),
                            }
                        }
                        .instrument(info_span!("conn", id, %peer)),
                    );
                }
            }
        }
    }
}
