use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;
use warpwire_transport::{Connection, Listener};

use crate::codes::{CLOSE_REASON_OK, SESSION_ERROR, SESSION_OK};
use crate::config::{ServerConfig, SessionConfig};
use crate::error::Result;
use crate::session::{MediaInit, Session};

/// Run one session and close its connection with the outcome.
///
/// A session that ends cleanly, including by cancellation, closes with
/// [`SESSION_OK`] and "end of broadcast". A failed session closes with
/// [`SESSION_ERROR`] and the error's description. The session's own result
/// is returned either way.
pub async fn serve_session<C: Connection>(
    conn: Arc<C>,
    inits: Vec<MediaInit>,
    config: SessionConfig,
    cancel: CancellationToken,
) -> Result<()> {
    let mut session = Session::new(Arc::clone(&conn))?.with_config(config);
    for init in inits {
        session.add_init(init);
    }

    let result = session.run(cancel).await;
    match &result {
        Ok(()) => conn.close(SESSION_OK, CLOSE_REASON_OK),
        Err(err) => conn.close(SESSION_ERROR, &err.to_string()),
    }
    result
}

/// Accepts connections and hosts one [`Session`] per client.
pub struct Server<L> {
    listener: L,
    config: ServerConfig,
    next_session_id: AtomicU64,
}

impl<L: Listener> Server<L> {
    pub fn new(listener: L) -> Self {
        Self {
            listener,
            config: ServerConfig::default(),
            next_session_id: AtomicU64::new(1),
        }
    }

    /// Override server config.
    pub fn with_config(mut self, config: ServerConfig) -> Self {
        self.config = config;
        self
    }

    /// Announce `init` to every client. Same replacement rules as
    /// [`Session::add_init`].
    pub fn with_init(mut self, init: MediaInit) -> Self {
        match self.config.inits.iter_mut().find(|queued| queued.id == init.id) {
            Some(queued) => queued.raw = init.raw,
            None => self.config.inits.push(init),
        }
        self
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Accept clients until `cancel` fires or the listener fails.
    ///
    /// Live sessions are cancelled when the loop stops and are closed before
    /// this returns.
    pub async fn run(&self, cancel: CancellationToken) -> warpwire_transport::Result<()> {
        let sessions_token = cancel.child_token();
        let mut sessions = JoinSet::new();

        let result = loop {
            tokio::select! {
                _ = cancel.cancelled() => break Ok(()),
                accepted = self.listener.accept() => match accepted {
                    Ok(conn) => {
                        let id = self.next_session_id.fetch_add(1, Ordering::Relaxed);
                        tracing::info!(session = id, "accepted connection");
                        let span = tracing::info_span!("session", id);
                        sessions.spawn(
                            serve_session(
                                Arc::new(conn),
                                self.config.inits.clone(),
                                self.config.session.clone(),
                                sessions_token.child_token(),
                            )
                            .instrument(span),
                        );
                    }
                    Err(err) => {
                        tracing::error!(error = %err, "listener failed");
                        break Err(err);
                    }
                },
                Some(joined) = sessions.join_next(), if !sessions.is_empty() => {
                    if let Err(err) = joined {
                        tracing::error!(error = %err, "session task panicked");
                    }
                }
            }
        };

        sessions_token.cancel();
        while let Some(joined) = sessions.join_next().await {
            if let Err(err) = joined {
                tracing::error!(error = %err, "session task panicked");
            }
        }
        result
    }
}
