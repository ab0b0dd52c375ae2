//! Accept loop.
//!
//! One task accepts; each session runs in its own task inside a `JoinSet` so
//! draining can wait for every session to finish its in-flight work.

use std::time::Duration;

use tokio::net::TcpListener;
use tokio::task::{JoinError, JoinSet};
use tracing::Instrument;

use sentry_core::error::{Result, SentryError};

use crate::app_state::AppState;
use crate::server::wait_draining;

use super::session::{run_session, CloseReason};

pub async fn serve(listener: TcpListener, app: AppState) {
    let mut lifecycle = app.subscribe();
    let mut sessions: JoinSet<Result<CloseReason>> = JoinSet::new();
    let mut next_id: u64 = 0;

    loop {
        tokio::select! {
            _ = wait_draining(&mut lifecycle) => break,

            accepted = listener.accept() => {
                let (stream, peer) = match accepted {
                    Ok(a) => a,
                    Err(e) => {
                        app.report("listener", &SentryError::Io(e));
                        // accept errors (EMFILE and friends) tend to repeat; back off briefly
                        tokio::time::sleep(Duration::from_millis(50)).await;
                        continue;
                    }
                };
                let _ = stream.set_nodelay(true);

                next_id += 1;
                app.metrics().sessions_accepted.inc(&[]);
                app.metrics().sessions_active.inc(&[]);

                let span = tracing::debug_span!("session", id = next_id, %peer);
                let session_app = app.clone();
                sessions.spawn(
                    async move {
                        tracing::debug!("session accepted");
                        run_session(session_app, stream).await
                    }
                    .instrument(span),
                );
            }

            Some(done) = sessions.join_next(), if !sessions.is_empty() => {
                finish_session(&app, done);
            }
        }
    }

    drop(listener);
    tracing::info!(sessions = sessions.len(), "listener closed, draining sessions");

    while let Some(done) = sessions.join_next().await {
        finish_session(&app, done);
    }
}

fn finish_session(app: &AppState, done: std::result::Result<Result<CloseReason>, JoinError>) {
    app.metrics().sessions_active.dec(&[]);
    match done {
        Ok(Ok(reason)) => tracing::debug!(reason = reason.as_str(), "session closed"),
        Ok(Err(e)) => app.report("session", &e),
        Err(e) => app.report("session", &SentryError::Internal(format!("session task failed: {e}"))),
    }
}
