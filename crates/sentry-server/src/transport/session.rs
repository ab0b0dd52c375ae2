//! One client session.
//!
//! Loop: Reading -> Dispatched -> Responding -> Reading ... -> Closed.
//! Every complete frame already buffered is answered, in arrival order, before
//! the next read, so pipelined clients get one flush per batch. Malformed input
//! gets a best-effort error frame and closes this session only. On drain, bytes
//! the client already sent are collected and answered before the session
//! closes.

use std::time::Duration;

use bytes::BytesMut;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::{timeout, timeout_at, Instant};

use sentry_core::error::{Result, SentryError};
use sentry_core::protocol::{
    decode_request, encode_response, split_frame, ErrorFrame, LookupFrame, ResultFrame,
    ServerFrame,
};

use crate::app_state::AppState;
use crate::server::wait_draining;

/// How long a draining session keeps collecting bytes that were already sent.
const DRAIN_READ_GRACE: Duration = Duration::from_millis(50);

/// Why a session ended without error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    ClientClosed,
    IdleTimeout,
    Draining,
}

impl CloseReason {
    pub fn as_str(self) -> &'static str {
        match self {
            CloseReason::ClientClosed => "client_closed",
            CloseReason::IdleTimeout => "idle_timeout",
            CloseReason::Draining => "draining",
        }
    }
}

fn protocol_reason(err: &SentryError) -> &'static str {
    match err {
        SentryError::FrameTooLarge { .. } => "frame_too_large",
        SentryError::UnsupportedVersion(_) => "unsupported_version",
        _ => "malformed",
    }
}

pub async fn run_session(app: AppState, mut stream: TcpStream) -> Result<CloseReason> {
    let cfg = &app.cfg().server;
    let max_frame = cfg.max_frame_bytes;
    let idle_timeout = Duration::from_millis(cfg.idle_timeout_ms);
    let write_timeout = Duration::from_millis(cfg.lookup_timeout_ms);

    let mut lifecycle = app.subscribe();
    let mut inbuf = BytesMut::with_capacity(4096);
    let mut outbuf = BytesMut::with_capacity(4096);
    let mut draining = false;

    loop {
        // Dispatched: answer every complete frame already buffered.
        let decoded = answer_buffered(&app, &mut inbuf, &mut outbuf, max_frame);

        // Responding
        if !outbuf.is_empty() {
            if let Err(e) = flush(&mut stream, &mut outbuf, write_timeout).await {
                if matches!(e, SentryError::LookupTimeout) {
                    app.metrics().lookup_timeouts.inc(&[]);
                }
                return Err(e);
            }
        }

        if let Err(e) = decoded {
            app.metrics().protocol_errors.inc(&[("reason", protocol_reason(&e))]);
            let frame = ServerFrame::Error(ErrorFrame {
                seq: None,
                kind: e.kind(),
                message: e.to_string(),
            });
            encode_response(&frame, &mut outbuf);
            let _ = flush(&mut stream, &mut outbuf, write_timeout).await;
            return Err(e);
        }

        if draining {
            return Ok(CloseReason::Draining);
        }

        // Reading
        tokio::select! {
            biased;

            _ = wait_draining(&mut lifecycle) => {
                collect_pending(&mut stream, &mut inbuf).await?;
                draining = true;
            }

            read = timeout(idle_timeout, stream.read_buf(&mut inbuf)) => {
                match read {
                    Err(_) => return Ok(CloseReason::IdleTimeout),
                    Ok(Ok(0)) => return Ok(CloseReason::ClientClosed),
                    Ok(Ok(_)) => {}
                    Ok(Err(e)) => return Err(e.into()),
                }
            }
        }
    }
}

/// Read whatever the client has already sent, bounded by [`DRAIN_READ_GRACE`].
async fn collect_pending(stream: &mut TcpStream, inbuf: &mut BytesMut) -> Result<()> {
    let deadline = Instant::now() + DRAIN_READ_GRACE;
    loop {
        match timeout_at(deadline, stream.read_buf(inbuf)).await {
            Err(_) | Ok(Ok(0)) => return Ok(()),
            Ok(Ok(_)) => {}
            Ok(Err(e)) => return Err(e.into()),
        }
    }
}

/// Decode and resolve complete frames until the buffer holds a partial frame
/// (or nothing). Stops at the first malformed frame; answers produced before
/// it stay in `outbuf`.
fn answer_buffered(
    app: &AppState,
    inbuf: &mut BytesMut,
    outbuf: &mut BytesMut,
    max_frame: usize,
) -> Result<()> {
    while let Some(body) = split_frame(inbuf, max_frame)? {
        let req = decode_request(body)?;
        dispatch(app, req, outbuf);
    }
    Ok(())
}

fn dispatch(app: &AppState, req: LookupFrame, outbuf: &mut BytesMut) {
    let result = app.engine().resolve(&req.key);

    let metrics = app.metrics();
    let source = result.source.as_str();
    metrics.lookups.inc(&[("source", source)]);
    metrics.decisions.inc(&[("decision", result.decision.label())]);
    metrics.lookup_duration.observe(&[("source", source)], result.latency);

    let frame = ServerFrame::Result(ResultFrame {
        seq: req.seq,
        found: result.found,
        source: result.source,
        decision: result.decision,
    });
    encode_response(&frame, outbuf);
}

async fn flush(stream: &mut TcpStream, outbuf: &mut BytesMut, limit: Duration) -> Result<()> {
    match timeout(limit, stream.write_all(outbuf)).await {
        Ok(Ok(())) => {
            outbuf.clear();
            Ok(())
        }
        Ok(Err(e)) => Err(e.into()),
        Err(_) => Err(SentryError::LookupTimeout),
    }
}
