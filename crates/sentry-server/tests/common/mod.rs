//! Shared helpers for server integration tests.

#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![allow(dead_code)]

use std::sync::Arc;

use bytes::BytesMut;
use tempfile::TempDir;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

use sentry_core::protocol::{decode_response, encode_request, split_frame, LookupFrame, ServerFrame};
use sentry_core::report::MemoryReporter;
use sentry_server::{config, SentryServer, ServerHandle};

pub const AB_POLICY: &str = r#"
default: redirect
default_value: sinkhole.local
entries:
  - { key: a, decision: allow }
  - { key: b, decision: block }
"#;

pub struct TestServer {
    pub handle: ServerHandle,
    pub reporter: Arc<MemoryReporter>,
    pub dir: TempDir,
}

impl TestServer {
    pub fn policy_path(&self) -> std::path::PathBuf {
        self.dir.path().join("policy.yaml")
    }
}

pub async fn start(policy: &str) -> TestServer {
    start_with(policy, "").await
}

/// `server_extra` is spliced into the `server:` section.
pub async fn start_with(policy: &str, server_extra: &str) -> TestServer {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("policy.yaml"), policy).unwrap();

    let cfg_text = format!(
        "version: 1\nserver:\n  listen: \"127.0.0.1:0\"\n{server_extra}policy:\n  source: policy.yaml\ncache:\n  capacity: 64\n  shards: 4\n"
    );
    let cfg_path = dir.path().join("sentry.yaml");
    std::fs::write(&cfg_path, cfg_text).unwrap();

    let cfg = config::load_from_file(&cfg_path).unwrap();
    let reporter = Arc::new(MemoryReporter::new());
    let handle = SentryServer::start(cfg, reporter.clone()).await.unwrap();
    TestServer { handle, reporter, dir }
}

pub struct RawClient {
    pub stream: TcpStream,
    buf: BytesMut,
}

impl RawClient {
    pub async fn connect(server: &TestServer) -> Self {
        let stream = TcpStream::connect(server.handle.local_addr()).await.unwrap();
        Self { stream, buf: BytesMut::new() }
    }

    pub async fn send(&mut self, seq: Option<u32>, key: &str) {
        let mut out = BytesMut::new();
        encode_request(&LookupFrame { seq, key: key.to_string() }, &mut out);
        self.stream.write_all(&out).await.unwrap();
    }

    pub async fn send_raw(&mut self, bytes: &[u8]) {
        self.stream.write_all(bytes).await.unwrap();
    }

    /// Next response frame, or `None` once the server closed the connection.
    pub async fn recv(&mut self) -> Option<ServerFrame> {
        loop {
            if let Some(body) = split_frame(&mut self.buf, 64 * 1024).unwrap() {
                return Some(decode_response(body).unwrap());
            }
            let n = self.stream.read_buf(&mut self.buf).await.ok()?;
            if n == 0 {
                return None;
            }
        }
    }

    pub async fn lookup(&mut self, key: &str) -> ServerFrame {
        self.send(None, key).await;
        self.recv().await.expect("connection closed")
    }
}
