//! Admin endpoint tests (raw HTTP/1.1 over TCP).

#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]

mod common;

use std::net::SocketAddr;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;

use sentry_server::{ops, ServerState};

use common::{start_with, RawClient, AB_POLICY};

async fn get(addr: SocketAddr, path: &str) -> String {
    let mut stream = TcpStream::connect(addr).await.unwrap();
    let req = format!("GET {path} HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n");
    stream.write_all(req.as_bytes()).await.unwrap();
    let mut out = String::new();
    stream.read_to_string(&mut out).await.unwrap();
    out
}

#[tokio::test]
async fn health_ready_and_metrics() {
    let server = start_with(AB_POLICY, "  admin_listen: \"127.0.0.1:0\"\n").await;
    let admin = server.handle.admin_addr().expect("admin endpoint bound");

    assert!(get(admin, "/healthz").await.starts_with("HTTP/1.1 200"));
    assert!(get(admin, "/readyz").await.starts_with("HTTP/1.1 200"));

    let mut client = RawClient::connect(&server).await;
    client.lookup("a").await;
    client.lookup("a").await;
    client.lookup("zzz").await;

    let metrics = get(admin, "/metrics").await;
    assert!(metrics.contains("sentry_lookups_total{source=\"store\"} 1"));
    assert!(metrics.contains("sentry_lookups_total{source=\"cache\"} 1"));
    assert!(metrics.contains("sentry_lookups_total{source=\"default\"} 1"));
    assert!(metrics.contains("sentry_decisions_total{decision=\"allow\"} 2"));
    assert!(metrics.contains("sentry_policy_generation 1"));
    assert!(metrics.contains("sentry_policy_entries 2"));
    assert!(metrics.contains("sentry_cache_capacity 64"));

    // readiness flips while draining; the admin endpoint lives until Stopped
    server.handle.shutdown();
    let app = server.handle.app().clone();
    assert!(app.is_draining());

    server.handle.stopped().await.unwrap();
    assert!(TcpStream::connect(admin).await.is_err());
}

#[tokio::test]
async fn readyz_reports_draining() {
    let server = start_with(AB_POLICY, "").await;
    let app = server.handle.app().clone();

    let ready = ops::readyz(State(app.clone())).await.into_response();
    assert_eq!(ready.status(), StatusCode::OK);

    server.handle.shutdown();
    let draining = ops::readyz(State(app.clone())).await.into_response();
    assert_eq!(draining.status(), StatusCode::SERVICE_UNAVAILABLE);

    server.handle.stopped().await.unwrap();
    assert_eq!(app.state(), ServerState::Stopped);
}
