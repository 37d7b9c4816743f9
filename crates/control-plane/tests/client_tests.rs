//! Tests for the signed control-plane client against a loopback server

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use control_plane::{ClientConfig, ControlPlaneClient, Error, Resolve, TokenSigner};
use serde_json::json;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::sync::oneshot;

struct StaticSigner;

impl TokenSigner for StaticSigner {
    fn sign(&self, _validity: Duration) -> Result<String, String> {
        Ok("test-token".to_string())
    }
}

struct FixedResolver(IpAddr);

#[async_trait]
impl Resolve for FixedResolver {
    async fn resolve(&self, _host: &str) -> Option<IpAddr> {
        Some(self.0)
    }
}

/// Accept one connection, capture the raw request, answer with `status`.
async fn one_shot_server(status: u16) -> (SocketAddr, oneshot::Receiver<String>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (tx, rx) = oneshot::channel();
    tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.unwrap();
        let mut buf = Vec::new();
        let mut chunk = [0u8; 1024];
        loop {
            let n = stream.read(&mut chunk).await.unwrap();
            if n == 0 {
                break;
            }
            buf.extend_from_slice(&chunk[..n]);
            if request_complete(&buf) {
                break;
            }
        }
        let reply =
            format!("HTTP/1.1 {status} Status\r\ncontent-length: 0\r\nconnection: close\r\n\r\n");
        stream.write_all(reply.as_bytes()).await.unwrap();
        let _ = stream.flush().await;
        let _ = tx.send(String::from_utf8_lossy(&buf).into_owned());
    });
    (addr, rx)
}

/// A request is complete once the head and any content-length body arrived.
fn request_complete(buf: &[u8]) -> bool {
    let text = String::from_utf8_lossy(buf);
    let Some(head_end) = text.find("\r\n\r\n") else {
        return false;
    };
    let body_len = text[..head_end]
        .lines()
        .find_map(|line| {
            let (name, value) = line.split_once(':')?;
            name.trim()
                .eq_ignore_ascii_case("content-length")
                .then(|| value.trim().parse::<usize>().ok())?
        })
        .unwrap_or(0);
    buf.len() >= head_end + 4 + body_len
}

fn local_config(addr: SocketAddr) -> ClientConfig {
    ClientConfig {
        host_name: String::new(),
        local_authority: Some(addr.to_string()),
        home_stamp: None,
        validate_ssl: true,
    }
}

#[tokio::test]
async fn post_carries_token_request_id_and_user_agent() {
    let (addr, captured) = one_shot_server(200).await;
    let client = ControlPlaneClient::new(local_config(addr), Arc::new(StaticSigner));

    client
        .post("/api/triggers", "rid-1", Some(json!([{"type": "httpTrigger"}])))
        .await
        .unwrap();

    let head = captured.await.unwrap().to_lowercase();
    assert!(head.starts_with("post /api/triggers"));
    assert!(head.contains("x-ms-site-restricted-token: test-token"));
    assert!(head.contains("x-ms-request-id: rid-1"));
    assert!(head.contains("user-agent: deploy-harness/"));
    assert!(head.contains("httptrigger"));
}

#[tokio::test]
async fn fallback_address_keeps_original_host_header() {
    let (addr, captured) = one_shot_server(200).await;
    let config = ClientConfig {
        host_name: format!("primary.test:{}", addr.port()),
        local_authority: None,
        home_stamp: Some("stamp".to_string()),
        validate_ssl: false,
    };
    let client = ControlPlaneClient::with_resolver(
        config,
        Arc::new(StaticSigner),
        Arc::new(FixedResolver(IpAddr::V4(Ipv4Addr::LOCALHOST))),
    );

    client.post("/operations/restart", "rid-2", None).await.unwrap();

    // The connection reached the fallback address (our loopback server),
    // while the Host header still names the original authority.
    let head = captured.await.unwrap().to_lowercase();
    assert!(head.contains(&format!("host: primary.test:{}", addr.port())));
}

#[tokio::test]
async fn non_success_status_is_a_transport_failure() {
    let (addr, _captured) = one_shot_server(503).await;
    let client = ControlPlaneClient::new(local_config(addr), Arc::new(StaticSigner));

    match client.post("/operations/settriggers", "rid-3", None).await {
        Err(Error::UnexpectedStatus { status, .. }) => assert_eq!(status.as_u16(), 503),
        other => panic!("expected UnexpectedStatus, got {other:?}"),
    }
}

#[tokio::test]
async fn put_targets_absolute_url() {
    let (addr, captured) = one_shot_server(200).await;
    let client = ControlPlaneClient::new(local_config(addr), Arc::new(StaticSigner));

    let url = format!("http://{addr}/artifacts/triggers.json");
    client.put(&url, "rid-4", json!({"v": 1})).await.unwrap();

    let head = captured.await.unwrap().to_lowercase();
    assert!(head.starts_with("put /artifacts/triggers.json"));
}

#[tokio::test]
async fn get_targets_absolute_url() {
    let (addr, captured) = one_shot_server(200).await;
    let client = ControlPlaneClient::new(local_config(addr), Arc::new(StaticSigner));

    let url = format!("http://{addr}/operations/status");
    client.get(&url, "rid-get").await.unwrap();

    let head = captured.await.unwrap().to_lowercase();
    assert!(head.starts_with("get /operations/status"));
    assert!(head.contains("x-ms-request-id: rid-get"));
}

#[tokio::test]
async fn signer_failure_is_surfaced_before_sending() {
    struct FailingSigner;
    impl TokenSigner for FailingSigner {
        fn sign(&self, _validity: Duration) -> Result<String, String> {
            Err("key unavailable".to_string())
        }
    }

    let (addr, _captured) = one_shot_server(200).await;
    let client = ControlPlaneClient::new(local_config(addr), Arc::new(FailingSigner));

    match client.post("/operations/restart", "rid-5", None).await {
        Err(Error::Token(reason)) => assert_eq!(reason, "key unavailable"),
        other => panic!("expected Token error, got {other:?}"),
    }
}
