//! Shared utilities for integration tests.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use lb_proxy::config::{BackendConfig, ProxyConfig};
use lb_proxy::{HttpServer, Shutdown, TestBackend};

/// Start a test origin on an ephemeral local port.
pub async fn start_test_backend(shutdown: &Shutdown) -> Arc<TestBackend> {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let backend = Arc::new(TestBackend::new(port));

    let stop = shutdown.subscribe();
    let server = backend.clone();
    tokio::spawn(async move {
        let _ = server.serve(listener, stop).await;
    });
    backend
}

/// URL the balancer should use for `backend`.
pub fn backend_url(backend: &TestBackend) -> String {
    format!("http://127.0.0.1:{}", backend.port())
}

/// A port nothing is listening on.
pub async fn dead_port() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap().port()
}

/// Config for a balancer in front of `addresses`, with the background
/// sweep off so tests only see lazy checks and demotion.
pub fn proxy_config(addresses: &[String]) -> ProxyConfig {
    let mut config = ProxyConfig::default();
    config.listener.bind_address = "127.0.0.1:0".into();
    config.backends = addresses.iter().map(|a| BackendConfig::new(a.clone())).collect();
    config.health_check.enabled = false;
    config.health_check.cache_window_ms = 60_000;
    config
}

/// Start the balancer. Returns its address and a sender for config reloads.
pub async fn start_proxy(
    config: ProxyConfig,
    shutdown: &Shutdown,
) -> (SocketAddr, mpsc::UnboundedSender<ProxyConfig>) {
    let listener = TcpListener::bind(&config.listener.bind_address).await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (updates_tx, updates_rx) = mpsc::unbounded_channel();

    let server = HttpServer::new(config);
    let stop = shutdown.subscribe();
    tokio::spawn(async move {
        let _ = server.run(listener, updates_rx, stop).await;
    });
    (addr, updates_tx)
}

/// Client without connection pooling, so every request is independent.
pub fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .pool_max_idle_per_host(0)
        .no_proxy()
        .build()
        .unwrap()
}

/// Send a GET and return status and body.
pub async fn get(client: &reqwest::Client, url: &str) -> (u16, String) {
    let res = client.get(url).send().await.expect("balancer unreachable");
    let status = res.status().as_u16();
    (status, res.text().await.unwrap())
}
