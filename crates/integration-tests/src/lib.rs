//! Boots Turnstile on an ephemeral port and drives it over HTTP.

use std::{net::SocketAddr, time::Duration};

use config::Config;
use reqwest::Response;
use server::ServeConfig;
use tokio::{sync::oneshot, task::JoinHandle};

/// HTTP client bound to one running server.
pub struct TestClient {
    base_url: String,
    http: reqwest::Client,
}

impl TestClient {
    fn new(address: SocketAddr) -> Self {
        Self {
            base_url: format!("http://{address}"),
            http: reqwest::Client::new(),
        }
    }

    /// `GET` the path.
    pub async fn get(&self, path: &str) -> Response {
        self.get_with_headers(path, &[]).await
    }

    /// `GET` the path with extra request headers, such as `X-Forwarded-For`.
    pub async fn get_with_headers(&self, path: &str, headers: &[(&str, &str)]) -> Response {
        let request = headers
            .iter()
            .fold(self.http.get(self.url(path)), |request, (name, value)| {
                request.header(*name, *value)
            });

        request.send().await.unwrap()
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }
}

/// A running server. The server task is aborted on drop.
pub struct TestServer {
    pub client: TestClient,
    pub address: SocketAddr,
    handle: JoinHandle<()>,
}

impl TestServer {
    /// Start a server with the given TOML configuration and wait until its
    /// health route answers. The health route is never counted, so the
    /// rate limit budget is untouched when this returns.
    pub async fn start(config_toml: &str) -> Self {
        let config = Config::from_toml(config_toml).unwrap();
        let address = free_address();

        let (failed_tx, failed_rx) = oneshot::channel();

        let handle = tokio::spawn(async move {
            if let Err(e) = server::serve(ServeConfig {
                listen_address: address,
                config,
            })
            .await
            {
                let _ = failed_tx.send(e);
            }
        });

        let server = TestServer {
            client: TestClient::new(address),
            address,
            handle,
        };

        server.wait_until_ready(failed_rx).await;
        server
    }

    async fn wait_until_ready(&self, mut failed: oneshot::Receiver<anyhow::Error>) {
        let health = self.client.url("/health");

        for _ in 0..40 {
            if let Ok(e) = failed.try_recv() {
                eprintln!("Turnstile failed to start: {e:#}");
                std::process::exit(1);
            }

            let probe = self.client.http.get(&health).timeout(Duration::from_millis(100)).send();

            if probe.await.is_ok_and(|response| response.status().is_success()) {
                return;
            }

            tokio::time::sleep(Duration::from_millis(25)).await;
        }

        eprintln!("Turnstile did not answer on {health}");
        std::process::exit(1);
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

/// An address nothing listens on right now.
fn free_address() -> SocketAddr {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap()
}
