/*!
Harness HTTP pour les tests d'intégration du kernel

Sert un router Axum sur 127.0.0.1:0 et envoie des requêtes HTTP/1.1 brutes,
sans client HTTP supplémentaire.
*/

use anyhow::{Context, Result};
use axum::Router;
use serde_json::Value;
use std::net::SocketAddr;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tracing_subscriber::EnvFilter;

/// Serveur de test, arrêté avec le runtime du test.
pub struct TestHarness {
    pub addr: SocketAddr,
}

impl TestHarness {
    pub async fn serve(app: Router) -> Result<Self> {
        tracing_subscriber::fmt()
            .with_env_filter(EnvFilter::from_default_env())
            .with_test_writer()
            .try_init()
            .ok();

        let listener = TcpListener::bind("127.0.0.1:0").await.context("bind listener")?;
        let addr = listener.local_addr()?;
        tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, app).await {
                eprintln!("[harness] server stopped: {e}");
            }
        });
        Ok(Self { addr })
    }

    /// Envoie une requête et renvoie (status, body).
    pub async fn send(&self, method: &str, path: &str) -> Result<(u16, String)> {
        let mut stream = TcpStream::connect(self.addr).await.context("connect server")?;
        let req = format!(
            "{method} {path} HTTP/1.1\r\nHost: {}\r\nConnection: close\r\nContent-Length: 0\r\n\r\n",
            self.addr
        );
        stream.write_all(req.as_bytes()).await?;

        let mut response = String::new();
        stream.read_to_string(&mut response).await?;
        let (head, body) = response
            .split_once("\r\n\r\n")
            .context("http response must have separator")?;
        let status = head
            .lines()
            .next()
            .and_then(|line| line.split_whitespace().nth(1))
            .and_then(|s| s.parse::<u16>().ok())
            .context("http status")?;
        Ok((status, body.to_string()))
    }

    pub async fn get(&self, path: &str) -> Result<(u16, String)> {
        self.send("GET", path).await
    }

    pub async fn post(&self, path: &str) -> Result<(u16, String)> {
        self.send("POST", path).await
    }

    pub async fn get_json(&self, path: &str) -> Result<(u16, Value)> {
        let (status, body) = self.get(path).await?;
        let json = serde_json::from_str(&body).with_context(|| format!("invalid json: {body}"))?;
        Ok((status, json))
    }
}
