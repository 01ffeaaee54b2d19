//! Connection boundary to the daemon.
//!
//! The launcher only ever needs to know whether a daemon accepts clients, so
//! the bundled [`TcpConnector`] stops after the identification handshake.
//! A full Rserve client can be plugged in through [`Connector`].

use crate::config::{DaemonConfig, PROBE_CONNECT_TIMEOUT};
use crate::error::{LauncherError, Result};
use async_trait::async_trait;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::debug;

/// An open client connection to a daemon.
#[async_trait]
pub trait DaemonConnection: Send {
    /// Evaluate an R expression remotely and return its textual result.
    async fn evaluate(&mut self, expression: &str) -> Result<String>;

    async fn close(&mut self) -> Result<()>;
}

/// Opens connections to a daemon.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self, host: &str, port: u16) -> Result<Box<dyn DaemonConnection>>;
}

/// Connect and immediately close. Any error counts as "not reachable".
pub async fn probe(connector: &dyn Connector, host: &str, port: u16) -> bool {
    match connector.connect(host, port).await {
        Ok(mut connection) => {
            if let Err(e) = connection.close().await {
                debug!("Closing probe connection failed: {}", e);
            }
            true
        }
        Err(e) => {
            debug!("Probe of {}:{} failed: {}", host, port, e);
            false
        }
    }
}

/// Plain TCP connector that validates the Rserve identification block.
#[derive(Debug, Clone, Copy)]
pub struct TcpConnector {
    timeout: Duration,
}

impl TcpConnector {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

impl Default for TcpConnector {
    fn default() -> Self {
        Self::new(PROBE_CONNECT_TIMEOUT)
    }
}

#[async_trait]
impl Connector for TcpConnector {
    async fn connect(&self, host: &str, port: u16) -> Result<Box<dyn DaemonConnection>> {
        let connection_error = |message: String| LauncherError::Connection {
            host: host.to_string(),
            port,
            message,
        };

        let mut stream = tokio::time::timeout(self.timeout, TcpStream::connect((host, port)))
            .await
            .map_err(|_| LauncherError::Timeout(self.timeout))?
            .map_err(|e| connection_error(e.to_string()))?;

        let mut greeting = [0u8; DaemonConfig::GREETING_LEN];
        tokio::time::timeout(self.timeout, stream.read_exact(&mut greeting))
            .await
            .map_err(|_| LauncherError::Timeout(self.timeout))?
            .map_err(|e| connection_error(format!("no identification block: {}", e)))?;

        if !greeting.starts_with(DaemonConfig::GREETING_MAGIC) {
            return Err(LauncherError::Protocol(format!(
                "unexpected identification block {:?}",
                String::from_utf8_lossy(&greeting)
            )));
        }

        debug!(
            "Connected to {}:{} ({})",
            host,
            port,
            String::from_utf8_lossy(&greeting[..12])
        );
        Ok(Box::new(ProbeConnection { stream }))
    }
}

/// Connection returned by [`TcpConnector`]; handshake only.
#[derive(Debug)]
struct ProbeConnection {
    stream: TcpStream,
}

#[async_trait]
impl DaemonConnection for ProbeConnection {
    async fn evaluate(&mut self, _expression: &str) -> Result<String> {
        Err(LauncherError::Protocol(
            "expression evaluation needs a full Rserve client".to_string(),
        ))
    }

    async fn close(&mut self) -> Result<()> {
        self.stream.shutdown().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    const GREETING: &[u8; 32] = b"Rsrv0103QAP1\r\n\r\n--------------\r\n";

    async fn serve_once(payload: &'static [u8]) -> u16 {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            if let Ok((mut socket, _)) = listener.accept().await {
                let _ = socket.write_all(payload).await;
                let mut sink = Vec::new();
                let _ = socket.read_to_end(&mut sink).await;
            }
        });
        port
    }

    #[tokio::test]
    async fn test_connect_accepts_rserve_greeting() {
        let port = serve_once(GREETING).await;
        let connector = TcpConnector::default();
        let mut connection = connector.connect("127.0.0.1", port).await.unwrap();
        assert!(connection.evaluate("1+1").await.is_err());
        connection.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_connect_rejects_foreign_service() {
        let port = serve_once(b"HTTP/1.1 400 Bad Request\r\nContent-Length: 0\r\n\r\n").await;
        let result = TcpConnector::default().connect("127.0.0.1", port).await;
        assert!(matches!(result, Err(LauncherError::Protocol(_))));
    }

    #[tokio::test]
    async fn test_connect_refused_is_retryable() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let err = match TcpConnector::default().connect("127.0.0.1", port).await {
            Ok(_) => panic!("nothing should be listening on {port}"),
            Err(e) => e,
        };
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn test_probe() {
        let port = serve_once(GREETING).await;
        assert!(probe(&TcpConnector::default(), "127.0.0.1", port).await);

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let closed = listener.local_addr().unwrap().port();
        drop(listener);
        assert!(!probe(&TcpConnector::default(), "127.0.0.1", closed).await);
    }
}
