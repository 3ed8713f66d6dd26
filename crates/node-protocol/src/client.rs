//! Coordinator-side client for a single worker node.
//!
//! Every call is one short-lived exchange: dial, send the task, read the
//! response, close. Nothing is pooled between calls.

use std::future::Future;
use std::time::Duration;

use knn::NeighborResult;
use tokio::net::TcpStream;
use tracing::{debug, error, instrument};

use crate::codec::{check_frame_len, read_frame, write_frame, DEFAULT_MAX_FRAME_LEN};
use crate::error::{ProtocolError, Result};
use crate::messages::{TaskRequest, TaskResponse};

/// Default per-stage timeout for node I/O
pub const DEFAULT_NODE_TIMEOUT: Duration = Duration::from_secs(30);

/// Client for one worker node address
#[derive(Debug, Clone)]
pub struct NodeClient {
    addr: String,
    timeout: Duration,
    max_frame_len: usize,
}

impl NodeClient {
    pub fn new(addr: impl Into<String>) -> Self {
        Self {
            addr: addr.into(),
            timeout: DEFAULT_NODE_TIMEOUT,
            max_frame_len: DEFAULT_MAX_FRAME_LEN,
        }
    }

    /// Configure the timeout applied to each of dial, send and receive
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Configure the largest frame sent or accepted; nodes must allow at
    /// least as much
    pub fn with_max_frame_len(mut self, max_frame_len: usize) -> Self {
        self.max_frame_len = max_frame_len;
        self
    }

    pub fn addr(&self) -> &str {
        &self.addr
    }

    /// Send one task and wait for the node's partial neighbor list.
    ///
    /// Any failure (dial, write, short or malformed read, timeout, or an
    /// error reported by the node) is returned as-is; there is no retry.
    #[instrument(skip(self, request), fields(addr = %self.addr, candidates = request.chunk.len()))]
    pub async fn send_task(&self, request: &TaskRequest) -> Result<Vec<NeighborResult>> {
        // The node would drop an oversized frame; fail before dialing
        check_frame_len(request, self.max_frame_len).inspect_err(|e| {
            error!("Task for node {} not sent: {}", self.addr, e);
        })?;

        let mut stream = self
            .stage("connect", TcpStream::connect(self.addr.as_str()))
            .await?
            .map_err(|source| {
                error!("Error connecting to node {}: {}", self.addr, source);
                ProtocolError::Connect {
                    addr: self.addr.clone(),
                    source,
                }
            })?;
        stream.set_nodelay(true)?;

        self.stage("send", write_frame(&mut stream, request, self.max_frame_len))
            .await??;

        let response: TaskResponse = self
            .stage("receive", read_frame(&mut stream, self.max_frame_len))
            .await??;

        if let Some(message) = response.error {
            return Err(ProtocolError::Remote {
                addr: self.addr.clone(),
                message,
            });
        }

        let neighbors = response.into_neighbors();
        debug!("Node {} returned {} neighbors", self.addr, neighbors.len());
        Ok(neighbors)
    }

    /// Run one I/O stage under the configured timeout
    async fn stage<F, T>(&self, stage: &'static str, fut: F) -> Result<T>
    where
        F: Future<Output = T>,
    {
        tokio::time::timeout(self.timeout, fut)
            .await
            .map_err(|_| ProtocolError::Timeout {
                addr: self.addr.clone(),
                stage,
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::read_frame;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn test_connect_failure_is_reported() {
        // Bind then drop to get a port nobody listens on
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let client = NodeClient::new(addr.to_string()).with_timeout(Duration::from_secs(2));
        let result = client.send_task(&TaskRequest::default()).await;
        assert!(matches!(
            result,
            Err(ProtocolError::Connect { .. }) | Err(ProtocolError::Timeout { .. })
        ));
    }

    #[tokio::test]
    async fn test_silent_node_times_out() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let handle = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let _request: TaskRequest = read_frame(&mut socket, DEFAULT_MAX_FRAME_LEN).await.unwrap();
            // Never answer
            tokio::time::sleep(Duration::from_secs(60)).await;
        });

        let client = NodeClient::new(addr.to_string()).with_timeout(Duration::from_millis(200));
        let result = client.send_task(&TaskRequest::default()).await;
        assert!(matches!(
            result,
            Err(ProtocolError::Timeout { stage: "receive", .. })
        ));

        handle.abort();
    }

    #[tokio::test]
    async fn test_node_closing_early_is_a_failure() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let handle = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let _request: TaskRequest = read_frame(&mut socket, DEFAULT_MAX_FRAME_LEN).await.unwrap();
            drop(socket);
        });

        let client = NodeClient::new(addr.to_string());
        let result = client.send_task(&TaskRequest::default()).await;
        assert!(matches!(result, Err(ProtocolError::ConnectionClosed)));

        handle.abort();
    }

    #[tokio::test]
    async fn test_oversized_task_is_refused_before_dialing() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let request = TaskRequest {
            target_user: 1,
            k: 10,
            ..TaskRequest::default()
        };
        let client = NodeClient::new(addr.to_string()).with_max_frame_len(1);
        let result = client.send_task(&request).await;
        assert!(matches!(result, Err(ProtocolError::FrameTooLarge { max: 1, .. })));

        // No connection was attempted
        let accepted = tokio::time::timeout(Duration::from_millis(100), listener.accept()).await;
        assert!(accepted.is_err());
    }
}
