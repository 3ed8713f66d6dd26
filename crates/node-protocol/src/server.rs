//! Worker node: accepts tasks and runs the similarity engine on them.
//!
//! One task per connection. The CPU-bound scoring runs on the blocking pool
//! so the accept loop keeps serving other coordinators meanwhile.

use std::future::Future;
use std::net::SocketAddr;
use std::time::Duration;

use data_loader::UserRatings;
use tokio::net::{TcpListener, TcpStream, ToSocketAddrs};
use tracing::{debug, info, instrument, warn};

use crate::codec::{read_frame, write_frame, DEFAULT_MAX_FRAME_LEN};
use crate::error::{ProtocolError, Result};
use crate::messages::{TaskRequest, TaskResponse};

/// Default time a node waits for a coordinator to finish sending a task
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(60);

/// A worker node listening for tasks
pub struct NodeServer {
    listener: TcpListener,
    max_frame_len: usize,
    read_timeout: Duration,
}

impl NodeServer {
    pub async fn bind(addr: impl ToSocketAddrs) -> Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        Ok(Self {
            listener,
            max_frame_len: DEFAULT_MAX_FRAME_LEN,
            read_timeout: DEFAULT_READ_TIMEOUT,
        })
    }

    /// Configure the largest task frame accepted
    pub fn with_max_frame_len(mut self, max_frame_len: usize) -> Self {
        self.max_frame_len = max_frame_len;
        self
    }

    /// Configure how long a connection may take to deliver its task
    pub fn with_read_timeout(mut self, read_timeout: Duration) -> Self {
        self.read_timeout = read_timeout;
        self
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Serve until the process is stopped
    pub async fn serve(self) -> Result<()> {
        self.serve_with_shutdown(std::future::pending()).await
    }

    /// Serve until `shutdown` resolves. In-flight connections finish on
    /// their own tasks.
    pub async fn serve_with_shutdown<F>(self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        info!("Node listening on {}", self.local_addr()?);
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("Node shutting down");
                    return Ok(());
                }
                accepted = self.listener.accept() => {
                    let (stream, peer) = match accepted {
                        Ok(conn) => conn,
                        Err(e) => {
                            warn!("Failed to accept connection: {}", e);
                            continue;
                        }
                    };
                    let max_frame_len = self.max_frame_len;
                    let read_timeout = self.read_timeout;
                    tokio::spawn(async move {
                        if let Err(e) = handle_connection(stream, peer, max_frame_len, read_timeout).await {
                            warn!(%peer, "Task connection failed: {}", e);
                        }
                    });
                }
            }
        }
    }
}

#[instrument(skip(stream, max_frame_len, read_timeout))]
async fn handle_connection(
    mut stream: TcpStream,
    peer: SocketAddr,
    max_frame_len: usize,
    read_timeout: Duration,
) -> Result<()> {
    let request: TaskRequest =
        tokio::time::timeout(read_timeout, read_frame(&mut stream, max_frame_len))
            .await
            .map_err(|_| ProtocolError::Timeout {
                addr: peer.to_string(),
                stage: "receive",
            })??;

    let response = match tokio::task::spawn_blocking(move || process_task(request)).await {
        Ok(response) => response,
        Err(e) => TaskResponse::failure(format!("similarity task failed: {}", e)),
    };

    write_frame(&mut stream, &response, max_frame_len).await
}

/// Run the similarity engine for one decoded task.
///
/// Problems with the task itself become an error response so the
/// coordinator gets a reason instead of a dropped connection.
pub fn process_task(request: TaskRequest) -> TaskResponse {
    let metric = match request.similarity_metric() {
        Ok(metric) => metric,
        Err(e) => return TaskResponse::failure(e.to_string()),
    };
    let target_user = request.target_user;
    let k = request.k as usize;

    let chunk: std::collections::HashMap<u32, UserRatings> = request
        .chunk
        .into_iter()
        .map(|(user_id, vector)| (user_id, vector.ratings))
        .collect();

    let target_ratings = match request.target_ratings {
        Some(vector) => vector.ratings,
        None => match chunk.get(&target_user) {
            Some(ratings) => ratings.clone(),
            None => {
                return TaskResponse::failure(format!(
                    "no ratings for target user {}",
                    target_user
                ))
            }
        },
    };

    let neighbors = knn::find_neighbors(target_user, &target_ratings, &chunk, metric, k);
    debug!(
        target_user,
        candidates = chunk.len(),
        neighbors = neighbors.len(),
        "Processed task"
    );
    TaskResponse::from_neighbors(neighbors)
}
