//! Coordinator ↔ worker node protocol.
//!
//! The coordinator ships each node a [`TaskRequest`] (target user, the
//! node's chunk of the rating matrix, K) and gets back a [`TaskResponse`]
//! with that node's partial neighbor list.
//!
//! - **messages**: protobuf message definitions and conversions
//! - **codec**: 4-byte length prefix framing over any async stream
//! - **client**: one dial/send/receive/close exchange per call
//! - **server**: the worker node's accept loop and task processing

pub mod client;
pub mod codec;
pub mod error;
pub mod messages;
pub mod server;

pub use client::{NodeClient, DEFAULT_NODE_TIMEOUT};
pub use codec::{check_frame_len, read_frame, write_frame, DEFAULT_MAX_FRAME_LEN};
pub use error::{ProtocolError, Result};
pub use messages::{Metric, Neighbor, RatingVector, TaskRequest, TaskResponse};
pub use server::{process_task, NodeServer, DEFAULT_READ_TIMEOUT};
