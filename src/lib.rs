//! # ship-client
//!
//! Rust client for the state-history ("SHIP") protocol spoken by
//! EOSIO-family blockchain nodes.
//!
//! A node streams block data over a WebSocket. The first message it sends is
//! its ABI; every later message, in both directions, is an ABI-encoded
//! variant.
//!
//! ## Architecture
//!
//! - **Session** ([`Session`]): owns the connection, runs the read loop and
//!   publishes typed results on [`SessionStreams`]
//! - **Protocol** ([`protocol`]): request and result envelopes
//! - **Codec** ([`abi`]): the [`Schema`] trait and the bundled [`Abi`]
//! - **Transport** ([`transport`]): WebSocket and in-memory connections
//!
//! ## Example
//!
//! ```ignore
//! use ship_client::{BlocksAckRequest, BlocksRequest, Session};
//!
//! #[tokio::main]
//! async fn main() -> ship_client::Result<()> {
//!     let mut session = Session::builder().host("127.0.0.1").port(8080).build();
//!     session.open().await?;
//!     let mut streams = session.take_streams().unwrap();
//!
//!     streams.ready.recv().await;
//!     session.send_status_request().await?;
//!     let status = streams.status.recv().await.unwrap();
//!
//!     let request = BlocksRequest::new(status.trace_begin_block, status.head.block_num)
//!         .max_messages_in_flight(10)
//!         .fetch_block(true);
//!     session.send_blocks_request(&request).await?;
//!
//!     while let Some(block) = streams.blocks.recv().await {
//!         println!("{:?}", block.this_block);
//!         session.send_ack_blocks_request(&BlocksAckRequest::new(1)).await?;
//!     }
//!     Ok(())
//! }
//! ```

pub mod abi;
pub mod config;
pub mod error;
pub mod flow;
pub mod protocol;
pub mod transport;
pub mod types;

mod session;
mod writer;

pub use abi::{Abi, Schema, Value};
pub use config::SessionConfig;
pub use error::{AbiError, Result, ShipError};
pub use flow::FlowWindow;
pub use session::{Session, SessionBuilder, SessionState, SessionStreams};
pub use types::{
    BlockPosition, BlocksAckRequest, BlocksRequest, BlocksResult, Checksum256, StatusResult,
    MAX_BLOCK_NUM,
};
