//! Block streamer - follows a node from its first traced block.
//!
//! This example demonstrates:
//! - Building a session with the builder pattern
//! - Waiting for the ABI handshake
//! - Requesting status and a range of blocks
//! - Acknowledging each block to keep the stream flowing
//!
//! # Running against a node
//!
//! ```text
//! RUST_LOG=ship_client=debug cargo run --example stream_blocks -- 127.0.0.1 8080 100
//! ```
//!
//! Arguments are host, port and the number of blocks to stream.

use ship_client::{BlocksAckRequest, BlocksRequest, Session};

/// Results the node may send ahead of our acks.
const WINDOW: u32 = 10;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let mut args = std::env::args().skip(1);
    let host = args.next().unwrap_or_else(|| "127.0.0.1".to_owned());
    let port = args.next().map(|p| p.parse()).transpose()?.unwrap_or(8080);
    let count: u32 = args.next().map(|n| n.parse()).transpose()?.unwrap_or(100);

    let mut session = Session::builder()
        .host(host)
        .port(port)
        .channel_capacity(WINDOW as usize)
        .build();
    session.open().await?;
    let mut streams = session.take_streams().ok_or("streams already taken")?;

    tokio::select! {
        schema = streams.ready.recv() => {
            let schema = schema.ok_or("session closed before handshake")?;
            println!("connected, abi {}", schema.version());
        }
        Some(err) = streams.errors.recv() => return Err(err.into()),
    }

    session.send_status_request().await?;
    let status = streams.status.recv().await.ok_or("no status")?;
    println!(
        "head {} irreversible {} traces {}..{}",
        status.head.block_num,
        status.last_irreversible.block_num,
        status.trace_begin_block,
        status.trace_end_block
    );

    let start = status.trace_begin_block;
    let end = start.saturating_add(count).min(status.head.block_num.saturating_add(1));
    let request = BlocksRequest::new(start, end)
        .max_messages_in_flight(WINDOW)
        .fetch_block(true)
        .fetch_traces(true);
    session.send_blocks_request(&request).await?;

    let mut received = 0;
    while received < end.saturating_sub(start) {
        tokio::select! {
            Some(block) = streams.blocks.recv() => {
                received += 1;
                if let Some(this_block) = block.this_block {
                    println!(
                        "block {} {} ({} bytes)",
                        this_block.block_num,
                        this_block.block_id,
                        block.block.as_ref().map_or(0, |b| b.len())
                    );
                }
                session.send_ack_blocks_request(&BlocksAckRequest::new(1)).await?;
            }
            Some(err) = streams.errors.recv() => return Err(err.into()),
            else => break,
        }
    }

    session.close().await;
    Ok(())
}
