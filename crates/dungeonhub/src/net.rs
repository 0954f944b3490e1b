//! TCP front-end over the server core.
//!
//! The core is transport-agnostic and serialized: every decoded frame is
//! funneled through the server mutex one at a time, which gives the
//! ordering guarantees the dispatcher relies on. Each connection gets a
//! read task that feeds a `FrameDecoder` and a write path that drains the
//! session's send queue - both direct responses and fan-out frames
//! enqueued by other sessions' handlers.

use std::sync::Arc;
use std::time::{Duration, Instant};

use dungeonhub_protocol::FrameDecoder;
use dungeonhub_server::{Server, SessionConfig, SharedSession};
use parking_lot::Mutex;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, error, info};

const READ_BUFFER_SIZE: usize = 4096;
const SEND_QUEUE_FLUSH_INTERVAL: Duration = Duration::from_millis(25);

/// Accept loop: one session and one connection task per client.
pub async fn run_listener(
    listener: TcpListener,
    server: Arc<Mutex<Server>>,
    session_config: SessionConfig,
) {
    loop {
        match listener.accept().await {
            Ok((stream, addr)) => {
                let session = server
                    .lock()
                    .create_session(session_config.clone(), Instant::now());
                info!(
                    session_id = session.lock().id(),
                    remote_addr = %addr,
                    "connection accepted"
                );
                let server = server.clone();
                tokio::spawn(async move {
                    if let Err(error) = handle_connection(stream, server.clone(), session.clone()).await {
                        debug!(session_id = session.lock().id(), %error, "connection ended");
                    }
                    let id = session.lock().id();
                    server.lock().remove_session(id);
                });
            }
            Err(error) => {
                error!(%error, "failed to accept connection");
                break;
            }
        }
    }
}

async fn handle_connection(
    mut stream: TcpStream,
    server: Arc<Mutex<Server>>,
    session: SharedSession,
) -> anyhow::Result<()> {
    stream.set_nodelay(true)?;
    let (mut reader, mut writer) = stream.split();
    let mut decoder = FrameDecoder::new();
    let mut buffer = [0u8; READ_BUFFER_SIZE];
    let mut flush = tokio::time::interval(SEND_QUEUE_FLUSH_INTERVAL);

    loop {
        tokio::select! {
            read = reader.read(&mut buffer) => {
                let bytes = match read {
                    Ok(0) => break,
                    Ok(bytes) => bytes,
                    Err(error) => return Err(error.into()),
                };
                decoder.append(&buffer[..bytes]);

                // Dispatch every complete frame; the lock is never held
                // across an await.
                let mut responses = Vec::new();
                while let Some((header, payload)) = decoder.next_frame() {
                    let response = server
                        .lock()
                        .handle_packet(&session, &header, &payload, Instant::now());
                    if let Some(response) = response {
                        responses.push(response);
                    }
                }
                for response in responses {
                    writer.write_all(&response).await?;
                }
            }
            _ = flush.tick() => {}
        }

        // Fan-out frames land on the session queue from other handlers;
        // drain them on every wakeup.
        let pending = {
            let mut guard = session.lock();
            let mut pending = Vec::new();
            while let Some(frame) = guard.dequeue_send() {
                pending.push(frame);
            }
            pending
        };
        for frame in pending {
            writer.write_all(&frame).await?;
        }

        if !session.lock().connected() {
            break;
        }
    }

    writer.flush().await?;
    Ok(())
}
