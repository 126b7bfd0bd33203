//! Per-connection handler: frame shuttling between transport and engine.
//!
//! Each accepted connection gets its own Tokio task running this handler.
//! The handler owns no session state — it decodes inbound frames and
//! injects them into the engine, and pumps the engine's outbound channel
//! back over the socket. The only policy it enforces is the handshake
//! timeout: a client that sends nothing gets dropped.

use std::sync::Arc;
use std::time::Duration;

use parlor_protocol::{Codec, Envelope, JsonCodec};
use parlor_transport::{Connection, ConnectionId, WebSocketConnection};

use crate::ParlorError;
use crate::engine::EngineHandle;

/// Drop guard announcing the disconnect when the handler exits.
///
/// Ensures the offline path runs even if the handler errors out. The
/// engine channel is unbounded, so the send is synchronous and safe in
/// `Drop`.
struct DisconnectGuard {
    conn: ConnectionId,
    engine: EngineHandle,
}

impl Drop for DisconnectGuard {
    fn drop(&mut self) {
        self.engine.disconnect(self.conn);
    }
}

/// Drives a single connection from accept to close.
pub(crate) async fn handle_connection(
    conn: WebSocketConnection,
    engine: EngineHandle,
    handshake_timeout: Duration,
) -> Result<(), ParlorError> {
    let conn_id = conn.id();
    let conn = Arc::new(conn);
    let codec = JsonCodec;

    let mut outbound = engine.connect(conn_id);
    let _guard = DisconnectGuard {
        conn: conn_id,
        engine: engine.clone(),
    };

    // Outbound pump: engine envelopes out over the socket.
    let writer = {
        let conn = Arc::clone(&conn);
        tokio::spawn(async move {
            while let Some(envelope) = outbound.recv().await {
                let bytes = match codec.encode(&envelope) {
                    Ok(bytes) => bytes,
                    Err(e) => {
                        tracing::debug!(error = %e, "dropping unencodable envelope");
                        continue;
                    }
                };
                if conn.send(&bytes).await.is_err() {
                    break;
                }
            }
        })
    };

    // The first frame must arrive within the handshake window. The
    // engine itself enforces that it is a player.join.
    match tokio::time::timeout(handshake_timeout, conn.recv()).await {
        Ok(Ok(Some(data))) => process_frame(&engine, conn_id, &codec, &data),
        Ok(Ok(None)) => {
            writer.abort();
            return Ok(());
        }
        Ok(Err(e)) => {
            writer.abort();
            return Err(e.into());
        }
        Err(_) => {
            tracing::debug!(%conn_id, "handshake timed out");
            let _ = conn.close().await;
            writer.abort();
            return Ok(());
        }
    }

    // Inbound pump: frames in arrival order until the peer goes away.
    loop {
        match conn.recv().await {
            Ok(Some(data)) => process_frame(&engine, conn_id, &codec, &data),
            Ok(None) => {
                tracing::debug!(%conn_id, "connection closed cleanly");
                break;
            }
            Err(e) => {
                tracing::debug!(%conn_id, error = %e, "recv error");
                break;
            }
        }
    }

    writer.abort();
    Ok(())
}

/// Decodes one frame and hands it to the engine. Undecodable frames are
/// logged and dropped, never fatal.
fn process_frame(
    engine: &EngineHandle,
    conn: ConnectionId,
    codec: &JsonCodec,
    data: &[u8],
) {
    match codec.decode::<Envelope>(data) {
        Ok(envelope) => engine.send(conn, envelope),
        Err(e) => {
            tracing::debug!(%conn, error = %e, "dropping undecodable frame");
        }
    }
}
