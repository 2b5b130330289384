use crate::error::RelayError;
use crate::metrics::{counters, gauges, histograms};
use crate::registry::ConnId;
use crate::server::ServerState;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use relay_proto::envelope::{classify, Classified, Inbound, Outbound};
use relay_proto::types::{decoded_file_len, MAX_FILE_SIZE};
use std::net::SocketAddr;
use std::time::Instant;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::time::{interval, Duration};
use tokio_tungstenite::tungstenite::protocol::WebSocketConfig;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::WebSocketStream;

type WsSink = SplitSink<WebSocketStream<TcpStream>, Message>;
type WsRecv = SplitStream<WebSocketStream<TcpStream>>;

/// Accept the WebSocket upgrade, register the connection, and relay
/// messages until the peer disconnects or the transport fails.
pub async fn handle_connection(
    stream: TcpStream,
    peer_addr: SocketAddr,
    state: std::sync::Arc<ServerState>,
) -> Result<(), RelayError> {
    let ws_config = WebSocketConfig {
        max_message_size: Some(state.config.max_frame_bytes),
        max_frame_size: Some(state.config.max_frame_bytes),
        ..WebSocketConfig::default()
    };

    let ws_stream = tokio_tungstenite::accept_async_with_config(stream, Some(ws_config))
        .await
        .map_err(RelayError::WebSocket)?;
    let (mut ws_tx, mut ws_rx) = ws_stream.split();

    let (deliver_tx, mut deliver_rx) = mpsc::channel::<Message>(state.config.send_queue);
    let conn_id = state.registry.insert(deliver_tx);
    gauges::inc_connections_active();
    tracing::info!(conn_id, peer = %peer_addr, "client connected");

    let result = run_message_loop(&mut ws_tx, &mut ws_rx, &mut deliver_rx, &state, conn_id).await;

    // The registry invariant: an entry exists iff the connection is open.
    // Removal happens here on every exit path, clean close or error.
    state.registry.remove(conn_id);
    gauges::dec_connections_active();
    tracing::info!(conn_id, peer = %peer_addr, "client disconnected");

    result
}

/// Drive the relay select loop: inbound frames, queued broadcasts bound
/// for this client, and the keepalive/idle timer.
async fn run_message_loop(
    ws_tx: &mut WsSink,
    ws_rx: &mut WsRecv,
    deliver_rx: &mut mpsc::Receiver<Message>,
    state: &ServerState,
    conn_id: ConnId,
) -> Result<(), RelayError> {
    let mut ping_interval = interval(Duration::from_secs(state.config.ping_interval));
    let idle_timeout = Duration::from_secs(state.config.idle_timeout);
    let mut last_activity = Instant::now();

    loop {
        tokio::select! {
            msg = ws_rx.next() => {
                last_activity = Instant::now();
                match msg {
                    Some(Ok(msg @ (Message::Text(_) | Message::Binary(_)))) => {
                        process_message(&msg, state, ws_tx, conn_id).await?;
                    }
                    Some(Ok(Message::Ping(data))) => {
                        if let Err(e) = ws_tx.send(Message::Pong(data)).await {
                            tracing::debug!(conn_id, "failed to send pong: {}", e);
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => return Ok(()),
                    Some(Err(e)) => return Err(RelayError::WebSocket(e)),
                    _ => {}
                }
            }
            Some(msg) = deliver_rx.recv() => {
                counters::payload_bytes_total("out", msg.len() as u64);
                ws_tx.send(msg).await.map_err(RelayError::WebSocket)?;
            }
            _ = ping_interval.tick() => {
                if last_activity.elapsed() >= idle_timeout {
                    tracing::debug!(conn_id, "idle timeout reached, closing connection");
                    return Ok(());
                }
                if let Err(e) = ws_tx.send(Message::Ping(vec![])).await {
                    tracing::debug!(conn_id, "failed to send ping: {}", e);
                }
            }
        }
    }
}

/// Classify one inbound frame and fan it out (or reject it).
async fn process_message<T>(
    msg: &Message,
    state: &ServerState,
    ws_tx: &mut T,
    conn_id: ConnId,
) -> Result<(), RelayError>
where
    T: futures_util::Sink<Message> + Unpin,
    T::Error: std::fmt::Debug,
{
    let payload: &[u8] = match msg {
        Message::Text(text) => text.as_bytes(),
        Message::Binary(data) => data,
        _ => return Ok(()),
    };
    counters::payload_bytes_total("in", payload.len() as u64);

    match classify(payload) {
        Classified::Envelope(envelope) => {
            let outbound = match envelope {
                Inbound::File {
                    file_data,
                    file_name,
                    file_type,
                    sender,
                    timestamp,
                } => {
                    let file_size = match decoded_file_len(&file_data) {
                        Ok(len) => len,
                        Err(e) => {
                            tracing::debug!(conn_id, error = %e, "file payload is not valid base64, dropping");
                            counters::messages_dropped_total("bad_base64");
                            return Ok(());
                        }
                    };
                    if file_size > MAX_FILE_SIZE {
                        // Only the origin hears about this; nothing is broadcast.
                        counters::messages_dropped_total("oversize");
                        tracing::debug!(conn_id, file_size, "rejecting oversized file");
                        send_to_origin(ws_tx, &Outbound::file_too_large()).await?;
                        return Ok(());
                    }
                    tracing::info!(conn_id, file_name = %file_name, file_type = %file_type, file_size, "received file");
                    Outbound::File {
                        file_data,
                        file_name,
                        file_type,
                        file_size: file_size as u64,
                        sender,
                        timestamp,
                    }
                }
                Inbound::Audio {
                    audio_data,
                    sender,
                    timestamp,
                } => {
                    // No size validation for audio; the asymmetry with
                    // file uploads is part of the observed contract.
                    tracing::info!(conn_id, "received audio message");
                    Outbound::Audio {
                        audio_data,
                        sender,
                        timestamp,
                    }
                }
                Inbound::Text {
                    content,
                    sender,
                    timestamp,
                } => {
                    tracing::info!(conn_id, content = %content, "received text message");
                    Outbound::Text {
                        content,
                        sender,
                        timestamp,
                    }
                }
            };
            let kind = outbound.kind();
            let encoded = serde_json::to_string(&outbound)?;
            broadcast(state, Message::Text(encoded), kind);
        }
        Classified::Unrecognized => {
            // Valid JSON with an unknown or incomplete envelope: the
            // contract is a silent no-op, not an error.
            tracing::debug!(conn_id, "unrecognized message, ignoring");
            counters::messages_dropped_total("unrecognized");
        }
        Classified::Legacy => {
            tracing::info!(conn_id, len = payload.len(), "relaying legacy message verbatim");
            broadcast(state, msg.clone(), "legacy");
        }
    }

    Ok(())
}

/// Fan a message out to every open connection, the sender included.
fn broadcast(state: &ServerState, message: Message, kind: &'static str) {
    let start = Instant::now();
    let summary = state.registry.broadcast(&message);
    histograms::broadcast_latency_seconds(start.elapsed().as_secs_f64());
    counters::messages_broadcast_total(kind);
    if summary.dropped_full > 0 {
        counters::delivery_failures_total("queue_full", summary.dropped_full as u64);
        tracing::debug!(kind, dropped = summary.dropped_full, "slow consumers missed a broadcast");
    }
    if summary.dropped_closed > 0 {
        counters::delivery_failures_total("closed", summary.dropped_closed as u64);
    }
}

/// Send an envelope to the originating connection only.
async fn send_to_origin<T>(ws_tx: &mut T, envelope: &Outbound) -> Result<(), RelayError>
where
    T: futures_util::Sink<Message> + Unpin,
    T::Error: std::fmt::Debug,
{
    let encoded = serde_json::to_string(envelope)?;
    ws_tx
        .send(Message::Text(encoded))
        .await
        .map_err(|_| RelayError::ConnectionClosed)?;
    Ok(())
}
