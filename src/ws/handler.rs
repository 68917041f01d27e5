//! WebSocket upgrade handler

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::Response,
};
use futures::{SinkExt, StreamExt};
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::app::AppState;
use crate::game::{GameSession, SessionOutput};
use crate::util::rate_limit::CommandRateLimiter;
use crate::util::time::unix_millis;
use crate::ws::protocol::{ClientMsg, ServerMsg};

/// WebSocket upgrade handler
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

/// Handle the upgraded WebSocket connection: one session per socket
async fn handle_socket(socket: WebSocket, state: AppState) {
    let session_id = Uuid::new_v4();
    info!(session_id = %session_id, "New WebSocket connection");

    let (mut ws_sink, ws_stream) = socket.split();

    let (session, handle, output) = match GameSession::new(session_id, state.config.sim.clone()) {
        Ok(created) => created,
        Err(e) => {
            error!(session_id = %session_id, error = %e, "Failed to create session");
            let msg = ServerMsg::Error {
                code: "session_unavailable".to_string(),
                message: e.to_string(),
            };
            let _ = send_msg(&mut ws_sink, &msg).await;
            return;
        }
    };
    let welcome = ServerMsg::Welcome {
        session_id,
        server_time: unix_millis(),
        phase: session.phase(),
    };

    if let Err(e) = send_msg(&mut ws_sink, &welcome).await {
        error!(session_id = %session_id, error = %e, "Failed to send welcome");
        return;
    }

    let command_tx = handle.command_tx.clone();
    let reply_tx = handle.outbound_tx.clone();
    state.sessions.insert(handle);
    let session_task = tokio::spawn(session.run());

    run_connection(session_id, ws_sink, ws_stream, command_tx, reply_tx, output).await;

    // Dropping the last command sender stops the session
    state.sessions.remove(&session_id);
    if let Err(e) = session_task.await {
        error!(session_id = %session_id, error = %e, "Session task failed");
    }

    info!(session_id = %session_id, "WebSocket connection closed");
}

/// Pump socket frames into the session and session events out to the socket
async fn run_connection(
    session_id: Uuid,
    mut ws_sink: futures::stream::SplitSink<WebSocket, Message>,
    mut ws_stream: futures::stream::SplitStream<WebSocket>,
    command_tx: mpsc::Sender<ClientMsg>,
    reply_tx: mpsc::UnboundedSender<ServerMsg>,
    output: SessionOutput,
) {
    let rate_limiter = CommandRateLimiter::new();
    let SessionOutput {
        mut outbound,
        mut snapshots,
    } = output;

    // Writer task: session events -> WebSocket. Queued events go first so a
    // snapshot never names a visual the client has not been told about.
    let writer_handle = tokio::spawn(async move {
        loop {
            let msg = tokio::select! {
                biased;
                msg = outbound.recv() => match msg {
                    Some(msg) => msg,
                    None => break,
                },
                snapshot = snapshots.recv() => match snapshot {
                    Ok(msg) => msg,
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        // Snapshots are whole-battlefield; the next one replaces the skipped ones
                        warn!(session_id = %session_id, lagged_count = n, "Client lagged, skipped {} snapshots", n);
                        continue;
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        debug!(session_id = %session_id, "Snapshot channel closed");
                        break;
                    }
                },
            };

            if let Err(e) = send_msg(&mut ws_sink, &msg).await {
                debug!(session_id = %session_id, error = %e, "WebSocket send failed");
                break;
            }
        }
    });

    // Reader loop: WebSocket -> session
    while let Some(result) = ws_stream.next().await {
        match result {
            Ok(Message::Text(text)) => match parse_command(&text) {
                Ok(msg) => {
                    if !admit(&msg, &rate_limiter) {
                        warn!(session_id = %session_id, "Rate limited client command");
                        let _ = reply_tx.send(ServerMsg::CommandRejected {
                            code: "rate_limited".to_string(),
                            message: "Too many commands, slow down".to_string(),
                        });
                        continue;
                    }
                    if command_tx.send(msg).await.is_err() {
                        debug!(session_id = %session_id, "Command channel closed");
                        break;
                    }
                }
                Err(reply) => {
                    warn!(session_id = %session_id, "Failed to parse client message");
                    let _ = reply_tx.send(reply);
                }
            },
            Ok(Message::Binary(_)) => {
                warn!(session_id = %session_id, "Received binary message, ignoring");
            }
            Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => {}
            Ok(Message::Close(_)) => {
                info!(session_id = %session_id, "Client initiated close");
                break;
            }
            Err(e) => {
                error!(session_id = %session_id, error = %e, "WebSocket error");
                break;
            }
        }
    }

    writer_handle.abort();
}

/// Parse a client frame, or build the error reply for it
fn parse_command(text: &str) -> Result<ClientMsg, ServerMsg> {
    serde_json::from_str(text).map_err(|e| ServerMsg::Error {
        code: "bad_message".to_string(),
        message: e.to_string(),
    })
}

/// Load results settle pending placements and are never throttled
fn admit(msg: &ClientMsg, limiter: &CommandRateLimiter) -> bool {
    matches!(msg, ClientMsg::ModelLoaded { .. }) || limiter.check()
}

/// Send a message over WebSocket
async fn send_msg(
    sink: &mut futures::stream::SplitSink<WebSocket, Message>,
    msg: &ServerMsg,
) -> Result<(), String> {
    let json = serde_json::to_string(msg).map_err(|e| e.to_string())?;
    sink.send(Message::Text(json))
        .await
        .map_err(|e| e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::collaborator::LoadToken;

    #[test]
    fn load_results_bypass_the_command_limit() {
        let limiter = CommandRateLimiter::per_second(1);
        assert!(admit(&ClientMsg::StartRound, &limiter));
        assert!(!admit(&ClientMsg::StartRound, &limiter));

        let loaded = ClientMsg::ModelLoaded {
            token: LoadToken(1),
            success: true,
            reason: None,
        };
        for _ in 0..10 {
            assert!(admit(&loaded, &limiter));
        }
    }

    #[test]
    fn malformed_frames_get_an_error_reply() {
        assert!(matches!(parse_command(r#"{"type":"ping","t":5}"#), Ok(ClientMsg::Ping { t: 5 })));

        for frame in ["not json", r#"{"type":"launch_nukes"}"#, r#"{"type":"place_unit"}"#] {
            match parse_command(frame) {
                Err(ServerMsg::Error { code, .. }) => assert_eq!(code, "bad_message"),
                other => panic!("unexpected result for {frame}: {other:?}"),
            }
        }
    }
}
