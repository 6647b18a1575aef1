//! WebSocket bridge for terminal sessions.
//!
//! Text frames carry the JSON framing from `benchkube-api`; binary frames
//! are raw bytes in the input/output direction. Close code 1000 on clean
//! shutdown, 1011 on server error.

use crate::http::ApiError;
use crate::state::AppState;
use axum::extract::ws::{CloseFrame, Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, State};
use axum::response::Response;
use benchkube_api::v1::{ClientFrame, ServerFrame};
use benchkube_app::{AttachedTerminal, TerminalInput, TerminalOutput};
use benchkube_domain::SessionId;
use benchkube_shared::RequestContext;
use bytes::Bytes;
use std::sync::Arc;
use tracing::debug;

const CLOSE_NORMAL: u16 = 1000;
const CLOSE_SERVER_ERROR: u16 = 1011;

pub(crate) async fn terminal_socket(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<String>,
    upgrade: WebSocketUpgrade,
) -> Result<Response, ApiError> {
    let ctx = RequestContext::new_request();
    let session_id = SessionId::parse(&session_id)?;
    // Attach before upgrading so duplicate clients are refused with 409.
    let attached = state.broker.attach(&ctx, &session_id).await?;
    Ok(upgrade.on_upgrade(move |socket| bridge(socket, state, attached)))
}

async fn bridge(mut socket: WebSocket, state: Arc<AppState>, mut attached: AttachedTerminal) {
    let session_id = attached.session_id.clone();

    loop {
        tokio::select! {
            incoming = socket.recv() => {
                let Some(Ok(message)) = incoming else { break };
                state.broker.touch(&session_id).await;
                match client_input(message) {
                    ClientMessage::Input(input) => {
                        if attached.input.send(input).await.is_err() {
                            break;
                        }
                    },
                    ClientMessage::Ignore => {},
                    ClientMessage::Close => break,
                }
            },
            outgoing = attached.output.recv() => {
                let Some(output) = outgoing else {
                    let _ = socket
                        .send(close_frame(CLOSE_NORMAL, "channel closed"))
                        .await;
                    break;
                };
                state.broker.touch(&session_id).await;
                match output {
                    TerminalOutput::Data(bytes) => {
                        let frame = ServerFrame::Output {
                            data: String::from_utf8_lossy(&bytes).into_owned(),
                        };
                        if send_json(&mut socket, &frame).await.is_err() {
                            break;
                        }
                    },
                    TerminalOutput::Error(message) => {
                        let frame = ServerFrame::Error {
                            message: message.to_string(),
                        };
                        let _ = send_json(&mut socket, &frame).await;
                        let _ = socket
                            .send(close_frame(CLOSE_SERVER_ERROR, "exec error"))
                            .await;
                        break;
                    },
                    TerminalOutput::Closed(reason) => {
                        let frame = ServerFrame::Closed {
                            message: reason.to_string(),
                        };
                        let _ = send_json(&mut socket, &frame).await;
                        let _ = socket.send(close_frame(CLOSE_NORMAL, "closed")).await;
                        break;
                    },
                }
            },
        }
    }

    state.broker.remove(&session_id, "client disconnected").await;
    debug!(session = %session_id, "terminal.bridge ended");
}

enum ClientMessage {
    Input(TerminalInput),
    Ignore,
    Close,
}

fn client_input(message: Message) -> ClientMessage {
    match message {
        Message::Text(text) => match serde_json::from_str::<ClientFrame>(text.as_str()) {
            Ok(ClientFrame::Input { data }) => {
                ClientMessage::Input(TerminalInput::Data(Bytes::from(data.into_bytes())))
            },
            Ok(ClientFrame::Resize { rows, cols }) => {
                ClientMessage::Input(TerminalInput::Resize { rows, cols })
            },
            Ok(ClientFrame::Signal { data }) => {
                ClientMessage::Input(TerminalInput::Signal(data.into_boxed_str()))
            },
            Err(_) => ClientMessage::Ignore,
        },
        // Binary frames are raw input bytes.
        Message::Binary(bytes) => ClientMessage::Input(TerminalInput::Data(bytes)),
        Message::Close(_) => ClientMessage::Close,
        Message::Ping(_) | Message::Pong(_) => ClientMessage::Ignore,
    }
}

async fn send_json(socket: &mut WebSocket, frame: &ServerFrame) -> Result<(), axum::Error> {
    let text = serde_json::to_string(frame).unwrap_or_default();
    socket.send(Message::Text(text.into())).await
}

fn close_frame(code: u16, reason: &str) -> Message {
    Message::Close(Some(CloseFrame {
        code,
        reason: reason.to_string().into(),
    }))
}
