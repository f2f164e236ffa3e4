use crate::agent::{ Submission, PendingReply };
use crate::llm::{ LlmError, API_FAILURE_HINT, MISSING_CREDENTIAL_MESSAGE, SETUP_INSTRUCTIONS };
use crate::models::chat::Turn;
use crate::models::websocket::{ ClientMessage, NoticeLevel, ServerMessage };
use crate::server::{ same_origin, AppState };
use crate::session::SessionState;
use crate::upload::process_uploaded_file;

use std::net::SocketAddr;
use std::num::NonZeroU32;

use axum::{
    extract::{ ws::{ Message, WebSocket, WebSocketUpgrade }, ConnectInfo, State },
    http::{ HeaderMap, StatusCode },
    response::{ IntoResponse, Response },
    routing::get,
    Router,
};
use chrono::{ Local, Utc };
use futures_util::stream::SplitStream;
use futures_util::{ SinkExt, StreamExt };
use governor::{ RateLimiter, Quota, state::{ InMemoryState, NotKeyed }, clock::DefaultClock };
use lazy_static::lazy_static;
use log::{ info, warn, error };
use tokio::sync::mpsc;

const MAX_MESSAGE_SIZE: usize = 16 * 1024 * 1024;

lazy_static! {
    static ref CONNECTION_LIMITER: RateLimiter<NotKeyed, InMemoryState, DefaultClock> =
        RateLimiter::direct(Quota::per_second(NonZeroU32::new(10).unwrap_or(NonZeroU32::MIN)));
}

type Outbox = mpsc::UnboundedSender<ServerMessage>;

pub fn routes() -> Router<AppState> {
    Router::new().route("/ws", get(ws_handler))
}

async fn ws_handler(
    ws: WebSocketUpgrade,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    State(state): State<AppState>
) -> Response {
    if !same_origin(&headers) {
        warn!("Rejected cross-origin WebSocket upgrade from {} ({:?})", peer, headers.get("origin"));
        return StatusCode::FORBIDDEN.into_response();
    }
    if CONNECTION_LIMITER.check().is_err() {
        warn!("Global connection rate limit exceeded for {}. Dropping connection.", peer);
        return StatusCode::TOO_MANY_REQUESTS.into_response();
    }
    info!("Incoming connection from: {}", peer);
    ws.max_message_size(MAX_MESSAGE_SIZE).on_upgrade(move |socket| handle_connection(peer, socket, state))
}

fn api_failure(e: &LlmError) -> ServerMessage {
    ServerMessage::Error {
        message: format!("An error occurred: {}", e),
        hint: Some(API_FAILURE_HINT.to_string()),
    }
}

fn state_message(session: &SessionState) -> ServerMessage {
    let settings = session.settings();
    ServerMessage::State {
        session_id: session.id().to_string(),
        model: settings.model.clone(),
        temperature: settings.temperature,
        system_prompt: settings.system_prompt.clone(),
        turns: session.turns().to_vec(),
        history: session.history().to_vec(),
    }
}

pub async fn handle_connection(peer: SocketAddr, websocket: WebSocket, state: AppState) {
    let (mut tx, mut rx) = websocket.split();
    let (out_tx, mut out_rx) = mpsc::unbounded_channel::<ServerMessage>();

    let writer = tokio::spawn(async move {
        while let Some(message) = out_rx.recv().await {
            let json = match serde_json::to_string(&message) {
                Ok(json) => json,
                Err(e) => {
                    error!("Failed to serialize message for {}: {}", peer, e);
                    continue;
                }
            };
            if tx.send(Message::Text(json.into())).await.is_err() {
                break;
            }
        }
    });

    let mut session = SessionState::new((*state.profile).clone());
    info!("Assigned session ID {} to {}", session.id(), peer);
    let _ = out_tx.send(state_message(&session));

    while let Some(msg) = rx.next().await {
        match msg {
            Ok(Message::Text(text)) => {
                match serde_json::from_str::<ClientMessage>(text.as_str()) {
                    Ok(ClientMessage::Chat { content }) => {
                        if !handle_chat(&state, &mut session, &content, &out_tx, &mut rx).await {
                            break;
                        }
                    }
                    Ok(command) => handle_command(&state, &mut session, command, &out_tx),
                    Err(e) => {
                        error!("Failed to parse message from {}: {}", peer, e);
                        let _ = out_tx.send(ServerMessage::error(format!("Failed to parse message: {}", e)));
                    }
                }
            }
            Ok(Message::Close(_)) => {
                info!("Received close frame from {}", peer);
                break;
            }
            Ok(Message::Binary(_)) => {
                warn!("Ignoring binary message from {}", peer);
            }
            Ok(_) => {}
            Err(e) => {
                info!("WebSocket connection closed or protocol error for {}: {}", peer, e);
                break;
            }
        }
    }

    drop(out_tx);
    let _ = writer.await;
    info!("WebSocket connection closed for {} (Session ID: {})", peer, session.id());
}

/// Returns `false` once the client has gone away.
async fn handle_chat(
    state: &AppState,
    session: &mut SessionState,
    content: &str,
    out: &Outbox,
    rx: &mut SplitStream<WebSocket>
) -> bool {
    if content.trim().is_empty() {
        return true;
    }
    let _ = out.send(ServerMessage::Processing);

    let reply = match state.agent.submit(session, content).await {
        Submission::Streaming(reply) => reply,
        Submission::Disabled => {
            let _ = out.send(ServerMessage::Error {
                message: MISSING_CREDENTIAL_MESSAGE.to_string(),
                hint: Some(SETUP_INSTRUCTIONS.to_string()),
            });
            return true;
        }
        Submission::Busy => {
            let _ = out.send(ServerMessage::notice(NoticeLevel::Warning, "A reply is still being generated."));
            return true;
        }
        Submission::Failed(e) => {
            let _ = out.send(api_failure(&e));
            return true;
        }
    };

    stream_reply(state, session, reply, out, rx).await
}

async fn stream_reply(
    state: &AppState,
    session: &mut SessionState,
    mut reply: PendingReply,
    out: &Outbox,
    rx: &mut SplitStream<WebSocket>
) -> bool {
    loop {
        tokio::select! {
            update = reply.next_update() => {
                match update {
                    Some(Ok(text)) => {
                        let _ = out.send(ServerMessage::Partial { content: text });
                    }
                    Some(Err(e)) => {
                        state.agent.abort(session, &e);
                        let _ = out.send(api_failure(&e));
                        return true;
                    }
                    None => {
                        let content = state.agent.finalize(session, reply);
                        let _ = out.send(ServerMessage::Done { content, timestamp: Utc::now().timestamp() });
                        return true;
                    }
                }
            }
            incoming = rx.next() => {
                match incoming {
                    Some(Ok(Message::Text(_))) => {
                        let _ = out.send(
                            ServerMessage::notice(NoticeLevel::Warning, "A reply is still being generated.")
                        );
                    }
                    Some(Ok(Message::Close(_))) | Some(Err(_)) | None => {
                        info!("Client left session {} while a reply was streaming", session.id());
                        return false;
                    }
                    Some(Ok(_)) => {}
                }
            }
        }
    }
}

fn handle_command(state: &AppState, session: &mut SessionState, command: ClientMessage, out: &Outbox) {
    match command {
        ClientMessage::Settings { model, temperature } => {
            if let Err(e) = session.select_model(&model) {
                let _ = out.send(ServerMessage::notice(NoticeLevel::Warning, e.to_string()));
            }
            session.set_temperature(temperature);
            let _ = out.send(state_message(session));
        }
        ClientMessage::SystemPrompt { content } => {
            match session.apply_system_prompt(&content) {
                Ok(()) => {
                    let _ = out.send(ServerMessage::notice(NoticeLevel::Success, "System prompt applied!"));
                }
                Err(e) => {
                    let _ = out.send(ServerMessage::notice(NoticeLevel::Warning, e.to_string()));
                }
            }
            let _ = out.send(state_message(session));
        }
        ClientMessage::Upload { file_name, mime_type, data } => {
            if !state.profile.features.file_upload {
                let _ = out.send(
                    ServerMessage::notice(NoticeLevel::Warning, "File upload is not available in this UI")
                );
                return;
            }
            info!("Session {}: upload '{}' ({})", session.id(), file_name, mime_type);
            session.push_turn(Turn::user(process_uploaded_file(&file_name, &mime_type, &data)));
            let _ = out.send(ServerMessage::notice(NoticeLevel::Success, "File uploaded!"));
            let _ = out.send(state_message(session));
        }
        ClientMessage::Reset => {
            session.reset();
            let _ = out.send(state_message(session));
        }
        ClientMessage::Export => {
            match session.export(&state.export_dir, Local::now()) {
                Ok(Some(path)) => {
                    let _ = out.send(ServerMessage::Exported {
                        path: path.display().to_string(),
                        records: session.history().len(),
                    });
                }
                Ok(None) => {
                    let _ = out.send(ServerMessage::notice(NoticeLevel::Info, "There is no conversation to export yet."));
                }
                Err(e) => {
                    error!("Export failed for session {}: {}", session.id(), e);
                    let _ = out.send(ServerMessage::error(e.to_string()));
                }
            }
        }
        ClientMessage::State => {
            let _ = out.send(state_message(session));
        }
        ClientMessage::Chat { .. } => {}
    }
}
