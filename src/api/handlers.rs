use axum::{
    extract::{
        ws::{close_code, CloseFrame, Message, WebSocket, WebSocketUpgrade},
        ConnectInfo, State,
    },
    response::IntoResponse,
};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc;
use tracing::Instrument;
use uuid::Uuid;

use super::{ServerMessage, SynthesisRequest};
use crate::api::routes::AppState;
use crate::connections::ConnectionState;
use crate::error::{AppError, ErrorCategory};
use crate::tts::{SynthesisJob, SynthesisOutput};

/// The client went away while we were replying.
struct Disconnected;

pub async fn ws_handler(
    ws: WebSocketUpgrade,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state, addr.to_string()))
}

async fn handle_socket(mut socket: WebSocket, state: Arc<AppState>, client: String) {
    let session_id = Uuid::new_v4().simple().to_string();

    if !state.connections.add(&session_id, Some(client.clone())) {
        tracing::warn!(client = %client, "Rejecting connection (max connections reached)");
        let _ = socket
            .send(Message::Close(Some(CloseFrame {
                code: close_code::AGAIN,
                reason: "Service busy".into(),
            })))
            .await;
        state.monitor.record_error(
            ErrorCategory::Connection,
            "SERVICE_BUSY",
            format!("Rejected {client}: max connections reached"),
        );
        return;
    }

    state.monitor.record_connection_open();
    tracing::info!(session_id = %session_id, client = %client, "Client connected");

    while let Some(msg) = socket.recv().await {
        match msg {
            Ok(Message::Text(text)) => {
                state.connections.record_message_received(&session_id);
                let request_id = Uuid::new_v4().simple().to_string();
                let span = tracing::info_span!(
                    "request",
                    session_id = %session_id,
                    request_id = %request_id
                );
                let result = process_message(&mut socket, &state, &session_id, &text)
                    .instrument(span)
                    .await;
                if result.is_err() {
                    break;
                }
            }
            Ok(Message::Binary(data)) => {
                tracing::debug!(
                    session_id = %session_id,
                    bytes = data.len(),
                    "Ignoring binary frame"
                );
            }
            Ok(Message::Close(_)) => break,
            Ok(_) => {}
            Err(e) => {
                tracing::warn!(session_id = %session_id, error = %e, "WebSocket error");
                break;
            }
        }
    }

    state.monitor.record_connection_closed();
    match state.connections.remove(&session_id) {
        Some(info) => tracing::info!(
            session_id = %session_id,
            client = %client,
            duration_seconds = info.duration().as_secs_f64(),
            messages_received = info.messages_received,
            errors = info.errors,
            "Client disconnected"
        ),
        None => tracing::info!(session_id = %session_id, client = %client, "Client disconnected"),
    }
}

async fn send(
    socket: &mut WebSocket,
    state: &AppState,
    session_id: &str,
    message: &ServerMessage,
) -> Result<(), Disconnected> {
    let json = serde_json::to_string(message).map_err(|e| {
        tracing::error!(error = %e, "Failed to encode server message");
        Disconnected
    })?;
    socket
        .send(Message::Text(json))
        .await
        .map_err(|_| Disconnected)?;
    state.connections.record_message_sent(session_id);
    Ok(())
}

/// Reject a request before synthesis started.
async fn reject(
    socket: &mut WebSocket,
    state: &AppState,
    session_id: &str,
    err: AppError,
) -> Result<(), Disconnected> {
    state.monitor.record_failure(&err);
    state.connections.record_error(session_id);
    tracing::warn!(code = err.code(), error = %err, "Rejected request");
    send(socket, state, session_id, &ServerMessage::from(&err)).await
}

async fn process_message(
    socket: &mut WebSocket,
    state: &Arc<AppState>,
    session_id: &str,
    frame: &str,
) -> Result<(), Disconnected> {
    state.monitor.record_request();
    let settings = &state.settings;

    let job = match SynthesisRequest::parse(frame)
        .and_then(|req| req.resolve(settings, &settings.output_directory))
    {
        Ok(job) => job,
        Err(e) => return reject(socket, state, session_id, e).await,
    };

    if !state.backend.supports(job.format) {
        let err = AppError::FormatNotSupported {
            backend: state.backend.name(),
            requested: job.format,
        };
        return reject(socket, state, session_id, err).await;
    }

    if let Err(e) = tokio::fs::create_dir_all(&settings.output_directory).await {
        return reject(socket, state, session_id, e.into()).await;
    }

    let characters = job.text.chars().count();
    let started = Instant::now();
    state
        .connections
        .set_state(session_id, ConnectionState::Processing);

    let (result, connected) = run_backend(socket, state, session_id, &job).await;

    state.connections.set_state(session_id, ConnectionState::Active);

    let mut audio_duration = 0.0;
    let reply = match result {
        Ok(output) => {
            audio_duration = output.duration_secs;
            state.connections.record_characters(session_id, characters);
            tracing::info!(
                characters,
                voice = %job.voice,
                language = %job.lang,
                file = %output.file.display(),
                processing_time = started.elapsed().as_secs_f64(),
                "Synthesis completed"
            );
            ServerMessage::Ok {
                file: output.file.display().to_string(),
                format: output.format,
            }
        }
        Err(e) => {
            state.monitor.record_failure(&e);
            state.connections.record_error(session_id);
            tracing::error!(
                characters,
                voice = %job.voice,
                language = %job.lang,
                code = e.code(),
                error = %e,
                "Synthesis failed"
            );
            ServerMessage::from(&e)
        }
    };

    state
        .monitor
        .record_synthesis(characters, started.elapsed().as_secs_f64(), audio_duration);

    if !connected {
        return Err(Disconnected);
    }
    send(socket, state, session_id, &reply).await
}

/// Run the backend on the blocking pool, forwarding progress as it arrives.
/// Returns the synthesis result and whether the client is still connected.
async fn run_backend(
    socket: &mut WebSocket,
    state: &Arc<AppState>,
    session_id: &str,
    job: &SynthesisJob,
) -> (Result<SynthesisOutput, AppError>, bool) {
    let (tx, mut rx) = mpsc::unbounded_channel::<f32>();
    let backend = Arc::clone(&state.backend);
    let blocking_job = job.clone();

    let task = tokio::task::spawn_blocking(move || {
        let mut report = |fraction: f32| {
            let _ = tx.send(fraction.clamp(0.0, 1.0));
        };
        backend.synthesize(&blocking_job, &mut report)
    });

    let mut connected = true;
    while let Some(progress) = rx.recv().await {
        if connected && state.settings.allow_streaming {
            let message = ServerMessage::Progress { progress };
            if send(socket, state, session_id, &message).await.is_err() {
                tracing::info!("Client left during synthesis");
                connected = false;
            }
        }
    }

    let result = match task.await {
        Ok(result) => result,
        Err(e) => Err(AppError::TtsError(format!("Synthesis task failed: {}", e))),
    };

    (result, connected)
}
