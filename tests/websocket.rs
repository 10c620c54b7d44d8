use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

use fasttalk_tts::api::routes::AppState;
use fasttalk_tts::config::{Cli, Settings};
use fasttalk_tts::connections::ConnectionManager;
use fasttalk_tts::error::{AppError, ErrorCategory};
use fasttalk_tts::monitoring::ServiceMonitor;
use fasttalk_tts::server::serve_websocket;
use fasttalk_tts::tts::{AudioFormat, Backend, SynthesisJob, SynthesisOutput};

type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Writes a placeholder file and reports two progress steps.
struct FakeBackend {
    formats: &'static [AudioFormat],
}

impl Backend for FakeBackend {
    fn name(&self) -> &'static str {
        "fake"
    }

    fn supports(&self, format: AudioFormat) -> bool {
        self.formats.contains(&format)
    }

    fn synthesize(
        &self,
        job: &SynthesisJob,
        progress: &mut dyn FnMut(f32),
    ) -> Result<SynthesisOutput, AppError> {
        progress(0.5);
        std::fs::write(&job.output_file, job.text.as_bytes())?;
        progress(1.0);
        Ok(SynthesisOutput {
            file: job.output_file.clone(),
            format: job.format,
            duration_secs: 0.0,
        })
    }
}

/// Reports progress on the first chunk, then fails like a crashed model.
struct FailingBackend;

impl Backend for FailingBackend {
    fn name(&self) -> &'static str {
        "failing"
    }

    fn supports(&self, _format: AudioFormat) -> bool {
        true
    }

    fn synthesize(
        &self,
        _job: &SynthesisJob,
        progress: &mut dyn FnMut(f32),
    ) -> Result<SynthesisOutput, AppError> {
        progress(0.5);
        Err(AppError::TtsError("CUDA out of memory".to_string()))
    }
}

struct TestServer {
    url: String,
    state: Arc<AppState>,
    _output: tempfile::TempDir,
}

async fn start(extra: &[&str], formats: &'static [AudioFormat]) -> TestServer {
    start_with(extra, Arc::new(FakeBackend { formats })).await
}

async fn start_with(extra: &[&str], backend: Arc<dyn Backend>) -> TestServer {
    let output = tempfile::tempdir().unwrap();
    let output_arg = output.path().to_str().unwrap().to_string();

    let mut argv = vec!["fasttalk-tts", "websocket", "--output-dir", output_arg.as_str()];
    argv.extend_from_slice(extra);
    let cli = Cli::try_parse_from(argv).unwrap();
    let settings = Settings::from_args(cli.settings).unwrap();

    let state = Arc::new(AppState {
        backend,
        connections: Arc::new(ConnectionManager::new(settings.max_connections)),
        monitor: Arc::new(ServiceMonitor::new()),
        settings,
    });

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let server_state = Arc::clone(&state);
    tokio::spawn(async move {
        serve_websocket(listener, server_state, std::future::pending()).await
    });

    TestServer {
        url: format!("ws://{}/ws", addr),
        state,
        _output: output,
    }
}

async fn connect(server: &TestServer) -> Client {
    let (ws, _) = connect_async(&server.url).await.unwrap();
    ws
}

async fn next_json(ws: &mut Client) -> Value {
    loop {
        let msg = tokio::time::timeout(Duration::from_secs(5), ws.next())
            .await
            .expect("timed out waiting for a reply")
            .expect("connection closed")
            .unwrap();
        if let Message::Text(text) = msg {
            return serde_json::from_str(&text).unwrap();
        }
    }
}

async fn wait_for_active(state: &AppState, expected: usize) {
    for _ in 0..100 {
        if state.connections.active_count() == expected {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("expected {} active connections", expected);
}

const WAV_AND_MP3: &[AudioFormat] = &[AudioFormat::Wav, AudioFormat::Mp3];
const WAV_ONLY: &[AudioFormat] = &[AudioFormat::Wav];

#[tokio::test]
async fn test_request_streams_progress_then_ok() {
    let server = start(&[], WAV_AND_MP3).await;
    let mut ws = connect(&server).await;

    ws.send(Message::Text(r#"{"text": "Hello world"}"#.into()))
        .await
        .unwrap();

    let first = next_json(&mut ws).await;
    assert_eq!(first["status"], "progress");
    assert_eq!(first["progress"], 0.5);

    let second = next_json(&mut ws).await;
    assert_eq!(second["status"], "progress");
    assert_eq!(second["progress"], 1.0);

    let done = next_json(&mut ws).await;
    assert_eq!(done["status"], "ok");
    assert_eq!(done["format"], "wav");
    let file = done["file"].as_str().unwrap();
    assert!(file.ends_with(".wav"));
    assert_eq!(std::fs::read_to_string(file).unwrap(), "Hello world");

    let metrics = server.state.monitor.metrics();
    assert_eq!(metrics.requests_total, 1);
    assert_eq!(metrics.total_characters, 11);
}

#[tokio::test]
async fn test_streaming_disabled_sends_only_final_message() {
    let server = start(&["--allow-streaming", "false"], WAV_AND_MP3).await;
    let mut ws = connect(&server).await;

    ws.send(Message::Text(r#"{"text": "Hi", "format": "mp3"}"#.into()))
        .await
        .unwrap();

    let done = next_json(&mut ws).await;
    assert_eq!(done["status"], "ok");
    assert_eq!(done["format"], "mp3");
}

#[tokio::test]
async fn test_malformed_json_keeps_connection_open() {
    let server = start(&[], WAV_AND_MP3).await;
    let mut ws = connect(&server).await;

    ws.send(Message::Text("not json".into())).await.unwrap();
    let reply = next_json(&mut ws).await;
    assert_eq!(reply["status"], "error");
    assert_eq!(reply["message"], "Invalid JSON payload");

    ws.send(Message::Text(r#"{"voice": "af_sarah"}"#.into()))
        .await
        .unwrap();
    let reply = next_json(&mut ws).await;
    assert_eq!(reply["status"], "error");
    assert_eq!(reply["message"], "No text provided");

    assert_eq!(server.state.monitor.error_count(), 2);
}

#[tokio::test]
async fn test_unknown_format_is_rejected() {
    let server = start(&[], WAV_AND_MP3).await;
    let mut ws = connect(&server).await;

    ws.send(Message::Text(r#"{"text": "Hi", "format": "ogg"}"#.into()))
        .await
        .unwrap();
    let reply = next_json(&mut ws).await;
    assert_eq!(reply["status"], "error");
    assert_eq!(reply["message"], "Unsupported format 'ogg'");
}

#[tokio::test]
async fn test_wav_only_backend_rejects_mp3() {
    let server = start(&[], WAV_ONLY).await;
    let mut ws = connect(&server).await;

    ws.send(Message::Text(r#"{"text": "Hi", "format": "mp3"}"#.into()))
        .await
        .unwrap();
    let reply = next_json(&mut ws).await;
    assert_eq!(reply["status"], "error");
    assert_eq!(reply["message"], "fake backend does not support mp3 output");
}

#[tokio::test]
async fn test_connection_limit_closes_with_try_again_later() {
    let server = start(&["--max-connections", "1"], WAV_AND_MP3).await;

    let _first = connect(&server).await;
    wait_for_active(&server.state, 1).await;

    let mut second = connect(&server).await;
    let msg = tokio::time::timeout(Duration::from_secs(5), second.next())
        .await
        .expect("timed out waiting for close")
        .expect("connection dropped without a close frame")
        .unwrap();

    match msg {
        Message::Close(Some(frame)) => {
            assert_eq!(u16::from(frame.code), 1013);
            assert_eq!(frame.reason, "Service busy");
        }
        other => panic!("expected close frame, got {:?}", other),
    }
    assert_eq!(server.state.connections.active_count(), 1);

    let counts = server.state.monitor.errors_by_category();
    assert_eq!(counts[&ErrorCategory::Connection], 1);
}

#[tokio::test]
async fn test_backend_failure_reports_error_after_progress() {
    let server = start_with(&[], Arc::new(FailingBackend)).await;
    let mut ws = connect(&server).await;

    ws.send(Message::Text(r#"{"text": "Hello"}"#.into()))
        .await
        .unwrap();

    let first = next_json(&mut ws).await;
    assert_eq!(first["status"], "progress");
    assert_eq!(first["progress"], 0.5);

    let reply = next_json(&mut ws).await;
    assert_eq!(reply["status"], "error");
    assert_eq!(reply["message"], "TTS generation failed: CUDA out of memory");

    assert_eq!(server.state.monitor.error_count(), 1);
    let counts = server.state.monitor.errors_by_category();
    assert_eq!(counts[&ErrorCategory::Processing], 1);

    let sessions = server.state.connections.snapshot().sessions;
    assert_eq!(sessions.len(), 1);
    assert_eq!(sessions[0].errors, 1);
    assert_eq!(sessions[0].messages_received, 1);

    // The connection stays usable after a failed synthesis
    ws.send(Message::Text("[]".into())).await.unwrap();
    let reply = next_json(&mut ws).await;
    assert_eq!(reply["message"], "Invalid JSON payload");
}

#[tokio::test]
async fn test_disconnect_releases_slot() {
    let server = start(&["--max-connections", "1"], WAV_AND_MP3).await;

    let mut first = connect(&server).await;
    wait_for_active(&server.state, 1).await;
    first.close(None).await.unwrap();
    wait_for_active(&server.state, 0).await;

    let mut second = connect(&server).await;
    second
        .send(Message::Text(r#"{"text": "again"}"#.into()))
        .await
        .unwrap();
    let reply = next_json(&mut second).await;
    assert_eq!(reply["status"], "progress");
}
