//! Integration tests for the Vision Assist WebSocket server.
//!
//! Most tests start the server in-process on an OS-assigned port with a test
//! detector and talk to it over a real WebSocket. The last test launches the
//! compiled binary the way a deployment script would.

use futures::{SinkExt, StreamExt};
use image::{ImageFormat, Rgb, RgbImage};
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::process::Stdio;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::io::AsyncBufReadExt;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use vision_assist_core::codec::{self, PixelBuffer};
use vision_assist_core::{
    ConnectionRegistry, Detection, Detector, Instruction, Pipeline, PipelineSettings, VisionError,
};
use vision_assist_server::{start_server, ServerHandle};

type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Reports the red channel of pixel (0, 0) back as the instruction.
/// Red 255 fails, red 254 takes half a second.
struct MarkerDetector;

impl Detector for MarkerDetector {
    fn infer(&self, frame: PixelBuffer) -> vision_assist_core::Result<Detection> {
        let marker = frame.get_pixel(0, 0)[0];
        match marker {
            255 => Err(VisionError::Inference {
                message: "model rejected frame".into(),
                source: None,
            }),
            _ => {
                if marker == 254 {
                    std::thread::sleep(Duration::from_millis(500));
                }
                Ok(Detection {
                    annotated: frame,
                    instructions: vec![Instruction::new(json!({
                        "instruction_type": "path",
                        "marker": marker,
                    }))],
                })
            }
        }
    }
}

async fn start(min_interval: Duration) -> ServerHandle {
    let settings = PipelineSettings {
        min_frame_interval: min_interval,
        ..Default::default()
    };
    let pipeline = Pipeline::new(
        Arc::new(MarkerDetector),
        Arc::new(ConnectionRegistry::new()),
        settings,
    )
    .expect("pipeline");
    start_server(Arc::new(pipeline), "127.0.0.1", 0)
        .await
        .expect("server should bind")
}

async fn connect(addr: SocketAddr) -> Client {
    let (client, _) = connect_async(format!("ws://{}/ws", addr))
        .await
        .expect("WebSocket handshake");
    client
}

fn frame(marker: u8) -> String {
    let image = RgbImage::from_pixel(6, 6, Rgb([marker, 10, 10]));
    let uri = codec::encode_data_uri(&image, ImageFormat::Png).unwrap();
    json!({
        "type": "frame",
        "data": uri,
        "timestamp": 1_700_000_000_000i64,
    })
    .to_string()
}

async fn send(client: &mut Client, text: String) {
    client.send(Message::Text(text)).await.expect("send");
}

/// Next JSON text message, skipping control frames.
async fn next_json(client: &mut Client) -> Value {
    loop {
        let message = tokio::time::timeout(Duration::from_secs(5), client.next())
            .await
            .expect("timed out waiting for a response")
            .expect("connection closed")
            .expect("WebSocket error");
        if let Message::Text(text) = message {
            return serde_json::from_str(&text).expect("server sent invalid JSON");
        }
    }
}

/// True if nothing arrives within `window`.
async fn stays_quiet(client: &mut Client, window: Duration) -> bool {
    tokio::time::timeout(window, client.next()).await.is_err()
}

async fn wait_for_connections(handle: &ServerHandle, expected: usize) -> bool {
    let start = Instant::now();
    while start.elapsed() < Duration::from_secs(5) {
        if handle.connections() == expected {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    false
}

#[tokio::test]
async fn test_health_reports_connections() {
    let handle = start(Duration::ZERO).await;
    let url = format!("http://{}/health", handle.addr());

    let body: Value = reqwest::get(&url).await.unwrap().json().await.unwrap();
    assert_eq!(body["status"], "ok");
    assert_eq!(body["connections"], 0);
    assert_eq!(body["clients"], json!([]));

    let _client = connect(handle.addr()).await;
    assert!(wait_for_connections(&handle, 1).await);
    let body: Value = reqwest::get(&url).await.unwrap().json().await.unwrap();
    assert_eq!(body["connections"], 1);
    let clients = body["clients"].as_array().unwrap();
    assert_eq!(clients.len(), 1);
    assert!(clients[0]["peer"].as_str().unwrap().starts_with("127.0.0.1:"));

    handle.stop().await;
}

#[tokio::test]
async fn test_frame_roundtrip() {
    let handle = start(Duration::ZERO).await;
    let mut client = connect(handle.addr()).await;

    send(&mut client, frame(42)).await;
    let response = next_json(&mut client).await;

    assert_eq!(
        response,
        json!({"type": "success", "data": [{"instruction_type": "path", "marker": 42}]})
    );
    handle.stop().await;
}

#[tokio::test]
async fn test_bad_data_uri_then_good_frame() {
    let handle = start(Duration::ZERO).await;
    let mut client = connect(handle.addr()).await;

    send(
        &mut client,
        r#"{"type":"frame","data":"not-a-real-data-uri"}"#.to_string(),
    )
    .await;
    let error = next_json(&mut client).await;
    assert_eq!(error["type"], "error");
    assert!(error["message"].as_str().unwrap().contains("separat"));

    send(&mut client, frame(3)).await;
    let success = next_json(&mut client).await;
    assert_eq!(success["type"], "success");
    assert_eq!(success["data"][0]["marker"], 3);

    handle.stop().await;
}

#[tokio::test]
async fn test_inference_failure_then_success() {
    let handle = start(Duration::ZERO).await;
    let mut client = connect(handle.addr()).await;

    send(&mut client, frame(255)).await;
    send(&mut client, frame(4)).await;

    let first = next_json(&mut client).await;
    assert_eq!(first["type"], "error");
    assert!(first["message"].as_str().unwrap().contains("model rejected frame"));

    let second = next_json(&mut client).await;
    assert_eq!(second["type"], "success");
    assert_eq!(second["data"][0]["marker"], 4);

    handle.stop().await;
}

#[tokio::test]
async fn test_unrecognized_messages_are_ignored() {
    let handle = start(Duration::ZERO).await;
    let mut client = connect(handle.addr()).await;

    send(&mut client, "hello?".to_string()).await;
    send(&mut client, r#"{"type":"subscribe","topic":"x"}"#.to_string()).await;
    client.send(Message::Binary(vec![1, 2, 3])).await.unwrap();
    assert!(stays_quiet(&mut client, Duration::from_millis(300)).await);

    // Still usable
    send(&mut client, frame(8)).await;
    assert_eq!(next_json(&mut client).await["data"][0]["marker"], 8);

    handle.stop().await;
}

#[tokio::test]
async fn test_responses_keep_frame_order() {
    let handle = start(Duration::ZERO).await;
    let mut client = connect(handle.addr()).await;

    let markers = [254u8, 1, 2, 255, 3];
    for marker in markers {
        send(&mut client, frame(marker)).await;
    }
    for marker in markers {
        let response = next_json(&mut client).await;
        if marker == 255 {
            assert_eq!(response["type"], "error");
        } else {
            assert_eq!(response["data"][0]["marker"], marker);
        }
    }

    handle.stop().await;
}

#[tokio::test]
async fn test_disconnect_releases_registry_entry() {
    let handle = start(Duration::ZERO).await;
    let before = handle.connections();

    let mut client = connect(handle.addr()).await;
    send(&mut client, frame(1)).await;
    next_json(&mut client).await;
    assert_eq!(handle.connections(), before + 1);

    client.close(None).await.unwrap();
    drop(client);
    assert!(wait_for_connections(&handle, before).await);

    handle.stop().await;
}

#[tokio::test]
async fn test_rate_limit_caps_processed_frames() {
    let handle = start(Duration::from_millis(50)).await;
    let mut client = connect(handle.addr()).await;

    // 100 frames/s for one second
    for _ in 0..100 {
        send(&mut client, frame(1)).await;
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    let mut responses = 0;
    while !stays_quiet_counting(&mut client, &mut responses).await {}

    assert!(responses >= 1, "no frame was admitted");
    assert!(responses <= 21, "admitted {} frames in one second", responses);
    handle.stop().await;
}

/// Reads one message if it arrives within 500ms; returns true when quiet.
async fn stays_quiet_counting(client: &mut Client, count: &mut usize) -> bool {
    match tokio::time::timeout(Duration::from_millis(500), client.next()).await {
        Ok(Some(Ok(Message::Text(text)))) => {
            let value: Value = serde_json::from_str(&text).unwrap();
            assert_eq!(value["type"], "success");
            *count += 1;
            false
        }
        Ok(Some(Ok(_))) => false,
        _ => true,
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_slow_connection_does_not_delay_another() {
    let handle = start(Duration::ZERO).await;
    let mut slow = connect(handle.addr()).await;
    let mut fast = connect(handle.addr()).await;

    send(&mut slow, frame(254)).await;
    tokio::time::sleep(Duration::from_millis(20)).await;

    let started = Instant::now();
    send(&mut fast, frame(7)).await;
    let fast_response = next_json(&mut fast).await;
    assert!(
        started.elapsed() < Duration::from_millis(400),
        "fast connection waited {:?}",
        started.elapsed()
    );
    assert_eq!(fast_response["data"][0]["marker"], 7);

    // Each connection only sees its own answers
    let slow_response = next_json(&mut slow).await;
    assert_eq!(slow_response["data"][0]["marker"], 254);
    assert!(stays_quiet(&mut fast, Duration::from_millis(200)).await);

    handle.stop().await;
}

#[tokio::test]
async fn test_shutdown_clears_registry() {
    let mut handle = start(Duration::ZERO).await;
    let mut client = connect(handle.addr()).await;
    send(&mut client, frame(1)).await;
    next_json(&mut client).await;
    assert_eq!(handle.connections(), 1);

    handle.shutdown();
    assert_eq!(handle.connections(), 0);
}

/// Launch the compiled binary and wait for it to report its port.
#[tokio::test]
async fn test_binary_serves_health_and_frames() {
    let frames_dir = tempfile::TempDir::new().unwrap();
    let mut child = tokio::process::Command::new(env!("CARGO_BIN_EXE_vision-assist-server"))
        .args(["--host", "127.0.0.1", "--port", "0", "--min-interval-ms", "0"])
        .arg("--frames-dir")
        .arg(frames_dir.path())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .kill_on_drop(true)
        .spawn()
        .expect("failed to launch server binary");

    let stdout = child.stdout.take().unwrap();
    let mut lines = tokio::io::BufReader::new(stdout).lines();
    let port: u16 = tokio::time::timeout(Duration::from_secs(30), async {
        while let Some(line) = lines.next_line().await.unwrap() {
            if let Some(port) = line.strip_prefix("VISION_ASSIST_PORT=") {
                return port.trim().parse().unwrap();
            }
        }
        panic!("server exited without reporting a port");
    })
    .await
    .expect("server did not start");

    let health: Value = reqwest::get(format!("http://127.0.0.1:{}/health", port))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(health["status"], "ok");

    let addr: SocketAddr = format!("127.0.0.1:{}", port).parse().unwrap();
    let mut client = connect(addr).await;
    send(&mut client, frame(5)).await;
    let response = next_json(&mut client).await;
    // The bundled detector passes frames through with no instructions
    assert_eq!(response, json!({"type": "success", "data": []}));

    let stored = std::fs::read_dir(frames_dir.path()).unwrap().count();
    assert_eq!(stored, 1);

    let _ = child.kill().await;
}
