//! HTTP tests for the chat-completion client
//!
//! Each test serves one canned response from a local listener and checks
//! what the client sent and how it read the reply.

use futures_util::StreamExt;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;

use superlink::ai::{ChatMessage, ChatModel, CompletionOptions, OpenAiCompatClient};
use superlink::config::AiConfig;
use superlink::LinkError;

const SSE: &str = "text/event-stream";
const JSON: &str = "application/json";

fn header_end(buf: &[u8]) -> Option<usize> {
    buf.windows(4).position(|w| w == b"\r\n\r\n")
}

async fn read_request(socket: &mut TcpStream) -> String {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];
    loop {
        let n = socket.read(&mut chunk).await.unwrap();
        if n == 0 {
            break;
        }
        buf.extend_from_slice(&chunk[..n]);
        if let Some(end) = header_end(&buf) {
            let head = String::from_utf8_lossy(&buf[..end]).to_lowercase();
            let length = head
                .lines()
                .find_map(|line| line.strip_prefix("content-length:"))
                .and_then(|value| value.trim().parse::<usize>().ok())
                .unwrap_or(0);
            if buf.len() >= end + 4 + length {
                break;
            }
        }
    }
    String::from_utf8_lossy(&buf).to_string()
}

/// Serve a single response; the handle yields the raw request
async fn serve_once(
    status: &'static str,
    content_type: &'static str,
    body: &'static str,
) -> (String, JoinHandle<String>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let handle = tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        let request = read_request(&mut socket).await;
        let response = format!(
            "HTTP/1.1 {}\r\nContent-Type: {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
            status,
            content_type,
            body.len(),
            body
        );
        socket.write_all(response.as_bytes()).await.unwrap();
        socket.shutdown().await.unwrap();
        request
    });

    (format!("http://{}/v1", addr), handle)
}

fn client(base_url: &str) -> OpenAiCompatClient {
    let config = AiConfig {
        base_url: base_url.to_string(),
        model: "test-model".to_string(),
        timeout_secs: 5,
        ..AiConfig::default()
    };
    OpenAiCompatClient::with_key(&config, "test-key").unwrap()
}

fn greeting() -> Vec<ChatMessage> {
    vec![ChatMessage::system("be brief"), ChatMessage::user("hi")]
}

#[tokio::test]
async fn test_complete_posts_chat_request() {
    let (url, server) = serve_once(
        "200 OK",
        JSON,
        r#"{"choices":[{"message":{"role":"assistant","content":"Hello there"}}]}"#,
    )
    .await;

    let reply = client(&url)
        .complete(&greeting(), CompletionOptions::default())
        .await
        .unwrap();
    assert_eq!(reply, "Hello there");

    let request = server.await.unwrap();
    assert!(request.starts_with("POST /v1/chat/completions"));
    assert!(request.to_lowercase().contains("authorization: bearer test-key"));
    assert!(request.contains(r#""model":"test-model""#));
    assert!(request.contains(r#""stream":false"#));
}

#[tokio::test]
async fn test_complete_maps_error_statuses() {
    let (url, server) = serve_once("402 Payment Required", JSON, r#"{"error":"credits"}"#).await;
    let result = client(&url)
        .complete(&greeting(), CompletionOptions::default())
        .await;
    assert!(matches!(result, Err(LinkError::InsufficientCredits)));
    server.await.unwrap();

    let (url, server) = serve_once("500 Internal Server Error", JSON, "model crashed").await;
    let result = client(&url)
        .complete(&greeting(), CompletionOptions::default())
        .await;
    match result {
        Err(LinkError::AiApi { status, message }) => {
            assert_eq!(status, 500);
            assert_eq!(message, "model crashed");
        }
        other => panic!("unexpected result {:?}", other),
    }
    server.await.unwrap();
}

#[tokio::test]
async fn test_stream_yields_deltas_and_final_unterminated_line() {
    let (url, server) = serve_once(
        "200 OK",
        SSE,
        concat!(
            "data: {\"choices\":[{\"delta\":{\"role\":\"assistant\"}}]}\n\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\"Hel\"}}]}\n\n",
            ": keep-alive\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\"lo\"}}]}\r\n\r\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\"!\"}}]}"
        ),
    )
    .await;

    let deltas: Vec<String> = client(&url)
        .stream(&greeting(), CompletionOptions::default())
        .await
        .unwrap()
        .map(|delta| delta.unwrap())
        .collect()
        .await;
    assert_eq!(deltas, vec!["Hel", "lo", "!"]);

    let request = server.await.unwrap();
    assert!(request.contains(r#""stream":true"#));
}

#[tokio::test]
async fn test_stream_stops_at_done_marker() {
    let (url, server) = serve_once(
        "200 OK",
        SSE,
        concat!(
            "data: {\"choices\":[{\"delta\":{\"content\":\"one\"}}]}\n\n",
            "data: [DONE]\n\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\"late\"}}]}\n\n"
        ),
    )
    .await;

    let deltas: Vec<String> = client(&url)
        .stream(&greeting(), CompletionOptions::default())
        .await
        .unwrap()
        .map(|delta| delta.unwrap())
        .collect()
        .await;
    assert_eq!(deltas, vec!["one"]);
    server.await.unwrap();
}

#[tokio::test]
async fn test_stream_reports_insufficient_credits() {
    let (url, server) = serve_once("402 Payment Required", JSON, "{}").await;
    let result = client(&url)
        .stream(&greeting(), CompletionOptions::default())
        .await;
    assert!(matches!(result, Err(LinkError::InsufficientCredits)));
    server.await.unwrap();
}

#[tokio::test]
async fn test_health_check() {
    let (url, server) = serve_once("200 OK", JSON, r#"{"data":[]}"#).await;
    assert!(client(&url).health_check().await.unwrap());
    let request = server.await.unwrap();
    assert!(request.starts_with("GET /v1/models"));

    let (url, server) = serve_once("401 Unauthorized", JSON, "{}").await;
    assert!(!client(&url).health_check().await.unwrap());
    server.await.unwrap();

    // nothing listening
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    let url = format!("http://{}/v1", addr);
    assert!(!client(&url).health_check().await.unwrap());
}
