/*!
 * A fake HTTP server for wire-level tests of the backend clients.
 *
 * Listens on an ephemeral local port and answers every request through a
 * routing closure. Each connection carries one request and is closed after
 * the response, so the client never reuses a half-read connection.
 */

use parking_lot::Mutex;
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;

/// One request as received by the server
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub method: String,
    pub path: String,
    /// Header names are lowercased
    pub headers: Vec<(String, String)>,
    pub body: String,
}

impl RecordedRequest {
    /// Value of a header, matched case-insensitively
    pub fn header(&self, name: &str) -> Option<&str> {
        let name = name.to_ascii_lowercase();
        self.headers
            .iter()
            .find(|(key, _)| *key == name)
            .map(|(_, value)| value.as_str())
    }

    /// Whether this is the warm-up prompt rather than a chunk
    pub fn is_warmup(&self) -> bool {
        self.path == "/api/chat" && self.body.contains("Say 'test'")
    }

    /// Whether this is a chunk translation request
    pub fn is_chunk(&self) -> bool {
        self.path == "/api/chat" && !self.is_warmup()
    }

    /// Text of the chunk carried by a translation request
    pub fn chunk_text(&self) -> Option<String> {
        let value: Value = serde_json::from_str(&self.body).ok()?;
        let prompt = value.get("messages")?.as_array()?.last()?.get("content")?.as_str()?;
        prompt.split_once("\n\n").map(|(_, text)| text.to_string())
    }
}

/// Scripted answer
#[derive(Debug, Clone)]
pub struct FakeResponse {
    pub status: u16,
    pub body: String,
    pub delay: Option<Duration>,
}

impl FakeResponse {
    pub fn json(value: Value) -> Self {
        Self { status: 200, body: value.to_string(), delay: None }
    }

    pub fn status(status: u16, body: &str) -> Self {
        Self { status, body: body.to_string(), delay: None }
    }

    /// Wait before answering
    pub fn delayed(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }
}

/// Body of a `/api/tags` answer
pub fn tags_body(models: &[&str]) -> Value {
    json!({
        "models": models.iter().map(|name| json!({ "name": name, "size": 1 })).collect::<Vec<_>>()
    })
}

/// Body of a non-streaming `/api/chat` answer
pub fn chat_body(content: &str) -> Value {
    json!({
        "model": "llama3.2",
        "message": { "role": "assistant", "content": content },
        "done": true,
        "prompt_eval_count": 12,
        "eval_count": 8
    })
}

type Router = dyn Fn(&RecordedRequest) -> FakeResponse + Send + Sync;

/// Running fake server; stops when dropped
pub struct FakeOllama {
    addr: SocketAddr,
    requests: Arc<Mutex<Vec<RecordedRequest>>>,
    handle: JoinHandle<()>,
}

impl FakeOllama {
    /// Start a server answering through `router`
    pub async fn start<F>(router: F) -> Self
    where
        F: Fn(&RecordedRequest) -> FakeResponse + Send + Sync + 'static,
    {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind fake server");
        let addr = listener.local_addr().expect("local addr");
        let requests = Arc::new(Mutex::new(Vec::new()));
        let router: Arc<Router> = Arc::new(router);

        let recorded = Arc::clone(&requests);
        let handle = tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                let router = Arc::clone(&router);
                let recorded = Arc::clone(&recorded);
                tokio::spawn(async move {
                    let _ = handle_connection(stream, router, recorded).await;
                });
            }
        });

        Self { addr, requests, handle }
    }

    /// A server with `models` installed that translates every chunk
    ///
    /// Completions carry a conversational preamble so the sanitizer is
    /// exercised on the way back.
    pub async fn translating(models: &[&str]) -> Self {
        let tags = tags_body(models);
        Self::start(move |request| match (request.method.as_str(), request.path.as_str()) {
            ("GET", "/api/tags") => FakeResponse::json(tags.clone()),
            ("POST", "/api/chat") if request.is_warmup() => FakeResponse::json(chat_body("test")),
            ("POST", "/api/chat") => {
                let text = request.chunk_text().unwrap_or_default();
                FakeResponse::json(chat_body(&format!("Here is the translation: {}", text.to_uppercase())))
            }
            _ => FakeResponse::status(404, "not found"),
        })
        .await
    }

    /// A server that times out on the chunk with `slow_index`
    pub async fn slow_on_chunk(models: &[&str], slow_index: usize, delay: Duration) -> Self {
        let tags = tags_body(models);
        let chunk_counter = AtomicUsize::new(0);
        Self::start(move |request| {
            if request.path == "/api/tags" {
                return FakeResponse::json(tags.clone());
            }
            if request.is_warmup() {
                return FakeResponse::json(chat_body("test"));
            }
            let index = chunk_counter.fetch_add(1, Ordering::SeqCst);
            let text = request.chunk_text().unwrap_or_default();
            let response = FakeResponse::json(chat_body(&text.to_uppercase()));
            if index == slow_index { response.delayed(delay) } else { response }
        })
        .await
    }

    /// Base URL of the server
    pub fn endpoint(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Every request received so far
    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().clone()
    }

    /// Chunk translation requests received so far
    pub fn chunk_requests(&self) -> Vec<RecordedRequest> {
        self.requests().into_iter().filter(|r| r.is_chunk()).collect()
    }
}

impl Drop for FakeOllama {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

async fn handle_connection(
    mut stream: TcpStream,
    router: Arc<Router>,
    recorded: Arc<Mutex<Vec<RecordedRequest>>>,
) -> std::io::Result<()> {
    let mut buffer = Vec::new();
    let mut chunk = [0u8; 4096];

    // Read the head
    let head_end = loop {
        let n = stream.read(&mut chunk).await?;
        if n == 0 {
            return Ok(());
        }
        buffer.extend_from_slice(&chunk[..n]);
        if let Some(pos) = find_head_end(&buffer) {
            break pos;
        }
    };

    let head = String::from_utf8_lossy(&buffer[..head_end]).to_string();
    let mut lines = head.lines();
    let request_line = lines.next().unwrap_or_default();
    let mut parts = request_line.split_whitespace();
    let method = parts.next().unwrap_or_default().to_string();
    let path = parts.next().unwrap_or_default().to_string();

    let headers: Vec<(String, String)> = lines
        .filter_map(|line| line.split_once(':'))
        .map(|(name, value)| (name.trim().to_ascii_lowercase(), value.trim().to_string()))
        .collect();
    let content_length = headers
        .iter()
        .find(|(name, _)| name == "content-length")
        .and_then(|(_, value)| value.parse::<usize>().ok())
        .unwrap_or(0);

    // Read the rest of the body
    let body_start = head_end + 4;
    while buffer.len() < body_start + content_length {
        let n = stream.read(&mut chunk).await?;
        if n == 0 {
            break;
        }
        buffer.extend_from_slice(&chunk[..n]);
    }
    let body_end = (body_start + content_length).min(buffer.len());
    let body = String::from_utf8_lossy(&buffer[body_start.min(body_end)..body_end]).to_string();

    let request = RecordedRequest { method, path, headers, body };
    recorded.lock().push(request.clone());
    let response = router(&request);

    if let Some(delay) = response.delay {
        tokio::time::sleep(delay).await;
    }

    let reply = format!(
        "HTTP/1.1 {} {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        response.status,
        reason_phrase(response.status),
        response.body.len(),
        response.body
    );
    stream.write_all(reply.as_bytes()).await?;
    stream.shutdown().await
}

fn find_head_end(buffer: &[u8]) -> Option<usize> {
    buffer.windows(4).position(|window| window == b"\r\n\r\n")
}

fn reason_phrase(status: u16) -> &'static str {
    match status {
        200 => "OK",
        401 => "Unauthorized",
        404 => "Not Found",
        429 => "Too Many Requests",
        500 => "Internal Server Error",
        503 => "Service Unavailable",
        _ => "Unknown",
    }
}
