use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::time::timeout;

/// What the server does with the next request.
#[allow(dead_code)]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    /// 200 with a peet-style JSON report of what was received.
    Echo,
    /// Bare status with an empty body.
    Status(u16),
    /// Read the request and never answer.
    Stall,
}

/// One request as the server saw it.
#[allow(dead_code)]
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub request_line: String,
    /// Header lines in wire order, casing untouched.
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

#[allow(dead_code)]
impl RecordedRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn header_names(&self) -> Vec<&str> {
        self.headers.iter().map(|(k, _)| k.as_str()).collect()
    }
}

/// A plaintext HTTP/1.1 server that answers like a fingerprint probe.
///
/// Replies are consumed in order; once the script runs out every request is
/// echoed. Each connection serves one request and is then closed.
pub struct MockHttpServer {
    listener: TcpListener,
    port: u16,
    replies: Arc<Mutex<VecDeque<Reply>>>,
    requests: Arc<Mutex<Vec<RecordedRequest>>>,
}

#[allow(dead_code)]
impl MockHttpServer {
    /// Create a new mock server bound to a random port.
    pub async fn new() -> std::io::Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let port = listener.local_addr()?.port();
        Ok(Self {
            listener,
            port,
            replies: Arc::new(Mutex::new(VecDeque::new())),
            requests: Arc::new(Mutex::new(Vec::new())),
        })
    }

    /// Queue replies for the next requests.
    pub fn with_replies(self, replies: impl IntoIterator<Item = Reply>) -> Self {
        self.replies.lock().unwrap().extend(replies);
        self
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// Get the base URL for this server.
    pub fn url(&self) -> String {
        format!("http://127.0.0.1:{}", self.port)
    }

    /// Shared log of received requests, filled as the server runs.
    pub fn requests(&self) -> Arc<Mutex<Vec<RecordedRequest>>> {
        Arc::clone(&self.requests)
    }

    /// Start the server in a background task.
    pub fn start(self) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            loop {
                match self.listener.accept().await {
                    Ok((stream, _)) => {
                        let reply = self
                            .replies
                            .lock()
                            .unwrap()
                            .pop_front()
                            .unwrap_or(Reply::Echo);
                        tokio::spawn(handle_connection(
                            stream,
                            reply,
                            Arc::clone(&self.requests),
                        ));
                    }
                    Err(e) => {
                        tracing::error!("Accept error: {}", e);
                        break;
                    }
                }
            }
        })
    }
}

/// A port on 127.0.0.1 with nothing listening.
#[allow(dead_code)]
pub async fn closed_port() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap().port()
}

async fn read_request(stream: &mut TcpStream) -> Option<RecordedRequest> {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];

    let head_end = loop {
        let n = match timeout(Duration::from_secs(5), stream.read(&mut chunk)).await {
            Ok(Ok(0)) | Ok(Err(_)) | Err(_) => return None,
            Ok(Ok(n)) => n,
        };
        buf.extend_from_slice(&chunk[..n]);
        if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
            break pos;
        }
    };

    let head = String::from_utf8_lossy(&buf[..head_end]).into_owned();
    let mut lines = head.split("\r\n");
    let request_line = lines.next()?.to_string();
    let headers: Vec<(String, String)> = lines
        .filter_map(|line| line.split_once(':'))
        .map(|(k, v)| (k.to_string(), v.trim().to_string()))
        .collect();

    let content_length = headers
        .iter()
        .find(|(k, _)| k.eq_ignore_ascii_case("content-length"))
        .and_then(|(_, v)| v.parse::<usize>().ok())
        .unwrap_or(0);
    let mut body = buf[head_end + 4..].to_vec();
    while body.len() < content_length {
        let n = match timeout(Duration::from_secs(5), stream.read(&mut chunk)).await {
            Ok(Ok(0)) | Ok(Err(_)) | Err(_) => break,
            Ok(Ok(n)) => n,
        };
        body.extend_from_slice(&chunk[..n]);
    }

    Some(RecordedRequest {
        request_line,
        headers,
        body,
    })
}

fn echo_report(request: &RecordedRequest) -> String {
    let lines: Vec<String> = request
        .headers
        .iter()
        .map(|(k, v)| format!("{}: {}", k, v))
        .collect();
    serde_json::json!({
        "http_version": "HTTP/1.1",
        "method": request.request_line.split(' ').next().unwrap_or_default(),
        "user_agent": request.header("user-agent").unwrap_or_default(),
        "http1": { "headers": lines },
    })
    .to_string()
}

async fn handle_connection(
    mut stream: TcpStream,
    reply: Reply,
    requests: Arc<Mutex<Vec<RecordedRequest>>>,
) {
    let request = match read_request(&mut stream).await {
        Some(request) => request,
        None => return,
    };
    requests.lock().unwrap().push(request.clone());

    let response = match reply {
        Reply::Echo => {
            let body = echo_report(&request);
            format!(
                "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                body.len(),
                body
            )
        }
        Reply::Status(status) => format!(
            "HTTP/1.1 {} Blocked\r\nContent-Length: 0\r\nConnection: close\r\n\r\n",
            status
        ),
        Reply::Stall => {
            tokio::time::sleep(Duration::from_secs(60)).await;
            return;
        }
    };

    let _ = stream.write_all(response.as_bytes()).await;
    let _ = stream.flush().await;
}
