//! Minimal blocking HTTP server serving canned responses

use std::io::{BufRead, BufReader, Write};
use std::net::{SocketAddr, TcpListener};
use std::sync::{Arc, Mutex};
use std::thread;

/// Status and JSON body for one request
pub type Response = (u16, String);

/// Runs on a background thread for the rest of the test process
pub struct CannedServer {
    addr: SocketAddr,
    requests: Arc<Mutex<Vec<String>>>,
}

impl CannedServer {
    /// Serve every request with `handler(request_target)`
    pub fn start<H>(handler: H) -> Self
    where
        H: Fn(&str) -> Response + Send + 'static,
    {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let requests = Arc::new(Mutex::new(Vec::new()));
        let seen = requests.clone();

        thread::spawn(move || {
            for stream in listener.incoming() {
                let Ok(mut stream) = stream else { continue };
                let mut reader = BufReader::new(stream.try_clone().unwrap());

                let mut request_line = String::new();
                if reader.read_line(&mut request_line).is_err() {
                    continue;
                }
                loop {
                    let mut header = String::new();
                    match reader.read_line(&mut header) {
                        Ok(0) | Err(_) => break,
                        Ok(_) if header == "\r\n" => break,
                        Ok(_) => {}
                    }
                }

                let target = request_line
                    .split_whitespace()
                    .nth(1)
                    .unwrap_or("/")
                    .to_string();
                seen.lock().unwrap().push(target.clone());

                let (status, body) = handler(&target);
                let response = format!(
                    "HTTP/1.1 {status} {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                    reason(status),
                    body.len()
                );
                let _ = stream.write_all(response.as_bytes());
                let _ = stream.flush();
            }
        });

        Self { addr, requests }
    }

    /// Serve `responses` in order, then 404
    pub fn sequence(responses: Vec<Response>) -> Self {
        let queue = Mutex::new(responses.into_iter());
        Self::start(move |_| {
            queue
                .lock()
                .unwrap()
                .next()
                .unwrap_or((404, r#"{"error":"no more responses"}"#.to_string()))
        })
    }

    pub fn url(&self) -> String {
        format!("http://{}/page", self.addr)
    }

    /// Request targets received so far
    pub fn requests(&self) -> Vec<String> {
        self.requests.lock().unwrap().clone()
    }
}

fn reason(status: u16) -> &'static str {
    match status {
        200 => "OK",
        404 => "Not Found",
        429 => "Too Many Requests",
        503 => "Service Unavailable",
        _ => "Status",
    }
}

/// Value of `key` in a request target's query string
pub fn query_param(target: &str, key: &str) -> Option<String> {
    let query = target.split_once('?')?.1;
    query.split('&').find_map(|pair| {
        let (k, v) = pair.split_once('=')?;
        (k == key).then(|| v.to_string())
    })
}

/// A page body with `count` records for `day`, page `page`
pub fn page_body(day: &str, page: usize, count: usize, next: Option<&str>) -> String {
    let records: Vec<serde_json::Value> = (0..count)
        .map(|i| {
            serde_json::json!({
                "url": format!("https://example.org/{day}/{page}/{i}"),
                "created_at": format!("{day}T12:00:00Z"),
                "content": format!("item {i}"),
            })
        })
        .collect();
    serde_json::json!({ "records": records, "next_cursor": next }).to_string()
}

/// Handler serving `pages` pages of `per_page` records per day, cursor = page number
pub fn paged_handler(per_page: usize, pages: usize) -> impl Fn(&str) -> Response + Send + 'static {
    move |target: &str| {
        let Some(day) = query_param(target, "since") else {
            return (400, r#"{"error":"missing since"}"#.to_string());
        };
        let page: usize = query_param(target, "cursor")
            .and_then(|c| c.parse().ok())
            .unwrap_or(0);
        let next = (page + 1 < pages).then(|| (page + 1).to_string());
        (200, page_body(&day, page, per_page, next.as_deref()))
    }
}
