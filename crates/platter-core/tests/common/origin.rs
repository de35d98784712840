//! Minimal HTTP/1.1 origin server for integration tests.
//!
//! Serves canned routes keyed by path and records every request it sees.
//! Each connection handles one request and then closes.

use std::collections::HashMap;
use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

/// What the server does for one path.
#[derive(Debug, Clone)]
pub enum Route {
    /// Fixed body with a Content-Length
    Body {
        status: u16,
        content_type: Option<&'static str>,
        body: Vec<u8>,
    },
    /// `count` chunks of `chunk` bytes, no Content-Length, close to finish
    Stream {
        content_type: &'static str,
        chunk: Vec<u8>,
        count: usize,
    },
    /// 3xx with a Location header
    Redirect { status: u16, location: String },
    /// Sleep before sending anything
    Stall(Duration),
    /// Send headers promptly, then stall before the body
    StallBody {
        content_type: &'static str,
        delay: Duration,
    },
}

/// Request line and headers as received.
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub method: String,
    pub path: String,
    pub headers: HashMap<String, String>,
}

impl RecordedRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(&name.to_ascii_lowercase()).map(String::as_str)
    }
}

/// A running origin. The server thread lives until the process exits.
pub struct Origin {
    port: u16,
    base: String,
    requests: Arc<Mutex<Vec<RecordedRequest>>>,
}

impl Origin {
    /// Start serving `routes`; unknown paths get 404.
    pub fn start(routes: Vec<(&str, Route)>) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
        let port = listener.local_addr().unwrap().port();
        let routes: Arc<HashMap<String, Route>> = Arc::new(
            routes
                .into_iter()
                .map(|(path, route)| (path.to_string(), route))
                .collect(),
        );
        let requests = Arc::new(Mutex::new(Vec::new()));

        let recorded = Arc::clone(&requests);
        thread::spawn(move || {
            for stream in listener.incoming().flatten() {
                let routes = Arc::clone(&routes);
                let recorded = Arc::clone(&recorded);
                thread::spawn(move || handle(stream, &routes, &recorded));
            }
        });

        Self {
            port,
            base: format!("http://127.0.0.1:{port}"),
            requests,
        }
    }

    /// Absolute URL for `path` on this origin.
    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base, path)
    }

    /// URL for `path` on this origin, addressed by `host` instead of the IP.
    pub fn url_for_host(&self, host: &str, path: &str) -> String {
        format!("http://{host}:{}{path}", self.port)
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn hits(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

fn handle(
    mut stream: TcpStream,
    routes: &HashMap<String, Route>,
    recorded: &Mutex<Vec<RecordedRequest>>,
) {
    let _ = stream.set_read_timeout(Some(Duration::from_secs(2)));
    let _ = stream.set_write_timeout(Some(Duration::from_secs(2)));
    let mut buf = [0u8; 8192];
    let n = match stream.read(&mut buf) {
        Ok(0) | Err(_) => return,
        Ok(n) => n,
    };
    let Ok(raw) = std::str::from_utf8(&buf[..n]) else {
        return;
    };
    let Some(request) = parse_request(raw) else {
        return;
    };
    let path = request.path.split('?').next().unwrap_or("/").to_string();
    recorded.lock().unwrap().push(request);

    match routes.get(&path) {
        None => write_body(&mut stream, 404, Some("text/plain"), b"not found"),
        Some(Route::Body {
            status,
            content_type,
            body,
        }) => write_body(&mut stream, *status, *content_type, body),
        Some(Route::Stream {
            content_type,
            chunk,
            count,
        }) => {
            let head = format!(
                "HTTP/1.1 200 OK\r\nContent-Type: {content_type}\r\nConnection: close\r\n\r\n"
            );
            if stream.write_all(head.as_bytes()).is_err() {
                return;
            }
            for _ in 0..*count {
                if stream.write_all(chunk).is_err() {
                    return;
                }
            }
        }
        Some(Route::Redirect { status, location }) => {
            let head = format!(
                "HTTP/1.1 {status} Redirect\r\nLocation: {location}\r\nContent-Length: 0\r\nConnection: close\r\n\r\n"
            );
            let _ = stream.write_all(head.as_bytes());
        }
        Some(Route::Stall(delay)) => {
            thread::sleep(*delay);
            write_body(&mut stream, 200, Some("image/png"), b"\x89PNG\r\n\x1a\n");
        }
        Some(Route::StallBody {
            content_type,
            delay,
        }) => {
            let head = format!(
                "HTTP/1.1 200 OK\r\nContent-Type: {content_type}\r\nContent-Length: 1024\r\nConnection: close\r\n\r\n"
            );
            let _ = stream.write_all(head.as_bytes());
            let _ = stream.write_all(&[0xFF, 0xD8, 0xFF]);
            let _ = stream.flush();
            thread::sleep(*delay);
        }
    }
}

fn write_body(stream: &mut TcpStream, status: u16, content_type: Option<&str>, body: &[u8]) {
    let content_type = content_type
        .map(|ct| format!("Content-Type: {ct}\r\n"))
        .unwrap_or_default();
    let head = format!(
        "HTTP/1.1 {status} Status\r\n{content_type}Content-Length: {}\r\nConnection: close\r\n\r\n",
        body.len()
    );
    let _ = stream.write_all(head.as_bytes());
    let _ = stream.write_all(body);
}

fn parse_request(raw: &str) -> Option<RecordedRequest> {
    let mut lines = raw.lines();
    let mut request_line = lines.next()?.split_whitespace();
    let method = request_line.next()?.to_string();
    let path = request_line.next()?.to_string();

    let mut headers = HashMap::new();
    for line in lines {
        let line = line.trim();
        if line.is_empty() {
            break;
        }
        if let Some((name, value)) = line.split_once(':') {
            headers.insert(name.trim().to_ascii_lowercase(), value.trim().to_string());
        }
    }

    Some(RecordedRequest {
        method,
        path,
        headers,
    })
}
