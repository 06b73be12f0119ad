//! Shared helpers for integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use redpager::{RedditClientError, Transport};
use serde_json::{json, Value};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::time::Instant;

#[derive(Debug, Clone)]
pub struct Request {
    pub path: String,
    pub query: Vec<(String, String)>,
    pub at: Instant,
}

impl Request {
    pub fn param(&self, key: &str) -> Option<&str> {
        self.query
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}

/// In-memory transport answering each path from a queue of canned
/// responses. An exhausted queue answers with an empty listing.
#[derive(Default)]
pub struct ScriptedTransport {
    responses: Mutex<HashMap<String, VecDeque<Result<Value, RedditClientError>>>>,
    requests: Mutex<Vec<Request>>,
}

impl ScriptedTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn push_ok(&self, path: &str, value: Value) {
        self.push(path, Ok(value));
    }

    pub fn push_err(&self, path: &str, err: RedditClientError) {
        self.push(path, Err(err));
    }

    pub fn push(&self, path: &str, response: Result<Value, RedditClientError>) {
        self.responses
            .lock()
            .unwrap()
            .entry(path.to_string())
            .or_default()
            .push_back(response);
    }

    pub fn requests(&self) -> Vec<Request> {
        self.requests.lock().unwrap().clone()
    }

    fn record(&self, path: &str, query: &[(String, String)]) {
        self.requests.lock().unwrap().push(Request {
            path: path.to_string(),
            query: query.to_vec(),
            at: Instant::now(),
        });
    }

    fn pop(&self, path: &str) -> Option<Result<Value, RedditClientError>> {
        self.responses
            .lock()
            .unwrap()
            .get_mut(path)
            .and_then(|queue| queue.pop_front())
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn get(&self, path: &str, query: &[(String, String)]) -> Result<Value, RedditClientError> {
        self.record(path, query);
        self.pop(path).unwrap_or_else(|| Ok(listing(vec![], None, None)))
    }

    async fn post(&self, path: &str, body: &Value) -> Result<Value, RedditClientError> {
        self.record(path, &redpager::client::form_params(body));
        self.pop(path).unwrap_or_else(|| Ok(json!({})))
    }
}

pub fn listing(children: Vec<Value>, after: Option<&str>, before: Option<&str>) -> Value {
    json!({
        "kind": "Listing",
        "data": {"after": after, "before": before, "children": children}
    })
}

pub fn post(id: &str) -> Value {
    json!({"kind": "t3", "data": {"id": id, "name": format!("t3_{}", id), "title": format!("post {}", id)}})
}

pub fn posts(range: std::ops::Range<usize>) -> Vec<Value> {
    range.map(|i| post(&format!("p{}", i))).collect()
}

pub fn comment(id: &str, parent: &str) -> Value {
    json!({"kind": "t1", "data": {
        "id": id,
        "name": format!("t1_{}", id),
        "parent_id": parent,
        "link_id": "t3_link",
        "body": format!("comment {}", id),
        "replies": ""
    }})
}

pub fn with_replies(mut thing: Value, replies: Vec<Value>) -> Value {
    thing["data"]["replies"] = listing(replies, None, None);
    thing
}

pub fn message(id: &str) -> Value {
    json!({"kind": "t4", "data": {"id": id, "name": format!("t4_{}", id), "subject": "hi", "body": id, "replies": ""}})
}

pub fn more(id: &str, parent: &str, children: &[&str]) -> Value {
    json!({"kind": "more", "data": {
        "id": id,
        "name": format!("t1_{}", id),
        "parent_id": parent,
        "children": children,
        "count": children.len()
    }})
}

pub fn more_children_response(things: Vec<Value>) -> Value {
    json!({"json": {"errors": [], "data": {"things": things}}})
}

pub fn unavailable() -> RedditClientError {
    RedditClientError::StatusError {
        status: 503,
        body: "unavailable".to_string(),
    }
}

pub fn ids(things: &[redpager::Thing]) -> Vec<String> {
    things.iter().map(|t| t.full_id().to_string()).collect()
}

/// One canned HTTP response for [`serve`].
#[derive(Clone)]
pub struct Route {
    pub path: &'static str,
    pub status: u16,
    pub headers: Vec<(&'static str, String)>,
    pub body: String,
}

impl Route {
    pub fn json(path: &'static str, body: Value) -> Self {
        Self {
            path,
            status: 200,
            headers: Vec::new(),
            body: body.to_string(),
        }
    }

    pub fn status(mut self, status: u16) -> Self {
        self.status = status;
        self
    }

    pub fn header(mut self, name: &'static str, value: &str) -> Self {
        self.headers.push((name, value.to_string()));
        self
    }
}

/// Serve `routes` on an ephemeral local port, matching on the request path
/// (query ignored). Returns the base URL and the request targets seen.
pub async fn serve(routes: Vec<Route>) -> (url::Url, Arc<Mutex<Vec<String>>>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let seen = Arc::new(Mutex::new(Vec::new()));
    let log = seen.clone();

    tokio::spawn(async move {
        loop {
            let (mut socket, _) = match listener.accept().await {
                Ok(conn) => conn,
                Err(_) => return,
            };
            let routes = routes.clone();
            let log = log.clone();
            tokio::spawn(async move {
                let mut buf = Vec::new();
                let mut chunk = [0u8; 4096];
                loop {
                    let n = socket.read(&mut chunk).await.unwrap_or(0);
                    if n == 0 {
                        break;
                    }
                    buf.extend_from_slice(&chunk[..n]);
                    if buf.windows(4).any(|w| w == b"\r\n\r\n") {
                        break;
                    }
                }

                let head = String::from_utf8_lossy(&buf).to_string();
                let target = head
                    .lines()
                    .next()
                    .and_then(|line| line.split_whitespace().nth(1))
                    .unwrap_or("/")
                    .to_string();
                let path = target.split('?').next().unwrap_or("/").to_string();
                log.lock().unwrap().push(target);

                let route = routes.iter().find(|r| r.path == path);
                let (status, headers, body) = match route {
                    Some(r) => (r.status, r.headers.clone(), r.body.clone()),
                    None => (404, Vec::new(), "{}".to_string()),
                };

                let mut response = format!(
                    "HTTP/1.1 {} Canned\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n",
                    status,
                    body.len()
                );
                for (name, value) in headers {
                    response.push_str(&format!("{}: {}\r\n", name, value));
                }
                response.push_str("\r\n");
                response.push_str(&body);

                let _ = socket.write_all(response.as_bytes()).await;
                let _ = socket.shutdown().await;
            });
        }
    });

    let base = url::Url::parse(&format!("http://{}", addr)).unwrap();
    (base, seen)
}
