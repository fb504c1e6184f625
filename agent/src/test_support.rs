//! Scripted axum collector for source and webhook tests

use axum::extract::State;
use axum::http::{HeaderMap, Method, StatusCode, Uri};
use axum::Router;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::net::TcpListener;

#[derive(Debug, Clone, Default)]
pub struct RecordedRequest {
    pub method: String,
    pub path: String,
    pub headers: Vec<(String, String)>,
    pub body: String,
}

impl RecordedRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

struct Script {
    responses: Vec<(u16, String)>,
    delay: Duration,
    requests: Mutex<Vec<RecordedRequest>>,
}

pub struct MockServer {
    pub url: String,
    script: Arc<Script>,
}

impl MockServer {
    /// Serve `responses` in order, repeating the last one once exhausted
    pub async fn start(responses: Vec<(u16, &str)>) -> Self {
        Self::delayed(responses, Duration::ZERO).await
    }

    /// Like [`MockServer::start`], answering each request after `delay`
    pub async fn delayed(responses: Vec<(u16, &str)>, delay: Duration) -> Self {
        let script = Arc::new(Script {
            responses: responses
                .into_iter()
                .map(|(status, body)| (status, body.to_string()))
                .collect(),
            delay,
            requests: Mutex::new(Vec::new()),
        });
        let router = Router::new().fallback(respond).with_state(script.clone());

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("http://{}/targets", listener.local_addr().unwrap());
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });

        Self { url, script }
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.script.requests.lock().unwrap().clone()
    }

    pub fn hits(&self) -> usize {
        self.script.requests.lock().unwrap().len()
    }
}

async fn respond(
    State(script): State<Arc<Script>>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: String,
) -> (StatusCode, String) {
    let served = {
        let mut requests = script.requests.lock().unwrap();
        requests.push(RecordedRequest {
            method: method.to_string(),
            path: uri.path().to_string(),
            headers: headers
                .iter()
                .map(|(n, v)| (n.to_string(), v.to_str().unwrap_or_default().to_string()))
                .collect(),
            body,
        });
        requests.len() - 1
    };

    if !script.delay.is_zero() {
        tokio::time::sleep(script.delay).await;
    }

    let (status, body) = &script.responses[served.min(script.responses.len() - 1)];
    (StatusCode::from_u16(*status).unwrap(), body.clone())
}

/// URL of a port nothing listens on
pub async fn unreachable_url() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    format!("http://{}/", addr)
}
