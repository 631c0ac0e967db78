//! In-memory transport for tests: scripted responses keyed by method and URL.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use serde_json::Value;

use crate::http::{HttpMethod, HttpRequest, HttpResponse, HttpTransport, RequestFailure};

type Reply = Result<HttpResponse, RequestFailure>;
type Responder = Box<dyn Fn(&HttpRequest) -> Reply + Send + Sync>;

/// Unknown routes answer 404. A route scripted with several replies plays them
/// in order and then keeps repeating the last one. Responder routes compute the
/// reply from the request (query, body) and take precedence over fixed replies.
#[derive(Default)]
pub struct ScriptedTransport {
    routes: Mutex<HashMap<(HttpMethod, String), VecDeque<Reply>>>,
    responders: Mutex<HashMap<(HttpMethod, String), Responder>>,
    requests: Mutex<Vec<HttpRequest>>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn route(&self, method: HttpMethod, url: &str, reply: Reply) -> &Self {
        self.route_sequence(method, url, vec![reply])
    }

    pub fn route_sequence(&self, method: HttpMethod, url: &str, replies: Vec<Reply>) -> &Self {
        self.routes
            .lock()
            .expect("scripted routes lock poisoned")
            .insert((method, url.to_string()), replies.into_iter().collect());
        self
    }

    pub fn route_with<F>(&self, method: HttpMethod, url: &str, responder: F) -> &Self
    where
        F: Fn(&HttpRequest) -> Reply + Send + Sync + 'static,
    {
        self.responders
            .lock()
            .expect("scripted responders lock poisoned")
            .insert((method, url.to_string()), Box::new(responder));
        self
    }

    pub fn requests(&self) -> Vec<HttpRequest> {
        self.requests
            .lock()
            .expect("scripted requests lock poisoned")
            .clone()
    }

    pub fn count(&self, method: HttpMethod, url: &str) -> usize {
        self.requests()
            .iter()
            .filter(|request| request.method == method && request.url == url)
            .count()
    }

    pub fn count_prefix(&self, method: HttpMethod, url_prefix: &str) -> usize {
        self.requests()
            .iter()
            .filter(|request| request.method == method && request.url.starts_with(url_prefix))
            .count()
    }
}

impl HttpTransport for ScriptedTransport {
    fn send(&self, request: &HttpRequest) -> Result<HttpResponse, RequestFailure> {
        self.requests
            .lock()
            .expect("scripted requests lock poisoned")
            .push(request.clone());

        let key = (request.method, request.url.clone());
        if let Some(responder) = self
            .responders
            .lock()
            .expect("scripted responders lock poisoned")
            .get(&key)
        {
            return responder(request);
        }

        let mut routes = self.routes.lock().expect("scripted routes lock poisoned");
        let Some(replies) = routes.get_mut(&key) else {
            return Ok(status(404));
        };
        if replies.len() > 1 {
            if let Some(reply) = replies.pop_front() {
                return reply;
            }
        }
        replies.front().cloned().unwrap_or_else(|| Ok(status(404)))
    }
}

pub fn status(code: u16) -> HttpResponse {
    HttpResponse {
        status: code,
        ..HttpResponse::default()
    }
}

pub fn image_head(content_type: &str, size_bytes: u64) -> Reply {
    Ok(HttpResponse {
        status: 200,
        content_type: Some(content_type.to_string()),
        content_length: Some(size_bytes),
        body: Vec::new(),
    })
}

pub fn json(value: Value) -> Reply {
    Ok(HttpResponse {
        status: 200,
        content_type: Some("application/json".to_string()),
        content_length: None,
        body: value.to_string().into_bytes(),
    })
}

pub fn html(body: &str) -> Reply {
    Ok(HttpResponse {
        status: 200,
        content_type: Some("text/html; charset=utf-8".to_string()),
        content_length: Some(body.len() as u64),
        body: body.as_bytes().to_vec(),
    })
}

pub fn text(body: &str) -> Reply {
    Ok(HttpResponse {
        status: 200,
        content_type: Some("text/plain".to_string()),
        content_length: Some(body.len() as u64),
        body: body.as_bytes().to_vec(),
    })
}

pub fn bytes(content_type: &str, body: &[u8]) -> Reply {
    Ok(HttpResponse {
        status: 200,
        content_type: Some(content_type.to_string()),
        content_length: Some(body.len() as u64),
        body: body.to_vec(),
    })
}
