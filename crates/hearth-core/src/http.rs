use std::io::{self, Read as _};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crate::bridge::EventSender;
use crate::event::{tags, Event, Value};

/// Hosts a request is never allowed to reach, by literal match. The same
/// coarse screen the emulated machine always applied.
const DENIED_HOST_PATTERNS: [&str; 2] = ["192.168.", "10.0."];

#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub url: String,
    /// Explicit verb; defaults to POST when a body is present, GET
    /// otherwise.
    pub method: Option<String>,
    pub body: Option<Vec<u8>>,
    pub headers: Vec<(String, String)>,
    /// Binary responses are delivered as bytes, text ones as a lossy
    /// string.
    pub binary: bool,
}

impl HttpRequest {
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            method: None,
            body: None,
            headers: Vec::new(),
            binary: false,
        }
    }

    pub fn effective_method(&self) -> String {
        match &self.method {
            Some(m) => m.to_ascii_uppercase(),
            None if self.body.is_some() => "POST".to_string(),
            None => "GET".to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

/// The wire client seam. The scheduler core only cares that a completed
/// result comes back; swapping the transport (or faking it in tests) means
/// implementing this.
pub trait HttpClient: Send + Sync {
    fn fetch(&self, request: &HttpRequest) -> Result<HttpResponse, String>;
}

/// Default transport: blocking ureq agent, 15 second global timeout,
/// redirects followed, HTTP error statuses delivered as responses rather
/// than errors.
pub struct UreqClient {
    agent: ureq::Agent,
}

impl UreqClient {
    pub fn new() -> Self {
        let agent: ureq::Agent = ureq::Agent::config_builder()
            .timeout_global(Some(Duration::from_secs(15)))
            .http_status_as_error(false)
            .build()
            .into();
        Self { agent }
    }
}

impl Default for UreqClient {
    fn default() -> Self {
        Self::new()
    }
}

impl HttpClient for UreqClient {
    fn fetch(&self, request: &HttpRequest) -> Result<HttpResponse, String> {
        let url = request.url.as_str();
        let method = request.effective_method();
        let result = match method.as_str() {
            "GET" | "HEAD" | "DELETE" => {
                let mut builder = match method.as_str() {
                    "GET" => self.agent.get(url),
                    "HEAD" => self.agent.head(url),
                    _ => self.agent.delete(url),
                };
                for (name, value) in &request.headers {
                    builder = builder.header(name.as_str(), value.as_str());
                }
                builder.call()
            }
            "POST" | "PUT" | "PATCH" => {
                let mut builder = match method.as_str() {
                    "POST" => self.agent.post(url),
                    "PUT" => self.agent.put(url),
                    _ => self.agent.patch(url),
                };
                for (name, value) in &request.headers {
                    builder = builder.header(name.as_str(), value.as_str());
                }
                builder.send(request.body.as_deref().unwrap_or_default())
            }
            other => return Err(format!("unsupported method {other}")),
        };
        let resp = result.map_err(|e| format!("{e}"))?;
        let status: u16 = resp.status().into();
        let headers = resp
            .headers()
            .iter()
            .map(|(name, value)| {
                (
                    name.as_str().to_string(),
                    String::from_utf8_lossy(value.as_bytes()).into_owned(),
                )
            })
            .collect();
        let mut body = Vec::new();
        resp.into_body()
            .into_reader()
            .read_to_end(&mut body)
            .map_err(|e| format!("{e}"))?;
        Ok(HttpResponse {
            status,
            headers,
            body,
        })
    }
}

/// Static screen applied before any request goes out.
pub fn check_url(url: &str) -> Result<(), &'static str> {
    if !url.contains("://") {
        return Err("URL malformed");
    }
    if !url.starts_with("http://") && !url.starts_with("https://") {
        return Err("URL not http");
    }
    if DENIED_HOST_PATTERNS.iter().any(|p| url.contains(p)) {
        return Err("Domain not permitted");
    }
    Ok(())
}

/// Answers a guest's URL probe with an `"http_check"` event.
pub fn spawn_check(sender: EventSender, url: String) -> io::Result<thread::JoinHandle<()>> {
    thread::Builder::new()
        .name("hearth-http-check".to_string())
        .spawn(move || {
            let verdict = check_url(&url);
            let event = Event::new(
                tags::HTTP_CHECK,
                vec![
                    Value::Str(url),
                    Value::Bool(verdict.is_ok()),
                    match verdict {
                        Ok(()) => Value::Nil,
                        Err(reason) => Value::Str(reason.to_string()),
                    },
                ],
            );
            sender.send_with(move || event);
        })
}

/// Runs one request on its own worker thread, fire-and-forget. The outcome
/// lands on the queue as `"http_success"` (url, status, body) or
/// `"http_failure"` (url, message); a result completing after shutdown is
/// dropped on the floor by the bridge, with no retry and no error.
pub fn spawn_request(
    sender: EventSender,
    client: Arc<dyn HttpClient>,
    request: HttpRequest,
) -> io::Result<thread::JoinHandle<()>> {
    thread::Builder::new()
        .name("hearth-http".to_string())
        .spawn(move || {
            let event = match client.fetch(&request) {
                Ok(response) => {
                    let body = if request.binary {
                        Value::Bytes(response.body)
                    } else {
                        Value::Str(String::from_utf8_lossy(&response.body).into_owned())
                    };
                    Event::new(
                        tags::HTTP_SUCCESS,
                        vec![
                            Value::Str(request.url.clone()),
                            Value::Int(response.status as i64),
                            body,
                        ],
                    )
                }
                Err(message) => Event::new(
                    tags::HTTP_FAILURE,
                    vec![Value::Str(request.url.clone()), Value::Str(message)],
                ),
            };
            if !sender.send_with(move || event) {
                log::debug!("dropping http result for {} after shutdown", request.url);
            }
        })
}

#[cfg(test)]
mod tests {
    use super::{check_url, HttpRequest};

    #[test]
    fn check_url_screens_scheme_and_hosts() {
        assert!(check_url("https://example.com/a").is_ok());
        assert!(check_url("http://example.com").is_ok());
        assert_eq!(check_url("example.com"), Err("URL malformed"));
        assert_eq!(check_url("ftp://example.com"), Err("URL not http"));
        assert_eq!(
            check_url("http://192.168.1.4/admin"),
            Err("Domain not permitted")
        );
        assert_eq!(check_url("http://10.0.0.9/"), Err("Domain not permitted"));
    }

    #[test]
    fn method_defaults_follow_the_body() {
        let mut req = HttpRequest::get("http://example.com");
        assert_eq!(req.effective_method(), "GET");
        req.body = Some(b"payload".to_vec());
        assert_eq!(req.effective_method(), "POST");
        req.method = Some("put".to_string());
        assert_eq!(req.effective_method(), "PUT");
    }
}
