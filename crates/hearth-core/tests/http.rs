use std::sync::Arc;

use hearth_core::http::{spawn_check, spawn_request, HttpClient, HttpRequest, HttpResponse};
use hearth_core::{tags, Machine, MachineConfig, Value};

/// Canned transport; no sockets involved.
struct FakeClient {
    result: Result<HttpResponse, String>,
}

impl HttpClient for FakeClient {
    fn fetch(&self, _request: &HttpRequest) -> Result<HttpResponse, String> {
        self.result.clone()
    }
}

fn machine() -> (tempfile::TempDir, Machine) {
    let dir = tempfile::tempdir().unwrap();
    let machine = Machine::new(&MachineConfig::with_root(dir.path().join("root"))).unwrap();
    (dir, machine)
}

#[test]
fn completed_fetch_arrives_as_http_success() {
    let (_dir, machine) = machine();
    let client = Arc::new(FakeClient {
        result: Ok(HttpResponse {
            status: 200,
            headers: vec![("content-type".to_string(), "text/plain".to_string())],
            body: b"hello from afar".to_vec(),
        }),
    });
    let worker = spawn_request(
        machine.sender(),
        client,
        HttpRequest::get("http://example.com/data"),
    )
    .unwrap();
    let event = machine.next_event(Some(tags::HTTP_SUCCESS)).unwrap();
    assert_eq!(
        event.payload[0].as_str(),
        Some("http://example.com/data")
    );
    assert_eq!(event.payload[1].as_int(), Some(200));
    assert_eq!(event.payload[2].as_str(), Some("hello from afar"));
    worker.join().unwrap();
}

#[test]
fn binary_requests_deliver_bytes() {
    let (_dir, machine) = machine();
    let client = Arc::new(FakeClient {
        result: Ok(HttpResponse {
            status: 200,
            headers: vec![],
            body: vec![0, 159, 146, 150],
        }),
    });
    let mut request = HttpRequest::get("http://example.com/blob");
    request.binary = true;
    let worker = spawn_request(machine.sender(), client, request).unwrap();
    let event = machine.next_event(Some(tags::HTTP_SUCCESS)).unwrap();
    assert_eq!(event.payload[2], Value::Bytes(vec![0, 159, 146, 150]));
    worker.join().unwrap();
}

#[test]
fn failed_fetch_arrives_as_http_failure() {
    let (_dir, machine) = machine();
    let client = Arc::new(FakeClient {
        result: Err("connection refused".to_string()),
    });
    let worker = spawn_request(
        machine.sender(),
        client,
        HttpRequest::get("http://example.com/gone"),
    )
    .unwrap();
    let event = machine.next_event(Some(tags::HTTP_FAILURE)).unwrap();
    assert_eq!(event.payload[0].as_str(), Some("http://example.com/gone"));
    assert_eq!(event.payload[1].as_str(), Some("connection refused"));
    worker.join().unwrap();
}

#[test]
fn results_after_shutdown_are_silently_dropped() {
    let (_dir, machine) = machine();
    machine.shutdown();
    let client = Arc::new(FakeClient {
        result: Ok(HttpResponse {
            status: 200,
            headers: vec![],
            body: b"nobody home".to_vec(),
        }),
    });
    let worker = spawn_request(
        machine.sender(),
        client,
        HttpRequest::get("http://example.com/late"),
    )
    .unwrap();
    worker.join().unwrap();
    assert_eq!(machine.queued_events(), 0);
}

#[test]
fn url_probe_answers_on_the_queue() {
    let (_dir, machine) = machine();
    let worker = spawn_check(machine.sender(), "http://192.168.1.1/".to_string()).unwrap();
    let event = machine.next_event(Some(tags::HTTP_CHECK)).unwrap();
    assert_eq!(event.payload[1], Value::Bool(false));
    assert_eq!(event.payload[2].as_str(), Some("Domain not permitted"));
    worker.join().unwrap();

    let worker = spawn_check(machine.sender(), "https://example.com/".to_string()).unwrap();
    let event = machine.next_event(Some(tags::HTTP_CHECK)).unwrap();
    assert_eq!(event.payload[1], Value::Bool(true));
    assert_eq!(event.payload[2], Value::Nil);
    worker.join().unwrap();
}
