//! Fetch outcome classification against a mock device.

use std::io::{Read, Write};
use std::net::TcpListener;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use supla_core::{AttemptCounter, DeviceRecord, DeviceTarget, Extractor, Fetcher};
use wiremock::matchers::{basic_auth, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

// ─────────────────────── helpers ───────────────────────

const KITCHEN_PAGE: &str = r#"<!DOCTYPE html>
<html><head><title>SUPLA</title></head>
<body>
  <h1>Kitchen</h1>
  <div class="box">
    <span>LAST STATE:Ready Firmware:GG v1.2.3 GUID:ABC123 MAC:...AA:BB:CC:DD:EE:FF...Free Mem: 28.34kB Mode: NORMAL</span>
  </div>
</body></html>"#;

fn fetcher() -> Fetcher {
    Fetcher::new(Duration::from_secs(2), Extractor::default()).unwrap()
}

/// Serve `template` on `/status` and fetch it once.
async fn fetch_with(template: ResponseTemplate) -> (DeviceRecord, String) {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/status"))
        .respond_with(template)
        .mount(&server)
        .await;

    let url = format!("{}/status", server.uri());
    let target = DeviceTarget::new(&url, "admin", "secret");
    let counter = AttemptCounter::new();
    let record = fetcher().fetch(&target, &counter).await;
    assert_eq!(counter.read(), 1);
    (record, url)
}

/// A URL nothing listens on.
fn closed_port_url() -> String {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);
    format!("http://127.0.0.1:{port}/status")
}

// ─────────────────────── success ───────────────────────

#[tokio::test]
async fn test_ok_page_is_extracted() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/status"))
        .and(basic_auth("admin", "secret"))
        .respond_with(ResponseTemplate::new(200).set_body_string(KITCHEN_PAGE))
        .expect(1)
        .mount(&server)
        .await;

    let url = format!("{}/status", server.uri());
    let counter = AttemptCounter::new();
    let record = fetcher()
        .fetch(&DeviceTarget::new(&url, "admin", "secret"), &counter)
        .await;

    assert_eq!(
        record,
        DeviceRecord {
            url,
            up: true,
            name: "Kitchen".into(),
            state: "Ready".into(),
            firmware: "v1.2.3".into(),
            guid: "ABC123".into(),
            mac: "AA:BB:CC:DD:EE:FF".into(),
            mode: "NORMAL".into(),
            free_mem_kb: 28.34,
        }
    );
    assert_eq!(counter.read(), 1);
}

#[tokio::test]
async fn test_ok_page_without_state_block_stays_up() {
    let page = "<html><body><h1>Porch</h1><span>Free Mem: 9kB</span></body></html>";
    let (record, _) = fetch_with(ResponseTemplate::new(200).set_body_string(page)).await;

    assert!(record.up);
    assert_eq!(record.name, "Porch");
    assert_eq!(record.state, "");
    assert_eq!(record.firmware, "");
    assert_eq!(record.guid, "");
    assert_eq!(record.mac, "");
    assert_eq!(record.free_mem_kb, 9.0);
}

// ─────────────────────── status codes ───────────────────────

#[tokio::test]
async fn test_unauthorized() {
    let (record, url) = fetch_with(ResponseTemplate::new(401)).await;
    assert!(!record.up);
    assert_eq!(record.url, url);
    assert_eq!(record.state, "Unauthorized - check credentials");
}

#[tokio::test]
async fn test_wrong_credentials_are_unauthorized() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(basic_auth("admin", "secret"))
        .respond_with(ResponseTemplate::new(200).set_body_string(KITCHEN_PAGE))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;

    let target = DeviceTarget::new(server.uri(), "admin", "wrong");
    let record = fetcher().fetch(&target, &AttemptCounter::new()).await;
    assert!(!record.up);
    assert_eq!(record.state, "Unauthorized - check credentials");
}

#[tokio::test]
async fn test_forbidden() {
    let (record, _) = fetch_with(ResponseTemplate::new(403)).await;
    assert!(!record.up);
    assert_eq!(record.state, "Forbidden - access denied");
}

#[tokio::test]
async fn test_not_found() {
    let (record, _) = fetch_with(ResponseTemplate::new(404)).await;
    assert!(!record.up);
    assert_eq!(record.state, "Not found - check URL");
}

#[tokio::test]
async fn test_internal_server_error() {
    let (record, _) = fetch_with(ResponseTemplate::new(500)).await;
    assert!(!record.up);
    assert_eq!(record.state, "Internal server error");
}

#[tokio::test]
async fn test_other_status_uses_url_as_name() {
    let (record, url) = fetch_with(ResponseTemplate::new(503)).await;
    assert!(!record.up);
    assert_eq!(record.name, url);
    assert_eq!(record.state, "HTTP error 503");
    assert_eq!(record.free_mem_kb, 0.0);
}

#[tokio::test]
async fn test_non_200_success_is_down() {
    let (record, _) = fetch_with(ResponseTemplate::new(204)).await;
    assert!(!record.up);
    assert_eq!(record.state, "HTTP error 204");
}

// ─────────────────────── transport and body ───────────────────────

#[tokio::test]
async fn test_connection_refused() {
    let url = closed_port_url();
    let counter = AttemptCounter::new();
    let record = fetcher()
        .fetch(&DeviceTarget::new(&url, "admin", "secret"), &counter)
        .await;

    assert!(!record.up);
    assert_eq!(record.url, url);
    assert_eq!(record.state, "");
    assert_eq!(record.name, "");
    assert_eq!(counter.read(), 1);
}

#[tokio::test]
async fn test_timeout_is_transport_failure() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(KITCHEN_PAGE)
                .set_delay(Duration::from_millis(800)),
        )
        .mount(&server)
        .await;

    let fetcher = Fetcher::new(Duration::from_millis(100), Extractor::default()).unwrap();
    let record = fetcher
        .fetch(&DeviceTarget::new(server.uri(), "admin", "secret"), &AttemptCounter::new())
        .await;

    assert!(!record.up);
    assert_eq!(record.state, "");
}

#[tokio::test]
async fn test_legacy_encoded_page_stays_up() {
    let mut body = b"<html><h1>Kuchnia \xA3\xF3d\xBC</h1>".to_vec();
    body.extend_from_slice(b"<span>LAST STATE: Ready GUID: 9</span></html>");
    let (record, _) = fetch_with(ResponseTemplate::new(200).set_body_raw(body, "text/html")).await;

    assert!(record.up);
    assert!(record.name.starts_with("Kuchnia "));
    assert_eq!(record.state, "Ready");
    assert_eq!(record.guid, "9");
}

#[tokio::test]
async fn test_binary_page_is_extraction_failure() {
    let body = b"PK\x03\x04\x00\x00firmware".to_vec();
    let (record, _) =
        fetch_with(ResponseTemplate::new(200).set_body_raw(body, "application/octet-stream")).await;

    assert!(!record.up);
    assert!(
        record.state.starts_with("Error parsing HTML: "),
        "unexpected state: {}",
        record.state
    );
}

// ─────────────────────── body read ───────────────────────

/// Serve one raw response per connection, in order, and record each
/// request line. Every connection is closed after its response.
fn raw_device(responses: Vec<&'static [u8]>) -> (String, Arc<Mutex<Vec<String>>>) {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let url = format!("http://{}/", listener.local_addr().unwrap());
    let requests = Arc::new(Mutex::new(Vec::new()));

    let seen = requests.clone();
    std::thread::spawn(move || {
        for response in responses {
            let Ok((mut stream, _)) = listener.accept() else {
                return;
            };
            let mut head = Vec::new();
            let mut buf = [0u8; 1024];
            while !head.windows(4).any(|w| w == b"\r\n\r\n") {
                match stream.read(&mut buf) {
                    Ok(0) | Err(_) => break,
                    Ok(n) => head.extend_from_slice(&buf[..n]),
                }
            }
            let head = String::from_utf8_lossy(&head);
            let line = head.lines().next().unwrap_or_default().to_string();
            seen.lock().unwrap().push(line);

            let _ = stream.write_all(response);
            let _ = stream.flush();
        }
    });

    (url, requests)
}

#[tokio::test]
async fn test_malformed_chunked_body_is_retried_once() {
    let (url, requests) = raw_device(vec![
        b"HTTP/1.1 200 OK\r\nTransfer-Encoding: chunked\r\nConnection: close\r\n\r\nzz\r\n<h1>Kitchen</h1>\r\n0\r\n\r\n" as &[u8],
        b"HTTP/1.0 200 OK\r\nContent-Length: 54\r\nConnection: close\r\n\r\n<h1>Kitchen</h1><span>LAST STATE: Ready GUID: 7</span>",
    ]);
    let target = DeviceTarget::new(&url, "admin", "secret");
    let counter = AttemptCounter::new();

    let record = fetcher().fetch(&target, &counter).await;

    assert!(record.up, "unexpected record: {record:?}");
    assert_eq!(record.name, "Kitchen");
    assert_eq!(record.state, "Ready");
    assert_eq!(record.guid, "7");
    assert_eq!(counter.read(), 1);

    let requests = requests.lock().unwrap().clone();
    assert_eq!(requests.len(), 2);
    assert!(requests[0].ends_with("HTTP/1.1"), "first request: {}", requests[0]);
    assert!(requests[1].ends_with("HTTP/1.0"), "retry request: {}", requests[1]);
}

#[tokio::test]
async fn test_truncated_body_is_timeout() {
    let (url, requests) = raw_device(vec![
        b"HTTP/1.1 200 OK\r\nContent-Length: 1000\r\nConnection: close\r\n\r\n<h1>Kitch" as &[u8],
    ]);
    let target = DeviceTarget::new(&url, "admin", "secret");
    let counter = AttemptCounter::new();

    let record = fetcher().fetch(&target, &counter).await;

    assert!(!record.up);
    assert_eq!(record.state, "Timeout");
    assert_eq!(record.mode, "ERROR");
    assert_eq!(counter.read(), 1);
    assert_eq!(requests.lock().unwrap().len(), 1);
}
