use std::fs;
use std::io::{BufRead, BufReader, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use assert_matches::assert_matches;
use camino::{Utf8Path, Utf8PathBuf};

use air_downloader::config::ClientConfig;
use air_downloader::error::AirError;
use air_downloader::fetch::{AssetClient, HttpAssetClient};

const TOKEN: &str = "secret-token";
const AGENT: &str = "air-dl-tests";

#[derive(Debug, Clone)]
struct Request {
    method: String,
    path: String,
    /// Header lines, lowercased.
    headers: Vec<String>,
}

impl Request {
    fn has_header(&self, name: &str, value: &str) -> bool {
        let line = format!("{}: {}", name, value).to_ascii_lowercase();
        self.headers.iter().any(|header| *header == line)
    }
}

type Handler = dyn Fn(&Request, &mut TcpStream) + Send + Sync;

/// One-connection-at-a-time HTTP/1.1 stub; every response closes its connection.
struct StubServer {
    base: String,
    requests: Arc<Mutex<Vec<Request>>>,
}

impl StubServer {
    fn start(handler: impl Fn(&Request, &mut TcpStream) + Send + Sync + 'static) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let base = format!("http://{}", listener.local_addr().unwrap());
        let requests = Arc::new(Mutex::new(Vec::new()));
        let log = Arc::clone(&requests);
        let handler: Arc<Handler> = Arc::new(handler);
        thread::spawn(move || {
            for stream in listener.incoming() {
                let Ok(mut stream) = stream else { break };
                let Some(request) = read_request(&stream) else {
                    continue;
                };
                log.lock().unwrap().push(request.clone());
                handler(&request, &mut stream);
            }
        });
        Self { base, requests }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base, path)
    }

    fn requests(&self) -> Vec<Request> {
        self.requests.lock().unwrap().clone()
    }
}

fn read_request(stream: &TcpStream) -> Option<Request> {
    let mut reader = BufReader::new(stream);
    let mut line = String::new();
    reader.read_line(&mut line).ok()?;
    let mut parts = line.split_whitespace();
    let method = parts.next()?.to_string();
    let path = parts.next()?.to_string();
    let mut headers = Vec::new();
    loop {
        let mut header = String::new();
        if reader.read_line(&mut header).ok()? == 0 {
            break;
        }
        let header = header.trim_end();
        if header.is_empty() {
            break;
        }
        headers.push(header.to_ascii_lowercase());
    }
    Some(Request {
        method,
        path,
        headers,
    })
}

fn respond(stream: &mut TcpStream, status: &str, headers: &[(&str, &str)], body: &[u8]) {
    let mut head = format!("HTTP/1.1 {status}\r\nConnection: close\r\n");
    for (name, value) in headers {
        head.push_str(&format!("{name}: {value}\r\n"));
    }
    head.push_str(&format!("Content-Length: {}\r\n\r\n", body.len()));
    let _ = stream.write_all(head.as_bytes());
    let _ = stream.write_all(body);
    let _ = stream.flush();
}

fn client(fetch_timeout: Duration) -> HttpAssetClient {
    let mut config = ClientConfig::new(TOKEN)
        .with_user_agent(AGENT)
        .with_pre_fetch_delay(Duration::ZERO);
    config.fetch_timeout = fetch_timeout;
    config.probe_timeout = Duration::from_secs(5);
    HttpAssetClient::new(&config).unwrap()
}

fn scratch_dir() -> (tempfile::TempDir, Utf8PathBuf) {
    let temp = tempfile::tempdir().unwrap();
    let dir = Utf8PathBuf::from_path_buf(temp.path().to_path_buf()).unwrap();
    (temp, dir)
}

fn entries(dir: &Utf8Path) -> Vec<String> {
    fs::read_dir(dir.as_std_path())
        .unwrap()
        .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
        .collect()
}

#[test]
fn head_disposition_names_the_file() {
    let server = StubServer::start(|request, stream| {
        assert_eq!(request.method, "HEAD");
        respond(
            stream,
            "200 OK",
            &[("Content-Disposition", r#"attachment; filename="style.safetensors""#)],
            b"",
        );
    });

    let name = client(Duration::from_secs(5))
        .probe_filename(&server.url("/api/download/models/1"))
        .unwrap();

    assert_eq!(name, "style.safetensors");
    let requests = server.requests();
    assert_eq!(requests.len(), 1);
    assert!(requests[0].has_header("authorization", &format!("Bearer {TOKEN}")));
    assert!(requests[0].has_header("user-agent", AGENT));
}

#[test]
fn rejected_head_falls_back_to_get() {
    let server = StubServer::start(|request, stream| match request.method.as_str() {
        "HEAD" => respond(stream, "405 Method Not Allowed", &[], b""),
        _ => respond(
            stream,
            "200 OK",
            &[("Content-Disposition", "attachment; filename=model.ckpt")],
            b"payload",
        ),
    });

    let name = client(Duration::from_secs(5))
        .probe_filename(&server.url("/files/42"))
        .unwrap();

    assert_eq!(name, "model.ckpt");
    let requests = server.requests();
    let methods: Vec<&str> = requests.iter().map(|r| r.method.as_str()).collect();
    assert_eq!(methods, ["HEAD", "GET"]);
    for request in &requests {
        assert!(request.has_header("authorization", &format!("Bearer {TOKEN}")));
        assert!(request.has_header("user-agent", AGENT));
    }
}

#[test]
fn failing_get_fallback_is_an_http_status() {
    let server = StubServer::start(|_, stream| respond(stream, "404 Not Found", &[], b""));

    let err = client(Duration::from_secs(5))
        .probe_filename(&server.url("/missing"))
        .unwrap_err();

    assert_matches!(err, AirError::HttpStatus { status: 404, ref url } if url.ends_with("/missing"));
    assert_eq!(server.requests().len(), 2);
}

#[test]
fn redirect_target_names_the_file() {
    let server = StubServer::start(|request, stream| match request.path.as_str() {
        "/api/download/models/7" => respond(
            stream,
            "302 Found",
            &[("Location", "/cdn/files/real-name.bin?sig=abc")],
            b"",
        ),
        _ => respond(stream, "200 OK", &[], b""),
    });

    let name = client(Duration::from_secs(5))
        .probe_filename(&server.url("/api/download/models/7"))
        .unwrap();

    assert_eq!(name, "real-name.bin");
    let requests = server.requests();
    assert_eq!(requests.len(), 2);
    assert!(requests[1].has_header("authorization", &format!("Bearer {TOKEN}")));
}

#[test]
fn download_streams_body_into_place() {
    let server = StubServer::start(|_, stream| respond(stream, "200 OK", &[], b"0123456789"));
    let (_temp, dir) = scratch_dir();
    let destination = dir.join("a.bin");

    let written = client(Duration::from_secs(5))
        .download(&server.url("/a.bin"), &destination)
        .unwrap();

    assert_eq!(written, 10);
    assert_eq!(fs::read(destination.as_std_path()).unwrap(), b"0123456789");
    assert_eq!(entries(&dir), ["a.bin"]);
    assert!(server.requests()[0].has_header("authorization", &format!("Bearer {TOKEN}")));
}

#[test]
fn slow_steady_body_outlives_the_timeout() {
    // 32 bytes in 4-byte chunks every 250 ms: about 2 s in total, never idle for 1 s.
    let server = StubServer::start(|_, stream| {
        let head = "HTTP/1.1 200 OK\r\nConnection: close\r\nContent-Length: 32\r\n\r\n";
        let _ = stream.write_all(head.as_bytes());
        for _ in 0..8 {
            let _ = stream.write_all(b"abcd");
            let _ = stream.flush();
            thread::sleep(Duration::from_millis(250));
        }
    });
    let (_temp, dir) = scratch_dir();
    let destination = dir.join("slow.bin");

    let written = client(Duration::from_secs(1))
        .download(&server.url("/slow.bin"), &destination)
        .unwrap();

    assert_eq!(written, 32);
    assert_eq!(fs::metadata(destination.as_std_path()).unwrap().len(), 32);
}

#[test]
fn stalled_body_leaves_nothing_behind() {
    let server = StubServer::start(|_, stream| {
        let head = "HTTP/1.1 200 OK\r\nConnection: close\r\nContent-Length: 32\r\n\r\n";
        let _ = stream.write_all(head.as_bytes());
        let _ = stream.write_all(b"abcd");
        let _ = stream.flush();
        thread::sleep(Duration::from_secs(3));
    });
    let (_temp, dir) = scratch_dir();
    let destination = dir.join("stalled.bin");

    let err = client(Duration::from_secs(1))
        .download(&server.url("/stalled.bin"), &destination)
        .unwrap_err();

    assert_matches!(err, AirError::Http(_));
    assert!(!destination.exists());
    assert!(entries(&dir).is_empty(), "leftovers: {:?}", entries(&dir));
}

#[test]
fn truncated_body_leaves_nothing_behind() {
    let server = StubServer::start(|_, stream| {
        let head = "HTTP/1.1 200 OK\r\nConnection: close\r\nContent-Length: 64\r\n\r\n";
        let _ = stream.write_all(head.as_bytes());
        let _ = stream.write_all(b"only part of it");
        let _ = stream.flush();
    });
    let (_temp, dir) = scratch_dir();
    let destination = dir.join("cut.bin");

    let err = client(Duration::from_secs(5))
        .download(&server.url("/cut.bin"), &destination)
        .unwrap_err();

    assert_matches!(err, AirError::Http(_));
    assert!(!destination.exists());
    assert!(entries(&dir).is_empty(), "leftovers: {:?}", entries(&dir));
}

#[test]
fn non_success_download_writes_nothing() {
    let server = StubServer::start(|_, stream| respond(stream, "403 Forbidden", &[], b"denied"));
    let (_temp, dir) = scratch_dir();
    let destination = dir.join("denied.bin");

    let err = client(Duration::from_secs(5))
        .download(&server.url("/denied.bin"), &destination)
        .unwrap_err();

    assert_matches!(err, AirError::HttpStatus { status: 403, .. });
    assert!(entries(&dir).is_empty());
}
