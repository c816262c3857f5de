//! Drives `InferenceClient` against a one-request HTTP stub on localhost.

use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use voxchat_app::{ClientConfig, ClientError, InferenceClient};
use voxchat_core::{encode, ChunkBuffer, EncodedAudio, SampleChunk, SampleRate};

/// What the stub saw on the wire.
struct Captured {
    head: String,
    body: Vec<u8>,
}

impl Captured {
    fn body_text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    fn header(&self, name: &str) -> Option<String> {
        self.head.lines().find_map(|line| {
            let (key, value) = line.split_once(':')?;
            key.trim()
                .eq_ignore_ascii_case(name)
                .then(|| value.trim().to_string())
        })
    }
}

/// Serve exactly one request with `status` and `json`, returning what was received.
fn serve_once(status: &'static str, json: &'static str) -> (String, JoinHandle<Captured>) {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind stub");
    let url = format!("http://{}", listener.local_addr().expect("addr"));
    let handle = thread::spawn(move || {
        let (mut stream, _) = listener.accept().expect("accept");
        let captured = read_request(&mut stream);
        let response = format!(
            "HTTP/1.1 {status}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{json}",
            json.len()
        );
        stream.write_all(response.as_bytes()).expect("write response");
        captured
    });
    (url, handle)
}

fn read_request(stream: &mut TcpStream) -> Captured {
    stream
        .set_read_timeout(Some(Duration::from_secs(5)))
        .expect("timeout");
    let mut raw = Vec::new();
    let mut buf = [0u8; 8192];

    let head_end = loop {
        let n = stream.read(&mut buf).expect("read head");
        assert!(n > 0, "client closed before sending headers");
        raw.extend_from_slice(&buf[..n]);
        if let Some(pos) = find(&raw, b"\r\n\r\n") {
            break pos + 4;
        }
    };
    let head = String::from_utf8_lossy(&raw[..head_end]).into_owned();
    let mut captured = Captured {
        head,
        body: raw[head_end..].to_vec(),
    };

    match captured.header("content-length") {
        Some(len) => {
            let len: usize = len.parse().expect("content-length");
            while captured.body.len() < len {
                let n = stream.read(&mut buf).expect("read body");
                assert!(n > 0, "short body");
                captured.body.extend_from_slice(&buf[..n]);
            }
        }
        None if captured.header("transfer-encoding").is_some() => {
            while find(&captured.body, b"0\r\n\r\n").is_none() {
                let n = stream.read(&mut buf).expect("read chunked body");
                assert!(n > 0, "short chunked body");
                captured.body.extend_from_slice(&buf[..n]);
            }
        }
        None => {}
    }
    captured
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}

fn client(url: String, token: Option<&str>) -> InferenceClient {
    InferenceClient::new(&ClientConfig {
        base_url: url,
        auth_token: token.map(str::to_string),
        timeout: Duration::from_secs(5),
    })
    .expect("build client")
}

fn sample_audio() -> EncodedAudio {
    let mut buffer = ChunkBuffer::new();
    buffer.push(SampleChunk::new(vec![0.0, 0.5, -0.5, 1.0]));
    encode(&buffer, SampleRate::default()).expect("encode")
}

#[test]
fn chat_uploads_wav_and_text_as_multipart() {
    let (url, server) = serve_once(
        "200 OK",
        r#"{"user_text":"hello","reply_text":"hi!","emotion":"happy","confidence":0.9,"audio_url":"/static/r.wav"}"#,
    );

    let reply = client(url, Some("secret"))
        .chat(&sample_audio(), "  hello  ")
        .expect("chat");
    let seen = server.join().expect("stub thread");

    assert!(seen.head.starts_with("POST /chat "), "{}", seen.head);
    assert_eq!(seen.header("authorization").as_deref(), Some("Bearer secret"));
    assert!(seen
        .header("content-type")
        .is_some_and(|ct| ct.starts_with("multipart/form-data")));

    let body = seen.body_text();
    assert!(body.contains(r#"name="file"; filename="audio.wav""#), "{body}");
    assert!(body.contains("Content-Type: audio/wav"), "{body}");
    assert!(body.contains("RIFF"));
    assert!(body.contains(r#"name="text""#));
    assert!(body.contains("\r\n\r\nhello\r\n"), "text should be trimmed: {body}");

    assert_eq!(reply.reply_text, "hi!");
    assert_eq!(reply.emotion, "happy");
    assert_eq!(reply.audio_url.as_deref(), Some("/static/r.wav"));
}

#[test]
fn emotion_request_omits_text_and_auth_when_unset() {
    let (url, server) = serve_once(
        "200 OK",
        r#"{"emotion":"sad","confidence":0.7,"all_emotions":{"sad":0.7,"neutral":0.3}}"#,
    );

    let result = client(url, None)
        .detect_emotion(&sample_audio())
        .expect("emotion");
    let seen = server.join().expect("stub thread");

    assert!(seen.head.starts_with("POST /emotion "), "{}", seen.head);
    assert!(seen.header("authorization").is_none());
    let body = seen.body_text();
    assert!(body.contains(r#"filename="audio.wav""#));
    assert!(!body.contains(r#"name="text""#));

    assert_eq!(result.emotion, "sad");
    assert_eq!(result.all_emotions.len(), 2);
}

#[test]
fn non_success_status_carries_backend_detail() {
    let (url, server) = serve_once("400 Bad Request", r#"{"detail":"Audio file is empty"}"#);

    let err = client(url, None)
        .chat(&sample_audio(), "hi")
        .expect_err("400 should fail");
    server.join().expect("stub thread");

    match err {
        ClientError::Status { status, detail } => {
            assert_eq!(status, 400);
            assert_eq!(detail, "Audio file is empty");
        }
        other => panic!("expected status error, got {other:?}"),
    }
}

#[test]
fn health_reads_status() {
    let (url, server) = serve_once("200 OK", r#"{"status":"ok"}"#);

    let health = client(url, None).health().expect("health");
    let seen = server.join().expect("stub thread");

    assert!(seen.head.starts_with("GET /health "));
    assert_eq!(health.status, "ok");
}

#[test]
fn blank_chat_text_fails_without_a_request() {
    // Nothing listens here; a request would fail with Http, not EmptyText.
    let err = client("http://127.0.0.1:9".into(), None)
        .chat(&sample_audio(), " \n ")
        .expect_err("blank text");
    assert!(matches!(err, ClientError::EmptyText));
}
