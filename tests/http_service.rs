//! `HttpOcrService` against a minimal HTTP/1.1 server on a loopback port.

use futures::StreamExt;
use pdfocr::pipeline::recognize::{HttpOcrService, OcrRequest, OcrService, Recognizer};
use pdfocr::{Category, OcrConfig, PageError, PdfOcrError};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;

/// A canned reply for one connection.
#[derive(Clone)]
enum Canned {
    /// Fixed-length body.
    Full { status: u16, body: String },
    /// Chunked body, one chunk per entry, with a pause between chunks.
    Chunked { chunks: Vec<Vec<u8>>, pause_ms: u64 },
    /// Accept the request and never answer.
    Silent,
}

struct Captured {
    request_line: String,
    body: String,
}

/// Serve `replies` in order, one per connection, reporting each request.
async fn serve(replies: Vec<Canned>) -> (String, mpsc::UnboundedReceiver<Captured>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let base = format!("http://{}", listener.local_addr().unwrap());
    let (tx, rx) = mpsc::unbounded_channel();

    tokio::spawn(async move {
        for reply in replies {
            let Ok((mut socket, _)) = listener.accept().await else {
                return;
            };
            let captured = read_request(&mut socket).await;
            let _ = tx.send(captured);
            write_reply(&mut socket, reply).await;
        }
    });

    (base, rx)
}

async fn read_request(socket: &mut TcpStream) -> Captured {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];
    let head_end = loop {
        let n = socket.read(&mut chunk).await.unwrap();
        assert!(n > 0, "client closed before sending headers");
        buf.extend_from_slice(&chunk[..n]);
        if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
            break pos + 4;
        }
    };

    let head = String::from_utf8_lossy(&buf[..head_end]).to_string();
    let length = head
        .lines()
        .find_map(|l| {
            let (name, value) = l.split_once(':')?;
            name.eq_ignore_ascii_case("content-length")
                .then(|| value.trim().parse::<usize>().ok())
                .flatten()
        })
        .unwrap_or(0);

    while buf.len() < head_end + length {
        let n = socket.read(&mut chunk).await.unwrap();
        if n == 0 {
            break;
        }
        buf.extend_from_slice(&chunk[..n]);
    }

    Captured {
        request_line: head.lines().next().unwrap_or_default().to_string(),
        body: String::from_utf8_lossy(&buf[head_end..]).to_string(),
    }
}

async fn write_reply(socket: &mut TcpStream, reply: Canned) {
    match reply {
        Canned::Full { status, body } => {
            let head = format!(
                "HTTP/1.1 {status} X\r\ncontent-type: application/json\r\n\
                 content-length: {}\r\nconnection: close\r\n\r\n",
                body.len()
            );
            let _ = socket.write_all(head.as_bytes()).await;
            let _ = socket.write_all(body.as_bytes()).await;
        }
        Canned::Chunked { chunks, pause_ms } => {
            let head = "HTTP/1.1 200 OK\r\ncontent-type: application/x-ndjson\r\n\
                        transfer-encoding: chunked\r\nconnection: close\r\n\r\n";
            let _ = socket.write_all(head.as_bytes()).await;
            for c in chunks {
                let _ = socket.write_all(format!("{:x}\r\n", c.len()).as_bytes()).await;
                let _ = socket.write_all(&c).await;
                let _ = socket.write_all(b"\r\n").await;
                let _ = socket.flush().await;
                tokio::time::sleep(Duration::from_millis(pause_ms)).await;
            }
            let _ = socket.write_all(b"0\r\n\r\n").await;
        }
        Canned::Silent => {
            tokio::time::sleep(Duration::from_secs(30)).await;
        }
    }
    let _ = socket.shutdown().await;
}

fn full(status: u16, body: &str) -> Canned {
    Canned::Full {
        status,
        body: body.to_string(),
    }
}

fn request() -> OcrRequest {
    OcrRequest::new("aGVsbG8=".into(), &OcrConfig::default())
}

// ── /health ──────────────────────────────────────────────────────────────────

#[tokio::test]
async fn health_ok_when_model_loaded() {
    let (base, mut rx) = serve(vec![full(200, r#"{"status":"ok","model_loaded":true}"#)]).await;
    let service = HttpOcrService::new(&base, 5, 5).unwrap();

    service.health().await.unwrap();
    let req = rx.recv().await.unwrap();
    assert!(req.request_line.starts_with("GET /health "), "{}", req.request_line);
}

#[tokio::test]
async fn health_fails_when_model_not_loaded() {
    let (base, _rx) = serve(vec![full(200, r#"{"model_loaded":false}"#)]).await;
    let service = HttpOcrService::new(&base, 5, 5).unwrap();

    match service.health().await {
        Err(PdfOcrError::ServiceUnavailable { url, reason }) => {
            assert_eq!(url, format!("{base}/health"));
            assert!(reason.contains("not loaded"), "{reason}");
        }
        other => panic!("expected ServiceUnavailable, got {other:?}"),
    }
}

#[tokio::test]
async fn health_fails_on_error_status_and_bad_body() {
    let (base, _rx) = serve(vec![
        full(503, r#"{"model_loaded":true}"#),
        full(200, "not json"),
        full(200, r#"{"status":"ok"}"#),
    ])
    .await;
    let service = HttpOcrService::new(&base, 5, 5).unwrap();

    for _ in 0..3 {
        assert!(matches!(
            service.health().await,
            Err(PdfOcrError::ServiceUnavailable { .. })
        ));
    }
}

#[tokio::test]
async fn health_fails_when_nothing_listens() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let base = format!("http://{}", listener.local_addr().unwrap());
    drop(listener);

    let service = HttpOcrService::new(&base, 2, 2).unwrap();
    assert!(matches!(
        service.health().await,
        Err(PdfOcrError::ServiceUnavailable { .. })
    ));
}

#[tokio::test]
async fn trailing_slash_in_base_url_is_ignored() {
    let (base, mut rx) = serve(vec![full(200, r#"{"model_loaded":true}"#)]).await;
    let service = HttpOcrService::new(format!("{base}/"), 5, 5).unwrap();
    assert_eq!(service.base_url(), base);

    service.health().await.unwrap();
    assert!(rx.recv().await.unwrap().request_line.starts_with("GET /health "));
}

// ── /ocr ─────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn ocr_posts_request_fields() {
    let (base, mut rx) = serve(vec![Canned::Chunked {
        chunks: vec![b"{\"response\":\"[]\",\"done\":true}\n".to_vec()],
        pause_ms: 0,
    }])
    .await;
    let service = HttpOcrService::new(&base, 5, 5).unwrap();

    let lines: Vec<_> = service.stream_ocr(1, &request()).await.unwrap().collect().await;
    assert_eq!(lines.len(), 1);

    let req = rx.recv().await.unwrap();
    assert!(req.request_line.starts_with("POST /ocr "), "{}", req.request_line);
    let body: serde_json::Value = serde_json::from_str(&req.body).unwrap();
    assert_eq!(body["image"], "aGVsbG8=");
    assert_eq!(body["prompt_type"], "prompt_layout_all_en");
    assert_eq!(body["stream"], true);
    assert_eq!(body["max_new_tokens"], 12_000);
}

#[tokio::test]
async fn ocr_error_status_is_a_page_error() {
    let (base, _rx) = serve(vec![full(500, r#"{"error":"boom"}"#)]).await;
    let service = HttpOcrService::new(&base, 5, 5).unwrap();

    match service.stream_ocr(4, &request()).await {
        Err(e) => assert_eq!(e, PageError::HttpStatus { page: 4, status: 500 }),
        Ok(_) => panic!("expected an HTTP status error"),
    }
}

#[tokio::test]
async fn ocr_timeout_is_reported_as_timeout() {
    let (base, _rx) = serve(vec![Canned::Silent]).await;
    let service = HttpOcrService::new(&base, 1, 1).unwrap();

    match service.stream_ocr(2, &request()).await {
        Err(e) => assert_eq!(e, PageError::Timeout { page: 2, secs: 1 }),
        Ok(_) => panic!("expected a timeout"),
    }
}

#[tokio::test]
async fn recognizer_assembles_lines_split_across_chunks() {
    // Fragments of the block list, with NDJSON lines cut mid-way across
    // transfer chunks.
    let lines = [
        r#"{"response":"```json\n[{\"bbox\":[1,2,3,4],"}"#,
        r#"{"response":"\"category\":\"Title\",\"text\":\"Über\"},"}"#,
        r#"{"response":"{\"bbox\":[5,6,7,8],\"category\":\"Picture\"}]\n```"}"#,
        r#"{"response":"","done":true}"#,
    ];
    let wire = (lines.join("\n") + "\n").into_bytes();
    // Byte-level cuts, so one of them may land inside a UTF-8 sequence.
    let chunks: Vec<Vec<u8>> = wire.chunks(wire.len() / 3 + 1).map(<[u8]>::to_vec).collect();

    let (base, _rx) = serve(vec![Canned::Chunked { chunks, pause_ms: 20 }]).await;
    let config = OcrConfig::builder().api_base(&base).build().unwrap();
    let recognizer = Recognizer::new(HttpOcrService::from_config(&config).unwrap(), &config);

    let mut fragments = 0;
    let blocks = recognizer
        .recognize_encoded(1, "aGVsbG8=".into(), |_| fragments += 1)
        .await
        .unwrap();

    assert_eq!(fragments, 3);
    assert_eq!(blocks.len(), 2);
    assert_eq!(blocks[0].category, Category::Title);
    assert_eq!(blocks[0].text(), "Über");
    assert_eq!(blocks[1].category, Category::Picture);
}
