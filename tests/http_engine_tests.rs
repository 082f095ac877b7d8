//! HTTP engine tests against a local canned-response server.

use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::sync::oneshot;

use codemod::testing::{rewrite_record, MockResolver};
use codemod::{
    CommitId, Coordinator, CoordinatorConfig, Error, HttpRewriteEngine, RepositoryRevision,
    RewriteEngine, RewriteParams, ShardError, TransformationRequest,
};

/// Serve one connection: capture the request head, then answer with
/// `status` and `body` split into `parts` writes.
async fn serve_once(status: &'static str, body_parts: Vec<String>) -> (String, oneshot::Receiver<String>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("local addr");
    let (tx, rx) = oneshot::channel();

    tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.expect("accept");

        let mut head = Vec::new();
        let mut buf = [0u8; 1024];
        while !head.windows(4).any(|w| w == b"\r\n\r\n") {
            let n = socket.read(&mut buf).await.expect("read request");
            if n == 0 {
                break;
            }
            head.extend_from_slice(&buf[..n]);
        }
        let _ = tx.send(String::from_utf8_lossy(&head).into_owned());

        let len: usize = body_parts.iter().map(String::len).sum();
        let response_head = format!(
            "HTTP/1.1 {status}\r\nContent-Type: application/json\r\nContent-Length: {len}\r\nConnection: close\r\n\r\n"
        );
        socket
            .write_all(response_head.as_bytes())
            .await
            .expect("write head");
        for part in body_parts {
            socket.write_all(part.as_bytes()).await.expect("write body");
            socket.flush().await.expect("flush");
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        let _ = socket.shutdown().await;
    });

    (format!("http://{addr}"), rx)
}

fn params() -> RewriteParams {
    RewriteParams {
        repo: "github.com/acme/a".to_string(),
        commit: CommitId::from("deadbeef"),
        match_template: "foo(:[x])".to_string(),
        rewrite_template: "bar(:[x])".to_string(),
        file_extension: Some(".go".to_string()),
    }
}

#[tokio::test]
async fn test_streams_concatenated_records() {
    let first = rewrite_record("a.go", 2);
    let second = rewrite_record("b.go", 1);
    // Split the second record across writes.
    let (head, tail) = second.split_at(second.len() / 2);
    let (url, request_rx) = serve_once(
        "200 OK",
        vec![format!("{first}\n{head}"), tail.to_string()],
    )
    .await;

    let engine = HttpRewriteEngine::new(&url, Some(Duration::from_secs(5))).expect("engine");
    let mut records = engine.rewrite(&params()).await.expect("200 response");

    let a = records.next_record().await.expect("first").expect("decodes");
    let b = records.next_record().await.expect("second").expect("decodes");
    assert!(records.next_record().await.is_none());

    assert_eq!(a.uri, "a.go");
    assert_eq!(a.substitution_count(), 2);
    assert_eq!(b.uri, "b.go");
    assert_eq!(b.substitution_count(), 1);

    let request_head = request_rx.await.expect("request captured");
    assert!(request_head.starts_with("GET /?"));
    assert!(request_head.contains("repo=github.com%2Facme%2Fa"));
    assert!(request_head.contains("commit=deadbeef"));
    assert!(request_head.contains("fileextension=.go"));
}

#[tokio::test]
async fn test_non_ok_status_carries_body() {
    let (url, _) = serve_once("502 Bad Gateway", vec!["upstream exploded".to_string()]).await;

    let engine = HttpRewriteEngine::new(&url, None).expect("engine");
    let err = engine
        .rewrite(&params())
        .await
        .expect_err("502 is an error");

    match err {
        ShardError::Upstream(upstream) => {
            assert_eq!(upstream.status, 502);
            assert_eq!(upstream.message, "upstream exploded");
            assert!(upstream.is_retryable());
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn test_malformed_body_is_decode_error() {
    let (url, _) = serve_once("200 OK", vec!["{\"uri\": \"a.go\", ".to_string()]).await;

    let engine = HttpRewriteEngine::new(&url, None).expect("engine");
    let mut records = engine.rewrite(&params()).await.expect("200 response");

    let err = records
        .next_record()
        .await
        .expect("truncated record reported")
        .expect_err("truncated body");
    assert!(matches!(err, ShardError::Decode(_)));
}

#[tokio::test]
async fn test_connection_refused_is_transport_error() {
    // Bind then drop to get a port nobody listens on.
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("local addr");
    drop(listener);

    let engine = HttpRewriteEngine::new(&format!("http://{addr}"), None).expect("engine");
    let err = engine
        .rewrite(&params())
        .await
        .expect_err("nothing listening");

    assert!(matches!(err, ShardError::Transport(_)));
}

#[tokio::test]
async fn test_coordinator_over_http() {
    let body = format!(
        "{}{}",
        rewrite_record("cmd/main.go", 1),
        rewrite_record("README.md", 0)
    );
    let (url, _) = serve_once("200 OK", vec![body]).await;

    let coordinator = Coordinator::new(
        Arc::new(MockResolver::new()),
        Arc::new(HttpRewriteEngine::new(&url, Some(Duration::from_secs(5))).expect("engine")),
        CoordinatorConfig::default(),
    );
    let output = coordinator
        .transform(
            &TransformationRequest::new("foo(:[x])", "bar(:[x])"),
            &[RepositoryRevision::new("github.com/acme/a", "main")],
            None,
        )
        .await
        .expect("shard succeeds");

    assert_eq!(output.results.len(), 1);
    assert_eq!(output.results[0].uri, "git://github.com/acme/a?main#cmd/main.go");
    assert_eq!(output.results[0].commit.as_str(), "commit-github.com/acme/a");
}

#[tokio::test]
async fn test_coordinator_over_http_fatal_status() {
    let (url, _) = serve_once("500 Internal Server Error", vec!["boom".to_string()]).await;

    let coordinator = Coordinator::new(
        Arc::new(MockResolver::new()),
        Arc::new(HttpRewriteEngine::new(&url, None).expect("engine")),
        CoordinatorConfig::default(),
    );
    let err = coordinator
        .transform(
            &TransformationRequest::new("foo", "bar"),
            &[RepositoryRevision::new("github.com/acme/a", "")],
            None,
        )
        .await
        .expect_err("500 is fatal");

    assert!(matches!(err, Error::Shard { ref repo, .. } if repo == "github.com/acme/a"));
}
