mod support;

use std::io::{Read as _, Write as _};
use std::net::TcpListener;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use ctiscan::error::FetchError;
use ctiscan::fetch::{RetryPolicy, fetch};

fn policy(max_retries: u32) -> RetryPolicy {
    RetryPolicy {
        max_retries,
        timeout: Duration::from_secs(2),
        backoff_unit: Duration::from_millis(1),
        request_delay: Duration::ZERO,
    }
}

/// Accepts connections and closes them without answering.
fn spawn_dropping_listener() -> (String, Arc<AtomicUsize>) {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let url = format!("http://{}/threads/x.1/", listener.local_addr().unwrap());
    let accepted = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&accepted);
    thread::spawn(move || {
        for stream in listener.incoming() {
            counter.fetch_add(1, Ordering::SeqCst);
            drop(stream);
        }
    });
    (url, accepted)
}

#[tokio::test]
async fn transport_failure_is_retried_exactly_max_retries_times() {
    let (url, accepted) = spawn_dropping_listener();
    let client = ctiscan::proxy::direct_client(Duration::from_secs(2)).unwrap();

    let err = fetch(&client, &url, &policy(3), &CancellationToken::new())
        .await
        .unwrap_err();

    assert!(
        matches!(err, FetchError::Connection { .. } | FetchError::Timeout { .. }),
        "{err}"
    );
    assert_eq!(err.attempts(), 3);
    assert_eq!(accepted.load(Ordering::SeqCst), 3);
}

/// Answers `200 OK` with a declared length of 100 but only 5 body bytes.
fn spawn_truncating_listener() -> (String, Arc<AtomicUsize>) {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let url = format!("http://{}/threads/x.1/", listener.local_addr().unwrap());
    let accepted = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&accepted);
    thread::spawn(move || {
        for stream in listener.incoming() {
            counter.fetch_add(1, Ordering::SeqCst);
            let Ok(mut stream) = stream else { continue };
            let mut request = [0u8; 1024];
            let _ = stream.read(&mut request);
            let _ = stream.write_all(b"HTTP/1.1 200 OK\r\nContent-Length: 100\r\n\r\nhello");
            let _ = stream.flush();
        }
    });
    (url, accepted)
}

#[tokio::test]
async fn truncated_body_after_success_status_is_retried() {
    let (url, accepted) = spawn_truncating_listener();
    let client = ctiscan::proxy::direct_client(Duration::from_secs(2)).unwrap();

    let err = fetch(&client, &url, &policy(3), &CancellationToken::new())
        .await
        .unwrap_err();

    assert!(
        matches!(err, FetchError::Connection { attempts: 3, .. }),
        "{err}"
    );
    assert_eq!(accepted.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn zero_retries_still_makes_one_attempt() {
    let (url, accepted) = spawn_dropping_listener();
    let client = ctiscan::proxy::direct_client(Duration::from_secs(2)).unwrap();

    let err = fetch(&client, &url, &policy(0), &CancellationToken::new())
        .await
        .unwrap_err();

    assert_eq!(err.attempts(), 1);
    assert_eq!(accepted.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn http_error_status_is_not_retried() {
    let events = support::EventLog::default();
    let server = support::spawn_server(Arc::clone(&events), |_| (500, "boom".to_owned()));
    let client = ctiscan::proxy::direct_client(Duration::from_secs(2)).unwrap();
    let url = format!("{}/threads/x.1/", server.base_url);

    let err = fetch(&client, &url, &policy(3), &CancellationToken::new())
        .await
        .unwrap_err();

    match err {
        FetchError::Http { status, .. } => assert_eq!(status.as_u16(), 500),
        other => panic!("expected http error, got {other}"),
    }
    assert_eq!(events.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn success_returns_body_and_attempt_count() {
    let events = support::EventLog::default();
    let server = support::spawn_server(Arc::clone(&events), |_| (200, "<html>ok</html>".to_owned()));
    let client = ctiscan::proxy::direct_client(Duration::from_secs(2)).unwrap();

    let fetched = fetch(
        &client,
        &format!("{}/forum", server.base_url),
        &policy(3),
        &CancellationToken::new(),
    )
    .await
    .unwrap();

    assert_eq!(fetched.attempts, 1);
    assert_eq!(fetched.text(), "<html>ok</html>");
}

#[tokio::test]
async fn cancelled_token_makes_no_request() {
    let events = support::EventLog::default();
    let server = support::spawn_server(Arc::clone(&events), |_| (200, String::new()));
    let client = ctiscan::proxy::direct_client(Duration::from_secs(2)).unwrap();
    let cancel = CancellationToken::new();
    cancel.cancel();

    let err = fetch(&client, &format!("{}/forum", server.base_url), &policy(3), &cancel)
        .await
        .unwrap_err();

    assert!(matches!(err, FetchError::Cancelled { .. }));
    assert!(events.lock().unwrap().is_empty());
}
