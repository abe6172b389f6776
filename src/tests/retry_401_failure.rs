use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use crate::tests::test_support::{capture_logs, dispatcher_for, drain_logs, store_with};
use crate::{Error, RequestDescriptor, Token};

#[tokio::test]
async fn returns_auth_error_after_double_401() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/v1/me"))
        .respond_with(ResponseTemplate::new(401).set_body_string("still expired"))
        .expect(2)
        .mount(&server)
        .await;

    let store = store_with(Token::new("old", Some("r".into()))).await;
    let refreshes = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&refreshes);
    let dispatcher = dispatcher_for(&server.uri(), store)
        .refresher(move |_: String| {
            let n = counter.fetch_add(1, Ordering::SeqCst);
            async move { Ok::<_, Error>(Token::new(format!("new-{}", n), Some("r".into()))) }
        })
        .build()
        .unwrap();

    let (lines, guard) = capture_logs();
    let res = dispatcher.send(&RequestDescriptor::get("me")).await;
    drop(guard);

    match res {
        Err(Error::Status { status, body }) => {
            assert_eq!(status.as_u16(), 401);
            assert_eq!(body, "still expired");
        }
        Err(other) => panic!("expected Error::Status, got {}", other),
        Ok(_) => panic!("expected Error::Status, got Ok"),
    }
    assert_eq!(refreshes.load(Ordering::SeqCst), 1);

    let logs = drain_logs(lines);
    let warn_count = logs
        .iter()
        .filter(|line| line.contains("WARN") && line.contains("dispatch.auth_failure"))
        .count();
    assert_eq!(
        warn_count, 1,
        "only the first 401 should start a refresh, got {:?}",
        logs
    );
}

#[tokio::test]
async fn failed_refresh_without_relogin_is_not_retried() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/v1/me"))
        .respond_with(ResponseTemplate::new(401))
        .expect(1)
        .mount(&server)
        .await;

    let store = store_with(Token::new("old", Some("r".into()))).await;
    let dispatcher = dispatcher_for(&server.uri(), store)
        .refresher(|_: String| async { Err::<Token, _>(Error::Credential("revoked".into())) })
        .build()
        .unwrap();

    let (lines, guard) = capture_logs();
    let err = dispatcher
        .send(&RequestDescriptor::get("me"))
        .await
        .expect_err("refresh failure must surface");
    drop(guard);

    match err {
        Error::Reauth(inner) => assert!(matches!(*inner, Error::Credential(_))),
        other => panic!("expected Error::Reauth, got {:?}", other),
    }
    let logs = drain_logs(lines);
    assert!(
        logs.iter().any(|l| l.contains("refresh.failure")),
        "got {:?}",
        logs
    );
}
