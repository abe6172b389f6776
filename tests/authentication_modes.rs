mod common;

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use api_dispatch::{Authentication, Error, RequestDescriptor, Token, TokenStore};
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use common::{builder, counting_refresher, store_with};

#[tokio::test]
async fn custom_token_never_triggers_a_refresh() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/me"))
        .and(header("Authorization", "Bearer caller-owned"))
        .respond_with(ResponseTemplate::new(401))
        .expect(1)
        .mount(&server)
        .await;

    let calls = Arc::new(AtomicUsize::new(0));
    let store = store_with(Token::new("stored", Some("r".into()))).await;
    let dispatcher = builder(&server.uri(), Arc::clone(&store))
        .refresher(counting_refresher(Arc::clone(&calls)))
        .build()
        .unwrap();

    let desc = RequestDescriptor::get("me")
        .with_authentication(Authentication::Custom("caller-owned".into()));
    let err = dispatcher.send(&desc).await.unwrap_err();

    assert_eq!(err.auth_status(), Some(401));
    assert!(matches!(err, Error::Status { .. }));
    assert_eq!(calls.load(Ordering::SeqCst), 0);
    assert_eq!(
        store.current_auth().await.unwrap().as_deref(),
        Some("stored")
    );
}

#[tokio::test]
async fn skip_never_sends_authorization() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/public"))
        .respond_with(ResponseTemplate::new(401))
        .expect(1)
        .mount(&server)
        .await;

    let calls = Arc::new(AtomicUsize::new(0));
    let dispatcher = builder(&server.uri(), store_with(Token::bearer("stored")).await)
        .refresher(counting_refresher(Arc::clone(&calls)))
        .build()
        .unwrap();

    let desc = RequestDescriptor::get("public").with_authentication(Authentication::Skip);
    let err = dispatcher.send(&desc).await.unwrap_err();
    assert_eq!(err.auth_status(), Some(401));
    assert_eq!(calls.load(Ordering::SeqCst), 0);

    let requests = server.received_requests().await.unwrap_or_default();
    assert_eq!(requests.len(), 1);
    assert!(requests[0].headers.get("Authorization").is_none());
}

#[tokio::test]
async fn missing_stored_token_sends_unauthenticated() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/status"))
        .respond_with(ResponseTemplate::new(200).set_body_string("up"))
        .mount(&server)
        .await;

    let dispatcher = builder(&server.uri(), Arc::new(TokenStore::in_memory()))
        .build()
        .unwrap();
    let response = dispatcher
        .send(&RequestDescriptor::get("status"))
        .await
        .unwrap();
    assert_eq!(response.text().unwrap(), "up");

    let requests = server.received_requests().await.unwrap_or_default();
    assert!(requests[0].headers.get("Authorization").is_none());
}

#[tokio::test]
async fn configured_scheme_prefixes_the_token() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(header("Authorization", "Token abc"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    let mut config = common::config(&server.uri());
    config.auth_scheme = "Token".to_string();
    let dispatcher = api_dispatch::Dispatcher::builder(config)
        .token_store(store_with(Token::bearer("abc")).await)
        .build()
        .unwrap();
    dispatcher.send(&RequestDescriptor::get("x")).await.unwrap();
}

#[tokio::test]
async fn statuses_outside_the_auth_set_are_not_retried() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(403))
        .expect(1)
        .mount(&server)
        .await;

    let mut config = common::config(&server.uri());
    config.auth_failure_statuses = vec![401];
    let calls = Arc::new(AtomicUsize::new(0));
    let dispatcher = api_dispatch::Dispatcher::builder(config)
        .token_store(store_with(Token::new("t", Some("r".into()))).await)
        .refresher(counting_refresher(Arc::clone(&calls)))
        .build()
        .unwrap();

    let err = dispatcher
        .send(&RequestDescriptor::get("forbidden"))
        .await
        .unwrap_err();
    assert_eq!(err.auth_status(), Some(403));
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}
