mod common;

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use api_dispatch::{
    CredentialStore, Dispatcher, Error, MemoryCredentialStore, RequestDescriptor, Token,
    TokenRefreshCoordinator, TokenStore,
};
use reqwest::StatusCode;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, Request, ResponseTemplate};

use common::{builder, config, counting_refresher, store_with};

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn twenty_concurrent_401s_refresh_exactly_once() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/v1/items"))
        .and(header("Authorization", "Bearer old"))
        .respond_with(
            ResponseTemplate::new(401).set_delay(Duration::from_millis(100)),
        )
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v1/items"))
        .and(header("Authorization", "Bearer new-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"ok": true})))
        .mount(&server)
        .await;

    let store = store_with(Token::new("old", Some("r".into()))).await;
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);
    let dispatcher = builder(&server.uri(), Arc::clone(&store))
        .refresher(move |_: String| {
            let counter = Arc::clone(&counter);
            async move {
                tokio::time::sleep(Duration::from_millis(50)).await;
                let n = counter.fetch_add(1, Ordering::SeqCst) + 1;
                Ok::<_, Error>(Token::new(format!("new-{}", n), Some("r".into())))
            }
        })
        .build()
        .unwrap();

    let handles: Vec<_> = (0..20)
        .map(|_| {
            let dispatcher = dispatcher.clone();
            tokio::spawn(async move {
                dispatcher
                    .send(&RequestDescriptor::get("items"))
                    .await
                    .map(|r| r.status().as_u16())
            })
        })
        .collect();

    for handle in handles {
        assert_eq!(handle.await.unwrap().unwrap(), 200);
    }
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(
        store.current_auth().await.unwrap().as_deref(),
        Some("new-1")
    );
}

#[tokio::test]
async fn token_rotated_while_in_flight_skips_the_refresh() {
    let server = MockServer::start().await;
    let backend = Arc::new(MemoryCredentialStore::new());
    let rotate = Arc::clone(&backend);

    Mock::given(method("GET"))
        .and(path("/v1/me"))
        .respond_with(move |req: &Request| {
            let auth = req
                .headers
                .get("Authorization")
                .and_then(|h| h.to_str().ok())
                .unwrap_or_default()
                .to_string();
            if auth == "Bearer old" {
                // Someone else refreshed while this request was on the wire.
                let rotated = Token::bearer("rotated").to_bytes().unwrap();
                rotate.set("default", Some(&rotated)).unwrap();
                ResponseTemplate::new(401)
            } else {
                assert_eq!(auth, "Bearer rotated");
                ResponseTemplate::new(200)
            }
        })
        .expect(2)
        .mount(&server)
        .await;

    let store = Arc::new(TokenStore::new(backend, "default"));
    store
        .set(Some(&Token::new("old", Some("r".into()))))
        .await
        .unwrap();
    let calls = Arc::new(AtomicUsize::new(0));
    let dispatcher = Dispatcher::builder(config(&server.uri()))
        .token_store(store)
        .refresher(counting_refresher(Arc::clone(&calls)))
        .build()
        .unwrap();

    let response = dispatcher
        .send(&RequestDescriptor::get("me"))
        .await
        .expect("retry with the rotated token");
    assert_eq!(response.status().as_u16(), 200);
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn two_dispatchers_share_one_coordinator() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(header("Authorization", "Bearer old"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(204))
        .mount(&server)
        .await;

    let store = store_with(Token::new("old", Some("r".into()))).await;
    let calls = Arc::new(AtomicUsize::new(0));
    let first = builder(&server.uri(), store)
        .refresher(counting_refresher(Arc::clone(&calls)))
        .build()
        .unwrap();
    let second = Dispatcher::builder(config(&server.uri()))
        .coordinator(first.coordinator().clone())
        .build()
        .unwrap();

    first.send(&RequestDescriptor::get("a")).await.unwrap();
    second.send(&RequestDescriptor::get("b")).await.unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert!(Arc::ptr_eq(first.token_store(), second.token_store()));
}

#[tokio::test]
async fn cancelled_waiter_does_not_cancel_the_refresh() {
    let store = store_with(Token::new("old", Some("r".into()))).await;
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);
    let coordinator = TokenRefreshCoordinator::builder(Arc::clone(&store))
        .refresher(move |_: String| {
            let counter = Arc::clone(&counter);
            async move {
                tokio::time::sleep(Duration::from_millis(100)).await;
                counter.fetch_add(1, Ordering::SeqCst);
                Ok::<_, Error>(Token::new("new", Some("r".into())))
            }
        })
        .build();
    let unauthorized = || Error::Status {
        status: StatusCode::UNAUTHORIZED,
        body: String::new(),
    };

    let waiter = {
        let coordinator = coordinator.clone();
        let err = unauthorized();
        tokio::spawn(async move { coordinator.reauth(err, Some("old")).await })
    };
    tokio::time::sleep(Duration::from_millis(20)).await;
    waiter.abort();
    assert!(waiter.await.unwrap_err().is_cancelled());

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(store.current_auth().await.unwrap().as_deref(), Some("new"));

    // A late caller that also sent "old" sees the rotated token and skips.
    coordinator.reauth(unauthorized(), Some("old")).await.unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}
