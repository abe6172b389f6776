#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Once};

use api_dispatch::{ClientConfig, Dispatcher, DispatcherBuilder, Error, Token, TokenStore};

static INIT: Once = Once::new();

pub fn init_logging() {
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt().with_test_writer().try_init();
    });
}

pub fn config(server_uri: &str) -> ClientConfig {
    let mut config = ClientConfig::new(format!("{}/v1/", server_uri));
    config.timeout_secs = Some(10);
    config
}

pub async fn store_with(token: Token) -> Arc<TokenStore> {
    let store = Arc::new(TokenStore::in_memory());
    store.set(Some(&token)).await.expect("seed token");
    store
}

pub fn builder(server_uri: &str, store: Arc<TokenStore>) -> DispatcherBuilder {
    init_logging();
    Dispatcher::builder(config(server_uri)).token_store(store)
}

/// Refresher that hands out `new-1`, `new-2`, ... and counts its calls.
pub fn counting_refresher(
    calls: Arc<AtomicUsize>,
) -> impl Fn(String) -> std::future::Ready<Result<Token, Error>> + Send + Sync + 'static {
    move |_refresh: String| {
        let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
        std::future::ready(Ok(Token::new(format!("new-{}", n), Some("r".into()))))
    }
}
