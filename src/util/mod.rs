use std::sync::Once;

pub mod http;
pub mod signal;
pub mod text;

static CRYPTO_PROVIDER: Once = Once::new();

/// reqwest 使用 `rustls-no-provider`，在建立任何 TLS 連線前需先安裝 ring provider
pub fn ensure_rustls_crypto_provider() {
    CRYPTO_PROVIDER.call_once(|| {
        // 若其他元件已經安裝過 provider，install_default 會回傳 Err，忽略即可
        let _ = rustls::crypto::ring::default_provider().install_default();
    });
}
