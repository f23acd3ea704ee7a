use std::time::{Duration, Instant};

use anyhow::{anyhow, Result};
use once_cell::sync::Lazy;
use reqwest::{header, Client, Response};

use crate::{logging::Logger, util};

static LOGGER: Lazy<Logger> = Lazy::new(|| Logger::new("http"));

const USER_AGENT: &str = concat!("coin_price_crawler/", env!("CARGO_PKG_VERSION"));

/// Builds a reqwest client with the given timeouts.
///
/// Every request made through the client is bounded by `timeout`, so a
/// hanging endpoint can never stall the caller forever.
///
/// # Errors
///
/// Returns an error if the TLS backend cannot be initialised.
pub fn build_client(connect_timeout: Duration, timeout: Duration) -> Result<Client> {
    util::ensure_rustls_crypto_provider();

    Client::builder()
        // ===== 壓縮 =====
        .gzip(true)
        // ===== 超時設置 =====
        .connect_timeout(connect_timeout)
        .timeout(timeout)
        // ===== TCP 優化 =====
        .tcp_nodelay(true)
        .tcp_keepalive(Duration::from_secs(60))
        // ===== 連接池 =====
        .pool_max_idle_per_host(2)
        .pool_idle_timeout(Duration::from_secs(90))
        .redirect(reqwest::redirect::Policy::limited(5))
        .user_agent(USER_AGENT)
        .build()
        .map_err(|e| anyhow!("Failed to create reqwest client: {:?}", e))
}

/// Performs a single HTTP GET request asking for JSON.
///
/// The request is sent once; retrying is left to the caller. The status
/// code is not checked here so the caller can decide how to treat non-200
/// responses.
///
/// # Errors
///
/// Returns an error when the request cannot be sent or times out.
pub async fn get_response(client: &Client, url: &str) -> Result<Response> {
    let start = Instant::now();
    let res = client
        .get(url)
        .header(header::ACCEPT, "application/json")
        .send()
        .await;
    let elapsed = start.elapsed().as_millis();

    match res {
        Ok(response) => {
            LOGGER.info(format!("GET:{} {} {} ms", url, response.status(), elapsed));
            Ok(response)
        }
        Err(why) => {
            LOGGER.error(format!("GET:{} failed because {:?}. {} ms", url, why, elapsed));
            Err(anyhow!("Failed to send request to {} because {:?}", url, why))
        }
    }
}

#[cfg(test)]
mod tests {
    use axum::{http::StatusCode, routing::get, Router};
    use tokio::net::TcpListener;

    use super::*;

    async fn serve(app: Router) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{}", addr)
    }

    #[tokio::test]
    async fn test_get_response_returns_non_200() {
        let base = serve(Router::new().route(
            "/missing",
            get(|| async { (StatusCode::NOT_FOUND, "nope") }),
        ))
        .await;
        let client = build_client(Duration::from_secs(2), Duration::from_secs(5)).unwrap();

        let res = get_response(&client, &format!("{}/missing", base))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_get_response_times_out() {
        let base = serve(Router::new().route(
            "/slow",
            get(|| async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                "late"
            }),
        ))
        .await;
        let client = build_client(Duration::from_secs(1), Duration::from_millis(200)).unwrap();

        let res = get_response(&client, &format!("{}/slow", base)).await;
        assert!(res.is_err());
    }
}
