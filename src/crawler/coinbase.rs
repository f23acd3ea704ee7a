use anyhow::Result;
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde_json::Value;

use crate::{config, crawler::QuoteSource, error::PipelineError, logging, util};

/// Coinbase 現貨報價 API，例︰https://api.coinbase.com/v2/prices/spot
pub struct Coinbase {
    client: Client,
    url: String,
}

impl Coinbase {
    /// 依設定建立 client，請求一律帶有逾時限制
    pub fn new(settings: &config::Crawler) -> Result<Self> {
        let client = util::http::build_client(settings.connect_timeout(), settings.timeout())?;
        Ok(Coinbase {
            client,
            url: settings.quote_url.clone(),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl QuoteSource for Coinbase {
    async fn fetch_quote(&self) -> Result<Option<Value>, PipelineError> {
        let res = util::http::get_response(&self.client, &self.url)
            .await
            .map_err(|why| PipelineError::Network(format!("{:?}", why)))?;

        let status = res.status();
        if status != StatusCode::OK {
            logging::warn_file_async(format!(
                "Quote API {} responded with status {}",
                self.url,
                status.as_u16()
            ));
            return Ok(None);
        }

        let body = res
            .bytes()
            .await
            .map_err(|why| PipelineError::Network(format!("Error reading response body: {:?}", why)))?;

        if body.iter().all(u8::is_ascii_whitespace) {
            return Ok(None);
        }

        serde_json::from_slice::<Value>(&body)
            .map(Some)
            .map_err(|why| {
                PipelineError::Parse(format!(
                    "Error parsing response JSON({}): {:?}",
                    String::from_utf8_lossy(&body),
                    why
                ))
            })
    }
}
