use super::{OrderPageSource, SourceFactory};
use crate::config::RecoveryConfig;
use crate::core::{OrderPage, RecoveryError, RemoteOrderRecord, Result, StoreConfig};
use async_trait::async_trait;
use reqwest::header::{ACCEPT, RETRY_AFTER};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use std::time::Duration;
use tracing::{Level, event};

#[derive(Debug, Deserialize)]
struct OrdersResponse {
    #[serde(default)]
    data: Vec<RemoteOrderRecord>,
    #[serde(default)]
    meta: Option<OrdersMeta>,
}

#[derive(Debug, Deserialize)]
struct OrdersMeta {
    #[serde(default)]
    next_cursor: Option<String>,
}

/// `GET {base_url}/orders` client for one store.
pub struct HttpOrderSource {
    client: Client,
    orders_url: String,
    api_token: String,
    timeout: Duration,
}

impl HttpOrderSource {
    pub fn new(store: &StoreConfig, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|err| RecoveryError::Config(format!("Failed to build HTTP client: {}", err)))?;

        Ok(Self {
            client,
            orders_url: format!("{}/orders", store.base_url.trim_end_matches('/')),
            api_token: store.api_token.clone(),
            timeout,
        })
    }

    fn map_send_error(&self, err: reqwest::Error) -> RecoveryError {
        if err.is_timeout() {
            RecoveryError::Timeout(self.timeout)
        } else {
            RecoveryError::Transport(err.to_string())
        }
    }
}

fn parse_retry_after(value: Option<&reqwest::header::HeaderValue>) -> Option<Duration> {
    let raw = value?.to_str().ok()?;
    raw.trim().parse::<u64>().ok().map(Duration::from_secs)
}

#[async_trait]
impl OrderPageSource for HttpOrderSource {
    async fn fetch_page(&self, cursor: Option<&str>, per_page: usize) -> Result<OrderPage> {
        let mut request = self
            .client
            .get(&self.orders_url)
            .bearer_auth(&self.api_token)
            .header(ACCEPT, "application/json")
            .query(&[
                ("per_page", per_page.to_string()),
                ("sort_direction", "desc".to_string()),
            ]);
        if let Some(cursor) = cursor {
            request = request.query(&[("cursor", cursor)]);
        }

        let response = request.send().await.map_err(|err| self.map_send_error(err))?;
        let status = response.status();

        if status == StatusCode::TOO_MANY_REQUESTS {
            let retry_after = parse_retry_after(response.headers().get(RETRY_AFTER));
            return Err(RecoveryError::RateLimited { retry_after });
        }

        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(RecoveryError::Http {
                status: status.as_u16(),
                message,
            });
        }

        let body = response.text().await.map_err(|err| self.map_send_error(err))?;
        match serde_json::from_str::<OrdersResponse>(&body) {
            Ok(parsed) => {
                let next_cursor = parsed
                    .meta
                    .and_then(|meta| meta.next_cursor)
                    .filter(|c| !c.is_empty());
                Ok(OrderPage::new(parsed.data, next_cursor))
            }
            Err(err) => {
                event!(
                    Level::WARN,
                    url = %self.orders_url,
                    error = %err,
                    "unreadable order page treated as end of sequence"
                );
                Ok(OrderPage::empty())
            }
        }
    }
}

/// Opens an [`HttpOrderSource`] per store.
#[derive(Debug, Clone, Copy, Default)]
pub struct HttpSourceFactory;

impl SourceFactory for HttpSourceFactory {
    fn open(
        &self,
        store: &StoreConfig,
        config: &RecoveryConfig,
    ) -> Result<Box<dyn OrderPageSource>> {
        Ok(Box::new(HttpOrderSource::new(
            store,
            config.request_timeout_duration(),
        )?))
    }
}
