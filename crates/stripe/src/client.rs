use std::time::Duration;

use parley_core::config::StripeConfig;
use parley_core::errors::ApplicationError;
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::debug;

const ERROR_BODY_EXCERPT_LEN: usize = 200;

/// HTTP client for the Stripe API. Constructed explicitly from configuration
/// and passed to whoever needs it; there is no process-wide instance.
pub struct StripeClient {
    http: reqwest::Client,
    base_url: String,
    secret_key: SecretString,
}

#[derive(Debug, Deserialize)]
pub struct ListEnvelope<T> {
    pub data: Vec<T>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct ApiCustomer {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct ApiProduct {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub default_price: Option<ApiPrice>,
}

/// Price object as returned under `expand[]=data.default_price`.
/// `unit_amount` is in currency-minor units.
#[derive(Clone, Debug, Deserialize)]
pub struct ApiPrice {
    pub id: String,
    #[serde(default)]
    pub unit_amount: Option<i64>,
    #[serde(default)]
    pub currency: Option<String>,
}

impl StripeClient {
    pub fn new(config: &StripeConfig) -> Result<Self, ApplicationError> {
        let secret_key = config.secret_key.clone().ok_or_else(|| {
            ApplicationError::Configuration("stripe.secret_key is not configured".to_string())
        })?;

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|error| {
                ApplicationError::Configuration(format!(
                    "failed to build stripe http client: {error}"
                ))
            })?;

        Ok(Self { http, base_url: config.base_url.trim_end_matches('/').to_string(), secret_key })
    }

    /// One page of customers, using the provider's default page size. The
    /// upstream call accepts no filter parameters; filtering is local.
    pub async fn list_customers(&self) -> Result<Vec<ApiCustomer>, ApplicationError> {
        let envelope: ListEnvelope<ApiCustomer> = self.get_json("/v1/customers", &[]).await?;
        debug!(count = envelope.data.len(), "listed stripe customers");
        Ok(envelope.data)
    }

    /// Up to `limit` products with their default price expanded.
    pub async fn list_products(&self, limit: u32) -> Result<Vec<ApiProduct>, ApplicationError> {
        let envelope: ListEnvelope<ApiProduct> = self
            .get_json(
                "/v1/products",
                &[("limit", limit.to_string()), ("expand[]", "data.default_price".to_string())],
            )
            .await?;
        debug!(count = envelope.data.len(), limit, "listed stripe products");
        Ok(envelope.data)
    }

    async fn get_json<T>(&self, path: &str, query: &[(&str, String)]) -> Result<T, ApplicationError>
    where
        T: DeserializeOwned,
    {
        let url = format!("{}{path}", self.base_url);
        let response = self
            .http
            .get(&url)
            .query(query)
            .bearer_auth(self.secret_key.expose_secret())
            .send()
            .await
            .map_err(|error| ApplicationError::Crm(format!("request to {url} failed: {error}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ApplicationError::Crm(format!(
                "status {status} from {url}: {}",
                excerpt(&body)
            )));
        }

        response.json::<T>().await.map_err(|error| {
            ApplicationError::Crm(format!("could not decode response from {url}: {error}"))
        })
    }
}

fn excerpt(body: &str) -> &str {
    if body.len() <= ERROR_BODY_EXCERPT_LEN {
        return body;
    }
    let mut end = ERROR_BODY_EXCERPT_LEN;
    while !body.is_char_boundary(end) {
        end -= 1;
    }
    &body[..end]
}
