//! Product price lookup against the catalog service of another instance.
//!
//! The HTTP client runs every call through a [`ResiliencePipeline`] named
//! for the dependency, and forwards the original caller's bearer token -
//! cross-service trust is an explicit parameter, not ambient state.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use common::{Money, ProductId};
use resilience::{ResilienceError, ResiliencePipeline};
use serde::Deserialize;

use crate::DomainError;

/// A product's current price as quoted by the catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProductQuote {
    pub price: Money,
}

/// Trait for resolving product prices.
///
/// `Ok(None)` means the product does not exist as far as the dependency
/// is concerned; an `Err` means the dependency could not answer at all.
#[async_trait]
pub trait ProductLookup: Send + Sync {
    /// Quotes the current price of a product, forwarding the caller's
    /// bearer token.
    async fn quote(
        &self,
        product_id: &ProductId,
        bearer_token: &str,
    ) -> Result<Option<ProductQuote>, DomainError>;
}

/// The slice of the catalog's product payload this service needs.
#[derive(Debug, Deserialize)]
struct PriceDto {
    price: f64,
}

#[derive(Debug)]
enum AttemptError {
    Status(reqwest::StatusCode),
    Transport(reqwest::Error),
}

impl std::fmt::Display for AttemptError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AttemptError::Status(status) => write!(f, "status {status}"),
            AttemptError::Transport(e) => write!(f, "{e}"),
        }
    }
}

/// HTTP lookup through the resilience pipeline.
pub struct HttpProductLookup {
    client: reqwest::Client,
    base_url: String,
    pipeline: ResiliencePipeline,
}

impl HttpProductLookup {
    /// Creates a lookup against the service at `base_url`.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
            pipeline: ResiliencePipeline::new("product-lookup"),
        }
    }

    /// Creates a lookup using `PRODUCT_SERVICE_URL`, defaulting to a
    /// local instance.
    pub fn from_env() -> Self {
        let url = std::env::var("PRODUCT_SERVICE_URL")
            .unwrap_or_else(|_| "http://localhost:5002".to_string());
        Self::new(url)
    }

    /// Swaps in a pipeline with non-default tuning.
    pub fn with_pipeline(mut self, pipeline: ResiliencePipeline) -> Self {
        self.pipeline = pipeline;
        self
    }
}

#[async_trait]
impl ProductLookup for HttpProductLookup {
    #[tracing::instrument(skip(self, bearer_token))]
    async fn quote(
        &self,
        product_id: &ProductId,
        bearer_token: &str,
    ) -> Result<Option<ProductQuote>, DomainError> {
        let url = format!("{}/api/products/{}", self.base_url, product_id);

        let result = self
            .pipeline
            .execute(|| {
                let request = self.client.get(&url).bearer_auth(bearer_token);
                async move {
                    let response = request.send().await.map_err(AttemptError::Transport)?;
                    let status = response.status();
                    if !status.is_success() {
                        return Err(AttemptError::Status(status));
                    }
                    // An unparsable body is treated as "not found", the
                    // same as a non-success status.
                    match response.json::<PriceDto>().await {
                        Ok(dto) => Ok(Some(ProductQuote {
                            price: Money::from_major_f64(dto.price),
                        })),
                        Err(_) => Ok(None),
                    }
                }
            })
            .await;

        match result {
            Ok(quote) => Ok(quote),
            // The dependency answered, just not with the product.
            Err(ResilienceError::Exhausted {
                cause: AttemptError::Status(status),
                ..
            }) => {
                tracing::debug!(%product_id, %status, "product lookup returned non-success");
                Ok(None)
            }
            Err(e) => Err(DomainError::DependencyFailure(e.to_string())),
        }
    }
}

#[derive(Debug, Default)]
struct InMemoryLookupState {
    prices: HashMap<ProductId, Money>,
    requests: Vec<(ProductId, String)>,
    unavailable: bool,
}

/// In-memory lookup for testing.
#[derive(Debug, Clone, Default)]
pub struct InMemoryProductLookup {
    state: Arc<RwLock<InMemoryLookupState>>,
}

impl InMemoryProductLookup {
    /// Creates an empty lookup.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a product price.
    pub fn insert(&self, product_id: impl Into<ProductId>, price: Money) {
        self.state
            .write()
            .unwrap()
            .prices
            .insert(product_id.into(), price);
    }

    /// Makes every quote fail as a dependency failure.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.state.write().unwrap().unavailable = unavailable;
    }

    /// Returns every (product, token) pair that was quoted.
    pub fn requests(&self) -> Vec<(ProductId, String)> {
        self.state.read().unwrap().requests.clone()
    }
}

#[async_trait]
impl ProductLookup for InMemoryProductLookup {
    async fn quote(
        &self,
        product_id: &ProductId,
        bearer_token: &str,
    ) -> Result<Option<ProductQuote>, DomainError> {
        let mut state = self.state.write().unwrap();
        state
            .requests
            .push((product_id.clone(), bearer_token.to_string()));

        if state.unavailable {
            return Err(DomainError::DependencyFailure(
                "product lookup unavailable".to_string(),
            ));
        }

        Ok(state
            .prices
            .get(product_id)
            .map(|price| ProductQuote { price: *price }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_in_memory_lookup_quotes_known_products() {
        let lookup = InMemoryProductLookup::new();
        lookup.insert("SKU-1", Money::from_cents(1999));

        let quote = lookup
            .quote(&ProductId::new("SKU-1"), "token")
            .await
            .unwrap();
        assert_eq!(quote.unwrap().price.cents(), 1999);

        let missing = lookup
            .quote(&ProductId::new("SKU-404"), "token")
            .await
            .unwrap();
        assert!(missing.is_none());
    }

    #[tokio::test]
    async fn test_in_memory_lookup_records_bearer_tokens() {
        let lookup = InMemoryProductLookup::new();
        lookup.insert("SKU-1", Money::from_cents(100));

        lookup
            .quote(&ProductId::new("SKU-1"), "caller-token")
            .await
            .unwrap();

        let requests = lookup.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].1, "caller-token");
    }

    #[tokio::test]
    async fn test_in_memory_lookup_unavailable() {
        let lookup = InMemoryProductLookup::new();
        lookup.insert("SKU-1", Money::from_cents(100));
        lookup.set_unavailable(true);

        let result = lookup.quote(&ProductId::new("SKU-1"), "token").await;
        assert!(matches!(result, Err(DomainError::DependencyFailure(_))));
    }
}
