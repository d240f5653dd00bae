use async_trait::async_trait;
use parley_core::errors::ApplicationError;

use crate::client::{ApiCustomer, ApiProduct, StripeClient};

/// Read operations the assistant's function handlers consume. Implemented by
/// the real Stripe client and by scripted fakes in tests; always injected,
/// never reached through a global.
#[async_trait]
pub trait CrmGateway: Send + Sync {
    /// Provider default page of customers. No upstream filter parameters.
    async fn list_customers(&self) -> Result<Vec<ApiCustomer>, ApplicationError>;

    /// Up to `limit` products with price data expanded.
    async fn list_products(&self, limit: u32) -> Result<Vec<ApiProduct>, ApplicationError>;
}

#[async_trait]
impl CrmGateway for StripeClient {
    async fn list_customers(&self) -> Result<Vec<ApiCustomer>, ApplicationError> {
        StripeClient::list_customers(self).await
    }

    async fn list_products(&self, limit: u32) -> Result<Vec<ApiProduct>, ApplicationError> {
        StripeClient::list_products(self, limit).await
    }
}
