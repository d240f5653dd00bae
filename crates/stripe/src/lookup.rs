use parley_core::domain::record::{CustomerRecord, ProductRecord};
use parley_core::errors::ApplicationError;
use rust_decimal::Decimal;

use crate::gateway::CrmGateway;

/// Fetch the provider's default customer page and keep, in provider order,
/// the customers whose email starts with `starts_with`, truncated to `count`.
///
/// An empty prefix matches every customer that has an email; customers
/// without one never match.
pub async fn lookup_customers(
    gateway: &dyn CrmGateway,
    count: u32,
    starts_with: &str,
) -> Result<Vec<CustomerRecord>, ApplicationError> {
    let customers = gateway.list_customers().await?;

    Ok(customers
        .into_iter()
        .filter(|customer| {
            customer.email.as_deref().is_some_and(|email| email.starts_with(starts_with))
        })
        .take(count as usize)
        .map(|customer| CustomerRecord { name: customer.name, email: customer.email })
        .collect())
}

/// Fetch up to `count` products with prices expanded and keep those whose
/// major-unit price falls within `[min_price, max_price]` inclusive.
///
/// The upstream list is capped at `count` before the local price filter, so
/// the result can be shorter than requested. Products without an expanded
/// unit price never match.
pub async fn lookup_products(
    gateway: &dyn CrmGateway,
    count: u32,
    min_price: Decimal,
    max_price: Decimal,
) -> Result<Vec<ProductRecord>, ApplicationError> {
    let products = gateway.list_products(count).await?;

    Ok(products
        .into_iter()
        .filter_map(|product| {
            let unit_amount = product.default_price.as_ref()?.unit_amount?;
            let unit_price = Decimal::new(unit_amount, 2);
            (min_price <= unit_price && unit_price <= max_price).then(|| ProductRecord {
                id: product.id,
                name: product.name,
                unit_price,
            })
        })
        .collect())
}
