use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Read-only projection of an upstream CRM customer. Identity stays with the
/// provider; records are never persisted locally.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomerRecord {
    pub name: Option<String>,
    pub email: Option<String>,
}

/// Read-only projection of an upstream product with its unit price in
/// currency-major units.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductRecord {
    pub id: String,
    pub name: String,
    pub unit_price: Decimal,
}
