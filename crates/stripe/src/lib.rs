//! External Data Gateway for the Stripe CRM/payments API.
//!
//! Exposes the two read operations the assistant can trigger: listing
//! customers (provider default page, no upstream filters) and listing
//! products with price data expanded. All filtering is client-side, in
//! `lookup`, over the provider-returned lists.

pub mod client;
pub mod gateway;
pub mod lookup;

pub use client::{ApiCustomer, ApiPrice, ApiProduct, StripeClient};
pub use gateway::CrmGateway;
pub use lookup::{lookup_customers, lookup_products};
