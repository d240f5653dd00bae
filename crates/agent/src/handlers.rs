use std::sync::Arc;

use async_trait::async_trait;
use parley_core::domain::fragment::FragmentBody;
use parley_core::errors::{ApplicationError, DomainError};
use parley_stripe::{lookup_customers, lookup_products, CrmGateway};
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use schemars::JsonSchema;
use serde::Deserialize;
use serde_json::Value;
use tracing::info;

use crate::registry::{parse_arguments, CallOutcome, FunctionHandler, FunctionRegistry, FunctionSpec};

pub const GET_CUSTOMERS: &str = "get_customers";
pub const GET_PRODUCTS: &str = "get_products";

/// Build the startup registry with both CRM lookups bound to one gateway.
pub fn default_registry(gateway: Arc<dyn CrmGateway>) -> FunctionRegistry {
    let mut registry = FunctionRegistry::new();
    registry.register(GetCustomersHandler::new(gateway.clone()));
    registry.register(GetProductsHandler::new(gateway));
    registry
}

/// Arguments for `get_customers`, as declared to the completion model.
#[derive(Debug, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct GetCustomersArgs {
    /// Total number of customers to return.
    #[schemars(range(min = 1))]
    pub no_of_customers: u32,
    /// Prefix that the customer email should start with. An empty string
    /// matches every customer.
    pub starts_with: String,
}

pub struct GetCustomersHandler {
    gateway: Arc<dyn CrmGateway>,
}

impl GetCustomersHandler {
    pub fn new(gateway: Arc<dyn CrmGateway>) -> Self {
        Self { gateway }
    }
}

#[async_trait]
impl FunctionHandler for GetCustomersHandler {
    fn spec(&self) -> FunctionSpec {
        FunctionSpec {
            name: GET_CUSTOMERS.to_string(),
            description: "Queries Stripe to get a list of customers.".to_string(),
            parameters: schema_value::<GetCustomersArgs>(),
        }
    }

    async fn invoke(&self, arguments: Value) -> Result<CallOutcome, ApplicationError> {
        let args: GetCustomersArgs = parse_arguments(GET_CUSTOMERS, arguments)?;
        info!(
            event_name = "crm.lookup.customers",
            count = args.no_of_customers,
            starts_with = %args.starts_with,
            "running customer lookup"
        );

        let customers =
            lookup_customers(self.gateway.as_ref(), args.no_of_customers, &args.starts_with)
                .await?;
        let serialized = serde_json::to_string(&customers).unwrap_or_default();
        let transcript_note =
            format!("[Got {} customers with names and emails: {serialized}]", customers.len());

        Ok(CallOutcome { body: FragmentBody::CustomerList { customers }, transcript_note })
    }
}

/// Arguments for `get_products`. Prices are currency-major units.
#[derive(Debug, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct GetProductsArgs {
    /// Total number of products to return.
    #[schemars(range(min = 1))]
    pub no_of_products: u32,
    /// Minimum unit price of the product.
    pub min_price: f64,
    /// Maximum unit price of the product.
    pub max_price: f64,
}

pub struct GetProductsHandler {
    gateway: Arc<dyn CrmGateway>,
}

impl GetProductsHandler {
    pub fn new(gateway: Arc<dyn CrmGateway>) -> Self {
        Self { gateway }
    }
}

#[async_trait]
impl FunctionHandler for GetProductsHandler {
    fn spec(&self) -> FunctionSpec {
        FunctionSpec {
            name: GET_PRODUCTS.to_string(),
            description: "Queries Stripe to get a list of products.".to_string(),
            parameters: schema_value::<GetProductsArgs>(),
        }
    }

    async fn invoke(&self, arguments: Value) -> Result<CallOutcome, ApplicationError> {
        let args: GetProductsArgs = parse_arguments(GET_PRODUCTS, arguments)?;
        let min_price = price_bound(GET_PRODUCTS, "minPrice", args.min_price)?;
        let max_price = price_bound(GET_PRODUCTS, "maxPrice", args.max_price)?;
        info!(
            event_name = "crm.lookup.products",
            count = args.no_of_products,
            %min_price,
            %max_price,
            "running product lookup"
        );

        let products =
            lookup_products(self.gateway.as_ref(), args.no_of_products, min_price, max_price)
                .await?;
        let serialized = serde_json::to_string(&products).unwrap_or_default();
        let transcript_note = format!("[Got {} products: {serialized}]", products.len());

        Ok(CallOutcome { body: FragmentBody::ProductList { products }, transcript_note })
    }
}

fn price_bound(function: &str, field: &str, value: f64) -> Result<Decimal, ApplicationError> {
    Decimal::from_f64(value).ok_or_else(|| {
        DomainError::InvalidArguments {
            function: function.to_string(),
            reason: format!("{field} is not a representable price: {value}"),
        }
        .into()
    })
}

fn schema_value<T: JsonSchema>() -> Value {
    serde_json::to_value(schemars::schema_for!(T)).unwrap_or_default()
}
