//! Outbound access to the commerce platform.
//!
//! `OrderGateway` is the seam the decision engine depends on. A gateway is
//! bound to one tenant session, so the tenant is implicit in every call.

mod queries;
mod shopify;

pub use shopify::{ShopifyGateway, ShopifyGatewayFactory};

use crate::errors::GatewayError;
use crate::types::{FulfillmentCreation, FulfillmentWindow, LineItemSelection, RemoteOrder, TrackingInfo};
use async_trait::async_trait;
use std::sync::Arc;

/// Credentials of the merchant the request is made for.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Session {
    /// Shop domain, e.g. `example.myshopify.com`. Doubles as the tenant id.
    pub shop: String,
    pub access_token: String,
}

#[async_trait]
pub trait OrderGateway: Send + Sync {
    /// Searches orders by number. The platform may return zero, one or
    /// several candidates; callers pick the exact match.
    async fn lookup_order(&self, order_number: u64) -> Result<Vec<RemoteOrder>, GatewayError>;

    async fn list_fulfillment_windows(
        &self,
        order_id: &str,
    ) -> Result<Vec<FulfillmentWindow>, GatewayError>;

    /// `Ok(None)` means the platform answered without a payload.
    async fn create_fulfillment(
        &self,
        window_id: &str,
        line_items: &[LineItemSelection],
        tracking: &TrackingInfo,
    ) -> Result<Option<FulfillmentCreation>, GatewayError>;

    async fn update_tracking(
        &self,
        fulfillment_id: &str,
        tracking: &TrackingInfo,
    ) -> Result<(), GatewayError>;
}

/// Builds a session-scoped gateway per request.
pub trait GatewayFactory: Send + Sync {
    fn for_session(&self, session: &Session) -> Arc<dyn OrderGateway>;
}
