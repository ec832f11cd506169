//! `OrderGateway` over the platform's REST and GraphQL admin APIs.

use super::queries::{CREATE_FULFILLMENT, GET_FULFILLMENT_ORDERS};
use super::{GatewayFactory, OrderGateway, Session};
use crate::config::{PlatformConfig, RetryConfig};
use crate::errors::GatewayError;
use crate::metrics_defs::{GATEWAY_REQUEST_DURATION, GATEWAY_RETRIES};
use crate::retry::{rate_limit_aware_backoff, retry_with_backoff};
use crate::types::{
    CreatedFulfillment, ExistingFulfillment, FulfillmentCreation, FulfillmentWindow,
    LineItemSelection, RemoteFulfillmentStatus, RemoteOrder, TrackingInfo, WindowLineItem,
    WindowStatus,
};
use async_trait::async_trait;
use http::StatusCode;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use shared::{counter, histogram};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{Instant, timeout};

const ACCESS_TOKEN_HEADER: &str = "X-Shopify-Access-Token";
const THROTTLED_CODE: &str = "THROTTLED";
const MAX_ERROR_BODY_CHARS: usize = 200;

// REST wire types

#[derive(Deserialize)]
struct OrdersResponse {
    #[serde(default)]
    orders: Vec<OrderWire>,
}

#[derive(Deserialize)]
struct OrderWire {
    id: u64,
    order_number: u64,
    fulfillment_status: Option<String>,
    #[serde(default)]
    fulfillments: Vec<FulfillmentWire>,
}

#[derive(Deserialize)]
struct FulfillmentWire {
    id: u64,
    tracking_number: Option<String>,
}

impl From<OrderWire> for RemoteOrder {
    fn from(order: OrderWire) -> Self {
        RemoteOrder {
            id: order.id.to_string(),
            order_number: order.order_number,
            fulfillment_status: RemoteFulfillmentStatus::from_platform(
                order.fulfillment_status.as_deref(),
            ),
            fulfillments: order
                .fulfillments
                .into_iter()
                .map(|f| ExistingFulfillment {
                    id: f.id.to_string(),
                    tracking_number: f.tracking_number,
                })
                .collect(),
        }
    }
}

// GraphQL wire types

#[derive(Deserialize)]
struct GraphqlResponse<T> {
    data: Option<T>,
    #[serde(default)]
    errors: Vec<GraphqlError>,
}

#[derive(Deserialize)]
struct GraphqlError {
    message: String,
    #[serde(default)]
    extensions: Option<GraphqlErrorExtensions>,
}

#[derive(Deserialize)]
struct GraphqlErrorExtensions {
    code: Option<String>,
}

#[derive(Deserialize)]
struct Connection<T> {
    edges: Vec<Edge<T>>,
}

#[derive(Deserialize)]
struct Edge<T> {
    node: T,
}

#[derive(Deserialize)]
struct FulfillmentOrdersData {
    order: Option<OrderNode>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct OrderNode {
    fulfillment_orders: Connection<FulfillmentOrderNode>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct FulfillmentOrderNode {
    id: String,
    status: String,
    line_items: Connection<LineItemNode>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct LineItemNode {
    id: String,
    remaining_quantity: i64,
}

impl From<FulfillmentOrderNode> for FulfillmentWindow {
    fn from(node: FulfillmentOrderNode) -> Self {
        FulfillmentWindow {
            id: node.id,
            status: WindowStatus::parse(&node.status),
            line_items: node
                .line_items
                .edges
                .into_iter()
                .map(|edge| WindowLineItem {
                    id: edge.node.id,
                    remaining_quantity: u32::try_from(edge.node.remaining_quantity.max(0))
                        .unwrap_or(u32::MAX),
                })
                .collect(),
        }
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct FulfillmentCreateData {
    fulfillment_create_v2: Option<FulfillmentCreatePayload>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct FulfillmentCreatePayload {
    fulfillment: Option<CreatedFulfillmentNode>,
    #[serde(default)]
    user_errors: Vec<UserErrorNode>,
}

#[derive(Deserialize)]
struct CreatedFulfillmentNode {
    id: String,
    status: Option<String>,
}

#[derive(Deserialize)]
struct UserErrorNode {
    message: String,
}

impl From<FulfillmentCreatePayload> for FulfillmentCreation {
    fn from(payload: FulfillmentCreatePayload) -> Self {
        FulfillmentCreation {
            fulfillment: payload.fulfillment.map(|f| CreatedFulfillment {
                id: f.id,
                status: f.status,
            }),
            user_errors: payload.user_errors.into_iter().map(|e| e.message).collect(),
        }
    }
}

/// Gateway bound to one shop's credentials.
pub struct ShopifyGateway {
    client: reqwest::Client,
    /// `{origin}/admin/api/{version}`, no trailing slash
    api_base: String,
    /// Used in error messages
    shop: String,
    access_token: String,
    timeout: Duration,
    retry: RetryConfig,
}

impl ShopifyGateway {
    pub fn new(
        client: reqwest::Client,
        origin: &str,
        api_version: &str,
        session: &Session,
        timeout: Duration,
        retry: RetryConfig,
    ) -> Self {
        ShopifyGateway {
            client,
            api_base: format!("{}/admin/api/{}", origin.trim_end_matches('/'), api_version),
            shop: session.shop.clone(),
            access_token: session.access_token.clone(),
            timeout,
            retry,
        }
    }

    /// Runs `call` under the shared retry policy.
    async fn with_retry<T, F, Fut>(&self, operation: &'static str, call: F) -> Result<T, GatewayError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, GatewayError>>,
    {
        let schedule = rate_limit_aware_backoff(self.retry.base_delay(), |err| {
            matches!(err, GatewayError::RateLimited)
        });

        let backoff = |attempt: u32, err: &GatewayError| {
            let delay = schedule(attempt, err);
            tracing::warn!(
                operation,
                shop = %self.shop,
                attempt,
                delay_ms = delay.as_millis() as u64,
                error = %err,
                "platform call failed, retrying"
            );
            counter!(GATEWAY_RETRIES, "operation" => operation).increment(1);
            delay
        };

        retry_with_backoff(self.retry.max_attempts, GatewayError::is_retryable, backoff, call)
            .await
    }

    /// Sends one request and returns the body of a 2xx response.
    ///
    /// The timeout covers the whole exchange, including reading the body.
    async fn send(
        &self,
        operation: &'static str,
        request: reqwest::RequestBuilder,
    ) -> Result<String, GatewayError> {
        let started = Instant::now();

        let exchange = async {
            let response = request
                .header(ACCESS_TOKEN_HEADER, &self.access_token)
                .send()
                .await
                .map_err(|e| self.map_reqwest_error(e))?;
            let status = response.status();
            let body = response
                .text()
                .await
                .map_err(|e| self.map_reqwest_error(e))?;
            Ok::<_, GatewayError>((status, body))
        };

        let result = timeout(self.timeout, exchange)
            .await
            .map_err(|_| GatewayError::Timeout(self.shop.clone()));

        histogram!(GATEWAY_REQUEST_DURATION, "operation" => operation)
            .record(started.elapsed().as_secs_f64());

        let (status, body) = result??;

        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(GatewayError::RateLimited);
        }
        if !status.is_success() {
            return Err(GatewayError::Status {
                status: status.as_u16(),
                message: error_message(&body),
            });
        }

        Ok(body)
    }

    fn map_reqwest_error(&self, err: reqwest::Error) -> GatewayError {
        if err.is_timeout() {
            GatewayError::Timeout(self.shop.clone())
        } else if err.is_builder() {
            GatewayError::Malformed(format!("could not build request: {err}"))
        } else {
            GatewayError::Transport(self.shop.clone(), err.to_string())
        }
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        operation: &'static str,
        request: reqwest::RequestBuilder,
    ) -> Result<T, GatewayError> {
        let body = self.send(operation, request).await?;
        serde_json::from_str(&body).map_err(|e| GatewayError::Malformed(format!("{operation}: {e}")))
    }

    /// Posts a GraphQL document. Top-level `errors` fail the call; a
    /// `THROTTLED` error counts as a rate limit.
    async fn graphql<T: DeserializeOwned>(
        &self,
        operation: &'static str,
        query: &str,
        variables: &Value,
    ) -> Result<T, GatewayError> {
        let request = self
            .client
            .post(format!("{}/graphql.json", self.api_base))
            .json(&json!({ "query": query, "variables": variables }));

        let response: GraphqlResponse<T> = self.get_json(operation, request).await?;

        if !response.errors.is_empty() {
            let throttled = response.errors.iter().any(|e| {
                e.extensions
                    .as_ref()
                    .and_then(|ext| ext.code.as_deref())
                    == Some(THROTTLED_CODE)
            });
            if throttled {
                return Err(GatewayError::RateLimited);
            }

            let messages: Vec<&str> = response.errors.iter().map(|e| e.message.as_str()).collect();
            return Err(GatewayError::Rejected(messages.join("; ")));
        }

        response
            .data
            .ok_or_else(|| GatewayError::Malformed(format!("{operation}: response has no data")))
    }
}

#[async_trait]
impl OrderGateway for ShopifyGateway {
    async fn lookup_order(&self, order_number: u64) -> Result<Vec<RemoteOrder>, GatewayError> {
        let url = format!("{}/orders.json", self.api_base);
        let order_number = order_number.to_string();

        let response: OrdersResponse = self
            .with_retry("lookup_order", || {
                let request = self
                    .client
                    .get(&url)
                    .query(&[("status", "any"), ("order_number", order_number.as_str())]);
                self.get_json("lookup_order", request)
            })
            .await?;

        Ok(response.orders.into_iter().map(RemoteOrder::from).collect())
    }

    async fn list_fulfillment_windows(
        &self,
        order_id: &str,
    ) -> Result<Vec<FulfillmentWindow>, GatewayError> {
        let variables = json!({ "id": format!("gid://shopify/Order/{order_id}") });

        let data: FulfillmentOrdersData = self
            .with_retry("list_fulfillment_windows", || {
                self.graphql("list_fulfillment_windows", GET_FULFILLMENT_ORDERS, &variables)
            })
            .await?;

        let Some(order) = data.order else {
            tracing::debug!(order_id, shop = %self.shop, "order missing from fulfillment order query");
            return Ok(Vec::new());
        };

        Ok(order
            .fulfillment_orders
            .edges
            .into_iter()
            .map(|edge| FulfillmentWindow::from(edge.node))
            .collect())
    }

    async fn create_fulfillment(
        &self,
        window_id: &str,
        line_items: &[LineItemSelection],
        tracking: &TrackingInfo,
    ) -> Result<Option<FulfillmentCreation>, GatewayError> {
        let line_items: Vec<Value> = line_items
            .iter()
            .map(|item| json!({ "id": item.id, "quantity": item.quantity }))
            .collect();

        let variables = json!({
            "fulfillment": {
                "lineItemsByFulfillmentOrder": [{
                    "fulfillmentOrderId": window_id,
                    "fulfillmentOrderLineItems": line_items,
                }],
                "trackingInfo": tracking,
                "notifyCustomer": true,
            }
        });

        let data: FulfillmentCreateData = self
            .with_retry("create_fulfillment", || {
                self.graphql("create_fulfillment", CREATE_FULFILLMENT, &variables)
            })
            .await?;

        Ok(data.fulfillment_create_v2.map(FulfillmentCreation::from))
    }

    async fn update_tracking(
        &self,
        fulfillment_id: &str,
        tracking: &TrackingInfo,
    ) -> Result<(), GatewayError> {
        let url = format!(
            "{}/fulfillments/{fulfillment_id}/update_tracking.json",
            self.api_base
        );
        let body = json!({
            "fulfillment": {
                "tracking_info": tracking,
                "notify_customer": true,
            }
        });

        self.with_retry("update_tracking", || {
            let request = self.client.post(&url).json(&body);
            self.send("update_tracking", request)
        })
        .await?;

        Ok(())
    }
}

/// Pulls a readable message out of an error body such as
/// `{"errors": "Not Found"}` or `{"errors": {"base": ["..."]}}`.
fn error_message(body: &str) -> String {
    let parsed: Option<Value> = serde_json::from_str(body).ok();

    let message = parsed.as_ref().and_then(|value| {
        match value.get("errors").or_else(|| value.get("error"))? {
            Value::String(message) => Some(message.clone()),
            Value::Array(items) => items.first().map(|first| match first {
                Value::String(message) => message.clone(),
                other => other.to_string(),
            }),
            other => Some(other.to_string()),
        }
    });

    message.unwrap_or_else(|| body.chars().take(MAX_ERROR_BODY_CHARS).collect())
}

/// Produces a `ShopifyGateway` for each request's session.
pub struct ShopifyGatewayFactory {
    client: reqwest::Client,
    platform: PlatformConfig,
    retry: RetryConfig,
}

impl ShopifyGatewayFactory {
    pub fn new(platform: PlatformConfig, retry: RetryConfig) -> Self {
        ShopifyGatewayFactory {
            client: reqwest::Client::new(),
            platform,
            retry,
        }
    }
}

impl GatewayFactory for ShopifyGatewayFactory {
    fn for_session(&self, session: &Session) -> Arc<dyn OrderGateway> {
        let origin = match &self.platform.base_url {
            Some(url) => url.as_str().to_string(),
            None => format!("https://{}", session.shop),
        };

        Arc::new(ShopifyGateway::new(
            self.client.clone(),
            &origin,
            &self.platform.api_version,
            session,
            self.platform.timeout(),
            self.retry.clone(),
        ))
    }
}
