use crate::errors::GatewayError;
use crate::gateway::{GatewayFactory, OrderGateway, Session};
use crate::types::{
    CreatedFulfillment, ExistingFulfillment, FulfillmentCreation, FulfillmentWindow,
    LineItemSelection, RemoteFulfillmentStatus, RemoteOrder, TrackingInfo, WindowLineItem,
    WindowStatus,
};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::time::Instant;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Call {
    Lookup(u64),
    Windows(String),
    Create {
        window_id: String,
        line_items: Vec<LineItemSelection>,
        tracking: TrackingInfo,
    },
    UpdateTracking {
        fulfillment_id: String,
        tracking: TrackingInfo,
    },
}

/// Scripted in-memory platform. Unknown orders look up as empty and
/// creations succeed unless a different outcome is scripted.
#[derive(Default)]
pub struct FakeGateway {
    orders: Mutex<HashMap<u64, Result<Vec<RemoteOrder>, GatewayError>>>,
    windows: Mutex<HashMap<String, Result<Vec<FulfillmentWindow>, GatewayError>>>,
    creation: Mutex<Option<Result<Option<FulfillmentCreation>, GatewayError>>>,
    update_error: Mutex<Option<GatewayError>>,
    panic_on: Mutex<Option<u64>>,
    calls: Mutex<Vec<(Instant, Call)>>,
}

impl FakeGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_lookup(self, number: u64, orders: Vec<RemoteOrder>) -> Self {
        self.orders.lock().insert(number, Ok(orders));
        self
    }

    pub fn with_lookup_error(self, number: u64, err: GatewayError) -> Self {
        self.orders.lock().insert(number, Err(err));
        self
    }

    pub fn with_windows(self, order_id: &str, windows: Vec<FulfillmentWindow>) -> Self {
        self.windows.lock().insert(order_id.to_string(), Ok(windows));
        self
    }

    pub fn with_creation(self, creation: Result<Option<FulfillmentCreation>, GatewayError>) -> Self {
        *self.creation.lock() = Some(creation);
        self
    }

    pub fn with_update_error(self, err: GatewayError) -> Self {
        *self.update_error.lock() = Some(err);
        self
    }

    pub fn panicking_on(self, number: u64) -> Self {
        *self.panic_on.lock() = Some(number);
        self
    }

    /// An unfulfilled order `number` with id `{number}00` and one open
    /// window holding a single line item.
    pub fn with_unfulfilled(self, number: u64) -> Self {
        let order_id = format!("{number}00");
        self.with_lookup(number, vec![unfulfilled_order(&order_id, number)])
            .with_windows(&order_id, vec![open_window(&order_id, &[1])])
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().iter().map(|(_, call)| call.clone()).collect()
    }

    pub fn timed_calls(&self) -> Vec<(Instant, Call)> {
        self.calls.lock().clone()
    }

    fn record(&self, call: Call) {
        self.calls.lock().push((Instant::now(), call));
    }
}

#[async_trait]
impl OrderGateway for FakeGateway {
    async fn lookup_order(&self, order_number: u64) -> Result<Vec<RemoteOrder>, GatewayError> {
        self.record(Call::Lookup(order_number));
        if *self.panic_on.lock() == Some(order_number) {
            panic!("scripted panic for order {order_number}");
        }
        self.orders
            .lock()
            .get(&order_number)
            .cloned()
            .unwrap_or(Ok(Vec::new()))
    }

    async fn list_fulfillment_windows(
        &self,
        order_id: &str,
    ) -> Result<Vec<FulfillmentWindow>, GatewayError> {
        self.record(Call::Windows(order_id.to_string()));
        self.windows
            .lock()
            .get(order_id)
            .cloned()
            .unwrap_or(Ok(Vec::new()))
    }

    async fn create_fulfillment(
        &self,
        window_id: &str,
        line_items: &[LineItemSelection],
        tracking: &TrackingInfo,
    ) -> Result<Option<FulfillmentCreation>, GatewayError> {
        self.record(Call::Create {
            window_id: window_id.to_string(),
            line_items: line_items.to_vec(),
            tracking: tracking.clone(),
        });
        self.creation.lock().clone().unwrap_or_else(|| {
            Ok(Some(FulfillmentCreation {
                fulfillment: Some(CreatedFulfillment {
                    id: format!("gid://shopify/Fulfillment/{window_id}"),
                    status: Some("SUCCESS".into()),
                }),
                user_errors: Vec::new(),
            }))
        })
    }

    async fn update_tracking(
        &self,
        fulfillment_id: &str,
        tracking: &TrackingInfo,
    ) -> Result<(), GatewayError> {
        self.record(Call::UpdateTracking {
            fulfillment_id: fulfillment_id.to_string(),
            tracking: tracking.clone(),
        });
        match self.update_error.lock().clone() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

/// Hands out the same fake for every session and remembers the sessions.
pub struct FakeGatewayFactory {
    pub gateway: Arc<FakeGateway>,
    pub sessions: Mutex<Vec<Session>>,
}

impl FakeGatewayFactory {
    pub fn new(gateway: FakeGateway) -> Self {
        FakeGatewayFactory {
            gateway: Arc::new(gateway),
            sessions: Mutex::new(Vec::new()),
        }
    }
}

impl GatewayFactory for FakeGatewayFactory {
    fn for_session(&self, session: &Session) -> Arc<dyn OrderGateway> {
        self.sessions.lock().push(session.clone());
        self.gateway.clone()
    }
}

pub fn unfulfilled_order(id: &str, number: u64) -> RemoteOrder {
    RemoteOrder {
        id: id.to_string(),
        order_number: number,
        fulfillment_status: RemoteFulfillmentStatus::Unfulfilled,
        fulfillments: Vec::new(),
    }
}

pub fn fulfilled_order(id: &str, number: u64, tracking: &[Option<&str>]) -> RemoteOrder {
    RemoteOrder {
        id: id.to_string(),
        order_number: number,
        fulfillment_status: RemoteFulfillmentStatus::Fulfilled,
        fulfillments: tracking
            .iter()
            .enumerate()
            .map(|(i, number)| ExistingFulfillment {
                id: format!("{id}-f{i}"),
                tracking_number: number.map(String::from),
            })
            .collect(),
    }
}

pub fn window(id: &str, status: &str, quantities: &[u32]) -> FulfillmentWindow {
    FulfillmentWindow {
        id: id.to_string(),
        status: WindowStatus::parse(status),
        line_items: quantities
            .iter()
            .enumerate()
            .map(|(i, quantity)| WindowLineItem {
                id: format!("{id}-li{i}"),
                remaining_quantity: *quantity,
            })
            .collect(),
    }
}

pub fn open_window(order_id: &str, quantities: &[u32]) -> FulfillmentWindow {
    window(&format!("fo-{order_id}"), "OPEN", quantities)
}
