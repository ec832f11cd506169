//! Per-record fulfillment decisions.
//!
//! For every record the engine looks the order up, picks one of tracking
//! backfill, fulfillment creation or a rejection, and runs it through the
//! gateway. Every outcome, including gateway failures, ends up as a
//! `FulfillmentResult`; nothing is returned as an error.

use crate::errors::GatewayError;
use crate::gateway::OrderGateway;
use crate::metrics_defs::RECORDS_PROCESSED;
use crate::tracking::TrackingUrlResolver;
use crate::types::{
    FulfillmentResult, FulfillmentWindow, LineItemSelection, OrderIntentRecord,
    RemoteFulfillmentStatus, RemoteOrder, TrackingInfo,
};
use shared::counter;
use std::sync::Arc;

const MISSING_INPUT: &str = "Missing Order Number or Tracking Number";
const ORDER_NOT_FOUND: &str = "Order not found";
const TRACKING_UPDATED: &str = "Tracking updated";
const ALREADY_TRACKED: &str = "Order already has tracking";
const NO_ELIGIBLE_FULFILLMENT: &str = "Failed to update tracking - no eligible fulfillment found";
const NO_WINDOWS: &str = "No fulfillment orders found for this order";
const NOTHING_TO_FULFILL: &str = "All items in this order are already fulfilled";
const NO_RESPONSE: &str = "Fulfillment API returned no response";
const NOT_CREATED: &str = "Fulfillment was not created - unknown reason";
const CREATION_FAILED: &str = "Fulfillment failed";
const DEFAULT_CREATED_STATUS: &str = "FULFILLED";

pub struct DecisionEngine {
    gateway: Arc<dyn OrderGateway>,
    resolver: TrackingUrlResolver,
}

impl DecisionEngine {
    pub fn new(gateway: Arc<dyn OrderGateway>, resolver: TrackingUrlResolver) -> Self {
        DecisionEngine { gateway, resolver }
    }

    pub async fn process(&self, record: &OrderIntentRecord) -> FulfillmentResult {
        let result = self.decide(record).await;

        let outcome = if result.is_success() { "success" } else { "failure" };
        counter!(RECORDS_PROCESSED, "outcome" => outcome).increment(1);
        tracing::debug!(
            order_number = %record.order_number_raw,
            outcome,
            detail = result.detail(),
            "record processed"
        );

        result
    }

    async fn decide(&self, record: &OrderIntentRecord) -> FulfillmentResult {
        let order_number = match record.order_number_numeric {
            Some(number) if !record.tracking_number.is_empty() => number,
            _ => return FulfillmentResult::failure(record, MISSING_INPUT),
        };

        let tracking = TrackingInfo {
            number: record.tracking_number.clone(),
            company: record.tracking_company.clone(),
            url: self.resolver.resolve(
                &record.tracking_number,
                &record.tracking_company,
                record.tracking_url.as_deref(),
            ),
        };

        match self.fulfill(record, order_number, &tracking).await {
            Ok(result) => result,
            Err(err) => {
                tracing::warn!(
                    order_number = %record.order_number_raw,
                    error = %err,
                    "platform call failed for record"
                );
                FulfillmentResult::failure(record, err.to_string())
            }
        }
    }

    async fn fulfill(
        &self,
        record: &OrderIntentRecord,
        order_number: u64,
        tracking: &TrackingInfo,
    ) -> Result<FulfillmentResult, GatewayError> {
        let candidates = self.gateway.lookup_order(order_number).await?;

        // The lookup is a search; only an exact number match counts.
        let Some(order) = candidates
            .into_iter()
            .find(|order| order.order_number == order_number)
        else {
            return Ok(FulfillmentResult::failure(record, ORDER_NOT_FOUND));
        };

        match order.fulfillment_status {
            RemoteFulfillmentStatus::Fulfilled => {
                Ok(self.backfill_tracking(record, &order, tracking).await)
            }
            RemoteFulfillmentStatus::Unfulfilled | RemoteFulfillmentStatus::Partial => {
                self.create(record, &order, tracking).await
            }
        }
    }

    /// Attaches tracking to the first existing fulfillment that has none.
    async fn backfill_tracking(
        &self,
        record: &OrderIntentRecord,
        order: &RemoteOrder,
        tracking: &TrackingInfo,
    ) -> FulfillmentResult {
        if order.fulfillments.is_empty() {
            return FulfillmentResult::failure(record, NO_ELIGIBLE_FULFILLMENT);
        }

        let Some(target) = order.fulfillments.iter().find(|f| !f.has_tracking()) else {
            return FulfillmentResult::failure(record, ALREADY_TRACKED);
        };

        match self.gateway.update_tracking(&target.id, tracking).await {
            Ok(()) => FulfillmentResult::success(record, TRACKING_UPDATED, target.id.clone()),
            Err(err) => {
                tracing::warn!(
                    order_number = %record.order_number_raw,
                    fulfillment_id = %target.id,
                    error = %err,
                    "tracking update failed"
                );
                FulfillmentResult::failure(record, format!("Failed to update tracking: {err}"))
            }
        }
    }

    async fn create(
        &self,
        record: &OrderIntentRecord,
        order: &RemoteOrder,
        tracking: &TrackingInfo,
    ) -> Result<FulfillmentResult, GatewayError> {
        let windows = self.gateway.list_fulfillment_windows(&order.id).await?;

        let Some(window) = windows.iter().find(|w| w.status.is_fulfillable()) else {
            return Ok(FulfillmentResult::failure(record, unfulfillable_reason(&windows)));
        };

        let selection: Vec<LineItemSelection> = window
            .line_items
            .iter()
            .filter(|item| item.remaining_quantity > 0)
            .map(|item| LineItemSelection {
                id: item.id.clone(),
                quantity: item.remaining_quantity,
            })
            .collect();

        if selection.is_empty() {
            return Ok(FulfillmentResult::failure(record, NOTHING_TO_FULFILL));
        }

        let Some(creation) = self
            .gateway
            .create_fulfillment(&window.id, &selection, tracking)
            .await?
        else {
            return Ok(FulfillmentResult::failure(record, NO_RESPONSE));
        };

        if !creation.user_errors.is_empty() {
            let messages: Vec<&str> = creation
                .user_errors
                .iter()
                .map(|message| message.trim())
                .filter(|message| !message.is_empty())
                .collect();
            let error = if messages.is_empty() {
                CREATION_FAILED.to_string()
            } else {
                messages.join("; ")
            };
            return Ok(FulfillmentResult::failure(record, error));
        }

        Ok(match creation.fulfillment {
            Some(fulfillment) => FulfillmentResult::success(
                record,
                fulfillment
                    .status
                    .unwrap_or_else(|| DEFAULT_CREATED_STATUS.to_string()),
                fulfillment.id,
            ),
            None => FulfillmentResult::failure(record, NOT_CREATED),
        })
    }
}

/// Explains why none of `windows` can take a new fulfillment.
fn unfulfillable_reason(windows: &[FulfillmentWindow]) -> String {
    if windows.is_empty() {
        return NO_WINDOWS.to_string();
    }

    let mut statuses: Vec<&str> = Vec::new();
    for window in windows {
        let status = window.status.as_str();
        if !statuses.contains(&status) {
            statuses.push(status);
        }
    }

    format!("Cannot fulfill - order status: {}", statuses.join(", "))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TrackingConfig;
    use crate::settings::TenantSettings;
    use crate::testutils::{Call, FakeGateway, fulfilled_order, open_window, unfulfilled_order, window};
    use crate::types::{CreatedFulfillment, FulfillmentCreation, Outcome};

    fn engine(gateway: FakeGateway) -> (DecisionEngine, Arc<FakeGateway>) {
        let gateway = Arc::new(gateway);
        let resolver =
            TrackingUrlResolver::from_settings(&TenantSettings::from(&TrackingConfig::default()));
        (DecisionEngine::new(gateway.clone(), resolver), gateway)
    }

    fn record(order_number: &str, tracking_number: &str) -> OrderIntentRecord {
        OrderIntentRecord::new(order_number, tracking_number, "India Post", None)
    }

    #[tokio::test]
    async fn test_creates_fulfillment_for_hash_prefixed_number() {
        let gateway = FakeGateway::new()
            .with_lookup(1025, vec![unfulfilled_order("7001", 1025)])
            .with_windows("7001", vec![open_window("7001", &[2, 0, 1])]);
        let (engine, gateway) = engine(gateway);

        let result = engine.process(&record("#1025", "RX123456789IN")).await;

        assert_eq!(result.order_number, "#1025");
        assert_eq!(
            result.outcome,
            Outcome::Success {
                status: "SUCCESS".into(),
                fulfillment_id: "gid://shopify/Fulfillment/fo-7001".into(),
            }
        );

        let calls = gateway.calls();
        assert_eq!(calls[0], Call::Lookup(1025));
        assert_eq!(calls[1], Call::Windows("7001".into()));
        let Call::Create {
            window_id,
            line_items,
            tracking,
        } = &calls[2]
        else {
            panic!("expected a create call, got {:?}", calls[2]);
        };
        assert_eq!(window_id, "fo-7001");
        assert_eq!(
            line_items,
            &vec![
                LineItemSelection {
                    id: "fo-7001-li0".into(),
                    quantity: 2
                },
                LineItemSelection {
                    id: "fo-7001-li2".into(),
                    quantity: 1
                },
            ]
        );
        assert_eq!(tracking.number, "RX123456789IN");
        assert_eq!(tracking.company, "India Post");
        assert!(tracking.url.ends_with("RX123456789IN"));
    }

    #[tokio::test]
    async fn test_missing_input_makes_no_calls() {
        let (engine, gateway) = engine(FakeGateway::new().with_unfulfilled(1025));

        let result = engine.process(&record("#1025", "")).await;
        assert_eq!(result.error(), Some(MISSING_INPUT));

        let result = engine.process(&record("no digits", "RX1")).await;
        assert_eq!(result.error(), Some(MISSING_INPUT));

        assert!(gateway.calls().is_empty());
    }

    #[tokio::test]
    async fn test_order_not_found() {
        let (engine, _) = engine(FakeGateway::new());
        let result = engine.process(&record("99999", "RX1")).await;
        assert_eq!(result.error(), Some(ORDER_NOT_FOUND));
        assert_eq!(result.order_number, "99999");
    }

    #[tokio::test]
    async fn test_oversized_order_number_is_looked_up() {
        let (engine, gateway) = engine(FakeGateway::new());
        let result = engine
            .process(&record("#123456789012345678901234", "RX1"))
            .await;

        assert_eq!(result.error(), Some(ORDER_NOT_FOUND));
        assert_eq!(result.order_number, "#123456789012345678901234");
        assert_eq!(gateway.calls(), vec![Call::Lookup(u64::MAX)]);
    }

    #[tokio::test]
    async fn test_lookup_requires_exact_number() {
        let gateway =
            FakeGateway::new().with_lookup(1025, vec![unfulfilled_order("7001", 10250)]);
        let (engine, gateway) = engine(gateway);

        let result = engine.process(&record("1025", "RX1")).await;
        assert_eq!(result.error(), Some(ORDER_NOT_FOUND));
        assert_eq!(gateway.calls(), vec![Call::Lookup(1025)]);
    }

    #[tokio::test]
    async fn test_tracking_backfill_updates_first_untracked() {
        let gateway = FakeGateway::new().with_lookup(
            1030,
            vec![fulfilled_order("7002", 1030, &[Some("EE1"), None, None])],
        );
        let (engine, gateway) = engine(gateway);

        let result = engine.process(&record("1030", "RX2")).await;

        assert!(result.is_success());
        assert_eq!(result.detail(), TRACKING_UPDATED);
        assert_eq!(result.fulfillment_id(), Some("7002-f1"));

        let updates: Vec<Call> = gateway
            .calls()
            .into_iter()
            .filter(|call| matches!(call, Call::UpdateTracking { .. }))
            .collect();
        assert_eq!(updates.len(), 1);
        assert!(matches!(
            &updates[0],
            Call::UpdateTracking { fulfillment_id, .. } if fulfillment_id == "7002-f1"
        ));
    }

    #[tokio::test]
    async fn test_already_tracked_makes_no_update() {
        let gateway = FakeGateway::new()
            .with_lookup(1031, vec![fulfilled_order("7003", 1031, &[Some("EE1")])]);
        let (engine, gateway) = engine(gateway);

        let result = engine.process(&record("1031", "RX3")).await;

        assert_eq!(result.error(), Some(ALREADY_TRACKED));
        assert_eq!(gateway.calls(), vec![Call::Lookup(1031)]);
    }

    #[tokio::test]
    async fn test_fulfilled_without_fulfillments() {
        let gateway =
            FakeGateway::new().with_lookup(1032, vec![fulfilled_order("7004", 1032, &[])]);
        let (engine, _) = engine(gateway);

        let result = engine.process(&record("1032", "RX4")).await;
        assert_eq!(result.error(), Some(NO_ELIGIBLE_FULFILLMENT));
    }

    #[tokio::test]
    async fn test_tracking_update_failure() {
        let gateway = FakeGateway::new()
            .with_lookup(1033, vec![fulfilled_order("7005", 1033, &[None])])
            .with_update_error(GatewayError::Status {
                status: 422,
                message: "Tracking number is invalid".into(),
            });
        let (engine, _) = engine(gateway);

        let result = engine.process(&record("1033", "RX5")).await;
        let error = result.error().unwrap();
        assert!(error.starts_with("Failed to update tracking: "));
        assert!(error.contains("Tracking number is invalid"));
    }

    #[tokio::test]
    async fn test_no_fulfillable_window() {
        let gateway = FakeGateway::new()
            .with_lookup(1040, vec![unfulfilled_order("8001", 1040)])
            .with_windows(
                "8001",
                vec![
                    window("fo-1", "CLOSED", &[1]),
                    window("fo-2", "ON_HOLD", &[1]),
                    window("fo-3", "CLOSED", &[1]),
                ],
            )
            .with_lookup(1041, vec![unfulfilled_order("8002", 1041)]);
        let (engine, _) = engine(gateway);

        let result = engine.process(&record("1040", "RX6")).await;
        assert_eq!(
            result.error(),
            Some("Cannot fulfill - order status: CLOSED, ON_HOLD")
        );

        let result = engine.process(&record("1041", "RX7")).await;
        assert_eq!(
            result.error(),
            Some("No fulfillment orders found for this order")
        );
    }

    #[tokio::test]
    async fn test_scheduled_and_in_progress_windows_are_fulfillable() {
        let gateway = FakeGateway::new()
            .with_lookup(1042, vec![unfulfilled_order("8003", 1042)])
            .with_windows(
                "8003",
                vec![
                    window("fo-closed", "CLOSED", &[1]),
                    window("fo-scheduled", "SCHEDULED", &[1]),
                ],
            )
            .with_lookup(1043, vec![unfulfilled_order("8004", 1043)])
            .with_windows("8004", vec![window("fo-progress", "IN_PROGRESS", &[1])]);
        let (engine, _) = engine(gateway);

        let result = engine.process(&record("1042", "RX8")).await;
        assert_eq!(
            result.fulfillment_id(),
            Some("gid://shopify/Fulfillment/fo-scheduled")
        );

        let result = engine.process(&record("1043", "RX9")).await;
        assert!(result.is_success());
    }

    #[tokio::test]
    async fn test_partially_fulfilled_skip() {
        let mut order = unfulfilled_order("8005", 1044);
        order.fulfillment_status = RemoteFulfillmentStatus::Partial;
        let gateway = FakeGateway::new()
            .with_lookup(1044, vec![order])
            .with_windows("8005", vec![open_window("8005", &[0, 0])]);
        let (engine, gateway) = engine(gateway);

        let result = engine.process(&record("1044", "RX10")).await;
        assert_eq!(result.error(), Some(NOTHING_TO_FULFILL));
        assert!(
            !gateway
                .calls()
                .iter()
                .any(|call| matches!(call, Call::Create { .. }))
        );
    }

    #[tokio::test]
    async fn test_creation_outcomes() {
        let cases = [
            (
                Ok(Some(FulfillmentCreation {
                    fulfillment: None,
                    user_errors: vec!["Quantity invalid".into(), "Location inactive".into()],
                })),
                Err("Quantity invalid; Location inactive".to_string()),
            ),
            (
                Ok(Some(FulfillmentCreation {
                    fulfillment: None,
                    user_errors: vec!["".into(), "  ".into()],
                })),
                Err(CREATION_FAILED.to_string()),
            ),
            (Ok(None), Err(NO_RESPONSE.to_string())),
            (
                Ok(Some(FulfillmentCreation::default())),
                Err(NOT_CREATED.to_string()),
            ),
            (
                Ok(Some(FulfillmentCreation {
                    fulfillment: Some(CreatedFulfillment {
                        id: "gid://shopify/Fulfillment/5".into(),
                        status: None,
                    }),
                    user_errors: Vec::new(),
                })),
                Ok(DEFAULT_CREATED_STATUS.to_string()),
            ),
            (
                Err(GatewayError::Rejected("Access denied".into())),
                Err("Access denied".to_string()),
            ),
        ];

        for (creation, expected) in cases {
            let gateway = FakeGateway::new().with_unfulfilled(1050).with_creation(creation);
            let (engine, _) = engine(gateway);

            let result = engine.process(&record("1050", "RX11")).await;
            match expected {
                Ok(status) => {
                    assert!(result.is_success());
                    assert_eq!(result.detail(), status);
                }
                Err(error) => assert_eq!(result.error(), Some(error.as_str())),
            }
        }
    }

    #[tokio::test]
    async fn test_gateway_errors_become_record_errors() {
        let gateway = FakeGateway::new().with_lookup_error(1060, GatewayError::RateLimited);
        let (engine, _) = engine(gateway);

        let result = engine.process(&record("1060", "RX12")).await;
        assert_eq!(result.error(), Some("Rate limited by the platform"));
    }

    #[tokio::test]
    async fn test_explicit_url_is_forwarded() {
        let gateway = FakeGateway::new().with_unfulfilled(1070);
        let (engine, gateway) = engine(gateway);

        let record = OrderIntentRecord::new(
            "1070",
            "RX13",
            "Carrier X",
            Some(" https://track.example.com/RX13 "),
        );
        engine.process(&record).await;

        let tracking = gateway.calls().into_iter().find_map(|call| match call {
            Call::Create { tracking, .. } => Some(tracking),
            _ => None,
        });
        assert_eq!(
            tracking.map(|t| t.url),
            Some("https://track.example.com/RX13".to_string())
        );
    }
}
