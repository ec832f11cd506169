use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub type TenantId = String;

/// One spreadsheet row, normalized.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OrderIntentRecord {
    /// The order number exactly as typed by the merchant (trimmed).
    pub order_number_raw: String,
    /// Digits of `order_number_raw`, used for the platform lookup.
    pub order_number_numeric: Option<u64>,
    pub tracking_number: String,
    pub tracking_company: String,
    /// `None` means the URL is derived from the carrier template.
    pub tracking_url: Option<String>,
}

impl OrderIntentRecord {
    pub fn new(
        order_number_raw: &str,
        tracking_number: &str,
        tracking_company: &str,
        tracking_url: Option<&str>,
    ) -> Self {
        let order_number_raw = order_number_raw.trim().to_string();
        let order_number_numeric = extract_order_number(&order_number_raw);

        OrderIntentRecord {
            order_number_raw,
            order_number_numeric,
            tracking_number: tracking_number.trim().to_string(),
            tracking_company: tracking_company.trim().to_string(),
            tracking_url: tracking_url
                .map(str::trim)
                .filter(|url| !url.is_empty())
                .map(String::from),
        }
    }
}

/// Strips every non-digit character. Lossy for stores whose order names are
/// not numeric; those rows end up as "Order not found". Digit runs too long
/// for a `u64` saturate so the row is still looked up rather than reported
/// as missing input.
pub fn extract_order_number(raw: &str) -> Option<u64> {
    let digits: String = raw
        .chars()
        .filter(char::is_ascii_digit)
        .skip_while(|c| *c == '0')
        .collect();

    if digits.is_empty() {
        return None;
    }
    Some(digits.parse::<u64>().unwrap_or(u64::MAX))
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RemoteFulfillmentStatus {
    Unfulfilled,
    Partial,
    Fulfilled,
}

impl RemoteFulfillmentStatus {
    /// Maps the platform's `fulfillment_status` field. The platform reports
    /// unfulfilled orders as `null`; unknown values are treated the same way.
    pub fn from_platform(status: Option<&str>) -> Self {
        match status {
            Some("fulfilled") => RemoteFulfillmentStatus::Fulfilled,
            Some("partial") => RemoteFulfillmentStatus::Partial,
            _ => RemoteFulfillmentStatus::Unfulfilled,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExistingFulfillment {
    pub id: String,
    pub tracking_number: Option<String>,
}

impl ExistingFulfillment {
    pub fn has_tracking(&self) -> bool {
        self.tracking_number
            .as_deref()
            .is_some_and(|number| !number.trim().is_empty())
    }
}

/// Snapshot of an order as returned by a lookup.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RemoteOrder {
    pub id: String,
    pub order_number: u64,
    pub fulfillment_status: RemoteFulfillmentStatus,
    pub fulfillments: Vec<ExistingFulfillment>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum WindowStatus {
    Open,
    Scheduled,
    InProgress,
    Closed,
    Cancelled,
    Incomplete,
    OnHold,
    Other(String),
}

impl WindowStatus {
    pub fn parse(status: &str) -> Self {
        match status {
            "OPEN" => WindowStatus::Open,
            "SCHEDULED" => WindowStatus::Scheduled,
            "IN_PROGRESS" => WindowStatus::InProgress,
            "CLOSED" => WindowStatus::Closed,
            "CANCELLED" => WindowStatus::Cancelled,
            "INCOMPLETE" => WindowStatus::Incomplete,
            "ON_HOLD" => WindowStatus::OnHold,
            other => WindowStatus::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            WindowStatus::Open => "OPEN",
            WindowStatus::Scheduled => "SCHEDULED",
            WindowStatus::InProgress => "IN_PROGRESS",
            WindowStatus::Closed => "CLOSED",
            WindowStatus::Cancelled => "CANCELLED",
            WindowStatus::Incomplete => "INCOMPLETE",
            WindowStatus::OnHold => "ON_HOLD",
            WindowStatus::Other(status) => status,
        }
    }

    /// Statuses a new fulfillment may be created against.
    pub fn is_fulfillable(&self) -> bool {
        matches!(
            self,
            WindowStatus::Open | WindowStatus::Scheduled | WindowStatus::InProgress
        )
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WindowLineItem {
    pub id: String,
    pub remaining_quantity: u32,
}

/// The platform's fulfillment order: an open unit of fulfillable work.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FulfillmentWindow {
    pub id: String,
    pub status: WindowStatus,
    pub line_items: Vec<WindowLineItem>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LineItemSelection {
    pub id: String,
    pub quantity: u32,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct TrackingInfo {
    pub number: String,
    pub company: String,
    pub url: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CreatedFulfillment {
    pub id: String,
    pub status: Option<String>,
}

/// Payload of a fulfillment creation call.
#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub struct FulfillmentCreation {
    pub fulfillment: Option<CreatedFulfillment>,
    pub user_errors: Vec<String>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Outcome {
    Success {
        status: String,
        fulfillment_id: String,
    },
    Failure {
        error: String,
    },
}

/// Result of processing one record. The outcome enum makes "both present"
/// and "both absent" unrepresentable.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "FulfillmentResultWire", try_from = "FulfillmentResultWire")]
pub struct FulfillmentResult {
    pub order_number: String,
    pub tracking_number: String,
    pub tracking_company: String,
    pub outcome: Outcome,
}

impl FulfillmentResult {
    pub fn success(
        record: &OrderIntentRecord,
        status: impl Into<String>,
        fulfillment_id: impl Into<String>,
    ) -> Self {
        Self::with_outcome(
            record,
            Outcome::Success {
                status: status.into(),
                fulfillment_id: fulfillment_id.into(),
            },
        )
    }

    pub fn failure(record: &OrderIntentRecord, error: impl Into<String>) -> Self {
        Self::with_outcome(
            record,
            Outcome::Failure {
                error: error.into(),
            },
        )
    }

    fn with_outcome(record: &OrderIntentRecord, outcome: Outcome) -> Self {
        FulfillmentResult {
            order_number: record.order_number_raw.clone(),
            tracking_number: record.tracking_number.clone(),
            tracking_company: record.tracking_company.clone(),
            outcome,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self.outcome, Outcome::Success { .. })
    }

    pub fn error(&self) -> Option<&str> {
        match &self.outcome {
            Outcome::Failure { error } => Some(error),
            Outcome::Success { .. } => None,
        }
    }

    pub fn fulfillment_id(&self) -> Option<&str> {
        match &self.outcome {
            Outcome::Success { fulfillment_id, .. } => Some(fulfillment_id),
            Outcome::Failure { .. } => None,
        }
    }

    /// Error message on failure, status text on success.
    pub fn detail(&self) -> &str {
        match &self.outcome {
            Outcome::Success { status, .. } => status,
            Outcome::Failure { error } => error,
        }
    }
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FulfillmentResultWire {
    order_number: String,
    tracking_number: String,
    tracking_company: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    fulfillment_id: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

impl From<FulfillmentResult> for FulfillmentResultWire {
    fn from(result: FulfillmentResult) -> Self {
        let (status, fulfillment_id, error) = match result.outcome {
            Outcome::Success {
                status,
                fulfillment_id,
            } => (Some(status), Some(fulfillment_id), None),
            Outcome::Failure { error } => (None, None, Some(error)),
        };

        FulfillmentResultWire {
            order_number: result.order_number,
            tracking_number: result.tracking_number,
            tracking_company: result.tracking_company,
            status,
            fulfillment_id,
            error,
        }
    }
}

impl TryFrom<FulfillmentResultWire> for FulfillmentResult {
    type Error = String;

    fn try_from(wire: FulfillmentResultWire) -> Result<Self, Self::Error> {
        let outcome = match (wire.status, wire.fulfillment_id, wire.error) {
            (Some(status), Some(fulfillment_id), None) => Outcome::Success {
                status,
                fulfillment_id,
            },
            (None, None, Some(error)) => Outcome::Failure { error },
            _ => {
                return Err(format!(
                    "result for order {} must carry either status and fulfillmentId or error",
                    wire.order_number
                ));
            }
        };

        Ok(FulfillmentResult {
            order_number: wire.order_number,
            tracking_number: wire.tracking_number,
            tracking_company: wire.tracking_company,
            outcome,
        })
    }
}

/// Ordered results of one batch run for one tenant.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Report {
    pub tenant: TenantId,
    pub generated_at: DateTime<Utc>,
    pub results: Vec<FulfillmentResult>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportStats {
    pub total: usize,
    pub success: usize,
    pub failed: usize,
}
