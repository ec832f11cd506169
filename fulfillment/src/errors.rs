use thiserror::Error;

/// Failures while turning an upload into records. Surfaced to the merchant
/// before any remote call is made.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum ParseError {
    #[error("Unsupported file type: {0}")]
    UnsupportedFormat(String),

    #[error("Could not read file: {0}")]
    Unreadable(String),

    #[error("Excel file is empty or has no data rows")]
    NoRows,

    #[error("Missing required column: OrderNumber (or Name, Order Number)")]
    MissingOrderColumn,

    #[error("Missing required column: TrackingNumber (or Tracking Number)")]
    MissingTrackingColumn,
}

/// Errors from calls to the remote platform.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GatewayError {
    #[error("Request to {0} timed out")]
    Timeout(String),

    #[error("Request to {0} failed: {1}")]
    Transport(String, String),

    #[error("Rate limited by the platform")]
    RateLimited,

    #[error("Platform returned HTTP {status}: {message}")]
    Status { status: u16, message: String },

    #[error("Unexpected response from the platform: {0}")]
    Malformed(String),

    #[error("{0}")]
    Rejected(String),
}

impl GatewayError {
    /// Transport failures, timeouts, 5xx and 429 are worth another attempt.
    pub fn is_retryable(&self) -> bool {
        match self {
            GatewayError::Timeout(_) | GatewayError::Transport(..) | GatewayError::RateLimited => {
                true
            }
            GatewayError::Status { status, .. } => *status >= 500,
            GatewayError::Malformed(_) | GatewayError::Rejected(_) => false,
        }
    }
}

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Report store unavailable: {0}")]
    Unavailable(String),
}

/// Reasons a batch run does not produce a report.
#[derive(Error, Debug)]
pub enum BatchError {
    #[error("No orders found in file")]
    NoOrders,

    #[error("Too many orders: {count} rows exceeds the maximum of {max} per upload")]
    TooManyOrders { count: usize, max: usize },

    #[error("Could not store fulfillment report: {0}")]
    Store(#[from] StoreError),
}
