use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;
use url::Url;

#[derive(Error, Debug)]
pub enum ValidationError {
    #[error("Port cannot be 0")]
    InvalidPort,

    #[error("retry.max_attempts must be at least 1")]
    InvalidMaxAttempts,

    #[error("batch.window_size must be at least 1")]
    InvalidWindowSize,

    #[error("batch.max_orders must be at least 1")]
    InvalidMaxOrders,

    #[error("platform.timeout_secs must be at least 1")]
    InvalidTimeout,

    #[error("Empty tracking company name")]
    EmptyTrackingCompany,

    #[error("Empty tracking URL template for carrier: {0}")]
    EmptyUrlTemplate(String),
}

/// Fulfillment service configuration
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct Config {
    /// Listener for the fulfillment API
    pub listener: Listener,
    /// Admin listener for health and readiness probes
    pub admin_listener: Listener,
    #[serde(default)]
    pub platform: PlatformConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub batch: BatchConfig,
    #[serde(default)]
    pub upload: UploadConfig,
    #[serde(default)]
    pub tracking: TrackingConfig,
}

impl Config {
    pub fn validate(&self) -> Result<(), ValidationError> {
        self.listener.validate()?;
        self.admin_listener.validate()?;

        if self.platform.timeout_secs == 0 {
            return Err(ValidationError::InvalidTimeout);
        }
        if self.retry.max_attempts == 0 {
            return Err(ValidationError::InvalidMaxAttempts);
        }
        if self.batch.window_size == 0 {
            return Err(ValidationError::InvalidWindowSize);
        }
        if self.batch.max_orders == 0 {
            return Err(ValidationError::InvalidMaxOrders);
        }

        self.tracking.validate()
    }
}

/// Network listener configuration
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct Listener {
    /// Host address to bind to (e.g., "0.0.0.0" or "127.0.0.1")
    pub host: String,
    pub port: u16,
}

impl Listener {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.port == 0 {
            return Err(ValidationError::InvalidPort);
        }
        Ok(())
    }
}

/// Remote commerce platform settings
#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(default)]
pub struct PlatformConfig {
    /// Admin API version segment, e.g. "2024-10"
    pub api_version: String,
    /// Overrides `https://{shop}` as the API origin. Used for tests and
    /// for routing through an egress proxy.
    pub base_url: Option<Url>,
    /// Timeout for each outbound call, including reading the body
    pub timeout_secs: u64,
}

impl PlatformConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for PlatformConfig {
    fn default() -> Self {
        PlatformConfig {
            api_version: "2024-10".into(),
            base_url: None,
            timeout_secs: 30,
        }
    }
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(default)]
pub struct RetryConfig {
    /// Total attempts per gateway operation, including the first
    pub max_attempts: u32,
    pub base_delay_ms: u64,
}

impl RetryConfig {
    pub fn base_delay(&self) -> Duration {
        Duration::from_millis(self.base_delay_ms)
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        RetryConfig {
            max_attempts: 3,
            base_delay_ms: 1000,
        }
    }
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(default)]
pub struct BatchConfig {
    /// Largest accepted upload, in rows
    pub max_orders: usize,
    /// Records processed concurrently before a pacing pause
    pub window_size: usize,
    /// Pause between consecutive windows
    pub window_delay_ms: u64,
}

impl BatchConfig {
    pub fn window_delay(&self) -> Duration {
        Duration::from_millis(self.window_delay_ms)
    }
}

impl Default for BatchConfig {
    fn default() -> Self {
        BatchConfig {
            max_orders: 500,
            window_size: 10,
            window_delay_ms: 500,
        }
    }
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(default)]
pub struct UploadConfig {
    /// Maximum upload size in bytes
    pub max_file_size: usize,
    /// Directory for temporary upload files; the system temp dir when unset
    pub temp_dir: Option<PathBuf>,
}

impl Default for UploadConfig {
    fn default() -> Self {
        UploadConfig {
            max_file_size: 10 * 1024 * 1024,
            temp_dir: None,
        }
    }
}

const INDIA_POST_TEMPLATE: &str = "https://www.indiapost.gov.in/VAS/Pages/trackconsignment.aspx?tn=";

/// Carrier defaults every tenant starts from
#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(default)]
pub struct TrackingConfig {
    pub default_company: String,
    pub default_url_template: String,
    /// Maps carrier names to URL prefixes the tracking number is appended to
    pub url_templates: BTreeMap<String, String>,
}

impl TrackingConfig {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.default_company.trim().is_empty() {
            return Err(ValidationError::EmptyTrackingCompany);
        }
        if self.default_url_template.trim().is_empty() {
            return Err(ValidationError::EmptyUrlTemplate(self.default_company.clone()));
        }
        for (company, template) in &self.url_templates {
            if company.trim().is_empty() {
                return Err(ValidationError::EmptyTrackingCompany);
            }
            if template.trim().is_empty() {
                return Err(ValidationError::EmptyUrlTemplate(company.clone()));
            }
        }
        Ok(())
    }
}

impl Default for TrackingConfig {
    fn default() -> Self {
        let url_templates = [
            ("India Post", INDIA_POST_TEMPLATE),
            ("BlueDart", "https://www.bluedart.com/tracking?ref="),
            ("Delhivery", "https://www.delhivery.com/track/package/"),
            ("DTDC", "https://www.dtdc.in/tracking.asp?strCnno="),
            ("FedEx", "https://www.fedex.com/fedextrack/?tracknumbers="),
            ("DHL", "https://www.dhl.com/en/express/tracking.html?AWB="),
        ]
        .into_iter()
        .map(|(company, template)| (company.to_string(), template.to_string()))
        .collect();

        TrackingConfig {
            default_company: "India Post".into(),
            default_url_template: INDIA_POST_TEMPLATE.into(),
            url_templates,
        }
    }
}
