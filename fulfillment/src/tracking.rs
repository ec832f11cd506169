use crate::settings::TenantSettings;
use std::collections::BTreeMap;

/// Derives carrier tracking URLs from a tenant's carrier templates.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TrackingUrlResolver {
    default_company: String,
    default_template: String,
    templates: BTreeMap<String, String>,
}

impl TrackingUrlResolver {
    pub fn new(
        default_company: impl Into<String>,
        default_template: impl Into<String>,
        templates: BTreeMap<String, String>,
    ) -> Self {
        TrackingUrlResolver {
            default_company: default_company.into(),
            default_template: default_template.into(),
            templates,
        }
    }

    pub fn from_settings(settings: &TenantSettings) -> Self {
        Self::new(
            settings.default_tracking_company.clone(),
            settings.default_tracking_url_template.clone(),
            settings.tracking_url_templates.clone(),
        )
    }

    /// An explicit URL wins. Otherwise the carrier's template (or the default
    /// template) is concatenated with the tracking number as-is.
    ///
    /// Callers must not pass an empty tracking number.
    pub fn resolve(
        &self,
        tracking_number: &str,
        tracking_company: &str,
        explicit_url: Option<&str>,
    ) -> String {
        debug_assert!(!tracking_number.is_empty());

        if let Some(url) = explicit_url.map(str::trim).filter(|url| !url.is_empty()) {
            return url.to_string();
        }

        let company = match tracking_company.trim() {
            "" => self.default_company.as_str(),
            company => company,
        };

        let template = self
            .templates
            .get(company)
            .unwrap_or(&self.default_template);

        format!("{template}{tracking_number}")
    }
}
