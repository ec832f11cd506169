use crate::config::TrackingConfig;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// Carrier settings for one tenant.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TenantSettings {
    pub default_tracking_company: String,
    pub default_tracking_url_template: String,
    pub tracking_url_templates: BTreeMap<String, String>,
}

impl From<&TrackingConfig> for TenantSettings {
    fn from(config: &TrackingConfig) -> Self {
        TenantSettings {
            default_tracking_company: config.default_company.clone(),
            default_tracking_url_template: config.default_url_template.clone(),
            tracking_url_templates: config.url_templates.clone(),
        }
    }
}

/// Partial update; absent fields keep their current value and templates are
/// merged carrier by carrier.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SettingsUpdate {
    pub default_tracking_company: Option<String>,
    pub default_tracking_url_template: Option<String>,
    #[serde(default)]
    pub tracking_url_templates: BTreeMap<String, String>,
}

impl SettingsUpdate {
    pub fn is_empty(&self) -> bool {
        self.default_tracking_company.is_none()
            && self.default_tracking_url_template.is_none()
            && self.tracking_url_templates.is_empty()
    }

    fn apply(self, settings: &mut TenantSettings) {
        if let Some(company) = self.default_tracking_company {
            settings.default_tracking_company = company.trim().to_string();
        }
        if let Some(template) = self.default_tracking_url_template {
            settings.default_tracking_url_template = template.trim().to_string();
        }
        for (company, template) in self.tracking_url_templates {
            settings
                .tracking_url_templates
                .insert(company.trim().to_string(), template.trim().to_string());
        }
    }
}

/// In-memory per-tenant settings, seeded from the service configuration.
pub struct SettingsStore {
    defaults: TenantSettings,
    tenants: RwLock<HashMap<String, TenantSettings>>,
}

impl SettingsStore {
    pub fn new(defaults: TenantSettings) -> Self {
        SettingsStore {
            defaults,
            tenants: RwLock::new(HashMap::new()),
        }
    }

    pub fn get(&self, tenant: &str) -> TenantSettings {
        self.tenants
            .read()
            .get(tenant)
            .cloned()
            .unwrap_or_else(|| self.defaults.clone())
    }

    pub fn save(&self, tenant: &str, update: SettingsUpdate) -> TenantSettings {
        let mut tenants = self.tenants.write();
        let settings = tenants
            .entry(tenant.to_string())
            .or_insert_with(|| self.defaults.clone());

        update.apply(settings);
        tracing::info!(tenant, "settings saved");

        settings.clone()
    }
}
