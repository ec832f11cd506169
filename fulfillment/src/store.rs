use crate::errors::StoreError;
use crate::types::Report;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

/// Holds the most recent report per tenant. A `put` replaces the previous
/// report wholesale.
pub trait ReportStore: Send + Sync {
    fn put(&self, report: Report) -> Result<Arc<Report>, StoreError>;

    fn get(&self, tenant: &str) -> Option<Arc<Report>>;
}

#[derive(Default)]
pub struct InMemoryReportStore {
    reports: RwLock<HashMap<String, Arc<Report>>>,
}

impl InMemoryReportStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ReportStore for InMemoryReportStore {
    fn put(&self, report: Report) -> Result<Arc<Report>, StoreError> {
        let report = Arc::new(report);
        self.reports
            .write()
            .insert(report.tenant.clone(), report.clone());
        Ok(report)
    }

    fn get(&self, tenant: &str) -> Option<Arc<Report>> {
        self.reports.read().get(tenant).cloned()
    }
}
