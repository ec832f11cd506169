use shared::metrics_defs::{MetricDef, MetricType};

pub const BATCH_DURATION: MetricDef = MetricDef {
    name: "batch.duration",
    metric_type: MetricType::Histogram,
    description: "Time to process a whole upload in seconds",
};

pub const BATCH_REJECTED: MetricDef = MetricDef {
    name: "batch.rejected",
    metric_type: MetricType::Counter,
    description: "Uploads rejected at intake. Tagged with reason.",
};

pub const RECORDS_PROCESSED: MetricDef = MetricDef {
    name: "records.processed",
    metric_type: MetricType::Counter,
    description: "Records that reached a terminal outcome. Tagged with outcome.",
};

pub const GATEWAY_REQUEST_DURATION: MetricDef = MetricDef {
    name: "gateway.request.duration",
    metric_type: MetricType::Histogram,
    description: "Duration of a single platform call in seconds. Tagged with operation.",
};

pub const GATEWAY_RETRIES: MetricDef = MetricDef {
    name: "gateway.retries",
    metric_type: MetricType::Counter,
    description: "Platform calls retried after a retryable failure. Tagged with operation.",
};

pub const ALL_METRICS: &[MetricDef] = &[
    BATCH_DURATION,
    BATCH_REJECTED,
    RECORDS_PROCESSED,
    GATEWAY_REQUEST_DURATION,
    GATEWAY_RETRIES,
];

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_metric_names_are_unique() {
        let names: HashSet<&str> = ALL_METRICS.iter().map(|m| m.name).collect();
        assert_eq!(names.len(), ALL_METRICS.len());
    }
}
