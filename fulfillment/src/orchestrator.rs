//! Windowed fan-out of records over the decision engine.

use crate::config::BatchConfig;
use crate::engine::DecisionEngine;
use crate::errors::BatchError;
use crate::metrics_defs::{BATCH_DURATION, BATCH_REJECTED};
use crate::store::ReportStore;
use crate::types::{FulfillmentResult, OrderIntentRecord, Report};
use chrono::Utc;
use shared::{counter, histogram};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::task::JoinSet;
use tokio::time::{Instant, sleep};

const INTERNAL_ERROR: &str = "Internal error while processing order";

/// One window's spawned record tasks.
struct SpawnedWindow {
    join_set: JoinSet<FulfillmentResult>,

    /// Maps task IDs to the record's position in the batch
    task_slots: HashMap<tokio::task::Id, usize>,
}

/// Runs a batch in fixed-size windows.
///
/// Records inside a window run concurrently; consecutive windows are
/// separated by the configured pacing delay. Results keep input order and
/// the finished report replaces the tenant's previous one in the store.
pub struct BatchOrchestrator {
    config: BatchConfig,
    store: Arc<dyn ReportStore>,
}

impl BatchOrchestrator {
    pub fn new(config: BatchConfig, store: Arc<dyn ReportStore>) -> Self {
        Self { config, store }
    }

    pub async fn run(
        &self,
        tenant: &str,
        records: Vec<OrderIntentRecord>,
        engine: Arc<DecisionEngine>,
    ) -> Result<Arc<Report>, BatchError> {
        self.check_intake(tenant, &records)?;

        let started = Instant::now();
        let window_size = self.config.window_size.max(1);
        let window_count = records.len().div_ceil(window_size);
        let mut slots: Vec<Option<FulfillmentResult>> = vec![None; records.len()];

        tracing::info!(
            tenant,
            records = records.len(),
            windows = window_count,
            "starting batch"
        );

        for (window_index, window) in records.chunks(window_size).enumerate() {
            if window_index > 0 {
                sleep(self.config.window_delay()).await;
            }

            let offset = window_index * window_size;
            let spawned = spawn_window(window, offset, &engine);
            collect_window(spawned, &records, &mut slots).await;
        }

        let results: Vec<FulfillmentResult> = slots
            .into_iter()
            .zip(&records)
            .map(|(slot, record)| {
                slot.unwrap_or_else(|| FulfillmentResult::failure(record, INTERNAL_ERROR))
            })
            .collect();

        let succeeded = results.iter().filter(|r| r.is_success()).count();
        let report = self.store.put(Report {
            tenant: tenant.to_string(),
            generated_at: Utc::now(),
            results,
        })?;

        histogram!(BATCH_DURATION).record(started.elapsed().as_secs_f64());
        tracing::info!(
            tenant,
            total = report.results.len(),
            succeeded,
            failed = report.results.len() - succeeded,
            "batch finished"
        );

        Ok(report)
    }

    fn check_intake(&self, tenant: &str, records: &[OrderIntentRecord]) -> Result<(), BatchError> {
        let rejection = if records.is_empty() {
            BatchError::NoOrders
        } else if records.len() > self.config.max_orders {
            BatchError::TooManyOrders {
                count: records.len(),
                max: self.config.max_orders,
            }
        } else {
            return Ok(());
        };

        let reason = match rejection {
            BatchError::NoOrders => "empty",
            _ => "too_many",
        };
        counter!(BATCH_REJECTED, "reason" => reason).increment(1);
        tracing::info!(tenant, reason, "batch rejected");

        Err(rejection)
    }
}

fn spawn_window(
    window: &[OrderIntentRecord],
    offset: usize,
    engine: &Arc<DecisionEngine>,
) -> SpawnedWindow {
    let mut join_set = JoinSet::new();
    let mut task_slots = HashMap::new();

    for (i, record) in window.iter().enumerate() {
        let engine = engine.clone();
        let record = record.clone();

        let abort_handle = join_set.spawn(async move { engine.process(&record).await });
        task_slots.insert(abort_handle.id(), offset + i);
    }

    SpawnedWindow {
        join_set,
        task_slots,
    }
}

/// Waits for every task of the window. A panicked task fills its slot with
/// an internal error result.
async fn collect_window(
    spawned: SpawnedWindow,
    records: &[OrderIntentRecord],
    slots: &mut [Option<FulfillmentResult>],
) {
    let SpawnedWindow {
        mut join_set,
        mut task_slots,
    } = spawned;

    while let Some(joined) = join_set.join_next_with_id().await {
        match joined {
            Ok((id, result)) => {
                if let Some(index) = task_slots.remove(&id) {
                    slots[index] = Some(result);
                }
            }
            Err(err) => {
                if let Some(index) = task_slots.remove(&err.id()) {
                    tracing::error!(
                        order_number = %records[index].order_number_raw,
                        error = %err,
                        "record task failed"
                    );
                    slots[index] = Some(FulfillmentResult::failure(&records[index], INTERNAL_ERROR));
                }
            }
        }
    }
}
