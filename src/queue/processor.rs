//! Time-sliced queue consumption and bulk backfill.

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;

use super::{dequeue_batch, enqueue_many, mark_complete, mark_error};
use crate::config::QueueConfig;
use crate::content::{find_item_ids, ContentFilter};
use crate::db::Db;
use crate::error::Result;
use crate::graph::reindex_item;
use crate::rules::RuleTable;

/// Summary of one [`process_cycle`] run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CycleReport {
    /// Entries reindexed and removed from the queue.
    pub processed: usize,
    /// Of those, items that no longer exist.
    pub tombstoned: usize,
    /// Entries that failed this cycle.
    pub failed: usize,
    /// Failed entries removed after exhausting their retries.
    pub dropped: usize,
    /// The cycle stopped because its time slice ran out.
    pub timed_out: bool,
}

/// Work through the queue in order until it is empty or the cycle's time
/// slice (`cycle_time_secs`) is used up.
///
/// Each entry is visited at most once per cycle; failures stay queued for
/// the next cycle with their retry count bumped.
pub async fn process_cycle(db: &Db, rules: Arc<RuleTable>, config: &QueueConfig) -> Result<CycleReport> {
    let deadline = Instant::now() + Duration::from_secs(config.cycle_time_secs);
    let batch_size = config.batch_size;
    let max_retries = config.max_retries;
    let mut report = CycleReport::default();
    let mut cursor = 0i64;

    'cycle: loop {
        let batch = db
            .with_connection(move |conn| dequeue_batch(conn, batch_size, cursor))
            .await?;
        if batch.is_empty() {
            break;
        }

        for entry in batch {
            if Instant::now() >= deadline {
                report.timed_out = true;
                break 'cycle;
            }
            cursor = entry.queue_id;

            let rules = Arc::clone(&rules);
            let queue_id = entry.queue_id;
            let item_id = entry.item_id;
            let result = db
                .with_connection(move |conn| {
                    let outcome = reindex_item(conn, &rules, item_id)?;
                    mark_complete(conn, queue_id)?;
                    Ok(outcome)
                })
                .await;

            match result {
                Ok(outcome) => {
                    report.processed += 1;
                    if !outcome.found {
                        report.tombstoned += 1;
                    }
                }
                Err(e) => {
                    report.failed += 1;
                    log::error!("Failed to reindex item {}: {}", item_id, e);
                    let message = e.to_string();
                    let dropped = db
                        .with_connection(move |conn| mark_error(conn, queue_id, &message, max_retries))
                        .await?;
                    if dropped {
                        report.dropped += 1;
                    }
                }
            }
        }
    }

    if report.processed > 0 || report.failed > 0 {
        log::info!(
            "Queue cycle: {} reindexed ({} tombstoned), {} failed, {} dropped{}",
            report.processed,
            report.tombstoned,
            report.failed,
            report.dropped,
            if report.timed_out { ", time slice exhausted" } else { "" }
        );
    }
    Ok(report)
}

/// Queue every published item whose content type has relationship rules.
///
/// Used after the rule table changes or on first install. Returns the number
/// of items queued.
pub async fn backfill(db: &Db, rules: &RuleTable) -> Result<usize> {
    let filter = ContentFilter::published_of_types(rules.content_types());
    if filter.content_types.is_empty() {
        return Ok(0);
    }
    let queued = db
        .with_connection(move |conn| {
            let ids = find_item_ids(conn, &filter)?;
            enqueue_many(conn, &ids)
        })
        .await?;
    log::info!("Backfill queued {} items", queued);
    Ok(queued)
}
