use crate::{
    client::QueueApi,
    metrics::{self, DerivedMetrics},
    nbyte::Rate,
    rules::{self, RuleSet},
    types::{ItemId, QueueItem},
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use std::collections::HashSet;
use tracing::{debug, error, info, warn};

/// 单个条目的判定结果
#[derive(Debug, Clone)]
pub struct Selection {
    pub item: QueueItem,
    pub metrics: DerivedMetrics,
    /// true 表示需要删除
    pub verdict: bool,
}

/// 单个条目的处理失败
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ItemFailure {
    pub id: Option<ItemId>,
    pub error: String,
}

/// 一轮扫描的结果
#[derive(Debug, Clone, Default, Serialize)]
pub struct ScanReport {
    /// 快照中的记录数
    pub scanned: usize,
    /// 命中规则的条目
    pub matched: Vec<ItemId>,
    /// 成功删除的条目
    pub deleted: Vec<(ItemId, String)>,
    /// 处理失败的条目
    pub failures: Vec<ItemFailure>,
}

/// 解析一条原始记录并做出判定
pub fn inspect(
    rule_set: Option<&RuleSet>,
    record: &Value,
    now: DateTime<Utc>,
) -> Result<Selection, ItemFailure> {
    let item = QueueItem::from_record(record).map_err(|e| ItemFailure {
        id: ItemId::from_record(record),
        error: format!("malformed queue record: {e}"),
    })?;

    let metrics = metrics::derive(&item, now);
    if item.size_left > item.size {
        warn!(
            id = %item.id,
            size = item.size,
            sizeleft = item.size_left,
            "remaining size exceeds total size"
        );
    }
    debug!(
        title = %item.title,
        elapsed_min = %format!("{:.2}", metrics.elapsed_minutes()),
        speed = %Rate(metrics.average_speed_bps),
        estimated_min = %format!("{:.2}", metrics.estimated_remaining_minutes),
        progress = %format!("{:.2}%", metrics.percent_complete),
        "download stats"
    );

    let verdict = rules::evaluate(rule_set, &metrics, &item.status);
    Ok(Selection {
        item,
        metrics,
        verdict,
    })
}

/// 对整个快照做出判定，不执行删除
pub fn select(
    rule_set: Option<&RuleSet>,
    records: &[Value],
    now: DateTime<Utc>,
) -> Vec<Result<Selection, ItemFailure>> {
    records
        .iter()
        .map(|record| inspect(rule_set, record, now))
        .collect()
}

/// 执行一轮扫描：判定每个条目，删除命中的条目
///
/// 单个条目的失败只会被记录，不会中断其余条目的处理；同一轮内同一个 id 最多删除一次。
pub async fn scan_cycle<A>(
    api: &A,
    rule_set: Option<&RuleSet>,
    records: &[Value],
    now: DateTime<Utc>,
) -> ScanReport
where
    A: QueueApi + ?Sized,
{
    info!(count = records.len(), "analyzing downloads");

    let mut report = ScanReport {
        scanned: records.len(),
        ..Default::default()
    };
    let mut seen = HashSet::new();

    for result in select(rule_set, records, now) {
        let selection = match result {
            Ok(selection) => selection,
            Err(failure) => {
                let id = failure
                    .id
                    .as_ref()
                    .map_or_else(|| "unknown".to_string(), ItemId::to_string);
                error!(%id, "error processing record: {}", failure.error);
                report.failures.push(failure);
                continue;
            }
        };

        let item = selection.item;
        if !selection.verdict || !seen.insert(item.id.clone()) {
            continue;
        }
        report.matched.push(item.id.clone());

        info!(
            id = %item.id,
            title = %item.title,
            status = %item.status,
            "deleting and re-searching download"
        );
        match api.delete_item(&item.id).await {
            Ok(()) => {
                info!(id = %item.id, "successfully deleted download");
                report.deleted.push((item.id, item.title));
            }
            Err(e) => {
                error!(id = %item.id, "failed to delete download: {e}");
                report.failures.push(ItemFailure {
                    id: Some(item.id),
                    error: e.to_string(),
                });
            }
        }
    }

    report
}
