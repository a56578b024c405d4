use crate::types::QueueItem;
use chrono::{DateTime, Utc};
use serde::Serialize;

/// 平均速度为零时的预计剩余时间（分钟），视为"无限长"
pub const UNKNOWN_REMAINING_MINUTES: f64 = 99_999_999.0 / 60.0;

/// 由队列条目推导出的下载指标，每轮每个条目计算一次
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct DerivedMetrics {
    /// 已经过的时间（秒），不会为负
    pub elapsed_seconds: f64,
    /// 已下载字节数
    pub downloaded_bytes: f64,
    /// 平均速度（字节/秒）
    pub average_speed_bps: f64,
    /// 预计剩余时间（分钟）
    pub estimated_remaining_minutes: f64,
    /// 完成百分比
    pub percent_complete: f64,
}

impl DerivedMetrics {
    pub fn elapsed_minutes(&self) -> f64 {
        self.elapsed_seconds / 60.0
    }
}

/// 计算条目的下载指标
///
/// `size_left > size` 时已下载量和速度为负值，这里原样保留，不做截断。
pub fn derive(item: &QueueItem, now: DateTime<Utc>) -> DerivedMetrics {
    let elapsed_seconds = ((now - item.added).num_milliseconds() as f64 / 1000.0).max(0.0);
    let downloaded_bytes = item.size - item.size_left;

    let average_speed_bps = if elapsed_seconds > 0.0 {
        downloaded_bytes / elapsed_seconds
    } else {
        0.0
    };

    let estimated_remaining_minutes = if average_speed_bps > 0.0 {
        item.size_left / average_speed_bps / 60.0
    } else {
        UNKNOWN_REMAINING_MINUTES
    };

    let percent_complete = if item.size > 0.0 {
        downloaded_bytes / item.size * 100.0
    } else {
        0.0
    };

    DerivedMetrics {
        elapsed_seconds,
        downloaded_bytes,
        average_speed_bps,
        estimated_remaining_minutes,
        percent_complete,
    }
}
