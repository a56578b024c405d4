use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// 队列条目标识符，上游可能返回数字或字符串
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ItemId {
    Number(i64),
    Text(String),
}

impl ItemId {
    /// 尽力从原始记录中取出 `id`，用于在记录解析失败时记录日志
    pub fn from_record(record: &Value) -> Option<Self> {
        match record.get("id")? {
            Value::Number(n) => n.as_i64().map(ItemId::Number),
            Value::String(s) => Some(ItemId::Text(s.clone())),
            _ => None,
        }
    }
}

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ItemId::Number(n) => write!(f, "{n}"),
            ItemId::Text(s) => f.write_str(s),
        }
    }
}

/// 下载队列中的一个条目（只读快照）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueItem {
    /// 条目标识符
    pub id: ItemId,
    /// 标题
    #[serde(default)]
    pub title: String,
    /// 总大小（字节）
    pub size: f64,
    /// 剩余大小（字节）
    #[serde(rename = "sizeleft")]
    pub size_left: f64,
    /// 加入队列的时间（UTC）
    pub added: DateTime<Utc>,
    /// 状态标签，如 "downloading"、"warning"、"paused"
    pub status: String,
}

impl QueueItem {
    pub fn from_record(record: &Value) -> serde_json::Result<Self> {
        Self::deserialize(record)
    }
}

/// 轮询事件
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MonitorEvent {
    /// 一轮扫描开始
    CycleStarted { items: usize },
    /// 条目已删除并重新搜索
    ItemDeleted { id: ItemId, title: String },
    /// 单个条目处理失败
    ItemFailed { id: Option<ItemId>, error: String },
    /// 一轮扫描完成
    CycleCompleted {
        scanned: usize,
        deleted: usize,
        failed: usize,
    },
    /// 获取队列失败，进入退避等待
    CycleFailed { error: String },
}
