use chrono::{DateTime, Utc};
use qingli_core::{ItemId, MonitorEvent};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::{RwLock, mpsc};

/// 已删除条目的记录
#[derive(Debug, Clone, Serialize)]
pub struct DeletedItem {
    pub id: ItemId,
    pub title: String,
    pub deleted_at: DateTime<Utc>,
}

/// 最近一轮扫描的摘要
#[derive(Debug, Clone, Serialize)]
pub struct CycleSummary {
    pub finished_at: DateTime<Utc>,
    pub scanned: usize,
    pub deleted: usize,
    pub failed: usize,
}

/// 最近一次错误
#[derive(Debug, Clone, Serialize)]
pub struct LastError {
    pub at: DateTime<Utc>,
    pub message: String,
}

/// 轮询状态，供状态接口展示
#[derive(Debug, Clone, Serialize)]
pub struct MonitorStatus {
    /// 最近一轮扫描
    pub last_cycle: Option<CycleSummary>,
    /// 最近一次错误
    pub last_error: Option<LastError>,
    /// 最近删除的条目，最新的在前面
    pub recent_deletions: Vec<DeletedItem>,
    /// 最多保留的删除记录数
    #[serde(skip)]
    pub max_history: usize,
}

impl Default for MonitorStatus {
    fn default() -> Self {
        Self {
            last_cycle: None,
            last_error: None,
            recent_deletions: Vec::new(),
            max_history: 100,
        }
    }
}

impl MonitorStatus {
    pub fn apply(&mut self, event: MonitorEvent) {
        let now = Utc::now();
        match event {
            MonitorEvent::CycleStarted { .. } => {}
            MonitorEvent::ItemDeleted { id, title } => {
                self.recent_deletions.insert(
                    0,
                    DeletedItem {
                        id,
                        title,
                        deleted_at: now,
                    },
                );
                self.recent_deletions.truncate(self.max_history);
            }
            MonitorEvent::ItemFailed { id, error } => {
                let message = match id {
                    Some(id) => format!("item {id}: {error}"),
                    None => error,
                };
                self.last_error = Some(LastError { at: now, message });
            }
            MonitorEvent::CycleCompleted {
                scanned,
                deleted,
                failed,
            } => {
                self.last_cycle = Some(CycleSummary {
                    finished_at: now,
                    scanned,
                    deleted,
                    failed,
                });
            }
            MonitorEvent::CycleFailed { error } => {
                self.last_error = Some(LastError {
                    at: now,
                    message: error,
                });
            }
        }
    }
}

pub type SharedStatus = Arc<RwLock<MonitorStatus>>;

/// 把轮询事件写入共享状态
pub fn spawn_status_listener(
    status: SharedStatus,
    mut rx: mpsc::Receiver<MonitorEvent>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            status.write().await.apply(event);
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_apply_events() {
        let mut status = MonitorStatus::default();
        status.apply(MonitorEvent::CycleStarted { items: 2 });
        status.apply(MonitorEvent::ItemDeleted {
            id: ItemId::Number(1),
            title: "first".into(),
        });
        status.apply(MonitorEvent::ItemFailed {
            id: Some(ItemId::Number(2)),
            error: "timeout".into(),
        });
        status.apply(MonitorEvent::CycleCompleted {
            scanned: 2,
            deleted: 1,
            failed: 1,
        });

        let cycle = status.last_cycle.as_ref().unwrap();
        assert_eq!((cycle.scanned, cycle.deleted, cycle.failed), (2, 1, 1));
        assert_eq!(status.recent_deletions[0].title, "first");
        assert_eq!(status.last_error.unwrap().message, "item 2: timeout");
    }

    #[test]
    fn test_history_is_bounded_newest_first() {
        let mut status = MonitorStatus {
            max_history: 2,
            ..Default::default()
        };
        for i in 0..5 {
            status.apply(MonitorEvent::ItemDeleted {
                id: ItemId::Number(i),
                title: format!("t{i}"),
            });
        }
        let ids: Vec<_> = status.recent_deletions.iter().map(|d| d.id.clone()).collect();
        assert_eq!(ids, vec![ItemId::Number(4), ItemId::Number(3)]);
    }

    #[tokio::test]
    async fn test_listener_updates_shared_status() {
        let status: SharedStatus = Arc::default();
        let (tx, rx) = mpsc::channel(8);
        let task = spawn_status_listener(Arc::clone(&status), rx);

        tx.send(MonitorEvent::CycleFailed {
            error: "connection refused".into(),
        })
        .await
        .unwrap();
        drop(tx);
        task.await.unwrap();

        let status = status.read().await;
        assert_eq!(
            status.last_error.as_ref().unwrap().message,
            "connection refused"
        );
    }
}
