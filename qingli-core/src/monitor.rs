use crate::{
    client::{QueueApi, SonarrClient},
    config::{Config, ConfigStore},
    error::ApiError,
    scanner::{self, ScanReport},
    types::MonitorEvent,
};
use anyhow::{Context, Result};
use chrono::Utc;
use std::{sync::Arc, time::Duration};
use tokio::sync::{Notify, mpsc};
use tracing::{debug, error, info};

/// 获取队列失败后的固定等待时间
pub const FETCH_BACKOFF: Duration = Duration::from_secs(60);

/// 根据配置创建队列 API 客户端
pub type Connector = Arc<dyn Fn(&Config) -> Result<Arc<dyn QueueApi>, ApiError> + Send + Sync>;

/// 一轮成功扫描的结果
#[derive(Debug, Clone)]
pub struct CycleOutcome {
    pub report: ScanReport,
    /// 本轮使用的轮询间隔（分钟）
    pub refresh_interval: u64,
}

/// 唤醒轮询循环的句柄
#[derive(Debug, Clone)]
pub struct MonitorHandle {
    wake: Arc<Notify>,
}

impl MonitorHandle {
    /// 立即开始下一轮扫描（不会打断正在进行的一轮）
    pub fn trigger(&self) {
        self.wake.notify_one();
    }
}

/// 队列轮询器
pub struct Monitor {
    store: Arc<ConfigStore>,
    connector: Connector,
    wake: Arc<Notify>,
    event_tx: mpsc::Sender<MonitorEvent>,
}

impl Monitor {
    /// 创建使用 Sonarr 客户端的轮询器
    ///
    /// # 返回
    /// 返回轮询器实例和事件接收器
    pub fn new(store: Arc<ConfigStore>) -> (Self, mpsc::Receiver<MonitorEvent>) {
        let connector: Connector = Arc::new(|config: &Config| {
            let client = SonarrClient::connect(config)?;
            Ok(Arc::new(client) as Arc<dyn QueueApi>)
        });
        Self::with_connector(store, connector)
    }

    /// 使用自定义客户端工厂创建轮询器
    pub fn with_connector(
        store: Arc<ConfigStore>,
        connector: Connector,
    ) -> (Self, mpsc::Receiver<MonitorEvent>) {
        let (event_tx, event_rx) = mpsc::channel(1024);
        let monitor = Self {
            store,
            connector,
            wake: Arc::new(Notify::new()),
            event_tx,
        };
        (monitor, event_rx)
    }

    pub fn handle(&self) -> MonitorHandle {
        MonitorHandle {
            wake: Arc::clone(&self.wake),
        }
    }

    /// 执行一轮：重新读取配置、连接、获取队列、扫描
    ///
    /// 只有配置、连接或获取队列失败时返回错误；单个条目的失败记录在报告中。
    pub async fn run_cycle(&self) -> Result<CycleOutcome> {
        let config = self.store.reload().await;
        let api = (self.connector)(&config).context("failed to create queue API client")?;

        debug!("fetching queue data from API");
        let records = api
            .fetch_queue()
            .await
            .context("failed to fetch queue")?;
        let _ = self
            .event_tx
            .send(MonitorEvent::CycleStarted {
                items: records.len(),
            })
            .await;

        let report =
            scanner::scan_cycle(api.as_ref(), config.rules.as_ref(), &records, Utc::now()).await;
        self.publish(&report).await;

        Ok(CycleOutcome {
            report,
            refresh_interval: config.refresh_interval,
        })
    }

    async fn publish(&self, report: &ScanReport) {
        for (id, title) in &report.deleted {
            let _ = self
                .event_tx
                .send(MonitorEvent::ItemDeleted {
                    id: id.clone(),
                    title: title.clone(),
                })
                .await;
        }
        for failure in &report.failures {
            let _ = self
                .event_tx
                .send(MonitorEvent::ItemFailed {
                    id: failure.id.clone(),
                    error: failure.error.clone(),
                })
                .await;
        }
        let _ = self
            .event_tx
            .send(MonitorEvent::CycleCompleted {
                scanned: report.scanned,
                deleted: report.deleted.len(),
                failed: report.failures.len(),
            })
            .await;
    }

    /// 持续轮询，永不返回
    pub async fn run(self) {
        info!("starting download monitor");
        loop {
            let delay = match self.run_cycle().await {
                Ok(outcome) => {
                    info!(
                        scanned = outcome.report.scanned,
                        deleted = outcome.report.deleted.len(),
                        failed = outcome.report.failures.len(),
                        "monitor cycle finished"
                    );
                    Duration::from_secs(outcome.refresh_interval.max(1) * 60)
                }
                Err(e) => {
                    error!("error in monitor cycle: {e:#}");
                    let _ = self
                        .event_tx
                        .send(MonitorEvent::CycleFailed {
                            error: format!("{e:#}"),
                        })
                        .await;
                    FETCH_BACKOFF
                }
            };
            self.sleep(delay).await;
        }
    }

    async fn sleep(&self, delay: Duration) {
        tokio::select! {
            _ = tokio::time::sleep(delay) => {}
            _ = self.wake.notified() => {
                debug!("monitor woken up by trigger");
            }
        }
    }
}
