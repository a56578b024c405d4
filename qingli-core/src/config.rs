use crate::rules::{Condition, Rule, RuleSet};
use anyhow::{Context, Result};
use fs_err::tokio as fs;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, error, info, warn};

/// 应用配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Sonarr API Key
    pub apikey: String,
    /// 主机名
    pub host: String,
    /// 端口
    pub port: u16,
    /// 是否使用 HTTPS
    pub ssl: bool,
    /// 反向代理路径前缀
    pub url_base: String,
    /// 轮询间隔（分钟）
    pub refresh_interval: u64,
    /// 请求超时（秒）
    pub timeout: u64,
    /// 分页获取队列时每页的条目数
    pub page_size: u32,
    /// 规则集，`None` 表示未配置
    pub rules: Option<RuleSet>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            apikey: String::new(),
            host: "localhost".to_string(),
            port: 8989,
            ssl: false,
            url_base: String::new(),
            refresh_interval: 5,
            timeout: 30,
            page_size: 100,
            rules: Some(RuleSet::new(vec![Rule::new(
                true,
                vec![
                    Condition::ElapsedOver { minutes: 5.0 },
                    Condition::SpeedBelow { kbps: 50.0 },
                ],
            )])),
        }
    }
}

impl Config {
    /// 从文件加载配置，文件不存在时返回默认配置
    pub async fn load(path: &Path) -> Result<Self> {
        if path.exists() {
            let content = fs::read_to_string(path).await?;
            let config: Config = serde_json::from_str(&content)
                .with_context(|| format!("invalid configuration in {}", path.display()))?;
            Ok(config)
        } else {
            debug!(path = %path.display(), "configuration file not found, using defaults");
            Ok(Self::default())
        }
    }

    /// 保存配置到文件
    pub async fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent).await?;
        }
        let content = serde_json::to_string_pretty(self)?;
        fs::write(path, content).await?;
        Ok(())
    }

    /// 验证配置的有效性
    pub fn validate(&self) -> Result<()> {
        if self.host.trim().is_empty() {
            anyhow::bail!("host must not be empty");
        }
        if self.refresh_interval == 0 {
            anyhow::bail!("refresh_interval must be greater than 0");
        }
        if self.timeout == 0 {
            anyhow::bail!("timeout must be greater than 0");
        }
        if self.page_size == 0 {
            anyhow::bail!("page_size must be greater than 0");
        }
        Ok(())
    }
}

/// 配置文件的唯一拥有者
///
/// 写入通过互斥锁串行化，先写临时文件再重命名；读取方拿到的是快照副本。
#[derive(Debug)]
pub struct ConfigStore {
    path: PathBuf,
    current: RwLock<Config>,
    write_lock: Mutex<()>,
}

impl ConfigStore {
    /// 打开配置文件；文件无效时记录错误并使用默认配置
    pub async fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let current = Self::read_or_default(&path).await;
        Self {
            path,
            current: RwLock::new(current),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// 当前配置快照
    pub async fn snapshot(&self) -> Config {
        self.current.read().await.clone()
    }

    /// 重新读取配置文件并返回新的快照
    ///
    /// 与 [`update`](Self::update) 共用写锁，避免旧内容覆盖刚写入的快照。
    pub async fn reload(&self) -> Config {
        let _guard = self.write_lock.lock().await;
        let config = Self::read_or_default(&self.path).await;
        *self.current.write().await = config.clone();
        config
    }

    /// 校验并持久化新配置，成功后刷新快照
    pub async fn update(&self, config: Config) -> Result<Config> {
        config.validate()?;

        let _guard = self.write_lock.lock().await;
        let tmp_path = self.path.with_extension("json.tmp");
        if let Err(e) = self.replace_file(&config, &tmp_path).await {
            if tmp_path.exists()
                && let Err(remove_err) = fs::remove_file(&tmp_path).await
            {
                warn!("failed to remove temporary configuration file: {remove_err}");
            }
            return Err(e);
        }

        *self.current.write().await = config.clone();
        info!(path = %self.path.display(), "configuration updated");
        Ok(config)
    }

    async fn replace_file(&self, config: &Config, tmp_path: &Path) -> Result<()> {
        config.save(tmp_path).await?;
        fs::rename(tmp_path, &self.path).await?;
        Ok(())
    }

    async fn read_or_default(path: &Path) -> Config {
        match Config::load(path).await {
            Ok(config) => config,
            Err(e) => {
                error!("error loading configuration: {e:#}");
                Config::default()
            }
        }
    }
}
