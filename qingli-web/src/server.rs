use std::sync::Arc;

use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    response::{Html, IntoResponse, Response},
    routing::get,
};
use qingli_core::{Config, ConditionKind, ConfigStore, MonitorHandle, RuleSet};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::status::SharedStatus;

const INDEX_HTML: &str = include_str!("../assets/index.html");

#[derive(Clone)]
pub struct AppState {
    store: Arc<ConfigStore>,
    monitor: MonitorHandle,
    status: SharedStatus,
}

impl AppState {
    pub fn new(store: Arc<ConfigStore>, monitor: MonitorHandle, status: SharedStatus) -> Self {
        Self {
            store,
            monitor,
            status,
        }
    }
}

/// 表单提交的配置；端口和间隔以字符串形式提交
#[derive(Debug, Deserialize)]
pub struct ConfigForm {
    #[serde(default)]
    pub apikey: String,
    #[serde(default)]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: String,
    #[serde(default)]
    pub ssl: bool,
    #[serde(default)]
    pub url_base: String,
    #[serde(default = "default_refresh_interval")]
    pub refresh_interval: String,
    /// JSON 字符串或数组；缺失、`null` 或空字符串都视为无效
    #[serde(default)]
    pub rules: Option<Value>,
}

fn default_port() -> String {
    "8989".to_string()
}

fn default_refresh_interval() -> String {
    "5".to_string()
}

#[derive(Debug, Serialize)]
struct ConditionInfo {
    key: &'static str,
    label: &'static str,
    unit: &'static str,
}

impl ConfigForm {
    /// 校验表单并合并到当前配置，返回所有错误信息
    pub fn apply_to(self, mut config: Config) -> Result<Config, Vec<String>> {
        let mut errors = Vec::new();

        let apikey = self.apikey.trim();
        let host = self.host.trim();
        if apikey.is_empty() {
            errors.push("API Key must not be empty.".to_string());
        }
        if host.is_empty() {
            errors.push("Host must not be empty.".to_string());
        }
        let port = parse_digits::<u16>(&self.port);
        if port.is_none() {
            errors.push("Port must be a number.".to_string());
        }
        let refresh_interval = parse_digits::<u64>(&self.refresh_interval);
        if refresh_interval.is_none() {
            errors.push("Refresh interval must be a number.".to_string());
        }
        let rules = match parse_rules(self.rules) {
            Ok(rules) => Some(rules),
            Err(e) => {
                errors.push(format!("Rules are invalid: {e}"));
                None
            }
        };

        match (port, refresh_interval, rules) {
            (Some(port), Some(refresh_interval), Some(rules)) if errors.is_empty() => {
                config.apikey = apikey.to_string();
                config.host = host.to_string();
                config.port = port;
                config.ssl = self.ssl;
                config.url_base = self.url_base.trim().to_string();
                config.refresh_interval = refresh_interval;
                config.rules = Some(rules);
                Ok(config)
            }
            _ => Err(errors),
        }
    }
}

fn parse_digits<T: std::str::FromStr>(value: &str) -> Option<T> {
    let value = value.trim();
    if value.is_empty() || !value.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    value.parse().ok()
}

/// 规则集必须显式提交，`[]` 表示清空
fn parse_rules(value: Option<Value>) -> Result<RuleSet, String> {
    let parsed = match value {
        None | Some(Value::Null) => return Err("rule set is missing".to_string()),
        Some(Value::String(s)) if s.trim().is_empty() => {
            return Err("rule set is missing".to_string());
        }
        Some(Value::String(s)) => serde_json::from_str(&s),
        Some(other) => serde_json::from_value(other),
    };
    parsed.map_err(|e| e.to_string())
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(handle_index))
        .route("/api/config", get(handle_get_config).post(handle_update_config))
        .route("/api/status", get(handle_status))
        .route("/api/conditions", get(handle_conditions))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// 启动 Web 服务，收到 Ctrl-C 后退出
pub async fn serve(listener: TcpListener, state: AppState) -> anyhow::Result<()> {
    let app = build_router(state);
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("shutting down web interface");
        })
        .await?;
    Ok(())
}

async fn handle_index() -> Html<&'static str> {
    Html(INDEX_HTML)
}

async fn handle_get_config(State(state): State<AppState>) -> Json<Config> {
    Json(state.store.snapshot().await)
}

async fn handle_update_config(
    State(state): State<AppState>,
    Json(form): Json<ConfigForm>,
) -> Response {
    let current = state.store.snapshot().await;
    let config = match form.apply_to(current) {
        Ok(config) => config,
        Err(errors) => {
            warn!(?errors, "rejected configuration update");
            return error_response(errors.join(" "));
        }
    };

    match state.store.update(config).await {
        Ok(_) => {
            state.monitor.trigger();
            Json(json!({ "message": "Configuration updated successfully." })).into_response()
        }
        Err(e) => error_response(format!("{e:#}")),
    }
}

async fn handle_status(State(state): State<AppState>) -> Response {
    Json(state.status.read().await.clone()).into_response()
}

async fn handle_conditions() -> Json<Vec<ConditionInfo>> {
    Json(
        ConditionKind::ALL
            .into_iter()
            .map(|kind| ConditionInfo {
                key: kind.key(),
                label: kind.label(),
                unit: kind.unit(),
            })
            .collect(),
    )
}

fn error_response(message: String) -> Response {
    (StatusCode::BAD_REQUEST, Json(json!({ "error": message }))).into_response()
}
