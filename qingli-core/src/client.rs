use crate::{config::Config, error::ApiError, types::ItemId};
use async_trait::async_trait;
use reqwest::{
    Client, Method, Response, StatusCode,
    header::{ACCEPT, CONTENT_TYPE},
};
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, error, warn};
use url::Url;

const API_KEY_HEADER: &str = "X-Api-Key";

/// 删除条目时固定使用的参数：从下载器移除、加入黑名单、允许重新下载、不修改分类
const DELETE_PARAMS: [(&str, &str); 4] = [
    ("removeFromClient", "true"),
    ("blocklist", "true"),
    ("skipRedownload", "false"),
    ("changeCategory", "false"),
];

/// 下载队列的外部接口
#[async_trait]
pub trait QueueApi: Send + Sync {
    /// 获取当前队列快照，返回未解析的原始记录
    async fn fetch_queue(&self) -> Result<Vec<Value>, ApiError>;

    /// 删除条目并触发重新搜索
    async fn delete_item(&self, id: &ItemId) -> Result<(), ApiError>;
}

/// Sonarr v3 API 客户端
#[derive(Debug, Clone)]
pub struct SonarrClient {
    client: Client,
    api_url: Url,
    api_key: String,
    page_size: u32,
}

impl SonarrClient {
    /// 根据配置创建客户端，校验主机名与 API Key
    pub fn connect(config: &Config) -> Result<Self, ApiError> {
        let host = config
            .host
            .trim()
            .trim_start_matches("http://")
            .trim_start_matches("https://")
            .trim_end_matches('/');
        if host.is_empty() {
            error!("hostname is missing");
            return Err(ApiError::MissingHost);
        }

        let api_key = config.apikey.trim();
        if api_key.len() != 32 || !api_key.chars().all(|c| c.is_ascii_alphanumeric()) {
            error!("invalid API key format");
            return Err(ApiError::InvalidApiKey);
        }

        let server_url = format!(
            "http{}://{}:{}{}",
            if config.ssl { "s" } else { "" },
            host,
            config.port,
            normalize_url_base(&config.url_base)
        );
        let api_url = Url::parse(&server_url)?.join("api/")?;

        let client = Client::builder()
            .tcp_keepalive(Duration::from_secs(60))
            .timeout(Duration::from_secs(config.timeout))
            .build()?;

        debug!(%api_url, "queue API client initialized");
        Ok(Self {
            client,
            api_url,
            api_key: api_key.to_string(),
            page_size: config.page_size,
        })
    }

    pub fn api_url(&self) -> &Url {
        &self.api_url
    }

    /// 在 API 根路径后追加路径段，每段单独转义
    fn endpoint(&self, segments: &[&str]) -> Result<Url, ApiError> {
        let mut endpoint = self.api_url.clone();
        endpoint
            .path_segments_mut()
            .map_err(|_| ApiError::InvalidUrl(url::ParseError::RelativeUrlWithCannotBeABaseBase))?
            .pop_if_empty()
            .extend(segments);
        Ok(endpoint)
    }

    async fn request(
        &self,
        method: Method,
        mut url: Url,
        params: &[(&str, String)],
    ) -> Result<Option<Value>, ApiError> {
        if !params.is_empty() {
            url.query_pairs_mut().extend_pairs(params);
        }
        debug!(%method, %url, "sending request");

        let accept_json = method == Method::GET;
        let mut builder = self
            .client
            .request(method, url.clone())
            .header(API_KEY_HEADER, &self.api_key);
        builder = if accept_json {
            builder.header(ACCEPT, "application/json")
        } else {
            builder.header(CONTENT_TYPE, "application/json")
        };

        let response = builder.send().await?;
        Self::handle_response(&url, response).await
    }

    async fn handle_response(url: &Url, response: Response) -> Result<Option<Value>, ApiError> {
        let status = response.status();
        if status == StatusCode::UNAUTHORIZED {
            error!(%url, "unauthorized: invalid API key");
            return Err(ApiError::Unauthorized);
        }

        if status == StatusCode::OK {
            let is_json = response
                .headers()
                .get(CONTENT_TYPE)
                .and_then(|v| v.to_str().ok())
                .is_some_and(|v| v.contains("application/json"));
            if !is_json {
                debug!("request successful (non-JSON response)");
                return Ok(None);
            }
            return Ok(Some(response.json().await?));
        }

        let body = response.text().await.unwrap_or_default();
        error!(status = status.as_u16(), %body, "request failed");
        Err(ApiError::Status {
            status: status.as_u16(),
            body,
        })
    }
}

#[async_trait]
impl QueueApi for SonarrClient {
    /// 逐页获取，直到取满 `totalRecords` 或遇到不满一页的响应
    async fn fetch_queue(&self) -> Result<Vec<Value>, ApiError> {
        let mut all_records = Vec::new();
        let mut page: u64 = 1;

        loop {
            let params = [
                ("page", page.to_string()),
                ("pageSize", self.page_size.to_string()),
            ];
            let url = self.endpoint(&["v3", "queue"])?;
            let data = self.request(Method::GET, url, &params).await?;

            let Some(Value::Array(records)) = data.as_ref().and_then(|d| d.get("records")) else {
                if page == 1 {
                    warn!("no records found in queue data");
                }
                break;
            };
            let received = records.len();
            all_records.extend(records.iter().cloned());

            let total = data
                .as_ref()
                .and_then(|d| d.get("totalRecords"))
                .and_then(Value::as_u64);
            let short_page = received < self.page_size as usize;
            let complete = total.is_some_and(|total| all_records.len() as u64 >= total);
            if received == 0 || short_page || complete {
                break;
            }
            page += 1;
        }

        debug!(count = all_records.len(), pages = page, "found records in queue");
        Ok(all_records)
    }

    async fn delete_item(&self, id: &ItemId) -> Result<(), ApiError> {
        let params: Vec<(&str, String)> = DELETE_PARAMS
            .iter()
            .map(|(k, v)| (*k, v.to_string()))
            .collect();
        let url = self.endpoint(&["v3", "queue", &id.to_string()])?;
        self.request(Method::DELETE, url, &params).await?;
        Ok(())
    }
}

/// 把 URL 前缀规范化为以 `/` 开头和结尾的形式
fn normalize_url_base(url_base: &str) -> String {
    let trimmed = url_base.trim().trim_matches('/');
    if trimmed.is_empty() {
        "/".to_string()
    } else {
        format!("/{trimmed}/")
    }
}
