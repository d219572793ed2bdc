//! google_realtime_search 工具：Google Custom Search JSON API
//!
//! 凭据：API key 取 `CUSTOM_SEARCH_API_KEY`，其次 `GOOGLE_SEARCH_API_KEY`；搜索引擎 ID 取
//! `GOOGLE_CSE_ID`，否则解析 `SEARCH_ENGINE` URL 中的 `cx` 参数。缺少凭据时工具返回明确错误。
//! 结果渲染为 标题 / 摘要 / 链接 行，超过 max_result_chars 时截断。

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Url};
use serde::Deserialize;

use crate::tools::Tool;

pub const CUSTOM_SEARCH_ENDPOINT: &str = "https://www.googleapis.com/customsearch/v1";

/// 搜索凭据
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchCredentials {
    pub api_key: String,
    pub engine_id: String,
}

impl SearchCredentials {
    /// 从环境变量读取；key 或引擎 ID 任一缺失返回 None
    pub fn from_env() -> Option<Self> {
        let var = |k: &str| std::env::var(k).ok().filter(|v| !v.trim().is_empty());
        Self::resolve(
            var("CUSTOM_SEARCH_API_KEY"),
            var("GOOGLE_SEARCH_API_KEY"),
            var("GOOGLE_CSE_ID"),
            var("SEARCH_ENGINE"),
        )
    }

    pub fn resolve(
        custom_key: Option<String>,
        google_key: Option<String>,
        cse_id: Option<String>,
        search_engine_url: Option<String>,
    ) -> Option<Self> {
        let api_key = custom_key.or(google_key)?;
        let engine_id = cse_id.or_else(|| search_engine_url.as_deref().and_then(cx_from_url))?;
        Some(Self { api_key, engine_id })
    }
}

/// 从搜索引擎 URL（如 https://cse.google.com/cse?cx=abc123）提取 cx
pub fn cx_from_url(url: &str) -> Option<String> {
    let parsed = Url::parse(url).ok()?;
    let cx = parsed
        .query_pairs()
        .find(|(k, _)| k == "cx")
        .map(|(_, v)| v.into_owned());
    cx.filter(|v| !v.is_empty())
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    items: Vec<SearchItem>,
}

#[derive(Debug, Deserialize)]
struct SearchItem {
    #[serde(default)]
    title: String,
    #[serde(default)]
    snippet: String,
    #[serde(default)]
    link: String,
}

/// Google 实时搜索工具
pub struct GoogleSearchTool {
    client: Client,
    credentials: Option<SearchCredentials>,
    num_results: u8,
    max_result_chars: usize,
}

impl GoogleSearchTool {
    pub fn new(
        credentials: Option<SearchCredentials>,
        timeout_secs: u64,
        num_results: u8,
        max_result_chars: usize,
    ) -> Self {
        match &credentials {
            Some(c) => tracing::info!(engine_id = %c.engine_id, "google search initialized"),
            None => tracing::warn!("google search disabled: no search API credentials"),
        }
        let client = match Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
        {
            Ok(client) => client,
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    timeout_secs,
                    "google search: failed to build HTTP client with timeout, using default client"
                );
                Client::new()
            }
        };
        Self {
            client,
            credentials,
            num_results: num_results.clamp(1, 10),
            max_result_chars,
        }
    }

    async fn search(&self, creds: &SearchCredentials, query: &str) -> Result<String, String> {
        let num = self.num_results.to_string();
        let resp = self
            .client
            .get(CUSTOM_SEARCH_ENDPOINT)
            .query(&[
                ("key", creds.api_key.as_str()),
                ("cx", creds.engine_id.as_str()),
                ("q", query),
                ("num", num.as_str()),
            ])
            .send()
            .await
            .map_err(|e| format!("Request failed: {}", e))?;
        if !resp.status().is_success() {
            return Err(format!("HTTP {}", resp.status()));
        }
        let body: SearchResponse = resp
            .json()
            .await
            .map_err(|e| format!("Invalid search response: {}", e))?;
        Ok(self.render(&body.items))
    }

    fn render(&self, items: &[SearchItem]) -> String {
        if items.is_empty() {
            return "No good Google Search Result was found".to_string();
        }
        let text = items
            .iter()
            .enumerate()
            .map(|(i, it)| format!("{}. {}\n{}\n{}", i + 1, it.title, it.snippet.trim(), it.link))
            .collect::<Vec<_>>()
            .join("\n\n");
        if text.chars().count() > self.max_result_chars {
            text.chars().take(self.max_result_chars).collect::<String>() + "\n...[truncated]"
        } else {
            text
        }
    }
}

#[async_trait]
impl Tool for GoogleSearchTool {
    fn name(&self) -> &str {
        "google_realtime_search"
    }

    fn description(&self) -> &str {
        "Executes a live web search and returns up-to-date information from the public internet. \
The input MUST be a concise, focused search query string (e.g. 'latest version of Python'). \
Use it ONLY for real-time data (current dates, news, prices, weather), general knowledge unrelated to the user's \
uploaded course documents, or external facts that course_knowledge_search did not find. \
Do not use it for questions about the user's private study documents or for solving math problems."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "query": {"type": "string", "description": "Web search query"}
            },
            "required": ["query"]
        })
    }

    async fn execute(&self, input: &str) -> Result<String, String> {
        let Some(creds) = &self.credentials else {
            return Err("No search API credentials found. Set CUSTOM_SEARCH_API_KEY (or GOOGLE_SEARCH_API_KEY) and GOOGLE_CSE_ID (or SEARCH_ENGINE) in your .env to enable search.".to_string());
        };
        let query = input.trim();
        if query.is_empty() {
            return Err("Missing query".to_string());
        }
        tracing::info!(query = %query, "google realtime search");
        self.search(creds, query).await
    }
}
