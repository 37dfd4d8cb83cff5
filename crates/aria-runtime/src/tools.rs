use async_trait::async_trait;
use std::sync::Arc;
use tracing::info;

use aria_config::AriaConfig;
use aria_core::{AriaError, Result, Tool};

pub const SERPAPI_ENDPOINT: &str = "https://serpapi.com/search.json";

/// Web lookup through SerpApi's Bing engine.
///
/// Returns the serialised `answer_box` of the results page, or an empty
/// string when Bing produced none.
pub struct BingSearchTool {
    client: reqwest::Client,
    api_key: Option<String>,
    endpoint: String,
}

impl BingSearchTool {
    pub const NAME: &'static str = "bing_search";

    pub fn new(api_key: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key: api_key.filter(|k| !k.is_empty()),
            endpoint: SERPAPI_ENDPOINT.into(),
        }
    }

    pub fn with_endpoint(mut self, endpoint: String) -> Self {
        self.endpoint = endpoint;
        self
    }

    fn unavailable(reason: impl Into<String>) -> AriaError {
        AriaError::ToolUnavailable {
            tool: Self::NAME.into(),
            reason: reason.into(),
        }
    }
}

#[async_trait]
impl Tool for BingSearchTool {
    fn name(&self) -> &str {
        Self::NAME
    }

    async fn run(&self, query: &str) -> Result<String> {
        let Some(api_key) = self.api_key.as_deref() else {
            return Err(Self::unavailable("services.serpapi_api_key is not configured"));
        };

        info!(query, "executing bing search");

        let resp = self
            .client
            .get(&self.endpoint)
            .header("Accept", "application/json")
            .query(&[
                ("engine", "bing"),
                ("q", query),
                ("ai", "true"),
                ("api_key", api_key),
            ])
            .send()
            .await
            .map_err(|e| Self::unavailable(format!("search request failed: {}", e.without_url())))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            let body: String = body.chars().take(300).collect();
            return Err(Self::unavailable(format!("SerpApi error ({status}): {body}")));
        }

        let data: serde_json::Value = resp
            .json()
            .await
            .map_err(|e| Self::unavailable(format!("failed to parse search results: {e}")))?;

        answer_box_snippet(&data)
    }
}

fn answer_box_snippet(data: &serde_json::Value) -> Result<String> {
    if let Some(error) = data["error"].as_str() {
        return Err(BingSearchTool::unavailable(error.to_string()));
    }
    match data.get("answer_box") {
        Some(answer) if !answer.is_null() => Ok(serde_json::to_string(answer)?),
        _ => Ok(String::new()),
    }
}

/// Instantiate the named tools in order.
pub fn build_tools(names: &[String], config: &AriaConfig) -> Result<Vec<Arc<dyn Tool>>> {
    names
        .iter()
        .map(|name| match name.as_str() {
            BingSearchTool::NAME => Ok(Arc::new(BingSearchTool::new(
                config.services.serpapi_api_key.clone(),
            )) as Arc<dyn Tool>),
            other => Err(AriaError::Config(format!("unknown tool '{other}'"))),
        })
        .collect()
}
