use prospect_common::{HttpClient, HttpRequest};
use prospect_dispatch::{ToolCall, ToolContent, ToolDescriptor, ToolError, ToolHandler};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::sync::Arc;

pub const ANTHROPIC_MESSAGES_URL: &str = "https://api.anthropic.com/v1/messages";
pub const ANTHROPIC_VERSION: &str = "2023-06-01";
pub const CUSTOM_SEARCH_URL: &str = "https://www.googleapis.com/customsearch/v1";
pub const DEFAULT_MODEL: &str = "claude-3-opus-20240229";
pub const DEFAULT_RESULTS_PER_QUERY: u32 = 5;

const DORKS_PROMPT: &str = include_str!("../../prompts/google_dorks.md");
const MAX_TOKENS: u32 = 4096;

#[derive(Debug, Clone)]
pub struct SearchSettings {
    pub anthropic_api_key: String,
    pub google_api_key: String,
    pub search_engine_id: String,
    pub model: String,
    pub results_per_query: u32,
}

/// Asks a language model for Google search queries matching a natural
/// language request, then runs each one through Custom Search.
pub struct GoogleDorksTool {
    http: Arc<dyn HttpClient>,
    settings: SearchSettings,
}

#[derive(Deserialize)]
struct DorksParams {
    query: String,
}

#[derive(Debug, Serialize, PartialEq)]
struct SearchHit {
    title: String,
    link: String,
    snippet: String,
}

#[derive(Debug, Serialize)]
struct SearchResults {
    data: Vec<SearchHit>,
    links: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl GoogleDorksTool {
    pub fn new(http: Arc<dyn HttpClient>, settings: SearchSettings) -> Self {
        Self { http, settings }
    }

    async fn generate(&self, query: &str) -> Result<String, ToolError> {
        let body = json!({
            "model": self.settings.model,
            "max_tokens": MAX_TOKENS,
            "temperature": 0,
            "messages": [{ "role": "user", "content": DORKS_PROMPT.replace("{query}", query) }],
        });
        let request = HttpRequest::post(ANTHROPIC_MESSAGES_URL)
            .header("x-api-key", &self.settings.anthropic_api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&body)?;

        let response = self.http.request(request).await?;
        if !response.is_success() {
            return Err(ToolError::Upstream {
                status: response.status,
                body: response.text(),
            });
        }

        let message = response.json()?;
        message["content"]
            .as_array()
            .and_then(|blocks| blocks.iter().find_map(|block| block["text"].as_str()))
            .map(str::to_string)
            .ok_or_else(|| ToolError::Internal("Model reply carried no text".into()))
    }

    async fn search(&self, query: &str) -> SearchResults {
        tracing::info!("Searching with Google API for: {}", preview(query));
        match self.try_search(query).await {
            Ok(data) => {
                tracing::info!("Found {} results using Google API", data.len());
                let links = data.iter().map(|hit| hit.link.clone()).collect();
                SearchResults { data, links, error: None }
            }
            Err(e) => {
                tracing::error!("Error using Google Search API: {e}");
                SearchResults {
                    data: Vec::new(),
                    links: Vec::new(),
                    error: Some(e.to_string()),
                }
            }
        }
    }

    async fn try_search(&self, query: &str) -> Result<Vec<SearchHit>, ToolError> {
        let num = self.settings.results_per_query.to_string();
        let url = url::Url::parse_with_params(
            CUSTOM_SEARCH_URL,
            [
                ("key", self.settings.google_api_key.as_str()),
                ("cx", self.settings.search_engine_id.as_str()),
                ("q", query),
                ("num", num.as_str()),
            ],
        )
        .map_err(|e| ToolError::Internal(format!("Bad search endpoint: {e}")))?;

        let response = self.http.request(HttpRequest::get(url)).await?;
        if !response.is_success() {
            return Err(ToolError::Upstream {
                status: response.status,
                body: response.text(),
            });
        }

        let items = response.json()?["items"].as_array().cloned().unwrap_or_default();
        Ok(items
            .iter()
            .map(|item| SearchHit {
                title: field(item, "title"),
                link: field(item, "link"),
                snippet: field(item, "snippet"),
            })
            .collect())
    }
}

#[async_trait::async_trait]
impl ToolHandler for GoogleDorksTool {
    fn descriptor(&self) -> ToolDescriptor {
        ToolDescriptor {
            name: "generate_google_dorks".into(),
            description: "Generates Google search queries for finding specific information \
                about people, companies, or topics. Provide a natural language query \
                describing what you want to find, and get back specialized Google search \
                queries together with their top results."
                .into(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "query": {
                        "type": "string",
                        "description": "Natural language description of what you want to find"
                    }
                },
                "required": ["query"]
            }),
        }
    }

    async fn run(&self, call: ToolCall) -> Result<Vec<ToolContent>, ToolError> {
        let params: DorksParams = call.parse()?;

        tracing::info!("Generating search queries with Anthropic API...");
        let reply = self.generate(&params.query).await?;

        let queries = match parse_queries(&reply) {
            Ok(queries) => queries,
            Err(e) => {
                return Ok(vec![ToolContent::text(format!(
                    "Error processing queries: {e}\nRaw response: {reply}"
                ))]);
            }
        };
        tracing::info!("Generated {} search queries", queries.len());

        let mut output = Map::new();
        for (i, query) in queries.iter().enumerate() {
            tracing::info!("Processing query {}: {}", i + 1, preview(query));
            let results = self.search(query).await;
            output.insert(
                format!("query_{}", i + 1),
                json!({ "query": query, "results": results }),
            );
        }

        Ok(vec![ToolContent::json(&Value::Object(output))])
    }
}

/// Pull the query list out of a model reply. A fenced ```json block wins
/// over the rest of the text.
fn parse_queries(reply: &str) -> Result<Vec<String>, serde_json::Error> {
    let payload = match reply.split_once("```json") {
        Some((_, rest)) => rest.split("```").next().unwrap_or(rest),
        None => reply,
    };
    serde_json::from_str(payload.trim())
}

fn field(item: &Value, key: &str) -> String {
    item[key].as_str().unwrap_or_default().to_string()
}

fn preview(query: &str) -> String {
    query.chars().take(50).collect()
}
