use prospect_common::{HttpClient, HttpRequest, HttpResponse};
use prospect_dispatch::{ToolCall, ToolContent, ToolDescriptor, ToolError, ToolHandler};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;

pub const ENDPOINT: &str = "https://api.anymailfinder.com/v5.0/search/linkedin-url.json";

/// Finds the work email behind a LinkedIn profile through AnyMailFinder.
pub struct FindEmailTool {
    http: Arc<dyn HttpClient>,
    api_key: String,
    endpoint: String,
}

#[derive(Deserialize)]
struct FindEmailParams {
    linkedin_url: String,
}

impl FindEmailTool {
    pub fn new(http: Arc<dyn HttpClient>, api_key: String) -> Self {
        Self {
            http,
            api_key,
            endpoint: ENDPOINT.to_string(),
        }
    }
}

#[async_trait::async_trait]
impl ToolHandler for FindEmailTool {
    fn descriptor(&self) -> ToolDescriptor {
        ToolDescriptor {
            name: "find_email".into(),
            description: "Find the email associated with a LinkedIn profile. Returns the \
                person's name, title, company, email and its validation status."
                .into(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "linkedin_url": {
                        "type": "string",
                        "description": "The LinkedIn URL of the person's profile"
                    }
                },
                "required": ["linkedin_url"]
            }),
        }
    }

    async fn run(&self, call: ToolCall) -> Result<Vec<ToolContent>, ToolError> {
        let params: FindEmailParams = call.parse()?;

        let request = HttpRequest::post(&self.endpoint)
            .bearer(&self.api_key)
            .json(&json!({ "linkedin_url": params.linkedin_url }))?;

        let outcome = match self.http.request(request).await {
            Ok(response) => lookup_outcome(&response),
            Err(e) => {
                tracing::error!("Error fetching email: {e}");
                json!({ "success": false, "error": format!("Error fetching email: {e}") })
            }
        };

        Ok(vec![ToolContent::json(&outcome)])
    }
}

fn lookup_outcome(response: &HttpResponse) -> Value {
    let data = response.json().unwrap_or(Value::Null);

    if response.status == 200 {
        let results = &data["results"];
        return json!({
            "success": true,
            "data": {
                "fullName": results["fullName"],
                "title": results["title"],
                "companyName": results["companyName"],
                "email": results["email"],
                "validation": results["validation"],
            }
        });
    }

    let error = data
        .get("error_explained")
        .and_then(Value::as_str)
        .map(str::to_string)
        .unwrap_or_else(|| status_message(response.status));
    tracing::error!("{error}");
    json!({ "success": false, "error": error, "status_code": response.status })
}

fn status_message(status: u16) -> String {
    match status {
        400 | 401 => format!("Invalid request (status {status})"),
        402 => "Insufficient credits".to_string(),
        404 | 451 => "Email not found".to_string(),
        _ => format!("API request failed with status {status}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use prospect_common::testing::ScriptedHttpClient;
    use serde_json::Map;

    fn call(arguments: Value) -> ToolCall {
        let Value::Object(map) = arguments else {
            panic!("arguments must be an object");
        };
        ToolCall::new("find_email", map)
    }

    fn output(content: &[ToolContent]) -> Value {
        serde_json::from_str(&content[0].text).unwrap()
    }

    #[tokio::test]
    async fn test_found_email() {
        let http = Arc::new(ScriptedHttpClient::new().respond_json(
            200,
            json!({"results": {
                "fullName": "Satya Nadella",
                "title": "CEO",
                "companyName": "Microsoft",
                "email": "satya@example.com",
                "validation": "valid",
                "extra": "ignored"
            }}),
        ));
        let tool = FindEmailTool::new(http.clone(), "key".into());

        let content = tool
            .run(call(json!({"linkedin_url": "https://www.linkedin.com/in/satyanadella/"})))
            .await
            .unwrap();

        let out = output(&content);
        assert_eq!(out["success"], json!(true));
        assert_eq!(out["data"]["email"], json!("satya@example.com"));
        assert!(out["data"].get("extra").is_none());

        let sent = &http.requests()[0];
        assert_eq!(sent.url, ENDPOINT);
        assert_eq!(sent.header_value("authorization"), Some("Bearer key"));
        let body: Value = serde_json::from_slice(sent.body.as_deref().unwrap()).unwrap();
        assert_eq!(body["linkedin_url"], json!("https://www.linkedin.com/in/satyanadella/"));
    }

    #[tokio::test]
    async fn test_api_error_uses_explanation() {
        let http = Arc::new(
            ScriptedHttpClient::new()
                .respond_json(402, json!({"error_explained": "You have run out of credits"})),
        );
        let tool = FindEmailTool::new(http, "key".into());

        let content = tool
            .run(call(json!({"linkedin_url": "https://linkedin.com/in/x"})))
            .await
            .unwrap();

        let out = output(&content);
        assert_eq!(out["success"], json!(false));
        assert_eq!(out["error"], json!("You have run out of credits"));
        assert_eq!(out["status_code"], json!(402));
    }

    #[tokio::test]
    async fn test_not_found_without_body() {
        let http = Arc::new(ScriptedHttpClient::new().respond(404, ""));
        let tool = FindEmailTool::new(http, "key".into());

        let content = tool
            .run(call(json!({"linkedin_url": "https://linkedin.com/in/x"})))
            .await
            .unwrap();

        assert_eq!(output(&content)["error"], json!("Email not found"));
    }

    #[tokio::test]
    async fn test_transport_failure_is_reported_as_unsuccessful_lookup() {
        let http = Arc::new(ScriptedHttpClient::new().fail("connection reset"));
        let tool = FindEmailTool::new(http, "key".into());

        let content = tool
            .run(call(json!({"linkedin_url": "https://linkedin.com/in/x"})))
            .await
            .unwrap();

        let out = output(&content);
        assert_eq!(out["success"], json!(false));
        assert!(out["error"].as_str().unwrap().contains("connection reset"));
    }

    #[tokio::test]
    async fn test_missing_url_is_invalid() {
        let tool = FindEmailTool::new(Arc::new(ScriptedHttpClient::new()), "key".into());

        let err = tool.run(ToolCall::new("find_email", Map::new())).await.unwrap_err();

        assert!(matches!(err, ToolError::InvalidParameters(_)));
    }
}
