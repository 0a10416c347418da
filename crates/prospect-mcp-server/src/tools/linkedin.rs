use prospect_common::{HttpClient, HttpRequest};
use prospect_dispatch::{ToolCall, ToolContent, ToolDescriptor, ToolError, ToolHandler};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;

pub const API_HOST: &str = "fresh-linkedin-profile-data.p.rapidapi.com";
pub const ENDPOINT: &str = "https://fresh-linkedin-profile-data.p.rapidapi.com/get-linkedin-profile";

/// Sections the profile endpoint can add; all are switched off to keep
/// responses small.
const OPTIONAL_SECTIONS: &[&str] = &[
    "include_skills",
    "include_certifications",
    "include_publications",
    "include_honors",
    "include_volunteers",
    "include_projects",
    "include_patents",
    "include_courses",
    "include_organizations",
    "include_profile_status",
    "include_company_public_url",
];

pub struct PersonProfileTool {
    http: Arc<dyn HttpClient>,
    api_key: String,
    endpoint: String,
}

#[derive(Deserialize)]
struct ProfileParams {
    linkedin_url: String,
}

impl PersonProfileTool {
    pub fn new(http: Arc<dyn HttpClient>, api_key: String) -> Self {
        Self {
            http,
            api_key,
            endpoint: ENDPOINT.to_string(),
        }
    }

    fn profile_url(&self, linkedin_url: &str) -> Result<String, ToolError> {
        let mut params: Vec<(&str, &str)> = vec![("linkedin_url", linkedin_url)];
        params.extend(OPTIONAL_SECTIONS.iter().map(|flag| (*flag, "false")));
        url::Url::parse_with_params(&self.endpoint, &params)
            .map(String::from)
            .map_err(|e| ToolError::Internal(format!("Bad profile endpoint: {e}")))
    }
}

#[async_trait::async_trait]
impl ToolHandler for PersonProfileTool {
    fn descriptor(&self) -> ToolDescriptor {
        ToolDescriptor {
            name: "get_person_profile".into(),
            description: "Get a person's LinkedIn profile data: experience, education, \
                headline and location, as structured JSON."
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
        let params: ProfileParams = call.parse()?;

        let request = HttpRequest::get(self.profile_url(&params.linkedin_url)?)
            .header("x-rapidapi-host", API_HOST)
            .header("x-rapidapi-key", &self.api_key);

        let outcome = match self.http.request(request).await {
            Ok(response) if response.status == 200 => match response.json() {
                Ok(profile) => profile,
                Err(e) => json!({ "error": format!("Error fetching profile: {e}") }),
            },
            Ok(response) => {
                let error = format!("API request failed with status {}", response.status);
                tracing::error!("{error}");
                json!({ "error": error })
            }
            Err(e) => {
                tracing::error!("Error fetching profile: {e}");
                json!({ "error": format!("Error fetching profile: {e}") })
            }
        };

        Ok(vec![ToolContent::json(&outcome)])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use prospect_common::testing::ScriptedHttpClient;
    use std::collections::HashMap;

    fn call(url: &str) -> ToolCall {
        let mut args = serde_json::Map::new();
        args.insert("linkedin_url".into(), json!(url));
        ToolCall::new("get_person_profile", args)
    }

    #[tokio::test]
    async fn test_profile_passthrough_and_request_shape() {
        let http = Arc::new(
            ScriptedHttpClient::new().respond_json(200, json!({"data": {"full_name": "Ada"}})),
        );
        let tool = PersonProfileTool::new(http.clone(), "rk".into());

        let content = tool.run(call("https://www.linkedin.com/in/ada/")).await.unwrap();

        let out: Value = serde_json::from_str(&content[0].text).unwrap();
        assert_eq!(out["data"]["full_name"], json!("Ada"));

        let sent = &http.requests()[0];
        assert_eq!(sent.header_value("x-rapidapi-key"), Some("rk"));
        assert_eq!(sent.header_value("x-rapidapi-host"), Some(API_HOST));
        let url = url::Url::parse(&sent.url).unwrap();
        let query: HashMap<_, _> = url.query_pairs().into_owned().collect();
        assert_eq!(query["linkedin_url"], "https://www.linkedin.com/in/ada/");
        assert_eq!(query["include_skills"], "false");
        assert_eq!(query.len(), OPTIONAL_SECTIONS.len() + 1);
    }

    #[tokio::test]
    async fn test_non_200_reports_status() {
        let http = Arc::new(ScriptedHttpClient::new().respond(429, "slow down"));
        let tool = PersonProfileTool::new(http, "rk".into());

        let content = tool.run(call("https://www.linkedin.com/in/ada/")).await.unwrap();

        let out: Value = serde_json::from_str(&content[0].text).unwrap();
        assert_eq!(out["error"], json!("API request failed with status 429"));
    }
}
