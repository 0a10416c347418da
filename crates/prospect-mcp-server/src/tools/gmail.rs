use super::google::{user_scoped_schema, GoogleApi};
use super::mime::OutgoingMessage;
use base64::engine::general_purpose::{STANDARD, URL_SAFE_NO_PAD};
use base64::Engine;
use prospect_common::fs_utils::atomic_write;
use prospect_common::HttpRequest;
use prospect_dispatch::{Session, ToolCall, ToolContent, ToolDescriptor, ToolError, ToolHandler};
use serde::Deserialize;
use serde_json::{json, Value};
use std::path::Path;

const DEFAULT_MAX_RESULTS: u32 = 100;
const MAX_RESULTS_LIMIT: u32 = 500;
const SUMMARY_HEADERS: &[&str] = &["Subject", "From", "To", "Date"];

pub struct QueryEmailsTool {
    api: GoogleApi,
}

pub struct GetEmailTool {
    api: GoogleApi,
}

pub struct BulkGetEmailsTool {
    api: GoogleApi,
}

pub struct GetAttachmentTool {
    api: GoogleApi,
}

pub struct BulkSaveAttachmentsTool {
    api: GoogleApi,
}

pub struct CreateDraftTool {
    api: GoogleApi,
}

pub struct DeleteDraftTool {
    api: GoogleApi,
}

pub struct ReplyEmailTool {
    api: GoogleApi,
}

pub struct SendEmailTool {
    api: GoogleApi,
}

#[derive(Deserialize)]
struct QueryParams {
    #[serde(default)]
    query: Option<String>,
    #[serde(default)]
    max_results: Option<u32>,
}

#[derive(Deserialize)]
struct EmailIdParams {
    email_id: String,
}

#[derive(Deserialize)]
struct EmailIdsParams {
    email_ids: Vec<String>,
}

#[derive(Deserialize)]
struct AttachmentParams {
    message_id: String,
    attachment_id: String,
    filename: String,
    #[serde(default)]
    mime_type: Option<String>,
    #[serde(default)]
    save_to_disk: Option<String>,
}

#[derive(Deserialize)]
struct SaveAttachmentsParams {
    attachments: Vec<SaveAttachment>,
}

#[derive(Deserialize)]
struct SaveAttachment {
    message_id: String,
    attachment_id: String,
    save_path: String,
}

/// Fields shared by new drafts and sent mail.
#[derive(Deserialize)]
struct ComposeParams {
    to: String,
    subject: String,
    body: String,
    #[serde(default)]
    cc: Vec<String>,
}

impl From<ComposeParams> for OutgoingMessage {
    fn from(params: ComposeParams) -> Self {
        OutgoingMessage {
            to: params.to,
            cc: params.cc,
            subject: params.subject,
            body: params.body,
            ..OutgoingMessage::default()
        }
    }
}

#[derive(Deserialize)]
struct DraftIdParams {
    draft_id: String,
}

#[derive(Deserialize)]
struct ReplyParams {
    original_message_id: String,
    reply_body: String,
    #[serde(default)]
    send: bool,
    #[serde(default)]
    cc: Vec<String>,
}

fn compose_schema() -> Value {
    json!({
        "to": { "type": "string", "description": "Email address of the recipient" },
        "subject": { "type": "string", "description": "Subject line of the email" },
        "body": { "type": "string", "description": "Body content of the email" },
        "cc": {
            "type": "array",
            "items": { "type": "string" },
            "description": "Optional list of email addresses to CC"
        }
    })
}

impl QueryEmailsTool {
    pub fn new(api: GoogleApi) -> Self {
        Self { api }
    }
}

#[async_trait::async_trait]
impl ToolHandler for QueryEmailsTool {
    fn descriptor(&self) -> ToolDescriptor {
        ToolDescriptor {
            name: "query_gmail_emails".into(),
            description: "Query Gmail emails based on an optional search query. Returns \
                emails in reverse chronological order (newest first) with their id, \
                subject, sender, recipients, date and snippet."
                .into(),
            input_schema: user_scoped_schema(
                json!({
                    "query": {
                        "type": "string",
                        "description": "Gmail search query (e.g. 'is:unread', 'from:someone@example.com'). Omit to list recent emails."
                    },
                    "max_results": {
                        "type": "integer",
                        "description": "Maximum number of emails to retrieve (1-500)",
                        "minimum": 1,
                        "maximum": MAX_RESULTS_LIMIT
                    }
                }),
                &[],
            ),
        }
    }

    async fn run(&self, call: ToolCall) -> Result<Vec<ToolContent>, ToolError> {
        let session = call.session()?;
        let params: QueryParams = call.parse()?;

        let max_results = params
            .max_results
            .unwrap_or(DEFAULT_MAX_RESULTS)
            .clamp(1, MAX_RESULTS_LIMIT);
        let mut query = vec![("maxResults", max_results.to_string())];
        if let Some(q) = params.query.filter(|q| !q.trim().is_empty()) {
            query.push(("q", q));
        }

        let listing = self
            .api
            .send(session, HttpRequest::get(self.api.gmail_url(&["messages"], &query)?))
            .await?;
        let ids: Vec<&str> = listing["messages"]
            .as_array()
            .map(|messages| messages.iter().filter_map(|m| m["id"].as_str()).collect())
            .unwrap_or_default();

        let mut metadata_query = vec![("format", "metadata".to_string())];
        metadata_query.extend(
            SUMMARY_HEADERS
                .iter()
                .map(|header| ("metadataHeaders", header.to_string())),
        );

        let mut emails = Vec::with_capacity(ids.len());
        for id in ids {
            let url = self.api.gmail_url(&["messages", id], &metadata_query)?;
            let message = self.api.send(session, HttpRequest::get(url)).await?;
            emails.push(summarize(&message));
        }

        Ok(vec![ToolContent::json(&Value::Array(emails))])
    }
}

impl GetEmailTool {
    pub fn new(api: GoogleApi) -> Self {
        Self { api }
    }
}

#[async_trait::async_trait]
impl ToolHandler for GetEmailTool {
    fn descriptor(&self) -> ToolDescriptor {
        ToolDescriptor {
            name: "get_gmail_email".into(),
            description: "Retrieves a complete Gmail email message by its ID, including \
                the decoded body and a list of attachments."
                .into(),
            input_schema: user_scoped_schema(
                json!({
                    "email_id": {
                        "type": "string",
                        "description": "The ID of the Gmail message to retrieve"
                    }
                }),
                &["email_id"],
            ),
        }
    }

    async fn run(&self, call: ToolCall) -> Result<Vec<ToolContent>, ToolError> {
        let session = call.session()?;
        let params: EmailIdParams = call.parse()?;

        let email = fetch_email(&self.api, session, &params.email_id).await?;
        Ok(vec![ToolContent::json(&email)])
    }
}


impl BulkGetEmailsTool {
    pub fn new(api: GoogleApi) -> Self {
        Self { api }
    }
}

#[async_trait::async_trait]
impl ToolHandler for BulkGetEmailsTool {
    fn descriptor(&self) -> ToolDescriptor {
        ToolDescriptor {
            name: "bulk_get_gmail_emails".into(),
            description: "Retrieves multiple Gmail email messages by their IDs in a \
                single request, including bodies and attachment lists. Messages \
                that cannot be fetched are reported with an error."
                .into(),
            input_schema: user_scoped_schema(
                json!({
                    "email_ids": {
                        "type": "array",
                        "items": { "type": "string" },
                        "description": "List of Gmail message IDs to retrieve"
                    }
                }),
                &["email_ids"],
            ),
        }
    }

    async fn run(&self, call: ToolCall) -> Result<Vec<ToolContent>, ToolError> {
        let session = call.session()?;
        let params: EmailIdsParams = call.parse()?;

        let mut emails = Vec::with_capacity(params.email_ids.len());
        for id in &params.email_ids {
            match fetch_email(&self.api, session, id).await {
                Ok(email) => emails.push(email),
                Err(e) => {
                    tracing::warn!("Could not fetch email {id}: {e}");
                    emails.push(json!({ "id": id, "error": e.to_string() }));
                }
            }
        }

        Ok(vec![ToolContent::json(&Value::Array(emails))])
    }
}

impl GetAttachmentTool {
    pub fn new(api: GoogleApi) -> Self {
        Self { api }
    }
}

#[async_trait::async_trait]
impl ToolHandler for GetAttachmentTool {
    fn descriptor(&self) -> ToolDescriptor {
        ToolDescriptor {
            name: "get_gmail_attachment".into(),
            description: "Retrieves a Gmail attachment by its ID. Returns the content \
                base64-encoded, or writes it to `save_to_disk` when a path is given."
                .into(),
            input_schema: user_scoped_schema(
                json!({
                    "message_id": { "type": "string", "description": "The ID of the Gmail message containing the attachment" },
                    "attachment_id": { "type": "string", "description": "The ID of the attachment to retrieve" },
                    "filename": { "type": "string", "description": "The filename of the attachment" },
                    "mime_type": { "type": "string", "description": "The MIME type of the attachment" },
                    "save_to_disk": { "type": "string", "description": "Full path to save the attachment to instead of returning it" }
                }),
                &["message_id", "attachment_id", "filename"],
            ),
        }
    }

    async fn run(&self, call: ToolCall) -> Result<Vec<ToolContent>, ToolError> {
        let session = call.session()?;
        let params: AttachmentParams = call.parse()?;

        let data = fetch_attachment(&self.api, session, &params.message_id, &params.attachment_id).await?;

        if let Some(path) = params.save_to_disk {
            save_attachment(&path, &data)?;
            return Ok(vec![ToolContent::text(format!("Attachment saved to disk: {path}"))]);
        }

        let mime_type = params
            .mime_type
            .unwrap_or_else(|| "application/octet-stream".to_string());
        Ok(vec![ToolContent::json(&json!({
            "filename": params.filename,
            "mimeType": mime_type,
            "size": data.len(),
            "data": STANDARD.encode(&data),
        }))])
    }
}

impl BulkSaveAttachmentsTool {
    pub fn new(api: GoogleApi) -> Self {
        Self { api }
    }
}

#[async_trait::async_trait]
impl ToolHandler for BulkSaveAttachmentsTool {
    fn descriptor(&self) -> ToolDescriptor {
        ToolDescriptor {
            name: "bulk_save_gmail_attachments".into(),
            description: "Saves multiple Gmail attachments to disk. Each entry names \
                the message, the attachment and the destination path."
                .into(),
            input_schema: user_scoped_schema(
                json!({
                    "attachments": {
                        "type": "array",
                        "items": {
                            "type": "object",
                            "properties": {
                                "message_id": { "type": "string", "description": "ID of the Gmail message containing the attachment" },
                                "attachment_id": { "type": "string", "description": "ID of the attachment" },
                                "save_path": { "type": "string", "description": "Path where the attachment should be saved" }
                            },
                            "required": ["message_id", "attachment_id", "save_path"]
                        }
                    }
                }),
                &["attachments"],
            ),
        }
    }

    async fn run(&self, call: ToolCall) -> Result<Vec<ToolContent>, ToolError> {
        let session = call.session()?;
        let params: SaveAttachmentsParams = call.parse()?;

        let mut report = Vec::with_capacity(params.attachments.len());
        for item in &params.attachments {
            let saved = async {
                let data =
                    fetch_attachment(&self.api, session, &item.message_id, &item.attachment_id).await?;
                save_attachment(&item.save_path, &data)
            }
            .await;
            match saved {
                Ok(()) => report.push(format!("Attachment saved to: {}", item.save_path)),
                Err(e) => {
                    tracing::warn!("Could not save attachment from {}: {e}", item.message_id);
                    report.push(format!(
                        "Failed to save attachment from message {}: {e}",
                        item.message_id
                    ));
                }
            }
        }

        Ok(vec![ToolContent::text(report.join("\n"))])
    }
}

impl CreateDraftTool {
    pub fn new(api: GoogleApi) -> Self {
        Self { api }
    }
}

#[async_trait::async_trait]
impl ToolHandler for CreateDraftTool {
    fn descriptor(&self) -> ToolDescriptor {
        ToolDescriptor {
            name: "create_gmail_draft".into(),
            description: "Creates a draft email message from scratch in Gmail with \
                specified recipient, subject, body, and optional CC recipients. \
                Do NOT use this tool to reply to an existing email."
                .into(),
            input_schema: user_scoped_schema(compose_schema(), &["to", "subject", "body"]),
        }
    }

    async fn run(&self, call: ToolCall) -> Result<Vec<ToolContent>, ToolError> {
        let session = call.session()?;
        let params: ComposeParams = call.parse()?;

        let raw = OutgoingMessage::from(params).to_raw()?;
        let draft = create_draft(&self.api, session, json!({ "raw": raw })).await?;

        Ok(vec![ToolContent::json(&draft)])
    }
}

impl DeleteDraftTool {
    pub fn new(api: GoogleApi) -> Self {
        Self { api }
    }
}

#[async_trait::async_trait]
impl ToolHandler for DeleteDraftTool {
    fn descriptor(&self) -> ToolDescriptor {
        ToolDescriptor {
            name: "delete_gmail_draft".into(),
            description: "Deletes a Gmail draft message by its ID.".into(),
            input_schema: user_scoped_schema(
                json!({
                    "draft_id": { "type": "string", "description": "The ID of the draft to delete" }
                }),
                &["draft_id"],
            ),
        }
    }

    async fn run(&self, call: ToolCall) -> Result<Vec<ToolContent>, ToolError> {
        let session = call.session()?;
        let params: DraftIdParams = call.parse()?;

        let url = self.api.gmail_url(&["drafts", &params.draft_id], &[])?;
        self.api.send(session, HttpRequest::delete(url)).await?;

        Ok(vec![ToolContent::text(format!(
            "Successfully deleted draft {}",
            params.draft_id
        ))])
    }
}

impl ReplyEmailTool {
    pub fn new(api: GoogleApi) -> Self {
        Self { api }
    }
}

#[async_trait::async_trait]
impl ToolHandler for ReplyEmailTool {
    fn descriptor(&self) -> ToolDescriptor {
        ToolDescriptor {
            name: "reply_gmail_email".into(),
            description: "Replies to an existing Gmail email message, keeping it in \
                the same thread. Saves the reply as a draft unless `send` is true."
                .into(),
            input_schema: user_scoped_schema(
                json!({
                    "original_message_id": { "type": "string", "description": "The ID of the Gmail message to reply to" },
                    "reply_body": { "type": "string", "description": "Body content of the reply" },
                    "send": {
                        "type": "boolean",
                        "description": "Send immediately (true) or save as draft (false)",
                        "default": false
                    },
                    "cc": {
                        "type": "array",
                        "items": { "type": "string" },
                        "description": "Optional list of email addresses to CC"
                    }
                }),
                &["original_message_id", "reply_body"],
            ),
        }
    }

    async fn run(&self, call: ToolCall) -> Result<Vec<ToolContent>, ToolError> {
        let session = call.session()?;
        let params: ReplyParams = call.parse()?;

        let url = self.api.gmail_url(
            &["messages", &params.original_message_id],
            &[("format", "full".into())],
        )?;
        let original = self.api.send(session, HttpRequest::get(url)).await?;

        let message = reply_to(&original, params.reply_body, params.cc)?;
        let payload = json!({ "raw": message.to_raw()?, "threadId": original["threadId"] });

        let result = if params.send {
            send_message(&self.api, session, payload).await?
        } else {
            create_draft(&self.api, session, payload).await?
        };
        Ok(vec![ToolContent::json(&result)])
    }
}

impl SendEmailTool {
    pub fn new(api: GoogleApi) -> Self {
        Self { api }
    }
}

#[async_trait::async_trait]
impl ToolHandler for SendEmailTool {
    fn descriptor(&self) -> ToolDescriptor {
        ToolDescriptor {
            name: "send_gmail_email".into(),
            description: "Sends a new email immediately from the user's Gmail account. \
                Use create_gmail_draft instead when the user wants to review it first."
                .into(),
            input_schema: user_scoped_schema(compose_schema(), &["to", "subject", "body"]),
        }
    }

    async fn run(&self, call: ToolCall) -> Result<Vec<ToolContent>, ToolError> {
        let session = call.session()?;
        let params: ComposeParams = call.parse()?;

        let raw = OutgoingMessage::from(params).to_raw()?;
        let sent = send_message(&self.api, session, json!({ "raw": raw })).await?;

        Ok(vec![ToolContent::json(&sent)])
    }
}

/// Summary, decoded body and attachment list of one message.
async fn fetch_email(api: &GoogleApi, session: &Session, id: &str) -> Result<Value, ToolError> {
    let url = api.gmail_url(&["messages", id], &[("format", "full".into())])?;
    let message = api.send(session, HttpRequest::get(url)).await?;

    let mut email = summarize(&message);
    email["body"] = extract_body(&message["payload"]).map_or(Value::Null, Value::String);
    email["attachments"] = Value::Array(attachments(&message["payload"]));
    Ok(email)
}

async fn fetch_attachment(
    api: &GoogleApi,
    session: &Session,
    message_id: &str,
    attachment_id: &str,
) -> Result<Vec<u8>, ToolError> {
    let url = api.gmail_url(&["messages", message_id, "attachments", attachment_id], &[])?;
    let attachment = api.send(session, HttpRequest::get(url)).await?;
    attachment["data"]
        .as_str()
        .and_then(decode_base64url)
        .ok_or_else(|| ToolError::Internal(format!("Attachment {attachment_id} carried no data")))
}

fn save_attachment(path: &str, data: &[u8]) -> Result<(), ToolError> {
    atomic_write(Path::new(path), data)
        .map_err(|e| ToolError::Internal(format!("Failed to write {path}: {e}")))
}

async fn create_draft(api: &GoogleApi, session: &Session, message: Value) -> Result<Value, ToolError> {
    let request = HttpRequest::post(api.gmail_url(&["drafts"], &[])?)
        .json(&json!({ "message": message }))?;
    let draft = api.send(session, request).await?;

    let draft_id = draft["id"].as_str().unwrap_or_default();
    tracing::info!(draft_id, "draft created");
    Ok(draft)
}

async fn send_message(api: &GoogleApi, session: &Session, message: Value) -> Result<Value, ToolError> {
    let request = HttpRequest::post(api.gmail_url(&["messages", "send"], &[])?).json(&message)?;
    let sent = api.send(session, request).await?;

    let message_id = sent["id"].as_str().unwrap_or_default();
    tracing::info!(message_id, "message sent");
    Ok(sent)
}

/// Reply addressed to the original sender, threaded through `In-Reply-To`
/// and `References`, quoting the original text below the new body.
fn reply_to(original: &Value, reply_body: String, cc: Vec<String>) -> Result<OutgoingMessage, ToolError> {
    let payload = &original["payload"];
    let sender = header(payload, "From");
    let to = header(payload, "Reply-To")
        .or(sender)
        .ok_or_else(|| ToolError::InvalidParameters("Original message has no sender to reply to".into()))?;

    let subject = header(payload, "Subject").unwrap_or_default();
    let subject = if subject.get(..3).is_some_and(|prefix| prefix.eq_ignore_ascii_case("re:")) {
        subject.to_string()
    } else {
        format!("Re: {subject}")
    };

    let message_id = header(payload, "Message-ID").map(str::to_string);
    let references = match (header(payload, "References"), &message_id) {
        (Some(earlier), Some(id)) => Some(format!("{earlier} {id}")),
        (None, Some(id)) => Some(id.clone()),
        (earlier, None) => earlier.map(str::to_string),
    };

    let mut body = reply_body;
    if let Some(quoted) = extract_body(payload) {
        let date = header(payload, "Date").unwrap_or("an earlier date");
        body.push_str(&format!("\n\nOn {date}, {} wrote:\n", sender.unwrap_or(to)));
        for line in quoted.lines() {
            body.push_str("> ");
            body.push_str(line);
            body.push('\n');
        }
    }

    Ok(OutgoingMessage {
        to: to.to_string(),
        cc,
        subject,
        body,
        in_reply_to: message_id,
        references,
    })
}

fn header<'a>(payload: &'a Value, name: &str) -> Option<&'a str> {
    payload["headers"]
        .as_array()?
        .iter()
        .find(|h| h["name"].as_str().is_some_and(|n| n.eq_ignore_ascii_case(name)))
        .and_then(|h| h["value"].as_str())
}

fn summarize(message: &Value) -> Value {
    let payload = &message["payload"];
    json!({
        "id": message["id"],
        "threadId": message["threadId"],
        "labelIds": message["labelIds"],
        "snippet": message["snippet"],
        "subject": header(payload, "Subject"),
        "from": header(payload, "From"),
        "to": header(payload, "To"),
        "date": header(payload, "Date"),
    })
}

/// First `text/plain` part, falling back to `text/html`.
fn extract_body(payload: &Value) -> Option<String> {
    find_part(payload, "text/plain")
        .or_else(|| find_part(payload, "text/html"))
        .and_then(decode_part)
}

fn find_part<'a>(part: &'a Value, mime_type: &str) -> Option<&'a str> {
    if part["mimeType"].as_str() == Some(mime_type) {
        if let Some(data) = part["body"]["data"].as_str() {
            return Some(data);
        }
    }
    part["parts"]
        .as_array()?
        .iter()
        .find_map(|child| find_part(child, mime_type))
}

fn decode_part(data: &str) -> Option<String> {
    decode_base64url(data).map(|bytes| String::from_utf8_lossy(&bytes).into_owned())
}

/// Gmail hands out base64url both with and without padding.
fn decode_base64url(data: &str) -> Option<Vec<u8>> {
    URL_SAFE_NO_PAD.decode(data.trim_end_matches('=')).ok()
}

fn attachments(part: &Value) -> Vec<Value> {
    let mut found = Vec::new();
    collect_attachments(part, &mut found);
    found
}

fn collect_attachments(part: &Value, found: &mut Vec<Value>) {
    if let (Some(filename), Some(attachment_id)) = (
        part["filename"].as_str().filter(|f| !f.is_empty()),
        part["body"]["attachmentId"].as_str(),
    ) {
        found.push(json!({
            "filename": filename,
            "mimeType": part["mimeType"],
            "attachmentId": attachment_id,
            "size": part["body"]["size"],
        }));
    }
    if let Some(children) = part["parts"].as_array() {
        for child in children {
            collect_attachments(child, found);
        }
    }
}
