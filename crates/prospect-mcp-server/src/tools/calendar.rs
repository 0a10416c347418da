use super::google::{user_scoped_schema, GoogleApi};
use chrono::{SecondsFormat, Utc};
use prospect_common::HttpRequest;
use prospect_dispatch::{ToolCall, ToolContent, ToolDescriptor, ToolError, ToolHandler};
use serde::Deserialize;
use serde_json::{json, Map, Value};

const PRIMARY_CALENDAR: &str = "primary";
const DEFAULT_MAX_EVENTS: u32 = 250;
const MAX_EVENTS_LIMIT: u32 = 2500;

fn primary_calendar() -> String {
    PRIMARY_CALENDAR.to_string()
}

fn default_true() -> bool {
    true
}

fn calendar_id_property() -> Value {
    json!({
        "type": "string",
        "description": "The ID of the calendar. Defaults to the user's primary calendar.",
        "default": PRIMARY_CALENDAR
    })
}

fn send_updates(notify: bool) -> String {
    let mode = if notify { "all" } else { "none" };
    mode.to_string()
}

pub struct ListCalendarsTool {
    api: GoogleApi,
}

pub struct GetEventsTool {
    api: GoogleApi,
}

pub struct CreateEventTool {
    api: GoogleApi,
}

pub struct DeleteEventTool {
    api: GoogleApi,
}

#[derive(Deserialize)]
struct EventsParams {
    #[serde(default = "primary_calendar")]
    calendar_id: String,
    #[serde(default)]
    time_min: Option<String>,
    #[serde(default)]
    time_max: Option<String>,
    #[serde(default)]
    max_results: Option<u32>,
    #[serde(default)]
    show_deleted: bool,
}

#[derive(Deserialize)]
struct CreateEventParams {
    #[serde(default = "primary_calendar")]
    calendar_id: String,
    summary: String,
    start_time: String,
    end_time: String,
    #[serde(default)]
    location: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    attendees: Vec<String>,
    #[serde(default = "default_true")]
    send_notifications: bool,
    #[serde(default)]
    timezone: Option<String>,
}

#[derive(Deserialize)]
struct DeleteEventParams {
    #[serde(default = "primary_calendar")]
    calendar_id: String,
    event_id: String,
    #[serde(default = "default_true")]
    send_notifications: bool,
}

impl ListCalendarsTool {
    pub fn new(api: GoogleApi) -> Self {
        Self { api }
    }
}

#[async_trait::async_trait]
impl ToolHandler for ListCalendarsTool {
    fn descriptor(&self) -> ToolDescriptor {
        ToolDescriptor {
            name: "list_calendars".into(),
            description: "Lists all calendars accessible by the user. Call it before any \
                other calendar tool whenever the user specifies a particular agenda."
                .into(),
            input_schema: user_scoped_schema(json!({}), &[]),
        }
    }

    async fn run(&self, call: ToolCall) -> Result<Vec<ToolContent>, ToolError> {
        let session = call.session()?;

        let url = self.api.calendar_url(&["users", "me", "calendarList"], &[])?;
        let listing = self.api.send(session, HttpRequest::get(url)).await?;

        let calendars: Vec<Value> = listing["items"]
            .as_array()
            .map(|items| {
                items
                    .iter()
                    .map(|item| {
                        json!({
                            "id": item["id"],
                            "summary": item["summary"],
                            "primary": item["primary"].as_bool().unwrap_or(false),
                            "time_zone": item["timeZone"],
                            "etag": item["etag"],
                            "access_role": item["accessRole"],
                        })
                    })
                    .collect()
            })
            .unwrap_or_default();

        Ok(vec![ToolContent::json(&Value::Array(calendars))])
    }
}

impl GetEventsTool {
    pub fn new(api: GoogleApi) -> Self {
        Self { api }
    }
}

#[async_trait::async_trait]
impl ToolHandler for GetEventsTool {
    fn descriptor(&self) -> ToolDescriptor {
        ToolDescriptor {
            name: "get_calendar_events".into(),
            description: "Retrieves calendar events from the user's Google Calendar \
                within a specified time range, expanded into single instances and \
                ordered by start time."
                .into(),
            input_schema: user_scoped_schema(
                json!({
                    "calendar_id": calendar_id_property(),
                    "time_min": {
                        "type": "string",
                        "description": "Start time in RFC3339 format (e.g. 2024-12-01T00:00:00Z). Defaults to now."
                    },
                    "time_max": {
                        "type": "string",
                        "description": "End time in RFC3339 format (e.g. 2024-12-31T23:59:59Z). Optional."
                    },
                    "max_results": {
                        "type": "integer",
                        "description": "Maximum number of events to return (1-2500)",
                        "minimum": 1,
                        "maximum": MAX_EVENTS_LIMIT,
                        "default": DEFAULT_MAX_EVENTS
                    },
                    "show_deleted": {
                        "type": "boolean",
                        "description": "Whether to include deleted events",
                        "default": false
                    }
                }),
                &[],
            ),
        }
    }

    async fn run(&self, call: ToolCall) -> Result<Vec<ToolContent>, ToolError> {
        let session = call.session()?;
        let params: EventsParams = call.parse()?;

        let time_min = params
            .time_min
            .unwrap_or_else(|| Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true));
        let max_results = params
            .max_results
            .unwrap_or(DEFAULT_MAX_EVENTS)
            .clamp(1, MAX_EVENTS_LIMIT);

        let mut query = vec![
            ("timeMin", time_min),
            ("maxResults", max_results.to_string()),
            ("singleEvents", "true".to_string()),
            ("orderBy", "startTime".to_string()),
            ("showDeleted", params.show_deleted.to_string()),
        ];
        if let Some(time_max) = params.time_max {
            query.push(("timeMax", time_max));
        }

        let url = self
            .api
            .calendar_url(&["calendars", &params.calendar_id, "events"], &query)?;
        let events = self.api.send(session, HttpRequest::get(url)).await?;

        let items = events["items"].as_array().cloned().unwrap_or_default();
        Ok(vec![ToolContent::json(&Value::Array(items))])
    }
}

impl CreateEventTool {
    pub fn new(api: GoogleApi) -> Self {
        Self { api }
    }
}

#[async_trait::async_trait]
impl ToolHandler for CreateEventTool {
    fn descriptor(&self) -> ToolDescriptor {
        ToolDescriptor {
            name: "create_calendar_event".into(),
            description: "Creates a new event in a specified Google Calendar of the \
                specified user."
                .into(),
            input_schema: user_scoped_schema(
                json!({
                    "calendar_id": calendar_id_property(),
                    "summary": { "type": "string", "description": "Title of the event" },
                    "start_time": {
                        "type": "string",
                        "description": "Start time in RFC3339 format (e.g. 2024-12-01T10:00:00Z)"
                    },
                    "end_time": {
                        "type": "string",
                        "description": "End time in RFC3339 format (e.g. 2024-12-01T11:00:00Z)"
                    },
                    "location": { "type": "string", "description": "Location of the event (optional)" },
                    "description": { "type": "string", "description": "Description or notes for the event (optional)" },
                    "attendees": {
                        "type": "array",
                        "items": { "type": "string" },
                        "description": "List of attendee email addresses (optional)"
                    },
                    "send_notifications": {
                        "type": "boolean",
                        "description": "Whether to send notifications to attendees",
                        "default": true
                    },
                    "timezone": {
                        "type": "string",
                        "description": "Timezone for the event (e.g. 'America/New_York'). Defaults to the calendar's timezone."
                    }
                }),
                &["summary", "start_time", "end_time"],
            ),
        }
    }

    async fn run(&self, call: ToolCall) -> Result<Vec<ToolContent>, ToolError> {
        let session = call.session()?;
        let params: CreateEventParams = call.parse()?;

        let url = self.api.calendar_url(
            &["calendars", &params.calendar_id, "events"],
            &[("sendUpdates", send_updates(params.send_notifications))],
        )?;
        let request = HttpRequest::post(url).json(&event_body(&params))?;
        let event = self.api.send(session, request).await?;

        Ok(vec![ToolContent::json(&event)])
    }
}

fn event_body(params: &CreateEventParams) -> Value {
    let moment = |date_time: &str| {
        let mut moment = Map::new();
        moment.insert("dateTime".into(), json!(date_time));
        if let Some(tz) = &params.timezone {
            moment.insert("timeZone".into(), json!(tz));
        }
        Value::Object(moment)
    };

    let mut body = Map::new();
    body.insert("summary".into(), json!(params.summary));
    body.insert("start".into(), moment(&params.start_time));
    body.insert("end".into(), moment(&params.end_time));
    if let Some(location) = &params.location {
        body.insert("location".into(), json!(location));
    }
    if let Some(description) = &params.description {
        body.insert("description".into(), json!(description));
    }
    if !params.attendees.is_empty() {
        let attendees: Vec<Value> = params
            .attendees
            .iter()
            .map(|email| json!({ "email": email }))
            .collect();
        body.insert("attendees".into(), Value::Array(attendees));
    }
    Value::Object(body)
}

impl DeleteEventTool {
    pub fn new(api: GoogleApi) -> Self {
        Self { api }
    }
}

#[async_trait::async_trait]
impl ToolHandler for DeleteEventTool {
    fn descriptor(&self) -> ToolDescriptor {
        ToolDescriptor {
            name: "delete_calendar_event".into(),
            description: "Deletes an event from the user's Google Calendar by its event ID."
                .into(),
            input_schema: user_scoped_schema(
                json!({
                    "calendar_id": calendar_id_property(),
                    "event_id": { "type": "string", "description": "The ID of the calendar event to delete" },
                    "send_notifications": {
                        "type": "boolean",
                        "description": "Whether to send cancellation notifications to attendees",
                        "default": true
                    }
                }),
                &["event_id"],
            ),
        }
    }

    async fn run(&self, call: ToolCall) -> Result<Vec<ToolContent>, ToolError> {
        let session = call.session()?;
        let params: DeleteEventParams = call.parse()?;

        let url = self.api.calendar_url(
            &["calendars", &params.calendar_id, "events", &params.event_id],
            &[("sendUpdates", send_updates(params.send_notifications))],
        )?;
        self.api.send(session, HttpRequest::delete(url)).await?;

        Ok(vec![ToolContent::text(format!(
            "Successfully deleted event {}",
            params.event_id
        ))])
    }
}
