pub mod calendar;
pub mod email_finder;
pub mod gmail;
pub mod google;
pub mod linkedin;
pub mod mime;
pub mod search;
pub mod tracker;

use prospect_common::HttpClient;
use prospect_dispatch::{ToolHandler, ToolRegistry};
use std::sync::Arc;

/// Register `handler`, warning when it shadows an earlier tool of the same
/// name. The later handler wins.
fn add(registry: &mut ToolRegistry, handler: impl ToolHandler + 'static) {
    if let Some(previous) = registry.register(handler) {
        tracing::warn!(
            "Tool {} registered twice, keeping the later handler",
            previous.descriptor().name
        );
    }
}

pub fn email_finder_tools(http: Arc<dyn HttpClient>, api_key: String) -> ToolRegistry {
    let mut registry = ToolRegistry::new();
    add(&mut registry, email_finder::FindEmailTool::new(http, api_key));
    registry
}

pub fn linkedin_tools(http: Arc<dyn HttpClient>, api_key: String) -> ToolRegistry {
    let mut registry = ToolRegistry::new();
    add(&mut registry, linkedin::PersonProfileTool::new(http, api_key));
    registry
}

pub fn search_tools(http: Arc<dyn HttpClient>, settings: search::SearchSettings) -> ToolRegistry {
    let mut registry = ToolRegistry::new();
    add(&mut registry, search::GoogleDorksTool::new(http, settings));
    registry
}

pub fn tracker_tools(store: Arc<dyn tracker::TrackingStore>) -> ToolRegistry {
    let mut registry = ToolRegistry::new();
    add(&mut registry, tracker::TrackUrlEmailTool::new(store.clone()));
    add(&mut registry, tracker::GetTrackedDataTool::new(store));
    registry
}

/// Gmail and Calendar tools. Every one of them needs a session, so the
/// registry is meant to sit behind a gated dispatcher.
pub fn gsuite_tools(api: google::GoogleApi) -> ToolRegistry {
    let mut registry = ToolRegistry::new();
    add(&mut registry, gmail::QueryEmailsTool::new(api.clone()));
    add(&mut registry, gmail::GetEmailTool::new(api.clone()));
    add(&mut registry, gmail::BulkGetEmailsTool::new(api.clone()));
    add(&mut registry, gmail::GetAttachmentTool::new(api.clone()));
    add(&mut registry, gmail::BulkSaveAttachmentsTool::new(api.clone()));
    add(&mut registry, gmail::CreateDraftTool::new(api.clone()));
    add(&mut registry, gmail::DeleteDraftTool::new(api.clone()));
    add(&mut registry, gmail::ReplyEmailTool::new(api.clone()));
    add(&mut registry, gmail::SendEmailTool::new(api.clone()));
    add(&mut registry, calendar::ListCalendarsTool::new(api.clone()));
    add(&mut registry, calendar::GetEventsTool::new(api.clone()));
    add(&mut registry, calendar::CreateEventTool::new(api.clone()));
    add(&mut registry, calendar::DeleteEventTool::new(api));
    registry
}
