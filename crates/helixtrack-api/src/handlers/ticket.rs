//! The `ticket` action family, the one domain entity implemented beyond a
//! stub — standing in for the hundreds of mechanical CRUD endpoints the
//! rest of the domain follows. Backed by an in-memory store rather than a
//! real repository, since ticket persistence isn't part of the access-
//! control/event-publication schema this core owns.

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use serde_json::Value as Json;
use std::sync::atomic::{AtomicU64, Ordering};
use uuid::Uuid;

use crate::error::ApiError;

#[derive(Debug, Clone, Serialize)]
pub struct Ticket {
    pub id: String,
    #[serde(rename = "projectId")]
    pub project_id: String,
    pub title: String,
    pub status: String,
    pub reporter: String,
}

#[derive(Debug, Deserialize)]
struct CreateInput {
    #[serde(rename = "projectId")]
    project_id: String,
    title: String,
}

#[derive(Debug, Deserialize)]
struct UpdateInput {
    id: String,
    status: Option<String>,
    title: Option<String>,
}

#[derive(Debug, Deserialize)]
struct DeleteInput {
    id: String,
}

#[derive(Debug, Deserialize)]
struct ListInput {
    #[serde(rename = "projectId")]
    project_id: Option<String>,
}

#[derive(Default)]
pub struct TicketStore {
    tickets: DashMap<String, Ticket>,
    sequence: AtomicU64,
}

impl TicketStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn next_id(&self) -> String {
        let n = self.sequence.fetch_add(1, Ordering::Relaxed) + 1;
        format!("TCK-{n}")
    }
}

/// Returns `(response data, event entity-id, event data)` on a successful
/// mutation so the dispatcher can publish afterward.
pub fn create(store: &TicketStore, actor: &str, input: Json) -> Result<(Json, String, Json), ApiError> {
    let input: CreateInput = serde_json::from_value(input).map_err(|e| ApiError::invalid_request(e.to_string()))?;
    let id = store.next_id();
    let ticket = Ticket {
        id: id.clone(),
        project_id: input.project_id,
        title: input.title,
        status: "open".to_string(),
        reporter: actor.to_string(),
    };
    store.tickets.insert(id.clone(), ticket.clone());
    let data = serde_json::to_value(&ticket).expect("Ticket always serializes");
    Ok((data.clone(), id, data))
}

pub fn list(store: &TicketStore, input: Json) -> Result<Json, ApiError> {
    let input: ListInput = serde_json::from_value(input).map_err(|e| ApiError::invalid_request(e.to_string()))?;
    let tickets: Vec<Ticket> = store
        .tickets
        .iter()
        .map(|entry| entry.value().clone())
        .filter(|t| input.project_id.as_deref().map_or(true, |p| p == t.project_id))
        .collect();
    Ok(serde_json::to_value(tickets).expect("Vec<Ticket> always serializes"))
}

pub fn update(store: &TicketStore, input: Json) -> Result<(Json, String, Json), ApiError> {
    let input: UpdateInput = serde_json::from_value(input).map_err(|e| ApiError::invalid_request(e.to_string()))?;
    let mut entry = store
        .tickets
        .get_mut(&input.id)
        .ok_or_else(|| ApiError::invalid_request(format!("unknown ticket: {}", input.id)))?;
    if let Some(status) = input.status {
        entry.status = status;
    }
    if let Some(title) = input.title {
        entry.title = title;
    }
    let data = serde_json::to_value(&*entry).expect("Ticket always serializes");
    Ok((data.clone(), input.id, data))
}

pub fn delete(store: &TicketStore, input: Json) -> Result<(Json, String), ApiError> {
    let input: DeleteInput = serde_json::from_value(input).map_err(|e| ApiError::invalid_request(e.to_string()))?;
    store
        .tickets
        .remove(&input.id)
        .ok_or_else(|| ApiError::invalid_request(format!("unknown ticket: {}", input.id)))?;
    Ok((Json::Null, input.id))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_then_list_returns_the_new_ticket() {
        let store = TicketStore::new();
        let (data, id, _) = create(
            &store,
            "alice",
            serde_json::json!({"projectId": "X", "title": "fix the thing"}),
        )
        .unwrap();
        assert_eq!(data["id"], id);

        let listed = list(&store, serde_json::json!({"projectId": "X"})).unwrap();
        assert_eq!(listed.as_array().unwrap().len(), 1);
    }

    #[test]
    fn update_unknown_ticket_is_an_invalid_request() {
        let store = TicketStore::new();
        let err = update(&store, serde_json::json!({"id": "TCK-999", "status": "closed"})).unwrap_err();
        assert_eq!(err.code.code(), 1000);
    }
}
