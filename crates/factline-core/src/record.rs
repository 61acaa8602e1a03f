use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A completed HTTP request.
///
/// Unknown top-level JSON fields are rejected at the wire boundary
/// (`deny_unknown_fields`); this is the entire "unknown field" rule from the
/// record JSON form, enforced once at parse time rather than re-checked by
/// every validator.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct RequestFact {
    pub event_id: Uuid,
    pub event_time: DateTime<Utc>,
    pub service: String,
    pub method: String,
    pub path_template: String,
    pub status_code: i32,
    pub latency_ms: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_agent_family: Option<String>,
}

/// A lifecycle / business event.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct ServiceEvent {
    pub event_id: Uuid,
    pub event_time: DateTime<Utc>,
    pub service: String,
    pub event_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entity_id: Option<String>,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub properties: HashMap<String, String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_fact_rejects_unknown_field() {
        let raw = r#"{
            "event_id": "018b3e34-5b6c-7e8f-9a0b-1c2d3e4f5a6b",
            "event_time": "2025-01-15T10:30:05Z",
            "service": "auth-service",
            "method": "POST",
            "path_template": "/login",
            "status_code": 200,
            "latency_ms": 45,
            "bogus": "field"
        }"#;
        assert!(serde_json::from_str::<RequestFact>(raw).is_err());
    }

    #[test]
    fn request_fact_roundtrips() {
        let raw = r#"{
            "event_id": "018b3e34-5b6c-7e8f-9a0b-1c2d3e4f5a6b",
            "event_time": "2025-01-15T10:30:05Z",
            "service": "auth-service",
            "method": "POST",
            "path_template": "/login",
            "status_code": 200,
            "latency_ms": 45
        }"#;
        let fact: RequestFact = serde_json::from_str(raw).unwrap();
        assert_eq!(fact.service, "auth-service");
        assert_eq!(fact.status_code, 200);
        let back = serde_json::to_string(&fact).unwrap();
        let reparsed: RequestFact = serde_json::from_str(&back).unwrap();
        assert_eq!(fact, reparsed);
    }
}
