use uuid::Uuid;

use crate::record::{RequestFact, ServiceEvent};

const MAX_LABEL_LEN: usize = 128;
const MAX_PROPERTY_VALUE_BYTES: usize = 1024;

/// Rejection reasons for record validation.
///
/// Each variant carries enough detail for a client-visible 400 body; the
/// ingestion handler never has to re-derive a message from a bare enum tag.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("event_id must be a version-7 UUID")]
    NotTimeSortableId,
    #[error("missing required field: {0}")]
    MissingField(&'static str),
    #[error("status_code must be in [100, 599], got {0}")]
    StatusCodeOutOfRange(i32),
    #[error("latency_ms must be non-negative, got {0}")]
    NegativeLatency(i64),
    #[error("path_template must not contain a query string, raw UUID segment, or numeric segment of length >= 4: {0}")]
    InvalidPathTemplate(String),
    #[error("event_type must be a snake_case token: {0}")]
    InvalidEventType(String),
    #[error("label exceeds {MAX_LABEL_LEN} bytes: {0}")]
    LabelTooLong(String),
    #[error("property {key} exceeds {MAX_PROPERTY_VALUE_BYTES} bytes")]
    PropertyValueTooLong { key: String },
    #[error("property {key} looks like nested JSON, only flat string values are allowed")]
    NestedJsonProperty { key: String },
}

pub fn validate_request_fact(fact: &RequestFact) -> Result<(), ValidationError> {
    validate_event_id(fact.event_id)?;
    validate_label("service", &fact.service)?;
    if fact.method.is_empty() {
        return Err(ValidationError::MissingField("method"));
    }
    validate_label("method", &fact.method)?;
    validate_path_template(&fact.path_template)?;
    if !(100..=599).contains(&fact.status_code) {
        return Err(ValidationError::StatusCodeOutOfRange(fact.status_code));
    }
    if fact.latency_ms < 0 {
        return Err(ValidationError::NegativeLatency(fact.latency_ms));
    }
    if let Some(uaf) = &fact.user_agent_family {
        validate_label("user_agent_family", uaf)?;
    }
    Ok(())
}

pub fn validate_service_event(event: &ServiceEvent) -> Result<(), ValidationError> {
    validate_event_id(event.event_id)?;
    validate_label("service", &event.service)?;
    validate_event_type(&event.event_type)?;
    if let Some(entity_id) = &event.entity_id {
        validate_label("entity_id", entity_id)?;
    }
    for (key, value) in &event.properties {
        if value.len() > MAX_PROPERTY_VALUE_BYTES {
            return Err(ValidationError::PropertyValueTooLong { key: key.clone() });
        }
        if looks_like_nested_json(value) {
            return Err(ValidationError::NestedJsonProperty { key: key.clone() });
        }
    }
    Ok(())
}

fn validate_event_id(id: Uuid) -> Result<(), ValidationError> {
    if id.get_version_num() != 7 {
        return Err(ValidationError::NotTimeSortableId);
    }
    Ok(())
}

fn validate_label(name: &'static str, value: &str) -> Result<(), ValidationError> {
    if value.is_empty() {
        return Err(ValidationError::MissingField(name));
    }
    if value.len() > MAX_LABEL_LEN {
        return Err(ValidationError::LabelTooLong(value.to_string()));
    }
    Ok(())
}

fn validate_path_template(path: &str) -> Result<(), ValidationError> {
    if path.is_empty() {
        return Err(ValidationError::MissingField("path_template"));
    }
    if path.contains('?') {
        return Err(ValidationError::InvalidPathTemplate(path.to_string()));
    }
    for segment in path.split('/') {
        if segment.is_empty() {
            continue;
        }
        if is_numeric_segment(segment) && segment.len() >= 4 {
            return Err(ValidationError::InvalidPathTemplate(path.to_string()));
        }
        if Uuid::parse_str(segment).is_ok() {
            return Err(ValidationError::InvalidPathTemplate(path.to_string()));
        }
    }
    Ok(())
}

fn is_numeric_segment(segment: &str) -> bool {
    !segment.is_empty() && segment.bytes().all(|b| b.is_ascii_digit())
}

fn validate_event_type(event_type: &str) -> Result<(), ValidationError> {
    let valid = !event_type.is_empty()
        && event_type
            .chars()
            .next()
            .is_some_and(|c| c.is_ascii_lowercase())
        && event_type
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_');
    if valid {
        Ok(())
    } else {
        Err(ValidationError::InvalidEventType(event_type.to_string()))
    }
}

fn looks_like_nested_json(value: &str) -> bool {
    let trimmed = value.trim();
    (trimmed.starts_with('{') && trimmed.ends_with('}'))
        || (trimmed.starts_with('[') && trimmed.ends_with(']'))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use std::collections::HashMap;

    fn v7() -> Uuid {
        Uuid::now_v7()
    }

    fn base_fact() -> RequestFact {
        RequestFact {
            event_id: v7(),
            event_time: Utc::now(),
            service: "api-service".to_string(),
            method: "GET".to_string(),
            path_template: "/users/{id}".to_string(),
            status_code: 200,
            latency_ms: 10,
            user_agent_family: None,
        }
    }

    fn base_event() -> ServiceEvent {
        ServiceEvent {
            event_id: v7(),
            event_time: Utc::now(),
            service: "api-service".to_string(),
            event_type: "deploy_started".to_string(),
            entity_id: None,
            properties: HashMap::new(),
        }
    }

    #[test]
    fn status_code_boundaries() {
        let mut fact = base_fact();
        fact.status_code = 100;
        assert!(validate_request_fact(&fact).is_ok());
        fact.status_code = 599;
        assert!(validate_request_fact(&fact).is_ok());
        fact.status_code = 99;
        assert!(validate_request_fact(&fact).is_err());
        fact.status_code = 600;
        assert!(validate_request_fact(&fact).is_err());
    }

    #[test]
    fn latency_boundaries() {
        let mut fact = base_fact();
        fact.latency_ms = 0;
        assert!(validate_request_fact(&fact).is_ok());
        fact.latency_ms = -1;
        assert!(validate_request_fact(&fact).is_err());
    }

    #[test]
    fn path_template_rules() {
        assert!(validate_path_template("/users/{id}").is_ok());
        assert!(validate_path_template("/users/12345").is_err());
        assert!(validate_path_template("/users/018b3e34-5b6c-7e8f-9a0b-1c2d3e4f5a6b").is_err());
        assert!(validate_path_template("/users?x=1").is_err());
    }

    #[test]
    fn event_type_rules() {
        assert!(validate_event_type("deploy_started").is_ok());
        assert!(validate_event_type("DeployStarted").is_err());
        assert!(validate_event_type("deploy-started").is_err());
        assert!(validate_event_type("deploy started!").is_err());
    }

    #[test]
    fn property_value_length_boundary() {
        let mut event = base_event();
        event.properties.insert("note".to_string(), "a".repeat(1024));
        assert!(validate_service_event(&event).is_ok());
        event.properties.insert("note".to_string(), "a".repeat(1025));
        assert!(validate_service_event(&event).is_err());
    }

    #[test]
    fn nested_json_property_rejected() {
        let mut event = base_event();
        event
            .properties
            .insert("payload".to_string(), "{\"a\":1}".to_string());
        assert!(validate_service_event(&event).is_err());
        event
            .properties
            .insert("payload".to_string(), "[1,2,3]".to_string());
        assert!(validate_service_event(&event).is_err());
    }

    #[test]
    fn non_v7_event_id_rejected() {
        let mut fact = base_fact();
        fact.event_id = Uuid::new_v4();
        assert!(matches!(
            validate_request_fact(&fact),
            Err(ValidationError::NotTimeSortableId)
        ));
    }
}
