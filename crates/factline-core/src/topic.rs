use std::fmt;
use std::str::FromStr;

/// A logical stream of records of one shape.
///
/// Determines the buffer sub-directory (`<bufferDir>/<topic>/...`) and the
/// raw key prefix (`raw/<topic>/...`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Topic {
    RequestFacts,
    ServiceEvents,
}

impl Topic {
    /// Directory / key-prefix segment for this topic.
    pub fn as_str(&self) -> &'static str {
        match self {
            Topic::RequestFacts => "request_facts",
            Topic::ServiceEvents => "service_events",
        }
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Topic {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "request_facts" => Ok(Topic::RequestFacts),
            "service_events" => Ok(Topic::ServiceEvents),
            other => Err(format!("unknown topic: {other}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip() {
        for t in [Topic::RequestFacts, Topic::ServiceEvents] {
            assert_eq!(Topic::from_str(t.as_str()).unwrap(), t);
        }
    }

    #[test]
    fn unknown_topic_rejected() {
        assert!(Topic::from_str("nope").is_err());
    }
}
