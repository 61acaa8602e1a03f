use crate::error::StorageError;

/// Validates that `key` resolves to a path strictly within the backend's
/// base directory, without touching the filesystem (the key may name a file
/// that doesn't exist yet). Rejects absolute keys, `.` / `..` components, and
/// empty segments other than a single leading/trailing slash.
pub fn sanitize_key(key: &str) -> Result<String, StorageError> {
    if key.is_empty() {
        return Err(StorageError::InvalidKey {
            key: key.to_string(),
            reason: "empty key".to_string(),
        });
    }

    let mut normalized = Vec::new();
    for segment in key.split('/') {
        match segment {
            "" => continue,
            "." => continue,
            ".." => {
                return Err(StorageError::InvalidKey {
                    key: key.to_string(),
                    reason: "path traversal segment `..`".to_string(),
                });
            }
            other => normalized.push(other),
        }
    }

    if normalized.is_empty() {
        return Err(StorageError::InvalidKey {
            key: key.to_string(),
            reason: "key resolves to empty path".to_string(),
        });
    }

    Ok(normalized.join("/"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_plain_key() {
        assert_eq!(
            sanitize_key("raw/request_facts/2025-01-15/10/batch.jsonl").unwrap(),
            "raw/request_facts/2025-01-15/10/batch.jsonl"
        );
    }

    #[test]
    fn rejects_traversal() {
        assert!(sanitize_key("raw/../../../etc/passwd").is_err());
        assert!(sanitize_key("../escape").is_err());
    }

    #[test]
    fn rejects_empty() {
        assert!(sanitize_key("").is_err());
        assert!(sanitize_key("./.").is_err());
    }

    #[test]
    fn strips_redundant_slashes() {
        assert_eq!(sanitize_key("//a//b/").unwrap(), "a/b");
    }
}
