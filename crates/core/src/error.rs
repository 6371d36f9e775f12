use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Malformed {kind} annotation: {reason}")]
    MalformedAnnotation { kind: &'static str, reason: String },

    #[error("Unknown {kind}: {value}")]
    UnknownVariant { kind: &'static str, value: String },
}

pub type Result<T> = std::result::Result<T, CoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let error = CoreError::UnknownVariant {
            kind: "git working mode",
            value: "svn".to_string(),
        };
        assert_eq!(error.to_string(), "Unknown git working mode: svn");
    }

    #[test]
    fn test_malformed_annotation_display() {
        let error = CoreError::MalformedAnnotation {
            kind: "scope",
            reason: "expected value at line 1".to_string(),
        };
        let text = error.to_string();
        assert!(text.contains("scope"));
        assert!(text.contains("expected value"));
    }
}
