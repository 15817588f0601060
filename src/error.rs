use std::path::PathBuf;

pub type ReelResult<T> = Result<T, ReelError>;

#[derive(thiserror::Error, Debug)]
pub enum ReelError {
    #[error("no such option '{0}'")]
    UnknownOption(String),

    #[error("option '{name}' needs {expected} not {actual}")]
    TypeMismatch {
        name: String,
        expected: &'static str,
        actual: &'static str,
    },

    #[error("validation error: {0}")]
    Validation(String),

    #[error("directory not found: '{}'", .0.display())]
    MissingDirectory(PathBuf),

    #[error("no drawing routine: pass one to record() or set one on the recorder")]
    MissingDrawRoutine,

    #[error("converter error: {0}")]
    Converter(String),

    #[error("encode error: {0}")]
    Encode(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl ReelError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn converter(msg: impl Into<String>) -> Self {
        Self::Converter(msg.into())
    }

    pub fn encode(msg: impl Into<String>) -> Self {
        Self::Encode(msg.into())
    }

    /// Errors reported before any capture work starts.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            Self::UnknownOption(_)
                | Self::TypeMismatch { .. }
                | Self::Validation(_)
                | Self::MissingDrawRoutine
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_prefixes_are_stable() {
        assert!(
            ReelError::validation("x")
                .to_string()
                .contains("validation error:")
        );
        assert!(
            ReelError::converter("x")
                .to_string()
                .contains("converter error:")
        );
        assert!(ReelError::encode("x").to_string().contains("encode error:"));
        assert_eq!(
            ReelError::UnknownOption("BOGUS".to_string()).to_string(),
            "no such option 'BOGUS'"
        );
    }

    #[test]
    fn type_mismatch_names_both_types() {
        let err = ReelError::TypeMismatch {
            name: "REBUILD".to_string(),
            expected: "boolean",
            actual: "string",
        };
        let msg = err.to_string();
        assert!(msg.contains("REBUILD"));
        assert!(msg.contains("boolean"));
        assert!(msg.contains("string"));
        assert!(err.is_configuration());
    }

    #[test]
    fn other_preserves_source() {
        let base = std::io::Error::other("boom");
        let err = ReelError::Other(anyhow::Error::new(base));
        assert!(err.to_string().contains("boom"));
        assert!(!err.is_configuration());
    }
}
