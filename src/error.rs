//! Error taxonomy for thumbnail resolution.
//!
//! Three of these variants are *recoverable* by policy: [`ThumbError::NotFound`],
//! [`ThumbError::Validation`] and [`ThumbError::Generation`] are swallowed by
//! the coordinator in silent mode and turned into a fallback locator pointing
//! at the original. Configuration errors always propagate — an unknown size
//! name or an unresolved context placeholder is a deployment mistake, not a
//! content problem, and hiding it behind a fallback image would mask the bug.
//!
//! Signed-URL failures have their own type ([`crate::signing::SignatureError`])
//! because they surface at the HTTP boundary, not through the coordinator.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ThumbError {
    /// Size name not present in the configured size table.
    #[error("thumbnail size '{0}' is not defined in the size table")]
    UnknownSize(String),

    /// Context name not present in the configured context table.
    #[error("thumbnail context '{0}' is not defined")]
    UnknownContext(String),

    /// A context template placeholder had no matching value.
    #[error("missing context value '{placeholder}' for context '{context}' (template: {template})")]
    MissingContextValue {
        context: String,
        placeholder: String,
        template: String,
    },

    /// The original image does not exist in storage.
    #[error("original image not found: {0}")]
    NotFound(String),

    /// The original failed the pre-generation security gate.
    #[error("image validation failed for {path}: {reason}")]
    Validation { path: String, reason: String },

    /// Decode, transform, encode or cache-write failure.
    #[error("thumbnail generation failed for {path}: {reason}")]
    Generation { path: String, reason: String },

    #[error("storage I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ThumbError {
    /// Whether silent mode may recover this error into a fallback locator.
    ///
    /// Configuration errors (unknown size/context, unresolved placeholder)
    /// and raw I/O errors are never recoverable.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            ThumbError::NotFound(_)
                | ThumbError::Validation { .. }
                | ThumbError::Generation { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn configuration_errors_are_not_recoverable() {
        assert!(!ThumbError::UnknownSize("huge".into()).is_recoverable());
        assert!(!ThumbError::UnknownContext("album".into()).is_recoverable());
        assert!(
            !ThumbError::MissingContextValue {
                context: "post".into(),
                placeholder: "post_id".into(),
                template: "user-posts/{user_id}/{post_id}".into(),
            }
            .is_recoverable()
        );
    }

    #[test]
    fn content_errors_are_recoverable() {
        assert!(ThumbError::NotFound("a.jpg".into()).is_recoverable());
        assert!(
            ThumbError::Validation {
                path: "a.jpg".into(),
                reason: "too large".into(),
            }
            .is_recoverable()
        );
        assert!(
            ThumbError::Generation {
                path: "a.jpg".into(),
                reason: "decode failed".into(),
            }
            .is_recoverable()
        );
    }

    #[test]
    fn missing_context_value_names_the_placeholder() {
        let err = ThumbError::MissingContextValue {
            context: "post".into(),
            placeholder: "post_id".into(),
            template: "user-posts/{user_id}/{post_id}".into(),
        };
        let msg = err.to_string();
        assert!(msg.contains("post_id"));
        assert!(msg.contains("'post'"));
    }
}
