//! Error taxonomy for rule evaluation and execution.
//!
//! Only [`EngineError::Internal`] is fatal to a dispatch cycle. The other
//! kinds degrade: validation errors reject a rule before it ever reaches the
//! dispatcher, resolution failures make the affected predicate or recipient
//! a no-op, execution failures are collected per firing, and security blocks
//! are informational.

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// A rule is malformed and must be rejected before persistence.
    #[error("Validation failed: {0}")]
    Validation(String),

    /// An attribute, recipient, or calendar lookup returned nothing.
    #[error("Resolution failed: {0}")]
    Resolution(String),

    /// A perform action could not complete against the target record.
    #[error("Execution failed on {target}: {reason}")]
    Execution { target: String, reason: String },

    /// A `discard` security policy suppressed an outbound action.
    #[error("Security policy discarded action: {0}")]
    SecurityPolicy(String),

    /// A programming invariant was violated; aborts the whole dispatch cycle.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl EngineError {
    /// Shorthand for an [`EngineError::Execution`] with an owned target.
    pub fn execution(target: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Execution {
            target: target.into(),
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn execution_display_includes_target_and_reason() {
        let err = EngineError::execution("ticket.state_id", "unknown state 99");
        assert_eq!(
            err.to_string(),
            "Execution failed on ticket.state_id: unknown state 99"
        );
    }

    #[test]
    fn validation_display() {
        let err = EngineError::Validation("recipient is missing".to_string());
        assert_eq!(err.to_string(), "Validation failed: recipient is missing");
    }
}
