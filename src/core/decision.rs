//! Gate decision type and the process exit-code contract.
//!
//! The host treats exit 0 as allow, exit 2 as block (message on stderr),
//! and anything else as an internal error to be handled conservatively.

/// Process exit status for an allowed action.
pub const EXIT_ALLOW: i32 = 0;
/// Process exit status for a deliberate block (distinct from a crash).
pub const EXIT_BLOCK: i32 = 2;
/// Process exit status for internal errors (host must treat as blocked).
pub const EXIT_INTERNAL: i32 = 1;

/// Outcome of a gate evaluation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    Allow,
    Block(String),
}

impl Decision {
    pub fn is_allow(&self) -> bool {
        matches!(self, Decision::Allow)
    }

    pub fn exit_code(&self) -> i32 {
        match self {
            Decision::Allow => EXIT_ALLOW,
            Decision::Block(_) => EXIT_BLOCK,
        }
    }

    /// Block reason, if any.
    pub fn reason(&self) -> Option<&str> {
        match self {
            Decision::Allow => None,
            Decision::Block(reason) => Some(reason),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_codes_distinct() {
        assert_ne!(EXIT_ALLOW, EXIT_BLOCK);
        assert_ne!(EXIT_BLOCK, EXIT_INTERNAL);
        assert_eq!(Decision::Allow.exit_code(), 0);
        assert_eq!(Decision::Block("x".into()).exit_code(), 2);
    }
}
