//! Error taxonomy for member actions.
//!
//! No variant is fatal to a study: a faulty action is reported back to the
//! requester and never disturbs other members' state.

/// Why a member action was rejected.
#[derive(Debug, thiserror::Error)]
pub enum ActionError {
    /// The capability is not allowed for the requester's role.
    #[error("permission denied: {0}")]
    PermissionDenied(String),

    /// The referenced chapter or path no longer exists, e.g. it was deleted
    /// by another member. The requester is resynced via `reloadRequired`.
    #[error("invalid target: {0}")]
    InvalidTarget(String),

    /// The chapter's mode forbids this mutation, e.g. a shared write while
    /// a gamebook viewer.
    #[error("mode violation: {0}")]
    ModeViolation(String),

    /// The payload failed structural validation before any permission check.
    #[error("malformed action: {0}")]
    MalformedAction(String),
}

impl ActionError {
    /// `InvalidTarget` is the one error that self-heals through a forced
    /// resynchronization of the requester.
    pub fn needs_resync(&self) -> bool {
        matches!(self, ActionError::InvalidTarget(_))
    }
}
