//! Action validation.
//!
//! Two entry points: [`validate_action`] for anything a store folds through
//! its reducer, and [`validate_remote_action`] for actions a Hub receives
//! from a Leaf.

use crate::error::ValidationError;
use crate::types::Action;

/// Validate an action before it reaches a user reducer.
pub fn validate_action(action: &Action) -> Result<(), ValidationError> {
    if action.kind.is_empty() {
        return Err(ValidationError::EmptyActionType);
    }
    if action.is_replace_state() {
        return Err(ValidationError::ReservedActionType(action.kind.clone()));
    }
    Ok(())
}

/// Validate an action forwarded by a Leaf.
///
/// Leaves may not originate replace-state or bookkeeping actions.
pub fn validate_remote_action(action: &Action) -> Result<(), ValidationError> {
    validate_action(action)?;
    if action.is_bookkeeping() {
        return Err(ValidationError::ReservedActionType(action.kind.clone()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::REPLACE_STATE_TYPE;

    #[test]
    fn test_plain_action_is_valid() {
        assert!(validate_action(&Action::new("INCREMENT")).is_ok());
    }

    #[test]
    fn test_empty_type_rejected() {
        assert_eq!(
            validate_action(&Action::new("")),
            Err(ValidationError::EmptyActionType)
        );
    }

    #[test]
    fn test_replace_state_type_rejected() {
        assert_eq!(
            validate_action(&Action::new(REPLACE_STATE_TYPE)),
            Err(ValidationError::ReservedActionType(REPLACE_STATE_TYPE.into()))
        );
    }

    #[test]
    fn test_remote_bookkeeping_rejected() {
        assert!(validate_action(&Action::new("@@INIT")).is_ok());
        assert!(validate_remote_action(&Action::new("@@INIT")).is_err());
    }
}
