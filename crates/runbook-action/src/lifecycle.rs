//! Action lifecycle state machine.
//!
//! An action moves through `Unparsed -> Parsed -> Expanded -> Validated`,
//! with `Failed` as a terminal state entered when any phase reports an error.
//! Phase methods invoked out of order are contract violations and are
//! rejected with a typed error rather than being treated as data errors.

use std::fmt;

use runbook_model::ContextActivity;

use crate::error::LifecycleError;

/// Lifecycle phase of an action instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Phase {
    #[default]
    Unparsed,
    Parsed,
    Expanded,
    Validated,
    Failed,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::Unparsed => write!(f, "unparsed"),
            Phase::Parsed => write!(f, "parsed"),
            Phase::Expanded => write!(f, "expanded"),
            Phase::Validated => write!(f, "validated"),
            Phase::Failed => write!(f, "failed"),
        }
    }
}

/// Check that `activity` may run against an action currently in `phase`.
///
/// Allowed operations:
/// - Parse: only from `Unparsed` (a second parse is a contract violation)
/// - Expand: from `Parsed`, or again from `Expanded` (a stored action may be
///   expanded by the store and by every composite that references it)
/// - Validate: after a successful parse, repeatably
/// - Execute: once expansion has succeeded
pub fn check_operation(phase: Phase, activity: ContextActivity) -> Result<(), LifecycleError> {
    let allowed = match activity {
        ContextActivity::Parse => matches!(phase, Phase::Unparsed),
        ContextActivity::Expand => matches!(phase, Phase::Parsed | Phase::Expanded),
        ContextActivity::Validate => {
            matches!(phase, Phase::Parsed | Phase::Expanded | Phase::Validated)
        }
        ContextActivity::Execute => matches!(phase, Phase::Expanded | Phase::Validated),
    };

    if allowed {
        Ok(())
    } else {
        Err(LifecycleError { phase, activity })
    }
}
