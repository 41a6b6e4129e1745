//! Turn identity and launch plan

use std::ffi::OsString;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::transport::subprocess::CommandBuilder;
use crate::types::identifiers::SessionId;
use crate::types::options::SessionOptions;

/// Monotonic turn number within one session
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TurnId(pub u64);

impl fmt::Display for TurnId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Everything needed to launch the process for one turn
///
/// Produced by the session before spawning, so the resume threading between
/// turns is a plain value that can be inspected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TurnPlan {
    /// Turn this plan belongs to
    pub turn: TurnId,
    /// Remote session to resume, known after the first `system/init`
    pub resume: Option<SessionId>,
    /// Skip permission negotiation
    pub dangerous: bool,
}

impl TurnPlan {
    /// CLI arguments for this turn under `options`
    #[must_use]
    pub fn args(&self, options: &SessionOptions) -> Vec<OsString> {
        CommandBuilder::new(self, options).args()
    }

    /// Whether the argument vector resumes `session_id`
    #[must_use]
    pub fn resumes(&self, session_id: &str) -> bool {
        self.resume.as_ref().is_some_and(|id| id.as_str() == session_id)
    }
}
