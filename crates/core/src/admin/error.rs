use std::fmt;

/// Raised when an admin action fails after the form was accepted. The form is left intact.
#[derive(Debug, Clone)]
pub struct WorkflowError {
    pub action: &'static str,
    pub detail: String,
}

impl fmt::Display for WorkflowError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "admin {} failed: {}", self.action, self.detail)
    }
}

impl std::error::Error for WorkflowError {}
