pub mod error;
pub mod fields;
pub mod workflow;

pub use error::WorkflowError;
pub use fields::{FieldUpdate, MetricField, ScalarField};
pub use workflow::{AdminWorkflow, Confirm, StatusKind, StatusMessage, Tab, View};
