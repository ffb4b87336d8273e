pub mod condition;
pub mod project;
pub mod record;
pub mod stage;

pub use condition::{ConditionResult, ConditionStatus, ConditionType, TransitionCondition};
pub use project::ProjectStatus;
pub use record::{Authorization, TransitionKind, TransitionRecord};
pub use stage::{Stage, StageStatus};
