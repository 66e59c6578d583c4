//! Workflow engine: transition table, guard evaluation, journalled state
//! machine, event bus, and crash recovery (spec §4.1, §4.2, §5).

pub mod events;
pub mod guards;
pub mod machine;
pub mod recovery;
pub mod table;

pub use events::{Event, EventBus, Subscription};
pub use guards::{evaluate_guard_set, GuardContext, GuardName, GuardResult, GuardSet};
pub use machine::{RejectReason, StateMachine, TransitionOutcome, TransitionRequest};
pub use recovery::{RecoveryOption, RecoveryPlan, RecoveryService};
pub use table::{TransitionEntry, TransitionTable};
