//! Stateful dynamic partial-order reduction for event-driven programs.
//!
//! The explorer is driven by a host engine through the callbacks of
//! [`Explorer`]. Conflicts observed in one execution are kept in a main
//! summary and a reachability graph so that later executions benefit from
//! them immediately.

pub mod backtrack;
pub mod choice;
pub mod conflict;
pub mod error;
pub mod execution;
pub mod explorer;
pub mod filter;
pub mod host;
pub mod ids;
pub mod predecessor;
pub mod report;
pub mod rgraph;
pub mod rwset;
pub mod schedule;
pub mod summary;

pub use backtrack::{BacktrackPoint, BacktrackRegistry};
pub use choice::{ActiveChoice, ChoicePoint};
pub use conflict::ExplorationContext;
pub use error::{ExploreError, ExploreResult};
pub use execution::{Execution, ExecutionId, Executions, Transition, TransitionRef};
pub use explorer::{ExploreConfig, Explorer, Flow};
pub use filter::{AcceptAll, FieldFilter, PatternFilter};
pub use host::Host;
pub use ids::{ChoicePointId, Event, ObjectId, StateId};
pub use predecessor::PredecessorIndex;
pub use report::{ExecutionStart, SearchSummary, Statistics};
pub use rgraph::ReachabilityGraph;
pub use rwset::{Access, AccessKind, ReadWriteSet};
pub use schedule::Schedule;
pub use summary::MainSummary;
