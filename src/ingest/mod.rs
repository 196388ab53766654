mod context;
mod coordinator;
mod locks;
mod scheduler;

pub use context::IngestContext;
pub use coordinator::{RefreshCoordinator, SweepOutcome, SweepReport};
pub use locks::{TopicGuard, TopicLocks};
pub use scheduler::{spawn_scheduler, SchedulerHandle};
