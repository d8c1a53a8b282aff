pub mod event;
pub mod event_scheduler;

pub use event::{Event, EventStep};
pub use event_scheduler::{EventScheduler, ScheduledEvent};
