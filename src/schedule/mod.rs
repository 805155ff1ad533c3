//! Recurring-timer abstraction
//!
//! Decouples "when" (`Recurrence`, pure next-fire computation) from "now"
//! (`Clock`, injectable) and from "how" (`RecurringTimer`, a tokio task).

mod clock;
mod recurrence;
mod timer;

pub use clock::{Clock, ManualClock, SystemClock};
pub use recurrence::{Recurrence, ScheduleError};
pub use timer::{RecurringTimer, TimerSet};
