//! Recurring billing: deterministic cycle calculation and the notification
//! dispatch pass that reminds owners before each charge.

mod cycle;
mod dispatcher;

pub use cycle::{
    BillingComputation, CycleUnit, compute_next_billing, compute_next_billing_on,
};
pub use dispatcher::{DispatchOutcome, NotificationDispatcher};

pub(crate) use cycle::parse_calendar_date;
