//! Recurring billing date calculation.
//!
//! Pure calendar arithmetic: no storage, no clock ownership. The dispatcher
//! and the offline cache both route through [`compute_next_billing`] so the
//! two sides of the system agree on billing dates byte-for-byte.

use chrono::{DateTime, Months, NaiveDate, NaiveDateTime, NaiveTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

/// Billing recurrence granularity for a subscription.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CycleUnit {
    /// Billed every month.
    #[default]
    Monthly,
    /// Billed every three months.
    Quarterly,
    /// Billed every twelve months.
    Yearly,
}

impl CycleUnit {
    /// Parse from a cycle token. Unrecognized tokens fall back to monthly.
    #[must_use]
    pub fn from_str(s: &str) -> Self {
        match s {
            "quarterly" => Self::Quarterly,
            "yearly" => Self::Yearly,
            _ => Self::Monthly,
        }
    }

    /// Number of calendar months in one billing step.
    #[must_use]
    pub fn months(self) -> u32 {
        match self {
            Self::Monthly => 1,
            Self::Quarterly => 3,
            Self::Yearly => 12,
        }
    }

    /// Convert to the wire token.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Monthly => "monthly",
            Self::Quarterly => "quarterly",
            Self::Yearly => "yearly",
        }
    }
}

impl std::fmt::Display for CycleUnit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Result of a billing date computation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BillingComputation {
    /// Next billing date as an RFC3339 UTC datetime. When the first payment
    /// date could not be parsed, this carries the raw input unchanged.
    pub next_billing_at: String,
    /// Whole days between today and the next billing date. Zero on the due
    /// day itself.
    pub days_until_next_billing: i64,
}

/// Compute the next billing date at or after today.
///
/// Starting from the first payment date, billing steps of the cycle's
/// month count are added until the result is no longer before today. Month
/// addition clamps to the end of shorter months (Jan 31 + 1 month is the last
/// day of February), matching calendar billing rather than fixed day counts.
///
/// The function is total: an unparsable first payment date yields the raw
/// input with a day count of zero rather than an error. Repeated calls on the
/// same day return identical output, and advancing the clock only ever moves
/// the result forward.
#[must_use]
pub fn compute_next_billing(first_payment_date: &str, cycle: CycleUnit) -> BillingComputation {
    compute_next_billing_on(first_payment_date, cycle, Utc::now().date_naive())
}

/// [`compute_next_billing`] with an explicit evaluation date.
#[must_use]
pub fn compute_next_billing_on(
    first_payment_date: &str,
    cycle: CycleUnit,
    today: NaiveDate,
) -> BillingComputation {
    let Some(first) = parse_calendar_date(first_payment_date) else {
        return BillingComputation {
            next_billing_at: first_payment_date.to_string(),
            days_until_next_billing: 0,
        };
    };

    let step = Months::new(cycle.months());
    let mut next = first;
    while next < today {
        match next.checked_add_months(step) {
            Some(advanced) => next = advanced,
            None => break,
        }
    }

    BillingComputation {
        next_billing_at: to_iso_datetime(next),
        days_until_next_billing: (next - today).num_days(),
    }
}

/// Parse a calendar date out of the formats subscriptions carry:
/// `YYYY-MM-DD`, RFC3339 datetimes, or a bare `YYYY-MM-DDTHH:MM:SS`.
pub(crate) fn parse_calendar_date(raw: &str) -> Option<NaiveDate> {
    if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        return Some(date);
    }
    if let Ok(datetime) = DateTime::parse_from_rfc3339(raw) {
        return Some(datetime.date_naive());
    }
    if let Ok(datetime) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S") {
        return Some(datetime.date());
    }
    None
}

fn to_iso_datetime(date: NaiveDate) -> String {
    date.and_time(NaiveTime::MIN)
        .and_utc()
        .to_rfc3339_opts(SecondsFormat::Millis, true)
}
