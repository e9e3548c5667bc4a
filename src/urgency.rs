use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

const IMMINENT_WINDOW_HOURS: i64 = 6;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Urgency {
    Overdue,
    Imminent,
    Normal,
}

pub fn classify(due: DateTime<Utc>, now: DateTime<Utc>) -> Urgency {
    let remaining = due - now;
    if remaining < Duration::zero() {
        Urgency::Overdue
    } else if remaining <= Duration::hours(IMMINENT_WINDOW_HOURS) {
        Urgency::Imminent
    } else {
        Urgency::Normal
    }
}

pub fn classify_now(due: DateTime<Utc>) -> Urgency {
    classify(due, Utc::now())
}
