//! Working-time calendars for time-based predicates.
//!
//! A [`Calendar`] holds per-weekday working windows in its own time zone.
//! The engine reaches calendars through [`CalendarAccess`]; an unknown
//! calendar id degrades to "predicate false" at the call site.

use std::collections::HashMap;

use chrono::{FixedOffset, Offset, Timelike, Utc, Weekday};

use crate::types::{DbId, Timestamp};

/// Start of the default working day, minutes from midnight (09:00).
const STANDARD_DAY_START: u32 = 9 * 60;

/// End of the default working day, minutes from midnight (17:00).
const STANDARD_DAY_END: u32 = 17 * 60;

// ---------------------------------------------------------------------------
// Calendar
// ---------------------------------------------------------------------------

/// A business-hours calendar with a fixed-offset time zone.
#[derive(Debug, Clone)]
pub struct Calendar {
    pub id: DbId,
    pub name: String,
    /// Offset of the calendar's local time, minutes east of UTC.
    pub utc_offset_minutes: i32,
    /// Working windows per weekday as `[start, end)` minutes from midnight.
    hours: HashMap<Weekday, Vec<(u32, u32)>>,
}

impl Calendar {
    /// Create a calendar with no working windows.
    pub fn new(id: DbId, name: impl Into<String>, utc_offset_minutes: i32) -> Self {
        Self {
            id,
            name: name.into(),
            utc_offset_minutes,
            hours: HashMap::new(),
        }
    }

    /// Add a `[start, end)` working window (minutes from midnight).
    pub fn with_window(mut self, day: Weekday, start_minute: u32, end_minute: u32) -> Self {
        self.hours
            .entry(day)
            .or_default()
            .push((start_minute, end_minute));
        self
    }

    /// A Monday-to-Friday 09:00–17:00 calendar.
    pub fn standard_week(id: DbId, name: impl Into<String>, utc_offset_minutes: i32) -> Self {
        let mut calendar = Self::new(id, name, utc_offset_minutes);
        for day in [
            Weekday::Mon,
            Weekday::Tue,
            Weekday::Wed,
            Weekday::Thu,
            Weekday::Fri,
        ] {
            calendar = calendar.with_window(day, STANDARD_DAY_START, STANDARD_DAY_END);
        }
        calendar
    }

    /// Whether `instant` falls inside a working window of this calendar,
    /// in the calendar's own time zone.
    pub fn is_working_time(&self, instant: Timestamp) -> bool {
        // An out-of-range offset falls back to UTC.
        let offset = FixedOffset::east_opt(self.utc_offset_minutes * 60).unwrap_or_else(|| Utc.fix());
        let local = instant.with_timezone(&offset);
        let minute = local.hour() * 60 + local.minute();

        self.hours
            .get(&chrono::Datelike::weekday(&local))
            .is_some_and(|windows| {
                windows
                    .iter()
                    .any(|(start, end)| minute >= *start && minute < *end)
            })
    }
}

// ---------------------------------------------------------------------------
// CalendarAccess
// ---------------------------------------------------------------------------

/// Calendar lookup capability, provided by the host.
pub trait CalendarAccess {
    /// `None` when the calendar id is unknown; working-time predicates treat
    /// that as a non-match.
    fn is_working_time(&self, calendar_id: DbId, instant: Timestamp) -> Option<bool>;
}

/// In-memory calendar collection for tests and small embeddings.
#[derive(Debug, Default)]
pub struct InMemoryCalendars {
    calendars: HashMap<DbId, Calendar>,
}

impl InMemoryCalendars {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, calendar: Calendar) {
        self.calendars.insert(calendar.id, calendar);
    }
}

impl CalendarAccess for InMemoryCalendars {
    fn is_working_time(&self, calendar_id: DbId, instant: Timestamp) -> Option<bool> {
        self.calendars
            .get(&calendar_id)
            .map(|calendar| calendar.is_working_time(instant))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
