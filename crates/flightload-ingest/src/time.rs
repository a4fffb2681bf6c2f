//! Wall-clock to instant conversion
//!
//! Flight extracts give a calendar date plus a local `HHMM` clock. The clock
//! is placed in the airport's IANA zone using the offset that zone observes on
//! that date, so January flights in Chicago get `-06:00` and July flights get
//! `-05:00`.
//!
//! `2400` is read as `2359` on the same day rather than midnight of the next.

use chrono::{
    DateTime, FixedOffset, LocalResult, NaiveDate, NaiveDateTime, NaiveTime, Offset, TimeDelta,
    TimeZone,
};
use chrono_tz::Tz;

use crate::error::TimeError;

/// Clock value the extracts use for end of day
const END_OF_DAY: &str = "2400";
const LAST_MINUTE: &str = "2359";

/// Resolve an IANA identifier such as `America/Chicago`
pub fn resolve_timezone(id: &str) -> Result<Tz, TimeError> {
    id.trim()
        .parse::<Tz>()
        .map_err(|_| TimeError::UnknownTimezone(id.to_string()))
}

/// Parse a four-digit 24-hour clock, applying the `2400` rewrite
pub fn parse_clock(clock: &str) -> Result<NaiveTime, TimeError> {
    let clock = clock.trim();
    let clock = if clock == END_OF_DAY { LAST_MINUTE } else { clock };

    if clock.len() != 4 || !clock.bytes().all(|b| b.is_ascii_digit()) {
        return Err(TimeError::InvalidClock(clock.to_string()));
    }

    let hour: u32 = clock[..2]
        .parse()
        .map_err(|_| TimeError::InvalidClock(clock.to_string()))?;
    let minute: u32 = clock[2..]
        .parse()
        .map_err(|_| TimeError::InvalidClock(clock.to_string()))?;

    NaiveTime::from_hms_opt(hour, minute, 0)
        .ok_or_else(|| TimeError::InvalidClock(clock.to_string()))
}

/// Turn `date` + local `clock` in `tz` into an absolute timestamp.
///
/// A blank clock yields `Ok(None)`. In a fall-back overlap the earlier instant
/// is used. In a spring-forward gap the wall clock is kept and the offset in
/// force just before the transition is attached.
pub fn normalize(
    date: NaiveDate,
    clock: &str,
    tz: Tz,
) -> Result<Option<DateTime<FixedOffset>>, TimeError> {
    if clock.trim().is_empty() {
        return Ok(None);
    }

    let local = date.and_time(parse_clock(clock)?);

    match tz.from_local_datetime(&local) {
        LocalResult::Single(instant) => Ok(Some(instant.fixed_offset())),
        LocalResult::Ambiguous(earliest, _) => Ok(Some(earliest.fixed_offset())),
        LocalResult::None => in_gap(local, tz).map(Some),
    }
}

fn in_gap(local: NaiveDateTime, tz: Tz) -> Result<DateTime<FixedOffset>, TimeError> {
    let unresolvable = || TimeError::Unresolvable(format!("{} {}", local, tz.name()));

    let before = local
        .checked_sub_signed(TimeDelta::hours(1))
        .ok_or_else(unresolvable)?;
    let offset = tz
        .from_local_datetime(&before)
        .earliest()
        .ok_or_else(unresolvable)?
        .offset()
        .fix();

    offset.from_local_datetime(&local).single().ok_or_else(unresolvable)
}
