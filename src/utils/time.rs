use chrono::{DateTime, Duration, Local, NaiveDate, NaiveTime, TimeZone, Utc};

/// Calendar day of a moment in the tracker's local time zone.
pub fn local_day(moment: DateTime<Utc>) -> NaiveDate {
    moment.with_timezone(&Local).date_naive()
}

/// Returns start of the next calendar day in the zone of `date`. When midnight is skipped by a
/// DST transition the day starts at the first local time that exists.
pub fn next_day_start<Tz: TimeZone>(date: &DateTime<Tz>) -> Option<DateTime<Tz>> {
    let midnight = date.date_naive().succ_opt()?.and_time(NaiveTime::MIN);
    let zone = date.timezone();
    (0..=24 * 60).find_map(|minutes| {
        zone.from_local_datetime(&(midnight + Duration::minutes(minutes))).earliest()
    })
}

/// Splits `seconds` of activity starting at `start` into local calendar days. Boundaries are
/// rounded down to whole seconds relative to `start`, so the parts always add up to `seconds`.
pub fn split_by_local_day(start: DateTime<Utc>, seconds: u64) -> Vec<(NaiveDate, u64)> {
    split_by_day_in(&Local, start, seconds)
}

/// [split_by_local_day] for an arbitrary zone.
pub fn split_by_day_in<Tz: TimeZone>(
    zone: &Tz,
    start: DateTime<Utc>,
    seconds: u64,
) -> Vec<(NaiveDate, u64)> {
    let end = start + Duration::seconds(seconds as i64);
    let mut parts = Vec::new();
    let mut cursor = start.with_timezone(zone);
    let mut assigned = 0u64;

    while assigned < seconds {
        // Days are at least a few hours long, a boundary that doesn't move forward means the
        // rest of the span stays on the current day.
        let boundary = next_day_start(&cursor)
            .map(|v| v.with_timezone(&Utc))
            .filter(|v| *v > cursor.with_timezone(&Utc));
        let segment_end = boundary.map_or(end, |v| v.min(end));
        let until = ((segment_end - start).num_seconds().max(0) as u64).min(seconds);
        let part = until - assigned;
        if part > 0 {
            parts.push((cursor.date_naive(), part));
        }
        assigned = until;
        match boundary {
            Some(boundary) => cursor = boundary.with_timezone(zone),
            None => break,
        }
    }

    parts
}
