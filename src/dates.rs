//! Humane date and time parsing.
//!
//! Converts the short strings users type (`+2w`, `tu 11:45`, `12/06 8pm`,
//! `>=tomorrow`) into absolute instants, durations, or comparison-prefixed
//! limits. All functions take `today` explicitly so callers (and tests) pin
//! the reference instant.

use chrono::{Datelike, Duration, NaiveDate, NaiveDateTime, NaiveTime, Timelike, Weekday};

use crate::error::{Error, Result};

/// How to fill the time component when the user only gave a date.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeHint {
    /// Beginning of the day, 00:00:00.
    Begin,
    /// End of the day, 23:59:59.
    End,
}

/// Comparison operator of a date limit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompOp {
    Lt,
    Le,
    Gt,
    Ge,
}

impl CompOp {
    pub fn symbol(self) -> &'static str {
        match self {
            CompOp::Lt => "<",
            CompOp::Le => "<=",
            CompOp::Gt => ">",
            CompOp::Ge => ">=",
        }
    }

    /// Evaluate the comparison with the limit date on the right-hand side.
    pub fn matches(self, value: NaiveDateTime, limit: NaiveDateTime) -> bool {
        match self {
            CompOp::Lt => value < limit,
            CompOp::Le => value <= limit,
            CompOp::Gt => value > limit,
            CompOp::Ge => value >= limit,
        }
    }
}

/// A parsed comparison-prefixed date, e.g. `>=today`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateLimit {
    pub op: CompOp,
    pub date: NaiveDateTime,
}

/// Parse a duration of the form `<number><unit>`, unit one of `w`, `d`,
/// `h`, `m` (case-insensitive), number a non-negative float.
pub fn parse_date_time_delta(input: &str) -> Result<Duration> {
    let trimmed = input.trim();
    if trimmed.len() < 2 {
        return Err(Error::InvalidDelta(input.to_string()));
    }

    let (number_part, unit) = trimmed.split_at(trimmed.len() - 1);
    let amount: f64 = number_part
        .trim()
        .parse()
        .map_err(|_| Error::InvalidDelta(input.to_string()))?;
    if amount < 0.0 || !amount.is_finite() {
        return Err(Error::InvalidDelta(input.to_string()));
    }

    let unit_seconds = match unit.to_ascii_lowercase().as_str() {
        "w" => 7 * 24 * 3600,
        "d" => 24 * 3600,
        "h" => 3600,
        "m" => 60,
        _ => return Err(Error::InvalidDelta(input.to_string())),
    };

    Ok(Duration::seconds((amount * unit_seconds as f64) as i64))
}

/// Parse a humane date/time string relative to `today`.
///
/// Accepted forms, in order of precedence:
/// 1. `now` and `today` literals.
/// 2. `+<delta>` / `-<delta>` offsets.
/// 3. A weekday name (full or two-letter), `today` or `tomorrow`,
///    optionally followed by a time.
/// 4. `<date> <time>` with date `%d/%m[/%y[yy]]` and time `%H[:%M[:%S]]`
///    plus optional `am`/`pm`.
/// 5. A date alone, time defaulting from `hint`.
/// 6. A time alone: today if still ahead, otherwise tomorrow.
pub fn parse_humane_date_time(
    input: &str,
    hint: Option<TimeHint>,
    today: NaiveDateTime,
) -> Result<NaiveDateTime> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(Error::InvalidDate(input.to_string()));
    }
    let lowered = trimmed.to_ascii_lowercase();

    if lowered == "now" {
        return Ok(today);
    }
    if lowered == "today" {
        return Ok(apply_hint(today.date(), hint, today.time()));
    }

    if let Some(rest) = lowered.strip_prefix('+') {
        return Ok(today + parse_date_time_delta(rest)?);
    }
    if let Some(rest) = lowered.strip_prefix('-') {
        return Ok(today - parse_date_time_delta(rest)?);
    }

    let mut parts = lowered.splitn(2, char::is_whitespace);
    let first = parts.next().unwrap_or("");
    let rest = parts.next().map(str::trim).filter(|s| !s.is_empty());

    // Weekday token, `today` or `tomorrow`, with an optional time.
    if let Some(date) = parse_day_token(first, today.date()) {
        let time = match rest {
            Some(token) => Some(parse_time(token).ok_or_else(|| Error::InvalidDate(input.to_string()))?),
            None => None,
        };
        return Ok(match time {
            Some(time) => date.and_time(time),
            None => apply_hint(date, hint, today.time()),
        });
    }

    // Date, optionally followed by a time.
    if let Some(date) = parse_date(first, today.date()) {
        return Ok(match rest {
            Some(token) => {
                let time = parse_time(token).ok_or_else(|| Error::InvalidDate(input.to_string()))?;
                date.and_time(time)
            }
            None => apply_hint(date, hint, today.time()),
        });
    }

    // Time alone: today if the instant is still ahead, otherwise tomorrow.
    if rest.is_none() {
        if let Some(time) = parse_time(first) {
            let candidate = today.date().and_time(time);
            return Ok(if candidate > today {
                candidate
            } else {
                candidate + Duration::days(1)
            });
        }
    }

    Err(Error::InvalidDate(input.to_string()))
}

/// Parse a date limit such as `<=today` or `>12/06`.
///
/// The prefix is one of `<=`, `>=`, `<`, `>` (longest match first),
/// defaulting to `<=`. `<` and `>=` snap to the beginning of the day,
/// `<=` and `>` to its end.
pub fn parse_date_limit(input: &str, today: NaiveDateTime) -> Result<DateLimit> {
    let trimmed = input.trim();
    let (op, rest) = if let Some(rest) = trimmed.strip_prefix("<=") {
        (CompOp::Le, rest)
    } else if let Some(rest) = trimmed.strip_prefix(">=") {
        (CompOp::Ge, rest)
    } else if let Some(rest) = trimmed.strip_prefix('<') {
        (CompOp::Lt, rest)
    } else if let Some(rest) = trimmed.strip_prefix('>') {
        (CompOp::Gt, rest)
    } else {
        (CompOp::Le, trimmed)
    };

    let hint = match op {
        CompOp::Lt | CompOp::Ge => TimeHint::Begin,
        CompOp::Le | CompOp::Gt => TimeHint::End,
    };

    let date = parse_humane_date_time(rest, Some(hint), today)?;
    Ok(DateLimit { op, date })
}

/// Format a duration compactly, using the largest unit whose main component
/// stays at least 1, with at most one subordinate term.
pub fn format_time_delta(delta: Duration) -> String {
    let negative = delta < Duration::zero();
    let delta = if negative { -delta } else { delta };

    let days = delta.num_days();
    let body = if days >= 365 {
        let years = days / 365;
        let months = (days % 365) / 30;
        if months > 0 {
            format!("{}Y, {}M", years, months)
        } else {
            format!("{}Y", years)
        }
    } else if days >= 30 {
        let months = days / 30;
        let rest = days % 30;
        if rest > 0 {
            format!("{}M, {}d", months, rest)
        } else {
            format!("{}M", months)
        }
    } else if days >= 7 {
        let weeks = days / 7;
        let rest = days % 7;
        if rest > 0 {
            format!("{}w, {}d", weeks, rest)
        } else {
            format!("{}w", weeks)
        }
    } else if days >= 1 {
        format!("{}d", days)
    } else if delta.num_hours() >= 1 {
        let hours = delta.num_hours();
        let minutes = delta.num_minutes() % 60;
        if minutes > 0 {
            format!("{}h {}m", hours, minutes)
        } else {
            format!("{}h", hours)
        }
    } else {
        format!("{}m", delta.num_minutes())
    };

    if negative {
        format!("-{}", body)
    } else {
        body
    }
}

fn apply_hint(date: NaiveDate, hint: Option<TimeHint>, current_time: NaiveTime) -> NaiveDateTime {
    let time = match hint {
        Some(TimeHint::Begin) => NaiveTime::from_hms_opt(0, 0, 0).unwrap_or(current_time),
        Some(TimeHint::End) => NaiveTime::from_hms_opt(23, 59, 59).unwrap_or(current_time),
        None => current_time,
    };
    date.and_time(time)
}

/// Parse a weekday name, full or two-letter prefix. Monday is 0.
pub(crate) fn parse_weekday(token: &str) -> Option<Weekday> {
    const NAMES: [(&str, Weekday); 7] = [
        ("monday", Weekday::Mon),
        ("tuesday", Weekday::Tue),
        ("wednesday", Weekday::Wed),
        ("thursday", Weekday::Thu),
        ("friday", Weekday::Fri),
        ("saturday", Weekday::Sat),
        ("sunday", Weekday::Sun),
    ];

    let lowered = token.to_ascii_lowercase();
    for (name, weekday) in NAMES {
        if lowered == name || (lowered.len() == 2 && name.starts_with(&lowered)) {
            return Some(weekday);
        }
    }
    None
}

fn parse_day_token(token: &str, today: NaiveDate) -> Option<NaiveDate> {
    match token {
        "today" => Some(today),
        "tomorrow" => Some(today + Duration::days(1)),
        _ => {
            let target = parse_weekday(token)?;
            let ahead =
                (7 + target.num_days_from_monday() - today.weekday().num_days_from_monday()) % 7;
            Some(today + Duration::days(i64::from(ahead)))
        }
    }
}

fn parse_date(token: &str, today: NaiveDate) -> Option<NaiveDate> {
    let parts: Vec<&str> = token.split('/').collect();
    match parts.as_slice() {
        // %d/%m with the year defaulting to the current one.
        [day, month] => {
            let day: u32 = day.parse().ok()?;
            let month: u32 = month.parse().ok()?;
            NaiveDate::from_ymd_opt(today.year(), month, day)
        }
        [_, _, year] => {
            // chrono's %Y also accepts short years, so the format must be
            // picked by the width of the year segment.
            let format = if year.len() == 2 { "%d/%m/%y" } else { "%d/%m/%Y" };
            NaiveDate::parse_from_str(token, format).ok()
        }
        _ => None,
    }
}

fn parse_time(token: &str) -> Option<NaiveTime> {
    let lowered = token.trim().to_ascii_lowercase();
    let (body, meridiem) = if let Some(body) = lowered.strip_suffix("am") {
        (body.trim_end(), Some(false))
    } else if let Some(body) = lowered.strip_suffix("pm") {
        (body.trim_end(), Some(true))
    } else {
        (lowered.as_str(), None)
    };

    let time = if let Ok(time) = NaiveTime::parse_from_str(body, "%H:%M:%S") {
        time
    } else if let Ok(time) = NaiveTime::parse_from_str(body, "%H:%M") {
        time
    } else {
        // Bare hour.
        let hour: u32 = body.parse().ok()?;
        NaiveTime::from_hms_opt(hour, 0, 0)?
    };

    match meridiem {
        None => Some(time),
        Some(pm) => {
            let hour = time.hour();
            if hour == 0 || hour > 12 {
                return None;
            }
            let adjusted = match (pm, hour) {
                (false, 12) => 0,
                (false, h) => h,
                (true, 12) => 12,
                (true, h) => h + 12,
            };
            NaiveTime::from_hms_opt(adjusted, time.minute(), time.second())
        }
    }
}
