//! Recurrence rules and next-occurrence computation.
//!
//! A [`RecurrenceRule`] is a value object embedded in a task. The empty rule
//! means "no recurrence". Rules serialize to the dict form used by the dump
//! wire format; equality is structural, so two rules compare equal whether
//! they came from the humane grammar or from a dump file.

use chrono::{Datelike, Duration, NaiveDate, NaiveDateTime};
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{json, Map, Value};

use crate::dates::parse_weekday;
use crate::error::{Error, Result};

/// Search horizon for `get_next`, in days. Covers yearly rules across leap
/// years with ample slack.
const SEARCH_HORIZON_DAYS: i64 = 1100;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Frequency {
    Daily,
    Weekly,
    Monthly,
    Yearly,
}

impl Frequency {
    fn as_str(self) -> &'static str {
        match self {
            Frequency::Daily => "daily",
            Frequency::Weekly => "weekly",
            Frequency::Monthly => "monthly",
            Frequency::Yearly => "yearly",
        }
    }

    fn from_str(value: &str) -> Option<Self> {
        match value {
            "daily" => Some(Frequency::Daily),
            "weekly" => Some(Frequency::Weekly),
            "monthly" => Some(Frequency::Monthly),
            "yearly" => Some(Frequency::Yearly),
            _ => None,
        }
    }
}

/// Weekday constraint: either a plain set of weekdays (0 = Monday), or the
/// nth (1..4) or last (-1) given weekday of the month.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ByWeekday {
    Days(Vec<u8>),
    Positional { pos: i8, weekday: u8 },
}

/// A recurrence rule. `RecurrenceRule::none()` represents "no recurrence".
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RecurrenceRule {
    freq: Option<Frequency>,
    bymonth: Vec<u8>,
    bymonthday: Vec<u8>,
    byweekday: Option<ByWeekday>,
    byhour: Vec<u8>,
    byminute: Vec<u8>,
}

impl RecurrenceRule {
    /// The empty rule.
    pub fn none() -> Self {
        Self::default()
    }

    pub fn is_none(&self) -> bool {
        self.freq.is_none()
    }

    /// Parse the humane grammar:
    ///
    /// ```text
    /// none
    /// daily HH:MM
    /// weekly <day> HH:MM
    /// monthly (<d> | <pos> <day>) HH:MM
    /// quarterly (<d> | <pos> <day>) HH:MM
    /// yearly <d>/<m> HH:MM
    /// ```
    ///
    /// `<day>` is a full or two-letter weekday; `<pos>` is `first`,
    /// `second`, `third`, `fourth` or `last`. Quarterly is yearly over
    /// months 1, 4, 7 and 10.
    pub fn from_humane_string(input: &str) -> Result<Self> {
        let tokens: Vec<&str> = input.split_whitespace().collect();
        let invalid = || Error::InvalidRecurrence(input.to_string());

        let Some((&freq_word, args)) = tokens.split_first() else {
            return Err(invalid());
        };

        match freq_word.to_ascii_lowercase().as_str() {
            "none" => {
                if args.is_empty() {
                    Ok(Self::none())
                } else {
                    Err(invalid())
                }
            }
            "daily" => {
                let [time] = args else { return Err(invalid()) };
                let (hour, minute) = parse_rule_time(time).ok_or_else(invalid)?;
                Ok(Self {
                    freq: Some(Frequency::Daily),
                    byhour: vec![hour],
                    byminute: vec![minute],
                    ..Self::default()
                })
            }
            "weekly" => {
                let [day, time] = args else { return Err(invalid()) };
                let weekday = parse_weekday(day).ok_or_else(invalid)?;
                let (hour, minute) = parse_rule_time(time).ok_or_else(invalid)?;
                Ok(Self {
                    freq: Some(Frequency::Weekly),
                    byweekday: Some(ByWeekday::Days(vec![
                        weekday.num_days_from_monday() as u8
                    ])),
                    byhour: vec![hour],
                    byminute: vec![minute],
                    ..Self::default()
                })
            }
            word @ ("monthly" | "quarterly") => {
                let (freq, bymonth) = if word == "quarterly" {
                    (Frequency::Yearly, vec![1, 4, 7, 10])
                } else {
                    (Frequency::Monthly, Vec::new())
                };
                let (day_spec, time) = match args {
                    [day_spec, time] => (MonthDaySpec::Day(*day_spec), *time),
                    [pos, day, time] => (MonthDaySpec::Positional(*pos, *day), *time),
                    _ => return Err(invalid()),
                };
                let (hour, minute) = parse_rule_time(time).ok_or_else(invalid)?;
                let mut rule = Self {
                    freq: Some(freq),
                    bymonth,
                    byhour: vec![hour],
                    byminute: vec![minute],
                    ..Self::default()
                };
                match day_spec {
                    MonthDaySpec::Day(token) => {
                        let day: u8 = token.parse().map_err(|_| invalid())?;
                        if !(1..=31).contains(&day) {
                            return Err(invalid());
                        }
                        rule.bymonthday = vec![day];
                    }
                    MonthDaySpec::Positional(pos_token, day_token) => {
                        let pos = parse_position(pos_token).ok_or_else(invalid)?;
                        let weekday = parse_weekday(day_token).ok_or_else(invalid)?;
                        rule.byweekday = Some(ByWeekday::Positional {
                            pos,
                            weekday: weekday.num_days_from_monday() as u8,
                        });
                    }
                }
                Ok(rule)
            }
            "yearly" => {
                let [date, time] = args else { return Err(invalid()) };
                let (day, month) = parse_day_month(date).ok_or_else(invalid)?;
                let (hour, minute) = parse_rule_time(time).ok_or_else(invalid)?;
                Ok(Self {
                    freq: Some(Frequency::Yearly),
                    bymonth: vec![month],
                    bymonthday: vec![day],
                    byhour: vec![hour],
                    byminute: vec![minute],
                    ..Self::default()
                })
            }
            _ => Err(invalid()),
        }
    }

    /// Serialize to the dict wire form. The empty rule serializes to `{}`.
    pub fn to_dict(&self) -> Value {
        let Some(freq) = self.freq else {
            return Value::Object(Map::new());
        };

        let mut map = Map::new();
        map.insert("freq".to_string(), json!(freq.as_str()));
        map.insert("bymonth".to_string(), json!(self.bymonth));
        map.insert("bymonthday".to_string(), json!(self.bymonthday));
        let byweekday = match &self.byweekday {
            None => Value::Null,
            Some(ByWeekday::Days(days)) => json!(days),
            Some(ByWeekday::Positional { pos, weekday }) => {
                json!({ "pos": pos, "weekday": weekday })
            }
        };
        map.insert("byweekday".to_string(), byweekday);
        map.insert("byhour".to_string(), json!(self.byhour));
        map.insert("byminute".to_string(), json!(self.byminute));
        Value::Object(map)
    }

    /// Deserialize the dict wire form. Only the dict form is accepted; the
    /// schema migration is expected to have converted any legacy encoding.
    pub fn from_dict(value: &Value) -> Result<Self> {
        let invalid = |msg: &str| Error::InvalidRecurrence(msg.to_string());

        let map = value
            .as_object()
            .ok_or_else(|| invalid("expected an object"))?;
        if map.is_empty() {
            return Ok(Self::none());
        }

        let freq_word = map
            .get("freq")
            .and_then(Value::as_str)
            .ok_or_else(|| invalid("missing freq"))?;
        let freq =
            Frequency::from_str(freq_word).ok_or_else(|| invalid("unknown freq"))?;

        let byweekday = match map.get("byweekday") {
            None | Some(Value::Null) => None,
            Some(Value::Array(_)) => Some(ByWeekday::Days(int_list(
                map.get("byweekday"),
                0,
                6,
            )?)),
            Some(Value::Object(obj)) => {
                let pos = obj
                    .get("pos")
                    .and_then(Value::as_i64)
                    .ok_or_else(|| invalid("missing byweekday.pos"))?;
                if !((1..=4).contains(&pos) || pos == -1) {
                    return Err(invalid("byweekday.pos out of range"));
                }
                let weekday = obj
                    .get("weekday")
                    .and_then(Value::as_u64)
                    .filter(|value| *value <= 6)
                    .ok_or_else(|| invalid("byweekday.weekday out of range"))?;
                Some(ByWeekday::Positional {
                    pos: pos as i8,
                    weekday: weekday as u8,
                })
            }
            Some(_) => return Err(invalid("byweekday must be a list or an object")),
        };

        Ok(Self {
            freq: Some(freq),
            bymonth: int_list(map.get("bymonth"), 1, 12)?,
            bymonthday: int_list(map.get("bymonthday"), 1, 31)?,
            byweekday,
            byhour: int_list(map.get("byhour"), 0, 23)?,
            byminute: int_list(map.get("byminute"), 0, 59)?,
        })
    }

    /// Earliest instant strictly after `ref_date` satisfying the rule, or
    /// `None` for the empty rule. Seconds are always 0.
    pub fn get_next(&self, ref_date: NaiveDateTime) -> Option<NaiveDateTime> {
        let freq = self.freq?;

        let hours: Vec<u32> = if self.byhour.is_empty() {
            vec![0]
        } else {
            sorted_u32(&self.byhour)
        };
        let minutes: Vec<u32> = if self.byminute.is_empty() {
            vec![0]
        } else {
            sorted_u32(&self.byminute)
        };

        for offset in 0..=SEARCH_HORIZON_DAYS {
            let date = ref_date.date() + Duration::days(offset);
            if !self.day_matches(freq, date) {
                continue;
            }
            for &hour in &hours {
                for &minute in &minutes {
                    let Some(candidate) = date.and_hms_opt(hour, minute, 0) else {
                        continue;
                    };
                    if candidate > ref_date {
                        return Some(candidate);
                    }
                }
            }
        }

        None
    }

    fn day_matches(&self, freq: Frequency, date: NaiveDate) -> bool {
        match freq {
            Frequency::Daily => true,
            Frequency::Weekly => match &self.byweekday {
                Some(ByWeekday::Days(days)) => {
                    days.contains(&(date.weekday().num_days_from_monday() as u8))
                }
                _ => true,
            },
            Frequency::Monthly => self.month_day_matches(date),
            Frequency::Yearly => {
                let month_ok =
                    self.bymonth.is_empty() || self.bymonth.contains(&(date.month() as u8));
                month_ok && self.month_day_matches(date)
            }
        }
    }

    fn month_day_matches(&self, date: NaiveDate) -> bool {
        if let Some(ByWeekday::Positional { pos, weekday }) = &self.byweekday {
            return is_positional_weekday(date, *pos, *weekday);
        }
        if !self.bymonthday.is_empty() {
            return self.bymonthday.contains(&(date.day() as u8));
        }
        if let Some(ByWeekday::Days(days)) = &self.byweekday {
            return days.contains(&(date.weekday().num_days_from_monday() as u8));
        }
        true
    }
}

impl Serialize for RecurrenceRule {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        self.to_dict().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for RecurrenceRule {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        RecurrenceRule::from_dict(&value).map_err(D::Error::custom)
    }
}

enum MonthDaySpec<'a> {
    Day(&'a str),
    Positional(&'a str, &'a str),
}

fn parse_position(token: &str) -> Option<i8> {
    match token.to_ascii_lowercase().as_str() {
        "first" => Some(1),
        "second" => Some(2),
        "third" => Some(3),
        "fourth" => Some(4),
        "last" => Some(-1),
        _ => None,
    }
}

fn parse_rule_time(token: &str) -> Option<(u8, u8)> {
    let (hour, minute) = token.split_once(':')?;
    let hour: u8 = hour.parse().ok()?;
    let minute: u8 = minute.parse().ok()?;
    if hour > 23 || minute > 59 {
        return None;
    }
    Some((hour, minute))
}

fn parse_day_month(token: &str) -> Option<(u8, u8)> {
    let (day, month) = token.split_once('/')?;
    let day: u8 = day.parse().ok()?;
    let month: u8 = month.parse().ok()?;
    if !(1..=31).contains(&day) || !(1..=12).contains(&month) {
        return None;
    }
    Some((day, month))
}

fn int_list(value: Option<&Value>, min: u64, max: u64) -> Result<Vec<u8>> {
    let Some(value) = value else {
        return Ok(Vec::new());
    };
    if value.is_null() {
        return Ok(Vec::new());
    }
    let list = value.as_array().ok_or_else(|| {
        Error::InvalidRecurrence("expected a list of integers".to_string())
    })?;
    let mut out = Vec::with_capacity(list.len());
    for item in list {
        let n = item
            .as_u64()
            .filter(|n| (min..=max).contains(n))
            .ok_or_else(|| {
                Error::InvalidRecurrence(format!("value out of range [{min}..{max}]"))
            })?;
        out.push(n as u8);
    }
    Ok(out)
}

fn sorted_u32(values: &[u8]) -> Vec<u32> {
    let mut out: Vec<u32> = values.iter().map(|&v| u32::from(v)).collect();
    out.sort_unstable();
    out.dedup();
    out
}

fn is_positional_weekday(date: NaiveDate, pos: i8, weekday: u8) -> bool {
    if date.weekday().num_days_from_monday() as u8 != weekday {
        return false;
    }
    if pos == -1 {
        // Last such weekday: no same weekday later in the month.
        date.day() + 7 > days_in_month(date)
    } else {
        ((date.day() - 1) / 7 + 1) as i8 == pos
    }
}

fn days_in_month(date: NaiveDate) -> u32 {
    let (next_year, next_month) = if date.month() == 12 {
        (date.year() + 1, 1)
    } else {
        (date.year(), date.month() + 1)
    };
    let first_of_next = NaiveDate::from_ymd_opt(next_year, next_month, 1);
    let first = NaiveDate::from_ymd_opt(date.year(), date.month(), 1);
    match (first, first_of_next) {
        (Some(first), Some(next)) => (next - first).num_days() as u32,
        _ => 31,
    }
}

impl std::fmt::Display for Weekday2 {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", WEEKDAY_NAMES[self.0 as usize])
    }
}

/// Weekday index wrapper used only for display.
struct Weekday2(u8);

const WEEKDAY_NAMES: [&str; 7] = [
    "monday",
    "tuesday",
    "wednesday",
    "thursday",
    "friday",
    "saturday",
    "sunday",
];

impl std::fmt::Display for RecurrenceRule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let Some(freq) = self.freq else {
            return write!(f, "none");
        };
        let time = format!(
            "{:02}:{:02}",
            self.byhour.first().copied().unwrap_or(0),
            self.byminute.first().copied().unwrap_or(0)
        );
        match freq {
            Frequency::Daily => write!(f, "daily {time}"),
            Frequency::Weekly => match &self.byweekday {
                Some(ByWeekday::Days(days)) if !days.is_empty() => {
                    write!(f, "weekly {} {time}", Weekday2(days[0].min(6)))
                }
                _ => write!(f, "weekly {time}"),
            },
            Frequency::Monthly | Frequency::Yearly => {
                let word = if freq == Frequency::Monthly {
                    "monthly"
                } else if self.bymonth == vec![1, 4, 7, 10] {
                    "quarterly"
                } else {
                    "yearly"
                };
                match &self.byweekday {
                    Some(ByWeekday::Positional { pos, weekday }) => {
                        let pos_word = match pos {
                            1 => "first",
                            2 => "second",
                            3 => "third",
                            4 => "fourth",
                            _ => "last",
                        };
                        write!(f, "{word} {pos_word} {} {time}", Weekday2((*weekday).min(6)))
                    }
                    _ => {
                        let day = self.bymonthday.first().copied().unwrap_or(1);
                        if word == "yearly" {
                            let month = self.bymonth.first().copied().unwrap_or(1);
                            write!(f, "yearly {day}/{month} {time}")
                        } else {
                            write!(f, "{word} {day} {time}")
                        }
                    }
                }
            }
        }
    }
}
