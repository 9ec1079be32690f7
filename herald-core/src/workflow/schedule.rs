//! Weekly firing schedules
//!
//! A schedule is written as `<days> <times>`, e.g. `mon-fri 11:00,16:30` or
//! `thu 15:00`. Days are a comma list of names or ranges; times are `HH:MM`.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Datelike, Duration, NaiveTime, TimeZone, Weekday};

use crate::{Error, Result};

/// Days of the week and times of day a job fires at
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WeeklySchedule {
    days: [bool; 7],
    times: Vec<NaiveTime>,
}

fn parse_day(s: &str) -> Result<Weekday> {
    s.trim()
        .parse::<Weekday>()
        .map_err(|_| Error::Config(format!("Invalid weekday in schedule: {}", s)))
}

impl WeeklySchedule {
    /// Check if the schedule fires on this weekday
    pub fn fires_on(&self, day: Weekday) -> bool {
        self.days[day.num_days_from_monday() as usize]
    }

    pub fn times(&self) -> &[NaiveTime] {
        &self.times
    }

    /// First firing strictly after `after`, in the same timezone
    pub fn next_after<Tz: TimeZone>(&self, after: &DateTime<Tz>) -> Option<DateTime<Tz>> {
        let tz = after.timezone();
        let today = after.date_naive();

        for offset in 0..=7 {
            let date = today + Duration::days(offset);
            if !self.fires_on(date.weekday()) {
                continue;
            }
            for time in &self.times {
                let Some(candidate) = tz.from_local_datetime(&date.and_time(*time)).earliest()
                else {
                    // skipped by a DST transition
                    continue;
                };
                if candidate > *after {
                    return Some(candidate);
                }
            }
        }

        None
    }
}

impl FromStr for WeeklySchedule {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let mut parts = s.split_whitespace();
        let (Some(days_part), Some(times_part), None) = (parts.next(), parts.next(), parts.next())
        else {
            return Err(Error::Config(format!(
                "Invalid schedule '{}': expected '<days> <HH:MM,...>'",
                s
            )));
        };

        let mut days = [false; 7];
        for item in days_part.split(',').filter(|d| !d.is_empty()) {
            match item.split_once('-') {
                Some((from, to)) => {
                    let from = parse_day(from)?.num_days_from_monday();
                    let to = parse_day(to)?.num_days_from_monday();
                    let mut day = from;
                    loop {
                        days[day as usize] = true;
                        if day == to {
                            break;
                        }
                        day = (day + 1) % 7;
                    }
                }
                None => days[parse_day(item)?.num_days_from_monday() as usize] = true,
            }
        }

        let mut times = times_part
            .split(',')
            .filter(|t| !t.is_empty())
            .map(|t| {
                NaiveTime::parse_from_str(t.trim(), "%H:%M")
                    .map_err(|_| Error::Config(format!("Invalid time in schedule: {}", t)))
            })
            .collect::<Result<Vec<_>>>()?;
        times.sort();
        times.dedup();

        if !days.iter().any(|d| *d) || times.is_empty() {
            return Err(Error::Config(format!(
                "Schedule '{}' never fires",
                s
            )));
        }

        Ok(Self { days, times })
    }
}

impl fmt::Display for WeeklySchedule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let days: Vec<String> = (0..7u8)
            .filter(|d| self.days[*d as usize])
            .filter_map(|d| Weekday::try_from(d).ok())
            .map(|d| d.to_string().to_lowercase())
            .collect();
        let times: Vec<String> = self.times.iter().map(|t| t.format("%H:%M").to_string()).collect();
        write!(f, "{} {}", days.join(","), times.join(","))
    }
}
