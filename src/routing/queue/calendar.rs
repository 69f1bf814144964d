/*
Copyright 2026 Flowroute Developers

This file is part of Flowroute.

Flowroute is a free software: you can redistribute it and/or modify
it under the terms of the GNU General Public License as published by
the Free Software Foundation; either version 3 of the License, or
(at your option) any later version.

Flowroute is distributed in the hope that it will be useful,
but WITHOUT ANY WARRANTY; without even the implied warranty of
MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
GNU General Public License for more details.

You should have received a copy of the GNU General Public License
along with Flowroute. If not, see https://www.gnu.org/licenses/.
*/

//! Dates in CF calendars, as much as needed to find the
//! simulation period of RVIC runs from a time axis.

use crate::constants::TIME_NAME;
use crate::errors::{DatasetError, QueueError};
use crate::routing::dataset::Dataset;
use chrono::{Datelike, Duration, NaiveDate};
use regex::Regex;
use std::fmt;

const NOLEAP_MONTH_DAYS: [u32; 12] = [31, 28, 31, 30, 31, 30, 31, 31, 30, 31, 30, 31];

#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub enum Calendar {
    /// Mixed Gregorian/Julian calendar, treated as proleptic Gregorian.
    Standard,
    NoLeap,
    Day360,
}

impl Calendar {
    pub fn from_name(name: &str) -> Result<Self, QueueError> {
        match name {
            "standard" | "gregorian" | "proleptic_gregorian" => Ok(Calendar::Standard),
            "noleap" | "365_day" => Ok(Calendar::NoLeap),
            "360_day" => Ok(Calendar::Day360),
            _ => Err(QueueError::UnsupportedCalendar(name.to_string())),
        }
    }

    fn name(&self) -> &'static str {
        match self {
            Calendar::Standard => "standard",
            Calendar::NoLeap => "noleap",
            Calendar::Day360 => "360_day",
        }
    }
}

#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug)]
pub struct CalendarDate {
    pub year: i32,
    pub month: u32,
    pub day: u32,
}

impl CalendarDate {
    pub fn new(year: i32, month: u32, day: u32, calendar: Calendar) -> Result<Self, QueueError> {
        let date = CalendarDate { year, month, day };

        let valid = match calendar {
            Calendar::Standard => NaiveDate::from_ymd_opt(year, month, day).is_some(),
            Calendar::NoLeap => (1..=12).contains(&month)
                && (1..=NOLEAP_MONTH_DAYS[month as usize - 1]).contains(&day),
            Calendar::Day360 => (1..=12).contains(&month) && (1..=30).contains(&day),
        };

        if !valid {
            return Err(QueueError::InvalidDate(date.to_string(), calendar.name()));
        }

        Ok(date)
    }

    /// Date `days` days later (or earlier) in given calendar.
    pub fn add_days(&self, days: i64, calendar: Calendar) -> Result<Self, QueueError> {
        let invalid = || QueueError::InvalidDate(self.to_string(), calendar.name());

        match calendar {
            Calendar::Standard => {
                let date = NaiveDate::from_ymd_opt(self.year, self.month, self.day)
                    .ok_or_else(invalid)?
                    .checked_add_signed(Duration::days(days))
                    .ok_or_else(invalid)?;

                Ok(CalendarDate {
                    year: date.year(),
                    month: date.month(),
                    day: date.day(),
                })
            }
            Calendar::NoLeap => {
                let day_of_year: u32 = NOLEAP_MONTH_DAYS[..self.month as usize - 1]
                    .iter()
                    .sum::<u32>()
                    + self.day
                    - 1;
                let total = i64::from(self.year) * 365 + i64::from(day_of_year) + days;

                let mut day_of_year = total.rem_euclid(365) as u32;
                let mut month = 1;

                for month_days in NOLEAP_MONTH_DAYS {
                    if day_of_year < month_days {
                        break;
                    }
                    day_of_year -= month_days;
                    month += 1;
                }

                Ok(CalendarDate {
                    year: total.div_euclid(365) as i32,
                    month,
                    day: day_of_year + 1,
                })
            }
            Calendar::Day360 => {
                let total = i64::from(self.year) * 360
                    + i64::from(self.month - 1) * 30
                    + i64::from(self.day - 1)
                    + days;
                let day_of_year = total.rem_euclid(360) as u32;

                Ok(CalendarDate {
                    year: total.div_euclid(360) as i32,
                    month: day_of_year / 30 + 1,
                    day: day_of_year % 30 + 1,
                })
            }
        }
    }
}

impl fmt::Display for CalendarDate {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{:04}-{:02}-{:02}", self.year, self.month, self.day)
    }
}

/// First and last day of the simulated period.
#[derive(Clone, PartialEq, Debug)]
pub struct SimulationPeriod {
    /// Calendar name as found in the dataset.
    pub calendar_name: String,
    pub calendar: Calendar,
    pub start: CalendarDate,
    pub end: CalendarDate,
}

impl SimulationPeriod {
    /// Reads the period from `time` variable with units
    /// `days since YYYY-MM-DD[ hh:mm:ss]`. Time values are truncated
    /// to full days. Missing calendar defaults to `standard`, as in CF.
    pub fn from_dataset(dataset: &Dataset) -> Result<Self, QueueError> {
        let units = dataset
            .variable_attribute_string(TIME_NAME, "units")?
            .ok_or_else(|| DatasetError::MissingAttribute("time:units".to_string()))?;
        let calendar_name = dataset
            .variable_attribute_string(TIME_NAME, "calendar")?
            .unwrap_or_else(|| "standard".to_string());
        let calendar = Calendar::from_name(&calendar_name)?;

        let reference = parse_time_units(&units, calendar)?;

        let values: Vec<f64> = dataset.read_values(TIME_NAME)?.into_iter().flatten().collect();
        let (first, last) = match (values.first(), values.last()) {
            (Some(first), Some(last)) => (*first, *last),
            _ => return Err(QueueError::EmptyTime),
        };

        Ok(SimulationPeriod {
            start: reference.add_days(first.trunc() as i64, calendar)?,
            end: reference.add_days(last.trunc() as i64, calendar)?,
            calendar_name,
            calendar,
        })
    }
}

fn parse_time_units(units: &str, calendar: Calendar) -> Result<CalendarDate, QueueError> {
    let units_format = Regex::new(r"^\s*days since (\d{1,4})-(\d{1,2})-(\d{1,2})")
        .map_err(|_| QueueError::TimeUnits(units.to_string()))?;

    let captures = units_format
        .captures(units)
        .ok_or_else(|| QueueError::TimeUnits(units.to_string()))?;

    let field = |i: usize| {
        captures[i]
            .parse::<u32>()
            .map_err(|_| QueueError::TimeUnits(units.to_string()))
    };

    CalendarDate::new(field(1)? as i32, field(2)?, field(3)?, calendar)
}

#[cfg(test)]
mod tests {
    use super::{parse_time_units, Calendar, CalendarDate, SimulationPeriod};
    use crate::errors::QueueError;
    use crate::routing::dataset::{tests::write_time, Dataset};

    fn date(year: i32, month: u32, day: u32) -> CalendarDate {
        CalendarDate { year, month, day }
    }

    #[test]
    fn standard_calendar_has_leap_days() {
        let start = date(1950, 1, 1);

        assert_eq!(
            start.add_days(365 * 50 + 11, Calendar::Standard).unwrap(),
            date(1999, 12, 31)
        );
        assert_eq!(date(2000, 2, 28).add_days(1, Calendar::Standard).unwrap(), date(2000, 2, 29));
        assert_eq!(start.add_days(-1, Calendar::Standard).unwrap(), date(1949, 12, 31));
    }

    #[test]
    fn noleap_calendar_skips_leap_days() {
        assert_eq!(date(2000, 2, 28).add_days(1, Calendar::NoLeap).unwrap(), date(2000, 3, 1));
        assert_eq!(
            date(1950, 1, 1).add_days(365 * 3 + 40, Calendar::NoLeap).unwrap(),
            date(1953, 2, 10)
        );
        assert_eq!(date(1950, 12, 31).add_days(1, Calendar::NoLeap).unwrap(), date(1951, 1, 1));
    }

    #[test]
    fn day360_calendar_has_equal_months() {
        assert_eq!(date(2000, 2, 29).add_days(1, Calendar::Day360).unwrap(), date(2000, 2, 30));
        assert_eq!(date(2000, 12, 30).add_days(1, Calendar::Day360).unwrap(), date(2001, 1, 1));
        assert!(CalendarDate::new(2000, 2, 30, Calendar::Day360).is_ok());
        assert!(CalendarDate::new(2000, 2, 30, Calendar::Standard).is_err());
        assert_eq!(date(2000, 1, 1).to_string(), "2000-01-01");
    }

    #[test]
    fn time_units_parsed() {
        assert_eq!(
            parse_time_units("days since 1950-1-1 00:00:00", Calendar::Standard).unwrap(),
            date(1950, 1, 1)
        );
        assert!(matches!(
            parse_time_units("hours since 1950-01-01", Calendar::Standard),
            Err(QueueError::TimeUnits(_))
        ));
        assert!(matches!(
            Calendar::from_name("julian"),
            Err(QueueError::UnsupportedCalendar(_))
        ));
    }

    #[test]
    fn period_from_time_axis() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("baseflow.nc");
        {
            let mut file = netcdf::create(&path).unwrap();
            write_time(&mut file, &[0.5, 1.5, 730.5], "days since 1950-01-01", Some("365_day"));
        }

        let period = SimulationPeriod::from_dataset(&Dataset::open(&path).unwrap()).unwrap();

        assert_eq!(period.calendar, Calendar::NoLeap);
        assert_eq!(period.calendar_name, "365_day");
        assert_eq!(period.start, date(1950, 1, 1));
        assert_eq!(period.end, date(1952, 1, 1));
    }

    #[test]
    fn time_without_units_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("baseflow.nc");
        {
            let mut file = netcdf::create(&path).unwrap();
            file.add_dimension("time", 1).unwrap();
            let mut time = file.add_variable::<f64>("time", &["time"]).unwrap();
            time.put_values(&[0.0], ..).unwrap();
        }

        assert!(matches!(
            SimulationPeriod::from_dataset(&Dataset::open(&path).unwrap()),
            Err(QueueError::Dataset(_))
        ));
    }
}
