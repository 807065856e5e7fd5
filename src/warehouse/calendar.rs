//! Date dimension seed

use chrono::{Datelike, NaiveDate};
use serde::Serialize;
use tracing::info;

use super::error::WarehouseError;
use super::schema::{DIM_DATE, TableNames};
use crate::config::CalendarConfig;
use crate::store::{BatchInsert, SqlStore, count_rows};
use crate::value::SqlValue;

const MONTH_NAMES: [&str; 12] = [
    "January",
    "February",
    "March",
    "April",
    "May",
    "June",
    "July",
    "August",
    "September",
    "October",
    "November",
    "December",
];

/// Indexed by days from Sunday
const DAY_NAMES: [&str; 7] = [
    "Sunday",
    "Monday",
    "Tuesday",
    "Wednesday",
    "Thursday",
    "Friday",
    "Saturday",
];

const SEED_BATCH_ROWS: usize = 500;

/// Surrogate key of a calendar date: `YYYYMMDD` as an integer
pub fn date_key(date: NaiveDate) -> i32 {
    date.year() * 10_000 + date.month() as i32 * 100 + date.day() as i32
}

/// One row of the date dimension
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CalendarDay {
    pub date_key: i32,
    pub date: NaiveDate,
    pub year: i32,
    pub quarter: u32,
    pub month: u32,
    pub day: u32,
    pub iso_week: u32,
    /// 0 = Sunday .. 6 = Saturday
    pub day_of_week: u32,
    pub month_name: &'static str,
    pub day_name: &'static str,
    pub is_weekend: bool,
    /// No holiday calendar is modelled
    pub is_holiday: bool,
}

impl CalendarDay {
    pub fn from_date(date: NaiveDate) -> Self {
        let day_of_week = date.weekday().num_days_from_sunday();
        Self {
            date_key: date_key(date),
            date,
            year: date.year(),
            quarter: (date.month() - 1) / 3 + 1,
            month: date.month(),
            day: date.day(),
            iso_week: date.iso_week().week(),
            day_of_week,
            month_name: MONTH_NAMES[date.month0() as usize],
            day_name: DAY_NAMES[day_of_week as usize],
            is_weekend: day_of_week == 0 || day_of_week == 6,
            is_holiday: false,
        }
    }

    fn to_row(&self) -> Vec<SqlValue> {
        vec![
            SqlValue::Int(self.date_key.into()),
            SqlValue::Date(self.date),
            SqlValue::Int(self.year.into()),
            SqlValue::Int(self.quarter.into()),
            SqlValue::Int(self.month.into()),
            SqlValue::Int(self.day.into()),
            SqlValue::Int(self.iso_week.into()),
            SqlValue::Int(self.day_of_week.into()),
            SqlValue::Text(self.month_name.to_string()),
            SqlValue::Text(self.day_name.to_string()),
            SqlValue::Bool(self.is_weekend),
            SqlValue::Bool(self.is_holiday),
        ]
    }
}

/// Every day in the inclusive range `start..=end`
pub fn calendar_rows(start: NaiveDate, end: NaiveDate) -> Vec<CalendarDay> {
    start
        .iter_days()
        .take_while(|date| *date <= end)
        .map(CalendarDay::from_date)
        .collect()
}

/// Result of a seed attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum SeedOutcome {
    /// Dimension already populated; nothing written
    Skipped { existing: i64 },
    Seeded { rows: u64 },
}

/// Populates the date dimension once
pub struct CalendarSeeder {
    range: CalendarConfig,
    names: TableNames,
}

impl CalendarSeeder {
    pub fn new(range: CalendarConfig, names: TableNames) -> Self {
        Self { range, names }
    }

    pub async fn seed(&self, store: &dyn SqlStore) -> Result<SeedOutcome, WarehouseError> {
        let table = self.names.warehouse(DIM_DATE);
        let existing = count_rows(store, &table)
            .await
            .map_err(WarehouseError::Calendar)?;
        if existing > 0 {
            info!(existing, "Date dimension already populated, skipping seed");
            return Ok(SeedOutcome::Skipped { existing });
        }

        let rows: Vec<Vec<SqlValue>> = calendar_rows(self.range.start, self.range.end)
            .iter()
            .map(CalendarDay::to_row)
            .collect();

        let insert = BatchInsert::new(
            table,
            [
                ("date_key", "INTEGER"),
                ("full_date", "DATE"),
                ("calendar_year", "SMALLINT"),
                ("calendar_quarter", "SMALLINT"),
                ("calendar_month", "SMALLINT"),
                ("day_of_month", "SMALLINT"),
                ("iso_week", "SMALLINT"),
                ("day_of_week", "SMALLINT"),
                ("month_name", "TEXT"),
                ("day_name", "TEXT"),
                ("is_weekend", "BOOLEAN"),
                ("is_holiday", "BOOLEAN"),
            ]
            .into_iter()
            .map(|(name, ty)| (name.to_string(), ty.to_string()))
            .collect(),
            SEED_BATCH_ROWS,
        );
        let inserted = insert
            .execute(store, &rows)
            .await
            .map_err(WarehouseError::Calendar)?;

        info!(
            rows = inserted,
            start = %self.range.start,
            end = %self.range.end,
            "Seeded date dimension"
        );
        Ok(SeedOutcome::Seeded { rows: inserted })
    }
}
