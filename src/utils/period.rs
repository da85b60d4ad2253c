use chrono::{Datelike, NaiveDate, NaiveDateTime};
use serde::Serialize;
use utoipa::ToSchema;

use crate::error::{AppError, AppResult};

const MIN_YEAR: u16 = 2000;
const MAX_YEAR: u16 = 2100;

/// Calendar month used by payroll, schedules and attendance history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
pub struct Period {
    #[schema(example = 5)]
    pub month: u8,
    #[schema(example = 2024)]
    pub year: u16,
}

impl Period {
    pub fn new(month: u32, year: u32) -> AppResult<Self> {
        if !(1..=12).contains(&month) {
            return Err(AppError::validation("month must be between 1 and 12"));
        }
        if !(u32::from(MIN_YEAR)..=u32::from(MAX_YEAR)).contains(&year) {
            return Err(AppError::validation(format!(
                "year must be between {MIN_YEAR} and {MAX_YEAR}"
            )));
        }
        Ok(Self {
            month: month as u8,
            year: year as u16,
        })
    }

    /// Missing parts default to the month containing `today`.
    pub fn or_current(month: Option<u32>, year: Option<u32>, today: NaiveDate) -> AppResult<Self> {
        Self::new(
            month.unwrap_or(today.month()),
            year.unwrap_or(today.year() as u32),
        )
    }

    pub fn first_day(&self) -> NaiveDate {
        // month and year are range-checked in `new`
        NaiveDate::from_ymd_opt(i32::from(self.year), u32::from(self.month), 1)
            .unwrap_or(NaiveDate::MIN)
    }

    pub fn next(&self) -> Self {
        if self.month == 12 {
            Self { month: 1, year: self.year + 1 }
        } else {
            Self { month: self.month + 1, year: self.year }
        }
    }

    /// Half-open `[start, end)` range covering the month.
    pub fn bounds(&self) -> (NaiveDateTime, NaiveDateTime) {
        (
            self.first_day().and_time(chrono::NaiveTime::MIN),
            self.next().first_day().and_time(chrono::NaiveTime::MIN),
        )
    }
}
