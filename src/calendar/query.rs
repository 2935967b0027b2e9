//! Vacation queries over a loaded calendar.
//!
//! The engine is immutable after construction and is shared between all
//! sessions behind an `Arc`; queries never take a lock.

use serde::Serialize;

use crate::calendar::error::QueryError;
use crate::calendar::region::Region;
use crate::calendar::table::{CalendarTable, DayRecord};

/// A maximal run of consecutive vacation days for one region.
///
/// Both bounds are inclusive date literals in `DD/MM/YYYY` form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VacationPeriod {
    /// First vacation day of the run.
    pub start: String,
    /// Last vacation day of the run.
    pub end: String,
}

/// Answers vacation queries against a [`CalendarTable`].
#[derive(Debug, Clone)]
pub struct VacationQueryEngine {
    table: CalendarTable,
}

impl VacationQueryEngine {
    /// Wraps a loaded calendar table.
    #[must_use]
    pub const fn new(table: CalendarTable) -> Self {
        Self { table }
    }

    /// Returns the underlying table.
    #[must_use]
    pub const fn table(&self) -> &CalendarTable {
        &self.table
    }

    /// Checks whether `date` is a school vacation day in `region`.
    ///
    /// `date` must be an exact `DD/MM/YYYY` literal. Dates not present in the
    /// dataset are reported as regular school days.
    ///
    /// # Errors
    ///
    /// Returns [`QueryError::UnknownRegion`] if `region` is not recognised.
    pub fn is_vacation_day(&self, date: &str, region: &str) -> Result<bool, QueryError> {
        let region = Region::resolve(region)?;
        Ok(self
            .table
            .find_by_date(date)
            .is_some_and(|day| day.is_vacation(region)))
    }

    /// Lists the vacation periods of `region`, optionally limited to `year`.
    ///
    /// The year filter is applied before grouping, so a period that crosses
    /// New Year is cut at the year boundary when `year` is given.
    ///
    /// # Errors
    ///
    /// Returns [`QueryError::UnknownRegion`] if `region` is not recognised,
    /// whether or not `year` is given.
    pub fn list_vacation_periods(
        &self,
        region: &str,
        year: Option<i32>,
    ) -> Result<Vec<VacationPeriod>, QueryError> {
        let region = Region::resolve(region)?;

        let days = self
            .table
            .iter()
            .filter(|day| year.map_or(true, |y| day.year() == y))
            .filter(|day| day.is_vacation(region));

        Ok(group_periods(days))
    }

    /// Returns the supported regions in their fixed order.
    #[must_use]
    pub fn list_supported_regions(&self) -> Vec<Region> {
        Region::ALL.to_vec()
    }
}

/// Groups chronologically ordered vacation days into maximal consecutive runs.
///
/// A day extends the open run only if it is exactly one calendar day after the
/// run's last day.
fn group_periods<'a>(days: impl IntoIterator<Item = &'a DayRecord>) -> Vec<VacationPeriod> {
    let mut periods = Vec::new();
    let mut open: Option<(&DayRecord, &DayRecord)> = None;

    for day in days {
        open = match open {
            Some((start, end)) if end.day.succ_opt() == Some(day.day) => Some((start, day)),
            Some((start, end)) => {
                periods.push(period(start, end));
                Some((day, day))
            }
            None => Some((day, day)),
        };
    }

    if let Some((start, end)) = open {
        periods.push(period(start, end));
    }

    periods
}

fn period(start: &DayRecord, end: &DayRecord) -> VacationPeriod {
    VacationPeriod {
        start: start.date.clone(),
        end: end.date.clone(),
    }
}
