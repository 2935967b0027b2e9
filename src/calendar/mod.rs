//! School vacation calendar.
//!
//! This module loads the multi-year calendar dataset once at startup and
//! answers vacation queries against it:
//!
//! - [`CalendarTable`]: the parsed, date-indexed dataset
//! - [`VacationQueryEngine`]: point lookups and vacation period listing
//! - [`Region`]: the supported regions and their aliases
//!
//! Everything here is read-only after load and safe to share between threads.

pub mod error;
pub mod query;
pub mod region;
pub mod table;

pub use error::{CalendarError, CalendarResult, QueryError};
pub use query::{VacationPeriod, VacationQueryEngine};
pub use region::{Region, RegionFlags};
pub use table::{CalendarTable, DayRecord, HolidayFlags};
