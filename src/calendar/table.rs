//! Calendar dataset loading and indexing.
//!
//! # Dataset Format
//!
//! The dataset is a semicolon-delimited text table with one line per calendar
//! day. The first line is a header and is discarded without inspection.
//!
//! | Field | Content                                  |
//! |-------|------------------------------------------|
//! | 0     | Date, `DD/MM/YYYY`                       |
//! | 1     | Weekday name                             |
//! | 3     | Weekend flag                             |
//! | 4     | Flanders vacation flag                   |
//! | 6     | Wallonia vacation flag                   |
//! | 8     | North Netherlands vacation flag          |
//! | 10    | Middle Netherlands vacation flag         |
//! | 11    | South Netherlands vacation flag          |
//! | 12    | Luxembourg vacation flag                 |
//! | 13    | Belgian national holiday flag            |
//! | 15    | Dutch national holiday flag              |
//! | 17    | Luxembourgish national holiday flag      |
//!
//! A flag is set only when the field is exactly `1`. Lines with fewer than
//! [`MIN_FIELDS`] fields are skipped.

use std::path::Path;

use bitflags::bitflags;
use chrono::{Datelike, NaiveDate};
use indexmap::map::Entry;
use indexmap::IndexMap;

use crate::calendar::error::{CalendarError, CalendarResult};
use crate::calendar::region::{Region, RegionFlags};

/// Minimum number of fields for a line to be considered a day record.
pub const MIN_FIELDS: usize = 20;

/// Field delimiter.
pub const DELIMITER: u8 = b';';

/// Textual layout of the date column.
pub const DATE_FORMAT: &str = "%d/%m/%Y";

/// The only literal recognised as a set flag.
const TRUE_LITERAL: &str = "1";

const COL_DATE: usize = 0;
const COL_WEEKDAY: usize = 1;
const COL_WEEKEND: usize = 3;

/// Region flag columns, in [`Region::ALL`] order.
const REGION_COLUMNS: [(Region, usize); 6] = [
    (Region::Flanders, 4),
    (Region::Wallonia, 6),
    (Region::NorthNetherlands, 8),
    (Region::MiddleNetherlands, 10),
    (Region::SouthNetherlands, 11),
    (Region::Luxembourg, 12),
];

const HOLIDAY_COLUMNS: [(HolidayFlags, usize); 3] = [
    (HolidayFlags::BELGIUM, 13),
    (HolidayFlags::NETHERLANDS, 15),
    (HolidayFlags::LUXEMBOURG, 17),
];

bitflags! {
    /// National public holiday flags.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct HolidayFlags: u8 {
        /// Belgian public holiday.
        const BELGIUM = 1 << 0;
        /// Dutch public holiday.
        const NETHERLANDS = 1 << 1;
        /// Luxembourgish public holiday.
        const LUXEMBOURG = 1 << 2;
    }
}

/// One calendar day.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DayRecord {
    /// Date literal exactly as stored, `DD/MM/YYYY`.
    pub date: String,
    /// Parsed date.
    pub day: NaiveDate,
    /// Weekday name (display only).
    pub weekday: String,
    /// Whether the day falls on a weekend.
    pub weekend: bool,
    /// School vacation flags.
    pub vacations: RegionFlags,
    /// National holiday flags.
    pub holidays: HolidayFlags,
}

impl DayRecord {
    /// Returns `true` if this day is a school vacation day in `region`.
    #[must_use]
    pub fn is_vacation(&self, region: Region) -> bool {
        self.vacations.contains(region.flag())
    }

    /// Returns the calendar year of this day.
    #[must_use]
    pub fn year(&self) -> i32 {
        self.day.year()
    }
}

/// An immutable, date-indexed snapshot of the calendar dataset.
///
/// Iteration yields records in file order, which is chronological order.
#[derive(Debug, Clone, Default)]
pub struct CalendarTable {
    days: IndexMap<String, DayRecord>,
}

impl CalendarTable {
    /// Loads the dataset from a file.
    ///
    /// The file is decoded as UTF-8 (a leading BOM is ignored). Files that are
    /// not valid UTF-8 are decoded as Windows-1252, the usual encoding of
    /// spreadsheet exports.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or its contents are corrupt.
    pub fn load(path: impl AsRef<Path>) -> CalendarResult<Self> {
        let path = path.as_ref();
        let bytes = std::fs::read(path).map_err(|e| CalendarError::file_read(path, e))?;

        let (text, had_errors) = encoding_rs::UTF_8.decode_with_bom_removal(&bytes);
        let table = if had_errors {
            tracing::debug!(path = %path.display(), "Dataset is not UTF-8, decoding as Windows-1252");
            let (decoded, _, _) = encoding_rs::WINDOWS_1252.decode(&bytes);
            Self::parse(&decoded)?
        } else {
            Self::parse(&text)?
        };

        tracing::info!(
            path = %path.display(),
            days = table.len(),
            first = table.first().map(|d| d.date.as_str()),
            last = table.last().map(|d| d.date.as_str()),
            "Calendar dataset loaded"
        );

        Ok(table)
    }

    /// Parses the dataset from its textual form.
    ///
    /// # Errors
    ///
    /// Returns an error if the text is not decodable, a date is repeated, or
    /// no day records are present. Lines with fewer than [`MIN_FIELDS`] fields
    /// or without a valid `DD/MM/YYYY` date are skipped.
    pub fn parse(source: &str) -> CalendarResult<Self> {
        let mut reader = csv::ReaderBuilder::new()
            .delimiter(DELIMITER)
            .has_headers(true)
            .flexible(true)
            .from_reader(source.as_bytes());

        let mut days: IndexMap<String, DayRecord> = IndexMap::new();
        let mut previous: Option<NaiveDate> = None;

        for result in reader.records() {
            let record = result.map_err(CalendarError::csv)?;
            let line = record.position().map_or(0, csv::Position::line);

            if record.len() < MIN_FIELDS {
                tracing::trace!(line, fields = record.len(), "Skipping short line");
                continue;
            }

            let Some(day) = parse_record(&record) else {
                tracing::warn!(
                    line,
                    date = record.get(COL_DATE).unwrap_or_default(),
                    "Skipping line without a DD/MM/YYYY date"
                );
                continue;
            };

            if let Some(prev) = previous {
                if prev.succ_opt() != Some(day.day) {
                    tracing::warn!(line, date = %day.date, "Calendar is not contiguous here");
                }
            }
            previous = Some(day.day);

            match days.entry(day.date.clone()) {
                Entry::Occupied(_) => {
                    return Err(CalendarError::DuplicateDate {
                        line,
                        date: day.date,
                    });
                }
                Entry::Vacant(slot) => {
                    slot.insert(day);
                }
            }
        }

        if days.is_empty() {
            return Err(CalendarError::Empty);
        }

        Ok(Self { days })
    }

    /// Finds the record for an exact date literal.
    ///
    /// No normalisation is done: `1/1/2019` does not find `01/01/2019`.
    #[must_use]
    pub fn find_by_date(&self, date: &str) -> Option<&DayRecord> {
        self.days.get(date)
    }

    /// Iterates over all records in chronological order.
    pub fn iter(&self) -> impl Iterator<Item = &DayRecord> {
        self.days.values()
    }

    /// Returns the number of day records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.days.len()
    }

    /// Returns `true` if the table has no records.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.days.is_empty()
    }

    /// Returns the first (earliest) record.
    #[must_use]
    pub fn first(&self) -> Option<&DayRecord> {
        self.days.first().map(|(_, day)| day)
    }

    /// Returns the last (latest) record.
    #[must_use]
    pub fn last(&self) -> Option<&DayRecord> {
        self.days.last().map(|(_, day)| day)
    }
}

/// Builds a day record, or `None` if the date column is not a valid date.
fn parse_record(record: &csv::StringRecord) -> Option<DayRecord> {
    let date = record.get(COL_DATE).unwrap_or_default();
    let day = NaiveDate::parse_from_str(date, DATE_FORMAT).ok()?;

    let flag = |col: usize| record.get(col) == Some(TRUE_LITERAL);

    let vacations = REGION_COLUMNS
        .iter()
        .filter(|(_, col)| flag(*col))
        .fold(RegionFlags::empty(), |acc, (region, _)| acc | region.flag());

    let holidays = HOLIDAY_COLUMNS
        .iter()
        .filter(|(_, col)| flag(*col))
        .fold(HolidayFlags::empty(), |acc, (holiday, _)| acc | *holiday);

    Some(DayRecord {
        date: date.to_string(),
        day,
        weekday: record.get(COL_WEEKDAY).unwrap_or_default().to_string(),
        weekend: flag(COL_WEEKEND),
        vacations,
        holidays,
    })
}
