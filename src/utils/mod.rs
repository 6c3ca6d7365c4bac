//! Utility functions and helpers.

pub mod http;
pub mod progress;

use std::collections::HashSet;
use std::fmt;

use chrono::{Datelike, NaiveDate};

use crate::error::{AppError, Result};

/// Widest range a single `a-b` part may expand to.
pub const MAX_RANGE_SPAN: u64 = 1_000_000;

/// Parse a comma-separated identifier list such as `1,2,5-10,12`.
///
/// Ranges are inclusive and at most [`MAX_RANGE_SPAN`] ids wide. Duplicates
/// are dropped, keeping the first occurrence. Any malformed part fails the
/// whole list.
pub fn parse_id_list(input: &str) -> Result<Vec<u64>> {
    let mut seen = HashSet::new();
    let mut ids = Vec::new();

    for part in input.split(',').map(str::trim) {
        if part.is_empty() {
            continue;
        }
        let (start, end) = match part.split_once('-') {
            Some((lo, hi)) => (parse_id(lo, part)?, parse_id(hi, part)?),
            None => {
                let id = parse_id(part, part)?;
                (id, id)
            }
        };
        if start > end {
            return Err(AppError::validation(format!("descending range '{part}'")));
        }
        if end - start >= MAX_RANGE_SPAN {
            return Err(AppError::validation(format!(
                "range '{part}' spans more than {MAX_RANGE_SPAN} ids"
            )));
        }
        for id in start..=end {
            if seen.insert(id) {
                ids.push(id);
            }
        }
    }

    if ids.is_empty() {
        return Err(AppError::validation(format!("no ids in '{input}'")));
    }
    Ok(ids)
}

fn parse_id(raw: &str, part: &str) -> Result<u64> {
    raw.trim()
        .parse()
        .map_err(|_| AppError::validation(format!("invalid id '{part}'")))
}

/// Which natural keys a command should operate on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selection {
    /// Every key already in the corpus
    All,
    /// Corpus entries whose payload is empty
    Empty,
    /// An explicit list
    Ids(Vec<u64>),
}

impl Selection {
    pub fn parse(input: &str) -> Result<Self> {
        match input.trim().to_ascii_lowercase().as_str() {
            "all" => Ok(Self::All),
            "empty" => Ok(Self::Empty),
            _ => parse_id_list(input).map(Self::Ids),
        }
    }
}

impl std::str::FromStr for Selection {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

/// A calendar month used as a catalog query unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Month {
    pub year: i32,
    pub month: u32,
}

impl Month {
    fn parse(raw: &str) -> Result<Self> {
        let date = NaiveDate::parse_from_str(&format!("{}-01", raw.trim()), "%Y-%m-%d")
            .map_err(|_| AppError::validation(format!("invalid month '{raw}', expected YYYY-MM")))?;
        Ok(Self {
            year: date.year(),
            month: date.month(),
        })
    }

    fn next(self) -> Self {
        if self.month == 12 {
            Self {
                year: self.year + 1,
                month: 1,
            }
        } else {
            Self {
                year: self.year,
                month: self.month + 1,
            }
        }
    }
}

impl fmt::Display for Month {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{:02}", self.year, self.month)
    }
}

/// Expand an inclusive `YYYY-MM` range into its months.
pub fn parse_month_range(from: &str, to: &str) -> Result<Vec<Month>> {
    let start = Month::parse(from)?;
    let end = Month::parse(to)?;
    if start > end {
        return Err(AppError::validation(format!(
            "month range starts after it ends ({start} > {end})"
        )));
    }

    let mut months = vec![start];
    let mut current = start;
    while current < end {
        current = current.next();
        months.push(current);
    }
    Ok(months)
}
