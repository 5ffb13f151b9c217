//! Month coverage of partitioned object-store paths.
//!
//! Object addresses look like `<bucket>/<full path>/id=<id>/month=<YYYY-MM-DD>/<file>`. The
//! report gives, per id, the earliest and latest month found under one exact path.

use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use regex_lite::Regex;
use serde::{Serialize, Serializer};
use time::macros::{date, format_description};
use time::Date;

pub const KEY_START: &str = "id=";

/// Upper bound placeholder for a range that has seen no month yet.
pub const MIN_MONTH_SENTINEL: Date = date!(9999 - 12 - 31);
/// Lower bound placeholder for a range that has seen no month yet.
pub const MAX_MONTH_SENTINEL: Date = date!(0001 - 01 - 01);

#[derive(Debug, thiserror::Error)]
pub enum PathError {
    #[error("no `id=` segment in key {0:?}")]
    MissingId(String),
    #[error("no `month=` segment in key {0:?}")]
    MissingMonth(String),
    #[error("month {month:?} in key {key:?} is not a YYYY-MM-DD date: {source}")]
    InvalidMonth {
        key: String,
        month: String,
        #[source]
        source: time::error::Parse,
    },
    #[error("invalid key pattern: {0}")]
    Pattern(#[from] regex_lite::Error),
    #[error("{context} {path}: {source}")]
    Io {
        context: &'static str,
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Keys under `{bucket}/{full_path}/` that start with `id=`, with the prefix stripped.
///
/// Only exact path matches count: an address nested deeper or shallower than `full_path`
/// does not start its remainder with `id=` and is skipped.
pub fn get_all_keys<I, S>(
    addresses: I,
    bucket: &str,
    full_path: &str,
) -> impl Iterator<Item = String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let prefix = format!("{bucket}/{full_path}/");
    addresses.into_iter().filter_map(move |address| {
        address
            .as_ref()
            .strip_prefix(prefix.as_str())
            .filter(|key| key.starts_with(KEY_START))
            .map(str::to_owned)
    })
}

#[derive(Debug, Clone)]
pub struct KeyParser {
    id_pattern: Regex,
    month_pattern: Regex,
}

impl KeyParser {
    /// # Errors
    /// Returns [`PathError::Pattern`] if a key pattern fails to compile.
    pub fn new() -> Result<Self, PathError> {
        Ok(Self {
            id_pattern: Regex::new("id=(.+?)/")?,
            month_pattern: Regex::new("month=(.+?)/")?,
        })
    }

    /// # Errors
    /// Returns [`PathError::MissingId`] when the key has no `id=<id>/` segment.
    pub fn parse_id_from_key(&self, key: &str) -> Result<String, PathError> {
        self.id_pattern
            .captures(key)
            .and_then(|captures| captures.get(1))
            .map(|id| id.as_str().to_owned())
            .ok_or_else(|| PathError::MissingId(key.to_owned()))
    }

    /// # Errors
    /// Returns [`PathError::MissingMonth`] when the key has no `month=<date>/` segment, or
    /// [`PathError::InvalidMonth`] when the segment is not a `YYYY-MM-DD` date.
    pub fn parse_month_from_key(&self, key: &str) -> Result<Date, PathError> {
        let month = self
            .month_pattern
            .captures(key)
            .and_then(|captures| captures.get(1))
            .ok_or_else(|| PathError::MissingMonth(key.to_owned()))?
            .as_str();
        Date::parse(month, format_description!("[year]-[month]-[day]")).map_err(|source| {
            PathError::InvalidMonth {
                key: key.to_owned(),
                month: month.to_owned(),
                source,
            }
        })
    }

    /// Earliest and latest month per id.
    ///
    /// # Errors
    /// Fails on the first key without a parseable id or month.
    pub fn min_max_months<I, S>(&self, keys: I) -> Result<BTreeMap<String, MonthRange>, PathError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut ranges = BTreeMap::<String, MonthRange>::new();
        for key in keys {
            let key = key.as_ref();
            let id = self.parse_id_from_key(key)?;
            let month = self.parse_month_from_key(key)?;
            ranges.entry(id).or_default().update(month);
        }
        Ok(ranges)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Eq, PartialEq)]
pub struct MonthRange {
    #[serde(serialize_with = "serialize_month")]
    pub min_month: Date,
    #[serde(serialize_with = "serialize_month")]
    pub max_month: Date,
}

impl Default for MonthRange {
    fn default() -> Self {
        Self {
            min_month: MIN_MONTH_SENTINEL,
            max_month: MAX_MONTH_SENTINEL,
        }
    }
}

impl MonthRange {
    pub fn update(&mut self, month: Date) {
        self.min_month = self.min_month.min(month);
        self.max_month = self.max_month.max(month);
    }
}

fn serialize_month<S: Serializer>(month: &Date, serializer: S) -> Result<S::Ok, S::Error> {
    let formatted = month
        .format(format_description!("[year]-[month]-[day]"))
        .map_err(serde::ser::Error::custom)?;
    serializer.serialize_str(&formatted)
}

/// One address per line; blank lines are skipped.
///
/// # Errors
/// Returns [`PathError::Io`] when the file cannot be read.
pub fn read_addresses(path: &Path) -> Result<Vec<String>, PathError> {
    let contents = fs::read_to_string(path).map_err(|source| PathError::Io {
        context: "failed to read addresses from",
        path: path.to_path_buf(),
        source,
    })?;
    Ok(contents
        .lines()
        .map(str::trim_end)
        .filter(|line| !line.is_empty())
        .map(str::to_owned)
        .collect())
}

/// Compute the per-id month ranges under `{bucket}/{full_path}/` and write them as JSON
/// `{"<id>": {"min_month": "YYYY-MM-DD", "max_month": "YYYY-MM-DD"}}` to `out`.
///
/// # Errors
/// Fails on unparseable keys or when `out` cannot be written.
pub fn report_min_max<I, S>(
    addresses: I,
    bucket: &str,
    full_path: &str,
    out: &Path,
) -> Result<BTreeMap<String, MonthRange>, PathError>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let parser = KeyParser::new()?;
    let ranges = parser.min_max_months(get_all_keys(addresses, bucket, full_path))?;

    let write_error = |source| PathError::Io {
        context: "failed to write report to",
        path: out.to_path_buf(),
        source,
    };
    let mut writer = BufWriter::new(File::create(out).map_err(write_error)?);
    serde_json::to_writer(&mut writer, &ranges).map_err(|err| write_error(err.into()))?;
    writer.flush().map_err(write_error)?;

    tracing::info!(ids = ranges.len(), out = %out.display(), "month range report written");
    Ok(ranges)
}
