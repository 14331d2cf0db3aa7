use crate::error::Error;
use crate::report_spec::{Convert, ReportSpec};
use chrono::NaiveDate;
use serde::Deserialize;
use std::collections::HashMap;

/// One result cell as the reporting service returns it: several typed
/// fields of which only one is semantically set.
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct RawValue {
    pub string_value: Option<String>,
    pub int_value: Option<i64>,
    pub double_value: Option<f64>,
}

/// One result row: cells positionally aligned to the report's
/// dimensions-then-metrics column list, in the order the service returned
/// them.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawRow {
    #[serde(default)]
    pub values: Vec<RawValue>,
}

/// The decoded scalar behind a [`RawValue`].
#[derive(Debug, Clone, PartialEq)]
pub enum Scalar {
    Text(String),
    Int(i64),
    Float(f64),
}

impl RawValue {
    /// Collapses the one-of-many representation to a single scalar.
    ///
    /// A non-empty string wins, then a non-zero double, then the integer
    /// field (defaulting to 0). Known precision caveat: a metric whose
    /// genuine value is 0.0 is indistinguishable from an absent double and
    /// decodes through the integer field instead. The service exhibits this
    /// ambiguity; it is preserved here rather than guessed around.
    pub fn decode(&self) -> Scalar {
        if let Some(s) = &self.string_value {
            if !s.is_empty() {
                return Scalar::Text(s.clone());
            }
        }

        if let Some(d) = self.double_value {
            if d != 0.0 {
                return Scalar::Float(d);
            }
        }

        Scalar::Int(self.int_value.unwrap_or(0))
    }
}

/// A typed field value ready for the warehouse.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Date(NaiveDate),
    Text(String),
    Int(i64),
    Float(f64),
    Null,
}

/// One warehouse-ready row: target field name to typed value, pruned to the
/// report's declared column list.
#[derive(Debug, Clone, Default)]
pub struct MappedRow {
    values: HashMap<String, FieldValue>,
}

impl MappedRow {
    pub fn get(&self, field: &str) -> Option<&FieldValue> {
        self.values.get(field)
    }

    pub(crate) fn insert(&mut self, field: &str, value: FieldValue) {
        self.values.insert(field.to_string(), value);
    }
}

/// Decodes, renames, converts, and prunes every raw row per the report's
/// mapping tables.
pub fn transform_rows(raw_rows: &[RawRow], spec: &ReportSpec) -> Result<Vec<MappedRow>, Error> {
    let source_columns = spec.source_columns();

    raw_rows
        .iter()
        .map(|raw| map_row(raw, &source_columns, spec))
        .collect()
}

fn map_row(
    raw: &RawRow,
    source_columns: &[&'static str],
    spec: &ReportSpec,
) -> Result<MappedRow, Error> {
    let mut row = MappedRow::default();

    for (position, source_name) in source_columns.iter().enumerate() {
        let Some(raw_value) = raw.values.get(position) else {
            continue;
        };

        // Rename; source columns without a target mapping are dropped.
        let Some((_, target)) = spec.rename.iter().find(|(src, _)| src == source_name) else {
            continue;
        };

        // Prune anything outside the declared column list, e.g. extra
        // ad-unit hierarchy levels the service adds on its own.
        if !spec.columns.iter().any(|c| c.name == *target) {
            continue;
        }

        let scalar = raw_value.decode();
        let converted = match spec.conversion_for(target) {
            Some(directive) => convert_field(scalar, directive, target)?,
            None => passthrough(scalar),
        };

        row.insert(target, converted);
    }

    Ok(row)
}

fn passthrough(scalar: Scalar) -> FieldValue {
    match scalar {
        Scalar::Text(s) => FieldValue::Text(s),
        Scalar::Int(v) => FieldValue::Int(v),
        Scalar::Float(v) => FieldValue::Float(v),
    }
}

/// Applies one conversion directive to a decoded scalar.
///
/// Date-typed directives fail with [`Error::Transform`] on malformed input;
/// the numeric directives coerce and produce `Null` for unparsable values.
pub fn convert_field(scalar: Scalar, directive: Convert, column: &str) -> Result<FieldValue, Error> {
    match directive {
        Convert::Date => match &scalar {
            Scalar::Text(s) => NaiveDate::parse_from_str(s, "%Y-%m-%d")
                .map(FieldValue::Date)
                .map_err(|_| transform_error(column, &scalar, "expected YYYY-MM-DD")),
            _ => Err(transform_error(column, &scalar, "expected a date string")),
        },
        Convert::DateInt => match &scalar {
            Scalar::Int(v) => decode_date_int(*v)
                .ok_or_else(|| transform_error(column, &scalar, "not a valid YYYYMMDD value")),
            Scalar::Text(s) => s
                .parse::<i64>()
                .ok()
                .and_then(decode_date_int)
                .ok_or_else(|| transform_error(column, &scalar, "not a valid YYYYMMDD value")),
            Scalar::Float(_) => Err(transform_error(column, &scalar, "expected an integer")),
        },
        Convert::MonthYear => match &scalar {
            Scalar::Int(v) => decode_month_year(*v)
                .ok_or_else(|| transform_error(column, &scalar, "not a valid MONTH_YEAR value")),
            _ => Err(transform_error(column, &scalar, "expected an integer")),
        },
        Convert::Int64 => Ok(match scalar {
            Scalar::Int(v) => FieldValue::Int(v),
            Scalar::Float(v) => FieldValue::Int(v as i64),
            Scalar::Text(s) => s.parse::<i64>().map_or(FieldValue::Null, FieldValue::Int),
        }),
        Convert::Float64 => Ok(match scalar {
            Scalar::Float(v) => FieldValue::Float(v),
            Scalar::Int(v) => FieldValue::Float(v as f64),
            Scalar::Text(s) => s.parse::<f64>().map_or(FieldValue::Null, FieldValue::Float),
        }),
        Convert::Text => Ok(match scalar {
            Scalar::Text(s) => FieldValue::Text(s),
            Scalar::Int(v) => FieldValue::Text(v.to_string()),
            Scalar::Float(v) => FieldValue::Text(v.to_string()),
        }),
    }
}

fn transform_error(column: &str, value: &Scalar, reason: &str) -> Error {
    let value = match value {
        Scalar::Text(s) => s.clone(),
        Scalar::Int(v) => v.to_string(),
        Scalar::Float(v) => v.to_string(),
    };

    Error::Transform {
        column: column.to_string(),
        value,
        reason: reason.to_string(),
    }
}

/// `YYYYMMDD` integer to calendar date, e.g. `20251125` → 2025-11-25.
fn decode_date_int(value: i64) -> Option<FieldValue> {
    let year = i32::try_from(value / 10_000).ok()?;
    let month = u32::try_from((value / 100) % 100).ok()?;
    let day = u32::try_from(value % 100).ok()?;

    NaiveDate::from_ymd_opt(year, month, day).map(FieldValue::Date)
}

/// Compact month encoding to the first day of the month.
///
/// The service encodes `(year - 2010) * 100 + month_0indexed`:
/// `1510` → 2025-11-01, `1509` → 2025-10-01, `0` → 2010-01-01.
fn decode_month_year(value: i64) -> Option<FieldValue> {
    if value < 0 {
        return None;
    }

    let year_offset = i32::try_from(value / 100).ok()?;
    let month_0indexed = u32::try_from(value % 100).ok()?;

    NaiveDate::from_ymd_opt(2010 + year_offset, month_0indexed + 1, 1).map(FieldValue::Date)
}
