use crate::date_range::DateRange;
use crate::error::Error;
use crate::report_spec::{Column, ColumnType, PartitionGranularity, ReportSpec};
use crate::transform::{FieldValue, MappedRow};
use chrono::{NaiveDate, NaiveDateTime};
use datafusion::arrow::array::{
    ArrayRef, Date64Builder, Float64Builder, Int64Builder, RecordBatch, StringBuilder,
};
use datafusion::arrow::datatypes::{DataType, Field, Schema, SchemaRef};
use datafusion::common::ScalarValue;
use datafusion::dataframe::DataFrameWriteOptions;
use datafusion::prelude::{col, lit, DataFrame, ParquetReadOptions, SessionContext};
use log::info;
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

const MANIFEST_FILE: &str = "table.json";
const STAGING_FILE: &str = ".staging.parquet";

#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait Warehouse: Send + Sync + 'static {
    /// Creates the table with its declared schema and partitioning if it
    /// does not exist yet. Never migrates an existing table.
    async fn ensure_table(&self, spec: &ReportSpec) -> Result<(), Error>;

    /// Removes rows whose partition field overlaps the range: all days in
    /// `[start, end]` for day-partitioned tables, the range's month for
    /// month-partitioned ones. Running a load for the same period twice is
    /// idempotent because this runs before every append.
    async fn delete_overlapping(&self, spec: &ReportSpec, range: &DateRange) -> Result<(), Error>;

    /// Bulk-appends rows against the table's declared schema. A row that
    /// does not fit the schema fails the whole batch. Empty input is a
    /// successful no-op returning 0.
    async fn append(&self, spec: &ReportSpec, rows: &[MappedRow]) -> Result<u64, Error>;
}

/// Warehouse backed by parquet segment files queried through DataFusion.
/// One table is one directory of `part-*.parquet` segments plus a manifest
/// recording the schema and partition declaration.
#[derive(Clone)]
pub struct ParquetWarehouse {
    root: PathBuf,
    dataset: String,
}

#[derive(Serialize)]
struct TableManifest {
    table: &'static str,
    columns: Vec<ManifestColumn>,
    partition: ManifestPartition,
}

#[derive(Serialize)]
struct ManifestColumn {
    name: &'static str,
    #[serde(rename = "type")]
    column_type: &'static str,
    nullable: bool,
}

#[derive(Serialize)]
struct ManifestPartition {
    field: &'static str,
    granularity: &'static str,
}

impl ParquetWarehouse {
    pub fn new(root: &str, dataset: &str) -> Self {
        ParquetWarehouse {
            root: PathBuf::from(root),
            dataset: dataset.to_string(),
        }
    }

    fn table_dir(&self, spec: &ReportSpec) -> PathBuf {
        self.root.join(&self.dataset).join(spec.table)
    }

    /// Reads the table's current segments as a DataFrame; `None` when the
    /// table holds no rows yet.
    pub async fn scan(
        &self,
        ctx: &SessionContext,
        spec: &ReportSpec,
    ) -> Result<Option<DataFrame>, Error> {
        let dir = self.table_dir(spec);
        if !dir.join(MANIFEST_FILE).exists() {
            return Err(load_error(spec.table, "table does not exist"));
        }

        let segments = segment_paths(&dir).map_err(|e| load_error(spec.table, &e.to_string()))?;
        if segments.is_empty() {
            return Ok(None);
        }

        let schema = arrow_schema(spec);
        let df = ctx
            .read_parquet(segments, ParquetReadOptions::new().schema(&schema))
            .await
            .map_err(|e| load_error(spec.table, &e.to_string()))?;

        Ok(Some(df))
    }
}

#[async_trait::async_trait]
impl Warehouse for ParquetWarehouse {
    async fn ensure_table(&self, spec: &ReportSpec) -> Result<(), Error> {
        let dir = self.table_dir(spec);
        let manifest_path = dir.join(MANIFEST_FILE);

        if manifest_path.exists() {
            return Ok(());
        }

        fs::create_dir_all(&dir).map_err(|e| load_error(spec.table, &e.to_string()))?;

        let manifest = TableManifest {
            table: spec.table,
            columns: spec
                .columns
                .iter()
                .map(|c| ManifestColumn {
                    name: c.name,
                    column_type: match c.kind {
                        ColumnType::Date => "DATE",
                        ColumnType::Text => "STRING",
                        ColumnType::Int64 => "INT64",
                        ColumnType::Float64 => "FLOAT64",
                    },
                    nullable: c.nullable,
                })
                .collect(),
            partition: ManifestPartition {
                field: spec.partition.field,
                granularity: match spec.partition.granularity {
                    PartitionGranularity::Day => "DAY",
                    PartitionGranularity::Month => "MONTH",
                },
            },
        };

        let body = serde_json::to_vec_pretty(&manifest)
            .map_err(|e| load_error(spec.table, &e.to_string()))?;
        fs::write(&manifest_path, body).map_err(|e| load_error(spec.table, &e.to_string()))?;

        info!("created table {} at {}", spec.table, dir.display());
        Ok(())
    }

    async fn delete_overlapping(&self, spec: &ReportSpec, range: &DateRange) -> Result<(), Error> {
        let dir = self.table_dir(spec);
        let ctx = SessionContext::new();

        let Some(df) = self.scan(&ctx, spec).await? else {
            return Ok(());
        };

        let field = spec.partition.field;
        // Rows with a null partition value cannot be attributed to any
        // period, so they always survive a delete.
        let keep = match spec.partition.granularity {
            PartitionGranularity::Day => col(field)
                .lt(date_lit(range.start))
                .or(col(field).gt(date_lit(range.end)))
                .or(col(field).is_null()),
            PartitionGranularity::Month => col(field)
                .not_eq(date_lit(range.month_key()))
                .or(col(field).is_null()),
        };

        let kept = df
            .filter(keep)
            .map_err(|e| load_error(spec.table, &e.to_string()))?
            .collect()
            .await
            .map_err(|e| load_error(spec.table, &e.to_string()))?;
        let kept_rows: usize = kept.iter().map(RecordBatch::num_rows).sum();

        // Stage the survivors before touching the old segments, so a crash
        // mid-delete leaves either the previous segments or a staged copy,
        // never an emptied partition.
        let staging = dir.join(STAGING_FILE);
        if staging.exists() {
            fs::remove_file(&staging).map_err(|e| load_error(spec.table, &e.to_string()))?;
        }

        if kept_rows > 0 {
            ctx.read_batches(kept)
                .map_err(|e| load_error(spec.table, &e.to_string()))?
                .write_parquet(
                    &staging.to_string_lossy(),
                    DataFrameWriteOptions::default(),
                    None,
                )
                .await
                .map_err(|e| load_error(spec.table, &e.to_string()))?;
        }

        let segments = segment_paths(&dir).map_err(|e| load_error(spec.table, &e.to_string()))?;
        for segment in segments {
            fs::remove_file(&segment).map_err(|e| load_error(spec.table, &e.to_string()))?;
        }

        if kept_rows > 0 {
            fs::rename(&staging, dir.join("part-00000.parquet"))
                .map_err(|e| load_error(spec.table, &e.to_string()))?;
        }

        info!(
            "deleted rows overlapping {} to {} from {}, {} rows kept",
            range.start, range.end, spec.table, kept_rows
        );
        Ok(())
    }

    async fn append(&self, spec: &ReportSpec, rows: &[MappedRow]) -> Result<u64, Error> {
        if rows.is_empty() {
            return Ok(0);
        }

        let dir = self.table_dir(spec);
        if !dir.join(MANIFEST_FILE).exists() {
            return Err(load_error(spec.table, "table does not exist"));
        }

        let batch = build_batch(spec, rows)?;
        let segment = next_segment_path(&dir).map_err(|e| load_error(spec.table, &e.to_string()))?;

        let ctx = SessionContext::new();
        ctx.read_batch(batch)
            .map_err(|e| load_error(spec.table, &e.to_string()))?
            .write_parquet(
                &segment.to_string_lossy(),
                DataFrameWriteOptions::default(),
                None,
            )
            .await
            .map_err(|e| load_error(spec.table, &e.to_string()))?;

        Ok(rows.len() as u64)
    }
}

fn load_error(table: &str, message: &str) -> Error {
    Error::Load {
        table: table.to_string(),
        message: message.to_string(),
    }
}

pub fn arrow_schema(spec: &ReportSpec) -> SchemaRef {
    let fields: Vec<Field> = spec
        .columns
        .iter()
        .map(|c| {
            let data_type = match c.kind {
                ColumnType::Date => DataType::Date64,
                ColumnType::Text => DataType::Utf8,
                ColumnType::Int64 => DataType::Int64,
                ColumnType::Float64 => DataType::Float64,
            };
            Field::new(c.name, data_type, c.nullable)
        })
        .collect();

    Arc::new(Schema::new(fields))
}

fn date_to_unix_ms(date: NaiveDate) -> i64 {
    (date - NaiveDateTime::UNIX_EPOCH.date()).num_milliseconds()
}

fn date_lit(date: NaiveDate) -> datafusion::prelude::Expr {
    lit(ScalarValue::Date64(Some(date_to_unix_ms(date))))
}

fn segment_paths(dir: &Path) -> std::io::Result<Vec<String>> {
    let mut segments = Vec::new();

    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        let is_segment = path
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|n| n.starts_with("part-") && n.ends_with(".parquet"));
        if is_segment {
            segments.push(path.to_string_lossy().into_owned());
        }
    }

    segments.sort_unstable();
    Ok(segments)
}

fn next_segment_path(dir: &Path) -> std::io::Result<PathBuf> {
    let count = segment_paths(dir)?.len();
    Ok(dir.join(format!("part-{count:05}.parquet")))
}

fn build_batch(spec: &ReportSpec, rows: &[MappedRow]) -> Result<RecordBatch, Error> {
    let schema = arrow_schema(spec);
    let columns: Vec<ArrayRef> = spec
        .columns
        .iter()
        .map(|column| build_column(spec.table, column, rows))
        .collect::<Result<_, _>>()?;

    RecordBatch::try_new(schema, columns).map_err(|e| load_error(spec.table, &e.to_string()))
}

fn build_column(table: &str, column: &Column, rows: &[MappedRow]) -> Result<ArrayRef, Error> {
    let mismatch = |value: &FieldValue| {
        load_error(
            table,
            &format!(
                "value {:?} does not fit column '{}' of type {:?}",
                value, column.name, column.kind
            ),
        )
    };

    let array: ArrayRef = match column.kind {
        ColumnType::Date => {
            let mut builder = Date64Builder::with_capacity(rows.len());
            for row in rows {
                match row.get(column.name) {
                    Some(FieldValue::Date(d)) => builder.append_value(date_to_unix_ms(*d)),
                    Some(FieldValue::Null) | None => builder.append_null(),
                    Some(other) => return Err(mismatch(other)),
                }
            }
            Arc::new(builder.finish())
        }
        ColumnType::Text => {
            let mut builder = StringBuilder::new();
            for row in rows {
                match row.get(column.name) {
                    Some(FieldValue::Text(s)) => builder.append_value(s),
                    Some(FieldValue::Null) | None => builder.append_null(),
                    Some(other) => return Err(mismatch(other)),
                }
            }
            Arc::new(builder.finish())
        }
        ColumnType::Int64 => {
            let mut builder = Int64Builder::with_capacity(rows.len());
            for row in rows {
                match row.get(column.name) {
                    Some(FieldValue::Int(v)) => builder.append_value(*v),
                    Some(FieldValue::Null) | None => builder.append_null(),
                    Some(other) => return Err(mismatch(other)),
                }
            }
            Arc::new(builder.finish())
        }
        ColumnType::Float64 => {
            let mut builder = Float64Builder::with_capacity(rows.len());
            for row in rows {
                match row.get(column.name) {
                    Some(FieldValue::Float(v)) => builder.append_value(*v),
                    Some(FieldValue::Null) | None => builder.append_null(),
                    Some(other) => return Err(mismatch(other)),
                }
            }
            Arc::new(builder.finish())
        }
    };

    Ok(array)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report_spec::ReportType;
    use tempfile::TempDir;

    fn date(s: &str) -> NaiveDate {
        s.parse().unwrap()
    }

    fn warehouse(dir: &TempDir) -> ParquetWarehouse {
        ParquetWarehouse::new(&dir.path().to_string_lossy(), "gam_data")
    }

    fn fill_rate_row(day: &str, ad_unit: &str, requests: i64) -> MappedRow {
        let mut row = MappedRow::default();
        row.insert("date", FieldValue::Date(date(day)));
        row.insert("ad_unit_name", FieldValue::Text(ad_unit.to_string()));
        row.insert("unfilled_impressions", FieldValue::Int(5));
        row.insert("code_served_count", FieldValue::Int(10));
        row.insert("responses_served", FieldValue::Int(9));
        row.insert("ad_server_impressions", FieldValue::Int(8));
        row.insert("fill_rate", FieldValue::Float(0.8));
        row.insert("ad_requests", FieldValue::Int(requests));
        row
    }

    fn geo_row(month_first: &str, country: &str) -> MappedRow {
        let mut row = MappedRow::default();
        row.insert("report_date", FieldValue::Date(date(month_first)));
        row.insert("country_code", FieldValue::Text("2840".to_string()));
        row.insert("country_name", FieldValue::Text(country.to_string()));
        row.insert("ad_server_impressions", FieldValue::Int(100));
        row.insert("ad_server_clicks", FieldValue::Int(3));
        row.insert("active_view_measurable_rate", FieldValue::Float(0.9));
        row.insert("active_view_viewable_impressions", FieldValue::Int(80));
        row
    }

    async fn count(warehouse: &ParquetWarehouse, spec: &ReportSpec) -> usize {
        let ctx = SessionContext::new();
        match warehouse.scan(&ctx, spec).await.unwrap() {
            Some(df) => df.count().await.unwrap(),
            None => 0,
        }
    }

    #[tokio::test]
    async fn test_ensure_table_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let wh = warehouse(&dir);
        let spec = ReportSpec::for_report(ReportType::FillRate);

        wh.ensure_table(&spec).await.unwrap();
        wh.ensure_table(&spec).await.unwrap();

        let manifest = dir
            .path()
            .join("gam_data")
            .join("report_fill_rate")
            .join("table.json");
        assert!(manifest.exists());
    }

    #[tokio::test]
    async fn test_append_empty_input_is_a_successful_noop() {
        let dir = TempDir::new().unwrap();
        let wh = warehouse(&dir);
        let spec = ReportSpec::for_report(ReportType::FillRate);
        wh.ensure_table(&spec).await.unwrap();

        let written = wh.append(&spec, &[]).await.unwrap();
        assert_eq!(written, 0);
        assert_eq!(count(&wh, &spec).await, 0);
    }

    #[tokio::test]
    async fn test_append_without_table_fails() {
        let dir = TempDir::new().unwrap();
        let wh = warehouse(&dir);
        let spec = ReportSpec::for_report(ReportType::FillRate);

        let result = wh.append(&spec, &[fill_rate_row("2025-06-01", "web", 10)]).await;
        assert!(matches!(result.unwrap_err(), Error::Load { .. }));
    }

    #[tokio::test]
    async fn test_append_then_scan_round_trip() {
        let dir = TempDir::new().unwrap();
        let wh = warehouse(&dir);
        let spec = ReportSpec::for_report(ReportType::FillRate);
        wh.ensure_table(&spec).await.unwrap();

        let rows = vec![
            fill_rate_row("2025-06-01", "web", 10),
            fill_rate_row("2025-06-02", "app", 20),
        ];
        let written = wh.append(&spec, &rows).await.unwrap();

        assert_eq!(written, 2);
        assert_eq!(count(&wh, &spec).await, 2);
    }

    #[tokio::test]
    async fn test_delete_then_append_is_idempotent_for_day_partitions() {
        let dir = TempDir::new().unwrap();
        let wh = warehouse(&dir);
        let spec = ReportSpec::for_report(ReportType::FillRate);
        wh.ensure_table(&spec).await.unwrap();

        let june = DateRange::new(date("2025-06-01"), date("2025-06-30")).unwrap();
        let rows = vec![
            fill_rate_row("2025-06-01", "web", 10),
            fill_rate_row("2025-06-15", "app", 20),
        ];

        for _ in 0..2 {
            wh.delete_overlapping(&spec, &june).await.unwrap();
            wh.append(&spec, &rows).await.unwrap();
        }

        assert_eq!(count(&wh, &spec).await, 2);
    }

    #[tokio::test]
    async fn test_delete_keeps_rows_outside_the_range() {
        let dir = TempDir::new().unwrap();
        let wh = warehouse(&dir);
        let spec = ReportSpec::for_report(ReportType::FillRate);
        wh.ensure_table(&spec).await.unwrap();

        wh.append(
            &spec,
            &[
                fill_rate_row("2025-06-15", "web", 10),
                fill_rate_row("2025-07-01", "web", 30),
            ],
        )
        .await
        .unwrap();

        let june = DateRange::new(date("2025-06-01"), date("2025-06-30")).unwrap();
        wh.delete_overlapping(&spec, &june).await.unwrap();

        assert_eq!(count(&wh, &spec).await, 1);
    }

    #[tokio::test]
    async fn test_delete_month_partition_targets_single_month() {
        let dir = TempDir::new().unwrap();
        let wh = warehouse(&dir);
        let spec = ReportSpec::for_report(ReportType::GeoMonthly);
        wh.ensure_table(&spec).await.unwrap();

        wh.append(
            &spec,
            &[
                geo_row("2025-10-01", "France"),
                geo_row("2025-11-01", "France"),
                geo_row("2025-11-01", "Spain"),
            ],
        )
        .await
        .unwrap();

        let november = DateRange::new(date("2025-11-01"), date("2025-11-30")).unwrap();
        wh.delete_overlapping(&spec, &november).await.unwrap();

        assert_eq!(count(&wh, &spec).await, 1);
    }

    #[tokio::test]
    async fn test_delete_on_empty_table_is_a_noop() {
        let dir = TempDir::new().unwrap();
        let wh = warehouse(&dir);
        let spec = ReportSpec::for_report(ReportType::GeoMonthly);
        wh.ensure_table(&spec).await.unwrap();

        let november = DateRange::new(date("2025-11-01"), date("2025-11-30")).unwrap();
        wh.delete_overlapping(&spec, &november).await.unwrap();

        assert_eq!(count(&wh, &spec).await, 0);
    }

    #[tokio::test]
    async fn test_append_rejects_type_mismatched_row() {
        let dir = TempDir::new().unwrap();
        let wh = warehouse(&dir);
        let spec = ReportSpec::for_report(ReportType::FillRate);
        wh.ensure_table(&spec).await.unwrap();

        let mut bad = fill_rate_row("2025-06-01", "web", 10);
        bad.insert("ad_requests", FieldValue::Text("lots".to_string()));

        let result = wh.append(&spec, &[bad]).await;
        assert!(matches!(result.unwrap_err(), Error::Load { .. }));
        assert_eq!(count(&wh, &spec).await, 0);
    }

    #[tokio::test]
    async fn test_null_fields_load_as_nulls() {
        let dir = TempDir::new().unwrap();
        let wh = warehouse(&dir);
        let spec = ReportSpec::for_report(ReportType::FillRate);
        wh.ensure_table(&spec).await.unwrap();

        let mut row = fill_rate_row("2025-06-01", "web", 10);
        row.insert("fill_rate", FieldValue::Null);

        let written = wh.append(&spec, &[row]).await.unwrap();
        assert_eq!(written, 1);
        assert_eq!(count(&wh, &spec).await, 1);
    }
}
