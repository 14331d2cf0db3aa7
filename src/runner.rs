use crate::config::Config;
use crate::date_range::{self, DateRange};
use crate::error::Error;
use crate::report_client::{ReportJobs, RestReportClient};
use crate::report_spec::{PartitionGranularity, ReportSpec, ReportType};
use crate::transform::{transform_rows, MappedRow};
use crate::warehouse::{ParquetWarehouse, Warehouse};
use chrono::{NaiveDate, Utc};
use log::{error, info};
use std::time::Duration;

/// Scheduled single-report invocation: processes the default period for the
/// report's partition granularity (yesterday for daily tables, the previous
/// calendar month for monthly ones). Any failure aborts the invocation.
pub async fn run_scheduled(config: Config, report_type: ReportType) -> Result<u64, Error> {
    let client = RestReportClient::new(&config);
    let warehouse = ParquetWarehouse::new(&config.warehouse_root, &config.dataset);
    let timeout = Duration::from_secs(config.job_timeout_secs);

    let spec = ReportSpec::for_report(report_type);
    let range = default_period(&spec, Utc::now().date_naive());

    info!(
        "processing {} for {} to {}",
        report_type.token(),
        range.start,
        range.end
    );

    let rows_written = execute_report(&spec, &range, &client, &warehouse, timeout, false).await?;

    info!(
        "{} completed, rows_inserted={}",
        report_type.token(),
        rows_written
    );

    Ok(rows_written)
}

/// Historical backfill: replays the pipeline month partition by month
/// partition for each requested report type. A failing partition is logged
/// and the run continues; the accumulated failures surface as a single
/// error at the end so the process still exits non-zero.
pub async fn backfill(
    config: Config,
    start: NaiveDate,
    end: NaiveDate,
    reports: Vec<ReportType>,
    dry_run: bool,
) -> Result<u64, Error> {
    let client = RestReportClient::new(&config);
    let warehouse = ParquetWarehouse::new(&config.warehouse_root, &config.dataset);
    let timeout = Duration::from_secs(config.job_timeout_secs);

    backfill_with(&client, &warehouse, start, end, &reports, timeout, dry_run).await
}

async fn backfill_with<R: ReportJobs, W: Warehouse>(
    client: &R,
    warehouse: &W,
    start: NaiveDate,
    end: NaiveDate,
    reports: &[ReportType],
    timeout: Duration,
    dry_run: bool,
) -> Result<u64, Error> {
    let range = DateRange::new(start, end)?;
    let partitions = range.month_partitions();

    let mut total_rows = 0;
    let mut attempted = 0;
    let mut failed = 0;

    for report_type in reports {
        let spec = ReportSpec::for_report(*report_type);
        info!(
            "backfilling {} across {} month partitions",
            report_type.token(),
            partitions.len()
        );

        for (index, partition) in partitions.iter().enumerate() {
            attempted += 1;
            info!(
                "[{}/{}] {}: {} to {}",
                index + 1,
                partitions.len(),
                report_type.token(),
                partition.start,
                partition.end
            );

            match execute_report(&spec, partition, client, warehouse, timeout, dry_run).await {
                Ok(rows) => total_rows += rows,
                Err(err) => {
                    error!(
                        "{} failed for {} to {}: {}",
                        report_type.token(),
                        partition.start,
                        partition.end,
                        err
                    );
                    failed += 1;
                }
            }
        }
    }

    if failed > 0 {
        return Err(Error::BackfillIncomplete { failed, attempted });
    }

    info!("backfill completed, total rows inserted: {}", total_rows);
    Ok(total_rows)
}

/// The one parametrized pipeline every report type and every invocation
/// path runs through: submit, poll, fetch, transform, then the idempotent
/// delete-then-append load. Dry runs stop after the transform and print a
/// preview instead of writing.
async fn execute_report<R: ReportJobs, W: Warehouse>(
    spec: &ReportSpec,
    range: &DateRange,
    client: &R,
    warehouse: &W,
    timeout: Duration,
    dry_run: bool,
) -> Result<u64, Error> {
    let job = client.submit(spec, range).await?;
    client.await_completion(&job, timeout).await?;

    let raw_rows = client.fetch_rows(&job).await?;
    if raw_rows.is_empty() {
        info!(
            "no data returned for {} between {} and {}",
            spec.report_type.token(),
            range.start,
            range.end
        );
        return Ok(0);
    }

    info!(
        "retrieved {} rows for {}",
        raw_rows.len(),
        spec.report_type.token()
    );

    let rows = transform_rows(&raw_rows, spec)?;

    if dry_run {
        print_preview(spec, range, &rows);
        return Ok(rows.len() as u64);
    }

    warehouse.ensure_table(spec).await?;
    warehouse.delete_overlapping(spec, range).await?;
    let written = warehouse.append(spec, &rows).await?;

    info!("inserted {} rows into {}", written, spec.table);
    Ok(written)
}

fn default_period(spec: &ReportSpec, today: NaiveDate) -> DateRange {
    match spec.partition.granularity {
        PartitionGranularity::Day => date_range::yesterday(today),
        PartitionGranularity::Month => date_range::previous_month(today),
    }
}

fn print_preview(spec: &ReportSpec, range: &DateRange, rows: &[MappedRow]) {
    println!(
        "[DRY RUN] {}: would load {} rows for {} to {}",
        spec.table,
        rows.len(),
        range.start,
        range.end
    );
    for row in rows.iter().take(3) {
        println!("  {row:?}");
    }
}
