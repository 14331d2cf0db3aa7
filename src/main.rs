mod config;
mod date_range;
mod error;
mod report_client;
mod report_spec;
mod runner;
mod transform;
mod warehouse;

use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use config::Config;
use error::Error;
use log::error;
use report_spec::ReportType;

#[derive(Parser)]
struct Args {
    #[command(flatten)]
    config: Config,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run one report for its default period (yesterday for daily
    /// reports, the previous month for monthly ones).
    Run {
        #[arg(long, value_enum)]
        report_type: ReportType,
    },

    /// Replay reports month by month over a historical date range.
    Backfill {
        #[arg(help = "Date should be in the form YYYY-MM-DD", value_parser = validate_date)]
        start: NaiveDate,

        #[arg(help = "Date should be in the form YYYY-MM-DD", value_parser = validate_date)]
        end: NaiveDate,

        #[arg(long, value_enum, value_delimiter = ',')]
        reports: Option<Vec<ReportType>>,

        #[arg(long)]
        dry_run: bool,
    },
}

fn validate_date(s: &str) -> Result<NaiveDate, String> {
    let error_message = "Invalid date, expected YYYY-MM-DD";

    let parts = s
        .split("-")
        .map(|part| part.parse::<u16>())
        .collect::<Result<Vec<_>, _>>()
        .map_err(|_| error_message)?;

    match parts.as_slice() {
        &[year, month, day] if month <= 12 && day <= 31 => {
            Ok(
                NaiveDate::from_ymd_opt(year as i32, month as u32, day as u32)
                    .ok_or(error_message)?,
            )
        }
        _ => Err(error_message.to_string()),
    }
}

#[tokio::main]
async fn main() -> Result<(), Error> {
    let args = Args::parse();

    env_logger::init();

    match args.command {
        Command::Run { report_type } => {
            if let Err(err) = runner::run_scheduled(args.config, report_type).await {
                error!("{} run failed: {}", report_type.token(), err);
                std::process::exit(1);
            }
        }
        Command::Backfill {
            start,
            end,
            reports,
            dry_run,
        } => {
            let reports = reports.unwrap_or_else(ReportType::all);
            if let Err(err) = runner::backfill(args.config, start, end, reports, dry_run).await {
                error!("backfill failed: {}", err);
                std::process::exit(1);
            }
        }
    };

    Ok(())
}
