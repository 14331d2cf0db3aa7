use crate::config::Config;
use crate::date_range::DateRange;
use crate::error::Error;
use crate::report_spec::ReportSpec;
use crate::transform::RawRow;
use log::{info, warn};
use reqwest::{header::AUTHORIZATION, Client, Url};
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait ReportJobs: Send + Sync + 'static {
    /// Requests execution of the report on the remote service. Creates
    /// remote state: a report job that must be polled to completion.
    async fn submit(&self, spec: &ReportSpec, range: &DateRange) -> Result<JobHandle, Error>;

    /// Polls the job at a fixed interval until it reaches a terminal state
    /// or `timeout` elapses. Transient transport errors while polling are
    /// retried within the timeout; a remote `FAILED` status is terminal and
    /// surfaces immediately as [`Error::JobFailed`].
    async fn await_completion(&self, job: &JobHandle, timeout: Duration) -> Result<(), Error>;

    /// Streams all result pages in order and returns the rows exactly as
    /// the service produced them. No ordering guarantee exists beyond
    /// source order.
    async fn fetch_rows(&self, job: &JobHandle) -> Result<Vec<RawRow>, Error>;
}

/// Handle to one in-flight or completed remote report execution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobHandle {
    pub id: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    Running,
    Completed,
    Failed,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RunReportResponse {
    job_id: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct JobStatusResponse {
    status: JobStatus,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct FetchRowsResponse {
    #[serde(default)]
    rows: Vec<RawRow>,
    #[serde(default)]
    next_page_token: Option<String>,
}

#[derive(Debug, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
struct RunReportRequest {
    report_definition: ReportDefinition,
}

#[derive(Debug, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
struct ReportDefinition {
    dimensions: Vec<&'static str>,
    metrics: Vec<&'static str>,
    date_range: WireDateRange,
}

#[derive(Debug, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
struct WireDateRange {
    start_date: String,
    end_date: String,
}

fn run_report_body(spec: &ReportSpec, range: &DateRange) -> RunReportRequest {
    RunReportRequest {
        report_definition: ReportDefinition {
            dimensions: spec.dimensions.clone(),
            metrics: spec.metrics.clone(),
            date_range: WireDateRange {
                start_date: range.start.format("%Y-%m-%d").to_string(),
                end_date: range.end.format("%Y-%m-%d").to_string(),
            },
        },
    }
}

#[derive(Clone)]
pub struct RestReportClient {
    client: Client,
    base_url: String,
    network_code: String,
    token: String,
    poll_interval: Duration,
}

impl RestReportClient {
    pub fn new(config: &Config) -> Self {
        RestReportClient {
            client: Client::new(),
            base_url: config.api_url.to_string(),
            network_code: config.network_code.to_string(),
            token: config.api_token.to_string(),
            poll_interval: Duration::from_secs(config.poll_interval_secs),
        }
    }

    #[cfg(test)]
    fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    fn network_url(&self, segments: &[&str]) -> Result<Url, Error> {
        let mut url = Url::parse(&self.base_url)?;
        url.path_segments_mut()
            .map_err(|_| Error::UrlParsingFailed(url::ParseError::SetHostOnCannotBeABaseUrl))?
            .extend(["networks", self.network_code.as_str()].iter().chain(segments));
        Ok(url)
    }

    async fn poll_status(&self, job: &JobHandle) -> Result<JobStatusResponse, Error> {
        let url = self.network_url(&["jobs", &job.id, "status"])?;

        let resp = self
            .client
            .get(url)
            .header(AUTHORIZATION, &self.token)
            .send()
            .await?
            .error_for_status()?;

        Ok(resp.json::<JobStatusResponse>().await?)
    }
}

#[async_trait::async_trait]
impl ReportJobs for RestReportClient {
    async fn submit(&self, spec: &ReportSpec, range: &DateRange) -> Result<JobHandle, Error> {
        // Reports pre-configured on the service run as-is; everything else
        // is submitted as a dynamic definition with a fixed date range.
        let request = match spec.saved_report_id {
            Some(report_id) => {
                let url = self.network_url(&["reports", &format!("{report_id}:run")])?;
                self.client.post(url)
            }
            None => {
                let url = self.network_url(&["reports:run"])?;
                self.client.post(url).json(&run_report_body(spec, range))
            }
        };

        let resp = request
            .header(AUTHORIZATION, &self.token)
            .send()
            .await?
            .error_for_status()?;

        let run = resp.json::<RunReportResponse>().await?;
        info!(
            "submitted report job {} for {}",
            run.job_id,
            spec.report_type.token()
        );

        Ok(JobHandle { id: run.job_id })
    }

    async fn await_completion(&self, job: &JobHandle, timeout: Duration) -> Result<(), Error> {
        let started = Instant::now();

        loop {
            match self.poll_status(job).await {
                Ok(status) => match status.status {
                    JobStatus::Completed => return Ok(()),
                    JobStatus::Failed => {
                        return Err(Error::JobFailed {
                            job_id: job.id.clone(),
                            message: status.error.unwrap_or_else(|| "unknown".to_string()),
                        })
                    }
                    JobStatus::Running => {
                        info!("report job {} still running", job.id);
                    }
                },
                // Transient transport failures are not terminal; the
                // wall-clock timeout below bounds how long we keep trying.
                Err(err) => warn!("polling report job {} failed: {}", job.id, err),
            }

            if started.elapsed() >= timeout {
                return Err(Error::JobTimeout {
                    job_id: job.id.clone(),
                    timeout_secs: timeout.as_secs(),
                });
            }

            tokio::time::sleep(self.poll_interval).await;
        }
    }

    async fn fetch_rows(&self, job: &JobHandle) -> Result<Vec<RawRow>, Error> {
        let mut rows = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let mut url = self.network_url(&["jobs", &job.id, "rows"])?;
            if let Some(token) = &page_token {
                url.query_pairs_mut().append_pair("pageToken", token);
            }

            let resp = self
                .client
                .get(url)
                .header(AUTHORIZATION, &self.token)
                .send()
                .await?
                .error_for_status()?;

            let page = resp.json::<FetchRowsResponse>().await?;
            rows.extend(page.rows);

            match page.next_page_token {
                Some(token) if !token.is_empty() => page_token = Some(token),
                _ => break,
            }
        }

        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report_spec::ReportType;
    use chrono::NaiveDate;

    fn test_client(base_url: &str) -> RestReportClient {
        let mut config = Config::for_tests("/tmp");
        config.api_url = base_url.to_string();
        RestReportClient::new(&config)
    }

    fn january() -> DateRange {
        DateRange::new(
            NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            NaiveDate::from_ymd_opt(2024, 1, 31).unwrap(),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_submit_invalid_base_url() {
        let client = test_client("invalid_url");
        let spec = ReportSpec::for_report(ReportType::FillRate);

        let result = client.submit(&spec, &january()).await;
        assert!(matches!(result.unwrap_err(), Error::UrlParsingFailed(_)));
    }

    #[test]
    fn test_network_url_scopes_paths_to_the_network() {
        let client = test_client("https://api.example.com/v1");
        let url = client.network_url(&["reports", "123:run"]).unwrap();
        assert_eq!(
            url.as_str(),
            "https://api.example.com/v1/networks/12345/reports/123:run"
        );
    }

    #[tokio::test]
    async fn test_submit_saved_report_unreachable_host() {
        // The saved-report branch still builds a valid request; the failure
        // here is the transport, not the URL.
        let client = test_client("https://api.example.invalid");
        let mut spec = ReportSpec::for_report(ReportType::GeoMonthly);
        spec.saved_report_id = Some("456");

        let result = client.submit(&spec, &january()).await;
        assert!(matches!(result.unwrap_err(), Error::ApiFailure(_)));
    }

    #[tokio::test]
    async fn test_fetch_rows_unreachable_host() {
        let client = test_client("https://api.example.invalid");
        let job = JobHandle {
            id: "j-1".to_string(),
        };

        let result = client.fetch_rows(&job).await;
        assert!(matches!(result.unwrap_err(), Error::ApiFailure(_)));
    }

    #[tokio::test]
    async fn test_await_completion_times_out_instead_of_hanging() {
        // Every poll against this host fails as a transient transport
        // error, so the wall-clock bound is the only way out.
        let client = test_client("https://api.example.invalid")
            .with_poll_interval(Duration::from_millis(5));
        let job = JobHandle {
            id: "j-2".to_string(),
        };

        let result = client
            .await_completion(&job, Duration::from_millis(20))
            .await;
        assert!(matches!(
            result.unwrap_err(),
            Error::JobTimeout { job_id, .. } if job_id == "j-2"
        ));
    }

    #[test]
    fn test_run_report_body_shape() {
        let spec = ReportSpec::for_report(ReportType::AudienceInterest);
        let body = serde_json::to_value(run_report_body(&spec, &january())).unwrap();

        assert_eq!(
            body["reportDefinition"]["dimensions"],
            serde_json::json!(["MONTH_AND_YEAR", "INTEREST"])
        );
        assert_eq!(
            body["reportDefinition"]["dateRange"]["startDate"],
            "2024-01-01"
        );
        assert_eq!(
            body["reportDefinition"]["dateRange"]["endDate"],
            "2024-01-31"
        );
    }

    #[test]
    fn test_status_response_deserializes_wire_tokens() {
        let running: JobStatusResponse =
            serde_json::from_str(r#"{"status":"RUNNING"}"#).unwrap();
        assert_eq!(running.status, JobStatus::Running);
        assert_eq!(running.error, None);

        let failed: JobStatusResponse =
            serde_json::from_str(r#"{"status":"FAILED","error":"quota exceeded"}"#).unwrap();
        assert_eq!(failed.status, JobStatus::Failed);
        assert_eq!(failed.error.as_deref(), Some("quota exceeded"));
    }

    #[test]
    fn test_rows_page_deserializes_with_and_without_token() {
        let page: FetchRowsResponse = serde_json::from_str(
            r#"{"rows":[{"values":[{"intValue":1510}]}],"nextPageToken":"abc"}"#,
        )
        .unwrap();
        assert_eq!(page.rows.len(), 1);
        assert_eq!(page.next_page_token.as_deref(), Some("abc"));

        let last: FetchRowsResponse = serde_json::from_str(r#"{"rows":[]}"#).unwrap();
        assert!(last.rows.is_empty());
        assert_eq!(last.next_page_token, None);
    }
}
