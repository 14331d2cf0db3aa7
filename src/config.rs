use clap::Args as ClapArgs;

const DEFAULT_API_URL: &str = "https://admanager.googleapis.com/v1";
const DEFAULT_WAREHOUSE_ROOT: &str = "./warehouse";
const DEFAULT_DATASET: &str = "gam_data";

#[derive(ClapArgs)]
pub struct Config {
    #[arg(long, default_value = DEFAULT_API_URL, env = "API_URL")]
    pub(crate) api_url: String,

    #[arg(long, env = "API_TOKEN")]
    pub(crate) api_token: String,

    #[arg(long, env = "NETWORK_CODE")]
    pub(crate) network_code: String,

    #[arg(long, default_value = DEFAULT_WAREHOUSE_ROOT, env = "WAREHOUSE_ROOT")]
    pub(crate) warehouse_root: String,

    #[arg(long, default_value = DEFAULT_DATASET, env = "DATASET_ID")]
    pub(crate) dataset: String,

    #[arg(long, default_value_t = 10, env = "POLL_INTERVAL_SECS")]
    pub(crate) poll_interval_secs: u64,

    #[arg(long, default_value_t = 600, env = "JOB_TIMEOUT_SECS")]
    pub(crate) job_timeout_secs: u64,
}

#[cfg(test)]
impl Config {
    pub(crate) fn for_tests(warehouse_root: &str) -> Self {
        Config {
            api_url: "https://api.example.com".to_string(),
            api_token: "test_token".to_string(),
            network_code: "12345".to_string(),
            warehouse_root: warehouse_root.to_string(),
            dataset: DEFAULT_DATASET.to_string(),
            poll_interval_secs: 10,
            job_timeout_secs: 600,
        }
    }
}
