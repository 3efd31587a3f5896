use clap::Parser;
use emberlog_core::origin::OriginPolicy;
use emberlog_core::ratelimit::RateLimitPolicy;
use emberlog_core::upload::UploadPolicy;
use std::path::PathBuf;
use std::time::Duration;

/// Cap for JSON and form bodies.
pub const JSON_BODY_LIMIT: usize = 1024 * 1024;

#[derive(Parser, Debug)]
#[command(name = "emberlog")]
#[command(about = "Fire incident reporting API with file-backed storage and image uploads")]
pub struct Cli {
    /// HTTP port
    #[arg(long, env = "PORT", default_value_t = 3001)]
    pub port: u16,
    /// Bind address
    #[arg(long, env = "HOST", default_value = "0.0.0.0")]
    pub host: String,
    /// JSON file holding the incident records
    #[arg(long, env = "DATA_FILE", default_value = "incidents.json")]
    pub data_file: PathBuf,
    /// Directory for uploaded images, served under /uploads
    #[arg(long, env = "UPLOAD_DIR", default_value = "uploads")]
    pub upload_dir: PathBuf,
    /// Maximum size of one uploaded file in bytes
    #[arg(long, env = "MAX_FILE_SIZE", default_value_t = emberlog_core::upload::DEFAULT_MAX_FILE_SIZE)]
    pub max_file_size: u64,
    /// Maximum number of files in one request
    #[arg(long, env = "MAX_FILES_PER_REQUEST", default_value_t = emberlog_core::upload::DEFAULT_MAX_FILES)]
    pub max_files_per_request: usize,
    /// Allowed upload extensions (comma-separated, e.g. ".jpg,.png")
    #[arg(long, env = "ALLOWED_FILE_TYPES")]
    pub allowed_file_types: Option<String>,
    /// Extra CORS origins (comma-separated)
    #[arg(long, env = "ALLOWED_ORIGINS", value_delimiter = ',')]
    pub allowed_origins: Vec<String>,
    /// Bearer token required for mutating requests
    #[arg(long, env = "API_TOKEN", hide_env_values = true)]
    pub api_token: Option<String>,
    #[arg(long, env = "RATE_LIMIT_POINTS", default_value_t = RateLimitPolicy::GENERAL.points)]
    pub rate_limit_points: u32,
    #[arg(long, env = "RATE_LIMIT_WINDOW_SECS", default_value_t = RateLimitPolicy::GENERAL.window.as_secs())]
    pub rate_limit_window_secs: u64,
    #[arg(long, env = "RATE_LIMIT_BLOCK_SECS", default_value_t = RateLimitPolicy::GENERAL.block.as_secs())]
    pub rate_limit_block_secs: u64,
    #[arg(long, env = "AUTH_RATE_LIMIT_POINTS", default_value_t = RateLimitPolicy::AUTH.points)]
    pub auth_rate_limit_points: u32,
    #[arg(long, env = "AUTH_RATE_LIMIT_WINDOW_SECS", default_value_t = RateLimitPolicy::AUTH.window.as_secs())]
    pub auth_rate_limit_window_secs: u64,
    #[arg(long, env = "AUTH_RATE_LIMIT_BLOCK_SECS", default_value_t = RateLimitPolicy::AUTH.block.as_secs())]
    pub auth_rate_limit_block_secs: u64,
    /// Emit logs as JSON lines
    #[arg(long, env = "LOG_JSON")]
    pub log_json: bool,
}

/// Resolved runtime settings.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub bind_addr: String,
    pub data_file: PathBuf,
    pub upload_dir: PathBuf,
    pub upload: UploadPolicy,
    pub origins: OriginPolicy,
    pub api_token: Option<String>,
    pub general_limit: RateLimitPolicy,
    pub auth_limit: RateLimitPolicy,
    pub body_limit: usize,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:3001".to_string(),
            data_file: PathBuf::from("incidents.json"),
            upload_dir: PathBuf::from("uploads"),
            upload: UploadPolicy::default(),
            origins: OriginPolicy::default(),
            api_token: None,
            general_limit: RateLimitPolicy::GENERAL,
            auth_limit: RateLimitPolicy::AUTH,
            body_limit: JSON_BODY_LIMIT,
        }
    }
}

impl From<&Cli> for AppConfig {
    fn from(cli: &Cli) -> Self {
        let mut upload = UploadPolicy {
            max_file_size: cli.max_file_size,
            max_files: cli.max_files_per_request,
            ..UploadPolicy::default()
        };
        if let Some(raw) = &cli.allowed_file_types {
            upload = upload.with_allowed_extensions(raw);
        }

        Self {
            bind_addr: format!("{}:{}", cli.host, cli.port),
            data_file: cli.data_file.clone(),
            upload_dir: cli.upload_dir.clone(),
            upload,
            origins: OriginPolicy::with_extra(&cli.allowed_origins),
            api_token: cli.api_token.clone().filter(|t| !t.is_empty()),
            general_limit: RateLimitPolicy {
                points: cli.rate_limit_points,
                window: Duration::from_secs(cli.rate_limit_window_secs),
                block: Duration::from_secs(cli.rate_limit_block_secs),
            },
            auth_limit: RateLimitPolicy {
                points: cli.auth_rate_limit_points,
                window: Duration::from_secs(cli.auth_rate_limit_window_secs),
                block: Duration::from_secs(cli.auth_rate_limit_block_secs),
            },
            body_limit: JSON_BODY_LIMIT,
        }
    }
}
