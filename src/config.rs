use std::env;
use std::path::PathBuf;

#[derive(Debug, Clone)]
pub struct Config {
    pub db_connection_url: Option<String>,

    pub stats_api_base_url: String,
    pub stats_timeout_secs: u64,

    pub identity_filepath: PathBuf,
}

pub fn build() -> Config {
    let db_connection_url = env::var("DATABASE_URL").ok();

    let stats_api_base_url =
        env::var("STATS_API_BASE_URL").unwrap_or_else(|_| "http://localhost:8000".to_string());

    let stats_timeout_secs = env::var("STATS_TIMEOUT_SECS")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(3);

    let identity_filepath = env::var("IDENTITY_FILE")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from(".dugout_player_id"));

    return Config {
        db_connection_url,
        stats_api_base_url,
        stats_timeout_secs,
        identity_filepath,
    };
}
