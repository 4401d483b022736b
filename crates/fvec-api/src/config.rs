//! API configuration.

use fvec_pipeline::PipelineConfig;

/// API server configuration.
#[derive(Debug, Clone)]
pub struct ApiConfig {
    /// Server host
    pub host: String,
    /// Server port
    pub port: u16,
    /// Shared secret expected in `X-API-Key`
    pub api_key: String,
    /// CORS origins
    pub cors_origins: Vec<String>,
    /// Lines returned as `log_tail` by the status endpoint
    pub log_tail_lines: usize,
    /// Pipeline settings, shared with the driver
    pub pipeline: PipelineConfig,
}

impl ApiConfig {
    /// Create config from environment variables.
    ///
    /// `API_KEY` is mandatory; an unauthenticated control plane is a
    /// configuration error.
    pub fn from_env() -> Result<Self, String> {
        let api_key = std::env::var("API_KEY")
            .ok()
            .filter(|s| !s.is_empty())
            .ok_or_else(|| "API_KEY not set".to_string())?;

        Ok(Self {
            host: std::env::var("API_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: std::env::var("API_PORT")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(8000),
            api_key,
            cors_origins: std::env::var("CORS_ORIGINS")
                .map(|s| s.split(',').map(|s| s.trim().to_string()).collect())
                .unwrap_or_else(|_| vec!["*".to_string()]),
            log_tail_lines: std::env::var("API_LOG_TAIL_LINES")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(50),
            pipeline: PipelineConfig::from_env(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_api_key_is_fatal() {
        // from_env reads the process env; with no API_KEY set it must fail.
        std::env::remove_var("API_KEY");
        assert!(ApiConfig::from_env().is_err());
    }
}
