//! Configuration management for Formins Server

use serde::Deserialize;
use std::env;

use crate::forms::GeometryConfig;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub oracle: OracleConfig,
    pub analysis: AnalysisConfig,
    pub fill: FillConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Largest accepted request body in bytes
    pub max_upload_bytes: usize,
}

/// Document AI processor settings
#[derive(Debug, Clone, Deserialize)]
pub struct OracleConfig {
    pub endpoint: String,
    pub project_id: Option<String>,
    pub location: String,
    pub processor_id: Option<String>,
    pub access_token: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AnalysisConfig {
    /// Scan every page instead of only the first one
    pub all_pages: bool,
    pub geometry: GeometryConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FillConfig {
    /// Flatten filled forms unless the request says otherwise
    pub flatten_by_default: bool,
}

const DEFAULT_MAX_UPLOAD_BYTES: usize = 25 * 1024 * 1024;

impl Default for Config {
    fn default() -> Self {
        Config {
            server: ServerConfig {
                host: "0.0.0.0".to_string(),
                port: 3000,
                max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
            },
            oracle: OracleConfig::default(),
            analysis: AnalysisConfig {
                all_pages: true,
                geometry: GeometryConfig::default(),
            },
            fill: FillConfig {
                flatten_by_default: false,
            },
        }
    }
}

impl Default for OracleConfig {
    fn default() -> Self {
        OracleConfig {
            endpoint: "https://us-documentai.googleapis.com".to_string(),
            project_id: None,
            location: "us".to_string(),
            processor_id: None,
            access_token: None,
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = GeometryConfig::default();
        let geometry = GeometryConfig {
            glyph_width: parse_var("FIELD_GLYPH_WIDTH", defaults.glyph_width)?,
            label_margin: parse_var("FIELD_LABEL_MARGIN", defaults.label_margin)?,
            line_margin: parse_var("FIELD_LINE_MARGIN", defaults.line_margin)?,
            ..defaults
        };

        Ok(Config {
            server: ServerConfig {
                host: env::var("SERVER_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
                port: parse_var("SERVER_PORT", 3000)?,
                max_upload_bytes: parse_var("MAX_UPLOAD_BYTES", DEFAULT_MAX_UPLOAD_BYTES)?,
            },
            oracle: OracleConfig {
                endpoint: env::var("DOCUMENT_AI_ENDPOINT")
                    .unwrap_or_else(|_| "https://us-documentai.googleapis.com".to_string()),
                project_id: env::var("DOCUMENT_AI_PROJECT_ID").ok(),
                location: env::var("DOCUMENT_AI_LOCATION").unwrap_or_else(|_| "us".to_string()),
                processor_id: env::var("DOCUMENT_AI_PROCESSOR_ID").ok(),
                access_token: env::var("DOCUMENT_AI_ACCESS_TOKEN").ok(),
            },
            analysis: AnalysisConfig {
                all_pages: parse_var("ANALYZE_ALL_PAGES", true)?,
                geometry,
            },
            fill: FillConfig {
                flatten_by_default: parse_var("FLATTEN_BY_DEFAULT", false)?,
            },
        })
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for {name}: {value:?}")]
    InvalidValue { name: &'static str, value: String },
}

fn parse_var<T: std::str::FromStr>(name: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(name) {
        Ok(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidValue { name, value }),
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.server.port, 3000);
        assert_eq!(config.oracle.location, "us");
        assert!(config.oracle.access_token.is_none());
        assert!(config.analysis.all_pages);
        assert!(!config.fill.flatten_by_default);
    }

    #[test]
    fn test_parse_var_falls_back_when_unset() {
        let value: u16 = parse_var("FORMINS_TEST_UNSET_VARIABLE", 42).unwrap();
        assert_eq!(value, 42);
    }
}
