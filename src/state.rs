//! Application state management

use std::sync::Arc;

use crate::config::Config;
use crate::forms::{AnalyzerOptions, FormAnalyzer, KeywordTable};
use crate::oracle::{DocumentAiProvider, DocumentAnalyzer};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    pub config: Config,
    pub analyzer: FormAnalyzer,
}

impl AppState {
    /// Create the state with the Document AI oracle from `config`
    pub fn new(config: Config) -> Self {
        let oracle = Arc::new(DocumentAiProvider::new(config.oracle.clone()));
        Self::with_oracle(config, oracle)
    }

    /// Create the state around an already-built oracle
    pub fn with_oracle(config: Config, oracle: Arc<dyn DocumentAnalyzer>) -> Self {
        let analyzer = FormAnalyzer::new(oracle, AnalyzerOptions::from_config(&config.analysis));
        Self {
            inner: Arc::new(AppStateInner { config, analyzer }),
        }
    }

    /// Get the configuration
    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    /// Get the form analyzer
    pub fn analyzer(&self) -> &FormAnalyzer {
        &self.inner.analyzer
    }

    /// Keyword table used to classify labels and native field names
    pub fn keywords(&self) -> &KeywordTable {
        &self.inner.analyzer.options().keywords
    }
}
