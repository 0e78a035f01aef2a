//! Pipeline configuration.
//!
//! Thresholds that earlier iterations of the generator treated inconsistently
//! (batch size, field caps, truncation length, minimum lengths) live here as
//! defaults rather than constants.

use crate::error::{Result, SdsError};
use crate::llm::LlmConfig;
use std::time::Duration;

/// Base URLs for the external sources. Overridable so tests can point at a
/// local server.
#[derive(Debug, Clone)]
pub struct SourceUrls {
    pub pubchem_rest: String,
    pub pubchem_view: String,
    pub chemidplus: String,
    pub nist_webbook: String,
    pub echa: String,
}

impl Default for SourceUrls {
    fn default() -> Self {
        Self {
            pubchem_rest: "https://pubchem.ncbi.nlm.nih.gov/rest/pug".to_string(),
            pubchem_view: "https://pubchem.ncbi.nlm.nih.gov/rest/pug_view".to_string(),
            chemidplus: "https://chem.nlm.nih.gov/chemidplus/rn".to_string(),
            nist_webbook: "https://webbook.nist.gov/cgi/cbook.cgi".to_string(),
            echa: "https://echa.europa.eu".to_string(),
        }
    }
}

/// Settings for one SDS generation pipeline.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Deadline for a single compound-database call
    pub lookup_timeout: Duration,
    /// Deadline for a whole adapter fetch
    pub source_timeout: Duration,
    /// Deadline for one generative batch
    pub generative_timeout: Duration,
    /// Query external sources at all (false = offline, structure-only)
    pub enable_external_sources: bool,
    /// Minimum trimmed length for any fused value
    pub min_value_len: usize,
    /// Fields longer than this are truncated with an ellipsis
    pub max_value_len: usize,
    /// Fields per generative prompt
    pub backfill_batch_size: usize,
    /// Upper bound of fields sent to the generative service per request
    pub backfill_max_fields: usize,
    /// Minimum cleaned length for a generated value
    pub backfill_min_len: usize,
    /// Concurrent generative batches
    pub backfill_concurrency: usize,
    /// Concurrent requests per external source
    pub source_concurrency: usize,
    /// Lifetime of cached adapter contributions
    pub cache_ttl: Duration,
    /// Generative service; `None` means canned fallback only
    pub llm: Option<LlmConfig>,
    pub urls: SourceUrls,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            lookup_timeout: Duration::from_secs(10),
            source_timeout: Duration::from_secs(15),
            generative_timeout: Duration::from_secs(45),
            enable_external_sources: true,
            min_value_len: 3,
            max_value_len: 500,
            backfill_batch_size: 3,
            backfill_max_fields: 20,
            backfill_min_len: 5,
            backfill_concurrency: 4,
            source_concurrency: 4,
            cache_ttl: Duration::from_secs(600),
            llm: None,
            urls: SourceUrls::default(),
        }
    }
}

impl PipelineConfig {
    /// Configuration with every external source disabled.
    pub fn offline() -> Self {
        Self {
            enable_external_sources: false,
            ..Self::default()
        }
    }

    /// Reject settings that would make the pipeline misbehave.
    pub fn validate(&self) -> Result<()> {
        if self.backfill_batch_size == 0 {
            return Err(SdsError::Config("backfill_batch_size must be > 0".into()));
        }
        if self.backfill_concurrency == 0 || self.source_concurrency == 0 {
            return Err(SdsError::Config("concurrency limits must be > 0".into()));
        }
        if self.min_value_len == 0 {
            return Err(SdsError::Config("min_value_len must be > 0".into()));
        }
        // Truncation appends "...", which must still leave room for content
        if self.max_value_len <= self.min_value_len + 3 {
            return Err(SdsError::Config(format!(
                "max_value_len ({}) must exceed min_value_len + 3",
                self.max_value_len
            )));
        }
        if self.lookup_timeout.is_zero()
            || self.source_timeout.is_zero()
            || self.generative_timeout.is_zero()
        {
            return Err(SdsError::Config("timeouts must be non-zero".into()));
        }
        if let Some(llm) = &self.llm {
            llm.validate()?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        assert!(PipelineConfig::default().validate().is_ok());
        assert!(!PipelineConfig::offline().enable_external_sources);
    }

    #[test]
    fn test_rejects_zero_batch() {
        let config = PipelineConfig {
            backfill_batch_size: 0,
            ..PipelineConfig::default()
        };
        assert!(matches!(config.validate(), Err(SdsError::Config(_))));
    }

    #[test]
    fn test_rejects_tiny_truncation() {
        let config = PipelineConfig {
            max_value_len: 5,
            ..PipelineConfig::default()
        };
        assert!(config.validate().is_err());
    }
}
