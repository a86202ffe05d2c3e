//! Model configuration.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::kanon::DEFAULT_MAX_BLOCK;

/// Knobs for building and sampling a model.
///
/// Every field has a default, so a partial JSON document is enough:
///
/// ```
/// let c = resynth::ModelConfig::from_json_str(r#"{"k_anonymity": 10}"#).unwrap();
/// assert_eq!(c.k_anonymity, 10.0);
/// assert_eq!(c.ngram_size, 2);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ModelConfig {
    /// Minimum aggregate count of every retained value.
    pub k_anonymity: f64,
    /// Dirichlet pseudo-count; 0 samples the empirical tables directly.
    pub hyper_prior: f64,
    /// Draws served from one posterior table before it is redrawn.
    pub posterior_redraw_every: usize,
    /// n-gram size used for de-identification blocking.
    pub ngram_size: usize,
    /// Blocks larger than this are not scanned for merge candidates.
    pub max_block_size: usize,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            k_anonymity: 5.0,
            hyper_prior: 0.0,
            posterior_redraw_every: 1000,
            ngram_size: 2,
            max_block_size: DEFAULT_MAX_BLOCK,
        }
    }
}

impl ModelConfig {
    /// Parse and validate a JSON document.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if !self.k_anonymity.is_finite() || self.k_anonymity <= 0.0 {
            return Err(Error::config(format!(
                "k_anonymity must be finite and > 0 (got {})",
                self.k_anonymity
            )));
        }
        if !self.hyper_prior.is_finite() || self.hyper_prior < 0.0 {
            return Err(Error::config(format!(
                "hyper_prior must be finite and >= 0 (got {})",
                self.hyper_prior
            )));
        }
        if self.posterior_redraw_every == 0 {
            return Err(Error::config("posterior_redraw_every must be >= 1"));
        }
        if self.ngram_size == 0 {
            return Err(Error::config("ngram_size must be >= 1"));
        }
        if self.max_block_size == 0 {
            return Err(Error::config("max_block_size must be >= 1"));
        }
        Ok(())
    }
}
