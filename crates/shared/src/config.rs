//! Configuration types for Accord

use serde::{Deserialize, Serialize};

/// Spotlighting strategy applied to untrusted counterpart text before it
/// enters a judgment prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpotlightMode {
    /// Untrusted text is passed through unchanged.
    #[default]
    Passthrough,
    /// Untrusted text is wrapped in `<< >>` delimiters.
    Delimiting,
    /// Word boundaries in the untrusted text are replaced with `^` markers.
    Datamarking,
    /// Untrusted text is base64-encoded.
    Encoding,
}

/// Platform configuration, loaded from a JSON file or built in code.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccordConfig {
    /// Oracle names whose verdict marks a direction as negotiated. A
    /// direction missing a verdict from any of these is re-attempted by the
    /// matching algorithm.
    #[serde(default = "default_primary_oracles")]
    pub primary_oracles: Vec<String>,

    /// Bound on verifier retry rounds per direction; after the last round
    /// the response is recorded as-is so matching always terminates.
    #[serde(default = "default_verifier_rounds")]
    pub max_verifier_rounds: u32,

    /// Bound on structured-extraction attempts during setup.
    #[serde(default = "default_extract_attempts")]
    pub max_extract_attempts: u32,

    /// Timeout for one oracle-backed round trip, in seconds. A direction
    /// whose call times out records `Refused`, never stays pending.
    #[serde(default = "default_oracle_timeout")]
    pub oracle_timeout_secs: u64,

    /// Cap on concurrently in-flight pairing round trips during one
    /// matching fan-out.
    #[serde(default = "default_match_concurrency")]
    pub match_concurrency: usize,

    /// Spotlighting strategy for untrusted counterpart text.
    #[serde(default)]
    pub spotlight: SpotlightMode,

    /// Screen requester public information for injection attempts before
    /// contacting the receiver.
    #[serde(default)]
    pub injection_screen: bool,

    /// Re-validate verdict rationales with the orchestrator's oracle.
    #[serde(default)]
    pub verify_responses: bool,
}

fn default_primary_oracles() -> Vec<String> {
    vec!["default".to_string()]
}

fn default_verifier_rounds() -> u32 {
    3
}

fn default_extract_attempts() -> u32 {
    3
}

fn default_oracle_timeout() -> u64 {
    30
}

fn default_match_concurrency() -> usize {
    8
}

impl Default for AccordConfig {
    fn default() -> Self {
        Self {
            primary_oracles: default_primary_oracles(),
            max_verifier_rounds: default_verifier_rounds(),
            max_extract_attempts: default_extract_attempts(),
            oracle_timeout_secs: default_oracle_timeout(),
            match_concurrency: default_match_concurrency(),
            spotlight: SpotlightMode::default(),
            injection_screen: false,
            verify_responses: false,
        }
    }
}

impl AccordConfig {
    /// Load configuration from a JSON file.
    pub fn from_file(path: &std::path::Path) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject configurations the matching algorithm cannot run with.
    pub fn validate(&self) -> crate::Result<()> {
        if self.primary_oracles.is_empty() {
            return Err(crate::AccordError::Config(
                "at least one primary oracle must be configured".to_string(),
            ));
        }
        if self.match_concurrency == 0 {
            return Err(crate::AccordError::Config(
                "matchConcurrency must be at least 1".to_string(),
            ));
        }
        if self.oracle_timeout_secs == 0 {
            return Err(crate::AccordError::Config(
                "oracleTimeoutSecs must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}
