//! Append-only provenance chains
//!
//! Every trace carries an ordered record of how its data was obtained and
//! transformed. Stages are recorded once and never rewritten.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One recorded processing stage
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProvenanceStage {
    /// Stage name, e.g. `fetch`, `decode`, `normalize`, `differential`
    pub stage_name: String,
    /// Parameters the stage ran with (conversion factors, sample counts)
    pub parameters: BTreeMap<String, String>,
    /// When the stage completed
    pub timestamp: DateTime<Utc>,
    /// Where the payload came from, when known
    pub source_locator: Option<String>,
}

impl ProvenanceStage {
    /// Create a stage stamped with the current time
    #[must_use]
    pub fn now(stage_name: impl Into<String>) -> Self {
        Self {
            stage_name: stage_name.into(),
            parameters: BTreeMap::new(),
            timestamp: Utc::now(),
            source_locator: None,
        }
    }

    /// Attach a parameter
    #[must_use]
    pub fn with_parameter(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.parameters.insert(key.into(), value.into());
        self
    }

    /// Attach the source locator
    #[must_use]
    pub fn with_locator(mut self, locator: impl Into<String>) -> Self {
        self.source_locator = Some(locator.into());
        self
    }
}

/// Ordered, append-only list of stages
///
/// The inner vector is private; the only mutation is [`Provenance::record`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Provenance(Vec<ProvenanceStage>);

impl Provenance {
    /// Create an empty chain
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a stage
    pub fn record(&mut self, stage: ProvenanceStage) {
        self.0.push(stage);
    }

    /// Recorded stages, oldest first
    #[inline]
    #[must_use]
    pub fn stages(&self) -> &[ProvenanceStage] {
        &self.0
    }

    /// Number of recorded stages
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether no stage has been recorded yet
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provenance_records_in_order() {
        let mut chain = Provenance::new();
        chain.record(ProvenanceStage::now("fetch"));
        chain.record(ProvenanceStage::now("decode"));
        chain.record(ProvenanceStage::now("normalize"));

        let names: Vec<_> = chain.stages().iter().map(|s| s.stage_name.as_str()).collect();
        assert_eq!(names, ["fetch", "decode", "normalize"]);
    }

    #[test]
    fn stage_builder_attaches_parameters() {
        let stage = ProvenanceStage::now("normalize")
            .with_parameter("path_length_cm", "10")
            .with_locator("upload://spectrum.txt");

        assert_eq!(stage.parameters.get("path_length_cm").unwrap(), "10");
        assert_eq!(stage.source_locator.as_deref(), Some("upload://spectrum.txt"));
    }

    #[test]
    fn provenance_serde_round_trip() {
        let mut chain = Provenance::new();
        chain.record(ProvenanceStage::now("decode").with_parameter("format", "columns"));

        let json = serde_json::to_string(&chain).unwrap();
        let decoded: Provenance = serde_json::from_str(&json).unwrap();
        assert_eq!(chain, decoded);
    }
}
