//! Analysis configuration: what the engine should run on the next submission.

use serde::{Deserialize, Serialize};

use crate::errors::{BridgeError, BridgeResult};

/// Analysis type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnalysisKind {
    #[default]
    Static,
    StagedConstruction,
    Modal,
}

/// Equation solver requested from the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SolverKind {
    #[default]
    Sparse,
    VariableBandwidth,
}

/// One term of the active load-case combination
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoadCombinationTerm {
    pub case: String,
    #[serde(default = "unit_factor")]
    pub factor: f64,
}

fn unit_factor() -> f64 {
    1.0
}

/// Analysis configuration (one per model)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisConfig {
    #[serde(default)]
    pub kind: AnalysisKind,

    #[serde(default)]
    pub solver: SolverKind,

    /// Include creep and shrinkage in staged analysis
    #[serde(default)]
    pub creep: bool,

    /// Number of modes for modal analysis
    #[serde(default = "default_modes")]
    pub modes: u32,

    /// Active load-case combination; empty means every case with factor 1.0
    #[serde(default)]
    pub combination: Vec<LoadCombinationTerm>,
}

fn default_modes() -> u32 {
    10
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        AnalysisConfig {
            kind: AnalysisKind::Static,
            solver: SolverKind::Sparse,
            creep: false,
            modes: default_modes(),
            combination: Vec::new(),
        }
    }
}

impl AnalysisConfig {
    pub fn new(kind: AnalysisKind) -> Self {
        AnalysisConfig {
            kind,
            ..AnalysisConfig::default()
        }
    }

    /// Add a combination term (builder pattern)
    pub fn with_case(mut self, case: &str, factor: f64) -> Self {
        self.combination.push(LoadCombinationTerm {
            case: case.to_string(),
            factor,
        });
        self
    }

    pub fn validate(&self) -> BridgeResult<()> {
        if self.kind == AnalysisKind::Modal && self.modes == 0 {
            return Err(BridgeError::schema("analysis", "modes", "modal analysis needs at least one mode"));
        }
        if self.creep && self.kind != AnalysisKind::StagedConstruction {
            return Err(BridgeError::schema("analysis", "creep", "creep applies to staged-construction analysis only"));
        }
        for (i, term) in self.combination.iter().enumerate() {
            if term.case.trim().is_empty() {
                return Err(BridgeError::schema("analysis", "combination.case", "must not be empty"));
            }
            if !term.factor.is_finite() {
                return Err(BridgeError::schema("analysis", "combination.factor", "must be finite"));
            }
            if self.combination[..i].iter().any(|t| t.case == term.case) {
                return Err(BridgeError::schema(
                    "analysis",
                    "combination",
                    format!("load case '{}' listed twice", term.case),
                ));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = AnalysisConfig::default();
        assert_eq!(config.kind, AnalysisKind::Static);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_modal_needs_modes() {
        let mut config = AnalysisConfig::new(AnalysisKind::Modal);
        config.modes = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_duplicate_combination_case() {
        let config = AnalysisConfig::default().with_case("Dead", 1.2).with_case("Dead", 1.0);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_from_partial_json() {
        let config: AnalysisConfig = serde_json::from_str(r#"{"kind":"staged_construction","creep":true}"#).unwrap();
        assert_eq!(config.modes, 10);
        assert!(config.validate().is_ok());
    }
}
