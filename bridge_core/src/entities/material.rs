//! Materials: elastic and strength parameters referenced by elements.

use serde::{Deserialize, Serialize};

use super::{require_name, require_non_negative, require_positive, Entity, EntityKind, MaterialId};
use crate::errors::{BridgeError, BridgeResult};

/// Material family
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MaterialKind {
    Concrete,
    Steel,
    Other,
}

impl MaterialKind {
    /// Typical Poisson ratio used when the caller supplies none
    pub fn default_poisson_ratio(&self) -> f64 {
        match self {
            MaterialKind::Concrete => 0.2,
            MaterialKind::Steel | MaterialKind::Other => 0.3,
        }
    }

    /// Typical thermal expansion coefficient (1/°C)
    pub fn default_thermal_expansion(&self) -> f64 {
        match self {
            MaterialKind::Concrete => 1.0e-5,
            MaterialKind::Steel | MaterialKind::Other => 1.2e-5,
        }
    }
}

/// A material definition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Material {
    /// Material name, e.g. "C40"
    pub id: MaterialId,

    pub kind: MaterialKind,

    /// Elastic modulus E
    pub elastic_modulus: f64,

    /// Mass density
    pub density: f64,

    /// Poisson ratio ν, 0 ≤ ν < 0.5
    pub poisson_ratio: f64,

    /// Thermal expansion coefficient α
    #[serde(default)]
    pub thermal_expansion: f64,

    /// Characteristic strength (f'c for concrete, fy for steel)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub strength: Option<f64>,

    /// Engine database grade, e.g. "C50" or "Q345"
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub grade: Option<String>,
}

impl Material {
    /// Create a material with typical Poisson ratio and thermal expansion for its kind
    pub fn new(id: &str, kind: MaterialKind, elastic_modulus: f64, density: f64) -> Self {
        Material {
            id: MaterialId::from(id),
            kind,
            elastic_modulus,
            density,
            poisson_ratio: kind.default_poisson_ratio(),
            thermal_expansion: kind.default_thermal_expansion(),
            strength: None,
            grade: None,
        }
    }

    /// Set the characteristic strength (builder pattern)
    pub fn with_strength(mut self, strength: f64) -> Self {
        self.strength = Some(strength);
        self
    }

    /// Set the engine database grade (builder pattern)
    pub fn with_grade(mut self, grade: impl Into<String>) -> Self {
        self.grade = Some(grade.into());
        self
    }
}

impl Entity for Material {
    type Id = MaterialId;
    const KIND: EntityKind = EntityKind::Material;

    fn id(&self) -> &MaterialId {
        &self.id
    }

    fn validate(&self) -> BridgeResult<()> {
        require_name(EntityKind::Material, "id", &self.id.0)?;
        require_positive(EntityKind::Material, "elastic_modulus", self.elastic_modulus)?;
        require_positive(EntityKind::Material, "density", self.density)?;
        require_non_negative(EntityKind::Material, "poisson_ratio", self.poisson_ratio)?;
        if self.poisson_ratio >= 0.5 {
            return Err(BridgeError::schema(
                "material",
                "poisson_ratio",
                format!("must be below 0.5, got {}", self.poisson_ratio),
            ));
        }
        require_non_negative(EntityKind::Material, "thermal_expansion", self.thermal_expansion)?;
        if let Some(strength) = self.strength {
            require_positive(EntityKind::Material, "strength", strength)?;
        }
        if let Some(grade) = &self.grade {
            require_name(EntityKind::Material, "grade", grade)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_material_defaults() {
        let c40 = Material::new("C40", MaterialKind::Concrete, 3.25e10, 2500.0);
        assert_eq!(c40.poisson_ratio, 0.2);
        assert!(c40.validate().is_ok());
    }

    #[test]
    fn test_non_positive_modulus_rejected() {
        let bad = Material::new("X", MaterialKind::Steel, 0.0, 7850.0);
        match bad.validate().unwrap_err() {
            BridgeError::Schema { field, .. } => assert_eq!(field, "elastic_modulus"),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_poisson_upper_bound() {
        let mut steel = Material::new("Q345", MaterialKind::Steel, 2.06e11, 7850.0);
        steel.poisson_ratio = 0.5;
        assert!(steel.validate().is_err());
    }

    #[test]
    fn test_unknown_kind_fails_deserialization() {
        let json = r#"{"id":"W","kind":"timber","elastic_modulus":1.0,"density":1.0,"poisson_ratio":0.3}"#;
        assert!(serde_json::from_str::<Material>(json).is_err());
    }
}
