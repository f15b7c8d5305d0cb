//! Cross-sections and plate thicknesses.
//!
//! Only the shape descriptor is stored; section properties beyond what the
//! caller supplies are computed by the analysis engine.

use serde::{Deserialize, Serialize};

use super::{require_name, require_non_negative, require_positive, Entity, EntityKind, SectionId};
use crate::errors::{BridgeError, BridgeResult};

/// Which element kinds a section can serve
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SectionClass {
    /// Beam, truss and cable elements
    Line,
    /// Plate elements
    Plate,
}

/// Section shape descriptor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "shape", rename_all = "snake_case")]
pub enum SectionShape {
    Rectangle {
        width: f64,
        height: f64,
    },
    Circle {
        diameter: f64,
    },
    ISection {
        depth: f64,
        flange_width: f64,
        flange_thickness: f64,
        web_thickness: f64,
    },
    /// Concrete box girder
    BoxGirder {
        height: f64,
        width: f64,
        cells: u32,
    },
    /// Explicit mechanical properties
    General {
        area: f64,
        iy: f64,
        iz: f64,
        #[serde(default)]
        j: f64,
    },
    /// Plate thickness
    Plate {
        thickness: f64,
    },
}

impl SectionShape {
    pub fn class(&self) -> SectionClass {
        match self {
            SectionShape::Plate { .. } => SectionClass::Plate,
            _ => SectionClass::Line,
        }
    }

    /// Short name for listings
    pub fn display_name(&self) -> &'static str {
        match self {
            SectionShape::Rectangle { .. } => "Rectangle",
            SectionShape::Circle { .. } => "Circle",
            SectionShape::ISection { .. } => "I-Section",
            SectionShape::BoxGirder { .. } => "Box Girder",
            SectionShape::General { .. } => "General",
            SectionShape::Plate { .. } => "Plate",
        }
    }
}

/// A cross-section definition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Section {
    /// Section name, e.g. "S1"
    pub id: SectionId,

    pub shape: SectionShape,
}

impl Section {
    pub fn new(id: &str, shape: SectionShape) -> Self {
        Section {
            id: SectionId::from(id),
            shape,
        }
    }

    /// Solid rectangle
    pub fn rectangle(id: &str, width: f64, height: f64) -> Self {
        Section::new(id, SectionShape::Rectangle { width, height })
    }

    /// Plate thickness
    pub fn plate(id: &str, thickness: f64) -> Self {
        Section::new(id, SectionShape::Plate { thickness })
    }

    pub fn class(&self) -> SectionClass {
        self.shape.class()
    }
}

impl Entity for Section {
    type Id = SectionId;
    const KIND: EntityKind = EntityKind::Section;

    fn id(&self) -> &SectionId {
        &self.id
    }

    fn validate(&self) -> BridgeResult<()> {
        const KIND: EntityKind = EntityKind::Section;
        require_name(KIND, "id", &self.id.0)?;

        match &self.shape {
            SectionShape::Rectangle { width, height } => {
                require_positive(KIND, "width", *width)?;
                require_positive(KIND, "height", *height)?;
            }
            SectionShape::Circle { diameter } => {
                require_positive(KIND, "diameter", *diameter)?;
            }
            SectionShape::ISection {
                depth,
                flange_width,
                flange_thickness,
                web_thickness,
            } => {
                require_positive(KIND, "depth", *depth)?;
                require_positive(KIND, "flange_width", *flange_width)?;
                require_positive(KIND, "flange_thickness", *flange_thickness)?;
                require_positive(KIND, "web_thickness", *web_thickness)?;
                if 2.0 * flange_thickness >= *depth {
                    return Err(BridgeError::schema("section", "flange_thickness", "two flanges must fit within the depth"));
                }
                if web_thickness >= flange_width {
                    return Err(BridgeError::schema("section", "web_thickness", "must be less than flange_width"));
                }
            }
            SectionShape::BoxGirder { height, width, cells } => {
                require_positive(KIND, "height", *height)?;
                require_positive(KIND, "width", *width)?;
                if *cells == 0 {
                    return Err(BridgeError::schema("section", "cells", "box girder needs at least one cell"));
                }
            }
            SectionShape::General { area, iy, iz, j } => {
                require_positive(KIND, "area", *area)?;
                require_positive(KIND, "iy", *iy)?;
                require_positive(KIND, "iz", *iz)?;
                require_non_negative(KIND, "j", *j)?;
            }
            SectionShape::Plate { thickness } => {
                require_positive(KIND, "thickness", *thickness)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_section_classes() {
        assert_eq!(Section::rectangle("S1", 0.5, 1.5).class(), SectionClass::Line);
        assert_eq!(Section::plate("P1", 0.25).class(), SectionClass::Plate);
    }

    #[test]
    fn test_section_json_shape() {
        let section: Section =
            serde_json::from_str(r#"{"id":"S1","shape":{"shape":"box_girder","height":2.0,"width":12.0,"cells":2}}"#)
                .unwrap();
        assert_eq!(section.shape.display_name(), "Box Girder");
        assert!(section.validate().is_ok());
    }

    #[test]
    fn test_invalid_dimensions() {
        assert!(Section::rectangle("S1", -0.5, 1.5).validate().is_err());

        let i = Section::new(
            "I1",
            SectionShape::ISection {
                depth: 0.3,
                flange_width: 0.2,
                flange_thickness: 0.2,
                web_thickness: 0.01,
            },
        );
        assert!(i.validate().is_err());

        let boxed = Section::new("B1", SectionShape::BoxGirder { height: 2.0, width: 10.0, cells: 0 });
        assert!(boxed.validate().is_err());
    }
}
