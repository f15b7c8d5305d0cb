//! # Entity Schemas
//!
//! Typed representations of everything a bridge model contains. Each entity
//! validates its own fields without looking at the rest of the model; the
//! cross-entity rules live in [`crate::registry`] and [`crate::validation`].
//!
//! ## Identity
//!
//! | Entity              | ID                       |
//! |---------------------|--------------------------|
//! | [`Node`]            | [`NodeId`] (integer)     |
//! | [`Element`]         | [`ElementId`] (integer)  |
//! | [`Material`]        | [`MaterialId`] (name)    |
//! | [`Section`]         | [`SectionId`] (name)     |
//! | [`Support`]         | [`SupportId`] (integer)  |
//! | [`Load`]            | [`LoadId`] (integer)     |
//! | [`ConstructionStage`] | [`StageIndex`] (1-based) |
//! | [`Group`]           | [`GroupName`]            |
//! | [`Link`]            | [`LinkId`] (integer)     |
//! | [`TendonProperty`]  | [`TendonPropertyId`]     |
//! | [`Tendon`]          | [`TendonName`]           |
//! | [`Vehicle`]         | [`VehicleName`]          |
//! | [`Lane`]            | [`LaneName`]             |
//! | [`LiveLoadCase`]    | [`LiveCaseName`]         |
//!
//! ## Example
//!
//! ```rust
//! use bridge_core::entities::{Entity, Node, NodeId};
//!
//! let node = Node::new(1, 10.0, 0.0, 0.0);
//! assert!(node.validate().is_ok());
//! assert_eq!(node.id(), &NodeId(1));
//! assert_eq!(node.entity_ref().to_string(), "node 1");
//! ```

pub mod analysis;
pub mod element;
pub mod group;
pub mod link;
pub mod load;
pub mod material;
pub mod node;
pub mod section;
pub mod stage;
pub mod support;
pub mod tendon;
pub mod traffic;

use std::fmt;
use std::str::FromStr;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::errors::{BridgeError, BridgeResult};

// Re-export commonly used types
pub use analysis::{AnalysisConfig, AnalysisKind, LoadCombinationTerm, SolverKind};
pub use element::{Element, ElementKind};
pub use group::{Group, GroupKind};
pub use link::{Link, LinkKind};
pub use load::{Load, LoadDirection, LoadKind};
pub use material::{Material, MaterialKind};
pub use node::{LocalAxes, Node};
pub use section::{Section, SectionClass, SectionShape};
pub use stage::{Activation, Activity, ConstructionStage, StageAction, StageEvent, StageLog, StageTarget};
pub use support::{Fixity, Restraint, Support};
pub use tendon::{Jacking, Tendon, TendonProperty, Tensioning};
pub use traffic::{DesignCode, Lane, LiveLoadCase, Vehicle};

// ============================================================================
// Entity Kinds and References
// ============================================================================

/// Every kind of entity the registry stores
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Node,
    Element,
    Material,
    Section,
    Support,
    Load,
    Stage,
    Group,
    Link,
    TendonProperty,
    Tendon,
    Vehicle,
    Lane,
    LiveLoadCase,
}

impl EntityKind {
    pub const ALL: [EntityKind; 14] = [
        EntityKind::Node,
        EntityKind::Element,
        EntityKind::Material,
        EntityKind::Section,
        EntityKind::Support,
        EntityKind::Load,
        EntityKind::Stage,
        EntityKind::Group,
        EntityKind::Link,
        EntityKind::TendonProperty,
        EntityKind::Tendon,
        EntityKind::Vehicle,
        EntityKind::Lane,
        EntityKind::LiveLoadCase,
    ];

    /// Lowercase name used in messages and tool arguments
    pub fn name(&self) -> &'static str {
        match self {
            EntityKind::Node => "node",
            EntityKind::Element => "element",
            EntityKind::Material => "material",
            EntityKind::Section => "section",
            EntityKind::Support => "support",
            EntityKind::Load => "load",
            EntityKind::Stage => "stage",
            EntityKind::Group => "group",
            EntityKind::Link => "link",
            EntityKind::TendonProperty => "tendon_property",
            EntityKind::Tendon => "tendon",
            EntityKind::Vehicle => "vehicle",
            EntityKind::Lane => "lane",
            EntityKind::LiveLoadCase => "live_load_case",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for EntityKind {
    type Err = BridgeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        EntityKind::ALL
            .iter()
            .copied()
            .find(|kind| kind.name() == s)
            .ok_or_else(|| {
                let known = EntityKind::ALL.map(|kind| kind.name()).join(", ");
                BridgeError::schema("arguments", "kind", format!("unknown entity kind '{s}' (expected one of {known})"))
            })
    }
}

/// A kind-qualified pointer to an entity, used in errors and validation findings
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EntityRef {
    pub kind: EntityKind,
    pub id: String,
}

impl EntityRef {
    pub fn new(kind: EntityKind, id: impl ToString) -> Self {
        EntityRef {
            kind,
            id: id.to_string(),
        }
    }
}

impl fmt::Display for EntityRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.kind, self.id)
    }
}

// ============================================================================
// Identifiers
// ============================================================================

/// Integer IDs can be handed out in sequence when the caller omits one
pub trait SequentialId: Sized {
    fn first() -> Self;

    /// The following ID, or `None` once the ID space is used up
    fn next(&self) -> Option<Self>;
}

macro_rules! integer_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub u32);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<u32> for $name {
            fn from(id: u32) -> Self {
                $name(id)
            }
        }

        impl From<$name> for u32 {
            fn from(id: $name) -> Self {
                id.0
            }
        }

        impl SequentialId for $name {
            fn first() -> Self {
                $name(1)
            }

            fn next(&self) -> Option<Self> {
                self.0.checked_add(1).map($name)
            }
        }
    };
}

macro_rules! named_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(name: &str) -> Self {
                $name(name.to_string())
            }
        }

        impl From<String> for $name {
            fn from(name: String) -> Self {
                $name(name)
            }
        }
    };
}

integer_id!(
    /// Node identifier
    NodeId
);
integer_id!(
    /// Element identifier
    ElementId
);
integer_id!(
    /// Support (boundary condition) identifier
    SupportId
);
integer_id!(
    /// Load identifier
    LoadId
);
integer_id!(
    /// 1-based construction stage index
    StageIndex
);
integer_id!(
    /// Elastic or master-slave link identifier
    LinkId
);
named_id!(
    /// Material name, e.g. "C40"
    MaterialId
);
named_id!(
    /// Section name, e.g. "S1"
    SectionId
);
named_id!(
    /// Structure, boundary or load group name
    GroupName
);
named_id!(
    /// Tendon property name
    TendonPropertyId
);
named_id!(
    /// Tendon name
    TendonName
);
named_id!(
    /// Vehicle name
    VehicleName
);
named_id!(
    /// Traffic lane name
    LaneName
);
named_id!(
    /// Live (moving) load case name
    LiveCaseName
);

// ============================================================================
// Entity Trait
// ============================================================================

/// Common contract of every stored entity.
///
/// `validate` is pure: it only looks at the entity's own fields.
/// `references` lists every other entity this one points at; the registry uses
/// it both for referential closure and to refuse deletes of referenced entities.
pub trait Entity: Clone + fmt::Debug + Serialize + DeserializeOwned + Send + Sync + 'static {
    type Id: Clone + Ord + fmt::Display + fmt::Debug + Serialize + DeserializeOwned + Send + Sync;

    const KIND: EntityKind;

    /// Fields a patch may not change
    const LOCKED_FIELDS: &'static [&'static str] = &["id"];

    fn id(&self) -> &Self::Id;

    fn validate(&self) -> BridgeResult<()>;

    fn references(&self) -> Vec<EntityRef> {
        Vec::new()
    }

    fn entity_ref(&self) -> EntityRef {
        EntityRef::new(Self::KIND, self.id())
    }
}

/// Enum wrapper for all entity types.
///
/// Used when heterogeneous entities travel together, e.g. a model snapshot
/// being replayed into the analysis engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "entity", rename_all = "snake_case")]
pub enum ModelEntity {
    Node(Node),
    Element(Element),
    Material(Material),
    Section(Section),
    Support(Support),
    Load(Load),
    Stage(ConstructionStage),
    Group(Group),
    Link(Link),
    TendonProperty(TendonProperty),
    Tendon(Tendon),
    Vehicle(Vehicle),
    Lane(Lane),
    LiveLoadCase(LiveLoadCase),
}

impl ModelEntity {
    pub fn kind(&self) -> EntityKind {
        match self {
            ModelEntity::Node(_) => EntityKind::Node,
            ModelEntity::Element(_) => EntityKind::Element,
            ModelEntity::Material(_) => EntityKind::Material,
            ModelEntity::Section(_) => EntityKind::Section,
            ModelEntity::Support(_) => EntityKind::Support,
            ModelEntity::Load(_) => EntityKind::Load,
            ModelEntity::Stage(_) => EntityKind::Stage,
            ModelEntity::Group(_) => EntityKind::Group,
            ModelEntity::Link(_) => EntityKind::Link,
            ModelEntity::TendonProperty(_) => EntityKind::TendonProperty,
            ModelEntity::Tendon(_) => EntityKind::Tendon,
            ModelEntity::Vehicle(_) => EntityKind::Vehicle,
            ModelEntity::Lane(_) => EntityKind::Lane,
            ModelEntity::LiveLoadCase(_) => EntityKind::LiveLoadCase,
        }
    }

    pub fn entity_ref(&self) -> EntityRef {
        match self {
            ModelEntity::Node(e) => e.entity_ref(),
            ModelEntity::Element(e) => e.entity_ref(),
            ModelEntity::Material(e) => e.entity_ref(),
            ModelEntity::Section(e) => e.entity_ref(),
            ModelEntity::Support(e) => e.entity_ref(),
            ModelEntity::Load(e) => e.entity_ref(),
            ModelEntity::Stage(e) => e.entity_ref(),
            ModelEntity::Group(e) => e.entity_ref(),
            ModelEntity::Link(e) => e.entity_ref(),
            ModelEntity::TendonProperty(e) => e.entity_ref(),
            ModelEntity::Tendon(e) => e.entity_ref(),
            ModelEntity::Vehicle(e) => e.entity_ref(),
            ModelEntity::Lane(e) => e.entity_ref(),
            ModelEntity::LiveLoadCase(e) => e.entity_ref(),
        }
    }
}

// ============================================================================
// Shared field checks
// ============================================================================

pub(crate) fn require_finite(entity: EntityKind, field: &str, value: f64) -> BridgeResult<()> {
    if !value.is_finite() {
        return Err(BridgeError::schema(entity.name(), field, format!("must be finite, got {value}")));
    }
    Ok(())
}

pub(crate) fn require_positive(entity: EntityKind, field: &str, value: f64) -> BridgeResult<()> {
    require_finite(entity, field, value)?;
    if value <= 0.0 {
        return Err(BridgeError::schema(entity.name(), field, format!("must be positive, got {value}")));
    }
    Ok(())
}

pub(crate) fn require_non_negative(entity: EntityKind, field: &str, value: f64) -> BridgeResult<()> {
    require_finite(entity, field, value)?;
    if value < 0.0 {
        return Err(BridgeError::schema(entity.name(), field, format!("must not be negative, got {value}")));
    }
    Ok(())
}

pub(crate) fn require_name(entity: EntityKind, field: &str, value: &str) -> BridgeResult<()> {
    if value.trim().is_empty() {
        return Err(BridgeError::schema(entity.name(), field, "must not be empty"));
    }
    Ok(())
}

/// Reject a list that names the same item twice
pub(crate) fn require_distinct<T: PartialEq + fmt::Display>(entity: EntityKind, field: &str, items: &[T]) -> BridgeResult<()> {
    for (i, item) in items.iter().enumerate() {
        if items[..i].contains(item) {
            return Err(BridgeError::schema(entity.name(), field, format!("{item} is listed twice")));
        }
    }
    Ok(())
}
