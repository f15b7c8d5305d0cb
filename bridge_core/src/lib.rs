//! # bridge_core - Bridge Model Contract and Provider
//!
//! `bridge_core` holds everything an assistant-facing bridge-engineering
//! server needs apart from its transport: a typed model of bridge entities,
//! an in-memory registry that keeps the model consistent, pre-analysis
//! validation, and an async adapter to an external analysis engine. All
//! inputs and outputs are JSON-serializable.
//!
//! ## Design Philosophy
//!
//! - **Typed at the edge**: tool arguments become typed entities before anything touches the model
//! - **Closed references**: the registry never stores an entity pointing at nothing
//! - **Engine behind a trait**: the analysis engine is an implementation detail of [`backend`]
//! - **Rich Errors**: structured error types with stable codes
//!
//! ## Quick Start
//!
//! ```rust
//! use bridge_core::entities::{Element, Material, MaterialKind, Node, Section};
//! use bridge_core::registry::ModelRegistry;
//!
//! let mut model = ModelRegistry::new("Footbridge");
//! model.create(Material::new("C40", MaterialKind::Concrete, 3.25e10, 2500.0)).unwrap();
//! model.create(Section::rectangle("S1", 0.5, 1.0)).unwrap();
//! model.create(Node::new(1, 0.0, 0.0, 0.0)).unwrap();
//! model.create(Node::new(2, 12.0, 0.0, 0.0)).unwrap();
//! model.create(Element::beam(1, 1, 2, "C40", "S1")).unwrap();
//!
//! assert_eq!(model.summary().element_count, 1);
//! ```
//!
//! ## Modules
//!
//! - [`entities`] - Entity schemas and identifiers
//! - [`registry`] - In-memory model store with referential integrity
//! - [`validation`] - Pre-analysis checks
//! - [`provider`] - Provider traits and the model session implementing them
//! - [`backend`] - Analysis engine adapter and engine implementations
//! - [`results`] - Analysis handles, result queries and result sets
//! - [`tools`] - Assistant-facing tool catalog and dispatch
//! - [`resources`] - Read-only model resources
//! - [`config`] - Layered server configuration
//! - [`units`] - Unit system and vectors
//! - [`errors`] - Structured error types

pub mod backend;
pub mod config;
pub mod entities;
pub mod errors;
pub mod provider;
pub mod registry;
pub mod resources;
pub mod results;
pub mod tools;
pub mod units;
pub mod validation;

// Re-export commonly used types at crate root for convenience
pub use config::BridgeConfig;
pub use errors::{BridgeError, BridgeResult};
pub use provider::{Analyze, ModelBuild, ModelQuery, ModelSession};
pub use registry::{ModelRegistry, ModelSnapshot, ModelSummary};
pub use validation::{ValidationReport, ValidationSettings};
