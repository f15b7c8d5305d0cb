//! # Validation Engine
//!
//! Cross-entity consistency checks over a [`ModelRegistry`]. Entity schemas
//! validate their own fields; everything that needs more than one entity is
//! checked here.
//!
//! The battery always runs in the same order and reports every finding:
//!
//! 1. Referential closure (error)
//! 2. Duplicate or near-duplicate nodes (error or warning)
//! 3. Disconnected structure (warning)
//! 4. Construction-stage consistency (error)
//! 5. Section and material compatibility (error or warning)
//! 6. Model completeness (error)
//!
//! A report without errors is analysis-ready.
//!
//! ## Example
//!
//! ```rust
//! use bridge_core::entities::*;
//! use bridge_core::registry::ModelRegistry;
//! use bridge_core::validation::ValidationEngine;
//!
//! let mut model = ModelRegistry::new("Demo");
//! model.create(Material::new("C40", MaterialKind::Concrete, 3.25e10, 2500.0)).unwrap();
//! model.create(Section::rectangle("S1", 0.5, 1.0)).unwrap();
//! model.create(Node::new(1, 0.0, 0.0, 0.0)).unwrap();
//! model.create(Node::new(2, 10.0, 0.0, 0.0)).unwrap();
//! model.create(Element::beam(1, 1, 2, "C40", "S1")).unwrap();
//!
//! let report = ValidationEngine::default().validate(&model);
//! assert!(report.is_analysis_ready());
//! assert_eq!(report.warning_count(), 1); // no support yet
//! ```

use std::collections::{BTreeMap, BTreeSet, HashMap};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use petgraph::unionfind::UnionFind;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::entities::{
    Activity, AnalysisKind, ConstructionStage, Element, ElementId, ElementKind, Entity, EntityKind, EntityRef, Link, Load,
    Material, MaterialKind, Node, NodeId, Section, StageTarget, Support, Tendon,
};
use crate::registry::ModelRegistry;

/// Default node coincidence tolerance, model length units
pub const DEFAULT_NODE_TOLERANCE: f64 = 1e-3;

/// Which check produced a finding
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckKind {
    ReferentialClosure,
    DuplicateNodes,
    Connectivity,
    StageConsistency,
    SectionCompatibility,
    Completeness,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Error,
    Warning,
}

/// One validation finding
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Finding {
    pub check: CheckKind,
    pub severity: Severity,
    pub message: String,
    /// Offending entities
    pub entities: Vec<EntityRef>,
}

impl Finding {
    fn error(check: CheckKind, message: impl Into<String>, entities: Vec<EntityRef>) -> Self {
        Finding {
            check,
            severity: Severity::Error,
            message: message.into(),
            entities,
        }
    }

    fn warning(check: CheckKind, message: impl Into<String>, entities: Vec<EntityRef>) -> Self {
        Finding {
            check,
            severity: Severity::Warning,
            message: message.into(),
            entities,
        }
    }
}

/// Result of one validation run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationReport {
    /// Registry revision the report describes
    pub revision: u64,
    pub findings: Vec<Finding>,
}

impl ValidationReport {
    pub fn error_count(&self) -> usize {
        self.errors().count()
    }

    pub fn warning_count(&self) -> usize {
        self.warnings().count()
    }

    pub fn errors(&self) -> impl Iterator<Item = &Finding> {
        self.findings.iter().filter(|f| f.severity == Severity::Error)
    }

    pub fn warnings(&self) -> impl Iterator<Item = &Finding> {
        self.findings.iter().filter(|f| f.severity == Severity::Warning)
    }

    /// True when the report has no error-severity finding
    pub fn is_analysis_ready(&self) -> bool {
        self.error_count() == 0
    }

    /// One-line human summary
    pub fn summary(&self) -> String {
        let status = if self.is_analysis_ready() { "analysis-ready" } else { "not analysis-ready" };
        format!(
            "Model revision {}: {} error(s), {} warning(s), {status}",
            self.revision,
            self.error_count(),
            self.warning_count()
        )
    }
}

/// Tunables of the battery
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ValidationSettings {
    /// Nodes closer than this are considered coincident
    pub node_tolerance: f64,
    /// Whether the engine merges coincident element endpoints by itself
    pub merged_nodes_supported: bool,
}

impl Default for ValidationSettings {
    fn default() -> Self {
        ValidationSettings {
            node_tolerance: DEFAULT_NODE_TOLERANCE,
            merged_nodes_supported: false,
        }
    }
}

/// Runs the check battery and caches the last report per registry revision.
#[derive(Debug, Default)]
pub struct ValidationEngine {
    settings: ValidationSettings,
    cache: Mutex<Option<(DateTime<Utc>, ValidationReport)>>,
}

impl ValidationEngine {
    pub fn new(settings: ValidationSettings) -> Self {
        ValidationEngine {
            settings,
            cache: Mutex::new(None),
        }
    }

    pub fn settings(&self) -> &ValidationSettings {
        &self.settings
    }

    /// Validate the model, reusing the cached report when nothing changed.
    pub fn validate(&self, model: &ModelRegistry) -> ValidationReport {
        let mut cache = self.cache.lock();
        if let Some((created, report)) = cache.as_ref() {
            if *created == model.meta.created && report.revision == model.revision() {
                return report.clone();
            }
        }

        let report = self.check(model);
        *cache = Some((model.meta.created, report.clone()));
        report
    }

    /// Validate without touching the cache, e.g. a staged copy of the model
    pub fn check(&self, model: &ModelRegistry) -> ValidationReport {
        let report = self.run(model);
        debug!(
            revision = report.revision,
            errors = report.error_count(),
            warnings = report.warning_count(),
            "model validated"
        );
        report
    }

    /// Drop the cached report
    pub fn invalidate(&self) {
        *self.cache.lock() = None;
    }

    fn run(&self, model: &ModelRegistry) -> ValidationReport {
        let mut findings = Vec::new();
        check_references(model, self.settings.node_tolerance, &mut findings);
        check_duplicate_nodes(model, &self.settings, &mut findings);
        check_connectivity(model, &mut findings);
        check_stages(model, &mut findings);
        check_compatibility(model, &mut findings);
        check_completeness(model, &mut findings);
        ValidationReport {
            revision: model.revision(),
            findings,
        }
    }
}

// ============================================================================
// Checks
// ============================================================================

fn check_references(model: &ModelRegistry, tolerance: f64, findings: &mut Vec<Finding>) {
    for (owner, references) in model.reference_map() {
        for reference in references.into_iter().filter(|r| !model.resolves(r)) {
            findings.push(Finding::error(
                CheckKind::ReferentialClosure,
                format!("{owner} references missing {reference}"),
                vec![owner.clone(), reference],
            ));
        }
    }

    for (owner, conflict) in model.conflicts() {
        let mut entities = vec![owner];
        entities.extend(conflict.related);
        findings.push(Finding::error(CheckKind::ReferentialClosure, conflict.reason, entities));
    }

    for load in model.all::<Load>() {
        let (Some(element_id), Some((_, end))) = (load.element(), load.span()) else {
            continue;
        };
        let Ok(element) = model.get::<Element>(&element_id) else {
            continue;
        };
        if let Some(length) = model.element_length(element) {
            if end > length + tolerance {
                findings.push(Finding::error(
                    CheckKind::ReferentialClosure,
                    format!("{} ends at {end} but {} is only {length:.3} long", load.entity_ref(), element.entity_ref()),
                    vec![load.entity_ref(), element.entity_ref()],
                ));
            }
        }
    }

    let cases = model.load_cases();
    for live in model.live_cases() {
        if cases.contains(&live) {
            findings.push(Finding::error(
                CheckKind::ReferentialClosure,
                format!("live load case '{live}' has the same name as a static load case"),
                vec![EntityRef::new(EntityKind::LiveLoadCase, &live)],
            ));
        }
    }
    for term in &model.analysis_config().combination {
        if !model.has_case(&term.case) {
            findings.push(Finding::error(
                CheckKind::ReferentialClosure,
                format!("analysis combination uses load case '{}' which has no loads", term.case),
                Vec::new(),
            ));
        }
    }
}

fn check_duplicate_nodes(model: &ModelRegistry, settings: &ValidationSettings, findings: &mut Vec<Finding>) {
    let endpoints: BTreeSet<NodeId> = model.all::<Element>().flat_map(|e| e.nodes.iter().copied()).collect();

    let mut nodes: Vec<&Node> = model.all::<Node>().collect();
    nodes.sort_by(|a, b| a.position.x.total_cmp(&b.position.x).then(a.id.cmp(&b.id)));

    let tolerance = settings.node_tolerance;
    let mut pairs = Vec::new();
    for (i, a) in nodes.iter().enumerate() {
        for b in nodes[i + 1..].iter().take_while(|b| b.position.x - a.position.x <= tolerance) {
            if a.position.distance(b.position) <= tolerance {
                let (first, second) = if a.id < b.id { (a, b) } else { (b, a) };
                pairs.push((first.id, second.id, a.position.distance(b.position)));
            }
        }
    }
    pairs.sort_by(|x, y| (x.0, x.1).cmp(&(y.0, y.1)));

    for (first, second, distance) in pairs {
        let refs = vec![EntityRef::new(EntityKind::Node, first), EntityRef::new(EntityKind::Node, second)];
        let both_endpoints = endpoints.contains(&first) && endpoints.contains(&second);
        let message = format!("nodes {first} and {second} coincide (distance {distance:.2e})");
        if both_endpoints && !settings.merged_nodes_supported {
            findings.push(Finding::error(CheckKind::DuplicateNodes, message, refs));
        } else {
            findings.push(Finding::warning(CheckKind::DuplicateNodes, message, refs));
        }
    }
}

fn check_connectivity(model: &ModelRegistry, findings: &mut Vec<Finding>) {
    let index: BTreeMap<NodeId, usize> = model.all::<Node>().enumerate().map(|(i, n)| (n.id, i)).collect();
    let mut components = UnionFind::<usize>::new(index.len());
    let mut connected = BTreeSet::new();

    for element in model.all::<Element>() {
        let slots: Vec<usize> = element.nodes.iter().filter_map(|n| index.get(n).copied()).collect();
        if slots.len() != element.nodes.len() {
            continue;
        }
        connected.extend(element.nodes.iter().copied());
        for pair in slots.windows(2) {
            components.union(pair[0], pair[1]);
        }
    }

    for link in model.all::<Link>() {
        let Some(&master) = index.get(&link.master) else {
            continue;
        };
        for slave in link.slaves.iter().filter_map(|n| index.get(n)) {
            components.union(master, *slave);
        }
        connected.extend(link.nodes().filter(|n| index.contains_key(n)));
    }

    let supported: BTreeSet<usize> = model
        .all::<Support>()
        .filter_map(|s| index.get(&s.node))
        .map(|&slot| components.find(slot))
        .collect();

    // root -> elements of that component, in ID order of the first element
    let mut unsupported: Vec<(usize, Vec<EntityRef>)> = Vec::new();
    let mut position: HashMap<usize, usize> = HashMap::new();
    for element in model.all::<Element>() {
        let Some(&slot) = element.nodes.first().and_then(|n| index.get(n)) else {
            continue;
        };
        if !element.nodes.iter().all(|n| index.contains_key(n)) {
            continue;
        }
        let root = components.find(slot);
        if supported.contains(&root) {
            continue;
        }
        let at = *position.entry(root).or_insert_with(|| {
            unsupported.push((root, Vec::new()));
            unsupported.len() - 1
        });
        unsupported[at].1.push(element.entity_ref());
    }

    for (_, elements) in unsupported {
        findings.push(Finding::warning(
            CheckKind::Connectivity,
            format!(
                "structure component of {} element(s) has no support and is not reachable from any supported node",
                elements.len()
            ),
            elements,
        ));
    }

    for node in model.all::<Node>().filter(|n| !connected.contains(&n.id)) {
        findings.push(Finding::warning(
            CheckKind::Connectivity,
            format!("{} is not connected to any element", node.entity_ref()),
            vec![node.entity_ref()],
        ));
    }
}

/// Whether a target counts as present at a stage; unstaged targets always do.
fn is_present(status: Activity) -> bool {
    matches!(status, Activity::Unstaged | Activity::Active)
}

fn check_stages(model: &ModelRegistry, findings: &mut Vec<Finding>) {
    let stages: Vec<&ConstructionStage> = model.all::<ConstructionStage>().collect();
    if stages.is_empty() {
        if model.analysis_config().kind == AnalysisKind::StagedConstruction {
            findings.push(Finding::error(
                CheckKind::StageConsistency,
                "staged-construction analysis is configured but no construction stage exists",
                Vec::new(),
            ));
        }
        return;
    }

    let mut reported = BTreeSet::new();

    for stage in stages {
        let at = stage.index;
        let element_present = |id: ElementId| is_present(model.activity(&StageTarget::Element(id), at));
        let node_present = |node: NodeId| {
            let mut hosts = model.all::<Element>().filter(|e| e.nodes.contains(&node)).peekable();
            hosts.peek().is_none() || hosts.any(|e| element_present(e.id))
        };

        for load in model.all::<Load>() {
            if !is_present(model.activity(&StageTarget::Load(load.id), at)) || reported.contains(&load.entity_ref()) {
                continue;
            }
            let host = match (load.tendon(), load.element(), load.node()) {
                (Some(tendon), _, _) => model.get::<Tendon>(tendon).ok().and_then(|t| {
                    t.elements
                        .iter()
                        .find(|e| model.contains::<Element>(e) && !element_present(**e))
                        .map(|e| EntityRef::new(EntityKind::Element, e))
                }),
                (_, Some(element), _) if model.contains::<Element>(&element) && !element_present(element) => {
                    Some(EntityRef::new(EntityKind::Element, element))
                }
                (_, _, Some(node)) if !node_present(node) => Some(EntityRef::new(EntityKind::Node, node)),
                _ => None,
            };
            if let Some(host) = host {
                findings.push(Finding::error(
                    CheckKind::StageConsistency,
                    format!("{} is active at stage {at} but {host} is not", load.entity_ref()),
                    vec![load.entity_ref(), host],
                ));
                reported.insert(load.entity_ref());
            }
        }

        for support in model.all::<Support>() {
            if !is_present(model.activity(&StageTarget::Support(support.id), at))
                || reported.contains(&support.entity_ref())
            {
                continue;
            }
            if !node_present(support.node) {
                let host = EntityRef::new(EntityKind::Node, support.node);
                findings.push(Finding::error(
                    CheckKind::StageConsistency,
                    format!(
                        "{} is active at stage {at} but no element at {host} is active",
                        support.entity_ref()
                    ),
                    vec![support.entity_ref(), host],
                ));
                reported.insert(support.entity_ref());
            }
        }

        for link in model.all::<Link>() {
            let activity = link
                .group
                .as_ref()
                .map_or(Activity::Unstaged, |g| model.activity(&StageTarget::Group(g.clone()), at));
            if !is_present(activity) || reported.contains(&link.entity_ref()) {
                continue;
            }
            if let Some(node) = link.nodes().find(|n| !node_present(*n)) {
                let host = EntityRef::new(EntityKind::Node, node);
                findings.push(Finding::error(
                    CheckKind::StageConsistency,
                    format!("{} is active at stage {at} but no element at {host} is active", link.entity_ref()),
                    vec![link.entity_ref(), host],
                ));
                reported.insert(link.entity_ref());
            }
        }
    }
}

fn check_compatibility(model: &ModelRegistry, findings: &mut Vec<Finding>) {
    for element in model.all::<Element>() {
        if let Ok(section) = model.get::<Section>(&element.section) {
            if section.class() != element.kind.section_class() {
                findings.push(Finding::error(
                    CheckKind::SectionCompatibility,
                    format!(
                        "{} is a {:?} element but section '{}' is a {} section",
                        element.entity_ref(),
                        element.kind,
                        section.id,
                        section.shape.display_name()
                    ),
                    vec![element.entity_ref(), section.entity_ref()],
                ));
            }
        }

        if element.kind == ElementKind::Cable {
            if let Ok(material) = model.get::<Material>(&element.material) {
                if material.kind == MaterialKind::Concrete {
                    findings.push(Finding::warning(
                        CheckKind::SectionCompatibility,
                        format!("cable {} uses concrete material '{}'", element.entity_ref(), material.id),
                        vec![element.entity_ref(), material.entity_ref()],
                    ));
                }
            }
        }
    }
}

fn check_completeness(model: &ModelRegistry, findings: &mut Vec<Finding>) {
    if model.count::<Node>() == 0 {
        findings.push(Finding::error(CheckKind::Completeness, "model has no nodes", Vec::new()));
    }
    if model.count::<Element>() == 0 {
        findings.push(Finding::error(CheckKind::Completeness, "model has no elements", Vec::new()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::{
        Activation, AnalysisConfig, DesignCode, Fixity, Group, Lane, LinkKind, LiveLoadCase, LoadDirection, SectionShape,
        TendonProperty, Vehicle,
    };
    use crate::units::Vec3;

    fn simple_beam() -> ModelRegistry {
        let mut model = ModelRegistry::new("Test");
        model.create(Material::new("C40", MaterialKind::Concrete, 3.25e10, 2500.0)).unwrap();
        model.create(Section::rectangle("S1", 0.5, 1.0)).unwrap();
        model.create(Node::new(1, 0.0, 0.0, 0.0)).unwrap();
        model.create(Node::new(2, 10.0, 0.0, 0.0)).unwrap();
        model.create(Element::beam(1, 1, 2, "C40", "S1")).unwrap();
        model
    }

    fn checks(report: &ValidationReport) -> Vec<(CheckKind, Severity)> {
        report.findings.iter().map(|f| (f.check, f.severity)).collect()
    }

    #[test]
    fn test_unsupported_beam_warns_once() {
        let mut model = simple_beam();
        let engine = ValidationEngine::default();
        let report = engine.validate(&model);
        assert_eq!(checks(&report), vec![(CheckKind::Connectivity, Severity::Warning)]);

        model.create(Support::new(1, 1, Fixity::fixed())).unwrap();
        model.create(Load::nodal_force(1, "Dead", 2, Vec3::new(0.0, -100.0, 0.0))).unwrap();
        let report = engine.validate(&model);
        assert!(report.findings.is_empty(), "{:?}", report.findings);
    }

    #[test]
    fn test_empty_model_not_ready() {
        let report = ValidationEngine::default().validate(&ModelRegistry::new("Empty"));
        assert_eq!(report.error_count(), 2);
        assert!(!report.is_analysis_ready());
    }

    #[test]
    fn test_idempotent_and_cached() {
        let model = simple_beam();
        let engine = ValidationEngine::default();
        let first = engine.validate(&model);
        let second = engine.validate(&model);
        assert_eq!(first, second);
        engine.invalidate();
        assert_eq!(engine.validate(&model), first);
    }

    #[test]
    fn test_dangling_reference_is_error() {
        let mut model = simple_beam();
        model.create(Element::beam(2, 2, 99, "C40", "S1")).unwrap();
        let report = ValidationEngine::default().validate(&model);
        let closure: Vec<&Finding> = report
            .errors()
            .filter(|f| f.check == CheckKind::ReferentialClosure)
            .collect();
        assert_eq!(closure.len(), 1);
        assert!(closure[0].entities.contains(&EntityRef::new(EntityKind::Node, 99)));
    }

    #[test]
    fn test_load_span_beyond_element() {
        let mut model = simple_beam();
        model
            .create(Load::uniform(1, "Dead", 1, Default::default(), 2.0, 12.0, -10.0))
            .unwrap();
        let report = ValidationEngine::default().validate(&model);
        assert!(report.errors().any(|f| f.message.contains("only 10.000 long")));
    }

    #[test]
    fn test_unknown_combination_case() {
        let mut model = simple_beam();
        model
            .set_analysis_config(AnalysisConfig::default().with_case("Wind", 1.0))
            .unwrap();
        let report = ValidationEngine::default().validate(&model);
        assert!(report.errors().any(|f| f.message.contains("'Wind'")));
    }

    #[test]
    fn test_coincident_endpoints() {
        let mut model = simple_beam();
        model.create(Node::new(3, 10.0, 0.0, 0.0005)).unwrap();
        model.create(Node::new(4, 20.0, 0.0, 0.0)).unwrap();
        model.create(Element::beam(2, 3, 4, "C40", "S1")).unwrap();

        let strict = ValidationEngine::default().validate(&model);
        assert!(strict.errors().any(|f| f.check == CheckKind::DuplicateNodes));

        let lenient = ValidationEngine::new(ValidationSettings {
            merged_nodes_supported: true,
            ..ValidationSettings::default()
        })
        .validate(&model);
        assert!(lenient.errors().all(|f| f.check != CheckKind::DuplicateNodes));
        assert!(lenient.warnings().any(|f| f.check == CheckKind::DuplicateNodes));
    }

    #[test]
    fn test_two_components_one_supported() {
        let mut model = simple_beam();
        model.create(Node::new(3, 30.0, 0.0, 0.0)).unwrap();
        model.create(Node::new(4, 40.0, 0.0, 0.0)).unwrap();
        model.create(Element::beam(2, 3, 4, "C40", "S1")).unwrap();
        model.create(Support::new(1, 1, Fixity::fixed())).unwrap();

        let report = ValidationEngine::default().validate(&model);
        let warnings: Vec<&Finding> = report.warnings().collect();
        assert_eq!(warnings.len(), 1);
        assert_eq!(warnings[0].entities, vec![EntityRef::new(EntityKind::Element, 2)]);
    }

    #[test]
    fn test_load_on_inactive_element() {
        let mut model = simple_beam();
        model.create(Support::new(1, 1, Fixity::fixed())).unwrap();
        model
            .create(ConstructionStage::new(1, "Erect").with(Activation::activate(StageTarget::Element(ElementId(1)))))
            .unwrap();
        model
            .create(
                ConstructionStage::new(2, "Remove").with(Activation::deactivate(StageTarget::Element(ElementId(1)))),
            )
            .unwrap();
        model
            .create(Load::uniform(1, "Dead", 1, Default::default(), 0.0, 10.0, -10.0))
            .unwrap();

        let report = ValidationEngine::default().validate(&model);
        let stage_errors: Vec<&Finding> = report
            .errors()
            .filter(|f| f.check == CheckKind::StageConsistency)
            .collect();
        // the load and the support at node 1 both lose their host at stage 2
        assert_eq!(stage_errors.len(), 2);
        let load_error = stage_errors
            .iter()
            .find(|f| f.entities[0].kind == EntityKind::Load)
            .unwrap();
        assert!(load_error.message.contains("stage 2"));
    }

    #[test]
    fn test_group_activation_counts_for_members() {
        let mut model = simple_beam();
        model.create(Support::new(1, 1, Fixity::fixed())).unwrap();
        model.create(Group::structure("Girder").with_elements([1])).unwrap();
        model
            .create(
                ConstructionStage::new(1, "Girder")
                    .with(Activation::activate(StageTarget::Group("Girder".into())))
                    .with(Activation::activate(StageTarget::Support(crate::entities::SupportId(1)))),
            )
            .unwrap();
        let report = ValidationEngine::default().validate(&model);
        assert!(report.is_analysis_ready(), "{:?}", report.findings);
    }

    #[test]
    fn test_staged_analysis_without_stages() {
        let mut model = simple_beam();
        model
            .set_analysis_config(AnalysisConfig::new(AnalysisKind::StagedConstruction))
            .unwrap();
        let report = ValidationEngine::default().validate(&model);
        assert!(report.errors().any(|f| f.check == CheckKind::StageConsistency));
    }

    #[test]
    fn test_section_class_mismatch() {
        let mut model = simple_beam();
        model.create(Section::new("T1", SectionShape::Plate { thickness: 0.3 })).unwrap();
        model.create(Node::new(3, 0.0, 5.0, 0.0)).unwrap();
        model.create(Element::beam(2, 2, 3, "C40", "T1")).unwrap();
        model
            .create(Element::beam(3, 1, 3, "C40", "S1").with_kind(ElementKind::Cable))
            .unwrap();

        let report = ValidationEngine::default().validate(&model);
        assert!(report
            .errors()
            .any(|f| f.check == CheckKind::SectionCompatibility && f.entities[0] == EntityRef::new(EntityKind::Element, 2)));
        assert!(report
            .warnings()
            .any(|f| f.check == CheckKind::SectionCompatibility && f.message.contains("concrete")));
    }

    #[test]
    fn test_report_summary() {
        let report = ValidationEngine::default().validate(&simple_beam());
        assert!(report.summary().contains("0 error(s), 1 warning(s)"));
    }

    #[test]
    fn test_distributed_load_on_plate_is_error() {
        let mut model = simple_beam();
        model.create(Section::plate("P1", 0.3)).unwrap();
        model.create(Node::new(3, 10.0, 5.0, 0.0)).unwrap();
        model
            .create(Element::beam(2, 1, 2, "C40", "P1").with_kind(ElementKind::Plate).with_nodes(&[1, 2, 3]))
            .unwrap();
        // the bare registry does not check references, so the load gets in
        model
            .create(Load::uniform(1, "Dead", 2, LoadDirection::GlobalZ, 0.0, 1.0, -5.0))
            .unwrap();

        let report = ValidationEngine::default().validate(&model);
        let plate = report
            .errors()
            .find(|f| f.message.contains("plate"))
            .expect("plate finding");
        assert_eq!(plate.check, CheckKind::ReferentialClosure);
        assert_eq!(
            plate.entities,
            vec![EntityRef::new(EntityKind::Load, 1), EntityRef::new(EntityKind::Element, 2)]
        );
    }

    #[test]
    fn test_link_joins_components() {
        let mut model = simple_beam();
        model.create(Node::new(3, 10.0, 0.0, -1.0)).unwrap();
        model.create(Node::new(4, 20.0, 0.0, -1.0)).unwrap();
        model.create(Element::beam(2, 3, 4, "C40", "S1")).unwrap();
        model.create(Support::new(1, 1, Fixity::fixed())).unwrap();
        let before = ValidationEngine::default().validate(&model);
        assert_eq!(before.warning_count(), 1);

        model.create(Link::between(1, LinkKind::Rigid, 2, 3)).unwrap();
        let after = ValidationEngine::default().validate(&model);
        assert!(after.findings.is_empty(), "{:?}", after.findings);
    }

    #[test]
    fn test_live_case_in_combination() {
        let mut model = simple_beam();
        model.create(Support::new(1, 1, Fixity::fixed())).unwrap();
        model.create(Vehicle::new("Truck", DesignCode::Highway, 1)).unwrap();
        model.create(Lane::new("L1", &[1])).unwrap();
        model.create(LiveLoadCase::new("Traffic", &["Truck"], &["L1"])).unwrap();
        model
            .set_analysis_config(AnalysisConfig::default().with_case("Traffic", 1.4))
            .unwrap();
        let report = ValidationEngine::default().validate(&model);
        assert!(report.is_analysis_ready(), "{:?}", report.findings);

        model.create(Load::nodal_force(1, "Traffic", 2, Vec3::new(0.0, -1.0, 0.0))).unwrap();
        let report = ValidationEngine::default().validate(&model);
        assert!(report.errors().any(|f| f.message.contains("same name as a static load case")));
    }

    #[test]
    fn test_prestress_needs_active_tendon_elements() {
        let mut model = simple_beam();
        model.create(Support::new(1, 1, Fixity::fixed())).unwrap();
        model.create(TendonProperty::new("15-7", 0.00139)).unwrap();
        model
            .create(Tendon::new("T1", "15-7", &[1], vec![[0.0, 0.0], [0.5, -0.4], [1.0, 0.0]]))
            .unwrap();
        model
            .create(ConstructionStage::new(1, "Erect").with(Activation::activate(StageTarget::Element(ElementId(1)))))
            .unwrap();
        model
            .create(ConstructionStage::new(2, "Remove").with(Activation::deactivate(StageTarget::Element(ElementId(1)))))
            .unwrap();
        model.create(Load::prestress(1, "PS", "T1", 1.2e6)).unwrap();

        let report = ValidationEngine::default().validate(&model);
        assert!(report
            .errors()
            .any(|f| f.check == CheckKind::StageConsistency && f.entities[0] == EntityRef::new(EntityKind::Load, 1)));
    }

    #[test]
    fn test_check_bypasses_cache() {
        let mut model = simple_beam();
        let engine = ValidationEngine::default();
        let cached = engine.validate(&model);
        let mut staged = model.clone();
        staged.set_analysis_config(AnalysisConfig::new(AnalysisKind::StagedConstruction)).unwrap();
        assert!(!engine.check(&staged).is_analysis_ready());
        assert_eq!(engine.validate(&model), cached);
        model.create(Support::new(1, 1, Fixity::fixed())).unwrap();
        assert!(engine.validate(&model).findings.is_empty());
    }
}
