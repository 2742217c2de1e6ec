//! [`SkillRegistry`] – the static catalog of callable skills.
//!
//! A read-mostly map from skill name to [`SkillDef`].  Registration is
//! validated: a definition whose canonical fields are degenerate (empty
//! name, non-positive timeout, non-object args schema, or a preemptible
//! skill that cannot be cancelled) is rejected with a typed error.
//!
//! # Built-ins
//!
//! | Skill | Interface | Resources | Preemptible | Timeout |
//! |---|---|---|---|---|
//! | `NavigateToPose` | action | base | yes | 300 s |
//! | `StopBase` | service | base | no | 5 s |
//! | `Speak` | internal | – | yes | 30 s |
//!
//! # Example
//!
//! ```rust
//! use brainstem_skills::SkillRegistry;
//! use brainstem_types::Resource;
//!
//! let registry = SkillRegistry::builtin();
//! assert!(registry.has("NavigateToPose"));
//! assert_eq!(registry.by_resource(Resource::Base).len(), 2);
//! ```

use std::collections::BTreeMap;

use serde_json::json;
use thiserror::Error;

use brainstem_types::{ErrorDisposition, InterfaceKind, Resource, SkillDef};

/// Errors that can arise from registry operations.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum RegistryError {
    #[error("skill definition has an empty name")]
    EmptyName,
    #[error("skill {0}: timeout_s must be positive")]
    NonPositiveTimeout(String),
    #[error("skill {0}: args_schema must be a JSON object")]
    InvalidArgsSchema(String),
    #[error("skill {0}: a preemptible skill must support cancellation")]
    PreemptibleWithoutCancel(String),
    #[error("skill not found: {0}")]
    NotFound(String),
}

/// The read-mostly skill catalog.
#[derive(Debug, Clone, Default)]
pub struct SkillRegistry {
    skills: BTreeMap<String, SkillDef>,
}

impl SkillRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry pre-populated with the built-in skill set.
    pub fn builtin() -> Self {
        let mut registry = Self::new();

        registry
            .register(SkillDef {
                name: "NavigateToPose".to_string(),
                interface_kind: InterfaceKind::Action,
                args_schema: json!({
                    "required": ["target_x", "target_y"],
                    "properties": {
                        "target_x": {"type": "number"},
                        "target_y": {"type": "number"},
                        "target_theta": {"type": "number", "default": 0.0}
                    }
                }),
                resources_required: vec![Resource::Base],
                preemptible: true,
                cancel_supported: true,
                timeout_s: 300.0,
                error_map: BTreeMap::from([
                    ("NAV_GOAL_REJECTED".to_string(), ErrorDisposition::Replan),
                    ("NAV_TIMEOUT".to_string(), ErrorDisposition::Retry),
                    ("NAV_BLOCKED".to_string(), ErrorDisposition::Replan),
                    ("RESOURCE_CONFLICT".to_string(), ErrorDisposition::Replan),
                    ("UNKNOWN".to_string(), ErrorDisposition::AskHuman),
                ]),
            })
            .expect("builtin NavigateToPose is valid");

        registry
            .register(SkillDef {
                name: "StopBase".to_string(),
                interface_kind: InterfaceKind::Service,
                args_schema: json!({}),
                resources_required: vec![Resource::Base],
                preemptible: false,
                cancel_supported: false,
                timeout_s: 5.0,
                error_map: BTreeMap::new(),
            })
            .expect("builtin StopBase is valid");

        registry
            .register(SkillDef {
                name: "Speak".to_string(),
                interface_kind: InterfaceKind::Internal,
                args_schema: json!({
                    "required": ["message"],
                    "properties": {
                        "message": {"type": "string"}
                    }
                }),
                resources_required: vec![],
                preemptible: true,
                cancel_supported: true,
                timeout_s: 30.0,
                error_map: BTreeMap::new(),
            })
            .expect("builtin Speak is valid");

        registry
    }

    /// Register a skill definition after validating its integrity.
    pub fn register(&mut self, def: SkillDef) -> Result<(), RegistryError> {
        Self::validate(&def)?;
        self.skills.insert(def.name.clone(), def);
        Ok(())
    }

    fn validate(def: &SkillDef) -> Result<(), RegistryError> {
        if def.name.trim().is_empty() {
            return Err(RegistryError::EmptyName);
        }
        if def.timeout_s <= 0.0 {
            return Err(RegistryError::NonPositiveTimeout(def.name.clone()));
        }
        if !def.args_schema.is_object() {
            return Err(RegistryError::InvalidArgsSchema(def.name.clone()));
        }
        if def.preemptible && !def.cancel_supported {
            return Err(RegistryError::PreemptibleWithoutCancel(def.name.clone()));
        }
        Ok(())
    }

    /// Remove a skill by name; `true` if it was present.
    pub fn unregister(&mut self, name: &str) -> bool {
        self.skills.remove(name).is_some()
    }

    /// Look up a definition by name.
    pub fn get(&self, name: &str) -> Option<&SkillDef> {
        self.skills.get(name)
    }

    /// Whether a skill with the given name exists.
    pub fn has(&self, name: &str) -> bool {
        self.skills.contains_key(name)
    }

    /// All registered skill names, in canonical order.
    pub fn names(&self) -> Vec<&str> {
        self.skills.keys().map(String::as_str).collect()
    }

    /// All skills that claim the given resource.
    pub fn by_resource(&self, resource: Resource) -> Vec<&SkillDef> {
        self.skills
            .values()
            .filter(|def| def.resources_required.contains(&resource))
            .collect()
    }

    /// A snapshot of the catalog for embedding into the state aggregate.
    pub fn to_map(&self) -> BTreeMap<String, SkillDef> {
        self.skills.clone()
    }

    /// Deterministic human-readable digest of the catalog for the oracle.
    pub fn prompt_summary(&self) -> String {
        let mut lines = vec!["Available skills:".to_string()];
        for def in self.skills.values() {
            let resources = if def.resources_required.is_empty() {
                "none".to_string()
            } else {
                def.resources_required
                    .iter()
                    .map(|r| r.to_string())
                    .collect::<Vec<_>>()
                    .join(", ")
            };
            lines.push(format!(
                "- {} (resources: {}, preemptible: {}, timeout: {}s)",
                def.name, resources, def.preemptible, def.timeout_s
            ));
            if let Some(required) = def.args_schema.get("required") {
                lines.push(format!("  required args: {required}"));
            }
        }
        lines.join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minimal_def(name: &str) -> SkillDef {
        SkillDef {
            name: name.to_string(),
            interface_kind: InterfaceKind::Internal,
            args_schema: json!({}),
            resources_required: vec![],
            preemptible: true,
            cancel_supported: true,
            timeout_s: 10.0,
            error_map: BTreeMap::new(),
        }
    }

    #[test]
    fn builtin_registry_has_required_skills() {
        let registry = SkillRegistry::builtin();
        assert!(registry.has("NavigateToPose"));
        assert!(registry.has("StopBase"));
        assert!(registry.has("Speak"));
        assert_eq!(registry.names().len(), 3);
    }

    #[test]
    fn builtin_defs_carry_all_metadata_fields() {
        // The canonical eight: name, interface_kind, args_schema,
        // resources_required, preemptible, cancel_supported, timeout_s,
        // error_map.  Struct construction guarantees presence; this pins the
        // values the rest of the stack relies on.
        let registry = SkillRegistry::builtin();

        let nav = registry.get("NavigateToPose").unwrap();
        assert_eq!(nav.interface_kind, InterfaceKind::Action);
        assert_eq!(nav.resources_required, vec![Resource::Base]);
        assert!(nav.preemptible);
        assert!(nav.cancel_supported);
        assert!((nav.timeout_s - 300.0).abs() < f64::EPSILON);
        assert_eq!(
            nav.error_map.get("NAV_TIMEOUT"),
            Some(&ErrorDisposition::Retry)
        );

        let stop = registry.get("StopBase").unwrap();
        assert!(!stop.preemptible);
        assert!(!stop.cancel_supported);
        assert_eq!(stop.resources_required, vec![Resource::Base]);

        let speak = registry.get("Speak").unwrap();
        assert!(speak.resources_required.is_empty());
        assert_eq!(speak.interface_kind, InterfaceKind::Internal);
    }

    #[test]
    fn unknown_lookup_returns_none() {
        let registry = SkillRegistry::builtin();
        assert!(registry.get("Levitate").is_none());
        assert!(!registry.has("Levitate"));
    }

    #[test]
    fn by_resource_returns_claimers() {
        let registry = SkillRegistry::builtin();
        let base_skills: Vec<_> = registry
            .by_resource(Resource::Base)
            .into_iter()
            .map(|d| d.name.as_str())
            .collect();
        assert_eq!(base_skills, vec!["NavigateToPose", "StopBase"]);
        assert!(registry.by_resource(Resource::Arm).is_empty());
    }

    #[test]
    fn register_rejects_empty_name() {
        let mut registry = SkillRegistry::new();
        let mut def = minimal_def("  ");
        def.name = "  ".to_string();
        assert_eq!(registry.register(def), Err(RegistryError::EmptyName));
    }

    #[test]
    fn register_rejects_non_positive_timeout() {
        let mut registry = SkillRegistry::new();
        let mut def = minimal_def("Wave");
        def.timeout_s = 0.0;
        assert!(matches!(
            registry.register(def),
            Err(RegistryError::NonPositiveTimeout(_))
        ));
    }

    #[test]
    fn register_rejects_non_object_schema() {
        let mut registry = SkillRegistry::new();
        let mut def = minimal_def("Wave");
        def.args_schema = json!("not a schema");
        assert!(matches!(
            registry.register(def),
            Err(RegistryError::InvalidArgsSchema(_))
        ));
    }

    #[test]
    fn register_rejects_preemptible_without_cancel() {
        let mut registry = SkillRegistry::new();
        let mut def = minimal_def("Wave");
        def.cancel_supported = false;
        assert!(matches!(
            registry.register(def),
            Err(RegistryError::PreemptibleWithoutCancel(_))
        ));
    }

    #[test]
    fn register_and_unregister() {
        let mut registry = SkillRegistry::new();
        registry.register(minimal_def("Wave")).unwrap();
        assert!(registry.has("Wave"));
        assert!(registry.unregister("Wave"));
        assert!(!registry.has("Wave"));
        assert!(!registry.unregister("Wave"));
    }

    #[test]
    fn prompt_summary_is_deterministic_and_complete() {
        let registry = SkillRegistry::builtin();
        let summary = registry.prompt_summary();
        assert!(summary.contains("NavigateToPose"));
        assert!(summary.contains("StopBase"));
        assert!(summary.contains("Speak"));
        assert!(summary.contains("target_x"));
        assert_eq!(summary, registry.prompt_summary());
    }

    #[test]
    fn to_map_snapshots_catalog() {
        let registry = SkillRegistry::builtin();
        let map = registry.to_map();
        assert_eq!(map.len(), 3);
        assert!(map.contains_key("Speak"));
    }
}
