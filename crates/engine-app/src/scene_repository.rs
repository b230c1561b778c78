//! The Scene Repository (C2): loads and eagerly validates a JSON scene
//! graph, accepting either the legacy v1 flat document or the v2 envelope,
//! and exposes an immutable, read-only lookup over the result.
//!
//! Validation never short-circuits on the first problem: every violation is
//! collected into a `SceneValidationError` so an author fixing a scene file
//! doesn't have to re-run the loader once per mistake.

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use serde_json::{Map, Value};
use thiserror::Error;
use wayfarer_domain::{Choice, ItemId, NarrationOverride, Scene, SceneId, Transition};

/// Commands the Scripted Scene Machine handles itself, without consulting a
/// scene's `transitions` map (§4.2).
pub const BUILTIN_COMMANDS: &[&str] = &[
    "look", "inventory", "journal", "history", "recall", "help", "status", "save", "load",
    "tutorial", "quit",
];

pub fn is_builtin_command(command: &str) -> bool {
    BUILTIN_COMMANDS.contains(&command)
}

/// One validation problem: where it was found, and what's wrong.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SceneIssue {
    pub path: String,
    pub message: String,
}

impl SceneIssue {
    fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }
}

/// The full list of problems found while validating a scene document. Fatal
/// at load time; loading never partially succeeds.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("scene graph failed validation ({} issue(s))", issues.len())]
pub struct SceneValidationError {
    pub issues: Vec<SceneIssue>,
}

/// IO or JSON-syntax failure reading the scene file, distinct from a
/// validation failure in the document's content.
#[derive(Debug, Error)]
pub enum SceneLoadError {
    #[error("could not read scene file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("scene file is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Validation(#[from] SceneValidationError),
}

/// Whether unrecognised fields on scenes/transitions/overrides are rejected
/// (`Strict`) or preserved-and-ignored (`Lenient`) - the §6 configuration
/// knob.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SchemaMode {
    #[default]
    Strict,
    Lenient,
}

const SCENE_FIELDS: &[&str] = &["id", "description", "choices", "transitions"];
const CHOICE_FIELDS: &[&str] = &["command", "description"];
const TRANSITION_FIELDS: &[&str] = &[
    "narration",
    "target",
    "item",
    "requires",
    "consumes",
    "failure_narration",
    "records",
    "narration_overrides",
];
const OVERRIDE_FIELDS: &[&str] = &[
    "narration",
    "requires_history_all",
    "requires_history_any",
    "forbids_history_any",
    "requires_inventory_all",
    "requires_inventory_any",
    "forbids_inventory_any",
    "records",
];

fn check_unknown_fields(
    obj: &Map<String, Value>,
    known: &[&str],
    path: &str,
    mode: SchemaMode,
    issues: &mut Vec<SceneIssue>,
) {
    if mode != SchemaMode::Strict {
        return;
    }
    for key in obj.keys() {
        if !known.contains(&key.as_str()) {
            issues.push(SceneIssue::new(path, format!("unknown field `{key}`")));
        }
    }
}

fn as_str<'a>(obj: &'a Map<String, Value>, field: &str, path: &str, issues: &mut Vec<SceneIssue>) -> Option<&'a str> {
    match obj.get(field) {
        Some(Value::String(s)) => Some(s.as_str()),
        Some(_) => {
            issues.push(SceneIssue::new(path, format!("`{field}` must be a string")));
            None
        }
        None => {
            issues.push(SceneIssue::new(path, format!("missing required field `{field}`")));
            None
        }
    }
}

fn as_string_array(
    obj: &Map<String, Value>,
    field: &str,
    path: &str,
    issues: &mut Vec<SceneIssue>,
) -> Vec<String> {
    match obj.get(field) {
        None => Vec::new(),
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(|v| match v {
                Value::String(s) => Some(s.clone()),
                _ => {
                    issues.push(SceneIssue::new(path, format!("`{field}` entries must be strings")));
                    None
                }
            })
            .collect(),
        Some(_) => {
            issues.push(SceneIssue::new(path, format!("`{field}` must be an array of strings")));
            Vec::new()
        }
    }
}

fn as_item_id_set(
    obj: &Map<String, Value>,
    field: &str,
    path: &str,
    issues: &mut Vec<SceneIssue>,
) -> BTreeSet<ItemId> {
    as_string_array(obj, field, path, issues)
        .into_iter()
        .filter_map(|s| match ItemId::new(&s) {
            Ok(id) => Some(id),
            Err(e) => {
                issues.push(SceneIssue::new(path, format!("`{field}` entry {s:?}: {e}")));
                None
            }
        })
        .collect()
}

fn as_item_id_vec(
    obj: &Map<String, Value>,
    field: &str,
    path: &str,
    issues: &mut Vec<SceneIssue>,
) -> Vec<ItemId> {
    as_string_array(obj, field, path, issues)
        .into_iter()
        .filter_map(|s| match ItemId::new(&s) {
            Ok(id) => Some(id),
            Err(e) => {
                issues.push(SceneIssue::new(path, format!("`{field}` entry {s:?}: {e}")));
                None
            }
        })
        .collect()
}

fn parse_override(
    value: &Value,
    path: &str,
    mode: SchemaMode,
    issues: &mut Vec<SceneIssue>,
) -> Option<NarrationOverride> {
    let Value::Object(obj) = value else {
        issues.push(SceneIssue::new(path, "override must be an object"));
        return None;
    };
    check_unknown_fields(obj, OVERRIDE_FIELDS, path, mode, issues);

    let narration = as_str(obj, "narration", path, issues)?.to_string();
    let records = as_string_array(obj, "records", path, issues);
    for record in &records {
        if record.is_empty() {
            issues.push(SceneIssue::new(path, "`records` entries must be non-empty"));
        }
    }

    Some(NarrationOverride {
        narration,
        requires_history_all: as_string_array(obj, "requires_history_all", path, issues),
        requires_history_any: as_string_array(obj, "requires_history_any", path, issues),
        forbids_history_any: as_string_array(obj, "forbids_history_any", path, issues),
        requires_inventory_all: as_item_id_vec(obj, "requires_inventory_all", path, issues),
        requires_inventory_any: as_item_id_vec(obj, "requires_inventory_any", path, issues),
        forbids_inventory_any: as_item_id_vec(obj, "forbids_inventory_any", path, issues),
        records,
    })
}

fn parse_transition(
    value: &Value,
    path: &str,
    mode: SchemaMode,
    issues: &mut Vec<SceneIssue>,
) -> Option<Transition> {
    let Value::Object(obj) = value else {
        issues.push(SceneIssue::new(path, "transition must be an object"));
        return None;
    };
    check_unknown_fields(obj, TRANSITION_FIELDS, path, mode, issues);

    let narration = as_str(obj, "narration", path, issues)?.to_string();

    let target = match obj.get("target") {
        None | Some(Value::Null) => None,
        Some(Value::String(s)) => match SceneId::new(s) {
            Ok(id) => Some(id),
            Err(e) => {
                issues.push(SceneIssue::new(path, format!("`target` {s:?}: {e}")));
                None
            }
        },
        Some(_) => {
            issues.push(SceneIssue::new(path, "`target` must be a string or null"));
            None
        }
    };

    let item = match obj.get("item") {
        None => None,
        Some(Value::String(s)) => match ItemId::new(s) {
            Ok(id) => Some(id),
            Err(e) => {
                issues.push(SceneIssue::new(path, format!("`item` {s:?}: {e}")));
                None
            }
        },
        Some(_) => {
            issues.push(SceneIssue::new(path, "`item` must be a string"));
            None
        }
    };

    let failure_narration = match obj.get("failure_narration") {
        None => None,
        Some(Value::String(s)) => Some(s.clone()),
        Some(_) => {
            issues.push(SceneIssue::new(path, "`failure_narration` must be a string"));
            None
        }
    };

    let records = as_string_array(obj, "records", path, issues);
    for record in &records {
        if record.is_empty() {
            issues.push(SceneIssue::new(path, "`records` entries must be non-empty"));
        }
    }

    let narration_overrides = match obj.get("narration_overrides") {
        None => Vec::new(),
        Some(Value::Array(items)) => items
            .iter()
            .enumerate()
            .filter_map(|(i, v)| {
                parse_override(v, &format!("{path}.narration_overrides[{i}]"), mode, issues)
            })
            .collect(),
        Some(_) => {
            issues.push(SceneIssue::new(path, "`narration_overrides` must be an array"));
            Vec::new()
        }
    };

    Some(Transition {
        narration,
        target,
        item,
        requires: as_item_id_set(obj, "requires", path, issues),
        consumes: as_item_id_set(obj, "consumes", path, issues),
        failure_narration,
        records,
        narration_overrides,
    })
}

fn parse_choice(value: &Value, path: &str, mode: SchemaMode, issues: &mut Vec<SceneIssue>) -> Option<Choice> {
    let Value::Object(obj) = value else {
        issues.push(SceneIssue::new(path, "choice must be an object"));
        return None;
    };
    check_unknown_fields(obj, CHOICE_FIELDS, path, mode, issues);

    let command = as_str(obj, "command", path, issues)?.to_string();
    let description = as_str(obj, "description", path, issues)?.to_string();

    if command.is_empty() {
        issues.push(SceneIssue::new(path, "`command` must be non-empty"));
    } else if command != command.to_lowercase() {
        issues.push(SceneIssue::new(
            path,
            format!("`command` {command:?} must be lowercase"),
        ));
    }
    if description.is_empty() {
        issues.push(SceneIssue::new(path, "`description` must be non-empty"));
    }

    Some(Choice { command, description })
}

fn parse_scene(id: &str, value: &Value, mode: SchemaMode, issues: &mut Vec<SceneIssue>) -> Option<Scene> {
    let path = id.to_string();
    let Value::Object(obj) = value else {
        issues.push(SceneIssue::new(&path, "scene must be an object"));
        return None;
    };
    check_unknown_fields(obj, SCENE_FIELDS, &path, mode, issues);

    let scene_id = match SceneId::new(id) {
        Ok(id) => id,
        Err(e) => {
            issues.push(SceneIssue::new(&path, e.to_string()));
            return None;
        }
    };

    let description = as_str(obj, "description", &path, issues)?.to_string();

    let choices: Vec<Choice> = match obj.get("choices") {
        Some(Value::Array(items)) => items
            .iter()
            .enumerate()
            .filter_map(|(i, v)| parse_choice(v, &format!("{path}.choices[{i}]"), mode, issues))
            .collect(),
        Some(_) => {
            issues.push(SceneIssue::new(&path, "`choices` must be an array"));
            Vec::new()
        }
        None => {
            issues.push(SceneIssue::new(&path, "missing required field `choices`"));
            Vec::new()
        }
    };

    let mut seen_commands: BTreeSet<String> = BTreeSet::new();
    for choice in &choices {
        let lowered = choice.command.to_lowercase();
        if !seen_commands.insert(lowered) {
            issues.push(SceneIssue::new(
                &path,
                format!("duplicate choice command `{}`", choice.command),
            ));
        }
    }

    let transitions: BTreeMap<String, Transition> = match obj.get("transitions") {
        Some(Value::Object(map)) => map
            .iter()
            .filter_map(|(key, v)| {
                parse_transition(v, &format!("{path}.transitions.{key}"), mode, issues)
                    .map(|t| (key.clone(), t))
            })
            .collect(),
        Some(_) => {
            issues.push(SceneIssue::new(&path, "`transitions` must be an object"));
            BTreeMap::new()
        }
        None => BTreeMap::new(),
    };

    let choice_commands: BTreeSet<String> = choices.iter().map(|c| c.command.to_lowercase()).collect();

    for key in transitions.keys() {
        let lowered = key.to_lowercase();
        if !choice_commands.contains(&lowered) && !is_builtin_command(&lowered) {
            issues.push(SceneIssue::new(
                &path,
                format!("transition key `{key}` matches no choice and no built-in command"),
            ));
        }
    }
    for command in &choice_commands {
        if !transitions.contains_key(command) && !is_builtin_command(command) {
            issues.push(SceneIssue::new(
                &path,
                format!("choice `{command}` has neither a transition nor a built-in handler"),
            ));
        }
    }

    Some(Scene {
        id: scene_id,
        description,
        choices,
        transitions,
    })
}

/// Split a loaded JSON document into `(schema_version, start_scene, scenes)`,
/// normalising v1 (flat map) and v2 (`{schema_version, scenes, ...}`
/// envelope) into the same shape.
fn normalise_document(
    document: &Value,
    issues: &mut Vec<SceneIssue>,
) -> (u32, Option<String>, Map<String, Value>) {
    if let Value::Object(top) = document {
        if let Some(Value::Object(scenes)) = top.get("scenes") {
            let schema_version = match top.get("schema_version") {
                Some(Value::Number(n)) => n.as_u64().unwrap_or(2) as u32,
                _ => 2,
            };
            let start_scene = match top.get("start_scene") {
                Some(Value::String(s)) => Some(s.clone()),
                _ => None,
            };
            return (schema_version, start_scene, scenes.clone());
        }
        return (1, None, top.clone());
    }
    issues.push(SceneIssue::new("$", "document must be a JSON object"));
    (1, None, Map::new())
}

/// The parsed, validated, immutable scene graph.
#[derive(Debug, Clone)]
pub struct SceneRepository {
    scenes: BTreeMap<SceneId, Scene>,
    start_scene: Option<SceneId>,
    source_path: Option<PathBuf>,
    source_mtime: Option<SystemTime>,
}

impl SceneRepository {
    /// Validate an already-parsed JSON document (used by tests and by
    /// callers who already have the bytes in memory).
    pub fn from_value(document: &Value, mode: SchemaMode) -> Result<Self, SceneValidationError> {
        let mut issues = Vec::new();
        let (_schema_version, start_scene, scene_map) = normalise_document(document, &mut issues);

        let mut scenes = BTreeMap::new();
        for (id, value) in &scene_map {
            if let Some(scene) = parse_scene(id, value, mode, &mut issues) {
                scenes.insert(scene.id.clone(), scene);
            }
        }

        let start_scene = match start_scene {
            Some(s) => match SceneId::new(&s) {
                Ok(id) => Some(id),
                Err(e) => {
                    issues.push(SceneIssue::new("$.start_scene", e.to_string()));
                    None
                }
            },
            None => None,
        };
        if let Some(start) = &start_scene {
            if !scenes.contains_key(start) {
                issues.push(SceneIssue::new(
                    "$.start_scene",
                    format!("start_scene `{start}` is not a known scene"),
                ));
            }
        }

        for scene in scenes.values() {
            for (command, transition) in &scene.transitions {
                if let Some(target) = &transition.target {
                    if !scenes.contains_key(target) {
                        issues.push(SceneIssue::new(
                            format!("{}.transitions.{command}.target", scene.id),
                            format!("target `{target}` is not a scene in this document"),
                        ));
                    }
                }
            }
        }

        if !issues.is_empty() {
            return Err(SceneValidationError { issues });
        }

        Ok(Self {
            scenes,
            start_scene,
            source_path: None,
            source_mtime: None,
        })
    }

    /// Load and validate a scene document from disk.
    pub fn load(path: impl AsRef<Path>, mode: SchemaMode) -> Result<Self, SceneLoadError> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path).map_err(|source| SceneLoadError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let document: Value = serde_json::from_str(&raw)?;
        let mut repo = Self::from_value(&document, mode)?;
        repo.source_path = Some(path.to_path_buf());
        repo.source_mtime = fs::metadata(path).and_then(|m| m.modified()).ok();
        Ok(repo)
    }

    pub fn get(&self, id: &SceneId) -> Option<&Scene> {
        self.scenes.get(id)
    }

    pub fn scenes(&self) -> impl Iterator<Item = &Scene> {
        self.scenes.values()
    }

    pub fn contains(&self, id: &SceneId) -> bool {
        self.scenes.contains_key(id)
    }

    pub fn start_scene(&self) -> Option<&SceneId> {
        self.start_scene.as_ref()
    }

    /// If the source file's mtime changed since this repository was loaded,
    /// rebuild it and return the fresh repository. A running turn keeps the
    /// repository it started with - the driver decides when to call this,
    /// between turns (Design Note §9: no background watcher thread).
    pub fn reload_if_changed(&self, mode: SchemaMode) -> Result<Option<Self>, SceneLoadError> {
        let Some(path) = &self.source_path else {
            return Ok(None);
        };
        let current_mtime = fs::metadata(path).and_then(|m| m.modified()).ok();
        if current_mtime == self.source_mtime {
            return Ok(None);
        }
        Self::load(path, mode).map(Some)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sid(s: &str) -> SceneId {
        SceneId::new(s).unwrap()
    }

    #[test]
    fn flat_v1_document_loads() {
        let doc = json!({
            "hall": {
                "description": "A dusty hall.",
                "choices": [{"command": "take", "description": "Take the key"}],
                "transitions": {"take": {"narration": "You take the key.", "item": "rusty-key"}}
            }
        });
        let repo = SceneRepository::from_value(&doc, SchemaMode::Strict).unwrap();
        assert!(repo.contains(&sid("hall")));
    }

    #[test]
    fn v2_envelope_normalises_to_the_same_shape_as_v1() {
        let flat = json!({
            "hall": {
                "description": "A dusty hall.",
                "choices": [],
                "transitions": {}
            }
        });
        let enveloped = json!({
            "schema_version": 2,
            "start_scene": "hall",
            "scenes": {
                "hall": {
                    "description": "A dusty hall.",
                    "choices": [],
                    "transitions": {}
                }
            }
        });
        let a = SceneRepository::from_value(&flat, SchemaMode::Strict).unwrap();
        let b = SceneRepository::from_value(&enveloped, SchemaMode::Strict).unwrap();
        assert_eq!(a.get(&sid("hall")).unwrap().description, b.get(&sid("hall")).unwrap().description);
        assert_eq!(b.start_scene(), Some(&sid("hall")));
    }

    #[test]
    fn duplicate_choice_commands_are_rejected() {
        let doc = json!({
            "hall": {
                "description": "A dusty hall.",
                "choices": [
                    {"command": "take", "description": "Take the key"},
                    {"command": "take", "description": "Take it again"}
                ],
                "transitions": {"take": {"narration": "ok"}}
            }
        });
        let err = SceneRepository::from_value(&doc, SchemaMode::Strict).unwrap_err();
        assert!(err.issues.iter().any(|i| i.message.contains("duplicate choice command")));
    }

    #[test]
    fn transition_target_must_exist_in_document() {
        let doc = json!({
            "hall": {
                "description": "A dusty hall.",
                "choices": [{"command": "leave", "description": "Leave"}],
                "transitions": {"leave": {"narration": "You leave.", "target": "nowhere"}}
            }
        });
        let err = SceneRepository::from_value(&doc, SchemaMode::Strict).unwrap_err();
        assert!(err.issues.iter().any(|i| i.message.contains("is not a scene")));
    }

    #[test]
    fn errors_accumulate_instead_of_short_circuiting() {
        let doc = json!({
            "hall": {
                "description": "",
                "choices": [{"command": "Take", "description": ""}],
                "transitions": {}
            }
        });
        let err = SceneRepository::from_value(&doc, SchemaMode::Strict).unwrap_err();
        // Empty description, uppercase command, empty choice description, and
        // the missing transition for `take` should all be reported together.
        assert!(err.issues.len() >= 3);
    }

    #[test]
    fn strict_mode_rejects_unknown_fields_lenient_mode_ignores_them() {
        let doc = json!({
            "hall": {
                "description": "A dusty hall.",
                "choices": [],
                "transitions": {},
                "mystery_field": true
            }
        });
        assert!(SceneRepository::from_value(&doc, SchemaMode::Strict).is_err());
        assert!(SceneRepository::from_value(&doc, SchemaMode::Lenient).is_ok());
    }

    #[test]
    fn choice_without_transition_or_builtin_is_rejected() {
        let doc = json!({
            "hall": {
                "description": "A dusty hall.",
                "choices": [{"command": "dance", "description": "Dance a jig"}],
                "transitions": {}
            }
        });
        let err = SceneRepository::from_value(&doc, SchemaMode::Strict).unwrap_err();
        assert!(err
            .issues
            .iter()
            .any(|i| i.message.contains("neither a transition nor a built-in")));
    }

    #[test]
    fn builtin_command_choice_needs_no_transition() {
        let doc = json!({
            "hall": {
                "description": "A dusty hall.",
                "choices": [{"command": "look", "description": "Look around"}],
                "transitions": {}
            }
        });
        assert!(SceneRepository::from_value(&doc, SchemaMode::Strict).is_ok());
    }
}
