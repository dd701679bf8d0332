//! `manifest.json` model.
//!
//! The manifest describes the typed data entries of a container. Required
//! fields are enforced at parse time; every field this crate does not model
//! is kept in an `extra` map so a manifest survives re-export unchanged.

mod query;

pub use query::{ContentInfo, EntryRole};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use tracing::warn;

use crate::error::{ArchiveError, Result};

/// Value of `lod` marking a reduced-quality variant
pub const PROXY_LOD: &str = "proxy";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    pub container_version: String,

    /// Keyed by role-prefixed names such as `scene_0` or `mesh_1`; iteration
    /// order is lexicographic by key.
    pub data_entries: BTreeMap<String, DataEntry>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alignment: Option<Value>,

    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub annotations: Option<Vec<Value>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project: Option<Value>,

    #[serde(rename = "_meta", default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<Value>,

    #[serde(rename = "_parameters", default, skip_serializing_if = "Option::is_none")]
    pub parameters: Option<Value>,

    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub packer: Option<String>,

    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub packer_version: Option<String>,

    #[serde(
        rename = "_creation_date",
        default,
        deserialize_with = "lenient",
        skip_serializing_if = "Option::is_none"
    )]
    pub creation_date: Option<String>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DataEntry {
    /// Archive-internal path; untrusted until sanitized
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub file_name: Option<String>,

    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub created_by: Option<String>,

    #[serde(
        rename = "_created_by_version",
        default,
        deserialize_with = "lenient",
        skip_serializing_if = "Option::is_none"
    )]
    pub created_by_version: Option<String>,

    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub lod: Option<String>,

    /// Raw placement parameters; read through [`DataEntry::transform`]
    #[serde(rename = "_parameters", default, skip_serializing_if = "Option::is_none")]
    pub parameters: Option<Value>,

    /// Source category, sizes and anything else a packer recorded
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Either one uniform factor or per-axis factors.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Scale {
    Uniform(f64),
    Axes([f64; 3]),
}

impl Scale {
    pub fn to_axes(self) -> [f64; 3] {
        match self {
            Scale::Uniform(s) => [s, s, s],
            Scale::Axes(axes) => axes,
        }
    }
}

/// Placement of an entry in the scene.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Transform {
    pub position: [f64; 3],
    pub rotation: [f64; 3],
    pub scale: [f64; 3],
}

impl Default for Transform {
    fn default() -> Self {
        Self {
            position: [0.0; 3],
            rotation: [0.0; 3],
            scale: [1.0; 3],
        }
    }
}

impl Manifest {
    /// Parse and validate a manifest document.
    ///
    /// Invalid JSON or a missing `container_version`/`data_entries` is a
    /// schema error; no partial manifest is ever returned.
    pub fn from_slice(data: &[u8]) -> Result<Self> {
        serde_json::from_slice(data).map_err(|e| ArchiveError::Schema(e.to_string()))
    }

    pub fn to_json_pretty(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

impl DataEntry {
    pub fn is_proxy(&self) -> bool {
        self.lod.as_deref() == Some(PROXY_LOD)
    }

    /// Lowercased extension of `file_name`, if any.
    pub fn extension(&self) -> Option<String> {
        let name = self.file_name.as_deref()?;
        let base = name.rsplit(['/', '\\']).next().unwrap_or(name);
        let (stem, ext) = base.rsplit_once('.')?;
        if stem.is_empty() || ext.is_empty() {
            return None;
        }
        Some(ext.to_ascii_lowercase())
    }

    /// Position, rotation and scale, defaulting to identity.
    ///
    /// Each component is read on its own: a malformed one logs a warning and
    /// keeps its identity value without affecting the others.
    pub fn transform(&self) -> Transform {
        let mut transform = Transform::default();
        let Some(params) = &self.parameters else {
            return transform;
        };
        let Some(params) = params.as_object() else {
            warn!(file_name = ?self.file_name, "ignoring non-object _parameters");
            return transform;
        };

        if let Some(position) = self.component::<[f64; 3]>(params, "position") {
            transform.position = position;
        }
        if let Some(rotation) = self.component::<[f64; 3]>(params, "rotation") {
            transform.rotation = rotation;
        }
        if let Some(scale) = self.component::<Scale>(params, "scale") {
            transform.scale = scale.to_axes();
        }
        transform
    }

    fn component<T: DeserializeOwned>(
        &self,
        params: &Map<String, Value>,
        key: &str,
    ) -> Option<T> {
        let value = params.get(key)?;
        match T::deserialize(value) {
            Ok(parsed) => Some(parsed),
            Err(e) => {
                warn!(
                    file_name = ?self.file_name,
                    component = key,
                    error = %e,
                    "ignoring malformed transform component"
                );
                None
            }
        }
    }
}

/// Deserialize an optional field, dropping a value of the wrong type with a
/// warning instead of rejecting the whole manifest.
fn lenient<'de, D, T>(deserializer: D) -> std::result::Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    match Option::<Value>::deserialize(deserializer)? {
        None | Some(Value::Null) => Ok(None),
        Some(value) => match T::deserialize(&value) {
            Ok(parsed) => Ok(Some(parsed)),
            Err(e) => {
                warn!(value = %value, error = %e, "ignoring mistyped manifest field");
                Ok(None)
            }
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn parse(value: Value) -> Result<Manifest> {
        Manifest::from_slice(value.to_string().as_bytes())
    }

    #[test]
    fn test_minimal_manifest() {
        let manifest = parse(json!({
            "container_version": "1.0",
            "data_entries": {}
        }))
        .unwrap();
        assert_eq!(manifest.container_version, "1.0");
        assert!(manifest.data_entries.is_empty());
    }

    #[test]
    fn test_missing_required_fields() {
        let err = parse(json!({ "container_version": "1.0" })).unwrap_err();
        assert_eq!(err.reason(), "schema_error");
        assert!(err.to_string().contains("data_entries"));

        let err = parse(json!({ "data_entries": {} })).unwrap_err();
        assert!(err.to_string().contains("container_version"));

        assert!(Manifest::from_slice(b"not json").is_err());
    }

    #[test]
    fn test_unknown_fields_preserved() {
        let original = json!({
            "container_version": "1.0",
            "packer": "capture-packer",
            "packer_version": "2.3.1",
            "_creation_date": "2025-01-01T00:00:00Z",
            "annotations": [{ "id": 1, "title": "Door" }],
            "viewer_settings": { "background": "#000" },
            "data_entries": {
                "source_0": {
                    "file_name": "sources/raw.zip",
                    "source_category": "photogrammetry",
                    "size_bytes": 1024
                }
            }
        });
        let manifest = parse(original.clone()).unwrap();
        assert_eq!(manifest.extra["viewer_settings"]["background"], "#000");
        assert_eq!(
            manifest.data_entries["source_0"].extra["source_category"],
            "photogrammetry"
        );

        let reencoded: Value = serde_json::from_str(&manifest.to_json_pretty().unwrap()).unwrap();
        assert_eq!(reencoded, original);
    }

    #[test]
    fn test_transform_defaults_and_scalar_scale() {
        let entry = DataEntry::default();
        assert_eq!(entry.transform(), Transform::default());

        let manifest = parse(json!({
            "container_version": "1.0",
            "data_entries": {
                "mesh_0": {
                    "file_name": "mesh_0.glb",
                    "_parameters": { "position": [1.0, 2.0, 3.0], "scale": 2.5 }
                },
                "scene_0": {
                    "file_name": "scene_0.ply",
                    "_parameters": { "rotation": [0.0, 90.0, 0.0], "scale": [1.0, 2.0, 3.0] }
                }
            }
        }))
        .unwrap();

        let mesh = manifest.data_entries["mesh_0"].transform();
        assert_eq!(mesh.position, [1.0, 2.0, 3.0]);
        assert_eq!(mesh.rotation, [0.0; 3]);
        assert_eq!(mesh.scale, [2.5; 3]);

        let scene = manifest.data_entries["scene_0"].transform();
        assert_eq!(scene.rotation, [0.0, 90.0, 0.0]);
        assert_eq!(scene.scale, [1.0, 2.0, 3.0]);
    }

    #[test]
    fn test_mistyped_optional_fields_are_dropped() {
        let manifest = parse(json!({
            "container_version": "1.0",
            "packer": 7,
            "annotations": { "not": "a list" },
            "data_entries": {
                "scene_0": {
                    "file_name": "scene_0.ply",
                    "_created_by_version": 3,
                    "created_by": ["scanner"],
                    "lod": false
                }
            }
        }))
        .unwrap();

        assert!(manifest.packer.is_none());
        assert!(manifest.annotations.is_none());
        let scene = &manifest.data_entries["scene_0"];
        assert_eq!(scene.file_name.as_deref(), Some("scene_0.ply"));
        assert!(scene.created_by_version.is_none());
        assert!(scene.created_by.is_none());
        assert!(!scene.is_proxy());
    }

    #[test]
    fn test_malformed_transform_component_keeps_identity() {
        let manifest = parse(json!({
            "container_version": "1.0",
            "data_entries": {
                "scene_0": {
                    "file_name": "scene_0.ply",
                    "_parameters": {
                        "position": [1.0, 2.0, 3.0],
                        "rotation": [0.0, 90.0, 0.0, 1.0],
                        "scale": "large"
                    }
                },
                "mesh_0": {
                    "file_name": "mesh_0.glb",
                    "_parameters": [1.0, 2.0, 3.0]
                },
                "mesh_1": {
                    "file_name": "mesh_1.glb",
                    "_parameters": { "scale": 0.5 }
                }
            }
        }))
        .unwrap();

        let scene = manifest.data_entries["scene_0"].transform();
        assert_eq!(scene.position, [1.0, 2.0, 3.0]);
        assert_eq!(scene.rotation, [0.0; 3]);
        assert_eq!(scene.scale, [1.0; 3]);

        assert_eq!(manifest.data_entries["mesh_0"].transform(), Transform::default());
        assert_eq!(manifest.data_entries["mesh_1"].transform().scale, [0.5; 3]);
    }

    #[test]
    fn test_extension() {
        let entry = |name: &str| DataEntry {
            file_name: Some(name.to_string()),
            ..Default::default()
        };
        assert_eq!(entry("scene_0.PLY").extension().as_deref(), Some("ply"));
        assert_eq!(entry("dir.v2/mesh").extension(), None);
        assert_eq!(entry("assets/model.glb").extension().as_deref(), Some("glb"));
        assert_eq!(DataEntry::default().extension(), None);
    }
}
