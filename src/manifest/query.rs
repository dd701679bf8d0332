use serde::Serialize;
use std::ops::Bound;

use super::{DataEntry, Manifest, Transform};
use crate::sanitize::is_safe;

/// Role of a data entry, encoded as the prefix of its key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntryRole {
    Scene,
    Mesh,
    PointCloud,
    Thumbnail,
    Image,
    Source,
}

impl EntryRole {
    pub fn prefix(&self) -> &'static str {
        match self {
            EntryRole::Scene => "scene_",
            EntryRole::Mesh => "mesh_",
            EntryRole::PointCloud => "pointcloud_",
            EntryRole::Thumbnail => "thumbnail_",
            EntryRole::Image => "image_",
            EntryRole::Source => "source_",
        }
    }

    /// Renderable extensions; `None` means any extension is accepted.
    pub fn extensions(&self) -> Option<&'static [&'static str]> {
        match self {
            EntryRole::Scene => Some(&["ply", "spz", "ksplat", "sog", "splat"]),
            EntryRole::Mesh => Some(&["glb", "gltf", "obj", "stl"]),
            EntryRole::PointCloud => Some(&["e57"]),
            EntryRole::Thumbnail => Some(&["png", "jpg", "jpeg", "webp"]),
            EntryRole::Image | EntryRole::Source => None,
        }
    }

    /// Whether the role has reduced-quality proxy variants.
    pub fn supports_proxy(&self) -> bool {
        matches!(self, EntryRole::Scene | EntryRole::Mesh)
    }

    pub fn from_key(key: &str) -> Option<Self> {
        [
            EntryRole::Scene,
            EntryRole::Mesh,
            EntryRole::PointCloud,
            EntryRole::Thumbnail,
            EntryRole::Image,
            EntryRole::Source,
        ]
        .into_iter()
        .find(|role| key.starts_with(role.prefix()))
    }

    /// True when `entry` names a safe path with an extension this role can render.
    pub fn accepts(&self, entry: &DataEntry) -> bool {
        if entry.file_name.as_deref().is_some_and(|name| !is_safe(name)) {
            return false;
        }
        match self.extensions() {
            None => true,
            Some(allowed) => entry
                .extension()
                .is_some_and(|ext| allowed.contains(&ext.as_str())),
        }
    }
}

/// What a container can show, for enabling UI affordances.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ContentInfo {
    pub has_splat: bool,
    pub has_mesh: bool,
    pub has_mesh_proxy: bool,
    pub has_scene_proxy: bool,
    pub has_pointcloud: bool,
    pub has_thumbnail: bool,
    pub has_source_files: bool,
    pub source_file_count: usize,
}

impl Manifest {
    /// All entries whose key starts with `prefix`, sorted by key.
    pub fn find_by_prefix<'a>(&'a self, prefix: &'a str) -> Vec<(&'a str, &'a DataEntry)> {
        self.data_entries
            .range::<str, _>((Bound::Included(prefix), Bound::Unbounded))
            .take_while(|(key, _)| key.starts_with(prefix))
            .map(|(key, entry)| (key.as_str(), entry))
            .collect()
    }

    pub fn find_by_role(&self, role: EntryRole) -> Vec<(&str, &DataEntry)> {
        self.find_by_prefix(role.prefix())
    }

    /// Preferred entry for `role`.
    ///
    /// Roles with proxies prefer the first full-quality entry and fall back
    /// to a proxy; other roles take the first match.
    pub fn primary(&self, role: EntryRole) -> Option<(&str, &DataEntry)> {
        let entries = self.find_by_role(role);
        if role.supports_proxy() {
            if let Some(full) = entries.iter().find(|(_, e)| !e.is_proxy()) {
                return Some(*full);
            }
        }
        entries.into_iter().next()
    }

    /// First proxy entry for `role`, if the role has proxies.
    pub fn proxy(&self, role: EntryRole) -> Option<(&str, &DataEntry)> {
        if !role.supports_proxy() {
            return None;
        }
        self.find_by_role(role).into_iter().find(|(_, e)| e.is_proxy())
    }

    pub fn primary_scene(&self) -> Option<(&str, &DataEntry)> {
        self.primary(EntryRole::Scene)
    }

    pub fn primary_mesh(&self) -> Option<(&str, &DataEntry)> {
        self.primary(EntryRole::Mesh)
    }

    pub fn primary_pointcloud(&self) -> Option<(&str, &DataEntry)> {
        self.primary(EntryRole::PointCloud)
    }

    pub fn primary_thumbnail(&self) -> Option<(&str, &DataEntry)> {
        self.primary(EntryRole::Thumbnail)
    }

    pub fn primary_image(&self) -> Option<(&str, &DataEntry)> {
        self.primary(EntryRole::Image)
    }

    pub fn scene_proxy(&self) -> Option<(&str, &DataEntry)> {
        self.proxy(EntryRole::Scene)
    }

    pub fn mesh_proxy(&self) -> Option<(&str, &DataEntry)> {
        self.proxy(EntryRole::Mesh)
    }

    pub fn source_files(&self) -> Vec<(&str, &DataEntry)> {
        self.find_by_role(EntryRole::Source)
    }

    /// Transform of the entry stored under `key`.
    pub fn entry_transform(&self, key: &str) -> Option<Transform> {
        self.data_entries.get(key).map(DataEntry::transform)
    }

    /// Availability summary; entries with unrecognized extensions count as absent.
    pub fn content_info(&self) -> ContentInfo {
        let renderable = |found: Option<(&str, &DataEntry)>, role: EntryRole| {
            found.is_some_and(|(_, entry)| role.accepts(entry))
        };
        let source_file_count = self.source_files().len();

        ContentInfo {
            has_splat: renderable(self.primary_scene(), EntryRole::Scene),
            has_mesh: renderable(self.primary_mesh(), EntryRole::Mesh),
            has_mesh_proxy: renderable(self.mesh_proxy(), EntryRole::Mesh),
            has_scene_proxy: renderable(self.scene_proxy(), EntryRole::Scene),
            has_pointcloud: renderable(self.primary_pointcloud(), EntryRole::PointCloud),
            has_thumbnail: renderable(self.primary_thumbnail(), EntryRole::Thumbnail),
            has_source_files: source_file_count > 0,
            source_file_count,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn manifest(entries: serde_json::Value) -> Manifest {
        let doc = json!({ "container_version": "1.0", "data_entries": entries });
        Manifest::from_slice(doc.to_string().as_bytes()).unwrap()
    }

    #[test]
    fn test_find_by_prefix_sorted() {
        let m = manifest(json!({
            "scene_1": { "file_name": "b.ply" },
            "mesh_0": { "file_name": "m.glb" },
            "scene_0": { "file_name": "a.ply" },
            "scenery": { "file_name": "x.ply" }
        }));
        let keys: Vec<&str> = m.find_by_prefix("scene_").iter().map(|(k, _)| *k).collect();
        assert_eq!(keys, vec!["scene_0", "scene_1"]);
        assert!(m.find_by_prefix("pointcloud_").is_empty());
    }

    #[test]
    fn test_primary_prefers_full_quality() {
        let m = manifest(json!({
            "scene_0": { "file_name": "scene_0.ply" },
            "scene_1": { "file_name": "scene_1.spz", "lod": "proxy" }
        }));
        assert_eq!(m.primary_scene().unwrap().0, "scene_0");
        assert_eq!(m.scene_proxy().unwrap().0, "scene_1");

        let m = manifest(json!({
            "scene_0": { "file_name": "scene_0.spz", "lod": "proxy" },
            "scene_1": { "file_name": "scene_1.ply" }
        }));
        assert_eq!(m.primary_scene().unwrap().0, "scene_1");
    }

    #[test]
    fn test_primary_falls_back_to_proxy() {
        let m = manifest(json!({
            "scene_1": { "file_name": "scene_1.ply", "lod": "proxy" }
        }));
        assert_eq!(m.primary_scene().unwrap().0, "scene_1");
        assert!(m.primary_mesh().is_none());
    }

    #[test]
    fn test_roles_without_proxy_take_first() {
        let m = manifest(json!({
            "thumbnail_0": { "file_name": "t0.png", "lod": "proxy" },
            "thumbnail_1": { "file_name": "t1.png" }
        }));
        assert_eq!(m.primary_thumbnail().unwrap().0, "thumbnail_0");
        assert!(m.proxy(EntryRole::Thumbnail).is_none());

        let m = manifest(json!({
            "image_1": { "file_name": "front.tif" },
            "image_0": { "file_name": "top.tif" }
        }));
        assert_eq!(m.primary_image().unwrap().0, "image_0");
    }

    #[test]
    fn test_content_info() {
        let m = manifest(json!({
            "scene_0": { "file_name": "scene_0.ply" },
            "mesh_0": { "file_name": "mesh_0.fbx" },
            "mesh_1": { "file_name": "mesh_1.glb", "lod": "proxy" },
            "pointcloud_0": { "file_name": "scan.E57" },
            "thumbnail_0": { "file_name": "thumb.webp" },
            "source_0": { "file_name": "raw/a.zip" },
            "source_1": { "file_name": "raw/b.zip" }
        }));
        let info = m.content_info();
        assert!(info.has_splat);
        // mesh_0 is primary but .fbx is not renderable
        assert!(!info.has_mesh);
        assert!(info.has_mesh_proxy);
        assert!(!info.has_scene_proxy);
        assert!(info.has_pointcloud);
        assert!(info.has_thumbnail);
        assert!(info.has_source_files);
        assert_eq!(info.source_file_count, 2);
    }

    #[test]
    fn test_unsafe_file_names_are_not_renderable() {
        let m = manifest(json!({
            "scene_0": { "file_name": "../../x.ply" },
            "mesh_0": { "file_name": "%2e%2e/mesh_0.glb" },
            "thumbnail_0": { "file_name": "thumb.png" }
        }));
        let info = m.content_info();
        assert!(!info.has_splat);
        assert!(!info.has_mesh);
        assert!(info.has_thumbnail);
        assert!(!EntryRole::Scene.accepts(&m.data_entries["scene_0"]));
    }

    #[test]
    fn test_empty_content_info() {
        let info = manifest(json!({})).content_info();
        assert_eq!(info, ContentInfo::default());
    }

    #[test]
    fn test_role_from_key() {
        assert_eq!(EntryRole::from_key("pointcloud_3"), Some(EntryRole::PointCloud));
        assert_eq!(EntryRole::from_key("notes_0"), None);
    }

    #[test]
    fn test_entry_transform_lookup() {
        let m = manifest(json!({
            "mesh_0": { "file_name": "m.glb", "_parameters": { "scale": 3.0 } }
        }));
        assert_eq!(m.entry_transform("mesh_0").unwrap().scale, [3.0; 3]);
        assert!(m.entry_transform("mesh_9").is_none());
    }
}
