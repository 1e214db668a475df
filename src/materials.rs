// src/materials.rs - sorts ring model meshes into metal band and gemstones
use serde::{Deserialize, Serialize};

const GEM_KEYWORDS: [&str; 8] = [
    "diamond", "gem", "stone", "crystal", "brilliant", "round", "cut", "jewel",
];

/// What the loader knows about one mesh of the ring model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeshInfo {
    pub name: String,
    #[serde(default)]
    pub material_name: Option<String>,
    #[serde(default)]
    pub transparent: bool,
    #[serde(default = "opaque")]
    pub opacity: f32,
}

fn opaque() -> f32 {
    1.0
}

impl MeshInfo {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            material_name: None,
            transparent: false,
            opacity: 1.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MaterialClass {
    Metal,
    Gem,
}

fn mentions_gem(text: &str) -> bool {
    let lower = text.to_lowercase();
    GEM_KEYWORDS.iter().any(|keyword| lower.contains(keyword))
}

pub fn classify_mesh(mesh: &MeshInfo) -> MaterialClass {
    let named_gem = mentions_gem(&mesh.name)
        || mesh.material_name.as_deref().is_some_and(mentions_gem);
    if named_gem || mesh.transparent || mesh.opacity < 1.0 {
        MaterialClass::Gem
    } else {
        MaterialClass::Metal
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn band_is_metal() {
        assert_eq!(classify_mesh(&MeshInfo::named("Band_Outer")), MaterialClass::Metal);
    }

    #[test]
    fn gem_names_match_case_insensitively() {
        assert_eq!(classify_mesh(&MeshInfo::named("Center_DIAMOND")), MaterialClass::Gem);
        let mesh = MeshInfo {
            material_name: Some("CrystalGlass".into()),
            ..MeshInfo::named("mesh_004")
        };
        assert_eq!(classify_mesh(&mesh), MaterialClass::Gem);
    }

    #[test]
    fn stone_shape_names_are_gems() {
        assert_eq!(classify_mesh(&MeshInfo::named("Round_Center")), MaterialClass::Gem);
        assert_eq!(classify_mesh(&MeshInfo::named("princess_cut_01")), MaterialClass::Gem);
    }

    #[test]
    fn see_through_material_is_gem() {
        let mesh = MeshInfo {
            opacity: 0.6,
            ..MeshInfo::named("mesh_010")
        };
        assert_eq!(classify_mesh(&mesh), MaterialClass::Gem);

        let mesh = MeshInfo {
            transparent: true,
            ..MeshInfo::named("mesh_011")
        };
        assert_eq!(classify_mesh(&mesh), MaterialClass::Gem);
    }

    #[test]
    fn missing_fields_deserialize_as_opaque_metal() {
        let mesh: MeshInfo = serde_json::from_str(r#"{"name": "prong"}"#).unwrap();
        assert_eq!(mesh.opacity, 1.0);
        assert_eq!(classify_mesh(&mesh), MaterialClass::Metal);
    }
}
