// Copyright © 2025 Lukas Bower
// SPDX-License-Identifier: Apache-2.0
// Purpose: Identifier types and storage-key mapping for scene objects.
// Author: Lukas Bower

//! Identifiers for workers, treelets, samples and stored scene objects.

use core::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Identifier of a treelet, a self-contained subtree of the acceleration
/// structure. Treelet 0 is the root every worker holds.
pub type TreeletId = u32;

/// Identifier of a worker, assigned by the master in connection order
/// starting at 1. Id 0 stands for the master itself on the datagram mesh.
pub type WorkerId = u64;

/// Globally unique sample identifier; partitions the pixel grid uniquely.
pub type SampleId = u64;

/// The kinds of objects stored in the flat object-storage namespace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ObjectKind {
    /// A serialized treelet, including any triangle meshes it owns.
    Treelet,
    /// A triangle mesh. Never fetched directly; embedded in its treelet.
    TriangleMesh,
    /// Global scene parameters.
    Scene,
    /// The camera description.
    Camera,
    /// The sampler description.
    Sampler,
    /// The light list.
    Lights,
    /// A material definition.
    Material,
    /// A generic texture.
    Texture,
    /// A scalar texture.
    FloatTexture,
    /// A spectrum texture.
    SpectrumTexture,
    /// The scene manifest: object sizes, dependencies and treelet weights.
    Manifest,
}

impl ObjectKind {
    /// Short tag used in the canonical storage key.
    #[must_use]
    pub fn tag(self) -> &'static str {
        match self {
            ObjectKind::Treelet => "T",
            ObjectKind::TriangleMesh => "TM",
            ObjectKind::Scene => "SCENE",
            ObjectKind::Camera => "CAMERA",
            ObjectKind::Sampler => "SAMPLER",
            ObjectKind::Lights => "LIGHTS",
            ObjectKind::Material => "MAT",
            ObjectKind::Texture => "TEX",
            ObjectKind::FloatTexture => "FTEX",
            ObjectKind::SpectrumTexture => "STEX",
            ObjectKind::Manifest => "MANIFEST",
        }
    }

    /// Inverse of [`ObjectKind::tag`].
    #[must_use]
    pub fn from_tag(tag: &str) -> Option<Self> {
        Some(match tag {
            "T" => ObjectKind::Treelet,
            "TM" => ObjectKind::TriangleMesh,
            "SCENE" => ObjectKind::Scene,
            "CAMERA" => ObjectKind::Camera,
            "SAMPLER" => ObjectKind::Sampler,
            "LIGHTS" => ObjectKind::Lights,
            "MAT" => ObjectKind::Material,
            "TEX" => ObjectKind::Texture,
            "FTEX" => ObjectKind::FloatTexture,
            "STEX" => ObjectKind::SpectrumTexture,
            "MANIFEST" => ObjectKind::Manifest,
            _ => return None,
        })
    }

    /// Stable numeric code carried on the wire.
    #[must_use]
    pub fn code(self) -> u32 {
        match self {
            ObjectKind::Treelet => 0,
            ObjectKind::TriangleMesh => 1,
            ObjectKind::Scene => 2,
            ObjectKind::Camera => 3,
            ObjectKind::Sampler => 4,
            ObjectKind::Lights => 5,
            ObjectKind::Material => 6,
            ObjectKind::Texture => 7,
            ObjectKind::FloatTexture => 8,
            ObjectKind::SpectrumTexture => 9,
            ObjectKind::Manifest => 10,
        }
    }

    /// Inverse of [`ObjectKind::code`].
    #[must_use]
    pub fn from_code(code: u32) -> Option<Self> {
        Some(match code {
            0 => ObjectKind::Treelet,
            1 => ObjectKind::TriangleMesh,
            2 => ObjectKind::Scene,
            3 => ObjectKind::Camera,
            4 => ObjectKind::Sampler,
            5 => ObjectKind::Lights,
            6 => ObjectKind::Material,
            7 => ObjectKind::Texture,
            8 => ObjectKind::FloatTexture,
            9 => ObjectKind::SpectrumTexture,
            10 => ObjectKind::Manifest,
            _ => return None,
        })
    }
}

/// Key of one stored scene object: both a storage path and a node in the
/// object dependency graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ObjectKey {
    /// Kind of the stored object.
    pub kind: ObjectKind,
    /// Numeric id within the kind.
    pub id: u64,
}

impl ObjectKey {
    /// Construct a key.
    #[must_use]
    pub fn new(kind: ObjectKind, id: u64) -> Self {
        Self { kind, id }
    }

    /// Key of a treelet object.
    #[must_use]
    pub fn treelet(id: TreeletId) -> Self {
        Self::new(ObjectKind::Treelet, u64::from(id))
    }

    /// Canonical storage key, `<tag>_<id>`.
    #[must_use]
    pub fn storage_key(&self) -> String {
        format!("{}_{}", self.kind.tag(), self.id)
    }
}

impl fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}", self.kind.tag(), self.id)
    }
}

/// Error produced when a storage key cannot be parsed back into an
/// [`ObjectKey`].
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum KeyParseError {
    /// The key had no `_` separator.
    #[error("malformed object key {0:?}")]
    Malformed(String),
    /// The kind tag was not recognized.
    #[error("unknown object kind tag {0:?}")]
    UnknownKind(String),
    /// The id part was not a number.
    #[error("invalid object id in key {0:?}")]
    InvalidId(String),
}

impl FromStr for ObjectKey {
    type Err = KeyParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (tag, id) = s
            .rsplit_once('_')
            .ok_or_else(|| KeyParseError::Malformed(s.to_owned()))?;
        let kind =
            ObjectKind::from_tag(tag).ok_or_else(|| KeyParseError::UnknownKind(tag.to_owned()))?;
        let id = id
            .parse::<u64>()
            .map_err(|_| KeyParseError::InvalidId(s.to_owned()))?;
        Ok(Self { kind, id })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn storage_key_round_trip() {
        let key = ObjectKey::treelet(7);
        assert_eq!(key.storage_key(), "T_7");
        assert_eq!("T_7".parse::<ObjectKey>().unwrap(), key);

        let key = ObjectKey::new(ObjectKind::SpectrumTexture, 12);
        assert_eq!(key.storage_key().parse::<ObjectKey>().unwrap(), key);
    }

    #[test]
    fn kind_codes_round_trip() {
        for code in 0..=10 {
            let kind = ObjectKind::from_code(code).unwrap();
            assert_eq!(kind.code(), code);
            assert_eq!(ObjectKind::from_tag(kind.tag()), Some(kind));
        }
        assert_eq!(ObjectKind::from_code(11), None);
    }

    #[test]
    fn rejects_malformed_keys() {
        assert!(matches!(
            "SCENE".parse::<ObjectKey>(),
            Err(KeyParseError::Malformed(_))
        ));
        assert!(matches!(
            "XYZ_0".parse::<ObjectKey>(),
            Err(KeyParseError::UnknownKind(_))
        ));
        assert!(matches!(
            "T_x".parse::<ObjectKey>(),
            Err(KeyParseError::InvalidId(_))
        ));
    }
}
