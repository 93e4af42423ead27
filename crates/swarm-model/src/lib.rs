// Copyright © 2025 Lukas Bower
// SPDX-License-Identifier: Apache-2.0
// Purpose: Core data model shared by the swarmtrace master and workers.
// Author: Lukas Bower
#![forbid(unsafe_code)]
#![warn(missing_docs)]

//! Data model for the swarmtrace renderer: scene-object keys, pixel-space
//! bounds, RGB spectra, and the ray state record that moves between workers.

mod geom;
mod ids;
mod ray;

pub use geom::{Bounds2i, Ray, RayDiff, Rgb};
pub use ids::{KeyParseError, ObjectKey, ObjectKind, SampleId, TreeletId, WorkerId};
pub use ray::{RayState, SampleInfo, TreeletRef};

/// The distinguished root treelet every worker holds.
pub const ROOT_TREELET: TreeletId = 0;
