// Copyright (c) 2026 Kliment Olechnovic and Mikael Lund
// Part of the molsurf project, licensed under the MIT License.
// SPDX-License-Identifier: MIT

//! Volumetric molecular surfaces: van der Waals, solvent-accessible and
//! solvent-excluded surfaces, cavities and pockets, triangulated with a
//! marching cubes variant that places vertices on exact spherical arcs.
//!
//! The solvent-excluded surface is built from the probe geometry: tangent
//! probe positions over atom triples (faces) and probe tori over atom pairs
//! (edges) are written into a voxel field together with the atom spheres,
//! and the zero isosurface of that field is extracted. Stray fragments are
//! culled afterwards.
//!
//! # Example
//!
//! ```
//! use molsurf::{Atom, SurfaceKind, SurfaceParams, compute_surface};
//!
//! let atoms = vec![
//!     Atom::new(-2.70, 0.0, 0.0, 1.7),
//!     Atom::new(2.75, 0.0, 0.0, 1.7),
//! ];
//! let params = SurfaceParams::new(SurfaceKind::SolventExcluded, 1.5).with_resolution(3.0);
//!
//! let surface = compute_surface(&atoms, &params).unwrap();
//! for set in &surface.sets {
//!     println!("fragment: volume={:.2}, area={:.2}", set.volume, set.area);
//! }
//! ```

pub mod envelope;
mod error;
mod geometry;
pub mod input;
pub mod jvxl;
pub mod lattice;
pub mod marching_cubes;
mod mc_tables;
pub mod mesh;
pub mod post_process;
pub mod solvent_geometry;
pub mod spheres_searcher;
mod surface;
mod types;
pub mod voxel_field;

pub use error::SurfaceError;
pub use lattice::{Lattice, MAX_GRID_POINTS};
pub use marching_cubes::SurfaceExtractor;
pub use mesh::{LatticeEdge, SurfaceSet, Triangle, TriangleMesh, Vertex};
pub use surface::{MIN_WORKING_RADIUS, SurfaceResult, SurfaceStats, compute_surface};
pub use types::{
    Atom, BoundingBox, Interpolation, PocketSelection, Sphere, SurfaceKind, SurfaceParams,
    WorkingAtoms,
};
