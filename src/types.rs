// Copyright (c) 2026 Kliment Olechnovic and Mikael Lund
// Part of the molsurf project, licensed under the MIT License.
// SPDX-License-Identifier: MIT

use nalgebra::{Point3, Vector3};

/// Input atom (center + radius), user-facing type.
///
/// The identity of an atom is its index in the slice handed to
/// [`compute_surface`](crate::compute_surface); vertex provenance refers to it.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Atom {
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub r: f64,
}

impl Atom {
    #[must_use]
    pub const fn new(x: f64, y: f64, z: f64, r: f64) -> Self {
        Self { x, y, z, r }
    }

    #[must_use]
    pub const fn center(&self) -> Point3<f64> {
        Point3::new(self.x, self.y, self.z)
    }
}

/// Internal sphere representation with nalgebra Point3
#[derive(Debug, Clone, Copy)]
pub struct Sphere {
    pub center: Point3<f64>,
    pub r: f64,
}

impl Sphere {
    pub const fn new(center: Point3<f64>, r: f64) -> Self {
        Self { center, r }
    }

    pub const fn from_coords(x: f64, y: f64, z: f64, r: f64) -> Self {
        Self {
            center: Point3::new(x, y, z),
            r,
        }
    }
}

/// Which surface to build.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum SurfaceKind {
    /// Union of the atom spheres.
    VanDerWaals,
    /// Union of the atom spheres grown by the probe radius.
    SolventAccessible,
    /// Molecular surface: boundary of the volume the rolling probe never enters.
    SolventExcluded,
    /// Surfaces of "foam" spheres filling the voids between atoms that the
    /// envelope cannot reach.
    Cavity {
        cavity_radius: f64,
        envelope_radius: f64,
    },
    /// Cavity surfaces classified by whether they open to the envelope.
    Pocket {
        cavity_radius: f64,
        envelope_radius: f64,
        selection: PocketSelection,
    },
}

impl SurfaceKind {
    /// Whether atoms are grown by the probe radius before the sphere pass.
    #[must_use]
    pub const fn extends_radii(&self) -> bool {
        matches!(self, Self::SolventAccessible)
    }

    #[must_use]
    pub const fn is_cavity(&self) -> bool {
        matches!(self, Self::Cavity { .. } | Self::Pocket { .. })
    }
}

/// Which fragments pocket mode keeps.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum PocketSelection {
    /// Keep fragments that reach the envelope.
    Pockets,
    /// Keep fragments fully enclosed by the structure.
    Interior,
}

/// Global edge interpolation policy for marching cubes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Interpolation {
    /// Always interpolate linearly by value.
    Linear,
    /// Place vertices on exact spherical arcs when both edge ends share a source.
    #[default]
    Nonlinear,
}

/// Axis-aligned box in world coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub min: Point3<f64>,
    pub max: Point3<f64>,
}

impl BoundingBox {
    #[must_use]
    pub const fn new(min: Point3<f64>, max: Point3<f64>) -> Self {
        Self { min, max }
    }

    /// Empty box that any inclusion will overwrite.
    #[must_use]
    pub const fn empty() -> Self {
        Self {
            min: Point3::new(f64::MAX, f64::MAX, f64::MAX),
            max: Point3::new(f64::MIN, f64::MIN, f64::MIN),
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.min.x > self.max.x || self.min.y > self.max.y || self.min.z > self.max.z
    }

    /// Grow to contain a sphere.
    pub fn include_sphere(&mut self, center: &Point3<f64>, r: f64) {
        let d = Vector3::new(r, r, r);
        self.min = self.min.inf(&(center - d));
        self.max = self.max.sup(&(center + d));
    }

    /// Whether a sphere overlaps the box (axis-wise test).
    #[must_use]
    pub fn touches_sphere(&self, center: &Point3<f64>, r: f64) -> bool {
        (0..3).all(|i| center[i] + r > self.min[i] && center[i] - r < self.max[i])
    }
}

/// Parameters of one surface computation.
#[derive(Debug, Clone)]
pub struct SurfaceParams {
    pub kind: SurfaceKind,
    /// Probe ("solvent") radius.
    pub solvent_radius: f64,
    /// Lattice resolution.
    pub points_per_unit: f64,
    /// Upper bound on lattice points along any axis.
    pub max_grid_points: usize,
    /// Isosurface value.
    pub cutoff: f64,
    pub interpolation: Interpolation,
    /// Discard small stray fragments in solvent-excluded mode.
    pub min_fragment_filter: bool,
    /// Hold only two lattice planes at a time (van der Waals / accessible only).
    pub progressive: bool,
    /// Explicit bounding box; derived from the selected atoms otherwise.
    pub bounding_box: Option<BoundingBox>,
    /// Atoms that participate; all atoms when `None`.
    pub selection: Option<Vec<bool>>,
    /// Atoms excluded from everything, including the nearby set.
    pub ignore: Option<Vec<bool>>,
    /// Restrict the sphere pass to a distance around a point.
    pub within: Option<(Point3<f64>, f64)>,
}

impl Default for SurfaceParams {
    fn default() -> Self {
        Self {
            kind: SurfaceKind::SolventExcluded,
            solvent_radius: 1.2,
            points_per_unit: 4.0,
            max_grid_points: 60,
            cutoff: 0.0,
            interpolation: Interpolation::Nonlinear,
            min_fragment_filter: true,
            progressive: false,
            bounding_box: None,
            selection: None,
            ignore: None,
            within: None,
        }
    }
}

impl SurfaceParams {
    #[must_use]
    pub fn new(kind: SurfaceKind, solvent_radius: f64) -> Self {
        Self {
            kind,
            solvent_radius,
            ..Default::default()
        }
    }

    #[must_use]
    pub const fn with_resolution(mut self, points_per_unit: f64) -> Self {
        self.points_per_unit = points_per_unit;
        self
    }

    #[must_use]
    pub const fn with_max_grid_points(mut self, max_grid_points: usize) -> Self {
        self.max_grid_points = max_grid_points;
        self
    }

    #[must_use]
    pub const fn with_interpolation(mut self, interpolation: Interpolation) -> Self {
        self.interpolation = interpolation;
        self
    }

    #[must_use]
    pub const fn with_progressive(mut self, progressive: bool) -> Self {
        self.progressive = progressive;
        self
    }

    #[must_use]
    pub fn with_selection(mut self, selection: Vec<bool>) -> Self {
        self.selection = Some(selection);
        self
    }
}

/// Atoms taking part in one computation, in internal order: selected atoms
/// first, then nearby atoms that only block the surface.
#[derive(Debug, Clone, Default)]
pub struct WorkingAtoms {
    pub centers: Vec<Point3<f64>>,
    /// Working radius: van der Waals radius, grown by the probe in accessible mode.
    pub radii: Vec<f64>,
    /// Index into the caller's atom slice; `None` for synthetic atoms.
    pub input_index: Vec<Option<usize>>,
    /// Atoms at or after this index are nearby, not selected.
    pub first_nearby: usize,
}

impl WorkingAtoms {
    #[must_use]
    pub const fn len(&self) -> usize {
        self.centers.len()
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.centers.is_empty()
    }

    pub fn push(&mut self, center: Point3<f64>, r: f64, input_index: Option<usize>) {
        self.centers.push(center);
        self.radii.push(r);
        self.input_index.push(input_index);
    }

    #[must_use]
    pub fn max_radius(&self) -> f64 {
        self.radii.iter().copied().fold(0.0, f64::max)
    }

    #[must_use]
    pub const fn is_nearby(&self, i: usize) -> bool {
        i >= self.first_nearby
    }

    /// Extended spheres (radius grown by `probe`) for neighbor searching.
    #[must_use]
    pub fn spheres(&self, probe: f64) -> Vec<Sphere> {
        self.centers
            .iter()
            .zip(&self.radii)
            .map(|(c, r)| Sphere::new(*c, r + probe))
            .collect()
    }
}
