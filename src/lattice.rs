// Copyright (c) 2026 Kliment Olechnovic and Mikael Lund
// Part of the molsurf project, licensed under the MIT License.
// SPDX-License-Identifier: MIT

//! Regular 3-D lattice and the voxel storage laid over it.
//!
//! Points are addressed by `(i, j, k)` along the three basis vectors, with the
//! flat index `i * ny * nz + j * nz + k`; `i` is the plane axis used by
//! progressive extraction.

use log::debug;
use nalgebra::{Matrix3, Point3, Vector3};

use crate::error::SurfaceError;
use crate::types::BoundingBox;

/// Hard cap on stored lattice points (values plus source tags per point).
pub const MAX_GRID_POINTS: u64 = 1 << 27;

/// Value of a voxel no pass has written yet.
pub const UNMARKED: f64 = f64::MAX;

/// Half-open index window `[min, max)` per axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Window {
    pub min: [usize; 3],
    pub max: [usize; 3],
}

impl Window {
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.min[0] >= self.max[0] || self.min[1] >= self.max[1] || self.min[2] >= self.max[2]
    }

    /// Smallest window containing both.
    #[must_use]
    pub fn union(&self, other: &Self) -> Self {
        if self.is_empty() {
            return *other;
        }
        if other.is_empty() {
            return *self;
        }
        Self {
            min: std::array::from_fn(|a| self.min[a].min(other.min[a])),
            max: std::array::from_fn(|a| self.max[a].max(other.max[a])),
        }
    }

    /// Restrict the plane axis to a single index.
    #[must_use]
    pub fn restrict_to_plane(&self, x: usize) -> Self {
        let mut w = *self;
        w.min[0] = self.min[0].max(x);
        w.max[0] = self.max[0].min(x + 1);
        w
    }

    /// All `(i, j, k)` in the window, plane-major.
    pub fn points(&self) -> impl Iterator<Item = [usize; 3]> + use<> {
        let w = *self;
        (w.min[0]..w.max[0]).flat_map(move |i| {
            (w.min[1]..w.max[1]).flat_map(move |j| (w.min[2]..w.max[2]).map(move |k| [i, j, k]))
        })
    }
}

/// Lattice origin, basis vectors and point counts.
#[derive(Debug, Clone, PartialEq)]
pub struct Lattice {
    origin: Point3<f64>,
    vectors: [Vector3<f64>; 3],
    counts: [usize; 3],
    inverse: Matrix3<f64>,
    lengths: [f64; 3],
}

impl Lattice {
    /// Lattice with arbitrary basis vectors.
    ///
    /// # Errors
    ///
    /// Returns [`SurfaceError::DegenerateLattice`] if the vectors are not
    /// linearly independent or a count is below 2.
    pub fn new(
        origin: Point3<f64>,
        vectors: [Vector3<f64>; 3],
        counts: [usize; 3],
    ) -> Result<Self, SurfaceError> {
        if counts.iter().any(|&n| n < 2) {
            return Err(SurfaceError::DegenerateLattice);
        }
        let basis = Matrix3::from_columns(&vectors);
        let inverse = basis
            .try_inverse()
            .filter(|m| m.iter().all(|v| v.is_finite()))
            .ok_or(SurfaceError::DegenerateLattice)?;
        Ok(Self {
            origin,
            vectors,
            counts,
            inverse,
            lengths: vectors.map(|v| v.norm()),
        })
    }

    /// Axis-aligned lattice covering `bounds` at `points_per_unit`, with at
    /// most `max_points` points along any axis.
    ///
    /// A degenerate extent on an axis falls back to `[-10, 10]`.
    ///
    /// # Errors
    ///
    /// Returns [`SurfaceError::InvalidParameter`] for a non-positive resolution
    /// or a cap below 2.
    #[allow(
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss,
        clippy::cast_precision_loss
    )]
    pub fn from_bounds(
        bounds: &BoundingBox,
        points_per_unit: f64,
        max_points: usize,
    ) -> Result<Self, SurfaceError> {
        if !(points_per_unit.is_finite() && points_per_unit > 0.0) {
            return Err(SurfaceError::InvalidParameter {
                name: "points_per_unit",
                value: points_per_unit,
            });
        }
        if max_points < 2 {
            return Err(SurfaceError::InvalidParameter {
                name: "max_grid_points",
                value: max_points as f64,
            });
        }
        let mut origin = Point3::origin();
        let mut vectors = [Vector3::zeros(); 3];
        let mut counts = [0; 3];
        for axis in 0..3 {
            let (mut lo, mut hi) = (bounds.min[axis], bounds.max[axis]);
            if !(hi > lo && (hi - lo).is_finite()) {
                lo = -10.0;
                hi = 10.0;
            }
            let range = hi - lo;
            let n = ((range * points_per_unit).floor().min(max_points as f64) as usize + 1)
                .clamp(2, max_points);
            origin[axis] = lo;
            vectors[axis][axis] = range / (n - 1) as f64;
            counts[axis] = n;
        }
        debug!(
            "lattice {}x{}x{} from {:?} with spacing {:?}",
            counts[0],
            counts[1],
            counts[2],
            origin,
            vectors.map(|v| v.norm())
        );
        Self::new(origin, vectors, counts)
    }

    #[must_use]
    pub const fn origin(&self) -> &Point3<f64> {
        &self.origin
    }

    #[must_use]
    pub const fn counts(&self) -> [usize; 3] {
        self.counts
    }

    #[must_use]
    pub const fn vector(&self, axis: usize) -> &Vector3<f64> {
        &self.vectors[axis]
    }

    #[must_use]
    pub const fn n_points(&self) -> usize {
        self.counts[0] * self.counts[1] * self.counts[2]
    }

    /// Points in one `i` plane.
    #[must_use]
    pub const fn plane_len(&self) -> usize {
        self.counts[1] * self.counts[2]
    }

    #[must_use]
    pub const fn point_index(&self, i: usize, j: usize, k: usize) -> usize {
        i * self.plane_len() + j * self.counts[2] + k
    }

    #[must_use]
    pub const fn plane_index(&self, j: usize, k: usize) -> usize {
        j * self.counts[2] + k
    }

    #[must_use]
    pub const fn index_to_ijk(&self, index: usize) -> [usize; 3] {
        let plane = self.plane_len();
        let rest = index % plane;
        [index / plane, rest / self.counts[2], rest % self.counts[2]]
    }

    /// Length of the longest basis vector.
    #[must_use]
    pub fn max_spacing(&self) -> f64 {
        self.lengths.iter().copied().fold(0.0, f64::max)
    }

    #[must_use]
    pub fn spacing(&self, axis: usize) -> f64 {
        self.lengths[axis]
    }

    /// Whether the basis is left-handed, which flips triangle winding.
    #[must_use]
    pub fn is_left_handed(&self) -> bool {
        self.vectors[0].dot(&self.vectors[1].cross(&self.vectors[2])) < 0.0
    }

    #[allow(clippy::cast_precision_loss)]
    #[must_use]
    pub fn to_world(&self, i: usize, j: usize, k: usize) -> Point3<f64> {
        self.origin
            + self.vectors[0] * i as f64
            + self.vectors[1] * j as f64
            + self.vectors[2] * k as f64
    }

    /// Fractional lattice coordinates of a world point.
    #[must_use]
    pub fn to_lattice(&self, p: &Point3<f64>) -> Vector3<f64> {
        self.inverse * (p - self.origin)
    }

    /// Lattice indices of a world point, truncated toward zero. May lie
    /// outside the lattice.
    #[allow(clippy::cast_possible_truncation)]
    #[must_use]
    pub fn to_lattice_approx(&self, p: &Point3<f64>) -> [i64; 3] {
        let c = self.to_lattice(p);
        [0, 1, 2].map(|axis| c[axis].trunc().clamp(-1e15, 1e15) as i64)
    }

    /// Index window of lattice points that may lie within `radius` of
    /// `center`, widened by `margin`.
    ///
    /// The center is truncated toward zero and the window extends one extra
    /// point on each side, then is clamped to the lattice.
    #[allow(
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss,
        clippy::cast_possible_wrap
    )]
    #[must_use]
    pub fn window_for_sphere(&self, center: &Point3<f64>, radius: f64, margin: f64) -> Window {
        let r = radius + margin;
        let c = self.to_lattice_approx(center);
        let mut w = Window {
            min: [0; 3],
            max: [0; 3],
        };
        for axis in 0..3 {
            let n = self.counts[axis] as i64;
            let ci = c[axis];
            // a ball of radius r spans r·|row| in fractional coordinates
            let extent = (r * self.inverse.row(axis).norm()).ceil().clamp(0.0, 1e15) as i64;
            w.min[axis] = (ci - extent - 1).clamp(0, n) as usize;
            w.max[axis] = (ci + extent + 1).clamp(0, n) as usize;
        }
        w
    }

    /// Size check before allocating `points` stored voxels.
    ///
    /// # Errors
    ///
    /// Returns [`SurfaceError::GridTooLarge`] when `points` exceeds
    /// [`MAX_GRID_POINTS`].
    pub fn check_storage(points: usize) -> Result<(), SurfaceError> {
        let points = u64::try_from(points).unwrap_or(u64::MAX);
        if points > MAX_GRID_POINTS {
            return Err(SurfaceError::GridTooLarge {
                points,
                limit: MAX_GRID_POINTS,
            });
        }
        Ok(())
    }
}

/// Full voxel storage: a value and a source tag per lattice point.
///
/// Source tags: `0` untouched, `k > 0` atom `k - 1`, `k < 0` probe surface
/// owned by atom `-k - 1`.
#[derive(Debug, Clone)]
pub struct VoxelGrid {
    lattice: Lattice,
    values: Vec<f64>,
    sources: Vec<i32>,
}

impl VoxelGrid {
    /// Grid with every voxel unmarked.
    ///
    /// # Errors
    ///
    /// Returns [`SurfaceError::GridTooLarge`] if the lattice is too large to store.
    pub fn new(lattice: Lattice) -> Result<Self, SurfaceError> {
        let n = lattice.n_points();
        Lattice::check_storage(n)?;
        Ok(Self {
            lattice,
            values: vec![UNMARKED; n],
            sources: vec![0; n],
        })
    }

    #[must_use]
    pub const fn lattice(&self) -> &Lattice {
        &self.lattice
    }

    #[must_use]
    pub fn value(&self, i: usize, j: usize, k: usize) -> f64 {
        self.values[self.lattice.point_index(i, j, k)]
    }

    pub fn set_value(&mut self, i: usize, j: usize, k: usize, v: f64) {
        let index = self.lattice.point_index(i, j, k);
        self.values[index] = v;
    }

    #[must_use]
    pub fn source(&self, i: usize, j: usize, k: usize) -> i32 {
        self.sources[self.lattice.point_index(i, j, k)]
    }

    pub fn set_source(&mut self, i: usize, j: usize, k: usize, s: i32) {
        let index = self.lattice.point_index(i, j, k);
        self.sources[index] = s;
    }

    #[must_use]
    pub fn values(&self) -> &[f64] {
        &self.values
    }

    #[must_use]
    pub fn sources(&self) -> &[i32] {
        &self.sources
    }

    /// Mutable values and sources together.
    pub fn storage_mut(&mut self) -> (&mut [f64], &mut [i32]) {
        (&mut self.values, &mut self.sources)
    }

    /// Every voxel back to unmarked and untouched.
    pub fn reset(&mut self) {
        self.values.fill(UNMARKED);
        self.sources.fill(0);
    }

    /// Turn every still-unmarked voxel into NaN ("no data").
    pub fn unset_unmarked(&mut self) {
        unset_unmarked(&mut self.values);
    }

    /// Copy plane `i` into `plane`.
    pub fn copy_plane(&self, i: usize, plane: &mut VoxelPlane) {
        let len = self.lattice.plane_len();
        let range = i * len..(i + 1) * len;
        plane.values.copy_from_slice(&self.values[range.clone()]);
        plane.sources.copy_from_slice(&self.sources[range]);
    }
}

pub(crate) fn unset_unmarked(values: &mut [f64]) {
    for v in values.iter_mut().filter(|v| **v == UNMARKED) {
        *v = f64::NAN;
    }
}

/// One `i` plane of voxel data, as held by progressive extraction.
#[derive(Debug, Clone)]
pub struct VoxelPlane {
    pub values: Vec<f64>,
    pub sources: Vec<i32>,
    /// Points that belong to the surface-voxel set.
    pub surface: Vec<bool>,
}

impl VoxelPlane {
    #[must_use]
    pub fn new(len: usize) -> Self {
        Self {
            values: vec![UNMARKED; len],
            sources: vec![0; len],
            surface: vec![false; len],
        }
    }

    pub fn reset(&mut self) {
        self.values.fill(UNMARKED);
        self.sources.fill(0);
        self.surface.fill(false);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn unit_box(n: f64) -> BoundingBox {
        BoundingBox::new(Point3::new(0.0, 0.0, 0.0), Point3::new(n, n, n))
    }

    #[test]
    fn test_from_bounds_spacing() {
        let lattice = Lattice::from_bounds(&unit_box(10.0), 4.0, 100).unwrap();
        assert_eq!(lattice.counts(), [41, 41, 41]);
        assert_relative_eq!(lattice.spacing(0), 0.25);
        let far = lattice.to_world(40, 40, 40);
        assert_relative_eq!(far.x, 10.0, epsilon = 1e-12);
        assert_relative_eq!(far.z, 10.0, epsilon = 1e-12);
    }

    #[test]
    fn test_from_bounds_caps_points() {
        let lattice = Lattice::from_bounds(&unit_box(10.0), 4.0, 21).unwrap();
        assert_eq!(lattice.counts(), [21, 21, 21]);
        assert_relative_eq!(lattice.spacing(1), 0.5);
    }

    #[test]
    fn test_from_bounds_degenerate_axis() {
        let bounds = BoundingBox::new(Point3::new(0.0, 1.0, 2.0), Point3::new(4.0, 1.0, 3.0));
        let lattice = Lattice::from_bounds(&bounds, 1.0, 100).unwrap();
        assert_relative_eq!(lattice.origin().y, -10.0);
        assert_eq!(lattice.counts()[1], 21);
    }

    #[test]
    fn test_invalid_resolution() {
        assert!(matches!(
            Lattice::from_bounds(&unit_box(1.0), 0.0, 10),
            Err(SurfaceError::InvalidParameter { .. })
        ));
    }

    #[test]
    fn test_degenerate_basis() {
        let v = Vector3::new(1.0, 0.0, 0.0);
        let r = Lattice::new(Point3::origin(), [v, v, Vector3::new(0.0, 0.0, 1.0)], [3, 3, 3]);
        assert_eq!(r.unwrap_err(), SurfaceError::DegenerateLattice);
    }

    #[test]
    fn test_index_round_trip() {
        let lattice = Lattice::from_bounds(&unit_box(3.0), 2.0, 100).unwrap();
        let idx = lattice.point_index(2, 3, 4);
        assert_eq!(lattice.index_to_ijk(idx), [2, 3, 4]);
        let p = lattice.to_world(2, 3, 4);
        let f = lattice.to_lattice(&p);
        assert_relative_eq!(f.x, 2.0, epsilon = 1e-12);
        assert_relative_eq!(f.z, 4.0, epsilon = 1e-12);
        let inside = p + (lattice.vector(0) + lattice.vector(1) + lattice.vector(2)) * 0.5;
        assert_eq!(lattice.to_lattice_approx(&inside), [2, 3, 4]);
    }

    #[test]
    fn test_window_covers_sphere() {
        let lattice = Lattice::from_bounds(&unit_box(10.0), 2.0, 100).unwrap();
        let center = Point3::new(5.1, 5.1, 5.1);
        let w = lattice.window_for_sphere(&center, 1.0, 0.0);
        for ijk in lattice_points(&lattice) {
            let p = lattice.to_world(ijk[0], ijk[1], ijk[2]);
            if (p - center).norm() <= 1.0 {
                assert!((0..3).all(|a| ijk[a] >= w.min[a] && ijk[a] < w.max[a]));
            }
        }
        // clamped at the lattice boundary
        let w = lattice.window_for_sphere(&Point3::new(-50.0, 0.0, 0.0), 1.0, 0.0);
        assert!(w.is_empty());
    }

    #[test]
    fn test_window_covers_sphere_on_skewed_lattice() {
        let vectors = [
            Vector3::new(0.5, 0.0, 0.0),
            Vector3::new(0.45, 0.2, 0.0),
            Vector3::new(0.0, 0.3, 0.4),
        ];
        let lattice = Lattice::new(Point3::new(-6.0, -3.0, -3.0), vectors, [60, 40, 30]).unwrap();
        let center = Point3::new(8.3, 5.8, 4.7);
        let radius = 1.2;
        let w = lattice.window_for_sphere(&center, radius, 0.0);
        let mut covered = 0;
        for ijk in lattice_points(&lattice) {
            let p = lattice.to_world(ijk[0], ijk[1], ijk[2]);
            if (p - center).norm() <= radius {
                covered += 1;
                assert!(
                    (0..3).all(|a| ijk[a] >= w.min[a] && ijk[a] < w.max[a]),
                    "{ijk:?} outside {w:?}"
                );
            }
        }
        assert!(covered > 0);
    }

    #[test]
    fn test_window_points_outlive_window() {
        let points = {
            let w = Window {
                min: [1, 0, 2],
                max: [3, 2, 4],
            };
            w.points()
        };
        let points: Vec<[usize; 3]> = points.collect();
        assert_eq!(points.len(), 8);
        assert_eq!(points[0], [1, 0, 2]);
        assert_eq!(points[7], [2, 1, 3]);
        assert_eq!(lattice_points(&Lattice::from_bounds(&unit_box(2.0), 1.0, 100).unwrap()).count(), 27);
    }

    fn lattice_points(lattice: &Lattice) -> impl Iterator<Item = [usize; 3]> {
        let c = lattice.counts();
        Window {
            min: [0; 3],
            max: c,
        }
        .points()
    }

    #[test]
    fn test_grid_too_large() {
        let bounds = unit_box(1000.0);
        let lattice = Lattice::from_bounds(&bounds, 10.0, 10_000).unwrap();
        assert!(matches!(
            VoxelGrid::new(lattice),
            Err(SurfaceError::GridTooLarge { .. })
        ));
    }

    #[test]
    fn test_voxel_grid_access_and_unset() {
        let lattice = Lattice::from_bounds(&unit_box(2.0), 1.0, 100).unwrap();
        let mut grid = VoxelGrid::new(lattice).unwrap();
        grid.set_value(1, 2, 0, -0.5);
        grid.set_source(1, 2, 0, 3);
        assert_relative_eq!(grid.value(1, 2, 0), -0.5);
        assert_eq!(grid.source(1, 2, 0), 3);
        grid.unset_unmarked();
        assert!(grid.value(0, 0, 0).is_nan());
        assert_relative_eq!(grid.value(1, 2, 0), -0.5);

        let mut plane = VoxelPlane::new(grid.lattice().plane_len());
        grid.copy_plane(1, &mut plane);
        assert_relative_eq!(plane.values[grid.lattice().plane_index(2, 0)], -0.5);
    }
}
