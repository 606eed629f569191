// Copyright (c) 2026 Kliment Olechnovic and Mikael Lund
// Part of the molsurf project, licensed under the MIT License.
// SPDX-License-Identifier: MIT

//! Voxel marking passes: every lattice point near the surface receives a
//! signed distance-like value and a tag naming the geometric source that
//! produced it.
//!
//! Values are negative inside the molecule and positive outside; points no
//! pass reaches end up as NaN.

use log::debug;
use nalgebra::Point3;

use crate::error::SurfaceError;
use crate::geometry::{is_in_trigonal_cone, trough_distance};
use crate::lattice::{Lattice, UNMARKED, VoxelGrid, VoxelPlane, Window, unset_unmarked};
use crate::solvent_geometry::SolventGeometry;
use crate::types::WorkingAtoms;

/// Interior face values deeper than this many lattice spacings are not written.
const INTERIOR_FACE_DEPTH: f64 = 1.8;

/// Sphere whose distance function produced a voxel value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SourceSphere {
    pub radius: f64,
    /// Probe spheres store `radius - distance`; atoms store `distance - radius`.
    pub inverted: bool,
}

/// Producer of voxel planes for surface extraction.
pub trait VoxelSource {
    fn lattice(&self) -> &Lattice;

    /// Values, sources and surface flags of plane `i`.
    fn fill_plane(&self, i: usize, plane: &mut VoxelPlane);

    /// Sphere behind a source tag, if the tag names one.
    fn source_sphere(&self, source: i32) -> Option<SourceSphere>;

    /// Caller atom index behind a source tag.
    fn source_atom(&self, source: i32) -> Option<usize>;
}

/// Options of one sphere pass.
#[derive(Debug, Clone, Copy, Default)]
pub struct SpherePass<'a> {
    /// When positive, only points within this distance beyond the sphere
    /// surface are written.
    pub reach: f64,
    /// Extra search radius around each sphere.
    pub window: f64,
    /// Points farther than the given distance from the given point become NaN.
    pub within: Option<(Point3<f64>, f64)>,
    /// Atoms whose interior points count as surface voxels.
    pub surface_atoms: Option<&'a [bool]>,
}

fn atom_sphere(atoms: &WorkingAtoms, solvent_radius: f64, source: i32) -> Option<SourceSphere> {
    match source.signum() {
        1 => atoms
            .radii
            .get(source.unsigned_abs() as usize - 1)
            .map(|&radius| SourceSphere {
                radius,
                inverted: false,
            }),
        -1 => Some(SourceSphere {
            radius: solvent_radius,
            inverted: true,
        }),
        _ => None,
    }
}

fn atom_of_source(atoms: &WorkingAtoms, source: i32) -> Option<usize> {
    if source == 0 {
        return None;
    }
    atoms
        .input_index
        .get(source.unsigned_abs() as usize - 1)
        .copied()
        .flatten()
}

#[allow(clippy::cast_possible_truncation, clippy::cast_possible_wrap)]
const fn atom_tag(atom: usize) -> i32 {
    atom as i32 + 1
}

#[allow(clippy::cast_possible_truncation, clippy::cast_possible_wrap)]
const fn probe_tag(atom: usize) -> i32 {
    -1 - atom as i32
}

/// Storage a sphere pass writes into: either the full grid (`offset` 0) or a
/// single plane (`offset` = first point index of the plane).
struct Target<'a> {
    values: &'a mut [f64],
    sources: &'a mut [i32],
    surface: &'a mut [bool],
    offset: usize,
}

/// Write one atom's sphere distances over `window`.
fn mark_sphere(
    lattice: &Lattice,
    atoms: &WorkingAtoms,
    atom: usize,
    pass: &SpherePass<'_>,
    window: &Window,
    target: &mut Target<'_>,
) {
    let center = atoms.centers[atom];
    let r = atoms.radii[atom];
    let nearby = atoms.is_nearby(atom);
    let is_surface = pass.surface_atoms.is_some_and(|s| s[atom]);
    for [i, j, k] in window.points() {
        let pt = lattice.to_world(i, j, k);
        let index = lattice.point_index(i, j, k) - target.offset;
        let mut value = (pt - center).norm() - r;
        if !((pass.reach == 0.0 || value <= r + pass.reach) && value < target.values[index]) {
            continue;
        }
        if nearby || pass.within.is_some_and(|(p, d)| (pt - p).norm() > d) {
            value = f64::NAN;
        }
        target.values[index] = value;
        if !value.is_nan() {
            target.sources[index] = atom_tag(atom);
            if value < 0.0 && is_surface {
                target.surface[index] = true;
            }
        }
    }
}

/// Whether an atom can contribute under a `within` restriction.
fn atom_in_range(atoms: &WorkingAtoms, atom: usize, pass: &SpherePass<'_>) -> bool {
    pass.within.is_none_or(|(p, d)| {
        (atoms.centers[atom] - p).norm() <= d + atoms.radii[atom] + 0.5
    })
}

/// Fully stored voxel field built by successive marking passes.
#[derive(Debug, Clone)]
pub struct VoxelField {
    grid: VoxelGrid,
    surface: Vec<bool>,
    surface_done: Vec<bool>,
    atoms: WorkingAtoms,
    solvent_radius: f64,
    margin: f64,
}

impl VoxelField {
    /// Unmarked field over `lattice` for `atoms`.
    ///
    /// # Errors
    ///
    /// Returns [`SurfaceError::GridTooLarge`] if the lattice cannot be stored.
    pub fn new(
        lattice: Lattice,
        atoms: WorkingAtoms,
        solvent_radius: f64,
    ) -> Result<Self, SurfaceError> {
        let margin = 2.0 * lattice.max_spacing();
        let grid = VoxelGrid::new(lattice)?;
        let n = grid.lattice().n_points();
        Ok(Self {
            grid,
            surface: vec![false; n],
            surface_done: Vec::new(),
            atoms,
            solvent_radius,
            margin,
        })
    }

    #[must_use]
    pub const fn grid(&self) -> &VoxelGrid {
        &self.grid
    }

    #[must_use]
    pub const fn atoms(&self) -> &WorkingAtoms {
        &self.atoms
    }

    /// Points flagged as lying on the probe-reachable surface.
    #[must_use]
    pub fn surface_voxels(&self) -> &[bool] {
        &self.surface
    }

    /// Swap in a new atom set and clear every voxel.
    pub fn reset_with_atoms(&mut self, atoms: WorkingAtoms) {
        self.atoms = atoms;
        self.grid.reset();
        self.surface.fill(false);
        self.surface_done.clear();
    }

    pub fn unset_unmarked(&mut self) {
        self.grid.unset_unmarked();
    }

    /// Write probe-sphere values inside the trigonal cone of every valid face.
    ///
    /// The exterior pass writes points inside a probe, keeping the largest
    /// value per point. The interior pass writes a thin negative shell below
    /// the probe for points the exterior pass never reached.
    pub fn mark_face_voxels(&mut self, geometry: &SolventGeometry, exterior: bool) {
        let lattice = self.grid.lattice().clone();
        let n = lattice.n_points();
        let rs = self.solvent_radius;
        let min_interior = -INTERIOR_FACE_DEPTH * lattice.max_spacing();
        if self.surface_done.len() != n {
            self.surface_done = vec![false; n];
        }
        let mut this_pass = vec![false; n];
        let (values, sources) = self.grid.storage_mut();
        let mut written = 0_usize;

        for face in geometry.valid_faces().rev() {
            let [a, b, c] = face.atoms.map(|i| self.atoms.centers[i]);
            let window = lattice.window_for_sphere(&face.probe, rs, self.margin);
            for [i, j, k] in window.points() {
                let pt = lattice.to_world(i, j, k);
                let index = lattice.point_index(i, j, k);
                let value = rs - (pt - face.probe).norm();
                let current = values[index];
                if exterior && value > 0.0 {
                    self.surface_done[index] = true;
                }
                if !is_in_trigonal_cone(&pt, &a, &b, &c, &face.probe) {
                    continue;
                }
                let ordered = (value > current) == this_pass[index];
                let accept = if exterior {
                    value > 0.0 && (current < 0.0 || current == UNMARKED || ordered)
                } else {
                    !self.surface_done[index] && value < 0.0 && value > min_interior && ordered
                };
                if accept {
                    this_pass[index] = true;
                    values[index] = value;
                    sources[index] = probe_tag(face.atoms[0]);
                    if value > 0.0 {
                        self.surface[index] = true;
                    }
                    written += 1;
                }
            }
        }
        debug!(
            "{} face pass wrote {written} voxels",
            if exterior { "exterior" } else { "interior" }
        );
    }

    /// Write toroidal probe values in the trough of every edge the probe can
    /// roll around, keeping the smaller value.
    pub fn mark_toroid_voxels(&mut self, geometry: &SolventGeometry) {
        let lattice = self.grid.lattice().clone();
        let rs = self.solvent_radius;
        let (values, sources) = self.grid.storage_mut();
        let mut written = 0_usize;

        for edge in geometry.toroidal_edges() {
            let (a, b) = (self.atoms.centers[edge.a], self.atoms.centers[edge.b]);
            let r_as = self.atoms.radii[edge.a] + rs;
            let r_bs = self.atoms.radii[edge.b] + rs;
            let d_ab = (b - a).norm();
            let window = lattice
                .window_for_sphere(&a, r_as, self.margin)
                .union(&lattice.window_for_sphere(&b, r_bs, self.margin));
            for [i, j, k] in window.points() {
                let pt = lattice.to_world(i, j, k);
                let Some(d_vs) = trough_distance(&a, r_as, &b, r_bs, d_ab, &pt) else {
                    continue;
                };
                let index = lattice.point_index(i, j, k);
                let value = rs - d_vs;
                if value < values[index] {
                    values[index] = value;
                    sources[index] = probe_tag(edge.a);
                    written += 1;
                }
            }
        }
        debug!("toroidal pass wrote {written} voxels");
    }

    /// Write atom-sphere distances, keeping the smaller value per point.
    ///
    /// Nearby atoms write NaN so the surface cannot pass through them.
    pub fn mark_sphere_voxels(&mut self, pass: &SpherePass<'_>) {
        let lattice = self.grid.lattice().clone();
        let (values, sources) = self.grid.storage_mut();
        let mut target = Target {
            values,
            sources,
            surface: &mut self.surface,
            offset: 0,
        };
        for atom in 0..self.atoms.len() {
            if !atom_in_range(&self.atoms, atom, pass) {
                continue;
            }
            let window = lattice.window_for_sphere(
                &self.atoms.centers[atom],
                self.atoms.radii[atom] + pass.reach.max(pass.window),
                self.margin,
            );
            mark_sphere(&lattice, &self.atoms, atom, pass, &window, &mut target);
        }
    }
}

impl VoxelSource for VoxelField {
    fn lattice(&self) -> &Lattice {
        self.grid.lattice()
    }

    fn fill_plane(&self, i: usize, plane: &mut VoxelPlane) {
        self.grid.copy_plane(i, plane);
        let len = self.grid.lattice().plane_len();
        plane
            .surface
            .copy_from_slice(&self.surface[i * len..(i + 1) * len]);
    }

    fn source_sphere(&self, source: i32) -> Option<SourceSphere> {
        atom_sphere(&self.atoms, self.solvent_radius, source)
    }

    fn source_atom(&self, source: i32) -> Option<usize> {
        atom_of_source(&self.atoms, source)
    }
}

/// Sphere-only field computed one plane at a time, never storing the full grid.
#[derive(Debug, Clone)]
pub struct ProgressiveSphereField<'a> {
    lattice: Lattice,
    atoms: WorkingAtoms,
    pass: SpherePass<'a>,
    windows: Vec<Window>,
    atoms_by_plane: Vec<Vec<usize>>,
}

impl<'a> ProgressiveSphereField<'a> {
    /// Index, for each plane, the atoms whose window reaches it.
    ///
    /// # Errors
    ///
    /// Returns [`SurfaceError::GridTooLarge`] if even two planes cannot be stored.
    pub fn new(
        lattice: Lattice,
        atoms: WorkingAtoms,
        pass: SpherePass<'a>,
    ) -> Result<Self, SurfaceError> {
        Lattice::check_storage(2 * lattice.plane_len())?;
        let margin = 2.0 * lattice.max_spacing();
        let mut atoms_by_plane = vec![Vec::new(); lattice.counts()[0]];
        let mut windows = Vec::with_capacity(atoms.len());
        for atom in 0..atoms.len() {
            let window = lattice.window_for_sphere(
                &atoms.centers[atom],
                atoms.radii[atom] + pass.reach.max(pass.window),
                margin,
            );
            if atom_in_range(&atoms, atom, &pass) && !window.is_empty() {
                for plane in &mut atoms_by_plane[window.min[0]..window.max[0]] {
                    plane.push(atom);
                }
            }
            windows.push(window);
        }
        Ok(Self {
            lattice,
            atoms,
            pass,
            windows,
            atoms_by_plane,
        })
    }
}

impl VoxelSource for ProgressiveSphereField<'_> {
    fn lattice(&self) -> &Lattice {
        &self.lattice
    }

    fn fill_plane(&self, i: usize, plane: &mut VoxelPlane) {
        plane.reset();
        let mut target = Target {
            values: &mut plane.values,
            sources: &mut plane.sources,
            surface: &mut plane.surface,
            offset: i * self.lattice.plane_len(),
        };
        for &atom in &self.atoms_by_plane[i] {
            let window = self.windows[atom].restrict_to_plane(i);
            mark_sphere(&self.lattice, &self.atoms, atom, &self.pass, &window, &mut target);
        }
        unset_unmarked(&mut plane.values);
    }

    fn source_sphere(&self, source: i32) -> Option<SourceSphere> {
        atom_sphere(&self.atoms, 0.0, source)
    }

    fn source_atom(&self, source: i32) -> Option<usize> {
        atom_of_source(&self.atoms, source)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::BoundingBox;
    use approx::assert_relative_eq;

    fn lattice(half: f64, ppu: f64) -> Lattice {
        let bounds = BoundingBox::new(
            Point3::new(-half, -half, -half),
            Point3::new(half, half, half),
        );
        Lattice::from_bounds(&bounds, ppu, 200).unwrap()
    }

    fn working(balls: &[(f64, f64, f64, f64)], first_nearby: usize) -> WorkingAtoms {
        let mut atoms = WorkingAtoms::default();
        for (i, &(x, y, z, r)) in balls.iter().enumerate() {
            atoms.push(Point3::new(x, y, z), r, Some(i));
        }
        atoms.first_nearby = first_nearby;
        atoms
    }

    #[test]
    fn test_sphere_pass_single_atom() {
        let atoms = working(&[(0.0, 0.0, 0.0, 2.0)], 1);
        let mut field = VoxelField::new(lattice(5.0, 2.0), atoms, 0.0).unwrap();
        let surface = [true];
        field.mark_sphere_voxels(&SpherePass {
            surface_atoms: Some(&surface),
            ..SpherePass::default()
        });
        field.unset_unmarked();
        let grid = field.grid();
        // lattice point 10 sits at the origin
        assert_relative_eq!(grid.value(10, 10, 10), -2.0, epsilon = 1e-12);
        assert_eq!(grid.source(10, 10, 10), 1);
        assert_relative_eq!(grid.value(10, 10, 16), 1.0, epsilon = 1e-12);
        // beyond radius + margin
        assert!(grid.value(0, 0, 0).is_nan());
        let index = grid.lattice().point_index(10, 10, 10);
        assert!(field.surface_voxels()[index]);
        assert_eq!(field.source_atom(1), Some(0));
        assert_eq!(
            field.source_sphere(1),
            Some(SourceSphere {
                radius: 2.0,
                inverted: false
            })
        );
    }

    #[test]
    fn test_nearby_atoms_block_with_nan() {
        let atoms = working(&[(-1.5, 0.0, 0.0, 2.0), (1.5, 0.0, 0.0, 2.0)], 1);
        let mut field = VoxelField::new(lattice(5.0, 2.0), atoms, 0.0).unwrap();
        field.mark_sphere_voxels(&SpherePass::default());
        field.unset_unmarked();
        let grid = field.grid();
        // x = 2.0 is closer to the nearby atom
        assert!(grid.value(14, 10, 10).is_nan());
        // x = -2.0 belongs to the selected atom
        assert_relative_eq!(grid.value(6, 10, 10), -1.5, epsilon = 1e-12);
    }

    #[test]
    fn test_within_restriction() {
        let atoms = working(&[(0.0, 0.0, 0.0, 2.0)], 1);
        let mut field = VoxelField::new(lattice(5.0, 2.0), atoms, 0.0).unwrap();
        field.mark_sphere_voxels(&SpherePass {
            within: Some((Point3::new(-2.0, 0.0, 0.0), 1.0)),
            ..SpherePass::default()
        });
        let grid = field.grid();
        assert_relative_eq!(grid.value(6, 10, 10), 0.0, epsilon = 1e-12);
        assert!(grid.value(14, 10, 10).is_nan());
    }

    #[test]
    fn test_toroid_pass_between_two_atoms() {
        let atoms = working(&[(-2.0, 0.0, 0.0, 1.5), (2.0, 0.0, 0.0, 1.5)], 2);
        let geometry = SolventGeometry::build(&atoms, 1.5);
        let mut field = VoxelField::new(lattice(6.0, 2.0), atoms, 1.5).unwrap();
        field.mark_toroid_voxels(&geometry);
        let grid = field.grid();
        // origin: distance to the probe ring is sqrt(9 - 4)
        assert_relative_eq!(grid.value(12, 12, 12), 1.5 - 5.0_f64.sqrt(), epsilon = 1e-9);
        assert_eq!(grid.source(12, 12, 12), -1);
        assert_eq!(
            field.source_sphere(-1),
            Some(SourceSphere {
                radius: 1.5,
                inverted: true
            })
        );
        // far from the trough
        assert_eq!(grid.value(0, 0, 0), UNMARKED);
    }

    #[test]
    fn test_face_pass_writes_probe_values() {
        let atoms = working(
            &[(0.0, 0.0, 0.0, 1.5), (3.0, 0.0, 0.0, 1.5), (1.5, 2.6, 0.0, 1.5)],
            3,
        );
        let geometry = SolventGeometry::build(&atoms, 1.4);
        let mut field = VoxelField::new(lattice(6.0, 4.0), atoms, 1.4).unwrap();
        field.mark_face_voxels(&geometry, true);
        let grid = field.grid();
        let mut n = 0;
        for (index, &flag) in field.surface_voxels().iter().enumerate() {
            if flag {
                n += 1;
                assert!(grid.values()[index] > 0.0);
                assert_eq!(grid.sources()[index], -1);
            }
        }
        assert!(n > 0);
        field.mark_face_voxels(&geometry, false);
        let interior = grid_negative_probe_count(field.grid());
        assert!(interior > 0);
    }

    #[test]
    fn test_face_pass_overwrite_order() {
        // probes of the two mirror faces sit at z = +1 and z = -1 and overlap
        let c = 3.0_f64.sqrt();
        let atoms = working(
            &[(c, 0.0, 0.0, 0.6), (-c / 2.0, 1.5, 0.0, 0.6), (-c / 2.0, -1.5, 0.0, 0.6)],
            3,
        );
        let geometry = SolventGeometry::build(&atoms, 1.4);
        assert_eq!(geometry.valid_faces().count(), 2);
        for face in geometry.valid_faces() {
            assert_relative_eq!(face.probe.z.abs(), 1.0, epsilon = 1e-9);
        }

        // lattice point 20 sits at the origin, spacing 0.25
        let mut field = VoxelField::new(lattice(5.0, 4.0), atoms, 1.4).unwrap();
        field.grid.set_value(20, 20, 22, -0.3);
        field.grid.set_value(20, 20, 23, 2.0);
        field.grid.set_value(20, 20, 17, 0.5);
        field.mark_face_voxels(&geometry, true);
        let grid = field.grid();

        // a positive probe value replaces a negative (toroidal) one
        assert_relative_eq!(grid.value(20, 20, 22), 0.9, epsilon = 1e-9);
        assert_eq!(grid.source(20, 20, 22), -1);
        // first touch in the pass: the smaller value wins
        assert_relative_eq!(grid.value(20, 20, 23), 1.15, epsilon = 1e-9);
        assert_relative_eq!(grid.value(20, 20, 17), 0.5, epsilon = 1e-12);
        // touched by both faces: the larger value wins
        assert_relative_eq!(grid.value(20, 20, 21), 0.65, epsilon = 1e-9);
        assert_relative_eq!(grid.value(20, 20, 19), 0.65, epsilon = 1e-9);
        assert_relative_eq!(grid.value(20, 20, 20), 0.4, epsilon = 1e-9);

        let exterior = grid.values().to_vec();
        let done = field.surface_done.clone();
        field.mark_face_voxels(&geometry, false);
        for (index, &value) in field.grid().values().iter().enumerate() {
            if done[index] {
                assert!(value.to_bits() == exterior[index].to_bits());
            }
        }
        assert!(done.iter().any(|&d| d));
    }

    fn grid_negative_probe_count(grid: &VoxelGrid) -> usize {
        grid.values()
            .iter()
            .zip(grid.sources())
            .filter(|&(&v, &s)| s < 0 && v < 0.0)
            .count()
    }

    #[test]
    fn test_progressive_planes_match_full_grid() {
        let balls = [
            (-1.0, 0.3, 0.0, 1.8),
            (1.2, -0.4, 0.5, 1.5),
            (0.0, 1.5, -1.0, 1.6),
            (0.5, 0.0, 2.5, 1.2),
        ];
        let atoms = working(&balls, 3);
        let lat = lattice(5.0, 3.0);
        let mut full = VoxelField::new(lat.clone(), atoms.clone(), 0.0).unwrap();
        full.mark_sphere_voxels(&SpherePass::default());
        full.unset_unmarked();
        let progressive = ProgressiveSphereField::new(lat.clone(), atoms, SpherePass::default())
            .unwrap();

        let mut a = VoxelPlane::new(lat.plane_len());
        let mut b = VoxelPlane::new(lat.plane_len());
        for i in 0..lat.counts()[0] {
            full.fill_plane(i, &mut a);
            progressive.fill_plane(i, &mut b);
            for (x, y) in a.values.iter().zip(&b.values) {
                assert!(x.to_bits() == y.to_bits() || (x.is_nan() && y.is_nan()));
            }
            assert_eq!(a.sources, b.sources);
        }
    }
}
