// Copyright (c) 2026 Kliment Olechnovic and Mikael Lund
// Part of the molsurf project, licensed under the MIT License.
// SPDX-License-Identifier: MIT

//! Fragment culling and pocket selection on an extracted mesh.

use std::f64::consts::PI;

use log::{debug, info};

use crate::envelope::EnvelopeDots;
use crate::mesh::{SurfaceSet, TriangleMesh};
use crate::types::PocketSelection;

/// Smallest enclosed volume of a genuine solvent-excluded fragment for a
/// given probe radius.
#[must_use]
pub fn min_fragment_volume(solvent_radius: f64) -> f64 {
    1.5 * PI * solvent_radius.powi(3)
}

/// Atoms already claimed by retained fragments.
struct Claims {
    atoms: Vec<bool>,
}

impl Claims {
    fn new(n_atoms: usize) -> Self {
        Self {
            atoms: vec![false; n_atoms],
        }
    }

    /// Claim the atoms of `set` unless one is already taken. Atoms seen
    /// before the conflict stay claimed.
    fn try_claim(&mut self, mesh: &TriangleMesh, set: &[usize]) -> bool {
        let mut claimed = Vec::new();
        let mut ok = true;
        for atom in set.iter().filter_map(|&v| mesh.vertices[v].atom) {
            if self.atoms.get(atom).copied().unwrap_or(false) {
                ok = false;
                break;
            }
            claimed.push(atom);
        }
        for atom in claimed {
            if atom >= self.atoms.len() {
                self.atoms.resize(atom + 1, false);
            }
            self.atoms[atom] = true;
        }
        ok
    }
}

/// Keep the fragments of a solvent-excluded surface that touch surface
/// voxels, are large enough, and share no provenance atom with a larger
/// retained fragment.
///
/// Outward and inside-out fragments claim atoms independently, so a cavity
/// lined by the same atoms as the outer surface survives.
pub fn cull_fragments(
    mesh: &mut TriangleMesh,
    n_atoms: usize,
    min_volume: Option<f64>,
) -> Vec<SurfaceSet> {
    let components = mesh.components();
    let sets = mesh.measure(&components);
    let mut outer = Claims::new(n_atoms);
    let mut cavities = Claims::new(n_atoms);
    let mut keep = vec![false; components.len()];

    for (s, (vertices, set)) in components.iter().zip(&sets).enumerate() {
        if !vertices.iter().any(|&v| mesh.vertices[v].on_surface_voxel) {
            debug!("fragment {s}: no surface voxel, dropped");
            continue;
        }
        if min_volume.is_some_and(|min| set.volume.abs() <= min) {
            debug!("fragment {s}: volume {:.3} too small, dropped", set.volume);
            continue;
        }
        let claims = if set.is_cavity { &mut cavities } else { &mut outer };
        if claims.try_claim(mesh, vertices) {
            keep[s] = true;
        } else {
            debug!("fragment {s}: shares an atom with a larger fragment, dropped");
        }
    }

    mesh.retain_components(&components, &keep);
    let kept: Vec<SurfaceSet> = sets
        .into_iter()
        .zip(&keep)
        .filter_map(|(set, &k)| k.then_some(set))
        .collect();
    info!("kept {} of {} surface fragments", kept.len(), components.len());
    kept
}

/// Split fragments into pockets, which reach within the envelope radius of
/// an envelope dot, and interior cavities, keeping one kind.
///
/// Vertices close to the envelope have their value set to NaN.
pub fn select_pockets(
    mesh: &mut TriangleMesh,
    dots: &EnvelopeDots,
    selection: PocketSelection,
) -> Vec<SurfaceSet> {
    let mut near = 0_usize;
    for vertex in &mut mesh.vertices {
        if dots.is_near(vertex.position) {
            vertex.value = f64::NAN;
            near += 1;
        }
    }
    debug!("{near} vertices within the envelope");

    let components = mesh.components();
    let keep: Vec<bool> = components
        .iter()
        .map(|set| {
            let pocket = set.iter().any(|&v| mesh.vertices[v].value.is_nan());
            pocket == (selection == PocketSelection::Pockets)
        })
        .collect();
    let sets = mesh.measure(&components);
    mesh.retain_components(&components, &keep);
    let kept: Vec<SurfaceSet> = sets
        .into_iter()
        .zip(&keep)
        .filter_map(|(set, &k)| k.then_some(set))
        .collect();
    info!(
        "{:?} selection kept {} of {} fragments",
        selection,
        kept.len(),
        components.len()
    );
    kept
}

/// Fragment summaries of an unfiltered mesh.
#[must_use]
pub fn measure_fragments(mesh: &TriangleMesh) -> Vec<SurfaceSet> {
    mesh.measure(&mesh.components())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mesh::tests::push_octahedron;
    use approx::assert_relative_eq;
    use nalgebra::Point3;

    fn mark(mesh: &mut TriangleMesh, from: usize, atom: Option<usize>, surface: bool) {
        for v in &mut mesh.vertices[from..] {
            v.atom = atom;
            v.on_surface_voxel = surface;
        }
    }

    #[test]
    fn test_min_fragment_volume() {
        assert_relative_eq!(min_fragment_volume(1.0), 1.5 * PI);
        assert_relative_eq!(min_fragment_volume(2.0), 12.0 * PI);
    }

    #[test]
    fn test_small_fragment_dropped_only_with_filter() {
        let build = || {
            let mut mesh = TriangleMesh::default();
            push_octahedron(&mut mesh, [0.0, 0.0, 0.0], 4.0, false);
            mark(&mut mesh, 0, Some(0), true);
            push_octahedron(&mut mesh, [20.0, 0.0, 0.0], 1.0, false);
            mark(&mut mesh, 6, Some(1), true);
            mesh
        };
        let mut mesh = build();
        let kept = cull_fragments(&mut mesh, 2, Some(min_fragment_volume(1.0)));
        assert_eq!(kept.len(), 1);
        assert_eq!(mesh.triangles.len(), 8);
        assert!(mesh.vertices.iter().all(|v| v.position.x < 10.0));

        let mut mesh = build();
        assert_eq!(cull_fragments(&mut mesh, 2, None).len(), 2);
        assert_eq!(mesh.triangles.len(), 16);
    }

    #[test]
    fn test_fragment_without_surface_voxels_dropped() {
        let mut mesh = TriangleMesh::default();
        push_octahedron(&mut mesh, [0.0, 0.0, 0.0], 4.0, false);
        mark(&mut mesh, 0, Some(0), true);
        push_octahedron(&mut mesh, [20.0, 0.0, 0.0], 3.0, false);
        mark(&mut mesh, 6, Some(1), false);
        let kept = cull_fragments(&mut mesh, 2, None);
        assert_eq!(kept.len(), 1);
        assert_eq!(mesh.vertices.len(), 6);
    }

    #[test]
    fn test_shared_atom_drops_smaller_fragment() {
        let mut mesh = TriangleMesh::default();
        push_octahedron(&mut mesh, [0.0, 0.0, 0.0], 4.0, false);
        mark(&mut mesh, 0, Some(3), true);
        push_octahedron(&mut mesh, [20.0, 0.0, 0.0], 3.0, false);
        mark(&mut mesh, 6, Some(3), true);
        // a cavity lined by the same atom is kept
        push_octahedron(&mut mesh, [0.0, 40.0, 0.0], 3.5, true);
        mark(&mut mesh, 12, Some(3), true);
        let kept = cull_fragments(&mut mesh, 4, None);
        assert_eq!(kept.len(), 2);
        assert!(!kept[0].is_cavity);
        assert!(kept[1].is_cavity);
        assert!(mesh.vertices.iter().all(|v| v.position.x < 10.0));
    }

    #[test]
    fn test_pocket_selection() {
        let build = || {
            let mut mesh = TriangleMesh::default();
            push_octahedron(&mut mesh, [0.0, 0.0, 0.0], 1.0, true);
            push_octahedron(&mut mesh, [10.0, 0.0, 0.0], 1.0, true);
            mesh
        };
        let dots = EnvelopeDots::new(vec![Point3::new(11.5, 0.0, 0.0)], 1.0);

        let mut mesh = build();
        let pockets = select_pockets(&mut mesh, &dots, PocketSelection::Pockets);
        assert_eq!(pockets.len(), 1);
        assert!(mesh.vertices.iter().all(|v| v.position.x > 5.0));
        assert_eq!(mesh.vertices.iter().filter(|v| v.value.is_nan()).count(), 1);

        let mut mesh = build();
        let interior = select_pockets(&mut mesh, &dots, PocketSelection::Interior);
        assert_eq!(interior.len(), 1);
        assert!(mesh.vertices.iter().all(|v| v.position.x < 5.0));
    }

    #[test]
    fn test_measure_fragments() {
        let mut mesh = TriangleMesh::default();
        push_octahedron(&mut mesh, [0.0, 0.0, 0.0], 1.0, false);
        let sets = measure_fragments(&mesh);
        assert_eq!(sets.len(), 1);
        assert_eq!(sets[0].vertex_count, 6);
    }
}
