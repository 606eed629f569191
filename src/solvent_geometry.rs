// Copyright (c) 2026 Kliment Olechnovic and Mikael Lund
// Part of the molsurf project, licensed under the MIT License.
// SPDX-License-Identifier: MIT

//! Probe geometry: atom pairs a probe can touch together (edges) and probe
//! positions touching three atoms at once (faces).

use std::collections::HashMap;

use log::debug;
use nalgebra::Point3;
use rayon::prelude::*;

use crate::geometry::{float_cmp, probe_positions};
use crate::spheres_searcher::{NeighborQuery, SpheresSearcher};
use crate::types::WorkingAtoms;

/// Packed key of an unordered atom pair.
const fn edge_key(a: usize, b: usize) -> u64 {
    let (lo, hi) = if a < b { (a, b) } else { (b, a) };
    ((lo as u64) << 32) | hi as u64
}

/// Pair of atoms whose probe-extended spheres overlap.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Edge {
    /// Lower atom index.
    pub a: usize,
    /// Higher atom index.
    pub b: usize,
    /// Valid faces incident on this edge.
    pub n_faces: u32,
    /// Blocked faces incident on this edge.
    pub n_invalid: u32,
}

impl Edge {
    const fn new(a: usize, b: usize) -> Self {
        Self {
            a,
            b,
            n_faces: 0,
            n_invalid: 0,
        }
    }

    /// Number of valid faces if any, else minus the number of blocked faces,
    /// else zero for a free edge.
    #[must_use]
    pub fn edge_type(&self) -> i64 {
        if self.n_faces > 0 {
            i64::from(self.n_faces)
        } else {
            -i64::from(self.n_invalid)
        }
    }

    /// Whether the probe can roll around this edge (type >= 0).
    #[must_use]
    pub const fn is_toroidal(&self) -> bool {
        self.n_faces > 0 || self.n_invalid == 0
    }
}

/// Probe position touching three atoms.
#[derive(Debug, Clone, PartialEq)]
pub struct Face {
    /// Atom indices, increasing.
    pub atoms: [usize; 3],
    /// Probe center.
    pub probe: Point3<f64>,
    /// False when the probe overlaps some other atom.
    pub valid: bool,
    /// Edges `(a, b)`, `(b, c)` and `(c, a)` as indices into the edge list.
    pub edges: [usize; 3],
}

/// Edges and faces of a set of atoms for one probe radius.
#[derive(Debug, Clone, Default)]
pub struct SolventGeometry {
    edges: Vec<Edge>,
    faces: Vec<Face>,
    edge_index: HashMap<u64, usize>,
    no_face_atoms: Vec<bool>,
}

impl SolventGeometry {
    /// Derive edges and faces for `atoms` (van der Waals radii) and a probe of
    /// radius `solvent_radius`.
    ///
    /// Pairs of two nearby atoms never form an edge. An edge needs the center
    /// distance strictly below the sum of the extended radii.
    #[allow(clippy::similar_names)]
    pub fn build(atoms: &WorkingAtoms, solvent_radius: f64) -> Self {
        let n = atoms.len();
        let rs = solvent_radius;
        let max_r = atoms.max_radius();
        let searcher = SpheresSearcher::new(atoms.spheres(rs));

        let partner_lists: Vec<Vec<usize>> = (0..n)
            .into_par_iter()
            .map(|a| {
                let r_as = atoms.radii[a] + rs;
                let mut partners: Vec<usize> = searcher
                    .neighbors_of_sphere(a, r_as + rs + max_r)
                    .filter(|&b| b > a && !(atoms.is_nearby(a) && atoms.is_nearby(b)))
                    .filter(|&b| {
                        let reach = r_as + atoms.radii[b] + rs;
                        (atoms.centers[b] - atoms.centers[a]).norm_squared() < reach * reach
                    })
                    .collect();
                partners.sort_unstable();
                partners
            })
            .collect();

        let mut geometry = Self {
            no_face_atoms: vec![true; n],
            ..Self::default()
        };
        let mut locale: Vec<Vec<usize>> = vec![Vec::new(); n];
        for (a, partners) in partner_lists.iter().enumerate() {
            for &b in partners {
                geometry.edge_index.insert(edge_key(a, b), geometry.edges.len());
                geometry.edges.push(Edge::new(a, b));
                locale[a].push(b);
                locale[b].push(a);
            }
        }
        for l in &mut locale {
            l.sort_unstable();
        }

        let candidates: Vec<Vec<([usize; 3], Point3<f64>, bool)>> = geometry
            .edges
            .par_iter()
            .map(|edge| {
                let (a, b) = (edge.a, edge.b);
                let mut found = Vec::new();
                for c in sorted_intersection(&locale[a], &locale[b]).filter(|&c| c > b) {
                    let Some((s1, s2)) = probe_positions(
                        &atoms.centers[a],
                        atoms.radii[a] + rs,
                        &atoms.centers[b],
                        atoms.radii[b] + rs,
                        &atoms.centers[c],
                        atoms.radii[c] + rs,
                    ) else {
                        continue;
                    };
                    for probe in [s1, s2] {
                        let free = probe_is_free(&searcher, atoms, rs, max_r, [a, b, c], &probe);
                        found.push(([a, b, c], probe, free));
                    }
                }
                found
            })
            .collect();

        for (triple, probe, valid) in candidates.into_iter().flatten() {
            let [a, b, c] = triple;
            let (Some(ab), Some(bc), Some(ca)) = (
                geometry.edge_index.get(&edge_key(a, b)).copied(),
                geometry.edge_index.get(&edge_key(b, c)).copied(),
                geometry.edge_index.get(&edge_key(c, a)).copied(),
            ) else {
                continue;
            };
            for e in [ab, bc, ca] {
                if valid {
                    geometry.edges[e].n_faces += 1;
                } else {
                    geometry.edges[e].n_invalid += 1;
                }
            }
            if valid {
                for atom in triple {
                    geometry.no_face_atoms[atom] = false;
                }
            }
            geometry.faces.push(Face {
                atoms: triple,
                probe,
                valid,
                edges: [ab, bc, ca],
            });
        }

        debug!(
            "{} edges, {} faces ({} valid), {} atoms without faces",
            geometry.edges.len(),
            geometry.faces.len(),
            geometry.valid_faces().count(),
            geometry.no_face_atoms.iter().filter(|&&f| f).count()
        );
        geometry
    }

    #[must_use]
    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    #[must_use]
    pub fn faces(&self) -> &[Face] {
        &self.faces
    }

    #[must_use]
    pub fn find_edge(&self, a: usize, b: usize) -> Option<&Edge> {
        self.edge_index.get(&edge_key(a, b)).map(|&i| &self.edges[i])
    }

    pub fn valid_faces(&self) -> impl DoubleEndedIterator<Item = &Face> {
        self.faces.iter().filter(|f| f.valid)
    }

    /// Edges the probe can roll around.
    pub fn toroidal_edges(&self) -> impl Iterator<Item = &Edge> {
        self.edges.iter().filter(|e| e.is_toroidal())
    }

    /// Atoms not part of any valid face.
    #[must_use]
    pub fn no_face_atoms(&self) -> &[bool] {
        &self.no_face_atoms
    }
}

/// Whether a probe at `probe` clears every atom other than the three it touches.
fn probe_is_free(
    searcher: &SpheresSearcher,
    atoms: &WorkingAtoms,
    rs: f64,
    max_r: f64,
    touching: [usize; 3],
    probe: &Point3<f64>,
) -> bool {
    !searcher
        .neighbors_of_point(*probe, rs + max_r)
        .filter(|i| !touching.contains(i))
        .any(|i| {
            let reach = atoms.radii[i] + rs;
            float_cmp::lt(
                (atoms.centers[i] - probe).norm_squared(),
                reach * reach,
            )
        })
}

/// Elements common to two sorted lists.
fn sorted_intersection<'a>(a: &'a [usize], b: &'a [usize]) -> impl Iterator<Item = usize> + 'a {
    let (mut i, mut j) = (0, 0);
    std::iter::from_fn(move || {
        while i < a.len() && j < b.len() {
            match a[i].cmp(&b[j]) {
                std::cmp::Ordering::Less => i += 1,
                std::cmp::Ordering::Greater => j += 1,
                std::cmp::Ordering::Equal => {
                    let v = a[i];
                    i += 1;
                    j += 1;
                    return Some(v);
                }
            }
        }
        None
    })
}
