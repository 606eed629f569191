// Copyright (c) 2026 Kliment Olechnovic and Mikael Lund
// Part of the molsurf project, licensed under the MIT License.
// SPDX-License-Identifier: MIT

use nalgebra::Point3;

use crate::geometry::{signed_tetrahedron_volume, triangle_area};

/// Lattice edge a vertex was placed on: the lower lattice point and the axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LatticeEdge {
    pub point: usize,
    pub axis: u8,
}

/// Isosurface vertex.
#[derive(Debug, Clone, PartialEq)]
pub struct Vertex {
    pub position: Point3<f64>,
    /// Field value interpolated at the vertex.
    pub value: f64,
    /// Caller atom index the vertex derives from.
    pub atom: Option<usize>,
    /// Whether `atom` owns the probe surface the vertex lies on rather than
    /// its own sphere.
    pub from_probe: bool,
    pub edge: LatticeEdge,
    /// Position along `edge`, from the lower point.
    pub fraction: f64,
    /// Whether an end of `edge` is a surface voxel.
    pub on_surface_voxel: bool,
}

/// Triangle with outward winding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Triangle {
    pub vertices: [u32; 3],
    /// Bit `n` set when the edge from vertex `n` to vertex `n + 1` lies on a
    /// lattice cell face.
    pub edge_flags: u8,
}

/// Connected part of a surface.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SurfaceSet {
    pub vertex_count: usize,
    pub triangle_count: usize,
    /// Enclosed volume; negative for inside-out (cavity) surfaces.
    pub volume: f64,
    pub area: f64,
    pub is_cavity: bool,
}

/// Indexed triangle mesh.
#[derive(Debug, Clone, Default)]
pub struct TriangleMesh {
    pub vertices: Vec<Vertex>,
    pub triangles: Vec<Triangle>,
}

/// Union-find over vertex indices.
struct DisjointSets {
    parent: Vec<usize>,
}

impl DisjointSets {
    fn new(n: usize) -> Self {
        Self {
            parent: (0..n).collect(),
        }
    }

    fn find(&mut self, mut x: usize) -> usize {
        while self.parent[x] != x {
            self.parent[x] = self.parent[self.parent[x]];
            x = self.parent[x];
        }
        x
    }

    fn union(&mut self, a: usize, b: usize) {
        let (ra, rb) = (self.find(a), self.find(b));
        if ra != rb {
            self.parent[ra.max(rb)] = ra.min(rb);
        }
    }
}

impl TriangleMesh {
    fn corners(&self, t: &Triangle) -> [&Point3<f64>; 3] {
        t.vertices.map(|v| &self.vertices[v as usize].position)
    }

    /// Signed enclosed volume, positive for outward-facing closed surfaces.
    #[must_use]
    pub fn volume(&self) -> f64 {
        self.triangles
            .iter()
            .map(|t| {
                let [a, b, c] = self.corners(t);
                signed_tetrahedron_volume(a, b, c)
            })
            .sum()
    }

    #[must_use]
    pub fn area(&self) -> f64 {
        self.triangles
            .iter()
            .map(|t| {
                let [a, b, c] = self.corners(t);
                triangle_area(a, b, c)
            })
            .sum()
    }

    /// Vertex sets of the connected components, largest first.
    ///
    /// Vertices used by no triangle belong to no set.
    #[must_use]
    pub fn components(&self) -> Vec<Vec<usize>> {
        let mut sets = DisjointSets::new(self.vertices.len());
        let mut used = vec![false; self.vertices.len()];
        for t in &self.triangles {
            let [a, b, c] = t.vertices.map(|v| v as usize);
            sets.union(a, b);
            sets.union(a, c);
            used[a] = true;
            used[b] = true;
            used[c] = true;
        }
        let mut slot_of_root = vec![usize::MAX; self.vertices.len()];
        let mut components: Vec<Vec<usize>> = Vec::new();
        for v in (0..self.vertices.len()).filter(|&v| used[v]) {
            let root = sets.find(v);
            if slot_of_root[root] == usize::MAX {
                slot_of_root[root] = components.len();
                components.push(Vec::new());
            }
            components[slot_of_root[root]].push(v);
        }
        components.sort_by(|a, b| b.len().cmp(&a.len()).then(a[0].cmp(&b[0])));
        components
    }

    /// Map from vertex to the index of its component, if any.
    #[must_use]
    pub fn set_of_vertex(&self, components: &[Vec<usize>]) -> Vec<Option<usize>> {
        let mut owner = vec![None; self.vertices.len()];
        for (s, set) in components.iter().enumerate() {
            for &v in set {
                owner[v] = Some(s);
            }
        }
        owner
    }

    /// Triangle count, volume and area of each component.
    #[must_use]
    pub fn measure(&self, components: &[Vec<usize>]) -> Vec<SurfaceSet> {
        let owner = self.set_of_vertex(components);
        let mut out: Vec<SurfaceSet> = components
            .iter()
            .map(|set| SurfaceSet {
                vertex_count: set.len(),
                triangle_count: 0,
                volume: 0.0,
                area: 0.0,
                is_cavity: false,
            })
            .collect();
        for t in &self.triangles {
            let Some(s) = owner[t.vertices[0] as usize] else {
                continue;
            };
            let [a, b, c] = self.corners(t);
            out[s].triangle_count += 1;
            out[s].volume += signed_tetrahedron_volume(a, b, c);
            out[s].area += triangle_area(a, b, c);
        }
        for set in &mut out {
            set.is_cavity = set.volume < 0.0;
        }
        out
    }

    /// Keep only the components flagged in `keep`, dropping every other
    /// vertex and triangle and renumbering the rest in their original order.
    #[allow(clippy::cast_possible_truncation)]
    pub fn retain_components(&mut self, components: &[Vec<usize>], keep: &[bool]) {
        let owner = self.set_of_vertex(components);
        let mut new_index = vec![u32::MAX; self.vertices.len()];
        let mut next = 0_u32;
        for (v, slot) in new_index.iter_mut().enumerate() {
            if owner[v].is_some_and(|s| keep[s]) {
                *slot = next;
                next += 1;
            }
        }
        self.triangles.retain(|t| new_index[t.vertices[0] as usize] != u32::MAX);
        for t in &mut self.triangles {
            t.vertices = t.vertices.map(|v| new_index[v as usize]);
        }
        let mut v = 0;
        self.vertices.retain(|_| {
            let kept = new_index[v] != u32::MAX;
            v += 1;
            kept
        });
    }
}
