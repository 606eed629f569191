// Copyright (c) 2026 Kliment Olechnovic and Mikael Lund
// Part of the molsurf project, licensed under the MIT License.
// SPDX-License-Identifier: MIT

//! Marching cubes over a [`VoxelSource`], two lattice planes at a time.
//!
//! Vertices are shared between neighboring cubes through a cache keyed by
//! lattice edge, so the mesh is connected. An edge with a NaN end produces no
//! vertex, and triangles needing it are dropped.

use std::collections::HashMap;

use log::debug;

use crate::geometry::spherical_interpolation_fraction;
use crate::lattice::{Lattice, VoxelPlane};
use crate::mc_tables::{CORNER_OFFSETS, EDGE_CONNECTIONS, EDGE_TABLE, TRI_TABLE, edges_share_face};
use crate::mesh::{LatticeEdge, Triangle, TriangleMesh, Vertex};
use crate::types::Interpolation;
use crate::voxel_field::{SourceSphere, VoxelSource};

/// Fractions this close to an end snap onto it.
const SNAP_FRACTION: f64 = 0.0001;

/// How a vertex is placed along one lattice edge.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum EdgeInterpolation {
    Linear,
    /// Both ends measure distance to the same sphere.
    Spherical(SourceSphere),
}

/// One end of a lattice edge.
#[derive(Debug, Clone, Copy)]
struct EdgeEnd {
    ijk: [usize; 3],
    value: f64,
    source: i32,
    surface: bool,
}

/// Isosurface extractor.
#[derive(Debug, Clone, Copy)]
pub struct SurfaceExtractor {
    cutoff: f64,
    interpolation: Interpolation,
}

impl SurfaceExtractor {
    #[must_use]
    pub const fn new(cutoff: f64, interpolation: Interpolation) -> Self {
        Self {
            cutoff,
            interpolation,
        }
    }

    /// Interpolation for an edge whose ends carry the given source tags.
    pub fn edge_interpolation<S: VoxelSource + ?Sized>(
        &self,
        source: &S,
        a: i32,
        b: i32,
    ) -> EdgeInterpolation {
        if self.interpolation == Interpolation::Nonlinear && a == b && a != 0 {
            source
                .source_sphere(a)
                .map_or(EdgeInterpolation::Linear, EdgeInterpolation::Spherical)
        } else {
            EdgeInterpolation::Linear
        }
    }

    /// Fraction along an edge from `a` to `b` where the field crosses the cutoff.
    #[must_use]
    pub fn crossing_fraction(
        &self,
        interpolation: EdgeInterpolation,
        value_a: f64,
        value_b: f64,
        edge_length: f64,
    ) -> f64 {
        let linear = (self.cutoff - value_a) / (value_b - value_a);
        let f = match interpolation {
            EdgeInterpolation::Linear => linear,
            EdgeInterpolation::Spherical(sphere) => {
                let (r, d_a, d_b) = if sphere.inverted {
                    (
                        sphere.radius - self.cutoff,
                        sphere.radius - value_a,
                        sphere.radius - value_b,
                    )
                } else {
                    (
                        sphere.radius + self.cutoff,
                        sphere.radius + value_a,
                        sphere.radius + value_b,
                    )
                };
                let f = spherical_interpolation_fraction(r, d_a, d_b, edge_length);
                if f.is_finite() && (-SNAP_FRACTION..=1.0 + SNAP_FRACTION).contains(&f) {
                    f
                } else {
                    linear
                }
            }
        };
        if f < SNAP_FRACTION {
            0.0
        } else if f > 1.0 - SNAP_FRACTION {
            1.0
        } else {
            f
        }
    }

    /// Run marching cubes over every lattice cell of `source`.
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn extract<S: VoxelSource + ?Sized>(&self, source: &S) -> TriangleMesh {
        let lattice = source.lattice();
        let [nx, ny, nz] = lattice.counts();
        let plane_len = lattice.plane_len();
        let flip = !lattice.is_left_handed();
        let mut lower = VoxelPlane::new(plane_len);
        let mut upper = VoxelPlane::new(plane_len);
        let mut mesh = TriangleMesh::default();
        let mut cache: HashMap<LatticeEdge, Option<u32>> = HashMap::new();
        let mut dropped = 0_usize;

        source.fill_plane(0, &mut lower);
        for i in 0..nx - 1 {
            source.fill_plane(i + 1, &mut upper);
            let planes = [&lower, &upper];
            for j in 0..ny - 1 {
                for k in 0..nz - 1 {
                    let mut ends = [EdgeEnd {
                        ijk: [0; 3],
                        value: 0.0,
                        source: 0,
                        surface: false,
                    }; 8];
                    let mut cube_index = 0_usize;
                    for (c, [dx, dy, dz]) in CORNER_OFFSETS.iter().copied().enumerate() {
                        let plane = planes[dx];
                        let local = lattice.plane_index(j + dy, k + dz);
                        ends[c] = EdgeEnd {
                            ijk: [i + dx, j + dy, k + dz],
                            value: plane.values[local],
                            source: plane.sources[local],
                            surface: plane.surface[local],
                        };
                        if ends[c].value < self.cutoff {
                            cube_index |= 1 << c;
                        }
                    }
                    let crossed = EDGE_TABLE[cube_index];
                    if crossed == 0 {
                        continue;
                    }

                    let mut edge_vertex = [None; 12];
                    for (e, slot) in edge_vertex.iter_mut().enumerate() {
                        if crossed & (1 << e) == 0 {
                            continue;
                        }
                        let [c0, c1] = EDGE_CONNECTIONS[e];
                        let (lo, hi) = if ends[c0].ijk <= ends[c1].ijk {
                            (ends[c0], ends[c1])
                        } else {
                            (ends[c1], ends[c0])
                        };
                        let axis = (0..3).find(|&a| lo.ijk[a] != hi.ijk[a]).unwrap_or(0);
                        let key = LatticeEdge {
                            point: lattice.point_index(lo.ijk[0], lo.ijk[1], lo.ijk[2]),
                            axis: axis as u8,
                        };
                        *slot = *cache.entry(key).or_insert_with(|| {
                            let vertex = self.place_vertex(source, lattice, key, &lo, &hi)?;
                            mesh.vertices.push(vertex);
                            Some((mesh.vertices.len() - 1) as u32)
                        });
                    }

                    for tri in TRI_TABLE[cube_index]
                        .chunks_exact(3)
                        .take_while(|t| t[0] >= 0)
                    {
                        let e = [tri[0] as usize, tri[1] as usize, tri[2] as usize];
                        let (Some(v0), Some(v1), Some(v2)) =
                            (edge_vertex[e[0]], edge_vertex[e[1]], edge_vertex[e[2]])
                        else {
                            dropped += 1;
                            continue;
                        };
                        let (vertices, order) = if flip {
                            ([v0, v2, v1], [e[0], e[2], e[1]])
                        } else {
                            ([v0, v1, v2], e)
                        };
                        let mut edge_flags = 0_u8;
                        for n in 0..3 {
                            if edges_share_face(order[n], order[(n + 1) % 3]) {
                                edge_flags |= 1 << n;
                            }
                        }
                        mesh.triangles.push(Triangle {
                            vertices,
                            edge_flags,
                        });
                    }
                }
            }
            // edges based in plane i are never seen again
            let next_plane_start = (i + 1) * plane_len;
            cache.retain(|key, _| key.point >= next_plane_start);
            std::mem::swap(&mut lower, &mut upper);
        }

        debug!(
            "marching cubes: {} vertices, {} triangles, {dropped} triangles dropped at NaN edges",
            mesh.vertices.len(),
            mesh.triangles.len()
        );
        mesh
    }

    fn place_vertex<S: VoxelSource + ?Sized>(
        &self,
        source: &S,
        lattice: &Lattice,
        edge: LatticeEdge,
        lo: &EdgeEnd,
        hi: &EdgeEnd,
    ) -> Option<Vertex> {
        if lo.value.is_nan() || hi.value.is_nan() {
            return None;
        }
        let a = lattice.to_world(lo.ijk[0], lo.ijk[1], lo.ijk[2]);
        let step = lattice.vector(usize::from(edge.axis));
        let interpolation = self.edge_interpolation(source, lo.source, hi.source);
        let fraction = self.crossing_fraction(interpolation, lo.value, hi.value, step.norm());
        let (first, second) = if lo.value <= hi.value {
            (lo.source, hi.source)
        } else {
            (hi.source, lo.source)
        };
        let tag = if source.source_atom(first).is_some() {
            first
        } else {
            second
        };
        Some(Vertex {
            position: a + step * fraction,
            value: fraction.mul_add(hi.value - lo.value, lo.value),
            atom: source.source_atom(tag),
            from_probe: tag < 0,
            edge,
            fraction,
            on_surface_voxel: lo.surface || hi.surface,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{BoundingBox, WorkingAtoms};
    use crate::voxel_field::{SpherePass, VoxelField};
    use approx::assert_relative_eq;
    use nalgebra::Point3;
    use std::collections::HashSet;
    use std::f64::consts::PI;

    fn sphere_field(r: f64, ppu: f64) -> VoxelField {
        let mut atoms = WorkingAtoms::default();
        atoms.push(Point3::new(0.1, -0.2, 0.05), r, Some(0));
        atoms.first_nearby = 1;
        let h = r + 1.0;
        let bounds = BoundingBox::new(Point3::new(-h, -h, -h), Point3::new(h, h, h));
        let lattice = Lattice::from_bounds(&bounds, ppu, 200).unwrap();
        let mut field = VoxelField::new(lattice, atoms, 0.0).unwrap();
        field.mark_sphere_voxels(&SpherePass::default());
        field.unset_unmarked();
        field
    }

    #[test]
    fn test_sphere_vertices_on_surface() {
        let field = sphere_field(2.0, 4.0);
        let mesh = SurfaceExtractor::new(0.0, Interpolation::Nonlinear).extract(&field);
        assert!(!mesh.triangles.is_empty());
        let center = Point3::new(0.1, -0.2, 0.05);
        let snap = 2.0 * SNAP_FRACTION * field.grid().lattice().max_spacing();
        for v in &mesh.vertices {
            assert!(((v.position - center).norm() - 2.0).abs() <= snap + 1e-9);
            assert_eq!(v.atom, Some(0));
        }
        let expected = 4.0 / 3.0 * PI * 8.0;
        assert_relative_eq!(mesh.volume(), expected, max_relative = 0.02);
        assert_relative_eq!(mesh.area(), 4.0 * PI * 4.0, max_relative = 0.05);
    }

    #[test]
    fn test_linear_interpolation_close_to_sphere() {
        let field = sphere_field(2.0, 4.0);
        let mesh = SurfaceExtractor::new(0.0, Interpolation::Linear).extract(&field);
        let center = Point3::new(0.1, -0.2, 0.05);
        let spacing = field.grid().lattice().max_spacing();
        for v in &mesh.vertices {
            assert!(((v.position - center).norm() - 2.0).abs() < spacing / 4.0);
        }
        assert!(mesh.volume() > 0.0);
    }

    #[test]
    fn test_vertices_are_shared() {
        let field = sphere_field(1.5, 5.0);
        let mesh = SurfaceExtractor::new(0.0, Interpolation::Nonlinear).extract(&field);
        let edges: HashSet<LatticeEdge> = mesh.vertices.iter().map(|v| v.edge).collect();
        assert_eq!(edges.len(), mesh.vertices.len());
        // a closed surface: every undirected triangle edge is used twice
        let mut uses: std::collections::HashMap<(u32, u32), usize> =
            std::collections::HashMap::new();
        for t in &mesh.triangles {
            for n in 0..3 {
                let (a, b) = (t.vertices[n], t.vertices[(n + 1) % 3]);
                *uses.entry((a.min(b), a.max(b))).or_default() += 1;
            }
        }
        let boundary = uses.values().filter(|&&n| n == 1).count();
        assert_eq!(boundary, 0);
        assert_eq!(mesh.components().len(), 1);
    }

    #[test]
    fn test_crossing_fraction_snaps_and_falls_back() {
        let extractor = SurfaceExtractor::new(0.0, Interpolation::Nonlinear);
        assert_relative_eq!(
            extractor.crossing_fraction(EdgeInterpolation::Linear, -1.0, 3.0, 1.0),
            0.25
        );
        assert_relative_eq!(
            extractor.crossing_fraction(EdgeInterpolation::Linear, -1e-6, 1.0, 1.0),
            0.0
        );
        // atom sphere of radius 1 centered at distance 0.5 before the edge start
        let atom = EdgeInterpolation::Spherical(SourceSphere {
            radius: 1.0,
            inverted: false,
        });
        assert_relative_eq!(
            extractor.crossing_fraction(atom, -0.5, 0.5, 1.0),
            0.5,
            epsilon = 1e-12
        );
        // probe sphere: values are radius - distance
        let probe = EdgeInterpolation::Spherical(SourceSphere {
            radius: 1.0,
            inverted: true,
        });
        assert_relative_eq!(
            extractor.crossing_fraction(probe, 0.5, -0.5, 1.0),
            0.5,
            epsilon = 1e-12
        );
        // values inconsistent with any sphere fall back to linear
        let f = extractor.crossing_fraction(atom, -0.9, 5.0, 1.0);
        assert!((0.0..=1.0).contains(&f));
    }

    #[test]
    fn test_nan_edges_drop_triangles() {
        let mut field = sphere_field(2.0, 4.0);
        let full = SurfaceExtractor::new(0.0, Interpolation::Linear).extract(&field);
        // blank out half the field by rebuilding with a within restriction
        field.reset_with_atoms(field.atoms().clone());
        field.mark_sphere_voxels(&SpherePass {
            within: Some((Point3::new(0.1, -0.2, 3.0), 3.0)),
            ..SpherePass::default()
        });
        field.unset_unmarked();
        let partial = SurfaceExtractor::new(0.0, Interpolation::Linear).extract(&field);
        assert!(!partial.triangles.is_empty());
        assert!(partial.triangles.len() < full.triangles.len());
        for v in &partial.vertices {
            assert!(v.position.z > -0.5);
        }
    }
}
