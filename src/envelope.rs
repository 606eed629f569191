// Copyright (c) 2026 Kliment Olechnovic and Mikael Lund
// Part of the molsurf project, licensed under the MIT License.
// SPDX-License-Identifier: MIT

//! Geodesic dot envelope around a molecule, used to tell open pockets from
//! enclosed cavities.

use std::collections::HashMap;

use log::debug;
use nalgebra::{Point3, Vector3};

use crate::spheres_searcher::{NeighborQuery, SpheresSearcher};
use crate::types::{Sphere, WorkingAtoms};

/// Subdivision depth of the envelope dot spheres (642 dots per atom).
pub const ENVELOPE_DEPTH: u32 = 3;

/// Unit directions from a recursively subdivided icosahedron.
///
/// Each level splits every triangle into four, projecting the new edge
/// midpoints onto the unit sphere. Direction counts by depth are
/// `10 * 4^depth + 2`: 12, 42, 162, 642, 2562.
#[derive(Debug, Clone)]
pub struct GeodesicSphere {
    directions: Vec<Vector3<f64>>,
}

impl GeodesicSphere {
    #[must_use]
    #[allow(clippy::manual_midpoint)]
    pub fn new(depth: u32) -> Self {
        let phi = (1.0 + 5.0_f64.sqrt()) / 2.0;
        let mut directions: Vec<Vector3<f64>> = [
            (phi, 1.0, 0.0),
            (-phi, 1.0, 0.0),
            (phi, -1.0, 0.0),
            (-phi, -1.0, 0.0),
            (1.0, 0.0, phi),
            (1.0, 0.0, -phi),
            (-1.0, 0.0, phi),
            (-1.0, 0.0, -phi),
            (0.0, phi, 1.0),
            (0.0, -phi, 1.0),
            (0.0, phi, -1.0),
            (0.0, -phi, -1.0),
        ]
        .into_iter()
        .map(|(x, y, z)| Vector3::new(x, y, z).normalize())
        .collect();

        let mut triangles: Vec<[usize; 3]> = vec![
            [0, 8, 4],
            [1, 10, 7],
            [2, 9, 11],
            [7, 3, 1],
            [0, 5, 10],
            [3, 9, 6],
            [3, 11, 9],
            [8, 6, 4],
            [2, 4, 9],
            [3, 7, 11],
            [4, 2, 0],
            [9, 4, 6],
            [2, 11, 5],
            [0, 10, 8],
            [5, 0, 2],
            [10, 5, 7],
            [1, 6, 8],
            [1, 8, 10],
            [6, 1, 3],
            [11, 7, 5],
        ];

        for _ in 0..depth {
            let mut midpoints: HashMap<(usize, usize), usize> = HashMap::new();
            let mut split = |a: usize, b: usize, directions: &mut Vec<Vector3<f64>>| {
                *midpoints.entry((a.min(b), a.max(b))).or_insert_with(|| {
                    let mid = (directions[a] + directions[b]).normalize();
                    directions.push(mid);
                    directions.len() - 1
                })
            };
            triangles = triangles
                .iter()
                .flat_map(|&[a, b, c]| {
                    let ab = split(a, b, &mut directions);
                    let bc = split(b, c, &mut directions);
                    let ca = split(c, a, &mut directions);
                    [[a, ab, ca], [b, bc, ab], [c, ca, bc], [ab, bc, ca]]
                })
                .collect();
        }

        Self { directions }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.directions.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.directions.is_empty()
    }

    /// Dots on the sphere of `radius` around `center`.
    pub fn points_on_sphere(
        &self,
        center: Point3<f64>,
        radius: f64,
    ) -> impl Iterator<Item = Point3<f64>> + '_ {
        self.directions.iter().map(move |u| center + u * radius)
    }
}

/// Dots on every selected atom's sphere grown by `envelope_radius` that are
/// not strictly inside another such sphere.
///
/// Nearby atoms neither carry dots nor bury them.
#[must_use]
pub fn geodesic_envelope(atoms: &WorkingAtoms, envelope_radius: f64, depth: u32) -> Vec<Point3<f64>> {
    let n = atoms.first_nearby.min(atoms.len());
    let grown: Vec<Sphere> = (0..n)
        .map(|i| Sphere::new(atoms.centers[i], atoms.radii[i] + envelope_radius))
        .collect();
    let max_radius = grown.iter().map(|s| s.r).fold(0.0, f64::max);
    let sphere = GeodesicSphere::new(depth);
    let searcher = SpheresSearcher::new(grown);
    let grown = searcher.spheres();

    let mut dots = Vec::new();
    for (i, s) in grown.iter().enumerate() {
        for dot in sphere.points_on_sphere(s.center, s.r) {
            let buried = searcher
                .neighbors_of_point(dot, max_radius)
                .any(|j| j != i && (grown[j].center - dot).norm() < grown[j].r);
            if !buried {
                dots.push(dot);
            }
        }
    }
    debug!("geodesic envelope: {} dots around {n} atoms", dots.len());
    dots
}

/// Proximity queries against a set of envelope dots.
pub struct EnvelopeDots {
    searcher: SpheresSearcher,
    radius: f64,
}

impl EnvelopeDots {
    /// Index `dots` for queries at `radius`.
    #[must_use]
    pub fn new(dots: Vec<Point3<f64>>, radius: f64) -> Self {
        let spheres = dots.into_iter().map(|p| Sphere::new(p, 0.0)).collect();
        Self {
            searcher: SpheresSearcher::with_box_size(spheres, radius),
            radius,
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.searcher.spheres().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.searcher.spheres().is_empty()
    }

    /// Whether any dot lies strictly closer than the query radius to `point`.
    #[must_use]
    pub fn is_near(&self, point: Point3<f64>) -> bool {
        let dots = self.searcher.spheres();
        self.searcher
            .neighbors_of_point(point, self.radius)
            .any(|id| (dots[id].center - point).norm() < self.radius)
    }
}
