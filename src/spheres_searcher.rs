// Copyright (c) 2026 Kliment Olechnovic and Mikael Lund
// Part of the molsurf project, licensed under the MIT License.
// SPDX-License-Identifier: MIT

use std::collections::HashMap;

use log::debug;
use nalgebra::Point3;

use crate::types::Sphere;

/// Largest cell count stored as a dense table; sparser grids use a hash map.
const MAX_DENSE_CELLS: usize = 1 << 20;

/// Radius queries over a fixed set of spheres, by center distance.
pub trait NeighborQuery {
    /// Indices of spheres whose centers lie within `radius` of `point`.
    fn neighbors_of_point(&self, point: Point3<f64>, radius: f64) -> impl Iterator<Item = usize>;

    /// Indices of spheres whose centers lie within `radius` of sphere `id`,
    /// excluding `id` itself.
    fn neighbors_of_sphere(&self, id: usize, radius: f64) -> impl Iterator<Item = usize>;
}

/// Grid coordinates for spatial indexing
#[derive(Debug, Clone, Copy, Default)]
struct GridPoint {
    x: i32,
    y: i32,
    z: i32,
}

impl GridPoint {
    #[allow(clippy::cast_possible_truncation)]
    fn from_point(p: &Point3<f64>, box_size: f64) -> Self {
        Self {
            x: (p.x / box_size).floor() as i32,
            y: (p.y / box_size).floor() as i32,
            z: (p.z / box_size).floor() as i32,
        }
    }

    fn from_point_with_offset(p: &Point3<f64>, box_size: f64, offset: &Self) -> Self {
        let gp = Self::from_point(p, box_size);
        Self {
            x: gp.x.saturating_sub(offset.x),
            y: gp.y.saturating_sub(offset.y),
            z: gp.z.saturating_sub(offset.z),
        }
    }

    /// Linear cell index, if the point lies inside a grid of `grid_size`.
    fn index(&self, grid_size: &Self) -> Option<usize> {
        let inside = |c: i32, n: i32| usize::try_from(c).ok().filter(|_| c < n);
        let (x, y, z) = (
            inside(self.x, grid_size.x)?,
            inside(self.y, grid_size.y)?,
            inside(self.z, grid_size.z)?,
        );
        let (nx, ny) = (
            usize::try_from(grid_size.x).ok()?,
            usize::try_from(grid_size.y).ok()?,
        );
        z.checked_mul(nx)?.checked_mul(ny)?.checked_add(y * nx + x)
    }

    /// Number of cells in a grid of this size, if it fits in `usize`.
    fn volume(&self) -> Option<usize> {
        let n = |c: i32| usize::try_from(c).ok();
        n(self.x)?.checked_mul(n(self.y)?)?.checked_mul(n(self.z)?)
    }
}

/// Cell to box lookup: a dense table for compact grids, a hash map when the
/// atoms are spread so far apart that a table would not fit.
#[derive(Debug, Clone)]
enum CellMap {
    Dense(Vec<Option<usize>>),
    Sparse(HashMap<[i32; 3], usize>),
}

/// Grid parameters for spatial indexing
#[derive(Debug, Clone)]
struct GridParameters {
    grid_offset: GridPoint,
    grid_size: GridPoint,
    box_size: f64,
}

impl GridParameters {
    fn new(spheres: &[Sphere], box_size: f64) -> Self {
        let mut params = Self {
            grid_offset: GridPoint::default(),
            grid_size: GridPoint { x: 1, y: 1, z: 1 },
            box_size,
        };

        if spheres.is_empty() {
            return params;
        }

        let padding = 1;
        let mut lo = GridPoint::from_point(&spheres[0].center, box_size);
        let mut hi = lo;
        for s in &spheres[1..] {
            let gp = GridPoint::from_point(&s.center, box_size);
            lo.x = lo.x.min(gp.x);
            lo.y = lo.y.min(gp.y);
            lo.z = lo.z.min(gp.z);
            hi.x = hi.x.max(gp.x);
            hi.y = hi.y.max(gp.y);
            hi.z = hi.z.max(gp.z);
        }

        params.grid_offset = GridPoint {
            x: lo.x.saturating_sub(padding),
            y: lo.y.saturating_sub(padding),
            z: lo.z.saturating_sub(padding),
        };
        let extent = |lo: i32, hi: i32| hi.saturating_sub(lo).saturating_add(2 * padding + 1);
        params.grid_size = GridPoint {
            x: extent(lo.x, hi.x),
            y: extent(lo.y, hi.y),
            z: extent(lo.z, hi.z),
        };
        params
    }
}

/// Grid-based spatial index over sphere centers
pub struct SpheresSearcher {
    spheres: Vec<Sphere>,
    grid_params: GridParameters,
    /// Map from grid cell to box index
    map_of_boxes: CellMap,
    /// Each box contains sphere indices
    boxes: Vec<Vec<usize>>,
}

impl SpheresSearcher {
    /// Index spheres with a cell size derived from the largest radius.
    pub fn new(spheres: Vec<Sphere>) -> Self {
        let box_size = spheres
            .iter()
            .fold(1.0_f64, |acc, s| acc.max(s.r.mul_add(2.0, 0.25)));
        Self::with_box_size(spheres, box_size)
    }

    /// Index spheres with an explicit cell size, for point clouds queried at
    /// a known radius.
    pub fn with_box_size(spheres: Vec<Sphere>, box_size: f64) -> Self {
        let grid_params = GridParameters::new(&spheres, box_size.max(0.25));
        let mut searcher = Self {
            spheres,
            grid_params,
            map_of_boxes: CellMap::Dense(Vec::new()),
            boxes: Vec::new(),
        };
        searcher.init_boxes();
        searcher
    }

    pub fn spheres(&self) -> &[Sphere] {
        &self.spheres
    }

    fn init_boxes(&mut self) {
        let size = self.grid_params.grid_size;
        self.map_of_boxes = match size.volume().filter(|&n| n <= MAX_DENSE_CELLS) {
            Some(total_cells) => CellMap::Dense(vec![None; total_cells]),
            None => {
                debug!("sparse cell map for a {}x{}x{} grid", size.x, size.y, size.z);
                CellMap::Sparse(HashMap::new())
            }
        };
        self.boxes.clear();

        for (i, sphere) in self.spheres.iter().enumerate() {
            let gp = GridPoint::from_point_with_offset(
                &sphere.center,
                self.grid_params.box_size,
                &self.grid_params.grid_offset,
            );
            let next = self.boxes.len();
            let slot = match &mut self.map_of_boxes {
                CellMap::Dense(cells) => match gp.index(&size) {
                    Some(index) => cells[index].get_or_insert(next),
                    None => continue,
                },
                CellMap::Sparse(cells) => cells.entry([gp.x, gp.y, gp.z]).or_insert(next),
            };
            if *slot == next {
                self.boxes.push(vec![i]);
            } else {
                self.boxes[*slot].push(i);
            }
        }
    }

    fn box_of_cell(&self, cell: GridPoint) -> Option<usize> {
        match &self.map_of_boxes {
            CellMap::Dense(cells) => cell
                .index(&self.grid_params.grid_size)
                .and_then(|index| cells[index]),
            CellMap::Sparse(cells) => cells.get(&[cell.x, cell.y, cell.z]).copied(),
        }
    }

    /// Boxes of all cells that may hold a center within `radius` of `point`.
    ///
    /// When the cell window holds more cells than there are boxes, every box
    /// is visited instead.
    #[allow(clippy::cast_possible_truncation, clippy::cast_precision_loss)]
    fn boxes_around(&self, point: Point3<f64>, radius: f64) -> impl Iterator<Item = &[usize]> {
        let size = self.grid_params.grid_size;
        let gp = GridPoint::from_point_with_offset(
            &point,
            self.grid_params.box_size,
            &self.grid_params.grid_offset,
        );
        let reach = (radius / self.grid_params.box_size)
            .ceil()
            .clamp(0.0, f64::from(size.x.max(size.y).max(size.z))) as i32;
        let range =
            |c: i32, n: i32| c.saturating_sub(reach).max(0)..=c.saturating_add(reach).min(n - 1);
        let (rx, ry, rz) = (range(gp.x, size.x), range(gp.y, size.y), range(gp.z, size.z));
        let span = |r: &std::ops::RangeInclusive<i32>| (f64::from(*r.end()) - f64::from(*r.start()) + 1.0).max(0.0);
        let scan_all = span(&rx) * span(&ry) * span(&rz) > self.boxes.len() as f64;

        let cells = (!scan_all).then(|| {
            rz.flat_map(move |z| {
                let rx = rx.clone();
                ry.clone()
                    .flat_map(move |y| rx.clone().map(move |x| GridPoint { x, y, z }))
            })
            .filter_map(move |cell| self.box_of_cell(cell))
            .map(move |box_id| self.boxes[box_id].as_slice())
        });
        let all = scan_all.then(|| self.boxes.iter().map(Vec::as_slice));
        cells.into_iter().flatten().chain(all.into_iter().flatten())
    }
}

impl NeighborQuery for SpheresSearcher {
    fn neighbors_of_point(&self, point: Point3<f64>, radius: f64) -> impl Iterator<Item = usize> {
        let r2 = radius * radius;
        self.boxes_around(point, radius)
            .flatten()
            .copied()
            .filter(move |&id| (self.spheres[id].center - point).norm_squared() <= r2)
    }

    fn neighbors_of_sphere(&self, id: usize, radius: f64) -> impl Iterator<Item = usize> {
        let center = self.spheres[id].center;
        self.neighbors_of_point(center, radius)
            .filter(move |&other| other != id)
    }
}
