// Copyright (c) 2026 Kliment Olechnovic and Mikael Lund
// Part of the molsurf project, licensed under the MIT License.
// SPDX-License-Identifier: MIT

//! Surface pipeline: atom preparation, lattice setup, marking passes,
//! extraction and fragment post-processing for every surface kind.

use std::time::Instant;

use log::{debug, info, warn};
use nalgebra::Point3;

use crate::envelope::{ENVELOPE_DEPTH, EnvelopeDots, geodesic_envelope};
use crate::error::SurfaceError;
use crate::lattice::{Lattice, UNMARKED};
use crate::marching_cubes::SurfaceExtractor;
use crate::mesh::{SurfaceSet, TriangleMesh};
use crate::post_process::{cull_fragments, measure_fragments, min_fragment_volume, select_pockets};
use crate::solvent_geometry::SolventGeometry;
use crate::types::{Atom, BoundingBox, PocketSelection, SurfaceKind, SurfaceParams, WorkingAtoms};
use crate::voxel_field::{ProgressiveSphereField, SpherePass, VoxelField};

/// Smallest working radius; smaller or non-positive radii are raised to it.
pub const MIN_WORKING_RADIUS: f64 = 0.1;

/// Padding added around each atom when deriving the bounding box.
const BOX_PADDING: f64 = 0.5;

/// Counters describing one computation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SurfaceStats {
    pub selected_atoms: usize,
    pub nearby_atoms: usize,
    pub edges: usize,
    pub faces: usize,
    pub valid_faces: usize,
    /// Synthetic spheres filling cavities (cavity and pocket kinds).
    pub foam_spheres: usize,
    pub lattice_points: [usize; 3],
    /// Fragments before post-processing.
    pub raw_fragments: usize,
}

/// Extracted surface with its fragment summaries.
#[derive(Debug, Clone)]
pub struct SurfaceResult {
    pub mesh: TriangleMesh,
    /// One entry per retained fragment, largest first.
    pub sets: Vec<SurfaceSet>,
    pub lattice: Lattice,
    pub stats: SurfaceStats,
}

impl SurfaceResult {
    /// Total signed volume of the retained fragments.
    #[must_use]
    pub fn volume(&self) -> f64 {
        self.sets.iter().map(|s| s.volume).sum()
    }

    #[must_use]
    pub fn area(&self) -> f64 {
        self.sets.iter().map(|s| s.area).sum()
    }
}

/// Compute the molecular surface of `atoms`.
///
/// Vertex provenance refers to indices into `atoms`.
///
/// # Errors
///
/// Returns [`SurfaceError`] if:
/// - the probe radius or another numeric parameter is invalid
/// - an atom has non-finite coordinates or radius
/// - no atom is selected
/// - the lattice does not fit in memory
///
/// # Example
///
/// ```
/// use molsurf::{Atom, SurfaceKind, SurfaceParams, compute_surface};
///
/// let atoms = vec![Atom::new(-1.0, 0.0, 0.0, 1.6), Atom::new(1.0, 0.0, 0.0, 1.6)];
/// let params = SurfaceParams::new(SurfaceKind::SolventExcluded, 1.4);
/// let surface = compute_surface(&atoms, &params).unwrap();
/// println!("volume {:.2}, area {:.2}", surface.volume(), surface.area());
/// ```
pub fn compute_surface(atoms: &[Atom], params: &SurfaceParams) -> Result<SurfaceResult, SurfaceError> {
    validate_params(params)?;
    validate_atoms(atoms)?;
    let start = Instant::now();

    let extension = if params.kind.extends_radii() {
        params.solvent_radius
    } else {
        0.0
    };
    let (working, bounds) = working_atoms(atoms, params, extension)?;
    let mut stats = SurfaceStats {
        selected_atoms: working.first_nearby,
        nearby_atoms: working.len() - working.first_nearby,
        ..SurfaceStats::default()
    };
    info!(
        "{} atoms will be used in the surface calculation ({} nearby)",
        stats.selected_atoms, stats.nearby_atoms
    );

    let lattice = Lattice::from_bounds(&bounds, params.points_per_unit, params.max_grid_points)?;
    stats.lattice_points = lattice.counts();
    let extractor = SurfaceExtractor::new(params.cutoff, params.interpolation);

    let (mesh, sets) = match params.kind {
        SurfaceKind::SolventExcluded if params.solvent_radius > 0.0 => {
            solvent_excluded(&working, lattice.clone(), params, &extractor, &mut stats)?
        }
        SurfaceKind::Cavity {
            cavity_radius,
            envelope_radius,
        } => cavities(
            &working,
            lattice.clone(),
            params,
            &extractor,
            (cavity_radius, envelope_radius, None),
            &mut stats,
        )?,
        SurfaceKind::Pocket {
            cavity_radius,
            envelope_radius,
            selection,
        } => cavities(
            &working,
            lattice.clone(),
            params,
            &extractor,
            (cavity_radius, envelope_radius, Some(selection)),
            &mut stats,
        )?,
        _ => spheres(&working, lattice.clone(), params, &extractor, &mut stats)?,
    };

    info!(
        "surface: {} vertices, {} triangles, {} fragments in {} ms",
        mesh.vertices.len(),
        mesh.triangles.len(),
        sets.len(),
        start.elapsed().as_millis()
    );
    Ok(SurfaceResult {
        mesh,
        sets,
        lattice,
        stats,
    })
}

fn validate_params(params: &SurfaceParams) -> Result<(), SurfaceError> {
    if !params.solvent_radius.is_finite() || params.solvent_radius < 0.0 {
        return Err(SurfaceError::InvalidProbe(params.solvent_radius));
    }
    if !params.cutoff.is_finite() {
        return Err(SurfaceError::InvalidParameter {
            name: "cutoff",
            value: params.cutoff,
        });
    }
    if let SurfaceKind::Cavity {
        cavity_radius,
        envelope_radius,
    }
    | SurfaceKind::Pocket {
        cavity_radius,
        envelope_radius,
        ..
    } = params.kind
    {
        for (name, value) in [
            ("cavity_radius", cavity_radius),
            ("envelope_radius", envelope_radius),
        ] {
            if !value.is_finite() || value <= 0.0 {
                return Err(SurfaceError::InvalidParameter { name, value });
            }
        }
    }
    if let Some((_, distance)) = params.within
        && !(distance.is_finite() && distance >= 0.0)
    {
        return Err(SurfaceError::InvalidParameter {
            name: "within",
            value: distance,
        });
    }
    Ok(())
}

fn validate_atoms(atoms: &[Atom]) -> Result<(), SurfaceError> {
    for (index, atom) in atoms.iter().enumerate() {
        if !atom.x.is_finite() || !atom.y.is_finite() || !atom.z.is_finite() {
            return Err(SurfaceError::InvalidAtom {
                index,
                reason: "coordinates must be finite",
            });
        }
        if !atom.r.is_finite() {
            return Err(SurfaceError::InvalidAtom {
                index,
                reason: "radius must be finite",
            });
        }
    }
    Ok(())
}

/// Selected atoms followed by nearby atoms touching the bounding box.
fn working_atoms(
    atoms: &[Atom],
    params: &SurfaceParams,
    extension: f64,
) -> Result<(WorkingAtoms, BoundingBox), SurfaceError> {
    let flag = |mask: &Option<Vec<bool>>, i: usize, default: bool| {
        mask.as_ref()
            .map_or(default, |m| m.get(i).copied().unwrap_or(false))
    };
    let ignored = |i: usize| flag(&params.ignore, i, false);
    let selected = |i: usize| flag(&params.selection, i, true) && !ignored(i);

    let mut clamped = 0_usize;
    let mut radius = |atom: &Atom| {
        if atom.r < MIN_WORKING_RADIUS {
            clamped += 1;
        }
        atom.r.max(MIN_WORKING_RADIUS) + extension
    };

    let mut working = WorkingAtoms::default();
    for (i, atom) in atoms.iter().enumerate().filter(|&(i, _)| selected(i)) {
        working.push(atom.center(), radius(atom), Some(i));
    }
    if working.is_empty() {
        return Err(SurfaceError::NoAtoms);
    }
    working.first_nearby = working.len();

    let bounds = params.bounding_box.unwrap_or_else(|| {
        let mut bounds = BoundingBox::empty();
        for (center, r) in working.centers.iter().zip(&working.radii) {
            bounds.include_sphere(center, r + BOX_PADDING);
        }
        bounds
    });

    if params.selection.is_some() {
        for (i, atom) in atoms.iter().enumerate() {
            if selected(i) || ignored(i) {
                continue;
            }
            let r = radius(atom);
            if bounds.touches_sphere(&atom.center(), r) {
                working.push(atom.center(), r, Some(i));
            }
        }
    }
    if clamped > 0 {
        warn!("{clamped} atom radii below {MIN_WORKING_RADIUS} were raised to it");
    }
    Ok((working, bounds))
}

type Fragments = (TriangleMesh, Vec<SurfaceSet>);

/// Probe-rolled molecular surface: face, toroid and sphere passes.
fn solvent_excluded(
    atoms: &WorkingAtoms,
    lattice: Lattice,
    params: &SurfaceParams,
    extractor: &SurfaceExtractor,
    stats: &mut SurfaceStats,
) -> Result<Fragments, SurfaceError> {
    if params.progressive {
        warn!("progressive mode only applies to sphere surfaces, using the full grid");
    }
    let rs = params.solvent_radius;
    let geometry = SolventGeometry::build(atoms, rs);
    stats.edges = geometry.edges().len();
    stats.faces = geometry.faces().len();
    stats.valid_faces = geometry.valid_faces().count();
    info!(
        "{} edges, {} faces ({} valid)",
        stats.edges, stats.faces, stats.valid_faces
    );

    let mut field = VoxelField::new(lattice, atoms.clone(), rs)?;
    let start = Instant::now();
    field.mark_face_voxels(&geometry, true);
    field.mark_toroid_voxels(&geometry);
    field.mark_face_voxels(&geometry, false);
    field.mark_sphere_voxels(&SpherePass {
        window: rs,
        surface_atoms: Some(geometry.no_face_atoms()),
        ..SpherePass::default()
    });
    field.unset_unmarked();
    debug!("voxel marking took {} ms", start.elapsed().as_millis());

    let mut mesh = extractor.extract(&field);
    stats.raw_fragments = mesh.components().len();
    let min_volume = params.min_fragment_filter.then(|| min_fragment_volume(rs));
    let n_input = atoms.input_index.iter().flatten().max().map_or(0, |&i| i + 1);
    let sets = cull_fragments(&mut mesh, n_input, min_volume);
    Ok((mesh, sets))
}

/// Union of atom spheres, optionally plane by plane.
fn spheres(
    atoms: &WorkingAtoms,
    lattice: Lattice,
    params: &SurfaceParams,
    extractor: &SurfaceExtractor,
    stats: &mut SurfaceStats,
) -> Result<Fragments, SurfaceError> {
    let pass = SpherePass {
        within: params.within,
        ..SpherePass::default()
    };
    let mesh = if params.progressive {
        debug!("progressive sphere field");
        let field = ProgressiveSphereField::new(lattice, atoms.clone(), pass)?;
        extractor.extract(&field)
    } else {
        let mut field = VoxelField::new(lattice, atoms.clone(), 0.0)?;
        field.mark_sphere_voxels(&pass);
        field.unset_unmarked();
        extractor.extract(&field)
    };
    let sets = measure_fragments(&mesh);
    stats.raw_fragments = sets.len();
    Ok((mesh, sets))
}

/// Fill the voids the envelope cannot reach with foam spheres and surface them.
fn cavities(
    atoms: &WorkingAtoms,
    lattice: Lattice,
    params: &SurfaceParams,
    extractor: &SurfaceExtractor,
    (cavity_radius, envelope_radius, selection): (f64, f64, Option<PocketSelection>),
    stats: &mut SurfaceStats,
) -> Result<Fragments, SurfaceError> {
    if params.progressive {
        warn!("progressive mode only applies to sphere surfaces, using the full grid");
    }
    let dots = EnvelopeDots::new(
        geodesic_envelope(atoms, envelope_radius, ENVELOPE_DEPTH),
        envelope_radius,
    );
    debug!("{} envelope dots", dots.len());

    let mut field = VoxelField::new(lattice, atoms.clone(), 0.0)?;
    field.mark_sphere_voxels(&SpherePass {
        reach: cavity_radius,
        within: params.within,
        ..SpherePass::default()
    });
    let foam = foam_spheres(&field, cavity_radius, &dots);
    stats.foam_spheres = foam.len();
    info!("cavities include {} voxel points", foam.len());

    field.reset_with_atoms(foam);
    field.mark_sphere_voxels(&SpherePass::default());
    field.unset_unmarked();
    let mut mesh = extractor.extract(&field);
    stats.raw_fragments = mesh.components().len();

    let sets = match selection {
        Some(selection) => select_pockets(&mut mesh, &dots, selection),
        None => measure_fragments(&mesh),
    };
    Ok((mesh, sets))
}

/// Lattice points at least `cavity_radius` from every atom and not near the
/// envelope, as spheres reaching the nearest atom surface.
fn foam_spheres(field: &VoxelField, cavity_radius: f64, dots: &EnvelopeDots) -> WorkingAtoms {
    let grid = field.grid();
    let lattice = grid.lattice();
    let mut foam = WorkingAtoms::default();
    for (index, &value) in grid.values().iter().enumerate() {
        if !(cavity_radius..UNMARKED).contains(&value) {
            continue;
        }
        let [i, j, k] = lattice.index_to_ijk(index);
        let pt: Point3<f64> = lattice.to_world(i, j, k);
        if !dots.is_near(pt) {
            foam.push(pt, value, None);
        }
    }
    foam.first_nearby = foam.len();
    foam
}
