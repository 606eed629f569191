// Copyright (c) 2026 Kliment Olechnovic and Mikael Lund
// Part of the molsurf project, licensed under the MIT License.
// SPDX-License-Identifier: MIT

use std::f64::consts::PI;

use approx::assert_relative_eq;
use molsurf::envelope::GeodesicSphere;
use molsurf::jvxl::{decode_vertices, encode_vertices};
use molsurf::{
    Atom, Interpolation, PocketSelection, SurfaceKind, SurfaceParams, SurfaceResult,
    compute_surface,
};
use nalgebra::Point3;

fn two_atoms() -> Vec<Atom> {
    vec![Atom::new(-2.70, 0.0, 0.0, 1.7), Atom::new(2.75, 0.0, 0.0, 1.7)]
}

fn seed_params() -> SurfaceParams {
    SurfaceParams::new(SurfaceKind::SolventExcluded, 1.5)
        .with_resolution(5.0)
        .with_max_grid_points(200)
}

fn cluster() -> Vec<Atom> {
    vec![
        Atom::new(-1.0, 0.3, 0.0, 1.8),
        Atom::new(1.2, -0.4, 0.5, 1.5),
        Atom::new(0.0, 1.5, -1.0, 1.6),
        Atom::new(0.5, 0.0, 2.5, 1.2),
        Atom::new(-2.2, -1.6, 1.1, 1.7),
    ]
}

fn max_spacing(surface: &SurfaceResult) -> f64 {
    surface.lattice.max_spacing()
}

#[test]
fn two_atom_excluded_surface_volume_and_area() {
    let surface = compute_surface(&two_atoms(), &seed_params()).unwrap();
    assert_eq!(surface.sets.len(), 1);
    assert!(!surface.sets[0].is_cavity);
    let volume = surface.volume();
    let area = surface.area();
    assert!((41.6..=41.8).contains(&volume), "volume {volume}");
    assert!((75.0..=75.2).contains(&area), "area {area}");
    assert_relative_eq!(volume, surface.mesh.volume(), epsilon = 1e-9);
    assert_eq!(surface.stats.edges, 1);
    assert_eq!(surface.stats.faces, 0);
}

#[test]
fn linear_and_nonlinear_agree() {
    let nonlinear = compute_surface(&two_atoms(), &seed_params()).unwrap();
    let linear = compute_surface(
        &two_atoms(),
        &seed_params().with_interpolation(Interpolation::Linear),
    )
    .unwrap();
    assert!((41.6..=41.8).contains(&linear.volume()), "volume {}", linear.volume());
    assert!((75.0..=75.2).contains(&linear.area()), "area {}", linear.area());
    assert_relative_eq!(linear.volume(), nonlinear.volume(), max_relative = 0.003);
    assert_relative_eq!(linear.area(), nonlinear.area(), max_relative = 0.003);
}

#[test]
fn repeated_runs_are_identical() {
    let atoms = cluster();
    let params = SurfaceParams::new(SurfaceKind::SolventExcluded, 1.4).with_resolution(3.0);
    let a = compute_surface(&atoms, &params).unwrap();
    let b = compute_surface(&atoms, &params).unwrap();
    assert_eq!(a.mesh.vertices.len(), b.mesh.vertices.len());
    assert_eq!(a.mesh.triangles, b.mesh.triangles);
    for (u, v) in a.mesh.vertices.iter().zip(&b.mesh.vertices) {
        assert_relative_eq!(u.position, v.position, epsilon = 1e-12);
        assert_eq!(u.atom, v.atom);
    }
    assert_eq!(a.sets, b.sets);
}

#[test]
fn accessible_surface_of_single_atom_is_a_sphere() {
    let center = Point3::new(0.4, -0.3, 0.2);
    let atoms = [Atom::new(center.x, center.y, center.z, 1.5)];
    let params = SurfaceParams::new(SurfaceKind::SolventAccessible, 1.2).with_resolution(4.0);
    let surface = compute_surface(&atoms, &params).unwrap();
    assert!(!surface.mesh.vertices.is_empty());
    let tolerance = 1e-3 * max_spacing(&surface);
    for v in &surface.mesh.vertices {
        assert!(((v.position - center).norm() - 2.7).abs() < tolerance);
    }
    let exact = 4.0 / 3.0 * PI * 2.7_f64.powi(3);
    assert_relative_eq!(surface.volume(), exact, max_relative = 0.02);
}

#[test]
fn provenance_points_at_an_extended_sphere() {
    let atoms = cluster();
    let rs = 1.2;
    let sas = compute_surface(
        &atoms,
        &SurfaceParams::new(SurfaceKind::SolventAccessible, rs).with_resolution(4.0),
    )
    .unwrap();
    let tolerance = 1.5 * max_spacing(&sas);
    for v in &sas.mesh.vertices {
        let atom = atoms[v.atom.unwrap()];
        let d = (v.position - atom.center()).norm();
        assert!((d - (atom.r + rs)).abs() < tolerance, "{d} vs {}", atom.r + rs);
    }

    let ses = compute_surface(
        &atoms,
        &SurfaceParams::new(SurfaceKind::SolventExcluded, rs).with_resolution(4.0),
    )
    .unwrap();
    let spacing = max_spacing(&ses);
    let (probe, sphere): (Vec<_>, Vec<_>) = ses
        .mesh
        .vertices
        .iter()
        .filter(|v| v.atom.is_some())
        .partition(|v| v.from_probe);
    assert!(!probe.is_empty());
    assert!(!sphere.is_empty());
    // sphere patches lie on their atom within one lattice edge
    for v in sphere {
        let atom = atoms[v.atom.unwrap()];
        let d = (v.position - atom.center()).norm();
        assert!((d - atom.r).abs() <= spacing + 1e-9, "{d} vs {}", atom.r);
    }
    // probe patches lie on a probe touching their atom
    for v in probe {
        let atom = atoms[v.atom.unwrap()];
        let d = (v.position - atom.center()).norm();
        assert!(
            (d - (atom.r + rs)).abs() <= rs + 2.0 * spacing,
            "{d} vs {}",
            atom.r + rs
        );
    }
}

#[test]
fn progressive_matches_full_grid() {
    let atoms = cluster();
    let params = SurfaceParams::new(SurfaceKind::VanDerWaals, 0.0).with_resolution(3.0);
    let full = compute_surface(&atoms, &params).unwrap();
    let progressive = compute_surface(&atoms, &params.clone().with_progressive(true)).unwrap();
    assert_eq!(full.mesh.vertices.len(), progressive.mesh.vertices.len());
    assert_eq!(full.mesh.triangles, progressive.mesh.triangles);
    for (u, v) in full.mesh.vertices.iter().zip(&progressive.mesh.vertices) {
        assert_relative_eq!(u.position, v.position, epsilon = 1e-12);
    }
}

#[test]
fn unselected_atoms_block_the_surface() {
    let atoms = two_atoms();
    let params = SurfaceParams::new(SurfaceKind::VanDerWaals, 0.0)
        .with_resolution(4.0)
        .with_selection(vec![true, false]);
    let surface = compute_surface(&atoms, &params).unwrap();
    assert_eq!(surface.stats.selected_atoms, 1);
    assert!(surface.mesh.vertices.iter().all(|v| v.atom == Some(0)));
    assert!(surface.mesh.vertices.iter().all(|v| v.position.x < 0.0));
}

#[test]
fn within_restricts_accessible_surface() {
    let atoms = two_atoms();
    let mut params = SurfaceParams::new(SurfaceKind::VanDerWaals, 0.0).with_resolution(4.0);
    params.within = Some((Point3::new(-2.7, 0.0, 0.0), 3.0));
    let surface = compute_surface(&atoms, &params).unwrap();
    assert!(!surface.mesh.vertices.is_empty());
    assert!(surface.mesh.vertices.iter().all(|v| v.atom == Some(0)));
}

fn hollow_shell() -> Vec<Atom> {
    GeodesicSphere::new(1)
        .points_on_sphere(Point3::origin(), 6.0)
        .map(|p| Atom::new(p.x, p.y, p.z, 1.8))
        .collect()
}

fn cavity_params(kind: SurfaceKind) -> SurfaceParams {
    SurfaceParams::new(kind, 1.2).with_resolution(2.0)
}

#[test]
fn hollow_shell_has_an_interior_cavity() {
    let atoms = hollow_shell();
    let cavity = compute_surface(
        &atoms,
        &cavity_params(SurfaceKind::Cavity {
            cavity_radius: 1.2,
            envelope_radius: 10.0,
        }),
    )
    .unwrap();
    assert!(cavity.stats.foam_spheres > 0);
    assert!(!cavity.sets.is_empty());
    assert!(cavity.mesh.vertices.iter().all(|v| v.position.coords.norm() < 6.0));
    assert!(cavity.mesh.vertices.iter().all(|v| v.atom.is_none()));

    let interior = compute_surface(
        &atoms,
        &cavity_params(SurfaceKind::Pocket {
            cavity_radius: 1.2,
            envelope_radius: 10.0,
            selection: PocketSelection::Interior,
        }),
    )
    .unwrap();
    assert_eq!(interior.mesh.triangles.len(), cavity.mesh.triangles.len());

    let pockets = compute_surface(
        &atoms,
        &cavity_params(SurfaceKind::Pocket {
            cavity_radius: 1.2,
            envelope_radius: 10.0,
            selection: PocketSelection::Pockets,
        }),
    )
    .unwrap();
    assert!(pockets.mesh.triangles.is_empty());
    assert!(pockets.sets.is_empty());
}

#[test]
fn mesh_survives_compact_encoding() {
    let surface = compute_surface(&two_atoms(), &seed_params()).unwrap();
    let encoded = encode_vertices(&surface.mesh.vertices);
    assert!(!encoded.fractions.contains('\\'));
    let decoded = decode_vertices(&encoded, &surface.lattice);
    assert_eq!(decoded.len(), surface.mesh.vertices.len());
    for (v, p) in surface.mesh.vertices.iter().zip(&decoded) {
        let edge = surface.lattice.vector(usize::from(v.edge.axis)).norm();
        assert!((v.position - p).norm() <= edge / 90.0 + 1e-12);
    }
}
