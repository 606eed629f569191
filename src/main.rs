// Copyright (c) 2026 Kliment Olechnovic and Mikael Lund
// Part of the molsurf project, licensed under the MIT License.
// SPDX-License-Identifier: MIT

//! CLI for computing molecular surfaces from XYZR atom lists.

use std::fs::File;
use std::io::{self, Write};
use std::path::PathBuf;
use std::time::Instant;

use clap::{ArgAction, Parser, ValueEnum};
use log::info;
use molsurf::input::{parse_file, parse_xyzr};
use molsurf::{
    Interpolation, PocketSelection, SurfaceKind, SurfaceParams, SurfaceResult, SurfaceSet,
    SurfaceStats, compute_surface,
};
use serde::Serialize;

#[derive(Clone, Copy, Debug, ValueEnum)]
enum Kind {
    Vdw,
    Sas,
    Ses,
    Cavity,
    Pocket,
    Interior,
}

#[derive(Serialize)]
struct MeshOutput {
    vertices: Vec<[f64; 3]>,
    /// Caller atom index per vertex, or -1.
    vertex_atoms: Vec<i64>,
    triangles: Vec<[u32; 3]>,
}

#[derive(Serialize)]
struct JsonOutput {
    vertex_count: usize,
    triangle_count: usize,
    total_volume: f64,
    total_area: f64,
    sets: Vec<SurfaceSet>,
    stats: SurfaceStats,
    #[serde(skip_serializing_if = "Option::is_none")]
    mesh: Option<MeshOutput>,
}

impl JsonOutput {
    fn new(surface: SurfaceResult, include_mesh: bool) -> Self {
        let mesh = include_mesh.then(|| MeshOutput {
            vertices: surface
                .mesh
                .vertices
                .iter()
                .map(|v| [v.position.x, v.position.y, v.position.z])
                .collect(),
            vertex_atoms: surface
                .mesh
                .vertices
                .iter()
                .map(|v| v.atom.and_then(|a| i64::try_from(a).ok()).unwrap_or(-1))
                .collect(),
            triangles: surface.mesh.triangles.iter().map(|t| t.vertices).collect(),
        });
        Self {
            vertex_count: surface.mesh.vertices.len(),
            triangle_count: surface.mesh.triangles.len(),
            total_volume: surface.volume(),
            total_area: surface.area(),
            sets: surface.sets,
            stats: surface.stats,
            mesh,
        }
    }
}

#[derive(Parser)]
#[command(name = "molsurf")]
#[command(about = "Compute triangulated molecular surfaces of atomic balls")]
#[command(
    long_about = "Builds van der Waals, solvent-accessible or solvent-excluded surfaces, \
    cavities and pockets of a set of atoms on a voxel lattice, and writes vertex and \
    triangle counts, per-fragment volumes and areas as JSON.\n\n\
    Input is XYZR: x y z radius per line (the last four columns are used)."
)]
#[allow(clippy::struct_excessive_bools)]
struct Cli {
    /// Surface kind
    #[arg(long, value_enum, default_value_t = Kind::Ses)]
    kind: Kind,

    /// Probe (solvent) radius
    #[arg(long, default_value_t = 1.2)]
    probe: f64,

    /// Lattice points per unit length
    #[arg(long, default_value_t = 4.0)]
    resolution: f64,

    /// Maximum lattice points along any axis
    #[arg(long, default_value_t = 60)]
    max_grid: usize,

    /// Interpolate vertices linearly instead of on spherical arcs
    #[arg(long)]
    linear: bool,

    /// Keep only two lattice planes in memory (vdw and sas only)
    #[arg(long)]
    progressive: bool,

    /// Keep small stray fragments of the solvent-excluded surface
    #[arg(long)]
    keep_fragments: bool,

    /// Minimum distance from any atom surface for cavity space
    #[arg(long, default_value_t = 1.2)]
    cavity_radius: f64,

    /// Envelope distance separating pockets from the outside
    #[arg(long, default_value_t = 10.0)]
    envelope_radius: f64,

    /// Include vertex positions and triangles in the output
    #[arg(long)]
    include_mesh: bool,

    /// Input XYZR file. Reads from stdin if not specified
    #[arg(short, long)]
    input: Option<PathBuf>,

    /// Output JSON file. Writes to stdout if not specified
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Increase verbosity (-v: debug, -vv: trace)
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,

    /// Reduce verbosity to warnings only
    #[arg(short, long)]
    quiet: bool,

    /// Maximum number of threads to use (default: all available)
    #[arg(long)]
    processors: Option<usize>,

    /// Measure and output running time to stderr
    #[arg(long)]
    measure_running_time: bool,
}

impl Cli {
    fn params(&self) -> SurfaceParams {
        let (cavity_radius, envelope_radius) = (self.cavity_radius, self.envelope_radius);
        let pocket = |selection| SurfaceKind::Pocket {
            cavity_radius,
            envelope_radius,
            selection,
        };
        let kind = match self.kind {
            Kind::Vdw => SurfaceKind::VanDerWaals,
            Kind::Sas => SurfaceKind::SolventAccessible,
            Kind::Ses => SurfaceKind::SolventExcluded,
            Kind::Cavity => SurfaceKind::Cavity {
                cavity_radius,
                envelope_radius,
            },
            Kind::Pocket => pocket(PocketSelection::Pockets),
            Kind::Interior => pocket(PocketSelection::Interior),
        };
        let interpolation = if self.linear {
            Interpolation::Linear
        } else {
            Interpolation::Nonlinear
        };
        let mut params = SurfaceParams::new(kind, self.probe)
            .with_resolution(self.resolution)
            .with_max_grid_points(self.max_grid)
            .with_interpolation(interpolation)
            .with_progressive(self.progressive);
        params.min_fragment_filter = !self.keep_fragments;
        params
    }
}

fn main() -> io::Result<()> {
    let cli = Cli::parse();

    let log_level = if cli.quiet {
        "warn"
    } else {
        match cli.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(log_level)).init();

    if let Some(num_threads) = cli.processors {
        rayon::ThreadPoolBuilder::new()
            .num_threads(num_threads)
            .build_global()
            .map_err(io::Error::other)?;
        info!("Using {num_threads} threads");
    }

    let atoms = match &cli.input {
        Some(path) => parse_file(path)?,
        None => parse_xyzr(io::stdin().lock())?,
    };
    info!("Read {} atoms", atoms.len());

    let start = Instant::now();
    let surface = compute_surface(&atoms, &cli.params())
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e.to_string()))?;
    let elapsed = start.elapsed();

    if cli.measure_running_time {
        info!("Surface time: {} ms", elapsed.as_millis());
    }

    let output = JsonOutput::new(surface, cli.include_mesh);
    if let Some(path) = &cli.output {
        let file = File::create(path)?;
        serde_json::to_writer_pretty(file, &output)?;
    } else {
        let mut stdout = io::stdout().lock();
        serde_json::to_writer_pretty(&mut stdout, &output)?;
        writeln!(stdout)?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_map_to_surface_kinds() {
        let cli = Cli::parse_from(["molsurf", "--kind", "interior", "--cavity-radius", "2.0"]);
        assert_eq!(
            cli.params().kind,
            SurfaceKind::Pocket {
                cavity_radius: 2.0,
                envelope_radius: 10.0,
                selection: PocketSelection::Interior,
            }
        );
        let cli = Cli::parse_from(["molsurf", "--kind", "sas", "--linear", "--keep-fragments"]);
        let params = cli.params();
        assert_eq!(params.kind, SurfaceKind::SolventAccessible);
        assert_eq!(params.interpolation, Interpolation::Linear);
        assert!(!params.min_fragment_filter);
    }
}
