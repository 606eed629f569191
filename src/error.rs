// Copyright (c) 2026 Kliment Olechnovic and Mikael Lund
// Part of the molsurf project, licensed under the MIT License.
// SPDX-License-Identifier: MIT

//! Error type for surface computation.

use thiserror::Error;

/// Failures surfaced to the caller of [`compute_surface`](crate::compute_surface).
///
/// Geometric degeneracies (coincident atoms, unsolvable probe triples, zero-length
/// vectors) are not errors: they are skipped locally and logged.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SurfaceError {
    /// No atom survived selection, so there is nothing to surface.
    #[error("no atoms selected for the surface calculation")]
    NoAtoms,

    /// Probe (solvent) radius must be non-negative and finite.
    #[error("invalid probe radius: {0} (must be non-negative and finite)")]
    InvalidProbe(f64),

    /// An atom has non-finite coordinates or radius.
    #[error("invalid atom at index {index}: {reason}")]
    InvalidAtom {
        /// Index of the offending atom in the input slice.
        index: usize,
        /// Why the atom was rejected.
        reason: &'static str,
    },

    /// A numeric parameter is out of range.
    #[error("invalid parameter {name}: {value}")]
    InvalidParameter {
        /// Parameter name.
        name: &'static str,
        /// Rejected value.
        value: f64,
    },

    /// The requested lattice would not fit in memory.
    #[error("grid of {points} points exceeds the limit of {limit}; lower the resolution or use progressive mode")]
    GridTooLarge {
        /// Requested number of lattice points.
        points: u64,
        /// Hard limit.
        limit: u64,
    },

    /// Lattice basis vectors are zero-length or linearly dependent.
    #[error("lattice basis vectors are degenerate")]
    DegenerateLattice,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_name_the_problem() {
        let e = SurfaceError::GridTooLarge {
            points: 1_000,
            limit: 10,
        };
        assert!(e.to_string().contains("1000"));
        assert!(e.to_string().contains("progressive"));

        let e = SurfaceError::InvalidAtom {
            index: 3,
            reason: "coordinates must be finite",
        };
        assert_eq!(
            e.to_string(),
            "invalid atom at index 3: coordinates must be finite"
        );
    }
}
