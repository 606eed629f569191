// Copyright (c) 2026 Kliment Olechnovic and Mikael Lund
// Part of the molsurf project, licensed under the MIT License.
// SPDX-License-Identifier: MIT

//! Compact printable-character encoding of edge fractions and voxel values.
//!
//! A fraction in `[0, 1)` maps to one character in `'#'..='|'`; the backslash
//! is replaced by `'!'` so the text needs no escaping, and the character just
//! past the range stands for NaN. Two-character codes square the precision.

use nalgebra::Point3;

use crate::lattice::Lattice;
use crate::mesh::{LatticeEdge, Vertex};

/// First code character.
pub const FRACTION_BASE: u32 = 35;
/// Number of quantization levels per character.
pub const FRACTION_RANGE: u32 = 90;

const BACKSLASH: u32 = 92;
const BACKSLASH_SUBSTITUTE: char = '!';
const MAX_FRACTION: f64 = 0.9999;

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn level(fraction: f64, range: u32) -> u32 {
    if fraction.is_nan() {
        return range;
    }
    ((fraction.clamp(0.0, MAX_FRACTION) * f64::from(range)).floor() as u32).min(range - 1)
}

fn code(level: u32) -> char {
    let ch = FRACTION_BASE + level;
    if ch == BACKSLASH {
        BACKSLASH_SUBSTITUTE
    } else {
        char::from_u32(ch).unwrap_or(BACKSLASH_SUBSTITUTE)
    }
}

fn level_of(ch: char) -> u32 {
    let ch = if ch == BACKSLASH_SUBSTITUTE {
        BACKSLASH
    } else {
        u32::from(ch)
    };
    ch.saturating_sub(FRACTION_BASE).min(FRACTION_RANGE)
}

/// One-character code of a fraction in `[0, 1]`.
#[must_use]
pub fn fraction_as_char(fraction: f64) -> char {
    code(level(fraction, FRACTION_RANGE))
}

/// Fraction decoded from a one-character code, at the center of its bin.
#[must_use]
pub fn fraction_from_char(ch: char) -> f64 {
    let level = level_of(ch);
    if level == FRACTION_RANGE {
        return f64::NAN;
    }
    (f64::from(level) + 0.5) / f64::from(FRACTION_RANGE)
}

/// Two-character code with `FRACTION_RANGE²` levels.
#[must_use]
pub fn fraction_as_chars2(fraction: f64) -> [char; 2] {
    let fine = level(fraction, FRACTION_RANGE * FRACTION_RANGE);
    if fine == FRACTION_RANGE * FRACTION_RANGE {
        return [code(FRACTION_RANGE), code(0)];
    }
    [code(fine / FRACTION_RANGE), code(fine % FRACTION_RANGE)]
}

#[must_use]
pub fn fraction_from_chars2(hi: char, lo: char) -> f64 {
    let hi = level_of(hi);
    if hi == FRACTION_RANGE {
        return f64::NAN;
    }
    let range = f64::from(FRACTION_RANGE);
    (f64::from(hi) + (f64::from(level_of(lo).min(FRACTION_RANGE - 1)) + 0.5) / range) / range
}

/// Encode values lying in `[min, max]`; NaN survives the round trip.
#[must_use]
pub fn encode_values(values: &[f64], min: f64, max: f64, precise: bool) -> String {
    let span = max - min;
    let mut out = String::with_capacity(values.len() * if precise { 2 } else { 1 });
    for &v in values {
        let f = if span > 0.0 { (v - min) / span } else { 0.0 };
        if precise {
            out.extend(fraction_as_chars2(f));
        } else {
            out.push(fraction_as_char(f));
        }
    }
    out
}

/// Inverse of [`encode_values`].
#[must_use]
pub fn decode_values(text: &str, min: f64, max: f64, precise: bool) -> Vec<f64> {
    let span = max - min;
    let chars: Vec<char> = text.chars().collect();
    let fractions: Vec<f64> = if precise {
        chars
            .chunks_exact(2)
            .map(|pair| fraction_from_chars2(pair[0], pair[1]))
            .collect()
    } else {
        chars.into_iter().map(fraction_from_char).collect()
    };
    fractions.into_iter().map(|f| f.mul_add(span, min)).collect()
}

/// Mesh vertices as lattice edges plus one fraction character each.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct EncodedVertices {
    /// Lower lattice point index and axis of each vertex's edge.
    pub edges: Vec<(usize, u8)>,
    pub fractions: String,
}

#[must_use]
pub fn encode_vertices(vertices: &[Vertex]) -> EncodedVertices {
    EncodedVertices {
        edges: vertices.iter().map(|v| (v.edge.point, v.edge.axis)).collect(),
        fractions: vertices.iter().map(|v| fraction_as_char(v.fraction)).collect(),
    }
}

/// Vertex positions rebuilt on `lattice`; each lies within
/// `edge length / FRACTION_RANGE` of the encoded one.
///
/// Edges outside the lattice are skipped.
#[must_use]
pub fn decode_vertices(encoded: &EncodedVertices, lattice: &Lattice) -> Vec<Point3<f64>> {
    encoded
        .edges
        .iter()
        .zip(encoded.fractions.chars())
        .filter(|&(&(point, axis), _)| point < lattice.n_points() && axis < 3)
        .map(|(&(point, axis), ch)| {
            let edge = LatticeEdge { point, axis };
            let [i, j, k] = lattice.index_to_ijk(edge.point);
            let f = fraction_from_char(ch);
            lattice.to_world(i, j, k) + lattice.vector(usize::from(edge.axis)) * f
        })
        .collect()
}
