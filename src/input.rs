// Copyright (c) 2026 Kliment Olechnovic and Mikael Lund
// Part of the molsurf project, licensed under the MIT License.
// SPDX-License-Identifier: MIT

//! XYZR atom input: one atom per line, the last four columns being
//! `x y z radius`. Leading columns (names, serials) are ignored, as are blank
//! lines and lines starting with `#`.

use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::Path;

use log::{debug, warn};

use crate::types::Atom;

fn parse_line(line: &str) -> Option<Atom> {
    let mut parts = line.split_whitespace().rev();
    let r: f64 = parts.next()?.parse().ok()?;
    let z: f64 = parts.next()?.parse().ok()?;
    let y: f64 = parts.next()?.parse().ok()?;
    let x: f64 = parts.next()?.parse().ok()?;
    Some(Atom::new(x, y, z, r))
}

/// Parse XYZR records from a reader.
///
/// # Errors
///
/// Returns an I/O error if reading fails.
pub fn parse_xyzr<R: BufRead>(reader: R) -> io::Result<Vec<Atom>> {
    let mut atoms = Vec::new();
    let mut skipped = 0_usize;
    for line in reader.lines() {
        let line = line?;
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        match parse_line(trimmed) {
            Some(atom) => atoms.push(atom),
            None => skipped += 1,
        }
    }
    if skipped > 0 {
        warn!("skipped {skipped} malformed XYZR lines");
    }
    debug!("parsed {} atoms", atoms.len());
    Ok(atoms)
}

/// Parse an XYZR file.
///
/// # Errors
///
/// Returns an I/O error if the file cannot be opened or read.
pub fn parse_file(path: &Path) -> io::Result<Vec<Atom>> {
    parse_xyzr(BufReader::new(File::open(path)?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_last_four_columns() {
        let data = "# two atoms\n1.0 2.0 3.0 4.0\n\nCA 7 5.0 6.0 7.0 1.8\n";
        let atoms = parse_xyzr(data.as_bytes()).unwrap();
        assert_eq!(atoms, vec![Atom::new(1.0, 2.0, 3.0, 4.0), Atom::new(5.0, 6.0, 7.0, 1.8)]);
    }

    #[test]
    fn malformed_lines_skipped() {
        let data = "1.0 2.0 x 4.0\n1.0 2.0\n0 0 0 1.5\n";
        let atoms = parse_xyzr(data.as_bytes()).unwrap();
        assert_eq!(atoms, vec![Atom::new(0.0, 0.0, 0.0, 1.5)]);
    }
}
