// Copyright (c) 2026 Kliment Olechnovic and Mikael Lund
// Part of the molsurf project, licensed under the MIT License.
// SPDX-License-Identifier: MIT

use nalgebra::{Point3, Vector3};

/// Tolerance for floating-point comparisons.
pub const EPSILON: f64 = 1e-10;

/// Epsilon-based floating point comparisons.
pub mod float_cmp {
    use super::EPSILON;

    #[inline]
    pub const fn eq(a: f64, b: f64) -> bool {
        (a - b).abs() <= EPSILON
    }

    #[inline]
    pub const fn lt(a: f64, b: f64) -> bool {
        a + EPSILON < b
    }

    #[inline]
    pub const fn gt(a: f64, b: f64) -> bool {
        a - EPSILON > b
    }
}

use float_cmp::{eq, gt, lt};

/// Signed distance from point to plane (assumes `plane_normal` is unit length)
#[inline]
pub fn signed_distance_to_plane_unit(
    plane_point: &Point3<f64>,
    plane_normal: &Vector3<f64>,
    x: &Point3<f64>,
) -> f64 {
    plane_normal.dot(&(x - plane_point))
}

/// Triangle area from three points
#[inline]
pub fn triangle_area(a: &Point3<f64>, b: &Point3<f64>, c: &Point3<f64>) -> f64 {
    (b - a).cross(&(c - a)).norm() / 2.0
}

/// Signed volume of the tetrahedron spanned by the origin and a triangle.
#[inline]
pub fn signed_tetrahedron_volume(a: &Point3<f64>, b: &Point3<f64>, c: &Point3<f64>) -> f64 {
    a.coords.dot(&b.coords.cross(&c.coords)) / 6.0
}

/// Unnormalized side of `x` relative to the plane through `p`, `q`, `r`.
#[inline]
fn side_of_plane(p: &Point3<f64>, q: &Point3<f64>, r: &Point3<f64>, x: &Point3<f64>) -> f64 {
    (q - p).cross(&(r - p)).dot(&(x - p))
}

/// Whether `pt` lies in the trigonal cone with apex `apex` and edges through
/// `a`, `b` and `c`, on the apex side of plane `abc` or beyond the apex.
///
/// The cone is open past the base triangle: only points no farther from plane
/// `abc` than the apex on the same side, or on the opposite side, are inside.
pub fn is_in_trigonal_cone(
    pt: &Point3<f64>,
    a: &Point3<f64>,
    b: &Point3<f64>,
    c: &Point3<f64>,
    apex: &Point3<f64>,
) -> bool {
    let inside = side_of_plane(c, apex, a, pt) >= 0.0;
    if (side_of_plane(a, apex, b, pt) >= 0.0) != inside
        || (side_of_plane(b, apex, c, pt) >= 0.0) != inside
    {
        return false;
    }
    let normal = (b - a).cross(&(c - a));
    let d = normal.dot(&(pt - a));
    let d_apex = normal.dot(&(apex - a));
    d_apex * d <= 0.0 || d_apex.abs() > d.abs()
}

/// Distance from a lattice point `v` to the probe that touches spheres
/// `a` (radius `r_as`) and `b` (radius `r_bs`) in the plane containing `v`.
///
/// Both radii already include the probe radius. `d_av` and `d_bv` are the
/// distances from the two centers to `v`.
pub fn solvent_distance(r_as: f64, r_bs: f64, d_ab: f64, d_av: f64, d_bv: f64) -> f64 {
    let cos_vab = (d_bv.mul_add(-d_bv, d_av.mul_add(d_av, d_ab * d_ab)) / (2.0 * d_av * d_ab))
        .clamp(-1.0, 1.0);
    let cos_bas = (r_bs.mul_add(-r_bs, d_ab.mul_add(d_ab, r_as * r_as)) / (2.0 * d_ab * r_as))
        .clamp(-1.0, 1.0);
    let angle = cos_bas.acos() - cos_vab.acos();
    (2.0 * r_as * d_av)
        .mul_add(-angle.cos(), r_as.mul_add(r_as, d_av * d_av))
        .max(0.0)
        .sqrt()
}

/// Whether a point lies inside the triangle `A`-`S`-`B` swept by the probe
/// (the "trough" between two touching extended spheres).
///
/// `d_xc` is the distance from the point to center `C`, `r_ac2` the squared
/// distance `A`-`C`, `r_bc` the distance `B`-`C`; the test compares the angle
/// at `C` spanned by `A` and the point with the angle spanned by `A` and `B`.
pub fn voxel_is_in_trough(d_xc: f64, r_ac2: f64, r_bc: f64, d_ab: f64, d_ax: f64) -> bool {
    let cos_acb = r_bc.mul_add(r_bc, r_ac2) - d_ab * d_ab;
    let cos_acx = d_xc.mul_add(d_xc, r_ac2) - d_ax * d_ax;
    cos_acb / r_bc < cos_acx / d_xc
}

/// Distance from `v` to the toroidal probe surface between atoms `a` and `b`,
/// or `None` when `v` is outside the trough of that pair.
///
/// `r_as` and `r_bs` are the extended radii (atom radius plus probe).
pub fn trough_distance(
    a: &Point3<f64>,
    r_as: f64,
    b: &Point3<f64>,
    r_bs: f64,
    d_ab: f64,
    v: &Point3<f64>,
) -> Option<f64> {
    let d_av = (v - a).norm();
    let d_bv = (v - b).norm();
    if d_av > 0.0 && r_as / d_av > 1.0 {
        let p = a + (v - a) * (r_as / d_av);
        if (b - p).norm() >= r_bs {
            return None;
        }
        let d_vs = solvent_distance(r_as, r_bs, d_ab, d_av, d_bv);
        voxel_is_in_trough(d_vs, r_as * r_as, r_bs, d_ab, d_av).then_some(d_vs)
    } else if d_bv > 0.0 && r_bs / d_bv > 1.0 {
        let p = b + (v - b) * (r_bs / d_bv);
        if (a - p).norm() >= r_as {
            return None;
        }
        let d_vs = solvent_distance(r_bs, r_as, d_ab, d_bv, d_av);
        voxel_is_in_trough(d_vs, r_bs * r_bs, r_as, d_ab, d_bv).then_some(d_vs)
    } else {
        None
    }
}

/// Fraction along an edge of length `edge_length` where a sphere of radius `r`
/// crosses it, given the distances from the sphere center to both ends.
///
/// Picks the root nearest the endpoint that is closer to the center's side.
/// May return NaN or a value outside `[0, 1]` when the sphere misses the edge.
pub fn spherical_interpolation_fraction(r: f64, dist_a: f64, dist_b: f64, edge_length: f64) -> f64 {
    let ra = dist_a / edge_length;
    let rb = dist_b / edge_length;
    let r = r / edge_length;
    let ra2 = ra * ra;
    let q = rb.mul_add(-rb, ra2) + 1.0;
    let p = 4.0 * r.mul_add(r, -ra2);
    let sign: f64 = if ra < rb { 1.0 } else { -1.0 };
    sign.mul_add(q.mul_add(q, p).sqrt(), q) / 2.0
}

/// Probe center positions touching three extended spheres.
///
/// Returns the two mirror-image solutions, or `None` when the three spheres
/// have no common point or the configuration is degenerate.
#[allow(clippy::similar_names)]
pub fn probe_positions(
    a: &Point3<f64>,
    r_as: f64,
    b: &Point3<f64>,
    r_bs: f64,
    c: &Point3<f64>,
    r_cs: f64,
) -> Option<(Point3<f64>, Point3<f64>)> {
    let v_ab = b - a;
    let d_ab = v_ab.norm();
    if eq(d_ab, 0.0) {
        return None;
    }
    let axis = v_ab / d_ab;
    let cos_bas = r_bs.mul_add(-r_bs, d_ab.mul_add(d_ab, r_as * r_as)) / (2.0 * d_ab * r_as);
    if !lt(cos_bas.abs(), 1.0) {
        return None;
    }
    // circle of probe centers touching a and b
    let p = a + axis * (cos_bas * r_as);
    let d_ps = cos_bas.mul_add(-cos_bas, 1.0).sqrt() * r_as;

    let d_ct = signed_distance_to_plane_unit(&p, &axis, c);
    if d_ct.abs() >= r_cs {
        return None;
    }
    let d_st = d_ct.mul_add(-d_ct, r_cs * r_cs).sqrt();
    let t = c - axis * d_ct;
    let d_pt = (t - p).norm();
    if eq(d_pt, 0.0) {
        return None;
    }
    let cos_theta = d_st.mul_add(-d_st, d_ps.mul_add(d_ps, d_pt * d_pt)) / (2.0 * d_ps * d_pt);
    if !lt(cos_theta.abs(), 1.0) {
        return None;
    }
    let v_xs = (t - p) / d_pt;
    let x = p + v_xs * (d_ps * cos_theta);
    let perp = axis.cross(&v_xs);
    let perp_norm = perp.norm();
    if !gt(perp_norm, 0.0) {
        return None;
    }
    let offset = perp * (cos_theta.mul_add(-cos_theta, 1.0).sqrt() * d_ps / perp_norm);
    Some((x + offset, x - offset))
}
