//! Gaussian density-selected source profile machinery shared by inflow and
//! outflow builders (§4.B).

use crate::mesh::Mesh;

/// Gaussian shape constant: the width at `zeta = 1/2` sits at the profile's
/// half-power point.
pub const GAUSSIAN_CONST: f64 = 3.92;

/// `eps = max(-(rho_avg(kc) - rho_avg(kc-1))/(z(kc) - z(kc-1))/rho_w, 1e-6)`.
pub fn richardson_eps(rho_avg: &[f64], mesh: &Mesh, kc: usize, rho_w: f64) -> f64 {
    if kc == 0 || kc >= rho_avg.len() {
        return 1e-6;
    }
    let dz = mesh.z[kc] - mesh.z[kc - 1];
    if dz.abs() < 1e-12 {
        return 1e-6;
    }
    (-(rho_avg[kc] - rho_avg[kc - 1]) / dz / rho_w).max(1e-6)
}

/// `delta = clamp(sqrt(|Q|/(Fr*b*sqrt(eps*g))), 2*dz(kc), z(nz)-z(0))`.
pub fn gaussian_delta(q: f64, fr: f64, b: f64, eps: f64, g: f64, dz_kc: f64, z_range: f64) -> f64 {
    let raw = (q.abs() / (fr.max(1e-9) * b.max(1e-9) * (eps * g).sqrt())).sqrt();
    raw.clamp(2.0 * dz_kc.max(1e-9), z_range.max(2.0 * dz_kc.max(1e-9)))
}

/// Raw (unnormalized) weight at cell-center elevation `zc_k`, zero outside
/// `zeta = (zc_k - z_src)/delta in [-0.5, 0.5]`.
pub fn gaussian_weight(zc_k: f64, z_src: f64, delta: f64) -> f64 {
    if delta.abs() < 1e-12 {
        return 0.0;
    }
    let zeta = (zc_k - z_src) / delta;
    if zeta < -0.5 || zeta > 0.5 {
        return 0.0;
    }
    (-0.5 * (zeta * GAUSSIAN_CONST).powi(2)).exp()
}

/// Build the per-layer flow distribution over `k_lo..=k_hi` that integrates
/// exactly to `q` by normalizing the raw Gaussian weights. Returns all zeros
/// if every weight in range underflows (source entirely outside the band).
pub fn normalized_profile(mesh: &Mesh, k_lo: usize, k_hi: usize, z_src: f64, delta: f64, q: f64) -> Vec<f64> {
    if k_hi < k_lo {
        return Vec::new();
    }
    let mut raw = vec![0.0; k_hi - k_lo + 1];
    let mut sum = 0.0;
    for (slot, k) in (k_lo..=k_hi).enumerate() {
        let w = gaussian_weight(mesh.zc(k), z_src, delta);
        raw[slot] = w;
        sum += w;
    }
    if sum <= 0.0 {
        return raw;
    }
    for w in raw.iter_mut() {
        *w = *w / sum * q;
    }
    raw
}

/// Locate the layer bracketing `rho_src` in the column-averaged density
/// profile between `k_bot` and `k_srf` inclusive, scanning from the bed up.
pub fn locate_kc_by_density(rho_avg: &[f64], k_bot: usize, k_srf: usize, rho_src: f64) -> Option<usize> {
    let k_bot = k_bot.max(1);
    if k_srf <= k_bot {
        return Some(k_srf.max(k_bot));
    }
    for k in (k_bot + 1)..=k_srf {
        let lo = rho_avg[k - 1].min(rho_avg[k]);
        let hi = rho_avg[k - 1].max(rho_avg[k]);
        if rho_src >= lo && rho_src <= hi {
            return Some(k);
        }
    }
    None
}

/// Locate the layer containing elevation `z_target`, clamped to `[k_bot, k_srf]`.
pub fn locate_kc_by_elevation(mesh: &Mesh, z_target: f64, k_bot: usize, k_srf: usize) -> usize {
    let k_bot = k_bot.max(1);
    let k_srf = k_srf.max(k_bot);
    let mut k = k_bot;
    while k < k_srf && mesh.z[k] < z_target {
        k += 1;
    }
    k.clamp(k_bot, k_srf)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn flat_mesh() -> Mesh {
        let nx = 4;
        let nz = 10;
        let x: Vec<f64> = (0..=nx).map(|i| i as f64 * 10.0).collect();
        let z: Vec<f64> = (0..=nz).map(|k| k as f64 * 2.0).collect();
        let b = vec![5.0; (nx + 1) * (nz + 1)];
        let z_bed = vec![0.0; nx + 1];
        Mesh::build(x, z, b, z_bed).unwrap()
    }

    #[test]
    fn gaussian_profile_integrates_to_q() {
        let mesh = flat_mesh();
        let q = 3.5;
        let profile = normalized_profile(&mesh, 1, mesh.nz, 10.0, 4.0, q);
        let sum: f64 = profile.iter().sum();
        assert!((sum - q).abs() < 1e-10);
    }

    #[test]
    fn weight_vanishes_outside_half_width() {
        assert_eq!(gaussian_weight(0.0, 0.0, 1.0).max(0.0), 1.0);
        assert_eq!(gaussian_weight(10.0, 0.0, 1.0), 0.0);
    }

    #[test]
    fn density_bracket_found_for_monotone_column() {
        let rho_avg = vec![995.0, 996.0, 997.0, 998.0, 999.0, 1000.0, 1001.0];
        let kc = locate_kc_by_density(&rho_avg, 1, 6, 997.5);
        assert_eq!(kc, Some(3));
    }
}
