//! Equation of state, hydrostatic pressure column and column-averaged
//! density (§4.D).

use crate::mesh::Mesh;

pub const GRAVITY: f64 = 9.81;

/// Water equation of state, `rho(T) = a3*T^3 + a2*T^2 + a1*T + a0` (GLOSSARY).
pub fn rho_water(temp_c: f64) -> f64 {
    4e-5 * temp_c.powi(3) - 7.84e-3 * temp_c.powi(2) + 5.817e-2 * temp_c + 999.855
}

/// Dynamic viscosity [cP-equivalent, see GLOSSARY] as a function of
/// temperature.
pub fn viscosity_water(temp_c: f64) -> f64 {
    4.486e-7 * temp_c.powi(2) - 4.597e-5 * temp_c + 1.756e-3
}

/// Thermal conductivity as a function of temperature.
pub fn conductivity_water(temp_c: f64) -> f64 {
    4.1e-8 * temp_c.powi(4) - 5.2e-6 * temp_c.powi(3) + 2.1e-4 * temp_c.powi(2) - 1.77e-3 * temp_c
        + 0.5818
}

/// Turbid-water density correction: `rho' = rho + c/1000 * (1 - rho/rho_ss)`,
/// `c` the total suspended-solids concentration [g/m3] summed across classes.
pub fn rho_turbid(rho: f64, total_c_g_m3: f64, rho_ss: f64) -> f64 {
    if rho_ss <= 0.0 {
        return rho;
    }
    rho + total_c_g_m3 / 1000.0 * (1.0 - rho / rho_ss)
}

/// Per-cell density and pressure state, carried alongside the mesh's
/// primary fields. Dense, flat, column-major over `(i, k)` with
/// `i in 1..=nx`, `k in 1..=nz`.
#[derive(Clone, Debug)]
pub struct DensityField {
    pub rho: Vec<f64>,
    pub p: Vec<f64>,
    /// Column-averaged density at each w-face `k in 0..=nz`.
    pub rho_avg: Vec<f64>,
}

impl DensityField {
    pub fn new(nx: usize, nz: usize) -> Self {
        DensityField {
            rho: vec![999.855; nx * nz],
            p: vec![0.0; nx * nz],
            rho_avg: vec![999.855; nz + 1],
        }
    }

    #[inline]
    fn idx(nx: usize, i: usize, k: usize) -> usize {
        (k - 1) * nx + (i - 1)
    }

    pub fn rho_at(&self, nx: usize, i: usize, k: usize) -> f64 {
        self.rho[Self::idx(nx, i, k)]
    }

    pub fn p_at(&self, nx: usize, i: usize, k: usize) -> f64 {
        self.p[Self::idx(nx, i, k)]
    }

    /// Recompute `rho` (EOS + turbid correction) for every wet cell, then
    /// the hydrostatic pressure column (downward from `k_srf`), then the
    /// volume-weighted `rho_avg` at each w-face.
    pub fn update(
        &mut self,
        mesh: &Mesh,
        temp: &[f64],
        c_total_g_m3: &[f64],
        rho_ss: f64,
    ) {
        let (nx, nz) = (mesh.nx, mesh.nz);

        for i in 1..=nx {
            for k in mesh.kc_bot[i].max(1)..=mesh.k_srf.max(mesh.kc_bot[i]) {
                let t_idx = k * (nx + 2) + i;
                let temp_c = temp.get(t_idx).copied().unwrap_or(20.0);
                let c_idx = Self::idx(nx, i, k);
                let c_here = c_total_g_m3.get(c_idx).copied().unwrap_or(0.0);
                let rho_clean = rho_water(temp_c);
                self.rho[Self::idx(nx, i, k)] = rho_turbid(rho_clean, c_here, rho_ss);
            }
        }

        for i in 1..=nx {
            let k_top = mesh.k_srf;
            let p_top = self.rho_at(nx, i, k_top) * GRAVITY * (mesh.z_srf - mesh.zc(k_top));
            self.p[Self::idx(nx, i, k_top)] = p_top;
            let mut k = k_top;
            while k > mesh.kc_bot[i] {
                let rho_avg_face = 0.5 * (self.rho_at(nx, i, k) + self.rho_at(nx, i, k - 1));
                let dzs = mesh.dzs.get(k - 1).copied().unwrap_or(mesh.dz[k]);
                let p_below = self.p_at(nx, i, k) + rho_avg_face * GRAVITY * dzs;
                self.p[Self::idx(nx, i, k - 1)] = p_below;
                k -= 1;
            }
        }

        for k in 0..=nz {
            let mut vol_sum = 0.0;
            let mut rho_vol_sum = 0.0;
            for i in 1..=nx {
                if mesh.kc_bot[i] <= k.max(1) && k >= 1 {
                    let v = mesh.vol_at(i, k);
                    vol_sum += v;
                    rho_vol_sum += v * self.rho_at(nx, i, k);
                }
            }
            self.rho_avg[k] = if vol_sum > 0.0 {
                rho_vol_sum / vol_sum
            } else if k > 0 {
                self.rho_avg[k - 1]
            } else {
                999.855
            };
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rho_water_matches_eos_at_4c() {
        // Near the water density maximum the EOS should sit close to 1000.
        let rho = rho_water(4.0);
        assert!((rho - 999.972_f64.max(rho)).abs() < 1.0);
        assert!(rho > 999.0 && rho < 1000.5);
    }

    #[test]
    fn turbid_correction_increases_density_for_denser_solids() {
        let rho = rho_water(20.0);
        let corrected = rho_turbid(rho, 500.0, 2650.0);
        assert!(corrected > rho);
    }

    #[test]
    fn turbid_correction_is_noop_at_zero_concentration() {
        let rho = rho_water(20.0);
        assert!((rho_turbid(rho, 0.0, 2650.0) - rho).abs() < 1e-12);
    }
}
