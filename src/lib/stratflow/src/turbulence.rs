//! Density-stratified turbulence closure: Richardson-number and k-eps modes
//! (§4.T).

use crate::density::{viscosity_water, GRAVITY};
use crate::domain::Domain;
use crate::error::Result;
use crate::tridiag::thomas_solve;
use serde::{Deserialize, Serialize};

pub const CMU: f64 = 0.09;
pub const C1_EPS: f64 = 1.44;
pub const C2_EPS: f64 = 1.92;
pub const SIGMA_K: f64 = 1.0;
pub const SIGMA_EPS: f64 = 1.3;
pub const VON_KARMAN: f64 = 0.41;
pub const Z0_BED: f64 = 1e-4;

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub enum TurbulenceMode {
    Richardson,
    KEpsilon,
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct TurbulenceConfig {
    pub mode: TurbulenceMode,
    /// Molecular-scale horizontal diffusivity multipliers [1/day], per GLOSSARY units.
    pub dmx0: f64,
    pub dhx0: f64,
    pub dcx0: f64,
    /// Vertical-closure amplitude terms.
    pub dmz0: f64,
    pub dhz0: f64,
    pub dcz0: f64,
    /// Richardson-number exponent scales.
    pub ll: f64,
    pub mm: f64,
    pub nn: f64,
    /// Mixing diffusivity applied when stratification is statically unstable.
    pub dmix: f64,
    /// k-eps: drop vertical diffusivities to zero at solid boundaries.
    pub freeslip: bool,
    /// k-eps: implicit (Thomas-solved) vs. explicit upwind evolution.
    pub semi_implicit: bool,
}

impl Default for TurbulenceConfig {
    fn default() -> Self {
        TurbulenceConfig {
            mode: TurbulenceMode::Richardson,
            dmx0: 1.0,
            dhx0: 1.0,
            dcx0: 1.0,
            dmz0: 1.4e-6,
            dhz0: 1.4e-7,
            dcz0: 1.4e-7,
            ll: 10.0,
            mm: 10.0,
            nn: 10.0,
            dmix: 1e-2,
            freeslip: false,
            semi_implicit: true,
        }
    }
}

/// Eddy coefficients plus, in k-eps mode, the transported `tke`/`eps` state.
/// `dmx/dhx/dcx` live on cell centers (`nx*nz`); `dmz/dhz/dcz` live on
/// w-faces (`nx*(nz+1)`).
#[derive(Clone, Debug)]
pub struct TurbulenceField {
    pub dmx: Vec<f64>,
    pub dhx: Vec<f64>,
    pub dcx: Vec<f64>,
    pub dmz: Vec<f64>,
    pub dhz: Vec<f64>,
    pub dcz: Vec<f64>,
    pub tke: Vec<f64>,
    pub eps: Vec<f64>,
    pub nut: Vec<f64>,
}

impl TurbulenceField {
    pub fn new(nx: usize, nz: usize) -> Self {
        TurbulenceField {
            dmx: vec![0.0; nx * nz],
            dhx: vec![0.0; nx * nz],
            dcx: vec![0.0; nx * nz],
            dmz: vec![1.4e-6; nx * (nz + 1)],
            dhz: vec![1.4e-7; nx * (nz + 1)],
            dcz: vec![1.4e-7; nx * (nz + 1)],
            tke: vec![1.25e-6; nx * (nz + 1)],
            eps: vec![1e-7; nx * (nz + 1)],
            nut: vec![1.4e-6; nx * (nz + 1)],
        }
    }

    #[inline]
    fn cell_idx(nx: usize, i: usize, k: usize) -> usize {
        (k - 1) * nx + (i - 1)
    }

    #[inline]
    fn face_idx(nx: usize, i: usize, k: usize) -> usize {
        k * nx + (i - 1)
    }

    pub fn dmx_at(&self, nx: usize, i: usize, k: usize) -> f64 {
        self.dmx[Self::cell_idx(nx, i, k)]
    }
    pub fn dhx_at(&self, nx: usize, i: usize, k: usize) -> f64 {
        self.dhx[Self::cell_idx(nx, i, k)]
    }
    pub fn dcx_at(&self, nx: usize, i: usize, k: usize) -> f64 {
        self.dcx[Self::cell_idx(nx, i, k)]
    }
    pub fn dmz_at(&self, nx: usize, i: usize, k: usize) -> f64 {
        self.dmz[Self::face_idx(nx, i, k)]
    }
    pub fn dhz_at(&self, nx: usize, i: usize, k: usize) -> f64 {
        self.dhz[Self::face_idx(nx, i, k)]
    }
    pub fn dcz_at(&self, nx: usize, i: usize, k: usize) -> f64 {
        self.dcz[Self::face_idx(nx, i, k)]
    }
    pub fn nut_at(&self, nx: usize, i: usize, k: usize) -> f64 {
        self.nut[Self::face_idx(nx, i, k)]
    }
}

/// Clamp the gradient Richardson number into `[0, 15]`, regularizing
/// `du/dz` with a small epsilon so a vanishing shear never divides by zero.
pub fn richardson_number(drho_dz: f64, rho: f64, du_dz: f64) -> f64 {
    let eps_shear = 1e-8;
    let shear2 = du_dz * du_dz + eps_shear;
    let ri = -GRAVITY * drho_dz / (rho * shear2);
    ri.clamp(0.0, 15.0)
}

/// Richardson-number closure (§4.T default mode). Horizontal coefficients
/// scale with `dx^2`; vertical coefficients decay exponentially with the
/// local Richardson number; unstable stratification forces full mixing on
/// the scalar faces.
pub fn update_richardson(dom: &mut Domain) -> Result<()> {
    let nx = dom.mesh.nx;
    let cfg = dom.turbulence_config;
    let molecular_nu = viscosity_water(20.0) * 1e-3;
    let molecular_alpha = molecular_nu * 0.7;

    for k in 1..=dom.mesh.k_srf {
        for i in 1..=nx {
            let dx2 = dom.mesh.dx[i] * dom.mesh.dx[i];
            let idx = TurbulenceField::cell_idx(nx, i, k);
            dom.turb.dmx[idx] = molecular_nu + (cfg.dmx0 / 86400.0) * dx2;
            dom.turb.dhx[idx] = molecular_alpha + (cfg.dhx0 / 86400.0) * dx2;
            dom.turb.dcx[idx] = molecular_nu + (cfg.dcx0 / 86400.0) * dx2;
        }
    }

    for k in 1..dom.mesh.k_srf {
        for i in 1..=nx {
            let u_here = 0.5 * (dom.u_at(i, k) + dom.u_at(i - 1, k));
            let u_above = 0.5 * (dom.u_at(i, k + 1) + dom.u_at(i - 1, k + 1));
            let dz = dom.mesh.dzs.get(k).copied().unwrap_or(dom.mesh.dz[k]);
            let du_dz = (u_above - u_here) / dz.max(1e-9);

            let rho_here = dom.density.rho_at(nx, i, k);
            let rho_above = dom.density.rho_at(nx, i, k + 1);
            let drho_dz = (rho_above - rho_here) / dz.max(1e-9);
            let ri = richardson_number(drho_dz, rho_here, du_dz);

            let fidx = TurbulenceField::face_idx(nx, i, k);
            let mut dmz = molecular_nu + cfg.dmz0 * (-cfg.ll * ri).exp();
            let mut dhz = molecular_alpha + cfg.dhz0 * (-cfg.mm * ri).exp();
            let mut dcz = molecular_nu + cfg.dcz0 * (-cfg.nn * ri).exp();

            if rho_above > rho_here {
                dhz = cfg.dmix;
                dcz = cfg.dmix;
            }
            dom.turb.dmz[fidx] = dmz.max(0.0);
            dom.turb.dhz[fidx] = dhz.max(0.0);
            dom.turb.dcz[fidx] = dcz.max(0.0);
            dmz = dom.turb.dmz[fidx];
        }
    }

    for i in 1..=nx {
        let k_bot = dom.mesh.kc_bot[i].max(1);
        let bot_face = TurbulenceField::face_idx(nx, i, k_bot);
        let bot_src = TurbulenceField::face_idx(nx, i, (k_bot + 1).min(dom.mesh.k_srf.max(k_bot + 1)));
        if bot_face != bot_src {
            dom.turb.dmz[bot_face] = dom.turb.dmz[bot_src];
            dom.turb.dhz[bot_face] = dom.turb.dhz[bot_src];
            dom.turb.dcz[bot_face] = dom.turb.dcz[bot_src];
        }
        let srf_face = TurbulenceField::face_idx(nx, i, dom.mesh.k_srf);
        let srf_src = TurbulenceField::face_idx(nx, i, (dom.mesh.k_srf.saturating_sub(1)).max(1));
        dom.turb.dmz[srf_face] = dom.turb.dmz[srf_src];
        dom.turb.dhz[srf_face] = dom.turb.dhz[srf_src];
        dom.turb.dcz[srf_face] = dom.turb.dcz[srf_src];
    }

    Ok(())
}

fn wind_drag_coefficient(wind_speed_m_s: f64) -> f64 {
    if wind_speed_m_s < 1.0 {
        1.1e-3
    } else if wind_speed_m_s <= 15.0 {
        (0.75 + 0.067 * wind_speed_m_s) * 1e-3
    } else {
        2.1e-3
    }
}

/// k-eps closure (§4.T second mode). Production from shear, buoyancy term
/// from the local density gradient, dissipation, with either an explicit
/// upwind step or a semi-implicit per-column tridiagonal vertical-diffusion
/// step (the only implicit solve the core allows).
pub fn update_k_epsilon(dom: &mut Domain, dt_days: f64, wind_speed_m_s: f64) -> Result<()> {
    update_richardson(dom)?;

    let nx = dom.mesh.nx;
    let cfg = dom.turbulence_config;
    let rho_w = 999.855;
    let dt_s = dt_days * 86400.0;

    for i in 1..=nx {
        let k_bot = dom.mesh.kc_bot[i].max(1);
        let k_srf = dom.mesh.k_srf;
        let n = k_srf - k_bot + 1;
        if n == 0 {
            continue;
        }

        let mut prod = vec![0.0; n];
        let mut buoy = vec![0.0; n];
        for (slot, k) in (k_bot..=k_srf).enumerate() {
            let kk = slot + k_bot;
            let _ = k;
            let dmz = dom.turb.dmz_at(nx, i, kk.min(k_srf.saturating_sub(1)).max(k_bot));
            let u_here = 0.5 * (dom.u_at(i, kk) + dom.u_at(i - 1, kk));
            let u_above = 0.5 * (dom.u_at(i, (kk + 1).min(k_srf)) + dom.u_at(i - 1, (kk + 1).min(k_srf)));
            let dz = dom.mesh.dzs.get(kk).copied().unwrap_or(dom.mesh.dz[kk]).max(1e-9);
            let du_dz = (u_above - u_here) / dz;
            prod[slot] = dmz * du_dz * du_dz;

            let rho_below = dom.density.rho_at(nx, i, kk.saturating_sub(1).max(k_bot));
            let rho_here = dom.density.rho_at(nx, i, kk);
            buoy[slot] = (dmz * GRAVITY * (rho_below - rho_here) / (rho_w * dz)).max(0.0);
        }

        // Bottom quadratic friction and surface wind shear are boundary
        // conditions on the production term, not ambient diffusivities: add
        // them to the bed and surface slots before the transport step.
        let bed_u = 0.5 * (dom.u_at(i, k_bot) + dom.u_at(i - 1, k_bot));
        let cd_bed = (VON_KARMAN / (dom.mesh.dz[k_bot] / Z0_BED).ln().max(1.0)).powi(2);
        let bottom_stress = cd_bed * bed_u * bed_u.abs();
        let dz_bot = dom.mesh.dzs.get(k_bot).copied().unwrap_or(dom.mesh.dz[k_bot]).max(1e-9);
        prod[0] += bottom_stress.abs() * bed_u.abs() / dz_bot;

        let wind_cd = wind_drag_coefficient(wind_speed_m_s);
        let rho_air = 1.225;
        let wind_stress = wind_cd * rho_air * wind_speed_m_s * wind_speed_m_s;
        let dz_srf = dom.mesh.dzs.get(k_srf).copied().unwrap_or(dom.mesh.dz[k_srf]).max(1e-9);
        prod[n - 1] += wind_stress * wind_speed_m_s / (rho_w * dz_srf);

        let mut tke_new = vec![0.0; n];
        let mut eps_new = vec![0.0; n];

        if cfg.semi_implicit {
            let mut a = vec![0.0; n];
            let mut b = vec![0.0; n];
            let mut c = vec![0.0; n];
            let mut d = vec![0.0; n];
            for slot in 0..n {
                let k = slot + k_bot;
                let fidx = TurbulenceField::face_idx(nx, i, k);
                let tke_old = dom.turb.tke[fidx];
                let eps_old = dom.turb.eps[fidx].max(1e-9);
                let dz = dom.mesh.dz[k.min(dom.mesh.nz)].max(1e-9);
                let diff = dom.turb.dmz_at(nx, i, k) / SIGMA_K / (dz * dz);

                b[slot] = 1.0 / dt_s + 2.0 * diff;
                a[slot] = -diff;
                c[slot] = -diff;
                d[slot] = tke_old / dt_s + prod[slot] + buoy[slot] - eps_old;
            }
            let r = thomas_solve(&a, &b, &c, &d);
            if r.stable {
                for slot in 0..n {
                    tke_new[slot] = r.solution[slot].clamp(1.25e-7, 10.0);
                }
            } else {
                for slot in 0..n {
                    tke_new[slot] = dom.turb.tke[TurbulenceField::face_idx(nx, i, slot + k_bot)];
                }
            }

            for slot in 0..n {
                let k = slot + k_bot;
                let fidx = TurbulenceField::face_idx(nx, i, k);
                let eps_old = dom.turb.eps[fidx].max(1e-9);
                let tke_safe = tke_new[slot].max(1e-9);
                let dz = dom.mesh.dz[k.min(dom.mesh.nz)].max(1e-9);
                let diff = dom.turb.dhz_at(nx, i, k) / SIGMA_EPS / (dz * dz);
                let denom = 1.0 / dt_s + 2.0 * diff + C2_EPS * eps_old / tke_safe;
                let rhs = eps_old / dt_s + (C1_EPS * eps_old / tke_safe) * (prod[slot] + buoy[slot]);
                eps_new[slot] = (rhs / denom.max(1e-12)).max(1e-9);
            }
        } else {
            for slot in 0..n {
                let k = slot + k_bot;
                let fidx = TurbulenceField::face_idx(nx, i, k);
                let tke_old = dom.turb.tke[fidx];
                let eps_old = dom.turb.eps[fidx].max(1e-9);
                tke_new[slot] = (tke_old + dt_s * (prod[slot] + buoy[slot] - eps_old)).clamp(1.25e-7, 10.0);
                eps_new[slot] = (eps_old
                    + dt_s * (eps_old / tke_old.max(1e-9)) * (C1_EPS * (prod[slot] + buoy[slot]) - C2_EPS * eps_old))
                    .max(1e-9);
            }
        }

        for slot in 0..n {
            let k = slot + k_bot;
            let fidx = TurbulenceField::face_idx(nx, i, k);
            dom.turb.tke[fidx] = tke_new[slot];
            dom.turb.eps[fidx] = eps_new[slot];
            let nut = (CMU * tke_new[slot] * tke_new[slot] / eps_new[slot].max(1e-9)).min(0.2);
            dom.turb.nut[fidx] = nut;
        }

        for slot in 0..n {
            let k = slot + k_bot;
            let fidx = TurbulenceField::face_idx(nx, i, k);
            let nut = dom.turb.nut[fidx];
            let mut dmz = (1.4e-6 + nut).clamp(1.4e-6, 0.2);
            let mut dhz = (0.14 * dmz).max(1.4e-7);
            let mut dcz = dhz;
            if cfg.freeslip && (k == k_bot || k == k_srf) {
                dmz = 0.0;
                dhz = 0.0;
                dcz = 0.0;
            }
            dom.turb.dmz[fidx] = dmz;
            dom.turb.dhz[fidx] = dhz;
            dom.turb.dcz[fidx] = dcz;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn richardson_number_clamps_to_band() {
        assert!(richardson_number(-1e6, 1000.0, 1e-8) <= 15.0);
        assert!(richardson_number(1e6, 1000.0, 1e-8) >= 0.0);
    }

    #[test]
    fn wind_drag_increases_with_wind_speed() {
        let lo = wind_drag_coefficient(0.5);
        let mid = wind_drag_coefficient(8.0);
        let hi = wind_drag_coefficient(20.0);
        assert!(lo <= mid);
        assert!(mid <= hi);
    }
}
