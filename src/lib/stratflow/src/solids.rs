//! Suspended-solids integrator (§4.S): per particle class, identical to the
//! heat integrator except the vertical advective velocity is offset by the
//! Stokes settling velocity, the bed face accumulates deposition into
//! `c_sed`, and source couplings apply only for inflows (`q_src > 0`).

use crate::boundary::BoundarySources;
use crate::density::{viscosity_water, GRAVITY};
use crate::domain::Domain;
use crate::error::{Result, StratflowError};
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct ParticleClass {
    pub diameter_m: f64,
    pub rho_ss: f64,
    pub alpha_ss: f64,
}

/// Stokes settling velocity `w_ss = g*(rho_ss - rho_w)*d^2/(18*mu_w)`.
pub fn settling_velocity(class: &ParticleClass, temp_c: f64, rho_w: f64) -> f64 {
    let mu = viscosity_water(temp_c);
    GRAVITY * (class.rho_ss - rho_w) * class.diameter_m * class.diameter_m / (18.0 * mu.max(1e-9))
}

/// Particle Reynolds number `Rep = w_ss*d*rho_w/mu_w`; the Stokes regime
/// this settling law assumes requires `Rep < 1.5`.
pub fn particle_reynolds(w_ss: f64, class: &ParticleClass, temp_c: f64, rho_w: f64) -> f64 {
    let mu = viscosity_water(temp_c);
    (w_ss.abs() * class.diameter_m * rho_w / mu.max(1e-9)).abs()
}

/// Validate every configured particle class at startup (§4.S: fatal if the
/// Stokes assumption is violated).
pub fn validate_particle_classes(classes: &[ParticleClass], temp_c: f64, rho_w: f64) -> Result<()> {
    for (l, class) in classes.iter().enumerate() {
        let w_ss = settling_velocity(class, temp_c, rho_w);
        let rep = particle_reynolds(w_ss, class, temp_c, rho_w);
        if rep >= 1.5 {
            return Err(StratflowError::config(format!(
                "particle class {l}: Rep={rep:.3} exceeds the Stokes-regime bound of 1.5"
            )));
        }
    }
    Ok(())
}

fn fence_blocks_x(dom: &Domain, i_face: usize, k: usize) -> bool {
    dom.fences.iter().any(|f| f.i_fnc == i_face && k >= f.k_low && k <= f.k_high)
}

/// Advance class `l` (1-indexed) one step, accumulating settled mass at the
/// bed into `dom.c_sed`.
pub fn step_solids(
    dom: &mut Domain,
    sources: &BoundarySources,
    dt_days: f64,
    l: usize,
    class: &ParticleClass,
    rho_w: f64,
) -> Result<()> {
    let nx = dom.mesh.nx;
    let k_srf = dom.mesh.k_srf;
    let dt_s = dt_days * 86400.0;
    let mut c_new = dom.c.clone();

    for i in 1..=nx {
        let k_bot = dom.mesh.kc_bot[i].max(1);
        let w_ss = settling_velocity(class, dom.t_at(i, k_bot), rho_w);
        let mut deposited = 0.0;

        for k in k_bot..=k_srf {
            let vol = dom.mesh.vol_at(i, k).max(1e-12);
            let c_c = dom.c_at(i, k, l);
            let c_w = dom.c_at(i - 1, k, l);
            let c_e = dom.c_at(i + 1, k, l);
            let c_above = dom.c_at(i, (k + 1).min(dom.mesh.nz + 1), l);
            let c_below = dom.c_at(i, k.saturating_sub(1), l);

            let u_e = dom.u_at(i, k);
            let u_w = dom.u_at(i - 1, k);
            let au_e = dom.mesh.au_at(i, k);
            let au_w = dom.mesh.au_at(i - 1, k);
            let blocked_e = fence_blocks_x(dom, i, k);
            let blocked_w = fence_blocks_x(dom, i - 1, k);
            let flux_e = if blocked_e { 0.0 } else { au_e * u_e * (if u_e >= 0.0 { c_c } else { c_e }) };
            let flux_w = if blocked_w { 0.0 } else { au_w * u_w * (if u_w >= 0.0 { c_w } else { c_c }) };
            let adv_x = -(flux_e - flux_w);

            // Vertical advective velocity is offset by settling: particles
            // fall through the water column in addition to being carried.
            let w_top = dom.w_at(i, k) - w_ss;
            let w_bot = dom.w_at(i, k.saturating_sub(1)) - w_ss;
            let aw_top = dom.mesh.aw_at(i, k);
            let aw_bot = dom.mesh.aw_at(i, k.saturating_sub(1));
            let flux_top = aw_top * w_top * (if w_top >= 0.0 { c_c } else { c_above });
            let flux_bot = if k == k_bot {
                // Settling flux through the bed face deposits rather than
                // entering a dry cell below: the bed has no cell there, so
                // this face only ever carries settling outflow downward.
                let settling_flux = aw_bot * w_bot * c_c;
                deposited += (-settling_flux).max(0.0);
                settling_flux
            } else {
                aw_bot * w_bot * (if w_bot >= 0.0 { c_below } else { c_c })
            };
            let adv_z = -(flux_top - flux_bot);

            let nxm = nx;
            let dcx_e = if blocked_e { 0.0 } else { class.alpha_ss * dom.turb.dcx_at(nxm, i, k) };
            let dcx_w = if blocked_w { 0.0 } else { class.alpha_ss * dom.turb.dcx_at(nxm, i.saturating_sub(1).max(1), k) };
            let dxs_e = dom.mesh.dxs.get(i).copied().unwrap_or(dom.mesh.dx[i]).max(1e-9);
            let dxs_w = dom.mesh.dxs.get(i.saturating_sub(1)).copied().unwrap_or(dom.mesh.dx[i]).max(1e-9);
            let diff_x = dcx_e * au_e * (c_e - c_c) / dxs_e - dcx_w * au_w * (c_c - c_w) / dxs_w;

            let dcz_top = class.alpha_ss * dom.turb.dcz_at(nxm, i, k);
            let dcz_bot = class.alpha_ss * dom.turb.dcz_at(nxm, i, k.saturating_sub(1));
            let dz_top = dom.mesh.dzs.get(k).copied().unwrap_or(dom.mesh.dz[k]).max(1e-9);
            let dz_bot = dom.mesh.dzs.get(k.saturating_sub(1)).copied().unwrap_or(dom.mesh.dz[k]).max(1e-9);
            let diff_z = dcz_top * aw_top * (c_above - c_c) / dz_top - dcz_bot * aw_bot * (c_c - c_below) / dz_bot;

            let mut rhs = adv_x + adv_z + diff_x + diff_z;

            for src in sources
                .inlet
                .iter()
                .chain(sources.tributaries.iter())
                .chain(sources.water_pipes.iter())
                .chain(sources.point_inflows.iter())
            {
                if src.i == i {
                    let q = src.q_at(k);
                    if q > 0.0 {
                        let c_src = src.conc.get(l - 1).copied().unwrap_or(0.0);
                        rhs += (c_src - c_c) * q;
                    }
                }
            }

            let idx = dom.c_idx(i, k, l);
            c_new[idx] = (c_c + dt_s * rhs / vol).max(0.0);
        }

        let sed_idx = (l - 1) * (nx + 1) + i;
        if sed_idx < dom.c_sed.len() {
            dom.c_sed[sed_idx] += dt_s * deposited;
        }
        let ghost_idx = dom.c_idx(i, k_srf + 1, l);
        let srf_idx = dom.c_idx(i, k_srf, l);
        c_new[ghost_idx] = c_new[srf_idx];
    }

    dom.c = c_new;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn settling_velocity_is_positive_for_denser_particles() {
        let class = ParticleClass { diameter_m: 20e-6, rho_ss: 2650.0, alpha_ss: 1.0 };
        assert!(settling_velocity(&class, 20.0, 999.855) > 0.0);
    }

    #[test]
    fn rejects_particle_class_outside_stokes_regime() {
        let class = ParticleClass { diameter_m: 2e-3, rho_ss: 2650.0, alpha_ss: 1.0 };
        assert!(validate_particle_classes(&[class], 20.0, 999.855).is_err());
    }

    #[test]
    fn accepts_fine_silt_class() {
        let class = ParticleClass { diameter_m: 10e-6, rho_ss: 2650.0, alpha_ss: 1.0 };
        assert!(validate_particle_classes(&[class], 20.0, 999.855).is_ok());
    }
}
