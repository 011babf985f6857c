//! Heat integrator (§4.H): upwind advection, centred diffusion, surface and
//! penetrating radiative flux, fence blocking, source couplings and a
//! divergence correction for the non-conservative upwind form.

use crate::boundary::BoundarySources;
use crate::domain::Domain;
use crate::error::Result;
use crate::timeseries::TimeSeries;
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct HeatOptions {
    pub radiation: bool,
    /// Surface albedo/absorption fraction in the net short-wave term.
    pub ar: f64,
    /// Short-wave extinction coefficient [1/m] for the penetrating term.
    pub beta: f64,
    /// Fraction of net short-wave that penetrates past the surface cell.
    pub eta: f64,
    pub z_wind: f64,
    pub alpha_heat: f64,
}

impl Default for HeatOptions {
    fn default() -> Self {
        HeatOptions {
            radiation: true,
            ar: 0.93,
            beta: 0.5,
            eta: 0.4,
            z_wind: 10.0,
            alpha_heat: 1.0,
        }
    }
}

#[derive(Clone, Copy, Debug)]
pub struct Meteo {
    pub air_temp_c: f64,
    pub wind_speed_m_s: f64,
    pub solar_w_m2: f64,
    pub rel_humidity: f64,
}

/// Meteorology schedule files follow the same `t v1..vN` convention as
/// boundary schedules (§6), with columns in the fixed order
/// `air_temp_c, wind_speed_m_s, solar_w_m2, rel_humidity`.
pub fn meteo_from_series(series: &TimeSeries, t_days: f64) -> Meteo {
    let v = series.value(t_days);
    Meteo {
        air_temp_c: v.first().copied().unwrap_or(20.0),
        wind_speed_m_s: v.get(1).copied().unwrap_or(0.0),
        solar_w_m2: v.get(2).copied().unwrap_or(0.0),
        rel_humidity: v.get(3).copied().unwrap_or(0.5),
    }
}

/// Saturation vapour pressure (Murray 1966), `6.1078*exp(17.2693882*T/(T+237.3))`
/// mbar converted to mmHg via `x0.75006` (GLOSSARY).
pub fn saturation_vapor_pressure_mmhg(temp_c: f64) -> f64 {
    6.1078 * (17.2693882 * temp_c / (temp_c + 237.3)).exp() * 0.75006
}

const STEFAN_BOLTZMANN: f64 = 5.670e-8;

/// Net surface heat flux [W/m2]: Rohwer-style evaporation/conduction,
/// Swinbank atmospheric long-wave exchange, and net short-wave.
pub fn surface_heat_flux(t_srf_c: f64, meteo: &Meteo, opts: &HeatOptions) -> f64 {
    let es_w = saturation_vapor_pressure_mmhg(t_srf_c);
    let es_a = saturation_vapor_pressure_mmhg(meteo.air_temp_c) * meteo.rel_humidity.clamp(0.0, 1.0);
    let wind_fn = 0.0625 * (1.0 + 0.1 * meteo.wind_speed_m_s.max(0.0));
    let evap_mm_day = wind_fn * (es_w - es_a).max(0.0);
    let latent = evap_mm_day * 28.4;
    let bowen = 0.61 * (t_srf_c - meteo.air_temp_c) / (es_w - es_a).abs().max(1e-6);
    let conduction = latent * bowen;

    let t_air_k = meteo.air_temp_c + 273.15;
    let t_w_k = t_srf_c + 273.15;
    let atm_emission = 5.31e-13 * t_air_k.powi(6);
    let water_emission = 0.97 * STEFAN_BOLTZMANN * t_w_k.powi(4);
    let net_longwave = atm_emission - water_emission;

    let net_shortwave = (1.0 - opts.ar) * meteo.solar_w_m2;
    net_shortwave + net_longwave - latent - conduction
}

/// Short-wave flux still present at `depth` below the surface, Beer-Lambert
/// attenuated from the net-shortwave term.
pub fn radiation_heat_flux(depth: f64, meteo: &Meteo, opts: &HeatOptions) -> f64 {
    if !opts.radiation {
        return 0.0;
    }
    let net_shortwave = (1.0 - opts.ar) * meteo.solar_w_m2;
    opts.eta * net_shortwave * (-opts.beta * depth.max(0.0)).exp()
}

fn fence_blocks_x(dom: &Domain, i_face: usize, k: usize) -> bool {
    dom.fences
        .iter()
        .any(|f| f.i_fnc == i_face && k >= f.k_low && k <= f.k_high)
}

pub fn step_heat(
    dom: &mut Domain,
    sources: &BoundarySources,
    dt_days: f64,
    opts: &HeatOptions,
    meteo: &Meteo,
) -> Result<()> {
    let nx = dom.mesh.nx;
    let k_srf = dom.mesh.k_srf;
    let dt_s = dt_days * 86400.0;
    let mut t_new = dom.t.clone();

    for i in 1..=nx {
        let k_bot = dom.mesh.kc_bot[i].max(1);
        for k in k_bot..=k_srf {
            let vol = dom.mesh.vol_at(i, k).max(1e-12);
            let t_c = dom.t_at(i, k);
            let t_w = dom.t_at(i - 1, k);
            let t_e = dom.t_at(i + 1, k);
            let t_above = dom.t_at(i, (k + 1).min(dom.mesh.nz + 1));
            let t_below = dom.t_at(i, k.saturating_sub(1));

            let u_e = dom.u_at(i, k);
            let u_w = dom.u_at(i - 1, k);
            let au_e = dom.mesh.au_at(i, k);
            let au_w = dom.mesh.au_at(i - 1, k);
            let blocked_e = fence_blocks_x(dom, i, k);
            let blocked_w = fence_blocks_x(dom, i - 1, k);
            let flux_e = if blocked_e { 0.0 } else { au_e * u_e * (if u_e >= 0.0 { t_c } else { t_e }) };
            let flux_w = if blocked_w { 0.0 } else { au_w * u_w * (if u_w >= 0.0 { t_w } else { t_c }) };
            let adv_x = -(flux_e - flux_w);

            let w_top = dom.w_at(i, k);
            let w_bot = dom.w_at(i, k.saturating_sub(1));
            let aw_top = dom.mesh.aw_at(i, k);
            let aw_bot = dom.mesh.aw_at(i, k.saturating_sub(1));
            let flux_top = aw_top * w_top * (if w_top >= 0.0 { t_c } else { t_above });
            let flux_bot = aw_bot * w_bot * (if w_bot >= 0.0 { t_below } else { t_c });
            let adv_z = -(flux_top - flux_bot);

            let nxm = nx;
            let dhx_e = if blocked_e { 0.0 } else { opts.alpha_heat * dom.turb.dhx_at(nxm, i, k) };
            let dhx_w = if blocked_w { 0.0 } else { opts.alpha_heat * dom.turb.dhx_at(nxm, i.saturating_sub(1).max(1), k) };
            let dxs_e = dom.mesh.dxs.get(i).copied().unwrap_or(dom.mesh.dx[i]).max(1e-9);
            let dxs_w = dom.mesh.dxs.get(i.saturating_sub(1)).copied().unwrap_or(dom.mesh.dx[i]).max(1e-9);
            let diff_x = dhx_e * au_e * (t_e - t_c) / dxs_e - dhx_w * au_w * (t_c - t_w) / dxs_w;

            let dhz_top = opts.alpha_heat * dom.turb.dhz_at(nxm, i, k);
            let dhz_bot = opts.alpha_heat * dom.turb.dhz_at(nxm, i, k.saturating_sub(1));
            let dz_top = dom.mesh.dzs.get(k).copied().unwrap_or(dom.mesh.dz[k]).max(1e-9);
            let dz_bot = dom.mesh.dzs.get(k.saturating_sub(1)).copied().unwrap_or(dom.mesh.dz[k]).max(1e-9);
            let diff_z = dhz_top * aw_top * (t_above - t_c) / dz_top - dhz_bot * aw_bot * (t_c - t_below) / dz_bot;

            let mut rhs = adv_x + adv_z + diff_x + diff_z;

            // Volumetric heat capacity of water, converting a W/m2 surface
            // flux into the m3*K/s units the rest of the RHS is carried in.
            const RHO_CP: f64 = 4.186e6;
            if k == k_srf {
                rhs += surface_heat_flux(t_c, meteo, opts) * aw_top / RHO_CP;
            } else if opts.radiation {
                let depth_top = (dom.mesh.z_srf - dom.mesh.z[k]).max(0.0);
                let depth_bot = (dom.mesh.z_srf - dom.mesh.z[k - 1]).max(0.0);
                let absorbed = radiation_heat_flux(depth_top, meteo, opts) - radiation_heat_flux(depth_bot, meteo, opts);
                rhs += absorbed.abs() * aw_top / RHO_CP;
            }

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
                        rhs += (src.temp - t_c) * q;
                    }
                }
            }

            let div = (au_e * u_e - au_w * u_w) + (aw_top * w_top - aw_bot * w_bot);
            rhs += div * t_c;

            let idx = dom.t_idx(i, k);
            t_new[idx] = t_c + dt_s * rhs / vol;
        }
        let ghost_idx = dom.t_idx(i, k_srf + 1);
        let srf_idx = dom.t_idx(i, k_srf);
        t_new[ghost_idx] = t_new[srf_idx];
    }

    dom.t = t_new;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn saturation_vapor_pressure_increases_with_temperature() {
        assert!(saturation_vapor_pressure_mmhg(25.0) > saturation_vapor_pressure_mmhg(5.0));
    }

    #[test]
    fn radiation_attenuates_with_depth() {
        let meteo = Meteo { air_temp_c: 20.0, wind_speed_m_s: 2.0, solar_w_m2: 600.0, rel_humidity: 0.6 };
        let opts = HeatOptions::default();
        assert!(radiation_heat_flux(0.0, &meteo, &opts) > radiation_heat_flux(5.0, &meteo, &opts));
    }

    #[test]
    fn meteo_from_series_reads_columns_in_fixed_order() {
        let series = TimeSeries::new(
            vec![0.0, 1.0],
            vec![vec![15.0, 25.0], vec![1.0, 3.0], vec![400.0, 800.0], vec![0.4, 0.8]],
        )
        .unwrap();
        let m = meteo_from_series(&series, 1.0);
        assert_eq!(m.air_temp_c, 25.0);
        assert_eq!(m.wind_speed_m_s, 3.0);
        assert_eq!(m.solar_w_m2, 800.0);
        assert_eq!(m.rel_humidity, 0.8);
    }
}
