//! Inflow profile construction: EDI, RID, RI1 (§4.B).

use super::gaussian::{gaussian_delta, locate_kc_by_density, locate_kc_by_elevation, normalized_profile, richardson_eps};
use crate::density::{rho_water, GRAVITY};
use crate::domain::{Domain, InflowMode};
use crate::error::{Result, StratflowError};

pub struct InflowProfile {
    pub k_lo: usize,
    pub k_hi: usize,
    pub q: Vec<f64>,
}

const RHO_W: f64 = 999.855;

/// Dispatch on `mode` and return the per-layer flow profile for one inflow
/// schedule read (main inlet, tributary, water pipe, or point inflow all
/// share this machinery per §4.B's closing paragraph).
pub fn build_inflow_profile(
    dom: &Domain,
    i: usize,
    mode: InflowMode,
    q: f64,
    temp_c: f64,
    width: f64,
    froude: f64,
    z_in_low: f64,
    step: u64,
) -> Result<InflowProfile> {
    let mesh = &dom.mesh;
    let i = i.clamp(1, mesh.nx.max(1));
    let k_bot = mesh.kc_bot[i].max(1);
    let k_srf = mesh.k_srf.max(k_bot);
    let z_range = mesh.z[mesh.nz] - mesh.z[0];

    match mode {
        InflowMode::Ri1 => {
            let rho_src = rho_water(temp_c);
            let kc = locate_kc_by_density(&dom.density.rho_avg, k_bot, k_srf, rho_src).ok_or_else(|| {
                StratflowError::domain(dom.id, step, "RI1 inflow: no density bracket found for source temperature")
            })?;
            let dz_ratio = mesh.dz[k_srf] / mesh.dz0[k_srf].max(1e-12);
            if kc == k_srf && dz_ratio < 0.7 && k_srf > k_bot {
                Ok(InflowProfile {
                    k_lo: k_srf - 1,
                    k_hi: k_srf,
                    q: vec![0.5 * q, 0.5 * q],
                })
            } else {
                Ok(InflowProfile { k_lo: kc, k_hi: kc, q: vec![q] })
            }
        }
        InflowMode::Rid => {
            let z_mid = 0.5 * (mesh.z[0] + mesh.z[k_srf]);
            let kc = locate_kc_by_elevation(mesh, z_mid, k_bot, k_srf);
            let eps = richardson_eps(&dom.density.rho_avg, mesh, kc, RHO_W);
            let delta = gaussian_delta(q, froude, width, eps, GRAVITY, mesh.dz[kc], z_range);
            let profile = normalized_profile(mesh, k_bot, k_srf, z_mid, delta, q);
            Ok(InflowProfile { k_lo: k_bot, k_hi: k_srf, q: profile })
        }
        InflowMode::Edi => {
            let rho_src = rho_water(temp_c);
            let kc = locate_kc_by_density(&dom.density.rho_avg, k_bot, k_srf, rho_src).ok_or_else(|| {
                StratflowError::domain(dom.id, step, "EDI inflow: no density bracket found for source temperature")
            })?;
            let eps = richardson_eps(&dom.density.rho_avg, mesh, kc, RHO_W);
            let z_src = mesh.zc(kc);
            let delta = gaussian_delta(q, froude, width, eps, GRAVITY, mesh.dz[kc], z_range);
            let k_lo_floor = locate_kc_by_elevation(mesh, z_in_low, k_bot, k_srf).max(k_bot);
            let profile = normalized_profile(mesh, k_lo_floor, k_srf, z_src, delta, q);
            Ok(InflowProfile { k_lo: k_lo_floor, k_hi: k_srf, q: profile })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::density::DensityField;
    use crate::domain::{InletDescriptor, SourceDescriptor};
    use crate::mesh::Mesh;
    use crate::turbulence::TurbulenceConfig;

    fn test_domain() -> Domain {
        let nx = 4;
        let nz = 10;
        let x: Vec<f64> = (0..=nx).map(|i| i as f64 * 10.0).collect();
        let z: Vec<f64> = (0..=nz).map(|k| k as f64 * 2.0).collect();
        let b = vec![5.0; (nx + 1) * (nz + 1)];
        let z_bed = vec![0.0; nx + 1];
        let mut mesh = Mesh::build(x, z, b, z_bed).unwrap();
        mesh.update_surface_layer(19.0).unwrap();

        let inlet = InletDescriptor {
            base: SourceDescriptor {
                name: "inlet".into(),
                i: 0,
                froude: 1.0,
                width: 5.0,
                angle_deg: 0.0,
                z_target: None,
                series: None,
            },
            mode: InflowMode::Edi,
            z_in_low: 0.0,
        };
        let mut dom = Domain::new(1, "test", mesh, 1, 2650.0, inlet, TurbulenceConfig::default());
        dom.density = DensityField::new(nx, nz);
        for (k, rho) in dom.density.rho_avg.iter_mut().enumerate() {
            *rho = 995.0 + k as f64;
        }
        dom
    }

    #[test]
    fn ri1_places_all_flow_in_one_layer_away_from_surface() {
        let dom = test_domain();
        let profile = build_inflow_profile(&dom, 1, InflowMode::Ri1, 2.0, 14.0, 5.0, 1.0, 0.0, 0).unwrap();
        let total: f64 = profile.q.iter().sum();
        assert!((total - 2.0).abs() < 1e-10);
    }

    #[test]
    fn edi_profile_integrates_to_q() {
        let dom = test_domain();
        let profile = build_inflow_profile(&dom, 1, InflowMode::Edi, 3.0, 14.0, 5.0, 1.0, 0.0, 0).unwrap();
        let total: f64 = profile.q.iter().sum();
        assert!((total - 3.0).abs() < 1e-9);
    }

    #[test]
    fn rid_profile_spans_full_wet_column() {
        let dom = test_domain();
        let profile = build_inflow_profile(&dom, 1, InflowMode::Rid, 1.0, 14.0, 5.0, 1.0, 0.0, 0).unwrap();
        assert_eq!(profile.k_lo, dom.mesh.kc_bot[1].max(1));
        assert_eq!(profile.k_hi, dom.mesh.k_srf);
    }
}
