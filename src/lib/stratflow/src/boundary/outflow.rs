//! Outflow profile construction: NDO, EDO, DDD (§4.B).

use super::gaussian::{gaussian_weight, locate_kc_by_elevation};
use crate::density::GRAVITY;
use crate::domain::{Domain, OutflowMode, OutletDescriptor};
use crate::error::Result;

/// Near-surface amplification applied by DDD when `z_out/z_srf > 0.9`.
pub const OUTCOEF: f64 = 2.0;

pub struct OutflowProfile {
    pub k_lo: usize,
    pub k_hi: usize,
    /// Negative: flow leaves the column.
    pub q: Vec<f64>,
}

pub fn build_outflow_profile(dom: &Domain, outlet: &OutletDescriptor, q: f64) -> Result<OutflowProfile> {
    let mesh = &dom.mesh;
    let i = outlet.base.i.clamp(1, mesh.nx.max(1));
    let k_bot = mesh.kc_bot[i].max(1);
    let k_srf = mesh.k_srf.max(k_bot);
    let z_out = outlet.base.z_target.unwrap_or_else(|| mesh.zc(((k_bot + k_srf) / 2).max(1)));
    let q_abs = q.abs();

    match outlet.mode {
        OutflowMode::Ndo => {
            let kc = locate_kc_by_elevation(mesh, z_out, k_bot, k_srf);
            let eps = super::gaussian::richardson_eps(&dom.density.rho_avg, mesh, kc, 999.855);
            // Axisymmetric scaling: the jet thickness grows with the cube
            // root of the wetted volume below the surface rather than with
            // the inflow-style linear width `b`.
            let vol_scale = mesh.vol_hgt[k_srf].max(1.0).cbrt();
            let fr = outlet.base.froude.max(1e-6);
            let raw = (q_abs / (fr * vol_scale * (eps * GRAVITY).sqrt())).sqrt();
            let z_range = mesh.z[mesh.nz] - mesh.z[0];
            let delta = raw.clamp(2.0 * mesh.dz[kc].max(1e-9), z_range.max(1e-9));
            let mut weights = vec![0.0; k_srf - k_bot + 1];
            let mut sum = 0.0;
            for (slot, k) in (k_bot..=k_srf).enumerate() {
                let w = gaussian_weight(mesh.zc(k), z_out, delta);
                weights[slot] = w;
                sum += w;
            }
            let out = if sum > 0.0 {
                weights.iter().map(|w| -w / sum * q_abs).collect()
            } else {
                weights
            };
            Ok(OutflowProfile { k_lo: k_bot, k_hi: k_srf, q: out })
        }
        OutflowMode::Edo => {
            let gate = outlet.gate_height.unwrap_or(2.0 * mesh.dz[k_bot]).max(mesh.dz[k_bot].max(1e-9));
            let z_lo = (z_out - 0.5 * gate).max(mesh.z[0]);
            let z_hi = (z_out + 0.5 * gate).min(mesh.z[mesh.nz]);
            let k_lo = locate_kc_by_elevation(mesh, z_lo, k_bot, k_srf);
            let k_hi = locate_kc_by_elevation(mesh, z_hi, k_bot, k_srf).max(k_lo);
            let n = k_hi - k_lo + 1;
            let share = q_abs / n as f64;
            Ok(OutflowProfile { k_lo, k_hi, q: vec![-share; n] })
        }
        OutflowMode::Ddd => {
            let kc = locate_kc_by_elevation(mesh, z_out, k_bot, k_srf);
            let rho_f = dom.density.rho_avg[kc].max(1.0);
            let hsw = (OUTCOEF * q_abs / rho_f).max(0.0).cbrt();
            let mut k_top = locate_kc_by_elevation(mesh, z_out + 0.5 * hsw, k_bot, k_srf);
            let mut k_jet_bot = locate_kc_by_elevation(mesh, (z_out - 0.5 * hsw).max(mesh.z[0]), k_bot, k_srf);
            if let Some(z_top) = outlet.z_kt_sw {
                k_top = locate_kc_by_elevation(mesh, z_top, k_bot, k_srf);
            }
            if let Some(z_bot) = outlet.z_kb_sw {
                k_jet_bot = locate_kc_by_elevation(mesh, z_bot, k_bot, k_srf);
            }
            if k_jet_bot > k_top {
                std::mem::swap(&mut k_jet_bot, &mut k_top);
            }
            let amp = if z_out / mesh.z_srf.max(1e-9) > 0.9 { OUTCOEF } else { 1.0 };
            let rho_avg_kc = dom.density.rho_avg[kc];
            let drho_max = (dom.density.rho_avg[k_srf] - dom.density.rho_avg[k_bot]).abs().max(1e-6);
            let mut weights = vec![0.0; k_top - k_jet_bot + 1];
            let mut sum = 0.0;
            for (slot, k) in (k_jet_bot..=k_top).enumerate() {
                let shape = (1.0 - ((rho_avg_kc - dom.density.rho_avg[k]) / drho_max).powi(2)).clamp(0.0, 1.0);
                let w = shape * amp * mesh.au_at(i, k);
                weights[slot] = w;
                sum += w;
            }
            let out = if sum > 0.0 {
                weights.iter().map(|w| -w / sum * q_abs).collect()
            } else {
                weights
            };
            Ok(OutflowProfile { k_lo: k_jet_bot, k_hi: k_top, q: out })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{InletDescriptor, InflowMode, SourceDescriptor};
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
        for (k, rho) in dom.density.rho_avg.iter_mut().enumerate() {
            *rho = 995.0 + k as f64;
        }
        dom
    }

    fn outlet(mode: OutflowMode) -> OutletDescriptor {
        OutletDescriptor {
            base: SourceDescriptor {
                name: "out".into(),
                i: 4,
                froude: 1.0,
                width: 5.0,
                angle_deg: 0.0,
                z_target: Some(10.0),
                series: None,
            },
            mode,
            z_kt_sw: None,
            z_kb_sw: None,
            gate_height: Some(4.0),
        }
    }

    #[test]
    fn ndo_profile_integrates_to_minus_q() {
        let dom = test_domain();
        let profile = build_outflow_profile(&dom, &outlet(OutflowMode::Ndo), 2.0).unwrap();
        let total: f64 = profile.q.iter().sum();
        assert!((total + 2.0).abs() < 1e-9);
    }

    #[test]
    fn edo_profile_is_uniform_over_the_gate() {
        let dom = test_domain();
        let profile = build_outflow_profile(&dom, &outlet(OutflowMode::Edo), 4.0).unwrap();
        let first = profile.q[0];
        assert!(profile.q.iter().all(|v| (v - first).abs() < 1e-12));
    }

    #[test]
    fn ddd_profile_integrates_to_minus_q() {
        let dom = test_domain();
        let profile = build_outflow_profile(&dom, &outlet(OutflowMode::Ddd), 3.0).unwrap();
        let total: f64 = profile.q.iter().sum();
        assert!((total + 3.0).abs() < 1e-9);
    }
}
