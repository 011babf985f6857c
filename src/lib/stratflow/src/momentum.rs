//! Momentum integrator (§4.M): first-order upwind advection, face
//! diffusion, an optional pressure-gradient and bed-slope gravity term,
//! source couplings from tributary/pipe/point inflows, column rescaling to
//! the coupler's `q_col` target, and continuity-based reconstruction of `w`.

use crate::boundary::BoundarySources;
use crate::density::GRAVITY;
use crate::domain::Domain;
use crate::error::Result;
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct MomentumOptions {
    pub pressure_grad: bool,
    pub smooth_pgx: bool,
    pub gravity_slope: bool,
    pub threshold_pgx: f64,
    pub beta_pgx: f64,
    pub init_slope: f64,
}

impl Default for MomentumOptions {
    fn default() -> Self {
        MomentumOptions {
            pressure_grad: true,
            smooth_pgx: true,
            gravity_slope: false,
            threshold_pgx: 1e4,
            beta_pgx: 0.9,
            init_slope: 0.0,
        }
    }
}

const RHO_W: f64 = 999.855;

fn u_col(dom: &Domain, i: usize, k: usize) -> f64 {
    if i > dom.mesh.nx {
        dom.u_at(dom.mesh.nx, k)
    } else {
        dom.u_at(i, k)
    }
}

/// Volume of the u-control-volume straddling faces `i` and `i+1`,
/// approximated as the average of the two adjacent cell volumes.
fn u_cv_volume(dom: &Domain, i: usize, k: usize) -> f64 {
    let left = if i >= 1 { dom.mesh.vol_at(i, k) } else { dom.mesh.vol_at(1, k) };
    let right = if i + 1 <= dom.mesh.nx {
        dom.mesh.vol_at(i + 1, k)
    } else {
        dom.mesh.vol_at(dom.mesh.nx, k)
    };
    0.5 * (left + right)
}

fn dmx_at_u(dom: &Domain, i: usize, k: usize) -> f64 {
    let nx = dom.mesh.nx;
    let left = if i >= 1 && k <= dom.mesh.nz {
        dom.turb.dmx_at(nx, i.min(nx).max(1), k)
    } else {
        0.0
    };
    let right = if i + 1 <= nx && k <= dom.mesh.nz {
        dom.turb.dmx_at(nx, (i + 1).min(nx), k)
    } else {
        left
    };
    0.5 * (left + right)
}

/// Sum of tributary/confluence/pipe/point-source flow entering column `i`
/// at layer `k`, feeding the continuity reconstruction of `w`.
fn column_source_at(sources: &BoundarySources, i: usize, k: usize) -> f64 {
    let mut s = 0.0;
    for src in sources
        .tributaries
        .iter()
        .chain(sources.water_pipes.iter())
        .chain(sources.point_inflows.iter())
        .chain(sources.point_outflows.iter())
    {
        if src.i == i {
            s += src.q_at(k);
        }
    }
    s
}

/// Advance `u`, apply fences, rescale each column to `q_col`, then rebuild
/// `w` from continuity.
pub fn step_momentum(dom: &mut Domain, sources: &BoundarySources, dt_days: f64, opts: &MomentumOptions) -> Result<()> {
    let nx = dom.mesh.nx;
    let k_srf = dom.mesh.k_srf;
    let dt_s = dt_days * 86400.0;

    // Inlet/outlet face velocities are boundary conditions, not RHS terms.
    if let Some(inlet) = &sources.inlet {
        for k in 1..=k_srf {
            let au = dom.mesh.au_at(0, k);
            let idx = dom.u_idx(0, k);
            dom.u[idx] = if au > 1e-12 { inlet.q_at(k) / au } else { 0.0 };
        }
    }
    if sources.open_east {
        for k in 1..=k_srf {
            let u_interior = dom.u_at(nx.saturating_sub(1), k);
            let idx = dom.u_idx(nx, k);
            dom.u[idx] = u_interior;
        }
    } else {
        for k in 1..=k_srf {
            let au = dom.mesh.au_at(nx, k);
            let q: f64 = sources.outlets.iter().filter(|o| o.i == nx).map(|o| o.q_at(k)).sum();
            let idx = dom.u_idx(nx, k);
            dom.u[idx] = if au > 1e-12 { -q / au } else { 0.0 };
        }
    }

    let mut u_new = dom.u.clone();
    for i in 1..nx {
        let k_bot = dom.mesh.kc_bot[i].max(dom.mesh.kc_bot[(i + 1).min(nx)]).max(1);
        for k in k_bot..=k_srf {
            let vols = u_cv_volume(dom, i, k).max(1e-12);
            let u_c = dom.u_at(i, k);
            let u_w = u_col(dom, i.saturating_sub(1), k);
            let u_e = u_col(dom, i + 1, k);
            let u_above = if k < k_srf { dom.u_at(i, k + 1) } else { u_c };
            let u_below = if k > k_bot { dom.u_at(i, k - 1) } else { u_c };

            let face_e = 0.5 * (u_c + u_e);
            let face_w = 0.5 * (u_w + u_c);
            let au_e = dom.mesh.au_at((i + 1).min(nx), k);
            let au_w = dom.mesh.au_at(i, k);
            let flux_e = au_e * face_e * (if face_e >= 0.0 { u_c } else { u_e });
            let flux_w = au_w * face_w * (if face_w >= 0.0 { u_w } else { u_c });
            let adv_x = -(flux_e - flux_w);

            let w_e = 0.5 * (dom.w_at(i, k) + dom.w_at((i + 1).min(nx), k));
            let w_below_k = k.saturating_sub(1);
            let w_lo = 0.5 * (dom.w_at(i, w_below_k) + dom.w_at((i + 1).min(nx), w_below_k));
            let aw_e = 0.5 * (dom.mesh.aw_at(i, k) + dom.mesh.aw_at((i + 1).min(nx), k));
            let aw_w = 0.5 * (dom.mesh.aw_at(i, w_below_k) + dom.mesh.aw_at((i + 1).min(nx), w_below_k));
            let flux_top = aw_e * w_e * (if w_e >= 0.0 { u_c } else { u_above });
            let flux_bot = aw_w * w_lo * (if w_lo >= 0.0 { u_below } else { u_c });
            let adv_z = -(flux_top - flux_bot);

            let dmx_e = dmx_at_u(dom, i + 1, k);
            let dmx_w = dmx_at_u(dom, i, k);
            let dxs_e = dom.mesh.dxs.get(i + 1).copied().unwrap_or(dom.mesh.dx[(i + 1).min(nx)]).max(1e-9);
            let dxs_w = dom.mesh.dxs.get(i).copied().unwrap_or(dom.mesh.dx[i]).max(1e-9);
            let diff = dmx_e * au_e * (u_e - u_c) / dxs_e - dmx_w * au_w * (u_c - u_w) / dxs_w;

            let mut rhs = adv_x + adv_z + diff;

            if opts.pressure_grad {
                let nxc = dom.mesh.nx;
                let p_idx = |ii: usize, kk: usize| dom.density.p_at(nxc, ii.clamp(1, nxc), kk.clamp(1, k_srf.max(1)));
                let mut pgx_raw = if k < k_srf {
                    0.5 * ((p_idx(i + 1, k) - p_idx(i, k)) + (p_idx(i + 1, k + 1) - p_idx(i, k + 1)))
                        / (RHO_W * dxs_e)
                } else {
                    (p_idx(i + 1, k) - p_idx(i, k)) / (RHO_W * dxs_e)
                };
                if pgx_raw.abs() > opts.threshold_pgx {
                    pgx_raw = (p_idx(i + 1, k) - p_idx(i.saturating_sub(1).max(1), k)) / (2.0 * RHO_W * dxs_e);
                }
                let pgx_raw = pgx_raw * vols;
                let uidx = dom.u_idx(i, k);
                let old_raw = dom.pgx_raw[uidx];
                let old_filtered = dom.pgx[uidx];
                let filtered = if opts.smooth_pgx {
                    opts.beta_pgx * old_filtered + (1.0 - opts.beta_pgx) * pgx_raw
                } else {
                    pgx_raw
                };
                dom.pgx_old[uidx] = old_raw;
                dom.pgx_raw[uidx] = pgx_raw;
                dom.pgx[uidx] = filtered;
                rhs -= filtered;
            }

            if opts.gravity_slope {
                let bed_lo = dom.mesh.z_bed[i];
                let bed_hi = dom.mesh.z_bed[(i + 1).min(nx)];
                let dx_i = dom.mesh.dx[(i + 1).min(nx)].max(1e-9);
                let slope = ((bed_hi - bed_lo) / dx_i).atan().max(opts.init_slope.atan());
                rhs += GRAVITY * slope.sin() * vols;
            }

            for src in sources
                .tributaries
                .iter()
                .chain(sources.water_pipes.iter())
                .chain(sources.point_inflows.iter())
            {
                if src.i == i || src.i == i + 1 {
                    let q = src.q_at(k);
                    if q != 0.0 {
                        let u_src = q.signum() * (q.abs() / dom.mesh.au_at(i, k).max(1e-12));
                        rhs += (u_src - u_c) * q;
                    }
                }
            }

            let idx = dom.u_idx(i, k);
            u_new[idx] = u_c + dt_s * rhs / vols;
        }
    }
    dom.u = u_new;

    for fence in &dom.fences {
        for k in fence.k_low..=fence.k_high {
            let idx = dom.u_idx(fence.i_fnc.min(nx), k);
            dom.u[idx] = 0.0;
        }
    }

    for i in 1..nx {
        let k_bot = dom.mesh.kc_bot[i].max(dom.mesh.kc_bot[(i + 1).min(nx)]).max(1);
        let mut flux_sum = 0.0;
        for k in k_bot..=k_srf {
            flux_sum += dom.mesh.au_at(i, k) * dom.u_at(i, k);
        }
        let target = dom.q_col.get(i).copied().unwrap_or(0.0);
        if flux_sum.abs() > 1e-12 {
            let scale = target / flux_sum;
            for k in k_bot..=k_srf {
                let idx = dom.u_idx(i, k);
                dom.u[idx] *= scale;
            }
        }
    }

    rebuild_w_from_continuity(dom, sources);
    Ok(())
}

/// `w(i,k)*aw(i,k) = w(i,k-1)*aw(i,k-1) + q_sources(i,k) -
/// (u(i,k)*au(i,k) - u(i-1,k)*au(i-1,k))`, `w(i, kc_bot(i)-1) = 0`, ghost
/// row `k_srf+1` mirrors `k_srf`.
fn rebuild_w_from_continuity(dom: &mut Domain, sources: &BoundarySources) {
    let nx = dom.mesh.nx;
    let k_srf = dom.mesh.k_srf;
    for i in 1..=nx {
        let k_bot = dom.mesh.kc_bot[i].max(1);
        let mut w_below = 0.0;
        for k in k_bot..=k_srf {
            let aw_here = dom.mesh.aw_at(i, k);
            let q_src = column_source_at(sources, i, k);
            let au_here = dom.mesh.au_at(i, k) * dom.u_at(i, k);
            let au_west = dom.mesh.au_at(i - 1, k) * dom.u_at(i - 1, k);
            let aw_below = dom.mesh.aw_at(i, k.saturating_sub(1));
            let w_flux = w_below * aw_below + q_src - (au_here - au_west);
            let w_here = if aw_here > 1e-12 { w_flux / aw_here } else { 0.0 };
            let idx = dom.w_idx(i, k);
            dom.w[idx] = w_here;
            w_below = w_here;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{InflowMode, InletDescriptor, SourceDescriptor};
    use crate::mesh::Mesh;
    use crate::turbulence::TurbulenceConfig;

    fn flat_domain() -> Domain {
        let nx = 5;
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
        let mut dom = Domain::new(1, "flat", mesh, 1, 2650.0, inlet, TurbulenceConfig::default());
        dom.q_col = vec![0.0; nx + 1];
        dom
    }

    #[test]
    fn quiescent_domain_with_zero_sources_stays_at_rest() {
        let mut dom = flat_domain();
        let sources = BoundarySources::default();
        step_momentum(&mut dom, &sources, 1.0, &MomentumOptions::default()).unwrap();
        assert!(dom.u.iter().all(|v| v.abs() < 1e-9));
        assert!(dom.w.iter().all(|v| v.abs() < 1e-9));
    }

    #[test]
    fn column_rescale_matches_q_col_target() {
        let mut dom = flat_domain();
        dom.q_col = vec![0.3; dom.mesh.nx + 1];
        for v in dom.u.iter_mut() {
            *v = 0.01;
        }
        let sources = BoundarySources::default();
        step_momentum(&mut dom, &sources, 0.0, &MomentumOptions::default()).unwrap();
        let nx = dom.mesh.nx;
        for i in 1..nx {
            let k_bot = dom.mesh.kc_bot[i].max(dom.mesh.kc_bot[(i + 1).min(nx)]).max(1);
            let flux: f64 = (k_bot..=dom.mesh.k_srf).map(|k| dom.mesh.au_at(i, k) * dom.u_at(i, k)).sum();
            assert!((flux - dom.q_col[i]).abs() < 1e-8);
        }
    }

    #[test]
    fn fence_zeroes_velocity_at_its_column() {
        let mut dom = flat_domain();
        dom.fences.push(crate::domain::Fence {
            i_fnc: 2,
            k_low: 1,
            k_high: dom.mesh.k_srf,
            floating: false,
            width: 0.0,
        });
        for v in dom.u.iter_mut() {
            *v = 0.05;
        }
        let sources = BoundarySources::default();
        step_momentum(&mut dom, &sources, 0.0, &MomentumOptions::default()).unwrap();
        for k in 1..=dom.mesh.k_srf {
            assert_eq!(dom.u_at(2, k), 0.0);
        }
    }
}
