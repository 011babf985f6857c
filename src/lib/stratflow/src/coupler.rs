//! Multi-domain coupler (§4.C): per-step volume balance, `q_col`
//! reconstruction, and shared-surface inversion across confluent domains.
//!
//! Confluent domains (paired by [`crate::domain::ConfluenceDescriptor`])
//! share one free-surface elevation: their `total_vol` and `vol_hgt` tables
//! are summed before inversion rather than carrying an explicit `Q_cnf`
//! flux term, so the exchanged volume is accounted for exactly once.

use crate::boundary::BoundarySources;
use crate::domain::Domain;
use crate::error::{Result, StratflowError};
use crate::fence::update_floating_fences;
use std::collections::HashMap;

struct DomainFlux {
    q_total_vol: f64,
    q_col: Vec<f64>,
}

fn compute_domain_flux(dom: &Domain, sources: &BoundarySources) -> DomainFlux {
    let q_total_vol = sources.q_total_in() - sources.q_total_out();
    let nx = dom.mesh.nx;
    let k_srf = dom.mesh.k_srf.max(1);

    let total_width: f64 = (1..=nx).map(|i| dom.mesh.b_at(i, k_srf)).sum();
    let share_per_width = if total_width > 1e-9 { q_total_vol / total_width } else { 0.0 };

    let mut q_col = vec![0.0; nx + 1];
    q_col[0] = sources.inlet.as_ref().map(|s| s.total()).unwrap_or(0.0);
    for i in 1..=nx {
        let mut s = q_col[i - 1];
        for src in sources
            .tributaries
            .iter()
            .chain(sources.water_pipes.iter())
            .chain(sources.point_inflows.iter())
            .chain(sources.point_outflows.iter())
        {
            if src.i == i {
                s += src.total();
            }
        }
        s -= share_per_width * dom.mesh.b_at(i, k_srf);
        q_col[i] = s;
    }
    if !sources.outlets.is_empty() {
        q_col[nx] = -sources.outlets.iter().map(|o| o.total()).sum::<f64>();
    }

    DomainFlux { q_total_vol, q_col }
}

/// Invert a `vol_hgt`-shaped table (possibly the sum of several confluent
/// domains' tables) for the elevation matching `total_vol`, against a
/// shared `z` grid.
fn invert_vol_hgt(z: &[f64], vol_hgt: &[f64], total_vol: f64) -> Result<f64> {
    let nz = z.len() - 1;
    let lo = vol_hgt[0];
    let hi = *vol_hgt.last().unwrap();
    if total_vol < lo - 1e-9 || total_vol > hi + 1e-9 {
        return Err(StratflowError::config(format!(
            "total_vol={total_vol} outside combined mesh capacity [{lo}, {hi}]"
        )));
    }
    let mut k = 1;
    while k < nz && vol_hgt[k] < total_vol {
        k += 1;
    }
    let seg_lo = vol_hgt[k - 1];
    let seg_hi = vol_hgt[k];
    let frac = if seg_hi > seg_lo { (total_vol - seg_lo) / (seg_hi - seg_lo) } else { 0.0 };
    Ok(z[k - 1] + frac * (z[k] - z[k - 1]))
}

fn find(parent: &mut [usize], x: usize) -> usize {
    if parent[x] != x {
        parent[x] = find(parent, parent[x]);
    }
    parent[x]
}

/// Advance every domain's volume balance and free surface by one step
/// (§4.C steps 1-5). `sources[i]` must correspond to `doms[i]`.
pub fn step_coupler(doms: &mut [Domain], sources: &[BoundarySources], dt_days: f64, step: u64) -> Result<()> {
    let dt_s = dt_days * 86400.0;
    let n = doms.len();

    let fluxes: Vec<DomainFlux> = doms
        .iter()
        .zip(sources.iter())
        .map(|(dom, src)| compute_domain_flux(dom, src))
        .collect();

    for (dom, flux) in doms.iter_mut().zip(fluxes.iter()) {
        dom.mesh.q_total_vol = flux.q_total_vol;
        dom.mesh.total_vol += dt_s * flux.q_total_vol;
        dom.q_col = flux.q_col.clone();
    }

    let id_to_pos: HashMap<usize, usize> = doms.iter().enumerate().map(|(pos, d)| (d.id, pos)).collect();
    let mut parent: Vec<usize> = (0..n).collect();
    for pos in 0..n {
        for conf in &doms[pos].confluences {
            if let Some(&other_pos) = id_to_pos.get(&conf.other_domain) {
                let a = find(&mut parent, pos);
                let b = find(&mut parent, other_pos);
                if a != b {
                    parent[a] = b;
                }
            }
        }
    }
    let mut groups: HashMap<usize, Vec<usize>> = HashMap::new();
    for pos in 0..n {
        let root = find(&mut parent, pos);
        groups.entry(root).or_default().push(pos);
    }

    for members in groups.into_values() {
        if members.len() == 1 {
            let pos = members[0];
            let z_old = doms[pos].mesh.z_srf;
            let total_vol = doms[pos].mesh.total_vol;
            let cap = *doms[pos].mesh.vol_hgt.last().unwrap();
            if total_vol > cap || total_vol < 1e-3 {
                return Err(StratflowError::Capacity { domain: doms[pos].id, step, total_vol, bound: cap });
            }
            let z_srf = doms[pos].mesh.z_srf_for_total_vol(total_vol)?;
            doms[pos].mesh.w_srf = if dt_s > 0.0 { (z_srf - z_old) / dt_s } else { 0.0 };
            doms[pos].mesh.update_surface_layer(z_srf)?;
            update_floating_fences(&mut doms[pos]);
        } else {
            let total_vol_sum: f64 = members.iter().map(|&p| doms[p].mesh.total_vol).sum();
            let nz_ref = doms[members[0]].mesh.nz;
            for &p in &members {
                if doms[p].mesh.nz != nz_ref {
                    return Err(StratflowError::Mesh {
                        domain_a: doms[members[0]].id,
                        domain_b: doms[p].id,
                        message: "confluent domains disagree on nz".into(),
                    });
                }
            }
            let mut vol_hgt_sum = vec![0.0; nz_ref + 1];
            for &p in &members {
                for k in 0..=nz_ref {
                    vol_hgt_sum[k] += doms[p].mesh.vol_hgt[k];
                }
            }
            let cap = *vol_hgt_sum.last().unwrap();
            if total_vol_sum > cap || total_vol_sum < 1e-3 {
                return Err(StratflowError::Capacity { domain: doms[members[0]].id, step, total_vol: total_vol_sum, bound: cap });
            }
            let z_shared = invert_vol_hgt(&doms[members[0]].mesh.z, &vol_hgt_sum, total_vol_sum)?;
            for &p in &members {
                let z_old = doms[p].mesh.z_srf;
                doms[p].mesh.w_srf = if dt_s > 0.0 { (z_shared - z_old) / dt_s } else { 0.0 };
                doms[p].mesh.update_surface_layer(z_shared)?;
                update_floating_fences(&mut doms[p]);
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{ConfluenceDescriptor, InflowMode, InletDescriptor, SourceDescriptor};
    use crate::mesh::Mesh;
    use crate::turbulence::TurbulenceConfig;

    fn flat_domain(id: usize) -> Domain {
        let nx = 4;
        let nz = 10;
        let x: Vec<f64> = (0..=nx).map(|i| i as f64 * 10.0).collect();
        let z: Vec<f64> = (0..=nz).map(|k| k as f64 * 2.0).collect();
        let b = vec![5.0; (nx + 1) * (nz + 1)];
        let z_bed = vec![0.0; nx + 1];
        let mut mesh = Mesh::build(x, z, b, z_bed).unwrap();
        mesh.update_surface_layer(10.0).unwrap();
        let inlet = InletDescriptor {
            base: SourceDescriptor {
                name: "in".into(),
                i: 0,
                froude: 1.0,
                width: 5.0,
                angle_deg: 0.0,
                z_target: None,
                series: None,
            },
            mode: InflowMode::Rid,
            z_in_low: 0.0,
        };
        Domain::new(id, format!("d{id}"), mesh, 1, 2650.0, inlet, TurbulenceConfig::default())
    }

    #[test]
    fn zero_flux_leaves_total_vol_and_surface_unchanged() {
        let mut dom = flat_domain(1);
        let vol_before = dom.mesh.total_vol;
        let z_before = dom.mesh.z_srf;
        let sources = BoundarySources::default();
        step_coupler(std::slice::from_mut(&mut dom), &[sources], 1.0 / 86400.0, 0).unwrap();
        assert!((dom.mesh.total_vol - vol_before).abs() < 1e-9);
        assert!((dom.mesh.z_srf - z_before).abs() < 1e-9);
    }

    #[test]
    fn plug_inflow_raises_total_vol_by_integrated_flow() {
        use crate::boundary::FaceSource;
        let mut dom = flat_domain(1);
        let vol_before = dom.mesh.total_vol;
        let dt_days = 1.0 / 86400.0;
        let sources = BoundarySources {
            inlet: Some(FaceSource { i: 0, k_lo: 1, k_hi: 5, q: vec![0.2; 5], temp: 20.0, conc: vec![] }),
            ..Default::default()
        };
        step_coupler(std::slice::from_mut(&mut dom), &[sources], dt_days, 0).unwrap();
        let expected = vol_before + dt_days * 86400.0 * 1.0;
        assert!((dom.mesh.total_vol - expected).abs() < 1e-6);
        assert!(dom.mesh.z_srf > 10.0);
    }

    #[test]
    fn confluent_domains_share_one_surface() {
        let mut a = flat_domain(1);
        let mut b = flat_domain(2);
        a.confluences.push(ConfluenceDescriptor {
            base: SourceDescriptor {
                name: "cnf".into(),
                i: a.mesh.nx,
                froude: 1.0,
                width: 5.0,
                angle_deg: 0.0,
                z_target: None,
                series: None,
            },
            other_domain: 2,
        });
        b.confluences.push(ConfluenceDescriptor {
            base: SourceDescriptor {
                name: "cnf".into(),
                i: 0,
                froude: 1.0,
                width: 5.0,
                angle_deg: 0.0,
                z_target: None,
                series: None,
            },
            other_domain: 1,
        });
        use crate::boundary::FaceSource;
        let src_a = BoundarySources {
            inlet: Some(FaceSource { i: 0, k_lo: 1, k_hi: 5, q: vec![0.4; 5], temp: 20.0, conc: vec![] }),
            ..Default::default()
        };
        let src_b = BoundarySources::default();
        let mut doms = vec![a, b];
        step_coupler(&mut doms, &[src_a, src_b], 1.0 / 86400.0, 0).unwrap();
        assert!((doms[0].mesh.z_srf - doms[1].mesh.z_srf).abs() < 1e-9);
    }
}
