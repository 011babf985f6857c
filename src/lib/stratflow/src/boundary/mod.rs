//! Boundary source construction (§4.B): per-layer flow/temperature/
//! concentration profiles for every inflow, outflow, tributary, confluence,
//! water-pipe and point source a domain carries, read from their schedules
//! at the current simulation time.

pub mod gaussian;
pub mod inflow;
pub mod outflow;

use crate::domain::{Domain, InflowMode};
use crate::error::Result;
use inflow::build_inflow_profile;
use outflow::build_outflow_profile;

/// A source term applied at column `i`, layers `k_lo..=k_hi`: volumetric
/// flow `q[k]` [m3/s] (positive entering the column) plus the carried
/// temperature and per-class concentration.
#[derive(Clone, Debug, Default)]
pub struct FaceSource {
    pub i: usize,
    pub k_lo: usize,
    pub k_hi: usize,
    pub q: Vec<f64>,
    pub temp: f64,
    pub conc: Vec<f64>,
}

impl FaceSource {
    pub fn q_at(&self, k: usize) -> f64 {
        if self.q.is_empty() || k < self.k_lo || k > self.k_hi {
            0.0
        } else {
            self.q[k - self.k_lo]
        }
    }

    pub fn total(&self) -> f64 {
        self.q.iter().sum()
    }
}

/// Every source term this domain carries, built for one simulation time.
#[derive(Clone, Debug, Default)]
pub struct BoundarySources {
    pub inlet: Option<FaceSource>,
    pub outlets: Vec<FaceSource>,
    pub tributaries: Vec<FaceSource>,
    pub water_pipes: Vec<FaceSource>,
    pub point_inflows: Vec<FaceSource>,
    pub point_outflows: Vec<FaceSource>,
    /// Set when the domain carries no outlets: the east boundary is open
    /// and the momentum/heat/solids integrators copy state from `i = nx-1`
    /// into `nx` and `nx+1` instead of applying an outflow profile.
    pub open_east: bool,
}

impl BoundarySources {
    pub fn q_total_in(&self) -> f64 {
        let mut s = self.inlet.as_ref().map(FaceSource::total).unwrap_or(0.0);
        s += self.tributaries.iter().map(FaceSource::total).sum::<f64>();
        s += self.point_inflows.iter().map(FaceSource::total).sum::<f64>();
        s += self.water_pipes.iter().map(|p| p.total().max(0.0)).sum::<f64>();
        s
    }

    pub fn q_total_out(&self) -> f64 {
        let mut s = -self.outlets.iter().map(FaceSource::total).sum::<f64>();
        s += -self.point_outflows.iter().map(FaceSource::total).sum::<f64>();
        s += self.water_pipes.iter().map(|p| (-p.total()).max(0.0)).sum::<f64>();
        s
    }

    /// All source terms in the order the momentum/heat/solids integrators
    /// visit them.
    pub fn all(&self) -> impl Iterator<Item = &FaceSource> {
        self.inlet
            .iter()
            .chain(self.outlets.iter())
            .chain(self.tributaries.iter())
            .chain(self.water_pipes.iter())
            .chain(self.point_inflows.iter())
            .chain(self.point_outflows.iter())
    }
}

fn read_source_row(series: &crate::timeseries::TimeSeries, t_days: f64) -> Result<(f64, f64, Vec<f64>)> {
    let row = series.value_strict(t_days)?;
    let q = row.first().copied().unwrap_or(0.0);
    let temp = row.get(1).copied().unwrap_or(20.0);
    let conc = row.get(2..).map(|s| s.to_vec()).unwrap_or_default();
    Ok((q, temp, conc))
}

/// Read every schedule at `t_days` and build this step's source profiles.
pub fn build_boundary_sources(dom: &Domain, t_days: f64, step: u64) -> Result<BoundarySources> {
    let mut out = BoundarySources {
        open_east: dom.outlets.is_empty(),
        ..Default::default()
    };

    if let Some(series) = &dom.inlet.base.series {
        let (q, temp, conc) = read_source_row(series, t_days)?;
        let profile = build_inflow_profile(
            dom,
            dom.inlet.base.i,
            dom.inlet.mode,
            q,
            temp,
            dom.inlet.base.width,
            dom.inlet.base.froude,
            dom.inlet.z_in_low,
            step,
        )?;
        out.inlet = Some(FaceSource {
            i: dom.inlet.base.i,
            k_lo: profile.k_lo,
            k_hi: profile.k_hi,
            q: profile.q,
            temp,
            conc,
        });
    }

    for outlet in &dom.outlets {
        let Some(series) = &outlet.base.series else { continue };
        let (q, _, _) = read_source_row(series, t_days)?;
        let profile = build_outflow_profile(dom, outlet, q)?;
        out.outlets.push(FaceSource {
            i: outlet.base.i.clamp(1, dom.mesh.nx),
            k_lo: profile.k_lo,
            k_hi: profile.k_hi,
            q: profile.q,
            temp: 0.0,
            conc: Vec::new(),
        });
    }

    for trib in &dom.tributaries {
        let Some(series) = &trib.series else { continue };
        let (q, temp, conc) = read_source_row(series, t_days)?;
        let profile = build_inflow_profile(
            dom,
            trib.i,
            InflowMode::Rid,
            q,
            temp,
            trib.width,
            trib.froude,
            dom.mesh.z[0],
            step,
        )?;
        out.tributaries.push(FaceSource {
            i: trib.i,
            k_lo: profile.k_lo,
            k_hi: profile.k_hi,
            q: profile.q,
            temp,
            conc,
        });
    }

    for pipe in &dom.water_pipes {
        if !pipe.owns_schedule {
            continue;
        }
        let Some(series) = &pipe.base.series else { continue };
        let (q, temp, conc) = read_source_row(series, t_days)?;
        let profile = build_inflow_profile(
            dom,
            pipe.base.i,
            InflowMode::Rid,
            q,
            temp,
            pipe.base.width,
            pipe.base.froude,
            dom.mesh.z[0],
            step,
        )?;
        out.water_pipes.push(FaceSource {
            i: pipe.base.i,
            k_lo: profile.k_lo,
            k_hi: profile.k_hi,
            q: profile.q,
            temp,
            conc,
        });
    }

    for pin in &dom.point_inflows {
        let Some(series) = &pin.series else { continue };
        let (q, temp, conc) = read_source_row(series, t_days)?;
        let profile = build_inflow_profile(dom, pin.i, InflowMode::Ri1, q, temp, pin.width, pin.froude, dom.mesh.z[0], step)?;
        out.point_inflows.push(FaceSource {
            i: pin.i,
            k_lo: profile.k_lo,
            k_hi: profile.k_hi,
            q: profile.q,
            temp,
            conc,
        });
    }

    for pout in &dom.point_outflows {
        let Some(series) = &pout.series else { continue };
        let (q, _, _) = read_source_row(series, t_days)?;
        let i = pout.i.clamp(1, dom.mesh.nx);
        let k_bot = dom.mesh.kc_bot[i].max(1);
        let k = pout
            .z_target
            .map(|z| gaussian::locate_kc_by_elevation(&dom.mesh, z, k_bot, dom.mesh.k_srf))
            .unwrap_or(dom.mesh.k_srf.max(k_bot));
        out.point_outflows.push(FaceSource {
            i,
            k_lo: k,
            k_hi: k,
            q: vec![-q.abs()],
            temp: 0.0,
            conc: Vec::new(),
        });
    }

    Ok(out)
}
