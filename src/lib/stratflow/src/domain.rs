//! The `Domain` data model (§3): mesh, derived and primary fields, boundary
//! descriptors and time series for one geometric reach of the water body.

use crate::density::DensityField;
use crate::error::{Result, StratflowError};
use crate::mesh::Mesh;
use crate::timeseries::TimeSeries;
use crate::turbulence::{TurbulenceConfig, TurbulenceField};
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub enum InflowMode {
    /// Equidensity inflow.
    Edi,
    /// Distributed river inflow.
    Rid,
    /// Single-cell density-selected inflow.
    Ri1,
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub enum OutflowMode {
    /// Normal distribution around z_out.
    Ndo,
    /// Equal distribution over a prescribed gate height.
    Edo,
    /// Density-dependent two-sided jet.
    Ddd,
}

/// A source/sink descriptor shared by tributaries, confluences, water pipes
/// and point sources: geometric position, a reference internal Froude
/// number, an aperture/width and an injection angle, with the flow (and, for
/// inflows, temperature/solids) schedule carried in `series`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SourceDescriptor {
    pub name: String,
    pub i: usize,
    pub froude: f64,
    pub width: f64,
    pub angle_deg: f64,
    /// Explicit target elevation, when the source does not select its
    /// elevation by density matching (`None` lets the Gaussian machinery
    /// locate `kc` itself).
    pub z_target: Option<f64>,
    #[serde(skip)]
    pub series: Option<TimeSeries>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct InletDescriptor {
    pub base: SourceDescriptor,
    pub mode: InflowMode,
    pub z_in_low: f64,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct OutletDescriptor {
    pub base: SourceDescriptor,
    pub mode: OutflowMode,
    pub z_kt_sw: Option<f64>,
    pub z_kb_sw: Option<f64>,
    pub gate_height: Option<f64>,
}

/// A water pipe connects this domain to `other_domain` (1-based id). The
/// domain with the lower id owns the schedule read; its counterpart
/// receives the sign-flipped flowrate.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct WaterPipeDescriptor {
    pub base: SourceDescriptor,
    pub other_domain: usize,
    pub owns_schedule: bool,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ConfluenceDescriptor {
    pub base: SourceDescriptor,
    pub other_domain: usize,
}

/// A zero-flux internal barrier (§4.X). Floating fences track
/// `z_srf - width` on every surface update; fixed fences keep their
/// initial k-range.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Fence {
    pub i_fnc: usize,
    pub k_low: usize,
    pub k_high: usize,
    pub floating: bool,
    pub width: f64,
}

#[derive(Clone, Debug)]
pub struct Domain {
    pub id: usize,
    pub name: String,

    pub mesh: Mesh,
    pub density: DensityField,
    pub turb: TurbulenceField,
    pub turbulence_config: TurbulenceConfig,

    /// u-faces, flat `(nx+1) * nz`, i in 0..=nx, k in 1..=nz.
    pub u: Vec<f64>,
    /// w-faces, flat `nx * (nz+1)`, i in 1..=nx, k in 0..=nz.
    pub w: Vec<f64>,
    /// Cell-centered scalar with a one-cell ghost band, flat
    /// `(nx+2) * (nz+2)`, i in 0..=nx+1, k in 0..=nz+1.
    pub t: Vec<f64>,
    /// Suspended-solids classes, flat `nps * (nx+2) * (nz+2)`.
    pub c: Vec<f64>,
    pub c_sed: Vec<f64>,
    pub nps: usize,

    pub pgx: Vec<f64>,
    pub pgx_raw: Vec<f64>,
    pub pgx_old: Vec<f64>,

    pub inlet: InletDescriptor,
    pub outlets: Vec<OutletDescriptor>,
    pub tributaries: Vec<SourceDescriptor>,
    pub confluences: Vec<ConfluenceDescriptor>,
    pub water_pipes: Vec<WaterPipeDescriptor>,
    pub point_inflows: Vec<SourceDescriptor>,
    pub point_outflows: Vec<SourceDescriptor>,
    pub fences: Vec<Fence>,

    pub q_col: Vec<f64>,
    pub rho_ss: f64,
}

impl Domain {
    #[inline]
    pub fn u_idx(&self, i: usize, k: usize) -> usize {
        (k - 1) * (self.mesh.nx + 1) + i
    }
    #[inline]
    pub fn w_idx(&self, i: usize, k: usize) -> usize {
        k * self.mesh.nx + (i - 1)
    }
    #[inline]
    pub fn t_idx(&self, i: usize, k: usize) -> usize {
        k * (self.mesh.nx + 2) + i
    }
    #[inline]
    pub fn c_idx(&self, i: usize, k: usize, l: usize) -> usize {
        (l - 1) * (self.mesh.nx + 2) * (self.mesh.nz + 2) + self.t_idx(i, k)
    }

    pub fn u_at(&self, i: usize, k: usize) -> f64 {
        self.u[self.u_idx(i, k)]
    }
    pub fn w_at(&self, i: usize, k: usize) -> f64 {
        self.w[self.w_idx(i, k)]
    }
    pub fn t_at(&self, i: usize, k: usize) -> f64 {
        self.t[self.t_idx(i, k)]
    }
    pub fn c_at(&self, i: usize, k: usize, l: usize) -> f64 {
        self.c[self.c_idx(i, k, l)]
    }

    /// Total suspended-solids concentration [g/m3] summed across classes,
    /// feeding the turbid density correction.
    pub fn c_total_g_m3(&self) -> Vec<f64> {
        let nx = self.mesh.nx;
        let nz = self.mesh.nz;
        let mut out = vec![0.0; nx * nz];
        for k in 1..=nz {
            for i in 1..=nx {
                let mut s = 0.0;
                for l in 1..=self.nps {
                    s += self.c_at(i, k, l);
                }
                out[(k - 1) * nx + (i - 1)] = s;
            }
        }
        out
    }

    pub fn new(
        id: usize,
        name: impl Into<String>,
        mesh: Mesh,
        nps: usize,
        rho_ss: f64,
        inlet: InletDescriptor,
        turbulence_config: TurbulenceConfig,
    ) -> Domain {
        let nx = mesh.nx;
        let nz = mesh.nz;
        Domain {
            id,
            name: name.into(),
            density: DensityField::new(nx, nz),
            turb: TurbulenceField::new(nx, nz),
            turbulence_config,
            u: vec![0.0; (nx + 1) * nz],
            w: vec![0.0; nx * (nz + 1)],
            t: vec![20.0; (nx + 2) * (nz + 2)],
            c: vec![0.0; nps.max(1) * (nx + 2) * (nz + 2)],
            c_sed: vec![0.0; nps.max(1) * (nx + 1)],
            nps,
            pgx: vec![0.0; (nx + 1) * nz],
            pgx_raw: vec![0.0; (nx + 1) * nz],
            pgx_old: vec![0.0; (nx + 1) * nz],
            inlet,
            outlets: Vec::new(),
            tributaries: Vec::new(),
            confluences: Vec::new(),
            water_pipes: Vec::new(),
            point_inflows: Vec::new(),
            point_outflows: Vec::new(),
            fences: Vec::new(),
            q_col: vec![0.0; nx + 1],
            rho_ss,
            mesh,
        }
    }

    /// Validate the invariants listed in §3 that are cheap enough to check
    /// every step (surface location and `vol_hgt` monotonicity; the column
    /// flux balance is checked by the momentum integrator itself, M1).
    pub fn check_invariants(&self, step: u64) -> Result<()> {
        let z = &self.mesh.z;
        let k_srf = self.mesh.k_srf;
        if k_srf > 0 {
            let lower = if k_srf >= 1 { z[k_srf - 1] } else { z[0] };
            if !(lower < self.mesh.z_srf && self.mesh.z_srf <= z[k_srf]) {
                return Err(StratflowError::domain(
                    self.id,
                    step,
                    format!(
                        "surface elevation {} not within (z({}), z({})] = ({}, {}]",
                        self.mesh.z_srf,
                        k_srf - 1,
                        k_srf,
                        lower,
                        z[k_srf]
                    ),
                ));
            }
        }
        for k in 1..=self.mesh.nz {
            if self.mesh.vol_hgt[k] + 1e-9 < self.mesh.vol_hgt[k - 1] {
                return Err(StratflowError::domain(
                    self.id,
                    step,
                    "vol_hgt is not monotone non-decreasing",
                ));
            }
        }
        Ok(())
    }
}
