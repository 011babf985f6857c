//! Run configuration (§4.R, §6): one YAML document deserialized into a
//! [`RunConfig`] plus one [`DomainConfig`] per domain, wiring together the
//! per-module option records ([`TurbulenceConfig`], [`MomentumOptions`],
//! [`HeatOptions`], [`ParticleSpec`]).

use crate::domain::{
    ConfluenceDescriptor, Domain, Fence, InflowMode, InletDescriptor, OutflowMode, OutletDescriptor,
    SourceDescriptor, WaterPipeDescriptor,
};
use crate::error::{Result, StratflowError};
use crate::heat::HeatOptions;
use crate::io::geometry::read_geometry;
use crate::io::timeseries_io::read_timeseries;
use crate::momentum::MomentumOptions;
use crate::solids::{validate_particle_classes, ParticleClass};
use crate::turbulence::TurbulenceConfig;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct InletConfig {
    pub i: usize,
    pub mode: InflowMode,
    pub froude: f64,
    pub width: f64,
    pub angle_deg: f64,
    pub z_in_low: f64,
    pub schedule: PathBuf,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct OutletConfig {
    pub name: String,
    pub i: usize,
    pub mode: OutflowMode,
    pub froude: f64,
    pub width: f64,
    pub angle_deg: f64,
    pub z_kt_sw: Option<f64>,
    pub z_kb_sw: Option<f64>,
    pub gate_height: Option<f64>,
    pub schedule: PathBuf,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SourceConfig {
    pub name: String,
    pub i: usize,
    pub froude: f64,
    pub width: f64,
    pub angle_deg: f64,
    pub z_target: Option<f64>,
    pub schedule: PathBuf,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct WaterPipeConfig {
    pub name: String,
    pub i: usize,
    pub froude: f64,
    pub width: f64,
    pub angle_deg: f64,
    pub other_domain: usize,
    pub owns_schedule: bool,
    pub schedule: Option<PathBuf>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ConfluenceConfig {
    pub name: String,
    pub i: usize,
    pub other_domain: usize,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FenceConfig {
    pub i_fnc: usize,
    pub k_low: usize,
    pub k_high: usize,
    pub floating: bool,
    pub width: f64,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ProbeConfig {
    pub name: String,
    pub i: usize,
    pub k: usize,
}

/// Particle spec (§6): `nps` classes, each with a diameter/density/
/// diffusivity-scale triple.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ParticleSpec {
    pub nps: usize,
    pub classes: Vec<ParticleClass>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DomainConfig {
    pub name: String,
    pub geometry_path: PathBuf,
    pub initial_temp_c: f64,
    pub rho_ss: f64,
    #[serde(default)]
    pub turbulence: TurbulenceConfig,
    pub inlet: InletConfig,
    #[serde(default)]
    pub outlets: Vec<OutletConfig>,
    #[serde(default)]
    pub tributaries: Vec<SourceConfig>,
    #[serde(default)]
    pub confluences: Vec<ConfluenceConfig>,
    #[serde(default)]
    pub water_pipes: Vec<WaterPipeConfig>,
    #[serde(default)]
    pub point_inflows: Vec<SourceConfig>,
    #[serde(default)]
    pub point_outflows: Vec<SourceConfig>,
    #[serde(default)]
    pub fences: Vec<FenceConfig>,
    #[serde(default)]
    pub probes: Vec<ProbeConfig>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RunConfig {
    pub ndom: usize,
    #[serde(default)]
    pub restart: bool,
    #[serde(default)]
    pub restart_snapshot_id: Option<u64>,
    #[serde(default)]
    pub fixed_dt: bool,
    pub dt_sec: f64,
    pub it_max: u64,
    #[serde(default = "default_interval")]
    pub snapshot_interval: u64,
    #[serde(default = "default_interval")]
    pub output_interval: u64,
    #[serde(default)]
    pub momentum: MomentumOptions,
    #[serde(default)]
    pub heat: HeatOptions,
    #[serde(default)]
    pub particles: ParticleSpec,
    #[serde(default)]
    pub meteorology_path: Option<PathBuf>,
    pub domains: Vec<DomainConfig>,
}

fn default_interval() -> u64 {
    100
}

impl RunConfig {
    pub fn load(path: &Path) -> Result<RunConfig> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| StratflowError::io(format!("reading config {}: {e}", path.display())))?;
        let cfg: RunConfig = serde_yaml::from_str(&text)
            .map_err(|e| StratflowError::config(format!("parsing config {}: {e}", path.display())))?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// §4.R's config-loader contract: `1 <= ndom <= 10`, `nps <= 20`, and
    /// unique domain names.
    pub fn validate(&self) -> Result<()> {
        if self.ndom == 0 || self.ndom > 10 {
            return Err(StratflowError::config(format!("ndom={} out of range [1,10]", self.ndom)));
        }
        if self.domains.len() != self.ndom {
            return Err(StratflowError::config(format!(
                "ndom={} but {} domain records supplied",
                self.ndom,
                self.domains.len()
            )));
        }
        if self.particles.nps > 20 {
            return Err(StratflowError::config(format!("nps={} exceeds the 20-class limit", self.particles.nps)));
        }
        if self.particles.classes.len() != self.particles.nps {
            return Err(StratflowError::config(format!(
                "nps={} but {} particle classes supplied",
                self.particles.nps,
                self.particles.classes.len()
            )));
        }
        let mut seen = HashSet::new();
        for dom in &self.domains {
            if !seen.insert(dom.name.as_str()) {
                return Err(StratflowError::config(format!("duplicate domain name {:?}", dom.name)));
            }
        }
        Ok(())
    }
}

fn resolve(base_dir: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base_dir.join(path)
    }
}

fn source_descriptor(base_dir: &Path, name: String, i: usize, froude: f64, width: f64, angle_deg: f64, z_target: Option<f64>, schedule: &Path) -> Result<SourceDescriptor> {
    let series = read_timeseries(&resolve(base_dir, schedule))?;
    Ok(SourceDescriptor { name, i, froude, width, angle_deg, z_target, series: Some(series) })
}

impl DomainConfig {
    /// Build a runnable [`Domain`] from this record: reads the geometry file
    /// and every descriptor's schedule, relative to `base_dir` (the
    /// directory the run config itself lives in).
    pub fn build(&self, id: usize, base_dir: &Path) -> Result<Domain> {
        let mesh = read_geometry(&resolve(base_dir, &self.geometry_path))?;

        let inlet_series = read_timeseries(&resolve(base_dir, &self.inlet.schedule))?;
        let inlet = InletDescriptor {
            base: SourceDescriptor {
                name: "inlet".to_string(),
                i: self.inlet.i,
                froude: self.inlet.froude,
                width: self.inlet.width,
                angle_deg: self.inlet.angle_deg,
                z_target: None,
                series: Some(inlet_series),
            },
            mode: self.inlet.mode,
            z_in_low: self.inlet.z_in_low,
        };

        let mut dom = Domain::new(id, self.name.clone(), mesh, 0, self.rho_ss, inlet, self.turbulence.clone());

        for outlet in &self.outlets {
            let series = read_timeseries(&resolve(base_dir, &outlet.schedule))?;
            dom.outlets.push(OutletDescriptor {
                base: SourceDescriptor {
                    name: outlet.name.clone(),
                    i: outlet.i,
                    froude: outlet.froude,
                    width: outlet.width,
                    angle_deg: outlet.angle_deg,
                    z_target: None,
                    series: Some(series),
                },
                mode: outlet.mode,
                z_kt_sw: outlet.z_kt_sw,
                z_kb_sw: outlet.z_kb_sw,
                gate_height: outlet.gate_height,
            });
        }

        for trib in &self.tributaries {
            dom.tributaries.push(source_descriptor(
                base_dir,
                trib.name.clone(),
                trib.i,
                trib.froude,
                trib.width,
                trib.angle_deg,
                trib.z_target,
                &trib.schedule,
            )?);
        }

        for pin in &self.point_inflows {
            dom.point_inflows.push(source_descriptor(
                base_dir,
                pin.name.clone(),
                pin.i,
                pin.froude,
                pin.width,
                pin.angle_deg,
                pin.z_target,
                &pin.schedule,
            )?);
        }

        for pout in &self.point_outflows {
            dom.point_outflows.push(source_descriptor(
                base_dir,
                pout.name.clone(),
                pout.i,
                pout.froude,
                pout.width,
                pout.angle_deg,
                pout.z_target,
                &pout.schedule,
            )?);
        }

        for pipe in &self.water_pipes {
            let series = match (&pipe.schedule, pipe.owns_schedule) {
                (Some(path), true) => Some(read_timeseries(&resolve(base_dir, path))?),
                _ => None,
            };
            dom.water_pipes.push(WaterPipeDescriptor {
                base: SourceDescriptor {
                    name: pipe.name.clone(),
                    i: pipe.i,
                    froude: pipe.froude,
                    width: pipe.width,
                    angle_deg: pipe.angle_deg,
                    z_target: None,
                    series,
                },
                other_domain: pipe.other_domain,
                owns_schedule: pipe.owns_schedule,
            });
        }

        for cnf in &self.confluences {
            dom.confluences.push(ConfluenceDescriptor {
                base: SourceDescriptor {
                    name: cnf.name.clone(),
                    i: cnf.i,
                    froude: 1.0,
                    width: 0.0,
                    angle_deg: 0.0,
                    z_target: None,
                    series: None,
                },
                other_domain: cnf.other_domain,
            });
        }

        for f in &self.fences {
            dom.fences.push(Fence { i_fnc: f.i_fnc, k_low: f.k_low, k_high: f.k_high, floating: f.floating, width: f.width });
        }

        dom.t.fill(self.initial_temp_c);
        Ok(dom)
    }
}

impl RunConfig {
    /// Build every configured domain, validating the particle-class Stokes
    /// regime once up front (§4.S) since it depends on no per-domain state.
    pub fn build_domains(&self, base_dir: &Path) -> Result<Vec<Domain>> {
        validate_particle_classes(&self.particles.classes, 20.0, crate::density::rho_water(20.0))?;
        let nps = self.particles.nps;
        self.domains
            .iter()
            .enumerate()
            .map(|(idx, dc)| {
                let mut dom = dc.build(idx + 1, base_dir)?;
                if nps > 0 {
                    let nx = dom.mesh.nx;
                    let nz = dom.mesh.nz;
                    dom.nps = nps;
                    dom.c = vec![0.0; nps * (nx + 2) * (nz + 2)];
                    dom.c_sed = vec![0.0; nps * (nx + 1)];
                }
                Ok(dom)
            })
            .collect()
    }
}
