//! Top-level step loop (§5): `parallel(B) -> barrier -> single-thread(C) ->
//! parallel(M,H,S,D,T) -> barrier`, CFL evaluation, and the diagnostics/
//! exceed-log bookkeeping a runnable crate needs around the core.

use crate::boundary::{build_boundary_sources, BoundarySources};
use crate::config::RunConfig;
use crate::coupler::step_coupler;
use crate::density::rho_water;
use crate::domain::Domain;
use crate::error::{Result, StratflowError};
use crate::heat::{step_heat, Meteo};
use crate::momentum::step_momentum;
use crate::solids::step_solids;
use crate::turbulence::{update_k_epsilon, update_richardson, TurbulenceMode};
use rayon::prelude::*;

/// Per-step summary (§3 [SUPPLEMENT]): cheap enough to compute every step,
/// feeds the exceed log and snapshot headers.
#[derive(Clone, Debug)]
pub struct StepDiagnostics {
    pub step: u64,
    pub time_day: f64,
    pub u_min: f64,
    pub u_max: f64,
    pub t_min: f64,
    pub t_max: f64,
    pub cfl_dt_max: f64,
}

fn field_min_max(data: &[f64]) -> (f64, f64) {
    data.iter().fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| (lo.min(v), hi.max(v)))
}

/// CFL bound (§5 last paragraph): `dt <= min(dx/|u|, dx^2/(2*dmx),
/// dz/|w - w_ss|, dz^2/(2*dmz))` over every wet cell, folding in the
/// fastest particle-settling velocity configured for the run.
pub fn cfl_dt_max(dom: &Domain, w_ss_max: f64) -> f64 {
    let nx = dom.mesh.nx;
    let nz = dom.mesh.nz;
    let k_srf = dom.mesh.k_srf.max(1);
    let mut dt_max = f64::INFINITY;

    for k in 1..=k_srf {
        for i in 0..=nx {
            let u = dom.u_at(i, k).abs();
            let dx = dom.mesh.dx[i.clamp(1, nx)];
            if u > 1e-9 {
                dt_max = dt_max.min(dx / u);
            }
            let ic = i.clamp(1, nx);
            let dmx = dom.turb.dmx_at(nx, ic, k);
            if dmx > 1e-12 {
                dt_max = dt_max.min(dx * dx / (2.0 * dmx));
            }
        }
    }

    for i in 1..=nx {
        for k in 0..=k_srf {
            let w = (dom.w_at(i, k) - w_ss_max).abs();
            let dz = dom.mesh.dz[k.clamp(1, nz)];
            if w > 1e-9 {
                dt_max = dt_max.min(dz / w);
            }
            let dmz = dom.turb.dmz_at(nx, i, k);
            if dmz > 1e-12 {
                dt_max = dt_max.min(dz * dz / (2.0 * dmz));
            }
        }
    }

    dt_max
}

/// A running simulation: the ordered domain sequence, its control
/// configuration, and the clock.
pub struct Simulation {
    pub domains: Vec<Domain>,
    pub config: RunConfig,
    pub meteo: Meteo,
    pub time_day: f64,
    pub step: u64,
}

impl Simulation {
    pub fn new(domains: Vec<Domain>, config: RunConfig, meteo: Meteo) -> Simulation {
        Simulation { domains, config, meteo, time_day: 0.0, step: 0 }
    }

    fn dt_days(&self) -> f64 {
        self.config.dt_sec / 86400.0
    }

    fn max_settling_velocity(&self) -> f64 {
        let rho_w = rho_water(20.0);
        self.config
            .particles
            .classes
            .iter()
            .map(|c| crate::solids::settling_velocity(c, 20.0, rho_w).abs())
            .fold(0.0, f64::max)
    }

    /// Advance every domain by one step, returning each domain's
    /// diagnostics in domain order.
    pub fn step(&mut self) -> Result<Vec<StepDiagnostics>> {
        let t_days = self.time_day;
        let step = self.step;
        let dt_days = self.dt_days();
        let dt_sec = self.config.dt_sec;
        let w_ss_max = self.max_settling_velocity();

        let sources: Vec<BoundarySources> = self
            .domains
            .par_iter()
            .map(|dom| build_boundary_sources(dom, t_days, step))
            .collect::<Result<Vec<_>>>()?;

        let cfl_bounds: Vec<(usize, f64)> =
            self.domains.par_iter().map(|dom| (dom.id, cfl_dt_max(dom, w_ss_max))).collect();
        if self.config.fixed_dt {
            if let Some(&(domain, dt_max)) =
                cfl_bounds.iter().min_by(|a, b| a.1.partial_cmp(&b.1).unwrap())
            {
                if dt_sec > dt_max {
                    return Err(StratflowError::Cfl { domain, step, configured_dt: dt_sec, dt_max });
                }
            }
        }

        step_coupler(&mut self.domains, &sources, dt_days, step)?;

        let momentum_opts = self.config.momentum;
        let heat_opts = self.config.heat;
        let meteo = self.meteo;
        let particles = self.config.particles.classes.clone();

        self.domains.par_iter_mut().zip(sources.par_iter()).try_for_each(|(dom, src)| -> Result<()> {
            step_momentum(dom, src, dt_days, &momentum_opts)?;

            // M, H and S are independent per §5; H and S run sequentially
            // here rather than on split sub-borrows of one Domain, which
            // would need unsafe or a field-split wrapper type for little
            // benefit at 1-10 domains — the outer per-domain par_iter_mut
            // is where the real concurrency payoff is.
            step_heat(dom, src, dt_days, &heat_opts, &meteo)?;
            let rho_w = {
                let k_srf = dom.mesh.k_srf.max(1);
                dom.density.rho_avg.get(k_srf).copied().unwrap_or(999.855)
            };
            for (l, class) in particles.iter().enumerate() {
                step_solids(dom, src, dt_days, l + 1, class, rho_w)?;
            }

            let c_total = dom.c_total_g_m3();
            dom.density.update(&dom.mesh, &dom.t, &c_total, dom.rho_ss);

            match dom.turbulence_config.mode {
                TurbulenceMode::Richardson => update_richardson(dom)?,
                TurbulenceMode::KEpsilon => update_k_epsilon(dom, dt_days, meteo.wind_speed_m_s)?,
            }

            dom.check_invariants(step)?;
            Ok(())
        })?;

        let diagnostics = self
            .domains
            .iter()
            .zip(cfl_bounds.iter())
            .map(|(dom, &(_, dt_max))| {
                let (u_min, u_max) = field_min_max(&dom.u);
                let (t_min, t_max) = field_min_max(&dom.t);
                StepDiagnostics { step, time_day: t_days, u_min, u_max, t_min, t_max, cfl_dt_max: dt_max }
            })
            .collect();

        self.time_day += dt_days;
        self.step += 1;
        Ok(diagnostics)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ParticleSpec, RunConfig};
    use crate::domain::{InflowMode, InletDescriptor, SourceDescriptor};
    use crate::heat::HeatOptions;
    use crate::mesh::Mesh;
    use crate::momentum::MomentumOptions;
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
        let mut dom = Domain::new(id, format!("d{id}"), mesh, 0, 2650.0, inlet, TurbulenceConfig::default());
        dom.q_col = vec![0.0; nx + 1];
        dom
    }

    fn minimal_config() -> RunConfig {
        RunConfig {
            ndom: 1,
            restart: false,
            restart_snapshot_id: None,
            fixed_dt: false,
            dt_sec: 60.0,
            it_max: 10,
            snapshot_interval: 100,
            output_interval: 100,
            momentum: MomentumOptions::default(),
            heat: HeatOptions::default(),
            particles: ParticleSpec::default(),
            meteorology_path: None,
            domains: Vec::new(),
        }
    }

    #[test]
    fn equilibrium_rest_stays_at_rest_for_many_steps() {
        let dom = flat_domain(1);
        let config = minimal_config();
        let meteo = Meteo { air_temp_c: 20.0, wind_speed_m_s: 0.0, solar_w_m2: 0.0, rel_humidity: 0.5 };
        let mut sim = Simulation::new(vec![dom], config, meteo);
        for _ in 0..20 {
            sim.step().unwrap();
        }
        let u_abs_max = sim.domains[0].u.iter().fold(0.0_f64, |m, &v| m.max(v.abs()));
        assert!(u_abs_max < 1e-6);
    }

    #[test]
    fn cfl_dt_max_is_finite_for_a_moving_column() {
        let mut dom = flat_domain(1);
        for v in dom.u.iter_mut() {
            *v = 0.5;
        }
        let dt_max = cfl_dt_max(&dom, 0.0);
        assert!(dt_max.is_finite());
        assert!(dt_max > 0.0);
    }

    #[test]
    fn fixed_dt_exceeding_cfl_bound_is_rejected() {
        let mut dom = flat_domain(1);
        for v in dom.u.iter_mut() {
            *v = 100.0;
        }
        let mut config = minimal_config();
        config.fixed_dt = true;
        config.dt_sec = 1e6;
        let meteo = Meteo { air_temp_c: 20.0, wind_speed_m_s: 0.0, solar_w_m2: 0.0, rel_humidity: 0.5 };
        let mut sim = Simulation::new(vec![dom], config, meteo);
        assert!(sim.step().is_err());
    }
}
