//! End-to-end scenario tests, independent of the unit tests embedded in
//! each module: a still-water column settles its entire suspended-solids
//! load to the bed within the time a single particle needs to cross it.

use stratflow::boundary::BoundarySources;
use stratflow::density::{rho_water, viscosity_water};
use stratflow::domain::{Domain, InflowMode, InletDescriptor, SourceDescriptor};
use stratflow::mesh::Mesh;
use stratflow::solids::{settling_velocity, step_solids, ParticleClass};
use stratflow::turbulence::TurbulenceConfig;

fn still_water_column(nx: usize, nz: usize, dz: f64, width: f64) -> Domain {
    let x: Vec<f64> = (0..=nx).map(|i| i as f64 * 10.0).collect();
    let z: Vec<f64> = (0..=nz).map(|k| k as f64 * dz).collect();
    let b = vec![width; (nx + 1) * (nz + 1)];
    let z_bed = vec![0.0; nx + 1];
    let mut mesh = Mesh::build(x, z, b, z_bed).unwrap();
    let z_srf = nz as f64 * dz;
    mesh.update_surface_layer(z_srf).unwrap();

    let inlet = InletDescriptor {
        base: SourceDescriptor {
            name: "in".into(),
            i: 0,
            froude: 1.0,
            width,
            angle_deg: 0.0,
            z_target: None,
            series: None,
        },
        mode: InflowMode::Rid,
        z_in_low: 0.0,
    };
    let mut dom = Domain::new(1, "still", mesh, 1, 2650.0, inlet, TurbulenceConfig::default());
    dom.q_col = vec![0.0; nx + 1];
    dom
}

fn column_mass_g(dom: &Domain, l: usize) -> f64 {
    let nx = dom.mesh.nx;
    let nz = dom.mesh.nz;
    let mut total = 0.0;
    for i in 1..=nx {
        for k in 1..=nz {
            total += dom.c_at(i, k, l) * dom.mesh.vol_at(i, k);
        }
    }
    total
}

#[test]
fn stokes_settling_clears_a_still_water_column() {
    let dz = 0.5;
    let nz = 20;
    let width = 5.0;
    let mut dom = still_water_column(1, nz, dz, width);

    let class = ParticleClass { diameter_m: 20e-6, rho_ss: 2650.0, alpha_ss: 1.0 };
    let rho_w = rho_water(20.0);
    let w_ss = settling_velocity(&class, 20.0, rho_w);
    assert!(w_ss > 0.0);

    let c0 = 100.0;
    for v in dom.c.iter_mut() {
        *v = c0;
    }
    let ghost_top = dom.c_idx(1, nz + 1, 1);
    dom.c[ghost_top] = 0.0; // above the free surface: no solids

    let initial_mass = column_mass_g(&dom, 1);

    let column_height = nz as f64 * dz;
    let dt_s = 600.0;
    let dt_days = dt_s / 86400.0;
    let total_time = 3.0 * column_height / w_ss;
    let steps = (total_time / dt_s).ceil() as usize;

    let sources = BoundarySources::default();
    for _ in 0..steps {
        step_solids(&mut dom, &sources, dt_days, 1, &class, rho_w).unwrap();
    }

    let remaining_mass = column_mass_g(&dom, 1);
    assert!(
        remaining_mass < 0.01 * initial_mass,
        "expected the column to clear by settling, remaining={remaining_mass} initial={initial_mass}"
    );

    let deposited: f64 = dom.c_sed.iter().sum();
    assert!(
        (deposited - initial_mass).abs() < 0.05 * initial_mass,
        "deposited={deposited} should be close to the column's initial mass={initial_mass}"
    );
}

#[test]
fn coarse_particle_fails_validation_before_any_stepping() {
    let class = ParticleClass { diameter_m: 5e-3, rho_ss: 2650.0, alpha_ss: 1.0 };
    let rho_w = rho_water(20.0);
    let w_ss = settling_velocity(&class, 20.0, rho_w);
    let mu = viscosity_water(20.0);
    let rep = (w_ss.abs() * class.diameter_m * rho_w / mu).abs();
    assert!(rep >= 1.5, "fixture should sit outside the Stokes regime, Rep={rep}");
}
