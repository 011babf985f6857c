//! CLI front end (§4.R): `run`, `validate`, `resume`. Thin by design — it
//! exists so the solver core is exercised end to end, not as a feature
//! surface of its own.

use clap::{Parser, Subcommand};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use stratflow::config::RunConfig;
use stratflow::error::StratflowError;
use stratflow::heat::{meteo_from_series, Meteo};
use stratflow::io::output::{write_probe_row, write_step_row, ExceedLog};
use stratflow::io::snapshot::{read_snapshot, write_snapshot};
use stratflow::io::timeseries_io::read_timeseries;
use stratflow::simulation::Simulation;
use tracing::{error, info, warn};

#[derive(Parser)]
#[command(name = "stratflow", about = "2-D longitudinal-vertical hydro-thermodynamic solver")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Load a run config and step it to `it_max`, writing snapshots and
    /// per-step outputs at the configured cadence.
    Run {
        config: PathBuf,
        #[arg(long, default_value = "out")]
        out_dir: PathBuf,
    },
    /// Load config + geometry, run the invariant checks once, and exit
    /// without stepping.
    Validate { config: PathBuf },
    /// Resume every domain from its snapshot in `snapshot_dir` (written by
    /// `run`/`resume` as `snapshot_<domain>_<step>.bin`) and continue to
    /// `it_max`.
    Resume {
        config: PathBuf,
        snapshot_dir: PathBuf,
        #[arg(long, default_value = "out")]
        out_dir: PathBuf,
    },
}

fn init_logging() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();
}

fn load_meteo(config: &RunConfig, base_dir: &Path) -> Result<Option<stratflow::timeseries::TimeSeries>, StratflowError> {
    match &config.meteorology_path {
        Some(path) => Ok(Some(read_timeseries(&base_dir.join(path))?)),
        None => Ok(None),
    }
}

fn meteo_at(series: &Option<stratflow::timeseries::TimeSeries>, t_days: f64) -> Meteo {
    match series {
        Some(s) => meteo_from_series(s, t_days),
        None => Meteo { air_temp_c: 20.0, wind_speed_m_s: 0.0, solar_w_m2: 0.0, rel_humidity: 0.5 },
    }
}

fn run_loop(config: RunConfig, base_dir: &Path, out_dir: &Path, start_step: u64, start_time_day: f64, domains: Vec<stratflow::domain::Domain>) -> Result<(), StratflowError> {
    std::fs::create_dir_all(out_dir).map_err(|e| StratflowError::io(e.to_string()))?;
    let meteo_series = load_meteo(&config, base_dir)?;
    let meteo = meteo_at(&meteo_series, start_time_day);
    let it_max = config.it_max;
    let snapshot_interval = config.snapshot_interval;
    let output_interval = config.output_interval;
    let probes: Vec<_> = config.domains.iter().map(|d| d.probes.clone()).collect();

    let mut sim = Simulation::new(domains, config, meteo);
    sim.step = start_step;
    sim.time_day = start_time_day;

    let step_path = out_dir.join("step_output.txt");
    let probe_path = out_dir.join("probes.txt");
    let exceed_path = out_dir.join("exceed_log.txt");
    let mut step_w = BufWriter::new(File::create(&step_path).map_err(|e| StratflowError::io(e.to_string()))?);
    let mut probe_w = BufWriter::new(File::create(&probe_path).map_err(|e| StratflowError::io(e.to_string()))?);
    let mut exceed_w = BufWriter::new(File::create(&exceed_path).map_err(|e| StratflowError::io(e.to_string()))?);
    let mut exceed_log = ExceedLog::new();

    while sim.step < it_max {
        sim.meteo = meteo_at(&meteo_series, sim.time_day);
        match sim.step() {
            Ok(diagnostics) => {
                for diag in &diagnostics {
                    if diag.u_max.abs() > 50.0 || diag.t_max > 60.0 {
                        warn!(step = diag.step, u_max = diag.u_max, t_max = diag.t_max, "numerical anomaly watch");
                    }
                }
            }
            Err(e) => {
                error!(error = %e, "fatal error, aborting run");
                step_w.flush().ok();
                probe_w.flush().ok();
                exceed_w.flush().ok();
                return Err(e);
            }
        }

        if sim.step % output_interval.max(1) == 0 {
            for (idx, dom) in sim.domains.iter().enumerate() {
                let sources = stratflow::boundary::build_boundary_sources(dom, sim.time_day, sim.step)?;
                write_step_row(&mut step_w, dom, &sources, sim.time_day)?;
                let empty = Vec::new();
                write_probe_row(&mut probe_w, dom, probes.get(idx).unwrap_or(&empty), sim.time_day)?;
                exceed_log.check_and_log(&mut exceed_w, dom, sim.step)?;
            }
            info!(step = sim.step, time_day = sim.time_day, "wrote step output");
        }

        if sim.step % snapshot_interval.max(1) == 0 {
            for dom in &sim.domains {
                let path = out_dir.join(format!("snapshot_{}_{:010}.bin", dom.name, sim.step));
                let mut f = BufWriter::new(File::create(&path).map_err(|e| StratflowError::io(e.to_string()))?);
                write_snapshot(&mut f, dom, sim.time_day)?;
            }
            info!(step = sim.step, "wrote snapshot");
        }
    }

    step_w.flush().map_err(|e| StratflowError::io(e.to_string()))?;
    probe_w.flush().map_err(|e| StratflowError::io(e.to_string()))?;
    exceed_w.flush().map_err(|e| StratflowError::io(e.to_string()))?;
    Ok(())
}

fn run(config_path: &Path, out_dir: &Path) -> Result<(), StratflowError> {
    let config = RunConfig::load(config_path)?;
    let base_dir = config_path.parent().unwrap_or_else(|| Path::new("."));
    let domains = config.build_domains(base_dir)?;
    info!(ndom = domains.len(), "starting run");
    run_loop(config, base_dir, out_dir, 0, 0.0, domains)
}

fn validate(config_path: &Path) -> Result<(), StratflowError> {
    let config = RunConfig::load(config_path)?;
    let base_dir = config_path.parent().unwrap_or_else(|| Path::new("."));
    let domains = config.build_domains(base_dir)?;
    for dom in &domains {
        dom.check_invariants(0)?;
    }
    info!(ndom = domains.len(), "config and geometry validated");
    Ok(())
}

fn resume(config_path: &Path, snapshot_dir: &Path, out_dir: &Path) -> Result<(), StratflowError> {
    let config = RunConfig::load(config_path)?;
    let base_dir = config_path.parent().unwrap_or_else(|| Path::new("."));
    let mut domains = config.build_domains(base_dir)?;
    let step = config.restart_snapshot_id.unwrap_or(0);
    let mut time_day = 0.0;
    for dom in &mut domains {
        let path = snapshot_dir.join(format!("snapshot_{}_{:010}.bin", dom.name, step));
        let mut f = File::open(&path).map_err(|e| StratflowError::io(format!("{}: {e}", path.display())))?;
        time_day = read_snapshot(&mut f, dom)?;
    }
    info!(time_day, step, "resumed from snapshot");
    run_loop(config, base_dir, out_dir, step, time_day, domains)
}

fn main() -> ExitCode {
    init_logging();
    let cli = Cli::parse();
    let result = match &cli.command {
        Command::Run { config, out_dir } => run(config, out_dir),
        Command::Validate { config } => validate(config),
        Command::Resume { config, snapshot_dir, out_dir } => resume(config, snapshot_dir, out_dir),
    };
    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "aborting");
            ExitCode::FAILURE
        }
    }
}
