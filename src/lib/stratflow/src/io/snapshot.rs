//! Binary snapshot reader/writer (§6): header tuple `time_day total_vol
//! z_srf k_srf n_fnc i_fncs k_fncs`, then the dense fields in fixed order
//! `u, w, rho, p, T, c, c_sed, dhz, dmx, dmz`. Restart loading reproduces
//! every field sum bit-for-bit modulo floating rounding.
//!
//! The crate's own `Domain` carries temperature and per-class suspended
//! solids instead of a separate generic tracer, so the optional trailing
//! `scalar` channel named in §6 is not written.

use crate::domain::Domain;
use crate::error::{Result, StratflowError};
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::io::{Read, Write};

fn io_err(e: std::io::Error) -> crate::error::StratflowError {
    StratflowError::io(e.to_string())
}

fn write_vec<W: Write>(w: &mut W, data: &[f64]) -> Result<()> {
    w.write_u64::<LittleEndian>(data.len() as u64).map_err(io_err)?;
    for &v in data {
        w.write_f64::<LittleEndian>(v).map_err(io_err)?;
    }
    Ok(())
}

fn read_vec<R: Read>(r: &mut R) -> Result<Vec<f64>> {
    let n = r.read_u64::<LittleEndian>().map_err(io_err)? as usize;
    let mut out = Vec::with_capacity(n);
    for _ in 0..n {
        out.push(r.read_f64::<LittleEndian>().map_err(io_err)?);
    }
    Ok(out)
}

fn read_vec_into<R: Read>(r: &mut R, dst: &mut Vec<f64>) -> Result<()> {
    let v = read_vec(r)?;
    if v.len() != dst.len() {
        return Err(StratflowError::io(format!(
            "snapshot field length {} does not match domain layout {}",
            v.len(),
            dst.len()
        )));
    }
    *dst = v;
    Ok(())
}

/// Write one domain's restart snapshot at `time_day`.
pub fn write_snapshot<W: Write>(w: &mut W, dom: &Domain, time_day: f64) -> Result<()> {
    w.write_f64::<LittleEndian>(time_day).map_err(io_err)?;
    w.write_f64::<LittleEndian>(dom.mesh.total_vol).map_err(io_err)?;
    w.write_f64::<LittleEndian>(dom.mesh.z_srf).map_err(io_err)?;
    w.write_u64::<LittleEndian>(dom.mesh.k_srf as u64).map_err(io_err)?;

    w.write_u64::<LittleEndian>(dom.fences.len() as u64).map_err(io_err)?;
    for f in &dom.fences {
        w.write_u64::<LittleEndian>(f.i_fnc as u64).map_err(io_err)?;
    }
    for f in &dom.fences {
        w.write_u64::<LittleEndian>(f.k_low as u64).map_err(io_err)?;
        w.write_u64::<LittleEndian>(f.k_high as u64).map_err(io_err)?;
    }

    w.write_u64::<LittleEndian>(dom.nps as u64).map_err(io_err)?;

    write_vec(w, &dom.u)?;
    write_vec(w, &dom.w)?;
    write_vec(w, &dom.density.rho)?;
    write_vec(w, &dom.density.p)?;
    write_vec(w, &dom.t)?;
    write_vec(w, &dom.c)?;
    write_vec(w, &dom.c_sed)?;
    write_vec(w, &dom.turb.dhz)?;
    write_vec(w, &dom.turb.dmx)?;
    write_vec(w, &dom.turb.dmz)?;
    Ok(())
}

/// Read a restart snapshot into an already-constructed `Domain` (built from
/// config + geometry), restoring its dynamic state and returning the
/// snapshot's simulated time in days.
pub fn read_snapshot<R: Read>(r: &mut R, dom: &mut Domain) -> Result<f64> {
    let time_day = r.read_f64::<LittleEndian>().map_err(io_err)?;
    let total_vol = r.read_f64::<LittleEndian>().map_err(io_err)?;
    let z_srf = r.read_f64::<LittleEndian>().map_err(io_err)?;
    let _k_srf = r.read_u64::<LittleEndian>().map_err(io_err)?;

    let n_fnc = r.read_u64::<LittleEndian>().map_err(io_err)? as usize;
    if n_fnc != dom.fences.len() {
        return Err(StratflowError::io(format!(
            "snapshot has {n_fnc} fences but domain config declares {}",
            dom.fences.len()
        )));
    }
    let mut i_fncs = Vec::with_capacity(n_fnc);
    for _ in 0..n_fnc {
        i_fncs.push(r.read_u64::<LittleEndian>().map_err(io_err)? as usize);
    }
    for (f, i_fnc) in dom.fences.iter_mut().zip(i_fncs) {
        f.i_fnc = i_fnc;
        f.k_low = r.read_u64::<LittleEndian>().map_err(io_err)? as usize;
        f.k_high = r.read_u64::<LittleEndian>().map_err(io_err)? as usize;
    }

    let nps = r.read_u64::<LittleEndian>().map_err(io_err)? as usize;
    if nps != dom.nps {
        return Err(StratflowError::io(format!("snapshot has nps={nps} but domain config declares nps={}", dom.nps)));
    }

    read_vec_into(r, &mut dom.u)?;
    read_vec_into(r, &mut dom.w)?;
    read_vec_into(r, &mut dom.density.rho)?;
    read_vec_into(r, &mut dom.density.p)?;
    read_vec_into(r, &mut dom.t)?;
    read_vec_into(r, &mut dom.c)?;
    read_vec_into(r, &mut dom.c_sed)?;
    read_vec_into(r, &mut dom.turb.dhz)?;
    read_vec_into(r, &mut dom.turb.dmx)?;
    read_vec_into(r, &mut dom.turb.dmz)?;

    dom.mesh.update_surface_layer(z_srf)?;
    dom.mesh.total_vol = total_vol;
    Ok(time_day)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{InflowMode, InletDescriptor, SourceDescriptor};
    use crate::mesh::Mesh;
    use crate::turbulence::TurbulenceConfig;

    fn test_domain() -> Domain {
        let nx = 3;
        let nz = 6;
        let x: Vec<f64> = (0..=nx).map(|i| i as f64 * 10.0).collect();
        let z: Vec<f64> = (0..=nz).map(|k| k as f64 * 2.0).collect();
        let b = vec![5.0; (nx + 1) * (nz + 1)];
        let z_bed = vec![0.0; nx + 1];
        let mut mesh = Mesh::build(x, z, b, z_bed).unwrap();
        mesh.update_surface_layer(9.0).unwrap();
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
        let mut dom = Domain::new(1, "d1", mesh, 2, 2650.0, inlet, TurbulenceConfig::default());
        for (i, v) in dom.u.iter_mut().enumerate() {
            *v = i as f64 * 0.01;
        }
        dom
    }

    #[test]
    fn snapshot_round_trips_bit_for_bit() {
        let dom = test_domain();
        let mut buf = Vec::new();
        write_snapshot(&mut buf, &dom, 1.5).unwrap();

        let mut restored = test_domain();
        restored.u.fill(0.0);
        let time_day = read_snapshot(&mut &buf[..], &mut restored).unwrap();

        assert_eq!(time_day, 1.5);
        assert_eq!(restored.u, dom.u);
        assert_eq!(restored.mesh.z_srf, dom.mesh.z_srf);
        assert_eq!(restored.mesh.total_vol, dom.mesh.total_vol);
    }

    #[test]
    fn rejects_mismatched_field_length() {
        let dom = test_domain();
        let mut buf = Vec::new();
        write_snapshot(&mut buf, &dom, 0.0).unwrap();

        let x: Vec<f64> = (0..=5).map(|i| i as f64 * 10.0).collect();
        let z: Vec<f64> = (0..=6).map(|k| k as f64 * 2.0).collect();
        let b = vec![5.0; (5 + 1) * (6 + 1)];
        let z_bed = vec![0.0; 5 + 1];
        let mesh = Mesh::build(x, z, b, z_bed).unwrap();
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
        let mut other = Domain::new(2, "d2", mesh, 2, 2650.0, inlet, TurbulenceConfig::default());
        assert!(read_snapshot(&mut &buf[..], &mut other).is_err());
    }
}
