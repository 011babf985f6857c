//! Geometry file reader (§4.R, §6): `nx nz` header, node lists `x[i]
//! z_bed[i]` and `z[k]`, and the width matrix `b[i,k]`, parsed
//! whitespace-delimited exactly as the format is specified — no
//! general-purpose parsing crate is warranted for a fixed-shape text table.

use crate::error::{Result, StratflowError};
use crate::mesh::Mesh;
use std::io::Read;
use std::path::Path;

fn tokens(text: &str) -> impl Iterator<Item = &str> {
    text.split_whitespace()
}

fn next_f64<'a>(it: &mut impl Iterator<Item = &'a str>, what: &str) -> Result<f64> {
    let tok = it.next().ok_or_else(|| StratflowError::io(format!("geometry file truncated reading {what}")))?;
    tok.parse::<f64>()
        .map_err(|e| StratflowError::io(format!("geometry file: bad {what} value {tok:?}: {e}")))
}

fn next_usize<'a>(it: &mut impl Iterator<Item = &'a str>, what: &str) -> Result<usize> {
    let tok = it.next().ok_or_else(|| StratflowError::io(format!("geometry file truncated reading {what}")))?;
    tok.parse::<usize>()
        .map_err(|e| StratflowError::io(format!("geometry file: bad {what} value {tok:?}: {e}")))
}

/// Read a geometry file and build its [`Mesh`].
pub fn read_geometry(path: &Path) -> Result<Mesh> {
    let mut text = String::new();
    std::fs::File::open(path)
        .map_err(|e| StratflowError::io(format!("opening geometry {}: {e}", path.display())))?
        .read_to_string(&mut text)
        .map_err(|e| StratflowError::io(format!("reading geometry {}: {e}", path.display())))?;
    parse_geometry(&text)
}

fn parse_geometry(text: &str) -> Result<Mesh> {
    let mut it = tokens(text);
    let nx = next_usize(&mut it, "nx")?;
    let nz = next_usize(&mut it, "nz")?;

    let mut x = Vec::with_capacity(nx + 1);
    let mut z_bed = Vec::with_capacity(nx + 1);
    for i in 0..=nx {
        x.push(next_f64(&mut it, &format!("x[{i}]"))?);
        z_bed.push(next_f64(&mut it, &format!("z_bed[{i}]"))?);
    }

    let mut z = Vec::with_capacity(nz + 1);
    for k in 0..=nz {
        z.push(next_f64(&mut it, &format!("z[{k}]"))?);
    }

    let mut b = vec![0.0; (nx + 1) * (nz + 1)];
    for k in 0..=nz {
        for i in 0..=nx {
            b[k * (nx + 1) + i] = next_f64(&mut it, &format!("b[{i},{k}]"))?;
        }
    }

    Mesh::build(x, z, b, z_bed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_a_flat_rectangular_geometry() {
        let nx = 2;
        let nz = 3;
        let mut text = format!("{nx} {nz}\n");
        for i in 0..=nx {
            text += &format!("{} {}\n", i as f64 * 10.0, 0.0);
        }
        for k in 0..=nz {
            text += &format!("{}\n", k as f64 * 2.0);
        }
        for _k in 0..=nz {
            for _i in 0..=nx {
                text += "5.0 ";
            }
            text += "\n";
        }
        let mesh = parse_geometry(&text).unwrap();
        assert_eq!(mesh.nx, nx);
        assert_eq!(mesh.nz, nz);
    }

    #[test]
    fn rejects_a_truncated_file() {
        assert!(parse_geometry("2 3\n0.0 0.0\n10.0").is_err());
    }
}
