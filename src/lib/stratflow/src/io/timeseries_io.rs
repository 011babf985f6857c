//! Time-series schedule reader (§6): header row naming the variables, then
//! rows `t v1 v2 ... vN`, times strictly monotonic.

use crate::error::{Result, StratflowError};
use crate::timeseries::TimeSeries;
use std::path::Path;

/// Read a boundary schedule file into a [`TimeSeries`].
pub fn read_timeseries(path: &Path) -> Result<TimeSeries> {
    let text = std::fs::read_to_string(path)
        .map_err(|e| StratflowError::io(format!("reading time series {}: {e}", path.display())))?;
    parse_timeseries(&text)
}

fn parse_timeseries(text: &str) -> Result<TimeSeries> {
    let mut lines = text.lines().filter(|l| !l.trim().is_empty());
    let header = lines
        .next()
        .ok_or_else(|| StratflowError::io("time series file has no header row"))?;
    let n_vars = header.split_whitespace().count().saturating_sub(1);

    let mut time = Vec::new();
    let mut vars: Vec<Vec<f64>> = vec![Vec::new(); n_vars];
    for (row_no, line) in lines.enumerate() {
        let mut cols = line.split_whitespace();
        let t = cols
            .next()
            .ok_or_else(|| StratflowError::io(format!("time series row {row_no} missing time column")))?
            .parse::<f64>()
            .map_err(|e| StratflowError::io(format!("time series row {row_no}: bad time value: {e}")))?;
        time.push(t);
        for (vi, slot) in vars.iter_mut().enumerate() {
            let v = cols
                .next()
                .ok_or_else(|| StratflowError::io(format!("time series row {row_no} missing column {vi}")))?
                .parse::<f64>()
                .map_err(|e| StratflowError::io(format!("time series row {row_no} column {vi}: {e}")))?;
            slot.push(v);
        }
    }

    TimeSeries::new(time, vars)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_header_and_rows() {
        let text = "t Q T\n0.0 1.0 20.0\n10.0 2.0 21.0\n";
        let ts = parse_timeseries(text).unwrap();
        assert_eq!(ts.n_vars(), 2);
        assert_eq!(ts.n_rows(), 2);
    }

    #[test]
    fn rejects_non_monotonic_time() {
        let text = "t Q\n0.0 1.0\n0.0 2.0\n";
        assert!(parse_timeseries(text).is_err());
    }
}
