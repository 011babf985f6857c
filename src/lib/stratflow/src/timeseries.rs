use crate::error::{Result, StratflowError};

/// A monotonically increasing time axis with row-aligned variable columns.
///
/// Mirrors the boundary-schedule file contract of §6: a header row names the
/// variables, each subsequent row is `t v1 v2 ... vN`. Lookup is evaluated at
/// a query time via linear interpolation between bracketing rows; `i_curr`
/// remembers the last bracket found so that repeated queries with
/// monotonically increasing time (the common case — one query per step) stay
/// O(1) instead of re-scanning from the start.
#[derive(Clone, Debug)]
pub struct TimeSeries {
    time: Vec<f64>,
    vars: Vec<Vec<f64>>,
    i_curr: std::cell::Cell<usize>,
}

impl TimeSeries {
    pub fn new(time: Vec<f64>, vars: Vec<Vec<f64>>) -> Result<Self> {
        if time.len() < 1 {
            return Err(StratflowError::config("time series must have at least one row"));
        }
        for row in &vars {
            if row.len() != time.len() {
                return Err(StratflowError::config(
                    "time series variable column length does not match time column",
                ));
            }
        }
        for w in time.windows(2) {
            if w[1] <= w[0] {
                return Err(StratflowError::config(
                    "time series column must be strictly monotonically increasing",
                ));
            }
        }
        Ok(TimeSeries {
            time,
            vars,
            i_curr: std::cell::Cell::new(0),
        })
    }

    pub fn n_vars(&self) -> usize {
        self.vars.len()
    }

    pub fn n_rows(&self) -> usize {
        self.time.len()
    }

    /// Linearly interpolate every variable at `t`. Clamps to the first/last
    /// row outside the series range rather than treating it as a hard error —
    /// callers that need the strict §7 `DomainError` for an out-of-range
    /// query use [`TimeSeries::value_strict`].
    pub fn value(&self, t: f64) -> Vec<f64> {
        let (lo, frac) = self.bracket(t);
        self.vars
            .iter()
            .map(|col| col[lo] + frac * (col[lo + 1] - col[lo]))
            .collect()
    }

    pub fn value_strict(&self, t: f64) -> Result<Vec<f64>> {
        if t < self.time[0] || t > *self.time.last().unwrap() {
            return Err(StratflowError::config(format!(
                "interpolated time t={t} out of series range [{}, {}]",
                self.time[0],
                self.time.last().unwrap()
            )));
        }
        Ok(self.value(t))
    }

    /// Locate the bracket `[time[i], time[i+1]]` containing `t`, returning the
    /// lower index and the fractional position within it. Advances the cached
    /// cursor forward or backward from its last position, which keeps
    /// sequential (monotone) queries linear-time overall.
    fn bracket(&self, t: f64) -> (usize, f64) {
        let n = self.time.len();
        if n == 1 || t <= self.time[0] {
            self.i_curr.set(0);
            return (0, 0.0);
        }
        if t >= self.time[n - 1] {
            self.i_curr.set(n - 2);
            return (n - 2, 1.0);
        }
        let mut i = self.i_curr.get().min(n - 2);
        while i > 0 && self.time[i] > t {
            i -= 1;
        }
        while i + 1 < n - 1 && self.time[i + 1] <= t {
            i += 1;
        }
        self.i_curr.set(i);
        let span = self.time[i + 1] - self.time[i];
        let frac = if span > 0.0 { (t - self.time[i]) / span } else { 0.0 };
        (i, frac)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_non_monotonic_time() {
        let err = TimeSeries::new(vec![0.0, 1.0, 1.0], vec![vec![0.0, 1.0, 2.0]]);
        assert!(err.is_err());
    }

    #[test]
    fn interpolates_linearly_between_rows() {
        let ts = TimeSeries::new(vec![0.0, 10.0, 20.0], vec![vec![0.0, 100.0, 100.0]]).unwrap();
        let v = ts.value(5.0);
        assert!((v[0] - 50.0).abs() < 1e-9);
    }

    #[test]
    fn clamps_outside_range_for_value_but_errors_for_strict() {
        let ts = TimeSeries::new(vec![0.0, 10.0], vec![vec![1.0, 2.0]]).unwrap();
        assert!((ts.value(-5.0)[0] - 1.0).abs() < 1e-9);
        assert!((ts.value(50.0)[0] - 2.0).abs() < 1e-9);
        assert!(ts.value_strict(50.0).is_err());
    }

    #[test]
    fn monotone_queries_keep_cursor_advancing() {
        let ts = TimeSeries::new(
            (0..=100).map(|i| i as f64).collect(),
            vec![(0..=100).map(|i| i as f64 * 2.0).collect()],
        )
        .unwrap();
        for t in 0..100 {
            let v = ts.value(t as f64 + 0.5);
            assert!((v[0] - (t as f64 * 2.0 + 1.0)).abs() < 1e-9);
        }
    }
}
