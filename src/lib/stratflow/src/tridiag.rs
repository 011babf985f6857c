//! Per-column tridiagonal solve used by the semi-implicit k-eps turbulence
//! step (§4.T). This is the one implicit solve the core allows (§1
//! Non-goals: "implicit global solvers beyond a per-column tridiagonal step
//! for turbulence") — everything else is explicit.

use nalgebra::DVector;

/// Result of a single tridiagonal solve, mirroring the convergence-and-
/// iteration-count shape the core's other numerical kernels report.
pub struct TridiagResult {
    pub solution: DVector<f64>,
    pub stable: bool,
}

/// Thomas algorithm for `a[k]*x[k-1] + b[k]*x[k] + c[k]*x[k+1] = d[k]`.
/// `a[0]` and `c[n-1]` are ignored (no sub/super-diagonal past the ends).
/// Returns `stable: false` (without panicking) if a pivot underflows,
/// leaving the untouched input as the solution — callers treat that as a
/// `NumericalAnomaly` and fall back to an explicit sub-step.
pub fn thomas_solve(a: &[f64], b: &[f64], c: &[f64], d: &[f64]) -> TridiagResult {
    let n = b.len();
    debug_assert_eq!(a.len(), n);
    debug_assert_eq!(c.len(), n);
    debug_assert_eq!(d.len(), n);

    if n == 0 {
        return TridiagResult {
            solution: DVector::zeros(0),
            stable: true,
        };
    }

    let mut cp = vec![0.0; n];
    let mut dp = vec![0.0; n];

    if b[0].abs() < 1e-300 {
        return TridiagResult {
            solution: DVector::from_vec(d.to_vec()),
            stable: false,
        };
    }
    cp[0] = c[0] / b[0];
    dp[0] = d[0] / b[0];

    for k in 1..n {
        let denom = b[k] - a[k] * cp[k - 1];
        if denom.abs() < 1e-300 {
            return TridiagResult {
                solution: DVector::from_vec(d.to_vec()),
                stable: false,
            };
        }
        cp[k] = c[k] / denom;
        dp[k] = (d[k] - a[k] * dp[k - 1]) / denom;
    }

    let mut x = vec![0.0; n];
    x[n - 1] = dp[n - 1];
    for k in (0..n - 1).rev() {
        x[k] = dp[k] - cp[k] * x[k + 1];
    }

    TridiagResult {
        solution: DVector::from_vec(x),
        stable: true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn solves_simple_diagonal_system() {
        let a = vec![0.0, 0.0, 0.0];
        let b = vec![2.0, 2.0, 2.0];
        let c = vec![0.0, 0.0, 0.0];
        let d = vec![4.0, 6.0, 8.0];
        let r = thomas_solve(&a, &b, &c, &d);
        assert!(r.stable);
        assert!((r.solution[0] - 2.0).abs() < 1e-9);
        assert!((r.solution[1] - 3.0).abs() < 1e-9);
        assert!((r.solution[2] - 4.0).abs() < 1e-9);
    }

    #[test]
    fn solves_classic_tridiagonal_system() {
        // [2 -1 0; -1 2 -1; 0 -1 2] x = [1, 0, 1] -> x = [1, 1, 1]
        let a = vec![0.0, -1.0, -1.0];
        let b = vec![2.0, 2.0, 2.0];
        let c = vec![-1.0, -1.0, 0.0];
        let d = vec![1.0, 0.0, 1.0];
        let r = thomas_solve(&a, &b, &c, &d);
        assert!(r.stable);
        for v in r.solution.iter() {
            assert!((v - 1.0).abs() < 1e-9);
        }
    }

    #[test]
    fn reports_unstable_on_zero_pivot() {
        let a = vec![0.0, 1.0];
        let b = vec![0.0, 1.0];
        let c = vec![1.0, 0.0];
        let d = vec![1.0, 1.0];
        let r = thomas_solve(&a, &b, &c, &d);
        assert!(!r.stable);
    }
}
