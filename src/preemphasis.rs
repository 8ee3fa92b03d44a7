//! Spectral pre-emphasis fitting
//!
//! Fits an exponential decay curve `f(x) = a*exp(-b*x) + c` to the
//! frames-averaged magnitude of each frequency bin, then flattens the
//! spectrum by dividing every bin row by the fitted value. Flattening is
//! undone after factorization to restore the original spectral balance.

use crate::error::{Result, SeparationError};
use nalgebra::{DMatrix, Matrix3, Vector3};

/// Maximum outer iterations of the Levenberg-Marquardt loop
const MAX_ITERATIONS: usize = 100;
/// Maximum consecutive damping increases before a step is abandoned
const MAX_DAMPING_STEPS: usize = 25;
/// Relative cost-reduction threshold for convergence
const FTOL: f64 = 1e-10;
/// Relative step-size threshold for convergence
const XTOL: f64 = 1e-10;
/// Floor applied to the curve value when flattening, so degenerate fits
/// (e.g. an all-silent input) stay finite and flatten/unflatten remains an
/// exact inverse pair
const CURVE_FLOOR: f64 = 1e-12;

/// Fitted exponential decay model `f(x) = a*exp(-b*x) + c`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ExpDecayModel {
    pub a: f64,
    pub b: f64,
    pub c: f64,
}

impl ExpDecayModel {
    /// Evaluate the model at `x`
    pub fn eval(&self, x: f64) -> f64 {
        self.a * (-self.b * x).exp() + self.c
    }

    /// Evaluate the model with the flattening floor applied
    fn eval_floored(&self, x: f64) -> f64 {
        self.eval(x).max(CURVE_FLOOR)
    }
}

/// Fit the exponential decay model to `(xs, ys)` by Levenberg-Marquardt
///
/// Iterates damped Gauss-Newton steps with an analytic Jacobian from a
/// data-driven starting point (first-minus-last amplitude, decay spanning
/// the x range, last value as offset). Returns a
/// [`SeparationError::FitConvergence`] error when the optimizer makes no
/// progress within the iteration budget; no fallback model is defined.
pub fn fit_exp_decay(xs: &[f64], ys: &[f64]) -> Result<ExpDecayModel> {
    if xs.len() != ys.len() || xs.is_empty() {
        return Err(SeparationError::DimensionMismatch(format!(
            "curve fit needs matching non-empty inputs, got {} x-values and {} y-values",
            xs.len(),
            ys.len()
        )));
    }

    let x_range = (xs[xs.len() - 1] - xs[0]).abs().max(1.0);
    let mut params = Vector3::new(
        ys[0] - ys[ys.len() - 1],
        2.0 / x_range,
        ys[ys.len() - 1],
    );
    let mut cost = residual_cost(&params, xs, ys);
    let mut lambda = 1e-3;

    for iteration in 0..MAX_ITERATIONS {
        // Accumulate the normal equations J'J and J'r
        let mut jtj = Matrix3::<f64>::zeros();
        let mut jtr = Vector3::<f64>::zeros();
        for (&x, &y) in xs.iter().zip(ys.iter()) {
            let e = (-params[1] * x).exp();
            let r = params[0] * e + params[2] - y;
            let j = Vector3::new(e, -params[0] * x * e, 1.0);
            jtj += j * j.transpose();
            jtr += j * r;
        }

        // Damped step, increasing lambda until the cost decreases
        let mut stepped = false;
        for _ in 0..MAX_DAMPING_STEPS {
            let mut damped = jtj;
            for i in 0..3 {
                damped[(i, i)] += lambda * jtj[(i, i)].max(1e-12);
            }
            let delta = match damped.lu().solve(&(-jtr)) {
                Some(delta) => delta,
                None => {
                    lambda *= 10.0;
                    continue;
                }
            };

            let candidate = params + delta;
            let new_cost = residual_cost(&candidate, xs, ys);
            if new_cost.is_finite() && new_cost < cost {
                let step_small = delta.norm() <= XTOL * (params.norm() + XTOL);
                let cost_small = cost - new_cost <= FTOL * cost;
                params = candidate;
                cost = new_cost;
                lambda = (lambda * 0.1).max(1e-12);
                stepped = true;

                if cost <= 1e-24 || step_small || cost_small {
                    log::debug!(
                        "pre-emphasis fit converged after {} iterations: a={:.4e} b={:.4e} c={:.4e}",
                        iteration + 1,
                        params[0],
                        params[1],
                        params[2]
                    );
                    return Ok(ExpDecayModel {
                        a: params[0],
                        b: params[1],
                        c: params[2],
                    });
                }
                break;
            }
            lambda *= 10.0;
        }

        if !stepped {
            // Damping exhausted without a cost reduction; the current
            // point is a (local) minimum
            if cost.is_finite() {
                return Ok(ExpDecayModel {
                    a: params[0],
                    b: params[1],
                    c: params[2],
                });
            }
            break;
        }
    }

    Err(SeparationError::FitConvergence(format!(
        "exponential fit made no progress within {} iterations (cost {:.4e})",
        MAX_ITERATIONS, cost
    )))
}

fn residual_cost(params: &Vector3<f64>, xs: &[f64], ys: &[f64]) -> f64 {
    xs.iter()
        .zip(ys.iter())
        .map(|(&x, &y)| {
            let r = params[0] * (-params[1] * x).exp() + params[2] - y;
            r * r
        })
        .sum::<f64>()
        * 0.5
}

/// Divide every bin row of `magnitude` by the fitted curve value
pub fn flatten(magnitude: &DMatrix<f64>, model: &ExpDecayModel) -> DMatrix<f64> {
    let mut flattened = magnitude.clone();
    for k in 0..flattened.nrows() {
        let weight = 1.0 / model.eval_floored(k as f64);
        for t in 0..flattened.ncols() {
            flattened[(k, t)] *= weight;
        }
    }
    flattened
}

/// Multiply every bin row of `magnitude` by the fitted curve value,
/// undoing [`flatten`]
pub fn unflatten(magnitude: &DMatrix<f64>, model: &ExpDecayModel) -> DMatrix<f64> {
    let mut restored = magnitude.clone();
    for k in 0..restored.nrows() {
        let weight = model.eval_floored(k as f64);
        for t in 0..restored.ncols() {
            restored[(k, t)] *= weight;
        }
    }
    restored
}
