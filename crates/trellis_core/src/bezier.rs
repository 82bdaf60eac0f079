//! Cubic Bézier guide curves and the strain-minimising fit used to bend a
//! trunk onto a tie-down target.
//!
//! The fit keeps both endpoints fixed and constrains the curve to leave the
//! start point along a given tangent (the first inner control point slides
//! along that ray, never behind the start). The second inner control point
//! is free. Among those curves it minimises a discrete strain energy:
//! bending (second derivative) plus stretch (deviation of `|B'(t)|` from
//! `speed * chord`), sampled at evenly spaced parameters.

use anyhow::{bail, Result};
use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};

use crate::autodiff::{jacobian, residual};
use crate::geometry::{polyline_length, Point3};
use crate::traits::{ResidualSystem, Scalar};

/// Lower bound on the tangent handle, in chord units.
const MIN_HANDLE: f64 = 1e-6;
/// Keeps `|B'(t)|` differentiable where the derivative vanishes.
const NORM_FLOOR: f64 = 1e-12;
const MAX_DAMPING: f64 = 1e20;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CubicBezier {
    pub control: [Point3; 4],
}

impl CubicBezier {
    pub fn new(p0: Point3, p1: Point3, p2: Point3, p3: Point3) -> Self {
        Self {
            control: [p0, p1, p2, p3],
        }
    }

    pub fn start(&self) -> Point3 {
        self.control[0]
    }

    pub fn end(&self) -> Point3 {
        self.control[3]
    }

    pub fn eval(&self, t: f64) -> Point3 {
        let [p0, p1, p2, p3] = self.control;
        let u = 1.0 - t;
        p0 * (u * u * u) + p1 * (3.0 * u * u * t) + p2 * (3.0 * u * t * t) + p3 * (t * t * t)
    }

    pub fn derivative(&self, t: f64) -> Point3 {
        let [p0, p1, p2, p3] = self.control;
        let u = 1.0 - t;
        ((p1 - p0) * (u * u) + (p2 - p1) * (2.0 * u * t) + (p3 - p2) * (t * t)) * 3.0
    }

    /// Evaluates the curve at `n` evenly spaced parameters covering `[0, 1]`.
    pub fn sample(&self, n: usize) -> Vec<Point3> {
        match n {
            0 => Vec::new(),
            1 => vec![self.start()],
            _ => (0..n)
                .map(|i| self.eval(i as f64 / (n - 1) as f64))
                .collect(),
        }
    }

    /// Length of the `samples`-point polyline approximation.
    pub fn arc_length(&self, samples: usize) -> f64 {
        polyline_length(&self.sample(samples))
    }
}

/// Settings for the Levenberg–Marquardt strain fit.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StrainFitSettings {
    pub max_steps: usize,
    /// Projected gradient infinity-norm at which the fit counts as converged.
    pub tolerance: f64,
    pub step_tolerance: f64,
    pub initial_damping: f64,
    /// Parameters at which strain residuals are sampled.
    pub samples: usize,
    pub stretch_weight: f64,
}

impl Default for StrainFitSettings {
    fn default() -> Self {
        Self {
            max_steps: 200,
            tolerance: 1e-9,
            step_tolerance: 1e-12,
            initial_damping: 1e-3,
            samples: 8,
            stretch_weight: 1.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BezierFit {
    pub curve: CubicBezier,
    pub iterations: usize,
    /// Final half sum of squared residuals.
    pub cost: f64,
    pub converged: bool,
}

/// Strain residuals in chord units: the start sits at the origin and the
/// end at the unit chord direction.
/// Unknowns: `[h, q0, q1, q2]` with `P1 = h * direction`, `P2 = q`.
struct StrainProblem {
    chord_dir: [f64; 3],
    direction: [f64; 3],
    params: Vec<f64>,
    speed: f64,
    stretch_weight: f64,
}

impl ResidualSystem for StrainProblem {
    fn dimension(&self) -> usize {
        4
    }

    fn residual_count(&self) -> usize {
        4 * self.params.len()
    }

    fn evaluate<T: Scalar>(&self, x: &[T], out: &mut [T]) {
        let c = T::from_f64;
        let h = x[0];
        let p1: [T; 3] = std::array::from_fn(|k| h * c(self.direction[k]));
        let p2: [T; 3] = [x[1], x[2], x[3]];
        let p3: [T; 3] = std::array::from_fn(|k| c(self.chord_dir[k]));

        for (i, &t) in self.params.iter().enumerate() {
            let u = 1.0 - t;
            let mut speed_sq = c(NORM_FLOOR);
            for k in 0..3 {
                // P0 is the origin.
                let second = c(6.0 * u) * (p2[k] - c(2.0) * p1[k])
                    + c(6.0 * t) * (p3[k] - c(2.0) * p2[k] + p1[k]);
                out[4 * i + k] = second;

                let first = c(3.0 * u * u) * p1[k]
                    + c(6.0 * u * t) * (p2[k] - p1[k])
                    + c(3.0 * t * t) * (p3[k] - p2[k]);
                speed_sq = speed_sq + first * first;
            }
            out[4 * i + 3] = c(self.stretch_weight) * (speed_sq.sqrt() - c(self.speed));
        }
    }
}

/// Fits a cubic Bézier from `endpoints[0]` to `endpoints[1]` that leaves the
/// start along `tangent`.
///
/// Malformed input (coincident endpoints, a degenerate tangent, invalid
/// settings) is an error. A well-posed problem that fails to settle within
/// `max_steps` returns `Ok` with `converged == false`.
pub fn fit_cubic_bezier_strain(
    endpoints: [Point3; 2],
    tangent: &Point3,
    speed: f64,
    settings: StrainFitSettings,
) -> Result<BezierFit> {
    if settings.max_steps == 0 {
        bail!("max_steps must be greater than zero.");
    }
    if settings.samples < 2 {
        bail!("samples must be at least 2, got {}.", settings.samples);
    }
    if !(settings.tolerance > 0.0 && settings.step_tolerance > 0.0) {
        bail!("tolerances must be positive.");
    }
    if !(settings.initial_damping > 0.0) {
        bail!("initial_damping must be positive.");
    }
    if !(speed.is_finite() && speed > 0.0) {
        bail!("speed must be positive and finite, got {}.", speed);
    }

    let [start, end] = endpoints;
    if start.iter().chain(end.iter()).any(|v| !v.is_finite()) {
        bail!("Curve endpoints must be finite.");
    }
    let chord_vec = end - start;
    let chord = chord_vec.norm();
    if chord <= f64::EPSILON {
        bail!("Curve endpoints coincide; nothing to fit.");
    }
    let tangent_norm = tangent.norm();
    if !tangent_norm.is_finite() || tangent_norm <= f64::EPSILON {
        bail!("Tangent constraint must be a finite, non-zero direction.");
    }

    let direction = tangent / tangent_norm;
    let chord_dir = chord_vec / chord;
    let samples = settings.samples;
    let problem = StrainProblem {
        chord_dir: [chord_dir.x, chord_dir.y, chord_dir.z],
        direction: [direction.x, direction.y, direction.z],
        params: (0..samples)
            .map(|i| i as f64 / (samples - 1) as f64)
            .collect(),
        speed,
        stretch_weight: settings.stretch_weight,
    };

    let mut x = DVector::from_vec(vec![
        1.0 / 3.0,
        chord_dir.x * 2.0 / 3.0,
        chord_dir.y * 2.0 / 3.0,
        chord_dir.z * 2.0 / 3.0,
    ]);
    let (iterations, cost, converged) = minimize(&problem, &mut x, settings);

    let curve = CubicBezier::new(
        start,
        start + direction * (x[0] * chord),
        start + Point3::new(x[1], x[2], x[3]) * chord,
        end,
    );

    Ok(BezierFit {
        curve,
        iterations,
        cost,
        converged,
    })
}

/// Bound-constrained Levenberg–Marquardt on `problem`, keeping `x[0] >= MIN_HANDLE`.
/// Returns `(iterations, cost, converged)`.
fn minimize(
    problem: &StrainProblem,
    x: &mut DVector<f64>,
    settings: StrainFitSettings,
) -> (usize, f64, bool) {
    let n = x.len();
    let mut r = residual(problem, x);
    let mut cost = 0.5 * r.norm_squared();
    let mut damping = settings.initial_damping;

    for iteration in 0..settings.max_steps {
        if !cost.is_finite() {
            return (iteration, cost, false);
        }

        let jac = jacobian(problem, x);
        let grad = jac.transpose() * &r;
        if grad.iter().any(|v| !v.is_finite()) {
            return (iteration, cost, false);
        }

        let mut projected = grad.clone();
        if x[0] <= MIN_HANDLE && projected[0] > 0.0 {
            projected[0] = 0.0;
        }
        if projected.amax() <= settings.tolerance {
            return (iteration, cost, true);
        }

        let jtj = jac.transpose() * &jac;
        let descent = -grad;
        loop {
            let mut lhs: DMatrix<f64> = jtj.clone();
            for i in 0..n {
                lhs[(i, i)] += damping * jtj[(i, i)].max(NORM_FLOOR);
            }

            let Some(delta) = lhs.lu().solve(&descent) else {
                damping *= 10.0;
                if damping > MAX_DAMPING {
                    return (iteration + 1, cost, false);
                }
                continue;
            };

            let mut candidate = &*x + delta;
            candidate[0] = candidate[0].max(MIN_HANDLE);
            let step = (&candidate - &*x).norm();
            let small_step = step <= settings.step_tolerance * (x.norm() + settings.step_tolerance);

            let candidate_r = residual(problem, &candidate);
            let candidate_cost = 0.5 * candidate_r.norm_squared();

            if candidate_cost.is_finite() && candidate_cost <= cost {
                *x = candidate;
                r = candidate_r;
                cost = candidate_cost;
                damping = (damping / 10.0).max(1e-15);
                if small_step {
                    return (iteration + 1, cost, true);
                }
                break;
            }

            // No descent even for a vanishing step: already at the minimum.
            if small_step {
                return (iteration + 1, cost, true);
            }
            damping *= 10.0;
            if damping > MAX_DAMPING {
                return (iteration + 1, cost, false);
            }
        }
    }

    (settings.max_steps, cost, false)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_err_contains<T: std::fmt::Debug>(result: Result<T>, needle: &str) {
        let err = result.expect_err("expected error");
        let message = format!("{err}");
        assert!(
            message.contains(needle),
            "expected error to contain \"{needle}\", got \"{message}\""
        );
    }

    #[test]
    fn eval_hits_endpoints_and_sample_count() {
        let curve = CubicBezier::new(
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(0.0, 0.0, 1.0),
            Point3::new(1.0, 0.0, 2.0),
            Point3::new(2.0, 0.0, 2.0),
        );
        let pts = curve.sample(10);
        assert_eq!(pts.len(), 10);
        assert_eq!(pts[0], curve.start());
        assert!((pts[9] - curve.end()).norm() < 1e-12);
        assert!(curve.sample(0).is_empty());
        assert_eq!(curve.sample(1), vec![curve.start()]);
    }

    #[test]
    fn derivative_matches_control_handles() {
        let curve = CubicBezier::new(
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(0.0, 0.0, 1.0),
            Point3::new(1.0, 0.0, 2.0),
            Point3::new(2.0, 0.0, 2.0),
        );
        assert!((curve.derivative(0.0) - Point3::new(0.0, 0.0, 3.0)).norm() < 1e-12);
        assert!((curve.derivative(1.0) - Point3::new(3.0, 0.0, 0.0)).norm() < 1e-12);
    }

    #[test]
    fn collinear_tangent_fits_straight_segment() {
        let start = Point3::new(1.0, 1.0, 0.0);
        let end = Point3::new(1.0, 1.0, 6.0);
        let fit = fit_cubic_bezier_strain(
            [start, end],
            &Point3::new(0.0, 0.0, 2.0),
            1.0,
            StrainFitSettings::default(),
        )
        .expect("fit should run");

        assert!(fit.converged, "fit did not converge: {:?}", fit);
        assert!(fit.cost < 1e-12);
        assert!((fit.curve.arc_length(10) - 6.0).abs() < 1e-6);
        for p in fit.curve.sample(10) {
            assert!((p.x - 1.0).abs() < 1e-6 && (p.y - 1.0).abs() < 1e-6);
        }
    }

    #[test]
    fn bent_fit_leaves_start_along_tangent() {
        let start = Point3::zeros();
        let end = Point3::new(0.0, 2.0, 6.0);
        let tangent = Point3::new(0.0, 0.0, 1.0);
        let fit = fit_cubic_bezier_strain([start, end], &tangent, 1.0, StrainFitSettings::default())
            .expect("fit should run");

        assert!(fit.converged, "fit did not converge: {:?}", fit);
        assert_eq!(fit.curve.start(), start);
        assert_eq!(fit.curve.end(), end);

        let handle = fit.curve.control[1] - start;
        assert!(handle.z > 0.0);
        assert!(handle.x.abs() < 1e-12 && handle.y.abs() < 1e-12);

        let length = fit.curve.arc_length(10);
        assert!(length >= (end - start).norm() - 1e-9);
        assert!(length < 10.0);
    }

    #[test]
    fn rejects_degenerate_inputs() {
        let settings = StrainFitSettings::default();
        let p = Point3::new(1.0, 2.0, 3.0);
        assert_err_contains(
            fit_cubic_bezier_strain([p, p], &Point3::new(0.0, 0.0, 1.0), 1.0, settings),
            "coincide",
        );
        assert_err_contains(
            fit_cubic_bezier_strain([Point3::zeros(), p], &Point3::zeros(), 1.0, settings),
            "Tangent constraint",
        );
        assert_err_contains(
            fit_cubic_bezier_strain([Point3::zeros(), p], &p, 0.0, settings),
            "speed",
        );
        let bad = StrainFitSettings {
            samples: 1,
            ..settings
        };
        assert_err_contains(
            fit_cubic_bezier_strain([Point3::zeros(), p], &p, 1.0, bad),
            "samples",
        );
    }

    #[test]
    fn exhausted_steps_report_non_convergence() {
        let settings = StrainFitSettings {
            max_steps: 1,
            ..StrainFitSettings::default()
        };
        let fit = fit_cubic_bezier_strain(
            [Point3::zeros(), Point3::new(5.0, 0.0, 1.0)],
            &Point3::new(0.0, 0.0, 1.0),
            1.0,
            settings,
        )
        .expect("fit should run");
        assert!(!fit.converged);
        assert_eq!(fit.curve.end(), Point3::new(5.0, 0.0, 1.0));
    }
}
