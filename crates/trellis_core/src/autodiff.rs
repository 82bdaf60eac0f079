use crate::traits::{ResidualSystem, Scalar};
use nalgebra::{DMatrix, DVector};
use num_traits::{One, Zero};
use std::ops::{Add, Div, Mul, Neg, Rem, Sub};

/// Simple Dual Number for Forward Mode AD
/// val: real part
/// eps: infinitesimal part
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd)]
pub struct Dual {
    pub val: f64,
    pub eps: f64,
}

impl Dual {
    pub fn new(val: f64, eps: f64) -> Self {
        Self { val, eps }
    }

    /// A variable seeded for differentiation.
    pub fn variable(val: f64) -> Self {
        Self::new(val, 1.0)
    }

    pub fn constant(val: f64) -> Self {
        Self::new(val, 0.0)
    }
}

impl Zero for Dual {
    fn zero() -> Self {
        Self::constant(0.0)
    }
    fn is_zero(&self) -> bool {
        self.val == 0.0 && self.eps == 0.0
    }
}

impl One for Dual {
    fn one() -> Self {
        Self::constant(1.0)
    }
}

impl Add for Dual {
    type Output = Self;
    fn add(self, rhs: Self) -> Self {
        Self::new(self.val + rhs.val, self.eps + rhs.eps)
    }
}

impl Sub for Dual {
    type Output = Self;
    fn sub(self, rhs: Self) -> Self {
        Self::new(self.val - rhs.val, self.eps - rhs.eps)
    }
}

impl Mul for Dual {
    type Output = Self;
    fn mul(self, rhs: Self) -> Self {
        Self::new(self.val * rhs.val, self.val * rhs.eps + self.eps * rhs.val)
    }
}

impl Div for Dual {
    type Output = Self;
    fn div(self, rhs: Self) -> Self {
        Self::new(
            self.val / rhs.val,
            (self.eps * rhs.val - self.val * rhs.eps) / (rhs.val * rhs.val),
        )
    }
}

impl Rem for Dual {
    type Output = Self;
    fn rem(self, rhs: Self) -> Self {
        // Piecewise linear with unit slope in self.
        Self::new(self.val % rhs.val, self.eps)
    }
}

impl Neg for Dual {
    type Output = Self;
    fn neg(self) -> Self {
        Self::new(-self.val, -self.eps)
    }
}

impl Scalar for Dual {
    fn from_f64(value: f64) -> Self {
        Self::constant(value)
    }

    fn value(self) -> f64 {
        self.val
    }

    fn sqrt(self) -> Self {
        let s = self.val.sqrt();
        Self::new(s, self.eps / (2.0 * s))
    }
}

/// Evaluates the residual at `x` in plain floating point.
pub fn residual<R: ResidualSystem>(system: &R, x: &DVector<f64>) -> DVector<f64> {
    let mut out = vec![0.0; system.residual_count()];
    system.evaluate(x.as_slice(), &mut out);
    DVector::from_vec(out)
}

/// Dense Jacobian of the residual at `x`, one dual-number sweep per unknown.
pub fn jacobian<R: ResidualSystem>(system: &R, x: &DVector<f64>) -> DMatrix<f64> {
    let n = system.dimension();
    let m = system.residual_count();
    let mut jac = DMatrix::zeros(m, n);
    let mut dual_x = vec![Dual::zero(); n];
    let mut dual_out = vec![Dual::zero(); m];

    for j in 0..n {
        for i in 0..n {
            dual_x[i] = if i == j {
                Dual::variable(x[i])
            } else {
                Dual::constant(x[i])
            };
        }
        system.evaluate(&dual_x, &mut dual_out);
        for i in 0..m {
            jac[(i, j)] = dual_out[i].eps;
        }
    }

    jac
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Paraboloid;

    impl ResidualSystem for Paraboloid {
        fn dimension(&self) -> usize {
            2
        }

        fn residual_count(&self) -> usize {
            2
        }

        fn evaluate<T: Scalar>(&self, x: &[T], out: &mut [T]) {
            // r0 = x0 * x1, r1 = sqrt(x0^2 + x1^2)
            out[0] = x[0] * x[1];
            out[1] = (x[0] * x[0] + x[1] * x[1]).sqrt();
        }
    }

    #[test]
    fn dual_arithmetic_follows_product_and_quotient_rules() {
        let x = Dual::variable(3.0);
        let c = Dual::constant(2.0);

        let prod = x * x * c;
        assert_eq!(prod.val, 18.0);
        assert_eq!(prod.eps, 12.0);

        let quot = c / x;
        assert!((quot.val - 2.0 / 3.0).abs() < 1e-12);
        assert!((quot.eps + 2.0 / 9.0).abs() < 1e-12);

        let root = Scalar::sqrt(x);
        assert!((root.eps - 0.5 / 3.0_f64.sqrt()).abs() < 1e-12);
    }

    #[test]
    fn jacobian_matches_analytic_derivatives() {
        let x = DVector::from_vec(vec![3.0, 4.0]);
        let jac = jacobian(&Paraboloid, &x);

        assert_eq!(jac.nrows(), 2);
        assert_eq!(jac.ncols(), 2);
        assert!((jac[(0, 0)] - 4.0).abs() < 1e-12);
        assert!((jac[(0, 1)] - 3.0).abs() < 1e-12);
        assert!((jac[(1, 0)] - 0.6).abs() < 1e-12);
        assert!((jac[(1, 1)] - 0.8).abs() < 1e-12);

        let r = residual(&Paraboloid, &x);
        assert_eq!(r.as_slice(), &[12.0, 5.0]);
    }
}
