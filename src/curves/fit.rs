//! Least-squares fits used to characterise a fixture from calibration data.

use serde_derive::{Deserialize, Serialize};

const SINGULAR_LIMIT: f64 = 1e-12;

/// Result of fitting `y = a * x^gamma`.
#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
pub struct PowerFit {
    pub a: f64,
    pub gamma: f64,
}

impl PowerFit {
    pub const FALLBACK: PowerFit = PowerFit { a: 0.0, gamma: 1.0 };

    /// Parameters `(gamma, scale)` of the curve `scale * x^(1/gamma)` that
    /// undoes this response, so that `fit(curve(x)) == x`.
    pub fn inverse_curve(&self) -> (f64, f64) {
        if self.a > 0.0 && self.gamma != 0.0 {
            (self.gamma, self.a.powf(-1.0 / self.gamma))
        } else {
            (1.0, 1.0)
        }
    }
}

/// Coefficients of `y = a0 + a1*x + a2*x^2`.
#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuadraticFit {
    pub a: [f64; 3],
}

impl QuadraticFit {
    pub const IDENTITY: QuadraticFit = QuadraticFit {
        a: [0.0, 1.0, 0.0],
    };

    pub fn evaluate(&self, x: f64) -> f64 {
        self.a[0] + self.a[1] * x + self.a[2] * x * x
    }
}

/// Fit `y = a * x^gamma` by linear regression on `ln(y) = ln(a) + gamma*ln(x)`.
///
/// Pairs with a non-positive x or y are skipped. Fewer than two usable pairs
/// or a singular system gives `a = 0, gamma = 1`.
pub fn fit_power(x: &[f64], y: &[f64]) -> PowerFit {
    let mut n = 0.0;
    let mut sx = 0.0;
    let mut sy = 0.0;
    let mut sxx = 0.0;
    let mut sxy = 0.0;
    for (&xi, &yi) in x.iter().zip(y) {
        if !(xi > 0.0 && yi > 0.0) || !xi.is_finite() || !yi.is_finite() {
            continue;
        }
        let lx = xi.ln();
        let ly = yi.ln();
        n += 1.0;
        sx += lx;
        sy += ly;
        sxx += lx * lx;
        sxy += lx * ly;
    }
    if n < 2.0 {
        return PowerFit::FALLBACK;
    }
    let denom = n * sxx - sx * sx;
    if denom.abs() < SINGULAR_LIMIT {
        return PowerFit::FALLBACK;
    }
    let gamma = (n * sxy - sx * sy) / denom;
    let ln_a = (sy - gamma * sx) / n;
    PowerFit {
        a: ln_a.exp(),
        gamma,
    }
}

/// Least-squares quadratic through `(x[i], y[i])`.
///
/// x is scaled to [-1,1] before forming the normal equations to keep them
/// well conditioned, and the result is mapped back. A singular system gives
/// the identity polynomial.
pub fn fit_quadratic(x: &[f64], y: &[f64]) -> QuadraticFit {
    let pairs: Vec<(f64, f64)> = x
        .iter()
        .zip(y)
        .filter(|(a, b)| a.is_finite() && b.is_finite())
        .map(|(&a, &b)| (a, b))
        .collect();
    if pairs.len() < 3 {
        return QuadraticFit::IDENTITY;
    }
    let (min, max) = pairs
        .iter()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), p| {
            (lo.min(p.0), hi.max(p.0))
        });
    let center = (max + min) / 2.0;
    let half = if max - min > 0.0 { (max - min) / 2.0 } else { 1.0 };

    // Normal equations for u = (x - center) / half
    let mut m = [[0.0f64; 4]; 3];
    for &(xi, yi) in &pairs {
        let u = (xi - center) / half;
        let pow = [1.0, u, u * u, u * u * u, u * u * u * u];
        for (r, row) in m.iter_mut().enumerate() {
            for (c, v) in row.iter_mut().take(3).enumerate() {
                *v += pow[r + c];
            }
            row[3] += pow[r] * yi;
        }
    }
    let Some(b) = solve3(m) else {
        return QuadraticFit::IDENTITY;
    };

    // y = b0 + b1*u + b2*u^2 with u = (x - c)/h
    let (c, h) = (center, half);
    let a2 = b[2] / (h * h);
    let a1 = b[1] / h - 2.0 * b[2] * c / (h * h);
    let a0 = b[0] - b[1] * c / h + b[2] * c * c / (h * h);
    QuadraticFit { a: [a0, a1, a2] }
}

/// Gaussian elimination with partial pivoting on an augmented 3x4 matrix.
fn solve3(mut m: [[f64; 4]; 3]) -> Option<[f64; 3]> {
    for col in 0..3 {
        let pivot = (col..3)
            .max_by(|&a, &b| m[a][col].abs().total_cmp(&m[b][col].abs()))
            .unwrap_or(col);
        if m[pivot][col].abs() < SINGULAR_LIMIT || !m[pivot][col].is_finite() {
            return None;
        }
        m.swap(col, pivot);
        for row in col + 1..3 {
            let f = m[row][col] / m[col][col];
            for k in col..4 {
                m[row][k] -= f * m[col][k];
            }
        }
    }
    let mut x = [0.0; 3];
    for row in (0..3).rev() {
        let mut s = m[row][3];
        for k in row + 1..3 {
            s -= m[row][k] * x[k];
        }
        x[row] = s / m[row][row];
    }
    Some(x)
}
