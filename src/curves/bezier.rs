use log::warn;

/// Largest number of control points kept in a curve.
pub const MAX_BEZIER_POINTS: usize = 200;

/// Tolerance on the x coordinate when inverting the curve.
const INVERT_TOLERANCE: f64 = 1e-5;
const MAX_BISECTIONS: u32 = 64;

/// Bézier curve of arbitrary degree through an ordered list of control points.
///
/// The x coordinates are expected to be non-decreasing from the first to the
/// last point so that the curve can be inverted on x.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct BezierCurve {
    points: Vec<(f64, f64)>,
    // Binomial coefficients for the current degree
    binomials: Vec<f64>,
}

impl BezierCurve {
    pub fn new(points: &[(f64, f64)]) -> BezierCurve {
        let points = if points.len() > MAX_BEZIER_POINTS {
            warn!(
                "Bezier curve with {} points truncated to {}",
                points.len(),
                MAX_BEZIER_POINTS
            );
            &points[..MAX_BEZIER_POINTS]
        } else {
            points
        };
        BezierCurve {
            points: points.to_vec(),
            binomials: binomials(points.len()),
        }
    }

    pub fn points(&self) -> &[(f64, f64)] {
        &self.points
    }

    /// Point on the curve at parameter `t` using the Bernstein polynomial sum.
    /// Returns (0,0) when there are fewer than two control points.
    pub fn point(&self, t: f64) -> (f64, f64) {
        if self.points.len() < 2 {
            return (0.0, 0.0);
        }
        let n = self.points.len() - 1;
        let u = 1.0 - t;
        let mut x = 0.0;
        let mut y = 0.0;
        for (i, (p, c)) in self.points.iter().zip(&self.binomials).enumerate() {
            let b = c * t.powi(i as i32) * u.powi((n - i) as i32);
            x += b * p.0;
            y += b * p.1;
        }
        (x, y)
    }

    /// Find the y coordinate where the curve's x coordinate equals `x`.
    ///
    /// Bisects on the curve parameter until x is within 1e-5.
    pub fn evaluate(&self, x: f64) -> f64 {
        if self.points.len() < 2 {
            return 0.0;
        }
        let mut lo = 0.0;
        let mut hi = 1.0;
        let mut t = 0.5;
        for _ in 0..MAX_BISECTIONS {
            t = (lo + hi) / 2.0;
            let (px, _) = self.point(t);
            if (px - x).abs() < INVERT_TOLERANCE {
                break;
            }
            if px < x {
                lo = t;
            } else {
                hi = t;
            }
        }
        self.point(t).1
    }
}

fn binomials(len: usize) -> Vec<f64> {
    if len == 0 {
        return Vec::new();
    }
    let n = len - 1;
    let mut c = Vec::with_capacity(len);
    let mut v = 1.0f64;
    for k in 0..=n {
        c.push(v);
        v = v * (n - k) as f64 / (k + 1) as f64;
    }
    c
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn degenerate_curve() {
        let b = BezierCurve::new(&[]);
        assert_eq!(b.point(0.3), (0.0, 0.0));
        assert_eq!(b.evaluate(0.3), 0.0);
        let b = BezierCurve::new(&[(0.5, 0.5)]);
        assert_eq!(b.point(0.3), (0.0, 0.0));
    }

    #[test]
    fn binomial_coefficients() {
        assert_eq!(binomials(4), vec![1.0, 3.0, 3.0, 1.0]);
        assert_eq!(binomials(5), vec![1.0, 4.0, 6.0, 4.0, 1.0]);
        assert_eq!(binomials(1), vec![1.0]);
    }

    #[test]
    fn straight_line() {
        let b = BezierCurve::new(&[(0.0, 0.0), (1.0, 1.0)]);
        for i in 0..=10 {
            let x = i as f64 / 10.0;
            assert!((b.evaluate(x) - x).abs() < 1e-4);
        }
    }

    #[test]
    fn cubic_end_points() {
        let b = BezierCurve::new(&[(0.0, 0.0), (0.42, 0.0), (0.58, 1.0), (1.0, 1.0)]);
        assert_eq!(b.point(0.0), (0.0, 0.0));
        let (x, y) = b.point(1.0);
        assert!((x - 1.0).abs() < 1e-12 && (y - 1.0).abs() < 1e-12);
        // Symmetric control points give a symmetric curve
        assert!((b.evaluate(0.5) - 0.5).abs() < 1e-4);
        assert!(b.evaluate(0.2) < 0.2);
        assert!(b.evaluate(0.8) > 0.8);
    }

    #[test]
    fn high_degree_curve() {
        let pts: Vec<(f64, f64)> = (0..50)
            .map(|i| {
                let x = i as f64 / 49.0;
                (x, x * x)
            })
            .collect();
        let b = BezierCurve::new(&pts);
        let y = b.evaluate(0.5);
        assert!(y > 0.2 && y < 0.3, "y = {}", y);
    }

    #[test]
    fn truncated_to_capacity() {
        let pts: Vec<(f64, f64)> = (0..250).map(|i| (i as f64 / 249.0, 0.5)).collect();
        let b = BezierCurve::new(&pts);
        assert_eq!(b.points().len(), MAX_BEZIER_POINTS);
        assert!((b.evaluate(0.5) - 0.5).abs() < 1e-9);
    }
}
