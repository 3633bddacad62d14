use serde::Serialize;

/// Whether an iterative calculation settled within its tolerance or was stopped by its iteration cap.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Convergence {
    #[default]
    Converged,
    IterationCapReached,
}

impl Convergence {
    pub fn is_converged(&self) -> bool {
        matches!(self, Convergence::Converged)
    }

    /// Combine the statuses of two nested calculations; capped wins.
    pub(crate) fn and(self, other: Convergence) -> Convergence {
        if self.is_converged() {
            other
        } else {
            self
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BisectionResult {
    pub root: f64,
    pub lower: f64,
    pub upper: f64,
    pub iterations: usize,
}

impl BisectionResult {
    pub fn bracket_width(&self) -> f64 {
        (self.upper - self.lower).abs()
    }
}

/// Bisection over `[lower, upper]`, halving until the bracket is narrower than `xtol`.
///
/// The sign test is always made against the function value at the current lower bound, so when the
/// bracket holds no sign change the search walks towards the upper bound. The returned root is the
/// last midpoint evaluated (or the midpoint of the initial bracket if no halving was needed).
pub(crate) fn bisect(
    func: impl Fn(f64) -> f64,
    lower: f64,
    upper: f64,
    xtol: f64,
) -> BisectionResult {
    let mut lower = lower;
    let mut upper = upper;
    let mut root = (lower + upper) / 2.;
    let mut iterations = 0;

    while (upper - lower).abs() > xtol {
        root = (lower + upper) / 2.;
        iterations += 1;
        let sign = func(lower) * func(root);
        if sign < 0. {
            upper = root;
        } else if sign > 0. {
            lower = root;
        } else {
            // exact root at the midpoint (or at the lower bound)
            break;
        }
    }

    BisectionResult {
        root,
        lower,
        upper,
        iterations,
    }
}

/// Newton-Raphson iteration for a root of `func`, which returns the value and derivative at a point.
///
/// Iteration starts from a previous estimate of zero and stops once successive estimates differ by
/// no more than `xtol`. `bound` is applied to each estimate before it is evaluated.
pub(crate) fn newton_raphson(
    func: impl Fn(f64) -> (f64, f64),
    x0: f64,
    xtol: f64,
    max_iter: usize,
    bound: impl Fn(f64) -> f64,
) -> (f64, Convergence) {
    let mut previous = 0.;
    let mut current = x0;
    let mut iterations = 0;

    while (current - previous).abs() > xtol {
        if iterations == max_iter {
            return (current, Convergence::IterationCapReached);
        }
        previous = bound(current);
        let (value, derivative) = func(previous);
        current = previous - value / derivative;
        iterations += 1;
    }

    (current, Convergence::Converged)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use pretty_assertions::assert_eq;
    use rstest::*;

    #[rstest]
    fn test_bisect_finds_root_of_quadratic() {
        let result = bisect(|x| x * x - 2., 0., 2., 1e-6);

        assert!(result.bracket_width() <= 1e-6);
        assert_relative_eq!(result.root, 2f64.sqrt(), max_relative = 1e-6);
    }

    #[rstest]
    fn test_bisect_without_sign_change_walks_to_upper_bound() {
        let result = bisect(|x| x + 1., 0., 1., 0.001);

        assert!(result.bracket_width() <= 0.001);
        assert_relative_eq!(result.upper, 1.);
        assert!(result.root > 0.99);
    }

    #[rstest]
    fn test_bisect_stops_on_exact_root() {
        let result = bisect(|x| x - 1., 0., 2., 1e-9);

        assert_eq!(result.root, 1.);
        assert_eq!(result.iterations, 1);
    }

    #[rstest]
    fn test_newton_raphson_converges() {
        let (root, convergence) = newton_raphson(|x| (x * x - 9., 2. * x), 5., 1e-9, 50, |x| x);

        assert_relative_eq!(root, 3., max_relative = 1e-9);
        assert_eq!(convergence, Convergence::Converged);
    }

    #[rstest]
    fn test_newton_raphson_reports_cap() {
        // the sign of the derivative is wrong so iterates run away
        let (_, convergence) = newton_raphson(|x| (x - 1., -1.), 5., 1e-9, 10, |x| x);

        assert_eq!(convergence, Convergence::IterationCapReached);
    }

    #[rstest]
    fn test_newton_raphson_applies_bound() {
        // estimates are evaluated at no more than 2, so each step lands exactly on the root at 10
        let (root, _) = newton_raphson(|x| (x - 10., 1.), 1., 1e-9, 50, |x: f64| x.min(2.));

        assert_relative_eq!(root, 10.);
    }

    #[rstest]
    fn test_convergence_combination() {
        assert_eq!(
            Convergence::Converged.and(Convergence::IterationCapReached),
            Convergence::IterationCapReached
        );
        assert_eq!(
            Convergence::IterationCapReached.and(Convergence::Converged),
            Convergence::IterationCapReached
        );
        assert!(Convergence::Converged.and(Convergence::Converged).is_converged());
    }
}
