//! Nelder–Mead simplex minimiser
//!
//! Derivative-free, used for the conditional-sum-of-squares objective of the
//! ARIMA fit. Non-finite objective values are treated as `+inf`, so the
//! simplex moves away from them.

/// Reflection, expansion, contraction and shrink coefficients.
const ALPHA: f64 = 1.0;
const GAMMA: f64 = 2.0;
const RHO: f64 = 0.5;
const SIGMA: f64 = 0.5;

/// Result of a minimisation.
#[derive(Debug, Clone)]
pub struct Minimum {
    pub point: Vec<f64>,
    pub value: f64,
    pub iterations: usize,
    pub converged: bool,
}

/// Converges once the objective values across the simplex agree to within
/// `reltol` of the best value. Saturated directions of a bounded
/// reparametrisation flatten the objective, so no parameter-space tolerance is
/// applied.
#[derive(Debug, Clone, Copy)]
pub struct NelderMead {
    /// Iteration cap per dimension
    pub iterations_per_dim: usize,
    /// Relative tolerance on the spread of objective values
    pub reltol: f64,
}

impl Default for NelderMead {
    fn default() -> Self {
        Self {
            iterations_per_dim: 600,
            reltol: 1.5e-8,
        }
    }
}

fn finite_or_inf(v: f64) -> f64 {
    if v.is_finite() {
        v
    } else {
        f64::INFINITY
    }
}

impl NelderMead {
    /// Minimise `f` starting at `start`, with an initial simplex offset by `steps`
    /// along each axis.
    pub fn minimize<F>(&self, f: F, start: &[f64], steps: &[f64]) -> Minimum
    where
        F: Fn(&[f64]) -> f64,
    {
        let n = start.len();
        let eval = |x: &[f64]| finite_or_inf(f(x));

        if n == 0 {
            return Minimum {
                point: Vec::new(),
                value: eval(start),
                iterations: 0,
                converged: true,
            };
        }

        let mut simplex: Vec<Vec<f64>> = Vec::with_capacity(n + 1);
        simplex.push(start.to_vec());
        for i in 0..n {
            let mut vertex = start.to_vec();
            let step = steps.get(i).copied().filter(|s| *s != 0.0).unwrap_or(0.1);
            vertex[i] += step;
            simplex.push(vertex);
        }
        let mut values: Vec<f64> = simplex.iter().map(|x| eval(x)).collect();

        let max_iterations = self.iterations_per_dim * n;
        let mut iterations = 0;
        let mut converged = false;

        while iterations < max_iterations {
            // order vertices best → worst
            let mut order: Vec<usize> = (0..=n).collect();
            order.sort_by(|&a, &b| values[a].total_cmp(&values[b]));
            simplex = order.iter().map(|&i| simplex[i].clone()).collect();
            values = order.iter().map(|&i| values[i]).collect();

            let f_spread = values
                .iter()
                .skip(1)
                .fold(0.0_f64, |m, v| m.max((v - values[0]).abs()));
            if values[0].is_finite()
                && f_spread <= self.reltol * (values[0].abs() + self.reltol)
            {
                converged = true;
                break;
            }

            iterations += 1;

            let centroid: Vec<f64> = (0..n)
                .map(|j| simplex[..n].iter().map(|v| v[j]).sum::<f64>() / n as f64)
                .collect();
            let worst = simplex[n].clone();
            let toward = |coef: f64, target: &[f64]| -> Vec<f64> {
                centroid
                    .iter()
                    .zip(target)
                    .map(|(c, t)| c + coef * (t - c))
                    .collect()
            };

            let reflected = toward(-ALPHA, &worst);
            let f_reflected = eval(&reflected);

            if f_reflected < values[0] {
                let expanded = toward(GAMMA, &reflected);
                let f_expanded = eval(&expanded);
                if f_expanded < f_reflected {
                    simplex[n] = expanded;
                    values[n] = f_expanded;
                } else {
                    simplex[n] = reflected;
                    values[n] = f_reflected;
                }
                continue;
            }

            if f_reflected < values[n - 1] {
                simplex[n] = reflected;
                values[n] = f_reflected;
                continue;
            }

            let (contracted, f_contracted, accept) = if f_reflected < values[n] {
                let c = toward(RHO, &reflected);
                let fc = eval(&c);
                let ok = fc <= f_reflected;
                (c, fc, ok)
            } else {
                let c = toward(RHO, &worst);
                let fc = eval(&c);
                let ok = fc < values[n];
                (c, fc, ok)
            };

            if accept {
                simplex[n] = contracted;
                values[n] = f_contracted;
                continue;
            }

            let best = simplex[0].clone();
            for i in 1..=n {
                simplex[i] = best
                    .iter()
                    .zip(&simplex[i])
                    .map(|(b, x)| b + SIGMA * (x - b))
                    .collect();
                values[i] = eval(&simplex[i]);
            }
        }

        let best = (0..=n)
            .min_by(|&a, &b| values[a].total_cmp(&values[b]))
            .unwrap_or(0);
        Minimum {
            point: simplex[best].clone(),
            value: values[best],
            iterations,
            converged,
        }
    }
}
