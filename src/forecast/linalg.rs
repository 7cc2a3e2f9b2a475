//! Small dense least-squares solver
//!
//! Normal equations with partial-pivot Gaussian elimination. Systems here are
//! at most a dozen unknowns (regression start values for the model fit), so a
//! hand-rolled solver is enough.

/// Pivot magnitude below which a system is treated as singular.
const SINGULAR_EPS: f64 = 1e-12;

/// Solve `a * x = b` for square `a`. Returns `None` when `a` is singular.
pub fn solve(mut a: Vec<Vec<f64>>, mut b: Vec<f64>) -> Option<Vec<f64>> {
    let n = b.len();
    if a.len() != n || a.iter().any(|row| row.len() != n) {
        return None;
    }

    let scale = a
        .iter()
        .flat_map(|row| row.iter())
        .fold(0.0_f64, |m, v| m.max(v.abs()))
        .max(1.0);

    for col in 0..n {
        let pivot = (col..n).max_by(|&i, &j| a[i][col].abs().total_cmp(&a[j][col].abs()))?;
        if a[pivot][col].abs() < SINGULAR_EPS * scale {
            return None;
        }
        a.swap(col, pivot);
        b.swap(col, pivot);

        for row in col + 1..n {
            let factor = a[row][col] / a[col][col];
            if factor == 0.0 {
                continue;
            }
            for k in col..n {
                a[row][k] -= factor * a[col][k];
            }
            b[row] -= factor * b[col];
        }
    }

    let mut x = vec![0.0; n];
    for row in (0..n).rev() {
        let tail: f64 = (row + 1..n).map(|k| a[row][k] * x[k]).sum();
        x[row] = (b[row] - tail) / a[row][row];
    }

    x.iter().all(|v| v.is_finite()).then_some(x)
}

/// Ordinary least squares: minimise `|X b - y|²` over `b`.
///
/// `rows` are the regressor rows of `X`; all must have the same width.
pub fn least_squares(rows: &[Vec<f64>], y: &[f64]) -> Option<Vec<f64>> {
    let width = rows.first()?.len();
    if width == 0 || rows.len() != y.len() || rows.len() < width {
        return None;
    }

    let mut xtx = vec![vec![0.0; width]; width];
    let mut xty = vec![0.0; width];
    for (row, &target) in rows.iter().zip(y) {
        if row.len() != width {
            return None;
        }
        for i in 0..width {
            xty[i] += row[i] * target;
            for j in 0..width {
                xtx[i][j] += row[i] * row[j];
            }
        }
    }

    solve(xtx, xty)
}
