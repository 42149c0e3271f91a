use ndarray::{Array1, ArrayView1};

use num::{complex::Complex, traits::Float};

use rustfft::FftPlanner;

use crate::error::{Error, Result};

/// Sample frequencies of an `n`-point DFT, in cycles per sample.
pub fn fftfreq<T>(n: usize) -> Vec<T>
where
    T: Float,
{
    let nn = T::from(n).unwrap();
    (0..n)
        .map(|i| {
            if i <= (n - 1) / 2 {
                T::from(i).unwrap() / nn
            } else {
                (T::from(i).unwrap() - nn) / nn
            }
        })
        .collect()
}

pub fn next_pow2(n: usize) -> usize {
    n.max(1).next_power_of_two()
}

/// Full linear convolution, `len(a) + len(b) - 1` samples, via FFT.
pub fn convolve_full(a: ArrayView1<f64>, b: ArrayView1<f64>) -> Array1<f64> {
    if a.is_empty() || b.is_empty() {
        return Array1::zeros(0);
    }
    let nout = a.len() + b.len() - 1;
    let nfft = next_pow2(nout);
    let mut planner = FftPlanner::<f64>::new();
    let fwd = planner.plan_fft_forward(nfft);
    let inv = planner.plan_fft_inverse(nfft);

    let pad = |x: ArrayView1<f64>| {
        let mut buf = vec![Complex::new(0.0, 0.0); nfft];
        buf.iter_mut()
            .zip(x.iter())
            .for_each(|(b, &v)| *b = Complex::new(v, 0.0));
        buf
    };
    let mut fa = pad(a);
    let mut fb = pad(b);
    fwd.process(&mut fa);
    fwd.process(&mut fb);
    let mut prod: Vec<_> = fa.iter().zip(fb.iter()).map(|(&x, &y)| x * y).collect();
    inv.process(&mut prod);

    let scale = 1.0 / nfft as f64;
    prod.iter().take(nout).map(|c| c.re * scale).collect()
}

/// Pearson correlation coefficient.
pub fn corrcoef(x: ArrayView1<f64>, y: ArrayView1<f64>) -> Result<f64> {
    if x.len() != y.len() {
        return Err(Error::LengthMismatch {
            left: x.len(),
            right: y.len(),
        });
    }
    if x.len() < 2 {
        return Err(Error::Degenerate(format!(
            "{} samples in correlation window",
            x.len()
        )));
    }
    let n = x.len() as f64;
    let mx = x.sum() / n;
    let my = y.sum() / n;
    let (sxy, sxx, syy) = x
        .iter()
        .zip(y.iter())
        .fold((0.0, 0.0, 0.0), |(sxy, sxx, syy), (&a, &b)| {
            let (da, db) = (a - mx, b - my);
            (sxy + da * db, sxx + da * da, syy + db * db)
        });
    let denom = (sxx * syy).sqrt();
    if denom == 0.0 || !denom.is_finite() {
        return Err(Error::Degenerate("zero variance in correlation window".into()));
    }
    Ok(sxy / denom)
}

/// Index of the first maximum, `None` on empty input.
pub fn argmax(x: ArrayView1<f64>) -> Option<usize> {
    x.iter()
        .enumerate()
        .fold(None, |best: Option<(usize, f64)>, (i, &v)| match best {
            Some((_, b)) if b >= v => best,
            _ => Some((i, v)),
        })
        .map(|(i, _)| i)
}

pub fn max_abs(x: ArrayView1<f64>) -> f64 {
    x.iter().fold(0.0, |m: f64, &v| m.max(v.abs()))
}

/// Strict local maxima (`x[i-1] < x[i] > x[i+1]`), edges excluded.
pub fn local_maxima(x: ArrayView1<f64>) -> Vec<usize> {
    (1..x.len().saturating_sub(1))
        .filter(|&i| x[i] > x[i - 1] && x[i] > x[i + 1])
        .collect()
}

/// Strict local minima (`x[i-1] > x[i] < x[i+1]`), edges excluded.
pub fn local_minima(x: ArrayView1<f64>) -> Vec<usize> {
    (1..x.len().saturating_sub(1))
        .filter(|&i| x[i] < x[i - 1] && x[i] < x[i + 1])
        .collect()
}

/// Solve `T x = y` for a symmetric Toeplitz `T` with first column `r`
/// (Levinson recursion).
pub fn solve_toeplitz(r: &[f64], y: &[f64]) -> Result<Vec<f64>> {
    let n = r.len();
    if n == 0 || y.len() != n {
        return Err(Error::LengthMismatch {
            left: n,
            right: y.len(),
        });
    }
    if r[0] == 0.0 {
        return Err(Error::Degenerate("Toeplitz diagonal is zero".into()));
    }

    let mut f = Vec::with_capacity(n);
    f.push(1.0 / r[0]);
    let mut x = vec![0.0; n];
    x[0] = y[0] / r[0];

    for k in 1..n {
        let ef: f64 = (0..k).map(|i| r[k - i] * f[i]).sum();
        let denom = 1.0 - ef * ef;
        if denom.abs() < 1e-14 {
            return Err(Error::Degenerate("singular Toeplitz system".into()));
        }
        let fnew: Vec<f64> = (0..=k)
            .map(|i| {
                let fi = if i < k { f[i] } else { 0.0 };
                let bi = if i > 0 { f[k - i] } else { 0.0 };
                (fi - ef * bi) / denom
            })
            .collect();
        f = fnew;

        let ex: f64 = (0..k).map(|i| r[k - i] * x[i]).sum();
        let err = y[k] - ex;
        for i in 0..=k {
            x[i] += err * f[k - i];
        }
    }
    Ok(x)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn approx_eq(a: f64, b: f64, tol: f64) -> bool {
        (a - b).abs() <= tol
    }

    #[test]
    fn fftfreq_layout() {
        let f = fftfreq::<f64>(4);
        assert_eq!(f, vec![0.0, 0.25, -0.5, -0.25]);
        let f = fftfreq::<f64>(5);
        assert!(approx_eq(f[2], 0.4, 1e-12));
        assert!(approx_eq(f[3], -0.4, 1e-12));
    }

    #[test]
    fn convolve_matches_direct_sum() {
        let a = array![1.0, 2.0, 3.0];
        let b = array![0.0, 1.0, 0.5];
        let c = convolve_full(a.view(), b.view());
        let expected = [0.0, 1.0, 2.5, 4.0, 1.5];
        assert_eq!(c.len(), expected.len());
        for (x, y) in c.iter().zip(expected.iter()) {
            assert!(approx_eq(*x, *y, 1e-9));
        }
    }

    #[test]
    fn corrcoef_perfect_and_degenerate() {
        let x = array![1.0, 2.0, 3.0, 4.0];
        let y = array![2.0, 4.0, 6.0, 8.0];
        assert!(approx_eq(corrcoef(x.view(), y.view()).unwrap(), 1.0, 1e-12));
        let neg = y.mapv(|v| -v);
        assert!(approx_eq(corrcoef(x.view(), neg.view()).unwrap(), -1.0, 1e-12));

        let flat = array![1.0, 1.0, 1.0, 1.0];
        assert!(matches!(
            corrcoef(x.view(), flat.view()),
            Err(Error::Degenerate(_))
        ));
        let short = array![1.0, 2.0];
        assert!(matches!(
            corrcoef(x.view(), short.view()),
            Err(Error::LengthMismatch { .. })
        ));
    }

    #[test]
    fn argmax_takes_first_of_ties() {
        let x = array![0.0, 3.0, 1.0, 3.0];
        assert_eq!(argmax(x.view()), Some(1));
        assert_eq!(argmax(Array1::<f64>::zeros(0).view()), None);
    }

    #[test]
    fn extrema_are_strict() {
        let x = array![0.0, 1.0, 1.0, 0.0, -1.0, 0.5, 0.2];
        assert_eq!(local_maxima(x.view()), vec![5]);
        assert_eq!(local_minima(x.view()), vec![4]);
    }

    #[test]
    fn toeplitz_solution_satisfies_system() {
        let r = [4.0, 1.0, 0.5, 0.25];
        let y = [1.0, 2.0, 3.0, 4.0];
        let x = solve_toeplitz(&r, &y).unwrap();
        for i in 0..4 {
            let lhs: f64 = (0..4)
                .map(|j| r[(i as isize - j as isize).unsigned_abs()] * x[j])
                .sum();
            assert!(approx_eq(lhs, y[i], 1e-10));
        }
    }

    #[test]
    fn toeplitz_rejects_zero_diagonal() {
        assert!(solve_toeplitz(&[0.0, 1.0], &[1.0, 1.0]).is_err());
    }
}
