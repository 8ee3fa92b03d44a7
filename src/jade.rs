//! Complex-domain JADE ICA
//!
//! Joint Approximate Diagonalization of Eigenmatrices for complex-valued
//! signals, after J.-F. Cardoso's algorithm: eigenvalue whitening, a set
//! of fourth-order cumulant eigenmatrices estimated from the whitened
//! data, and joint diagonalization by complex Givens rotations.
//!
//! The rotation sweeps are capped by `max_iter`; hitting the cap is
//! treated as best effort at the iteration limit, not a failure.

use crate::error::{Result, SeparationError};
use nalgebra::{DMatrix, Matrix3, SymmetricEigen};
use num_complex::Complex64;

/// Separate `x` (channels x samples) into `m` independent components
///
/// Returns the estimated mixing matrix `A` (channels x m) and source
/// matrix `S` (m x samples) such that `A * S` approximates `x` restricted
/// to the m strongest whitened directions.
pub fn cjade(
    x: &DMatrix<Complex64>,
    m: usize,
    max_iter: usize,
) -> Result<(DMatrix<Complex64>, DMatrix<Complex64>)> {
    let n = x.nrows();
    let t = x.ncols();

    if m == 0 {
        return Err(SeparationError::DimensionMismatch(
            "cannot extract zero components".to_string(),
        ));
    }
    if m > n {
        return Err(SeparationError::DimensionMismatch(format!(
            "requested {} components from only {} channels",
            m, n
        )));
    }
    if m > t {
        return Err(SeparationError::DimensionMismatch(format!(
            "requested {} components from only {} samples",
            m, t
        )));
    }

    let tf = t as f64;

    // Whitening: project onto the m strongest eigenvectors of the sample
    // covariance and scale to unit variance
    let covariance = (x * x.adjoint()).map(|z| z / tf);
    let eig = SymmetricEigen::new(covariance);
    let order = ascending_order(eig.eigenvalues.as_slice());

    let mut whitener = DMatrix::<Complex64>::zeros(m, n);
    let mut dewhitener = DMatrix::<Complex64>::zeros(n, m);
    if m < n {
        // Subtract the mean of the discarded (noise) eigenvalues
        let noise_mean =
            order[..n - m].iter().map(|&i| eig.eigenvalues[i]).sum::<f64>() / (n - m) as f64;
        for j in 0..m {
            let idx = order[n - m + j];
            let scale = (eig.eigenvalues[idx] - noise_mean)
                .max(f64::MIN_POSITIVE)
                .sqrt();
            for i in 0..n {
                let u = eig.eigenvectors[(i, idx)];
                whitener[(j, i)] = u.conj() / scale;
                dewhitener[(i, j)] = u * scale;
            }
        }
    } else {
        // m == n: Hermitian square root of the covariance
        for row in 0..n {
            for col in 0..n {
                let mut w = Complex64::new(0.0, 0.0);
                let mut iw = Complex64::new(0.0, 0.0);
                for &idx in order.iter() {
                    let scale = eig.eigenvalues[idx].max(f64::MIN_POSITIVE).sqrt();
                    let prod = eig.eigenvectors[(row, idx)] * eig.eigenvectors[(col, idx)].conj();
                    w += prod / scale;
                    iw += prod * scale;
                }
                whitener[(row, col)] = w;
                dewhitener[(row, col)] = iw;
            }
        }
    }

    let y = &whitener * x; // m x t

    // Sample estimates of the second-order statistics
    let r = (&y * y.adjoint()).map(|z| z / tf);
    let c = (&y * y.transpose()).map(|z| z / tf);

    // Fourth-order quadricovariance, Hermitian of size m^2 x m^2
    let mut q = DMatrix::<Complex64>::zeros(m * m, m * m);
    let mut ykl = vec![Complex64::new(0.0, 0.0); t];
    let mut yjkl = vec![Complex64::new(0.0, 0.0); t];
    for lx in 0..m {
        for kx in 0..m {
            for (s, value) in ykl.iter_mut().enumerate() {
                *value = y[(lx, s)] * y[(kx, s)].conj();
            }
            for jx in 0..m {
                for (s, value) in yjkl.iter_mut().enumerate() {
                    *value = ykl[s] * y[(jx, s)].conj();
                }
                for ix in 0..m {
                    let mut dot = Complex64::new(0.0, 0.0);
                    for s in 0..t {
                        dot += yjkl[s] * y[(ix, s)];
                    }
                    q[(jx * m + ix, lx * m + kx)] = dot / tf
                        - r[(ix, jx)] * r[(lx, kx)]
                        - r[(ix, kx)] * r[(lx, jx)]
                        - c[(ix, lx)] * c[(jx, kx)].conj();
                }
            }
        }
    }

    // Keep the m most significant eigenmatrices, scaled by |eigenvalue|,
    // laid out as m blocks of m columns
    let qeig = SymmetricEigen::new(q);
    let magnitudes: Vec<f64> = qeig.eigenvalues.iter().map(|v| v.abs()).collect();
    let qorder = ascending_order(&magnitudes);

    let mut eigenset = DMatrix::<Complex64>::zeros(m, m * m);
    for block in 0..m {
        let idx = qorder[m * m - 1 - block];
        let weight = magnitudes[idx];
        let vector = qeig.eigenvectors.column(idx);
        // Column-major reshape of the eigenvector into an m x m matrix
        for j in 0..m {
            for i in 0..m {
                eigenset[(i, block * m + j)] = vector[j * m + i] * weight;
            }
        }
    }

    // Joint approximate diagonalization by complex Givens rotations
    let threshold = 1.0 / tf.sqrt() / 100.0;
    let b_mat = Matrix3::new(
        Complex64::new(1.0, 0.0),
        Complex64::new(0.0, 0.0),
        Complex64::new(0.0, 0.0),
        Complex64::new(0.0, 0.0),
        Complex64::new(1.0, 0.0),
        Complex64::new(1.0, 0.0),
        Complex64::new(0.0, 0.0),
        Complex64::new(0.0, -1.0),
        Complex64::new(0.0, 1.0),
    );

    let mut rotation = DMatrix::<Complex64>::identity(m, m);
    let mut sweeps = 0;
    let mut active = true;
    while active && sweeps < max_iter {
        active = false;
        sweeps += 1;

        for p in 0..m.saturating_sub(1) {
            for qx in p + 1..m {
                // Givens angles from the (p, q) entries of every
                // eigenmatrix
                let mut gg = Matrix3::<Complex64>::zeros();
                for block in 0..m {
                    let ip = p + block * m;
                    let iq = qx + block * m;
                    let g = [
                        eigenset[(p, ip)] - eigenset[(qx, iq)],
                        eigenset[(p, iq)],
                        eigenset[(qx, ip)],
                    ];
                    for row in 0..3 {
                        for col in 0..3 {
                            gg[(row, col)] += g[row] * g[col].conj();
                        }
                    }
                }
                let projected = b_mat * gg * b_mat.adjoint();
                let real_part = Matrix3::from_fn(|i, j| projected[(i, j)].re);
                let eig3 = SymmetricEigen::new(real_part);

                let mut best = 0;
                for i in 1..3 {
                    if eig3.eigenvalues[i] > eig3.eigenvalues[best] {
                        best = i;
                    }
                }
                let mut angles = eig3.eigenvectors.column(best).into_owned();
                if angles[0] < 0.0 {
                    angles = -angles;
                }

                let cos = (0.5 + angles[0] / 2.0).sqrt();
                let sin = Complex64::new(angles[1], -angles[2]) * (0.5 / cos);
                if sin.norm() <= threshold {
                    continue;
                }
                active = true;

                // Accumulate the rotation
                for row in 0..m {
                    let vp = rotation[(row, p)];
                    let vq = rotation[(row, qx)];
                    rotation[(row, p)] = vp * cos + vq * sin;
                    rotation[(row, qx)] = vq * cos - vp * sin.conj();
                }
                // Rotate the (p, q) rows of every eigenmatrix
                for col in 0..m * m {
                    let rp = eigenset[(p, col)];
                    let rq = eigenset[(qx, col)];
                    eigenset[(p, col)] = rp * cos + rq * sin.conj();
                    eigenset[(qx, col)] = rq * cos - rp * sin;
                }
                // Rotate the (p, q) columns of every eigenmatrix
                for block in 0..m {
                    let ip = p + block * m;
                    let iq = qx + block * m;
                    for row in 0..m {
                        let mp = eigenset[(row, ip)];
                        let mq = eigenset[(row, iq)];
                        eigenset[(row, ip)] = mp * cos + mq * sin;
                        eigenset[(row, iq)] = mq * cos - mp * sin.conj();
                    }
                }
            }
        }
    }

    log::debug!(
        "JADE finished after {} sweep(s) (cap {}), {} components from {} channels",
        sweeps,
        max_iter,
        m,
        n
    );

    let mixing = &dewhitener * &rotation;
    let sources = rotation.adjoint() * y;
    Ok((mixing, sources))
}

/// Indices that sort `values` in ascending order
fn ascending_order(values: &[f64]) -> Vec<usize> {
    let mut order: Vec<usize> = (0..values.len()).collect();
    order.sort_by(|&i, &j| values[i].total_cmp(&values[j]));
    order
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Small deterministic generator for test signals
    struct Lcg(u64);

    impl Lcg {
        fn next_f64(&mut self) -> f64 {
            self.0 = self.0.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
            (self.0 >> 11) as f64 / (1u64 << 53) as f64
        }
    }

    /// Two independent non-Gaussian complex sources: a QPSK stream and a
    /// sparse impulsive stream
    fn test_sources(samples: usize) -> (Vec<Complex64>, Vec<Complex64>) {
        let mut rng = Lcg(0x5eed);
        let mut qpsk = Vec::with_capacity(samples);
        let mut sparse = Vec::with_capacity(samples);
        for _ in 0..samples {
            let re = if rng.next_f64() < 0.5 { -1.0 } else { 1.0 };
            let im = if rng.next_f64() < 0.5 { -1.0 } else { 1.0 };
            qpsk.push(Complex64::new(re, im));

            let active = rng.next_f64() < 0.1;
            let phase = rng.next_f64() * 2.0 * std::f64::consts::PI;
            let amp = if active { 4.0 } else { 0.05 };
            sparse.push(Complex64::from_polar(amp, phase));
        }
        (qpsk, sparse)
    }

    fn mix_2x2(
        s1: &[Complex64],
        s2: &[Complex64],
        a: [[Complex64; 2]; 2],
    ) -> DMatrix<Complex64> {
        DMatrix::from_fn(2, s1.len(), |i, s| a[i][0] * s1[s] + a[i][1] * s2[s])
    }

    fn correlation(u: &[Complex64], v: &[Complex64]) -> f64 {
        let dot: Complex64 = u.iter().zip(v.iter()).map(|(a, b)| a * b.conj()).sum();
        let nu: f64 = u.iter().map(|z| z.norm_sqr()).sum::<f64>().sqrt();
        let nv: f64 = v.iter().map(|z| z.norm_sqr()).sum::<f64>().sqrt();
        dot.norm() / (nu * nv)
    }

    #[test]
    fn test_rejects_bad_dimensions() {
        let x = DMatrix::<Complex64>::zeros(2, 100);
        assert!(matches!(
            cjade(&x, 0, 10),
            Err(SeparationError::DimensionMismatch(_))
        ));
        assert!(matches!(
            cjade(&x, 3, 10),
            Err(SeparationError::DimensionMismatch(_))
        ));

        // More components than samples must also be rejected, even when
        // the channel count would allow them
        let wide = DMatrix::<Complex64>::zeros(8, 4);
        assert!(matches!(
            cjade(&wide, 6, 10),
            Err(SeparationError::DimensionMismatch(_))
        ));
    }

    #[test]
    fn test_full_rank_reconstruction() {
        let (s1, s2) = test_sources(2000);
        let a = [
            [Complex64::new(1.0, 0.0), Complex64::new(0.5, 0.2)],
            [Complex64::new(0.3, -0.1), Complex64::new(1.0, 0.0)],
        ];
        let x = mix_2x2(&s1, &s2, a);

        let (mixing, sources) = cjade(&x, 2, 200).unwrap();
        assert_eq!(mixing.shape(), (2, 2));
        assert_eq!(sources.shape(), (2, 2000));

        // With m == n the product A*S reproduces the input exactly
        let reconstructed = &mixing * &sources;
        let mut err = 0.0;
        let mut norm = 0.0;
        for (got, want) in reconstructed.iter().zip(x.iter()) {
            err += (got - want).norm_sqr();
            norm += want.norm_sqr();
        }
        let rel = (err / norm).sqrt();
        println!("reconstruction relative error: {:.2e}", rel);
        assert!(rel < 1e-8, "reconstruction error too large: {}", rel);
    }

    #[test]
    fn test_separates_independent_sources() {
        let (s1, s2) = test_sources(2000);
        let a = [
            [Complex64::new(1.0, 0.0), Complex64::new(0.6, 0.3)],
            [Complex64::new(0.4, -0.2), Complex64::new(1.0, 0.0)],
        ];
        let x = mix_2x2(&s1, &s2, a);

        let (_, sources) = cjade(&x, 2, 200).unwrap();
        let row0: Vec<Complex64> = sources.row(0).iter().copied().collect();
        let row1: Vec<Complex64> = sources.row(1).iter().copied().collect();

        // Each true source must line up with one recovered component (up
        // to permutation, scale and phase)
        for truth in [&s1, &s2] {
            let c0 = correlation(truth, &row0);
            let c1 = correlation(truth, &row1);
            let best = c0.max(c1);
            println!("source correlation: {:.3} / {:.3}", c0, c1);
            assert!(best > 0.8, "source not recovered: {:.3} / {:.3}", c0, c1);
        }
    }

    #[test]
    fn test_reduced_rank_shapes() {
        let (s1, s2) = test_sources(1500);
        // Three observed channels of a two-source mixture
        let x = DMatrix::from_fn(3, 1500, |i, s| match i {
            0 => s1[s] + s2[s] * Complex64::new(0.2, 0.1),
            1 => s1[s] * Complex64::new(0.5, -0.3) + s2[s],
            _ => s1[s] * Complex64::new(0.25, 0.0) + s2[s] * Complex64::new(0.7, 0.2),
        });

        let (mixing, sources) = cjade(&x, 2, 200).unwrap();
        assert_eq!(mixing.shape(), (3, 2));
        assert_eq!(sources.shape(), (2, 1500));
        assert!(mixing.iter().all(|z| z.re.is_finite() && z.im.is_finite()));
        assert!(sources.iter().all(|z| z.re.is_finite() && z.im.is_finite()));
    }

    #[test]
    fn test_zero_input_stays_finite() {
        let x = DMatrix::<Complex64>::zeros(8, 64);
        let (mixing, sources) = cjade(&x, 2, 50).unwrap();
        assert!(mixing.iter().all(|z| z.re.is_finite() && z.im.is_finite()));
        assert!(sources.iter().all(|z| z.norm() < 1e-12));
    }
}
