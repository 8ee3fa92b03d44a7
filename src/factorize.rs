//! Spectral matrix factorization strategies
//!
//! Decomposes a complex spectral matrix into a mixing matrix `A` and a
//! source matrix `S` such that `A * S` approximates the input. The
//! strategy is resolved once at configuration time rather than branched
//! per stage.

use crate::error::{Result, SeparationError};
use crate::jade::cjade;
use nalgebra::DMatrix;
use num_complex::Complex64;

/// Factorization strategy for the spectral matrix
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FactorizationMethod {
    /// Complex-domain JADE ICA with a sweep cap; components are
    /// statistically independent but not orthogonal
    Jade { max_iter: usize },
    /// Truncated singular value decomposition; `A * S` is the best rank-M
    /// approximation in Frobenius norm and the computation is
    /// deterministic
    Svd,
}

impl Default for FactorizationMethod {
    fn default() -> Self {
        FactorizationMethod::Jade { max_iter: 200 }
    }
}

impl FactorizationMethod {
    /// Factorize `spectrum` (rows x cols) into `A` (rows x m) and `S`
    /// (m x cols)
    pub fn factorize(
        &self,
        spectrum: &DMatrix<Complex64>,
        m: usize,
    ) -> Result<(DMatrix<Complex64>, DMatrix<Complex64>)> {
        match self {
            FactorizationMethod::Jade { max_iter } => cjade(spectrum, m, *max_iter),
            FactorizationMethod::Svd => svd_factorize(spectrum, m),
        }
    }
}

/// Rank-m factorization from the singular value decomposition
fn svd_factorize(
    x: &DMatrix<Complex64>,
    m: usize,
) -> Result<(DMatrix<Complex64>, DMatrix<Complex64>)> {
    let rank_limit = x.nrows().min(x.ncols());
    if m == 0 || m > rank_limit {
        return Err(SeparationError::DimensionMismatch(format!(
            "requested {} components from a {} x {} spectrum (max rank {})",
            m,
            x.nrows(),
            x.ncols(),
            rank_limit
        )));
    }

    let svd = x.clone().svd(true, true);
    let u = svd
        .u
        .ok_or_else(|| SeparationError::Factorization("SVD did not produce U".to_string()))?;
    let v_t = svd
        .v_t
        .ok_or_else(|| SeparationError::Factorization("SVD did not produce V^H".to_string()))?;

    // Left singular vectors scaled by their singular values, and the
    // first m rows of V^H
    let mixing = DMatrix::from_fn(x.nrows(), m, |i, j| u[(i, j)] * svd.singular_values[j]);
    let sources = v_t.rows(0, m).into_owned();

    Ok((mixing, sources))
}
