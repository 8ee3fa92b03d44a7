//! Cseparate Library
//!
//! A library for complex-valued frequency-domain blind source separation.
//! Decomposes a single-channel recording's STFT into independent components
//! (complex-domain JADE ICA or SVD) using a relative-phase spectral
//! representation, then reconstructs the separated time-domain signals.

pub mod error;
pub mod factorize;
pub mod jade;
pub mod preemphasis;
pub mod separate;
pub mod stft;
pub mod window;

pub use error::{Result, SeparationError};
pub use factorize::FactorizationMethod;
pub use num_complex::Complex64;
pub use separate::{Separation, Separator, SeparatorConfig, SpectrumEncoding};
pub use stft::{SpectralAnalyzer, StftConfig};

/// Version of the library
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Initialize the library
///
/// Sets up logging for binaries and tests that want it.
pub fn init() {
    #[cfg(feature = "env_logger")]
    {
        let _ = env_logger::try_init();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init() {
        init();
        assert!(!VERSION.is_empty());
    }
}
