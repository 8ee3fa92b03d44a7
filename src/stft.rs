//! Short-Time Fourier Transform analysis with relative phase
//!
//! Forward analysis produces the complex STFT together with a
//! relative-phase map: the phase of each time-frequency cell expressed as
//! the frame-to-frame difference minus the expected per-bin advance,
//! wrapped to (-pi, pi]. This representation is numerically friendlier to
//! factorization than absolute phase. Absolute phase is recovered by
//! cumulative summation (see [`reconstruct_phase`]).
//!
//! The inverse takes a magnitude matrix and an absolute phase matrix and
//! resynthesizes a time-domain signal by windowed overlap-add.

use crate::error::{Result, SeparationError};
use crate::window::{generate_window, WindowType};
use nalgebra::{DMatrix, DVector};
use num_complex::Complex64;
use realfft::{ComplexToReal, RealFftPlanner, RealToComplex};
use std::f64::consts::PI;
use std::sync::Arc;

/// STFT configuration parameters
#[derive(Debug, Clone, Copy)]
pub struct StftConfig {
    /// FFT size in samples, must be a power of 2
    pub fft_size: usize,
    /// Window length in samples; frames are zero-padded with
    /// `fft_size - window_size` zeros before the transform
    pub window_size: usize,
    /// Hop size in samples (step between consecutive frames)
    pub hop_size: usize,
    /// Window function type
    pub window_type: WindowType,
}

impl Default for StftConfig {
    fn default() -> Self {
        Self {
            fft_size: 4096,
            window_size: 4096,
            hop_size: 1024,
            window_type: WindowType::Hanning,
        }
    }
}

impl StftConfig {
    /// Create a new STFT configuration with validation
    pub fn new(
        fft_size: usize,
        window_size: usize,
        hop_size: usize,
        window_type: WindowType,
    ) -> Result<Self> {
        if !fft_size.is_power_of_two() || fft_size < 2 || fft_size > 65536 {
            return Err(SeparationError::Stft(format!(
                "FFT size must be a power of 2 between 2 and 65536, got {}",
                fft_size
            )));
        }

        if window_size < 2 || window_size > fft_size {
            return Err(SeparationError::Stft(format!(
                "Window size must be between 2 and the FFT size ({}), got {}",
                fft_size, window_size
            )));
        }

        if hop_size < 1 || hop_size > window_size {
            return Err(SeparationError::Stft(format!(
                "Hop size must be between 1 and the window size ({}), got {}",
                window_size, hop_size
            )));
        }

        Ok(Self {
            fft_size,
            window_size,
            hop_size,
            window_type,
        })
    }

    /// Get the number of frequency bins (complex values per frame)
    pub fn bins(&self) -> usize {
        self.fft_size / 2 + 1
    }

    /// Get the expected number of frames for the given signal length
    pub fn num_frames(&self, signal_length: usize) -> usize {
        if signal_length < self.window_size {
            0
        } else {
            (signal_length - self.window_size) / self.hop_size + 1
        }
    }

    /// Length of the signal produced by the inverse transform for the
    /// given number of frames
    pub fn output_length(&self, num_frames: usize) -> usize {
        if num_frames == 0 {
            0
        } else {
            (num_frames - 1) * self.hop_size + self.window_size
        }
    }
}

/// Result of a forward STFT analysis
#[derive(Debug, Clone)]
pub struct SpectralAnalysis {
    /// Complex STFT, shape (bins x frames)
    pub stft: DMatrix<Complex64>,
    /// Relative-phase map, shape (bins x frames); column 0 holds the
    /// absolute phase of the first frame, later columns hold the wrapped
    /// frame-to-frame phase difference minus the expected bin advance
    pub rel_phase: DMatrix<f64>,
    /// Expected phase advance per hop for each bin: 2*pi*H*k/N
    pub bin_phase_advance: DVector<f64>,
}

impl SpectralAnalysis {
    /// Magnitude spectrum, shape (bins x frames)
    pub fn magnitude(&self) -> DMatrix<f64> {
        self.stft.map(|z| z.norm())
    }

    /// Number of frequency bins
    pub fn bins(&self) -> usize {
        self.stft.nrows()
    }

    /// Number of analysis frames
    pub fn frames(&self) -> usize {
        self.stft.ncols()
    }
}

/// STFT analyzer providing the forward transform with relative phase and
/// the magnitude/phase inverse transform
pub struct SpectralAnalyzer {
    config: StftConfig,
    window: Vec<f64>,
    fft: Arc<dyn RealToComplex<f64>>,
    ifft: Arc<dyn ComplexToReal<f64>>,
}

impl SpectralAnalyzer {
    /// Create a new analyzer for the given configuration
    pub fn new(config: StftConfig) -> Result<Self> {
        let window = generate_window(config.window_type, config.window_size);

        let mut planner = RealFftPlanner::<f64>::new();
        let fft = planner.plan_fft_forward(config.fft_size);
        let ifft = planner.plan_fft_inverse(config.fft_size);

        Ok(Self {
            config,
            window,
            fft,
            ifft,
        })
    }

    /// Get the configuration
    pub fn config(&self) -> &StftConfig {
        &self.config
    }

    /// Analyze a signal and return the STFT with its relative-phase map
    pub fn analyze(&self, signal: &[f64]) -> Result<SpectralAnalysis> {
        let window_size = self.config.window_size;
        let hop_size = self.config.hop_size;
        let fft_size = self.config.fft_size;
        let bins = self.config.bins();

        if signal.len() < window_size {
            return Err(SeparationError::DimensionMismatch(format!(
                "signal length {} is shorter than the window size {}",
                signal.len(),
                window_size
            )));
        }

        let num_frames = self.config.num_frames(signal.len());
        let mut stft = DMatrix::<Complex64>::zeros(bins, num_frames);

        let mut frame_buf = vec![0.0; fft_size];
        let mut spectrum = self.fft.make_output_vec();

        for frame in 0..num_frames {
            let start = frame * hop_size;

            // Window the segment, zero-pad to the FFT size
            for i in 0..window_size {
                frame_buf[i] = signal[start + i] * self.window[i];
            }
            for value in frame_buf[window_size..].iter_mut() {
                *value = 0.0;
            }

            self.fft
                .process(&mut frame_buf, &mut spectrum)
                .map_err(|e| SeparationError::Stft(format!("FFT error: {}", e)))?;

            for (k, &value) in spectrum.iter().enumerate() {
                stft[(k, frame)] = value;
            }
        }

        let bin_phase_advance = DVector::from_fn(bins, |k, _| {
            2.0 * PI * (hop_size as f64) * (k as f64) / (fft_size as f64)
        });
        let rel_phase = phase_map(&stft, &bin_phase_advance);

        log::debug!(
            "STFT analysis: {} bins x {} frames (N={}, W={}, H={})",
            bins,
            num_frames,
            fft_size,
            window_size,
            hop_size
        );

        Ok(SpectralAnalysis {
            stft,
            rel_phase,
            bin_phase_advance,
        })
    }

    /// Resynthesize a signal from a magnitude matrix and an absolute phase
    /// matrix, both shaped (bins x frames)
    ///
    /// When `use_window` is set the synthesis window is applied before
    /// overlap-add and the result is normalized by the accumulated squared
    /// window, which gives exact interior reconstruction for unmodified
    /// spectra.
    pub fn inverse(
        &self,
        magnitude: &DMatrix<f64>,
        phase: &DMatrix<f64>,
        use_window: bool,
    ) -> Result<Vec<f64>> {
        let bins = self.config.bins();
        let window_size = self.config.window_size;
        let hop_size = self.config.hop_size;
        let fft_size = self.config.fft_size;

        if magnitude.nrows() != bins || phase.nrows() != bins {
            return Err(SeparationError::DimensionMismatch(format!(
                "expected {} bins, got magnitude {} x {} and phase {} x {}",
                bins,
                magnitude.nrows(),
                magnitude.ncols(),
                phase.nrows(),
                phase.ncols()
            )));
        }
        if magnitude.ncols() != phase.ncols() {
            return Err(SeparationError::DimensionMismatch(format!(
                "magnitude has {} frames but phase has {}",
                magnitude.ncols(),
                phase.ncols()
            )));
        }

        let num_frames = magnitude.ncols();
        let output_length = self.config.output_length(num_frames);
        let mut output = vec![0.0; output_length];
        let mut weight_sum = vec![0.0; output_length];

        let mut spectrum = self.ifft.make_input_vec();
        let mut time_data = vec![0.0; fft_size];
        let scale = 1.0 / fft_size as f64;

        for frame in 0..num_frames {
            for k in 0..bins {
                spectrum[k] = Complex64::from_polar(magnitude[(k, frame)], phase[(k, frame)]);
            }
            // The real inverse transform requires purely real DC and
            // Nyquist bins
            spectrum[0] = Complex64::new(spectrum[0].re, 0.0);
            spectrum[bins - 1] = Complex64::new(spectrum[bins - 1].re, 0.0);

            self.ifft
                .process(&mut spectrum, &mut time_data)
                .map_err(|e| SeparationError::Stft(format!("IFFT error: {}", e)))?;

            let start = frame * hop_size;
            for i in 0..window_size {
                let sample = time_data[i] * scale;
                if use_window {
                    output[start + i] += sample * self.window[i];
                    weight_sum[start + i] += self.window[i] * self.window[i];
                } else {
                    output[start + i] += sample;
                    weight_sum[start + i] += self.window[i];
                }
            }
        }

        // Normalize by the accumulated window overlap
        for (sample, &weight) in output.iter_mut().zip(weight_sum.iter()) {
            if weight > 1e-10 {
                *sample /= weight;
            }
        }

        Ok(output)
    }
}

/// Build the relative-phase map from a complex STFT
///
/// Column 0 is the absolute phase of the first frame; column t is the
/// phase difference to frame t-1 minus the expected bin advance. Every
/// entry is wrapped to (-pi, pi].
fn phase_map(stft: &DMatrix<Complex64>, advance: &DVector<f64>) -> DMatrix<f64> {
    let bins = stft.nrows();
    let frames = stft.ncols();

    DMatrix::from_fn(bins, frames, |k, t| {
        let u = if t == 0 {
            stft[(k, 0)].arg()
        } else {
            stft[(k, t)].arg() - stft[(k, t - 1)].arg() - advance[k]
        };
        u - (u / (2.0 * PI)).round() * 2.0 * PI
    })
}

/// Reconstruct absolute phase from a complex spectral contribution
///
/// The phase of each cell plus the per-bin advance is cumulatively summed
/// across frames; the advance is added to every frame including the first,
/// matching the relative-phase encoding produced by [`SpectralAnalyzer::analyze`].
pub fn reconstruct_phase(
    contribution: &DMatrix<Complex64>,
    advance: &DVector<f64>,
) -> Result<DMatrix<f64>> {
    let bins = contribution.nrows();
    let frames = contribution.ncols();

    if advance.len() != bins {
        return Err(SeparationError::DimensionMismatch(format!(
            "phase advance has {} bins but the contribution has {}",
            advance.len(),
            bins
        )));
    }

    let mut phase = DMatrix::<f64>::zeros(bins, frames);
    for k in 0..bins {
        let mut acc = 0.0;
        for t in 0..frames {
            acc += contribution[(k, t)].arg() + advance[k];
            phase[(k, t)] = acc;
        }
    }

    Ok(phase)
}
