//! Window functions for STFT analysis
//!
//! Analysis and synthesis share the same window; the synthesizer
//! compensates for the overlapped squared window, so any of these types
//! gives exact interior reconstruction.

use std::f64::consts::PI;
use std::fmt;

/// Window function types available for STFT analysis
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowType {
    /// Hanning window (recommended default)
    Hanning,
    /// Hamming window
    Hamming,
    /// Rectangular window (no windowing)
    Rectangular,
    /// Bartlett (triangular) window
    Bartlett,
}

impl Default for WindowType {
    fn default() -> Self {
        WindowType::Hanning
    }
}

impl fmt::Display for WindowType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl WindowType {
    /// Get all available window types
    pub fn all() -> &'static [WindowType] {
        &[
            WindowType::Hanning,
            WindowType::Hamming,
            WindowType::Rectangular,
            WindowType::Bartlett,
        ]
    }

    /// Get the name of the window type
    pub fn name(&self) -> &'static str {
        match self {
            WindowType::Hanning => "Hanning",
            WindowType::Hamming => "Hamming",
            WindowType::Rectangular => "Rectangular",
            WindowType::Bartlett => "Bartlett",
        }
    }
}

/// Generate a window function of the specified type and size
pub fn generate_window(window_type: WindowType, size: usize) -> Vec<f64> {
    let n = size as f64 - 1.0;
    (0..size)
        .map(|i| {
            let x = i as f64;
            match window_type {
                WindowType::Hanning => 0.5 * (1.0 - (2.0 * PI * x / n).cos()),
                WindowType::Hamming => 0.54 - 0.46 * (2.0 * PI * x / n).cos(),
                WindowType::Rectangular => 1.0,
                WindowType::Bartlett => {
                    if x <= n / 2.0 {
                        2.0 * x / n
                    } else {
                        2.0 * (n - x) / n
                    }
                }
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_window_generation() {
        let size = 512;

        for &window_type in WindowType::all() {
            let window = generate_window(window_type, size);
            assert_eq!(window.len(), size);

            // All windows should have non-negative values
            assert!(window.iter().all(|&w| w >= 0.0));

            if window_type == WindowType::Rectangular {
                assert!(window.iter().all(|&w| (w - 1.0).abs() < 1e-10));
            }
        }
    }

    #[test]
    fn test_window_symmetry() {
        for &window_type in WindowType::all() {
            let window = generate_window(window_type, 512);
            for i in 0..window.len() / 2 {
                let left = window[i];
                let right = window[window.len() - 1 - i];
                assert!(
                    (left - right).abs() < 1e-10,
                    "{} window not symmetric at position {}: {} != {}",
                    window_type,
                    i,
                    left,
                    right
                );
            }
        }
    }

    #[test]
    fn test_hanning_endpoints() {
        let window = generate_window(WindowType::Hanning, 256);
        assert!(window[0].abs() < 1e-12);
        assert!(window[255].abs() < 1e-12);
        // Peak at the center
        assert!((window[127] - 1.0).abs() < 1e-3);
    }
}
