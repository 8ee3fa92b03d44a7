//! End-to-end tests for the separation pipeline: component counts, output
//! lengths, determinism, the silence and rank-failure scenarios, and the
//! transpose equivalence at full rank.

use cseparate::error::SeparationError;
use cseparate::window::WindowType;
use cseparate::{
    FactorizationMethod, Separator, SeparatorConfig, SpectrumEncoding, StftConfig,
};
use std::f64::consts::PI;

const SAMPLE_RATE: f64 = 8000.0;

fn small_stft() -> StftConfig {
    StftConfig::new(256, 256, 64, WindowType::Hanning).unwrap()
}

/// Two tones plus a small deterministic noise floor, so every frequency
/// bin carries energy well above numerical noise
fn two_tone_signal(samples: usize) -> Vec<f64> {
    let mut state = 0x1234_5678_9abc_def0u64;
    (0..samples)
        .map(|i| {
            state = state
                .wrapping_mul(6364136223846793005)
                .wrapping_add(1442695040888963407);
            let noise = ((state >> 11) as f64 / (1u64 << 53) as f64) - 0.5;
            let t = i as f64 / SAMPLE_RATE;
            (2.0 * PI * 440.0 * t).sin() + 0.6 * (2.0 * PI * 1375.0 * t).sin() + 2e-3 * noise
        })
        .collect()
}

fn svd_config(m: usize) -> SeparatorConfig {
    SeparatorConfig {
        num_components: m,
        stft: small_stft(),
        pre_emphasis: false,
        encoding: SpectrumEncoding::ComplexRelativePhase,
        method: FactorizationMethod::Svd,
        transpose_spectrum: false,
        per_component_magnitude: false,
    }
}

#[test]
fn component_count_and_lengths_are_invariant() {
    let signal = two_tone_signal(4000);
    let expected_len = small_stft().output_length(small_stft().num_frames(signal.len()));

    let mut variants = Vec::new();
    for &encoding in &[
        SpectrumEncoding::ComplexRelativePhase,
        SpectrumEncoding::MagnitudeOnly,
    ] {
        for &transpose in &[false, true] {
            for &pre_emphasis in &[false, true] {
                let mut config = svd_config(3);
                config.encoding = encoding;
                config.transpose_spectrum = transpose;
                config.pre_emphasis = pre_emphasis;
                variants.push(config);
            }
        }
    }

    for config in variants {
        let result = Separator::new(config).unwrap().separate(&signal).unwrap();
        assert_eq!(result.components.len(), 3, "config {:?}", config);
        assert_eq!(result.mix.len(), expected_len, "config {:?}", config);
        for component in &result.components {
            assert_eq!(component.len(), expected_len, "config {:?}", config);
        }
    }
}

#[test]
fn svd_path_is_deterministic() {
    let signal = two_tone_signal(4000);
    let config = svd_config(4);

    let first = Separator::new(config).unwrap().separate(&signal).unwrap();
    let second = Separator::new(config).unwrap().separate(&signal).unwrap();

    assert_eq!(first.mix, second.mix);
    for (a, b) in first.components.iter().zip(second.components.iter()) {
        assert_eq!(a, b);
    }
}

#[test]
fn svd_mix_carries_signal_energy() {
    let signal = two_tone_signal(4000);
    let result = Separator::new(svd_config(2))
        .unwrap()
        .separate(&signal)
        .unwrap();

    let peak = result.mix.iter().fold(0.0f64, |acc, &v| acc.max(v.abs()));
    assert!(peak > 1e-3, "mix unexpectedly silent (peak {})", peak);
    assert!(result.mix.iter().all(|v| v.is_finite()));
}

#[test]
fn jade_path_produces_finite_output() {
    let signal = two_tone_signal(4000);
    let mut config = svd_config(2);
    config.method = FactorizationMethod::Jade { max_iter: 100 };

    let result = Separator::new(config).unwrap().separate(&signal).unwrap();
    assert_eq!(result.components.len(), 2);

    let expected_len = small_stft().output_length(small_stft().num_frames(signal.len()));
    assert_eq!(result.mix.len(), expected_len);
    assert!(result.mix.iter().all(|v| v.is_finite()));
    for component in &result.components {
        assert_eq!(component.len(), expected_len);
        assert!(component.iter().all(|v| v.is_finite()));
    }
}

#[test]
fn silence_separates_to_silence() {
    // Default flags (JADE, pre-emphasis, complex relative phase) on half a
    // second of silence
    let config = SeparatorConfig {
        num_components: 2,
        stft: small_stft(),
        ..SeparatorConfig::default()
    };
    let signal = vec![0.0; 4000];

    let result = Separator::new(config).unwrap().separate(&signal).unwrap();
    assert_eq!(result.components.len(), 2);

    let mix_peak = result.mix.iter().fold(0.0f64, |acc, &v| acc.max(v.abs()));
    assert!(mix_peak < 1e-6, "mix not silent (peak {})", mix_peak);
    for component in &result.components {
        let peak = component.iter().fold(0.0f64, |acc, &v| acc.max(v.abs()));
        assert!(peak < 1e-6, "component not silent (peak {})", peak);
    }
}

#[test]
fn excessive_rank_request_propagates() {
    let signal = two_tone_signal(4000);
    // 100 components from a 129-bin x 59-frame spectrum
    let result = Separator::new(svd_config(100)).unwrap().separate(&signal);
    assert!(matches!(
        result,
        Err(SeparationError::DimensionMismatch(_))
    ));

    // The frame count caps the rank on the JADE path too: 512 samples
    // give a 129-bin x 5-frame spectrum, so 10 components must fail even
    // though there are enough bins
    let short_signal = two_tone_signal(512);
    let mut jade_config = svd_config(10);
    jade_config.method = FactorizationMethod::Jade { max_iter: 100 };
    let result = Separator::new(jade_config).unwrap().separate(&short_signal);
    assert!(matches!(
        result,
        Err(SeparationError::DimensionMismatch(_))
    ));
}

#[test]
fn transpose_is_equivalent_at_full_rank() {
    let signal = two_tone_signal(4000);
    let stft = small_stft();
    let full_rank = stft.num_frames(signal.len()).min(stft.bins());

    let plain = Separator::new(svd_config(full_rank))
        .unwrap()
        .separate(&signal)
        .unwrap();

    let mut transposed_config = svd_config(full_rank);
    transposed_config.transpose_spectrum = true;
    let transposed = Separator::new(transposed_config)
        .unwrap()
        .separate(&signal)
        .unwrap();

    // At full rank both factorizations reconstruct the identical spectrum,
    // so the re-mixed output must agree within floating tolerance
    assert_eq!(plain.mix.len(), transposed.mix.len());
    let max_diff = plain
        .mix
        .iter()
        .zip(transposed.mix.iter())
        .fold(0.0f64, |acc, (a, b)| acc.max((a - b).abs()));
    println!("full-rank transpose max deviation: {:.2e}", max_diff);
    assert!(max_diff < 1e-5, "outputs diverge at full rank: {}", max_diff);
}
