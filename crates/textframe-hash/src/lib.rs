//! DCT-based perceptual hashing for frame similarity.
//!
//! A frame is normalized to a fixed square, downsampled, transformed with a
//! 2D DCT, and reduced to a 64-bit fingerprint from the sign pattern of the
//! low-frequency block. Hashes are compared by Hamming distance: small
//! distance, visually similar frames.

use textframe_types::RgbFrame;

pub mod ops;

use ops::{dct2, luminance, resize_average};

/// Scale-normalization size applied before hashing.
const NORMALIZED_SIZE: usize = 256;
/// DCT input size.
const SAMPLE_SIZE: usize = 32;
/// Low-frequency block kept from the spectrum; BLOCK_SIZE^2 bits.
const BLOCK_SIZE: usize = 8;

/// 64-bit perceptual fingerprint of a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Fingerprint(u64);

impl Fingerprint {
    pub fn from_bits(bits: u64) -> Fingerprint {
        Fingerprint(bits)
    }

    pub fn bits(&self) -> u64 {
        self.0
    }

    /// Hamming distance. Symmetric, non-negative, zero for equal hashes.
    pub fn distance(&self, other: &Fingerprint) -> u32 {
        (self.0 ^ other.0).count_ones()
    }
}

/// Computes the perceptual hash of a frame. Deterministic, no side effects.
pub fn phash(frame: &RgbFrame) -> Fingerprint {
    let luma = luminance(frame);
    let normalized = resize_average(
        &luma,
        frame.width() as usize,
        frame.height() as usize,
        NORMALIZED_SIZE,
        NORMALIZED_SIZE,
    );
    let sampled = resize_average(
        &normalized,
        NORMALIZED_SIZE,
        NORMALIZED_SIZE,
        SAMPLE_SIZE,
        SAMPLE_SIZE,
    );
    let spectrum = dct2(&sampled, SAMPLE_SIZE, SAMPLE_SIZE);

    let mut bits = [0.0f32; BLOCK_SIZE * BLOCK_SIZE];
    for by in 0..BLOCK_SIZE {
        for bx in 0..BLOCK_SIZE {
            bits[by * BLOCK_SIZE + bx] = spectrum[by * SAMPLE_SIZE + bx];
        }
    }
    // The DC term only tracks overall brightness; bits come from the AC
    // coefficients against their mean.
    let mean: f32 = bits.iter().skip(1).copied().sum::<f32>() / (bits.len() as f32 - 1.0);
    let mut hash = 0u64;
    for (idx, value) in bits.iter().enumerate() {
        if idx == 0 {
            continue;
        }
        if *value > mean {
            hash |= 1u64 << idx;
        }
    }
    Fingerprint(hash)
}
