//! Reshaping between rollout tensors and the (batch, features) matrices
//! the networks consume.

use hgn_types::constants::ENCODER_FRAMES;
use hgn_types::error::{HgnError, HgnResult};
use ndarray::{s, Array2, Array4, Array5};

/// Stack the first two frames along the channel axis and flatten:
/// (batch, T, C, H, W) → (batch, 2·C·H·W).
///
/// Row layout is frame 0's channels followed by frame 1's, which is the
/// flattening of the (batch, 2C, H, W) channel concatenation.
pub fn concat_frame_pair(rollouts: &Array5<f64>) -> HgnResult<Array2<f64>> {
    let (batch, steps, channels, height, width) = rollouts.dim();
    if steps < ENCODER_FRAMES {
        return Err(HgnError::shape(format!(
            "encoder input needs at least {ENCODER_FRAMES} frames, rollout has {steps}"
        )));
    }
    let pair = rollouts.slice(s![.., 0..ENCODER_FRAMES, .., .., ..]);
    let data: Vec<f64> = pair.iter().copied().collect();
    Array2::from_shape_vec((batch, ENCODER_FRAMES * channels * height * width), data)
        .map_err(|e| HgnError::shape(format!("cannot flatten frame pair: {e}")))
}

/// Flatten the first `steps` frames, time-major: (batch, steps·C·H·W).
pub fn flatten_frames(rollouts: &Array5<f64>, steps: usize) -> HgnResult<Array2<f64>> {
    let (batch, available, channels, height, width) = rollouts.dim();
    if steps == 0 || steps > available {
        return Err(HgnError::shape(format!(
            "cannot take {steps} frames from a rollout of {available}"
        )));
    }
    let frames = rollouts.slice(s![.., 0..steps, .., .., ..]);
    let data: Vec<f64> = frames.iter().copied().collect();
    Array2::from_shape_vec((batch, steps * channels * height * width), data)
        .map_err(|e| HgnError::shape(format!("cannot flatten frames: {e}")))
}

/// (batch, C·H·W) → (batch, C, H, W).
pub fn unflatten_frame(
    flat: &Array2<f64>,
    channels: usize,
    height: usize,
    width: usize,
) -> HgnResult<Array4<f64>> {
    let (batch, len) = flat.dim();
    if len != channels * height * width {
        return Err(HgnError::shape(format!(
            "decoded frame has {len} values, expected {channels}x{height}x{width}"
        )));
    }
    let data: Vec<f64> = flat.iter().copied().collect();
    Array4::from_shape_vec((batch, channels, height, width), data)
        .map_err(|e| HgnError::shape(format!("cannot reshape decoded frame: {e}")))
}
