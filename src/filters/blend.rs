// SPDX-License-Identifier: GPL-3.0-only

//! Blend mode formulas
//!
//! Channels are normalized to [0, 1]. `s` is the layer color, `d` the color
//! already on the canvas. Blending is separable and the blended color is
//! mixed in by the layer's alpha:
//!
//! ```text
//! out = d * (1 - a) + B(s, d) * a
//! ```

use super::definition::BlendMode;

impl BlendMode {
    /// Blend one channel
    #[inline]
    pub fn apply(self, s: f32, d: f32) -> f32 {
        match self {
            BlendMode::Normal => s,
            BlendMode::Screen => s + d - s * d,
            BlendMode::Multiply => s * d,
            BlendMode::Overlay => {
                if d <= 0.5 {
                    2.0 * s * d
                } else {
                    1.0 - 2.0 * (1.0 - s) * (1.0 - d)
                }
            }
        }
    }
}

/// Composite a straight-alpha layer color over an opaque canvas pixel
#[inline]
pub fn blend_pixel(mode: BlendMode, dst: &mut [f32; 3], src: [f32; 3], alpha: f32) {
    if alpha <= 0.0 {
        return;
    }
    let alpha = alpha.min(1.0);
    for (d, s) in dst.iter_mut().zip(src) {
        let blended = mode.apply(s, *d);
        *d = (*d * (1.0 - alpha) + blended * alpha).clamp(0.0, 1.0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MODES: [BlendMode; 4] = [
        BlendMode::Normal,
        BlendMode::Screen,
        BlendMode::Overlay,
        BlendMode::Multiply,
    ];

    #[test]
    fn test_screen_white_is_white() {
        for d in [0.0, 0.25, 0.5, 1.0] {
            assert_eq!(BlendMode::Screen.apply(1.0, d), 1.0);
        }
    }

    #[test]
    fn test_screen_black_is_identity() {
        for d in [0.0, 0.3, 0.8] {
            assert_eq!(BlendMode::Screen.apply(0.0, d), d);
        }
    }

    #[test]
    fn test_overlay_branches() {
        assert_eq!(BlendMode::Overlay.apply(0.5, 0.25), 0.25);
        assert_eq!(BlendMode::Overlay.apply(0.5, 0.75), 0.75);
        assert_eq!(BlendMode::Overlay.apply(1.0, 0.75), 1.0);
        assert_eq!(BlendMode::Overlay.apply(0.0, 0.25), 0.0);
    }

    #[test]
    fn test_multiply() {
        assert_eq!(BlendMode::Multiply.apply(0.5, 0.5), 0.25);
        assert_eq!(BlendMode::Multiply.apply(1.0, 0.4), 0.4);
    }

    #[test]
    fn test_transparent_layer_leaves_canvas() {
        for mode in MODES {
            let mut px = [0.2, 0.4, 0.6];
            blend_pixel(mode, &mut px, [1.0, 1.0, 1.0], 0.0);
            assert_eq!(px, [0.2, 0.4, 0.6]);
        }
    }

    #[test]
    fn test_half_alpha_normal() {
        let mut px = [0.0, 0.0, 1.0];
        blend_pixel(BlendMode::Normal, &mut px, [1.0, 1.0, 1.0], 0.5);
        assert_eq!(px, [0.5, 0.5, 1.0]);
    }
}
