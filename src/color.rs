// src/color.rs

//! Defines `ColorBgra`, the packed 32-bit pixel type used by every surface
//! in the crate, plus the rounding helpers shared by the blending code.
//!
//! Channel order in memory is B, G, R, A (the layout display servers such
//! as X11 expect for 32-bit visuals). Packed as a `u32` on little-endian
//! this reads `0xAARRGGBB`. Equality is bitwise.

use serde::{Deserialize, Serialize};

/// A 32-bit BGRA color. Four 8-bit channels, losslessly packed.
///
/// The struct is `#[repr(C)]` so a `[ColorBgra]` slice has exactly the
/// byte layout of a BGRA pixel row, which the codec and the raw render
/// target rely on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[repr(C)]
pub struct ColorBgra {
    /// Blue channel.
    pub b: u8,
    /// Green channel.
    pub g: u8,
    /// Red channel.
    pub r: u8,
    /// Alpha channel. 0 = fully transparent, 255 = fully opaque.
    pub a: u8,
}

impl ColorBgra {
    /// Fully transparent black. The "cleared" pixel value.
    pub const TRANSPARENT: ColorBgra = ColorBgra::from_bgra(0, 0, 0, 0);
    /// Opaque white.
    pub const WHITE: ColorBgra = ColorBgra::from_bgra(255, 255, 255, 255);
    /// Opaque black.
    pub const BLACK: ColorBgra = ColorBgra::from_bgra(0, 0, 0, 255);

    /// Size of one pixel in bytes.
    pub const SIZE_OF: usize = 4;

    /// Creates a color from explicit channel values, in B, G, R, A order.
    #[inline]
    pub const fn from_bgra(b: u8, g: u8, r: u8, a: u8) -> Self {
        Self { b, g, r, a }
    }

    /// Creates an opaque color from R, G, B channel values.
    #[inline]
    pub const fn from_rgb(r: u8, g: u8, b: u8) -> Self {
        Self { b, g, r, a: 255 }
    }

    /// Unpacks a color from its `u32` form (`0xAARRGGBB`).
    #[inline]
    pub const fn from_u32(bgra: u32) -> Self {
        let [b, g, r, a] = bgra.to_le_bytes();
        Self { b, g, r, a }
    }

    /// Packs the color into its `u32` form (`0xAARRGGBB`).
    #[inline]
    pub const fn to_u32(self) -> u32 {
        u32::from_le_bytes([self.b, self.g, self.r, self.a])
    }

    /// Returns the same color with a replaced alpha channel.
    #[inline]
    pub const fn new_alpha(self, a: u8) -> Self {
        Self { a, ..self }
    }

    /// True when the pixel is fully opaque.
    #[inline]
    pub const fn is_opaque(self) -> bool {
        self.a == 255
    }

    /// True when the pixel is fully transparent.
    #[inline]
    pub const fn is_transparent(self) -> bool {
        self.a == 0
    }
}

/// Divides by 255 with exact round-to-nearest, for `v <= 255 * 255`.
///
/// The canonical fixed-point trick: `(v + 128 + ((v + 128) >> 8)) >> 8`
/// equals `round(v / 255)` over the full input range, without a division.
#[inline]
pub(crate) const fn div_255_round(v: u32) -> u8 {
    let v = v + 128;
    ((v + (v >> 8)) >> 8) as u8
}

/// Multiplies two channel values as if they were fractions of 255,
/// rounding to nearest: `round(a * b / 255)`.
#[inline]
pub(crate) const fn mul_255(a: u8, b: u8) -> u8 {
    div_255_round(a as u32 * b as u32)
}

/// Linear interpolation from `from` toward `to` by `frac`/255, rounding to
/// nearest. `frac == 0` yields `from`, `frac == 255` yields `to`.
#[inline]
pub(crate) const fn lerp_channel(from: u8, to: u8, frac: u8) -> u8 {
    div_255_round(from as u32 * (255 - frac) as u32 + to as u32 * frac as u32)
}
