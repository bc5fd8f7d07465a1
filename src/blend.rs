// src/blend.rs

//! Blend operations: pure functions combining a destination pixel with a
//! source pixel.
//!
//! The set of ops is closed (a small enum, not an open trait) because
//! layer files store the op by a stable tag name and must round-trip
//! exactly. `Normal` is the default op and participates in the document's
//! bottom-layer fast path; that fast path triggers on *variant identity*,
//! never on behavioral equivalence.
//!
//! Every op is a deterministic function of its two pixel arguments alone,
//! which is what makes parallel invocation over disjoint pixel ranges
//! safe. The batch form `apply_row` is required to produce results
//! bit-identical to the scalar form applied element-wise.

use crate::color::{div_255_round, lerp_channel, ColorBgra};

/// A layer blend operation.
///
/// All ops share one alpha combine: `out.a = src.a + dst.a*(255-src.a)/255`
/// (rounded to nearest). `Normal` interpolates each color channel from dst
/// toward src by src alpha (straight, un-premultiplied); over a fully
/// transparent destination it yields the source pixel verbatim. Every other op
/// first maps each channel pair through its channel function and then
/// interpolates from dst toward that mapped value by src alpha, so a fully
/// opaque source yields the channel function exactly and a fully
/// transparent source leaves the destination untouched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum BlendOp {
    /// Straight alpha "source over" compositing. The default.
    #[default]
    Normal,
    Multiply,
    Additive,
    Darken,
    Lighten,
    Screen,
    Overlay,
    Difference,
    Negation,
    Xor,
}

/// Every variant, in serialization-tag order.
pub const ALL_BLEND_OPS: [BlendOp; 10] = [
    BlendOp::Normal,
    BlendOp::Multiply,
    BlendOp::Additive,
    BlendOp::Darken,
    BlendOp::Lighten,
    BlendOp::Screen,
    BlendOp::Overlay,
    BlendOp::Difference,
    BlendOp::Negation,
    BlendOp::Xor,
];

impl BlendOp {
    /// The stable tag name stored in document files.
    pub fn tag_name(self) -> &'static str {
        match self {
            BlendOp::Normal => "Normal",
            BlendOp::Multiply => "Multiply",
            BlendOp::Additive => "Additive",
            BlendOp::Darken => "Darken",
            BlendOp::Lighten => "Lighten",
            BlendOp::Screen => "Screen",
            BlendOp::Overlay => "Overlay",
            BlendOp::Difference => "Difference",
            BlendOp::Negation => "Negation",
            BlendOp::Xor => "Xor",
        }
    }

    /// Resolves a stored tag name back to its variant.
    pub fn from_tag_name(name: &str) -> Option<BlendOp> {
        ALL_BLEND_OPS.iter().copied().find(|op| op.tag_name() == name)
    }

    /// Combines a destination pixel with a source pixel.
    #[inline]
    pub fn apply(self, dst: ColorBgra, src: ColorBgra) -> ColorBgra {
        if let BlendOp::Normal = self {
            // Over a fully transparent destination the source pixel is the
            // result verbatim, color bytes included. That is exactly what
            // the document's bottom-layer copy produces, which keeps both
            // render paths bit-identical.
            if dst.is_transparent() || src.is_opaque() {
                return src;
            }
            if src.is_transparent() {
                return dst;
            }
            return ColorBgra {
                b: lerp_channel(dst.b, src.b, src.a),
                g: lerp_channel(dst.g, src.g, src.a),
                r: lerp_channel(dst.r, src.r, src.a),
                a: combine_alpha(dst.a, src.a),
            };
        }

        if src.is_transparent() {
            return dst;
        }
        ColorBgra {
            b: lerp_channel(dst.b, self.channel(dst.b, src.b), src.a),
            g: lerp_channel(dst.g, self.channel(dst.g, src.g), src.a),
            r: lerp_channel(dst.r, self.channel(dst.r, src.r), src.a),
            a: combine_alpha(dst.a, src.a),
        }
    }

    /// Applies the op across parallel rows of pixels, in place.
    ///
    /// Bit-identical to calling [`apply`](Self::apply) once per element.
    ///
    /// # Panics
    /// Panics when the rows have different lengths.
    pub fn apply_row(self, dst: &mut [ColorBgra], src: &[ColorBgra]) {
        assert_eq!(dst.len(), src.len(), "blend rows must have equal lengths");
        for (d, s) in dst.iter_mut().zip(src.iter()) {
            *d = self.apply(*d, *s);
        }
    }

    /// An adapter applying this op with its arguments swapped
    /// ("blend behind" semantics).
    #[inline]
    pub fn swap(self) -> SwappedBlendOp {
        SwappedBlendOp(self)
    }

    /// The per-channel function for the non-`Normal` variants.
    #[inline]
    fn channel(self, d: u8, s: u8) -> u8 {
        match self {
            // Normal has no channel function; apply() never routes it here.
            BlendOp::Normal => s,
            BlendOp::Multiply => div_255_round(d as u32 * s as u32),
            BlendOp::Additive => (d as u32 + s as u32).min(255) as u8,
            BlendOp::Darken => d.min(s),
            BlendOp::Lighten => d.max(s),
            BlendOp::Screen => 255 - div_255_round((255 - d as u32) * (255 - s as u32)),
            BlendOp::Overlay => {
                if d < 128 {
                    div_255_round(2 * d as u32 * s as u32)
                } else {
                    255 - div_255_round(2 * (255 - d as u32) * (255 - s as u32))
                }
            }
            BlendOp::Difference => d.abs_diff(s),
            BlendOp::Negation => (255 - (255 - d as i32 - s as i32).abs()) as u8,
            BlendOp::Xor => d ^ s,
        }
    }
}

/// `out.a = src.a + dst.a * (255 - src.a) / 255`, rounded to nearest.
#[inline]
fn combine_alpha(dst_a: u8, src_a: u8) -> u8 {
    src_a + div_255_round(dst_a as u32 * (255 - src_a) as u32)
}

/// Wraps a `BlendOp` so that `apply(a, b)` evaluates the inner op as
/// `apply(b, a)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SwappedBlendOp(pub BlendOp);

impl SwappedBlendOp {
    #[inline]
    pub fn apply(self, dst: ColorBgra, src: ColorBgra) -> ColorBgra {
        self.0.apply(src, dst)
    }

    /// Row form; bit-identical to element-wise `apply`.
    pub fn apply_row(self, dst: &mut [ColorBgra], src: &[ColorBgra]) {
        assert_eq!(dst.len(), src.len(), "blend rows must have equal lengths");
        for (d, s) in dst.iter_mut().zip(src.iter()) {
            *d = self.0.apply(*s, *d);
        }
    }
}
