// src/lib.rs

//! `pdndoc`: a layered raster document engine.
//!
//! The crate models an image as a [`Document`]: a stack of equally-sized
//! BGRA [`Layer`]s composited bottom-up through per-layer [`BlendOp`]s
//! and opacity. Edits report damage as rectangles; the document folds
//! them into a normalized [`Region`] and [`Document::update`] repaints
//! exactly that region into a caller-owned [`Surface`], fanned out
//! across worker threads.
//!
//! Documents serialize to the `PDN3` container: an XML header carrying
//! application passenger data plus a versioned, optionally gzipped
//! binary body. See [`Document::save_to_stream`] and
//! [`Document::from_stream`].

mod blend;
mod codec;
mod color;
mod document;
mod error;
mod layer;
mod layer_list;
mod metadata;
mod palette;
mod rect;
mod region;
mod scheduler;
mod surface;

pub use blend::{BlendOp, SwappedBlendOp, ALL_BLEND_OPS};
pub use codec::{ProgressFn, SaveOptions, Version, MAGIC_BYTES};
pub use color::ColorBgra;
pub use document::{
    DirtyChangedHook, Document, ImageSource, InvalidatedHook, LayersGuard, SourceFormat,
};
pub use error::DocumentError;
pub use layer::{Layer, LayerFlags};
pub use layer_list::LayerList;
pub use metadata::Metadata;
pub use palette::{format_palette, parse_palette, PALETTE_SIZE};
pub use rect::Rect;
pub use region::Region;
pub use surface::{Surface, SurfaceWindow};
