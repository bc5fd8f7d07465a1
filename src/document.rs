// src/document.rs

//! `Document`: a layered raster image and its compositing engine.
//!
//! A document owns a stack of equally-sized BGRA layers, an accumulated
//! region of pending damage, and a render scheduler. Rendering is
//! bottom-up: the lowest layer paints first, each higher layer blends
//! over the result. `update` is the incremental path: it composites
//! only the pending region, fanned out across worker threads. `render`
//! is the unconditional full composite.
//!
//! Damage flows in from two directions: explicit `invalidate*` calls on
//! the document, and rectangles pushed by layers (through their attached
//! sink) when their own state changes. Both land in one normalized
//! region that the next `update` drains.

use std::fmt;
use std::io::{Cursor, Read, Seek, Write};
use std::mem;
use std::ops::{Deref, DerefMut};
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use log::{debug, trace, warn};

use crate::blend::BlendOp;
use crate::codec::{self, body::LoadedDocument, ProgressFn, SaveOptions, Version};
use crate::color::ColorBgra;
use crate::error::DocumentError;
use crate::layer::{InvalidationSink, Layer};
use crate::layer_list::LayerList;
use crate::metadata::Metadata;
use crate::rect::Rect;
use crate::region::Region;
use crate::scheduler::RenderScheduler;
use crate::surface::{Surface, SurfaceWindow, TargetView};


/// Observer for freshly invalidated rectangles (already clipped to the
/// canvas). Fired once per rectangle as it joins the pending region.
pub type InvalidatedHook = Box<dyn Fn(Rect) + Send + Sync>;

/// Observer for transitions of the dirty flag.
pub type DirtyChangedHook = Box<dyn Fn(bool) + Send + Sync>;

/// Pixel layout of an [`ImageSource`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceFormat {
    /// 32 bits per pixel, byte order B, G, R, A. Copied directly.
    Bgra32,
    /// 24 bits per pixel, byte order B, G, R. Alpha becomes opaque.
    Bgr24,
    /// Anything else; imported through [`ImageSource::draw_to`].
    Other,
}

/// An external image a document can be constructed from.
///
/// Raw-layout sources (`Bgra32`/`Bgr24`) expose their pixels through
/// `bytes`/`stride` and get a direct row copy; everything else
/// implements `draw_to` and paints itself.
pub trait ImageSource {
    fn width(&self) -> i32;
    fn height(&self) -> i32;
    fn format(&self) -> SourceFormat;

    /// Raw pixel storage; row `y` starts at byte `y * stride()`. Only
    /// consulted for the raw layouts.
    fn bytes(&self) -> &[u8] {
        &[]
    }

    /// Distance in bytes between the starts of consecutive rows.
    fn stride(&self) -> usize {
        0
    }

    /// Fallback import path for [`SourceFormat::Other`]: paint the whole
    /// image into `target`, a window covering the new background layer.
    fn draw_to(&self, target: &mut SurfaceWindow<'_>) -> Result<()> {
        let _ = target;
        anyhow::bail!("image source has no draw fallback")
    }

    /// Metadata to seed the document with. Failures are non-fatal; the
    /// pixels still import.
    fn metadata(&self) -> Result<Metadata> {
        Ok(Metadata::new())
    }
}

/// A layered raster document.
pub struct Document {
    width: i32,
    height: i32,
    layers: LayerList,
    /// Damage accumulated since the last `update`, normalized.
    pending: Region,
    dirty: bool,
    saved_with: Version,
    /// Verbatim application XML carried in the file header.
    custom_headers: String,
    metadata: Metadata,
    /// Shared sink every attached layer reports damage into.
    sink: InvalidationSink,
    scheduler: RenderScheduler,
    invalidated_hook: Option<InvalidatedHook>,
    dirty_changed_hook: Option<DirtyChangedHook>,
}

impl fmt::Debug for Document {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Document")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("layers", &self.layers.len())
            .field("dirty", &self.dirty)
            .field("saved_with", &self.saved_with)
            .finish_non_exhaustive()
    }
}

impl Document {
    /// Creates an empty document. The layer stack starts empty; the
    /// whole canvas is pending and the document is dirty.
    ///
    /// # Panics
    /// Panics when either dimension is not positive.
    pub fn new(width: i32, height: i32) -> Self {
        assert!(
            width > 0 && height > 0,
            "document dimensions must be positive, got {}x{}",
            width,
            height
        );
        Self {
            width,
            height,
            layers: LayerList::new(width, height),
            pending: Region::from_rect(Rect::new(0, 0, width, height)),
            dirty: true,
            saved_with: Version::default(),
            custom_headers: String::new(),
            metadata: Metadata::new(),
            sink: Arc::new(Mutex::new(Vec::new())),
            scheduler: RenderScheduler::new(),
            invalidated_hook: None,
            dirty_changed_hook: None,
        }
    }

    #[inline]
    pub fn width(&self) -> i32 {
        self.width
    }

    #[inline]
    pub fn height(&self) -> i32 {
        self.height
    }

    #[inline]
    pub fn size(&self) -> (i32, i32) {
        (self.width, self.height)
    }

    #[inline]
    pub fn bounds(&self) -> Rect {
        Rect::new(0, 0, self.width, self.height)
    }

    /// Whether the document has unsaved changes.
    #[inline]
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Sets the dirty flag, firing the dirty-changed hook on transitions.
    pub fn set_dirty(&mut self, dirty: bool) {
        if self.dirty == dirty {
            return;
        }
        self.dirty = dirty;
        if let Some(hook) = &self.dirty_changed_hook {
            hook(dirty);
        }
    }

    /// The engine version that last saved this document, or all zeros
    /// for documents never saved.
    #[inline]
    pub fn saved_with(&self) -> Version {
        self.saved_with
    }

    /// The verbatim application XML block from the file header.
    pub fn custom_headers(&self) -> &str {
        &self.custom_headers
    }

    pub fn set_custom_headers(&mut self, xml: impl Into<String>) {
        self.custom_headers = xml.into();
        self.set_dirty(true);
    }

    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    pub fn metadata_mut(&mut self) -> &mut Metadata {
        self.set_dirty(true);
        &mut self.metadata
    }

    pub fn set_invalidated_hook(&mut self, hook: InvalidatedHook) {
        self.invalidated_hook = Some(hook);
    }

    pub fn set_dirty_changed_hook(&mut self, hook: DirtyChangedHook) {
        self.dirty_changed_hook = Some(hook);
    }

    /// The layer stack, read-only.
    pub fn layers(&self) -> &LayerList {
        &self.layers
    }

    /// Mutable access to one layer. Damage the layer reports through its
    /// setters is picked up by the next `update`.
    pub fn layer_mut(&mut self, index: usize) -> Option<&mut Layer> {
        self.layers.get_mut(index)
    }

    /// Opens the layer stack for structural mutation (add, remove,
    /// reorder). Sinks are detached for the duration; dropping the guard
    /// reattaches them and invalidates the whole canvas, since layer
    /// structure changes can affect every pixel.
    pub fn layers_mut(&mut self) -> LayersGuard<'_> {
        for layer in self.layers.iter_mut() {
            layer.detach_sink();
        }
        LayersGuard { document: self }
    }

    /// Marks the entire canvas as needing recomposition.
    pub fn invalidate(&mut self) {
        self.invalidate_rect(self.bounds());
    }

    /// Marks one rectangle (clipped to the canvas) as needing
    /// recomposition. Out-of-bounds and empty rectangles are no-ops.
    pub fn invalidate_rect(&mut self, rect: Rect) {
        let rect = rect.intersect(&self.bounds());
        if rect.is_empty() {
            return;
        }
        trace!("invalidate {:?}", rect);
        self.pending.add_rect(rect);
        self.set_dirty(true);
        if let Some(hook) = &self.invalidated_hook {
            hook(rect);
        }
    }

    pub fn invalidate_rects(&mut self, rects: &[Rect]) {
        for &rect in rects {
            self.invalidate_rect(rect);
        }
    }

    pub fn invalidate_region(&mut self, region: &Region) {
        self.invalidate_rects(&region.scans());
    }

    /// The damage the next `update` would repaint. Drains any rectangles
    /// layers have reported since the last call.
    pub fn pending_invalid_region(&mut self) -> &Region {
        self.drain_layer_invalidations();
        &self.pending
    }

    /// Folds rectangles reported by layers into the pending region.
    fn drain_layer_invalidations(&mut self) {
        let drained: Vec<Rect> =
            mem::take(&mut *self.sink.lock().expect("invalidation sink poisoned"));
        if !drained.is_empty() {
            trace!("draining {} layer-reported rect(s)", drained.len());
            self.invalidate_rects(&drained);
        }
    }

    /// Unconditional full composite into `target`.
    ///
    /// # Panics
    /// Panics when `target` does not match the canvas size.
    pub fn render(&self, target: &mut Surface) {
        self.render_rects(target, &[self.bounds()]);
    }

    /// Composites only `rects` (clipped to the canvas) into `target`.
    ///
    /// # Panics
    /// Panics when `target` does not match the canvas size.
    pub fn render_rects(&self, target: &mut Surface, rects: &[Rect]) {
        self.render_rects_with(target, rects, true);
    }

    /// Like [`render_rects`](Self::render_rects), but with an explicit
    /// choice about the background: when `clear_background` is false the
    /// stack blends over whatever `target` already holds instead of a
    /// transparent base (the fast path is off, since it would overwrite).
    ///
    /// # Panics
    /// Panics when `target` does not match the canvas size.
    pub fn render_rects_with(&self, target: &mut Surface, rects: &[Rect], clear_background: bool) {
        assert_eq!(
            target.size(),
            self.size(),
            "render target size must match the canvas size"
        );
        let view = TargetView::new(target);
        self.render_to(&view, rects, clear_background, clear_background);
    }

    /// Composites `rects` through a shared target view. Callers running
    /// this concurrently must hand each invocation a disjoint rectangle
    /// set; that is what makes the unsafe view writes race-free.
    ///
    /// When the bottom layer is visible, fully opaque and blending with
    /// `Normal`, its pixels are copied instead of blended over a cleared
    /// background (same result, one pass saved). The fast path keys on
    /// the op's identity, not its behavior.
    pub(crate) fn render_to(
        &self,
        view: &TargetView,
        rects: &[Rect],
        clear_background: bool,
        allow_fast_path: bool,
    ) {
        debug_assert_eq!(view.size(), self.size());

        let fast_bottom = if clear_background && allow_fast_path {
            self.layers.get(0).filter(|bottom| {
                bottom.visible()
                    && bottom.opacity() == 255
                    && matches!(bottom.blend_op(), BlendOp::Normal)
            })
        } else {
            None
        };

        let start = match fast_bottom {
            Some(bottom) => {
                for &rect in rects {
                    // SAFETY: the caller owns these rects exclusively.
                    unsafe { view.copy_rect_from(bottom.surface(), rect) };
                }
                1
            }
            None => {
                if clear_background {
                    for &rect in rects {
                        // SAFETY: as above.
                        unsafe { view.clear_rect(rect) };
                    }
                }
                0
            }
        };

        for layer in self.layers.iter().skip(start) {
            layer.render_to(view, rects);
        }
    }

    /// Incremental composite: repaints exactly the pending region of
    /// `target` in parallel, then clears it. Returns whether anything
    /// was repainted.
    ///
    /// Blocks until every worker finishes; `target` is fully consistent
    /// on return. The `&mut` borrows make concurrent calls impossible.
    ///
    /// # Panics
    /// Panics when `target` does not match the canvas size.
    pub fn update(&mut self, target: &mut Surface) -> bool {
        assert_eq!(
            target.size(),
            self.size(),
            "update target size must match the canvas size"
        );
        self.drain_layer_invalidations();
        if self.pending.is_empty() {
            trace!("update: nothing pending");
            return false;
        }

        let pending = mem::replace(&mut self.pending, Region::new());
        let scans = self.scheduler.split_scans(pending.scans());
        debug!(
            "update: {} scan rect(s) across {} worker(s)",
            scans.len(),
            self.scheduler.worker_count()
        );

        let view = TargetView::new(target);
        let this = &*self;
        this.scheduler
            .dispatch(&scans, |chunk| this.render_to(&view, chunk, true, true));
        true
    }

    /// Builds a one-layer document from an external image.
    ///
    /// The image lands in a background layer; raw BGRA/BGR layouts are
    /// row-copied, anything else paints itself via
    /// [`ImageSource::draw_to`]. Source metadata is taken best-effort.
    pub fn from_image(source: &dyn ImageSource) -> Result<Document> {
        let (width, height) = (source.width(), source.height());
        if width <= 0 || height <= 0 {
            return Err(DocumentError::InvalidFormat(format!(
                "image source is {}x{}",
                width, height
            ))
            .into());
        }

        let mut layer = Layer::background(width, height);
        match source.format() {
            SourceFormat::Bgra32 => copy_rows_bgra32(source, layer.surface_mut())?,
            SourceFormat::Bgr24 => copy_rows_bgr24(source, layer.surface_mut())?,
            SourceFormat::Other => {
                let bounds = Rect::new(0, 0, width, height);
                source
                    .draw_to(&mut layer.surface_mut().window_mut(bounds))
                    .context("drawing image source")?;
            }
        }

        let mut document = Document::new(width, height);
        match source.metadata() {
            Ok(metadata) => document.metadata = metadata,
            Err(e) => warn!("image source metadata unavailable: {:#}", e),
        }
        document.layers_mut().add(layer)?;
        Ok(document)
    }

    /// Renders the full composite into `target`.
    ///
    /// # Panics
    /// Panics when `target` does not match the canvas size.
    pub fn flatten_to(&self, target: &mut Surface) {
        self.render(target);
    }

    /// A new one-layer document whose background layer holds the current
    /// composite. Metadata and the custom header block carry over; the
    /// source document is untouched.
    pub fn flatten(&self) -> Document {
        let mut flat = Surface::new(self.width, self.height);
        self.render(&mut flat);
        let mut layer = Layer::new(flat, "Background");
        layer.set_background(true);

        let mut document = Document::new(self.width, self.height);
        document.metadata = self.metadata.clone();
        document.custom_headers = self.custom_headers.clone();
        document
            .layers_mut()
            .add(layer)
            .expect("flattened layer matches the canvas size");
        document
    }

    /// Deep copy via an in-memory serialization round trip, so a clone
    /// is exactly what a save/load would produce. Does not touch this
    /// document's dirty flag or saved-with version.
    pub fn try_clone(&self) -> Result<Document> {
        let mut buffer = Vec::new();
        codec::save_document(
            self,
            &mut buffer,
            self.saved_with,
            &SaveOptions::default(),
            None,
        )
        .context("serializing document for clone")?;
        let mut cursor = Cursor::new(buffer);
        codec::load_document(&mut cursor).context("rehydrating cloned document")
    }

    /// Saves with default options (compressed, no progress observer).
    pub fn save_to_stream<W: Write>(&mut self, stream: W) -> Result<()> {
        self.save_to_stream_with(stream, &SaveOptions::default(), None)
    }

    /// Serializes the document to `stream`. On success the document
    /// records the current engine version as its saved-with version and
    /// the dirty flag clears; on failure both are untouched.
    pub fn save_to_stream_with<W: Write>(
        &mut self,
        stream: W,
        options: &SaveOptions,
        progress: Option<&ProgressFn<'_>>,
    ) -> Result<()> {
        let version = Version::current();
        codec::save_document(self, stream, version, options, progress)?;
        self.saved_with = version;
        self.set_dirty(false);
        Ok(())
    }

    /// Loads a document. The stream must be seekable (the format probe
    /// rewinds). A failed load never yields a partial document.
    pub fn from_stream<R: Read + Seek>(stream: &mut R) -> Result<Document> {
        codec::load_document(stream)
    }

    /// Assembles a document from decoded parts, attaching sinks and
    /// validating layer sizes. The new document starts fully pending.
    pub(crate) fn from_loaded_parts(
        loaded: LoadedDocument,
        custom_headers: String,
        saved_with: Version,
    ) -> Result<Document> {
        let mut document = Document::new(loaded.width, loaded.height);
        document.custom_headers = custom_headers;
        document.metadata = loaded.metadata;
        document.saved_with = saved_with;
        {
            let mut layers = document.layers_mut();
            for layer in loaded.layers {
                layers.add(layer)?;
            }
        }
        Ok(document)
    }
}

/// RAII guard for structural layer-stack mutation, dereferencing to
/// [`LayerList`]. While it lives, layer damage reporting is off; on drop
/// every remaining layer is (re)attached to the document's sink and the
/// whole canvas is invalidated.
pub struct LayersGuard<'a> {
    document: &'a mut Document,
}

impl Deref for LayersGuard<'_> {
    type Target = LayerList;

    fn deref(&self) -> &LayerList {
        &self.document.layers
    }
}

impl DerefMut for LayersGuard<'_> {
    fn deref_mut(&mut self) -> &mut LayerList {
        &mut self.document.layers
    }
}

impl Drop for LayersGuard<'_> {
    fn drop(&mut self) {
        let sink = self.document.sink.clone();
        for layer in self.document.layers.iter_mut() {
            layer.attach_sink(sink.clone());
        }
        self.document.invalidate();
    }
}

fn copy_rows_bgra32(source: &dyn ImageSource, surface: &mut Surface) -> Result<()> {
    let bytes = source.bytes();
    let stride = source.stride();
    let row_bytes = surface.width() as usize * ColorBgra::SIZE_OF;
    for y in 0..surface.height() {
        let start = y as usize * stride;
        let row = bytes.get(start..start + row_bytes).ok_or_else(|| {
            DocumentError::InvalidFormat("image source bytes end before the last row".into())
        })?;
        for (pixel, px) in surface.row_mut(y).iter_mut().zip(row.chunks_exact(4)) {
            *pixel = ColorBgra::from_bgra(px[0], px[1], px[2], px[3]);
        }
    }
    Ok(())
}

fn copy_rows_bgr24(source: &dyn ImageSource, surface: &mut Surface) -> Result<()> {
    let bytes = source.bytes();
    let stride = source.stride();
    let row_bytes = surface.width() as usize * 3;
    for y in 0..surface.height() {
        let start = y as usize * stride;
        let row = bytes.get(start..start + row_bytes).ok_or_else(|| {
            DocumentError::InvalidFormat("image source bytes end before the last row".into())
        })?;
        for (pixel, px) in surface.row_mut(y).iter_mut().zip(row.chunks_exact(3)) {
            *pixel = ColorBgra::from_rgb(px[2], px[1], px[0]);
        }
    }
    Ok(())
}
