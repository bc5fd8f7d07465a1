// src/layer.rs

//! `Layer`: one image plane of a document.
//!
//! A layer owns its `Surface` (always sized to the document canvas),
//! carries visibility/background flags, an opacity byte, a blend op and a
//! display name, and reports damage through an invalidation sink the
//! owning document installs while the layer is attached.

use std::sync::{Arc, Mutex};

use bitflags::bitflags;
use log::trace;

use crate::blend::BlendOp;
use crate::color::{mul_255, ColorBgra};
use crate::rect::Rect;
use crate::region::Region;
use crate::surface::{Surface, TargetView};

bitflags! {
    /// Layer state flags.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct LayerFlags: u8 {
        /// The layer participates in compositing.
        const VISIBLE = 1 << 0;
        /// The layer was created as the document background.
        const BACKGROUND = 1 << 1;
    }
}

/// Damage rectangles reported by a layer, drained by the owning document.
pub(crate) type InvalidationSink = Arc<Mutex<Vec<Rect>>>;

/// One image plane: pixels plus compositing state.
#[derive(Debug)]
pub struct Layer {
    surface: Surface,
    flags: LayerFlags,
    opacity: u8,
    blend_op: BlendOp,
    name: String,
    sink: Option<InvalidationSink>,
}

impl Layer {
    /// Creates a visible, fully opaque, Normal-blended layer around an
    /// existing surface.
    pub fn new(surface: Surface, name: impl Into<String>) -> Self {
        Self {
            surface,
            flags: LayerFlags::VISIBLE,
            opacity: 255,
            blend_op: BlendOp::Normal,
            name: name.into(),
            sink: None,
        }
    }

    /// Creates the standard background layer: opaque white, flagged
    /// BACKGROUND.
    pub fn background(width: i32, height: i32) -> Self {
        let mut surface = Surface::new(width, height);
        surface.clear(ColorBgra::WHITE);
        let mut layer = Self::new(surface, "Background");
        layer.flags |= LayerFlags::BACKGROUND;
        layer
    }

    #[inline]
    pub fn surface(&self) -> &Surface {
        &self.surface
    }

    /// Mutable pixel access. Callers painting into the surface are
    /// responsible for reporting the touched area via
    /// [`invalidate`](Self::invalidate) afterwards.
    #[inline]
    pub fn surface_mut(&mut self) -> &mut Surface {
        &mut self.surface
    }

    #[inline]
    pub fn size(&self) -> (i32, i32) {
        self.surface.size()
    }

    #[inline]
    pub fn visible(&self) -> bool {
        self.flags.contains(LayerFlags::VISIBLE)
    }

    pub fn set_visible(&mut self, visible: bool) {
        if visible != self.visible() {
            self.flags.set(LayerFlags::VISIBLE, visible);
            self.invalidate_all();
        }
    }

    #[inline]
    pub fn is_background(&self) -> bool {
        self.flags.contains(LayerFlags::BACKGROUND)
    }

    pub fn set_background(&mut self, background: bool) {
        self.flags.set(LayerFlags::BACKGROUND, background);
    }

    #[inline]
    pub fn flags(&self) -> LayerFlags {
        self.flags
    }

    pub(crate) fn set_flags(&mut self, flags: LayerFlags) {
        self.flags = flags;
    }

    /// Layer opacity: an extra alpha factor applied to every source pixel
    /// before its blend op runs. 255 = fully opaque.
    #[inline]
    pub fn opacity(&self) -> u8 {
        self.opacity
    }

    pub fn set_opacity(&mut self, opacity: u8) {
        if opacity != self.opacity {
            self.opacity = opacity;
            self.invalidate_all();
        }
    }

    #[inline]
    pub fn blend_op(&self) -> BlendOp {
        self.blend_op
    }

    pub fn set_blend_op(&mut self, blend_op: BlendOp) {
        if blend_op != self.blend_op {
            self.blend_op = blend_op;
            self.invalidate_all();
        }
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn set_name(&mut self, name: impl Into<String>) {
        self.name = name.into();
    }

    /// Reports a damaged rectangle (clipped to the layer bounds) to the
    /// owning document, if attached.
    pub fn invalidate(&self, rect: Rect) {
        let rect = rect.intersect(&self.surface.bounds());
        if rect.is_empty() {
            return;
        }
        if let Some(sink) = &self.sink {
            sink.lock().expect("invalidation sink poisoned").push(rect);
        }
    }

    /// Reports the whole layer as damaged.
    pub fn invalidate_all(&self) {
        self.invalidate(self.surface.bounds());
    }

    pub(crate) fn attach_sink(&mut self, sink: InvalidationSink) {
        self.sink = Some(sink);
    }

    pub(crate) fn detach_sink(&mut self) {
        self.sink = None;
    }

    /// Composites this layer into `target`, restricted to `roi`.
    /// A no-op when the layer is invisible.
    ///
    /// # Panics
    /// Panics when the target size differs from the layer size (the
    /// owning document guarantees both equal the canvas size).
    pub fn render(&self, target: &mut Surface, roi: &Region) {
        assert_eq!(
            target.size(),
            self.surface.size(),
            "render target size must match the layer size"
        );
        let view = TargetView::new(target);
        self.render_to(&view, &roi.scans());
    }

    /// Rectangle-list form of [`render`](Self::render), writing through a
    /// shared target view. Rectangles are clipped to bounds.
    pub(crate) fn render_to(&self, target: &TargetView, rects: &[Rect]) {
        if !self.visible() {
            return;
        }
        trace!(
            "layer '{}': compositing {} rect(s), opacity {}, {:?}",
            self.name,
            rects.len(),
            self.opacity,
            self.blend_op
        );

        let bounds = self.surface.bounds();
        for rect in rects {
            let rect = rect.intersect(&bounds);
            for y in rect.top()..rect.bottom() {
                // SAFETY: rect is clipped to bounds; the caller assigned
                // us a pixel set no other worker writes.
                let dst = unsafe { target.row_span_mut(y, rect.left(), rect.right()) };
                let src = self.surface.row_span(y, rect.left(), rect.right());

                if self.opacity == 255 {
                    self.blend_op.apply_row(dst, src);
                } else {
                    for (d, s) in dst.iter_mut().zip(src.iter()) {
                        let faded = s.new_alpha(mul_255(s.a, self.opacity));
                        *d = self.blend_op.apply(*d, faded);
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn background_layer_is_opaque_white() {
        let layer = Layer::background(4, 4);
        assert!(layer.visible());
        assert!(layer.is_background());
        assert_eq!(layer.opacity(), 255);
        assert_eq!(layer.blend_op(), BlendOp::Normal);
        assert_eq!(layer.surface().pixel(3, 3), ColorBgra::WHITE);
    }

    #[test]
    fn invisible_layer_renders_nothing() {
        let mut layer = Layer::background(4, 4);
        layer.set_visible(false);
        let mut target = Surface::new(4, 4);
        let roi = Region::from_rect(target.bounds());
        layer.render(&mut target, &roi);
        assert!(target.data().iter().all(|p| p.is_transparent()));
    }

    #[test]
    fn render_respects_roi() {
        let layer = Layer::background(4, 4);
        let mut target = Surface::new(4, 4);
        layer.render(&mut target, &Region::from_rect(Rect::new(1, 1, 2, 2)));
        assert_eq!(target.pixel(1, 1), ColorBgra::WHITE);
        assert_eq!(target.pixel(0, 0), ColorBgra::TRANSPARENT);
        assert_eq!(target.pixel(3, 3), ColorBgra::TRANSPARENT);
    }

    #[test]
    fn opacity_scales_source_alpha_before_blending() {
        let mut layer = Layer::background(1, 1);
        layer.set_opacity(128);
        let mut target = Surface::new(1, 1);
        target.clear(ColorBgra::BLACK);
        let roi = Region::from_rect(target.bounds());
        layer.render(&mut target, &roi);

        let expected = BlendOp::Normal.apply(ColorBgra::BLACK, ColorBgra::WHITE.new_alpha(128));
        assert_eq!(target.pixel(0, 0), expected);
    }

    #[test]
    fn property_changes_report_damage_when_attached() {
        let sink: InvalidationSink = Arc::new(Mutex::new(Vec::new()));
        let mut layer = Layer::background(8, 8);
        layer.attach_sink(Arc::clone(&sink));

        layer.set_visible(false);
        layer.set_opacity(10);
        layer.invalidate(Rect::new(-5, -5, 7, 7));
        // Setting the same value twice reports nothing new.
        layer.set_opacity(10);

        let rects = sink.lock().unwrap().clone();
        assert_eq!(
            rects,
            vec![
                Rect::new(0, 0, 8, 8),
                Rect::new(0, 0, 8, 8),
                Rect::new(0, 0, 2, 2),
            ]
        );
    }

    #[test]
    fn detached_layer_swallows_damage() {
        let layer = Layer::background(4, 4);
        // No sink attached; must not panic.
        layer.invalidate_all();
    }

    #[test]
    #[should_panic(expected = "target size")]
    fn size_mismatch_is_a_fault() {
        let layer = Layer::background(4, 4);
        let mut target = Surface::new(5, 4);
        layer.render(&mut target, &Region::from_rect(Rect::new(0, 0, 4, 4)));
    }
}
