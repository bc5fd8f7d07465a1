// src/surface.rs

//! `Surface`: an owned, contiguous 32-bit BGRA pixel buffer.
//!
//! One surface backs each layer and each render destination. Storage is
//! row-major with stride == width. Checked accessors panic on
//! out-of-bounds coordinates (a caller bug); `unsafe` unchecked variants
//! exist for hot paths that have already clamped their coordinates.
//!
//! `SurfaceWindow` is a non-owning view of a sub-rectangle, borrowing the
//! parent surface's memory for its lifetime. `TargetView` is the crate's
//! internal raw view used to share one destination surface across render
//! workers that write disjoint rectangle sets.

use crate::color::ColorBgra;
use crate::rect::Rect;

/// An owned width x height grid of BGRA pixels.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Surface {
    width: i32,
    height: i32,
    data: Box<[ColorBgra]>,
}

impl Surface {
    /// Allocates a surface of the given size, cleared to transparent.
    ///
    /// # Panics
    /// Panics if either dimension is negative. Allocation failure aborts
    /// the process (out of memory is fatal here).
    pub fn new(width: i32, height: i32) -> Self {
        assert!(
            width >= 0 && height >= 0,
            "surface dimensions must be non-negative: {}x{}",
            width,
            height
        );
        let len = width as usize * height as usize;
        Self {
            width,
            height,
            data: vec![ColorBgra::TRANSPARENT; len].into_boxed_slice(),
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

    /// (width, height) pair.
    #[inline]
    pub fn size(&self) -> (i32, i32) {
        (self.width, self.height)
    }

    /// The full surface rectangle, anchored at the origin.
    #[inline]
    pub fn bounds(&self) -> Rect {
        Rect::new(0, 0, self.width, self.height)
    }

    /// All pixels, row-major.
    #[inline]
    pub fn data(&self) -> &[ColorBgra] {
        &self.data
    }

    /// All pixels, row-major, mutable.
    #[inline]
    pub fn data_mut(&mut self) -> &mut [ColorBgra] {
        &mut self.data
    }

    #[inline]
    fn index(&self, x: i32, y: i32) -> usize {
        y as usize * self.width as usize + x as usize
    }

    /// Reads one pixel.
    ///
    /// # Panics
    /// Panics when (x, y) is outside the surface.
    #[inline]
    pub fn pixel(&self, x: i32, y: i32) -> ColorBgra {
        assert!(
            self.bounds().contains(x, y),
            "pixel read at ({}, {}) outside {}x{} surface",
            x,
            y,
            self.width,
            self.height
        );
        self.data[self.index(x, y)]
    }

    /// Writes one pixel.
    ///
    /// # Panics
    /// Panics when (x, y) is outside the surface.
    #[inline]
    pub fn set_pixel(&mut self, x: i32, y: i32, color: ColorBgra) {
        assert!(
            self.bounds().contains(x, y),
            "pixel write at ({}, {}) outside {}x{} surface",
            x,
            y,
            self.width,
            self.height
        );
        let i = self.index(x, y);
        self.data[i] = color;
    }

    /// Reads one pixel without bounds validation.
    ///
    /// # Safety
    /// (x, y) must lie inside the surface. Callers are expected to have
    /// clamped their coordinates already.
    #[inline]
    pub unsafe fn pixel_unchecked(&self, x: i32, y: i32) -> ColorBgra {
        *self.data.get_unchecked(self.index(x, y))
    }

    /// Writes one pixel without bounds validation.
    ///
    /// # Safety
    /// (x, y) must lie inside the surface.
    #[inline]
    pub unsafe fn set_pixel_unchecked(&mut self, x: i32, y: i32, color: ColorBgra) {
        let i = self.index(x, y);
        *self.data.get_unchecked_mut(i) = color;
    }

    /// One full row of pixels.
    ///
    /// # Panics
    /// Panics when `y` is out of range.
    #[inline]
    pub fn row(&self, y: i32) -> &[ColorBgra] {
        assert!(y >= 0 && y < self.height, "row {} outside height {}", y, self.height);
        let start = y as usize * self.width as usize;
        &self.data[start..start + self.width as usize]
    }

    /// One full row of pixels, mutable.
    ///
    /// # Panics
    /// Panics when `y` is out of range.
    #[inline]
    pub fn row_mut(&mut self, y: i32) -> &mut [ColorBgra] {
        assert!(y >= 0 && y < self.height, "row {} outside height {}", y, self.height);
        let start = y as usize * self.width as usize;
        &mut self.data[start..start + self.width as usize]
    }

    /// The `[x0, x1)` span of row `y`.
    #[inline]
    pub fn row_span(&self, y: i32, x0: i32, x1: i32) -> &[ColorBgra] {
        &self.row(y)[x0 as usize..x1 as usize]
    }

    /// The `[x0, x1)` span of row `y`, mutable.
    #[inline]
    pub fn row_span_mut(&mut self, y: i32, x0: i32, x1: i32) -> &mut [ColorBgra] {
        &mut self.row_mut(y)[x0 as usize..x1 as usize]
    }

    /// Fills the whole surface with one color.
    pub fn clear(&mut self, color: ColorBgra) {
        self.data.fill(color);
    }

    /// Fills a rectangle (clipped to the surface) with one color.
    pub fn clear_rect(&mut self, rect: Rect, color: ColorBgra) {
        let rect = rect.intersect(&self.bounds());
        for y in rect.top()..rect.bottom() {
            self.row_span_mut(y, rect.left(), rect.right()).fill(color);
        }
    }

    /// Copies all pixels from `src`.
    ///
    /// # Panics
    /// Panics when the sizes differ.
    pub fn copy_surface(&mut self, src: &Surface) {
        assert_eq!(
            self.size(),
            src.size(),
            "copy_surface requires identical surface sizes"
        );
        self.data.copy_from_slice(&src.data);
    }

    /// Copies the given rectangles (clipped to bounds) from `src`.
    ///
    /// # Panics
    /// Panics when the sizes differ.
    pub fn copy_surface_rects(&mut self, src: &Surface, rects: &[Rect]) {
        assert_eq!(
            self.size(),
            src.size(),
            "copy_surface_rects requires identical surface sizes"
        );
        let bounds = self.bounds();
        for rect in rects {
            let rect = rect.intersect(&bounds);
            for y in rect.top()..rect.bottom() {
                let dst = self.row_span_mut(y, rect.left(), rect.right());
                dst.copy_from_slice(src.row_span(y, rect.left(), rect.right()));
            }
        }
    }

    /// A mutable non-owning view of a sub-rectangle of this surface.
    ///
    /// # Panics
    /// Panics when `rect` is not fully contained in the surface.
    pub fn window_mut(&mut self, rect: Rect) -> SurfaceWindow<'_> {
        assert!(
            !rect.is_empty() && rect.intersect(&self.bounds()) == rect,
            "window {:?} not contained in {}x{} surface",
            rect,
            self.width,
            self.height
        );
        SurfaceWindow {
            surface: self,
            rect,
        }
    }
}

/// A mutable view of a sub-rectangle of a parent `Surface`.
///
/// The window aliases the parent's memory and is valid only while the
/// parent is borrowed; coordinates are window-relative.
#[derive(Debug)]
pub struct SurfaceWindow<'a> {
    surface: &'a mut Surface,
    rect: Rect,
}

impl SurfaceWindow<'_> {
    #[inline]
    pub fn width(&self) -> i32 {
        self.rect.width
    }

    #[inline]
    pub fn height(&self) -> i32 {
        self.rect.height
    }

    /// Reads one pixel, window-relative.
    #[inline]
    pub fn pixel(&self, x: i32, y: i32) -> ColorBgra {
        assert!(x >= 0 && x < self.rect.width && y >= 0 && y < self.rect.height);
        self.surface.pixel(self.rect.x + x, self.rect.y + y)
    }

    /// Writes one pixel, window-relative.
    #[inline]
    pub fn set_pixel(&mut self, x: i32, y: i32, color: ColorBgra) {
        assert!(x >= 0 && x < self.rect.width && y >= 0 && y < self.rect.height);
        self.surface.set_pixel(self.rect.x + x, self.rect.y + y, color);
    }

    /// One window row, mutable.
    #[inline]
    pub fn row_mut(&mut self, y: i32) -> &mut [ColorBgra] {
        assert!(y >= 0 && y < self.rect.height);
        self.surface
            .row_span_mut(self.rect.y + y, self.rect.left(), self.rect.right())
    }
}

/// A raw view of a destination surface shared across render workers.
///
/// `update` assigns every worker a disjoint rectangle set, so no pixel is
/// ever written through two views concurrently. That partitioning is the
/// data-race-avoidance invariant behind the `Send`/`Sync` impls below; the
/// only producers of `TargetView` are the document render paths, which
/// uphold it by construction.
#[derive(Debug, Clone, Copy)]
pub(crate) struct TargetView {
    data: *mut ColorBgra,
    width: i32,
    height: i32,
}

// SAFETY: workers write pairwise-disjoint pixel sets (see type docs), and
// the underlying buffer outlives every view (scoped threads join before
// the exclusive borrow of the surface ends).
unsafe impl Send for TargetView {}
unsafe impl Sync for TargetView {}

impl TargetView {
    pub(crate) fn new(surface: &mut Surface) -> Self {
        Self {
            data: surface.data_mut().as_mut_ptr(),
            width: surface.width(),
            height: surface.height(),
        }
    }

    #[inline]
    pub(crate) fn size(&self) -> (i32, i32) {
        (self.width, self.height)
    }

    #[inline]
    pub(crate) fn bounds(&self) -> Rect {
        Rect::new(0, 0, self.width, self.height)
    }

    /// The `[x0, x1)` span of row `y`, mutable.
    ///
    /// # Safety
    /// The span must lie inside the surface, and no other thread may
    /// touch these pixels while the returned borrow lives.
    #[inline]
    #[allow(clippy::mut_from_ref)]
    pub(crate) unsafe fn row_span_mut(&self, y: i32, x0: i32, x1: i32) -> &mut [ColorBgra] {
        let start = y as usize * self.width as usize + x0 as usize;
        std::slice::from_raw_parts_mut(self.data.add(start), (x1 - x0) as usize)
    }

    /// Fills a rectangle (clipped to bounds) with transparent pixels.
    ///
    /// # Safety
    /// No other thread may write the rectangle concurrently.
    pub(crate) unsafe fn clear_rect(&self, rect: Rect) {
        let rect = rect.intersect(&self.bounds());
        for y in rect.top()..rect.bottom() {
            self.row_span_mut(y, rect.left(), rect.right())
                .fill(ColorBgra::TRANSPARENT);
        }
    }

    /// Copies a rectangle (clipped to bounds) of pixels from `src`.
    ///
    /// # Safety
    /// `src` must have the same size as the target, and no other thread
    /// may write the rectangle concurrently.
    pub(crate) unsafe fn copy_rect_from(&self, src: &Surface, rect: Rect) {
        let rect = rect.intersect(&self.bounds());
        for y in rect.top()..rect.bottom() {
            self.row_span_mut(y, rect.left(), rect.right())
                .copy_from_slice(src.row_span(y, rect.left(), rect.right()));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_surface_is_transparent() {
        let s = Surface::new(4, 3);
        assert_eq!(s.size(), (4, 3));
        assert!(s.data().iter().all(|p| p.is_transparent()));
    }

    #[test]
    fn pixel_round_trip() {
        let mut s = Surface::new(8, 8);
        let c = ColorBgra::from_rgb(1, 2, 3);
        s.set_pixel(7, 5, c);
        assert_eq!(s.pixel(7, 5), c);
        assert_eq!(s.row(5)[7], c);
    }

    #[test]
    #[should_panic(expected = "outside")]
    fn checked_read_out_of_bounds_panics() {
        let s = Surface::new(2, 2);
        let _ = s.pixel(2, 0);
    }

    #[test]
    fn clear_rect_clips_to_bounds() {
        let mut s = Surface::new(4, 4);
        s.clear(ColorBgra::WHITE);
        s.clear_rect(Rect::new(2, 2, 10, 10), ColorBgra::TRANSPARENT);
        assert_eq!(s.pixel(1, 1), ColorBgra::WHITE);
        assert_eq!(s.pixel(2, 2), ColorBgra::TRANSPARENT);
        assert_eq!(s.pixel(3, 3), ColorBgra::TRANSPARENT);
    }

    #[test]
    fn copy_surface_rects_copies_only_listed_rects() {
        let mut src = Surface::new(4, 4);
        src.clear(ColorBgra::BLACK);
        let mut dst = Surface::new(4, 4);
        dst.clear(ColorBgra::WHITE);
        dst.copy_surface_rects(&src, &[Rect::new(0, 0, 2, 2)]);
        assert_eq!(dst.pixel(1, 1), ColorBgra::BLACK);
        assert_eq!(dst.pixel(3, 3), ColorBgra::WHITE);
    }

    #[test]
    fn window_writes_land_in_parent() {
        let mut s = Surface::new(6, 6);
        {
            let mut w = s.window_mut(Rect::new(2, 3, 3, 2));
            assert_eq!((w.width(), w.height()), (3, 2));
            w.set_pixel(0, 0, ColorBgra::BLACK);
            w.row_mut(1).fill(ColorBgra::WHITE);
        }
        assert_eq!(s.pixel(2, 3), ColorBgra::BLACK);
        assert_eq!(s.pixel(4, 4), ColorBgra::WHITE);
        assert_eq!(s.pixel(5, 4), ColorBgra::TRANSPARENT);
    }

    #[test]
    fn target_view_copy_and_clear() {
        let mut src = Surface::new(3, 3);
        src.clear(ColorBgra::BLACK);
        let mut dst = Surface::new(3, 3);
        let view = TargetView::new(&mut dst);
        // SAFETY: single-threaded test, spans in bounds.
        unsafe {
            view.copy_rect_from(&src, Rect::new(0, 0, 3, 2));
            view.clear_rect(Rect::new(0, 0, 1, 1));
        }
        assert_eq!(dst.pixel(0, 0), ColorBgra::TRANSPARENT);
        assert_eq!(dst.pixel(2, 1), ColorBgra::BLACK);
        assert_eq!(dst.pixel(2, 2), ColorBgra::TRANSPARENT);
    }
}
