// src/region.rs

//! `Region`: a normalized set of axis-aligned rectangles.
//!
//! Used for dirty-area accumulation and clip/selection masks. The
//! representation is the classic band decomposition: horizontal bands,
//! sorted top to bottom and disjoint in y, each holding a sorted list of
//! disjoint, non-touching x spans. Every boolean operation produces a
//! normalized result; vertically adjacent bands with identical span walls
//! are coalesced into one.
//!
//! All operations run a boundary sweep: the y axis is cut at every band
//! edge of either operand, the x axis at every span edge within a slab,
//! and a per-operation membership predicate decides which elementary
//! cells survive. One loop shape serves union, intersection and symmetric
//! difference, which keeps the normalization invariant in a single place.

use crate::rect::Rect;

/// One horizontal band: `[top, bottom)` with sorted disjoint x spans.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Band {
    top: i32,
    bottom: i32,
    /// Half-open `[x0, x1)` spans. Never empty, never touching.
    spans: Vec<(i32, i32)>,
}

/// A normalized, non-overlapping rectangle set.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Region {
    bands: Vec<Band>,
}

impl Region {
    /// The empty region.
    pub fn new() -> Self {
        Self { bands: Vec::new() }
    }

    /// A region covering exactly `rect`. Empty rectangles produce the
    /// empty region.
    pub fn from_rect(rect: Rect) -> Self {
        if rect.is_empty() {
            return Self::new();
        }
        Self {
            bands: vec![Band {
                top: rect.top(),
                bottom: rect.bottom(),
                spans: vec![(rect.left(), rect.right())],
            }],
        }
    }

    /// The union of a list of rectangles.
    pub fn from_rects(rects: &[Rect]) -> Self {
        let mut region = Self::new();
        for rect in rects {
            region.add_rect(*rect);
        }
        region
    }

    /// True when the region covers no pixels.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.bands.is_empty()
    }

    /// Adds a rectangle to the region (union). Empty rectangles are a
    /// no-op, never stored.
    pub fn add_rect(&mut self, rect: Rect) {
        if rect.is_empty() {
            return;
        }
        *self = self.union(&Region::from_rect(rect));
    }

    /// Set union.
    pub fn union(&self, other: &Region) -> Region {
        combine(self, other, |a, b| a || b)
    }

    /// Set intersection.
    pub fn intersect(&self, other: &Region) -> Region {
        combine(self, other, |a, b| a && b)
    }

    /// Symmetric difference ("everything outside the selection" when
    /// xor-ed against the canvas rectangle).
    pub fn xor(&self, other: &Region) -> Region {
        combine(self, other, |a, b| a != b)
    }

    /// The region clipped to a rectangle.
    pub fn intersect_rect(&self, rect: Rect) -> Region {
        self.intersect(&Region::from_rect(rect))
    }

    /// The scan decomposition: non-overlapping rectangles ordered top to
    /// bottom, left to right.
    pub fn scans(&self) -> Vec<Rect> {
        let mut out = Vec::new();
        for band in &self.bands {
            for &(x0, x1) in &band.spans {
                out.push(Rect::from_edges(x0, band.top, x1, band.bottom));
            }
        }
        out
    }

    /// The bounding rectangle of the region.
    pub fn bounds(&self) -> Rect {
        let mut bounds = Rect::EMPTY;
        for band in &self.bands {
            for &(x0, x1) in &band.spans {
                bounds = bounds.union_bounds(&Rect::from_edges(x0, band.top, x1, band.bottom));
            }
        }
        bounds
    }

    /// Total number of pixels covered.
    pub fn area(&self) -> u64 {
        self.bands
            .iter()
            .map(|band| {
                let height = (band.bottom - band.top) as u64;
                band.spans
                    .iter()
                    .map(|&(x0, x1)| (x1 - x0) as u64 * height)
                    .sum::<u64>()
            })
            .sum()
    }
}

/// Runs the band sweep combining two regions under `keep`.
fn combine(a: &Region, b: &Region, keep: impl Fn(bool, bool) -> bool) -> Region {
    // Cut the y axis at every band edge of either operand.
    let mut cuts: Vec<i32> = Vec::with_capacity(2 * (a.bands.len() + b.bands.len()));
    for band in a.bands.iter().chain(b.bands.iter()) {
        cuts.push(band.top);
        cuts.push(band.bottom);
    }
    cuts.sort_unstable();
    cuts.dedup();

    let mut out: Vec<Band> = Vec::new();
    let mut ai = 0;
    let mut bi = 0;

    for window in cuts.windows(2) {
        let (top, bottom) = (window[0], window[1]);
        let spans_a = slab_spans(&a.bands, &mut ai, top);
        let spans_b = slab_spans(&b.bands, &mut bi, top);
        let spans = combine_spans(spans_a, spans_b, &keep);
        if spans.is_empty() {
            continue;
        }

        // Coalesce with the previous band when the walls line up exactly.
        if let Some(prev) = out.last_mut() {
            if prev.bottom == top && prev.spans == spans {
                prev.bottom = bottom;
                continue;
            }
        }
        out.push(Band { top, bottom, spans });
    }

    Region { bands: out }
}

/// The span list of the band active in the slab starting at `top`, or the
/// empty list. `idx` is a cursor into `bands`, advanced monotonically as
/// slabs move downward.
fn slab_spans<'a>(bands: &'a [Band], idx: &mut usize, top: i32) -> &'a [(i32, i32)] {
    while *idx < bands.len() && bands[*idx].bottom <= top {
        *idx += 1;
    }
    match bands.get(*idx) {
        Some(band) if band.top <= top => &band.spans,
        _ => &[],
    }
}

/// Combines two sorted disjoint span lists under `keep`, merging touching
/// output spans.
fn combine_spans(
    a: &[(i32, i32)],
    b: &[(i32, i32)],
    keep: &impl Fn(bool, bool) -> bool,
) -> Vec<(i32, i32)> {
    let mut cuts: Vec<i32> = Vec::with_capacity(2 * (a.len() + b.len()));
    for &(x0, x1) in a.iter().chain(b.iter()) {
        cuts.push(x0);
        cuts.push(x1);
    }
    cuts.sort_unstable();
    cuts.dedup();

    let mut out: Vec<(i32, i32)> = Vec::new();
    let mut ai = 0;
    let mut bi = 0;

    for window in cuts.windows(2) {
        let (x0, x1) = (window[0], window[1]);
        let in_a = cell_covered(a, &mut ai, x0);
        let in_b = cell_covered(b, &mut bi, x0);
        if !keep(in_a, in_b) {
            continue;
        }
        match out.last_mut() {
            Some(last) if last.1 == x0 => last.1 = x1,
            _ => out.push((x0, x1)),
        }
    }

    out
}

/// Whether the elementary cell starting at `x0` lies inside one of the
/// sorted spans. `idx` is a monotone cursor.
fn cell_covered(spans: &[(i32, i32)], idx: &mut usize, x0: i32) -> bool {
    while *idx < spans.len() && spans[*idx].1 <= x0 {
        *idx += 1;
    }
    matches!(spans.get(*idx), Some(&(s0, _)) if s0 <= x0)
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Asserts no two scan rectangles of `region` overlap.
    fn assert_no_overlap(region: &Region) {
        let scans = region.scans();
        for (i, a) in scans.iter().enumerate() {
            for b in &scans[i + 1..] {
                assert!(
                    a.intersect(b).is_empty(),
                    "scans overlap: {:?} and {:?}",
                    a,
                    b
                );
            }
        }
    }

    fn covers(region: &Region, x: i32, y: i32) -> bool {
        region.scans().iter().any(|r| r.contains(x, y))
    }

    #[test]
    fn empty_rect_is_a_no_op() {
        let mut region = Region::new();
        region.add_rect(Rect::new(5, 5, 0, 10));
        region.add_rect(Rect::new(5, 5, 10, 0));
        assert!(region.is_empty());
        assert_eq!(region.scans().len(), 0);
    }

    #[test]
    fn overlapping_union_area_is_175() {
        // (0,0,10,10) union (5,5,10,10) covers 100 + 100 - 25 pixels.
        let mut region = Region::new();
        region.add_rect(Rect::new(0, 0, 10, 10));
        region.add_rect(Rect::new(5, 5, 10, 10));
        assert_eq!(region.area(), 175);
        assert_no_overlap(&region);
        assert!(covers(&region, 0, 0));
        assert!(covers(&region, 14, 14));
        assert!(!covers(&region, 14, 0));
        assert!(!covers(&region, 0, 14));
    }

    #[test]
    fn stacked_rects_coalesce_into_one_band() {
        let mut region = Region::new();
        region.add_rect(Rect::new(3, 0, 4, 2));
        region.add_rect(Rect::new(3, 2, 4, 3));
        let scans = region.scans();
        assert_eq!(scans, vec![Rect::new(3, 0, 4, 5)]);
    }

    #[test]
    fn touching_spans_in_a_row_merge() {
        let mut region = Region::new();
        region.add_rect(Rect::new(0, 0, 5, 1));
        region.add_rect(Rect::new(5, 0, 5, 1));
        assert_eq!(region.scans(), vec![Rect::new(0, 0, 10, 1)]);
    }

    #[test]
    fn xor_with_self_is_empty() {
        let region = Region::from_rects(&[Rect::new(0, 0, 10, 10), Rect::new(20, 5, 3, 8)]);
        assert!(region.xor(&region).is_empty());
    }

    #[test]
    fn xor_removes_the_overlap() {
        let a = Region::from_rect(Rect::new(0, 0, 10, 10));
        let b = Region::from_rect(Rect::new(5, 0, 10, 10));
        let x = a.xor(&b);
        assert_eq!(x.area(), 100 + 100 - 2 * 50);
        assert!(!covers(&x, 7, 5));
        assert!(covers(&x, 2, 5));
        assert!(covers(&x, 12, 5));
        assert_no_overlap(&x);
    }

    #[test]
    fn union_then_intersect_covers_original() {
        let a = Region::from_rects(&[Rect::new(0, 0, 7, 7), Rect::new(10, 3, 5, 9)]);
        let b = Region::from_rects(&[Rect::new(4, 4, 10, 2), Rect::new(-3, -3, 4, 4)]);
        let back = a.union(&b).intersect(&a);
        assert_eq!(back, a);
    }

    #[test]
    fn intersect_of_disjoint_is_empty() {
        let a = Region::from_rect(Rect::new(0, 0, 5, 5));
        let b = Region::from_rect(Rect::new(5, 5, 5, 5));
        assert!(a.intersect(&b).is_empty());
    }

    #[test]
    fn intersect_rect_clips() {
        let region = Region::from_rect(Rect::new(-5, -5, 20, 20));
        let clipped = region.intersect_rect(Rect::new(0, 0, 10, 10));
        assert_eq!(clipped.scans(), vec![Rect::new(0, 0, 10, 10)]);
    }

    #[test]
    fn bounds_wraps_all_scans() {
        let region = Region::from_rects(&[Rect::new(2, 3, 4, 4), Rect::new(10, 1, 2, 2)]);
        assert_eq!(region.bounds(), Rect::from_edges(2, 1, 12, 7));
    }

    #[test]
    fn normalization_survives_messy_input() {
        // A pile of overlapping and touching rectangles; result must be
        // non-overlapping with the exact area of the pointwise union.
        let rects = [
            Rect::new(0, 0, 10, 10),
            Rect::new(5, 5, 10, 10),
            Rect::new(-2, 3, 6, 2),
            Rect::new(9, 0, 1, 20),
            Rect::new(3, 9, 2, 2),
        ];
        let region = Region::from_rects(&rects);
        assert_no_overlap(&region);

        // Count pixels the brute-force way over a window covering it all.
        let mut expected = 0u64;
        for y in -5..30 {
            for x in -5..30 {
                if rects.iter().any(|r| r.contains(x, y)) {
                    expected += 1;
                }
            }
        }
        assert_eq!(region.area(), expected);
    }
}
