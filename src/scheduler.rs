// src/scheduler.rs

//! The parallel render scheduler.
//!
//! `Document::update` hands this module a list of dirty scan rectangles;
//! the scheduler splits the common single-big-rectangle case into
//! horizontal strips, partitions the rectangle list into one contiguous
//! index range per worker, runs `N-1` ranges on scoped threads and the
//! last range inline on the calling thread, then joins. The barrier is
//! the scope itself: `dispatch` does not return until every worker has
//! finished.
//!
//! Partitioning never assigns one rectangle to two workers, which is the
//! invariant that lets all workers share a single destination surface
//! without synchronization.

use std::num::NonZeroUsize;
use std::ops::Range;
use std::thread;

use log::trace;

use crate::rect::Rect;

/// Fan-out/join scheduler with a fixed worker count.
#[derive(Debug)]
pub(crate) struct RenderScheduler {
    workers: usize,
}

impl RenderScheduler {
    /// Scheduler sized to the logical CPU count.
    pub(crate) fn new() -> Self {
        let workers = thread::available_parallelism()
            .map(NonZeroUsize::get)
            .unwrap_or(1);
        Self::with_workers(workers)
    }

    /// Scheduler with an explicit worker count (`>= 1`).
    pub(crate) fn with_workers(workers: usize) -> Self {
        assert!(workers >= 1, "worker count must be at least 1");
        Self { workers }
    }

    #[inline]
    pub(crate) fn worker_count(&self) -> usize {
        self.workers
    }

    /// Prepares a scan list for dispatch.
    ///
    /// When the dirty area reduced to exactly one rectangle taller than a
    /// single pixel, split it into per-worker strips so the work can fan
    /// out at all; any other shape is taken as-is.
    pub(crate) fn split_scans(&self, scans: Vec<Rect>) -> Vec<Rect> {
        if scans.len() == 1 && scans[0].height > 1 {
            split_into_strips(scans[0], self.workers)
        } else {
            scans
        }
    }

    /// Renders `rects` across the worker pool: `N-1` contiguous ranges on
    /// spawned threads, the last range on the calling thread, then joins.
    pub(crate) fn dispatch<F>(&self, rects: &[Rect], job: F)
    where
        F: Fn(&[Rect]) + Sync,
    {
        let ranges = partition_ranges(rects.len(), self.workers);
        trace!(
            "dispatching {} rect(s) across {} worker(s)",
            rects.len(),
            self.workers
        );

        let job = &job;
        thread::scope(|scope| {
            let (last, dispatched) = ranges.split_last().expect("worker count >= 1");
            for range in dispatched {
                if range.is_empty() {
                    continue;
                }
                let chunk = &rects[range.clone()];
                scope.spawn(move || job(chunk));
            }
            // Reuse this thread for the last range; it would only block on
            // the join otherwise.
            job(&rects[last.clone()]);
        });
    }
}

/// Splits a rectangle into up to `n` horizontal strips covering it
/// exactly. Strips are proportional; degenerate (empty) strips produced
/// when the rectangle has fewer rows than workers are dropped.
pub(crate) fn split_into_strips(rect: Rect, n: usize) -> Vec<Rect> {
    // i * height can exceed i32 for full-range heights; do the
    // proportional math in i64 and come back down after dividing.
    let n = n as i64;
    let height = rect.height as i64;
    let mut strips = Vec::with_capacity(n as usize);
    for i in 0..n {
        let top = rect.top() + ((i * height) / n) as i32;
        let bottom = rect.top() + (((i + 1) * height) / n) as i32;
        if bottom > top {
            strips.push(Rect::from_edges(rect.left(), top, rect.right(), bottom));
        }
    }
    strips
}

/// Partitions `0..len` into `n` contiguous ranges of `len / n` elements,
/// the final range absorbing the integer-division remainder.
pub(crate) fn partition_ranges(len: usize, n: usize) -> Vec<Range<usize>> {
    let chunk = len / n;
    let mut ranges = Vec::with_capacity(n);
    for i in 0..n - 1 {
        ranges.push(i * chunk..(i + 1) * chunk);
    }
    ranges.push((n - 1) * chunk..len);
    ranges
}
