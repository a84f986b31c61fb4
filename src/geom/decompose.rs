//! Rectangle union and decomposition.
//!
//! The union of a layer's rectangles is cut into slabs at every distinct
//! coordinate across the preferred direction. Inside a slab the covered
//! intervals are merged (touching intervals join), and identical intervals
//! in consecutive slabs are glued back together. The result is a set of
//! non-overlapping rectangles that are maximal along the preferred direction.

use std::collections::BTreeMap;

use itertools::Itertools;

use super::{Direction, Rect};

/// Decompose the union of `rects` into rectangles sliced along `direction`.
///
/// Horizontal (and undirected) layers produce rectangles that run as long
/// as possible in x; vertical layers as long as possible in y. Degenerate
/// inputs are ignored. The output is sorted.
pub fn decompose(rects: &[Rect], direction: Direction) -> Vec<Rect> {
    match direction {
        Direction::Vertical => {
            let transposed: Vec<Rect> = rects.iter().map(Rect::transposed).collect();
            let mut out: Vec<Rect> = horizontal_slabs(&transposed)
                .iter()
                .map(Rect::transposed)
                .collect();
            out.sort();
            out
        }
        Direction::Horizontal | Direction::None => horizontal_slabs(rects),
    }
}

fn horizontal_slabs(rects: &[Rect]) -> Vec<Rect> {
    let rects: Vec<Rect> = rects.iter().filter(|r| !r.is_degenerate()).copied().collect();
    let ys: Vec<i64> = rects
        .iter()
        .flat_map(|r| [r.ylo, r.yhi])
        .sorted_unstable()
        .dedup()
        .collect();

    // (xlo, xhi) -> y where the run started
    let mut open: BTreeMap<(i64, i64), i64> = BTreeMap::new();
    let mut out = Vec::new();

    for (ylo, yhi) in ys.iter().copied().tuple_windows() {
        let covering = rects
            .iter()
            .filter(|r| r.ylo <= ylo && r.yhi >= yhi)
            .map(|r| (r.xlo, r.xhi));

        let mut next = BTreeMap::new();
        for interval in merge_intervals(covering) {
            let start = open.remove(&interval).unwrap_or(ylo);
            next.insert(interval, start);
        }
        for ((xlo, xhi), start) in open {
            out.push(Rect::new(xlo, start, xhi, ylo));
        }
        open = next;
    }

    if let Some(&top) = ys.last() {
        for ((xlo, xhi), start) in open {
            out.push(Rect::new(xlo, start, xhi, top));
        }
    }

    out.sort();
    out
}

/// Merge overlapping or touching intervals.
fn merge_intervals(intervals: impl Iterator<Item = (i64, i64)>) -> Vec<(i64, i64)> {
    let mut merged: Vec<(i64, i64)> = Vec::new();
    for (lo, hi) in intervals.sorted_unstable() {
        match merged.last_mut() {
            Some(last) if lo <= last.1 => last.1 = last.1.max(hi),
            _ => merged.push((lo, hi)),
        }
    }
    merged
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_overlapping_stripes_merge() {
        let rects = [Rect::new(0, 0, 60, 10), Rect::new(40, 0, 100, 10)];
        assert_eq!(decompose(&rects, Direction::Horizontal), vec![Rect::new(0, 0, 100, 10)]);
    }

    #[test]
    fn test_cross_keeps_stripe_maximal() {
        // horizontal stripe crossed by a via enclosure sticking out on both sides
        let rects = [Rect::new(0, 0, 100, 10), Rect::new(40, -5, 50, 15)];
        let out = decompose(&rects, Direction::Horizontal);
        assert_eq!(
            out,
            vec![
                Rect::new(0, 0, 100, 10),
                Rect::new(40, -5, 50, 0),
                Rect::new(40, 10, 50, 15),
            ]
        );
    }

    #[test]
    fn test_vertical_direction_slices_columns() {
        let rects = [Rect::new(0, 0, 10, 100), Rect::new(-5, 40, 15, 50)];
        let out = decompose(&rects, Direction::Vertical);
        assert_eq!(
            out,
            vec![
                Rect::new(-5, 40, 0, 50),
                Rect::new(0, 0, 10, 100),
                Rect::new(10, 40, 15, 50),
            ]
        );
    }

    #[test]
    fn test_disjoint_and_degenerate() {
        let rects = [
            Rect::new(0, 0, 10, 10),
            Rect::new(20, 0, 30, 10),
            Rect::new(5, 5, 5, 50),
        ];
        let out = decompose(&rects, Direction::None);
        assert_eq!(out, vec![Rect::new(0, 0, 10, 10), Rect::new(20, 0, 30, 10)]);
    }

    #[test]
    fn test_touching_rects_join() {
        let rects = [Rect::new(0, 0, 10, 10), Rect::new(10, 0, 20, 10)];
        assert_eq!(decompose(&rects, Direction::Horizontal), vec![Rect::new(0, 0, 20, 10)]);
    }
}
