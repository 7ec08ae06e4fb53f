//! Canvas geometry: boxes, containment, interior overlap.

use serde::{Deserialize, Serialize};

/// Tolerance for float comparisons on canvas units.
pub const EPSILON: f64 = 1e-6;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct Canvas {
    pub width: f64,
    pub height: f64,
}

impl Canvas {
    pub fn aspect_ratio(&self) -> f64 {
        self.width / self.height
    }

    pub fn bounds(&self) -> LayoutBox {
        LayoutBox::new(0.0, 0.0, self.width, self.height)
    }

    pub fn contains(&self, b: &LayoutBox) -> bool {
        b.is_finite()
            && b.width >= 0.0
            && b.height >= 0.0
            && b.x >= -EPSILON
            && b.y >= -EPSILON
            && b.right() <= self.width + EPSILON
            && b.bottom() <= self.height + EPSILON
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct LayoutBox {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl LayoutBox {
    pub const fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self { x, y, width, height }
    }

    pub fn right(&self) -> f64 {
        self.x + self.width
    }

    pub fn bottom(&self) -> f64 {
        self.y + self.height
    }

    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite() && self.width.is_finite() && self.height.is_finite()
    }

    /// Shrink on every side; collapses to zero size rather than going negative.
    pub fn inset(&self, amount: f64) -> Self {
        let width = (self.width - 2.0 * amount).max(0.0);
        let height = (self.height - 2.0 * amount).max(0.0);
        Self::new(self.x + amount, self.y + amount, width, height)
    }

    pub fn outset(&self, amount: f64) -> Self {
        Self::new(
            self.x - amount,
            self.y - amount,
            self.width + 2.0 * amount,
            self.height + 2.0 * amount,
        )
    }

    /// Box of `width` x `height` centered inside `self`.
    pub fn center(&self, width: f64, height: f64) -> Self {
        Self::new(
            self.x + (self.width - width) / 2.0,
            self.y + (self.height - height) / 2.0,
            width,
            height,
        )
    }

    pub fn contains(&self, other: &LayoutBox) -> bool {
        other.x >= self.x - EPSILON
            && other.y >= self.y - EPSILON
            && other.right() <= self.right() + EPSILON
            && other.bottom() <= self.bottom() + EPSILON
    }

    /// True when the open interiors intersect; shared edges do not count.
    pub fn overlaps(&self, other: &LayoutBox) -> bool {
        self.x < other.right() - EPSILON
            && other.x < self.right() - EPSILON
            && self.y < other.bottom() - EPSILON
            && other.y < self.bottom() - EPSILON
    }
}

/// Index pairs of overlapping boxes.
pub fn overlapping_pairs(boxes: &[LayoutBox]) -> Vec<(usize, usize)> {
    let mut pairs = vec![];
    for i in 0..boxes.len() {
        for j in (i + 1)..boxes.len() {
            if boxes[i].overlaps(&boxes[j]) {
                pairs.push((i, j));
            }
        }
    }
    pairs
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shared_edges_do_not_overlap() {
        let a = LayoutBox::new(0.0, 0.0, 10.0, 10.0);
        let b = LayoutBox::new(10.0, 0.0, 10.0, 10.0);
        let c = LayoutBox::new(9.0, 9.0, 5.0, 5.0);
        assert!(!a.overlaps(&b));
        assert!(a.overlaps(&c));
        assert_eq!(overlapping_pairs(&[a, b, c]), vec![(0, 2), (1, 2)]);
    }

    #[test]
    fn test_canvas_containment() {
        let canvas = Canvas { width: 960.0, height: 540.0 };
        assert!(canvas.contains(&LayoutBox::new(0.0, 0.0, 960.0, 540.0)));
        assert!(!canvas.contains(&LayoutBox::new(900.0, 0.0, 61.0, 10.0)));
        assert!(!canvas.contains(&LayoutBox::new(-1.0, 0.0, 10.0, 10.0)));
        assert!(!canvas.contains(&LayoutBox::new(f64::NAN, 0.0, 10.0, 10.0)));
    }

    #[test]
    fn test_inset_and_center() {
        let region = LayoutBox::new(36.0, 120.0, 540.0, 384.0);
        let inner = region.inset(12.0);
        assert_eq!(inner, LayoutBox::new(48.0, 132.0, 516.0, 360.0));
        let centered = region.center(100.0, 50.0);
        assert!(region.contains(&centered));
        assert_eq!(centered.x - region.x, region.right() - centered.right());
    }
}
