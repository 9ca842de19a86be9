//! Integer rectangles used for regions, extents and dirty areas

use serde::{Deserialize, Serialize};

/// Axis-aligned integer rectangle. `width` and `height` are never negative;
/// a rectangle with a zero side is empty.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Rect {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

impl Rect {
    pub const fn new(x: i32, y: i32, width: i32, height: i32) -> Self {
        Self { x, y, width, height }
    }

    /// Rectangle spanning `[left, right) x [top, bottom)`
    pub fn from_edges(left: i32, top: i32, right: i32, bottom: i32) -> Self {
        Self {
            x: left,
            y: top,
            width: (right - left).max(0),
            height: (bottom - top).max(0),
        }
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.width <= 0 || self.height <= 0
    }

    /// Exclusive right edge
    #[inline]
    pub fn right(&self) -> i32 {
        self.x + self.width
    }

    /// Exclusive bottom edge
    #[inline]
    pub fn bottom(&self) -> i32 {
        self.y + self.height
    }

    #[inline]
    pub fn area(&self) -> i64 {
        if self.is_empty() {
            0
        } else {
            self.width as i64 * self.height as i64
        }
    }

    #[inline]
    pub fn contains(&self, x: i32, y: i32) -> bool {
        x >= self.x && x < self.right() && y >= self.y && y < self.bottom()
    }

    pub fn contains_rect(&self, other: &Rect) -> bool {
        other.is_empty()
            || (other.x >= self.x
                && other.y >= self.y
                && other.right() <= self.right()
                && other.bottom() <= self.bottom())
    }

    pub fn intersects(&self, other: &Rect) -> bool {
        !self.intersection(other).is_empty()
    }

    /// Overlapping part of two rectangles (empty when disjoint)
    pub fn intersection(&self, other: &Rect) -> Rect {
        Rect::from_edges(
            self.x.max(other.x),
            self.y.max(other.y),
            self.right().min(other.right()),
            self.bottom().min(other.bottom()),
        )
    }

    /// Smallest rectangle containing both. Empty inputs are ignored.
    pub fn union(&self, other: &Rect) -> Rect {
        if self.is_empty() {
            return *other;
        }
        if other.is_empty() {
            return *self;
        }
        Rect::from_edges(
            self.x.min(other.x),
            self.y.min(other.y),
            self.right().max(other.right()),
            self.bottom().max(other.bottom()),
        )
    }

    pub fn translated(&self, dx: i32, dy: i32) -> Rect {
        Rect::new(self.x + dx, self.y + dy, self.width, self.height)
    }

    /// Grow the rectangle outward to the nearest multiples of `grid`
    pub fn aligned_to(&self, grid: i32) -> Rect {
        if self.is_empty() {
            return *self;
        }
        let left = self.x.div_euclid(grid) * grid;
        let top = self.y.div_euclid(grid) * grid;
        let right = (self.right() + grid - 1).div_euclid(grid) * grid;
        let bottom = (self.bottom() + grid - 1).div_euclid(grid) * grid;
        Rect::from_edges(left, top, right, bottom)
    }

    /// Mirror across a vertical (`Horizontal`) or horizontal (`Vertical`)
    /// axis. `axis2` is twice the axis coordinate so half-pixel axes stay
    /// exact; applying the same mirror twice restores the rectangle.
    pub fn mirrored(&self, direction: MirrorDirection, axis2: i32) -> Rect {
        match direction {
            MirrorDirection::Horizontal => {
                Rect::new(axis2 - self.right(), self.y, self.width, self.height)
            }
            MirrorDirection::Vertical => {
                Rect::new(self.x, axis2 - self.bottom(), self.width, self.height)
            }
        }
    }
}

/// Mirror axis orientation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MirrorDirection {
    /// Flip left and right
    Horizontal,
    /// Flip top and bottom
    Vertical,
}

/// Flip a row-major pixel buffer in place
pub(crate) fn flip_pixels(bytes: &mut [u8], width: usize, height: usize, ps: usize, direction: MirrorDirection) {
    let row = width * ps;
    match direction {
        MirrorDirection::Horizontal => {
            for line in bytes.chunks_exact_mut(row) {
                for x in 0..width / 2 {
                    let (left, right) = line.split_at_mut((width - 1 - x) * ps);
                    left[x * ps..(x + 1) * ps].swap_with_slice(&mut right[..ps]);
                }
            }
        }
        MirrorDirection::Vertical => {
            for y in 0..height / 2 {
                let (top, bottom) = bytes.split_at_mut((height - 1 - y) * row);
                top[y * row..(y + 1) * row].swap_with_slice(&mut bottom[..row]);
            }
        }
    }
}
