use crate::location::*;

pub const DIAGONAL_COST: f32 = std::f32::consts::SQRT_2;

pub fn manhattan(a: Cell, b: Cell) -> f32 {
    ((a.x - b.x).unsigned_abs() + (a.y - b.y).unsigned_abs()) as f32
}

pub fn chebyshev(a: Cell, b: Cell) -> f32 {
    a.range_to(b) as f32
}

pub fn euclidean(a: Cell, b: Cell) -> f32 {
    let dx = (a.x - b.x) as f32;
    let dy = (a.y - b.y) as f32;
    (dx * dx + dy * dy).sqrt()
}

/// Exact 8-connected distance on an open grid where diagonals cost √2.
pub fn octile(a: Cell, b: Cell) -> f32 {
    let dx = (a.x - b.x).unsigned_abs() as f32;
    let dy = (a.y - b.y).unsigned_abs() as f32;
    let (short, long) = if dx < dy { (dx, dy) } else { (dy, dx) };
    long - short + short * DIAGONAL_COST
}
