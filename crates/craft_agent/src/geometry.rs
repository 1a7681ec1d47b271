use serde::{Deserialize, Serialize};

/// A position in block space as reported by the bot service.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct BlockPos {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl BlockPos {
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    pub fn distance_to(&self, other: BlockPos) -> f64 {
        block_distance(*self, other)
    }

    pub fn rounded(&self) -> (i64, i64, i64) {
        (
            self.x.round() as i64,
            self.y.round() as i64,
            self.z.round() as i64,
        )
    }
}

impl std::fmt::Display for BlockPos {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let (x, y, z) = self.rounded();
        write!(f, "({x}, {y}, {z})")
    }
}

/// Surface level in the overworld; anything below counts as underground.
pub const SURFACE_Y: f64 = 55.0;

pub fn block_distance(a: BlockPos, b: BlockPos) -> f64 {
    let dx = a.x - b.x;
    let dy = a.y - b.y;
    let dz = a.z - b.z;
    ((dx * dx) + (dy * dy) + (dz * dz)).sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn distance_is_euclidean() {
        let a = BlockPos::new(0.0, 64.0, 0.0);
        let b = BlockPos::new(3.0, 64.0, 4.0);
        assert!((a.distance_to(b) - 5.0).abs() < f64::EPSILON);
    }

    #[test]
    fn display_rounds_coordinates() {
        let pos = BlockPos::new(10.4, 63.6, -4.5);
        assert_eq!(pos.to_string(), "(10, 64, -5)");
    }
}
