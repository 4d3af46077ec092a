use std::fmt;

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Vec2 {
    pub x: f32,
    pub y: f32,
}

impl Vec2 {
    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    pub fn distance(self, other: Vec2) -> f32 {
        let dx = other.x - self.x;
        let dy = other.y - self.y;
        (dx * dx + dy * dy).sqrt()
    }

    pub fn is_finite(self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }
}

/// Axis-aligned box in world units, `left`/`top` inclusive.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Aabb {
    pub left: f32,
    pub top: f32,
    pub width: f32,
    pub height: f32,
}

impl Aabb {
    pub const fn new(left: f32, top: f32, width: f32, height: f32) -> Self {
        Self {
            left,
            top,
            width,
            height,
        }
    }

    /// Square box of half-extent `half_size` centred on `center`.
    pub fn centered(center: Vec2, half_size: f32) -> Self {
        Self {
            left: center.x - half_size,
            top: center.y - half_size,
            width: half_size * 2.0,
            height: half_size * 2.0,
        }
    }

    pub fn right(&self) -> f32 {
        self.left + self.width
    }

    pub fn bottom(&self) -> f32 {
        self.top + self.height
    }

    /// Strict overlap; boxes that only share an edge do not intersect.
    pub fn intersects(&self, other: &Aabb) -> bool {
        self.left < other.right()
            && other.left < self.right()
            && self.top < other.bottom()
            && other.top < self.bottom()
    }

    /// Length of the per-axis gaps between two boxes, zero when they overlap.
    pub fn gap_distance(&self, other: &Aabb) -> f32 {
        let dx = (self.left - other.right())
            .max(other.left - self.right())
            .max(0.0);
        let dy = (self.top - other.bottom())
            .max(other.top - self.bottom())
            .max(0.0);
        (dx * dx + dy * dy).sqrt()
    }
}

/// Integer cell of the world grid. Cell `(gx, gy)` spans
/// `[gx * area_size, (gx + 1) * area_size)` on the x axis, likewise for y.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GridCoord {
    pub gx: i32,
    pub gy: i32,
}

const CACHE_KEY_PREFIX: &str = "area_";

impl GridCoord {
    pub const fn new(gx: i32, gy: i32) -> Self {
        Self { gx, gy }
    }

    /// Cell containing `position`. Uses floor division so negative positions
    /// land in negative cells.
    pub fn containing(position: Vec2, area_size: f32) -> Self {
        Self {
            gx: (position.x / area_size).floor() as i32,
            gy: (position.y / area_size).floor() as i32,
        }
    }

    pub fn origin(self, area_size: f32) -> Vec2 {
        Vec2 {
            x: self.gx as f32 * area_size,
            y: self.gy as f32 * area_size,
        }
    }

    pub fn cache_key(self) -> String {
        format!("{CACHE_KEY_PREFIX}{}_{}", self.gx, self.gy)
    }

    pub fn from_cache_key(key: &str) -> Option<Self> {
        let rest = key.strip_prefix(CACHE_KEY_PREFIX)?;
        // Split on the separator that follows the first number; a leading
        // '-' belongs to the number itself.
        let split_at = rest
            .char_indices()
            .skip(1)
            .find(|(_, ch)| *ch == '_')
            .map(|(idx, _)| idx)?;
        let (gx_text, gy_text) = (&rest[..split_at], &rest[split_at + 1..]);
        let gx = gx_text.parse::<i32>().ok()?;
        let gy = gy_text.parse::<i32>().ok()?;
        let coord = Self { gx, gy };
        (coord.cache_key() == key).then_some(coord)
    }
}

impl fmt::Display for GridCoord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.gx, self.gy)
    }
}
