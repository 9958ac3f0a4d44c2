// THEORY:
// The `RegionRegistry` holds the user-drawn zones of interest. Person detection
// only ever looks inside these zones, so the registry is the spatial filter in
// front of the whole person pipeline. It is deliberately simple: an ordered list,
// linear scans, no spatial index. Zone counts are small and every operation runs
// under the engine's shared lock, so O(n) is the right trade.
//
// Rectangles are stored exactly as the caller sent them. They are only clamped
// to the frame when they are used, because the registry does not know the frame
// size and a zone drawn on one resolution may later be applied to another.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque, unique identifier of a region.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RegionId(String);

impl RegionId {
    /// A fresh random 128-bit token rendered as 32 hex characters.
    pub fn generate() -> Self {
        Self(format!("{:032x}", rand::random::<u128>()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for RegionId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for RegionId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl fmt::Display for RegionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// An axis-aligned rectangle in pixel coordinates, `(x, y)` being the top-left corner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rect {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

impl Rect {
    pub fn new(x: i32, y: i32, width: i32, height: i32) -> Self {
        Self { x, y, width, height }
    }

    /// Clamps the rectangle into a `frame_width` x `frame_height` frame.
    /// Returns `None` when nothing of it is left.
    ///
    /// A negative origin is moved to 0 without shrinking the size, so
    /// `(-20, -5, 50, 30)` becomes `(0, 0, 50, 30)`. Zones drawn partly off
    /// screen keep their full extent inside the frame.
    pub fn clamp_to(&self, frame_width: u32, frame_height: u32) -> Option<ClampedRect> {
        let fw = frame_width as i64;
        let fh = frame_height as i64;
        let x = (self.x as i64).clamp(0, fw);
        let y = (self.y as i64).clamp(0, fh);
        let w = (self.width as i64).clamp(0, fw - x);
        let h = (self.height as i64).clamp(0, fh - y);
        if w == 0 || h == 0 {
            return None;
        }
        Some(ClampedRect {
            x: x as u32,
            y: y as u32,
            width: w as u32,
            height: h as u32,
        })
    }
}

/// A rectangle known to be non-empty and inside the frame it was clamped to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClampedRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

/// A named zone of interest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Region {
    pub id: RegionId,
    pub name: String,
    pub rect: Rect,
}

/// Insertion-ordered store of regions. The registry is the sole owner of its regions;
/// readers get clones.
#[derive(Debug, Default)]
pub struct RegionRegistry {
    regions: Vec<Region>,
}

impl RegionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, rect: Rect, name: impl Into<String>) -> RegionId {
        let mut id = RegionId::generate();
        while self.regions.iter().any(|r| r.id == id) {
            id = RegionId::generate();
        }
        self.regions.push(Region {
            id: id.clone(),
            name: name.into(),
            rect,
        });
        id
    }

    /// Removes the region with `id`. Unknown ids are ignored.
    /// Returns whether something was removed.
    pub fn delete(&mut self, id: &RegionId) -> bool {
        let before = self.regions.len();
        self.regions.retain(|r| &r.id != id);
        self.regions.len() != before
    }

    pub fn list(&self) -> Vec<Region> {
        self.regions.clone()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Region> {
        self.regions.iter()
    }

    pub fn len(&self) -> usize {
        self.regions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.regions.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_keeps_insertion_order() {
        let mut registry = RegionRegistry::new();
        let door = registry.add(Rect::new(10, 10, 100, 100), "Door");
        let window = registry.add(Rect::new(200, 0, 50, 80), "Window");

        let listed = registry.list();
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].id, door);
        assert_eq!(listed[0].name, "Door");
        assert_eq!(listed[1].id, window);
        assert_ne!(door, window);
        assert_eq!(door.as_str().len(), 32);
    }

    #[test]
    fn test_delete_unknown_is_noop() {
        let mut registry = RegionRegistry::new();
        registry.add(Rect::new(0, 0, 10, 10), "A");
        let before = registry.list();

        assert!(!registry.delete(&RegionId::from("missing")));
        assert_eq!(registry.list(), before);
    }

    #[test]
    fn test_delete_removes_only_target() {
        let mut registry = RegionRegistry::new();
        let a = registry.add(Rect::new(0, 0, 10, 10), "A");
        let b = registry.add(Rect::new(5, 5, 10, 10), "B");

        assert!(registry.delete(&a));
        assert!(!registry.delete(&a));
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.list()[0].id, b);
    }

    #[test]
    fn test_clamp_rect() {
        let inside = Rect::new(10, 10, 100, 100).clamp_to(640, 480).unwrap();
        assert_eq!((inside.x, inside.y, inside.width, inside.height), (10, 10, 100, 100));

        let negative = Rect::new(-20, -5, 50, 30).clamp_to(640, 480).unwrap();
        assert_eq!((negative.x, negative.y, negative.width, negative.height), (0, 0, 50, 30));

        let overflow = Rect::new(600, 450, 100, 100).clamp_to(640, 480).unwrap();
        assert_eq!((overflow.width, overflow.height), (40, 30));

        assert!(Rect::new(700, 10, 50, 50).clamp_to(640, 480).is_none());
        assert!(Rect::new(10, 10, 0, 50).clamp_to(640, 480).is_none());
    }
}
