//! Edge marking rule
//!
//! A pixel takes an edge color when one of its four neighbors, checked in
//! the order right, up, left, down (framebuffer axes, +x then +y first),
//! carries a different identity, is not wireframe and is not farther away.
//! At the framebuffer border the neighbor is replaced by the clear values.

use crate::color::rgb555_to_rgba8;

/// Number of entries in the edge color table; identities share a color in groups of 8.
pub const EDGE_COLOR_COUNT: usize = 8;

/// Edge color alpha when antialiasing is on.
pub const EDGE_ALPHA_ANTIALIASED: u8 = 0x80;

#[inline]
pub const fn edge_color_index(polygon_id: u8) -> usize {
    ((polygon_id & 0x3F) >> 3) as usize
}

/// Expand the RGB555 edge color table to RGBA8888.
pub fn expand_edge_colors(raw: &[u16; EDGE_COLOR_COUNT], antialias: bool) -> [[u8; 4]; EDGE_COLOR_COUNT] {
    let alpha = if antialias { EDGE_ALPHA_ANTIALIASED } else { 0xFF };
    raw.map(|color| rgb555_to_rgba8(color, alpha))
}

/// G-buffer values of one pixel as seen by the edge pass.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EdgeSample {
    pub polygon_id: u8,
    pub wireframe: bool,
    pub depth: f32,
}

/// Clear identity and depth substituted for neighbors outside the framebuffer.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EdgeSentinel {
    pub polygon_id: u8,
    pub depth: f32,
}

/// Decide which identity's edge color a pixel takes, if any.
///
/// `neighbors` are ordered +x, +y, -x, -y; `None` marks a border.
pub fn detect_edge(
    center: EdgeSample,
    neighbors: [Option<EdgeSample>; 4],
    sentinel: EdgeSentinel,
) -> Option<u8> {
    if center.wireframe {
        return None;
    }

    let marks_clear = center.polygon_id != sentinel.polygon_id && center.depth < sentinel.depth;

    neighbors.into_iter().find_map(|neighbor| match neighbor {
        None => marks_clear.then_some(center.polygon_id),
        Some(n) => (center.polygon_id != n.polygon_id
            && center.depth >= n.depth
            && !n.wireframe)
            .then_some(n.polygon_id),
    })
}
