//! Frame index buffer generation
//!
//! Every clipped entry gets a contiguous span of indices in draw-list
//! order, so the draw loop only has to advance an offset.

use gx_common::GeometryList;

use super::command::Primitive;

/// Indices emitted for one clipped entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PolygonSpan {
    pub primitive: Primitive,
    pub count: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IndexBuffer {
    pub indices: Vec<u32>,
    /// One span per clipped entry
    pub spans: Vec<PolygonSpan>,
}

impl IndexBuffer {
    /// Build indices for every clipped entry.
    ///
    /// Quads and quad strips split into two triangles, triangle strips are
    /// already stored as independent triangles, and wireframe polygons
    /// become closed outlines drawn as line lists.
    pub fn build(geometry: &GeometryList) -> Self {
        let mut indices = Vec::with_capacity(geometry.clipped.len() * 6);
        let mut spans = Vec::with_capacity(geometry.clipped.len());

        for entry in &geometry.clipped {
            let polygon = geometry.polygon(entry);
            let verts = polygon.vertex_indices();
            let start = indices.len();

            let primitive = if polygon.attributes.is_wireframe() {
                for (i, &v) in verts.iter().enumerate() {
                    indices.push(u32::from(v));
                    indices.push(u32::from(verts[(i + 1) % verts.len()]));
                }
                Primitive::Lines
            } else {
                match *verts {
                    [a, b, c, d] => {
                        indices.extend([a, b, c, c, d, a].map(u32::from));
                    }
                    _ => indices.extend(verts.iter().map(|&v| u32::from(v))),
                }
                Primitive::Triangles
            };

            spans.push(PolygonSpan {
                primitive,
                count: (indices.len() - start) as u32,
            });
        }

        Self { indices, spans }
    }

    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }
}
