//! Per-frame geometry list handed over by the geometry stage

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::polygon::{ClippedPolygon, MAX_POLYGON_ALPHA, MAX_POLYGON_ID, Polygon, Vertex};
use crate::texture::TextureSet;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum GeometryError {
    #[error("polygon {polygon} references vertex {vertex} but only {count} vertices exist")]
    VertexOutOfRange {
        polygon: usize,
        vertex: u16,
        count: usize,
    },
    #[error("clipped entry {entry} references polygon {polygon} but only {count} polygons exist")]
    PolygonOutOfRange {
        entry: usize,
        polygon: usize,
        count: usize,
    },
    #[error("opaque count {opaque} exceeds the {count} clipped entries")]
    OpaqueCountOutOfRange { opaque: usize, count: usize },
    #[error("polygon {polygon} has identity {id} (maximum 63)")]
    InvalidIdentity { polygon: usize, id: u8 },
    #[error("polygon {polygon} has alpha {alpha} (maximum 31)")]
    InvalidAlpha { polygon: usize, alpha: u8 },
    #[error("polygon {polygon} samples missing texture {handle}")]
    MissingTexture { polygon: usize, handle: u32 },
}

/// Sorted draw list for one frame.
///
/// `clipped` holds the opaque entries first (`opaque_count` of them),
/// followed by translucent entries in submission order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GeometryList {
    pub vertices: Vec<Vertex>,
    pub polygons: Vec<Polygon>,
    pub clipped: Vec<ClippedPolygon>,
    pub opaque_count: usize,
}

impl GeometryList {
    pub fn is_empty(&self) -> bool {
        self.clipped.is_empty()
    }

    pub fn opaque(&self) -> &[ClippedPolygon] {
        &self.clipped[..self.opaque_count.min(self.clipped.len())]
    }

    pub fn translucent(&self) -> &[ClippedPolygon] {
        &self.clipped[self.opaque_count.min(self.clipped.len())..]
    }

    pub fn polygon(&self, entry: &ClippedPolygon) -> &Polygon {
        &self.polygons[entry.index]
    }

    /// Check every cross-reference so the draw loop can index without bounds failures.
    pub fn validate(&self, textures: &TextureSet) -> Result<(), GeometryError> {
        if self.opaque_count > self.clipped.len() {
            return Err(GeometryError::OpaqueCountOutOfRange {
                opaque: self.opaque_count,
                count: self.clipped.len(),
            });
        }

        for (entry, clipped) in self.clipped.iter().enumerate() {
            if clipped.index >= self.polygons.len() {
                return Err(GeometryError::PolygonOutOfRange {
                    entry,
                    polygon: clipped.index,
                    count: self.polygons.len(),
                });
            }
        }

        for (index, polygon) in self.polygons.iter().enumerate() {
            let attrs = &polygon.attributes;
            if attrs.polygon_id > MAX_POLYGON_ID {
                return Err(GeometryError::InvalidIdentity {
                    polygon: index,
                    id: attrs.polygon_id,
                });
            }
            if attrs.alpha > MAX_POLYGON_ALPHA {
                return Err(GeometryError::InvalidAlpha {
                    polygon: index,
                    alpha: attrs.alpha,
                });
            }
            if let Some(&vertex) = polygon
                .vertex_indices()
                .iter()
                .find(|&&v| usize::from(v) >= self.vertices.len())
            {
                return Err(GeometryError::VertexOutOfRange {
                    polygon: index,
                    vertex,
                    count: self.vertices.len(),
                });
            }
            if let Some(handle) = polygon.texture.handle
                && textures.get(handle).is_none()
            {
                return Err(GeometryError::MissingTexture {
                    polygon: index,
                    handle,
                });
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::polygon::{PolygonAttributes, TextureParams, Topology, Viewport};

    fn triangle(id: u8, alpha: u8) -> Polygon {
        Polygon {
            attributes: PolygonAttributes {
                polygon_id: id,
                alpha,
                ..Default::default()
            },
            topology: Topology::Triangles,
            vertices: [0, 1, 2, 0],
            texture: TextureParams::default(),
            viewport: Viewport::default(),
        }
    }

    fn list_with(polygons: Vec<Polygon>, opaque_count: usize) -> GeometryList {
        GeometryList {
            vertices: vec![Vertex::default(); 3],
            clipped: (0..polygons.len())
                .map(|index| ClippedPolygon {
                    index,
                    back_facing: false,
                })
                .collect(),
            polygons,
            opaque_count,
        }
    }

    #[test]
    fn test_valid_list() {
        let list = list_with(vec![triangle(1, 31), triangle(2, 16)], 1);
        assert_eq!(list.validate(&TextureSet::default()), Ok(()));
        assert_eq!(list.opaque().len(), 1);
        assert_eq!(list.translucent().len(), 1);
    }

    #[test]
    fn test_opaque_count_out_of_range() {
        let list = list_with(vec![triangle(1, 31)], 2);
        assert!(matches!(
            list.validate(&TextureSet::default()),
            Err(GeometryError::OpaqueCountOutOfRange { .. })
        ));
    }

    #[test]
    fn test_vertex_out_of_range() {
        let mut poly = triangle(1, 31);
        poly.vertices = [0, 1, 9, 0];
        let list = list_with(vec![poly], 1);
        assert_eq!(
            list.validate(&TextureSet::default()),
            Err(GeometryError::VertexOutOfRange {
                polygon: 0,
                vertex: 9,
                count: 3
            })
        );
    }

    #[test]
    fn test_invalid_identity() {
        let list = list_with(vec![triangle(64, 31)], 1);
        assert!(matches!(
            list.validate(&TextureSet::default()),
            Err(GeometryError::InvalidIdentity { id: 64, .. })
        ));
    }

    #[test]
    fn test_missing_texture() {
        let mut poly = triangle(1, 31);
        poly.texture.handle = Some(3);
        let list = list_with(vec![poly], 1);
        assert!(matches!(
            list.validate(&TextureSet::default()),
            Err(GeometryError::MissingTexture { handle: 3, .. })
        ));
    }

    #[test]
    fn test_json_scene_defaults() {
        let json = r#"{
            "vertices": [],
            "polygons": [{"attributes": {"polygon_id": 4, "alpha": 31}, "vertices": [0, 0, 0, 0]}],
            "clipped": [{"index": 0}],
            "opaque_count": 1
        }"#;
        let list: GeometryList = serde_json::from_str(json).unwrap();
        assert_eq!(list.polygons[0].attributes.polygon_id, 4);
        assert_eq!(list.polygons[0].topology, Topology::Triangles);
        assert!(!list.clipped[0].back_facing);
    }
}
