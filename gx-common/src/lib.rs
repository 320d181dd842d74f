//! Shared frame data model for the Nethercore GX 3D core
//!
//! This crate holds the backend-independent types exchanged between:
//! - `nethercore-gx` (renderer and rasterizer backends)
//! - `gx-cli` (headless scene renderer)
//!
//! # Modules
//!
//! - [`stencil`] - Stencil byte bitfield (identity, translucent flag, scratch)
//! - [`polygon`] - Polygons, vertices, viewports and texture parameters
//! - [`geometry`] - Per-frame sorted draw list and its validation
//! - [`texture`] - Decoded texture images
//! - [`state`] - Per-frame global 3D state (fog, toon, edge, clear)
//! - [`color`] - Color format conversions
//! - [`fog`] - Fog density table math
//! - [`edge`] - Edge marking rule and color table

pub mod color;
pub mod edge;
pub mod fog;
pub mod geometry;
pub mod polygon;
pub mod state;
pub mod stencil;
pub mod texture;

pub use color::OutputFormat;
pub use edge::{EdgeSample, EdgeSentinel, detect_edge};
pub use fog::{FOG_TABLE_LEN, FogProgramKey};
pub use geometry::{GeometryError, GeometryList};
pub use polygon::{
    ClippedPolygon, MAX_POLYGON_ALPHA, MAX_POLYGON_ID, NATIVE_HEIGHT, NATIVE_WIDTH, Polygon,
    PolygonAttributes, PolygonMode, TexelFormat, TextureParams, Topology, Vertex, Viewport,
    WrapMode,
};
pub use state::{ClearImage, ClearValues, DEPTH_MAX, RenderState, TOON_TABLE_LEN, ToonShading};
pub use stencil::StencilByte;
pub use texture::{TextureImage, TextureSet};
