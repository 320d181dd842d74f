//! End-to-end frames on the software rasterizer

use super::*;
use gx_common::{
    ClearImage, ClearValues, ClippedPolygon, DEPTH_MAX, GeometryList, Polygon, PolygonAttributes,
    PolygonMode, RenderState, Topology,
};

use crate::config::Config;
use crate::graphics::Renderer;

// =============================================================================
// Scene setup
// =============================================================================

/// Native-resolution rectangles in normalized device coordinates.
const CENTER: [f32; 4] = [-0.5, -0.5, 0.5, 0.5];
const LEFT_HALF: [f32; 4] = [-0.5, -0.5, 0.0, 0.5];
const TOP_HALF: [f32; 4] = [-1.0, 0.0, 1.0, 1.0];

const RED: [u32; 3] = [63, 0, 0];
const GREEN: [u32; 3] = [0, 63, 0];
const BLUE: [u32; 3] = [0, 0, 63];

#[derive(Default)]
struct Scene {
    geometry: GeometryList,
    opaque: Vec<ClippedPolygon>,
    translucent: Vec<ClippedPolygon>,
}

impl Scene {
    fn quad(mut self, rect: [f32; 4], z: f32, color: [u32; 3], attributes: PolygonAttributes) -> Self {
        let base = self.geometry.vertices.len() as u16;
        let [x0, y0, x1, y1] = rect;
        for (x, y) in [(x0, y0), (x1, y0), (x1, y1), (x0, y1)] {
            self.geometry
                .vertices
                .push(Vertex::new([x, y, z, 1.0], [0.0, 0.0], color));
        }
        self.geometry.polygons.push(Polygon {
            attributes,
            topology: Topology::Quads,
            vertices: [base, base + 1, base + 2, base + 3],
            texture: Default::default(),
            viewport: Default::default(),
        });

        let entry = ClippedPolygon {
            index: self.geometry.polygons.len() - 1,
            back_facing: false,
        };
        if attributes.is_opaque() || attributes.is_wireframe() {
            self.opaque.push(entry);
        } else {
            self.translucent.push(entry);
        }
        self
    }

    fn build(mut self) -> GeometryList {
        self.geometry.opaque_count = self.opaque.len();
        self.geometry.clipped = self.opaque;
        self.geometry.clipped.extend(self.translucent);
        self.geometry
    }
}

fn attrs(polygon_id: u8, alpha: u8) -> PolygonAttributes {
    PolygonAttributes {
        polygon_id,
        alpha,
        ..Default::default()
    }
}

fn shadow(polygon_id: u8) -> PolygonAttributes {
    PolygonAttributes {
        mode: PolygonMode::Shadow,
        ..attrs(polygon_id, 16)
    }
}

fn render_state(clear_alpha: u8) -> RenderState {
    RenderState {
        enable_alpha_blending: true,
        clear: ClearValues {
            color: [0, 0, 0, clear_alpha],
            ..Default::default()
        },
        ..Default::default()
    }
}

fn renderer(config: Config) -> Renderer<SoftRasterizer> {
    Renderer::new(SoftRasterizer::new(), config).unwrap()
}

fn draw(geometry: &GeometryList, state: &RenderState) -> Renderer<SoftRasterizer> {
    let mut renderer = renderer(Config::default());
    renderer
        .render(geometry, &TextureSet::default(), state)
        .unwrap();
    renderer
}

fn color_at(renderer: &Renderer<SoftRasterizer>, x: u32, y: u32) -> [f32; 4] {
    let gbuffer = renderer.rasterizer().gbuffer();
    gbuffer.color[gbuffer.index(x, y)]
}

fn stencil_at(renderer: &Renderer<SoftRasterizer>, x: u32, y: u32) -> u8 {
    let gbuffer = renderer.rasterizer().gbuffer();
    gbuffer.stencil[gbuffer.index(x, y)]
}

fn assert_close(actual: [f32; 4], expected: [f32; 4]) {
    for (a, e) in actual.iter().zip(expected) {
        assert!(
            (a - e).abs() < 1.0e-4,
            "expected {expected:?}, got {actual:?}"
        );
    }
}

const HALF: f32 = 15.0 / 31.0;

// =============================================================================
// Translucency
// =============================================================================

#[test]
fn test_translucent_over_opaque() {
    let geometry = Scene::default()
        .quad(CENTER, 0.0, RED, attrs(5, 31))
        .quad(CENTER, -0.5, BLUE, attrs(7, 15))
        .build();
    let renderer = draw(&geometry, &render_state(31));

    assert_eq!(stencil_at(&renderer, 128, 96), 0x47);
    assert_close(color_at(&renderer, 128, 96), [1.0 - HALF, 0.0, HALF, 1.0]);

    // Outside both polygons the clear survives
    assert_eq!(stencil_at(&renderer, 10, 10), 0);
    assert_close(color_at(&renderer, 10, 10), [0.0, 0.0, 0.0, 1.0]);
}

#[test]
fn test_same_identity_translucent_blends_once() {
    let geometry = Scene::default()
        .quad([-0.5, -0.5, 0.25, 0.5], 0.0, GREEN, attrs(3, 15))
        .quad([-0.25, -0.5, 0.5, 0.5], 0.0, GREEN, attrs(3, 15))
        .build();
    let renderer = draw(&geometry, &render_state(31));

    let single = color_at(&renderer, 80, 96);
    assert_close(single, [0.0, HALF, 0.0, 1.0]);
    assert_close(color_at(&renderer, 128, 96), single);
    assert_close(color_at(&renderer, 176, 96), single);

    // No seam along the quad diagonal
    for y in 50..142 {
        for x in 66..94 {
            assert_close(color_at(&renderer, x, y), single);
        }
    }
}

#[test]
fn test_distinct_identities_blend_twice() {
    let geometry = Scene::default()
        .quad([-0.5, -0.5, 0.25, 0.5], 0.0, GREEN, attrs(3, 15))
        .quad([-0.25, -0.5, 0.5, 0.5], 0.0, GREEN, attrs(4, 15))
        .build();
    let renderer = draw(&geometry, &render_state(31));

    let twice = HALF + HALF * (1.0 - HALF);
    assert_close(color_at(&renderer, 128, 96), [0.0, twice, 0.0, 1.0]);
    assert_close(color_at(&renderer, 80, 96), [0.0, HALF, 0.0, 1.0]);
}

#[test]
fn test_zero_dst_alpha_keeps_full_color() {
    let geometry = Scene::default()
        .quad(CENTER, 0.0, RED, attrs(3, 15))
        .build();

    let emulated = draw(&geometry, &render_state(0));
    assert_close(color_at(&emulated, 128, 96), [1.0, 0.0, 0.0, HALF]);

    let mut config = Config::default();
    config.emulation.special_zero_alpha_blending = false;
    let mut plain = renderer(config);
    plain
        .render(&geometry, &TextureSet::default(), &render_state(0))
        .unwrap();
    assert_close(color_at(&plain, 128, 96), [HALF, 0.0, 0.0, HALF]);
}

// =============================================================================
// Depth
// =============================================================================

#[test]
fn test_depth_equal_draws_on_coplanar_surface() {
    let equal = PolygonAttributes {
        depth_equal_test: true,
        ..attrs(2, 31)
    };
    let geometry = Scene::default()
        .quad(CENTER, 0.0, RED, attrs(1, 31))
        .quad(CENTER, 0.0, BLUE, equal)
        .quad(CENTER, 0.1, GREEN, PolygonAttributes { polygon_id: 3, ..equal })
        .build();
    let renderer = draw(&geometry, &render_state(31));

    assert_close(color_at(&renderer, 128, 96), [0.0, 0.0, 1.0, 1.0]);
    assert_eq!(stencil_at(&renderer, 128, 96), 2);
}

// =============================================================================
// Shadows
// =============================================================================

#[test]
fn test_shadow_darkens_only_inside_volume() {
    let geometry = Scene::default()
        .quad(CENTER, 0.0, RED, attrs(1, 31))
        .quad(LEFT_HALF, 0.6, [0, 0, 0], shadow(0))
        .quad(CENTER, -0.5, BLUE, shadow(2))
        .build();
    let renderer = draw(&geometry, &render_state(31));

    let a = 16.0 / 31.0;
    assert_close(color_at(&renderer, 100, 96), [1.0 - a, 0.0, a, 1.0]);
    assert_eq!(stencil_at(&renderer, 100, 96), 0x42);

    assert_close(color_at(&renderer, 160, 96), [1.0, 0.0, 0.0, 1.0]);
    assert_eq!(stencil_at(&renderer, 160, 96), 1);
}

// =============================================================================
// Post-processing
// =============================================================================

#[test]
fn test_edge_marking_outlines_polygon() {
    let mut state = render_state(31);
    state.enable_edge_marking = true;
    state.edge_mark_colors[1] = 0x001F;
    let geometry = Scene::default()
        .quad(CENTER, 0.0, GREEN, attrs(8, 31))
        .build();
    let renderer = draw(&geometry, &state);

    // Quad covers pixels 64..192 x 48..144
    assert_close(color_at(&renderer, 192, 96), [1.0, 0.0, 0.0, 1.0]);
    assert_close(color_at(&renderer, 63, 96), [1.0, 0.0, 0.0, 1.0]);
    assert_close(color_at(&renderer, 128, 144), [1.0, 0.0, 0.0, 1.0]);
    assert_close(color_at(&renderer, 191, 96), [0.0, 1.0, 0.0, 1.0]);
    assert_close(color_at(&renderer, 128, 96), [0.0, 1.0, 0.0, 1.0]);
    assert_close(color_at(&renderer, 10, 10), [0.0, 0.0, 0.0, 1.0]);
}

#[test]
fn test_fog_applies_to_fog_polygons() {
    let mut state = render_state(31);
    state.enable_fog = true;
    state.fog_color = 0x7C00 | (31 << 16);
    state.fog_shift = 11;
    state.fog_density = [127; 32];
    let fogged = PolygonAttributes {
        fog: true,
        ..attrs(1, 31)
    };
    let geometry = Scene::default()
        .quad(CENTER, 0.0, RED, fogged)
        .build();

    let mut renderer = draw(&geometry, &state);
    assert!(renderer.finish().unwrap());
    let pixels = renderer.pixels().unwrap();
    assert_eq!(pixels[96 * 256 + 128], [0, 0, 255, 255]);
    // Clear pixels carry no fog flag
    assert_eq!(pixels[10 * 256 + 10], [0, 0, 0, 255]);
}

// =============================================================================
// Framebuffer
// =============================================================================

#[test]
fn test_flush_is_top_row_first() {
    let geometry = Scene::default()
        .quad(TOP_HALF, 0.0, RED, attrs(1, 31))
        .build();
    let mut renderer = draw(&geometry, &render_state(31));

    let mut main = vec![[0u8; 4]; 256 * 192];
    let mut buffer16 = vec![0u16; 256 * 192];
    renderer
        .flush(Some(main.as_mut_slice()), Some(buffer16.as_mut_slice()))
        .unwrap();

    assert_eq!(main[0], [63, 0, 0, 31]);
    assert_eq!(main[256 * 192 - 1], [0, 0, 0, 31]);
    assert_eq!(buffer16[0], 0x801F);
    assert_eq!(buffer16[256 * 192 - 1], 0x8000);
}

#[test]
fn test_resize_doubles_coverage() {
    let mut renderer = renderer(Config::default());
    renderer.set_framebuffer_size(512, 384).unwrap();

    let gbuffer = renderer.rasterizer().gbuffer();
    assert_eq!((gbuffer.width, gbuffer.height), (512, 384));
    assert_eq!(gbuffer.len(), 512 * 384);

    let geometry = Scene::default()
        .quad(CENTER, 0.0, RED, attrs(1, 31))
        .build();
    renderer
        .render(&geometry, &TextureSet::default(), &render_state(31))
        .unwrap();

    assert_close(color_at(&renderer, 130, 192), [1.0, 0.0, 0.0, 1.0]);
    assert_close(color_at(&renderer, 126, 192), [0.0, 0.0, 0.0, 1.0]);
    assert_close(color_at(&renderer, 383, 287), [1.0, 0.0, 0.0, 1.0]);
}

#[test]
fn test_clear_image_scaled_to_framebuffer() {
    let mut color = vec![0xFC00; ClearImage::PIXELS];
    color[0] = 0x801F;
    let state = RenderState {
        clear_image: Some(ClearImage {
            color,
            depth: vec![DEPTH_MAX; ClearImage::PIXELS],
            fog: vec![false; ClearImage::PIXELS],
        }),
        ..render_state(31)
    };
    let renderer = draw(&GeometryList::default(), &state);

    // Image row 0 is the top of the frame
    assert_close(color_at(&renderer, 0, 191), [1.0, 0.0, 0.0, 1.0]);
    assert_close(color_at(&renderer, 0, 0), [0.0, 0.0, 1.0, 1.0]);
    assert_close(color_at(&renderer, 1, 191), [0.0, 0.0, 1.0, 1.0]);
}

#[test]
fn test_wireframe_draws_outline_only() {
    let geometry = Scene::default()
        .quad(CENTER, 0.0, GREEN, attrs(9, 0))
        .build();
    let renderer = draw(&geometry, &render_state(31));

    assert_close(color_at(&renderer, 128, 48), [0.0, 1.0, 0.0, 1.0]);
    assert_close(color_at(&renderer, 64, 96), [0.0, 1.0, 0.0, 1.0]);
    assert_close(color_at(&renderer, 128, 96), [0.0, 0.0, 0.0, 1.0]);
}

#[test]
fn test_commands_outside_frame_fail() {
    let mut rasterizer = SoftRasterizer::new();
    rasterizer.resize(&FramebufferDesc::default()).unwrap();
    let result = rasterizer.execute(&GxCommand::Clear(ClearSource::Values));
    assert!(matches!(result, Err(GxError::Device(_))));
    assert!(!rasterizer.read_pixels(&mut Vec::new()).unwrap());
}
