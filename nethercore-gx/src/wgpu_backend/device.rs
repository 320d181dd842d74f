//! Headless device creation and capability probing

use smallvec::SmallVec;

use crate::capabilities::DeviceCapabilities;
use crate::error::{GxError, GxResult};

use super::attachments::{COLOR_FORMAT, DEPTH_STENCIL_FORMAT};

/// Multisample counts probed on the attachment formats.
const MULTISAMPLE_COUNTS: [u32; 4] = [2, 4, 8, 16];

/// Device, queue and the limits the renderer cares about.
pub struct GpuContext {
    pub device: wgpu::Device,
    pub queue: wgpu::Queue,
    pub adapter_name: String,
    pub capabilities: DeviceCapabilities,
    pub max_texture_dimension: u32,
    /// Sample counts every attachment format supports, ascending
    pub sample_counts: SmallVec<[u32; 4]>,
}

impl GpuContext {
    /// Create a device without a surface.
    pub fn new_headless() -> GxResult<Self> {
        pollster::block_on(Self::request())
    }

    async fn request() -> GxResult<Self> {
        // Create wgpu instance
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        });

        // Request adapter
        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: None,
                force_fallback_adapter: false,
            })
            .await
            .map_err(|e| GxError::Device(format!("no suitable GPU adapter: {}", e)))?;

        let adapter_name = adapter.get_info().name;
        tracing::info!("Using GPU adapter: {:?}", adapter_name);

        let limits = adapter.limits();
        let sample_counts = supported_sample_counts(&adapter);
        let capabilities = DeviceCapabilities {
            max_color_attachments: limits.max_color_attachments,
            max_draw_buffers: limits.max_color_attachments,
            max_texture_units: limits.max_sampled_textures_per_shader_stage,
            max_samples: sample_counts.last().copied().unwrap_or(1),
            offscreen_targets: true,
        };

        // Request device and queue
        let (device, queue) = adapter
            .request_device(&wgpu::DeviceDescriptor {
                label: Some("Nethercore GX Device"),
                required_features: wgpu::Features::empty(),
                required_limits: limits.clone(),
                memory_hints: wgpu::MemoryHints::Performance,
                ..Default::default()
            })
            .await
            .map_err(|e| GxError::Device(format!("failed to create GPU device: {}", e)))?;

        Ok(Self {
            device,
            queue,
            adapter_name,
            capabilities,
            max_texture_dimension: limits.max_texture_dimension_2d,
            sample_counts,
        })
    }

    /// Run `f` and turn any validation or out-of-memory error it raised into `Err`.
    pub fn scoped<T>(&self, f: impl FnOnce(&wgpu::Device) -> T) -> Result<T, String> {
        self.device.push_error_scope(wgpu::ErrorFilter::OutOfMemory);
        self.device.push_error_scope(wgpu::ErrorFilter::Validation);
        let value = f(&self.device);
        let validation = pollster::block_on(self.device.pop_error_scope());
        let out_of_memory = pollster::block_on(self.device.pop_error_scope());
        match validation.or(out_of_memory) {
            Some(error) => Err(error.to_string()),
            None => Ok(value),
        }
    }

    /// Compile a WGSL module, reporting compilation errors instead of panicking.
    pub fn compile(&self, label: &str, source: &str) -> GxResult<wgpu::ShaderModule> {
        self.scoped(|device| {
            device.create_shader_module(wgpu::ShaderModuleDescriptor {
                label: Some(label),
                source: wgpu::ShaderSource::Wgsl(source.into()),
            })
        })
        .map_err(|message| GxError::ShaderCompile {
            label: label.to_string(),
            message,
        })
    }
}

fn supported_sample_counts(adapter: &wgpu::Adapter) -> SmallVec<[u32; 4]> {
    let color = adapter.get_texture_format_features(COLOR_FORMAT).flags;
    let depth = adapter.get_texture_format_features(DEPTH_STENCIL_FORMAT).flags;
    MULTISAMPLE_COUNTS
        .into_iter()
        .filter(|&count| color.sample_count_supported(count) && depth.sample_count_supported(count))
        .collect()
}
