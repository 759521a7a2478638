use std::sync::{Arc, Mutex};

use winit::window::Window;

use crate::assets::SkyImages;
use crate::density_pass::{DensityPass, DensityVolume};
use crate::error::{CloudscapeError, Result};
use crate::pipeline::{drained_device_errors, FrameBackend};
use crate::point_buffer::{PointBufferSink, SharedPointBuffer};
use crate::preview_pass::{PreviewBindings, PreviewPass};
use crate::settings::{NoiseTier, Settings};
use crate::terrain::TerrainMesh;
use crate::terrain_pass::{CaptureTarget, TerrainBindings, TerrainPass, TerrainTextures};
use crate::uniforms::{DensityUniforms, TerrainLight, TerrainUniforms, TerrainView, VolumetricUniforms};
use crate::volume::{DensityDispatch, VolumeBackend};
use crate::volumetric_pass::{SceneTextures, VolumetricBindings, VolumetricPass};

struct FrameInFlight {
    surface_texture: wgpu::SurfaceTexture,
    view: wgpu::TextureView,
    encoder: wgpu::CommandEncoder,
}

/// Owns the device and every GPU resource of the scene.
pub struct RenderContext {
    surface: wgpu::Surface<'static>,
    device: wgpu::Device,
    queue: wgpu::Queue,
    config: wgpu::SurfaceConfiguration,
    device_errors: Arc<Mutex<Vec<String>>>,

    terrain_pass: TerrainPass,
    terrain_uniform: wgpu::Buffer,
    terrain_textures: TerrainTextures,
    terrain_bindings: TerrainBindings,
    preview_pass: PreviewPass,
    preview_bindings: PreviewBindings,
    show_preview: bool,

    capture: CaptureTarget,

    volumetric_pass: VolumetricPass,
    volumetric_uniform: wgpu::Buffer,
    volumetric_bindings: VolumetricBindings,
    sun_gradient: wgpu::TextureView,
    night_sky: wgpu::TextureView,

    density_pass: DensityPass,
    density_uniform: wgpu::Buffer,
    point_buffer: wgpu::Buffer,
    volumes: [DensityVolume; 2],

    frame: Option<FrameInFlight>,
}

impl RenderContext {
    pub async fn new(window: Arc<Window>, settings: &Settings, sky: &SkyImages) -> Result<Self> {
        let size = window.inner_size();
        let instance = wgpu::Instance::default();
        let surface = instance
            .create_surface(window)
            .map_err(|err| CloudscapeError::resource(format!("cannot create surface: {}", err)))?;
        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                force_fallback_adapter: false,
                compatible_surface: Some(&surface),
            })
            .await
            .ok_or_else(|| CloudscapeError::resource("no suitable adapter"))?;

        let float_filterable = adapter.features().contains(wgpu::Features::FLOAT32_FILTERABLE);
        let mut required_features = wgpu::Features::empty();
        if float_filterable {
            required_features |= wgpu::Features::FLOAT32_FILTERABLE;
        } else {
            log::warn!("adapter cannot filter RGBA32F, volumes are sampled nearest");
        }

        let adapter_limits = adapter.limits();
        let mut required_limits = wgpu::Limits::downlevel_defaults();
        required_limits.max_texture_dimension_2d = adapter_limits.max_texture_dimension_2d;
        required_limits.max_buffer_size = adapter_limits.max_buffer_size;
        required_limits.max_storage_buffer_binding_size = adapter_limits.max_storage_buffer_binding_size;

        let largest_volume = NoiseTier::ALL
            .into_iter()
            .map(|tier| DensityVolume::byte_size(settings.tier_generation(tier).resolution))
            .max()
            .unwrap_or(0);
        if largest_volume > required_limits.max_storage_buffer_binding_size as u64 {
            return Err(CloudscapeError::resource(format!(
                "a {} byte volume exceeds the storage binding limit of {}",
                largest_volume, required_limits.max_storage_buffer_binding_size
            )));
        }

        let (device, queue) = adapter
            .request_device(
                &wgpu::DeviceDescriptor {
                    label: None,
                    required_features,
                    required_limits,
                    memory_hints: wgpu::MemoryHints::MemoryUsage,
                },
                None,
            )
            .await
            .map_err(|err| CloudscapeError::resource(format!("cannot create device: {}", err)))?;

        let device_errors = Arc::new(Mutex::new(Vec::new()));
        let sink = device_errors.clone();
        device.on_uncaptured_error(Box::new(move |error| {
            if let Ok(mut errors) = sink.lock() {
                errors.push(error.to_string());
            }
        }));

        let swapchain_capabilities = surface.get_capabilities(&adapter);
        let swapchain_format = swapchain_capabilities
            .formats
            .first()
            .copied()
            .ok_or_else(|| CloudscapeError::resource("surface reports no formats"))?;
        let mut config = surface
            .get_default_config(&adapter, size.width.max(1), size.height.max(1))
            .ok_or_else(|| CloudscapeError::resource("surface is not supported by the adapter"))?;
        config.format = swapchain_format;
        surface.configure(&device, &config);
        log::info!(
            "device ready on {:?}, surface {:?} {}x{}",
            adapter.get_info().backend,
            swapchain_format,
            config.width,
            config.height
        );

        let terrain_pass = TerrainPass::new(&device);
        let terrain_uniform = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Terrain Uniform Buffer"),
            size: std::mem::size_of::<TerrainUniforms>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let terrain_textures = TerrainTextures::placeholder(&device, &queue);
        let terrain_bindings = TerrainBindings::new(&device, &terrain_pass, &terrain_uniform, &terrain_textures);
        let preview_pass = PreviewPass::new(&device, swapchain_format);
        let preview_bindings = PreviewBindings::new(&device, &preview_pass, &terrain_textures);

        let capture = CaptureTarget::new(&device, config.width, config.height);

        let density_pass = DensityPass::new(&device);
        let density_uniform = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Density Uniform Buffer"),
            size: std::mem::size_of::<DensityUniforms>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let point_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Worley Point Buffer"),
            size: SharedPointBuffer::CAPACITY_BYTES,
            usage: wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let volumes = NoiseTier::ALL.map(|tier| {
            DensityVolume::new(
                &device,
                &density_pass,
                tier.label(),
                settings.tier_generation(tier).resolution,
                &density_uniform,
                &point_buffer,
            )
        });

        let sun_gradient = create_sun_gradient(&device, &queue, &sky.sun_gradient);
        let night_sky = create_night_sky(&device, &queue, &sky.night_sky);

        let volumetric_pass = VolumetricPass::new(&device, swapchain_format, float_filterable);
        let volumetric_uniform = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Volumetric Uniform Buffer"),
            size: std::mem::size_of::<VolumetricUniforms>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let volumetric_bindings = VolumetricBindings::new(
            &device,
            &volumetric_pass,
            &volumetric_uniform,
            &capture,
            &SceneTextures {
                shape_volume: &volumes[NoiseTier::Shape.index()].view,
                detail_volume: &volumes[NoiseTier::Detail.index()].view,
                sun_gradient: &sun_gradient,
                night_sky: &night_sky,
            },
        );

        Ok(Self {
            surface,
            device,
            queue,
            config,
            device_errors,
            terrain_pass,
            terrain_uniform,
            terrain_textures,
            terrain_bindings,
            preview_pass,
            preview_bindings,
            show_preview: settings.show_terrain_preview,
            capture,
            volumetric_pass,
            volumetric_uniform,
            volumetric_bindings,
            sun_gradient,
            night_sky,
            density_pass,
            density_uniform,
            point_buffer,
            volumes,
            frame: None,
        })
    }

    pub fn surface_size(&self) -> (u32, u32) {
        (self.config.width, self.config.height)
    }

    /// Reconfigures the swapchain. The capture target follows through
    /// [`FrameBackend::recreate_capture_target`].
    pub fn resize_surface(&mut self, width: u32, height: u32) {
        self.config.width = width.max(1);
        self.config.height = height.max(1);
        self.surface.configure(&self.device, &self.config);
    }

    fn rebind_scene_textures(&mut self) {
        self.volumetric_bindings.update_scene_textures(
            &self.device,
            &self.volumetric_pass,
            &SceneTextures {
                shape_volume: &self.volumes[NoiseTier::Shape.index()].view,
                detail_volume: &self.volumes[NoiseTier::Detail.index()].view,
                sun_gradient: &self.sun_gradient,
                night_sky: &self.night_sky,
            },
        );
    }

    fn ensure_volume(&mut self, tier: NoiseTier, resolution: u32) {
        let index = tier.index();
        if self.volumes[index].resolution == resolution {
            return;
        }
        log::info!("reallocating {} volume at {}^3", tier.label(), resolution);
        self.volumes[index] = DensityVolume::new(
            &self.device,
            &self.density_pass,
            tier.label(),
            resolution,
            &self.density_uniform,
            &self.point_buffer,
        );
        self.rebind_scene_textures();
    }

    fn device_error(pass: &'static str, err: impl ToString) -> CloudscapeError {
        CloudscapeError::Device {
            pass,
            message: err.to_string(),
        }
    }
}

fn create_sun_gradient(device: &wgpu::Device, queue: &wgpu::Queue, texels: &[[u8; 4]]) -> wgpu::TextureView {
    let size = wgpu::Extent3d {
        width: texels.len().max(1) as u32,
        height: 1,
        depth_or_array_layers: 1,
    };
    let texture = device.create_texture(&wgpu::TextureDescriptor {
        label: Some("Sun Gradient"),
        size,
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D1,
        format: wgpu::TextureFormat::Rgba8Unorm,
        usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
        view_formats: &[],
    });
    if !texels.is_empty() {
        queue.write_texture(
            wgpu::ImageCopyTexture {
                texture: &texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            bytemuck::cast_slice(texels),
            wgpu::ImageDataLayout {
                offset: 0,
                bytes_per_row: Some(size.width * 4),
                rows_per_image: None,
            },
            size,
        );
    }
    texture.create_view(&wgpu::TextureViewDescriptor::default())
}

fn create_night_sky(device: &wgpu::Device, queue: &wgpu::Queue, image: &image::RgbaImage) -> wgpu::TextureView {
    let size = wgpu::Extent3d {
        width: image.width(),
        height: image.height(),
        depth_or_array_layers: 1,
    };
    let texture = device.create_texture(&wgpu::TextureDescriptor {
        label: Some("Night Sky"),
        size,
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format: wgpu::TextureFormat::Rgba8Unorm,
        usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
        view_formats: &[],
    });
    queue.write_texture(
        wgpu::ImageCopyTexture {
            texture: &texture,
            mip_level: 0,
            origin: wgpu::Origin3d::ZERO,
            aspect: wgpu::TextureAspect::All,
        },
        image.as_raw(),
        wgpu::ImageDataLayout {
            offset: 0,
            bytes_per_row: Some(size.width * 4),
            rows_per_image: Some(size.height),
        },
        size,
    );
    texture.create_view(&wgpu::TextureViewDescriptor::default())
}

impl PointBufferSink for RenderContext {
    fn write_points(&mut self, byte_offset: u64, bytes: &[u8]) -> Result<()> {
        let end = byte_offset + bytes.len() as u64;
        if end > SharedPointBuffer::CAPACITY_BYTES {
            return Err(CloudscapeError::CapacityExceeded {
                requested: end as usize,
                capacity: SharedPointBuffer::CAPACITY_BYTES as usize,
            });
        }
        self.queue.write_buffer(&self.point_buffer, byte_offset, bytes);
        Ok(())
    }
}

impl VolumeBackend for RenderContext {
    fn dispatch_density(&mut self, dispatch: &DensityDispatch) -> Result<()> {
        self.ensure_volume(dispatch.tier, dispatch.resolution);
        let [fine, medium, coarse] = dispatch.cells;
        let uniforms = DensityUniforms {
            persistence: dispatch.persistence,
            resolution: dispatch.resolution,
            cells_fine: fine,
            cells_medium: medium,
            cells_coarse: coarse,
            _pad: [0; 3],
            channel_mask: dispatch.channel_mask,
        };
        self.queue.write_buffer(&self.density_uniform, 0, bytemuck::bytes_of(&uniforms));

        let mut encoder = self.device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("Density Encoder"),
        });
        {
            let mut cpass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some("Density Pass"),
                timestamp_writes: None,
            });
            self.density_pass.record(&mut cpass, &self.volumes[dispatch.tier.index()]);
        }
        self.queue.submit(Some(encoder.finish()));

        let errors = self.take_device_errors();
        drained_device_errors("density dispatch", errors)
    }

    fn publish_volume(&mut self, tier: NoiseTier) -> Result<()> {
        let mut encoder = self.device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("Volume Publish Encoder"),
        });
        self.volumes[tier.index()].encode_publish(&mut encoder);
        self.queue.submit(Some(encoder.finish()));

        let errors = self.take_device_errors();
        drained_device_errors("volume publish", errors)
    }
}

impl FrameBackend for RenderContext {
    fn upload_terrain(&mut self, mesh: &TerrainMesh) -> Result<()> {
        self.terrain_textures = TerrainTextures::new(&self.device, &self.queue, mesh);
        self.terrain_bindings = TerrainBindings::new(
            &self.device,
            &self.terrain_pass,
            &self.terrain_uniform,
            &self.terrain_textures,
        );
        self.preview_bindings = PreviewBindings::new(&self.device, &self.preview_pass, &self.terrain_textures);

        let (x_scale, y_scale) = mesh.scales();
        let lattice = [mesh.lattice_size() as f32, x_scale as f32, y_scale as f32, 0.0];
        self.queue
            .write_buffer(&self.terrain_uniform, TerrainUniforms::LATTICE_OFFSET, bytemuck::bytes_of(&lattice));
        Ok(())
    }

    fn recreate_capture_target(&mut self, width: u32, height: u32) -> Result<()> {
        self.capture = CaptureTarget::new(&self.device, width, height);
        self.volumetric_bindings
            .update_capture_target(&self.device, &self.volumetric_pass, &self.capture);
        Ok(())
    }

    fn write_terrain_projection(&mut self, projection: &[[f32; 4]; 4]) {
        self.queue
            .write_buffer(&self.terrain_uniform, TerrainUniforms::PROJECTION_OFFSET, bytemuck::bytes_of(projection));
    }

    fn write_terrain_view(&mut self, view: &TerrainView) {
        self.queue
            .write_buffer(&self.terrain_uniform, TerrainUniforms::VIEW_OFFSET, bytemuck::bytes_of(view));
    }

    fn write_terrain_light(&mut self, light: &TerrainLight) {
        self.queue
            .write_buffer(&self.terrain_uniform, TerrainUniforms::LIGHT_OFFSET, bytemuck::bytes_of(light));
    }

    fn write_volumetric_uniforms(&mut self, uniforms: &VolumetricUniforms) {
        self.show_preview = uniforms.flags[3] != 0;
        self.queue
            .write_buffer(&self.volumetric_uniform, 0, bytemuck::bytes_of(uniforms));
    }

    fn begin_frame(&mut self) -> Result<()> {
        let surface_texture = match self.surface.get_current_texture() {
            Ok(texture) => texture,
            Err(err @ (wgpu::SurfaceError::Outdated | wgpu::SurfaceError::Lost)) => {
                self.surface.configure(&self.device, &self.config);
                return Err(Self::device_error("surface acquire", err));
            }
            Err(err) => return Err(Self::device_error("surface acquire", err)),
        };
        let view = surface_texture
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());
        let encoder = self.device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("Frame Encoder"),
        });
        self.frame = Some(FrameInFlight {
            surface_texture,
            view,
            encoder,
        });
        Ok(())
    }

    fn encode_terrain_pass(&mut self, vertex_count: u32) {
        let Some(frame) = self.frame.as_mut() else {
            return;
        };
        let mut rpass = frame.encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("Terrain Pass"),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view: &self.capture.color,
                resolve_target: None,
                ops: wgpu::Operations {
                    load: wgpu::LoadOp::Clear(wgpu::Color::TRANSPARENT),
                    store: wgpu::StoreOp::Store,
                },
            })],
            depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                view: &self.capture.depth,
                depth_ops: Some(wgpu::Operations {
                    load: wgpu::LoadOp::Clear(1.0),
                    store: wgpu::StoreOp::Store,
                }),
                stencil_ops: None,
            }),
            timestamp_writes: None,
            occlusion_query_set: None,
        });
        self.terrain_pass
            .record(&mut rpass, &self.terrain_bindings, &self.terrain_textures, vertex_count);
    }

    fn encode_volumetric_pass(&mut self) {
        let Some(frame) = self.frame.as_mut() else {
            return;
        };
        let mut rpass = frame.encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("Volumetric Pass"),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view: &frame.view,
                resolve_target: None,
                ops: wgpu::Operations {
                    load: wgpu::LoadOp::Clear(wgpu::Color::BLACK),
                    store: wgpu::StoreOp::Store,
                },
            })],
            depth_stencil_attachment: None,
            timestamp_writes: None,
            occlusion_query_set: None,
        });
        self.volumetric_pass.record(&mut rpass, &self.volumetric_bindings);
        if self.show_preview {
            self.preview_pass
                .record(&mut rpass, &self.preview_bindings, self.config.width, self.config.height);
        }
    }

    fn finish_frame(&mut self) -> Result<()> {
        let FrameInFlight {
            surface_texture,
            encoder,
            ..
        } = self
            .frame
            .take()
            .ok_or_else(|| CloudscapeError::PipelineOrder("no frame in flight".into()))?;
        self.queue.submit(Some(encoder.finish()));
        surface_texture.present();
        Ok(())
    }

    fn take_device_errors(&mut self) -> Vec<String> {
        self.device_errors
            .lock()
            .map(|mut errors| std::mem::take(&mut *errors))
            .unwrap_or_default()
    }
}
