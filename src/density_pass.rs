use crate::shaders::ProgramRole;

const UNIFORM_IDX: u32 = 0;
const POINTS_IDX: u32 = 1;
const VOLUME_IDX: u32 = 2;

/// Workgroup edge of `cs_density`.
pub const WORKGROUP_SIZE: u32 = 4;

/// Bytes of one RGBA32F texel.
pub const TEXEL_BYTES: u64 = 16;

pub struct DensityPass {
    pipeline: wgpu::ComputePipeline,
}

impl DensityPass {
    pub fn new(device: &wgpu::Device) -> Self {
        let storage = |binding, read_only| wgpu::BindGroupLayoutEntry {
            binding,
            visibility: wgpu::ShaderStages::COMPUTE,
            ty: wgpu::BindingType::Buffer {
                ty: wgpu::BufferBindingType::Storage { read_only },
                has_dynamic_offset: false,
                min_binding_size: None,
            },
            count: None,
        };
        let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Density: Bind Group Layout"),
            entries: &[
                wgpu::BindGroupLayoutEntry {
                    binding: UNIFORM_IDX,
                    visibility: wgpu::ShaderStages::COMPUTE,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                },
                storage(POINTS_IDX, true),
                storage(VOLUME_IDX, false),
            ],
        });
        let layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Density Pipeline Layout"),
            bind_group_layouts: &[&bind_group_layout],
            push_constant_ranges: &[],
        });
        let shader = ProgramRole::DensityCompute.create_module(device);
        let pipeline = device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
            label: Some("Density Pipeline"),
            layout: Some(&layout),
            module: &shader,
            entry_point: Some("cs_density"),
            compilation_options: Default::default(),
            cache: None,
        });
        Self { pipeline }
    }
}

/// One density volume: the storage buffer the compute stage writes and the
/// sampled texture it is published to.
pub struct DensityVolume {
    pub resolution: u32,
    pub working: wgpu::Buffer,
    pub texture: wgpu::Texture,
    pub view: wgpu::TextureView,
    bind_group: wgpu::BindGroup,
}

impl DensityVolume {
    pub fn byte_size(resolution: u32) -> u64 {
        (resolution as u64).pow(3) * TEXEL_BYTES
    }

    pub fn new(
        device: &wgpu::Device,
        DensityPass { pipeline }: &DensityPass,
        label: &str,
        resolution: u32,
        uniform: &wgpu::Buffer,
        points: &wgpu::Buffer,
    ) -> Self {
        let working = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some(label),
            size: Self::byte_size(resolution),
            usage: wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_SRC,
            mapped_at_creation: false,
        });
        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some(label),
            size: Self::extent(resolution),
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D3,
            format: wgpu::TextureFormat::Rgba32Float,
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Density: Bind Group"),
            layout: &pipeline.get_bind_group_layout(0),
            entries: &[
                wgpu::BindGroupEntry {
                    binding: UNIFORM_IDX,
                    resource: uniform.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: POINTS_IDX,
                    resource: points.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: VOLUME_IDX,
                    resource: working.as_entire_binding(),
                },
            ],
        });
        Self {
            resolution,
            working,
            texture,
            view,
            bind_group,
        }
    }

    fn extent(resolution: u32) -> wgpu::Extent3d {
        wgpu::Extent3d {
            width: resolution,
            height: resolution,
            depth_or_array_layers: resolution,
        }
    }

    /// Copies the working buffer into the sampled texture. Everything the
    /// composite reads afterwards sees the finished dispatch.
    pub fn encode_publish(&self, encoder: &mut wgpu::CommandEncoder) {
        encoder.copy_buffer_to_texture(
            wgpu::ImageCopyBuffer {
                buffer: &self.working,
                layout: wgpu::ImageDataLayout {
                    offset: 0,
                    bytes_per_row: Some(self.resolution * TEXEL_BYTES as u32),
                    rows_per_image: Some(self.resolution),
                },
            },
            wgpu::ImageCopyTexture {
                texture: &self.texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            Self::extent(self.resolution),
        );
    }
}

impl<'a> DensityPass {
    pub fn record<'pass>(&'a self, cpass: &mut wgpu::ComputePass<'pass>, volume: &'a DensityVolume)
    where
        'a: 'pass,
    {
        let groups = volume.resolution.div_ceil(WORKGROUP_SIZE);
        cpass.set_pipeline(&self.pipeline);
        cpass.set_bind_group(0, &volume.bind_group, &[]);
        cpass.dispatch_workgroups(groups, groups, groups);
    }
}
