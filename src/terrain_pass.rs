use wgpu::util::DeviceExt;

use crate::shaders::ProgramRole;
use crate::terrain::TerrainMesh;

pub const CAPTURE_COLOR_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8Unorm;
pub const CAPTURE_DEPTH_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Depth32Float;

const UNIFORM_IDX: u32 = 0;
const HEIGHTS_IDX: u32 = 1;
const NORMALS_IDX: u32 = 2;
const COLORS_IDX: u32 = 3;

fn lattice_texture_entry(binding: u32, visibility: wgpu::ShaderStages) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility,
        ty: wgpu::BindingType::Texture {
            sample_type: wgpu::TextureSampleType::Float { filterable: false },
            view_dimension: wgpu::TextureViewDimension::D2,
            multisampled: false,
        },
        count: None,
    }
}

/// Per-lattice-vertex data of the current terrain, read with `textureLoad`.
pub struct TerrainTextures {
    pub heights: wgpu::TextureView,
    pub normals: wgpu::TextureView,
    pub colors: wgpu::TextureView,
    pub vertex_buffer: wgpu::Buffer,
    pub vertex_count: u32,
}

impl TerrainTextures {
    pub fn new(device: &wgpu::Device, queue: &wgpu::Queue, mesh: &TerrainMesh) -> Self {
        let n = mesh.lattice_size() as u32;
        let pad = |rgb: &[f32; 3]| [rgb[0], rgb[1], rgb[2], 0.0f32];
        let normals: Vec<[f32; 4]> = mesh.normals().iter().map(pad).collect();
        let colors: Vec<[f32; 4]> = mesh.colors().iter().map(pad).collect();

        let heights = Self::upload(device, queue, "Terrain Heights", wgpu::TextureFormat::R32Float, n, bytemuck::cast_slice(mesh.heights().as_slice()), 4);
        let normals = Self::upload(device, queue, "Terrain Normals", wgpu::TextureFormat::Rgba32Float, n, bytemuck::cast_slice(&normals), 16);
        let colors = Self::upload(device, queue, "Terrain Colors", wgpu::TextureFormat::Rgba32Float, n, bytemuck::cast_slice(&colors), 16);

        let vertex_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Terrain Vertex Buffer"),
            contents: bytemuck::cast_slice(mesh.positions()),
            usage: wgpu::BufferUsages::VERTEX,
        });

        Self {
            heights,
            normals,
            colors,
            vertex_buffer,
            vertex_count: mesh.vertex_count(),
        }
    }

    /// Stand-in until the first mesh is uploaded.
    pub fn placeholder(device: &wgpu::Device, queue: &wgpu::Queue) -> Self {
        let heights = Self::upload(device, queue, "Terrain Heights", wgpu::TextureFormat::R32Float, 1, &[0; 4], 4);
        let normals = Self::upload(device, queue, "Terrain Normals", wgpu::TextureFormat::Rgba32Float, 1, &[0; 16], 16);
        let colors = Self::upload(device, queue, "Terrain Colors", wgpu::TextureFormat::Rgba32Float, 1, &[0; 16], 16);
        let vertex_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Terrain Vertex Buffer"),
            size: 8,
            usage: wgpu::BufferUsages::VERTEX,
            mapped_at_creation: false,
        });
        Self {
            heights,
            normals,
            colors,
            vertex_buffer,
            vertex_count: 0,
        }
    }

    fn upload(
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        label: &str,
        format: wgpu::TextureFormat,
        size: u32,
        bytes: &[u8],
        texel_size: u32,
    ) -> wgpu::TextureView {
        let extent = wgpu::Extent3d {
            width: size,
            height: size,
            depth_or_array_layers: 1,
        };
        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some(label),
            size: extent,
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format,
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
            bytes,
            wgpu::ImageDataLayout {
                offset: 0,
                bytes_per_row: Some(size * texel_size),
                rows_per_image: Some(size),
            },
            extent,
        );
        texture.create_view(&wgpu::TextureViewDescriptor::default())
    }
}

pub struct TerrainPass {
    pipeline: wgpu::RenderPipeline,
}

impl TerrainPass {
    pub fn new(device: &wgpu::Device) -> Self {
        let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Terrain: Bind Group Layout"),
            entries: &[
                wgpu::BindGroupLayoutEntry {
                    binding: UNIFORM_IDX,
                    visibility: wgpu::ShaderStages::VERTEX_FRAGMENT,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                },
                lattice_texture_entry(HEIGHTS_IDX, wgpu::ShaderStages::VERTEX),
                lattice_texture_entry(NORMALS_IDX, wgpu::ShaderStages::VERTEX),
                lattice_texture_entry(COLORS_IDX, wgpu::ShaderStages::VERTEX),
            ],
        });
        let layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Terrain Pipeline Layout"),
            bind_group_layouts: &[&bind_group_layout],
            push_constant_ranges: &[],
        });
        let shader = ProgramRole::TerrainDraw.create_module(device);
        let pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("Terrain Pipeline"),
            layout: Some(&layout),
            vertex: wgpu::VertexState {
                module: &shader,
                entry_point: Some("vs_terrain"),
                compilation_options: Default::default(),
                buffers: &[wgpu::VertexBufferLayout {
                    array_stride: std::mem::size_of::<[f32; 2]>() as wgpu::BufferAddress,
                    step_mode: wgpu::VertexStepMode::Vertex,
                    attributes: &wgpu::vertex_attr_array![0 => Float32x2],
                }],
            },
            fragment: Some(wgpu::FragmentState {
                module: &shader,
                entry_point: Some("fs_terrain"),
                compilation_options: Default::default(),
                targets: &[Some(CAPTURE_COLOR_FORMAT.into())],
            }),
            primitive: wgpu::PrimitiveState {
                topology: wgpu::PrimitiveTopology::TriangleList,
                strip_index_format: None,
                front_face: Default::default(),
                cull_mode: None,
                unclipped_depth: false,
                polygon_mode: Default::default(),
                conservative: false,
            },
            depth_stencil: Some(wgpu::DepthStencilState {
                format: CAPTURE_DEPTH_FORMAT,
                depth_write_enabled: true,
                depth_compare: wgpu::CompareFunction::Less,
                stencil: wgpu::StencilState::default(),
                bias: wgpu::DepthBiasState::default(),
            }),
            multisample: wgpu::MultisampleState::default(),
            multiview: None,
            cache: None,
        });

        Self { pipeline }
    }
}

pub struct TerrainBindings {
    bind_group: wgpu::BindGroup,
}

impl TerrainBindings {
    pub fn new(
        device: &wgpu::Device,
        TerrainPass { pipeline }: &TerrainPass,
        uniform: &wgpu::Buffer,
        textures: &TerrainTextures,
    ) -> Self {
        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Terrain: Bind Group"),
            layout: &pipeline.get_bind_group_layout(0),
            entries: &[
                wgpu::BindGroupEntry {
                    binding: UNIFORM_IDX,
                    resource: uniform.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: HEIGHTS_IDX,
                    resource: wgpu::BindingResource::TextureView(&textures.heights),
                },
                wgpu::BindGroupEntry {
                    binding: NORMALS_IDX,
                    resource: wgpu::BindingResource::TextureView(&textures.normals),
                },
                wgpu::BindGroupEntry {
                    binding: COLORS_IDX,
                    resource: wgpu::BindingResource::TextureView(&textures.colors),
                },
            ],
        });
        Self { bind_group }
    }
}

impl<'a> TerrainPass {
    pub fn record<'pass>(
        &'a self,
        rpass: &mut wgpu::RenderPass<'pass>,
        bindings: &'a TerrainBindings,
        textures: &'a TerrainTextures,
        vertex_count: u32,
    ) where
        'a: 'pass,
    {
        // never draw past what was uploaded
        let count = vertex_count.min(textures.vertex_count);
        if count == 0 {
            return;
        }
        rpass.set_pipeline(&self.pipeline);
        rpass.set_bind_group(0, &bindings.bind_group, &[]);
        rpass.set_vertex_buffer(0, textures.vertex_buffer.slice(..));
        rpass.draw(0..count, 0..1);
    }
}

/// Off-screen color and depth the terrain pass renders into and the
/// volumetric pass reads back. Sized like the surface.
pub struct CaptureTarget {
    pub color: wgpu::TextureView,
    pub depth: wgpu::TextureView,
    pub width: u32,
    pub height: u32,
}

impl CaptureTarget {
    pub fn new(device: &wgpu::Device, width: u32, height: u32) -> Self {
        let size = wgpu::Extent3d {
            width: width.max(1),
            height: height.max(1),
            depth_or_array_layers: 1,
        };
        let create = |label: &str, format: wgpu::TextureFormat| {
            device
                .create_texture(&wgpu::TextureDescriptor {
                    label: Some(label),
                    size,
                    mip_level_count: 1,
                    sample_count: 1,
                    dimension: wgpu::TextureDimension::D2,
                    format,
                    usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::TEXTURE_BINDING,
                    view_formats: &[],
                })
                .create_view(&wgpu::TextureViewDescriptor::default())
        };
        Self {
            color: create("Capture Color", CAPTURE_COLOR_FORMAT),
            depth: create("Capture Depth", CAPTURE_DEPTH_FORMAT),
            width: size.width,
            height: size.height,
        }
    }
}
