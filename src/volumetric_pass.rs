use crate::shaders::ProgramRole;
use crate::terrain_pass::CaptureTarget;

const UNIFORM_GROUP_ID: u32 = 0;

const CAPTURE_GROUP_ID: u32 = 1;
const CAPTURE_COLOR_IDX: u32 = 0;
const CAPTURE_DEPTH_IDX: u32 = 1;

const SCENE_GROUP_ID: u32 = 2;
const SHAPE_VOLUME_IDX: u32 = 0;
const DETAIL_VOLUME_IDX: u32 = 1;
const VOLUME_SAMPLER_IDX: u32 = 2;
const SUN_GRADIENT_IDX: u32 = 3;
const NIGHT_SKY_IDX: u32 = 4;
const SKY_SAMPLER_IDX: u32 = 5;

/// Sampled inputs of the composite that do not follow the surface size.
pub struct SceneTextures<'a> {
    pub shape_volume: &'a wgpu::TextureView,
    pub detail_volume: &'a wgpu::TextureView,
    pub sun_gradient: &'a wgpu::TextureView,
    pub night_sky: &'a wgpu::TextureView,
}

pub struct VolumetricPass {
    pipeline: wgpu::RenderPipeline,
    volume_sampler: wgpu::Sampler,
    sky_sampler: wgpu::Sampler,
}

impl VolumetricPass {
    /// `float_filterable` is whether RGBA32F volumes may be sampled linearly
    /// on this device.
    pub fn new(device: &wgpu::Device, format: wgpu::TextureFormat, float_filterable: bool) -> Self {
        let fragment = wgpu::ShaderStages::FRAGMENT;
        let uniform_bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Volumetric: Uniform Bind Group Layout"),
            entries: &[wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: fragment,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: false,
                    min_binding_size: None,
                },
                count: None,
            }],
        });
        let capture_bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Volumetric: Capture Bind Group Layout"),
            entries: &[
                wgpu::BindGroupLayoutEntry {
                    binding: CAPTURE_COLOR_IDX,
                    visibility: fragment,
                    ty: wgpu::BindingType::Texture {
                        sample_type: wgpu::TextureSampleType::Float { filterable: false },
                        view_dimension: wgpu::TextureViewDimension::D2,
                        multisampled: false,
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: CAPTURE_DEPTH_IDX,
                    visibility: fragment,
                    ty: wgpu::BindingType::Texture {
                        sample_type: wgpu::TextureSampleType::Depth,
                        view_dimension: wgpu::TextureViewDimension::D2,
                        multisampled: false,
                    },
                    count: None,
                },
            ],
        });
        let volume_entry = |binding| wgpu::BindGroupLayoutEntry {
            binding,
            visibility: fragment,
            ty: wgpu::BindingType::Texture {
                sample_type: wgpu::TextureSampleType::Float { filterable: float_filterable },
                view_dimension: wgpu::TextureViewDimension::D3,
                multisampled: false,
            },
            count: None,
        };
        let volume_sampler_type = if float_filterable {
            wgpu::SamplerBindingType::Filtering
        } else {
            wgpu::SamplerBindingType::NonFiltering
        };
        let scene_bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Volumetric: Scene Bind Group Layout"),
            entries: &[
                volume_entry(SHAPE_VOLUME_IDX),
                volume_entry(DETAIL_VOLUME_IDX),
                wgpu::BindGroupLayoutEntry {
                    binding: VOLUME_SAMPLER_IDX,
                    visibility: fragment,
                    ty: wgpu::BindingType::Sampler(volume_sampler_type),
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: SUN_GRADIENT_IDX,
                    visibility: fragment,
                    ty: wgpu::BindingType::Texture {
                        sample_type: wgpu::TextureSampleType::Float { filterable: true },
                        view_dimension: wgpu::TextureViewDimension::D1,
                        multisampled: false,
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: NIGHT_SKY_IDX,
                    visibility: fragment,
                    ty: wgpu::BindingType::Texture {
                        sample_type: wgpu::TextureSampleType::Float { filterable: true },
                        view_dimension: wgpu::TextureViewDimension::D2,
                        multisampled: false,
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: SKY_SAMPLER_IDX,
                    visibility: fragment,
                    ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                    count: None,
                },
            ],
        });
        let layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Volumetric Pipeline Layout"),
            bind_group_layouts: &[
                &uniform_bind_group_layout,
                &capture_bind_group_layout,
                &scene_bind_group_layout,
            ],
            push_constant_ranges: &[],
        });
        let shader = ProgramRole::VolumetricComposite.create_module(device);
        let pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("Volumetric Pipeline"),
            layout: Some(&layout),
            vertex: wgpu::VertexState {
                module: &shader,
                entry_point: Some("vs_fullscreen"),
                compilation_options: Default::default(),
                buffers: &[],
            },
            fragment: Some(wgpu::FragmentState {
                module: &shader,
                entry_point: Some("fs_volumetric"),
                compilation_options: Default::default(),
                targets: &[Some(format.into())],
            }),
            primitive: wgpu::PrimitiveState {
                topology: Default::default(),
                strip_index_format: None,
                front_face: Default::default(),
                cull_mode: None,
                unclipped_depth: false,
                polygon_mode: Default::default(),
                conservative: false,
            },
            depth_stencil: None,
            multisample: wgpu::MultisampleState::default(),
            multiview: None,
            cache: None,
        });

        let volume_filter = if float_filterable {
            wgpu::FilterMode::Linear
        } else {
            wgpu::FilterMode::Nearest
        };
        let volume_sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("Volume Sampler"),
            address_mode_u: wgpu::AddressMode::Repeat,
            address_mode_v: wgpu::AddressMode::Repeat,
            address_mode_w: wgpu::AddressMode::Repeat,
            mag_filter: volume_filter,
            min_filter: volume_filter,
            ..Default::default()
        });
        let sky_sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("Sky Sampler"),
            address_mode_u: wgpu::AddressMode::Repeat,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            ..Default::default()
        });

        Self {
            pipeline,
            volume_sampler,
            sky_sampler,
        }
    }
}

pub struct VolumetricBindings {
    uniform: wgpu::BindGroup,
    capture: wgpu::BindGroup,
    scene: wgpu::BindGroup,
}

impl VolumetricBindings {
    pub fn new(
        device: &wgpu::Device,
        pass: &VolumetricPass,
        uniform: &wgpu::Buffer,
        capture: &CaptureTarget,
        textures: &SceneTextures,
    ) -> Self {
        let uniform = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Volumetric: Uniform Bind Group"),
            layout: &pass.pipeline.get_bind_group_layout(UNIFORM_GROUP_ID),
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: uniform.as_entire_binding(),
            }],
        });
        Self {
            uniform,
            capture: Self::capture_group(device, pass, capture),
            scene: Self::scene_group(device, pass, textures),
        }
    }

    fn capture_group(device: &wgpu::Device, pass: &VolumetricPass, capture: &CaptureTarget) -> wgpu::BindGroup {
        device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Volumetric: Capture Bind Group"),
            layout: &pass.pipeline.get_bind_group_layout(CAPTURE_GROUP_ID),
            entries: &[
                wgpu::BindGroupEntry {
                    binding: CAPTURE_COLOR_IDX,
                    resource: wgpu::BindingResource::TextureView(&capture.color),
                },
                wgpu::BindGroupEntry {
                    binding: CAPTURE_DEPTH_IDX,
                    resource: wgpu::BindingResource::TextureView(&capture.depth),
                },
            ],
        })
    }

    fn scene_group(device: &wgpu::Device, pass: &VolumetricPass, textures: &SceneTextures) -> wgpu::BindGroup {
        device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Volumetric: Scene Bind Group"),
            layout: &pass.pipeline.get_bind_group_layout(SCENE_GROUP_ID),
            entries: &[
                wgpu::BindGroupEntry {
                    binding: SHAPE_VOLUME_IDX,
                    resource: wgpu::BindingResource::TextureView(textures.shape_volume),
                },
                wgpu::BindGroupEntry {
                    binding: DETAIL_VOLUME_IDX,
                    resource: wgpu::BindingResource::TextureView(textures.detail_volume),
                },
                wgpu::BindGroupEntry {
                    binding: VOLUME_SAMPLER_IDX,
                    resource: wgpu::BindingResource::Sampler(&pass.volume_sampler),
                },
                wgpu::BindGroupEntry {
                    binding: SUN_GRADIENT_IDX,
                    resource: wgpu::BindingResource::TextureView(textures.sun_gradient),
                },
                wgpu::BindGroupEntry {
                    binding: NIGHT_SKY_IDX,
                    resource: wgpu::BindingResource::TextureView(textures.night_sky),
                },
                wgpu::BindGroupEntry {
                    binding: SKY_SAMPLER_IDX,
                    resource: wgpu::BindingResource::Sampler(&pass.sky_sampler),
                },
            ],
        })
    }

    pub fn update_capture_target(&mut self, device: &wgpu::Device, pass: &VolumetricPass, capture: &CaptureTarget) {
        self.capture = Self::capture_group(device, pass, capture);
    }

    /// Needed when a volume texture was reallocated at a new resolution.
    pub fn update_scene_textures(&mut self, device: &wgpu::Device, pass: &VolumetricPass, textures: &SceneTextures) {
        self.scene = Self::scene_group(device, pass, textures);
    }
}

impl<'a> VolumetricPass {
    pub fn record<'pass>(&'a self, rpass: &mut wgpu::RenderPass<'pass>, bindings: &'a VolumetricBindings)
    where
        'a: 'pass,
    {
        rpass.set_pipeline(&self.pipeline);
        rpass.set_bind_group(UNIFORM_GROUP_ID, &bindings.uniform, &[]);
        rpass.set_bind_group(CAPTURE_GROUP_ID, &bindings.capture, &[]);
        rpass.set_bind_group(SCENE_GROUP_ID, &bindings.scene, &[]);
        rpass.draw(0..6, 0..1);
    }
}
