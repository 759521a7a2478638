use crate::shaders::ProgramRole;
use crate::terrain_pass::TerrainTextures;

/// Inset showing the generated height and color maps from above.
pub struct PreviewPass {
    pipeline: wgpu::RenderPipeline,
}

impl PreviewPass {
    pub fn new(device: &wgpu::Device, format: wgpu::TextureFormat) -> Self {
        let texture_entry = |binding| wgpu::BindGroupLayoutEntry {
            binding,
            visibility: wgpu::ShaderStages::FRAGMENT,
            ty: wgpu::BindingType::Texture {
                sample_type: wgpu::TextureSampleType::Float { filterable: false },
                view_dimension: wgpu::TextureViewDimension::D2,
                multisampled: false,
            },
            count: None,
        };
        let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Preview: Bind Group Layout"),
            entries: &[texture_entry(0), texture_entry(1)],
        });
        let layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Preview Pipeline Layout"),
            bind_group_layouts: &[&bind_group_layout],
            push_constant_ranges: &[],
        });
        let shader = ProgramRole::TerrainTexture.create_module(device);
        let pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("Preview Pipeline"),
            layout: Some(&layout),
            vertex: wgpu::VertexState {
                module: &shader,
                entry_point: Some("vs_preview"),
                compilation_options: Default::default(),
                buffers: &[],
            },
            fragment: Some(wgpu::FragmentState {
                module: &shader,
                entry_point: Some("fs_preview"),
                compilation_options: Default::default(),
                targets: &[Some(format.into())],
            }),
            primitive: wgpu::PrimitiveState::default(),
            depth_stencil: None,
            multisample: wgpu::MultisampleState::default(),
            multiview: None,
            cache: None,
        });

        Self { pipeline }
    }
}

pub struct PreviewBindings {
    bind_group: wgpu::BindGroup,
}

impl PreviewBindings {
    pub fn new(device: &wgpu::Device, PreviewPass { pipeline }: &PreviewPass, textures: &TerrainTextures) -> Self {
        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Preview: Bind Group"),
            layout: &pipeline.get_bind_group_layout(0),
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::TextureView(&textures.heights),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::TextureView(&textures.colors),
                },
            ],
        });
        Self { bind_group }
    }
}

/// Square inset in the top-right corner, a quarter of the shorter side.
pub fn inset_viewport(width: u32, height: u32) -> (f32, f32, f32) {
    let short = width.min(height).max(1) as f32;
    let side = (short / 4.0).floor().max(1.0);
    let margin = ((short - side) / 2.0).min(8.0);
    (width as f32 - side - margin, margin, side)
}

impl<'a> PreviewPass {
    pub fn record<'pass>(
        &'a self,
        rpass: &mut wgpu::RenderPass<'pass>,
        bindings: &'a PreviewBindings,
        width: u32,
        height: u32,
    ) where
        'a: 'pass,
    {
        let (x, y, side) = inset_viewport(width, height);
        rpass.set_viewport(x, y, side, side, 0.0, 1.0);
        rpass.set_pipeline(&self.pipeline);
        rpass.set_bind_group(0, &bindings.bind_group, &[]);
        rpass.draw(0..6, 0..1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_inset_stays_on_screen() {
        for (w, h) in [(800, 600), (1920, 1080), (3, 3), (1, 1)] {
            let (x, y, side) = inset_viewport(w, h);
            assert!(side >= 1.0);
            assert!(x + side <= w as f32);
            assert!(y + side <= h as f32);
        }
    }
}
