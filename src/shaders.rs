/// The four programs of the renderer, by what they do in a frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ProgramRole {
    TerrainDraw,
    VolumetricComposite,
    DensityCompute,
    TerrainTexture,
}

impl ProgramRole {
    pub const ALL: [ProgramRole; 4] = [
        ProgramRole::TerrainDraw,
        ProgramRole::VolumetricComposite,
        ProgramRole::DensityCompute,
        ProgramRole::TerrainTexture,
    ];

    pub fn label(self) -> &'static str {
        match self {
            ProgramRole::TerrainDraw => "Terrain Draw Shader",
            ProgramRole::VolumetricComposite => "Volumetric Composite Shader",
            ProgramRole::DensityCompute => "Density Compute Shader",
            ProgramRole::TerrainTexture => "Terrain Texture Shader",
        }
    }

    pub fn source(self) -> &'static str {
        match self {
            ProgramRole::TerrainDraw => include_str!("terrain.wgsl"),
            ProgramRole::VolumetricComposite => include_str!("volumetric.wgsl"),
            ProgramRole::DensityCompute => include_str!("density.wgsl"),
            ProgramRole::TerrainTexture => include_str!("terrain_preview.wgsl"),
        }
    }

    /// Entry points the passes look up, vertex/fragment or compute.
    pub fn entry_points(self) -> &'static [&'static str] {
        match self {
            ProgramRole::TerrainDraw => &["vs_terrain", "fs_terrain"],
            ProgramRole::VolumetricComposite => &["vs_fullscreen", "fs_volumetric"],
            ProgramRole::DensityCompute => &["cs_density"],
            ProgramRole::TerrainTexture => &["vs_preview", "fs_preview"],
        }
    }

    pub fn create_module(self, device: &wgpu::Device) -> wgpu::ShaderModule {
        device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some(self.label()),
            source: wgpu::ShaderSource::Wgsl(self.source().into()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sources_define_their_entry_points() {
        for role in ProgramRole::ALL {
            let source = role.source();
            for entry in role.entry_points() {
                assert!(source.contains(&format!("fn {}(", entry)), "{:?} lacks {}", role, entry);
            }
        }
    }

    #[test]
    fn test_uniform_blocks_match_host_layouts() {
        let source = ProgramRole::VolumetricComposite.source();
        let start = source.find("struct VolumetricUniforms {").unwrap();
        let end = start + source[start..].find('}').unwrap();
        let block = &source[start..end];
        let vec4_fields = block.matches(": vec4<f32>,").count() + block.matches(": vec4<u32>,").count();
        assert!(block.contains("view_inverse: mat4x4<f32>,"));
        let host_vec4s = (std::mem::size_of::<crate::uniforms::VolumetricUniforms>() - 64) / 16;
        assert_eq!(vec4_fields, host_vec4s);

        let source = ProgramRole::TerrainDraw.source();
        let start = source.find("struct TerrainUniforms {").unwrap();
        let end = start + source[start..].find('}').unwrap();
        let block = &source[start..end];
        let matrices = block.matches(": mat4x4<f32>,").count();
        let vec4_fields = block.matches(": vec4<f32>,").count();
        let host_bytes = std::mem::size_of::<crate::uniforms::TerrainUniforms>();
        assert_eq!(matrices * 64 + vec4_fields * 16, host_bytes);
        let light = block.find("light_dir:").unwrap();
        assert_eq!(block[..light].matches(": vec4<f32>,").count() * 16 + matrices * 64, 160);
        assert_eq!(crate::uniforms::TerrainUniforms::LIGHT_OFFSET, 160);

        let density = ProgramRole::DensityCompute.source();
        assert!(density.contains("const MAX_NUM_POINTS: u32 = 32768u;"));
        assert_eq!(crate::worley::MAX_NUM_POINTS, 32768);
    }
}
