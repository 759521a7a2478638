use bytemuck::{Pod, Zeroable};
use cgmath::{EuclideanSpace, Matrix4};

use crate::camera::Camera;
use crate::settings::{LightData, LightType, Settings};

pub fn matrix_to_array(matrix: &Matrix4<f32>) -> [[f32; 4]; 4] {
    (*matrix).into()
}

/// Terrain pass uniform. The projection, the view block, the lattice block
/// and the light block are written independently.
#[repr(C)]
#[derive(Default, Copy, Clone, Debug, PartialEq, Pod, Zeroable)]
pub struct TerrainUniforms {
    pub projection: [[f32; 4]; 4],
    pub view: TerrainView,
    /// x: lattice size N, y: x_scale, z: y_scale.
    pub lattice: [f32; 4],
    pub light: TerrainLight,
}

impl TerrainUniforms {
    pub const PROJECTION_OFFSET: u64 = 0;
    pub const VIEW_OFFSET: u64 = 64;
    pub const LATTICE_OFFSET: u64 = 144;
    pub const LIGHT_OFFSET: u64 = 160;
}

/// The sun as the terrain shades with it. Same packing as the light lanes
/// of [`VolumetricUniforms`].
#[repr(C)]
#[derive(Default, Copy, Clone, Debug, PartialEq, Pod, Zeroable)]
pub struct TerrainLight {
    /// w: light type, 0 directional, 1 point.
    pub dir: [f32; 4],
    pub color: [f32; 4],
    pub pos: [f32; 4],
}

impl TerrainLight {
    pub fn new(light: &LightData) -> Self {
        let [x, y, z] = light.dir;
        let [r, g, b] = light.color;
        Self {
            dir: [x, y, z, light_type_lane(light.light_type)],
            color: [r, g, b, 1.0],
            pos: light.pos,
        }
    }
}

fn light_type_lane(light_type: LightType) -> f32 {
    match light_type {
        LightType::Directional => 0.0,
        LightType::Point => 1.0,
    }
}

/// Camera pose plus viewport aspect. The projection is built square, the
/// terrain shader divides clip x by `viewport[0]`.
#[repr(C)]
#[derive(Default, Copy, Clone, Debug, PartialEq, Pod, Zeroable)]
pub struct TerrainView {
    pub view: [[f32; 4]; 4],
    /// x: width / height.
    pub viewport: [f32; 4],
}

impl TerrainView {
    pub fn new(camera: &Camera) -> Self {
        Self {
            view: matrix_to_array(&camera.view()),
            viewport: [camera.aspect_ratio(), 0.0, 0.0, 0.0],
        }
    }
}

/// Everything the volumetric composite reads besides textures. Scalars are
/// packed into vec4 lanes to keep the uniform layout free of padding rules.
#[repr(C)]
#[derive(Default, Copy, Clone, Debug, PartialEq, Pod, Zeroable)]
pub struct VolumetricUniforms {
    pub view_inverse: [[f32; 4]; 4],
    pub ray_origin: [f32; 4],
    pub volume_scaling: [f32; 4],
    pub volume_translate: [f32; 4],
    pub shape_scaling: [f32; 4],
    /// w: shape density offset.
    pub shape_translate: [f32; 4],
    pub shape_weights: [f32; 4],
    /// w: detail scaling.
    pub detail_translate: [f32; 4],
    pub detail_weights: [f32; 4],
    /// w: light type.
    pub light_dir: [f32; 4],
    pub light_color: [f32; 4],
    pub light_pos: [f32; 4],
    /// x: longitude, y: latitude, in degrees.
    pub light_angles: [f32; 4],
    pub phase_params: [f32; 4],
    /// x: density mult, y: light absorption, z: min transmittance, w: detail density weight.
    pub march: [f32; 4],
    /// x: x_max, y: y_max, z: near, w: far.
    pub frame: [f32; 4],
    /// x: step count, y: invert density, z: gamma correct, w: preview inset.
    pub flags: [u32; 4],
}

impl VolumetricUniforms {
    pub fn new(settings: &Settings, camera: &Camera) -> Self {
        let volume = &settings.volume;
        let shape = &settings.shape.sampling;
        let detail = &settings.detail.sampling;
        let light = &settings.light;
        let (near, far) = camera.clip_planes();
        let light_type = light_type_lane(light.light_type);
        let xyz = |v: [f32; 3], w: f32| [v[0], v[1], v[2], w];

        Self {
            view_inverse: matrix_to_array(&camera.view_inverse()),
            ray_origin: xyz(camera.position().to_vec().into(), 1.0),
            volume_scaling: xyz(volume.volume_scaling, 0.0),
            volume_translate: xyz(volume.volume_translate, 0.0),
            shape_scaling: shape.scaling,
            shape_translate: xyz(shape.translate, shape.density_offset),
            shape_weights: shape.channel_weights,
            detail_translate: xyz(detail.translate, detail.scaling),
            detail_weights: detail.channel_weights,
            light_dir: xyz(light.dir, light_type),
            light_color: xyz(light.color, 1.0),
            light_pos: light.pos,
            light_angles: [light.longitude, light.latitude, 0.0, 0.0],
            phase_params: volume.phase_params,
            march: [
                volume.density_mult,
                volume.cloud_light_absorption_mult,
                volume.min_light_transmittance,
                detail.density_weight,
            ],
            frame: [camera.x_max(), camera.y_max(), near, far],
            flags: [
                volume.num_steps,
                volume.invert_density as u32,
                volume.gamma_correct as u32,
                settings.show_terrain_preview as u32,
            ],
        }
    }
}

/// Per-dispatch parameters of the density compute stage.
#[repr(C)]
#[derive(Default, Copy, Clone, Debug, PartialEq, Pod, Zeroable)]
pub struct DensityUniforms {
    pub persistence: f32,
    pub resolution: u32,
    pub cells_fine: u32,
    pub cells_medium: u32,
    pub cells_coarse: u32,
    pub _pad: [u32; 3],
    pub channel_mask: [f32; 4],
}
