use std::path::PathBuf;

use crate::dirty::{DirtyTracker, GenerationKey};
use crate::error::{CloudscapeError, Result};
use crate::terrain::TerrainSettings;
use crate::worley::{WorleyBand, MAX_CELLS_PER_AXIS};

/// Channels per density volume (RGBA).
pub const CHANNEL_COUNT: usize = 4;

/// The two density volumes: high resolution "shape" and low resolution
/// "detail".
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum NoiseTier {
    Shape,
    Detail,
}

impl NoiseTier {
    pub const ALL: [NoiseTier; 2] = [NoiseTier::Shape, NoiseTier::Detail];

    pub fn index(self) -> usize {
        match self {
            NoiseTier::Shape => 0,
            NoiseTier::Detail => 1,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            NoiseTier::Shape => "shape",
            NoiseTier::Detail => "detail",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct WorleyPointsParams {
    pub cells_per_axis_fine: u32,
    pub cells_per_axis_medium: u32,
    pub cells_per_axis_coarse: u32,
}

impl WorleyPointsParams {
    pub const fn new(fine: u32, medium: u32, coarse: u32) -> Self {
        Self {
            cells_per_axis_fine: fine,
            cells_per_axis_medium: medium,
            cells_per_axis_coarse: coarse,
        }
    }

    pub fn cells(&self, band: WorleyBand) -> u32 {
        match band {
            WorleyBand::Fine => self.cells_per_axis_fine,
            WorleyBand::Medium => self.cells_per_axis_medium,
            WorleyBand::Coarse => self.cells_per_axis_coarse,
        }
    }

    pub fn as_array(&self) -> [u32; 3] {
        [self.cells_per_axis_fine, self.cells_per_axis_medium, self.cells_per_axis_coarse]
    }

    /// Pulls every density into `[1, MAX_CELLS_PER_AXIS]`.
    pub fn clamped(&self) -> Self {
        let clamp = |v: u32| v.clamp(1, MAX_CELLS_PER_AXIS);
        Self::new(
            clamp(self.cells_per_axis_fine),
            clamp(self.cells_per_axis_medium),
            clamp(self.cells_per_axis_coarse),
        )
    }
}

/// Sampling of the shape volume: per-axis scaling in `xyz`, global factor in `w`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ShapeSampling {
    pub scaling: [f32; 4],
    pub translate: [f32; 3],
    pub channel_weights: [f32; 4],
    pub density_offset: f32,
}

/// Sampling of the detail volume, scaled by a single factor.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DetailSampling {
    pub scaling: f32,
    pub translate: [f32; 3],
    pub channel_weights: [f32; 4],
    pub density_weight: f32,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ShapeNoiseSettings {
    pub resolution: u32,
    pub persistence: f32,
    pub worley_points: [WorleyPointsParams; CHANNEL_COUNT],
    pub sampling: ShapeSampling,
}

impl Default for ShapeNoiseSettings {
    fn default() -> Self {
        Self {
            resolution: 128,
            persistence: 0.5,
            worley_points: [
                WorleyPointsParams::new(16, 8, 4),
                WorleyPointsParams::new(20, 10, 5),
                WorleyPointsParams::new(24, 12, 6),
                WorleyPointsParams::new(28, 14, 7),
            ],
            sampling: ShapeSampling {
                scaling: [1.0, 1.0, 1.0, 1.0],
                translate: [0.0, 0.0, 0.0],
                channel_weights: [1.0, 0.5, 0.25, 0.125],
                density_offset: -0.35,
            },
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct DetailNoiseSettings {
    pub resolution: u32,
    pub persistence: f32,
    pub worley_points: [WorleyPointsParams; CHANNEL_COUNT],
    pub sampling: DetailSampling,
}

impl Default for DetailNoiseSettings {
    fn default() -> Self {
        Self {
            resolution: 32,
            persistence: 0.5,
            worley_points: [
                WorleyPointsParams::new(8, 4, 2),
                WorleyPointsParams::new(10, 5, 3),
                WorleyPointsParams::new(12, 6, 3),
                WorleyPointsParams::new(16, 8, 4),
            ],
            sampling: DetailSampling {
                scaling: 3.0,
                translate: [0.0, 0.0, 0.0],
                channel_weights: [1.0, 0.5, 0.25, 0.125],
                density_weight: 0.3,
            },
        }
    }
}

/// The generation-relevant part of a tier, whichever tier it is.
#[derive(Clone, Copy, Debug)]
pub struct TierGeneration<'a> {
    pub resolution: u32,
    pub persistence: f32,
    pub worley_points: &'a [WorleyPointsParams; CHANNEL_COUNT],
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LightType {
    Directional = 0,
    Point = 1,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LightData {
    /// Degrees around the vertical axis.
    pub longitude: f32,
    /// Degrees above the horizon.
    pub latitude: f32,
    pub light_type: LightType,
    pub dir: [f32; 3],
    pub color: [f32; 3],
    pub pos: [f32; 4],
}

impl LightData {
    /// Directional sun placed by its angles; `dir` points from the sun
    /// towards the scene (z up).
    pub fn sun(longitude: f32, latitude: f32, color: [f32; 3]) -> Self {
        let (lon, lat) = (longitude.to_radians(), latitude.to_radians());
        let to_sun = [lat.cos() * lon.cos(), lat.cos() * lon.sin(), lat.sin()];
        Self {
            longitude,
            latitude,
            light_type: LightType::Directional,
            dir: to_sun.map(|c| -c),
            color,
            pos: [to_sun[0] * 100.0, to_sun[1] * 100.0, to_sun[2] * 100.0, 1.0],
        }
    }
}

impl Default for LightData {
    fn default() -> Self {
        LightData::sun(45.0, 30.0, [1.0, 0.96, 0.9])
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct VolumeRenderSettings {
    pub volume_scaling: [f32; 3],
    pub volume_translate: [f32; 3],
    pub num_steps: u32,
    pub density_mult: f32,
    pub invert_density: bool,
    pub gamma_correct: bool,
    pub cloud_light_absorption_mult: f32,
    pub min_light_transmittance: f32,
    /// Forward/back scattering blend and base brightness.
    pub phase_params: [f32; 4],
}

impl Default for VolumeRenderSettings {
    fn default() -> Self {
        Self {
            volume_scaling: [4.0, 4.0, 0.6],
            volume_translate: [0.0, 0.0, 0.9],
            num_steps: 64,
            density_mult: 2.0,
            invert_density: false,
            gamma_correct: true,
            cloud_light_absorption_mult: 0.8,
            min_light_transmittance: 0.15,
            phase_params: [0.83, 0.3, 0.8, 0.15],
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Settings {
    pub terrain: TerrainSettings,
    pub shape: ShapeNoiseSettings,
    pub detail: DetailNoiseSettings,
    pub light: LightData,
    pub volume: VolumeRenderSettings,
    pub near_plane: f32,
    pub far_plane: f32,
    /// Seed of the Worley point streams.
    pub point_seed: u64,
    pub max_consecutive_failed_frames: u32,
    pub show_terrain_preview: bool,
    pub asset_dir: PathBuf,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            terrain: TerrainSettings::default(),
            shape: ShapeNoiseSettings::default(),
            detail: DetailNoiseSettings::default(),
            light: LightData::default(),
            volume: VolumeRenderSettings::default(),
            near_plane: 0.1,
            far_plane: 100.0,
            point_seed: 0x5eed,
            max_consecutive_failed_frames: 8,
            show_terrain_preview: false,
            asset_dir: PathBuf::from("textures"),
        }
    }
}

/// Volume side lengths are copied row by row into 3D textures, and one row
/// of RGBA32F texels must be a multiple of 256 bytes.
pub const VOLUME_RESOLUTION_ALIGNMENT: u32 = 16;
pub const MAX_VOLUME_RESOLUTION: u32 = 256;

fn validate_resolution(tier: NoiseTier, resolution: u32) -> Result<()> {
    if resolution == 0
        || resolution > MAX_VOLUME_RESOLUTION
        || resolution % VOLUME_RESOLUTION_ALIGNMENT != 0
    {
        return Err(CloudscapeError::invalid(format!(
            "{} volume resolution {} must be a positive multiple of {} up to {}",
            tier.label(),
            resolution,
            VOLUME_RESOLUTION_ALIGNMENT,
            MAX_VOLUME_RESOLUTION
        )));
    }
    Ok(())
}

fn validate_clip_planes(near: f32, far: f32) -> Result<()> {
    if !(near > 0.0 && far > near && far.is_finite()) {
        return Err(CloudscapeError::invalid(format!(
            "clip planes must satisfy 0 < near < far, got near {} far {}",
            near, far
        )));
    }
    Ok(())
}

impl Settings {
    pub fn validate(&self) -> Result<()> {
        self.terrain.validate()?;
        validate_resolution(NoiseTier::Shape, self.shape.resolution)?;
        validate_resolution(NoiseTier::Detail, self.detail.resolution)?;
        validate_clip_planes(self.near_plane, self.far_plane)?;
        for tier in NoiseTier::ALL {
            for params in self.tier_generation(tier).worley_points {
                if *params != params.clamped() {
                    return Err(CloudscapeError::invalid(format!(
                        "{} cell densities {:?} must lie in [1, {}]",
                        tier.label(),
                        params.as_array(),
                        MAX_CELLS_PER_AXIS
                    )));
                }
            }
        }
        Ok(())
    }

    pub fn tier_generation(&self, tier: NoiseTier) -> TierGeneration<'_> {
        match tier {
            NoiseTier::Shape => TierGeneration {
                resolution: self.shape.resolution,
                persistence: self.shape.persistence,
                worley_points: &self.shape.worley_points,
            },
            NoiseTier::Detail => TierGeneration {
                resolution: self.detail.resolution,
                persistence: self.detail.persistence,
                worley_points: &self.detail.worley_points,
            },
        }
    }
}

/// Owns the live settings; every mutation goes through here so the matching
/// dirty flag is always set.
#[derive(Clone, Debug)]
pub struct ConfigStore {
    settings: Settings,
    dirty: DirtyTracker,
}

impl ConfigStore {
    pub fn new(settings: Settings) -> Result<Self> {
        settings.validate()?;
        Ok(Self {
            settings,
            dirty: DirtyTracker::new(),
        })
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn dirty(&self) -> &DirtyTracker {
        &self.dirty
    }

    pub(crate) fn dirty_mut(&mut self) -> &mut DirtyTracker {
        &mut self.dirty
    }

    pub fn set_terrain(&mut self, terrain: TerrainSettings) -> Result<()> {
        terrain.validate()?;
        if terrain != self.settings.terrain {
            self.settings.terrain = terrain;
            self.dirty.mark(GenerationKey::Terrain)?;
        }
        Ok(())
    }

    pub fn set_terrain_scale(&mut self, x_scale: u32, y_scale: u32) -> Result<()> {
        let terrain = TerrainSettings {
            x_scale,
            y_scale,
            ..self.settings.terrain.clone()
        };
        self.set_terrain(terrain)
    }

    pub fn set_worley_points(&mut self, tier: NoiseTier, channel: usize, params: WorleyPointsParams) -> Result<()> {
        let key = GenerationKey::noise(tier, channel)?;
        let clamped = params.clamped();
        if clamped != params {
            log::warn!(
                "{} channel {}: cell densities {:?} clamped to {:?}",
                tier.label(),
                channel,
                params.as_array(),
                clamped.as_array()
            );
        }
        let slot = match tier {
            NoiseTier::Shape => &mut self.settings.shape.worley_points[channel],
            NoiseTier::Detail => &mut self.settings.detail.worley_points[channel],
        };
        if *slot != clamped {
            *slot = clamped;
            self.dirty.mark(key)?;
        }
        Ok(())
    }

    /// Persistence feeds every channel of the tier.
    pub fn set_persistence(&mut self, tier: NoiseTier, persistence: f32) -> Result<()> {
        if !persistence.is_finite() || persistence < 0.0 {
            return Err(CloudscapeError::invalid(format!("persistence must be non-negative, got {}", persistence)));
        }
        let slot = match tier {
            NoiseTier::Shape => &mut self.settings.shape.persistence,
            NoiseTier::Detail => &mut self.settings.detail.persistence,
        };
        if *slot != persistence {
            *slot = persistence;
            self.dirty.mark_tier(tier);
        }
        Ok(())
    }

    pub fn set_point_seed(&mut self, seed: u64) {
        if self.settings.point_seed != seed {
            self.settings.point_seed = seed;
            for tier in NoiseTier::ALL {
                self.dirty.mark_tier(tier);
            }
        }
    }

    pub fn set_shape_sampling(&mut self, sampling: ShapeSampling) {
        self.settings.shape.sampling = sampling;
        self.dirty.mark_render_params();
    }

    pub fn set_detail_sampling(&mut self, sampling: DetailSampling) {
        self.settings.detail.sampling = sampling;
        self.dirty.mark_render_params();
    }

    pub fn set_light(&mut self, light: LightData) {
        self.settings.light = light;
        self.dirty.mark_render_params();
    }

    pub fn set_volume_render(&mut self, volume: VolumeRenderSettings) {
        self.settings.volume = volume;
        self.dirty.mark_render_params();
    }

    pub fn set_clip_planes(&mut self, near: f32, far: f32) -> Result<()> {
        validate_clip_planes(near, far)?;
        self.settings.near_plane = near;
        self.settings.far_plane = far;
        self.dirty.mark_render_params();
        Ok(())
    }

    pub fn toggle_terrain_preview(&mut self) -> bool {
        self.settings.show_terrain_preview = !self.settings.show_terrain_preview;
        self.settings.show_terrain_preview
    }
}
