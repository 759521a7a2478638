use cgmath::{Point3, Vector3};

use crate::camera::Camera;
use crate::dirty::GenerationKey;
use crate::error::{CloudscapeError, DeviceFailureMonitor, Result};
use crate::pipeline::{FrameBackend, FrameSequencer};
use crate::settings::{ConfigStore, NoiseTier, Settings};
use crate::terrain::{TerrainMesh, TerrainMeshGenerator};
use crate::uniforms::{matrix_to_array, TerrainLight, TerrainView, VolumetricUniforms};
use crate::volume::{VolumeBackend, VolumeNoiseOrchestrator};

/// Everything a backend has to provide for a complete scene.
pub trait SceneBackend: FrameBackend + VolumeBackend {}

impl<T: FrameBackend + VolumeBackend + ?Sized> SceneBackend for T {}

/// Configuration, generated data and the frame sequencer, stepped once per
/// frame by the event loop. Holds no device handles; every call takes the
/// backend it should drive.
pub struct Scene {
    config: ConfigStore,
    camera: Camera,
    terrain: TerrainMeshGenerator,
    volumes: VolumeNoiseOrchestrator,
    sequencer: FrameSequencer,
    monitor: DeviceFailureMonitor,
}

impl Scene {
    pub fn new(settings: Settings, width: u32, height: u32) -> Result<Self> {
        let config = ConfigStore::new(settings)?;
        let settings = config.settings();
        Ok(Self {
            camera: Camera::new(width, height, settings.near_plane, settings.far_plane),
            terrain: TerrainMeshGenerator::new(settings.terrain.clone()),
            volumes: VolumeNoiseOrchestrator::new(settings.point_seed),
            sequencer: FrameSequencer::new(),
            monitor: DeviceFailureMonitor::new(settings.max_consecutive_failed_frames),
            config,
        })
    }

    pub fn config(&self) -> &ConfigStore {
        &self.config
    }

    /// Setters on the returned store flag what they touch; the next
    /// [`Scene::update`] regenerates it.
    pub fn config_mut(&mut self) -> &mut ConfigStore {
        &mut self.config
    }

    pub fn camera(&self) -> &Camera {
        &self.camera
    }

    pub fn terrain_mesh(&self) -> Option<&TerrainMesh> {
        self.terrain.mesh()
    }

    pub fn volumes(&self) -> &VolumeNoiseOrchestrator {
        &self.volumes
    }

    pub fn sequencer(&self) -> &FrameSequencer {
        &self.sequencer
    }

    pub fn set_camera_pose(&mut self, position: Point3<f32>, look: Vector3<f32>) {
        self.camera.set_pose(position, look);
        self.config.dirty_mut().mark_render_params();
    }

    pub fn toggle_terrain_preview(&mut self) -> bool {
        let shown = self.config.toggle_terrain_preview();
        self.config.dirty_mut().mark_render_params();
        shown
    }

    /// Creates the capture target and runs every generation task once.
    pub fn initialize<B: SceneBackend + ?Sized>(&mut self, backend: &mut B) -> Result<()> {
        let (width, height) = self.camera.viewport();
        self.sequencer.resize(backend, width, height)?;
        self.config.dirty_mut().mark_all();
        self.update(backend)?;
        log::info!("scene initialized at {}x{}", width, height);
        Ok(())
    }

    /// Runs the regeneration of every dirty key, in `GenerationKey::all`
    /// order. A key is cleared only when its task succeeded; the first
    /// failure is returned after the remaining keys had their turn.
    pub fn update<B: SceneBackend + ?Sized>(&mut self, backend: &mut B) -> Result<()> {
        let mut first_error = None;
        for key in GenerationKey::all() {
            if !self.config.dirty().is_dirty(key) {
                continue;
            }
            match self.regenerate(backend, key) {
                Ok(()) => self.config.dirty_mut().clear(key)?,
                Err(err) => {
                    log::error!("regenerating {:?} failed: {}", key, err);
                    first_error.get_or_insert(err);
                }
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    fn regenerate<B: SceneBackend + ?Sized>(&mut self, backend: &mut B, key: GenerationKey) -> Result<()> {
        match key {
            GenerationKey::Terrain => {
                self.terrain.set_settings(self.config.settings().terrain.clone());
                let mesh = self.terrain.regenerate()?;
                backend.upload_terrain(mesh)
            }
            GenerationKey::Noise { tier, channel } => {
                let settings = self.config.settings();
                self.volumes.set_seed(settings.point_seed);
                self.volumes.regenerate(backend, tier, channel, settings)
            }
            GenerationKey::RenderParams => {
                let settings = self.config.settings();
                self.camera.set_clip_planes(settings.near_plane, settings.far_plane);
                self.write_camera_uniforms(backend);
                Ok(())
            }
        }
    }

    fn write_camera_uniforms<B: FrameBackend + ?Sized>(&mut self, backend: &mut B) {
        if self.camera.take_projection_changed() {
            backend.write_terrain_projection(&matrix_to_array(&self.camera.projection()));
        }
        backend.write_terrain_view(&TerrainView::new(&self.camera));
        backend.write_terrain_light(&TerrainLight::new(&self.config.settings().light));
        backend.write_volumetric_uniforms(&VolumetricUniforms::new(self.config.settings(), &self.camera));
    }

    /// Recreates the capture target. The projection does not depend on the
    /// viewport, so only the view block and the ray extents are rewritten.
    pub fn resize<B: FrameBackend + ?Sized>(&mut self, backend: &mut B, width: u32, height: u32) -> Result<()> {
        self.camera.set_viewport(width, height);
        let (width, height) = self.camera.viewport();
        self.sequencer.resize(backend, width, height)?;
        self.write_camera_uniforms(backend);
        Ok(())
    }

    /// Terrain pass, capture, volumetric composite. Device errors of the
    /// frame feed the failure monitor, which fails the frame once the streak
    /// is too long.
    pub fn render_frame<B: FrameBackend + ?Sized>(&mut self, backend: &mut B) -> Result<()> {
        if let Some(tier) = NoiseTier::ALL.into_iter().find(|&tier| self.volumes.is_pending(tier)) {
            return Err(CloudscapeError::PipelineOrder(format!(
                "{} volume has an unpublished dispatch",
                tier.label()
            )));
        }
        let vertex_count = self
            .terrain
            .mesh()
            .map(TerrainMesh::vertex_count)
            .ok_or_else(|| CloudscapeError::PipelineOrder("terrain mesh not generated yet".into()))?;

        let stage = self.sequencer.begin(backend)?;
        let captured = self.sequencer.terrain_pass(backend, stage, vertex_count);
        let submitted = self.sequencer.volumetric_pass(backend, captured);

        let errors = self.sequencer.take_frame_errors();
        self.monitor.record_frame(&errors)?;
        submitted
    }

    pub fn consecutive_failed_frames(&self) -> u32 {
        self.monitor.consecutive_failures()
    }
}
