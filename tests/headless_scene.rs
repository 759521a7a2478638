use cloudscape::cpu_volume::CpuVolumeBackend;
use cloudscape::dirty::GenerationKey;
use cloudscape::error::{CloudscapeError, Result};
use cloudscape::pipeline::{FrameBackend, PassState};
use cloudscape::point_buffer::PointBufferSink;
use cloudscape::scene::Scene;
use cloudscape::settings::{LightData, NoiseTier, Settings, WorleyPointsParams};
use cloudscape::terrain::TerrainMesh;
use cloudscape::uniforms::{TerrainLight, TerrainView, VolumetricUniforms};
use cloudscape::volume::{DensityDispatch, VolumeBackend};

/// Host volumes plus a log of every frame-side call.
#[derive(Default)]
struct Headless {
    volumes: CpuVolumeBackend,
    calls: Vec<String>,
    aspect: f32,
    x_max: f32,
    light_dir: [f32; 4],
}

impl Headless {
    fn count(&self, call: &str) -> usize {
        self.calls.iter().filter(|c| c.starts_with(call)).count()
    }
}

impl PointBufferSink for Headless {
    fn write_points(&mut self, byte_offset: u64, bytes: &[u8]) -> Result<()> {
        self.volumes.write_points(byte_offset, bytes)
    }
}

impl VolumeBackend for Headless {
    fn dispatch_density(&mut self, dispatch: &DensityDispatch) -> Result<()> {
        self.volumes.dispatch_density(dispatch)
    }

    fn publish_volume(&mut self, tier: NoiseTier) -> Result<()> {
        self.volumes.publish_volume(tier)
    }
}

impl FrameBackend for Headless {
    fn upload_terrain(&mut self, mesh: &TerrainMesh) -> Result<()> {
        self.calls.push(format!("upload {}", mesh.vertex_count()));
        Ok(())
    }

    fn recreate_capture_target(&mut self, width: u32, height: u32) -> Result<()> {
        self.calls.push(format!("capture {}x{}", width, height));
        Ok(())
    }

    fn write_terrain_projection(&mut self, _projection: &[[f32; 4]; 4]) {
        self.calls.push("projection".into());
    }

    fn write_terrain_view(&mut self, view: &TerrainView) {
        self.aspect = view.viewport[0];
        self.calls.push("view".into());
    }

    fn write_terrain_light(&mut self, light: &TerrainLight) {
        self.light_dir = light.dir;
        self.calls.push("terrain light".into());
    }

    fn write_volumetric_uniforms(&mut self, uniforms: &VolumetricUniforms) {
        self.x_max = uniforms.frame[0];
        self.calls.push("volumetric uniforms".into());
    }

    fn begin_frame(&mut self) -> Result<()> {
        self.calls.push("begin".into());
        Ok(())
    }

    fn encode_terrain_pass(&mut self, vertex_count: u32) {
        self.calls.push(format!("terrain {}", vertex_count));
    }

    fn encode_volumetric_pass(&mut self) {
        self.calls.push("volumetric".into());
    }

    fn finish_frame(&mut self) -> Result<()> {
        self.calls.push("finish".into());
        Ok(())
    }

    fn take_device_errors(&mut self) -> Vec<String> {
        Vec::new()
    }
}

fn small_settings() -> Settings {
    let mut settings = Settings::default();
    settings.terrain.noise_map_size = 16;
    settings.terrain.cell_size = 4.0;
    settings.terrain.x_scale = 1;
    settings.terrain.y_scale = 1;
    settings.shape.resolution = 16;
    settings.detail.resolution = 16;
    for tier in [&mut settings.shape.worley_points, &mut settings.detail.worley_points] {
        *tier = [WorleyPointsParams::new(4, 3, 2); 4];
    }
    settings
}

fn started(width: u32, height: u32) -> (Scene, Headless) {
    let mut scene = Scene::new(small_settings(), width, height).unwrap();
    let mut backend = Headless::default();
    scene.initialize(&mut backend).unwrap();
    (scene, backend)
}

#[test]
fn test_initialize_then_render() {
    let (mut scene, mut backend) = started(800, 600);
    assert_eq!(backend.volumes.dispatch_count(), 8);
    assert_eq!(backend.volumes.published_resolution(NoiseTier::Shape), 16);
    assert_eq!(backend.volumes.published_resolution(NoiseTier::Detail), 16);
    assert!(GenerationKey::all().all(|key| !scene.config().dirty().is_dirty(key)));

    backend.calls.clear();
    scene.render_frame(&mut backend).unwrap();
    let vertices = 16 * 16 * 6;
    assert_eq!(
        backend.calls,
        vec!["begin".to_string(), format!("terrain {}", vertices), "volumetric".into(), "finish".into()]
    );
    assert_eq!(scene.sequencer().state(), PassState::Idle);
}

#[test]
fn test_resize_keeps_projection() {
    let (mut scene, mut backend) = started(800, 600);
    let x_max_before = backend.x_max;
    backend.calls.clear();

    scene.resize(&mut backend, 1920, 1080).unwrap();

    assert_eq!(backend.count("capture 1920x1080"), 1);
    assert_eq!(backend.count("projection"), 0);
    assert!((backend.aspect - 1920.0 / 1080.0).abs() < 1e-6);
    assert!(backend.x_max > x_max_before);
    assert_eq!(scene.sequencer().capture_extent(), Some((1920, 1080)));
    scene.render_frame(&mut backend).unwrap();
}

#[test]
fn test_regeneration_is_reproducible() {
    let (mut scene, mut backend) = started(64, 64);
    let original = backend.volumes.published(NoiseTier::Detail).unwrap().to_vec();

    let seed = scene.config().settings().point_seed;
    scene.config_mut().set_point_seed(seed + 7);
    scene.update(&mut backend).unwrap();
    assert_ne!(backend.volumes.published(NoiseTier::Detail).unwrap(), original.as_slice());

    scene.config_mut().set_point_seed(seed);
    scene.update(&mut backend).unwrap();
    assert_eq!(backend.volumes.published(NoiseTier::Detail).unwrap(), original.as_slice());
}

#[test]
fn test_channel_edit_touches_one_channel() {
    let (mut scene, mut backend) = started(64, 64);
    let before = backend.volumes.published(NoiseTier::Shape).unwrap().to_vec();
    let dispatches = backend.volumes.dispatch_count();

    scene
        .config_mut()
        .set_worley_points(NoiseTier::Shape, 1, WorleyPointsParams::new(5, 3, 1))
        .unwrap();
    scene.update(&mut backend).unwrap();

    assert_eq!(backend.volumes.dispatch_count(), dispatches + 1);
    let after = backend.volumes.published(NoiseTier::Shape).unwrap();
    assert!(before.iter().zip(after).all(|(a, b)| a[0] == b[0] && a[2] == b[2] && a[3] == b[3]));
    assert!(before.iter().zip(after).any(|(a, b)| a[1] != b[1]));
}

#[test]
fn test_invalid_edit_is_rejected_without_marking() {
    let (mut scene, _backend) = started(64, 64);
    let result = scene.config_mut().set_clip_planes(1.0, 0.5);
    assert!(matches!(result, Err(CloudscapeError::InvalidParameter(_))));
    assert!(!scene.config().dirty().is_dirty(GenerationKey::RenderParams));
}

#[test]
fn test_sun_moves_terrain_shading() {
    let (mut scene, mut backend) = started(64, 64);
    let initial = LightData::default();
    assert_eq!(backend.light_dir[..3], initial.dir[..]);

    let sunset = LightData::sun(270.0, 5.0, [1.0, 0.6, 0.4]);
    scene.config_mut().set_light(sunset);
    scene.update(&mut backend).unwrap();
    assert_eq!(backend.light_dir[..3], sunset.dir[..]);
    assert_eq!(backend.light_dir[3], 0.0);
}
