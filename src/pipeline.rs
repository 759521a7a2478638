use crate::error::{CloudscapeError, Result};
use crate::terrain::TerrainMesh;
use crate::uniforms::{TerrainLight, TerrainView, VolumetricUniforms};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PassState {
    Idle,
    TerrainPass,
    CapturePass,
    VolumetricPass,
}

/// The per-frame half of the device: capture target, uniforms, passes.
pub trait FrameBackend {
    fn upload_terrain(&mut self, mesh: &TerrainMesh) -> Result<()>;

    /// Tears down the off-screen color and depth textures and creates them
    /// at the new size, rebinding whatever samples them.
    fn recreate_capture_target(&mut self, width: u32, height: u32) -> Result<()>;

    fn write_terrain_projection(&mut self, projection: &[[f32; 4]; 4]);

    fn write_terrain_view(&mut self, view: &TerrainView);

    fn write_terrain_light(&mut self, light: &TerrainLight);

    fn write_volumetric_uniforms(&mut self, uniforms: &VolumetricUniforms);

    fn begin_frame(&mut self) -> Result<()>;

    /// Depth-tested terrain draw into the capture target.
    fn encode_terrain_pass(&mut self, vertex_count: u32);

    /// Full-screen composite sampling the capture target and both volumes.
    fn encode_volumetric_pass(&mut self);

    fn finish_frame(&mut self) -> Result<()>;

    /// Drains device errors reported since the previous call.
    fn take_device_errors(&mut self) -> Vec<String>;
}

/// Issued by [`FrameSequencer::begin`]; consumed by the terrain pass.
#[derive(Debug)]
pub struct TerrainStage {
    _private: (),
}

/// Proof that the capture target holds this frame's terrain.
#[derive(Debug)]
pub struct Captured {
    _private: (),
}

/// Folds the errors drained after a submit into one result. Every message is
/// logged; the first becomes the error and notes how many followed it.
pub fn drained_device_errors(pass: &'static str, messages: Vec<String>) -> Result<()> {
    let count = messages.len();
    let mut first = None;
    for message in messages {
        log::error!("{}: {}", pass, message);
        first.get_or_insert(message);
    }
    match first {
        None => Ok(()),
        Some(message) if count == 1 => Err(CloudscapeError::Device { pass, message }),
        Some(message) => Err(CloudscapeError::Device {
            pass,
            message: format!("{} ({} more logged)", message, count - 1),
        }),
    }
}

/// Drives `Idle -> TerrainPass -> CapturePass -> VolumetricPass -> Idle`.
///
/// The stage tokens make the order a type-level fact: the composite cannot
/// be encoded without the `Captured` token the terrain pass returns.
#[derive(Debug)]
pub struct FrameSequencer {
    state: PassState,
    capture_extent: Option<(u32, u32)>,
    frame_errors: Vec<CloudscapeError>,
}

impl Default for FrameSequencer {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameSequencer {
    pub fn new() -> Self {
        Self {
            state: PassState::Idle,
            capture_extent: None,
            frame_errors: Vec::new(),
        }
    }

    pub fn state(&self) -> PassState {
        self.state
    }

    pub fn capture_extent(&self) -> Option<(u32, u32)> {
        self.capture_extent
    }

    pub fn resize<B: FrameBackend + ?Sized>(&mut self, backend: &mut B, width: u32, height: u32) -> Result<()> {
        if self.state != PassState::Idle {
            return Err(CloudscapeError::PipelineOrder(format!(
                "resize requested during {:?}",
                self.state
            )));
        }
        let extent = (width.max(1), height.max(1));
        backend.recreate_capture_target(extent.0, extent.1)?;
        self.capture_extent = Some(extent);
        log::debug!("capture target recreated at {}x{}", extent.0, extent.1);
        Ok(())
    }

    pub fn begin<B: FrameBackend + ?Sized>(&mut self, backend: &mut B) -> Result<TerrainStage> {
        if self.state != PassState::Idle {
            return Err(CloudscapeError::PipelineOrder(format!("frame started during {:?}", self.state)));
        }
        if self.capture_extent.is_none() {
            return Err(CloudscapeError::PipelineOrder("no capture target, resize first".into()));
        }
        self.frame_errors.clear();
        backend.begin_frame()?;
        self.state = PassState::TerrainPass;
        Ok(TerrainStage { _private: () })
    }

    pub fn terrain_pass<B: FrameBackend + ?Sized>(
        &mut self,
        backend: &mut B,
        _stage: TerrainStage,
        vertex_count: u32,
    ) -> Captured {
        backend.encode_terrain_pass(vertex_count);
        self.state = PassState::CapturePass;
        self.poll_errors(backend, "terrain pass");
        Captured { _private: () }
    }

    /// Encodes the composite, submits and presents. The sequencer is back in
    /// `Idle` afterwards even if submission failed.
    pub fn volumetric_pass<B: FrameBackend + ?Sized>(&mut self, backend: &mut B, _captured: Captured) -> Result<()> {
        self.state = PassState::VolumetricPass;
        backend.encode_volumetric_pass();
        let finished = backend.finish_frame();
        self.poll_errors(backend, "volumetric pass");
        self.state = PassState::Idle;
        finished
    }

    /// Abandons a frame whose terrain pass already ran.
    pub fn abort(&mut self, _captured: Captured) {
        self.state = PassState::Idle;
    }

    fn poll_errors<B: FrameBackend + ?Sized>(&mut self, backend: &mut B, pass: &'static str) {
        for message in backend.take_device_errors() {
            log::error!("{}: {}", pass, message);
            self.frame_errors.push(CloudscapeError::Device { pass, message });
        }
    }

    /// Device errors collected during the current or last frame.
    pub fn take_frame_errors(&mut self) -> Vec<CloudscapeError> {
        std::mem::take(&mut self.frame_errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Log {
        calls: Vec<String>,
        pending_errors: Vec<String>,
    }

    impl FrameBackend for Log {
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
        fn write_terrain_view(&mut self, _view: &TerrainView) {
            self.calls.push("view".into());
        }
        fn write_terrain_light(&mut self, _light: &TerrainLight) {
            self.calls.push("terrain light".into());
        }
        fn write_volumetric_uniforms(&mut self, _uniforms: &VolumetricUniforms) {
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
            std::mem::take(&mut self.pending_errors)
        }
    }

    #[test]
    fn test_pass_order() {
        let mut backend = Log::default();
        let mut sequencer = FrameSequencer::new();
        sequencer.resize(&mut backend, 800, 600).unwrap();

        let stage = sequencer.begin(&mut backend).unwrap();
        assert_eq!(sequencer.state(), PassState::TerrainPass);
        let captured = sequencer.terrain_pass(&mut backend, stage, 36);
        assert_eq!(sequencer.state(), PassState::CapturePass);
        sequencer.volumetric_pass(&mut backend, captured).unwrap();
        assert_eq!(sequencer.state(), PassState::Idle);

        assert_eq!(backend.calls, vec!["capture 800x600", "begin", "terrain 36", "volumetric", "finish"]);
    }

    #[test]
    fn test_begin_requires_capture_target() {
        let mut backend = Log::default();
        let mut sequencer = FrameSequencer::new();
        assert!(matches!(sequencer.begin(&mut backend), Err(CloudscapeError::PipelineOrder(_))));
        assert!(backend.calls.is_empty());
    }

    #[test]
    fn test_no_resize_or_restart_mid_frame() {
        let mut backend = Log::default();
        let mut sequencer = FrameSequencer::new();
        sequencer.resize(&mut backend, 4, 4).unwrap();
        let stage = sequencer.begin(&mut backend).unwrap();
        assert!(sequencer.resize(&mut backend, 8, 8).is_err());
        assert!(sequencer.begin(&mut backend).is_err());
        let captured = sequencer.terrain_pass(&mut backend, stage, 6);
        sequencer.abort(captured);
        assert_eq!(sequencer.state(), PassState::Idle);
        assert_eq!(sequencer.capture_extent(), Some((4, 4)));
    }

    #[test]
    fn test_device_errors_are_attributed_to_passes() {
        let mut backend = Log::default();
        let mut sequencer = FrameSequencer::new();
        sequencer.resize(&mut backend, 4, 4).unwrap();
        let stage = sequencer.begin(&mut backend).unwrap();
        backend.pending_errors.push("validation".into());
        let captured = sequencer.terrain_pass(&mut backend, stage, 6);
        sequencer.volumetric_pass(&mut backend, captured).unwrap();

        let errors = sequencer.take_frame_errors();
        assert_eq!(errors.len(), 1);
        assert!(matches!(&errors[0], CloudscapeError::Device { pass: "terrain pass", .. }));
        assert!(sequencer.take_frame_errors().is_empty());
    }

    #[test]
    fn test_drained_errors_keep_the_first_and_count_the_rest() {
        assert!(drained_device_errors("volume publish", Vec::new()).is_ok());

        let single = drained_device_errors("volume publish", vec!["lost".into()]);
        assert!(matches!(
            single,
            Err(CloudscapeError::Device { pass: "volume publish", ref message }) if message == "lost"
        ));

        let messages = vec!["out of memory".into(), "validation".into(), "lost".into()];
        match drained_device_errors("density dispatch", messages) {
            Err(CloudscapeError::Device { pass, message }) => {
                assert_eq!(pass, "density dispatch");
                assert_eq!(message, "out of memory (2 more logged)");
            }
            other => panic!("expected a device error, got {:?}", other),
        }
    }
}
