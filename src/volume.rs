use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

use crate::error::{CloudscapeError, Result};
use crate::point_buffer::{PointBufferSink, SharedPointBuffer};
use crate::settings::{NoiseTier, Settings, CHANNEL_COUNT};
use crate::worley::{WorleyBand, WorleyPointSet};

/// Everything the density stage needs to fill one channel of one volume.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DensityDispatch {
    pub tier: NoiseTier,
    pub channel: usize,
    pub resolution: u32,
    pub persistence: f32,
    /// Cells per axis, indexed by `WorleyBand`.
    pub cells: [u32; 3],
    /// 1.0 on the written channel, 0.0 elsewhere.
    pub channel_mask: [f32; 4],
}

impl DensityDispatch {
    pub fn mask_for(channel: usize) -> [f32; 4] {
        let mut mask = [0.0; 4];
        mask[channel] = 1.0;
        mask
    }
}

/// The device side of volume generation.
///
/// Point uploads go through [`PointBufferSink`]. A dispatch may leave the
/// volume in an intermediate state; it becomes readable by the render passes
/// only after `publish_volume`.
pub trait VolumeBackend: PointBufferSink {
    fn dispatch_density(&mut self, dispatch: &DensityDispatch) -> Result<()>;

    fn publish_volume(&mut self, tier: NoiseTier) -> Result<()>;
}

/// Regenerates single channels of the shape and detail volumes.
#[derive(Debug)]
pub struct VolumeNoiseOrchestrator {
    points: SharedPointBuffer,
    seed: u64,
    pending: [bool; 2],
}

impl VolumeNoiseOrchestrator {
    pub fn new(seed: u64) -> Self {
        Self {
            points: SharedPointBuffer::new(),
            seed,
            pending: [false; 2],
        }
    }

    pub fn set_seed(&mut self, seed: u64) {
        self.seed = seed;
    }

    pub fn points(&self) -> &SharedPointBuffer {
        &self.points
    }

    /// True between a dispatch and the matching publish.
    pub fn is_pending(&self, tier: NoiseTier) -> bool {
        self.pending[tier.index()]
    }

    pub fn any_pending(&self) -> bool {
        self.pending.iter().any(|&p| p)
    }

    /// Each (tier, channel, band) draws from its own stream, so rebuilding a
    /// channel reproduces it bit for bit regardless of what ran before.
    fn band_rng(&self, tier: NoiseTier, channel: usize, band: WorleyBand) -> ChaCha8Rng {
        let mut rng = ChaCha8Rng::seed_from_u64(self.seed);
        rng.set_stream((tier.index() * 16 + channel * 4 + band.index()) as u64);
        rng
    }

    pub fn regenerate<B: VolumeBackend + ?Sized>(
        &mut self,
        backend: &mut B,
        tier: NoiseTier,
        channel: usize,
        settings: &Settings,
    ) -> Result<()> {
        if channel >= CHANNEL_COUNT {
            return Err(CloudscapeError::invalid(format!(
                "channel {} out of range for the {} volume",
                channel,
                tier.label()
            )));
        }
        let generation = settings.tier_generation(tier);
        let params = generation.worley_points[channel];

        for band in WorleyBand::ALL {
            let set = WorleyPointSet::generate(params.cells(band), &mut self.band_rng(tier, channel, band))?;
            self.points.write_region(backend, band, set.points())?;
        }

        let dispatch = DensityDispatch {
            tier,
            channel,
            resolution: generation.resolution,
            persistence: generation.persistence,
            cells: params.as_array(),
            channel_mask: DensityDispatch::mask_for(channel),
        };
        self.pending[tier.index()] = true;
        backend.dispatch_density(&dispatch)?;
        backend.publish_volume(tier)?;
        self.pending[tier.index()] = false;

        log::debug!(
            "regenerated {} channel {} at {}^3 with cells {:?}",
            tier.label(),
            channel,
            generation.resolution,
            dispatch.cells
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::WorleyPointsParams;

    #[derive(Default)]
    struct Recorder {
        writes: Vec<(u64, usize)>,
        events: Vec<String>,
        fail_dispatch: bool,
    }

    impl PointBufferSink for Recorder {
        fn write_points(&mut self, byte_offset: u64, bytes: &[u8]) -> Result<()> {
            self.writes.push((byte_offset, bytes.len()));
            Ok(())
        }
    }

    impl VolumeBackend for Recorder {
        fn dispatch_density(&mut self, dispatch: &DensityDispatch) -> Result<()> {
            if self.fail_dispatch {
                return Err(CloudscapeError::Device { pass: "density", message: "lost".into() });
            }
            self.events.push(format!("dispatch {:?} {} {:?}", dispatch.tier, dispatch.channel, dispatch.channel_mask));
            Ok(())
        }

        fn publish_volume(&mut self, tier: NoiseTier) -> Result<()> {
            self.events.push(format!("publish {:?}", tier));
            Ok(())
        }
    }

    #[test]
    fn test_regenerate_writes_three_regions_then_dispatches() {
        let mut settings = Settings::default();
        settings.detail.worley_points[2] = WorleyPointsParams::new(4, 3, 2);
        let mut backend = Recorder::default();
        let mut orchestrator = VolumeNoiseOrchestrator::new(1);

        orchestrator.regenerate(&mut backend, NoiseTier::Detail, 2, &settings).unwrap();

        let region = SharedPointBuffer::REGION_BYTES;
        assert_eq!(backend.writes, vec![(0, 64 * 16), (region, 27 * 16), (2 * region, 8 * 16)]);
        assert_eq!(
            backend.events,
            vec!["dispatch Detail 2 [0.0, 0.0, 1.0, 0.0]".to_string(), "publish Detail".to_string()]
        );
        assert!(!orchestrator.any_pending());
    }

    #[test]
    fn test_failed_dispatch_leaves_tier_pending() {
        let settings = Settings::default();
        let mut backend = Recorder { fail_dispatch: true, ..Default::default() };
        let mut orchestrator = VolumeNoiseOrchestrator::new(1);
        assert!(orchestrator.regenerate(&mut backend, NoiseTier::Shape, 0, &settings).is_err());
        assert!(orchestrator.is_pending(NoiseTier::Shape));
        assert!(!orchestrator.is_pending(NoiseTier::Detail));
    }

    #[test]
    fn test_streams_differ_per_channel() {
        let orchestrator = VolumeNoiseOrchestrator::new(3);
        let a = WorleyPointSet::generate(2, &mut orchestrator.band_rng(NoiseTier::Shape, 0, WorleyBand::Fine)).unwrap();
        let b = WorleyPointSet::generate(2, &mut orchestrator.band_rng(NoiseTier::Shape, 1, WorleyBand::Fine)).unwrap();
        let again = WorleyPointSet::generate(2, &mut orchestrator.band_rng(NoiseTier::Shape, 0, WorleyBand::Fine)).unwrap();
        assert_ne!(a, b);
        assert_eq!(a, again);
    }

    #[test]
    fn test_channel_out_of_range() {
        let mut backend = Recorder::default();
        let mut orchestrator = VolumeNoiseOrchestrator::new(1);
        let result = orchestrator.regenerate(&mut backend, NoiseTier::Shape, CHANNEL_COUNT, &Settings::default());
        assert!(matches!(result, Err(CloudscapeError::InvalidParameter(_))));
        assert!(backend.writes.is_empty());
    }
}
