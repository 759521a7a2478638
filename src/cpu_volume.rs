//! Host-side evaluation of the density stage, texel for texel what
//! `density.wgsl` computes. Runs the whole regeneration path without a GPU.

use crate::error::{CloudscapeError, Result};
use crate::point_buffer::{PointBufferSink, SharedPointBuffer};
use crate::settings::NoiseTier;
use crate::volume::{DensityDispatch, VolumeBackend};
use crate::worley::{nearest_feature_distance, WorleyBand, WorleyPoint, MAX_NUM_POINTS};

/// Layered Worley density at `p`: the coarse band carries weight 1, medium
/// `persistence`, fine `persistence^2`, and the normalized sum is inverted
/// so feature points are dense.
pub fn layered_density(bands: [&[WorleyPoint]; 3], cells: [u32; 3], persistence: f32, p: [f32; 3]) -> f32 {
    let distance = |band: WorleyBand| nearest_feature_distance(bands[band.index()], cells[band.index()], p);
    let fine = distance(WorleyBand::Fine);
    let medium = distance(WorleyBand::Medium);
    let coarse = distance(WorleyBand::Coarse);

    let weights = 1.0 + persistence + persistence * persistence;
    let value = (coarse + medium * persistence + fine * persistence * persistence) / weights;
    1.0 - value
}

#[derive(Clone, Debug, Default)]
struct HostVolume {
    resolution: u32,
    texels: Vec<[f32; 4]>,
}

impl HostVolume {
    fn ensure_resolution(&mut self, resolution: u32) {
        if self.resolution != resolution {
            let n = resolution as usize;
            self.resolution = resolution;
            self.texels = vec![[0.0; 4]; n * n * n];
        }
    }
}

#[derive(Debug)]
pub struct CpuVolumeBackend {
    points: Vec<WorleyPoint>,
    working: [HostVolume; 2],
    published: [HostVolume; 2],
    dispatch_count: usize,
}

impl Default for CpuVolumeBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl CpuVolumeBackend {
    pub fn new() -> Self {
        Self {
            points: vec![WorleyPoint::default(); 3 * MAX_NUM_POINTS],
            working: Default::default(),
            published: Default::default(),
            dispatch_count: 0,
        }
    }

    pub fn point_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.points)
    }

    pub fn dispatch_count(&self) -> usize {
        self.dispatch_count
    }

    /// Last published texels of `tier`, x fastest then y then z.
    pub fn published(&self, tier: NoiseTier) -> Option<&[[f32; 4]]> {
        let volume = &self.published[tier.index()];
        (volume.resolution > 0).then_some(volume.texels.as_slice())
    }

    pub fn published_resolution(&self, tier: NoiseTier) -> u32 {
        self.published[tier.index()].resolution
    }

    pub fn texel(&self, tier: NoiseTier, x: u32, y: u32, z: u32) -> Option<[f32; 4]> {
        let volume = &self.published[tier.index()];
        let n = volume.resolution;
        if x >= n || y >= n || z >= n {
            return None;
        }
        let index = (x + y * n + z * n * n) as usize;
        volume.texels.get(index).copied()
    }

    fn band_points(&self, band: WorleyBand, cells: u32) -> &[WorleyPoint] {
        let start = band.index() * MAX_NUM_POINTS;
        let len = (cells as usize).pow(3).min(MAX_NUM_POINTS);
        &self.points[start..start + len]
    }
}

impl PointBufferSink for CpuVolumeBackend {
    fn write_points(&mut self, byte_offset: u64, bytes: &[u8]) -> Result<()> {
        let arena: &mut [u8] = bytemuck::cast_slice_mut(&mut self.points);
        let start = byte_offset as usize;
        let end = start + bytes.len();
        if end as u64 > SharedPointBuffer::CAPACITY_BYTES {
            return Err(CloudscapeError::CapacityExceeded {
                requested: end / WorleyPoint::SIZE,
                capacity: 3 * MAX_NUM_POINTS,
            });
        }
        arena[start..end].copy_from_slice(bytes);
        Ok(())
    }
}

impl VolumeBackend for CpuVolumeBackend {
    fn dispatch_density(&mut self, dispatch: &DensityDispatch) -> Result<()> {
        let n = dispatch.resolution;
        if n == 0 {
            return Err(CloudscapeError::invalid("density volume resolution must be positive"));
        }
        let bands = WorleyBand::ALL.map(|band| self.band_points(band, dispatch.cells[band.index()]));
        let mut values = Vec::with_capacity((n as usize).pow(3));
        let inv = 1.0 / n as f32;
        for z in 0..n {
            for y in 0..n {
                for x in 0..n {
                    let p = [(x as f32 + 0.5) * inv, (y as f32 + 0.5) * inv, (z as f32 + 0.5) * inv];
                    values.push(layered_density(bands, dispatch.cells, dispatch.persistence, p));
                }
            }
        }

        let volume = &mut self.working[dispatch.tier.index()];
        volume.ensure_resolution(n);
        for (texel, value) in volume.texels.iter_mut().zip(values) {
            for (c, mask) in texel.iter_mut().zip(dispatch.channel_mask) {
                *c = *c * (1.0 - mask) + value * mask;
            }
        }
        self.dispatch_count += 1;
        Ok(())
    }

    fn publish_volume(&mut self, tier: NoiseTier) -> Result<()> {
        self.published[tier.index()] = self.working[tier.index()].clone();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dispatch(channel: usize, resolution: u32) -> DensityDispatch {
        DensityDispatch {
            tier: NoiseTier::Detail,
            channel,
            resolution,
            persistence: 0.5,
            cells: [1, 1, 1],
            channel_mask: DensityDispatch::mask_for(channel),
        }
    }

    fn centred_points(backend: &mut CpuVolumeBackend) {
        let point = WorleyPoint { position: [0.5, 0.5, 0.5, 1.0] };
        for band in WorleyBand::ALL {
            let offset = SharedPointBuffer::region_offset(band);
            backend.write_points(offset, bytemuck::bytes_of(&point)).unwrap();
        }
    }

    #[test]
    fn test_density_peaks_at_feature_points() {
        let point = [WorleyPoint { position: [0.5, 0.5, 0.5, 1.0] }];
        let bands: [&[WorleyPoint]; 3] = [&point, &point, &point];
        assert!((layered_density(bands, [1, 1, 1], 0.5, [0.5; 3]) - 1.0).abs() < 1e-6);
        let edge = layered_density(bands, [1, 1, 1], 0.5, [0.0, 0.5, 0.5]);
        assert!((edge - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_masked_dispatch_keeps_other_channels() {
        let mut backend = CpuVolumeBackend::new();
        centred_points(&mut backend);
        backend.dispatch_density(&dispatch(0, 4)).unwrap();
        backend.dispatch_density(&dispatch(2, 4)).unwrap();
        assert!(backend.published(NoiseTier::Detail).is_none());
        backend.publish_volume(NoiseTier::Detail).unwrap();

        let texel = backend.texel(NoiseTier::Detail, 1, 1, 1).unwrap();
        assert!(texel[0] > 0.0);
        assert_eq!(texel[0], texel[2]);
        assert_eq!(texel[1], 0.0);
        assert_eq!(texel[3], 0.0);
        assert_eq!(backend.dispatch_count(), 2);
    }

    #[test]
    fn test_unpublished_dispatch_is_invisible() {
        let mut backend = CpuVolumeBackend::new();
        centred_points(&mut backend);
        backend.dispatch_density(&dispatch(1, 2)).unwrap();
        backend.publish_volume(NoiseTier::Detail).unwrap();
        let before = backend.published(NoiseTier::Detail).unwrap().to_vec();

        backend.dispatch_density(&dispatch(3, 2)).unwrap();
        assert_eq!(backend.published(NoiseTier::Detail).unwrap(), before.as_slice());
    }

    #[test]
    fn test_arena_bounds() {
        let mut backend = CpuVolumeBackend::new();
        let result = backend.write_points(SharedPointBuffer::CAPACITY_BYTES - 8, &[0u8; 16]);
        assert!(matches!(result, Err(CloudscapeError::CapacityExceeded { .. })));
        assert_eq!(backend.point_bytes().len() as u64, SharedPointBuffer::CAPACITY_BYTES);
    }
}
