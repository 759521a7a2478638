use std::ops::Range;

use crate::error::{CloudscapeError, Result};
use crate::worley::{WorleyBand, WorleyPoint, MAX_NUM_POINTS};

/// Destination of point uploads: a GPU buffer, or host memory standing in
/// for one.
pub trait PointBufferSink {
    /// Overwrites `bytes.len()` bytes starting at `byte_offset` and nothing else.
    fn write_points(&mut self, byte_offset: u64, bytes: &[u8]) -> Result<()>;
}

/// Layout of the buffer that carries the three Worley bands to the density
/// compute stage.
///
/// Every band owns a region sized for `MAX_NUM_POINTS` whatever its actual
/// density, so a band can be rewritten in place without touching its
/// neighbours or reallocating the buffer.
#[derive(Debug, Default, Clone)]
pub struct SharedPointBuffer {
    occupancy: [usize; 3],
}

impl SharedPointBuffer {
    pub const REGION_BYTES: u64 = (MAX_NUM_POINTS * WorleyPoint::SIZE) as u64;
    pub const CAPACITY_BYTES: u64 = 3 * Self::REGION_BYTES;

    pub fn new() -> Self {
        Self::default()
    }

    pub fn region_offset(band: WorleyBand) -> u64 {
        band.index() as u64 * Self::REGION_BYTES
    }

    /// Bytes touched when `len` points are written to `band`.
    pub fn region_range(band: WorleyBand, len: usize) -> Range<u64> {
        let start = Self::region_offset(band);
        start..start + (len * WorleyPoint::SIZE) as u64
    }

    pub fn write_region<S: PointBufferSink + ?Sized>(
        &mut self,
        sink: &mut S,
        band: WorleyBand,
        points: &[WorleyPoint],
    ) -> Result<Range<u64>> {
        if points.len() > MAX_NUM_POINTS {
            return Err(CloudscapeError::CapacityExceeded {
                requested: points.len(),
                capacity: MAX_NUM_POINTS,
            });
        }
        let range = Self::region_range(band, points.len());
        if !points.is_empty() {
            sink.write_points(range.start, bytemuck::cast_slice(points))?;
        }
        self.occupancy[band.index()] = points.len();
        Ok(range)
    }

    /// Points currently valid in `band`.
    pub fn occupancy(&self, band: WorleyBand) -> usize {
        self.occupancy[band.index()]
    }

    pub fn occupied_bytes(&self) -> u64 {
        self.occupancy.iter().map(|&n| (n * WorleyPoint::SIZE) as u64).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::worley::{WorleyPointSet, MAX_CELLS_PER_AXIS};
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    const SENTINEL: u8 = 0xAB;

    struct HostBuffer {
        bytes: Vec<u8>,
    }

    impl HostBuffer {
        fn new() -> Self {
            Self { bytes: vec![SENTINEL; SharedPointBuffer::CAPACITY_BYTES as usize] }
        }
    }

    impl PointBufferSink for HostBuffer {
        fn write_points(&mut self, byte_offset: u64, bytes: &[u8]) -> Result<()> {
            let start = byte_offset as usize;
            self.bytes[start..start + bytes.len()].copy_from_slice(bytes);
            Ok(())
        }
    }

    #[test]
    fn test_region_boundaries() {
        assert_eq!(SharedPointBuffer::region_offset(WorleyBand::Fine), 0);
        assert_eq!(SharedPointBuffer::region_offset(WorleyBand::Medium), 32768 * 16);
        assert_eq!(SharedPointBuffer::region_offset(WorleyBand::Coarse), 2 * 32768 * 16);
        assert_eq!(SharedPointBuffer::CAPACITY_BYTES, 3 * 32768 * 16);
    }

    #[test]
    fn test_partial_write_stays_inside_region() {
        let mut host = HostBuffer::new();
        let mut layout = SharedPointBuffer::new();
        let set = WorleyPointSet::generate(5, &mut ChaCha8Rng::seed_from_u64(2)).unwrap();

        let range = layout.write_region(&mut host, WorleyBand::Medium, set.points()).unwrap();
        let start = (MAX_NUM_POINTS * 16) as u64;
        assert_eq!(range, start..start + 125 * 16);

        for (i, byte) in host.bytes.iter().enumerate() {
            let inside = (range.start as usize..range.end as usize).contains(&i);
            if !inside {
                assert_eq!(*byte, SENTINEL, "byte {} outside the written range changed", i);
            }
        }
        assert_eq!(&host.bytes[range.start as usize..range.end as usize], set.as_bytes());
    }

    #[test]
    fn test_rewrite_leaves_neighbours_untouched() {
        let mut host = HostBuffer::new();
        let mut layout = SharedPointBuffer::new();
        let mut rng = ChaCha8Rng::seed_from_u64(4);
        let fine = WorleyPointSet::generate(8, &mut rng).unwrap();
        let coarse = WorleyPointSet::generate(2, &mut rng).unwrap();
        layout.write_region(&mut host, WorleyBand::Fine, fine.points()).unwrap();
        layout.write_region(&mut host, WorleyBand::Coarse, coarse.points()).unwrap();

        let smaller = WorleyPointSet::generate(3, &mut rng).unwrap();
        layout.write_region(&mut host, WorleyBand::Fine, smaller.points()).unwrap();

        assert_eq!(&host.bytes[..27 * 16], smaller.as_bytes());
        // stale tail of the old fine set is simply past the occupancy mark
        assert_eq!(&host.bytes[27 * 16..512 * 16], &fine.as_bytes()[27 * 16..]);
        let coarse_start = SharedPointBuffer::region_offset(WorleyBand::Coarse) as usize;
        assert_eq!(&host.bytes[coarse_start..coarse_start + 8 * 16], coarse.as_bytes());
        assert_eq!(layout.occupancy(WorleyBand::Fine), 27);
    }

    #[test]
    fn test_full_occupancy_fits_exactly() {
        let mut host = HostBuffer::new();
        let mut layout = SharedPointBuffer::new();
        let mut rng = ChaCha8Rng::seed_from_u64(8);
        for band in WorleyBand::ALL {
            let set = WorleyPointSet::generate(MAX_CELLS_PER_AXIS, &mut rng).unwrap();
            layout.write_region(&mut host, band, set.points()).unwrap();
        }
        assert_eq!(layout.occupied_bytes(), 1_572_864);
        assert_eq!(layout.occupied_bytes(), SharedPointBuffer::CAPACITY_BYTES);
        assert!(host.bytes.len() as u64 == SharedPointBuffer::CAPACITY_BYTES);
    }

    #[test]
    fn test_oversized_set_is_rejected() {
        let mut host = HostBuffer::new();
        let mut layout = SharedPointBuffer::new();
        let too_many = vec![WorleyPoint::default(); MAX_NUM_POINTS + 1];
        let result = layout.write_region(&mut host, WorleyBand::Fine, &too_many);
        assert!(matches!(result, Err(CloudscapeError::CapacityExceeded { .. })));
        assert!(host.bytes.iter().all(|&b| b == SENTINEL));
    }
}
