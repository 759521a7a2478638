use bytemuck::{Pod, Zeroable};
use rand::Rng;

use crate::error::{CloudscapeError, Result};

/// Densest lattice the shared point buffer has room for.
pub const MAX_CELLS_PER_AXIS: u32 = 32;
pub const MAX_NUM_POINTS: usize =
    (MAX_CELLS_PER_AXIS * MAX_CELLS_PER_AXIS * MAX_CELLS_PER_AXIS) as usize;

/// Feature point as uploaded to the GPU: `xyz` in [0,1]^3, `w` is 1.
#[repr(C)]
#[derive(Default, Copy, Clone, Debug, PartialEq, Pod, Zeroable)]
pub struct WorleyPoint {
    pub position: [f32; 4],
}

impl WorleyPoint {
    pub const SIZE: usize = std::mem::size_of::<WorleyPoint>();

    pub fn xyz(&self) -> [f32; 3] {
        [self.position[0], self.position[1], self.position[2]]
    }
}

/// Frequency band of a Worley layer. The discriminant is the band's region
/// in the shared point buffer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum WorleyBand {
    Fine = 0,
    Medium = 1,
    Coarse = 2,
}

impl WorleyBand {
    pub const ALL: [WorleyBand; 3] = [WorleyBand::Fine, WorleyBand::Medium, WorleyBand::Coarse];

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn label(self) -> &'static str {
        match self {
            WorleyBand::Fine => "fine",
            WorleyBand::Medium => "medium",
            WorleyBand::Coarse => "coarse",
        }
    }
}

/// One jittered feature point per cell of a `k x k x k` lattice.
#[derive(Clone, Debug, PartialEq)]
pub struct WorleyPointSet {
    cells_per_axis: u32,
    points: Vec<WorleyPoint>,
}

impl WorleyPointSet {
    /// Points are stored x fastest, then y, then z.
    pub fn generate<R: Rng + ?Sized>(cells_per_axis: u32, rng: &mut R) -> Result<Self> {
        if cells_per_axis > MAX_CELLS_PER_AXIS {
            return Err(CloudscapeError::invalid(format!(
                "{} cells per axis exceeds the supported maximum of {}",
                cells_per_axis, MAX_CELLS_PER_AXIS
            )));
        }

        let k = cells_per_axis as usize;
        let cell_size = 1.0 / cells_per_axis.max(1) as f32;
        let mut points = Vec::with_capacity(k * k * k);
        for z in 0..k {
            for y in 0..k {
                for x in 0..k {
                    let jitter: [f32; 3] = [rng.gen(), rng.gen(), rng.gen()];
                    points.push(WorleyPoint {
                        position: [
                            ((x as f32 + jitter[0]) * cell_size).min(1.0),
                            ((y as f32 + jitter[1]) * cell_size).min(1.0),
                            ((z as f32 + jitter[2]) * cell_size).min(1.0),
                            1.0,
                        ],
                    });
                }
            }
        }

        Ok(Self { cells_per_axis, points })
    }

    pub fn cells_per_axis(&self) -> u32 {
        self.cells_per_axis
    }

    pub fn points(&self) -> &[WorleyPoint] {
        &self.points
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn as_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.points)
    }
}

/// Distance from `p` to the nearest feature point of a tiled lattice,
/// scaled by the cell count and clamped to 1.
///
/// `points` holds `cells_per_axis^3` points laid out like
/// [`WorleyPointSet::generate`]. The search covers the 27 cells around `p`
/// and wraps at the unit cube faces, so the result tiles.
pub fn nearest_feature_distance(points: &[WorleyPoint], cells_per_axis: u32, p: [f32; 3]) -> f32 {
    if cells_per_axis == 0 || points.is_empty() {
        return 1.0;
    }
    let k = cells_per_axis as i32;
    let kf = cells_per_axis as f32;
    let cell = p.map(|c| ((c * kf).floor() as i32).clamp(0, k - 1));

    let mut min_dist2 = f32::MAX;
    for dz in -1..=1 {
        for dy in -1..=1 {
            for dx in -1..=1 {
                let neighbor = [cell[0] + dx, cell[1] + dy, cell[2] + dz];
                let wrapped = neighbor.map(|c| c.rem_euclid(k));
                let index = (wrapped[0] + wrapped[1] * k + wrapped[2] * k * k) as usize;
                let Some(point) = points.get(index) else {
                    continue;
                };
                let mut d2 = 0.0;
                for axis in 0..3 {
                    let shift = (neighbor[axis] - wrapped[axis]) as f32 / kf;
                    let d = p[axis] - (point.position[axis] + shift);
                    d2 += d * d;
                }
                min_dist2 = min_dist2.min(d2);
            }
        }
    }
    (min_dist2.sqrt() * kf).min(1.0)
}
