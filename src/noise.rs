use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use crate::error::{CloudscapeError, Result};

/// Square lattice of heights, row-major, addressed with wrap-around.
#[derive(Clone, Debug, PartialEq)]
pub struct HeightField {
    size: usize,
    heights: Vec<f32>,
}

impl HeightField {
    pub fn from_heights(size: usize, heights: Vec<f32>) -> Result<Self> {
        if size == 0 {
            return Err(CloudscapeError::invalid("height field size must be positive"));
        }
        if heights.len() != size * size {
            return Err(CloudscapeError::invalid(format!(
                "height field of size {} needs {} samples, got {}",
                size,
                size * size,
                heights.len()
            )));
        }
        Ok(Self { size, heights })
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Toroidal index; any integer row/col maps inside the lattice.
    #[inline]
    pub fn index(&self, row: i64, col: i64) -> usize {
        let n = self.size as i64;
        (row.rem_euclid(n) * n + col.rem_euclid(n)) as usize
    }

    #[inline]
    pub fn height(&self, row: i64, col: i64) -> f32 {
        self.heights[self.index(row, col)]
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.heights
    }

    pub fn min_max(&self) -> (f32, f32) {
        self.heights
            .iter()
            .fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), &h| (lo.min(h), hi.max(h)))
    }
}

/// Most octaves a field may stack.
pub const MAX_OCTAVES: u32 = 16;

/// Gradients drawn per octave. Lattice corners pick one by hash, so memory
/// does not grow with the period.
const GRADIENT_TABLE_SIZE: usize = 256;

/// Octave periods stay below 2^48 cells with `MAX_OCTAVES`.
const MAX_BASE_PERIOD: u64 = 1 << 32;

/// splitmix64 finalizer.
#[inline]
fn mix(mut z: u64) -> u64 {
    z = (z ^ (z >> 30)).wrapping_mul(0xbf58_476d_1ce4_e5b9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94d0_49bb_1331_11eb);
    z ^ (z >> 31)
}

/// Unit gradients on a periodic lattice.
struct GradientLattice {
    period: i64,
    key: u64,
    gradients: [[f32; 2]; GRADIENT_TABLE_SIZE],
}

impl GradientLattice {
    fn new(period: u64, rng: &mut ChaCha8Rng) -> Self {
        let mut gradients = [[0.0; 2]; GRADIENT_TABLE_SIZE];
        for gradient in gradients.iter_mut() {
            let angle = rng.gen::<f32>() * std::f32::consts::TAU;
            *gradient = [angle.cos(), angle.sin()];
        }
        Self {
            period: period as i64,
            key: rng.gen(),
            gradients,
        }
    }

    #[inline]
    fn grad_dot(&self, ix: i64, iy: i64, dx: f32, dy: f32) -> f32 {
        let p = self.period;
        let (cx, cy) = (ix.rem_euclid(p) as u64, iy.rem_euclid(p) as u64);
        let hash = mix(mix(cx ^ self.key) ^ cy);
        let g = self.gradients[(hash % GRADIENT_TABLE_SIZE as u64) as usize];
        g[0] * dx + g[1] * dy
    }

    fn sample(&self, x: f32, y: f32) -> f32 {
        let x0 = x.floor();
        let y0 = y.floor();
        let fx = x - x0;
        let fy = y - y0;
        let (ix, iy) = (x0 as i64, y0 as i64);
        let (ix1, iy1) = (ix.wrapping_add(1), iy.wrapping_add(1));

        let n00 = self.grad_dot(ix, iy, fx, fy);
        let n10 = self.grad_dot(ix1, iy, fx - 1.0, fy);
        let n01 = self.grad_dot(ix, iy1, fx, fy - 1.0);
        let n11 = self.grad_dot(ix1, iy1, fx - 1.0, fy - 1.0);

        let u = fade(fx);
        let v = fade(fy);
        lerp(lerp(n00, n10, u), lerp(n01, n11, u), v)
    }
}

/// 6t^5 - 15t^4 + 10t^3
#[inline]
fn fade(t: f32) -> f32 {
    t * t * t * (t * (t * 6.0 - 15.0) + 10.0)
}

#[inline]
fn lerp(a: f32, b: f32, t: f32) -> f32 {
    a + t * (b - a)
}

/// Tileable gradient noise sampled on an integer lattice.
///
/// The gradient lattice repeats every `ceil(lattice_size / cell_size)` cells,
/// so the produced field is seamless whenever `cell_size` divides
/// `lattice_size`. Each octave doubles the frequency and keeps the field
/// periodic. Evaluation is a pure function of the configuration: calling it
/// twice yields identical fields.
#[derive(Clone, Debug, PartialEq)]
pub struct NoiseField2D {
    seed: u64,
    octaves: u32,
    persistence: f32,
    amplitude: f32,
}

impl NoiseField2D {
    pub fn new(seed: u64) -> Self {
        Self {
            seed,
            octaves: 1,
            persistence: 0.5,
            amplitude: 1.0,
        }
    }

    pub fn with_octaves(mut self, octaves: u32, persistence: f32) -> Self {
        self.octaves = octaves.max(1);
        self.persistence = persistence;
        self
    }

    pub fn with_amplitude(mut self, amplitude: f32) -> Self {
        self.amplitude = amplitude;
        self
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    pub fn evaluate(&self, cell_size: f32, lattice_size: usize) -> Result<HeightField> {
        if !(cell_size.is_finite() && cell_size > 0.0) {
            return Err(CloudscapeError::invalid(format!("cell size must be positive, got {}", cell_size)));
        }
        if lattice_size == 0 {
            return Err(CloudscapeError::invalid("lattice size must be positive"));
        }
        if self.octaves > MAX_OCTAVES {
            return Err(CloudscapeError::invalid(format!(
                "at most {} octaves are supported, got {}",
                MAX_OCTAVES, self.octaves
            )));
        }

        let base_period = ((lattice_size as f64 / cell_size as f64).ceil() as u64).clamp(1, MAX_BASE_PERIOD);
        let mut rng = ChaCha8Rng::seed_from_u64(self.seed);

        let mut octaves = Vec::with_capacity(self.octaves as usize);
        let mut weight = 1.0f32;
        let mut total_weight = 0.0f32;
        for octave in 0..self.octaves {
            rng.set_stream(octave as u64);
            let frequency = (1u64 << octave) as f32;
            let lattice = GradientLattice::new(base_period << octave, &mut rng);
            octaves.push((lattice, frequency, weight));
            total_weight += weight;
            weight *= self.persistence;
        }
        let scale = if total_weight.abs() > f32::EPSILON {
            self.amplitude / total_weight
        } else {
            0.0
        };

        let mut heights = Vec::with_capacity(lattice_size * lattice_size);
        for row in 0..lattice_size {
            for col in 0..lattice_size {
                let x = row as f32 / cell_size;
                let y = col as f32 / cell_size;
                let value: f32 = octaves
                    .iter()
                    .map(|(lattice, frequency, weight)| weight * lattice.sample(x * frequency, y * frequency))
                    .sum();
                heights.push(value * scale);
            }
        }

        log::debug!(
            "evaluated {}x{} noise field (cell size {}, {} octave(s), seed {})",
            lattice_size,
            lattice_size,
            cell_size,
            self.octaves,
            self.seed
        );
        HeightField::from_heights(lattice_size, heights)
    }
}
