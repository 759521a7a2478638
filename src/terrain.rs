use cgmath::{InnerSpace, Vector3, Zero};

use crate::error::{CloudscapeError, Result};
use crate::noise::{HeightField, NoiseField2D, MAX_OCTAVES};

pub type Rgb = [f32; 3];

/// Counter-clockwise ring around a lattice vertex, as (row, col) offsets.
const NEIGHBOR_RING: [(i64, i64); 8] = [
    (-1, -1),
    (0, -1),
    (1, -1),
    (1, 0),
    (1, 1),
    (0, 1),
    (-1, 1),
    (-1, 0),
];

/// Height to color mapping over three thresholds `t1 < t2 < t3`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ColorBanding {
    pub thresholds: [f32; 3],
    pub base: Rgb,
    pub mid: Rgb,
    pub top: Rgb,
}

impl Default for ColorBanding {
    fn default() -> Self {
        Self {
            thresholds: [-0.12, -0.1, 0.006],
            base: [0.199, 0.328, 0.238],
            mid: [0.473, 0.703, 0.562],
            top: [1.0, 1.0, 1.0],
        }
    }
}

fn lerp_rgb(a: Rgb, b: Rgb, t: f32) -> Rgb {
    [
        a[0] * (1.0 - t) + b[0] * t,
        a[1] * (1.0 - t) + b[1] * t,
        a[2] * (1.0 - t) + b[2] * t,
    ]
}

impl ColorBanding {
    pub fn validate(&self) -> Result<()> {
        let [t1, t2, t3] = self.thresholds;
        if !(t1 < t2 && t2 < t3) {
            return Err(CloudscapeError::invalid(format!(
                "color thresholds must be strictly increasing, got {:?}",
                self.thresholds
            )));
        }
        Ok(())
    }

    pub fn color_at(&self, height: f32) -> Rgb {
        let [t1, t2, t3] = self.thresholds;
        if height < t1 {
            self.base
        } else if height < t2 {
            lerp_rgb(self.base, self.mid, (height - t1) / (t2 - t1))
        } else if height < t3 {
            lerp_rgb(self.mid, self.top, (height - t2) / (t3 - t2))
        } else {
            self.top
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct TerrainSettings {
    pub noise_map_size: usize,
    pub cell_size: f32,
    pub x_scale: u32,
    pub y_scale: u32,
    pub seed: u64,
    pub octaves: u32,
    pub persistence: f32,
    pub amplitude: f32,
    pub banding: ColorBanding,
}

impl Default for TerrainSettings {
    fn default() -> Self {
        Self {
            noise_map_size: 200,
            cell_size: 25.0,
            x_scale: 5,
            y_scale: 2,
            seed: 1337,
            octaves: 4,
            persistence: 0.5,
            amplitude: 0.3,
            banding: ColorBanding::default(),
        }
    }
}

impl TerrainSettings {
    pub fn validate(&self) -> Result<()> {
        if self.noise_map_size == 0 {
            return Err(CloudscapeError::invalid("noise map size must be positive"));
        }
        if self.x_scale == 0 || self.y_scale == 0 {
            return Err(CloudscapeError::invalid(format!(
                "terrain scales must be at least 1, got {}x{}",
                self.x_scale, self.y_scale
            )));
        }
        if self.octaves > MAX_OCTAVES {
            return Err(CloudscapeError::invalid(format!(
                "terrain noise supports at most {} octaves, got {}",
                MAX_OCTAVES, self.octaves
            )));
        }
        self.banding.validate()
    }

    pub fn noise(&self) -> NoiseField2D {
        NoiseField2D::new(self.seed)
            .with_octaves(self.octaves, self.persistence)
            .with_amplitude(self.amplitude)
    }

    /// Number of vertices the generator emits, and the terrain pass draws.
    pub fn vertex_count(&self) -> usize {
        let n = self.noise_map_size;
        self.x_scale as usize * n * self.y_scale as usize * n * 6
    }
}

/// Everything the terrain pass needs, generated for one configuration.
#[derive(Clone, Debug)]
pub struct TerrainMesh {
    heights: HeightField,
    x_scale: u32,
    y_scale: u32,
    /// Lattice coordinates scaled by `1 / N`, six per cell.
    positions: Vec<[f32; 2]>,
    normals: Vec<[f32; 3]>,
    colors: Vec<[f32; 3]>,
}

impl TerrainMesh {
    pub fn lattice_size(&self) -> usize {
        self.heights.size()
    }

    pub fn scales(&self) -> (u32, u32) {
        (self.x_scale, self.y_scale)
    }

    pub fn heights(&self) -> &HeightField {
        &self.heights
    }

    pub fn positions(&self) -> &[[f32; 2]] {
        &self.positions
    }

    pub fn normals(&self) -> &[[f32; 3]] {
        &self.normals
    }

    pub fn colors(&self) -> &[[f32; 3]] {
        &self.colors
    }

    pub fn vertex_count(&self) -> u32 {
        self.positions.len() as u32
    }

    /// Position of lattice vertex (row, col) with its toroidal height.
    pub fn position(&self, row: i64, col: i64) -> Vector3<f32> {
        lattice_position(&self.heights, row, col)
    }
}

fn lattice_position(heights: &HeightField, row: i64, col: i64) -> Vector3<f32> {
    let n = heights.size() as f32;
    Vector3::new(row as f32 / n, col as f32 / n, heights.height(row, col))
}

/// Sum of ring cross products around (row, col), normalized.
///
/// Returns the zero vector when the sum degenerates.
pub fn vertex_normal(heights: &HeightField, row: i64, col: i64) -> Vector3<f32> {
    let center = lattice_position(heights, row, col);
    let mut normal = Vector3::zero();
    for i in 0..NEIGHBOR_RING.len() {
        let (r1, c1) = NEIGHBOR_RING[i];
        let (r2, c2) = NEIGHBOR_RING[(i + 1) % NEIGHBOR_RING.len()];
        let n1 = lattice_position(heights, row + r1, col + c1);
        let n2 = lattice_position(heights, row + r2, col + c2);
        normal += (n1 - center).cross(n2 - center);
    }
    let len2 = normal.magnitude2();
    if len2 > f32::EPSILON * f32::EPSILON && len2.is_finite() {
        normal / len2.sqrt()
    } else {
        Vector3::zero()
    }
}

/// Owns the mesh derived from the current terrain configuration.
pub struct TerrainMeshGenerator {
    settings: TerrainSettings,
    mesh: Option<TerrainMesh>,
}

impl TerrainMeshGenerator {
    pub fn new(settings: TerrainSettings) -> Self {
        Self { settings, mesh: None }
    }

    pub fn settings(&self) -> &TerrainSettings {
        &self.settings
    }

    /// Replaces the configuration. The current mesh stays until the next
    /// `regenerate`.
    pub fn set_settings(&mut self, settings: TerrainSettings) {
        self.settings = settings;
    }

    pub fn mesh(&self) -> Option<&TerrainMesh> {
        self.mesh.as_ref()
    }

    pub fn regenerate(&mut self) -> Result<&TerrainMesh> {
        let mesh = Self::generate(&self.settings)?;
        Ok(self.mesh.insert(mesh))
    }

    pub fn generate(settings: &TerrainSettings) -> Result<TerrainMesh> {
        settings.validate()?;
        let heights = settings
            .noise()
            .evaluate(settings.cell_size, settings.noise_map_size)?;
        Ok(Self::build_mesh(heights, settings.x_scale, settings.y_scale, &settings.banding))
    }

    pub fn build_mesh(heights: HeightField, x_scale: u32, y_scale: u32, banding: &ColorBanding) -> TerrainMesh {
        let n = heights.size();
        let rows = x_scale as usize * n;
        let cols = y_scale as usize * n;

        let mut positions = Vec::with_capacity(rows * cols * 6);
        let mut normals = Vec::with_capacity(n * n);
        let mut colors = Vec::with_capacity(n * n);

        for x in 0..rows as i64 {
            for z in 0..cols as i64 {
                let p1 = lattice_position(&heights, x, z);
                let p2 = lattice_position(&heights, x + 1, z);
                let p3 = lattice_position(&heights, x + 1, z + 1);
                let p4 = lattice_position(&heights, x, z + 1);

                for p in [p3, p2, p1, p4, p3, p1] {
                    positions.push([p.x, p.y]);
                }

                if (x as usize) < n && (z as usize) < n {
                    let normal = vertex_normal(&heights, x, z);
                    normals.push([normal.x, normal.y, normal.z]);
                    colors.push(banding.color_at(p1.z));
                }
            }
        }

        log::info!(
            "generated terrain mesh: {} vertices over a {}x{} lattice tiled {}x{}",
            positions.len(),
            n,
            n,
            x_scale,
            y_scale
        );

        TerrainMesh {
            heights,
            x_scale,
            y_scale,
            positions,
            normals,
            colors,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn flat(size: usize) -> HeightField {
        HeightField::from_heights(size, vec![0.0; size * size]).unwrap()
    }

    #[test]
    fn test_end_to_end_counts() {
        let settings = TerrainSettings {
            noise_map_size: 200,
            cell_size: 25.0,
            x_scale: 5,
            y_scale: 2,
            octaves: 1,
            ..Default::default()
        };
        let mesh = TerrainMeshGenerator::generate(&settings).unwrap();
        assert_eq!(mesh.positions().len(), 200 * 5 * 200 * 2 * 6);
        assert_eq!(mesh.positions().len(), 1_200_000);
        assert_eq!(mesh.vertex_count() as usize, settings.vertex_count());
        assert_eq!(mesh.normals().len(), 200 * 200);
        assert_eq!(mesh.colors().len(), 200 * 200);
    }

    #[test]
    fn test_flat_field_normals_point_up() {
        let mesh = TerrainMeshGenerator::build_mesh(flat(8), 1, 1, &ColorBanding::default());
        for normal in mesh.normals() {
            assert!((normal[0]).abs() < 1e-6);
            assert!((normal[1]).abs() < 1e-6);
            assert!((normal[2] - 1.0).abs() < 1e-6);
        }
    }

    #[test]
    fn test_normals_are_unit_or_zero() {
        let settings = TerrainSettings {
            noise_map_size: 32,
            cell_size: 8.0,
            x_scale: 1,
            y_scale: 1,
            ..Default::default()
        };
        let mesh = TerrainMeshGenerator::generate(&settings).unwrap();
        for n in mesh.normals() {
            let len = (n[0] * n[0] + n[1] * n[1] + n[2] * n[2]).sqrt();
            assert!(n.iter().all(|c| c.is_finite()));
            assert!((len - 1.0).abs() < 1e-4 || len == 0.0);
        }
    }

    #[test]
    fn test_degenerate_normal_is_zero() {
        // NaN heights poison the ring sum.
        let field = HeightField::from_heights(2, vec![f32::NAN; 4]).unwrap();
        let n = vertex_normal(&field, 0, 0);
        assert_eq!(n, Vector3::zero());
    }

    #[test]
    fn test_triangles_share_winding() {
        let mesh = TerrainMeshGenerator::build_mesh(flat(4), 1, 1, &ColorBanding::default());
        for tri in mesh.positions().chunks(3) {
            let (a, b, c) = (tri[0], tri[1], tri[2]);
            let signed = (b[0] - a[0]) * (c[1] - a[1]) - (b[1] - a[1]) * (c[0] - a[0]);
            assert!(signed < 0.0);
        }
    }

    #[test]
    fn test_positions_follow_lattice() {
        let mesh = TerrainMeshGenerator::build_mesh(flat(4), 2, 1, &ColorBanding::default());
        // first cell: p3, p2, p1, p4, p3, p1
        assert_eq!(&mesh.positions()[..6], &[
            [0.25, 0.25], [0.25, 0.0], [0.0, 0.0],
            [0.0, 0.25], [0.25, 0.25], [0.0, 0.0],
        ]);
        let last = mesh.positions()[mesh.positions().len() - 6];
        assert_eq!(last, [2.0, 1.0]);
    }

    #[test]
    fn test_banding_continuity() {
        let banding = ColorBanding::default();
        let [t1, t2, t3] = banding.thresholds;
        let eps = 1e-5;
        for t in [t1, t2, t3] {
            let below = banding.color_at(t - eps);
            let above = banding.color_at(t + eps);
            for i in 0..3 {
                assert!((below[i] - above[i]).abs() < 2e-3, "jump at {}", t);
            }
        }
        assert_eq!(banding.color_at(-1.0), banding.base);
        assert_eq!(banding.color_at(t2), banding.mid);
        assert_eq!(banding.color_at(t3), banding.top);
        assert_eq!(banding.color_at(5.0), banding.top);
    }

    #[test]
    fn test_banding_rejects_unordered_thresholds() {
        let banding = ColorBanding {
            thresholds: [0.1, 0.0, 0.2],
            ..Default::default()
        };
        assert!(banding.validate().is_err());
        let settings = TerrainSettings { x_scale: 0, ..Default::default() };
        assert!(TerrainMeshGenerator::generate(&settings).is_err());
    }

    #[test]
    fn test_octave_count_is_bounded() {
        let settings = TerrainSettings { octaves: 40, ..Default::default() };
        assert!(matches!(settings.validate(), Err(CloudscapeError::InvalidParameter(_))));
        assert!(matches!(
            TerrainMeshGenerator::generate(&settings),
            Err(CloudscapeError::InvalidParameter(_))
        ));

        let settings = TerrainSettings {
            noise_map_size: 8,
            cell_size: 0.001,
            x_scale: 1,
            y_scale: 1,
            octaves: MAX_OCTAVES,
            ..Default::default()
        };
        let mesh = TerrainMeshGenerator::generate(&settings).unwrap();
        assert!(mesh.heights().as_slice().iter().all(|h| h.is_finite()));
    }

    #[test]
    fn test_generator_keeps_mesh() {
        let mut generator = TerrainMeshGenerator::new(TerrainSettings {
            noise_map_size: 16,
            cell_size: 4.0,
            x_scale: 1,
            y_scale: 1,
            ..Default::default()
        });
        assert!(generator.mesh().is_none());
        let count = generator.regenerate().unwrap().vertex_count();
        assert_eq!(count, 16 * 16 * 6);
        assert_eq!(generator.mesh().unwrap().vertex_count(), count);
    }
}
