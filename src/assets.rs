use std::path::Path;

use image::RgbaImage;

use crate::error::{CloudscapeError, Result};

pub const SUN_GRADIENT_FILE: &str = "sun_gradient.png";
pub const NIGHT_SKY_FILE: &str = "night_sky.png";

/// Decoded sky textures: a horizontal gradient sampled by sun latitude and an
/// equirectangular night sky.
#[derive(Clone, Debug)]
pub struct SkyImages {
    /// First row of the gradient image, RGBA8.
    pub sun_gradient: Vec<[u8; 4]>,
    pub night_sky: RgbaImage,
}

impl SkyImages {
    pub fn from_bytes(sun_gradient: &[u8], night_sky: &[u8]) -> Result<Self> {
        let sun = decode(SUN_GRADIENT_FILE, sun_gradient)?;
        let night_sky = decode(NIGHT_SKY_FILE, night_sky)?;
        Ok(Self::from_images(&sun, night_sky))
    }

    pub fn from_images(sun_gradient: &RgbaImage, night_sky: RgbaImage) -> Self {
        let sun_gradient = (0..sun_gradient.width()).map(|x| sun_gradient.get_pixel(x, 0).0).collect();
        Self { sun_gradient, night_sky }
    }

    pub fn load_from_dir(dir: &Path) -> Result<Self> {
        let read = |name: &str| {
            let path = dir.join(name);
            std::fs::read(&path).map_err(|err| CloudscapeError::resource(format!("cannot read {}: {}", path.display(), err)))
        };
        let sky = Self::from_bytes(&read(SUN_GRADIENT_FILE)?, &read(NIGHT_SKY_FILE)?)?;
        log::info!(
            "loaded sky textures from {}: gradient {} texels, night sky {}x{}",
            dir.display(),
            sky.sun_gradient.len(),
            sky.night_sky.width(),
            sky.night_sky.height()
        );
        Ok(sky)
    }

    /// The copies shipped in `textures/`, baked into the binary.
    pub fn embedded() -> Result<Self> {
        Self::from_bytes(
            include_bytes!("../textures/sun_gradient.png"),
            include_bytes!("../textures/night_sky.png"),
        )
    }
}

fn decode(name: &str, bytes: &[u8]) -> Result<RgbaImage> {
    let image = image::load_from_memory(bytes)
        .map_err(|err| CloudscapeError::resource(format!("cannot decode {}: {}", name, err)))?;
    let image = image.to_rgba8();
    if image.width() == 0 || image.height() == 0 {
        return Err(CloudscapeError::resource(format!("{} is empty", name)));
    }
    Ok(image)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageOutputFormat, Rgba};
    use std::io::Cursor;

    fn png(image: &RgbaImage) -> Vec<u8> {
        let mut bytes = Cursor::new(Vec::new());
        image.write_to(&mut bytes, ImageOutputFormat::Png).unwrap();
        bytes.into_inner()
    }

    #[test]
    fn test_gradient_uses_first_row() {
        let mut sun = RgbaImage::new(3, 2);
        sun.put_pixel(1, 0, Rgba([10, 20, 30, 255]));
        sun.put_pixel(1, 1, Rgba([99, 99, 99, 255]));
        let night = RgbaImage::new(4, 2);

        let sky = SkyImages::from_bytes(&png(&sun), &png(&night)).unwrap();
        assert_eq!(sky.sun_gradient.len(), 3);
        assert_eq!(sky.sun_gradient[1], [10, 20, 30, 255]);
        assert_eq!(sky.night_sky.dimensions(), (4, 2));
    }

    #[test]
    fn test_undecodable_bytes_fail_initialization() {
        let night = png(&RgbaImage::new(1, 1));
        let result = SkyImages::from_bytes(b"not a png", &night);
        assert!(matches!(result, Err(CloudscapeError::ResourceInit(_))));
    }

    #[test]
    fn test_missing_directory_fails_initialization() {
        let result = SkyImages::load_from_dir(Path::new("/nonexistent/cloudscape-textures"));
        assert!(matches!(result, Err(CloudscapeError::ResourceInit(_))));
    }

    #[test]
    fn test_shipped_textures_decode() {
        let sky = SkyImages::embedded().unwrap();
        assert!(sky.sun_gradient.len() > 1);
        assert!(sky.night_sky.width() > 0);
    }
}
