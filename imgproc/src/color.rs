use image::{GrayImage, RgbImage};
use rayon::prelude::*;

/// RGB to single-channel luma, BT.601 weights.
pub fn rgb_to_gray(rgb: &RgbImage) -> GrayImage {
    let (w, h) = rgb.dimensions();
    let rgb_data = rgb.as_raw();
    let mut gray_data = vec![0u8; (w * h) as usize];

    gray_data
        .par_iter_mut()
        .zip(rgb_data.par_chunks(3))
        .for_each(|(g, px)| {
            let luma = 0.299 * px[0] as f32 + 0.587 * px[1] as f32 + 0.114 * px[2] as f32;
            *g = luma.round().clamp(0.0, 255.0) as u8;
        });

    GrayImage::from_raw(w, h, gray_data).expect("buffer sized to dimensions")
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    #[test]
    fn gray_of_pure_channels() {
        let mut img = RgbImage::new(3, 1);
        img.put_pixel(0, 0, Rgb([255, 0, 0]));
        img.put_pixel(1, 0, Rgb([0, 255, 0]));
        img.put_pixel(2, 0, Rgb([0, 0, 255]));

        let gray = rgb_to_gray(&img);
        assert_eq!(gray.get_pixel(0, 0)[0], 76);
        assert_eq!(gray.get_pixel(1, 0)[0], 150);
        assert_eq!(gray.get_pixel(2, 0)[0], 29);
    }

    #[test]
    fn white_stays_white() {
        let img = RgbImage::from_pixel(4, 4, Rgb([255, 255, 255]));
        let gray = rgb_to_gray(&img);
        assert!(gray.pixels().all(|p| p[0] == 255));
    }
}
