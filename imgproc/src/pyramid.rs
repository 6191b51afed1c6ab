//! Planar f32 images and Gaussian/Laplacian pyramids.
//!
//! Multi-band blending decomposes each warped image into frequency bands and
//! merges low frequencies over a wide spatial extent and high frequencies
//! over a narrow one. The pyramids here use a separable 5-tap binomial
//! kernel for reduction and bilinear interpolation for expansion; the
//! Laplacian construction mirrors the expansion exactly, so collapsing a
//! pyramid reconstructs the input.

/// Single-channel float image.
#[derive(Debug, Clone)]
pub struct Plane {
    pub width: usize,
    pub height: usize,
    pub data: Vec<f32>,
}

impl Plane {
    pub fn new(width: usize, height: usize) -> Self {
        Self {
            width,
            height,
            data: vec![0.0; width * height],
        }
    }

    pub fn from_data(width: usize, height: usize, data: Vec<f32>) -> Self {
        debug_assert_eq!(data.len(), width * height);
        Self {
            width,
            height,
            data,
        }
    }

    #[inline]
    pub fn at(&self, x: usize, y: usize) -> f32 {
        self.data[y * self.width + x]
    }

    #[inline]
    pub fn set(&mut self, x: usize, y: usize, v: f32) {
        self.data[y * self.width + x] = v;
    }

    /// Clamped access for filter borders.
    #[inline]
    fn at_clamped(&self, x: isize, y: isize) -> f32 {
        let xi = x.clamp(0, self.width as isize - 1) as usize;
        let yi = y.clamp(0, self.height as isize - 1) as usize;
        self.data[yi * self.width + xi]
    }
}

const KERNEL: [f32; 5] = [1.0 / 16.0, 4.0 / 16.0, 6.0 / 16.0, 4.0 / 16.0, 1.0 / 16.0];

/// Separable binomial blur with clamped borders.
pub fn blur(src: &Plane) -> Plane {
    let mut tmp = Plane::new(src.width, src.height);
    for y in 0..src.height {
        for x in 0..src.width {
            let mut acc = 0.0;
            for (k, &w) in KERNEL.iter().enumerate() {
                acc += w * src.at_clamped(x as isize + k as isize - 2, y as isize);
            }
            tmp.set(x, y, acc);
        }
    }

    let mut dst = Plane::new(src.width, src.height);
    for y in 0..src.height {
        for x in 0..src.width {
            let mut acc = 0.0;
            for (k, &w) in KERNEL.iter().enumerate() {
                acc += w * tmp.at_clamped(x as isize, y as isize + k as isize - 2);
            }
            dst.set(x, y, acc);
        }
    }
    dst
}

/// Blur then decimate by two.
pub fn reduce(src: &Plane) -> Plane {
    let blurred = blur(src);
    let w = (src.width + 1) / 2;
    let h = (src.height + 1) / 2;
    let mut dst = Plane::new(w, h);
    for y in 0..h {
        for x in 0..w {
            dst.set(x, y, blurred.at((x * 2).min(src.width - 1), (y * 2).min(src.height - 1)));
        }
    }
    dst
}

/// Bilinear expansion to an explicit target size (handles odd dimensions).
pub fn expand(src: &Plane, width: usize, height: usize) -> Plane {
    let mut dst = Plane::new(width, height);
    if src.width == 0 || src.height == 0 {
        return dst;
    }
    let sx = src.width as f32 / width as f32;
    let sy = src.height as f32 / height as f32;

    for y in 0..height {
        let fy = ((y as f32 + 0.5) * sy - 0.5).max(0.0);
        let y0 = fy.floor() as usize;
        let y1 = (y0 + 1).min(src.height - 1);
        let wy = fy - y0 as f32;
        for x in 0..width {
            let fx = ((x as f32 + 0.5) * sx - 0.5).max(0.0);
            let x0 = fx.floor() as usize;
            let x1 = (x0 + 1).min(src.width - 1);
            let wx = fx - x0 as f32;

            let v0 = src.at(x0, y0) * (1.0 - wx) + src.at(x1, y0) * wx;
            let v1 = src.at(x0, y1) * (1.0 - wx) + src.at(x1, y1) * wx;
            dst.set(x, y, v0 * (1.0 - wy) + v1 * wy);
        }
    }
    dst
}

/// Successively reduced copies; `levels` includes the base level.
pub fn gaussian_pyramid(base: &Plane, levels: usize) -> Vec<Plane> {
    let mut pyr = Vec::with_capacity(levels);
    pyr.push(base.clone());
    for i in 1..levels {
        let prev = &pyr[i - 1];
        if prev.width < 2 || prev.height < 2 {
            break;
        }
        pyr.push(reduce(prev));
    }
    pyr
}

/// Band-pass decomposition: each level holds what the next coarser level
/// cannot represent; the last level is the coarse residual.
pub fn laplacian_pyramid(base: &Plane, levels: usize) -> Vec<Plane> {
    let gauss = gaussian_pyramid(base, levels);
    let mut lap = Vec::with_capacity(gauss.len());
    for i in 0..gauss.len() {
        if i + 1 < gauss.len() {
            let up = expand(&gauss[i + 1], gauss[i].width, gauss[i].height);
            let mut band = gauss[i].clone();
            for (b, u) in band.data.iter_mut().zip(up.data.iter()) {
                *b -= u;
            }
            lap.push(band);
        } else {
            lap.push(gauss[i].clone());
        }
    }
    lap
}

/// Invert `laplacian_pyramid`.
pub fn collapse(pyr: &[Plane]) -> Plane {
    let mut acc = pyr[pyr.len() - 1].clone();
    for i in (0..pyr.len() - 1).rev() {
        let up = expand(&acc, pyr[i].width, pyr[i].height);
        acc = pyr[i].clone();
        for (a, u) in acc.data.iter_mut().zip(up.data.iter()) {
            *a += u;
        }
    }
    acc
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gradient_plane(w: usize, h: usize) -> Plane {
        let mut p = Plane::new(w, h);
        for y in 0..h {
            for x in 0..w {
                p.set(x, y, (x * 3 + y * 7) as f32 % 97.0);
            }
        }
        p
    }

    #[test]
    fn collapse_inverts_laplacian_exactly() {
        let base = gradient_plane(37, 23);
        let pyr = laplacian_pyramid(&base, 4);
        let back = collapse(&pyr);

        assert_eq!(back.width, base.width);
        assert_eq!(back.height, base.height);
        for (a, b) in back.data.iter().zip(base.data.iter()) {
            assert!((a - b).abs() < 1e-3, "{a} vs {b}");
        }
    }

    #[test]
    fn reduce_halves_dimensions() {
        let base = gradient_plane(40, 30);
        let small = reduce(&base);
        assert_eq!(small.width, 20);
        assert_eq!(small.height, 15);
    }

    #[test]
    fn pyramid_stops_before_degenerate_levels() {
        let base = gradient_plane(8, 8);
        let pyr = gaussian_pyramid(&base, 10);
        assert!(pyr.len() <= 4);
        assert!(pyr.iter().all(|p| p.width >= 1 && p.height >= 1));
    }

    #[test]
    fn blur_preserves_constant_plane() {
        let mut p = Plane::new(16, 16);
        p.data.iter_mut().for_each(|v| *v = 42.0);
        let b = blur(&p);
        for v in &b.data {
            assert!((v - 42.0).abs() < 1e-4);
        }
    }
}
