//! Binary foreground masks and square-kernel morphology.

/// Per-pixel foreground flags for one frame, row-major.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForegroundMask {
    width: u32,
    height: u32,
    bits: Vec<bool>,
}

impl ForegroundMask {
    /// All-background mask.
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            bits: vec![false; (width * height) as usize],
        }
    }

    pub fn from_bits(width: u32, height: u32, bits: Vec<bool>) -> Option<Self> {
        (bits.len() == (width * height) as usize).then_some(Self {
            width,
            height,
            bits,
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    #[inline]
    pub fn get(&self, x: u32, y: u32) -> bool {
        self.bits[(y * self.width + x) as usize]
    }

    #[inline]
    pub fn set(&mut self, x: u32, y: u32, value: bool) {
        self.bits[(y * self.width + x) as usize] = value;
    }

    pub fn bits(&self) -> &[bool] {
        &self.bits
    }

    /// Number of foreground pixels.
    pub fn count(&self) -> usize {
        self.bits.iter().filter(|b| **b).count()
    }

    /// Erosion then dilation: removes specks smaller than the kernel.
    pub fn open(&self, radius: u32) -> Self {
        self.erode(radius).dilate(radius)
    }

    /// Dilation then erosion: fills holes and joins nearby fragments.
    pub fn close(&self, radius: u32) -> Self {
        self.dilate(radius).erode(radius)
    }

    /// A pixel stays set only if every in-frame pixel of its
    /// `(2r+1)²` neighbourhood is set.
    pub fn erode(&self, radius: u32) -> Self {
        self.separable(radius, true)
    }

    /// A pixel becomes set if any in-frame pixel of its neighbourhood is set.
    pub fn dilate(&self, radius: u32) -> Self {
        self.separable(radius, false)
    }

    // A square kernel factors into a horizontal and a vertical pass.
    fn separable(&self, radius: u32, erode: bool) -> Self {
        if radius == 0 || self.bits.is_empty() {
            return self.clone();
        }
        let (w, h, r) = (self.width as i64, self.height as i64, radius as i64);
        let reduce = |acc: bool, v: bool| if erode { acc && v } else { acc || v };

        let mut horizontal = vec![false; self.bits.len()];
        for y in 0..h {
            for x in 0..w {
                let mut acc = erode;
                for nx in (x - r).max(0)..=(x + r).min(w - 1) {
                    acc = reduce(acc, self.bits[(y * w + nx) as usize]);
                }
                horizontal[(y * w + x) as usize] = acc;
            }
        }

        let mut out = vec![false; self.bits.len()];
        for y in 0..h {
            for x in 0..w {
                let mut acc = erode;
                for ny in (y - r).max(0)..=(y + r).min(h - 1) {
                    acc = reduce(acc, horizontal[(ny * w + x) as usize]);
                }
                out[(y * w + x) as usize] = acc;
            }
        }

        Self {
            width: self.width,
            height: self.height,
            bits: out,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn filled(width: u32, height: u32, rect: (u32, u32, u32, u32)) -> ForegroundMask {
        let mut mask = ForegroundMask::new(width, height);
        let (x0, y0, x1, y1) = rect;
        for y in y0..y1 {
            for x in x0..x1 {
                mask.set(x, y, true);
            }
        }
        mask
    }

    #[test]
    fn test_open_removes_isolated_pixel() {
        let mut mask = filled(20, 20, (5, 5, 12, 12));
        mask.set(17, 2, true);

        let opened = mask.open(1);
        assert!(!opened.get(17, 2));
        assert_eq!(opened.count(), 49);
    }

    #[test]
    fn test_close_fills_single_pixel_hole() {
        let mut mask = filled(20, 20, (5, 5, 12, 12));
        mask.set(8, 8, false);

        let closed = mask.close(1);
        assert!(closed.get(8, 8));
        assert_eq!(closed.count(), 49);
    }

    #[test]
    fn test_zero_radius_is_identity() {
        let mask = filled(8, 8, (1, 1, 3, 3));
        assert_eq!(mask.open(0), mask);
    }
}
