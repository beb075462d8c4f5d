//! Camera frame and classifier result value types.

/// A captured camera frame in packed 8-bit RGB.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub width: u32,
    pub height: u32,
    /// `width * height * 3` bytes, row-major.
    pub rgb: Vec<u8>,
}

impl Frame {
    pub fn new(width: u32, height: u32, rgb: Vec<u8>) -> Self {
        Self { width, height, rgb }
    }

    /// A uniformly filled frame; handy for simulated sources.
    pub fn solid(width: u32, height: u32, px: [u8; 3]) -> Self {
        let n = (width as usize) * (height as usize);
        let mut rgb = Vec::with_capacity(n * 3);
        for _ in 0..n {
            rgb.extend_from_slice(&px);
        }
        Self { width, height, rgb }
    }

    /// Nearest-neighbour downscale so the frame is at most `max_width` wide,
    /// preserving aspect ratio. Frames already narrow enough (or `max_width == 0`)
    /// are returned unchanged.
    pub fn downscale(&self, max_width: u32) -> Frame {
        if max_width == 0 || self.width <= max_width || self.width == 0 {
            return self.clone();
        }
        let new_w = max_width;
        let new_h = ((u64::from(self.height) * u64::from(new_w)) / u64::from(self.width)).max(1) as u32;
        let mut rgb = Vec::with_capacity((new_w as usize) * (new_h as usize) * 3);
        for y in 0..new_h {
            let sy = (u64::from(y) * u64::from(self.height) / u64::from(new_h)) as usize;
            for x in 0..new_w {
                let sx = (u64::from(x) * u64::from(self.width) / u64::from(new_w)) as usize;
                let i = (sy * self.width as usize + sx) * 3;
                match self.rgb.get(i..i + 3) {
                    Some(px) => rgb.extend_from_slice(px),
                    None => rgb.extend_from_slice(&[0, 0, 0]),
                }
            }
        }
        Frame {
            width: new_w,
            height: new_h,
            rgb,
        }
    }
}

/// One classifier output: the best label in the frame and its confidence in [0, 1].
#[derive(Debug, Clone, PartialEq)]
pub struct Classification {
    pub label: String,
    pub confidence: f32,
}

impl Classification {
    pub fn new(label: impl Into<String>, confidence: f32) -> Self {
        Self {
            label: label.into(),
            confidence,
        }
    }
}
