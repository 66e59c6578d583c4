//! Detector frame (spec §3). Transient: allocated before acquisition,
//! handed to the imaging pipeline, released once the consumer copies or
//! forwards it.

#[derive(Debug, Clone)]
pub struct Frame {
    pub sequence: u64,
    pub timestamp_us: u64,
    pub width: u32,
    pub height: u32,
    pub bit_depth: u8,
    /// Row-major, native byte order, 16-bit grayscale samples.
    pub pixels: Vec<u16>,
    pub session_id: u64,
}

impl Frame {
    pub fn new(sequence: u64, timestamp_us: u64, width: u32, height: u32, session_id: u64) -> Self {
        Self {
            sequence,
            timestamp_us,
            width,
            height,
            bit_depth: 16,
            pixels: vec![0u16; (width as usize) * (height as usize)],
            session_id,
        }
    }

    pub fn pixel_count(&self) -> usize {
        self.width as usize * self.height as usize
    }

    /// Stage-validation helper: non-empty, dimensions consistent with the
    /// pixel buffer length, 16-bit depth (spec §4.8 contract).
    pub fn is_well_formed(&self) -> bool {
        self.bit_depth == 16 && self.pixel_count() == self.pixels.len() && self.pixel_count() > 0
    }
}
