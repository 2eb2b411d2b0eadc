use crate::error::{TexflowError, TexflowResult};

/// A host-side rectangular array of `f32` values, stored row-major with
/// `channels` consecutive floats per texel.
///
/// This is the value that crosses the host/device boundary: it is consumed
/// when uploading into a [`crate::RenderTargetSet`] attachment and produced
/// again by readback. Width, height and channel count are fixed at
/// construction.
#[derive(Clone, Debug, PartialEq)]
pub struct NumericGrid {
    width: u32,
    height: u32,
    channels: u32,
    data: Vec<f32>,
}

impl NumericGrid {
    /// A grid filled with zeros.
    pub fn zeroed(width: u32, height: u32, channels: u32) -> TexflowResult<Self> {
        let len = checked_len(width, height, channels)?;
        Ok(Self {
            width,
            height,
            channels,
            data: vec![0.0; len],
        })
    }

    /// Wrap an existing row-major vector. The vector length must be exactly
    /// `width * height * channels`.
    pub fn from_vec(width: u32, height: u32, channels: u32, data: Vec<f32>) -> TexflowResult<Self> {
        let len = checked_len(width, height, channels)?;
        if data.len() != len {
            return Err(TexflowError::attachment(format!(
                "grid data length {} does not match {width}x{height}x{channels}",
                data.len()
            )));
        }
        Ok(Self {
            width,
            height,
            channels,
            data,
        })
    }

    /// Build a grid by evaluating `f(x, y, channel)` at every element.
    pub fn from_fn(
        width: u32,
        height: u32,
        channels: u32,
        mut f: impl FnMut(u32, u32, u32) -> f32,
    ) -> TexflowResult<Self> {
        let len = checked_len(width, height, channels)?;
        let mut data = Vec::with_capacity(len);
        for y in 0..height {
            for x in 0..width {
                for c in 0..channels {
                    data.push(f(x, y, c));
                }
            }
        }
        Ok(Self {
            width,
            height,
            channels,
            data,
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn channels(&self) -> u32 {
        self.channels
    }

    /// Number of texels (`width * height`).
    pub fn texel_count(&self) -> usize {
        (self.width as usize) * (self.height as usize)
    }

    /// Number of floats (`width * height * channels`).
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn get(&self, x: u32, y: u32, channel: u32) -> f32 {
        self.data[self.index(x, y, channel)]
    }

    pub fn set(&mut self, x: u32, y: u32, channel: u32, value: f32) {
        let i = self.index(x, y, channel);
        self.data[i] = value;
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.data
    }

    pub fn as_mut_slice(&mut self) -> &mut [f32] {
        &mut self.data
    }

    pub fn into_vec(self) -> Vec<f32> {
        self.data
    }

    /// The largest element, scanning every channel. Reference implementation
    /// for the reduce pipeline.
    pub fn max_value(&self) -> f32 {
        self.data.iter().copied().fold(f32::NEG_INFINITY, f32::max)
    }

    fn index(&self, x: u32, y: u32, channel: u32) -> usize {
        debug_assert!(x < self.width && y < self.height && channel < self.channels);
        ((y as usize * self.width as usize + x as usize) * self.channels as usize)
            + channel as usize
    }
}

fn checked_len(width: u32, height: u32, channels: u32) -> TexflowResult<usize> {
    if width == 0 || height == 0 {
        return Err(TexflowError::allocation(format!(
            "grid dimensions must be positive, got {width}x{height}"
        )));
    }
    if channels != 1 && channels != 4 {
        return Err(TexflowError::allocation(format!(
            "grids carry 1 or 4 channels per texel, got {channels}"
        )));
    }
    (width as usize)
        .checked_mul(height as usize)
        .and_then(|n| n.checked_mul(channels as usize))
        .ok_or_else(|| TexflowError::allocation("grid size overflow"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn row_major_layout() {
        let mut g = NumericGrid::zeroed(3, 2, 1).unwrap();
        g.set(2, 0, 0, 5.0);
        g.set(0, 1, 0, 7.0);
        assert_eq!(g.as_slice(), &[0.0, 0.0, 5.0, 7.0, 0.0, 0.0]);
        assert_eq!(g.get(2, 0, 0), 5.0);
        assert_eq!(g.get(0, 1, 0), 7.0);
    }

    #[test]
    fn channel_interleaving() {
        let g = NumericGrid::from_fn(2, 1, 4, |x, _, c| (x * 10 + c) as f32).unwrap();
        assert_eq!(
            g.as_slice(),
            &[0.0, 1.0, 2.0, 3.0, 10.0, 11.0, 12.0, 13.0]
        );
    }

    #[test]
    fn zero_dimensions_rejected() {
        let err = NumericGrid::zeroed(0, 4, 1).unwrap_err();
        assert!(matches!(err, TexflowError::Allocation(_)));
    }

    #[test]
    fn bad_channel_count_rejected() {
        let err = NumericGrid::zeroed(4, 4, 3).unwrap_err();
        assert!(matches!(err, TexflowError::Allocation(_)));
    }

    #[test]
    fn length_mismatch_rejected() {
        let err = NumericGrid::from_vec(2, 2, 1, vec![1.0, 2.0, 3.0]).unwrap_err();
        assert!(matches!(err, TexflowError::Attachment(_)));
    }

    #[test]
    fn max_value_scans_all_elements() {
        let g = NumericGrid::from_vec(2, 2, 1, vec![-3.0, 0.5, 9.25, 1.0]).unwrap();
        assert_eq!(g.max_value(), 9.25);
    }
}
