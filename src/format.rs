use std::fmt;

/// The device element format for one texel.
///
/// Both variants store unclamped 32-bit floats and are valid render
/// attachment formats, so a draw pass can write exact values and readback
/// returns bit-identical data. The format is an immutable value passed to
/// buffer creation, never process-wide state.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum TexelFormat {
    /// One float per texel.
    #[default]
    R32Float,
    /// Four floats per texel.
    Rgba32Float,
}

impl TexelFormat {
    /// Floats stored per texel.
    pub fn channels(self) -> u32 {
        match self {
            TexelFormat::R32Float => 1,
            TexelFormat::Rgba32Float => 4,
        }
    }

    pub fn bytes_per_texel(self) -> u32 {
        self.channels() * 4
    }

    /// The format whose channel count matches a host grid, if any.
    pub fn for_channels(channels: u32) -> Option<Self> {
        match channels {
            1 => Some(TexelFormat::R32Float),
            4 => Some(TexelFormat::Rgba32Float),
            _ => None,
        }
    }

    pub(crate) fn wgpu_format(self) -> wgpu::TextureFormat {
        match self {
            TexelFormat::R32Float => wgpu::TextureFormat::R32Float,
            TexelFormat::Rgba32Float => wgpu::TextureFormat::Rgba32Float,
        }
    }
}

impl fmt::Display for TexelFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TexelFormat::R32Float => write!(f, "r32float"),
            TexelFormat::Rgba32Float => write!(f, "rgba32float"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn channel_counts() {
        assert_eq!(TexelFormat::R32Float.channels(), 1);
        assert_eq!(TexelFormat::Rgba32Float.channels(), 4);
        assert_eq!(TexelFormat::R32Float.bytes_per_texel(), 4);
        assert_eq!(TexelFormat::Rgba32Float.bytes_per_texel(), 16);
    }

    #[test]
    fn for_channels_round_trips() {
        assert_eq!(TexelFormat::for_channels(1), Some(TexelFormat::R32Float));
        assert_eq!(TexelFormat::for_channels(4), Some(TexelFormat::Rgba32Float));
        assert_eq!(TexelFormat::for_channels(3), None);
    }
}
