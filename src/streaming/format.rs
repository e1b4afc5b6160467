//! Tile pixel formats
//!
//! A cache instance stores one kind of tile data. The format fixes the pixel
//! type held in slots and the channel count loaders must report.

use bytemuck::Pod;

/// Pixel layout of the tiles held by a cache
pub trait TileFormat: Send + Sync + 'static {
    /// One texel as stored in a slot
    type Pixel: Pod + Send + Sync;
    /// Channels per texel reported by tile sources
    const CHANNELS: u32;
    /// Short name used in logs
    const NAME: &'static str;

    /// Bytes per texel
    fn bytes_per_pixel() -> usize {
        std::mem::size_of::<Self::Pixel>()
    }

    /// Bytes in one full tile of edge `page_size`
    fn tile_bytes(page_size: u32) -> usize {
        page_size as usize * page_size as usize * Self::bytes_per_pixel()
    }
}

/// 8-bit RGBA color
#[derive(Clone, Copy, Debug, Default)]
pub struct Color;

impl TileFormat for Color {
    type Pixel = [u8; 4];
    const CHANNELS: u32 = 4;
    const NAME: &'static str = "color";
}

/// 8-bit XYZ normal
#[derive(Clone, Copy, Debug, Default)]
pub struct Normal;

impl TileFormat for Normal {
    type Pixel = [u8; 3];
    const CHANNELS: u32 = 3;
    const NAME: &'static str = "normal";
}

/// 16-bit height
#[derive(Clone, Copy, Debug, Default)]
pub struct Height;

impl TileFormat for Height {
    type Pixel = u16;
    const CHANNELS: u32 = 1;
    const NAME: &'static str = "height";
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tile_bytes() {
        assert_eq!(Color::tile_bytes(16), 16 * 16 * 4);
        assert_eq!(Normal::tile_bytes(16), 16 * 16 * 3);
        assert_eq!(Height::tile_bytes(16), 16 * 16 * 2);
    }
}
