//! Tile sources - where loaders get page bytes from

use std::fs::File;
use std::io::{ErrorKind, Read};
use std::path::PathBuf;

use crate::core::error::{TileError, TileResult};
use crate::pages::PageCoord;
use super::buffer_pool::TileBuffer;
use super::format::TileFormat;

/// Produces the texels of one page
///
/// Called concurrently from every loader thread. An error marks the page
/// Missing; rendering keeps using the nearest resident ancestor.
pub trait TileSource: Send + Sync {
    fn fetch(&self, coord: PageCoord, buffer: &mut TileBuffer) -> TileResult<()>;
}

impl<Func> TileSource for Func
where
    Func: Fn(PageCoord, &mut TileBuffer) -> TileResult<()> + Send + Sync,
{
    fn fetch(&self, coord: PageCoord, buffer: &mut TileBuffer) -> TileResult<()> {
        self(coord, buffer)
    }
}

/// Expand `{depth}`, `{row}` and `{col}` in a path pattern
///
/// # Examples
/// ```
/// use planetile::pages::PageCoord;
/// use planetile::streaming::source::tile_path;
///
/// let path = tile_path("tiles/{depth}/{row}_{col}.raw", PageCoord::new(3, 1, 2));
/// assert_eq!(path.to_str(), Some("tiles/3/1_2.raw"));
/// ```
pub fn tile_path(pattern: &str, coord: PageCoord) -> PathBuf {
    PathBuf::from(
        pattern
            .replace("{depth}", &coord.depth.to_string())
            .replace("{row}", &coord.row.to_string())
            .replace("{col}", &coord.col.to_string()),
    )
}

/// Reads raw, uncompressed tiles from one file per page
#[derive(Clone, Debug)]
pub struct FileTileSource {
    pattern: String,
    page_size: u32,
    channels: u32,
    tile_bytes: usize,
}

impl FileTileSource {
    /// Source for tiles of format `F` stored at `pattern`
    ///
    /// # Arguments
    /// * `pattern` - Path with `{depth}`, `{row}` and `{col}` placeholders
    /// * `page_size` - Tile edge length in pixels
    pub fn new<F: TileFormat>(pattern: impl Into<String>, page_size: u32) -> Self {
        Self {
            pattern: pattern.into(),
            page_size,
            channels: F::CHANNELS,
            tile_bytes: F::tile_bytes(page_size),
        }
    }

    pub fn path(&self, coord: PageCoord) -> PathBuf {
        tile_path(&self.pattern, coord)
    }
}

impl TileSource for FileTileSource {
    fn fetch(&self, coord: PageCoord, buffer: &mut TileBuffer) -> TileResult<()> {
        let mut file = File::open(self.path(coord))?;
        let expected = self.tile_bytes;
        let bytes = buffer.write(self.page_size, self.page_size, self.channels, expected);

        let mut filled = 0;
        while filled < expected {
            match file.read(&mut bytes[filled..]) {
                Ok(0) => {
                    return Err(TileError::ShortRead {
                        expected,
                        actual: filled,
                    });
                }
                Ok(n) => filled += n,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::streaming::format::Color;
    use tempfile::TempDir;

    fn source(dir: &TempDir) -> FileTileSource {
        let pattern = dir.path().join("{depth}_{row}_{col}.raw");
        FileTileSource::new::<Color>(pattern.to_string_lossy(), 2)
    }

    #[test]
    fn test_reads_exact_tile() {
        let dir = TempDir::new().unwrap();
        let source = source(&dir);
        let coord = PageCoord::new(1, 0, 1);
        std::fs::write(source.path(coord), (0u8..16).collect::<Vec<_>>()).unwrap();

        let mut buffer = TileBuffer::default();
        source.fetch(coord, &mut buffer).unwrap();
        assert_eq!(buffer.len(), 16);
        assert_eq!(buffer.width(), 2);
        assert_eq!(buffer.channels(), 4);
        assert_eq!(buffer.data()[15], 15);
    }

    #[test]
    fn test_short_file() {
        let dir = TempDir::new().unwrap();
        let source = source(&dir);
        let coord = PageCoord::new(0, 0, 0);
        std::fs::write(source.path(coord), [1u8; 10]).unwrap();

        let mut buffer = TileBuffer::default();
        let err = source.fetch(coord, &mut buffer).unwrap_err();
        assert!(matches!(err, TileError::ShortRead { expected: 16, actual: 10 }));
    }

    #[test]
    fn test_missing_file() {
        let dir = TempDir::new().unwrap();
        let mut buffer = TileBuffer::default();
        let err = source(&dir).fetch(PageCoord::new(0, 3, 3), &mut buffer).unwrap_err();
        assert!(matches!(err, TileError::Io(_)));
    }

    #[test]
    fn test_closure_source() {
        let source = |coord: PageCoord, buffer: &mut TileBuffer| -> TileResult<()> {
            buffer.write(1, 1, 1, 1)[0] = coord.depth as u8;
            Ok(())
        };
        let mut buffer = TileBuffer::default();
        source.fetch(PageCoord::new(5, 0, 0), &mut buffer).unwrap();
        assert_eq!(buffer.data(), &[5]);
    }
}
