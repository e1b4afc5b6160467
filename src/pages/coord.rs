//! Page addressing

use std::fmt;

/// Position of a page in the pyramid
///
/// Depth counts up from the leaves: depth 0 pages are the finest, the root
/// sits at the configured maximum depth. Rows grow southward, columns
/// eastward.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PageCoord {
    pub depth: u32,
    pub row: u32,
    pub col: u32,
}

impl PageCoord {
    pub fn new(depth: u32, row: u32, col: u32) -> Self {
        Self { depth, row, col }
    }

    /// Coordinate of child `index` (0..4, row-major), or None at a leaf
    ///
    /// # Examples
    /// ```
    /// use planetile::pages::PageCoord;
    ///
    /// let page = PageCoord::new(2, 1, 0);
    /// assert_eq!(page.child(3), Some(PageCoord::new(1, 3, 1)));
    /// assert_eq!(PageCoord::new(0, 5, 5).child(0), None);
    /// ```
    pub fn child(&self, index: usize) -> Option<PageCoord> {
        if self.depth == 0 || index >= 4 {
            return None;
        }
        Some(PageCoord {
            depth: self.depth - 1,
            row: self.row * 2 + (index / 2) as u32,
            col: self.col * 2 + (index % 2) as u32,
        })
    }

    /// Coordinate of the enclosing page one level up
    pub fn parent(&self) -> PageCoord {
        PageCoord {
            depth: self.depth + 1,
            row: self.row / 2,
            col: self.col / 2,
        }
    }
}

impl fmt::Display for PageCoord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.depth, self.row, self.col)
    }
}

/// Index of a page in the tree arena
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PageId(pub u32);

impl PageId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for PageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}
