use crate::capture::VideoGeometry;

/// Color channel sampled at one sensor position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Channel {
    Red,
    Green,
    Blue,
}

/// Per-pixel filter colors for the sensor's RGGB mosaic.
///
/// ```text
/// R G R G ...
/// G B G B ...
/// ```
#[derive(Debug, Clone)]
pub struct ColorFilterMap {
    tags: Vec<Channel>,
}

impl ColorFilterMap {
    pub fn new(geometry: VideoGeometry) -> Self {
        let tags = (0..geometry.frame_len())
            .map(|i| Self::pattern(geometry.row(i), geometry.col(i)))
            .collect();
        Self { tags }
    }

    /// The repeating 2x2 tile.
    #[inline]
    pub fn pattern(row: usize, col: usize) -> Channel {
        match (row % 2, col % 2) {
            (0, 0) => Channel::Red,
            (1, 1) => Channel::Blue,
            _ => Channel::Green,
        }
    }

    #[inline]
    pub fn tag(&self, index: usize) -> Channel {
        self.tags[index]
    }

    pub fn len(&self) -> usize {
        self.tags.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tags.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn map_covers_every_pixel_with_the_tile() {
        for (width, height) in [(1, 1), (2, 2), (5, 3), (6, 4), (17, 9)] {
            let geometry = VideoGeometry::new(width, height).unwrap();
            let map = ColorFilterMap::new(geometry);
            assert_eq!(map.len(), geometry.frame_len());

            for i in 0..map.len() {
                let row_parity = (i / width as usize) % 2;
                let col_parity = (i % width as usize) % 2;
                let expected = match (row_parity, col_parity) {
                    (0, 0) => Channel::Red,
                    (1, 1) => Channel::Blue,
                    _ => Channel::Green,
                };
                assert_eq!(map.tag(i), expected, "{width}x{height} index {i}");
            }
        }
    }

    #[test]
    fn first_rows_read_rggb() {
        use Channel::*;
        let map = ColorFilterMap::new(VideoGeometry::new(4, 2).unwrap());
        let tags: Vec<_> = (0..map.len()).map(|i| map.tag(i)).collect();
        assert_eq!(tags, [Red, Green, Red, Green, Green, Blue, Green, Blue]);
    }
}
