//! Neighbour-averaging reconstruction of RGB from the raw mosaic
//!
//! Every average divides by the number of neighbours actually inside the
//! frame. When a direction has no neighbour at all (single-row or
//! single-column frames) the channel falls back to the pixel's own sample.

use crate::capture::VideoGeometry;
use crate::pipeline::cfa::{Channel, ColorFilterMap};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

pub struct BayerDemosaic {
    geometry: VideoGeometry,
    cfa: ColorFilterMap,
}

impl BayerDemosaic {
    pub fn new(geometry: VideoGeometry) -> Self {
        Self {
            geometry,
            cfa: ColorFilterMap::new(geometry),
        }
    }

    pub fn geometry(&self) -> VideoGeometry {
        self.geometry
    }

    pub fn cfa(&self) -> &ColorFilterMap {
        &self.cfa
    }

    /// Full color at `index`.
    ///
    /// Panics if `index` or any in-frame neighbour lies outside `frame`.
    pub fn reconstruct(&self, index: usize, frame: &[u16]) -> Rgb {
        let own = sample(frame, index);
        let or_own = |average: Option<u8>| average.unwrap_or(own);

        match self.cfa.tag(index) {
            Channel::Red => Rgb {
                r: own,
                g: or_own(self.average_vert(index, frame)),
                b: or_own(self.average_x(index, frame)),
            },
            Channel::Blue => Rgb {
                r: or_own(self.average_x(index, frame)),
                g: or_own(self.average_vert(index, frame)),
                b: own,
            },
            Channel::Green => {
                let (r, b) = match self.green_row(index) {
                    Some(Channel::Red) => (
                        or_own(self.average_hor(index, frame)),
                        or_own(self.average_vert(index, frame)),
                    ),
                    Some(_) => (
                        or_own(self.average_vert(index, frame)),
                        or_own(self.average_hor(index, frame)),
                    ),
                    None => (own, own),
                };
                Rgb { r, g: own, b }
            }
        }
    }

    /// Which of red or blue shares a green pixel's row.
    ///
    /// Checks the next pixel for red, then the previous for blue, then the
    /// mirrored pair so row-end greens still resolve. `None` only when the
    /// row has no other pixel.
    fn green_row(&self, index: usize) -> Option<Channel> {
        let col = self.geometry.col(index);
        let next = (col + 1 < self.geometry.width()).then(|| self.cfa.tag(index + 1));
        let prev = (col > 0).then(|| self.cfa.tag(index - 1));

        match (prev, next) {
            (_, Some(Channel::Red)) => Some(Channel::Red),
            (Some(Channel::Blue), _) => Some(Channel::Blue),
            (Some(Channel::Red), _) => Some(Channel::Red),
            (_, Some(Channel::Blue)) => Some(Channel::Blue),
            _ => None,
        }
    }

    pub fn average_vert(&self, index: usize, frame: &[u16]) -> Option<u8> {
        average(frame, [self.up(index), self.down(index)])
    }

    pub fn average_hor(&self, index: usize, frame: &[u16]) -> Option<u8> {
        average(frame, [self.left(index), self.right(index)])
    }

    pub fn average_x(&self, index: usize, frame: &[u16]) -> Option<u8> {
        let up = self.up(index);
        let down = self.down(index);
        let (left, right) = (self.left(index).is_some(), self.right(index).is_some());
        average(
            frame,
            [
                up.filter(|_| left).map(|j| j - 1),
                up.filter(|_| right).map(|j| j + 1),
                down.filter(|_| left).map(|j| j - 1),
                down.filter(|_| right).map(|j| j + 1),
            ],
        )
    }

    fn up(&self, index: usize) -> Option<usize> {
        (self.geometry.row(index) > 0).then(|| index - self.geometry.width())
    }

    fn down(&self, index: usize) -> Option<usize> {
        let below = index + self.geometry.width();
        (below < self.geometry.frame_len()).then_some(below)
    }

    fn left(&self, index: usize) -> Option<usize> {
        (self.geometry.col(index) > 0).then(|| index - 1)
    }

    fn right(&self, index: usize) -> Option<usize> {
        (self.geometry.col(index) + 1 < self.geometry.width()).then(|| index + 1)
    }
}

/// Sensor intensity lives in the low byte.
#[inline]
fn sample(frame: &[u16], index: usize) -> u8 {
    (frame[index] & 0xFF) as u8
}

fn average<const N: usize>(frame: &[u16], neighbours: [Option<usize>; N]) -> Option<u8> {
    let mut sum = 0u32;
    let mut count = 0u32;
    for j in neighbours.into_iter().flatten() {
        sum += sample(frame, j) as u32;
        count += 1;
    }
    (count > 0).then(|| (sum / count) as u8)
}
