//! Per-pixel processing and the captured frame store

pub mod cfa;
pub mod color;
pub mod demosaic;
pub mod ringbuf;

pub use self::cfa::{Channel, ColorFilterMap};
pub use self::color::{pack, to_luma_chroma, YCbCr};
pub use self::demosaic::{BayerDemosaic, Rgb};
pub use self::ringbuf::{CaptureResult, FrameStore};

/// Demosaic and color-convert `inbound` into packed words in `outbound`.
///
/// Both slices must hold the demosaic's full frame.
pub fn convert_frame(demosaic: &BayerDemosaic, inbound: &[u16], outbound: &mut [u16]) {
    let frame_len = demosaic.geometry().frame_len();
    for (i, out) in outbound[..frame_len].iter_mut().enumerate() {
        let rgb = demosaic.reconstruct(i, inbound);
        *out = pack(i, to_luma_chroma(rgb));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::VideoGeometry;

    #[test]
    fn gray_mosaic_converts_to_neutral_chroma() {
        let demosaic = BayerDemosaic::new(VideoGeometry::new(4, 2).unwrap());
        let inbound = [128u16; 8];
        let mut outbound = [0u16; 8];
        convert_frame(&demosaic, &inbound, &mut outbound);
        assert!(outbound.iter().all(|&word| word == 0x807D));
    }

    #[test]
    fn every_pixel_is_written() {
        let geometry = VideoGeometry::new(5, 3).unwrap();
        let demosaic = BayerDemosaic::new(geometry);
        let inbound: Vec<u16> = (0..15).map(|v| v * 17).collect();
        let mut outbound = vec![0u16; 15];
        convert_frame(&demosaic, &inbound, &mut outbound);

        for (i, &word) in outbound.iter().enumerate() {
            let ycc = to_luma_chroma(demosaic.reconstruct(i, &inbound));
            assert_eq!(word, pack(i, ycc), "index {i}");
            assert!((16..=235).contains(&(word & 0xFF)));
        }
    }
}
