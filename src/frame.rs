//! Screen payload decoding.
//!
//! The connector script pushes a fixed-size blob per `cV0`: an 11-byte header
//! followed by a 256-pixel-wide raster, 4 bytes per pixel, row-major, with
//! channel order `[unused, R, G, B]`.

use crate::config::{ColorMode, SCREEN_CHANNELS, SCREEN_HEADER_LEN, SCREEN_WIDTH};
use crate::error::{BridgeError, Result};
use crate::transport::Channel;

const LUMA_WEIGHTS: [f64; 3] = [0.21, 0.72, 0.07];

/// A decoded screen. `data` is row-major, `channels` bytes per pixel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Observation {
    pub height: usize,
    pub width: usize,
    pub channels: usize,
    pub data: Vec<u8>,
}

impl Observation {
    /// `[H, W]` for single-channel modes, `[H, W, C]` otherwise.
    pub fn shape(&self) -> Vec<usize> {
        observation_shape(self.height, self.width, self.channels)
    }

    pub fn pixel(&self, y: usize, x: usize) -> &[u8] {
        let start = (y * self.width + x) * self.channels;
        &self.data[start..start + self.channels]
    }

    pub fn mean(&self) -> f64 {
        if self.data.is_empty() {
            return 0.0;
        }
        self.data.iter().map(|&v| v as f64).sum::<f64>() / self.data.len() as f64
    }
}

fn observation_shape(height: usize, width: usize, channels: usize) -> Vec<usize> {
    if channels == 1 {
        vec![height, width]
    } else {
        vec![height, width, channels]
    }
}

#[derive(Debug, Clone)]
pub struct FrameCodec {
    color_mode: ColorMode,
    screen_msg_len: usize,
    padding_length: usize,
    height: usize,
}

impl FrameCodec {
    pub fn new(color_mode: ColorMode, screen_msg_len: usize, padding_length: usize) -> Result<Self> {
        let row_bytes = SCREEN_CHANNELS * SCREEN_WIDTH;
        let height = screen_msg_len / row_bytes;
        if height == 0 {
            return Err(BridgeError::Configuration(format!(
                "screen_msg_len {screen_msg_len} is shorter than one {SCREEN_WIDTH}-pixel row"
            )));
        }
        if screen_msg_len != height * row_bytes + SCREEN_HEADER_LEN {
            return Err(BridgeError::Configuration(format!(
                "screen_msg_len {screen_msg_len} is not an {SCREEN_HEADER_LEN}-byte header plus whole {SCREEN_WIDTH}x4 rows"
            )));
        }
        Ok(Self {
            color_mode,
            screen_msg_len,
            padding_length,
            height,
        })
    }

    pub fn color_mode(&self) -> ColorMode {
        self.color_mode
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn width(&self) -> usize {
        SCREEN_WIDTH
    }

    /// Bytes the screen channel carries per response, padding included.
    pub fn wire_len(&self) -> usize {
        self.screen_msg_len + 2 * self.padding_length
    }

    pub fn screen_msg_len(&self) -> usize {
        self.screen_msg_len
    }

    pub fn output_shape(&self) -> Vec<usize> {
        observation_shape(self.height, SCREEN_WIDTH, self.color_mode.output_channels())
    }

    pub fn decode(&self, payload: &[u8]) -> Result<Observation> {
        if payload.len() != self.wire_len() {
            return Err(BridgeError::MalformedResponse {
                channel: Channel::Screen,
                got: payload.len(),
                expected: self.wire_len(),
            });
        }
        let start = self.padding_length + SCREEN_HEADER_LEN;
        let end = payload.len() - self.padding_length;
        let raster = &payload[start..end];
        let pixels = self.height * SCREEN_WIDTH;
        debug_assert_eq!(raster.len(), pixels * SCREEN_CHANNELS);

        let channels = self.color_mode.output_channels();
        let mut data = Vec::with_capacity(pixels * channels);
        match self.color_mode {
            ColorMode::Luminosity => {
                let total: f64 = LUMA_WEIGHTS.iter().sum();
                for px in raster.chunks_exact(SCREEN_CHANNELS) {
                    let weighted = LUMA_WEIGHTS[0] * px[1] as f64
                        + LUMA_WEIGHTS[1] * px[2] as f64
                        + LUMA_WEIGHTS[2] * px[3] as f64;
                    data.push((weighted / total) as u8);
                }
            }
            ColorMode::Average => {
                for px in raster.chunks_exact(SCREEN_CHANNELS) {
                    let sum = px[1] as u16 + px[2] as u16 + px[3] as u16;
                    data.push((sum / 3) as u8);
                }
            }
            ColorMode::RgbArray => {
                for px in raster.chunks_exact(SCREEN_CHANNELS) {
                    data.extend_from_slice(&px[1..4]);
                }
            }
            ColorMode::ArgbArray => data.extend_from_slice(raster),
        }

        Ok(Observation {
            height: self.height,
            width: SCREEN_WIDTH,
            channels,
            data,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DEFAULT_SCREEN_MSG_LEN;

    const SMALL_LEN: usize = 2 * SCREEN_WIDTH * SCREEN_CHANNELS + SCREEN_HEADER_LEN;

    fn uniform_payload(len: usize, padding: usize, px: [u8; 4]) -> Vec<u8> {
        let mut payload = vec![0xEEu8; padding + SCREEN_HEADER_LEN];
        let pixels = (len - SCREEN_HEADER_LEN) / SCREEN_CHANNELS;
        for _ in 0..pixels {
            payload.extend_from_slice(&px);
        }
        payload.extend(std::iter::repeat_n(0xEEu8, padding));
        payload
    }

    #[test]
    fn default_geometry_is_240_rows() {
        let codec = FrameCodec::new(ColorMode::Luminosity, DEFAULT_SCREEN_MSG_LEN, 0).unwrap();
        assert_eq!(codec.height(), 240);
        assert_eq!(codec.output_shape(), vec![240, 256]);
        let rgb = FrameCodec::new(ColorMode::RgbArray, DEFAULT_SCREEN_MSG_LEN, 0).unwrap();
        assert_eq!(rgb.output_shape(), vec![240, 256, 3]);
    }

    #[test]
    fn luminosity_of_full_green_full_frame() {
        let codec = FrameCodec::new(ColorMode::Luminosity, DEFAULT_SCREEN_MSG_LEN, 0).unwrap();
        let payload = uniform_payload(DEFAULT_SCREEN_MSG_LEN, 0, [0, 0, 255, 0]);
        assert_eq!(payload.len(), DEFAULT_SCREEN_MSG_LEN);
        let obs = codec.decode(&payload).unwrap();
        assert_eq!(obs.shape(), vec![240, 256]);
        assert!(obs.data.iter().all(|&v| v == 183));
    }

    #[test]
    fn luminosity_weights_channels_in_rgb_order() {
        let codec = FrameCodec::new(ColorMode::Luminosity, SMALL_LEN, 0).unwrap();
        let red = codec.decode(&uniform_payload(SMALL_LEN, 0, [0, 255, 0, 0])).unwrap();
        assert!(red.data.iter().all(|&v| v == 53));
        let blue = codec.decode(&uniform_payload(SMALL_LEN, 0, [0, 0, 0, 255])).unwrap();
        assert!(blue.data.iter().all(|&v| v == 17));
        // Alpha is ignored.
        let alpha = codec.decode(&uniform_payload(SMALL_LEN, 0, [255, 0, 0, 0])).unwrap();
        assert!(alpha.data.iter().all(|&v| v == 0));
    }

    #[test]
    fn average_truncates() {
        let codec = FrameCodec::new(ColorMode::Average, SMALL_LEN, 0).unwrap();
        let obs = codec.decode(&uniform_payload(SMALL_LEN, 0, [9, 10, 20, 31])).unwrap();
        assert_eq!(obs.shape(), vec![2, 256]);
        assert!(obs.data.iter().all(|&v| v == 20));
    }

    #[test]
    fn rgb_and_argb_pass_through() {
        let mut payload = uniform_payload(SMALL_LEN, 0, [1, 2, 3, 4]);
        // Last pixel of the first row.
        let at = SCREEN_HEADER_LEN + 255 * SCREEN_CHANNELS;
        payload[at..at + 4].copy_from_slice(&[40, 50, 60, 70]);

        let rgb = FrameCodec::new(ColorMode::RgbArray, SMALL_LEN, 0)
            .unwrap()
            .decode(&payload)
            .unwrap();
        assert_eq!(rgb.shape(), vec![2, 256, 3]);
        assert_eq!(rgb.pixel(0, 0), &[2, 3, 4]);
        assert_eq!(rgb.pixel(0, 255), &[50, 60, 70]);
        assert_eq!(rgb.pixel(1, 0), &[2, 3, 4]);

        let argb = FrameCodec::new(ColorMode::ArgbArray, SMALL_LEN, 0)
            .unwrap()
            .decode(&payload)
            .unwrap();
        assert_eq!(argb.shape(), vec![2, 256, 4]);
        assert_eq!(argb.pixel(0, 255), &[40, 50, 60, 70]);
        assert_eq!(argb.data.len(), 2 * 256 * 4);
    }

    #[test]
    fn padding_is_stripped_both_ends() {
        let codec = FrameCodec::new(ColorMode::RgbArray, SMALL_LEN, 5).unwrap();
        assert_eq!(codec.wire_len(), SMALL_LEN + 10);
        let obs = codec.decode(&uniform_payload(SMALL_LEN, 5, [0, 7, 8, 9])).unwrap();
        assert!(obs.data.chunks(3).all(|p| p == [7, 8, 9]));
    }

    #[test]
    fn wrong_length_is_malformed() {
        let codec = FrameCodec::new(ColorMode::Average, SMALL_LEN, 0).unwrap();
        let err = codec.decode(&vec![0u8; SMALL_LEN - 1]).unwrap_err();
        assert!(matches!(err, BridgeError::MalformedResponse { got, .. } if got == SMALL_LEN - 1));
    }

    #[test]
    fn bad_geometry_is_configuration_error() {
        assert!(matches!(
            FrameCodec::new(ColorMode::Average, 100, 0),
            Err(BridgeError::Configuration(_))
        ));
        assert!(matches!(
            FrameCodec::new(ColorMode::Average, SMALL_LEN + 1, 0),
            Err(BridgeError::Configuration(_))
        ));
    }
}
