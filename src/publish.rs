//! Outbound messages and the sink seam.
//!
//! Every successful tick produces one `ImageMessage` and one
//! `CameraInfoMessage` sharing the same `Header`.

use anyhow::{anyhow, Result};
use serde::Serialize;

use crate::calibration::CalibrationRecord;
use crate::frame::{FrameSample, Header, BGR8_ENCODING};

/// Image metadata plus pixels. Pixels are skipped when serializing metadata.
#[derive(Debug, Serialize)]
pub struct ImageMessage {
    pub header: Header,
    pub height: u32,
    pub width: u32,
    pub encoding: &'static str,
    pub is_bigendian: bool,
    /// Row length in bytes.
    pub step: u32,
    #[serde(skip)]
    pub data: Vec<u8>,
}

impl ImageMessage {
    /// Consume a frame; the frame's pixels move into the message.
    pub fn from_frame(frame: FrameSample, header: Header) -> Self {
        let step = frame.step();
        let (width, height) = (frame.width, frame.height);
        Self {
            header,
            height,
            width,
            encoding: BGR8_ENCODING,
            is_bigendian: false,
            step,
            data: frame.into_pixels(),
        }
    }

    /// Binary envelope: `u32` big-endian metadata length, JSON metadata, raw pixels.
    pub fn encode(&self) -> Result<Vec<u8>> {
        let meta = serde_json::to_vec(self)?;
        let meta_len = u32::try_from(meta.len())
            .map_err(|_| anyhow!("image metadata too large ({} bytes)", meta.len()))?;
        let mut payload = Vec::with_capacity(4 + meta.len() + self.data.len());
        payload.extend_from_slice(&meta_len.to_be_bytes());
        payload.extend_from_slice(&meta);
        payload.extend_from_slice(&self.data);
        Ok(payload)
    }
}

/// Calibration stamped for one emission. Borrows the shared record.
#[derive(Debug, Serialize)]
pub struct CameraInfoMessage<'a> {
    pub header: Header,
    #[serde(flatten)]
    pub calibration: &'a CalibrationRecord,
}

impl<'a> CameraInfoMessage<'a> {
    pub fn new(header: Header, calibration: &'a CalibrationRecord) -> Self {
        Self {
            header,
            calibration,
        }
    }

    pub fn encode(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }
}

/// Destination for paired frame and calibration messages.
pub trait FrameSink {
    fn publish_image(&mut self, image: &ImageMessage) -> Result<()>;

    fn publish_camera_info(&mut self, info: &CameraInfoMessage<'_>) -> Result<()>;
}

/// Sink that only logs what would be published. Useful without a broker.
#[derive(Debug, Default)]
pub struct LogSink {
    published: u64,
}

impl LogSink {
    pub fn new() -> Self {
        Self::default()
    }
}

impl FrameSink for LogSink {
    fn publish_image(&mut self, image: &ImageMessage) -> Result<()> {
        self.published += 1;
        log::debug!(
            "image #{} {}x{} {} stamp={}.{:09} frame_id={}",
            self.published,
            image.width,
            image.height,
            image.encoding,
            image.header.stamp.secs,
            image.header.stamp.nsecs,
            image.header.frame_id
        );
        Ok(())
    }

    fn publish_camera_info(&mut self, info: &CameraInfoMessage<'_>) -> Result<()> {
        log::debug!(
            "camera_info {} stamp={}.{:09}",
            info.calibration.distortion_model,
            info.header.stamp.secs,
            info.header.stamp.nsecs
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::Stamp;

    fn header() -> Header {
        Header::new(
            Stamp {
                secs: 1_700_000_000,
                nsecs: 42,
            },
            "camera_optical_frame",
        )
    }

    #[test]
    fn image_envelope_has_length_prefixed_metadata() {
        let frame = FrameSample::from_bgr(vec![1, 2, 3, 4, 5, 6], 2, 1, header().stamp)
            .expect("frame");
        let image = ImageMessage::from_frame(frame, header());
        let payload = image.encode().expect("encode");

        let meta_len = u32::from_be_bytes([payload[0], payload[1], payload[2], payload[3]]) as usize;
        let meta: serde_json::Value =
            serde_json::from_slice(&payload[4..4 + meta_len]).expect("metadata json");
        assert_eq!(meta["encoding"], "bgr8");
        assert_eq!(meta["step"], 6);
        assert_eq!(meta["header"]["frame_id"], "camera_optical_frame");
        assert_eq!(meta["header"]["stamp"]["nsecs"], 42);
        assert!(meta.get("data").is_none());
        assert_eq!(&payload[4 + meta_len..], &[1, 2, 3, 4, 5, 6]);
    }

    #[test]
    fn camera_info_flattens_calibration_beside_header() {
        let record = CalibrationRecord::fallback("camera_optical_frame");
        let info = CameraInfoMessage::new(header(), &record);
        let json: serde_json::Value =
            serde_json::from_slice(&info.encode().expect("encode")).expect("json");

        assert_eq!(json["header"]["stamp"]["secs"], 1_700_000_000u32);
        assert_eq!(json["frame_id"], "camera_optical_frame");
        assert_eq!(json["width"], 1920);
        assert_eq!(json["distortion_model"], "plumb_bob");
        assert_eq!(json["K"][0], 1000.0);
    }
}
