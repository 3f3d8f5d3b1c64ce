//! Typed failures for the acquisition loop.
//!
//! Setup code and collaborators report failures with `anyhow`; the loop
//! classifies every step outcome into one of these kinds and matches on it.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AcquisitionError {
    /// Calibration source unreadable or malformed.
    #[error("calibration unavailable from {source_name}: {reason}")]
    Configuration { source_name: String, reason: String },

    /// The stream is not open (never connected, or the connection was lost).
    #[error("stream {address} is not connected")]
    Connection { address: String },

    /// Connected, but no frame came back.
    #[error("failed to grab frame: {reason}")]
    Read { reason: String },

    /// Any other failure while pairing or emitting a frame.
    #[error("frame processing failed: {0:#}")]
    Processing(anyhow::Error),

    #[error("acquisition cancelled")]
    Cancelled,
}

impl AcquisitionError {
    /// Whether this failure should trigger a fresh connection attempt.
    pub fn requires_reconnect(&self) -> bool {
        matches!(self, Self::Connection { .. } | Self::Read { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connection_and_read_failures_request_reconnect() {
        let conn = AcquisitionError::Connection {
            address: "rtsp://cam".to_string(),
        };
        let read = AcquisitionError::Read {
            reason: "end of stream".to_string(),
        };
        assert!(conn.requires_reconnect());
        assert!(read.requires_reconnect());
        assert!(!AcquisitionError::Processing(anyhow::anyhow!("sink down")).requires_reconnect());
        assert!(!AcquisitionError::Cancelled.requires_reconnect());
    }

    #[test]
    fn processing_error_keeps_cause_chain() {
        let inner = anyhow::anyhow!("broker gone").context("publish image_raw");
        let err = AcquisitionError::Processing(inner);
        let msg = err.to_string();
        assert!(msg.contains("publish image_raw"));
        assert!(msg.contains("broker gone"));
    }
}
