//! Capture connection lifecycle.
//!
//! `StreamSession` is a two-state machine (`Disconnected`, `Connected`) around
//! at most one `FrameSource` handle. It never retries on its own: a failed
//! read leaves the state untouched and the caller decides to `open` again,
//! which always discards the old handle before connecting.

use crate::error::AcquisitionError;
use crate::frame::{FrameSample, Stamp};
use crate::ingest::{FrameSource, SourceConnector};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionState {
    Disconnected,
    Connected,
}

pub struct StreamSession<C: SourceConnector> {
    connector: C,
    handle: Option<C::Source>,
}

impl<C: SourceConnector> StreamSession<C> {
    pub fn new(connector: C) -> Self {
        Self {
            connector,
            handle: None,
        }
    }

    pub fn state(&self) -> SessionState {
        match &self.handle {
            Some(handle) if handle.is_open() => SessionState::Connected,
            _ => SessionState::Disconnected,
        }
    }

    pub fn is_connected(&self) -> bool {
        self.state() == SessionState::Connected
    }

    /// (Re)connect to `address`. Failures are logged, never returned.
    pub fn open(&mut self, address: &str) {
        self.close();
        match self.connector.connect(address) {
            Ok(handle) if handle.is_open() => {
                log::info!("successfully connected to camera at {}", address);
                self.handle = Some(handle);
            }
            Ok(mut handle) => {
                log::error!("error connecting to camera at {}: stream did not open", address);
                handle.release();
            }
            Err(err) => {
                log::error!("error connecting to camera at {}: {:#}", address, err);
            }
        }
    }

    /// Read one frame and stamp it with the current wall-clock time.
    ///
    /// Does not change the session state, even on failure.
    pub fn read_frame(&mut self) -> Result<FrameSample, AcquisitionError> {
        let handle = match self.handle.as_mut() {
            Some(handle) if handle.is_open() => handle,
            _ => {
                return Err(AcquisitionError::Read {
                    reason: "session is not connected".to_string(),
                })
            }
        };

        let image = match handle.next_frame() {
            Ok(Some(image)) => image,
            Ok(None) => {
                return Err(AcquisitionError::Read {
                    reason: "stream returned no frame".to_string(),
                })
            }
            Err(err) => {
                return Err(AcquisitionError::Read {
                    reason: format!("{:#}", err),
                })
            }
        };

        let stamp = Stamp::now().map_err(AcquisitionError::Processing)?;
        FrameSample::from_bgr(image.data, image.width, image.height, stamp)
            .map_err(AcquisitionError::Processing)
    }

    /// Release the held connection, if any. Safe to call repeatedly.
    pub fn close(&mut self) {
        if let Some(mut handle) = self.handle.take() {
            handle.release();
            log::debug!("camera connection released");
        }
    }
}

impl<C: SourceConnector> Drop for StreamSession<C> {
    fn drop(&mut self) {
        self.close();
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
