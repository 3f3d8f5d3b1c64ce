//! Fixed-rate acquisition loop.
//!
//! Each tick either publishes one image/camera_info pair stamped with the
//! same capture time, or classifies why it could not:
//! - `Connection` / `Read`: force a fresh `open` and wait for the next tick
//! - `Processing`: log and skip the tick
//!
//! Reconnect latency is therefore bounded by one tick period. The loop only
//! stops when the shutdown signal is observed at a tick boundary, and the
//! session is closed on every exit path.

use std::ops::{Deref, DerefMut};
use std::time::{Duration, Instant};

use crate::calibration::CalibrationRecord;
use crate::context::DriverContext;
use crate::error::AcquisitionError;
use crate::frame::Header;
use crate::ingest::SourceConnector;
use crate::publish::{CameraInfoMessage, FrameSink, ImageMessage};
use crate::rate::Rate;
use crate::session::StreamSession;

const HEALTH_LOG_INTERVAL: Duration = Duration::from_secs(5);

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct AcquisitionStats {
    pub ticks: u64,
    pub frames_published: u64,
    pub connection_failures: u64,
    pub read_failures: u64,
    pub processing_failures: u64,
    /// Ticks where the image went out but its camera_info did not.
    pub partial_pairs: u64,
    pub reconnect_attempts: u64,
}

pub struct AcquisitionLoop<'a, K: FrameSink> {
    ctx: &'a DriverContext,
    calibration: &'a CalibrationRecord,
    sink: K,
    stats: AcquisitionStats,
}

impl<'a, K: FrameSink> AcquisitionLoop<'a, K> {
    pub fn new(ctx: &'a DriverContext, calibration: &'a CalibrationRecord, sink: K) -> Self {
        Self {
            ctx,
            calibration,
            sink,
            stats: AcquisitionStats::default(),
        }
    }

    pub fn stats(&self) -> AcquisitionStats {
        self.stats
    }

    pub fn sink(&self) -> &K {
        &self.sink
    }

    pub fn into_sink(self) -> K {
        self.sink
    }

    /// Run until shutdown is requested. The session is closed before returning.
    pub fn run<C: SourceConnector>(
        &mut self,
        session: &mut StreamSession<C>,
    ) -> Result<AcquisitionStats, AcquisitionError> {
        let mut rate = Rate::new(self.ctx.config.stream.publish_rate)
            .map_err(|e| AcquisitionError::Configuration {
                source_name: "publish_rate".to_string(),
                reason: e.to_string(),
            })?;
        let mut session = CloseOnExit(session);
        let address = self.ctx.stream_address();

        log::info!(
            "acquiring from {} at {} Hz (frame_id={})",
            address,
            self.ctx.config.stream.publish_rate,
            self.ctx.frame_id()
        );
        session.open(address);

        let mut last_health_log = Instant::now();
        while !self.ctx.shutdown.is_requested() {
            let outcome = self.tick(&mut session);
            if let Err(AcquisitionError::Cancelled) = outcome {
                break;
            }
            self.handle_outcome(outcome, &mut session);

            if last_health_log.elapsed() >= HEALTH_LOG_INTERVAL {
                log::info!(
                    "camera connected={} ticks={} published={} partial={} read_failures={} reconnects={}",
                    session.is_connected(),
                    self.stats.ticks,
                    self.stats.frames_published,
                    self.stats.partial_pairs,
                    self.stats.read_failures,
                    self.stats.reconnect_attempts
                );
                last_health_log = Instant::now();
            }

            rate.sleep();
        }

        log::info!(
            "acquisition stopped after {} ticks ({} frames published)",
            self.stats.ticks,
            self.stats.frames_published
        );
        Ok(self.stats)
    }

    /// One tick: read a frame, stamp both messages identically, publish the pair.
    pub fn tick<C: SourceConnector>(
        &mut self,
        session: &mut StreamSession<C>,
    ) -> Result<(), AcquisitionError> {
        if self.ctx.shutdown.is_requested() {
            return Err(AcquisitionError::Cancelled);
        }
        self.stats.ticks += 1;
        if !session.is_connected() {
            return Err(AcquisitionError::Connection {
                address: self.ctx.stream_address().to_string(),
            });
        }

        let frame = session.read_frame()?;
        let header = Header::new(frame.captured_at, self.ctx.frame_id());
        let info = CameraInfoMessage::new(header.clone(), self.calibration);
        let image = ImageMessage::from_frame(frame, header);

        self.sink
            .publish_image(&image)
            .map_err(AcquisitionError::Processing)?;
        if let Err(err) = self.sink.publish_camera_info(&info) {
            self.stats.partial_pairs += 1;
            return Err(AcquisitionError::Processing(err.context(format!(
                "camera_info missing for image stamped {}ns",
                info.header.stamp.as_nanos()
            ))));
        }

        self.stats.frames_published += 1;
        Ok(())
    }

    fn handle_outcome<C: SourceConnector>(
        &mut self,
        outcome: Result<(), AcquisitionError>,
        session: &mut StreamSession<C>,
    ) {
        let err = match outcome {
            Ok(()) => return,
            Err(err) => err,
        };
        match &err {
            AcquisitionError::Connection { .. } => {
                self.stats.connection_failures += 1;
                log::warn!("{}; attempting to reconnect to camera...", err);
            }
            AcquisitionError::Read { .. } => {
                self.stats.read_failures += 1;
                log::warn!("{}; attempting to reconnect...", err);
            }
            AcquisitionError::Processing(_) => {
                self.stats.processing_failures += 1;
                log::error!("error processing frame: {}", err);
            }
            AcquisitionError::Configuration { .. } | AcquisitionError::Cancelled => {
                log::error!("unexpected tick outcome: {}", err);
            }
        }
        if err.requires_reconnect() {
            self.stats.reconnect_attempts += 1;
            session.open(self.ctx.stream_address());
        }
    }
}

/// Closes the wrapped session when dropped, whichever way `run` exits.
struct CloseOnExit<'s, C: SourceConnector>(&'s mut StreamSession<C>);

impl<C: SourceConnector> Deref for CloseOnExit<'_, C> {
    type Target = StreamSession<C>;

    fn deref(&self) -> &Self::Target {
        self.0
    }
}

impl<C: SourceConnector> DerefMut for CloseOnExit<'_, C> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.0
    }
}

impl<C: SourceConnector> Drop for CloseOnExit<'_, C> {
    fn drop(&mut self) {
        self.0.close();
    }
}
