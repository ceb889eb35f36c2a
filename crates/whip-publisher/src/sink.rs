//! Track sink abstraction
//!
//! The pacer hands timed samples to a [`TrackSink`]. The sink forwards them at
//! whatever cadence it is called; pacing is entirely the caller's job.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use webrtc::media::Sample;
use webrtc::track::track_local::track_local_static_sample::TrackLocalStaticSample;

use crate::error::{Result, WhipError};

/// Outbound media capability accepting timed sample buffers
#[async_trait]
pub trait TrackSink: Send + Sync {
    /// Submit one sample covering `duration` of playout
    async fn write(&self, payload: Bytes, duration: Duration) -> Result<()>;
}

#[async_trait]
impl TrackSink for TrackLocalStaticSample {
    async fn write(&self, payload: Bytes, duration: Duration) -> Result<()> {
        self.write_sample(&Sample {
            data: payload,
            duration,
            ..Default::default()
        })
        .await
        .map_err(|e| WhipError::sink(e.to_string()))
    }
}

#[async_trait]
impl<T: TrackSink + ?Sized> TrackSink for Arc<T> {
    async fn write(&self, payload: Bytes, duration: Duration) -> Result<()> {
        (**self).write(payload, duration).await
    }
}
