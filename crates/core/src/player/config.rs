use std::time::Duration;

use crate::error::RtspStatus;

/// Reconnect policy for transient server failures.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Reconnects allowed between two explicit `start()` calls.
    pub max_retries: u32,
    /// Delay before reconnecting.
    pub backoff: Duration,
    /// Transport statuses that trigger a reconnect. Anything else is
    /// reported to the caller as-is.
    pub retryable_statuses: Vec<RtspStatus>,
}

impl RetryPolicy {
    pub fn is_retryable(&self, status: RtspStatus) -> bool {
        self.retryable_statuses.contains(&status)
    }

    /// Never reconnect.
    pub fn disabled() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            backoff: Duration::from_millis(500),
            retryable_statuses: vec![RtspStatus::INTERNAL_SERVER_ERROR],
        }
    }
}

/// Player-level configuration.
#[derive(Debug, Clone)]
pub struct PlayerConfig {
    pub retry: RetryPolicy,
    /// Bounded wait for hardware codec input/output buffers.
    pub codec_timeout: Duration,
    /// How long `stop()` waits for each decode worker.
    pub worker_join_timeout: Duration,
    /// Frames buffered per track between the network and the decode worker.
    pub frame_queue_capacity: usize,
    /// Audio sink size as a multiple of the device minimum buffer size.
    pub audio_buffer_margin: usize,
    /// Deliver decoded video as [`PlayerEvent::VideoFrame`](crate::PlayerEvent::VideoFrame)
    /// while no render target is bound. Off by default.
    pub frame_events: bool,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            retry: RetryPolicy::default(),
            codec_timeout: Duration::from_millis(10),
            worker_join_timeout: Duration::from_millis(500),
            frame_queue_capacity: 64,
            audio_buffer_margin: 2,
            frame_events: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = PlayerConfig::default();
        assert_eq!(config.retry.max_retries, 3);
        assert_eq!(config.retry.backoff, Duration::from_millis(500));
        assert_eq!(config.codec_timeout, Duration::from_millis(10));
        assert_eq!(config.worker_join_timeout, Duration::from_millis(500));
        assert_eq!(config.audio_buffer_margin, 2);
        assert!(!config.frame_events);
    }

    #[test]
    fn only_internal_server_error_retryable() {
        let retry = RetryPolicy::default();
        assert!(retry.is_retryable(RtspStatus::INTERNAL_SERVER_ERROR));
        assert!(!retry.is_retryable(RtspStatus::SERVICE_UNAVAILABLE));
        assert!(!retry.is_retryable(RtspStatus::NOT_FOUND));
        assert!(!retry.is_retryable(RtspStatus::UNKNOWN));
        assert_eq!(RetryPolicy::disabled().max_retries, 0);
    }
}
