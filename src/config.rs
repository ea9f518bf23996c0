use std::time::Duration;

/// Runtime configuration for the broker, the relay and the transport.
///
/// Use the builder pattern to customize, or use [`Default`] for the
/// production values.
///
/// # Examples
///
/// ```rust
/// use std::time::Duration;
/// use pulsecast::Config;
///
/// let config = Config::default()
///     .with_client_queue_size(64)                        // Deeper per-client buffer
///     .with_event_send_timeout(Duration::from_secs(2));  // Give up on slow clients sooner
/// ```
#[derive(Debug, Clone)]
pub struct Config {
    /// Capacity of every client's inbound queue.
    /// Default: 32
    pub client_queue_size: usize,

    /// Capacity of the broker's command queue (register, unregister, publish).
    /// Register and publish beyond this are rejected rather than awaited.
    /// Default: 256
    pub command_queue_size: usize,

    /// How long a single delivery may wait for room in a client's queue
    /// before the event is dropped for that client.
    /// Default: 10 s
    pub event_send_timeout: Duration,

    /// Interval between two upstream fetches.
    /// Default: 10 s
    pub pulse_interval: Duration,

    /// Request timeout for a single upstream fetch.
    /// Keep it shorter than `pulse_interval`.
    /// Default: 10 s
    pub fetch_timeout: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            client_queue_size: 32,
            command_queue_size: 256,
            event_send_timeout: Duration::from_secs(10),
            pulse_interval: Duration::from_secs(10),
            fetch_timeout: Duration::from_secs(10),
        }
    }
}

impl Config {
    /// Set the capacity of each client's inbound queue. 0 is raised to 1.
    pub fn with_client_queue_size(mut self, size: usize) -> Self {
        self.client_queue_size = size.max(1);
        self
    }

    /// Set the capacity of the broker's command queue. 0 is raised to 1.
    ///
    /// When the queue is full, `register` and `publish` return
    /// [`Error::ChannelIsFull`](crate::Error::ChannelIsFull).
    pub fn with_command_queue_size(mut self, size: usize) -> Self {
        self.command_queue_size = size.max(1);
        self
    }

    /// Set the per-client delivery deadline.
    pub fn with_event_send_timeout(mut self, timeout: Duration) -> Self {
        self.event_send_timeout = timeout;
        self
    }

    pub fn with_pulse_interval(mut self, interval: Duration) -> Self {
        self.pulse_interval = interval;
        self
    }

    pub fn with_fetch_timeout(mut self, timeout: Duration) -> Self {
        self.fetch_timeout = timeout;
        self
    }
}
