use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::env;
use std::time::Duration;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub longpoll: LongPollConfig,
    #[serde(default)]
    pub sse: SseConfig,
    #[serde(default)]
    pub pubsub: PubSubConfig,
    #[serde(default)]
    pub otel: OtelConfig,
    #[serde(default)]
    pub shutdown: ShutdownSettings,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default)]
    pub cors_origins: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LongPollConfig {
    /// How long a waiter is held open before a timeout response (milliseconds)
    #[serde(default = "default_longpoll_timeout_ms")]
    pub timeout_ms: u64,
    /// Events buffered while nobody is waiting; oldest is dropped beyond this
    #[serde(default = "default_max_pending")]
    pub max_pending: usize,
    /// Largest accepted publish body in bytes
    #[serde(default = "default_max_payload_bytes")]
    pub max_payload_bytes: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SseConfig {
    /// Interval between ticks on the SSE stream (milliseconds)
    #[serde(default = "default_tick_interval_ms")]
    pub tick_interval_ms: u64,
    /// Keep-alive comment interval in seconds, 0 disables it
    #[serde(default = "default_keep_alive_secs")]
    pub keep_alive_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PubSubConfig {
    #[serde(default = "default_greeting_destination")]
    pub greeting_destination: String,
    #[serde(default = "default_greeting_topic")]
    pub greeting_topic: String,
    #[serde(default = "default_greeting_prefix")]
    pub greeting_prefix: String,
    /// Destinations under this prefix are served by the in-memory broker
    #[serde(default = "default_broker_prefix")]
    pub broker_prefix: String,
    /// Outbound frames buffered per WebSocket session before it counts as slow
    #[serde(default = "default_sink_buffer")]
    pub sink_buffer: usize,
    #[serde(default = "default_max_frame_bytes")]
    pub max_frame_bytes: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OtelConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_otel_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_service_name")]
    pub service_name: String,
    #[serde(default = "default_sampling_ratio")]
    pub sampling_ratio: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ShutdownSettings {
    /// Time to wait for streams and sessions to close after the shutdown signal
    #[serde(default = "default_drain_timeout_secs")]
    pub drain_timeout_secs: u64,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_longpoll_timeout_ms() -> u64 {
    10_000
}

fn default_max_pending() -> usize {
    1000
}

fn default_max_payload_bytes() -> usize {
    64 * 1024
}

fn default_tick_interval_ms() -> u64 {
    1000
}

fn default_keep_alive_secs() -> u64 {
    15
}

fn default_greeting_destination() -> String {
    "/app/hello".to_string()
}

fn default_greeting_topic() -> String {
    "/topic/greetings".to_string()
}

fn default_greeting_prefix() -> String {
    "Hello: ".to_string()
}

fn default_broker_prefix() -> String {
    "/topic".to_string()
}

fn default_sink_buffer() -> usize {
    32
}

fn default_max_frame_bytes() -> usize {
    64 * 1024
}

fn default_otel_endpoint() -> String {
    "http://localhost:4317".to_string()
}

fn default_service_name() -> String {
    "push-patterns-service".to_string()
}

fn default_sampling_ratio() -> f64 {
    1.0
}

fn default_drain_timeout_secs() -> u64 {
    5
}

impl Settings {
    pub fn new() -> Result<Self, ConfigError> {
        // Load .env file if exists
        let _ = dotenvy::dotenv();

        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let builder = Config::builder()
            // Start with default values
            .set_default("server.host", "0.0.0.0")?
            .set_default("server.port", 8080)?
            .set_default("longpoll.timeout_ms", 10_000)?
            .set_default("sse.tick_interval_ms", 1000)?
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name(&format!("config/{}", run_mode)).required(false))
            // SERVER__PORT, LONGPOLL__TIMEOUT_MS, SSE__TICK_INTERVAL_MS, ...
            .add_source(
                Environment::default()
                    .separator("__")
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("server.cors_origins"),
            );

        let settings: Settings = builder.build()?.try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    /// Reject values the runtime cannot work with (zero-length timers, empty buffers).
    pub fn validate(&self) -> Result<(), ConfigError> {
        let checks = [
            (self.longpoll.timeout_ms == 0, "longpoll.timeout_ms must be greater than 0"),
            (self.longpoll.max_pending == 0, "longpoll.max_pending must be greater than 0"),
            (
                self.longpoll.max_payload_bytes == 0,
                "longpoll.max_payload_bytes must be greater than 0",
            ),
            (self.sse.tick_interval_ms == 0, "sse.tick_interval_ms must be greater than 0"),
            (self.pubsub.sink_buffer == 0, "pubsub.sink_buffer must be greater than 0"),
            (self.pubsub.max_frame_bytes == 0, "pubsub.max_frame_bytes must be greater than 0"),
            (
                !self.pubsub.greeting_topic.starts_with(&self.pubsub.broker_prefix),
                "pubsub.greeting_topic must live under pubsub.broker_prefix",
            ),
        ];

        match checks.iter().find(|(failed, _)| *failed) {
            Some((_, message)) => Err(ConfigError::Message((*message).to_string())),
            None => Ok(()),
        }
    }

    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}

impl LongPollConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl SseConfig {
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            cors_origins: vec![],
        }
    }
}

impl Default for LongPollConfig {
    fn default() -> Self {
        Self {
            timeout_ms: default_longpoll_timeout_ms(),
            max_pending: default_max_pending(),
            max_payload_bytes: default_max_payload_bytes(),
        }
    }
}

impl Default for SseConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: default_tick_interval_ms(),
            keep_alive_secs: default_keep_alive_secs(),
        }
    }
}

impl Default for PubSubConfig {
    fn default() -> Self {
        Self {
            greeting_destination: default_greeting_destination(),
            greeting_topic: default_greeting_topic(),
            greeting_prefix: default_greeting_prefix(),
            broker_prefix: default_broker_prefix(),
            sink_buffer: default_sink_buffer(),
            max_frame_bytes: default_max_frame_bytes(),
        }
    }
}

impl Default for OtelConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            endpoint: default_otel_endpoint(),
            service_name: default_service_name(),
            sampling_ratio: default_sampling_ratio(),
        }
    }
}

impl Default for ShutdownSettings {
    fn default() -> Self {
        Self {
            drain_timeout_secs: default_drain_timeout_secs(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_values() {
        let settings = Settings::default();
        assert_eq!(settings.server.host, "0.0.0.0");
        assert_eq!(settings.server.port, 8080);
        assert_eq!(settings.longpoll.timeout(), Duration::from_secs(10));
        assert_eq!(settings.sse.tick_interval(), Duration::from_secs(1));
        assert_eq!(settings.pubsub.greeting_destination, "/app/hello");
        assert_eq!(settings.pubsub.greeting_topic, "/topic/greetings");
        assert_eq!(settings.pubsub.greeting_prefix, "Hello: ");
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_zero_timeout() {
        let mut settings = Settings::default();
        settings.longpoll.timeout_ms = 0;
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_zero_tick_interval() {
        let mut settings = Settings::default();
        settings.sse.tick_interval_ms = 0;
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_topic_outside_broker() {
        let mut settings = Settings::default();
        settings.pubsub.greeting_topic = "/queue/greetings".to_string();
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_server_addr() {
        let settings = Settings::default();
        assert_eq!(settings.server_addr(), "0.0.0.0:8080");
    }
}
