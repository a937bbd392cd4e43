mod settings;

pub use settings::{
    LongPollConfig, OtelConfig, PubSubConfig, ServerConfig, Settings, ShutdownSettings, SseConfig,
};
