use config::ConfigError;
use serde::Deserialize;

#[derive(Deserialize, Clone)]
pub struct Settings {
    pub server: ServerSettings,
    #[serde(default)]
    pub session: SessionSettings,
    pub store: StoreSettings,
    pub notifications: NotificationSettings,
    pub inbox: InboxSettings,
    pub media: MediaSettings,
}

#[derive(Deserialize, Clone)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
    pub cors_origins: String,
}

#[derive(Deserialize, Clone, Default)]
pub struct SessionSettings {
    /// Actor used when a request carries no `x-actor-id` header. Unset means signed out.
    pub actor_id: Option<String>,
}

#[derive(Deserialize, Clone)]
pub struct StoreSettings {
    pub latency_ms: u64,
    pub seed_demo: bool,
}

#[derive(Deserialize, Clone)]
pub struct NotificationSettings {
    pub max_attempts: u32,
    pub backoff_ms: u64,
}

#[derive(Deserialize, Clone)]
pub struct InboxSettings {
    pub page_size: usize,
}

#[derive(Deserialize, Clone)]
pub struct MediaSettings {
    pub max_bytes: usize,
    pub public_base_url: String,
}

impl Settings {
    pub fn new() -> Result<Self, ConfigError> {
        let run_mode = std::env::var("RUN_MODE").unwrap_or_else(|_| "development".to_string());

        let s = config::Config::builder()
            .set_default("server.host", "0.0.0.0")?
            .set_default("server.port", 3000)?
            .set_default("server.cors_origins", "*")?
            .set_default("store.latency_ms", 0)?
            .set_default("store.seed_demo", true)?
            .set_default("notifications.max_attempts", 3)?
            .set_default("notifications.backoff_ms", 500)?
            .set_default("inbox.page_size", engine::DEFAULT_PAGE_SIZE as i64)?
            .set_default("media.max_bytes", 5 * 1024 * 1024)?
            .set_default("media.public_base_url", "http://127.0.0.1:3000")?
            .add_source(config::File::with_name("config").required(false))
            .add_source(config::File::with_name(&format!("config.{}", run_mode)).required(false))
            // MURMUR_SERVER__PORT=8080, MURMUR_SESSION__ACTOR_ID=alice
            .add_source(
                config::Environment::with_prefix("MURMUR")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        s.try_deserialize()
    }
}
