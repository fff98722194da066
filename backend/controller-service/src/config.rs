use crate::error::AppError;
use crate::ingest::{BackoffConfig, IngestConfig, KafkaSourceConfig, OffsetReset};
use dotenvy::dotenv;
use std::env;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct KafkaConfig {
    pub bootstrap_servers: String,
    pub topic: String,
    pub offset_reset: OffsetReset,
    pub poll_timeout_ms: u64,
    pub session_timeout_ms: u64,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub kafka: KafkaConfig,
    /// `redis://` URL of the broadcast backplane
    pub redis_url: String,
    pub backplane_channel: String,
    pub publish_timeout_ms: u64,
    pub backoff: BackoffConfig,
    pub port: u16,
}

impl Config {
    pub fn from_env() -> Result<Self, AppError> {
        dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build the config from any key lookup; the first key present wins.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, AppError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let first = |keys: &[&str]| {
            keys.iter()
                .filter_map(|key| lookup(key))
                .map(|v| v.trim().to_string())
                .find(|v| !v.is_empty())
        };

        let bootstrap_servers = first(&[
            "KAFKA_BOOTSTRAP_SERVERS",
            "Kafka__BootstrapServers",
            "KAFKA_BROKERS",
        ])
        .unwrap_or_else(|| "localhost:9092".to_string());

        let topic = first(&["KAFKA_TOPIC", "Kafka__Topic"])
            .unwrap_or_else(|| "measurements".to_string());

        let offset_reset = match first(&["KAFKA_AUTO_OFFSET_RESET", "Kafka__AutoOffsetReset"]) {
            Some(raw) => raw
                .parse::<OffsetReset>()
                .map_err(|e| AppError::Config(format!("KAFKA_AUTO_OFFSET_RESET: {e}")))?,
            None => OffsetReset::Latest,
        };

        let poll_timeout_ms = parse_number(first(&["KAFKA_POLL_TIMEOUT_MS"]), "KAFKA_POLL_TIMEOUT_MS", 1000)?;
        let session_timeout_ms =
            parse_number(first(&["KAFKA_SESSION_TIMEOUT_MS"]), "KAFKA_SESSION_TIMEOUT_MS", 10_000)?;
        if poll_timeout_ms == 0 {
            return Err(AppError::Config("KAFKA_POLL_TIMEOUT_MS must be positive".into()));
        }

        let redis_connection = first(&[
            "REDIS_CONNECTION_STRING",
            "Redis__ConnectionString",
            "REDIS_URL",
        ])
        .unwrap_or_else(|| "localhost:6379".to_string());
        let redis_url = normalize_redis_url(&redis_connection)?;

        let backplane_channel =
            first(&["BACKPLANE_CHANNEL"]).unwrap_or_else(|| "controller:broadcast".to_string());

        let publish_timeout_ms =
            parse_number(first(&["BROADCAST_TIMEOUT_MS"]), "BROADCAST_TIMEOUT_MS", 5000)?;
        if publish_timeout_ms == 0 {
            return Err(AppError::Config("BROADCAST_TIMEOUT_MS must be positive".into()));
        }

        let initial_secs = parse_number(
            first(&["INGEST_BACKOFF_INITIAL_SECS"]),
            "INGEST_BACKOFF_INITIAL_SECS",
            2,
        )?;
        let max_secs = parse_number(first(&["INGEST_BACKOFF_MAX_SECS"]), "INGEST_BACKOFF_MAX_SECS", 30)?;
        if initial_secs == 0 {
            return Err(AppError::Config("INGEST_BACKOFF_INITIAL_SECS must be positive".into()));
        }
        if initial_secs > max_secs {
            return Err(AppError::Config(format!(
                "INGEST_BACKOFF_INITIAL_SECS ({initial_secs}) exceeds INGEST_BACKOFF_MAX_SECS ({max_secs})"
            )));
        }

        let port = parse_number(first(&["PORT"]), "PORT", 8080)?;

        Ok(Self {
            kafka: KafkaConfig {
                bootstrap_servers,
                topic,
                offset_reset,
                poll_timeout_ms,
                session_timeout_ms,
            },
            redis_url,
            backplane_channel,
            publish_timeout_ms,
            backoff: BackoffConfig {
                initial: Duration::from_secs(initial_secs),
                max: Duration::from_secs(max_secs),
            },
            port,
        })
    }

    pub fn kafka_source_config(&self) -> KafkaSourceConfig {
        KafkaSourceConfig {
            bootstrap_servers: self.kafka.bootstrap_servers.clone(),
            offset_reset: self.kafka.offset_reset,
            session_timeout_ms: self.kafka.session_timeout_ms,
        }
    }

    pub fn ingest_config(&self, group_id: impl Into<String>) -> IngestConfig {
        IngestConfig {
            topic: self.kafka.topic.clone(),
            group_id: group_id.into(),
            poll_timeout: Duration::from_millis(self.kafka.poll_timeout_ms),
            publish_timeout: Duration::from_millis(self.publish_timeout_ms),
            backoff: self.backoff,
        }
    }
}

fn parse_number<T: std::str::FromStr>(raw: Option<String>, key: &str, default: T) -> Result<T, AppError>
where
    T::Err: std::fmt::Display,
{
    match raw {
        Some(value) => value
            .parse()
            .map_err(|e| AppError::Config(format!("{key}: invalid value '{value}': {e}"))),
        None => Ok(default),
    }
}

/// Accepts a `redis://` URL or a `host:port[,option=value...]` connection
/// string and returns a URL the redis client understands.
///
/// Recognized options: `password`, `user`, `ssl`, `defaultDatabase`.
/// Credentials are percent-encoded. `ssl=true` is rejected: the redis client
/// is built without TLS support.
pub fn normalize_redis_url(raw: &str) -> Result<String, AppError> {
    let raw = raw.trim();
    if raw.starts_with("rediss://") {
        return Err(AppError::Config(
            "Redis TLS (rediss://) is not supported by this build".into(),
        ));
    }
    if raw.contains("://") {
        return Ok(raw.to_string());
    }

    let mut parts = raw.split(',').map(str::trim);
    let endpoint = parts
        .next()
        .filter(|s| !s.is_empty())
        .ok_or_else(|| AppError::Config("empty Redis connection string".into()))?;

    let mut password = None;
    let mut user = None;
    let mut database = None;

    for option in parts.filter(|s| !s.is_empty()) {
        let (key, value) = option
            .split_once('=')
            .ok_or_else(|| AppError::Config(format!("invalid Redis option '{option}'")))?;
        match key.trim().to_ascii_lowercase().as_str() {
            "password" => password = Some(value.trim().to_string()),
            "user" => user = Some(value.trim().to_string()),
            "ssl" if value.trim().eq_ignore_ascii_case("true") => {
                return Err(AppError::Config(
                    "Redis ssl=true is not supported by this build".into(),
                ));
            }
            "ssl" => {}
            "defaultdatabase" => {
                let db: u32 = value.trim().parse().map_err(|_| {
                    AppError::Config(format!("invalid Redis defaultDatabase '{value}'"))
                })?;
                database = Some(db);
            }
            other => tracing::debug!(option = %other, "Ignoring unsupported Redis option"),
        }
    }

    let user = user.map(|u| urlencoding::encode(&u).into_owned());
    let password = password.map(|p| urlencoding::encode(&p).into_owned());
    let credentials = match (user, password) {
        (Some(u), Some(p)) => format!("{u}:{p}@"),
        (None, Some(p)) => format!(":{p}@"),
        (Some(u), None) => format!("{u}@"),
        (None, None) => String::new(),
    };
    let database = database.map(|db| format!("/{db}")).unwrap_or_default();

    Ok(format!("redis://{credentials}{endpoint}{database}"))
}
