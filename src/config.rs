use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;

use figment::providers::{Env, Serialized};
use figment::Figment;
use mime_guess::Mime;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

const DEFAULT_CHUNK_SIZE: usize = 64 * 1024;
/// Largest accepted `chunk_size`.
pub const MAX_CHUNK_SIZE: usize = 16 * 1024 * 1024;
const DEFAULT_CONTENT_TYPE: &str = "video/mp4";

/// What to do with a `Range` header that does not follow the `bytes=` grammar.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MalformedRangePolicy {
    /// Serve the full representation as if no header was sent.
    #[default]
    Ignore,
    /// Answer `416 Range Not Satisfiable`.
    Reject,
}

/// Tuning for [`RangeServer`](crate::RangeServer).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamConfig {
    /// Upper bound, in bytes, of every chunk read from disk. At most
    /// [`MAX_CHUNK_SIZE`].
    pub chunk_size: usize,
    /// Media type used when none can be derived from the file extension.
    pub default_content_type: String,
    /// Guess the media type from the file extension before falling back.
    pub derive_content_type: bool,
    pub malformed_range: MalformedRangePolicy,
}

impl Default for StreamConfig {
    fn default() -> Self {
        StreamConfig {
            chunk_size: DEFAULT_CHUNK_SIZE,
            default_content_type: DEFAULT_CONTENT_TYPE.to_owned(),
            derive_content_type: true,
            malformed_range: MalformedRangePolicy::default(),
        }
    }
}

impl StreamConfig {
    pub(crate) fn default_mime(&self) -> Result<Mime, ConfigError> {
        if self.chunk_size == 0 {
            return Err(ConfigError::ZeroChunkSize);
        }
        if self.chunk_size > MAX_CHUNK_SIZE {
            return Err(ConfigError::ChunkSizeTooLarge { chunk_size: self.chunk_size, max: MAX_CHUNK_SIZE });
        }
        self.default_content_type
            .parse()
            .map_err(|_| ConfigError::ContentType(self.default_content_type.clone()))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: IpAddr,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig { host: Ipv4Addr::LOCALHOST.into(), port: 3000 }
    }
}

impl ServerConfig {
    pub fn bind_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }
}

/// Configuration of the `video-range` binary.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    /// Directory media paths are resolved against.
    pub media_root: PathBuf,
    pub stream: StreamConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        AppConfig {
            server: ServerConfig::default(),
            media_root: PathBuf::from("media"),
            stream: StreamConfig::default(),
        }
    }
}

impl AppConfig {
    pub const ENV_PREFIX: &'static str = "VIDEO_RANGE_";

    /// Defaults overlaid with `VIDEO_RANGE_*` environment variables, `__`
    /// separating nested keys (`VIDEO_RANGE_STREAM__CHUNK_SIZE=8192`).
    pub fn figment() -> Figment {
        Figment::from(Serialized::defaults(AppConfig::default()))
            .merge(Env::prefixed(Self::ENV_PREFIX).split("__"))
    }

    pub fn load() -> Result<Self, ConfigError> {
        Self::from_figment(Self::figment())
    }

    pub fn from_figment(figment: Figment) -> Result<Self, ConfigError> {
        let config: AppConfig = figment.extract()?;
        config.stream.default_mime()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use figment::providers::Serialized;

    use super::*;

    #[test]
    fn test_defaults() {
        let config = AppConfig::from_figment(AppConfig::figment()).unwrap();
        assert_eq!(64 * 1024, config.stream.chunk_size);
        assert_eq!("video/mp4", config.stream.default_content_type);
        assert_eq!(MalformedRangePolicy::Ignore, config.stream.malformed_range);
    }

    #[test]
    fn test_override_stream_settings() {
        let figment = AppConfig::figment()
            .merge(Serialized::default("stream.chunk_size", 4096))
            .merge(Serialized::default("stream.malformed_range", "reject"));
        let config = AppConfig::from_figment(figment).unwrap();
        assert_eq!(4096, config.stream.chunk_size);
        assert_eq!(MalformedRangePolicy::Reject, config.stream.malformed_range);
    }

    #[test]
    fn test_env_overrides() {
        figment::Jail::expect_with(|jail| {
            jail.set_env("VIDEO_RANGE_SERVER__PORT", "8081");
            jail.set_env("VIDEO_RANGE_STREAM__DEFAULT_CONTENT_TYPE", "video/webm");
            let config = AppConfig::load().unwrap();
            assert_eq!(8081, config.server.port);
            assert_eq!("video/webm", config.stream.default_content_type);
            Ok(())
        });
    }

    #[test]
    fn test_rejects_zero_chunk_size() {
        let figment = AppConfig::figment().merge(Serialized::default("stream.chunk_size", 0));
        assert_matches!(AppConfig::from_figment(figment), Err(ConfigError::ZeroChunkSize));
    }

    #[test]
    fn test_rejects_oversized_chunk_size() {
        figment::Jail::expect_with(|jail| {
            jail.set_env("VIDEO_RANGE_STREAM__CHUNK_SIZE", (MAX_CHUNK_SIZE + 1).to_string());
            assert_matches!(
                AppConfig::load(),
                Err(ConfigError::ChunkSizeTooLarge { chunk_size, max: MAX_CHUNK_SIZE }) if chunk_size == MAX_CHUNK_SIZE + 1
            );
            Ok(())
        });

        let largest = StreamConfig { chunk_size: MAX_CHUNK_SIZE, ..StreamConfig::default() };
        assert!(largest.default_mime().is_ok());
    }

    #[test]
    fn test_rejects_bad_content_type() {
        let figment = AppConfig::figment()
            .merge(Serialized::default("stream.default_content_type", "not a mime"));
        assert_matches!(AppConfig::from_figment(figment), Err(ConfigError::ContentType(_)));
    }
}
