#![forbid(unsafe_code)]

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context as _, anyhow};
use huddle_protocol::DEFAULT_MAX_MESSAGE_SIZE;
use huddle_util::endpoint::WsEndpoint;
use serde::Deserialize;
use tracing::{info, warn};

/// Listen endpoint used when nothing else is configured.
pub const DEFAULT_BIND: &str = "ws://0.0.0.0:8080";

/// Status endpoint address used when nothing else is configured. An empty `health_bind` disables it.
pub const DEFAULT_HEALTH_BIND: &str = "0.0.0.0:8081";

/// Greeting used when nothing else is configured.
pub const DEFAULT_WELCOME_MESSAGE: &str = "Connected to chat server";

/// Default config path: `~/.huddle/config.toml`.
pub fn default_config_path() -> anyhow::Result<PathBuf> {
	let home = dirs::home_dir().ok_or_else(|| anyhow!("could not determine home directory"))?;
	Ok(home.join(".huddle").join("config.toml"))
}

/// Load the server config from TOML and env overrides.
pub fn load_server_config_from_path(path: &Path) -> anyhow::Result<ServerConfig> {
	let file_cfg = read_toml_if_exists(path)
		.with_context(|| format!("read config from {}", path.display()))?
		.unwrap_or_default();

	let mut cfg = ServerConfig::from_file(file_cfg)?;

	apply_env_overrides(&mut cfg);

	Ok(cfg)
}

/// Server config (v1).
#[derive(Debug, Clone)]
pub struct ServerConfig {
	pub server: ServerSettings,
}

/// Server settings loaded by the server.
#[derive(Debug, Clone)]
pub struct ServerSettings {
	/// WebSocket listen endpoint.
	pub bind: WsEndpoint,
	/// Health/status HTTP bind address (host:port); `None` when disabled.
	pub health_bind: Option<String>,
	/// Optional metrics exporter bind address (host:port).
	pub metrics_bind: Option<String>,
	/// Text of the `system` greeting.
	pub welcome_message: String,
	/// Largest inbound message accepted.
	pub max_message_bytes: usize,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct FileConfig {
	#[serde(default)]
	server: FileServerSettings,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct FileServerSettings {
	bind: Option<String>,
	health_bind: Option<String>,
	metrics_bind: Option<String>,
	welcome_message: Option<String>,
	max_message_bytes: Option<usize>,
}

impl ServerConfig {
	fn from_file(file: FileConfig) -> anyhow::Result<Self> {
		let bind_s = file
			.server
			.bind
			.filter(|s| !s.trim().is_empty())
			.unwrap_or_else(|| DEFAULT_BIND.to_string());
		let bind = WsEndpoint::parse(&bind_s).map_err(|e| anyhow!(e).context("server.bind"))?;

		Ok(Self {
			server: ServerSettings {
				bind,
				health_bind: match file.server.health_bind {
					None => Some(DEFAULT_HEALTH_BIND.to_string()),
					Some(s) => Some(s.trim().to_string()).filter(|s| !s.is_empty()),
				},
				metrics_bind: file.server.metrics_bind.filter(|s| !s.trim().is_empty()),
				welcome_message: file
					.server
					.welcome_message
					.filter(|s| !s.trim().is_empty())
					.unwrap_or_else(|| DEFAULT_WELCOME_MESSAGE.to_string()),
				max_message_bytes: file
					.server
					.max_message_bytes
					.filter(|n| *n > 0)
					.unwrap_or(DEFAULT_MAX_MESSAGE_SIZE),
			},
		})
	}
}

fn read_toml_if_exists(path: &Path) -> anyhow::Result<Option<FileConfig>> {
	match fs::read_to_string(path) {
		Ok(s) => {
			let cfg: FileConfig = toml::from_str(&s).context("parse TOML")?;
			Ok(Some(cfg))
		}
		Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
		Err(e) => Err(anyhow!(e).context("read config file")),
	}
}

fn apply_env_overrides(cfg: &mut ServerConfig) {
	apply_overrides_from(cfg, |key| std::env::var(key).ok());
}

fn apply_overrides_from(cfg: &mut ServerConfig, env: impl Fn(&str) -> Option<String>) {
	if let Some(v) = env("HUDDLE_BIND") {
		let v = v.trim().to_string();
		if !v.is_empty() {
			match WsEndpoint::parse(&v) {
				Ok(bind) => {
					cfg.server.bind = bind;
					info!("server config: bind overridden by env");
				}
				Err(e) => warn!(error = %e, "server config: ignoring invalid HUDDLE_BIND"),
			}
		}
	}

	if let Some(v) = env("PORT") {
		match v.trim().parse::<u16>().map_err(|e| e.to_string()).and_then(|p| cfg.server.bind.with_port(p)) {
			Ok(bind) => {
				cfg.server.bind = bind;
				info!(port = cfg.server.bind.port, "server config: port overridden by env");
			}
			Err(e) => warn!(error = %e, "server config: ignoring invalid PORT"),
		}
	}

	if let Some(v) = env("HUDDLE_HEALTH_BIND") {
		let v = v.trim().to_string();
		if v.is_empty() {
			cfg.server.health_bind = None;
			info!("server config: health endpoint disabled by env");
		} else {
			cfg.server.health_bind = Some(v);
			info!("server config: health_bind overridden by env");
		}
	}

	if let Some(v) = env("HUDDLE_METRICS_BIND") {
		let v = v.trim().to_string();
		if !v.is_empty() {
			cfg.server.metrics_bind = Some(v);
			info!("server config: metrics_bind overridden by env");
		}
	}

	if let Some(v) = env("HUDDLE_WELCOME_MESSAGE") {
		let v = v.trim().to_string();
		if !v.is_empty() {
			cfg.server.welcome_message = v;
			info!("server config: welcome_message overridden by env");
		}
	}

	if let Some(v) = env("HUDDLE_MAX_MESSAGE_BYTES")
		&& let Ok(max) = v.trim().parse::<usize>()
		&& max > 0
	{
		cfg.server.max_message_bytes = max;
		info!(max, "server config: max_message_bytes overridden by env");
	}
}
