#![forbid(unsafe_code)]

use std::fmt;
use std::sync::Arc;

use huddle_domain::ConnectionId;
use huddle_protocol::DEFAULT_MAX_MESSAGE_SIZE;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::server::error::RelayError;
use crate::server::handle::ConnectionHandle;
use crate::server::router::Routed;
use crate::server::state::{RelayState, StatusSnapshot};
use crate::util::time::unix_ms_now;

/// Shared entry point used by connection tasks.
///
/// Every operation takes the single state lock and runs to completion without awaiting, so routing and
/// lifecycle transitions never interleave.
#[derive(Debug, Clone)]
pub struct RelayHub {
	inner: Arc<Mutex<RelayState>>,
	cfg: RelayHubConfig,
}

/// Configuration for `RelayHub`.
#[derive(Debug, Clone)]
pub struct RelayHubConfig {
	/// Text of the `system` greeting sent on connect.
	pub welcome_message: String,

	/// Frames larger than this are discarded as malformed.
	pub max_message_bytes: usize,
}

impl Default for RelayHubConfig {
	fn default() -> Self {
		Self {
			welcome_message: "Connected to chat server".to_string(),
			max_message_bytes: DEFAULT_MAX_MESSAGE_SIZE,
		}
	}
}

impl RelayHub {
	pub fn new(cfg: RelayHubConfig) -> Self {
		Self {
			inner: Arc::new(Mutex::new(RelayState::default())),
			cfg,
		}
	}

	pub async fn on_connect(&self, handle: Box<dyn ConnectionHandle>) -> ConnectionId {
		let mut state = self.inner.lock().await;
		state.connect(handle, &self.cfg.welcome_message, unix_ms_now())
	}

	/// Route one inbound text frame. Failures are logged and counted, never returned to the transport.
	pub async fn on_message(&self, id: ConnectionId, text: &str) {
		metrics::counter!("huddle_server_frames_in_total").increment(1);

		let mut state = self.inner.lock().await;
		match state.handle_message(id, text, self.cfg.max_message_bytes) {
			Ok(routed) => record_routed(id, &routed),
			Err(e @ RelayError::Malformed(_)) => {
				metrics::counter!("huddle_server_malformed_frames_total").increment(1);
				warn!(conn_id = %id, error = %e, "discarding malformed message");
			}
			Err(e) => {
				metrics::counter!("huddle_server_rejected_frames_total", "reason" => e.label()).increment(1);
				debug!(conn_id = %id, error = %e, "message dropped");
			}
		}
	}

	pub async fn on_close(&self, id: ConnectionId) {
		let mut state = self.inner.lock().await;
		if let Some(report) = state.disconnect(id, unix_ms_now()) {
			metrics::counter!("huddle_server_deliveries_total").increment(report.delivered as u64);
			metrics::counter!("huddle_server_reaped_total").increment(report.reaped.len() as u64);
		}
	}

	pub async fn on_error(&self, id: ConnectionId, err: &(dyn fmt::Display + Sync)) {
		let mut state = self.inner.lock().await;
		state.fail(id, err);
	}

	/// Read-only view for the status endpoint.
	pub async fn snapshot(&self) -> StatusSnapshot {
		self.inner.lock().await.snapshot()
	}
}

fn record_routed(id: ConnectionId, routed: &Routed) {
	match routed {
		Routed::Joined { room, previous, report } => {
			debug!(conn_id = %id, room = %room, previous = ?previous, delivered = report.delivered, "join routed");
		}
		Routed::Relayed {
			room,
			excluded_sender,
			report,
		} => {
			debug!(
				conn_id = %id,
				room = %room,
				excluded_sender,
				delivered = report.delivered,
				"message relayed"
			);
		}
	}

	let report = routed.report();
	metrics::counter!("huddle_server_deliveries_total").increment(report.delivered as u64);
	if !report.reaped.is_empty() {
		metrics::counter!("huddle_server_reaped_total").increment(report.reaped.len() as u64);
	}
}
