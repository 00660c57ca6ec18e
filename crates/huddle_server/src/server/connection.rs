#![forbid(unsafe_code)]

use std::future::Future;
use std::net::SocketAddr;

use anyhow::Context as _;
use futures::{SinkExt as _, StreamExt as _};
use huddle_protocol::DEFAULT_MAX_MESSAGE_SIZE;
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::tungstenite::error::ProtocolError;
use tokio_tungstenite::tungstenite::protocol::WebSocketConfig;
use tokio_tungstenite::tungstenite::{self, Message};
use tracing::{debug, info, warn};

use crate::server::handle::OutboundHandle;
use crate::server::hub::RelayHub;

/// Per-connection transport settings.
#[derive(Debug, Clone)]
pub struct ConnectionSettings {
	/// Largest WebSocket message (and frame) accepted from a peer.
	pub max_message_bytes: usize,
}

impl Default for ConnectionSettings {
	fn default() -> Self {
		Self {
			max_message_bytes: DEFAULT_MAX_MESSAGE_SIZE,
		}
	}
}

impl ConnectionSettings {
	fn websocket_config(&self) -> WebSocketConfig {
		WebSocketConfig::default()
			.max_message_size(Some(self.max_message_bytes))
			.max_frame_size(Some(self.max_message_bytes))
	}
}

/// Accept connections until `shutdown` resolves.
pub async fn run_listener(
	listener: TcpListener,
	hub: RelayHub,
	settings: ConnectionSettings,
	shutdown: impl Future<Output = ()>,
) -> anyhow::Result<()> {
	tokio::pin!(shutdown);

	loop {
		let (stream, remote) = tokio::select! {
			_ = &mut shutdown => {
				info!("listener shutting down");
				return Ok(());
			}
			accepted = listener.accept() => match accepted {
				Ok(pair) => pair,
				Err(e) => {
					warn!(error = %e, "failed to accept tcp connection");
					continue;
				}
			},
		};

		metrics::counter!("huddle_server_connections_total").increment(1);

		let hub = hub.clone();
		let settings = settings.clone();
		tokio::spawn(async move {
			if let Err(e) = handle_connection(stream, remote, hub, settings).await {
				warn!(remote = %remote, error = %e, "connection handler exited with error");
			}
		});
	}
}

/// Drive one peer: upgrade, register, pump frames into the hub, tear down.
pub async fn handle_connection(
	stream: TcpStream,
	remote: SocketAddr,
	hub: RelayHub,
	settings: ConnectionSettings,
) -> anyhow::Result<()> {
	struct ConnectionGaugeGuard;
	impl Drop for ConnectionGaugeGuard {
		fn drop(&mut self) {
			metrics::gauge!("huddle_server_active_connections").decrement(1.0);
		}
	}

	if let Err(e) = stream.set_nodelay(true) {
		debug!(remote = %remote, error = %e, "failed to set TCP_NODELAY");
	}

	let ws = tokio_tungstenite::accept_async_with_config(stream, Some(settings.websocket_config()))
		.await
		.context("websocket handshake")?;

	metrics::gauge!("huddle_server_active_connections").increment(1.0);
	let _conn_guard = ConnectionGaugeGuard;

	let (mut sink, mut source) = ws.split();
	let (handle, mut outbound_rx) = OutboundHandle::channel();

	let mut writer = tokio::spawn(async move {
		while let Some(text) = outbound_rx.recv().await {
			sink.send(Message::Text(text.into()))
				.await
				.context("websocket write failed")?;
		}
		sink.close().await.ok();
		Ok::<(), anyhow::Error>(())
	});

	let conn_id = hub.on_connect(Box::new(handle)).await;
	info!(conn_id = %conn_id, remote = %remote, "accepted connection");

	let mut writer_done = false;

	let outcome: Result<(), tungstenite::Error> = loop {
		tokio::select! {
			frame = source.next() => match frame {
				Some(Ok(Message::Text(text))) => hub.on_message(conn_id, text.as_str()).await,
				Some(Ok(Message::Binary(data))) => match std::str::from_utf8(&data) {
					Ok(text) => hub.on_message(conn_id, text).await,
					Err(_) => {
						metrics::counter!("huddle_server_malformed_frames_total").increment(1);
						debug!(conn_id = %conn_id, len = data.len(), "discarding non-utf8 binary frame");
					}
				},
				Some(Ok(Message::Close(frame))) => {
					debug!(conn_id = %conn_id, ?frame, "peer sent close");
					break Ok(());
				}
				// tungstenite queues pong replies itself.
				Some(Ok(Message::Ping(_) | Message::Pong(_) | Message::Frame(_))) => {}
				Some(Err(e)) => break Err(e),
				None => break Ok(()),
			},
			joined = &mut writer, if !writer_done => {
				writer_done = true;
				match joined {
					Ok(Ok(())) => debug!(conn_id = %conn_id, "outbound channel closed"),
					Ok(Err(e)) => debug!(conn_id = %conn_id, error = %e, "outbound writer stopped"),
					Err(e) => warn!(conn_id = %conn_id, error = %e, "outbound writer task failed"),
				}
				break Ok(());
			}
		}
	};

	match outcome {
		Ok(()) => hub.on_close(conn_id).await,
		Err(e) if is_abrupt_close(&e) => {
			debug!(conn_id = %conn_id, error = %e, "peer dropped without close handshake");
			hub.on_close(conn_id).await;
		}
		Err(e) => hub.on_error(conn_id, &e).await,
	}

	// The registry owned the only sender; once the client is gone the writer drains and exits.
	if !writer_done {
		let _ = writer.await;
	}

	Ok(())
}

/// A dropped TCP stream still counts as a close: the room is told the peer left.
fn is_abrupt_close(err: &tungstenite::Error) -> bool {
	matches!(
		err,
		tungstenite::Error::ConnectionClosed | tungstenite::Error::Protocol(ProtocolError::ResetWithoutClosingHandshake)
	)
}
