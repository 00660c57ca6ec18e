#![forbid(unsafe_code)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use bytes::Bytes;
use http_body_util::Full;
use hyper::body::Incoming;
use hyper::header::{CONTENT_TYPE, HeaderValue};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use serde::Serialize;
use tokio::net::TcpListener;
use tracing::warn;

use crate::server::hub::RelayHub;
use crate::server::state::StatusSnapshot;
use crate::util::time::uptime_secs;

#[derive(Clone)]
pub struct HealthState {
	ready: Arc<AtomicBool>,
	started: Instant,
	hub: RelayHub,
}

/// Body of `GET /health`.
#[derive(Debug, Serialize)]
pub struct HealthReport {
	pub status: &'static str,
	#[serde(flatten)]
	pub snapshot: StatusSnapshot,
	/// Seconds since the server started.
	pub uptime: f64,
}

impl HealthState {
	pub fn new(hub: RelayHub) -> Self {
		Self {
			ready: Arc::new(AtomicBool::new(false)),
			started: Instant::now(),
			hub,
		}
	}

	pub fn mark_ready(&self) {
		self.ready.store(true, Ordering::Relaxed);
	}

	pub fn is_ready(&self) -> bool {
		self.ready.load(Ordering::Relaxed)
	}

	pub async fn report(&self) -> HealthReport {
		HealthReport {
			status: "healthy",
			snapshot: self.hub.snapshot().await,
			uptime: uptime_secs(self.started),
		}
	}
}

pub fn spawn_health_server(bind: SocketAddr, state: HealthState) {
	tokio::spawn(async move {
		if let Err(err) = run_health_server(bind, state).await {
			warn!(error = %err, "health server stopped");
		}
	});
}

async fn run_health_server(bind: SocketAddr, state: HealthState) -> anyhow::Result<()> {
	let listener = TcpListener::bind(bind).await?;
	loop {
		let (stream, _addr) = listener.accept().await?;
		let io = TokioIo::new(stream);
		let state = state.clone();
		tokio::spawn(async move {
			let service = service_fn(move |req| handle_health(req, state.clone()));
			if let Err(err) = http1::Builder::new().serve_connection(io, service).await {
				warn!(error = %err, "health connection error");
			}
		});
	}
}

async fn handle_health(req: Request<Incoming>, state: HealthState) -> Result<Response<Full<Bytes>>, hyper::Error> {
	let method = req.method().clone();
	let path = req.uri().path().to_string();
	Ok(route(&method, &path, &state).await)
}

async fn route(method: &Method, path: &str, state: &HealthState) -> Response<Full<Bytes>> {
	if method != Method::GET {
		return respond(StatusCode::METHOD_NOT_ALLOWED, Bytes::new());
	}

	match path {
		"/health" => match serde_json::to_vec(&state.report().await) {
			Ok(body) => {
				let mut resp = respond(StatusCode::OK, Bytes::from(body));
				resp.headers_mut()
					.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
				resp
			}
			Err(e) => {
				warn!(error = %e, "failed to encode health report");
				respond(StatusCode::INTERNAL_SERVER_ERROR, Bytes::new())
			}
		},
		"/healthz" => respond(StatusCode::OK, Bytes::from_static(b"ok")),
		"/readyz" => {
			if state.is_ready() {
				respond(StatusCode::OK, Bytes::from_static(b"ready"))
			} else {
				respond(StatusCode::SERVICE_UNAVAILABLE, Bytes::from_static(b"not-ready"))
			}
		}
		_ => respond(StatusCode::NOT_FOUND, Bytes::from_static(b"Not Found")),
	}
}

fn respond(status: StatusCode, body: Bytes) -> Response<Full<Bytes>> {
	let mut resp = Response::new(Full::new(body));
	*resp.status_mut() = status;
	resp
}

#[cfg(test)]
mod tests {
	use http_body_util::BodyExt as _;

	use super::*;
	use crate::server::handle::OutboundHandle;
	use crate::server::hub::RelayHubConfig;

	async fn body_of(resp: Response<Full<Bytes>>) -> Bytes {
		resp.into_body().collect().await.expect("collect body").to_bytes()
	}

	#[tokio::test]
	async fn health_reports_rooms_and_members() {
		let hub = RelayHub::new(RelayHubConfig::default());
		let state = HealthState::new(hub.clone());

		let (h1, _rx1) = OutboundHandle::channel();
		let (h2, _rx2) = OutboundHandle::channel();
		let a = hub.on_connect(Box::new(h1)).await;
		let _b = hub.on_connect(Box::new(h2)).await;
		hub.on_message(a, r#"{"type":"join","username":"alice","roomId":"R"}"#).await;

		let resp = route(&Method::GET, "/health", &state).await;
		assert_eq!(resp.status(), StatusCode::OK);
		assert_eq!(
			resp.headers().get(CONTENT_TYPE).map(HeaderValue::as_bytes),
			Some(&b"application/json"[..])
		);

		let v: serde_json::Value = serde_json::from_slice(&body_of(resp).await).expect("json");
		assert_eq!(v["status"], "healthy");
		assert_eq!(v["clients"], 2);
		assert_eq!(v["rooms"], 1);
		assert_eq!(v["roomDetails"][0]["roomId"], "R");
		assert_eq!(v["roomDetails"][0]["members"], 1);
		assert!(v["uptime"].as_f64().is_some());
	}

	#[tokio::test]
	async fn readiness_and_unknown_paths() {
		let state = HealthState::new(RelayHub::new(RelayHubConfig::default()));

		assert_eq!(route(&Method::GET, "/healthz", &state).await.status(), StatusCode::OK);
		assert_eq!(
			route(&Method::GET, "/readyz", &state).await.status(),
			StatusCode::SERVICE_UNAVAILABLE
		);
		state.mark_ready();
		assert_eq!(route(&Method::GET, "/readyz", &state).await.status(), StatusCode::OK);

		assert_eq!(route(&Method::GET, "/nope", &state).await.status(), StatusCode::NOT_FOUND);
		assert_eq!(
			route(&Method::POST, "/health", &state).await.status(),
			StatusCode::METHOD_NOT_ALLOWED
		);
	}
}
