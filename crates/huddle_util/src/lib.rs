#![forbid(unsafe_code)]

pub mod endpoint {
	/// Scheme accepted by [`WsEndpoint::parse`].
	pub const WS_SCHEME: &str = "ws://";

	/// Parsed `ws://host:port` listen endpoint.
	#[derive(Debug, Clone, PartialEq, Eq, Hash)]
	pub struct WsEndpoint {
		pub host: String,
		pub port: u16,
	}

	impl WsEndpoint {
		/// Returns `host:port` (host preserved, IPv6 stays bracketed).
		pub fn hostport(&self) -> String {
			format!("{}:{}", self.host, self.port)
		}

		/// Same host, different port.
		pub fn with_port(&self, port: u16) -> Result<Self, String> {
			if port == 0 {
				return Err("invalid endpoint port (expected 1..=65535): 0".to_string());
			}
			Ok(Self {
				host: self.host.clone(),
				port,
			})
		}

		/// Parse an endpoint string in the form `ws://host:port`.
		pub fn parse(s: &str) -> Result<Self, String> {
			let s = s.trim();
			if s.is_empty() {
				return Err("endpoint must be non-empty (expected ws://host:port)".to_string());
			}

			let rest = s
				.strip_prefix(WS_SCHEME)
				.ok_or_else(|| format!("invalid endpoint (expected ws://host:port): {s}"))?;

			if rest.contains('/') || rest.contains('?') || rest.contains('#') {
				return Err(format!(
					"invalid endpoint (expected ws://host:port without path/query/fragment): {s}"
				));
			}

			let (host, port_str) = rest
				.rsplit_once(':')
				.ok_or_else(|| format!("invalid endpoint (missing :port, expected ws://host:port): {s}"))?;

			let host = host.trim();
			if host.is_empty() {
				return Err(format!("invalid endpoint host (expected ws://host:port): {s}"));
			}

			if host.contains(':') && !(host.starts_with('[') && host.ends_with(']')) {
				return Err(format!(
					"invalid endpoint host (IPv6 must be bracketed like ws://[::1]:8080): {s}"
				));
			}

			let port: u16 = port_str
				.trim()
				.parse()
				.map_err(|_| format!("invalid endpoint port (expected 1..=65535): {s}"))?;

			if port == 0 {
				return Err(format!("invalid endpoint port (expected 1..=65535): {s}"));
			}

			Ok(Self {
				host: host.to_string(),
				port,
			})
		}
	}

	impl std::fmt::Display for WsEndpoint {
		fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
			write!(f, "{WS_SCHEME}{}", self.hostport())
		}
	}

}
