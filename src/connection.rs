//! Workspace connection: TLS transport, protocol writer and reconnect state
//!
//! One `Connection` lives for the whole client and moves through
//! Disconnected -> Connecting -> Authenticating -> Synced as sessions come
//! and go. The supervisor loop in `sync` drives `connect()` and sleeps on
//! the backoff between attempts, so at most one reconnect timer can ever
//! be outstanding.

use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines, ReadHalf, WriteHalf};
use tokio::net::TcpStream;
use tokio_rustls::client::TlsStream;
use tokio_rustls::rustls::pki_types::ServerName;
use tokio_rustls::rustls::{ClientConfig, RootCertStore};
use tokio_rustls::TlsConnector;

use crate::error::ConnectionError;
use crate::logging::*;
use crate::protocol::{to_line, Auth, ClientMessage};

/// Connection lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnState {
	Disconnected,
	Connecting,
	Authenticating,
	Synced,
}

/// Reconnect delay: starts at 500ms, grows by 1.5x per consecutive
/// failure, capped at 10s, reset to 500ms on reaching Synced.
#[derive(Debug)]
pub struct Backoff {
	delay_ms: u64,
}

impl Backoff {
	const INITIAL_MS: u64 = 500;
	const CAP_MS: u64 = 10_000;

	pub fn new() -> Backoff {
		Backoff { delay_ms: Backoff::INITIAL_MS }
	}

	/// The delay to sleep before the next attempt. Advances the counter.
	pub fn next_delay(&mut self) -> Duration {
		let current = self.delay_ms;
		self.delay_ms = (current + current / 2).min(Backoff::CAP_MS);
		Duration::from_millis(current)
	}

	pub fn reset(&mut self) {
		self.delay_ms = Backoff::INITIAL_MS;
	}
}

impl Default for Backoff {
	fn default() -> Self {
		Backoff::new()
	}
}

/// Inbound side of an established session.
pub type LineReader = Lines<BufReader<ReadHalf<TlsStream<TcpStream>>>>;

/// The client's half of the workspace protocol.
pub struct Connection {
	host: String,
	port: u16,
	username: String,
	secret: String,
	workspace: String,
	owner: String,
	state: ConnState,
	writer: Option<WriteHalf<TlsStream<TcpStream>>>,
	pub backoff: Backoff,
	tls: TlsConnector,
}

impl Connection {
	pub fn new(
		host: String,
		port: u16,
		username: String,
		secret: String,
		workspace: String,
		owner: String,
	) -> Connection {
		let mut roots = RootCertStore::empty();
		roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
		let config = ClientConfig::builder().with_root_certificates(roots).with_no_client_auth();

		Connection {
			host,
			port,
			username,
			secret,
			workspace,
			owner,
			state: ConnState::Disconnected,
			writer: None,
			backoff: Backoff::new(),
			tls: TlsConnector::from(Arc::new(config)),
		}
	}

	pub fn state(&self) -> ConnState {
		self.state
	}

	pub fn is_synced(&self) -> bool {
		self.state == ConnState::Synced
	}

	/// Open the transport and send the auth message. On success the
	/// session is Authenticating; the caller reads lines until `room_info`
	/// arrives and then calls [`Connection::mark_synced`].
	pub async fn connect(&mut self) -> Result<LineReader, ConnectionError> {
		self.state = ConnState::Connecting;
		info!("Connecting to {}:{}", self.host, self.port);

		let tcp = TcpStream::connect((self.host.as_str(), self.port)).await.map_err(|e| {
			ConnectionError::ConnectFailed { host: self.host.clone(), port: self.port, source: e }
		})?;
		let server_name = ServerName::try_from(self.host.clone())
			.map_err(|_| ConnectionError::InvalidHost { host: self.host.clone() })?;
		let stream = self
			.tls
			.connect(server_name, tcp)
			.await
			.map_err(|e| ConnectionError::TlsFailed { host: self.host.clone(), source: e })?;

		let (read, write) = tokio::io::split(stream);
		self.writer = Some(write);
		self.state = ConnState::Authenticating;

		let auth = Auth::new(
			self.username.clone(),
			self.secret.clone(),
			self.workspace.clone(),
			self.owner.clone(),
		);
		let line = to_line(&auth)
			.map_err(|e| ConnectionError::WriteFailed {
				source: std::io::Error::new(std::io::ErrorKind::InvalidData, e.to_string()),
			})?;
		self.write_line(&line).await?;

		Ok(BufReader::new(read).lines())
	}

	async fn write_line(&mut self, line: &str) -> Result<(), ConnectionError> {
		let writer = self.writer.as_mut().ok_or(ConnectionError::Closed)?;
		writer
			.write_all(line.as_bytes())
			.await
			.map_err(|e| ConnectionError::WriteFailed { source: e })?;
		writer.write_all(b"\n").await.map_err(|e| ConnectionError::WriteFailed { source: e })?;
		writer.flush().await.map_err(|e| ConnectionError::WriteFailed { source: e })
	}

	/// Send a protocol message. A no-op unless the session is Synced.
	pub async fn send(&mut self, msg: &ClientMessage) -> Result<(), ConnectionError> {
		if self.state != ConnState::Synced {
			debug!("Not synced, dropping outbound message");
			return Ok(());
		}
		let line = match to_line(msg) {
			Ok(line) => line,
			Err(e) => {
				error!("Failed to serialize outbound message: {}", e);
				return Ok(());
			}
		};
		trace!("writing to conn: {}", line);
		self.write_line(&line).await
	}

	/// `room_info` arrived: the session is established.
	pub fn mark_synced(&mut self) {
		self.state = ConnState::Synced;
		self.backoff.reset();
	}

	/// The transport is gone; drop the writer until the next connect.
	pub fn mark_disconnected(&mut self) {
		self.state = ConnState::Disconnected;
		self.writer = None;
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_backoff_sequence() {
		let mut backoff = Backoff::new();
		assert_eq!(backoff.next_delay(), Duration::from_millis(500));
		assert_eq!(backoff.next_delay(), Duration::from_millis(750));
		assert_eq!(backoff.next_delay(), Duration::from_millis(1125));
	}

	#[test]
	fn test_backoff_caps_at_ten_seconds() {
		let mut backoff = Backoff::new();
		let mut last = Duration::ZERO;
		for _ in 0..20 {
			last = backoff.next_delay();
		}
		assert_eq!(last, Duration::from_millis(10_000));
	}

	#[test]
	fn test_backoff_reset() {
		let mut backoff = Backoff::new();
		backoff.next_delay();
		backoff.next_delay();
		backoff.reset();
		assert_eq!(backoff.next_delay(), Duration::from_millis(500));
	}

	#[tokio::test]
	async fn test_send_is_noop_while_not_synced() {
		let mut conn = Connection::new(
			"localhost".to_string(),
			3448,
			"u".to_string(),
			"s".to_string(),
			"w".to_string(),
			"o".to_string(),
		);
		assert_eq!(conn.state(), ConnState::Disconnected);
		// No writer exists, but the send must succeed as a silent no-op.
		conn.send(&ClientMessage::GetBuf { id: 1 }).await.unwrap();
	}

	#[test]
	fn test_state_transitions() {
		let mut conn = Connection::new(
			"localhost".to_string(),
			3448,
			"u".to_string(),
			"s".to_string(),
			"w".to_string(),
			"o".to_string(),
		);
		conn.mark_synced();
		assert!(conn.is_synced());
		conn.mark_disconnected();
		assert_eq!(conn.state(), ConnState::Disconnected);
	}
}

// vim: ts=4
