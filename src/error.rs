//! Error types for roomsync operations

use std::error::Error;
use std::fmt;
use std::io;

/// Main error type for the sync client
#[derive(Debug)]
pub enum SyncError {
	/// Configuration or credential problem
	Config(ConfigError),

	/// Transport-level failure (drives the reconnect state machine)
	Connection(ConnectionError),

	/// Malformed or unexpected protocol data
	Protocol(ProtocolError),

	/// Patch creation/application failure
	Patch(PatchError),

	/// Workspace REST API failure
	Api(ApiError),

	/// Filesystem watcher failure
	Watch(notify::Error),

	/// I/O error
	Io(io::Error),

	/// The peer told us to go away. Fatal, never retried.
	Disconnected { reason: String },
}

impl fmt::Display for SyncError {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			SyncError::Config(e) => write!(f, "Configuration error: {}", e),
			SyncError::Connection(e) => write!(f, "Connection error: {}", e),
			SyncError::Protocol(e) => write!(f, "Protocol error: {}", e),
			SyncError::Patch(e) => write!(f, "Patch error: {}", e),
			SyncError::Api(e) => write!(f, "Workspace API error: {}", e),
			SyncError::Watch(e) => write!(f, "Watcher error: {}", e),
			SyncError::Io(e) => write!(f, "I/O error: {}", e),
			SyncError::Disconnected { reason } => {
				write!(f, "Disconnected by server: {}", reason)
			}
		}
	}
}

impl Error for SyncError {}

impl From<io::Error> for SyncError {
	fn from(e: io::Error) -> Self {
		SyncError::Io(e)
	}
}

impl From<ConfigError> for SyncError {
	fn from(e: ConfigError) -> Self {
		SyncError::Config(e)
	}
}

impl From<ConnectionError> for SyncError {
	fn from(e: ConnectionError) -> Self {
		SyncError::Connection(e)
	}
}

impl From<ProtocolError> for SyncError {
	fn from(e: ProtocolError) -> Self {
		SyncError::Protocol(e)
	}
}

impl From<PatchError> for SyncError {
	fn from(e: PatchError) -> Self {
		SyncError::Patch(e)
	}
}

impl From<ApiError> for SyncError {
	fn from(e: ApiError) -> Self {
		SyncError::Api(e)
	}
}

impl From<notify::Error> for SyncError {
	fn from(e: notify::Error) -> Self {
		SyncError::Watch(e)
	}
}

/// Configuration and credential errors
#[derive(Debug)]
pub enum ConfigError {
	/// Credentials file missing or unreadable
	CredentialsUnavailable { path: String, source: io::Error },

	/// Credentials or descriptor file is not valid JSON
	ParseFailed { path: String, message: String },

	/// A workspace URL could not be parsed
	InvalidUrl { url: String },

	/// Required setting absent after merging all sources
	Missing { what: String },
}

impl fmt::Display for ConfigError {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			ConfigError::CredentialsUnavailable { path, source } => {
				write!(f, "Cannot read credentials file {}: {}", path, source)
			}
			ConfigError::ParseFailed { path, message } => {
				write!(f, "Cannot parse {}: {}", path, message)
			}
			ConfigError::InvalidUrl { url } => {
				write!(f, "The workspace must be a valid url: {}", url)
			}
			ConfigError::Missing { what } => write!(f, "Missing setting: {}", what),
		}
	}
}

impl Error for ConfigError {}

/// Transport-level errors
#[derive(Debug)]
pub enum ConnectionError {
	/// TCP connect failed
	ConnectFailed { host: String, port: u16, source: io::Error },

	/// TLS handshake failed
	TlsFailed { host: String, source: io::Error },

	/// Host name not usable as a TLS server name
	InvalidHost { host: String },

	/// Peer closed the stream
	Closed,

	/// Write to the socket failed
	WriteFailed { source: io::Error },
}

impl fmt::Display for ConnectionError {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			ConnectionError::ConnectFailed { host, port, source } => {
				write!(f, "Failed to connect to {}:{}: {}", host, port, source)
			}
			ConnectionError::TlsFailed { host, source } => {
				write!(f, "TLS handshake with {} failed: {}", host, source)
			}
			ConnectionError::InvalidHost { host } => {
				write!(f, "Invalid TLS host name: {}", host)
			}
			ConnectionError::Closed => write!(f, "Connection closed by peer"),
			ConnectionError::WriteFailed { source } => {
				write!(f, "Failed to write to connection: {}", source)
			}
		}
	}
}

impl Error for ConnectionError {}

/// Protocol parse errors. Non-fatal: the offending message is dropped.
#[derive(Debug)]
pub enum ProtocolError {
	/// Inbound line was not a valid JSON message
	MalformedMessage { message: String },

	/// Message referenced a buffer we do not track
	UnknownBuffer { id: u64 },
}

impl fmt::Display for ProtocolError {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			ProtocolError::MalformedMessage { message } => {
				write!(f, "Malformed message: {}", message)
			}
			ProtocolError::UnknownBuffer { id } => {
				write!(f, "Message for unknown buffer {}", id)
			}
		}
	}
}

impl Error for ProtocolError {}

/// Patch engine errors. All of these resolve by re-fetching the full
/// buffer content; none commit a partial result.
#[derive(Debug)]
pub enum PatchError {
	/// Serialized patch could not be parsed
	ParseFailed { message: String },

	/// Patch hunks did not apply to the base content
	ApplyFailed { message: String },

	/// Result checksum differs from the peer-declared checksum
	ChecksumMismatch { expected: String, actual: String },

	/// No diff backend capable of this encoding is wired in
	CapabilityUnavailable { what: String },
}

impl fmt::Display for PatchError {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			PatchError::ParseFailed { message } => {
				write!(f, "Failed to parse patch: {}", message)
			}
			PatchError::ApplyFailed { message } => {
				write!(f, "Failed to apply patch: {}", message)
			}
			PatchError::ChecksumMismatch { expected, actual } => {
				write!(f, "Checksum mismatch: expected {}, got {}", expected, actual)
			}
			PatchError::CapabilityUnavailable { what } => {
				write!(f, "Capability unavailable: {}", what)
			}
		}
	}
}

impl Error for PatchError {}

/// Workspace REST API errors
#[derive(Debug)]
pub enum ApiError {
	/// Request could not be sent
	RequestFailed { message: String },

	/// Credentials rejected
	Unauthorized,

	/// Permission denied for this owner/workspace
	Forbidden,

	/// Any other unexpected HTTP status
	BadStatus { status: u16, body: String },
}

impl fmt::Display for ApiError {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			ApiError::RequestFailed { message } => write!(f, "Request failed: {}", message),
			ApiError::Unauthorized => {
				write!(f, "Your credentials are wrong. Check your ~/.roomsyncrc.json")
			}
			ApiError::Forbidden => write!(f, "You do not have permission to do that"),
			ApiError::BadStatus { status, body } => {
				write!(f, "HTTP status {}: {}", status, body)
			}
		}
	}
}

impl Error for ApiError {}

// vim: ts=4
