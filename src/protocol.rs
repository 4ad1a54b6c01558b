//! Wire protocol messages
//!
//! The transport carries newline-delimited UTF-8 JSON objects, each
//! shaped `{"name": <kind>, ...fields}`. Inbound lines resolve through a
//! closed dispatch table into [`ServerMessage`]; unknown names come back
//! as [`ServerMessage::Unknown`] so callers can log and drop them. The
//! one exception is `auth`, which is a bare object without a name field,
//! sent exactly once after the transport opens.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

use crate::buffer::Encoding;
use crate::error::ProtocolError;

/// Client identifier reported in the auth message.
pub const CLIENT_NAME: &str = "roomsync";

/// Protocol encodings this client can accept.
pub const SUPPORTED_ENCODINGS: &[&str] = &["utf8", "base64"];

/// The one unnamed message: credentials, sent first on every session.
#[derive(Debug, Serialize)]
pub struct Auth {
	pub username: String,
	pub secret: String,
	pub room: String,
	pub room_owner: String,
	pub client: &'static str,
	pub platform: &'static str,
	pub supported_encodings: Vec<&'static str>,
	pub version: &'static str,
}

impl Auth {
	pub fn new(username: String, secret: String, room: String, room_owner: String) -> Auth {
		Auth {
			username,
			secret,
			room,
			room_owner,
			client: CLIENT_NAME,
			platform: std::env::consts::OS,
			supported_encodings: SUPPORTED_ENCODINGS.to_vec(),
			version: env!("CARGO_PKG_VERSION"),
		}
	}
}

/// Messages this client sends after authentication.
#[derive(Debug, Serialize)]
#[serde(tag = "name", rename_all = "snake_case")]
pub enum ClientMessage {
	GetBuf { id: u64 },
	CreateBuf { buf: String, encoding: Encoding, md5: String, path: String },
	DeleteBuf { id: u64 },
	RenameBuf { id: u64, path: String },
	Patch { id: u64, path: String, patch: String, md5_before: String, md5_after: String },
}

/// One buffer as enumerated by `room_info`.
#[derive(Debug, Clone, Deserialize)]
pub struct BufSummary {
	pub id: u64,
	pub path: String,
	pub md5: String,
	pub encoding: Encoding,
}

/// A user present in the workspace.
#[derive(Debug, Clone, Deserialize)]
pub struct User {
	#[serde(default)]
	pub user_id: Option<u64>,
	pub username: String,
	#[serde(default)]
	pub platform: Option<String>,
}

/// The session-establishing snapshot of the whole workspace.
#[derive(Debug, Deserialize)]
pub struct RoomInfo {
	/// Buffers keyed by id (JSON object keys are strings on the wire)
	pub bufs: HashMap<String, BufSummary>,
	#[serde(default)]
	pub perms: Vec<String>,
	#[serde(default)]
	pub users: HashMap<String, User>,
}

/// Full buffer content, from `get_buf` or `create_buf`.
#[derive(Debug, Deserialize)]
pub struct BufContent {
	pub id: u64,
	pub buf: String,
	pub encoding: Encoding,
	pub md5: String,
	#[serde(default)]
	pub path: Option<String>,
}

impl BufContent {
	/// Decode the wire representation into raw content bytes.
	pub fn decode(&self) -> Result<Vec<u8>, ProtocolError> {
		match self.encoding {
			Encoding::Utf8 => Ok(self.buf.as_bytes().to_vec()),
			Encoding::Base64 => BASE64.decode(&self.buf).map_err(|e| {
				ProtocolError::MalformedMessage { message: format!("bad base64 content: {}", e) }
			}),
		}
	}
}

/// Encode raw content bytes for the wire.
pub fn encode_content(content: &[u8], encoding: Encoding) -> String {
	match encoding {
		Encoding::Utf8 => String::from_utf8_lossy(content).into_owned(),
		Encoding::Base64 => BASE64.encode(content),
	}
}

/// An inbound patch notification.
#[derive(Debug, Deserialize)]
pub struct PatchMsg {
	pub id: u64,
	#[serde(default)]
	pub path: Option<String>,
	pub patch: String,
	#[serde(default)]
	pub md5_before: Option<String>,
	pub md5_after: String,
}

/// Every message kind the server may send.
#[derive(Debug, Deserialize)]
#[serde(tag = "name", rename_all = "snake_case")]
pub enum ServerMessage {
	RoomInfo(RoomInfo),
	GetBuf(BufContent),
	CreateBuf(BufContent),
	RenameBuf {
		id: u64,
		path: String,
	},
	Join(User),
	Part {
		#[serde(default)]
		user_id: Option<u64>,
		#[serde(default)]
		username: Option<String>,
	},
	Saved {
		id: u64,
		#[serde(default)]
		user_id: Option<u64>,
	},
	Patch(PatchMsg),
	DeleteBuf {
		id: u64,
		#[serde(default)]
		path: Option<String>,
	},
	Error {
		#[serde(default)]
		msg: Option<String>,
	},
	Disconnect {
		#[serde(default)]
		reason: String,
	},
	Highlight {},
	#[serde(skip)]
	Unknown {
		name: String,
	},
}

fn from_value<T: DeserializeOwned>(name: &str, value: Value) -> Result<T, ProtocolError> {
	serde_json::from_value(value)
		.map_err(|e| ProtocolError::MalformedMessage { message: format!("{}: {}", name, e) })
}

impl ServerMessage {
	/// Parse one wire line. A JSON object with an unrecognized name is
	/// returned as [`ServerMessage::Unknown`], not an error.
	pub fn parse(line: &str) -> Result<ServerMessage, ProtocolError> {
		let value: Value = serde_json::from_str(line)
			.map_err(|e| ProtocolError::MalformedMessage { message: e.to_string() })?;
		let name = value
			.get("name")
			.and_then(Value::as_str)
			.ok_or_else(|| ProtocolError::MalformedMessage {
				message: "missing name discriminator".to_string(),
			})?
			.to_string();

		Ok(match name.as_str() {
			"room_info" => ServerMessage::RoomInfo(from_value(&name, value)?),
			"get_buf" => ServerMessage::GetBuf(from_value(&name, value)?),
			"create_buf" => ServerMessage::CreateBuf(from_value(&name, value)?),
			"rename_buf" | "join" | "part" | "saved" | "patch" | "delete_buf" | "error"
			| "disconnect" | "highlight" => from_value(&name, value)?,
			_ => ServerMessage::Unknown { name },
		})
	}
}

/// Serialize an outbound message to one wire line (no trailing newline).
pub fn to_line<T: Serialize>(msg: &T) -> Result<String, ProtocolError> {
	serde_json::to_string(msg)
		.map_err(|e| ProtocolError::MalformedMessage { message: e.to_string() })
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_parse_room_info() {
		let line = r#"{"name":"room_info","perms":["patch"],
			"bufs":{"7":{"id":7,"path":"src/main.rs","md5":"abc","encoding":"utf8"}},
			"users":{"1":{"user_id":1,"username":"alice"}}}"#;
		let msg = ServerMessage::parse(line).unwrap();
		match msg {
			ServerMessage::RoomInfo(info) => {
				assert_eq!(info.bufs.len(), 1);
				let buf = &info.bufs["7"];
				assert_eq!(buf.id, 7);
				assert_eq!(buf.path, "src/main.rs");
				assert_eq!(buf.encoding, Encoding::Utf8);
				assert_eq!(info.perms, vec!["patch"]);
			}
			other => panic!("unexpected message: {:?}", other),
		}
	}

	#[test]
	fn test_parse_patch() {
		let line = r#"{"name":"patch","id":3,"path":"a.txt","patch":"...","md5_before":"x","md5_after":"y"}"#;
		match ServerMessage::parse(line).unwrap() {
			ServerMessage::Patch(p) => {
				assert_eq!(p.id, 3);
				assert_eq!(p.md5_after, "y");
			}
			other => panic!("unexpected message: {:?}", other),
		}
	}

	#[test]
	fn test_unknown_name_is_not_an_error() {
		match ServerMessage::parse(r#"{"name":"msg","data":"hi"}"#).unwrap() {
			ServerMessage::Unknown { name } => assert_eq!(name, "msg"),
			other => panic!("unexpected message: {:?}", other),
		}
	}

	#[test]
	fn test_malformed_line_is_an_error() {
		assert!(ServerMessage::parse("not json").is_err());
		assert!(ServerMessage::parse(r#"{"no_name":true}"#).is_err());
	}

	#[test]
	fn test_client_message_carries_name() {
		let line = to_line(&ClientMessage::GetBuf { id: 9 }).unwrap();
		let value: Value = serde_json::from_str(&line).unwrap();
		assert_eq!(value["name"], "get_buf");
		assert_eq!(value["id"], 9);
	}

	#[test]
	fn test_auth_has_no_name_field() {
		let auth = Auth::new("u".into(), "s".into(), "w".into(), "o".into());
		let value: Value = serde_json::from_str(&to_line(&auth).unwrap()).unwrap();
		assert!(value.get("name").is_none());
		assert_eq!(value["room"], "w");
		assert_eq!(value["room_owner"], "o");
		assert_eq!(value["client"], CLIENT_NAME);
	}

	#[test]
	fn test_content_encoding_round_trip() {
		let binary = [0u8, 1, 2, 250];
		let wire = encode_content(&binary, Encoding::Base64);
		let msg = BufContent {
			id: 1,
			buf: wire,
			encoding: Encoding::Base64,
			md5: String::new(),
			path: None,
		};
		assert_eq!(msg.decode().unwrap(), binary);

		let text = b"hello";
		let wire = encode_content(text, Encoding::Utf8);
		let msg =
			BufContent { id: 1, buf: wire, encoding: Encoding::Utf8, md5: String::new(), path: None };
		assert_eq!(msg.decode().unwrap(), text);
	}
}

// vim: ts=4
