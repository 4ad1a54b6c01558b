//! Workspace provisioning over the REST API
//!
//! Creating and deleting workspaces happens over HTTPS before the sync
//! connection is built. A successful create records the workspace URL in
//! the local descriptor so later runs can resolve it without flags.

use reqwest::StatusCode;
use std::path::Path;

use crate::config::{workspace_url, Descriptor};
use crate::error::ApiError;
use crate::logging::*;

fn request_failed(e: reqwest::Error) -> ApiError {
	ApiError::RequestFailed { message: e.to_string() }
}

/// Create a workspace and write the descriptor into `root`. A workspace
/// that already exists is not an error; we will sync into it.
pub async fn create_workspace(
	host: &str,
	username: &str,
	secret: &str,
	owner: &str,
	workspace: &str,
	root: &Path,
) -> Result<String, ApiError> {
	let endpoint = format!("https://{}/api/workspace", host);
	let body = serde_json::json!({ "name": workspace, "owner": owner });

	let response = reqwest::Client::new()
		.post(&endpoint)
		.basic_auth(username, Some(secret))
		.json(&body)
		.send()
		.await
		.map_err(request_failed)?;

	let status = response.status();
	match status {
		StatusCode::UNAUTHORIZED => return Err(ApiError::Unauthorized),
		StatusCode::FORBIDDEN => return Err(ApiError::Forbidden),
		StatusCode::CONFLICT => warn!("This workspace already exists."),
		s if s.is_client_error() || s.is_server_error() => {
			let body = response.text().await.unwrap_or_default();
			return Err(ApiError::BadStatus { status: s.as_u16(), body });
		}
		_ => {}
	}

	let url = workspace_url(true, host, owner, workspace);
	info!("Created workspace {}", url);

	let mut descriptor = Descriptor::load(root).unwrap_or_default();
	descriptor.url = Some(url.clone());
	descriptor
		.save(root)
		.map_err(|e| ApiError::RequestFailed { message: format!("cannot write descriptor: {}", e) })?;

	Ok(url)
}

/// Delete a workspace on the server. The local tree is left untouched.
pub async fn delete_workspace(
	host: &str,
	username: &str,
	secret: &str,
	owner: &str,
	workspace: &str,
) -> Result<(), ApiError> {
	let endpoint = format!("https://{}/api/workspace/{}/{}", host, owner, workspace);

	let response = reqwest::Client::new()
		.delete(&endpoint)
		.basic_auth(username, Some(secret))
		.send()
		.await
		.map_err(request_failed)?;

	let status = response.status();
	match status {
		StatusCode::UNAUTHORIZED => Err(ApiError::Unauthorized),
		StatusCode::FORBIDDEN => Err(ApiError::Forbidden),
		StatusCode::NOT_FOUND => {
			warn!("Workspace {}/{} does not exist", owner, workspace);
			Ok(())
		}
		s if s.is_client_error() || s.is_server_error() => {
			let body = response.text().await.unwrap_or_default();
			Err(ApiError::BadStatus { status: s.as_u16(), body })
		}
		_ => {
			info!("Deleted workspace {}/{}", owner, workspace);
			Ok(())
		}
	}
}

// vim: ts=4
