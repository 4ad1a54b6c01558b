use clap::{Arg, ArgAction, Command};
use std::error::Error;
use std::path::PathBuf;
use std::{env, fs};

use roomsync::config::{self, parse_workspace_url, Credentials, Descriptor, ParsedUrl};
use roomsync::connection::Connection;
use roomsync::error::ConfigError;
use roomsync::logging::{error, info, init_tracing, warn};
use roomsync::sync::{ConflictPolicy, SyncClient, SyncOptions};
use roomsync::{api, ignore};

fn parse_args() -> clap::ArgMatches {
	Command::new("roomsync")
		.version(env!("CARGO_PKG_VERSION"))
		.about("Keeps a local directory synchronized with a collaborative workspace")
		.arg(
			Arg::new("join")
				.long("join")
				.value_name("URL")
				.help("The URL of the workspace to join"),
		)
		.arg(
			Arg::new("share")
				.long("share")
				.action(ArgAction::SetTrue)
				.help("Create the workspace if possible, and let local files win conflicts"),
		)
		.arg(
			Arg::new("delete")
				.long("delete")
				.action(ArgAction::SetTrue)
				.help("Delete the workspace on the server first (combine with --share to recreate)"),
		)
		.arg(
			Arg::new("read-only")
				.long("read-only")
				.action(ArgAction::SetTrue)
				.help("Do not send any local modifications"),
		)
		.arg(
			Arg::new("overwrite-local")
				.long("overwrite-local")
				.action(ArgAction::SetTrue)
				.help("Local files win checksum conflicts during initial sync"),
		)
		.arg(
			Arg::new("host")
				.short('H')
				.long("host")
				.value_name("HOST")
				.help("Host to connect to (for debugging/development)"),
		)
		.arg(
			Arg::new("port")
				.short('p')
				.long("port")
				.value_name("PORT")
				.value_parser(clap::value_parser!(u16))
				.help("Port to use (for debugging/development)"),
		)
		.arg(
			Arg::new("username")
				.short('u')
				.long("username")
				.help("Your username (defaults to ~/.roomsyncrc.json)"),
		)
		.arg(
			Arg::new("secret")
				.short('s')
				.long("secret")
				.help("Your secret (defaults to ~/.roomsyncrc.json)"),
		)
		.arg(
			Arg::new("workspace")
				.short('w')
				.long("workspace")
				.help("The workspace name (defaults to the descriptor or the directory name)"),
		)
		.arg(
			Arg::new("owner")
				.short('o')
				.long("owner")
				.help("The workspace owner (defaults to the descriptor or your username)"),
		)
		.arg(
			Arg::new("verbose")
				.long("verbose")
				.action(ArgAction::SetTrue)
				.help("Enable debugging output"),
		)
		.arg(Arg::new("path").value_name("PATH").help("Directory to sync (defaults to cwd)"))
		.get_matches()
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
	let matches = parse_args();
	init_tracing(matches.get_flag("verbose"));

	let root = match matches.get_one::<String>("path") {
		Some(path) => PathBuf::from(path),
		None => env::current_dir()?,
	};
	fs::create_dir_all(&root)?;
	let root = root.canonicalize()?;

	// Credentials: flags override the rc file; the rc file is optional
	// only when both flags are given.
	let credentials = Credentials::load();
	let username = match matches.get_one::<String>("username") {
		Some(u) => u.clone(),
		None => credentials.as_ref().map(|c| c.username.clone()).map_err(|e| e.to_string())?,
	};
	let secret = match matches.get_one::<String>("secret") {
		Some(s) => s.clone(),
		None => credentials.as_ref().map(|c| c.secret.clone()).map_err(|e| e.to_string())?,
	};

	// The descriptor remembers which workspace this directory belongs to.
	let descriptor = Descriptor::load(&root)?;
	let from_descriptor: Option<ParsedUrl> = match &descriptor.url {
		Some(url) => match parse_workspace_url(url) {
			Ok(parsed) => Some(parsed),
			Err(e) => {
				warn!("Ignoring descriptor: {}", e);
				None
			}
		},
		None => None,
	};

	let from_join: Option<ParsedUrl> = match matches.get_one::<String>("join") {
		Some(url) => Some(parse_workspace_url(url)?),
		None => None,
	};
	let parsed = from_join.or(from_descriptor);

	let share = matches.get_flag("share");
	let dir_name = root
		.file_name()
		.map(|n| n.to_string_lossy().into_owned())
		.unwrap_or_else(|| "workspace".to_string());

	let host = matches
		.get_one::<String>("host")
		.cloned()
		.or_else(|| parsed.as_ref().map(|p| p.host.clone()))
		.or_else(|| credentials.as_ref().ok().and_then(|c| c.default_host.clone()))
		.ok_or(ConfigError::Missing { what: "host (--host, --join or descriptor)".to_string() })?;
	let port = matches
		.get_one::<u16>("port")
		.copied()
		.or_else(|| parsed.as_ref().map(|p| p.port))
		.unwrap_or(config::DEFAULT_PORT);
	let workspace = matches
		.get_one::<String>("workspace")
		.cloned()
		.or_else(|| parsed.as_ref().map(|p| p.workspace.clone()))
		.or_else(|| share.then(|| dir_name.clone()))
		.ok_or(ConfigError::Missing { what: "workspace name".to_string() })?;
	let owner = matches
		.get_one::<String>("owner")
		.cloned()
		.or_else(|| parsed.as_ref().map(|p| p.owner.clone()))
		.unwrap_or_else(|| username.clone());

	if matches.get_flag("delete") {
		api::delete_workspace(&host, &username, &secret, &owner, &workspace).await?;
	}
	if share {
		api::create_workspace(&host, &username, &secret, &owner, &workspace, &root).await?;
		ignore::write_default_ignore(&root)?;
	}

	let options = SyncOptions {
		read_only: matches.get_flag("read-only"),
		policy: if share || matches.get_flag("overwrite-local") {
			ConflictPolicy::PreferLocal
		} else {
			ConflictPolicy::PreferServer
		},
	};

	info!("Joining workspace {}", config::workspace_url(true, &host, &owner, &workspace));
	let conn = Connection::new(host, port, username, secret, workspace, owner);
	if let Err(e) = SyncClient::new(root, conn, options).run().await {
		error!("{}", e);
		std::process::exit(1);
	}
	Ok(())
}

// vim: ts=4
