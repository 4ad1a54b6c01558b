//! The sync client: session event loop, reconciliation and file handling
//!
//! A single task drives everything: inbound protocol lines, filesystem
//! events and the reconnect timer are dispatched as discrete turns of one
//! `select!` loop, so no two handlers ever overlap. Disk mutations go
//! through a dedicated writer task and never stall protocol dispatch.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};

use crate::buffer::{Buffer, BufferStore, Encoding};
use crate::connection::{Connection, LineReader};
use crate::error::SyncError;
use crate::hooks::Hooks;
use crate::ignore::{self, IgnoreChain};
use crate::logging::*;
use crate::patch::{verify_checksum, PatchEngine};
use crate::protocol::{encode_content, BufContent, BufSummary, ClientMessage, PatchMsg, RoomInfo, ServerMessage, User};
use crate::util::{md5_hex, slash_path};
use crate::watcher::{DirWatcher, FsChange};

/// Which side wins a checksum conflict found during reconciliation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConflictPolicy {
	/// Server state is authoritative; divergent local content is replaced
	PreferServer,
	/// The local file set is authoritative; divergence is pushed back out
	/// and server-only buffers are deleted
	PreferLocal,
}

/// Externally supplied sync behavior.
#[derive(Debug, Clone, Copy)]
pub struct SyncOptions {
	pub read_only: bool,
	pub policy: ConflictPolicy,
}

impl Default for SyncOptions {
	fn default() -> Self {
		SyncOptions { read_only: false, policy: ConflictPolicy::PreferServer }
	}
}

/// What reconciliation decided for one server-reported buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcilePlan {
	/// Checksums agree; track local content and do nothing
	Matches,
	/// Fetch the authoritative content, optionally pushing the divergent
	/// local content back as a patch once it arrives
	FetchServer { push_local_after: bool },
	/// The buffer has no local counterpart and local wins: delete it
	DeleteOnServer,
}

/// Pure reconciliation decision over checksums and policy. The local
/// checksum is `None` when the file does not exist locally.
pub fn reconcile_plan(
	local_md5: Option<&str>,
	server_md5: &str,
	policy: ConflictPolicy,
) -> ReconcilePlan {
	match local_md5 {
		None => match policy {
			ConflictPolicy::PreferLocal => ReconcilePlan::DeleteOnServer,
			ConflictPolicy::PreferServer => ReconcilePlan::FetchServer { push_local_after: false },
		},
		Some(md5) if md5 == server_md5 => ReconcilePlan::Matches,
		Some(_) => ReconcilePlan::FetchServer {
			push_local_after: policy == ConflictPolicy::PreferLocal,
		},
	}
}

/// One-shot continuation run when a buffer's authoritative content
/// arrives.
enum FollowUp {
	/// Push this local content back out as a patch over the fetched base
	PushLocal { content: Vec<u8> },
}

/// Disk mutations, serialized through the writer task.
enum DiskJob {
	Write { path: PathBuf, content: Vec<u8> },
	Rename { from: PathBuf, to: PathBuf },
	Remove { path: PathBuf, stop_at: PathBuf },
}

async fn perform_disk_job(job: DiskJob) -> std::io::Result<()> {
	match job {
		DiskJob::Write { path, content } => {
			if let Some(parent) = path.parent() {
				tokio::fs::create_dir_all(parent).await?;
			}
			tokio::fs::write(&path, &content).await
		}
		DiskJob::Rename { from, to } => {
			if let Some(parent) = to.parent() {
				tokio::fs::create_dir_all(parent).await?;
			}
			tokio::fs::rename(&from, &to).await
		}
		DiskJob::Remove { path, stop_at } => {
			match tokio::fs::remove_file(&path).await {
				Ok(()) => {}
				Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
				Err(e) => return Err(e),
			}
			// Prune directories the deletion may have emptied
			let mut dir = path.parent().map(Path::to_path_buf);
			while let Some(d) = dir {
				if d == stop_at || !d.starts_with(&stop_at) {
					break;
				}
				if tokio::fs::remove_dir(&d).await.is_err() {
					break;
				}
				debug!("Deleted empty directory {}", d.display());
				dir = d.parent().map(Path::to_path_buf);
			}
			Ok(())
		}
	}
}

fn spawn_disk_writer() -> UnboundedSender<DiskJob> {
	let (tx, mut rx) = unbounded_channel::<DiskJob>();
	tokio::spawn(async move {
		while let Some(job) = rx.recv().await {
			if let Err(e) = perform_disk_job(job).await {
				warn!("Disk operation failed: {}", e);
			}
		}
	});
	tx
}

/// The client: owns the connection, the buffer store, the watcher and
/// all per-session state.
pub struct SyncClient {
	root: PathBuf,
	options: SyncOptions,
	conn: Connection,
	store: BufferStore,
	engine: PatchEngine,
	hooks: Hooks,
	users: HashMap<String, User>,
	/// md5 by path for files offered via create_buf, awaiting the ack
	pending_creates: HashMap<String, String>,
	/// pending patch callbacks keyed by buffer id
	followups: HashMap<u64, FollowUp>,
	/// self-write markers, held from write initiation to echo
	expected: HashSet<PathBuf>,
	disk: UnboundedSender<DiskJob>,
	fs_tx: UnboundedSender<FsChange>,
	fs_rx: Option<UnboundedReceiver<FsChange>>,
	watcher: Option<DirWatcher>,
}

impl SyncClient {
	pub fn new(root: PathBuf, conn: Connection, options: SyncOptions) -> SyncClient {
		let (fs_tx, fs_rx) = unbounded_channel();
		let hooks = Hooks::load(&root);
		SyncClient {
			root,
			options,
			conn,
			store: BufferStore::new(),
			engine: PatchEngine::new(),
			hooks,
			users: HashMap::new(),
			pending_creates: HashMap::new(),
			followups: HashMap::new(),
			expected: HashSet::new(),
			disk: spawn_disk_writer(),
			fs_tx,
			fs_rx: Some(fs_rx),
			watcher: None,
		}
	}

	/// Run until the peer rejects us. Transport failures reconnect with
	/// backoff; only a peer-issued disconnect ends the loop.
	pub async fn run(mut self) -> Result<(), SyncError> {
		let mut fs_rx = match self.fs_rx.take() {
			Some(rx) => rx,
			None => unreachable!("run consumes the client"),
		};

		loop {
			match self.conn.connect().await {
				Ok(lines) => match self.session(lines, &mut fs_rx).await {
					Ok(()) => warn!("Session ended, will reconnect"),
					Err(fatal) => return Err(fatal),
				},
				Err(e) => warn!("Connection attempt failed: {}", e),
			}
			self.conn.mark_disconnected();
			self.reset_session();

			// The supervisor is sequential, so this is the only pending
			// reconnect timer there can ever be.
			let delay = self.conn.backoff.next_delay();
			info!("Reconnecting in {}ms", delay.as_millis());
			tokio::time::sleep(delay).await;
		}
	}

	fn reset_session(&mut self) {
		self.store.clear();
		self.followups.clear();
		self.pending_creates.clear();
		self.users.clear();
	}

	/// Drive one established session until the transport drops (Ok) or a
	/// fatal disconnect arrives (Err).
	async fn session(
		&mut self,
		mut lines: LineReader,
		fs_rx: &mut UnboundedReceiver<FsChange>,
	) -> Result<(), SyncError> {
		loop {
			tokio::select! {
				line = lines.next_line() => match line {
					Ok(Some(line)) => {
						if let Err(e) = self.handle_line(&line).await {
							return self.session_error(e);
						}
					}
					Ok(None) => {
						warn!("socket is gone");
						return Ok(());
					}
					Err(e) => {
						warn!("Connection read failed: {}", e);
						return Ok(());
					}
				},
				Some(change) = fs_rx.recv() => {
					if let Err(e) = self.handle_fs_change(change).await {
						return self.session_error(e);
					}
				}
			}
		}
	}

	fn session_error(&self, e: SyncError) -> Result<(), SyncError> {
		match e {
			SyncError::Disconnected { .. } => Err(e),
			other => {
				warn!("Session failed: {}", other);
				Ok(())
			}
		}
	}

	// ------------------------------------------------------------------
	// Inbound protocol handling
	// ------------------------------------------------------------------

	async fn handle_line(&mut self, line: &str) -> Result<(), SyncError> {
		let msg = match ServerMessage::parse(line) {
			Ok(msg) => msg,
			Err(e) => {
				error!("couldn't parse message: {}", e);
				return Ok(());
			}
		};

		match msg {
			ServerMessage::RoomInfo(info) => self.handle_room_info(info).await?,
			ServerMessage::GetBuf(content) | ServerMessage::CreateBuf(content) => {
				self.handle_buf_content(content).await?
			}
			ServerMessage::RenameBuf { id, path } => self.handle_rename_buf(id, path).await?,
			ServerMessage::Join(user) => {
				info!(
					"{} joined the room on {}",
					user.username,
					user.platform.as_deref().unwrap_or("unknown")
				);
				if let Some(uid) = user.user_id {
					self.users.insert(uid.to_string(), user);
				}
			}
			ServerMessage::Part { user_id, username } => {
				let name = username
					.or_else(|| {
						user_id
							.and_then(|uid| self.users.remove(&uid.to_string()))
							.map(|u| u.username)
					})
					.unwrap_or_else(|| "someone".to_string());
				info!("{} left the room", name);
			}
			ServerMessage::Saved { id, user_id } => self.handle_saved(id, user_id),
			ServerMessage::Patch(patch) => self.handle_patch(patch).await?,
			ServerMessage::DeleteBuf { id, path } => self.handle_delete_buf(id, path),
			ServerMessage::Error { msg } => {
				error!("Server error: {}", msg.as_deref().unwrap_or("unknown"))
			}
			ServerMessage::Disconnect { reason } => {
				error!("You were disconnected because: {}", reason);
				return Err(SyncError::Disconnected { reason });
			}
			ServerMessage::Highlight {} => {}
			ServerMessage::Unknown { name } => debug!("Ignoring unknown message {}", name),
		}
		Ok(())
	}

	async fn handle_room_info(&mut self, info: RoomInfo) -> Result<(), SyncError> {
		self.conn.mark_synced();
		self.users = info.users;
		self.store.clear();
		self.followups.clear();

		info!("starting syncing ({} buffers on server)", info.bufs.len());

		for (_, summary) in info.bufs {
			self.reconcile_buffer(summary).await?;
		}

		if !self.options.read_only {
			// Offer anything the server has never seen, then watch
			self.offer_tree(self.root.clone()).await?;
			self.start_watcher()?;
		}
		info!("all done syncing");
		Ok(())
	}

	async fn reconcile_buffer(&mut self, summary: BufSummary) -> Result<(), SyncError> {
		let abs = self.root.join(&summary.path);
		let local = tokio::fs::read(&abs).await.ok();
		let local_md5 = local.as_deref().map(md5_hex);

		match reconcile_plan(local_md5.as_deref(), &summary.md5, self.options.policy) {
			ReconcilePlan::Matches => {
				self.store.register(Buffer {
					id: summary.id,
					path: summary.path,
					md5: summary.md5,
					encoding: summary.encoding,
					content: local,
				});
			}
			ReconcilePlan::DeleteOnServer => {
				info!("buf {} has no local file, deleting on server", summary.path);
				self.conn.send(&ClientMessage::DeleteBuf { id: summary.id }).await?;
			}
			ReconcilePlan::FetchServer { push_local_after } => {
				if local.is_some() {
					info!("buf {} md5 sum mismatch, re-fetching", summary.path);
				}
				if push_local_after {
					if let Some(content) = local {
						self.followups.insert(summary.id, FollowUp::PushLocal { content });
					}
				}
				let id = summary.id;
				self.store.register(Buffer {
					id: summary.id,
					path: summary.path,
					md5: summary.md5,
					encoding: summary.encoding,
					content: None,
				});
				self.conn.send(&ClientMessage::GetBuf { id }).await?;
			}
		}
		Ok(())
	}

	/// Full content arrived (`get_buf` response or broadcast `create_buf`).
	async fn handle_buf_content(&mut self, content: BufContent) -> Result<(), SyncError> {
		let bytes = match content.decode() {
			Ok(bytes) => bytes,
			Err(e) => {
				error!("Undecodable content for buffer {}: {}", content.id, e);
				return Ok(());
			}
		};

		let path = match content
			.path
			.clone()
			.or_else(|| self.store.get(content.id).map(|b| b.path.clone()))
		{
			Some(path) => path,
			None => {
				debug!("Content for unknown buffer {}", content.id);
				return Ok(());
			}
		};

		let own_create = self.pending_creates.remove(&path).is_some();

		self.store.register(Buffer {
			id: content.id,
			path: path.clone(),
			content: Some(bytes),
			md5: content.md5.clone(),
			encoding: content.encoding,
		});

		if let Some(FollowUp::PushLocal { content: local }) = self.followups.remove(&content.id) {
			// Reconciliation wants the local state back on the server; the
			// disk already holds it, so there is nothing to write.
			return self.send_patch(content.id, &local).await;
		}

		if own_create {
			// Ack of our own create_buf; the disk is the source of these bytes
			return Ok(());
		}

		self.write_buffer(content.id);
		Ok(())
	}

	async fn handle_patch(&mut self, msg: PatchMsg) -> Result<(), SyncError> {
		let id = msg.id;
		let (base, encoding) = match self.store.get(id) {
			Some(buf) => match &buf.content {
				Some(content) => (content.clone(), buf.encoding),
				// Already waiting for authoritative content
				None => return Ok(()),
			},
			None => {
				debug!("Patch for untracked buffer {}, fetching", id);
				return Ok(self.conn.send(&ClientMessage::GetBuf { id }).await?);
			}
		};

		let applied = self
			.engine
			.apply_patch(&base, &msg.patch, encoding)
			.and_then(|applied| {
				verify_checksum(&applied.content, &msg.md5_after).map(|_| applied)
			});

		match applied {
			Ok(applied) if applied.clean => {
				self.store.update_content(id, applied.content);
				self.write_buffer(id);
			}
			Ok(_) => {
				warn!("Re-fetching buffer {} because it wasn't patched cleanly", id);
				self.refetch(id).await?;
			}
			Err(e) => {
				warn!("Re-fetching buffer {}: {}", id, e);
				self.refetch(id).await?;
			}
		}
		Ok(())
	}

	/// Integrity failure: discard our copy and ask for the full content.
	async fn refetch(&mut self, id: u64) -> Result<(), SyncError> {
		if let Some(buf) = self.store.get_mut(id) {
			buf.content = None;
		}
		Ok(self.conn.send(&ClientMessage::GetBuf { id }).await?)
	}

	async fn handle_rename_buf(&mut self, id: u64, new_path: String) -> Result<(), SyncError> {
		let old_path = match self.store.get(id) {
			Some(buf) => buf.path.clone(),
			None => {
				debug!("Rename for untracked buffer {}, fetching", id);
				return Ok(self.conn.send(&ClientMessage::GetBuf { id }).await?);
			}
		};
		self.store.rename(&old_path, &new_path);

		let from = self.root.join(&old_path);
		let to = self.root.join(&new_path);
		self.expected.insert(from.clone());
		self.expected.insert(to.clone());
		let _ = self.disk.send(DiskJob::Rename { from, to });
		Ok(())
	}

	fn handle_delete_buf(&mut self, id: u64, path: Option<String>) {
		let removed = self.store.remove(id);
		let rel = path.or(removed.map(|b| b.path));
		if let Some(rel) = rel {
			let abs = self.root.join(&rel);
			self.expected.insert(abs.clone());
			let _ = self.disk.send(DiskJob::Remove { path: abs, stop_at: self.root.clone() });
		}
	}

	fn handle_saved(&mut self, id: u64, user_id: Option<u64>) {
		let username = user_id
			.and_then(|uid| self.users.get(&uid.to_string()))
			.map(|u| u.username.clone())
			.unwrap_or_else(|| "someone".to_string());

		let path = match self.store.get(id) {
			Some(buf) => buf.path.clone(),
			None => return,
		};
		info!("{} was saved by {}", path, username);

		self.write_buffer(id);
		self.hooks.on_saved(&path);
	}

	/// Queue a buffer's content for disk, marking the write as our own so
	/// its notification is not mistaken for a local edit.
	fn write_buffer(&mut self, id: u64) {
		let (path, content) = match self.store.get(id) {
			Some(buf) => match &buf.content {
				Some(content) => (buf.path.clone(), content.clone()),
				None => return,
			},
			None => return,
		};
		let abs = self.root.join(&path);
		debug!("Writing {}", path);
		// Marker goes in before the job so the echo can never outrun it
		self.expected.insert(abs.clone());
		let _ = self.disk.send(DiskJob::Write { path: abs, content });
	}

	// ------------------------------------------------------------------
	// Filesystem event handling
	// ------------------------------------------------------------------

	fn start_watcher(&mut self) -> Result<(), SyncError> {
		if self.watcher.is_none() {
			self.watcher = Some(DirWatcher::start(&self.root, self.fs_tx.clone())?);
		}
		Ok(())
	}

	fn rel_of(&self, path: &Path) -> Option<String> {
		path.strip_prefix(&self.root).ok().map(slash_path).filter(|rel| !rel.is_empty())
	}

	fn is_ignored(&self, path: &Path) -> bool {
		let dir = path.parent().unwrap_or(&self.root);
		IgnoreChain::for_path(&self.root, dir).is_ignored(path)
	}

	async fn handle_fs_change(&mut self, change: FsChange) -> Result<(), SyncError> {
		let path = change.path().to_path_buf();
		if self.rel_of(&path).is_none() {
			return Ok(());
		}

		debug!("{} was {:?}", path.display(), change);
		match change {
			FsChange::Created(_) => self.on_create(path).await,
			FsChange::Changed(_) => self.on_change(path).await,
			FsChange::Removed(_) => self.on_delete(path).await,
			FsChange::Renamed(_) => self.on_rename(path).await,
		}
	}

	async fn on_create(&mut self, path: PathBuf) -> Result<(), SyncError> {
		let rel = match self.rel_of(&path) {
			Some(rel) => rel,
			None => return Ok(()),
		};

		let meta = match tokio::fs::symlink_metadata(&path).await {
			Ok(meta) => meta,
			Err(_) => {
				// Vanished before we could stat it: treat as a deletion
				return self.request_delete(&rel).await;
			}
		};
		if meta.is_symlink() {
			error!("Skipping {} because it is a symlink.", path.display());
			return Ok(());
		}
		if self.is_ignored(&path) {
			return Ok(());
		}
		if meta.is_dir() {
			return self.offer_tree(path).await;
		}
		if !meta.is_file() {
			return Ok(());
		}

		if self.store.contains_path(&rel) {
			// Underlying inode may have been stomped; contents decide
			return self.patch_if_changed(&path, &rel).await;
		}
		self.offer_file(&path).await
	}

	async fn on_change(&mut self, path: PathBuf) -> Result<(), SyncError> {
		let rel = match self.rel_of(&path) {
			Some(rel) => rel,
			None => return Ok(()),
		};

		if self.store.contains_path(&rel) {
			if self.is_ignored(&path) {
				return Ok(());
			}
			return self.patch_if_changed(&path, &rel).await;
		}
		// A change for something we never tracked is a late create
		self.on_create(path).await
	}

	async fn on_delete(&mut self, path: PathBuf) -> Result<(), SyncError> {
		let rel = match self.rel_of(&path) {
			Some(rel) => rel,
			None => return Ok(()),
		};
		self.expected.remove(&path);
		self.request_delete(&rel).await
	}

	/// Renames are conservative: many platforms cannot distinguish rename
	/// from remove+create, so resolve the path by stat and re-scan the
	/// parent for files that appeared.
	async fn on_rename(&mut self, path: PathBuf) -> Result<(), SyncError> {
		match tokio::fs::symlink_metadata(&path).await {
			Ok(_) => self.on_create(path.clone()).await?,
			Err(_) => {
				if let Some(rel) = self.rel_of(&path) {
					self.request_delete(&rel).await?;
				}
			}
		}

		let parent = match path.parent() {
			Some(parent) if parent.starts_with(&self.root) => parent.to_path_buf(),
			_ => return Ok(()),
		};
		let mut entries = match tokio::fs::read_dir(&parent).await {
			Ok(entries) => entries,
			Err(_) => return Ok(()),
		};
		while let Ok(Some(entry)) = entries.next_entry().await {
			let entry_path = entry.path();
			let rel = match self.rel_of(&entry_path) {
				Some(rel) => rel,
				None => continue,
			};
			if self.store.contains_path(&rel) || self.pending_creates.contains_key(&rel) {
				continue;
			}
			self.on_create(entry_path).await?;
		}
		Ok(())
	}

	/// Read the file and, unless its checksum still matches the tracked
	/// one (a self-echo of our own write), diff and send a patch.
	async fn patch_if_changed(&mut self, path: &Path, rel: &str) -> Result<(), SyncError> {
		let (id, tracked_md5, pending) = match self.store.by_path(rel) {
			Some(buf) => (buf.id, buf.md5.clone(), buf.pending()),
			None => return Ok(()),
		};
		if pending {
			debug!("ignoring change to {} while content is pending", rel);
			return Ok(());
		}

		let expected = self.expected.remove(path);

		let current = match tokio::fs::read(path).await {
			Ok(content) => content,
			Err(e) => {
				error!("Error reading {}: {}", path.display(), e);
				return Ok(());
			}
		};

		if md5_hex(&current) == tracked_md5 {
			// Mandatory suppression: this is the echo of our own write
			debug!("got expected change");
			return Ok(());
		}

		if expected {
			// Our own write is still in flight and we read a partial
			// revision; its settled notification is coming
			debug!("change for {} while our write is in flight", rel);
			return Ok(());
		}

		self.send_patch(id, &current).await
	}

	/// Diff the tracked content against `after`, send the patch, then
	/// commit `after` to the store.
	async fn send_patch(&mut self, id: u64, after: &[u8]) -> Result<(), SyncError> {
		if self.options.read_only {
			return Ok(());
		}
		let (path, encoding, md5_before, base) = match self.store.get(id) {
			Some(buf) => match &buf.content {
				Some(content) => {
					(buf.path.clone(), buf.encoding, buf.md5.clone(), content.clone())
				}
				None => return Ok(()),
			},
			None => return Ok(()),
		};

		let patch = match self.engine.make_patch(&base, after, encoding) {
			Ok(patch) => patch,
			Err(e) => {
				warn!("Can't make patch for {}: {}", path, e);
				return Ok(());
			}
		};
		let md5_after = md5_hex(after);

		self.conn
			.send(&ClientMessage::Patch { id, path, patch, md5_before, md5_after })
			.await?;
		self.store.update_content(id, after.to_vec());
		Ok(())
	}

	/// Ask the server to drop the buffer at `rel`, cascading to nested
	/// buffers when `rel` was a directory.
	async fn request_delete(&mut self, rel: &str) -> Result<(), SyncError> {
		if self.options.read_only {
			return Ok(());
		}
		let ids = match self.store.by_path(rel) {
			Some(buf) => vec![buf.id],
			None => self.store.ids_under(rel),
		};
		for id in ids {
			debug!("Deleting buffer {} under {}", id, rel);
			self.conn.send(&ClientMessage::DeleteBuf { id }).await?;
		}
		Ok(())
	}

	/// Offer one untracked file to the server.
	async fn offer_file(&mut self, path: &Path) -> Result<(), SyncError> {
		if self.options.read_only {
			return Ok(());
		}
		let rel = match self.rel_of(path) {
			Some(rel) => rel,
			None => return Ok(()),
		};
		if self.store.contains_path(&rel) || self.pending_creates.contains_key(&rel) {
			return Ok(());
		}

		let content = match tokio::fs::read(path).await {
			Ok(content) => content,
			Err(e) => {
				error!("Error reading {}: {}", path.display(), e);
				return Ok(());
			}
		};
		let encoding = Encoding::detect(&content);
		let md5 = md5_hex(&content);

		info!("buf {} doesn't exist. creating...", rel);
		self.pending_creates.insert(rel.clone(), md5.clone());
		Ok(self
			.conn
			.send(&ClientMessage::CreateBuf {
				buf: encode_content(&content, encoding),
				encoding,
				md5,
				path: rel,
			})
			.await?)
	}

	/// Walk a directory, offering every untracked, unignored file. The
	/// ignore chain is threaded through the descent.
	async fn offer_tree(&mut self, start: PathBuf) -> Result<(), SyncError> {
		let chain = IgnoreChain::for_path(&self.root, &start);
		let mut stack = vec![(start, chain)];

		while let Some((dir, chain)) = stack.pop() {
			let mut entries = match tokio::fs::read_dir(&dir).await {
				Ok(entries) => entries,
				Err(e) => {
					error!("Error reading directory {}: {}", dir.display(), e);
					continue;
				}
			};
			loop {
				let entry = match entries.next_entry().await {
					Ok(Some(entry)) => entry,
					Ok(None) => break,
					Err(e) => {
						error!("Error reading directory {}: {}", dir.display(), e);
						break;
					}
				};
				let path = entry.path();
				let name = entry.file_name().to_string_lossy().into_owned();
				if ignore::is_hidden(&name) {
					debug!("Not creating buf for hidden path {}", path.display());
					continue;
				}
				if chain.is_ignored(&path) {
					debug!("Not adding {} because path is ignored.", path.display());
					continue;
				}
				let meta = match tokio::fs::symlink_metadata(&path).await {
					Ok(meta) => meta,
					Err(e) => {
						error!("Error statting {}: {}", path.display(), e);
						continue;
					}
				};
				if meta.is_symlink() {
					error!("Skipping {} because it is a symlink.", path.display());
					continue;
				}
				if meta.is_dir() {
					stack.push((path.clone(), chain.descend(&path)));
				} else if meta.is_file() {
					self.offer_file(&path).await?;
				}
			}
		}
		Ok(())
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_plan_matching_checksums() {
		assert_eq!(
			reconcile_plan(Some("abc"), "abc", ConflictPolicy::PreferServer),
			ReconcilePlan::Matches
		);
		assert_eq!(
			reconcile_plan(Some("abc"), "abc", ConflictPolicy::PreferLocal),
			ReconcilePlan::Matches
		);
	}

	#[test]
	fn test_plan_divergent_checksums() {
		// Server wins: fetch and adopt, no push back
		assert_eq!(
			reconcile_plan(Some("aaa"), "bbb", ConflictPolicy::PreferServer),
			ReconcilePlan::FetchServer { push_local_after: false }
		);
		// Local wins: fetch the base, then patch it back to local state
		assert_eq!(
			reconcile_plan(Some("aaa"), "bbb", ConflictPolicy::PreferLocal),
			ReconcilePlan::FetchServer { push_local_after: true }
		);
	}

	#[test]
	fn test_plan_missing_local_file() {
		assert_eq!(
			reconcile_plan(None, "abc", ConflictPolicy::PreferServer),
			ReconcilePlan::FetchServer { push_local_after: false }
		);
		assert_eq!(
			reconcile_plan(None, "abc", ConflictPolicy::PreferLocal),
			ReconcilePlan::DeleteOnServer
		);
	}
}

// vim: ts=4
