//! Sync engine - the orchestrator of one sync run
//!
//! A run walks the phases of [`SyncPhase`] in order:
//!
//! ```text
//! Idle -> Locking -> PullingDelta -> ResolvingConflicts -> Pushing
//!      -> AdvancingCursor -> Unlocking -> Idle
//! ```
//!
//! ## Pull
//!
//! Remote changes are read page by page (native delta) or as one computed
//! page (basic delta). A page is downloaded in full before it is applied.
//! Changes to items without unpushed local edits are applied right away;
//! the others are set aside for the resolving phase.
//! A page's cursor is stored once all of its changes are applied, or, when
//! changes were set aside, once those are resolved.
//!
//! ## Push
//!
//! Pending local changes are read in batches, collapsed to one per item and
//! uploaded with bounded concurrency. Results are applied to the local store
//! one at a time. A change record is consumed only after its remote write
//! succeeded.
//!
//! ## Failure policy
//!
//! Per-item problems end up in the [`SyncReport`]. Remote failures that
//! survive the retry policy end the run with a [`SyncError`]; the lock is
//! released on every path out of `Locking`.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::Utc;
use futures_util::stream::{self, StreamExt};
use notesync_conflict::{
    ConflictNamer, ConflictResolver, Decision, FolderTree, Resolution, ResolveInput,
};
use notesync_core::config::{Config, LockConfig, SyncConfig};
use notesync_core::domain::{
    ChangeRecord, ClientId, ConflictItem, Cursor, DomainError, ItemFailure, ItemId, SkipReason,
    SkippedItem, SyncItem, SyncPhase, SyncReport, SyncSession, SyncState, TargetId,
};
use notesync_core::ports::{
    decryption_key, ApplyOutcome, EncryptionService, ErrorClass, FetchStatus, LocalStore,
    NoEncryption, NullObserver, PendingDecryption, Precondition, RemoteError, RemoteFileApi,
    SyncEvent, SyncObserver,
};
use notesync_remote::layout;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::codec::{DecodeError, EnvelopeHeader, ItemCodec};
use crate::delta::{DeltaMode, DeltaPage, DeltaTracker, RemoteChange};
use crate::error::{RunDisposition, SyncError};
use crate::lock::{LockGuard, LockManager};
use crate::retry::RetryPolicy;
use crate::run_guard::RunRegistry;
use crate::target_info::check_target;
use crate::transfer::{BlobDownload, BlobUpload, ItemTransfer, PreparedUpload};

// ============================================================================
// Run context
// ============================================================================

/// A remote version set aside until the resolving phase
struct Contested {
    remote: SyncItem,
    remote_time: i64,
}

/// One page entry after download
enum Pulled {
    Updated { remote: SyncItem, remote_time: i64 },
    Deleted(ItemId),
    /// Already applied, vanished or skipped
    Unchanged,
}

enum PushOp {
    Put {
        bytes: Vec<u8>,
        precondition: Precondition,
    },
    Delete,
}

struct PushJob {
    item: SyncItem,
    /// Latest change record covered by this upload
    change: ChangeRecord,
    op: PushOp,
}

/// Mutable state of one run
struct RunContext<'a> {
    session: SyncSession,
    cancel: &'a CancellationToken,
    transfer: ItemTransfer,
    state: SyncState,
    tree: FolderTree,
    contested: Vec<Contested>,
    /// Cursor waiting for the contested items to be resolved
    deferred_cursor: Option<Option<Cursor>>,
    /// Items whose decryption was already attempted in this run
    decrypt_attempted: HashSet<ItemId>,
}

impl RunContext<'_> {
    fn checkpoint(&self) -> Result<(), SyncError> {
        if self.cancel.is_cancelled() {
            Err(SyncError::Cancelled)
        } else {
            Ok(())
        }
    }

    fn report(&mut self) -> &mut SyncReport {
        self.session.report_mut()
    }
}

// ============================================================================
// SyncEngine
// ============================================================================

pub struct SyncEngine {
    api: Arc<dyn RemoteFileApi>,
    store: Arc<dyn LocalStore>,
    encryption: Arc<dyn EncryptionService>,
    observer: Arc<dyn SyncObserver>,
    registry: RunRegistry,
    resolver: ConflictResolver,
    retry: RetryPolicy,
    target: TargetId,
    client_id: ClientId,
    client_type: String,
    sync: SyncConfig,
    lock: LockConfig,
    decryption_max_attempts: u32,
    run_retries: u32,
}

impl SyncEngine {
    /// Creates an engine for the target described by `config`
    ///
    /// # Errors
    ///
    /// Returns `DomainError` if the configured target id is invalid.
    pub fn new(
        config: &Config,
        api: Arc<dyn RemoteFileApi>,
        store: Arc<dyn LocalStore>,
    ) -> Result<Self, DomainError> {
        Ok(Self {
            api,
            store,
            encryption: Arc::new(NoEncryption),
            observer: Arc::new(NullObserver),
            registry: RunRegistry::new(),
            resolver: ConflictResolver::new(),
            retry: RetryPolicy::from_config(&config.retry),
            target: config.target_id()?,
            client_id: ClientId::new(),
            client_type: "cli".to_string(),
            sync: config.sync.clone(),
            lock: config.lock.clone(),
            decryption_max_attempts: config.decryption.max_attempts.max(1),
            run_retries: config.retry.run_retries,
        })
    }

    pub fn with_encryption(mut self, encryption: Arc<dyn EncryptionService>) -> Self {
        self.encryption = encryption;
        self
    }

    pub fn with_observer(mut self, observer: Arc<dyn SyncObserver>) -> Self {
        self.observer = observer;
        self
    }

    /// Shares the in-process run guard with other engines
    pub fn with_run_registry(mut self, registry: RunRegistry) -> Self {
        self.registry = registry;
        self
    }

    pub fn with_client_id(mut self, client_id: ClientId) -> Self {
        self.client_id = client_id;
        self
    }

    pub fn with_client_type(mut self, client_type: impl Into<String>) -> Self {
        self.client_type = client_type.into();
        self
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn target(&self) -> &TargetId {
        &self.target
    }

    pub fn client_id(&self) -> ClientId {
        self.client_id
    }

    pub fn lock_manager(&self) -> LockManager {
        LockManager::new(Arc::clone(&self.api), self.lock.clone(), self.retry.clone())
            .with_client_type(self.client_type.clone())
    }

    fn emit(&self, event: SyncEvent) {
        self.observer.on_event(&event);
    }

    // ========================================================================
    // Entry points
    // ========================================================================

    /// Runs a sync, retrying the whole run for errors that allow it
    ///
    /// A cancelled run is not an error: the returned report has
    /// `cancelled` set.
    pub async fn sync(&self, cancel: &CancellationToken) -> Result<SyncReport, SyncError> {
        let mut attempt = 0u32;
        loop {
            match self.run_once(cancel).await {
                Err(err)
                    if err.disposition() == RunDisposition::RetryNow
                        && attempt < self.run_retries =>
                {
                    let delay = self.retry.backoff(attempt);
                    warn!(
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "Sync run failed, retrying"
                    );
                    tokio::select! {
                        _ = cancel.cancelled() => return Err(err),
                        _ = tokio::time::sleep(delay) => {}
                    }
                    attempt += 1;
                }
                other => return other,
            }
        }
    }

    /// Runs exactly one sync attempt
    #[tracing::instrument(skip(self, cancel), fields(target = %self.target))]
    pub async fn run_once(&self, cancel: &CancellationToken) -> Result<SyncReport, SyncError> {
        let session = SyncSession::new(self.target.clone(), self.client_id);
        let _run = self.registry.try_begin(&self.target, *session.id())?;
        info!(session = %session.id(), "Starting sync run");

        let mut ctx = RunContext {
            session,
            cancel,
            transfer: ItemTransfer::new(
                Arc::clone(&self.api),
                self.retry.clone(),
                ItemCodec::new(Arc::clone(&self.encryption)),
                self.sync.max_item_size_bytes,
            ),
            state: SyncState::new(self.target.clone()),
            tree: FolderTree::default(),
            contested: Vec::new(),
            deferred_cursor: None,
            decrypt_attempted: HashSet::new(),
        };

        // Step 1: Take the remote lock
        self.advance(&mut ctx, SyncPhase::Locking)?;
        let guard = match self
            .lock_manager()
            .acquire(ctx.session.lock_identity(), cancel)
            .await
        {
            Ok(guard) => guard,
            Err(SyncError::Cancelled) => {
                self.advance(&mut ctx, SyncPhase::Idle)?;
                ctx.session.cancel();
                return Ok(self.finish(ctx));
            }
            Err(err) => {
                self.advance(&mut ctx, SyncPhase::Error)?;
                self.advance(&mut ctx, SyncPhase::Idle)?;
                ctx.session.fail(err.to_string());
                self.finish(ctx);
                return Err(err);
            }
        };
        ctx.session.set_lock_handle(Some(guard.handle()));

        // Steps 2-5: pull, resolve, push, advance the cursor
        let outcome = self.run_phases(&mut ctx, &guard).await;

        // Step 6: Always release the lock
        match &outcome {
            Ok(()) | Err(SyncError::Cancelled) => {}
            Err(_) => self.advance(&mut ctx, SyncPhase::Error)?,
        }
        self.advance(&mut ctx, SyncPhase::Unlocking)?;
        if let Err(err) = guard.release().await {
            warn!(error = %err, "Failed to release sync lock, it will go stale");
        }
        ctx.session.set_lock_handle(None);
        if let Err(err) = self.clear_lock_handle(&mut ctx).await {
            warn!(error = %err, "Failed to clear lock handle from sync state");
        }
        self.advance(&mut ctx, SyncPhase::Idle)?;

        match outcome {
            Ok(()) => {
                ctx.session.complete();
                Ok(self.finish(ctx))
            }
            Err(SyncError::Cancelled) => {
                info!("Sync run cancelled");
                ctx.session.cancel();
                Ok(self.finish(ctx))
            }
            Err(err) => {
                warn!(error = %err, "Sync run failed");
                ctx.session.fail(err.to_string());
                self.finish(ctx);
                Err(err)
            }
        }
    }

    async fn run_phases(
        &self,
        ctx: &mut RunContext<'_>,
        guard: &LockGuard,
    ) -> Result<(), SyncError> {
        // Step 2: Pull remote changes
        self.advance(ctx, SyncPhase::PullingDelta)?;
        check_target(
            self.api.as_ref(),
            &self.retry,
            self.store.as_ref(),
            &self.target,
            self.encryption.is_enabled(),
            self.sync.wipe_out_fail_safe,
        )
        .await?;

        ctx.state = self.store.get_sync_state(&self.target).await?;
        ctx.state.lock_handle = Some(guard.handle());
        self.store.set_sync_state(&ctx.state).await?;
        ctx.session.set_cursor_start(ctx.state.last_cursor.clone());
        ctx.tree = FolderTree::new(self.store.folder_parents().await?)?;

        self.retry_pending_decryptions(ctx).await?;
        self.pull(ctx).await?;
        guard.check()?;
        ctx.checkpoint()?;

        // Step 3: Resolve changes that met unpushed local edits
        self.advance(ctx, SyncPhase::ResolvingConflicts)?;
        self.resolve_contested(ctx).await?;
        self.download_resources(ctx).await?;
        guard.check()?;
        ctx.checkpoint()?;

        // Step 4: Push local changes
        self.advance(ctx, SyncPhase::Pushing)?;
        self.push(ctx).await?;
        self.upload_resources(ctx).await?;
        guard.check()?;

        // Step 5: Record completion
        self.advance(ctx, SyncPhase::AdvancingCursor)?;
        ctx.state.last_sync_time = Some(Utc::now());
        self.store.set_sync_state(&ctx.state).await?;
        Ok(())
    }

    fn advance(&self, ctx: &mut RunContext<'_>, phase: SyncPhase) -> Result<(), SyncError> {
        let from = ctx.session.advance_to(phase)?;
        debug!(%from, to = %phase, "Sync phase changed");
        self.emit(SyncEvent::PhaseChanged { from, to: phase });
        Ok(())
    }

    async fn clear_lock_handle(&self, ctx: &mut RunContext<'_>) -> Result<(), SyncError> {
        if ctx.state.lock_handle.take().is_some() {
            self.store.set_sync_state(&ctx.state).await?;
        }
        Ok(())
    }

    fn finish(&self, ctx: RunContext<'_>) -> SyncReport {
        let report = ctx.session.report().clone();
        info!(
            status = ?ctx.session.status(),
            duration_ms = ctx.session.duration().num_milliseconds(),
            downloaded = report.downloaded,
            uploaded = report.uploaded,
            deleted_local = report.deleted_local,
            deleted_remote = report.deleted_remote,
            merged = report.merged,
            conflicts = report.conflicts.len(),
            skipped = report.skipped.len(),
            failures = report.failures.len(),
            "Sync run finished"
        );
        self.emit(SyncEvent::Finished(report.clone()));
        report
    }

    // ========================================================================
    // Report helpers
    // ========================================================================

    fn skip(&self, ctx: &mut RunContext<'_>, item_id: &ItemId, reason: SkipReason) {
        let skipped = SkippedItem {
            item_id: Some(item_id.clone()),
            path: Some(layout::item_path(item_id)),
            reason,
        };
        debug!(item_id = %item_id, reason = %skipped.reason.describe(), "Item skipped");
        ctx.report().skipped.push(skipped.clone());
        self.emit(SyncEvent::ItemSkipped(skipped));
    }

    fn fail_item(&self, ctx: &mut RunContext<'_>, item_id: &ItemId, message: impl Into<String>) {
        let failure = ItemFailure {
            item_id: Some(item_id.clone()),
            path: Some(layout::item_path(item_id)),
            message: message.into(),
        };
        warn!(item_id = %item_id, error = %failure.message, "Item failed");
        ctx.report().failures.push(failure.clone());
        self.emit(SyncEvent::ItemFailed(failure));
    }

    /// Excludes an item from upload until it changes again
    async fn disable(
        &self,
        ctx: &mut RunContext<'_>,
        item_id: &ItemId,
        reason: SkipReason,
    ) -> Result<(), SyncError> {
        self.store
            .set_sync_disabled(item_id, Some(&reason.describe()))
            .await?;
        self.skip(ctx, item_id, reason);
        Ok(())
    }

    // ========================================================================
    // Pull
    // ========================================================================

    #[tracing::instrument(skip(self, ctx))]
    async fn pull(&self, ctx: &mut RunContext<'_>) -> Result<(), SyncError> {
        let tracker = DeltaTracker::new(self.api.as_ref(), &self.retry, self.sync.page_size);
        let mut cursor = ctx.state.last_cursor.clone();

        if tracker.mode_for(cursor.as_ref()) == DeltaMode::Native {
            while let Some(current) = cursor.take() {
                ctx.checkpoint()?;
                let Some(page) = tracker.native_page(&current).await? else {
                    break;
                };
                let has_more = page.has_more;
                let next = page.cursor.clone();
                self.apply_page(ctx, page).await?;
                if !has_more {
                    return Ok(());
                }
                cursor = next;
            }
        }

        let known = self.store.remote_times(&self.target).await?;
        let page = tracker.basic_delta(&known).await?;
        info!(changes = page.changes.len(), "Full listing compared with known items");
        self.apply_page(ctx, page).await
    }

    /// Downloads a whole page, then applies it
    ///
    /// Folder placements on the page are staged in the folder tree before
    /// anything is applied, so concurrent moves are checked for cycles
    /// against the hierarchy the page ends with.
    async fn apply_page(&self, ctx: &mut RunContext<'_>, page: DeltaPage) -> Result<(), SyncError> {
        let total = page.changes.len() as u64;
        let mut pulled = Vec::with_capacity(page.changes.len());
        for change in page.changes {
            ctx.checkpoint()?;
            pulled.push(self.fetch_change(ctx, change).await?);
        }
        self.stage_folder_moves(ctx, &pulled).await?;

        for (done, change) in pulled.into_iter().enumerate() {
            // A cancelled page keeps its old cursor and is pulled again
            ctx.checkpoint()?;
            match change {
                Pulled::Updated {
                    remote,
                    remote_time,
                } => self.accept_remote(ctx, remote, remote_time).await?,
                Pulled::Deleted(item_id) => self.pull_deletion(ctx, &item_id).await?,
                Pulled::Unchanged => {}
            }
            self.emit(SyncEvent::Progress {
                phase: SyncPhase::PullingDelta,
                done: done as u64 + 1,
                total,
            });
        }
        self.store_cursor(ctx, page.cursor).await
    }

    /// Records where the page's folders end up
    ///
    /// Folders with unpushed local edits keep their local placement until
    /// they are resolved.
    async fn stage_folder_moves(
        &self,
        ctx: &mut RunContext<'_>,
        pulled: &[Pulled],
    ) -> Result<(), SyncError> {
        for change in pulled {
            let Pulled::Updated { remote, .. } = change else {
                continue;
            };
            if !remote.is_folder() || remote.is_deleted() {
                continue;
            }
            if self.store.pending_change(remote.id()).await?.is_some() {
                continue;
            }
            ctx.tree
                .set_parent(remote.id().clone(), remote.parent_id().cloned());
        }
        Ok(())
    }

    async fn store_cursor(
        &self,
        ctx: &mut RunContext<'_>,
        cursor: Option<Cursor>,
    ) -> Result<(), SyncError> {
        if !ctx.contested.is_empty() {
            ctx.deferred_cursor = Some(cursor);
            return Ok(());
        }
        ctx.state.last_cursor = cursor.clone();
        self.store.set_sync_state(&ctx.state).await?;
        ctx.session.set_cursor_end(cursor);
        Ok(())
    }

    /// Downloads and decodes one change without applying it
    async fn fetch_change(
        &self,
        ctx: &mut RunContext<'_>,
        change: RemoteChange,
    ) -> Result<Pulled, SyncError> {
        if change.is_deleted {
            return Ok(Pulled::Deleted(change.item_id));
        }
        let record = self.store.sync_record(&self.target, &change.item_id).await?;
        if record
            .as_ref()
            .is_some_and(|r| r.remote_updated_time == change.updated_time)
        {
            debug!(item_id = %change.item_id, "Remote version already applied");
            return Ok(Pulled::Unchanged);
        }

        let Some(bytes) = ctx.transfer.fetch(&change).await? else {
            // Removed after it was listed; the next delta reports the deletion
            debug!(item_id = %change.item_id, "Remote item vanished before download");
            return Ok(Pulled::Unchanged);
        };
        let decoded = self
            .decode_remote(ctx, &change.item_id, &bytes, change.updated_time)
            .await?;
        Ok(match decoded {
            Some(remote) => Pulled::Updated {
                remote,
                remote_time: change.updated_time,
            },
            None => Pulled::Unchanged,
        })
    }

    async fn pull_deletion(
        &self,
        ctx: &mut RunContext<'_>,
        item_id: &ItemId,
    ) -> Result<(), SyncError> {
        self.store
            .remove_pending_decryption(&self.target, item_id)
            .await?;
        let Some(local) = self.store.get_item(item_id).await? else {
            self.store.forget_synced(&self.target, item_id).await?;
            return Ok(());
        };
        let mut tombstone = local;
        tombstone.mark_deleted();
        self.accept_remote(ctx, tombstone, 0).await
    }

    /// Decodes envelope bytes, parking undecryptable ones
    ///
    /// Returns `None` if the item was skipped.
    async fn decode_remote(
        &self,
        ctx: &mut RunContext<'_>,
        item_id: &ItemId,
        bytes: &[u8],
        remote_time: i64,
    ) -> Result<Option<SyncItem>, SyncError> {
        match ctx.transfer.decode(bytes) {
            Ok(item) if item.id() == item_id => {
                if ctx.transfer.codec().encryption_enabled() {
                    self.store
                        .remove_pending_decryption(&self.target, item_id)
                        .await?;
                    self.store
                        .clear_decryption_attempts(&decryption_key(item.item_type(), item_id))
                        .await?;
                }
                Ok(Some(item))
            }
            Ok(item) => {
                self.skip(
                    ctx,
                    item_id,
                    SkipReason::InvalidRemoteItem {
                        message: format!("file holds item {}", item.id()),
                    },
                );
                Ok(None)
            }
            Err(DecodeError::Invalid(message)) => {
                self.skip(ctx, item_id, SkipReason::InvalidRemoteItem { message });
                Ok(None)
            }
            Err(DecodeError::Undecryptable { header, message }) => {
                self.park(ctx, header, bytes, remote_time, &message).await?;
                Ok(None)
            }
        }
    }

    async fn park(
        &self,
        ctx: &mut RunContext<'_>,
        header: EnvelopeHeader,
        bytes: &[u8],
        remote_time: i64,
        message: &str,
    ) -> Result<(), SyncError> {
        let key = decryption_key(header.item_type, &header.id);
        let mut attempts = self.store.decryption_attempts(&key).await?;
        if attempts < self.decryption_max_attempts && ctx.decrypt_attempted.insert(header.id.clone())
        {
            attempts = self.store.record_decryption_failure(&key, message).await?;
        }
        self.store
            .park_undecryptable(
                &self.target,
                &PendingDecryption {
                    item_id: header.id.clone(),
                    item_type: header.item_type,
                    envelope: bytes.to_vec(),
                    remote_updated_time: remote_time,
                },
            )
            .await?;

        let reason = if attempts >= self.decryption_max_attempts {
            SkipReason::Undecryptable { attempts }
        } else {
            SkipReason::DecryptionPending { attempts }
        };
        self.skip(ctx, &header.id, reason);
        Ok(())
    }

    /// Retries envelopes that could not be decrypted on earlier runs
    async fn retry_pending_decryptions(&self, ctx: &mut RunContext<'_>) -> Result<(), SyncError> {
        for pending in self.store.pending_decryptions(&self.target).await? {
            ctx.checkpoint()?;
            let key = decryption_key(pending.item_type, &pending.item_id);
            let attempts = self.store.decryption_attempts(&key).await?;
            if attempts >= self.decryption_max_attempts {
                self.skip(ctx, &pending.item_id, SkipReason::Undecryptable { attempts });
                continue;
            }
            if let Some(remote) = self
                .decode_remote(
                    ctx,
                    &pending.item_id,
                    &pending.envelope,
                    pending.remote_updated_time,
                )
                .await?
            {
                info!(item_id = %pending.item_id, "Previously undecryptable item decrypted");
                self.accept_remote(ctx, remote, pending.remote_updated_time)
                    .await?;
            }
        }
        Ok(())
    }

    /// Applies a remote version now, or sets it aside if local edits are pending
    async fn accept_remote(
        &self,
        ctx: &mut RunContext<'_>,
        remote: SyncItem,
        remote_time: i64,
    ) -> Result<(), SyncError> {
        if ctx.session.phase() == SyncPhase::PullingDelta
            && self.store.pending_change(remote.id()).await?.is_some()
        {
            debug!(item_id = %remote.id(), "Remote change meets local edits, deferring");
            ctx.contested.push(Contested {
                remote,
                remote_time,
            });
            return Ok(());
        }
        self.reconcile(ctx, &remote, remote_time).await
    }

    // ========================================================================
    // Resolve
    // ========================================================================

    #[tracing::instrument(skip(self, ctx), fields(count = ctx.contested.len()))]
    async fn resolve_contested(&self, ctx: &mut RunContext<'_>) -> Result<(), SyncError> {
        let contested = std::mem::take(&mut ctx.contested);
        let total = contested.len() as u64;
        for (done, item) in contested.into_iter().enumerate() {
            ctx.checkpoint()?;
            self.reconcile(ctx, &item.remote, item.remote_time).await?;
            self.emit(SyncEvent::Progress {
                phase: SyncPhase::ResolvingConflicts,
                done: done as u64 + 1,
                total,
            });
        }
        if let Some(cursor) = ctx.deferred_cursor.take() {
            self.store_cursor(ctx, cursor).await?;
        }
        Ok(())
    }

    /// Resolves one remote version against local state and applies the result
    async fn reconcile(
        &self,
        ctx: &mut RunContext<'_>,
        remote: &SyncItem,
        remote_time: i64,
    ) -> Result<(), SyncError> {
        let id = remote.id();
        let local = self.store.get_item(id).await?;
        let record = self.store.sync_record(&self.target, id).await?;
        let pending = self.store.pending_change(id).await?;

        let resolution = self.resolver.resolve(
            ResolveInput {
                remote,
                local: local.as_ref(),
                base: record.as_ref().and_then(|r| r.base.as_ref()),
                pending: pending.as_ref(),
            },
            &ctx.tree,
        )?;
        self.apply_resolution(ctx, remote, remote_time, pending.as_ref(), resolution)
            .await
    }

    async fn apply_resolution(
        &self,
        ctx: &mut RunContext<'_>,
        remote: &SyncItem,
        remote_time: i64,
        pending: Option<&ChangeRecord>,
        resolution: Resolution,
    ) -> Result<(), SyncError> {
        let id = remote.id();

        if let Some(copy) = resolution.conflict_copy.clone() {
            self.save_conflict_copy(ctx, copy).await?;
        }

        match &resolution.decision {
            Decision::ApplyRemote => {
                match self.store.apply_remote_item(remote).await? {
                    ApplyOutcome::Created | ApplyOutcome::Updated => ctx.report().downloaded += 1,
                    ApplyOutcome::Deleted => ctx.report().deleted_local += 1,
                    ApplyOutcome::Unchanged => {}
                }
                if remote.is_resource() && !remote.is_deleted() {
                    self.queue_blob_download(remote).await?;
                }
            }
            Decision::SaveLocal(item) => {
                self.store.save_local_item(item).await?;
                if resolution.merged {
                    ctx.report().merged += 1;
                }
                if resolution.moved_to_root {
                    warn!(folder_id = %id, "Folder placed at the root to break a cycle");
                }
            }
            Decision::KeepLocal | Decision::NoOp => {}
        }

        if remote.is_deleted() {
            self.store.forget_synced(&self.target, id).await?;
        } else {
            self.store
                .mark_synced(&self.target, remote, remote_time)
                .await?;
        }

        if resolution.discard_pending {
            if let Some(change) = pending {
                self.store.consume_changes(id, change.id).await?;
            }
        }

        if let Some(result) = resolution.resulting_item(remote) {
            if result.is_folder() {
                if result.is_deleted() {
                    ctx.tree.remove(id);
                } else {
                    ctx.tree.set_parent(id.clone(), result.parent_id().cloned());
                }
            }
        }
        Ok(())
    }

    async fn save_conflict_copy(
        &self,
        ctx: &mut RunContext<'_>,
        copy: ConflictItem,
    ) -> Result<(), SyncError> {
        let original = copy.original_id().clone();
        let reason = copy.reason();
        let mut item = copy.into_item();

        let source_title = item.title().to_string();
        let mut chosen = None;
        for candidate in ConflictNamer::candidates(&source_title) {
            if !self.store.title_exists(&candidate, item.parent_id()).await? {
                chosen = Some(candidate);
                break;
            }
        }
        item.set_title(chosen.unwrap_or_else(|| ConflictNamer::generate(&source_title)));

        let saved = self.store.save_local_item(&item).await?;
        info!(
            original = %original,
            copy = %saved.id(),
            reason = reason.as_str(),
            title = saved.title(),
            "Created conflict copy"
        );
        ctx.report().conflicts.push(saved.id().clone());
        self.emit(SyncEvent::ConflictCreated {
            original,
            copy: saved.id().clone(),
        });
        Ok(())
    }

    // ========================================================================
    // Resources
    // ========================================================================

    /// Marks a resource's blob for download unless the local copy matches
    async fn queue_blob_download(&self, item: &SyncItem) -> Result<(), SyncError> {
        let id = item.id();
        let up_to_date = match self.store.read_blob(id).await? {
            Some(data) => item.content_hash().is_some_and(|h| h.matches(&data)),
            None => false,
        };
        if !up_to_date {
            let mut state = self.store.resource_state(id).await?;
            state.fetch_status = FetchStatus::Pending;
            self.store.set_resource_state(&state).await?;
        }
        Ok(())
    }

    #[tracing::instrument(skip(self, ctx))]
    async fn download_resources(&self, ctx: &mut RunContext<'_>) -> Result<(), SyncError> {
        for item in self.store.resources_needing_download().await? {
            ctx.checkpoint()?;
            let id = item.id();
            let mut state = self.store.resource_state(id).await?;
            match ctx.transfer.download_blob(&item).await {
                Ok(BlobDownload::Ready(data)) => {
                    self.store.write_blob(id, &data).await?;
                    state.fetch_status = FetchStatus::Done;
                    state.fetch_error = None;
                    state.remote_blob_hash = item.content_hash().cloned();
                    debug!(item_id = %id, size = data.len(), "Downloaded resource blob");
                }
                Ok(BlobDownload::Missing) => {
                    state.fetch_error = Some("content not on the target yet".to_string());
                    self.skip(ctx, id, SkipReason::ContentUnavailable);
                }
                Ok(BlobDownload::Corrupt { expected, actual }) => {
                    let message = format!("content hash {actual} does not match {expected}");
                    state.fetch_error = Some(message.clone());
                    self.fail_item(ctx, id, message);
                }
                Err(err) if is_item_level(&err) => {
                    state.fetch_error = Some(err.to_string());
                    self.fail_item(ctx, id, err.to_string());
                }
                Err(err) => return Err(err.into()),
            }
            self.store.set_resource_state(&state).await?;
        }
        Ok(())
    }

    #[tracing::instrument(skip(self, ctx))]
    async fn upload_resources(&self, ctx: &mut RunContext<'_>) -> Result<(), SyncError> {
        for item in self.store.resources_needing_upload().await? {
            ctx.checkpoint()?;
            let id = item.id();
            // Metadata goes first; its blob follows on the run that pushed it
            if self.store.sync_record(&self.target, id).await?.is_none() {
                continue;
            }
            let Some(data) = self.store.read_blob(id).await? else {
                continue;
            };
            match ctx.transfer.upload_blob(&item, &data).await {
                Ok(BlobUpload::Uploaded) => {
                    let mut state = self.store.resource_state(id).await?;
                    state.remote_blob_hash = item.content_hash().cloned();
                    state.fetch_status = FetchStatus::Done;
                    state.fetch_error = None;
                    self.store.set_resource_state(&state).await?;
                }
                Ok(BlobUpload::TooLarge { size, max }) => {
                    self.disable(ctx, id, SkipReason::TooLarge { size, max })
                        .await?;
                }
                Err(err) if err.class() == ErrorClass::Quota => {
                    self.disable(ctx, id, SkipReason::QuotaExceeded).await?;
                }
                Err(err) if is_item_level(&err) => self.fail_item(ctx, id, err.to_string()),
                Err(err) => return Err(err.into()),
            }
        }
        Ok(())
    }

    // ========================================================================
    // Push
    // ========================================================================

    #[tracing::instrument(skip(self, ctx))]
    async fn push(&self, ctx: &mut RunContext<'_>) -> Result<(), SyncError> {
        let batch_size = self.sync.push_batch_size.max(1);
        let mut after = 0i64;
        loop {
            ctx.checkpoint()?;
            let records = self.store.items_changed_since(after, batch_size).await?;
            let Some(last) = records.last() else {
                break;
            };
            after = last.id;

            let batch = ChangeRecord::collapse(records);
            let jobs = self.prepare_batch(ctx, batch).await?;
            let total = jobs.len() as u64;
            self.run_batch(ctx, jobs).await?;
            self.emit(SyncEvent::Progress {
                phase: SyncPhase::Pushing,
                done: total,
                total,
            });
        }
        Ok(())
    }

    async fn prepare_batch(
        &self,
        ctx: &mut RunContext<'_>,
        batch: Vec<ChangeRecord>,
    ) -> Result<Vec<PushJob>, SyncError> {
        let mut jobs = Vec::with_capacity(batch.len());
        for record in batch {
            ctx.checkpoint()?;
            if let Some(job) = self.prepare_job(ctx, &record.item_id).await? {
                jobs.push(job);
            }
        }
        Ok(jobs)
    }

    /// Builds the upload for an item's current state
    ///
    /// The latest change record is read before the item so that consuming
    /// up to it never drops an edit the upload does not contain.
    async fn prepare_job(
        &self,
        ctx: &mut RunContext<'_>,
        item_id: &ItemId,
    ) -> Result<Option<PushJob>, SyncError> {
        let Some(change) = self.store.pending_change(item_id).await? else {
            return Ok(None);
        };
        let Some(item) = self.store.get_item(item_id).await? else {
            self.store.consume_changes(item_id, change.id).await?;
            return Ok(None);
        };
        let record = self.store.sync_record(&self.target, item_id).await?;

        if item.is_deleted() {
            if record.is_none() {
                // Created and deleted between two syncs
                self.store.consume_changes(item_id, change.id).await?;
                return Ok(None);
            }
            return Ok(Some(PushJob {
                item,
                change,
                op: PushOp::Delete,
            }));
        }

        let prepared = match ctx.transfer.prepare(&item) {
            Ok(prepared) => prepared,
            Err(err) if err.affects_every_item() => return Err(err.into()),
            Err(err) => {
                // Change stays pending for the next run
                self.fail_item(ctx, item_id, err.to_string());
                return Ok(None);
            }
        };
        match prepared {
            PreparedUpload::TooLarge { size, max } => {
                self.disable(ctx, item_id, SkipReason::TooLarge { size, max })
                    .await?;
                Ok(None)
            }
            PreparedUpload::Ready(bytes) => {
                let precondition = match &record {
                    Some(r) => Precondition::UpdatedTime(r.remote_updated_time),
                    None => Precondition::Absent,
                };
                Ok(Some(PushJob {
                    item,
                    change,
                    op: PushOp::Put {
                        bytes,
                        precondition,
                    },
                }))
            }
        }
    }

    async fn run_batch(
        &self,
        ctx: &mut RunContext<'_>,
        jobs: Vec<PushJob>,
    ) -> Result<(), SyncError> {
        let transfer = &ctx.transfer;
        let results: Vec<(PushJob, Result<Option<i64>, RemoteError>)> = stream::iter(jobs)
            .map(|job| async move {
                let result = execute(transfer, &job).await;
                (job, result)
            })
            .buffer_unordered(self.sync.transfer_concurrency.max(1))
            .collect()
            .await;

        let mut fatal: Option<SyncError> = None;
        for (job, result) in results {
            match result {
                Ok(remote_time) => self.complete_push(ctx, &job, remote_time).await?,
                Err(err) => match err.class() {
                    ErrorClass::Quota => {
                        self.disable(ctx, job.item.id(), SkipReason::QuotaExceeded)
                            .await?;
                    }
                    ErrorClass::Precondition => self.resolve_push_conflict(ctx, job).await?,
                    ErrorClass::NotFound | ErrorClass::Permanent => {
                        self.fail_item(ctx, job.item.id(), err.to_string());
                    }
                    ErrorClass::Auth | ErrorClass::RateLimited | ErrorClass::Transient => {
                        // Finish applying the successful uploads first
                        fatal.get_or_insert(err.into());
                    }
                },
            }
        }
        match fatal {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    async fn complete_push(
        &self,
        ctx: &mut RunContext<'_>,
        job: &PushJob,
        remote_time: Option<i64>,
    ) -> Result<(), SyncError> {
        let id = job.item.id();
        match (&job.op, remote_time) {
            (PushOp::Put { .. }, Some(remote_time)) => {
                self.store
                    .mark_synced(&self.target, &job.item, remote_time)
                    .await?;
                if job.item.sync_disabled_reason().is_some() {
                    self.store.set_sync_disabled(id, None).await?;
                }
                ctx.report().uploaded += 1;
            }
            _ => {
                self.store.forget_synced(&self.target, id).await?;
                ctx.report().deleted_remote += 1;
            }
        }
        self.store.consume_changes(id, job.change.id).await?;
        debug!(item_id = %id, change = job.change.id, "Pushed local change");
        Ok(())
    }

    /// The remote changed since the last exchange: re-fetch, re-resolve and
    /// try the upload once more
    async fn resolve_push_conflict(
        &self,
        ctx: &mut RunContext<'_>,
        job: PushJob,
    ) -> Result<(), SyncError> {
        let id = job.item.id().clone();
        warn!(item_id = %id, "Remote item changed during push, resolving again");

        match ctx.transfer.refetch(&id).await? {
            Some((bytes, remote_time)) => {
                let Some(remote) = self.decode_remote(ctx, &id, &bytes, remote_time).await? else {
                    return Ok(());
                };
                self.reconcile(ctx, &remote, remote_time).await?;
            }
            None => {
                if let Some(local) = self.store.get_item(&id).await? {
                    let mut tombstone = local;
                    tombstone.mark_deleted();
                    self.reconcile(ctx, &tombstone, 0).await?;
                }
            }
        }

        let Some(again) = self.prepare_job(ctx, &id).await? else {
            return Ok(());
        };
        match execute(&ctx.transfer, &again).await {
            Ok(remote_time) => self.complete_push(ctx, &again, remote_time).await,
            Err(err) if err.class() == ErrorClass::Quota => {
                self.disable(ctx, &id, SkipReason::QuotaExceeded).await
            }
            Err(err) if is_item_level(&err) || err.class() == ErrorClass::Precondition => {
                // Left pending for the next run
                self.fail_item(ctx, &id, err.to_string());
                Ok(())
            }
            Err(err) => Err(err.into()),
        }
    }
}

/// Performs one push; returns the new remote time for uploads
async fn execute(transfer: &ItemTransfer, job: &PushJob) -> Result<Option<i64>, RemoteError> {
    match &job.op {
        PushOp::Put {
            bytes,
            precondition,
        } => transfer
            .put_item(job.item.id(), bytes, Some(*precondition))
            .await
            .map(Some),
        PushOp::Delete => transfer.delete_item(&job.item).await.map(|()| None),
    }
}

/// Errors that only concern the item at hand
fn is_item_level(err: &RemoteError) -> bool {
    matches!(err.class(), ErrorClass::NotFound | ErrorClass::Permanent)
}
