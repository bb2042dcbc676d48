//! Mutual exclusion between clients and between runs in one process

use notesync_core::domain::{ClientId, LockHandle, SessionId};
use notesync_remote::{layout, MemoryFileApi};
use notesync_sync::{RunRegistry, SyncError};
use tokio_util::sync::CancellationToken;

use crate::common::Client;

#[tokio::test]
async fn held_lock_refuses_second_client() {
    let api = MemoryFileApi::new();
    let a = Client::new(api.clone()).await;
    let b = Client::new(api.clone()).await;
    b.create_note("Waiting", "").await;

    let other = LockHandle {
        client_id: ClientId::new(),
        session_id: SessionId::new(),
    };
    let guard = a
        .engine
        .lock_manager()
        .acquire(other, &CancellationToken::new())
        .await
        .unwrap();

    match b.try_sync().await {
        Err(SyncError::LockContention { holder, .. }) => {
            assert!(holder.contains(&other.client_id.to_string()));
        }
        unexpected => panic!("expected lock contention, got {unexpected:?}"),
    }
    // Nothing but the lock was written while the lock was held
    assert_eq!(api.paths().await, vec![layout::LOCK_PATH.to_string()]);

    guard.release().await.unwrap();
    assert_eq!(b.sync().await.uploaded, 1);
    assert!(!api.paths().await.contains(&layout::LOCK_PATH.to_string()));
}

#[tokio::test]
async fn concurrent_runs_never_overlap() {
    let api = MemoryFileApi::new();
    let a = Client::new(api.clone()).await;
    let b = Client::new(api.clone()).await;
    a.create_note("From A", "").await;
    b.create_note("From B", "").await;

    let (ra, rb) = tokio::join!(a.try_sync(), b.try_sync());
    let outcomes = [ra, rb];
    let succeeded = outcomes.iter().filter(|r| r.is_ok()).count();
    assert!(succeeded >= 1);
    for outcome in &outcomes {
        if let Err(err) = outcome {
            assert!(
                matches!(err, SyncError::LockContention { .. }),
                "unexpected error: {err}"
            );
        }
    }
}

#[tokio::test]
async fn same_target_runs_once_per_process() {
    let api = MemoryFileApi::new();
    let registry = RunRegistry::new();
    let a = Client::new(api.clone())
        .await
        .reconfigure(|engine| engine.with_run_registry(registry.clone()));

    let target = a.engine.target().clone();
    let held = registry.try_begin(&target, SessionId::new()).unwrap();

    let result = a.try_sync().await;
    assert!(matches!(result, Err(SyncError::AlreadyRunning(_))));
    // Refused before touching the target
    assert!(api.paths().await.is_empty());

    drop(held);
    assert!(a.try_sync().await.is_ok());
    assert!(!registry.is_running(&target));
}
