//! Unit of work behaviour over PostgreSQL
//!
//! Requires a database at `TEST_DATABASE_URL`; run with `--ignored`.

mod common;
mod properties;

use common::{GuidItem, Harness};
use serial_test::serial;
use tokio_test::{assert_pending, assert_ready_err, task};
use unitwork_common::{ContainerOptions, Error};
use unitwork_contracts::CancellationToken;
use unitwork_core::UnitOfWork;

macro_rules! postgres_checks {
    ($($check:ident),* $(,)?) => {
        mod checks {
            use super::*;

            $(
                #[test_log::test(tokio::test)]
                #[ignore] // Requires database setup
                #[serial]
                async fn $check() {
                    let harness = Harness::postgres().await.unwrap();
                    assert_eq!(harness.backend(), "postgres");
                    properties::$check(&harness).await;
                }
            )*
        }
    };
}

postgres_checks!(
    create_populates_unique_id,
    unknown_external_id_reads_none,
    exists_by_id_is_idempotent,
    create_then_read_round_trips,
    rollback_hides_creates,
    commit_publishes_creates,
    transaction_lifecycle_is_enforced,
    range_create_then_delete,
    duplicate_code_is_unique_violation,
    failed_commit_never_drops_writes,
    update_changes_stored_row,
    deferred_changes_wait_for_save,
    tracked_edits_saved_on_save_changes,
    deferred_commit_flushes_once,
    dropped_transaction_rolls_back,
    soft_delete_keeps_row,
    query_filters_orders_and_pages,
    cancelled_token_short_circuits,
    units_run_concurrently,
);

async fn cancel_pending_save(uow: &UnitOfWork) {
    let cut = CancellationToken::new();
    let mut save = task::spawn(uow.save_changes(&cut));
    assert_pending!(save.poll());
    cut.cancel();
    assert!(matches!(assert_ready_err!(save.poll()), Error::Cancelled));
}

async fn stored_codes(harness: &Harness, codes: [&str; 2]) -> u64 {
    let ct = CancellationToken::new();
    let mut uow = harness.default_factory().create().await.unwrap();
    let found = uow
        .query::<GuidItem>()
        .unwrap()
        .is_in("code", codes)
        .count(&ct)
        .await
        .unwrap();
    uow.dispose().await;
    found
}

#[test_log::test(tokio::test)]
#[ignore] // Requires database setup
#[serial]
async fn test_cancelled_save_is_never_committed_by_dispose() {
    let harness = Harness::postgres().await.unwrap();
    let factory = harness.factory(ContainerOptions::deferred());
    let ct = CancellationToken::new();

    let mut uow = factory.create().await.unwrap();
    uow.create(GuidItem::new("CUT-A"), &ct).await.unwrap();
    uow.create(GuidItem::new("CUT-B"), &ct).await.unwrap();
    cancel_pending_save(&uow).await;
    assert!(!uow.container().in_transaction().await);
    uow.dispose().await;

    assert_eq!(stored_codes(&harness, ["CUT-A", "CUT-B"]).await, 0);
}

#[test_log::test(tokio::test)]
#[ignore] // Requires database setup
#[serial]
async fn test_cancelled_save_is_written_once_on_retry() {
    let harness = Harness::postgres().await.unwrap();
    let factory = harness.factory(ContainerOptions::deferred());
    let ct = CancellationToken::new();

    let mut uow = factory.create().await.unwrap();
    uow.create(GuidItem::new("RETRY-A"), &ct).await.unwrap();
    uow.create(GuidItem::new("RETRY-B"), &ct).await.unwrap();
    cancel_pending_save(&uow).await;

    assert_eq!(uow.save_changes(&ct).await.unwrap(), 2);
    assert_eq!(uow.save_changes(&ct).await.unwrap(), 0);
    assert!(!uow.container().in_transaction().await);
    uow.dispose().await;

    assert_eq!(stored_codes(&harness, ["RETRY-A", "RETRY-B"]).await, 2);
}
