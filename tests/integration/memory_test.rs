//! Unit of work behaviour over the in-memory backend

mod common;
mod properties;

use common::{GuidItem, Harness};
use unitwork_common::ContainerOptions;
use unitwork_contracts::CancellationToken;

macro_rules! memory_checks {
    ($($check:ident),* $(,)?) => {
        mod checks {
            use super::*;

            $(
                #[test_log::test(tokio::test)]
                async fn $check() {
                    let (harness, _store) = Harness::memory();
                    properties::$check(&harness).await;
                }
            )*
        }
    };
}

memory_checks!(
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

#[test_log::test(tokio::test)]
async fn test_rollback_leaves_store_empty() {
    let (harness, store) = Harness::memory();
    let factory = harness.default_factory();
    let ct = CancellationToken::new();

    let mut uow = factory.create().await.unwrap();
    let mut tx = uow.begin_transaction(&ct).await.unwrap();
    uow.create(GuidItem::new("GONE"), &ct).await.unwrap();
    assert_eq!(store.row_count("guid_items"), 0);

    tx.rollback(&ct).await.unwrap();
    uow.dispose().await;
    assert_eq!(store.row_count("guid_items"), 0);
}

#[test_log::test(tokio::test)]
async fn test_conflicting_commit_stays_open_until_rolled_back() {
    let (harness, store) = Harness::memory();
    let factory = harness.factory(ContainerOptions::deferred());
    let ct = CancellationToken::new();

    let mut first = factory.create().await.unwrap();
    let mut second = factory.create().await.unwrap();
    let mut first_tx = first.begin_transaction(&ct).await.unwrap();
    let mut second_tx = second.begin_transaction(&ct).await.unwrap();

    first.create(GuidItem::new("RACE"), &ct).await.unwrap();
    second.create(GuidItem::new("RACE"), &ct).await.unwrap();

    first_tx.commit(&ct).await.unwrap();
    let err = second_tx.commit(&ct).await.unwrap_err();
    assert!(err.is_unique_violation());
    assert!(second_tx.is_open());

    second_tx.rollback(&ct).await.unwrap();
    first.dispose().await;
    second.dispose().await;
    assert_eq!(store.row_count("guid_items"), 1);
}

#[test_log::test(tokio::test)]
async fn test_disposed_unit_releases_nothing_twice() {
    let (harness, store) = Harness::memory();
    let factory = harness.factory(ContainerOptions::deferred());
    let ct = CancellationToken::new();

    let mut uow = factory.create().await.unwrap();
    uow.create(GuidItem::new("UNSAVED"), &ct).await.unwrap();
    uow.dispose().await;
    uow.dispose().await;

    assert!(uow.is_disposed());
    assert!(uow.container().is_closed().await);
    assert_eq!(store.row_count("guid_items"), 0);
}
