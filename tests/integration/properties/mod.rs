//! Behavioural checks shared by every backend
//!
//! Each check builds what it needs from a [`Harness`] and asserts one
//! observable property of the unit of work. Backend test files call every
//! check against their own harness.

#![allow(dead_code)]

use std::collections::HashSet;

use unitwork_common::{ContainerOptions, Error, StoreError};
use unitwork_contracts::{CancellationToken, HasDeletedMeta};
use unitwork_core::{Transaction, TransactionState};
use uuid::Uuid;

use crate::common::{Document, GuidItem, Harness, StringItem, TEST_ACTOR};

pub async fn create_populates_unique_id(harness: &Harness) {
    let factory = harness.default_factory();
    let ct = CancellationToken::new();
    let mut uow = factory.create().await.unwrap();

    let first = uow.create(GuidItem::new("ID-1"), &ct).await.unwrap();
    let second = uow.create(GuidItem::new("ID-2"), &ct).await.unwrap();

    assert!(first.id > 0);
    assert!(second.id > 0);
    assert_ne!(first.id, second.id);

    let document = uow.create(Document::new("uuid keyed"), &ct).await.unwrap();
    assert!(!document.id.is_nil());
    uow.dispose().await;
}

pub async fn unknown_external_id_reads_none(harness: &Harness) {
    let factory = harness.default_factory();
    let ct = CancellationToken::new();
    let mut uow = factory.create().await.unwrap();

    let by_uuid = uow.read_by_uuid::<GuidItem>(Uuid::new_v4(), &ct).await.unwrap();
    assert!(by_uuid.is_none());

    let by_string = uow
        .read_by_external_id::<StringItem, String>("never-assigned".to_string(), &ct)
        .await
        .unwrap();
    assert!(by_string.is_none());

    assert!(!uow
        .exists_by_external_id::<GuidItem, Uuid>(Uuid::new_v4(), &ct)
        .await
        .unwrap());
    uow.dispose().await;
}

pub async fn exists_by_id_is_idempotent(harness: &Harness) {
    let factory = harness.default_factory();
    let ct = CancellationToken::new();
    let mut uow = factory.create().await.unwrap();

    let item = uow.create(GuidItem::new("EXISTS"), &ct).await.unwrap();
    for _ in 0..3 {
        assert!(uow.exists_by_id::<GuidItem>(item.id, &ct).await.unwrap());
        assert!(!uow.exists_by_id::<GuidItem>(item.id + 1000, &ct).await.unwrap());
    }
    uow.dispose().await;
}

pub async fn create_then_read_round_trips(harness: &Harness) {
    let factory = harness.default_factory();
    let ct = CancellationToken::new();

    let created = {
        let mut uow = factory.create().await.unwrap();
        let created = uow.create(GuidItem::new("ROUND"), &ct).await.unwrap();
        uow.dispose().await;
        created
    };

    let mut uow = factory.create().await.unwrap();
    let read = uow
        .read_by_id::<GuidItem>(created.id, &ct)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(read, created);

    let string_item = uow
        .create(
            StringItem {
                id: 0,
                external_id: "ext-round".to_string(),
                name: "string keyed".to_string(),
            },
            &ct,
        )
        .await
        .unwrap();
    let read = uow
        .read_by_external_id::<StringItem, String>("ext-round".to_string(), &ct)
        .await
        .unwrap();
    assert_eq!(read, Some(string_item));
    uow.dispose().await;
}

pub async fn rollback_hides_creates(harness: &Harness) {
    let factory = harness.default_factory();
    let ct = CancellationToken::new();

    let (a, b) = {
        let mut uow = factory.create().await.unwrap();
        let mut tx = uow.begin_transaction(&ct).await.unwrap();
        let a = uow.create(GuidItem::new("RB-A"), &ct).await.unwrap();
        let b = uow.create(GuidItem::new("RB-B"), &ct).await.unwrap();
        tx.rollback(&ct).await.unwrap();
        tx.dispose().await;
        uow.dispose().await;
        (a, b)
    };

    let mut fresh = factory.create().await.unwrap();
    assert!(!fresh.exists_by_id::<GuidItem>(a.id, &ct).await.unwrap());
    assert!(!fresh.exists_by_id::<GuidItem>(b.id, &ct).await.unwrap());
    assert_eq!(
        fresh
            .query::<GuidItem>()
            .unwrap()
            .is_in("code", ["RB-A", "RB-B"])
            .count(&ct)
            .await
            .unwrap(),
        0
    );
    fresh.dispose().await;
}

pub async fn commit_publishes_creates(harness: &Harness) {
    let factory = harness.default_factory();
    let ct = CancellationToken::new();

    let created = {
        let mut uow = factory.create().await.unwrap();
        let mut tx = uow.begin_transaction(&ct).await.unwrap();
        let created = uow.create(GuidItem::new("COMMIT"), &ct).await.unwrap();
        tx.commit(&ct).await.unwrap();
        assert_eq!(tx.state(), TransactionState::Committed);
        uow.dispose().await;
        created
    };

    let mut fresh = factory.create().await.unwrap();
    let read = fresh.read_by_id::<GuidItem>(created.id, &ct).await.unwrap();
    assert_eq!(read, Some(created));
    fresh.dispose().await;
}

pub async fn transaction_lifecycle_is_enforced(harness: &Harness) {
    let factory = harness.default_factory();
    let ct = CancellationToken::new();
    let mut uow = factory.create().await.unwrap();

    let mut unopened = Transaction::new(uow.container().clone());
    let err = unopened.commit(&ct).await.unwrap_err();
    assert!(matches!(err, Error::IllegalState(_)));
    let err = unopened.rollback(&ct).await.unwrap_err();
    assert!(matches!(err, Error::IllegalState(_)));

    let mut tx = uow.begin_transaction(&ct).await.unwrap();
    let err = tx.begin(&ct).await.unwrap_err();
    assert!(matches!(err, Error::IllegalState(_)));

    let err = uow.begin_transaction(&ct).await.unwrap_err();
    assert!(matches!(err, Error::IllegalState(_)));

    tx.rollback(&ct).await.unwrap();
    let err = tx.commit(&ct).await.unwrap_err();
    assert!(matches!(err, Error::IllegalState(_)));

    tx.dispose().await;
    tx.dispose().await;
    assert_eq!(tx.state(), TransactionState::Disposed);
    uow.dispose().await;
}

pub async fn range_create_then_delete(harness: &Harness) {
    let factory = harness.default_factory();
    let ct = CancellationToken::new();
    let mut uow = factory.create().await.unwrap();

    let created = uow
        .create_range((0..5).map(|i| GuidItem::new(&format!("RANGE-{}", i))), &ct)
        .await
        .unwrap();
    assert_eq!(created.len(), 5);
    let ids: HashSet<i64> = created.iter().map(|item| item.id).collect();
    assert_eq!(ids.len(), 5);

    let read = uow
        .read_by_id_range::<GuidItem, _>(ids.iter().copied(), &ct)
        .await
        .unwrap();
    assert_eq!(read.len(), 5);

    let external = uow
        .read_by_external_id_range::<GuidItem, Uuid, _>(
            created.iter().map(|item| item.external_id),
            &ct,
        )
        .await
        .unwrap();
    assert_eq!(external.len(), 5);

    uow.delete_range(created, &ct).await.unwrap();
    for id in &ids {
        assert!(uow.read_by_id::<GuidItem>(*id, &ct).await.unwrap().is_none());
    }

    let empty = uow
        .create_range(Vec::<GuidItem>::new(), &ct)
        .await
        .unwrap();
    assert!(empty.is_empty());
    uow.dispose().await;
}

pub async fn duplicate_code_is_unique_violation(harness: &Harness) {
    let factory = harness.default_factory();
    let ct = CancellationToken::new();
    let mut uow = factory.create().await.unwrap();

    let item = uow.create(GuidItem::new("ABC"), &ct).await.unwrap();
    let read = uow
        .read_by_uuid::<GuidItem>(item.external_id, &ct)
        .await
        .unwrap();
    assert_eq!(read, Some(item));

    let err = uow.create(GuidItem::new("ABC"), &ct).await.unwrap_err();
    assert!(err.is_unique_violation(), "unexpected error: {err:?}");
    assert!(matches!(err, Error::Store(StoreError::UniqueViolation { .. })));

    // The failed batch is gone; the session keeps working
    let other = uow.create(GuidItem::new("ABD"), &ct).await.unwrap();
    assert!(uow.exists_by_id::<GuidItem>(other.id, &ct).await.unwrap());
    uow.dispose().await;
}

pub async fn failed_commit_never_drops_writes(harness: &Harness) {
    let ct = CancellationToken::new();
    let mut seed = harness.default_factory().create().await.unwrap();
    seed.create(GuidItem::new("DUP"), &ct).await.unwrap();
    seed.dispose().await;

    let factory = harness.factory(ContainerOptions::deferred());
    let mut uow = factory.create().await.unwrap();
    let mut tx = uow.begin_transaction(&ct).await.unwrap();
    let keep = uow.create(GuidItem::new("KEEP"), &ct).await.unwrap();
    uow.create(GuidItem::new("DUP"), &ct).await.unwrap();

    let err = tx.commit(&ct).await.unwrap_err();
    assert!(err.is_unique_violation(), "unexpected error: {err:?}");
    assert!(tx.is_open());

    // A retry replays the whole batch
    let err = tx.commit(&ct).await.unwrap_err();
    assert!(err.is_unique_violation(), "unexpected error: {err:?}");
    assert!(tx.is_open());

    tx.rollback(&ct).await.unwrap();
    assert_eq!(uow.save_changes(&ct).await.unwrap(), 0);
    uow.dispose().await;

    let mut fresh = harness.default_factory().create().await.unwrap();
    assert!(!fresh.exists_by_id::<GuidItem>(keep.id, &ct).await.unwrap());
    assert_eq!(
        fresh
            .query::<GuidItem>()
            .unwrap()
            .is_in("code", ["KEEP", "DUP"])
            .count(&ct)
            .await
            .unwrap(),
        1
    );
    fresh.dispose().await;
}

pub async fn update_changes_stored_row(harness: &Harness) {
    let factory = harness.default_factory();
    let ct = CancellationToken::new();
    let mut uow = factory.create().await.unwrap();

    let mut item = uow.create(GuidItem::new("UPD"), &ct).await.unwrap();
    item.name = None;
    let updated = uow.update(item.clone(), &ct).await.unwrap();
    assert_eq!(updated, item);

    let read = uow.read_by_id::<GuidItem>(item.id, &ct).await.unwrap();
    assert_eq!(read.and_then(|i| i.name), None);

    let mut missing = GuidItem::new("NOPE");
    missing.id = item.id + 1000;
    let err = uow.update(missing, &ct).await.unwrap_err();
    assert!(matches!(err, Error::Store(StoreError::RowNotFound { .. })));

    let err = uow.update(GuidItem::new("UNSAVED"), &ct).await.unwrap_err();
    assert!(matches!(err, Error::InvalidArgument(_)));
    uow.dispose().await;
}

pub async fn deferred_changes_wait_for_save(harness: &Harness) {
    let factory = harness.factory(ContainerOptions::deferred());
    let ct = CancellationToken::new();
    let mut writer = factory.create().await.unwrap();
    let mut reader = factory.create().await.unwrap();

    let a = writer.create(GuidItem::new("DEF-A"), &ct).await.unwrap();
    let b = writer.create(GuidItem::new("DEF-B"), &ct).await.unwrap();
    assert!(a.id > 0 && b.id > 0);
    assert!(!reader.exists_by_id::<GuidItem>(a.id, &ct).await.unwrap());

    assert_eq!(writer.save_changes(&ct).await.unwrap(), 2);
    assert_eq!(writer.save_changes(&ct).await.unwrap(), 0);
    assert!(reader.exists_by_id::<GuidItem>(a.id, &ct).await.unwrap());
    assert!(reader.exists_by_id::<GuidItem>(b.id, &ct).await.unwrap());

    let pending = writer.create(GuidItem::new("DEF-C"), &ct).await.unwrap();
    writer.dispose().await;
    assert!(!reader.exists_by_id::<GuidItem>(pending.id, &ct).await.unwrap());
    reader.dispose().await;
}

pub async fn tracked_edits_saved_on_save_changes(harness: &Harness) {
    let ct = CancellationToken::new();
    let mut seed = harness.default_factory().create().await.unwrap();
    let stored = seed.create(GuidItem::new("TRACK"), &ct).await.unwrap();
    seed.dispose().await;

    let factory = harness.factory(ContainerOptions {
        auto_save_changes: false,
        no_tracking: false,
    });
    let mut uow = factory.create().await.unwrap();
    let mut item = uow
        .read_by_id::<GuidItem>(stored.id, &ct)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(item, stored);

    item.name = Some("Edited".to_string());
    uow.update(item.clone(), &ct).await.unwrap();

    // Tracked reads hand back the edited row before it is written
    let tracked = uow
        .query::<GuidItem>()
        .unwrap()
        .eq("code", "TRACK")
        .to_list(&ct)
        .await
        .unwrap();
    assert_eq!(tracked, vec![item.clone()]);
    let untracked = uow
        .query::<GuidItem>()
        .unwrap()
        .eq("code", "TRACK")
        .as_no_tracking()
        .single_or_none(&ct)
        .await
        .unwrap();
    assert_eq!(untracked, Some(stored.clone()));

    assert_eq!(uow.save_changes(&ct).await.unwrap(), 1);
    uow.dispose().await;

    let mut fresh = harness.default_factory().create().await.unwrap();
    let read = fresh.read_by_id::<GuidItem>(stored.id, &ct).await.unwrap();
    assert_eq!(read, Some(item));
    fresh.dispose().await;
}

pub async fn deferred_commit_flushes_once(harness: &Harness) {
    let factory = harness.factory(ContainerOptions::deferred());
    let ct = CancellationToken::new();
    let mut uow = factory.create().await.unwrap();

    let mut tx = uow.begin_transaction(&ct).await.unwrap();
    let item = uow.create(GuidItem::new("DEF-TX"), &ct).await.unwrap();
    tx.commit(&ct).await.unwrap();
    uow.dispose().await;

    let mut fresh = factory.create().await.unwrap();
    assert!(fresh.exists_by_id::<GuidItem>(item.id, &ct).await.unwrap());
    fresh.dispose().await;
}

pub async fn dropped_transaction_rolls_back(harness: &Harness) {
    let factory = harness.default_factory();
    let ct = CancellationToken::new();
    let mut uow = factory.create().await.unwrap();

    let item = {
        let _tx = uow.begin_transaction(&ct).await.unwrap();
        uow.create(GuidItem::new("DROPPED"), &ct).await.unwrap()
    };

    assert!(!uow.exists_by_id::<GuidItem>(item.id, &ct).await.unwrap());
    assert!(!uow.container().in_transaction().await);

    let mut tx = uow.begin_transaction(&ct).await.unwrap();
    tx.commit(&ct).await.unwrap();
    uow.dispose().await;
}

pub async fn soft_delete_keeps_row(harness: &Harness) {
    let factory = harness.default_factory();
    let ct = CancellationToken::new();
    let mut uow = factory.create().await.unwrap();

    let document = uow.create(Document::new("archive me"), &ct).await.unwrap();
    let deleted = uow.delete(document.clone(), &ct).await.unwrap();
    assert!(deleted.is_deleted());
    assert_eq!(deleted.deleted_by.as_deref(), Some(TEST_ACTOR));

    let read = uow
        .read_by_id::<Document>(document.id, &ct)
        .await
        .unwrap()
        .unwrap();
    assert!(read.is_deleted());

    let live = uow
        .query::<Document>()
        .unwrap()
        .eq("id", document.id)
        .is_null(Document::DELETED_ON_COLUMN)
        .count(&ct)
        .await
        .unwrap();
    assert_eq!(live, 0);
    uow.dispose().await;
}

pub async fn query_filters_orders_and_pages(harness: &Harness) {
    let factory = harness.default_factory();
    let ct = CancellationToken::new();
    let mut uow = factory.create().await.unwrap();

    uow.create_range(
        ["Q-3", "Q-1", "Q-5", "Q-2", "Q-4"].map(GuidItem::new),
        &ct,
    )
    .await
    .unwrap();

    let query = uow.query::<GuidItem>().unwrap().ge("code", "Q-1").le("code", "Q-5");
    assert_eq!(query.count(&ct).await.unwrap(), 5);
    assert!(query.any(&ct).await.unwrap());

    let page = query
        .clone()
        .order_by_desc("code")
        .skip(1)
        .take(2)
        .to_list(&ct)
        .await
        .unwrap();
    let codes: Vec<&str> = page.iter().map(|item| item.code.as_str()).collect();
    assert_eq!(codes, vec!["Q-4", "Q-3"]);

    let first = query.clone().order_by("code").first_or_none(&ct).await.unwrap();
    assert_eq!(first.map(|item| item.code), Some("Q-1".to_string()));

    let err = query.single_or_none(&ct).await.unwrap_err();
    assert!(matches!(err, Error::MultipleResults { count: 2, .. }));

    let err = uow
        .query::<GuidItem>()
        .unwrap()
        .eq("code; DROP TABLE guid_items", "x")
        .count(&ct)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::InvalidArgument(_)));
    uow.dispose().await;
}

pub async fn cancelled_token_short_circuits(harness: &Harness) {
    let factory = harness.default_factory();
    let ct = CancellationToken::new();
    ct.cancel();
    let mut uow = factory.create().await.unwrap();

    let err = uow.create(GuidItem::new("CANCEL"), &ct).await.unwrap_err();
    assert!(matches!(err, Error::Cancelled));

    let live = CancellationToken::new();
    assert_eq!(
        uow.query::<GuidItem>()
            .unwrap()
            .eq("code", "CANCEL")
            .count(&live)
            .await
            .unwrap(),
        0
    );
    uow.dispose().await;
}

pub async fn units_run_concurrently(harness: &Harness) {
    let factory = harness.default_factory();
    let ct = CancellationToken::new();

    let tasks = (0..4).map(|i| {
        let factory = factory.clone();
        let ct = ct.clone();
        tokio::spawn(async move {
            let mut uow = factory.create().await.unwrap();
            let mut tx = uow.begin_transaction(&ct).await.unwrap();
            let item = uow
                .create(GuidItem::new(&format!("PAR-{}", i)), &ct)
                .await
                .unwrap();
            tx.commit(&ct).await.unwrap();
            uow.dispose().await;
            item.id
        })
    });

    let ids: HashSet<i64> = futures::future::join_all(tasks)
        .await
        .into_iter()
        .map(|joined| joined.unwrap())
        .collect();
    assert_eq!(ids.len(), 4);

    let mut uow = factory.create().await.unwrap();
    let stored = uow
        .query::<GuidItem>()
        .unwrap()
        .is_in("code", (0..4).map(|i| format!("PAR-{}", i)))
        .count(&ct)
        .await
        .unwrap();
    assert_eq!(stored, 4);
    uow.dispose().await;
}
