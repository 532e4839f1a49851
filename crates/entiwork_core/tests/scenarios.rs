//! End-to-end unit-of-work scenarios against the in-memory store.

use entiwork_core::{
    CoreError, EntityDescriptor, EntityReference, EntityStatus, EntityStore, StateStore,
    UnitOfWork, UnitOfWorkStatus, Value, Version,
};

fn cargo() -> EntityDescriptor {
    EntityDescriptor::new("Cargo")
        .property("origin", Value::Null)
        .property("destination", Value::Null)
        .association("itinerary")
        .many_association("handling_events")
}

fn book(store: &EntityStore, reference: &EntityReference, origin: &str) {
    let mut uow = store.open_unit_of_work("book cargo");
    uow.new_entity_state(reference.clone(), &cargo())
        .unwrap()
        .set_property("origin", origin)
        .unwrap();
    uow.complete().unwrap();
}

#[test]
fn created_entity_reads_back_at_version_one() {
    let store = EntityStore::in_memory();
    let reference = EntityReference::from("cargo:ABC");
    book(&store, &reference, "HONGKONG");

    let mut uow = store.open_unit_of_work("track cargo");
    let state = uow.get_entity_state(&reference).unwrap();
    assert_eq!(state.property("origin"), Some(&Value::from("HONGKONG")));
    assert_eq!(state.version(), Version::INITIAL);
    assert_eq!(state.status(), EntityStatus::Loaded);
}

#[test]
fn second_writer_on_stale_version_conflicts() {
    let store = EntityStore::in_memory();
    let reference = EntityReference::from("cargo:ABC");
    book(&store, &reference, "HONGKONG");

    let mut u1 = store.open_unit_of_work("reroute");
    let mut u2 = store.open_unit_of_work("reroute");
    assert_eq!(u1.get_entity_state(&reference).unwrap().version(), Version::INITIAL);
    assert_eq!(u2.get_entity_state(&reference).unwrap().version(), Version::INITIAL);

    u1.get_entity_state(&reference)
        .unwrap()
        .set_property("destination", "STOCKHOLM")
        .unwrap();
    u1.complete().unwrap();
    assert_eq!(
        store.state_store().current_version(&reference).unwrap(),
        Some(Version::new(2))
    );

    u2.get_entity_state(&reference)
        .unwrap()
        .set_property("destination", "HELSINKI")
        .unwrap();
    let err = u2.apply().err().unwrap();
    assert!(matches!(err, CoreError::ConcurrentModification { .. }));
    assert_eq!(err.conflicting_references(), vec![&reference]);

    let current = store.current_state(&reference).unwrap();
    assert_eq!(current.property("destination"), Some(&Value::from("STOCKHOLM")));
}

#[test]
fn duplicate_new_state_in_one_unit_is_rejected() {
    let store = EntityStore::in_memory();
    let reference = EntityReference::from("cargo:ABC");
    let mut uow = store.open_unit_of_work("book twice");
    uow.new_entity_state(reference.clone(), &cargo()).unwrap();

    let err = uow.new_entity_state(reference.clone(), &cargo()).unwrap_err();
    assert!(
        matches!(&err, CoreError::DuplicateLocalState { reference: r, .. } if *r == reference)
    );
}

#[test]
fn missing_entity_is_not_found() {
    let store = EntityStore::in_memory();
    let mut uow = store.open_unit_of_work("lookup");
    let err = uow
        .get_entity_state(&EntityReference::from("missing:1"))
        .unwrap_err();
    assert!(matches!(err, CoreError::EntityNotFound { .. }));
    assert_eq!(err.to_string(), "entity not found: missing:1");
}

#[test]
fn apply_twice_is_invalid() {
    let store = EntityStore::in_memory();
    let mut uow = store.open_unit_of_work("apply twice");
    let _committer = uow.apply().unwrap();

    assert!(matches!(
        uow.apply(),
        Err(CoreError::InvalidState {
            status: UnitOfWorkStatus::Preparing,
            operation: "apply",
            ..
        })
    ));
}

#[test]
fn second_commit_panics_and_store_keeps_first_result() {
    let store = EntityStore::in_memory();
    let reference = EntityReference::from("cargo:ABC");
    let mut uow = store.open_unit_of_work("commit twice");
    uow.new_entity_state(reference.clone(), &cargo()).unwrap();

    let mut committer = uow.apply().unwrap();
    committer.commit().unwrap();

    let second = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
        let _ = committer.commit();
    }));
    assert!(second.is_err());

    let stats = store.state_store().stats();
    assert_eq!(stats.entities, 1);
    assert_eq!(stats.batches_applied, 1);
    assert_eq!(
        store.state_store().current_version(&reference).unwrap(),
        Some(Version::INITIAL)
    );
}

#[test]
fn round_trip_preserves_associations() {
    let store = EntityStore::in_memory();
    let cargo_ref = EntityReference::from("cargo:ABC");
    let itinerary = EntityReference::from("itinerary:1");
    let events = [
        EntityReference::from("event:1"),
        EntityReference::from("event:2"),
    ];

    let mut uow = store.open_unit_of_work("book");
    let state = uow.new_entity_state(cargo_ref.clone(), &cargo()).unwrap();
    state.set_property("origin", "HONGKONG").unwrap();
    state.set_association("itinerary", Some(itinerary.clone())).unwrap();
    for event in &events {
        state.add_many_association("handling_events", event.clone()).unwrap();
    }
    let before = state.clone();
    uow.complete().unwrap();

    let mut uow = store.open_unit_of_work("read");
    let after = uow.get_entity_state(&cargo_ref).unwrap();
    assert!(after.same_data(&before));
    assert_eq!(after.association("itinerary"), Some(&itinerary));
    assert_eq!(after.many_association("handling_events"), &events);
    assert_eq!(after.version(), Version::INITIAL);
}

#[test]
fn discard_leaves_store_untouched_and_closes_unit() {
    let store = EntityStore::in_memory();
    let reference = EntityReference::from("cargo:ABC");
    book(&store, &reference, "HONGKONG");

    let mut uow = store.open_unit_of_work("abandon");
    uow.get_entity_state(&reference).unwrap().remove();
    uow.new_entity_state(EntityReference::from("cargo:XYZ"), &cargo())
        .unwrap();
    uow.discard().unwrap();
    uow.discard().unwrap();

    assert!(matches!(
        uow.get_entity_state(&reference),
        Err(CoreError::InvalidState { .. })
    ));
    assert!(matches!(
        uow.new_entity_state(EntityReference::from("cargo:Q"), &cargo()),
        Err(CoreError::InvalidState { .. })
    ));
    assert!(uow.apply().is_err());
    assert_eq!(uow.ledger_len(), 0);

    assert!(store.state_store().contains(&reference).unwrap());
    assert_eq!(store.state_store().stats().entities, 1);
}

#[test]
fn removal_commits_and_reads_as_missing() {
    let store = EntityStore::in_memory();
    let reference = EntityReference::from("cargo:ABC");
    book(&store, &reference, "HONGKONG");

    let mut uow = store.open_unit_of_work("scrap");
    uow.get_entity_state(&reference).unwrap().remove();
    let receipt = uow.complete().unwrap();
    assert_eq!(receipt.removed, vec![reference.clone()]);

    let mut uow = store.open_unit_of_work("lookup");
    assert!(matches!(
        uow.get_entity_state(&reference),
        Err(CoreError::EntityNotFound { .. })
    ));
}

#[test]
fn creating_an_existing_entity_fails_at_commit() {
    let store = EntityStore::in_memory();
    let reference = EntityReference::from("cargo:ABC");
    book(&store, &reference, "HONGKONG");

    let mut uow = store.open_unit_of_work("book again");
    uow.new_entity_state(reference.clone(), &cargo()).unwrap();
    let err = uow.complete().unwrap_err();
    assert!(matches!(err, CoreError::DuplicateEntity { .. }));
    assert!(!err.is_retryable());

    let state = store.current_state(&reference).unwrap();
    assert_eq!(state.property("origin"), Some(&Value::from("HONGKONG")));
}

#[test]
fn unguarded_unit_still_cannot_overwrite_a_newer_version() {
    let store = EntityStore::in_memory();
    let reference = EntityReference::from("cargo:ABC");
    book(&store, &reference, "HONGKONG");

    let mut stale = store.open_unguarded("stale writer");
    stale
        .get_entity_state(&reference)
        .unwrap()
        .set_property("origin", "OSLO")
        .unwrap();

    let mut fresh = store.open_unguarded("fresh writer");
    fresh
        .get_entity_state(&reference)
        .unwrap()
        .set_property("origin", "TOKYO")
        .unwrap();
    fresh.complete().unwrap();

    let err = stale.complete().unwrap_err();
    assert!(err.is_retryable());
    assert_eq!(
        store.current_state(&reference).unwrap().property("origin"),
        Some(&Value::from("TOKYO"))
    );
}

#[test]
fn stale_reader_cannot_overwrite_a_recreated_entity() {
    let store = EntityStore::in_memory();
    let reference = EntityReference::from("cargo:ABC");
    book(&store, &reference, "HONGKONG");

    let mut stale = store.open_unit_of_work("reroute");
    stale.get_entity_state(&reference).unwrap();

    let mut scrap = store.open_unit_of_work("scrap");
    scrap.get_entity_state(&reference).unwrap().remove();
    scrap.complete().unwrap();
    book(&store, &reference, "SHANGHAI");
    assert_eq!(
        store.current_state(&reference).unwrap().version(),
        Version::new(2)
    );

    stale
        .get_entity_state(&reference)
        .unwrap()
        .set_property("origin", "STALE")
        .unwrap();
    let err = stale.complete().unwrap_err();
    assert!(matches!(err, CoreError::ConcurrentModification { .. }));

    let current = store.current_state(&reference).unwrap();
    assert_eq!(current.property("origin"), Some(&Value::from("SHANGHAI")));
    assert_eq!(current.version(), Version::new(2));
}

#[test]
fn unguarded_stale_writer_cannot_overwrite_a_recreated_entity() {
    let store = EntityStore::in_memory();
    let reference = EntityReference::from("cargo:ABC");
    book(&store, &reference, "HONGKONG");

    let mut stale = store.open_unguarded("reroute");
    stale
        .get_entity_state(&reference)
        .unwrap()
        .set_property("origin", "STALE")
        .unwrap();

    let mut scrap = store.open_unit_of_work("scrap");
    scrap.get_entity_state(&reference).unwrap().remove();
    scrap.complete().unwrap();
    book(&store, &reference, "SHANGHAI");

    let err = stale.complete().unwrap_err();
    assert!(err.is_retryable());
    assert_eq!(
        store.current_state(&reference).unwrap().property("origin"),
        Some(&Value::from("SHANGHAI"))
    );
}
