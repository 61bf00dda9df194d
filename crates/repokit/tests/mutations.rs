//! Write paths: add, update, delete, soft delete, row versions, detach,
//! and entry handles.

mod common;

use common::*;
use repokit::prelude::*;

#[test]
fn add_commit_then_get_by_id_round_trips() {
    let db = MemoryDatabase::new();
    let factory = UnitOfWorkFactory::new(db.clone());
    let cx = Cx::for_testing();

    run(async {
        let mut uow = factory.begin().unwrap();
        uow.repository::<Hero>()
            .add(hero("Deadpond", Some(30), None))
            .unwrap();
        assert_eq!(uow.session().pending_count(), 1);
        assert_eq!(unwrap_outcome(uow.commit(&cx).await), 1);

        let saved = uow.session().tracked::<Hero>();
        assert_eq!(saved.len(), 1);
        assert_eq!(saved[0].id, 1);
        assert!(saved[0].version.is_some());
        uow.release();

        let mut fresh = factory.begin().unwrap();
        let found = unwrap_outcome(fresh.repository::<Hero>().get_by_id(&cx, 1_i64).await)
            .expect("committed hero");
        assert_eq!(found.name, "Deadpond");
        assert_eq!(found.age, Some(30));
        assert_eq!(found.version, saved[0].version);
    });
}

#[test]
fn generated_keys_are_assigned_on_commit() {
    let db = MemoryDatabase::new();
    let factory = UnitOfWorkFactory::new(db.clone());
    let mut uow = factory.begin().unwrap();
    let cx = Cx::for_testing();

    run(async {
        let mut repo = uow.repository::<Note>();
        repo.add(note("first")).unwrap();
        repo.add(note("second")).unwrap();
        assert_eq!(unwrap_outcome(uow.commit(&cx).await), 2);

        let mut repo = uow.repository::<Note>();
        let second = unwrap_outcome(repo.get_by_id(&cx, 2_i64).await).unwrap();
        assert_eq!(second.body, "second");
        assert!(repo.is_tracked_by_key(|n| n.id == 1));
    });

    assert_eq!(uow.session().tracked_count(), 2);
}

#[test]
fn adding_a_tracked_key_is_an_identity_conflict() {
    let db = MemoryDatabase::new();
    let world = seed_world(&db);
    let factory = UnitOfWorkFactory::new(db.clone());
    let mut uow = factory.begin().unwrap();
    let cx = Cx::for_testing();

    run(async {
        let mut repo = uow.repository::<Hero>();
        let hero = unwrap_outcome(repo.get_by_id(&cx, world.deadpond).await).unwrap();
        let err = repo.add(hero).unwrap_err();
        assert!(err.is_identity_conflict());
    });
}

#[test]
fn update_of_untracked_record_attaches_it() {
    let db = MemoryDatabase::new();
    let world = seed_world(&db);
    let factory = UnitOfWorkFactory::new(db.clone());
    let mut uow = factory.begin().unwrap();
    let cx = Cx::for_testing();

    run(async {
        let mut repo = uow.repository::<Hero>();
        let mut hero = unwrap_outcome(repo.get_by_id_no_tracking(&cx, world.rusty_man).await)
            .unwrap();
        hero.age = Some(49);
        repo.update(&hero).unwrap();

        let entry = repo.get_entry(&hero).unwrap().expect("attached");
        assert_eq!(entry.state(), EntryState::Modified);
        assert_eq!(entry.original_token(), hero.version.as_deref());

        assert_eq!(unwrap_outcome(uow.commit(&cx).await), 1);
    });

    let stored = db.all::<Hero>().unwrap();
    let rusty = stored.iter().find(|h| h.id == world.rusty_man).unwrap();
    assert_eq!(rusty.age, Some(49));
}

#[test]
fn delete_removes_rows_and_drops_added_entries() {
    let db = MemoryDatabase::new();
    let world = seed_world(&db);
    let factory = UnitOfWorkFactory::new(db.clone());
    let mut uow = factory.begin().unwrap();
    let cx = Cx::for_testing();

    run(async {
        let mut repo = uow.repository::<Power>();
        let powers = unwrap_outcome(repo.get_all(&cx).await);
        repo.delete(&powers[0]).unwrap();

        let added = power(world.deadpond, "Healing");
        repo.add(added.clone()).unwrap();
        repo.delete(&added).unwrap();

        assert_eq!(unwrap_outcome(uow.commit(&cx).await), 1);
    });

    assert_eq!(db.row_count("powers"), 1);
    assert_eq!(uow.session().tracked_count(), 1);
}

#[test]
fn delete_and_insert_commit_together() {
    let db = MemoryDatabase::new();
    let factory = UnitOfWorkFactory::new(db.clone());
    let mut uow = factory.begin().unwrap();
    let cx = Cx::for_testing();
    let mut existing = note("old");
    existing.id = 7;
    db.seed(&existing).unwrap();

    run(async {
        let mut repo = uow.repository::<Note>();
        let old = unwrap_outcome(repo.get_by_id(&cx, 7_i64).await).unwrap();
        repo.delete(&old).unwrap();
        repo.add(note("new")).unwrap();
        assert_eq!(uow.session().pending_count(), 2);
        assert_eq!(unwrap_outcome(uow.commit(&cx).await), 2);
    });

    let notes = db.all::<Note>().unwrap();
    assert_eq!(notes.len(), 1);
    assert_eq!(notes[0].body, "new");
    assert_eq!(notes[0].id, 8);
    assert_eq!(uow.session().tracked_count(), 1);
}

#[test]
fn apply_values_copies_columns_but_keeps_identity() {
    let db = MemoryDatabase::new();
    let world = seed_world(&db);
    let factory = UnitOfWorkFactory::new(db.clone());
    let mut uow = factory.begin().unwrap();
    let cx = Cx::for_testing();

    run(async {
        let mut repo = uow.repository::<Hero>();
        let mut target = unwrap_outcome(repo.get_by_id(&cx, world.deadpond).await).unwrap();
        let mut source = hero("Deadpool", Some(31), Some(world.avengers));
        source.id = 999;
        source.version = target.version.clone();

        repo.apply_values(&mut target, &source).unwrap();
        assert_eq!(target.id, world.deadpond);
        assert_eq!(target.name, "Deadpool");

        let entry = repo.get_entry(&target).unwrap().expect("tracked");
        assert_eq!(entry.state(), EntryState::Modified);
        assert_eq!(entry.record().map(|h| h.age), Some(Some(31)));

        let stranger = hero("Nobody", None, None);
        let err = repo.apply_values(&mut stranger.clone(), &source).unwrap_err();
        assert!(matches!(err, Error::NotTracked { entity: "heroes" }));

        assert_eq!(unwrap_outcome(uow.commit(&cx).await), 1);
    });

    let stored = db.all::<Hero>().unwrap();
    assert!(stored.iter().any(|h| h.id == world.deadpond && h.name == "Deadpool"));
    assert!(stored.iter().all(|h| h.id != 999));
}

#[test]
fn entry_edits_are_detected_at_commit() {
    let db = MemoryDatabase::new();
    let world = seed_world(&db);
    let factory = UnitOfWorkFactory::new(db.clone());
    let mut uow = factory.begin().unwrap();
    let cx = Cx::for_testing();

    run(async {
        let mut repo = uow.repository::<Hero>();
        let hero = unwrap_outcome(repo.get_by_id(&cx, world.spider_boy).await).unwrap();
        let mut entry = repo.get_entry(&hero).unwrap().expect("tracked");
        entry.record_mut().unwrap().age = Some(17);
        assert!(entry.has_changes());
        assert_eq!(entry.state(), EntryState::Unchanged);

        assert_eq!(unwrap_outcome(uow.commit(&cx).await), 1);
    });

    let stored = db.all::<Hero>().unwrap();
    assert!(stored.iter().any(|h| h.id == world.spider_boy && h.age == Some(17)));
}

#[test]
fn rollback_discards_pending_changes() {
    let db = MemoryDatabase::new();
    let world = seed_world(&db);
    let factory = UnitOfWorkFactory::new(db.clone());
    let mut uow = factory.begin().unwrap();
    let cx = Cx::for_testing();
    let before = db.snapshot();

    run(async {
        let mut repo = uow.repository::<Hero>();
        let mut hero = unwrap_outcome(repo.get_by_id(&cx, world.deadpond).await).unwrap();
        hero.name = "Changed".to_string();
        repo.update(&hero).unwrap();
        repo.add(hero_named("Extra")).unwrap();

        assert_eq!(uow.rollback().unwrap(), 2);
        assert_eq!(uow.session().pending_count(), 0);
        assert_eq!(unwrap_outcome(uow.commit(&cx).await), 0);

        let tracked = uow.session().tracked::<Hero>();
        assert_eq!(tracked.len(), 1);
        assert_eq!(tracked[0].name, "Deadpond");
    });

    assert_eq!(db.snapshot(), before);
}

fn hero_named(name: &str) -> Hero {
    hero(name, None, None)
}

// ============================================================================
// Soft Delete
// ============================================================================

#[test]
fn soft_delete_flags_and_stamps_but_keeps_the_row() {
    let db = MemoryDatabase::new();
    let factory = UnitOfWorkFactory::new(db.clone());
    let mut uow = factory.begin().unwrap();
    let cx = Cx::for_testing();

    run(async {
        uow.repository::<Hero>().add(hero_named("A")).unwrap();
        unwrap_outcome(uow.commit(&cx).await);

        let mut repo = uow.repository::<Hero>();
        assert!(repo.soft_delete_support().is_supported());
        let mut a = unwrap_outcome(repo.get_by_id(&cx, 1_i64).await).unwrap();
        assert!(repo.soft_delete(&mut a).unwrap());
        assert!(a.deleted);
        assert!(a.deleted_at.is_some());
        assert_eq!(unwrap_outcome(uow.commit(&cx).await), 1);

        let mut repo = uow.repository::<Hero>();
        assert!(unwrap_outcome(repo.get_by_id(&cx, 1_i64).await).is_none());
        let ignored = unwrap_outcome(repo.get_by_id_ignoring_soft_delete(&cx, 1_i64).await)
            .expect("row is kept");
        assert!(ignored.deleted);

        // Idempotent: a second soft delete leaves the record deleted.
        let mut again = ignored.clone();
        assert!(repo.soft_delete(&mut again).unwrap());
        unwrap_outcome(uow.commit(&cx).await);
    });

    let stored = db.all::<Hero>().unwrap();
    assert_eq!(stored.len(), 1);
    assert!(stored[0].deleted);
    assert!(stored[0].deleted_at.is_some());
}

#[test]
fn soft_delete_of_untracked_record_attaches_it() {
    let db = MemoryDatabase::new();
    let world = seed_world(&db);
    let factory = UnitOfWorkFactory::new(db.clone());
    let mut uow = factory.begin().unwrap();
    let cx = Cx::for_testing();

    run(async {
        let mut repo = uow.repository::<Hero>();
        let mut hero = unwrap_outcome(repo.get_by_id_no_tracking(&cx, world.rusty_man).await)
            .unwrap();
        assert!(repo.soft_delete(&mut hero).unwrap());
        assert_eq!(
            repo.get_entry(&hero).unwrap().map(|e| e.state()),
            Some(EntryState::Modified)
        );
        assert_eq!(unwrap_outcome(uow.commit(&cx).await), 1);
    });

    assert_eq!(db.row_count("heroes"), 4);
}

#[test]
fn soft_delete_without_flag_is_a_no_op() {
    let db = MemoryDatabase::new();
    db.seed(&note("keep me")).unwrap();
    let factory = UnitOfWorkFactory::new(db.clone());
    let mut uow = factory.begin().unwrap();
    let cx = Cx::for_testing();
    let before = db.snapshot();

    run(async {
        let mut repo = uow.repository::<Note>();
        assert!(!repo.soft_delete_support().is_supported());
        let mut n = unwrap_outcome(repo.get_by_id(&cx, 1_i64).await).unwrap();
        assert!(!repo.soft_delete(&mut n).unwrap());
        assert_eq!(
            repo.get_entry(&n).unwrap().map(|e| e.state()),
            Some(EntryState::Unchanged)
        );
        assert_eq!(unwrap_outcome(uow.commit(&cx).await), 0);
    });

    assert_eq!(db.snapshot(), before);
}

// ============================================================================
// Optimistic Concurrency
// ============================================================================

#[test]
fn stale_row_version_across_units_of_work_conflicts() {
    let db = MemoryDatabase::new();
    let world = seed_world(&db);
    let factory = UnitOfWorkFactory::new(db.clone());
    let cx = Cx::for_testing();

    run(async {
        let mut first = factory.begin().unwrap();
        let mut second = factory.begin().unwrap();

        let mut mine = unwrap_outcome(first.repository::<Hero>().get_by_id(&cx, world.deadpond).await)
            .unwrap();
        let mut theirs =
            unwrap_outcome(second.repository::<Hero>().get_by_id(&cx, world.deadpond).await)
                .unwrap();

        mine.name = "First".to_string();
        first.repository::<Hero>().update(&mine).unwrap();
        assert_eq!(unwrap_outcome(first.commit(&cx).await), 1);

        let after_first = db.snapshot();
        theirs.name = "Second".to_string();
        second.repository::<Hero>().update(&theirs).unwrap();
        let err = expect_err(second.commit(&cx).await);
        match err {
            Error::ConcurrencyConflict(info) => {
                assert_eq!(info.entity, "heroes");
                assert_eq!(info.key, Value::BigInt(world.deadpond));
            }
            other => panic!("expected a concurrency conflict, got {other}"),
        }

        assert_eq!(db.snapshot(), after_first);
        let entry_state = second
            .repository::<Hero>()
            .get_entry(&theirs)
            .unwrap()
            .map(|e| e.state());
        assert_eq!(entry_state, Some(EntryState::Modified));
    });
}

#[test]
fn overwritten_original_row_version_is_checked() {
    let db = MemoryDatabase::new();
    let world = seed_world(&db);
    let factory = UnitOfWorkFactory::new(db.clone());
    let mut uow = factory.begin().unwrap();
    let cx = Cx::for_testing();
    let before = db.snapshot();

    run(async {
        let mut repo = uow.repository::<Hero>();
        let mut hero = unwrap_outcome(repo.get_by_id(&cx, world.deadpond).await).unwrap();
        assert!(repo.set_original_row_version(&hero, Some(vec![0; 8])).unwrap());
        hero.age = Some(99);
        repo.update(&hero).unwrap();

        let err = expect_err(uow.commit(&cx).await);
        assert!(err.is_concurrency_conflict());
    });

    assert_eq!(db.snapshot(), before);
}

#[test]
fn cleared_row_version_skips_the_check() {
    let db = MemoryDatabase::new();
    let world = seed_world(&db);
    let factory = UnitOfWorkFactory::new(db.clone());
    let cx = Cx::for_testing();

    run(async {
        // Someone else writes first, so our token is stale.
        let mut other = factory.begin().unwrap();
        let mut theirs =
            unwrap_outcome(other.repository::<Hero>().get_by_id(&cx, world.deadpond).await)
                .unwrap();

        let mut uow = factory.begin().unwrap();
        let mut mine =
            unwrap_outcome(uow.repository::<Hero>().get_by_id(&cx, world.deadpond).await).unwrap();

        theirs.age = Some(1);
        other.repository::<Hero>().update(&theirs).unwrap();
        unwrap_outcome(other.commit(&cx).await);

        let mut repo = uow.repository::<Hero>();
        assert!(repo.clear_row_version(&mut mine).unwrap());
        assert!(mine.version.is_none());
        mine.age = Some(2);
        repo.update(&mine).unwrap();
        assert_eq!(unwrap_outcome(uow.commit(&cx).await), 1);
    });

    let stored = db.all::<Hero>().unwrap();
    assert!(stored.iter().any(|h| h.id == world.deadpond && h.age == Some(2)));
}

#[test]
fn row_version_operations_without_token_return_false() {
    let db = MemoryDatabase::new();
    db.seed(&note("n")).unwrap();
    let factory = UnitOfWorkFactory::new(db.clone());
    let mut uow = factory.begin().unwrap();
    let cx = Cx::for_testing();

    run(async {
        let mut repo = uow.repository::<Note>();
        let mut n = unwrap_outcome(repo.get_by_id(&cx, 1_i64).await).unwrap();
        assert!(!repo.set_original_row_version(&n, Some(vec![1])).unwrap());
        assert!(!repo.clear_row_version(&mut n).unwrap());

        let mut heroes = uow.repository::<Hero>();
        let stranger = hero_named("Stranger");
        let err = heroes.set_original_row_version(&stranger, None).unwrap_err();
        assert!(matches!(err, Error::NotTracked { .. }));
    });
}

#[test]
fn refreshed_token_after_commit_allows_next_update() {
    let db = MemoryDatabase::new();
    let world = seed_world(&db);
    let factory = UnitOfWorkFactory::new(db.clone());
    let mut uow = factory.begin().unwrap();
    let cx = Cx::for_testing();

    run(async {
        let mut repo = uow.repository::<Hero>();
        let mut hero = unwrap_outcome(repo.get_by_id(&cx, world.deadpond).await).unwrap();
        let original = hero.version.clone();
        hero.age = Some(31);
        repo.update(&hero).unwrap();
        unwrap_outcome(uow.commit(&cx).await);

        let mut repo = uow.repository::<Hero>();
        let entry = repo.get_entry(&hero).unwrap().expect("still tracked");
        assert_eq!(entry.state(), EntryState::Unchanged);
        assert_ne!(entry.current_token(), original);
        assert_eq!(entry.original_token(), entry.current_token().as_deref());

        let mut refreshed = unwrap_outcome(repo.get_by_id(&cx, world.deadpond).await).unwrap();
        refreshed.age = Some(32);
        repo.update(&refreshed).unwrap();
        assert_eq!(unwrap_outcome(uow.commit(&cx).await), 1);
    });
}

// ============================================================================
// Detach
// ============================================================================

#[test]
fn detach_then_mutate_has_no_effect_on_commit() {
    let db = MemoryDatabase::new();
    let world = seed_world(&db);
    let factory = UnitOfWorkFactory::new(db.clone());
    let mut uow = factory.begin().unwrap();
    let cx = Cx::for_testing();
    let before = db.snapshot();

    run(async {
        let mut repo = uow.repository::<Hero>();
        let mut hero = unwrap_outcome(repo.get_by_id(&cx, world.deadpond).await).unwrap();
        assert!(repo.is_tracked_by_key(|h| h.id == world.deadpond));

        assert!(repo.detach(&hero).unwrap());
        assert!(!repo.is_tracked_by_key(|h| h.id == world.deadpond));
        assert!(!repo.detach(&hero).unwrap());

        hero.name = "Ghost".to_string();
        assert!(repo.get_entry(&hero).unwrap().is_none());
        assert_eq!(unwrap_outcome(uow.commit(&cx).await), 0);
    });

    assert_eq!(db.snapshot(), before);
}

#[test]
fn detach_where_and_reattach() {
    let db = MemoryDatabase::new();
    let world = seed_world(&db);
    let factory = UnitOfWorkFactory::new(db.clone());
    let mut uow = factory.begin().unwrap();
    let cx = Cx::for_testing();

    run(async {
        let mut repo = uow.repository::<Hero>();
        let heroes = unwrap_outcome(repo.get_all(&cx).await);
        assert_eq!(repo.detach_where(|h| h.team_id == Some(world.avengers)), 2);
        assert!(repo.is_tracked_by_key(|h| h.id == world.rusty_man));

        // Reattach through update.
        let mut spider = heroes
            .into_iter()
            .find(|h| h.id == world.spider_boy)
            .unwrap();
        spider.age = Some(18);
        repo.update(&spider).unwrap();
        assert_eq!(unwrap_outcome(uow.commit(&cx).await), 1);
    });

    assert_eq!(uow.session().tracked_count(), 2);
}

#[test]
fn entry_state_transitions() {
    let db = MemoryDatabase::new();
    let world = seed_world(&db);
    let factory = UnitOfWorkFactory::new(db.clone());
    let mut uow = factory.begin().unwrap();
    let cx = Cx::for_testing();

    run(async {
        let mut repo = uow.repository::<Hero>();
        let hero = unwrap_outcome(repo.get_by_id(&cx, world.deadpond).await).unwrap();

        let mut entry = repo.get_entry(&hero).unwrap().unwrap();
        entry.set_state(EntryState::Deleted);
        assert_eq!(entry.state(), EntryState::Deleted);
        entry.set_state(EntryState::Unchanged);
        assert_eq!(entry.original_values().and_then(|r| r.get("name").cloned()), Some(Value::from("Deadpond")));
        entry.set_state(EntryState::Detached);
        assert_eq!(entry.state(), EntryState::Detached);

        assert!(!repo.is_tracked_by_key(|h| h.id == world.deadpond));
    });
}
