//! Read paths of the generic repository: tracked and untracked queries,
//! the soft-delete filter, includes, ordering, and key-shape validation.

mod common;

use common::*;
use repokit::prelude::*;

#[test]
fn get_all_tracks_visible_records() {
    let db = MemoryDatabase::new();
    let world = seed_world(&db);
    let factory = UnitOfWorkFactory::new(db.clone());
    let mut uow = factory.begin().unwrap();
    let cx = Cx::for_testing();

    run(async {
        let heroes = unwrap_outcome(uow.repository::<Hero>().get_all(&cx).await);
        let names: Vec<_> = heroes.iter().map(|h| h.name.as_str()).collect();
        assert_eq!(names, vec!["Deadpond", "Spider-Boy", "Rusty-Man"]);

        let repo = uow.repository::<Hero>();
        assert!(repo.is_tracked_by_key(|h| h.id == world.deadpond));
        assert!(!repo.is_tracked_by_key(|h| h.id == world.retired));
    });

    assert_eq!(uow.session().tracked_count(), 3);
}

#[test]
fn tracked_value_wins_over_fresh_rows() {
    let db = MemoryDatabase::new();
    let world = seed_world(&db);
    let factory = UnitOfWorkFactory::new(db.clone());
    let mut uow = factory.begin().unwrap();
    let cx = Cx::for_testing();

    run(async {
        let mut repo = uow.repository::<Hero>();
        let mut hero = unwrap_outcome(repo.get_by_id(&cx, world.deadpond).await).unwrap();
        hero.name = "Lady Deadpond".to_string();
        repo.update(&hero).unwrap();

        let again = unwrap_outcome(repo.get_by_id(&cx, world.deadpond).await).unwrap();
        assert_eq!(again.name, "Lady Deadpond");

        let all = unwrap_outcome(repo.get_all(&cx).await);
        assert!(all.iter().any(|h| h.name == "Lady Deadpond"));
    });

    assert_eq!(uow.session().tracked_count(), 3);
}

#[test]
fn get_by_id_hides_removed_tracked_copies() {
    let db = MemoryDatabase::new();
    let world = seed_world(&db);
    let factory = UnitOfWorkFactory::new(db.clone());
    let mut uow = factory.begin().unwrap();
    let cx = Cx::for_testing();

    run(async {
        let mut repo = uow.repository::<Hero>();
        let hero = unwrap_outcome(repo.get_by_id(&cx, world.deadpond).await).unwrap();
        repo.delete(&hero).unwrap();
        assert!(unwrap_outcome(repo.get_by_id(&cx, world.deadpond).await).is_none());

        let mut other = unwrap_outcome(repo.get_by_id(&cx, world.spider_boy).await).unwrap();
        assert!(repo.soft_delete(&mut other).unwrap());
        assert!(unwrap_outcome(repo.get_by_id(&cx, world.spider_boy).await).is_none());

        // The ignoring variant still returns the tracked copy.
        let flagged = unwrap_outcome(repo.get_by_id_ignoring_soft_delete(&cx, world.spider_boy).await)
            .unwrap();
        assert!(flagged.deleted);
    });
}

#[test]
fn get_by_id_returns_none_when_absent() {
    let db = MemoryDatabase::new();
    seed_world(&db);
    let factory = UnitOfWorkFactory::new(db.clone());
    let mut uow = factory.begin().unwrap();
    let cx = Cx::for_testing();

    run(async {
        let mut repo = uow.repository::<Hero>();
        assert!(unwrap_outcome(repo.get_by_id(&cx, 999_i64).await).is_none());
        assert!(unwrap_outcome(repo.get_by_id_no_tracking(&cx, 999_i64).await).is_none());
    });

    assert_eq!(uow.session().tracked_count(), 0);
}

#[test]
fn no_tracking_reads_never_register_entries() {
    let db = MemoryDatabase::new();
    let world = seed_world(&db);
    let factory = UnitOfWorkFactory::new(db.clone());
    let mut uow = factory.begin().unwrap();
    let cx = Cx::for_testing();

    run(async {
        let mut repo = uow.repository::<Hero>();
        let all = unwrap_outcome(repo.get_all_no_tracking(&cx, &[]).await);
        assert_eq!(all.len(), 3);

        let one = unwrap_outcome(repo.get_by_id_no_tracking(&cx, world.rusty_man).await);
        assert_eq!(one.map(|h| h.name), Some("Rusty-Man".to_string()));

        let first = unwrap_outcome(
            repo.get_by_filter_no_tracking(&cx, Expr::col("name").like("Spider%"), &[])
                .await,
        );
        assert_eq!(first.map(|h| h.id), Some(world.spider_boy));
    });

    assert_eq!(uow.session().tracked_count(), 0);
}

#[test]
fn soft_deleted_rows_are_filtered_unless_ignored() {
    let db = MemoryDatabase::new();
    let world = seed_world(&db);
    let factory = UnitOfWorkFactory::new(db.clone());
    let mut uow = factory.begin().unwrap();
    let cx = Cx::for_testing();

    run(async {
        let mut repo = uow.repository::<Hero>();
        let over_60 = Expr::col("age").gt(60);

        let surfaced = unwrap_outcome(repo.get_all_with_filter(&cx, over_60.clone(), true).await);
        assert_eq!(surfaced.len(), 1);
        assert_eq!(surfaced[0].id, world.retired);
        assert!(surfaced[0].deleted);

        let hidden = unwrap_outcome(repo.get_all_with_filter(&cx, over_60.clone(), false).await);
        assert!(hidden.is_empty());

        assert!(!unwrap_outcome(repo.exists(&cx, over_60.clone()).await));
        assert!(unwrap_outcome(repo.exists_ignoring_soft_delete(&cx, over_60).await));

        assert!(unwrap_outcome(repo.get_by_id_no_tracking(&cx, world.retired).await).is_none());
        let retired =
            unwrap_outcome(repo.get_by_id_ignoring_soft_delete(&cx, world.retired).await);
        assert!(retired.is_some_and(|h| h.deleted));
    });
}

#[test]
fn disabling_the_global_filter_shows_everything() {
    let db = MemoryDatabase::new();
    let world = seed_world(&db);
    let config = SessionConfig::default().soft_delete_filter(false);
    let factory = UnitOfWorkFactory::with_config(db.clone(), config);
    let mut uow = factory.begin().unwrap();
    let cx = Cx::for_testing();

    run(async {
        let all = unwrap_outcome(uow.repository::<Hero>().get_all_no_tracking(&cx, &[]).await);
        assert_eq!(all.len(), 4);

        let mut repo = uow.repository::<Hero>();
        let mut spider = unwrap_outcome(repo.get_by_id(&cx, world.spider_boy).await).unwrap();
        assert!(repo.soft_delete(&mut spider).unwrap());
        assert_eq!(unwrap_outcome(uow.commit(&cx).await), 1);

        // The tracked soft-deleted copy stays visible to every read.
        let mut repo = uow.repository::<Hero>();
        let tracked = unwrap_outcome(repo.get_by_id(&cx, world.spider_boy).await)
            .expect("visible while the filter is off");
        assert!(tracked.deleted);
        let untracked = unwrap_outcome(repo.get_by_id_no_tracking(&cx, world.spider_boy).await)
            .expect("visible while the filter is off");
        assert!(untracked.deleted);
        let all = unwrap_outcome(repo.get_all(&cx).await);
        assert!(all.iter().any(|h| h.id == world.spider_boy));
    });
}

#[test]
fn ordered_reads_keep_storage_order_for_ties() {
    let db = MemoryDatabase::new();
    for (name, age) in [("b", 20), ("a", 30), ("c", 20)] {
        db.seed(&hero(name, Some(age), None)).unwrap();
    }
    let factory = UnitOfWorkFactory::new(db.clone());
    let mut uow = factory.begin().unwrap();
    let cx = Cx::for_testing();

    run(async {
        let mut repo = uow.repository::<Hero>();
        let asc = unwrap_outcome(repo.get_all_no_tracking_ordered(&cx, "age", false, &[]).await);
        let names: Vec<_> = asc.iter().map(|h| h.name.as_str()).collect();
        assert_eq!(names, vec!["b", "c", "a"]);

        let desc = unwrap_outcome(repo.get_all_no_tracking_ordered(&cx, "age", true, &[]).await);
        let names: Vec<_> = desc.iter().map(|h| h.name.as_str()).collect();
        assert_eq!(names, vec!["a", "b", "c"]);
    });
}

#[test]
fn includes_load_navigations_and_apply_the_filter_per_hop() {
    let db = MemoryDatabase::new();
    let world = seed_world(&db);
    let factory = UnitOfWorkFactory::new(db.clone());
    let mut uow = factory.begin().unwrap();
    let cx = Cx::for_testing();

    run(async {
        let heroes = unwrap_outcome(
            uow.repository::<Hero>()
                .get_all_with_includes(&cx, Expr::col("team_id").is_not_null(), &[Hero::TEAM.into()])
                .await,
        );
        assert_eq!(heroes.len(), 2);
        assert!(heroes
            .iter()
            .all(|h| h.team.get().is_some_and(|t| t.id == world.avengers)));
        assert!(!heroes[0].powers.is_loaded());

        let team = unwrap_outcome(
            uow.repository::<Team>()
                .get_by_id_with_includes(
                    &cx,
                    world.avengers,
                    &[Team::HEROES.then(Hero::POWERS).into()],
                )
                .await,
        )
        .unwrap();
        assert!(team.heroes.is_loaded());
        let names: Vec<_> = team.heroes.items().iter().map(|h| h.name.as_str()).collect();
        assert_eq!(names, vec!["Deadpond", "Spider-Boy"]);
        assert_eq!(team.heroes.items()[0].powers.len(), 2);
        assert!(team.heroes.items()[1].powers.is_loaded());
        assert!(team.heroes.items()[1].powers.is_empty());
    });

    assert_eq!(uow.session().tracked_count(), 0);
}

#[test]
fn include_paths_sharing_a_prefix_merge() {
    let db = MemoryDatabase::new();
    let world = seed_world(&db);
    let factory = UnitOfWorkFactory::new(db.clone());
    let mut uow = factory.begin().unwrap();
    let cx = Cx::for_testing();

    run(async {
        let includes = [
            Include::from(Team::HEROES),
            Include::from(Team::HEROES.then(Hero::POWERS)),
        ];
        let team = unwrap_outcome(
            uow.repository::<Team>()
                .get_by_id_with_includes(&cx, world.avengers, &includes)
                .await,
        )
        .unwrap();
        assert_eq!(team.heroes.len(), 2);
        assert_eq!(team.heroes.items()[0].powers.len(), 2);
    });
}

#[test]
fn composite_keys_fail_by_key_access() {
    let db = MemoryDatabase::new();
    let factory = UnitOfWorkFactory::new(db.clone());
    let mut uow = factory.begin().unwrap();
    let cx = Cx::for_testing();

    run(async {
        let mut repo = uow.repository::<Enrollment>();
        let err = expect_err(repo.get_by_id_no_tracking(&cx, 1_i64).await);
        assert!(matches!(
            err,
            Error::UnsupportedKeyShape {
                entity: "enrollments",
                key_fields: 2
            }
        ));

        // Reads that need no key still work.
        let all = unwrap_outcome(repo.get_all_no_tracking(&cx, &[]).await);
        assert!(all.is_empty());

        let err = expect_err(repo.get_all(&cx).await);
        assert!(matches!(err, Error::UnsupportedKeyShape { .. }));
    });
}
