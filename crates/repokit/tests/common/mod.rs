//! Shared record types and helpers for the integration tests.

#![allow(dead_code)]

use std::future::Future;

use chrono::{DateTime, Utc};
use repokit::prelude::*;

#[derive(Record, Debug, Clone, PartialEq)]
#[record(table = "teams")]
pub struct Team {
    #[record(primary_key, generated)]
    pub id: i64,
    pub name: String,
    #[record(collection(remote_key = "team_id"))]
    pub heroes: RelatedMany<Hero>,
}

#[derive(Record, Debug, Clone, PartialEq)]
#[record(table = "heroes")]
pub struct Hero {
    #[record(primary_key, generated)]
    pub id: i64,
    pub name: String,
    pub age: Option<i32>,
    pub team_id: Option<i64>,
    #[record(row_version)]
    pub version: Option<Vec<u8>>,
    #[record(soft_delete)]
    pub deleted: bool,
    #[record(deleted_at)]
    pub deleted_at: Option<DateTime<Utc>>,
    #[record(reference(local_key = "team_id"))]
    pub team: Related<Team>,
    #[record(collection(remote_key = "hero_id"))]
    pub powers: RelatedMany<Power>,
}

#[derive(Record, Debug, Clone, PartialEq)]
#[record(table = "powers")]
pub struct Power {
    #[record(primary_key, generated)]
    pub id: i64,
    pub hero_id: i64,
    pub name: String,
}

/// No row version, no soft-delete columns.
#[derive(Record, Debug, Clone, PartialEq)]
#[record(table = "notes")]
pub struct Note {
    #[record(primary_key, generated)]
    pub id: i64,
    pub body: String,
}

/// Two key columns: by-key access is rejected.
#[derive(Record, Debug, Clone, PartialEq)]
#[record(table = "enrollments")]
pub struct Enrollment {
    #[record(primary_key)]
    pub student_id: i64,
    #[record(primary_key)]
    pub course_id: i64,
}

pub fn team(name: &str) -> Team {
    Team {
        id: 0,
        name: name.to_string(),
        heroes: RelatedMany::unloaded(),
    }
}

pub fn hero(name: &str, age: Option<i32>, team_id: Option<i64>) -> Hero {
    Hero {
        id: 0,
        name: name.to_string(),
        age,
        team_id,
        version: None,
        deleted: false,
        deleted_at: None,
        team: Related::unloaded(),
        powers: RelatedMany::unloaded(),
    }
}

pub fn power(hero_id: i64, name: &str) -> Power {
    Power {
        id: 0,
        hero_id,
        name: name.to_string(),
    }
}

pub fn note(body: &str) -> Note {
    Note {
        id: 0,
        body: body.to_string(),
    }
}

/// Drive `test` to completion on a current-thread runtime.
pub fn run<F: Future<Output = ()>>(test: F) {
    let rt = asupersync::runtime::RuntimeBuilder::current_thread()
        .build()
        .expect("create asupersync runtime");
    rt.block_on(test);
}

pub fn unwrap_outcome<T: std::fmt::Debug>(outcome: Outcome<T, Error>) -> T {
    match outcome {
        Outcome::Ok(v) => v,
        Outcome::Err(e) => panic!("unexpected error: {e}"),
        Outcome::Cancelled(r) => panic!("cancelled: {r:?}"),
        Outcome::Panicked(p) => panic!("panicked: {p:?}"),
    }
}

pub fn expect_err<T: std::fmt::Debug>(outcome: Outcome<T, Error>) -> Error {
    match outcome {
        Outcome::Err(e) => e,
        other => panic!("expected an error, got {other:?}"),
    }
}

/// Keys of the seeded rows.
#[derive(Debug, Clone, Copy)]
pub struct World {
    pub avengers: i64,
    pub deadpond: i64,
    pub spider_boy: i64,
    pub rusty_man: i64,
    pub retired: i64,
}

/// Seed one team with two active heroes and one soft-deleted hero, one
/// unaffiliated hero, and two powers for Deadpond.
pub fn seed_world(db: &MemoryDatabase) -> World {
    let id = |row: repokit::Row| row.get_as::<i64>("id").expect("seeded key");

    let avengers = id(db.seed(&team("Avengers")).expect("seed team"));
    let deadpond = id(db.seed(&hero("Deadpond", Some(30), Some(avengers))).expect("seed hero"));
    let spider_boy =
        id(db.seed(&hero("Spider-Boy", Some(16), Some(avengers))).expect("seed hero"));
    let rusty_man = id(db.seed(&hero("Rusty-Man", Some(48), None)).expect("seed hero"));

    let mut old = hero("Retired", Some(70), Some(avengers));
    old.deleted = true;
    old.deleted_at = Some(Utc::now());
    let retired = id(db.seed(&old).expect("seed hero"));

    db.seed(&power(deadpond, "Regeneration")).expect("seed power");
    db.seed(&power(deadpond, "Sarcasm")).expect("seed power");

    World {
        avengers,
        deadpond,
        spider_boy,
        rusty_man,
        retired,
    }
}
