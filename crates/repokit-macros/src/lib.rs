//! Procedural macros for repokit.
//!
//! `#[derive(Record)]` generates the `repokit_core::Record` implementation
//! (static metadata, row conversion) plus one typed navigation descriptor
//! constant per `Related`/`RelatedMany` field.
//!
//! ```ignore
//! #[derive(Record, Debug, Clone)]
//! #[record(table = "heroes")]
//! struct Hero {
//!     #[record(primary_key, generated)]
//!     id: i64,
//!     name: String,
//!     team_id: Option<i64>,
//!     #[record(row_version)]
//!     version: Option<Vec<u8>>,
//!     #[record(soft_delete)]
//!     deleted: bool,
//!     #[record(deleted_at)]
//!     deleted_at: Option<DateTime<Utc>>,
//!     #[record(reference(local_key = "team_id"))]
//!     team: Related<Team>,
//! }
//!
//! // Generated: `Hero::TEAM: Reference<Hero, Team>`
//! ```

use proc_macro::TokenStream;
use syn::{DeriveInput, parse_macro_input};

mod record_derive;

/// Derive `repokit_core::Record`.
///
/// Struct attribute: `#[record(table = "...")]` (defaults to the snake-cased
/// struct name plus `s`).
///
/// Field attributes: `primary_key`, `generated`, `row_version`,
/// `soft_delete`, `deleted_at`, `column = "..."`, `skip`,
/// `reference(local_key = "..." | remote_key = "...")`,
/// `collection(remote_key = "...")`.
#[proc_macro_derive(Record, attributes(record))]
pub fn derive_record(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);

    match record_derive::parse_record(&input) {
        Ok(def) => record_derive::generate_record_impl(&def).into(),
        Err(err) => err.to_compile_error().into(),
    }
}
