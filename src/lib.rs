//! Received-exchange resolution for contest logging.
//!
//! Free-text exchanges typed by the operator are matched against a per-country,
//! per-mode template of fields, each field validating and canonicalizing its
//! values. A memoizing guess cache pre-fills expected values by callsign.
//!
//! # Examples
//!
//! Matching with an in-memory registry:
//! ```
//! use qsoexch::{
//!     exchange::{matcher::ExchangeMatcher, template::ExchangeTemplate},
//!     field::{registry::FieldSpecRegistry, spec::FieldSpec},
//! };
//!
//! let mut registry = FieldSpecRegistry::new();
//! registry.insert(FieldSpec::new("RST").with_pattern(FieldSpec::compile_pattern("[1-5][1-9][1-9]").unwrap()));
//! registry.insert(
//!     FieldSpec::new("CQZONE")
//!         .with_pattern(FieldSpec::compile_pattern("[1-9]|[1-3][0-9]|40").unwrap())
//!         .with_numeric(true),
//! );
//!
//! let template = ExchangeTemplate::required(&["RST", "CQZONE"]);
//! let parsed = ExchangeMatcher::new(&registry).parse("1T 599", &template).expect("field count");
//! assert!(parsed.is_valid());
//! assert_eq!(parsed.value("CQZONE"), Some("10"));
//! ```
//!
//! Runtime usage with a SQLite journal:
//! ```no_run
//! use std::sync::Arc;
//!
//! use qsoexch::{
//!     config::ContestConfig,
//!     field::registry::FieldSpecRegistry,
//!     guess::{cache::GuessCache, history::InMemoryHistory},
//!     persist::sqlite::SqliteGuessJournal,
//!     runtime::handle::{RuntimeConfig, spawn_exchange_runtime},
//!     types::Mode,
//! };
//!
//! # #[tokio::main]
//! # async fn main() {
//! let config = ContestConfig::from_path("iaru.json").expect("config");
//! let registry = FieldSpecRegistry::build(&config, &config.grammar_source()).into_shared();
//! let cache = Arc::new(GuessCache::new(registry.clone(), Arc::new(InMemoryHistory::new())));
//!
//! let journal = SqliteGuessJournal::open("guesses.db").expect("open sqlite");
//! journal.load_into(&cache).expect("replay");
//!
//! let handle = spawn_exchange_runtime(
//!     registry,
//!     Box::new(config),
//!     cache,
//!     Some(Box::new(journal)),
//!     RuntimeConfig::default(),
//! );
//! let parsed = handle.parse("599 HQ", "K", Mode::CW).await.expect("parse");
//! handle.log("W1AW", parsed).await.expect("log");
//! handle.shutdown().await.expect("shutdown");
//! # }
//! ```
#![deny(missing_docs)]

/// Contest configuration loaded from JSON.
pub mod config;
/// Exchange templates, matching, and parse results.
pub mod exchange;
/// Field grammar: specs, sources, and the registry.
pub mod field;
/// Expected values by callsign.
pub mod guess;
/// Logged-value observations and persistence wrappers.
pub mod observation;
/// Persistence abstraction and SQLite implementation.
pub mod persist;
/// Single-writer runtime handle and events.
pub mod runtime;
/// Shared primitive types and enums.
pub mod types;
