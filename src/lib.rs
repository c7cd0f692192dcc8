//! dblp-load: DBLP XML dump normalization into a relational database
//!
//! This crate streams a DBLP bibliography dump and writes every publication it
//! contains into a fixed relational schema:
//!
//! 1. **Parsing** -- Stream the dump one top-level record at a time, resolving
//!    DTD entities and decoding text under a configurable UTF-8 policy
//! 2. **Assembly** -- Route each child of a publication to a scalar column, a
//!    shared reference entity, or a publication-owned child table
//! 3. **Persistence** -- Insert rows through a single session, committing
//!    every 100 records
//! 4. **Constraints** -- Once everything is committed, enforce the foreign keys
//!    from the child tables to `publication(key)`
//!
//! # Architecture
//!
//! - **Streaming XML parsing** -- Never loads the full dump into memory; only one
//!   record subtree is materialized at a time
//! - **Closed dispatch** -- Element tags map to enums, so every table and column
//!   name that reaches SQL comes from a fixed set
//! - **Best-effort extraction** -- Unknown tags and attributes are reported as
//!   anomalies and skipped; only input and database failures abort a run
//! - **Session abstraction** -- All writes go through [`store::Session`], which
//!   has a SQLite implementation and a counting dry-run implementation
//!
//! # Key Modules
//!
//! - [`parser`] -- Streaming record reader with BZ2 decompression
//! - [`entities`] -- DTD entity declarations and lookup
//! - [`text`] -- UTF-8 decoding policy
//! - [`models`] -- Element tree, tag enums, tables, and row records
//! - [`extract`] -- Field extraction rules for leaf elements
//! - [`load`] -- Reference resolution, child-table writes, and publication assembly
//! - [`store`] -- Database sessions
//! - [`report`] -- Anomaly reporting
//! - [`stats`] -- Load counters
//! - [`config`] -- Constants
//!
//! # Example Usage
//!
//! ```bash
//! # Load a compressed dump into an existing database
//! dblp-load load -i dblp.xml.bz2 -d dblp.sqlite
//!
//! # Count what would be written without touching a database
//! dblp-load load -i dblp.xml --dry-run
//! ```

pub mod config;
pub mod entities;
pub mod extract;
pub mod load;
pub mod models;
pub mod parser;
pub mod report;
pub mod stats;
pub mod store;
pub mod text;
