//! # Catalog Search
//!
//! Ingestion and full-text search for the Brazilian federal procurement
//! catalogs: CATMAT (materials) and CATSER (services).
//!
//! Catalog Search ingests the spreadsheets published on the procurement
//! portal, upserts their rows into SQLite keyed by the catalog codes, and
//! serves ranked, diacritic-insensitive full-text search (FTS5) with typed
//! filters through a CLI and an HTTP API. Search responses flow through an
//! optional two-tier cache (in-process + Redis).
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌──────────────┐   ┌───────────┐
//! │   XLSX   │──▶│ Row pipeline │──▶│  SQLite   │
//! │ workbook │   │  map+upsert  │   │   FTS5    │
//! └──────────┘   └──────────────┘   └─────┬─────┘
//!                                         │
//!                     ┌───────────────────┤
//!                     ▼                   ▼
//!              ┌─────────────┐     ┌─────────────┐
//!              │     CLI     │     │    HTTP     │
//!              │ (catsearch) │     │   (axum)    │
//!              └─────────────┘     └─────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! catsearch init                          # create database
//! catsearch import catmat ./catmat.xlsx   # load the materials catalog
//! catsearch import catser ./catser.xlsx   # load the services catalog
//! catsearch search catmat "caneta esferográfica"
//! catsearch stats
//! catsearch serve                         # start the HTTP API
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Core data types |
//! | [`xlsx`] | Bounded streaming XLSX reader |
//! | [`ingest`] | Import pipeline: header scan, row mapping, upserts |
//! | [`store`] | SQLite persistence and FTS5 queries |
//! | [`search`] | Cache-fronted search gateway |
//! | [`cache`] | Two-tier response cache (moka + Redis) |
//! | [`server`] | HTTP API |
//! | [`stats`] | Catalog statistics report |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |

pub mod cache;
pub mod config;
pub mod db;
pub mod ingest;
pub mod migrate;
pub mod models;
pub mod search;
pub mod server;
pub mod stats;
pub mod store;
pub mod xlsx;
