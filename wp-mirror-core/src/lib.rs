#![doc = "wp-mirror-core: core logic library for wp-mirror."]

//! Mirrors the public content of WordPress sites into git repositories as
//! canonical JSON metadata and HTML body files, proposing a change only when
//! something actually differs.
//!
//! The crate holds the pipeline and data model. Network clients for the
//! content API, the repository host and the chat service live in the binary
//! crate and plug in through the traits in [`contract`].
//!
//! # Usage
//! Build a [`synchronise::Pipeline`] per endpoint, or let
//! [`run::run_endpoints`] select and process a whole configuration.

pub mod binary;
pub mod config;
pub mod contract;
pub mod error;
pub mod fetch;
pub mod file_map;
pub mod media;
pub mod record;
pub mod report;
pub mod run;
pub mod synchronise;
