//! The library code for the `dealgrid` multi-site generator. The pipeline can
//! be generally broken down into two distinct phases:
//!
//! 1. Ingesting posts from the affiliate search API into the post store
//!    ([`crate::ingest`])
//! 2. Building one static site per registered domain from the post store
//!    ([`crate::build`])
//!
//! Of the two, the second phase is the more involved. It is itself composed of
//! three distinct sub-steps, repeated for every site in the registry:
//!
//! 1. Selecting the site's slice of the post store ([`crate::shard`])
//! 2. Rendering the detail and index documents ([`crate::render`])
//! 3. Writing the documents, SEO artifacts ([`crate::seo`]), and shared
//!    assets into the site's output directory
//!
//! The sharding step is what makes a single post store feed many independent
//! sites: every post deterministically belongs to exactly one site, either via
//! an explicit index stored at ingestion time or by its ordinal position in
//! the store. Rebuilding with an unchanged store and registry always
//! reproduces the same partition, so there is no assignment table to keep in
//! sync with the data.

#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]

pub mod build;
pub mod config;
pub mod coupang;
pub mod ingest;
pub mod render;
pub mod seo;
pub mod shard;
pub mod store;
pub mod util;
