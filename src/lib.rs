//! # GFF-base: annotation databases using SQLite.
//!
//! This is a library for ingesting, normalizing, and querying hierarchical
//! genomic annotations in the GFF3 and GTF/GFF2 family of formats. An
//! annotation file is transformed into a SQLite database of features
//! (genomic intervals) linked by parent/child relations (gene → transcript →
//! exon, CDS, UTR), which can then be queried by id, by hierarchy, or by
//! genomic region without re-parsing the file.
//!
//! Real-world annotation files deviate from the format specifications in
//! different ways, so most of the work happens during ingest:
//!
//! * The formatting conventions of the attribute column (the [`Dialect`])
//!   are inferred by majority vote over the beginning of the file, so that
//!   a stored feature can be printed back bit-for-bit.
//! * Every feature is assigned a primary key under a configurable policy
//!   ([`IdSpec`]), with collisions resolved by a [`MergeStrategy`].
//! * GFF3 files declare their hierarchy in `Parent` attributes; GTF files
//!   only ship exons and CDS rows, so gene and transcript features are
//!   synthesized from the extents of their components.
//! * The parent/child relations are closed transitively up to a bounded
//!   level, which keeps "all exons of this gene" a single indexed scan.
//!
//! See [`GFFBase`] for building and opening databases and
//! [`FeatureInterface`] for queries. The `gff2db` and `gffquery` binaries
//! wrap the two for the command line.
//!
//! ### Basic concepts
//!
//! A [`Feature`] is one annotated interval: a row of the `features` table,
//! with its attribute column stored as an ordered multimap
//! ([`Attributes`]). Features are keyed by strings, typically the GFF3 `ID`
//! attribute or the GTF `gene_id`/`transcript_id`.
//!
//! Relations are `(parent, child, level)` rows: level 1 for direct edges,
//! higher levels for the materialized transitive closure.
//!
//! Coordinates are 1-based and inclusive. Every feature with coordinates is
//! assigned a UCSC genomic bin ([`bins`]), which makes region queries
//! index-friendly.

pub mod attributes;
pub mod bins;
pub mod db;
pub mod dialect;
pub mod error;
pub mod feature;
pub mod ids;
pub mod ingest;
pub mod input;
pub mod utils;

pub use attributes::Attributes;
pub use db::{FeatureInterface, GFFBase};
pub use dialect::{Dialect, Format, RenderOptions};
pub use error::{Error, Result};
pub use feature::Feature;
pub use ids::{Autoincrements, IdAssignment, IdSpec, MergeStrategy};
pub use ingest::IngestParams;
pub use input::{FeatureReader, Input};


#[cfg(test)]
pub(crate) mod internal;
