//! The ingest pipeline: from an annotation input to a populated database.
//!
//! Ingest proceeds in stages. The dialect is fixed first, by peeking at the
//! beginning of the input and taking a majority vote. The input is then
//! streamed: each feature passes through the optional transform, gets a
//! primary key, and is inserted, with key collisions resolved by the merge
//! strategy. GFF3 files carry the hierarchy explicitly in their `Parent`
//! attributes; GTF files carry it implicitly, so gene and transcript extents
//! are accumulated from their component features and synthesized at the end
//! of the stream. Finally, the transitive closure of the parent/child
//! relations is computed up to a bounded level.
//!
//! Everything runs in a single write transaction: a failed or cancelled
//! ingest leaves the database file empty.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use log::{info, warn};
use rusqlite::{Connection, OptionalExtension};

use crate::db;
use crate::dialect::{Dialect, Format};
use crate::error::{Error, Result};
use crate::feature::Feature;
use crate::ids::{self, Autoincrements, IdSpec, MergeStrategy};
use crate::input::{FeatureReader, Input};

#[cfg(test)]
mod tests;

//-----------------------------------------------------------------------------

/// The source name attached to gene and transcript features synthesized by
/// GTF inference.
pub const DERIVED_SOURCE: &str = "gffutils_derived";

/// Parameters for building a database; see [`crate::GFFBase::create`].
///
/// The defaults ingest a well-formed GFF3 or Ensembl GTF file: the dialect
/// is inferred from the first 10 features, GFF3 features are keyed by their
/// `ID` attribute, GTF genes and transcripts by `gene_id` and
/// `transcript_id`, and duplicate keys are an error.
pub struct IngestParams {
    /// How to derive primary keys. [`None`] uses the per-format default.
    pub id_spec: Option<IdSpec>,

    /// How to resolve primary key collisions.
    pub merge_strategy: MergeStrategy,

    /// Per-feature-type overrides of the merge strategy, e.g. merging
    /// duplicate genes while renaming duplicate CDS features. Feature types
    /// not listed here use [`IngestParams::merge_strategy`].
    pub merge_strategies: HashMap<String, MergeStrategy>,

    /// Per-feature transform applied before id resolution. Returning
    /// [`None`] drops the feature.
    pub transform: Option<Box<dyn Fn(Feature) -> Option<Feature>>>,

    /// Overwrite an existing database file.
    pub force: bool,

    /// Log a progress line every 1000 features.
    pub verbose: bool,

    /// Number of features to peek at for dialect inference. Use
    /// [`usize::MAX`] to examine the whole input.
    pub checklines: usize,

    /// Use this dialect instead of inferring one.
    pub dialect: Option<Dialect>,

    /// Re-infer the dialect for every line. Slow, but handles internally
    /// inconsistent files. Cannot be combined with an explicit dialect.
    pub force_dialect_check: bool,

    /// Treat the input as GFF3 even if the dialect looks like GTF,
    /// disabling gene and transcript inference.
    pub force_gff: bool,

    /// The attribute that groups GTF component features into transcripts.
    pub gtf_transcript_key: String,

    /// The attribute that groups GTF transcripts into genes.
    pub gtf_gene_key: String,

    /// The feature type whose extent drives GTF inference.
    pub gtf_subfeature: String,

    /// Do not synthesize transcript features for GTF input.
    pub disable_infer_transcripts: bool,

    /// Do not synthesize gene features for GTF input.
    pub disable_infer_genes: bool,

    /// Disable percent-decoding on parse and re-encoding on render.
    pub ignore_url_escapes: bool,

    /// Compute transitive parent/child relations up to this level.
    pub max_relation_level: u32,

    /// An external cancel signal, checked between records. Cancelling rolls
    /// the ingest back.
    pub cancel: Option<Arc<AtomicBool>>,
}

impl Default for IngestParams {
    fn default() -> Self {
        IngestParams {
            id_spec: None,
            merge_strategy: MergeStrategy::Error,
            merge_strategies: HashMap::new(),
            transform: None,
            force: false,
            verbose: false,
            checklines: 10,
            dialect: None,
            force_dialect_check: false,
            force_gff: false,
            gtf_transcript_key: String::from("transcript_id"),
            gtf_gene_key: String::from("gene_id"),
            gtf_subfeature: String::from("exon"),
            disable_infer_transcripts: false,
            disable_infer_genes: false,
            ignore_url_escapes: false,
            max_relation_level: 3,
            cancel: None,
        }
    }
}

//-----------------------------------------------------------------------------

// Extent of a gene or transcript accumulated from its component features.
struct Extent {
    seqid: String,
    strand: String,
    // The gene the transcript belongs to; unused for gene extents.
    gene: Option<String>,
    start: Option<u64>,
    end: Option<u64>,
}

impl Extent {
    fn new(feature: &Feature, gene: Option<String>) -> Self {
        Extent {
            seqid: feature.seqid.clone(),
            strand: feature.strand.clone(),
            gene,
            start: feature.start,
            end: feature.end,
        }
    }

    fn update(&mut self, feature: &Feature) {
        if let Some(start) = feature.start {
            self.start = Some(self.start.map_or(start, |low| low.min(start)));
        }
        if let Some(end) = feature.end {
            self.end = Some(self.end.map_or(end, |high| high.max(end)));
        }
    }
}

// Accumulated extents in first-occurrence order.
#[derive(Default)]
struct ExtentMap {
    extents: HashMap<String, Extent>,
    order: Vec<String>,
}

impl ExtentMap {
    fn update(&mut self, key: &str, feature: &Feature, gene: Option<String>) {
        match self.extents.get_mut(key) {
            Some(extent) => extent.update(feature),
            None => {
                self.extents.insert(String::from(key), Extent::new(feature, gene));
                self.order.push(String::from(key));
            }
        }
    }

    fn iter(&self) -> impl Iterator<Item = (&str, &Extent)> {
        self.order.iter().map(|key| (key.as_str(), &self.extents[key]))
    }
}

//-----------------------------------------------------------------------------

// The state of one ingest.
struct Ingest<'a> {
    connection: &'a Connection,
    params: &'a IngestParams,
    id_spec: &'a IdSpec,
    counters: Autoincrements,
    dialect: Arc<Dialect>,
    format: Format,
    features_read: usize,
    transcripts: ExtentMap,
    genes: ExtentMap,
}

/// Builds a database from the input.
///
/// The caller has already created the database file; this function creates
/// the tables, streams the input within a single write transaction, and
/// builds the indexes after the commit.
pub(crate) fn run(connection: &mut Connection, input: Input, params: &IngestParams) -> Result<()> {
    if params.force_dialect_check && params.dialect.is_some() {
        return Err(Error::InvalidInput(String::from(
            "force_dialect_check cannot be combined with an explicit dialect"
        )));
    }
    db::init_tables(connection)?;

    let mut reader = FeatureReader::new(input, !params.ignore_url_escapes, params.force_dialect_check)?;
    let dialect = fix_dialect(&mut reader, params)?;
    if !params.force_dialect_check {
        reader.set_dialect(dialect.clone());
    }

    let format = if params.force_gff { Format::Gff3 } else { dialect.fmt };
    let default_spec;
    let id_spec = match &params.id_spec {
        Some(spec) => spec,
        None => {
            default_spec = match format {
                Format::Gff3 => IdSpec::default_gff3(),
                Format::Gtf => IdSpec::default_gtf(),
            };
            &default_spec
        }
    };

    let transaction = connection.transaction()?;
    {
        let mut ingest = Ingest {
            connection: &transaction,
            params,
            id_spec,
            counters: Autoincrements::new(),
            dialect: Arc::new(dialect.clone()),
            format,
            features_read: 0,
            transcripts: ExtentMap::default(),
            genes: ExtentMap::default(),
        };

        ingest.process_stream(&mut reader)?;
        if ingest.features_read == 0 {
            return Err(Error::EmptyInput);
        }
        if format == Format::Gtf {
            ingest.emit_derived_features()?;
        }
        ingest.close_relations()?;
        ingest.finalize(reader.directives(), &dialect)?;
        info!("Ingested {} features", ingest.features_read);
    }
    transaction.commit()?;

    db::create_indexes(connection)?;
    Ok(())
}

// Returns the dialect to use: explicit, or by majority vote over the peeked
// beginning of the input.
fn fix_dialect(reader: &mut FeatureReader, params: &IngestParams) -> Result<Dialect> {
    if let Some(dialect) = &params.dialect {
        return Ok(dialect.clone());
    }
    if params.checklines == 0 {
        return Ok(Dialect::gff3());
    }
    let peeked = reader.peek(params.checklines)?;
    if peeked.is_empty() {
        return Err(Error::EmptyInput);
    }
    let observed: Vec<Dialect> = peeked.iter()
        .filter_map(|feature| feature.dialect.as_deref().cloned())
        .collect();
    Dialect::choose(&observed)
}

impl<'a> Ingest<'a> {
    // Is the external cancel signal set?
    fn cancelled(cancel: &Option<Arc<AtomicBool>>) -> bool {
        cancel.as_ref().is_some_and(|signal| signal.load(Ordering::Relaxed))
    }

    // Streams the input: transform, id resolution, insertion, and relation
    // staging for every feature.
    fn process_stream(&mut self, reader: &mut FeatureReader) -> Result<()> {
        while let Some(feature) = reader.next_feature()? {
            if Self::cancelled(&self.params.cancel) {
                return Err(Error::Cancelled);
            }
            self.features_read += 1;
            if self.params.verbose && self.features_read % 1000 == 0 {
                info!("Processed {} features", self.features_read);
            }

            let mut feature = match &self.params.transform {
                Some(transform) => match transform(feature) {
                    Some(transformed) => transformed,
                    None => continue,
                },
                None => feature,
            };

            let id = self.id_spec.resolve(&feature, &mut self.counters);
            feature.id = Some(id);
            let strategy = self.params.merge_strategies.get(&feature.featuretype)
                .copied()
                .unwrap_or(self.params.merge_strategy);
            let stored = self.insert_resolving(&mut feature, strategy, reader.line())?;
            let stored = match stored {
                Some(id) => id,
                None => continue,
            };

            match self.format {
                Format::Gff3 => self.stage_gff3_relations(&feature, &stored)?,
                Format::Gtf => self.stage_gtf_relations(&feature, &stored)?,
            }
        }
        Ok(())
    }

    // Inserts a feature, resolving a primary key collision with the given
    // strategy. Returns the key the feature was stored under, or None if it
    // was skipped.
    fn insert_resolving(
        &mut self,
        feature: &mut Feature,
        strategy: MergeStrategy,
        line: usize,
    ) -> Result<Option<String>> {
        let id = feature.id.clone().unwrap();
        match self.insert_feature(feature) {
            Ok(()) => Ok(Some(id)),
            Err(err) if is_constraint_violation(&err) => match strategy {
                MergeStrategy::Error => Err(Error::DuplicateId(id)),
                MergeStrategy::Warning => {
                    warn!("Duplicate id {:?} on line {}; ignoring all but the first", id, line);
                    Ok(None)
                }
                MergeStrategy::Replace => {
                    self.update_feature(feature)?;
                    Ok(Some(id))
                }
                MergeStrategy::CreateUnique => {
                    let new_id = self.counters.next(&id);
                    self.add_duplicate(&id, &new_id)?;
                    feature.id = Some(new_id.clone());
                    self.insert_feature(feature)?;
                    Ok(Some(new_id))
                }
                MergeStrategy::Merge => {
                    for candidate in self.candidate_merges(&id)? {
                        if ids::same_gff_fields(&candidate, feature) {
                            let mut merged = candidate.attributes.clone();
                            ids::merge_attributes(&mut merged, &feature.attributes);
                            self.connection.prepare_cached(
                                "UPDATE features SET attributes = ?1 WHERE id = ?2"
                            )?.execute((serde_json::to_string(&merged)?, candidate.id.as_ref().unwrap()))?;
                            return Ok(Some(candidate.id.clone().unwrap()));
                        }
                    }
                    Err(Error::MergeConflict { id, line })
                }
            },
            Err(err) => Err(err),
        }
    }

    fn insert_feature(&self, feature: &Feature) -> Result<()> {
        let mut statement = self.connection.prepare_cached(
            "INSERT INTO features
                (id, seqid, source, featuretype, start, end, score, strand, frame, attributes, extra, bin)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)"
        )?;
        statement.execute((
            feature.id.as_ref().unwrap(),
            &feature.seqid,
            &feature.source,
            &feature.featuretype,
            feature.start.map(|value| value as i64),
            feature.end.map(|value| value as i64),
            &feature.score,
            &feature.strand,
            &feature.frame,
            serde_json::to_string(&feature.attributes)?,
            serde_json::to_string(&feature.extra)?,
            feature.bin.map(|value| value as i64),
        ))?;
        Ok(())
    }

    fn update_feature(&self, feature: &Feature) -> Result<()> {
        let mut statement = self.connection.prepare_cached(
            "UPDATE features SET
                seqid = ?2, source = ?3, featuretype = ?4, start = ?5, end = ?6,
                score = ?7, strand = ?8, frame = ?9, attributes = ?10, extra = ?11, bin = ?12
            WHERE id = ?1"
        )?;
        statement.execute((
            feature.id.as_ref().unwrap(),
            &feature.seqid,
            &feature.source,
            &feature.featuretype,
            feature.start.map(|value| value as i64),
            feature.end.map(|value| value as i64),
            &feature.score,
            &feature.strand,
            &feature.frame,
            serde_json::to_string(&feature.attributes)?,
            serde_json::to_string(&feature.extra)?,
            feature.bin.map(|value| value as i64),
        ))?;
        Ok(())
    }

    fn add_duplicate(&self, original: &str, assigned: &str) -> Result<()> {
        let mut statement = self.connection.prepare_cached(
            "INSERT OR REPLACE INTO duplicates (idspecid, newid) VALUES (?1, ?2)"
        )?;
        statement.execute((original, assigned))?;
        Ok(())
    }

    // Features that claimed the given primary key: the one stored under it,
    // plus any that were renamed away from it by create_unique.
    fn candidate_merges(&self, id: &str) -> Result<Vec<Feature>> {
        let mut result = Vec::new();
        let mut statement = self.connection.prepare_cached(
            &format!("{} WHERE id = ?1", db::SELECT_FEATURES)
        )?;
        if let Some(feature) = statement.query_row((id,), db::row_to_feature).optional()? {
            result.push(feature);
        }
        let mut statement = self.connection.prepare_cached(
            &format!(
                "{} JOIN duplicates ON duplicates.newid = features.id WHERE duplicates.idspecid = ?1",
                db::SELECT_FEATURES
            )
        )?;
        let mut rows = statement.query((id,))?;
        while let Some(row) = rows.next()? {
            result.push(db::row_to_feature(row)?);
        }
        Ok(result)
    }

    fn stage_relation(&self, parent: &str, child: &str, level: u32) -> Result<()> {
        let mut statement = self.connection.prepare_cached(
            "INSERT OR IGNORE INTO relations (parent, child, level) VALUES (?1, ?2, ?3)"
        )?;
        statement.execute((parent, child, level))?;
        Ok(())
    }

    // GFF3 features name their parents in the Parent attribute. The staged
    // edges refer to parents by attribute value, which is the primary key
    // the parent row is stored under.
    fn stage_gff3_relations(&self, feature: &Feature, stored_id: &str) -> Result<()> {
        if let Some(parents) = feature.attributes.get("Parent") {
            for parent in parents {
                if parent != stored_id {
                    self.stage_relation(parent, stored_id, 1)?;
                }
            }
        }
        Ok(())
    }

    // GTF features name their transcript and gene in every row. Level-1 and
    // level-2 edges are staged immediately; the gene and transcript rows
    // themselves may only exist after inference.
    fn stage_gtf_relations(&mut self, feature: &Feature, stored_id: &str) -> Result<()> {
        let transcript = feature.attributes.first(&self.params.gtf_transcript_key).map(String::from);
        let gene = feature.attributes.first(&self.params.gtf_gene_key).map(String::from);

        if let Some(transcript) = &transcript {
            if transcript != stored_id {
                self.stage_relation(transcript, stored_id, 1)?;
            }
        }
        if let Some(gene) = &gene {
            if gene != stored_id {
                self.stage_relation(gene, stored_id, 2)?;
            }
            if let Some(transcript) = &transcript {
                if gene != transcript {
                    self.stage_relation(gene, transcript, 1)?;
                }
            }
        }

        // Components without a transcript are orphans: they are stored but
        // do not drive inference.
        if feature.featuretype == self.params.gtf_subfeature {
            if let Some(transcript) = &transcript {
                self.transcripts.update(transcript, feature, gene.clone());
                if let Some(gene) = &gene {
                    self.genes.update(gene, feature, None);
                }
            }
        }
        Ok(())
    }

    // Builds a synthesized gene or transcript feature from an accumulated
    // extent.
    fn derived_feature(&self, featuretype: &str, key: &str, extent: &Extent) -> Feature {
        let mut feature = Feature {
            seqid: extent.seqid.clone(),
            source: String::from(DERIVED_SOURCE),
            featuretype: String::from(featuretype),
            start: extent.start,
            end: extent.end,
            strand: extent.strand.clone(),
            dialect: Some(Arc::clone(&self.dialect)),
            ..Feature::default()
        };
        if featuretype == "transcript" {
            feature.attributes.set(self.params.gtf_transcript_key.clone(), vec![String::from(key)]);
            if let Some(gene) = &extent.gene {
                feature.attributes.set(self.params.gtf_gene_key.clone(), vec![gene.clone()]);
            }
        } else {
            feature.attributes.set(self.params.gtf_gene_key.clone(), vec![String::from(key)]);
        }
        feature.update_bin();
        feature
    }

    fn insert_derived(&mut self, mut feature: Feature, key: &str) -> Result<()> {
        // Without a custom id spec, a synthesized feature is keyed by its
        // grouping attribute value.
        feature.id = Some(match &self.params.id_spec {
            Some(spec) => spec.resolve(&feature, &mut self.counters),
            None => String::from(key),
        });

        let exists: Option<i64> = self.connection.prepare_cached(
            "SELECT 1 FROM features WHERE id = ?1"
        )?.query_row((feature.id.as_ref().unwrap(),), |row| row.get(0)).optional()?;
        if exists.is_some() {
            warn!(
                "The input contains an explicit {} for {:?}; consider disabling inference for this feature type",
                feature.featuretype, feature.id.as_ref().unwrap()
            );
        }

        // Synthesized rows always merge into explicit ones; the ingest-wide
        // strategy governs only the features that came from the input.
        self.insert_resolving(&mut feature, MergeStrategy::Merge, 0)?;
        Ok(())
    }

    // Synthesizes the transcript and gene rows for a GTF input at the end
    // of the stream.
    fn emit_derived_features(&mut self) -> Result<()> {
        if !self.params.disable_infer_transcripts {
            let transcripts = std::mem::take(&mut self.transcripts);
            for (key, extent) in transcripts.iter() {
                let feature = self.derived_feature("transcript", key, extent);
                self.insert_derived(feature, key)?;
            }
        }
        if !self.params.disable_infer_genes {
            let genes = std::mem::take(&mut self.genes);
            for (key, extent) in genes.iter() {
                let feature = self.derived_feature("gene", key, extent);
                self.insert_derived(feature, key)?;
            }
        }
        Ok(())
    }

    // Completes the transitive closure of the relations up to the bounded
    // level: (a, b, k-1) and (b, c, 1) yield (a, c, k), unless some
    // (a, c, _) already exists. Self-edges are never created.
    fn close_relations(&self) -> Result<()> {
        for level in 2..=self.params.max_relation_level {
            self.connection.execute(
                "INSERT OR IGNORE INTO relations (parent, child, level)
                SELECT DISTINCT a.parent, b.child, ?1
                FROM relations a JOIN relations b ON a.child = b.parent
                WHERE a.level = ?2 AND b.level = 1 AND a.parent != b.child
                    AND NOT EXISTS (
                        SELECT 1 FROM relations r WHERE r.parent = a.parent AND r.child = b.child
                    )",
                (level, level - 1),
            )?;
        }
        Ok(())
    }

    // Writes the directives, the dialect, and the autoincrement state.
    fn finalize(&self, directives: &[String], dialect: &Dialect) -> Result<()> {
        let mut statement = self.connection.prepare_cached(
            "INSERT INTO directives (directive) VALUES (?1)"
        )?;
        for directive in directives {
            statement.execute((directive,))?;
        }

        self.connection.execute(
            "INSERT INTO meta (dialect, version) VALUES (?1, ?2)",
            (serde_json::to_string(dialect)?, db::VERSION),
        )?;

        let mut statement = self.connection.prepare_cached(
            "INSERT OR REPLACE INTO autoincrements (base, n) VALUES (?1, ?2)"
        )?;
        for (base, n) in self.counters.iter() {
            statement.execute((base, n))?;
        }
        Ok(())
    }
}

// A failed insert with this error means the primary key is already taken.
fn is_constraint_violation(err: &Error) -> bool {
    matches!(
        err,
        Error::Database(rusqlite::Error::SqliteFailure(inner, _))
            if inner.code == rusqlite::ErrorCode::ConstraintViolation
    )
}

//-----------------------------------------------------------------------------
