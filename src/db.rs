//! GFF-base: a SQLite database storing hierarchical genomic annotations.

use std::fs;
use std::path::Path;
use std::sync::Arc;

use rusqlite::{Connection, OpenFlags, OptionalExtension, Row, Statement};
use rusqlite::types::Value;

use crate::bins;
use crate::dialect::{Dialect, RenderOptions};
use crate::error::{Error, Result};
use crate::feature::Feature;
use crate::ingest::{self, IngestParams};
use crate::input::Input;
use crate::utils;


//-----------------------------------------------------------------------------

// Current database version; checked when a database is opened.
pub(crate) const VERSION: &str = "GFF-base v0.1.0";

// The column list shared by feature queries, in the order expected by
// `row_to_feature`.
pub(crate) const SELECT_FEATURES: &str =
    "SELECT id, seqid, source, featuretype, start, end, score, strand, frame, attributes, extra, bin
    FROM features";

// Creates the tables and sets the pragmas for bulk loading.
pub(crate) fn init_tables(connection: &Connection) -> Result<()> {
    connection.execute_batch(
        "PRAGMA synchronous=NORMAL;
        PRAGMA journal_mode=WAL;
        PRAGMA page_size=4096;
        PRAGMA cache_size=10000;

        CREATE TABLE features (
            id TEXT,
            seqid TEXT,
            source TEXT,
            featuretype TEXT,
            start INTEGER,
            end INTEGER,
            score TEXT,
            strand TEXT,
            frame TEXT,
            attributes TEXT,
            extra TEXT,
            bin INTEGER,
            PRIMARY KEY (id)
        );

        CREATE TABLE relations (
            parent TEXT,
            child TEXT,
            level INTEGER,
            PRIMARY KEY (parent, child, level)
        );

        CREATE TABLE meta (
            dialect TEXT,
            version TEXT
        );

        CREATE TABLE directives (
            directive TEXT
        );

        CREATE TABLE autoincrements (
            base TEXT,
            n INTEGER,
            PRIMARY KEY (base)
        );

        CREATE TABLE duplicates (
            idspecid TEXT,
            newid TEXT,
            PRIMARY KEY (newid)
        );",
    )?;
    Ok(())
}

// Builds the query indexes and refreshes the planner statistics. Runs after
// the ingest transaction has committed.
pub(crate) fn create_indexes(connection: &Connection) -> Result<()> {
    connection.execute_batch(
        "CREATE INDEX IF NOT EXISTS featuretype ON features (featuretype);
        CREATE INDEX IF NOT EXISTS binindex ON features (seqid, bin);
        CREATE INDEX IF NOT EXISTS relationsparent ON relations (parent);
        CREATE INDEX IF NOT EXISTS relationschild ON relations (child);
        ANALYZE;",
    )?;
    Ok(())
}

// Converts a database row in `SELECT_FEATURES` order into a feature.
//
// The caller attaches the database dialect afterwards.
pub(crate) fn row_to_feature(row: &Row) -> rusqlite::Result<Feature> {
    fn json_error(err: serde_json::Error) -> rusqlite::Error {
        rusqlite::Error::FromSqlConversionFailure(
            9, rusqlite::types::Type::Text, Box::new(err)
        )
    }

    let attributes: String = row.get(9)?;
    let extra: String = row.get(10)?;
    Ok(Feature {
        id: row.get(0)?,
        seqid: row.get(1)?,
        source: row.get(2)?,
        featuretype: row.get(3)?,
        start: row.get::<_, Option<i64>>(4)?.map(|value| value as u64),
        end: row.get::<_, Option<i64>>(5)?.map(|value| value as u64),
        score: row.get(6)?,
        strand: row.get(7)?,
        frame: row.get(8)?,
        attributes: serde_json::from_str(&attributes).map_err(json_error)?,
        extra: serde_json::from_str(&extra).map_err(json_error)?,
        bin: row.get::<_, Option<i64>>(11)?.map(|value| value as u64),
        dialect: None,
    })
}

//-----------------------------------------------------------------------------

/// A connection to an annotation database.
///
/// Created once from an annotation input with [`GFFBase::create`] and then
/// opened read-only. The database is single-writer, multi-reader: an ingest
/// owns the file until it commits, while readers see the previous committed
/// version. Queries go through a [`FeatureInterface`].
///
/// # Examples
///
/// ```
/// use gff_base::{GFFBase, FeatureInterface, IngestParams, utils};
/// use std::fs;
///
/// // Build the database.
/// let gff_file = utils::get_test_data("flybase_intro.gff3");
/// let db_file = utils::temp_file_name("gff-base");
/// let result = GFFBase::create_from_file(&gff_file, &db_file, IngestParams::default());
/// assert!(result.is_ok());
///
/// // Open it and query a feature.
/// let database = GFFBase::open(&db_file).unwrap();
/// assert_eq!(database.features(), 12);
/// let mut interface = FeatureInterface::new(&database).unwrap();
/// let gene = interface.feature("FBgn0031208").unwrap().unwrap();
/// assert_eq!(gene.start, Some(7529));
///
/// // Clean up.
/// drop(interface);
/// drop(database);
/// fs::remove_file(&db_file).unwrap();
/// ```
#[derive(Debug)]
pub struct GFFBase {
    connection: Connection,
    version: String,
    dialect: Arc<Dialect>,
    features: usize,
    relations: usize,
}

/// Using the database.
impl GFFBase {
    /// Current database version.
    pub const VERSION: &'static str = VERSION;

    /// Opens a connection to the database in the given file.
    ///
    /// Reads the header information and passes through any database errors.
    pub fn open<P: AsRef<Path>>(filename: P) -> Result<Self> {
        let flags = OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX;
        let connection = Connection::open_with_flags(filename, flags)?;

        let (dialect, version) = connection.query_row(
            "SELECT dialect, version FROM meta",
            (),
            |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)),
        )?;
        if version != Self::VERSION {
            return Err(Error::InvalidInput(format!(
                "Unsupported database version: {} (expected {})", version, Self::VERSION
            )));
        }
        let dialect: Dialect = serde_json::from_str(&dialect)?;

        let features = connection.query_row("SELECT COUNT(*) FROM features", (), |row| row.get(0))?;
        let relations = connection.query_row("SELECT COUNT(*) FROM relations", (), |row| row.get(0))?;

        Ok(GFFBase {
            connection,
            version,
            dialect: Arc::new(dialect),
            features, relations,
        })
    }

    /// Returns the filename of the database or [`None`] if there is no
    /// filename.
    pub fn filename(&self) -> Option<&str> {
        self.connection.path()
    }

    /// Returns the size of the database file in a human-readable format.
    pub fn file_size(&self) -> Option<String> {
        let filename = self.filename()?;
        utils::file_size(filename)
    }

    /// Returns the version of the database.
    pub fn version(&self) -> &str {
        &self.version
    }

    /// Returns the dialect the annotations were ingested under.
    pub fn dialect(&self) -> &Dialect {
        &self.dialect
    }

    /// Returns the number of features in the database.
    pub fn features(&self) -> usize {
        self.features
    }

    /// Returns the number of parent/child relations, including transitive
    /// ones.
    pub fn relations(&self) -> usize {
        self.relations
    }
}

/// Creating the database.
impl GFFBase {
    /// Creates a new database from an annotation file.
    ///
    /// The file may be gzip-compressed. See [`GFFBase::create`].
    pub fn create_from_file(input: &Path, db_file: &Path, params: IngestParams) -> Result<()> {
        Self::create(Input::path(input), db_file, params)
    }

    /// Creates a new database from the text of an annotation file.
    ///
    /// See [`GFFBase::create`].
    pub fn create_from_string(input: &str, db_file: &Path, params: IngestParams) -> Result<()> {
        Self::create(Input::text(input), db_file, params)
    }

    /// Creates a new database from the given input.
    ///
    /// The whole ingest runs in a single write transaction, so a failed
    /// ingest does not leave a partial database behind.
    ///
    /// # Arguments
    ///
    /// * `input`: The annotation input.
    /// * `db_file`: Name of the database file to be created.
    /// * `params`: Ingest parameters.
    ///
    /// # Errors
    ///
    /// Returns an error if the database already exists (unless
    /// [`IngestParams::force`] is set), if the input is empty or malformed,
    /// or if primary key collisions cannot be resolved under the chosen
    /// merge strategy. Passes through any database errors.
    pub fn create<P: AsRef<Path>>(input: Input, db_file: P, params: IngestParams) -> Result<()> {
        if utils::file_exists(&db_file) {
            if params.force {
                fs::remove_file(&db_file)?;
            } else {
                return Err(Error::InvalidInput(format!(
                    "Database {} already exists", db_file.as_ref().display()
                )));
            }
        }

        let mut connection = Connection::open(&db_file)?;
        let result = ingest::run(&mut connection, input, &params);
        if result.is_err() {
            // Nothing was committed; do not leave an empty database file
            // behind.
            drop(connection);
            let _ = fs::remove_file(&db_file);
        }
        result
    }
}

//-----------------------------------------------------------------------------

/// A query interface to an annotation database.
///
/// The interface holds prepared statements, so it borrows the database.
/// Features returned by queries carry the database dialect and can be
/// rendered back to annotation lines with [`FeatureInterface::line`].
///
/// # Examples
///
/// ```
/// use gff_base::{GFFBase, FeatureInterface, IngestParams, utils};
/// use std::fs;
///
/// let gff_file = utils::get_test_data("flybase_intro.gff3");
/// let db_file = utils::temp_file_name("gff-base");
/// GFFBase::create_from_file(&gff_file, &db_file, IngestParams::default()).unwrap();
/// let database = GFFBase::open(&db_file).unwrap();
/// let mut interface = FeatureInterface::new(&database).unwrap();
///
/// // The two mRNAs of the gene, in file order.
/// let mrnas = interface.children("FBgn0031208", Some(1), Some("mRNA")).unwrap();
/// let ids: Vec<&str> = mrnas.iter().map(|f| f.id.as_deref().unwrap()).collect();
/// assert_eq!(ids, vec!["FBtr0300689", "FBtr0300690"]);
///
/// drop(interface);
/// drop(database);
/// fs::remove_file(&db_file).unwrap();
/// ```
#[derive(Debug)]
pub struct FeatureInterface<'a> {
    connection: &'a Connection,
    dialect: Arc<Dialect>,
    render: RenderOptions,
    get_feature: Statement<'a>,
    get_children: Statement<'a>,
    get_parents: Statement<'a>,
    features_of_type: Statement<'a>,
    count_of_type: Statement<'a>,
    all_features: Statement<'a>,
    get_featuretypes: Statement<'a>,
    get_directives: Statement<'a>,
    get_duplicates: Statement<'a>,
}

impl<'a> FeatureInterface<'a> {
    /// Returns a new interface to the given database.
    ///
    /// Passes through any database errors.
    pub fn new(database: &'a GFFBase) -> Result<Self> {
        let get_feature = database.connection.prepare(
            &format!("{} WHERE id = ?1", SELECT_FEATURES)
        )?;

        let get_children = database.connection.prepare(
            "SELECT features.id, seqid, source, featuretype, start, end, score, strand, frame,
                attributes, extra, bin
            FROM relations JOIN features ON features.id = relations.child
            WHERE relations.parent = ?1
                AND (?2 IS NULL OR relations.level = ?2)
                AND (?3 IS NULL OR features.featuretype = ?3)
            ORDER BY features.rowid"
        )?;

        let get_parents = database.connection.prepare(
            "SELECT features.id, seqid, source, featuretype, start, end, score, strand, frame,
                attributes, extra, bin
            FROM relations JOIN features ON features.id = relations.parent
            WHERE relations.child = ?1
                AND (?2 IS NULL OR relations.level = ?2)
                AND (?3 IS NULL OR features.featuretype = ?3)
            ORDER BY features.rowid"
        )?;

        let features_of_type = database.connection.prepare(
            &format!("{} WHERE featuretype = ?1 ORDER BY rowid", SELECT_FEATURES)
        )?;

        let count_of_type = database.connection.prepare(
            "SELECT COUNT(*) FROM features WHERE featuretype = ?1"
        )?;

        let all_features = database.connection.prepare(
            &format!("{} ORDER BY rowid", SELECT_FEATURES)
        )?;

        let get_featuretypes = database.connection.prepare(
            "SELECT DISTINCT featuretype FROM features ORDER BY featuretype"
        )?;

        let get_directives = database.connection.prepare(
            "SELECT directive FROM directives"
        )?;

        let get_duplicates = database.connection.prepare(
            "SELECT newid FROM duplicates WHERE idspecid = ?1 ORDER BY newid"
        )?;

        Ok(FeatureInterface {
            connection: &database.connection,
            dialect: Arc::clone(&database.dialect),
            render: RenderOptions::default(),
            get_feature,
            get_children, get_parents,
            features_of_type, count_of_type, all_features, get_featuretypes,
            get_directives, get_duplicates,
        })
    }

    /// Preserves the per-feature attribute order when rendering lines.
    pub fn set_keep_order(&mut self, keep_order: bool) {
        self.render.keep_order = keep_order;
    }

    /// Sorts multi-values within each attribute key when rendering lines.
    pub fn set_sort_attribute_values(&mut self, sort_attribute_values: bool) {
        self.render.sort_attribute_values = sort_attribute_values;
    }

    /// Disables percent-encoding when rendering lines. Pair with
    /// [`crate::IngestParams::ignore_url_escapes`] to pass escape sequences
    /// through unchanged in both directions.
    pub fn set_ignore_url_escapes(&mut self, ignore_url_escapes: bool) {
        self.render.encode_escapes = !ignore_url_escapes;
    }

    /// Renders a feature as an annotation line under the database dialect
    /// and the rendering options of this interface.
    pub fn line(&self, feature: &Feature) -> String {
        feature.to_line(&self.render)
    }

    // Attaches the database dialect to a queried feature.
    fn attach_dialect(&self, mut feature: Feature) -> Feature {
        feature.dialect = Some(Arc::clone(&self.dialect));
        feature
    }

    // Collects query rows into features, dropping repeated ids.
    fn collect_features(rows: rusqlite::Rows, dialect: &Arc<Dialect>) -> Result<Vec<Feature>> {
        let mut result: Vec<Feature> = Vec::new();
        let mut rows = rows;
        while let Some(row) = rows.next()? {
            let mut feature = row_to_feature(row)?;
            if result.iter().any(|previous| previous.id == feature.id) {
                continue;
            }
            feature.dialect = Some(Arc::clone(dialect));
            result.push(feature);
        }
        Ok(result)
    }

    /// Returns the feature with the given primary key, or [`None`] if there
    /// is no such feature.
    pub fn feature(&mut self, id: &str) -> Result<Option<Feature>> {
        let result = self.get_feature.query_row((id,), row_to_feature).optional()?;
        Ok(result.map(|feature| self.attach_dialect(feature)))
    }

    /// Returns the children of the feature in file order.
    ///
    /// # Arguments
    ///
    /// * `id`: Primary key of the parent.
    /// * `level`: Restrict to this relation level (1 for direct children),
    ///   or [`None`] for all levels.
    /// * `featuretype`: Restrict to this feature type.
    pub fn children(&mut self, id: &str, level: Option<u32>, featuretype: Option<&str>) -> Result<Vec<Feature>> {
        let rows = self.get_children.query((id, level, featuretype))?;
        Self::collect_features(rows, &self.dialect)
    }

    /// Returns the parents of the feature in file order.
    ///
    /// The arguments are as in [`FeatureInterface::children`].
    pub fn parents(&mut self, id: &str, level: Option<u32>, featuretype: Option<&str>) -> Result<Vec<Feature>> {
        let rows = self.get_parents.query((id, level, featuretype))?;
        Self::collect_features(rows, &self.dialect)
    }

    /// Returns all features of the given type in file order.
    pub fn features_of_type(&mut self, featuretype: &str) -> Result<Vec<Feature>> {
        let rows = self.features_of_type.query((featuretype,))?;
        Self::collect_features(rows, &self.dialect)
    }

    /// Returns the number of features of the given type.
    pub fn count_features_of_type(&mut self, featuretype: &str) -> Result<usize> {
        let count = self.count_of_type.query_row((featuretype,), |row| row.get(0))?;
        Ok(count)
    }

    /// Returns all features in file order.
    pub fn all_features(&mut self) -> Result<Vec<Feature>> {
        let rows = self.all_features.query(())?;
        Self::collect_features(rows, &self.dialect)
    }

    /// Returns the distinct feature types in the database.
    pub fn featuretypes(&mut self) -> Result<Vec<String>> {
        let mut result = Vec::new();
        let mut rows = self.get_featuretypes.query(())?;
        while let Some(row) = rows.next()? {
            result.push(row.get(0)?);
        }
        Ok(result)
    }

    /// Returns the `##` directive lines of the original file, verbatim.
    pub fn directives(&mut self) -> Result<Vec<String>> {
        let mut result = Vec::new();
        let mut rows = self.get_directives.query(())?;
        while let Some(row) = rows.next()? {
            result.push(row.get(0)?);
        }
        Ok(result)
    }

    /// Returns the primary keys assigned to features that originally
    /// claimed the given key but were renamed by the `create_unique`
    /// strategy.
    pub fn ids_for(&mut self, original_id: &str) -> Result<Vec<String>> {
        let mut result = Vec::new();
        let mut rows = self.get_duplicates.query((original_id,))?;
        while let Some(row) = rows.next()? {
            result.push(row.get(0)?);
        }
        Ok(result)
    }

    /// Returns the features within a genomic region, in file order.
    ///
    /// With `completely_within`, only features that lie entirely inside
    /// `start..=end` are returned, and the query is constrained to the
    /// genomic bins overlapping the region. Otherwise any feature that
    /// overlaps the region is returned. Open bounds are supported by
    /// passing [`None`]; features without coordinates never match a
    /// coordinate bound.
    pub fn region(
        &mut self,
        seqid: Option<&str>,
        start: Option<u64>,
        end: Option<u64>,
        featuretype: Option<&str>,
        completely_within: bool,
    ) -> Result<Vec<Feature>> {
        let mut clauses: Vec<String> = Vec::new();
        let mut values: Vec<Value> = Vec::new();

        if let Some(seqid) = seqid {
            clauses.push(String::from("seqid = ?"));
            values.push(Value::from(String::from(seqid)));
        }
        if let Some(start) = start {
            clauses.push(String::from(if completely_within { "start >= ?" } else { "end >= ?" }));
            values.push(Value::from(start as i64));
        }
        if let Some(end) = end {
            clauses.push(String::from(if completely_within { "end <= ?" } else { "start <= ?" }));
            values.push(Value::from(end as i64));
        }
        if let Some(featuretype) = featuretype {
            clauses.push(String::from("featuretype = ?"));
            values.push(Value::from(String::from(featuretype)));
        }

        // The bin constraint is only valid when the region is fully
        // bounded: a partially overlapping feature can live in any bin.
        if completely_within {
            if let (Some(start), Some(end)) = (start, end) {
                let bins: Vec<String> = bins::overlapping_bins(start, end)
                    .into_iter()
                    .map(|bin| bin.to_string())
                    .collect();
                clauses.push(format!("bin IN ({})", bins.join(", ")));
            }
        }

        let mut query = String::from(SELECT_FEATURES);
        if !clauses.is_empty() {
            query.push_str(" WHERE ");
            query.push_str(&clauses.join(" AND "));
        }
        query.push_str(" ORDER BY rowid");

        let mut statement = self.connection.prepare(&query)?;
        let rows = statement.query(rusqlite::params_from_iter(values))?;
        Self::collect_features(rows, &self.dialect)
    }
}

//-----------------------------------------------------------------------------
