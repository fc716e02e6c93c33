//! Features: single annotated intervals and their text form.

use std::fmt;
use std::sync::Arc;

use crate::attributes::Attributes;
use crate::bins;
use crate::dialect::{self, Dialect, RenderOptions};
use crate::error::{Error, Result};


//-----------------------------------------------------------------------------

/// A single annotated interval: one row of a GFF/GTF file.
///
/// Coordinates are 1-based and inclusive, with [`None`] standing for the `.`
/// placeholder. The remaining scalar columns are kept as strings, because the
/// formats only constrain their syntax loosely and round-trip fidelity
/// matters more than typed access.
///
/// When printed with [`fmt::Display`], a feature reconstructs its original
/// line using the attached dialect.
#[derive(Clone, Debug)]
pub struct Feature {
    /// Primary key in the database. [`None`] until the feature has passed
    /// through id resolution.
    pub id: Option<String>,

    /// Reference sequence name; `.` if unknown.
    pub seqid: String,

    /// Annotation source, e.g. the name of the pipeline.
    pub source: String,

    /// Feature type, e.g. `gene`, `mRNA`, `exon`, `CDS`.
    pub featuretype: String,

    /// 1-based inclusive start coordinate.
    pub start: Option<u64>,

    /// 1-based inclusive end coordinate. At least `start` when both are
    /// present.
    pub end: Option<u64>,

    /// Score column as text; `.` if missing.
    pub score: String,

    /// Strand column: `+`, `-`, or `.`.
    pub strand: String,

    /// Frame (phase) column: `0`, `1`, `2`, or `.`.
    pub frame: String,

    /// The parsed attribute column.
    pub attributes: Attributes,

    /// Any fields after the ninth, kept verbatim.
    pub extra: Vec<String>,

    /// UCSC bin containing the interval; [`None`] without coordinates.
    pub bin: Option<u64>,

    /// The dialect used to render this feature as text.
    pub dialect: Option<Arc<Dialect>>,
}

impl Default for Feature {
    fn default() -> Self {
        Feature {
            id: None,
            seqid: String::from("."),
            source: String::from("."),
            featuretype: String::from("."),
            start: None,
            end: None,
            score: String::from("."),
            strand: String::from("."),
            frame: String::from("."),
            attributes: Attributes::new(),
            extra: Vec::new(),
            bin: None,
            dialect: None,
        }
    }
}

//-----------------------------------------------------------------------------

// Parses a coordinate column: an integer or the `.` placeholder.
fn parse_coordinate(token: &str, line_number: usize) -> Result<Option<u64>> {
    if token == "." {
        return Ok(None);
    }
    token.parse::<u64>().map(Some).map_err(|_| Error::Coordinate {
        line: line_number,
        token: String::from(token),
    })
}

impl Feature {
    /// Parses a feature from one tab-separated line.
    ///
    /// If `dialect` is [`None`], the attribute dialect is inferred from this
    /// line alone and attached to the feature; otherwise the given dialect
    /// is used for both parsing and the attachment. `decode_escapes`
    /// controls percent-decoding of GFF3 attribute values.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MalformedLine`] if the line has fewer than nine
    /// tab-separated fields or its coordinates are inverted, and
    /// [`Error::Coordinate`] if a coordinate is present but unparseable.
    /// Attribute errors pass through with the line number filled in.
    pub fn from_line(
        line: &str,
        line_number: usize,
        dialect: Option<&Arc<Dialect>>,
        decode_escapes: bool,
    ) -> Result<Feature> {
        let fields: Vec<&str> = line.split('\t').collect();
        if fields.len() < 9 {
            return Err(Error::MalformedLine {
                line: line_number,
                reason: format!("expected 9 tab-separated fields, found {}", fields.len()),
            });
        }

        let start = parse_coordinate(fields[3], line_number)?;
        let end = parse_coordinate(fields[4], line_number)?;
        if let (Some(low), Some(high)) = (start, end) {
            if low > high {
                return Err(Error::MalformedLine {
                    line: line_number,
                    reason: format!("start {} is greater than end {}", low, high),
                });
            }
        }

        let (attributes, attached) = match dialect {
            Some(shared) => {
                let attributes = dialect::parse_attributes(fields[8], shared, decode_escapes)
                    .map_err(|err| err.at_line(line_number))?;
                (attributes, Some(Arc::clone(shared)))
            }
            None => {
                let inferred = Dialect::from_attribute_string(fields[8])
                    .map_err(|err| err.at_line(line_number))?;
                let fallback = Dialect::gff3();
                let attributes = dialect::parse_attributes(
                    fields[8],
                    inferred.as_ref().unwrap_or(&fallback),
                    decode_escapes,
                ).map_err(|err| err.at_line(line_number))?;
                (attributes, inferred.map(Arc::new))
            }
        };

        let mut feature = Feature {
            id: None,
            seqid: String::from(fields[0]),
            source: String::from(fields[1]),
            featuretype: String::from(fields[2]),
            start,
            end,
            score: String::from(fields[5]),
            strand: String::from(fields[6]),
            frame: String::from(fields[7]),
            attributes,
            extra: fields[9..].iter().map(|field| String::from(*field)).collect(),
            bin: None,
            dialect: attached,
        };
        feature.update_bin();
        Ok(feature)
    }

    /// Recomputes the UCSC bin from the current coordinates.
    pub fn update_bin(&mut self) {
        self.bin = match (self.start, self.end) {
            (Some(start), Some(end)) => Some(bins::containing_bin(start, end)),
            _ => None,
        };
    }

    /// Returns the length of the interval, or [`None`] without coordinates.
    pub fn length(&self) -> Option<u64> {
        match (self.start, self.end) {
            (Some(start), Some(end)) => Some(end - start + 1),
            _ => None,
        }
    }

    /// Returns the string form of a standard column by name, or [`None`]
    /// for an unknown name. Used by `:field:` id specifications.
    pub fn field_value(&self, name: &str) -> Option<String> {
        match name {
            "seqid" => Some(self.seqid.clone()),
            "source" => Some(self.source.clone()),
            "featuretype" => Some(self.featuretype.clone()),
            "start" => Some(self.start.map_or(String::from("."), |value| value.to_string())),
            "end" => Some(self.end.map_or(String::from("."), |value| value.to_string())),
            "score" => Some(self.score.clone()),
            "strand" => Some(self.strand.clone()),
            "frame" => Some(self.frame.clone()),
            _ => None,
        }
    }

    /// Renders the feature as a tab-separated line under the given options.
    ///
    /// Uses the attached dialect, or the standard GFF3 dialect if there is
    /// none.
    pub fn to_line(&self, options: &RenderOptions) -> String {
        let default_dialect;
        let dialect = match self.dialect.as_deref() {
            Some(dialect) => dialect,
            None => {
                default_dialect = Dialect::gff3();
                &default_dialect
            }
        };

        let start = self.start.map_or(String::from("."), |value| value.to_string());
        let end = self.end.map_or(String::from("."), |value| value.to_string());
        let attributes = dialect::render_attributes(&self.attributes, dialect, options);

        let mut result = format!(
            "{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}",
            self.seqid, self.source, self.featuretype,
            start, end,
            self.score, self.strand, self.frame,
            attributes
        );
        for field in self.extra.iter() {
            result.push('\t');
            result.push_str(field);
        }
        result
    }
}

impl fmt::Display for Feature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_line(&RenderOptions::default()))
    }
}

//-----------------------------------------------------------------------------
