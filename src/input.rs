//! Unified lazy input: files, URLs, text blobs, and feature streams.

use std::collections::VecDeque;
use std::io::{BufRead, Cursor};
use std::path::PathBuf;
use std::sync::Arc;

use crate::dialect::Dialect;
use crate::error::{Error, Result};
use crate::feature::Feature;
use crate::utils;


//-----------------------------------------------------------------------------

/// An input to the ingest pipeline.
///
/// All inputs behave as a lazy sequence of features once wrapped in a
/// [`FeatureReader`].
pub enum Input {
    /// A local annotation file, possibly gzip-compressed.
    Path(PathBuf),
    /// A remote annotation file, streamed over HTTP(S).
    Url(String),
    /// The contents of an annotation file as text.
    Text(String),
    /// An in-memory stream of already-parsed features.
    Features(Box<dyn Iterator<Item = Feature>>),
}

impl Input {
    /// Wraps a local file path.
    pub fn path(filename: impl Into<PathBuf>) -> Self {
        Input::Path(filename.into())
    }

    /// Wraps the contents of an annotation file.
    pub fn text(data: impl Into<String>) -> Self {
        Input::Text(data.into())
    }

    /// Wraps an iterator of features.
    pub fn features(features: impl IntoIterator<Item = Feature> + 'static) -> Self {
        Input::Features(Box::new(features.into_iter()))
    }

    /// Interprets a string as an existing file name or a URL.
    ///
    /// # Errors
    ///
    /// Returns an error if the string is neither.
    pub fn guess(data: &str) -> Result<Self> {
        if utils::file_exists(data) {
            Ok(Input::Path(PathBuf::from(data)))
        } else if utils::is_url(data) {
            Ok(Input::Url(String::from(data)))
        } else {
            Err(Error::InvalidInput(format!(
                "{} cannot be found and does not appear to be a URL", data
            )))
        }
    }
}

//-----------------------------------------------------------------------------

// Where line-based input came from; used to rewind after a peek.
enum Origin {
    Path(PathBuf),
    Url(String),
    Text(String),
}

impl Origin {
    fn open(&self) -> Result<Box<dyn BufRead>> {
        match self {
            Origin::Path(filename) => utils::open_file(filename),
            Origin::Url(url) => utils::open_url(url),
            Origin::Text(data) => Ok(Box::new(Cursor::new(data.clone().into_bytes()))),
        }
    }
}

enum Source {
    Lines {
        origin: Origin,
        reader: Box<dyn BufRead>,
    },
    Features {
        iter: Box<dyn Iterator<Item = Feature>>,
        // Items consumed by a peek, to be yielded before the iterator.
        buffer: VecDeque<Feature>,
    },
}

//-----------------------------------------------------------------------------

/// A lazy sequence of features over any [`Input`].
///
/// The reader skips comments, collects `##` directive lines, and stops at a
/// `##FASTA` section. [`FeatureReader::peek`] returns the first features of
/// the input and rewinds, so that dialect inference can look ahead without
/// consuming anything: line-based inputs are reopened, while feature streams
/// are buffered and replayed.
///
/// Once a dialect has been fixed with [`FeatureReader::set_dialect`], every
/// yielded feature carries it. Without one, each feature carries a dialect
/// inferred from its own line.
pub struct FeatureReader {
    source: Source,
    dialect: Option<Arc<Dialect>>,
    decode_escapes: bool,
    force_dialect_check: bool,
    directives: Vec<String>,
    line: usize,
    done: bool,
}

impl FeatureReader {
    /// Creates a reader over the given input.
    ///
    /// `decode_escapes` controls percent-decoding in attribute values. With
    /// `force_dialect_check`, the dialect is re-inferred for every line and
    /// [`FeatureReader::set_dialect`] has no effect.
    pub fn new(input: Input, decode_escapes: bool, force_dialect_check: bool) -> Result<Self> {
        let source = match input {
            Input::Path(filename) => {
                let origin = Origin::Path(filename);
                let reader = origin.open()?;
                Source::Lines { origin, reader }
            }
            Input::Url(url) => {
                let origin = Origin::Url(url);
                let reader = origin.open()?;
                Source::Lines { origin, reader }
            }
            Input::Text(data) => {
                let origin = Origin::Text(data);
                let reader = origin.open()?;
                Source::Lines { origin, reader }
            }
            Input::Features(iter) => Source::Features { iter, buffer: VecDeque::new() },
        };
        Ok(FeatureReader {
            source,
            dialect: None,
            decode_escapes,
            force_dialect_check,
            directives: Vec::new(),
            line: 0,
            done: false,
        })
    }

    /// Fixes the dialect attached to all subsequently yielded features.
    pub fn set_dialect(&mut self, dialect: Dialect) {
        self.dialect = Some(Arc::new(dialect));
    }

    /// Returns the dialect fixed with [`FeatureReader::set_dialect`].
    pub fn dialect(&self) -> Option<&Arc<Dialect>> {
        self.dialect.as_ref()
    }

    /// Returns the `##` directive lines seen so far, verbatim.
    pub fn directives(&self) -> &[String] {
        &self.directives
    }

    /// Returns the input line number of the most recently yielded feature.
    ///
    /// For feature streams, this is the ordinal of the feature.
    pub fn line(&self) -> usize {
        self.line
    }

    /// Returns the first `n` features and rewinds the input.
    ///
    /// Fewer features are returned if the input is shorter. Use
    /// [`usize::MAX`] to peek at the whole input. Rewinding reopens
    /// line-based inputs (a remote URL is fetched again) and replays
    /// buffered features for feature streams.
    pub fn peek(&mut self, n: usize) -> Result<Vec<Feature>> {
        if n == 0 {
            return Ok(Vec::new());
        }
        if let Source::Features { iter, buffer } = &mut self.source {
            while buffer.len() < n {
                match iter.next() {
                    Some(feature) => buffer.push_back(feature),
                    None => break,
                }
            }
            return Ok(buffer.iter().take(n).cloned().collect());
        }

        let mut result = Vec::new();
        while result.len() < n {
            match self.next_feature()? {
                Some(feature) => result.push(feature),
                None => break,
            }
        }
        // Rewind by reopening.
        if let Source::Lines { origin, reader } = &mut self.source {
            *reader = origin.open()?;
        }
        self.directives.clear();
        self.line = 0;
        self.done = false;
        Ok(result)
    }

    /// Returns the next feature, or [`None`] at the end of the input.
    ///
    /// Comments and blank lines are skipped, directives are collected, and
    /// a `##FASTA` line (or a raw FASTA header) ends the input.
    pub fn next_feature(&mut self) -> Result<Option<Feature>> {
        if self.done {
            return Ok(None);
        }
        match &mut self.source {
            Source::Features { iter, buffer } => {
                let next = buffer.pop_front().or_else(|| iter.next());
                match next {
                    Some(mut feature) => {
                        self.line += 1;
                        if let Some(dialect) = &self.dialect {
                            feature.dialect = Some(Arc::clone(dialect));
                        }
                        Ok(Some(feature))
                    }
                    None => {
                        self.done = true;
                        Ok(None)
                    }
                }
            }
            Source::Lines { reader, .. } => {
                let mut buf = String::new();
                loop {
                    buf.clear();
                    let len = reader.read_line(&mut buf)?;
                    if len == 0 {
                        self.done = true;
                        return Ok(None);
                    }
                    self.line += 1;
                    let line = buf.trim_end_matches(['\n', '\r']);

                    // Annotations may be followed by FASTA sequence.
                    if line == "##FASTA" || line.starts_with('>') {
                        self.done = true;
                        return Ok(None);
                    }
                    if line.starts_with("##") {
                        self.directives.push(String::from(line));
                        continue;
                    }
                    if line.starts_with('#') || line.is_empty() {
                        continue;
                    }

                    let dialect = if self.force_dialect_check { None } else { self.dialect.as_ref() };
                    let feature = Feature::from_line(line, self.line, dialect, self.decode_escapes)?;
                    return Ok(Some(feature));
                }
            }
        }
    }
}

//-----------------------------------------------------------------------------
