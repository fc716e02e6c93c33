//! Attribute-column dialects: parsing, rendering, and inference.
//!
//! The ninth column of a GFF/GTF line is a list of key/value pairs, but the
//! details vary: GFF3 uses `key=value` with `;` separators, GTF uses
//! `key "value"` with `; ` separators and usually a trailing semicolon, and
//! real files deviate from both in assorted ways. A [`Dialect`] captures the
//! formatting conventions of one file so that an attribute string can be
//! parsed into an [`Attributes`] map and rendered back to the original text.
//!
//! Dialects are usually inferred by peeking at the first lines of a file and
//! taking a field-wise majority vote over the per-line dialects.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::hash::Hash;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::attributes::Attributes;
use crate::error::{Error, Result};


//-----------------------------------------------------------------------------

/// The general format of an annotation file.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Format {
    /// GFF3: `key=value` attributes, explicit `Parent` relations.
    Gff3,
    /// GTF / GFF2: `key "value"` attributes, implicit gene/transcript rows.
    Gtf,
}

impl fmt::Display for Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Format::Gff3 => write!(f, "gff3"),
            Format::Gtf => write!(f, "gtf"),
        }
    }
}

impl FromStr for Format {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "gff3" => Ok(Format::Gff3),
            "gtf" => Ok(Format::Gtf),
            _ => Err(Error::InvalidInput(format!("invalid format: {}", s))),
        }
    }
}

//-----------------------------------------------------------------------------

/// The formatting conventions of the attribute column in one file.
///
/// A dialect is the only source of round-trip fidelity: parsing an attribute
/// string and rendering it back under the same dialect reproduces the
/// original text, up to percent-encoding normalization.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dialect {
    /// General format of the file.
    pub fmt: Format,

    /// Separator between key/value pairs, e.g. `";"` or `"; "`.
    pub field_separator: String,

    /// Separator between a key and its value: `"="` for GFF3, `" "` for GTF.
    pub keyval_separator: String,

    /// Separator between multiple values of one key, typically `","`.
    pub multival_separator: String,

    /// Is there a semicolon before the first key?
    pub leading_semicolon: bool,

    /// Is there a semicolon after the last value?
    pub trailing_semicolon: bool,

    /// Are values wrapped in double quotes? Usually true for GTF.
    pub quoted_values: bool,

    /// Are multiple values expressed by repeating the key, GTF-style?
    pub repeated_keys: bool,

    /// Render keys in this order. Keys not listed here keep their insertion
    /// order after the listed ones. Empty means no preferred order.
    pub order_of_attribute_keys: Vec<String>,
}

impl Default for Dialect {
    fn default() -> Self {
        Dialect::gff3()
    }
}

impl Dialect {
    /// Returns the standard GFF3 dialect.
    pub fn gff3() -> Self {
        Dialect {
            fmt: Format::Gff3,
            field_separator: String::from(";"),
            keyval_separator: String::from("="),
            multival_separator: String::from(","),
            leading_semicolon: false,
            trailing_semicolon: false,
            quoted_values: false,
            repeated_keys: false,
            order_of_attribute_keys: vec![
                String::from("ID"),
                String::from("Name"),
                String::from("gene_id"),
                String::from("transcript_id"),
            ],
        }
    }

    /// Returns the Ensembl-style GTF dialect.
    pub fn gtf() -> Self {
        Dialect {
            fmt: Format::Gtf,
            field_separator: String::from("; "),
            keyval_separator: String::from(" "),
            multival_separator: String::from(","),
            leading_semicolon: false,
            trailing_semicolon: true,
            quoted_values: true,
            repeated_keys: false,
            order_of_attribute_keys: vec![
                String::from("gene_id"),
                String::from("transcript_id"),
            ],
        }
    }

    // Does the token start with a GFF3-style `key=`?
    fn has_gff3_key(token: &str) -> bool {
        match token.find('=') {
            Some(0) | None => false,
            Some(offset) => token[..offset].chars().all(|c| c.is_alphanumeric() || c == '_'),
        }
    }

    /// Infers a dialect from a single attribute string.
    ///
    /// Returns [`None`] if the string is empty or the `.` placeholder, in
    /// which case it says nothing about the dialect.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownDialect`] if the string mixes repeated keys
    /// with comma-separated multiple values; no consistent dialect can
    /// produce such a line.
    pub fn from_attribute_string(attributes: &str) -> Result<Option<Dialect>> {
        if attributes.is_empty() || attributes == "." {
            return Ok(None);
        }
        let mut dialect = Dialect::gff3();
        dialect.order_of_attribute_keys.clear();

        // Ensembl GTF has a trailing semicolon.
        let mut attributes = attributes;
        if let Some(stripped) = attributes.strip_suffix(';') {
            attributes = stripped;
            dialect.trailing_semicolon = true;
        }

        // GFF2/GTF separates the pairs with a semicolon and at least one
        // space; the spaces can be on both sides (e.g. WormBase). GFF3 works
        // without spaces. Try the longest separator first.
        let mut tokens: Vec<&str> = vec![attributes];
        for separator in [" ; ", "; ", ";"] {
            let parts: Vec<&str> = attributes.split(separator).collect();
            if parts.len() > 1 {
                dialect.field_separator = String::from(separator);
                tokens = parts;
                break;
            }
        }

        let gff3_style = Self::has_gff3_key(tokens[0]);
        if gff3_style {
            dialect.fmt = Format::Gff3;
            dialect.keyval_separator = String::from("=");
        } else {
            dialect.keyval_separator = String::from(" ");
        }

        let mut seen: HashSet<String> = HashSet::new();
        for token in tokens {
            let mut token = token;
            let (key, mut value) = if gff3_style {
                match token.split_once('=') {
                    Some((key, value)) => (key, value),
                    None => (token, ""),
                }
            } else {
                // Fix misplaced semicolons in the keys of some GFF2 files.
                if let Some(stripped) = token.strip_prefix(';') {
                    token = stripped;
                    dialect.leading_semicolon = true;
                }
                match token.trim().split_once(' ') {
                    Some((key, value)) => (key, value),
                    None => (token.trim(), ""),
                }
            };

            if value.len() >= 2 && value.starts_with('"') && value.ends_with('"') {
                value = &value[1..value.len() - 1];
                dialect.quoted_values = true;
            }

            if !seen.insert(String::from(key)) {
                dialect.repeated_keys = true;
            } else {
                dialect.order_of_attribute_keys.push(String::from(key));
            }

            // A line cannot both repeat keys and separate multiple values
            // with commas; the two conventions are mutually exclusive.
            if !value.is_empty() && value.contains(',') && dialect.repeated_keys {
                return Err(Error::UnknownDialect);
            }
        }

        if dialect.keyval_separator == " " && dialect.quoted_values {
            dialect.fmt = Format::Gtf;
        }
        Ok(Some(dialect))
    }

    /// Chooses a dialect by field-wise majority vote over per-line dialects.
    ///
    /// Ties on the format prefer GFF3. The key order is the union of the
    /// observed orders, keeping the first occurrence of each key.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownDialect`] if there are no observed dialects.
    pub fn choose(observed: &[Dialect]) -> Result<Dialect> {
        if observed.is_empty() {
            return Err(Error::UnknownDialect);
        }

        let gtf_votes = observed.iter().filter(|d| d.fmt == Format::Gtf).count();
        let fmt = if 2 * gtf_votes > observed.len() { Format::Gtf } else { Format::Gff3 };

        let mut order: Vec<String> = Vec::new();
        for dialect in observed.iter() {
            for key in dialect.order_of_attribute_keys.iter() {
                if !order.contains(key) {
                    order.push(key.clone());
                }
            }
        }

        Ok(Dialect {
            fmt,
            field_separator: majority(observed.iter().map(|d| &d.field_separator)).clone(),
            keyval_separator: majority(observed.iter().map(|d| &d.keyval_separator)).clone(),
            multival_separator: majority(observed.iter().map(|d| &d.multival_separator)).clone(),
            leading_semicolon: *majority(observed.iter().map(|d| &d.leading_semicolon)),
            trailing_semicolon: *majority(observed.iter().map(|d| &d.trailing_semicolon)),
            quoted_values: *majority(observed.iter().map(|d| &d.quoted_values)),
            repeated_keys: *majority(observed.iter().map(|d| &d.repeated_keys)),
            order_of_attribute_keys: order,
        })
    }
}

// Returns the most common item, breaking ties by first occurrence.
fn majority<'a, T: Eq + Hash>(items: impl Iterator<Item = &'a T>) -> &'a T {
    let mut counts: HashMap<&T, usize> = HashMap::new();
    let mut order: Vec<&T> = Vec::new();
    for item in items {
        let count = counts.entry(item).or_insert(0);
        if *count == 0 {
            order.push(item);
        }
        *count += 1;
    }
    order.sort_by_key(|item| std::cmp::Reverse(counts[item]));
    order[0]
}

//-----------------------------------------------------------------------------

// Percent-encoding. GFF3 reserves some characters in attribute values and
// encodes them as %XX. We decode everything on parse but only re-encode the
// characters the format actually requires; in particular %20 decodes to a
// space that is never encoded again.

const ENCODED_CHARS: [char; 4] = [';', '=', '&', ','];

/// Decodes all `%XX` escape sequences in the string.
///
/// Invalid escape sequences are kept as literal text.
pub fn percent_decode(value: &str) -> String {
    if !value.contains('%') {
        return String::from(value);
    }
    let bytes = value.as_bytes();
    let mut result: Vec<u8> = Vec::with_capacity(bytes.len());
    let mut offset = 0;
    while offset < bytes.len() {
        if bytes[offset] == b'%' {
            let digits = bytes.get(offset + 1..offset + 3)
                .and_then(|pair| std::str::from_utf8(pair).ok())
                .and_then(|pair| u8::from_str_radix(pair, 16).ok());
            if let Some(byte) = digits {
                result.push(byte);
                offset += 3;
                continue;
            }
        }
        result.push(bytes[offset]);
        offset += 1;
    }
    String::from_utf8(result)
        .unwrap_or_else(|err| String::from_utf8_lossy(err.as_bytes()).into_owned())
}

/// Encodes the characters that the GFF3 format reserves in attribute values:
/// `;`, `=`, `&`, `,`, and control characters (including tab and newline).
pub fn percent_encode(value: &str) -> String {
    if !value.contains(|c: char| ENCODED_CHARS.contains(&c) || (c as u32) < 0x20) {
        return String::from(value);
    }
    let mut result = String::with_capacity(value.len());
    for c in value.chars() {
        if ENCODED_CHARS.contains(&c) || (c as u32) < 0x20 {
            result.push_str(&format!("%{:02X}", c as u32));
        } else {
            result.push(c);
        }
    }
    result
}

//-----------------------------------------------------------------------------

/// Parses the attribute column under a known dialect.
///
/// `decode_escapes` controls percent-decoding of GFF3 values; see
/// [`crate::IngestParams::ignore_url_escapes`].
///
/// The placeholder `.` parses as a bare key with no values, which keeps the
/// column round-trippable.
///
/// # Errors
///
/// Returns [`Error::InvalidAttributeToken`] for a GFF3 token that has no `=`
/// and does not look like a bare flag key. The caller is expected to fill in
/// the line number with [`Error::at_line`].
pub fn parse_attributes(attributes: &str, dialect: &Dialect, decode_escapes: bool) -> Result<Attributes> {
    let mut result = Attributes::new();
    if attributes.is_empty() {
        return Ok(result);
    }
    let gff3_style = dialect.keyval_separator == "=";
    let decode = decode_escapes && dialect.fmt == Format::Gff3;

    let mut attributes = attributes;
    if dialect.trailing_semicolon {
        attributes = attributes.strip_suffix(';').unwrap_or(attributes);
    }
    if dialect.leading_semicolon {
        attributes = attributes.strip_prefix(';').unwrap_or(attributes);
    }

    for token in attributes.split(dialect.field_separator.as_str()) {
        let token = if gff3_style { token } else { token.trim() };
        if token.is_empty() {
            continue;
        }

        let (key, mut value) = if gff3_style {
            match token.split_once('=') {
                Some((key, value)) => (key, value),
                None => {
                    if token.contains(char::is_whitespace) {
                        return Err(Error::InvalidAttributeToken { line: 0, token: String::from(token) });
                    }
                    (token, "")
                }
            }
        } else {
            match token.split_once(dialect.keyval_separator.as_str()) {
                Some((key, value)) => (key, value),
                None => (token, ""),
            }
        };

        if dialect.quoted_values && value.len() >= 2 && value.starts_with('"') && value.ends_with('"') {
            value = &value[1..value.len() - 1];
        }

        let values: Vec<String> = if value.is_empty() {
            Vec::new()
        } else {
            value.split(dialect.multival_separator.as_str())
                .map(|v| if decode { percent_decode(v) } else { String::from(v) })
                .collect()
        };

        if result.contains_key(key) {
            if dialect.repeated_keys {
                result.extend_values(key, values);
            } else {
                result.set(key, values);
            }
        } else {
            result.set(key, values);
        }
    }

    Ok(result)
}

//-----------------------------------------------------------------------------

/// Options that control attribute rendering.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RenderOptions {
    /// Keep the per-feature insertion order of the keys instead of the
    /// database-level order stored in the dialect.
    pub keep_order: bool,

    /// Sort the values within each key. Gives a stable rendering for
    /// comparisons; not something annotation files do themselves.
    pub sort_attribute_values: bool,

    /// Percent-encode reserved characters in GFF3 values.
    pub encode_escapes: bool,
}

impl Default for RenderOptions {
    fn default() -> Self {
        RenderOptions {
            keep_order: false,
            sort_attribute_values: false,
            encode_escapes: true,
        }
    }
}

/// Renders attributes back to the text form described by the dialect.
///
/// This is the inverse of [`parse_attributes`] whenever the dialect carries
/// the quoting, separator, and semicolon conventions of the original line.
pub fn render_attributes(attributes: &Attributes, dialect: &Dialect, options: &RenderOptions) -> String {
    if attributes.is_empty() {
        return String::new();
    }

    // A dialect with repeated keys expresses multiple values by repeating
    // the key/value pair.
    let mut items: Vec<(&str, Vec<&String>)> = Vec::new();
    for (key, values) in attributes.iter() {
        if dialect.repeated_keys && values.len() > 1 {
            for value in values.iter() {
                items.push((key, vec![value]));
            }
        } else {
            items.push((key, values.iter().collect()));
        }
    }

    if !options.keep_order && !dialect.order_of_attribute_keys.is_empty() {
        let preferred: HashMap<&str, usize> = dialect.order_of_attribute_keys.iter()
            .enumerate()
            .map(|(offset, key)| (key.as_str(), offset))
            .collect();
        items.sort_by_key(|(key, _)| preferred.get(key).copied().unwrap_or(usize::MAX));
    }

    let mut parts: Vec<String> = Vec::with_capacity(items.len());
    for (key, mut values) in items {
        if values.is_empty() {
            // A key without values: a bare flag in GFF3, an empty quoted
            // string in GTF.
            if dialect.fmt == Format::Gtf {
                parts.push(format!("{}{}\"\"", key, dialect.keyval_separator));
            } else {
                parts.push(String::from(key));
            }
            continue;
        }
        if options.sort_attribute_values {
            values.sort();
        }
        let encoded: Vec<String> = values.iter()
            .map(|value| {
                if dialect.fmt == Format::Gff3 && options.encode_escapes {
                    percent_encode(value)
                } else {
                    String::from(value.as_str())
                }
            })
            .collect();
        let mut value_str = encoded.join(&dialect.multival_separator);
        if dialect.quoted_values {
            value_str = format!("\"{}\"", value_str);
        }
        parts.push(format!("{}{}{}", key, dialect.keyval_separator, value_str));
    }

    let mut result = parts.join(&dialect.field_separator);
    if dialect.leading_semicolon {
        result.insert(0, ';');
    }
    if dialect.trailing_semicolon {
        result.push(';');
    }
    result
}

//-----------------------------------------------------------------------------
