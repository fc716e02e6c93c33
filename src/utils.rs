//! Utility functions for files, remote inputs, and temporary names.

use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::io::{BufRead, BufReader, Read};
use std::sync::atomic::{AtomicUsize, Ordering};

use flate2::read::MultiGzDecoder;

use crate::error::Result;

//-----------------------------------------------------------------------------

/// Returns the full file name for a specific test file.
pub fn get_test_data(filename: &'static str) -> PathBuf {
    let mut buf = PathBuf::from(env!("CARGO_MANIFEST_DIR"));
    buf.push("test-data");
    buf.push(filename);
    buf
}

static TEMP_FILE_COUNTER: AtomicUsize = AtomicUsize::new(0);

/// Returns a name for a temporary file that does not collide with other
/// names returned by this function in the same process.
pub fn temp_file_name(name_part: &str) -> PathBuf {
    let count = TEMP_FILE_COUNTER.fetch_add(1, Ordering::SeqCst);
    let mut buf = std::env::temp_dir();
    buf.push(format!("{}_{}_{}", name_part, std::process::id(), count));
    buf
}

//-----------------------------------------------------------------------------

// Utilities for working with files.

const SIZE_UNITS: [(f64, &str); 6] = [
    (1.0, "B"),
    (1024.0, "KiB"),
    (1024.0 * 1024.0, "MiB"),
    (1024.0 * 1024.0 * 1024.0, "GiB"),
    (1024.0 * 1024.0 * 1024.0 * 1024.0, "TiB"),
    (1024.0 * 1024.0 * 1024.0 * 1024.0 * 1024.0, "PiB"),
];

/// Returns a human-readable representation of the given number of bytes.
pub fn human_readable_size(bytes: usize) -> String {
    let mut unit = 0;
    let value = bytes as f64;
    while unit + 1 < SIZE_UNITS.len() && value >= SIZE_UNITS[unit + 1].0 {
        unit += 1;
    }
    format!("{:.3} {}", value / SIZE_UNITS[unit].0, SIZE_UNITS[unit].1)
}

/// Returns a human-readable size of the file.
pub fn file_size<P: AsRef<Path>>(filename: P) -> Option<String> {
    let metadata = fs::metadata(filename).ok()?;
    Some(human_readable_size(metadata.len() as usize))
}

/// Returns `true` if the file exists.
pub fn file_exists<P: AsRef<Path>>(filename: P) -> bool {
    fs::metadata(filename).is_ok()
}

/// Returns `true` if the file appears to be gzip-compressed.
pub fn is_gzipped<P: AsRef<Path>>(filename: P) -> bool {
    let file = File::open(filename).ok();
    if file.is_none() {
        return false;
    }
    let mut reader = BufReader::new(file.unwrap());
    let mut magic = [0; 2];
    let len = reader.read(&mut magic).ok();
    len == Some(2) && magic == [0x1F, 0x8B]
}

/// Returns a buffered reader for the file, which may be gzip-compressed.
pub fn open_file<P: AsRef<Path>>(filename: P) -> Result<Box<dyn BufRead>> {
    let file = File::open(&filename)?;
    let inner = BufReader::new(file);
    if is_gzipped(&filename) {
        let inner = MultiGzDecoder::new(inner);
        Ok(Box::new(BufReader::new(inner)))
    } else {
        Ok(Box::new(inner))
    }
}

//-----------------------------------------------------------------------------

// Utilities for working with remote inputs.

/// Returns `true` if the string looks like a remote URL we can stream.
pub fn is_url(data: &str) -> bool {
    data.starts_with("http://") || data.starts_with("https://")
}

/// Returns a buffered reader streaming the given URL.
///
/// URLs with a `.gz` suffix are decompressed on the fly.
/// The connection is closed when the reader is dropped.
pub fn open_url(url: &str) -> Result<Box<dyn BufRead>> {
    let response = reqwest::blocking::get(url)?;
    let response = response.error_for_status()?;
    if url.ends_with(".gz") {
        let inner = MultiGzDecoder::new(BufReader::new(response));
        Ok(Box::new(BufReader::new(inner)))
    } else {
        Ok(Box::new(BufReader::new(response)))
    }
}

//-----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    use std::io::Write;

    #[test]
    fn gzipped_reader() {
        let filename = temp_file_name("utils");
        {
            let file = File::create(&filename).unwrap();
            let mut encoder = flate2::write::GzEncoder::new(file, flate2::Compression::default());
            encoder.write_all(b"first line\nsecond line\n").unwrap();
            encoder.finish().unwrap();
        }
        assert!(is_gzipped(&filename), "Did not recognize a gzip-compressed file");

        let reader = open_file(&filename);
        assert!(reader.is_ok(), "Failed to open the file: {}", reader.err().unwrap());
        let lines: Vec<String> = reader.unwrap().lines().map(|x| x.unwrap()).collect();
        assert_eq!(lines, vec!["first line", "second line"], "Wrong decompressed contents");

        let _ = fs::remove_file(&filename);
    }

    #[test]
    fn url_detection() {
        assert!(is_url("https://example.com/annotation.gff3.gz"), "Did not recognize an HTTPS URL");
        assert!(is_url("http://example.com/annotation.gtf"), "Did not recognize an HTTP URL");
        assert!(!is_url("annotation.gff3"), "A file name should not look like a URL");
        assert!(!is_url("ftp://example.com/annotation.gff3"), "FTP is not supported");
    }
}

//-----------------------------------------------------------------------------
