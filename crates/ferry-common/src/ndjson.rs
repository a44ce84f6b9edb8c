//! Gzip-compressed newline-delimited JSON files
//!
//! One JSON value per line, the whole stream gzip-compressed. Files written
//! by [`write_gz`] replace their target atomically: rows are encoded into a
//! temporary file in the destination directory which is renamed over the
//! target only after the gzip trailer has been flushed and synced.

use crate::error::{CommonError, Result};
use flate2::read::MultiGzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, ErrorKind, Write};
use std::path::Path;
use tracing::debug;

/// Read every row of a gzip ND-JSON file.
///
/// Returns `Ok(None)` when the file does not exist. Blank lines are skipped.
pub fn read_gz<T: DeserializeOwned>(path: impl AsRef<Path>) -> Result<Option<Vec<T>>> {
    let path = path.as_ref();
    let file = match File::open(path) {
        Ok(file) => file,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(CommonError::io(path, e)),
    };

    let reader = BufReader::new(MultiGzDecoder::new(BufReader::new(file)));
    let mut rows = Vec::new();

    for (idx, line) in reader.lines().enumerate() {
        let line = line.map_err(|e| CommonError::io(path, e))?;
        if line.trim().is_empty() {
            continue;
        }
        let row = serde_json::from_str(&line).map_err(|source| CommonError::MalformedLine {
            path: path.to_path_buf(),
            line: idx + 1,
            source,
        })?;
        rows.push(row);
    }

    debug!(path = %path.display(), rows = rows.len(), "Read gzip ND-JSON file");
    Ok(Some(rows))
}

/// Write rows to a gzip ND-JSON file, replacing any previous file atomically.
///
/// Returns the number of rows written.
pub fn write_gz<'a, T, I>(path: impl AsRef<Path>, rows: I) -> Result<usize>
where
    T: Serialize + 'a,
    I: IntoIterator<Item = &'a T>,
{
    let path = path.as_ref();
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };

    let tmp = tempfile::NamedTempFile::new_in(dir).map_err(|e| CommonError::io(dir, e))?;
    let mut encoder = GzEncoder::new(BufWriter::new(tmp), Compression::default());

    let mut count = 0;
    for row in rows {
        serde_json::to_writer(&mut encoder, row)?;
        encoder
            .write_all(b"\n")
            .map_err(|e| CommonError::io(path, e))?;
        count += 1;
    }

    let writer = encoder.finish().map_err(|e| CommonError::io(path, e))?;
    let tmp = writer
        .into_inner()
        .map_err(|e| CommonError::io(path, e.into_error()))?;
    tmp.as_file()
        .sync_all()
        .map_err(|e| CommonError::io(path, e))?;
    tmp.persist(path).map_err(|e| CommonError::io(path, e.error))?;

    debug!(path = %path.display(), rows = count, "Wrote gzip ND-JSON file");
    Ok(count)
}
