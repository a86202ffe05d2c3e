//! Loading persisted priors.
//!
//! A prior is a CSV file with a header row followed by `joint-key,weight`
//! rows. The weight is the last column; everything before the last comma is
//! the key, so joint keys may contain commas. A key wrapped in double quotes
//! is unquoted (`""` inside becomes `"`).

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use crate::error::{Error, Result};
use crate::multinomial::MutableMultinomial;

/// Read prior rows into a distribution keyed by joint key.
pub fn load_prior<R: BufRead>(reader: R) -> Result<MutableMultinomial<String>> {
    let mut prior = MutableMultinomial::new();
    let mut header_seen = false;
    for (i, line) in reader.lines().enumerate() {
        let line = line?;
        let lineno = i + 1;
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        if !header_seen {
            header_seen = true;
            continue;
        }
        let (key, weight) = trimmed
            .rsplit_once(',')
            .ok_or_else(|| Error::prior(lineno, "expected `key,weight`"))?;
        let weight: f64 = weight
            .trim()
            .parse()
            .map_err(|e| Error::prior(lineno, format!("bad weight {weight:?}: {e}")))?;
        prior
            .add(unquote(key.trim()), weight)
            .map_err(|e| Error::prior(lineno, e.to_string()))?;
    }
    Ok(prior)
}

/// [`load_prior`] from a file.
pub fn load_prior_file(path: impl AsRef<Path>) -> Result<MutableMultinomial<String>> {
    load_prior(BufReader::new(File::open(path)?))
}

fn unquote(key: &str) -> String {
    match key.strip_prefix('"').and_then(|k| k.strip_suffix('"')) {
        Some(inner) => inner.replace("\"\"", "\""),
        None => key.to_string(),
    }
}
