//! Content-derived names for staged files and datasource directories.

use std::path::Path;

use sha2::{Digest, Sha256};

use probs_runner_engine::FileSource;
use probs_runner_shared::{ProbsError, Result};

/// Lowercase hex SHA-256 of `bytes`.
pub fn content_hash(bytes: &[u8]) -> String {
    format!("{:x}", Sha256::digest(bytes))
}

/// File name for a block of fact text: `<hash>.ttl`.
pub fn facts_file_name(facts: &str) -> String {
    format!("{}.ttl", content_hash(facts.as_bytes()))
}

/// Directory name for a datasource, hashed over the identities of its
/// sources in order.
pub fn datasource_name<'a>(sources: impl IntoIterator<Item = &'a FileSource>) -> String {
    let mut hasher = Sha256::new();
    for source in sources {
        hasher.update(source.identity());
    }
    format!("{:x}", hasher.finalize())
}

/// Staged name for a raw input file: `<hash of absolute path>_<base name>`.
pub fn staged_input_name(path: &Path) -> Result<String> {
    let base = path
        .file_name()
        .and_then(|name| name.to_str())
        .ok_or_else(|| {
            ProbsError::invalid_input(format!("{} has no usable file name", path.display()))
        })?;
    let absolute = std::path::absolute(path).map_err(|e| ProbsError::io(path, e))?;
    let hash = content_hash(absolute.as_os_str().as_encoded_bytes());
    Ok(format!("{hash}_{base}"))
}
