//! Job source: turns checkpoint names into an ordered list of work items.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

use chkpt_core::WorkItem;
use tracing::info;

use crate::archive;
use crate::error::{InputError, ParseError};

const CHECKPOINT_EXTENSION: &str = ".json";
const KEY_SEPARATOR: char = '-';

/// Extract the integer order key from a `...-<digits>.json` identifier.
///
/// Everything from the first `.json` on is dropped, the remainder is split
/// on `-`, and the last token must parse as an unsigned integer.
pub fn parse_order_key(identifier: &str) -> Result<u64, ParseError> {
    let fail = |reason: &str| ParseError {
        identifier: identifier.to_string(),
        reason: reason.to_string(),
    };

    let stem = match identifier.find(CHECKPOINT_EXTENSION) {
        Some(pos) => &identifier[..pos],
        None => return Err(fail("missing .json extension")),
    };
    let token = stem
        .rsplit(KEY_SEPARATOR)
        .next()
        .filter(|t| !t.is_empty())
        .ok_or_else(|| fail("empty trailing token"))?;
    if !token.bytes().all(|b| b.is_ascii_digit()) {
        return Err(fail(&format!("trailing token '{token}' is not an integer")));
    }
    token.parse().map_err(|_| fail(&format!("trailing token '{token}' out of range")))
}

/// Where checkpoints come from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobSource {
    /// Members of one gzip-compressed tarball.
    Archive(PathBuf),
    /// Loose checkpoint files.
    Files(Vec<PathBuf>),
}

impl JobSource {
    /// Archive-backed when the first path looks like a `.tar.gz`,
    /// otherwise every path is a loose checkpoint.
    pub fn from_paths(paths: &[PathBuf]) -> Result<Self, InputError> {
        let first = paths.first().ok_or(InputError::NoSources)?;
        if archive::is_archive(first) {
            Ok(Self::Archive(first.clone()))
        } else {
            Ok(Self::Files(paths.to_vec()))
        }
    }

    pub fn archive_path(&self) -> Option<&Path> {
        match self {
            Self::Archive(path) => Some(path),
            Self::Files(_) => None,
        }
    }

    fn identifiers(&self) -> Result<Vec<String>, InputError> {
        match self {
            Self::Archive(path) => {
                let members = archive::list_members(path).map_err(|source| InputError::Archive {
                    path: path.clone(),
                    source,
                })?;
                Ok(members
                    .into_iter()
                    .filter(|m| m.ends_with(CHECKPOINT_EXTENSION))
                    .collect())
            }
            Self::Files(paths) => Ok(paths
                .iter()
                .map(|p| p.to_string_lossy().into_owned())
                .collect()),
        }
    }

    /// Build the work items, indexed by ascending order key.
    pub fn work_items(&self) -> Result<Vec<WorkItem>, InputError> {
        let identifiers = self.identifiers()?;
        let items = order_identifiers(identifiers)?;
        info!(items = items.len(), source = ?self.archive_path(), "work items prepared");
        Ok(items)
    }
}

/// Deduplicate, parse and sort identifiers, then assign indices.
pub fn order_identifiers<I>(identifiers: I) -> Result<Vec<WorkItem>, InputError>
where
    I: IntoIterator<Item = String>,
{
    let mut seen = HashSet::new();
    let mut keyed: Vec<(u64, String)> = Vec::new();
    let mut by_key: HashMap<u64, String> = HashMap::new();

    for identifier in identifiers {
        if !seen.insert(identifier.clone()) {
            continue;
        }
        let key = parse_order_key(&identifier)?;
        if let Some(first) = by_key.insert(key, identifier.clone()) {
            return Err(InputError::DuplicateOrderKey {
                order_key: key,
                first,
                second: identifier,
            });
        }
        keyed.push((key, identifier));
    }

    keyed.sort_unstable_by_key(|(key, _)| *key);
    Ok(keyed
        .into_iter()
        .enumerate()
        .map(|(index, (order_key, source_identifier))| WorkItem {
            index,
            source_identifier,
            order_key,
        })
        .collect())
}
