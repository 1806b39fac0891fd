//! Read access to gzip-compressed checkpoint tarballs.
//!
//! Every call opens its own reader, so workers never share archive state.

use std::fs::File;
use std::io::{self, BufReader};
use std::path::Path;

use flate2::read::GzDecoder;
use tar::Archive;
use tracing::debug;

use crate::error::ResolutionError;

/// Marker that identifies an archive-backed source path.
pub const ARCHIVE_MARKER: &str = ".tar.gz";

pub fn is_archive(path: &Path) -> bool {
    path.to_string_lossy().contains(ARCHIVE_MARKER)
}

fn open(path: &Path) -> io::Result<Archive<GzDecoder<BufReader<File>>>> {
    let file = File::open(path)?;
    Ok(Archive::new(GzDecoder::new(BufReader::new(file))))
}

/// Names of the regular-file members, in archive order. Only headers are
/// read; member contents are skipped.
pub fn list_members(path: &Path) -> io::Result<Vec<String>> {
    let mut archive = open(path)?;
    let mut names = Vec::new();
    for entry in archive.entries()? {
        let entry = entry?;
        if !entry.header().entry_type().is_file() {
            continue;
        }
        names.push(entry.path()?.to_string_lossy().into_owned());
    }
    debug!(archive = %path.display(), members = names.len(), "listed archive");
    Ok(names)
}

/// Stream member `member` of `archive_path` into `dest`, replacing any
/// previous content.
pub fn extract_member(archive_path: &Path, member: &str, dest: &Path) -> Result<(), ResolutionError> {
    let unreadable = |source: io::Error| ResolutionError::Unreadable {
        path: archive_path.to_path_buf(),
        source,
    };

    let mut archive = open(archive_path).map_err(unreadable)?;
    for entry in archive.entries().map_err(unreadable)? {
        let mut entry = entry.map_err(unreadable)?;
        if !entry.header().entry_type().is_file() {
            continue;
        }
        let matches = entry.path().map_err(unreadable)?.to_string_lossy() == member;
        if !matches {
            continue;
        }

        let mut out = File::create(dest).map_err(|source| ResolutionError::Unreadable {
            path: dest.to_path_buf(),
            source,
        })?;
        io::copy(&mut entry, &mut out).map_err(unreadable)?;
        return Ok(());
    }

    Err(ResolutionError::MemberNotFound {
        archive: archive_path.to_path_buf(),
        member: member.to_string(),
    })
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::fs::File;
    use std::path::Path;

    use flate2::write::GzEncoder;
    use flate2::Compression;

    /// Write a `.tar.gz` holding the given `(name, contents)` members.
    pub fn write_archive(path: &Path, members: &[(&str, &[u8])]) {
        let file = File::create(path).unwrap();
        let mut builder = tar::Builder::new(GzEncoder::new(file, Compression::default()));
        for (name, data) in members {
            let mut header = tar::Header::new_gnu();
            header.set_size(data.len() as u64);
            header.set_mode(0o644);
            header.set_cksum();
            builder.append_data(&mut header, name, *data).unwrap();
        }
        builder.into_inner().unwrap().finish().unwrap();
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::write_archive;
    use super::*;

    #[test]
    fn archive_detection() {
        assert!(is_archive(Path::new("runs/checkpoints.tar.gz")));
        assert!(!is_archive(Path::new("runs/chkpt-1.json")));
    }

    #[test]
    fn lists_members_in_archive_order() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("c.tar.gz");
        write_archive(
            &path,
            &[("chkpt-10.json", b"{}"), ("chkpt-2.json", b"[]")],
        );

        let names = list_members(&path).unwrap();
        assert_eq!(names, vec!["chkpt-10.json", "chkpt-2.json"]);
    }

    #[test]
    fn extracts_requested_member() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("c.tar.gz");
        write_archive(
            &path,
            &[("chkpt-0.json", b"{\"a\": 0}"), ("chkpt-1.json", b"{\"a\": 1}")],
        );

        let dest = dir.path().join("scratch.json");
        extract_member(&path, "chkpt-1.json", &dest).unwrap();
        assert_eq!(std::fs::read_to_string(&dest).unwrap(), "{\"a\": 1}");
    }

    #[test]
    fn missing_member_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("c.tar.gz");
        write_archive(&path, &[("chkpt-0.json", b"{}")]);

        let err = extract_member(&path, "chkpt-9.json", &dir.path().join("x.json")).unwrap_err();
        assert!(matches!(err, ResolutionError::MemberNotFound { ref member, .. } if member == "chkpt-9.json"));
    }

    #[test]
    fn missing_archive_is_unreadable() {
        let dir = tempfile::tempdir().unwrap();
        let err = extract_member(&dir.path().join("none.tar.gz"), "a.json", &dir.path().join("x"))
            .unwrap_err();
        assert!(matches!(err, ResolutionError::Unreadable { .. }));
    }
}
