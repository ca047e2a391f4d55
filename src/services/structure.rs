//! Archive structure extraction.
//!
//! Turns a zip archive's internal path list into the nested directory tree
//! stored with each project. Decoding the container is the `zip` crate's
//! job; this module only consumes the (path, is-directory) pairs.

use crate::models::tree::TreeNode;
use std::io::Cursor;
use zip::ZipArchive;
use zip::result::ZipResult;

/// Resource-fork folder macOS embeds in zip archives.
const SYSTEM_FOLDER_PREFIX: &str = "__MACOSX";

/// Build a directory tree from `(path, is_directory)` entries.
///
/// Directory markers are skipped. An entry is discarded wholesale when any
/// of its `/`-separated segments starts with `__MACOSX` or a dot (hidden
/// file convention). Insertion is commutative, so the order of entries
/// does not affect the resulting tree; empty or malformed input yields an
/// empty tree.
pub fn build_tree<'a, I>(entries: I) -> TreeNode
where
    I: IntoIterator<Item = (&'a str, bool)>,
{
    let mut tree = TreeNode::empty();
    for (path, is_directory) in entries {
        if is_directory {
            continue;
        }
        let segments: Vec<&str> = path
            .split('/')
            .filter(|segment| !segment.is_empty())
            .collect();
        if segments.is_empty() || segments.iter().any(|segment| is_excluded(segment)) {
            continue;
        }
        tree.insert_file(&segments);
    }
    tree
}

fn is_excluded(segment: &str) -> bool {
    segment.starts_with(SYSTEM_FOLDER_PREFIX) || segment.starts_with('.')
}

/// Decode `bytes` as a zip archive and extract its structure tree.
pub fn structure_from_zip(bytes: &[u8]) -> ZipResult<TreeNode> {
    let mut archive = ZipArchive::new(Cursor::new(bytes))?;
    let mut entries = Vec::with_capacity(archive.len());
    for index in 0..archive.len() {
        let entry = archive.by_index(index)?;
        entries.push((entry.name().to_string(), entry.is_dir()));
    }
    Ok(build_tree(
        entries.iter().map(|(path, is_dir)| (path.as_str(), *is_dir)),
    ))
}
