//! Nested directory-tree representation stored with each project.

use serde::de::{self, MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::BTreeMap;
use std::fmt;

/// Sentinel used for file leaves in the serialized tree.
const FILE_MARKER: &str = "file";

/// One node of an archive's directory tree.
///
/// Serializes to the catalog's metadata format: a directory is a JSON
/// object keyed by entry name, a file is the string `"file"`. The child
/// map is ordered so the serialized form is deterministic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TreeNode {
    File,
    Directory(BTreeMap<String, TreeNode>),
}

impl TreeNode {
    /// An empty directory, also the tree root before any insertion.
    pub fn empty() -> Self {
        TreeNode::Directory(BTreeMap::new())
    }

    pub fn is_empty(&self) -> bool {
        match self {
            TreeNode::File => false,
            TreeNode::Directory(children) => children.is_empty(),
        }
    }

    /// Insert a file at `segments`, creating intermediate directories as
    /// needed. Existing nodes are never overwritten: an entry that would
    /// descend through a file leaf is dropped.
    pub fn insert_file(&mut self, segments: &[&str]) {
        let Some((leaf, directories)) = segments.split_last() else {
            return;
        };
        let TreeNode::Directory(root) = self else {
            return;
        };

        let mut cursor = root;
        for segment in directories {
            let entry = cursor
                .entry((*segment).to_string())
                .or_insert_with(TreeNode::empty);
            match entry {
                TreeNode::Directory(children) => cursor = children,
                TreeNode::File => return,
            }
        }
        cursor.entry((*leaf).to_string()).or_insert(TreeNode::File);
    }
}

impl Default for TreeNode {
    fn default() -> Self {
        TreeNode::empty()
    }
}

impl Serialize for TreeNode {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            TreeNode::File => serializer.serialize_str(FILE_MARKER),
            TreeNode::Directory(children) => {
                let mut map = serializer.serialize_map(Some(children.len()))?;
                for (name, node) in children {
                    map.serialize_entry(name, node)?;
                }
                map.end()
            }
        }
    }
}

impl<'de> Deserialize<'de> for TreeNode {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct NodeVisitor;

        impl<'de> Visitor<'de> for NodeVisitor {
            type Value = TreeNode;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a directory map or a file marker string")
            }

            fn visit_str<E: de::Error>(self, _value: &str) -> Result<TreeNode, E> {
                Ok(TreeNode::File)
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<TreeNode, A::Error> {
                let mut children = BTreeMap::new();
                while let Some((name, node)) = access.next_entry::<String, TreeNode>()? {
                    children.insert(name, node);
                }
                Ok(TreeNode::Directory(children))
            }
        }

        deserializer.deserialize_any(NodeVisitor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serializes_files_as_marker_and_directories_as_maps() {
        let mut tree = TreeNode::empty();
        tree.insert_file(&["src", "index.js"]);
        tree.insert_file(&["README.md"]);

        let json = serde_json::to_string(&tree).unwrap();
        assert_eq!(json, r#"{"README.md":"file","src":{"index.js":"file"}}"#);
    }

    #[test]
    fn empty_tree_serializes_to_empty_object() {
        assert_eq!(serde_json::to_string(&TreeNode::empty()).unwrap(), "{}");
    }

    #[test]
    fn round_trips_through_json() {
        let mut tree = TreeNode::empty();
        tree.insert_file(&["src", "components", "Button.js"]);
        tree.insert_file(&["src", "index.js"]);

        let json = serde_json::to_string(&tree).unwrap();
        let parsed: TreeNode = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, tree);
    }

    #[test]
    fn does_not_descend_through_file_leaves() {
        let mut tree = TreeNode::empty();
        tree.insert_file(&["config"]);
        tree.insert_file(&["config", "nested.js"]);

        let json = serde_json::to_string(&tree).unwrap();
        assert_eq!(json, r#"{"config":"file"}"#);
    }
}
