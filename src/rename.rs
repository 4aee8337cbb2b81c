// Rename planning
//
// A rename only re-links one entry under a new parent and/or name. Inode ids
// of the entry and everything below it are unchanged, so the lease table is
// never consulted or updated here.

use crate::namespace::{path, NamespaceTree};
use crate::prelude::*;

/// Where a rename moves its source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenamePlan {
    pub id: InodeId,
    pub new_parent: InodeId,
    pub new_name: String,
}

/// Works out the effect of `rename(src, dst)` without changing the tree.
///
/// - `dst` is an existing directory: `src` moves into it under its own name
/// - `dst` is an existing file: `DestinationExists`
/// - `dst` is missing but its parent exists: `src` takes the name of `dst`
/// - `dst`'s parent is missing too: `src` lands under the closest existing
///   ancestor of `dst`, named after the last segment of `dst`
///
/// Returns `Ok(None)` when `src` and `dst` name the same entry.
pub fn plan_rename(tree: &NamespaceTree, src: &str, dst: &str) -> Result<Option<RenamePlan>> {
    let src_segments = path::split(src)?;
    let id = match tree.resolve_segments(&src_segments) {
        Ok(id) => id,
        Err(Error::PathNotFound { .. }) | Err(Error::NotADirectory { .. }) => {
            return Err(Error::SourceNotFound {
                path: src.to_string(),
            })
        }
        Err(e) => return Err(e),
    };
    if id == InodeId::ROOT {
        return Err(invalid(src, dst, "the root cannot be moved"));
    }

    let dst_segments = path::split(dst)?;
    let (new_parent, new_name) = match tree.resolve_segments(&dst_segments) {
        Ok(existing) if existing == id => return Ok(None),
        Ok(existing) => {
            let target = tree.get(existing).ok_or_else(|| Error::PathNotFound {
                path: dst.to_string(),
            })?;
            if !target.is_dir() {
                return Err(Error::DestinationExists {
                    path: dst.to_string(),
                });
            }
            let name = src_segments
                .last()
                .map(|s| s.to_string())
                .unwrap_or_default();
            (existing, name)
        }
        Err(Error::PathNotFound { .. }) => {
            let (parent_segments, leaf) = path::split_parent(dst)?;
            path::validate_name(leaf)?;
            let (ancestor, depth) = tree.closest_ancestor(&parent_segments)?;
            if depth < parent_segments.len() {
                debug!(
                    src,
                    dst,
                    ancestor = %ancestor,
                    "rename destination parent missing, using closest ancestor"
                );
            }
            (ancestor, leaf.to_string())
        }
        Err(e) => return Err(e),
    };

    if tree.is_ancestor(id, new_parent) {
        return Err(invalid(src, dst, "destination is inside the source"));
    }
    if tree.child(new_parent, &new_name).is_some() {
        return Err(Error::DestinationExists {
            path: path::join(&tree.path_of(new_parent).unwrap_or_default(), &new_name),
        });
    }

    Ok(Some(RenamePlan {
        id,
        new_parent,
        new_name,
    }))
}

fn invalid(src: &str, dst: &str, reason: &'static str) -> Error {
    Error::InvalidRename {
        src: src.to_string(),
        dst: dst.to_string(),
        reason,
    }
}
