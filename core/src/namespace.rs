//! Splits a path into components, walks the single root directory, and
//! expands symbolic links, matching the original system's `namex`-style
//! resolver but over a flat, single-directory namespace (section 4.7).

use std::collections::VecDeque;

use crate::descriptor::Tag;
use crate::error::{FsError, Result};
use crate::store::FileStore;

const MAX_SYMLINK_EXPANSIONS: u32 = 16;
const ROOT: usize = 0;

/// `parent` and `target` are both `None` when the path is outright invalid
/// (a missing non-final component, or a non-directory in the middle of the
/// path). `path_exists()`/`path_missing()` mirror the convention in 4.7.
pub struct Resolution {
    pub parent: Option<usize>,
    pub target: Option<usize>,
    pub name: String,
}

impl Resolution {
    pub fn path_exists(&self) -> bool {
        self.parent.is_some() && self.target.is_some()
    }

    pub fn path_missing(&self) -> bool {
        !self.path_exists()
    }
}

fn split_components(path: &str) -> VecDeque<String> {
    path.split('/')
        .filter(|c| !c.is_empty())
        .map(String::from)
        .collect()
}

impl<'a> FileStore<'a> {
    /// Resolves `path` against this store's directory and descriptor table.
    /// `follow_last` controls whether a symlink in the final position is
    /// expanded or returned as-is (the "don't follow" case in 4.7).
    pub fn resolve(&self, path: &str, follow_last: bool) -> Result<Resolution> {
        if path == "/" {
            return Ok(Resolution {
                parent: Some(ROOT),
                target: Some(ROOT),
                name: String::new(),
            });
        }

        let mut components = split_components(path);
        let mut current = ROOT;
        let mut expansions = 0u32;

        while let Some(component) = components.pop_front() {
            let is_last = components.is_empty();
            let found = self.dir.lookup(&component);

            let index = match found {
                None if is_last => {
                    return Ok(Resolution {
                        parent: Some(current),
                        target: None,
                        name: component,
                    });
                }
                None => {
                    return Ok(Resolution {
                        parent: None,
                        target: None,
                        name: component,
                    });
                }
                Some(index) => index,
            };

            let tag = self.descriptors.get(index)?.tag;
            match tag {
                Tag::Dir => {
                    current = index;
                    if is_last {
                        return Ok(Resolution {
                            parent: Some(current),
                            target: Some(current),
                            name: component,
                        });
                    }
                }
                Tag::Symlink if is_last && !follow_last => {
                    return Ok(Resolution {
                        parent: Some(current),
                        target: Some(index),
                        name: component,
                    });
                }
                Tag::Symlink => {
                    expansions += 1;
                    if expansions > MAX_SYMLINK_EXPANSIONS {
                        return Err(FsError::SymlinkLoop);
                    }
                    let target_text = self.read_symlink_target(index)?;
                    if target_text.starts_with('/') {
                        current = ROOT;
                    }
                    let mut target_components = split_components(&target_text);
                    while let Some(c) = target_components.pop_back() {
                        components.push_front(c);
                    }
                }
                Tag::Regular => {
                    if is_last {
                        return Ok(Resolution {
                            parent: Some(current),
                            target: Some(index),
                            name: component,
                        });
                    }
                    return Ok(Resolution {
                        parent: None,
                        target: None,
                        name: component,
                    });
                }
                Tag::Free => {
                    debug_assert!(false, "hard-link entry pointed at a free descriptor");
                    return Err(FsError::NoSuchPath(component));
                }
            }
        }

        Ok(Resolution {
            parent: Some(current),
            target: Some(current),
            name: String::new(),
        })
    }
}
