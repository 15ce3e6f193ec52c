//! Plugin directory layout
//!
//! Every plugin lives in `<root>/<slug>`.

use std::path::{Path, PathBuf};

use crate::Result;
use crate::domain::lifecycle::PluginPaths;
use crate::domain::plugin::validate_slug;

/// Resolves slugs to directories under a single plugins root
#[derive(Debug, Clone)]
pub struct PluginDirectory {
    root: PathBuf,
}

impl PluginDirectory {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl PluginPaths for PluginDirectory {
    fn plugin_dir(&self, slug: &str) -> Result<PathBuf> {
        validate_slug(slug)?;
        Ok(self.root.join(slug))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Error;

    #[test]
    fn test_plugin_dir_joins_slug() {
        let paths = PluginDirectory::new("/srv/plugins");
        assert_eq!(
            paths.plugin_dir("contact-form").unwrap(),
            PathBuf::from("/srv/plugins/contact-form")
        );
        assert_eq!(paths.root(), Path::new("/srv/plugins"));
    }

    #[test]
    fn test_plugin_dir_rejects_escapes() {
        let paths = PluginDirectory::new("/srv/plugins");
        for slug in ["", "..", "../etc", "a/b", "a\\b"] {
            assert!(
                matches!(paths.plugin_dir(slug), Err(Error::InvalidSlug(_))),
                "slug {:?} should be rejected",
                slug
            );
        }
    }
}
