//! Filesystem template source

use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};

use stencil_core::TemplateDecl;

use crate::error::{RegistryError, Result};
use crate::source::TemplateSource;

/// Template types this source knows how to read
const FILE_TYPES: &[&str] = &["", "file"];

/// Reads templates from a directory
///
/// A declaration's `source` is a path relative to the root. Declarations
/// without a source fall back to `<name>.yml`. Paths that leave the root,
/// through `..` or through a symlink, are refused.
#[derive(Debug, Clone)]
pub struct FileSource {
    root: PathBuf,
}

impl FileSource {
    pub fn new(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        if !root.is_dir() {
            return Err(RegistryError::RootNotFound { path: root });
        }
        let root = root
            .canonicalize()
            .map_err(|source| RegistryError::Read { path: root, source })?;
        Ok(Self { root })
    }

    /// Canonical root directory
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, template: &TemplateDecl) -> Result<PathBuf> {
        let relative = if template.source.is_empty() {
            PathBuf::from(format!("{}.yml", template.name))
        } else {
            PathBuf::from(template.source.trim_start_matches("file://"))
        };

        let escapes = relative.components().any(|c| {
            matches!(
                c,
                Component::ParentDir | Component::RootDir | Component::Prefix(_)
            )
        });
        if escapes {
            return Err(RegistryError::OutsideRoot { path: relative });
        }

        let path = match self.root.join(&relative).canonicalize() {
            Ok(path) => path,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(RegistryError::TemplateNotFound {
                    name: template.reference(),
                });
            }
            Err(source) => return Err(RegistryError::Read { path: relative, source }),
        };
        if !path.starts_with(&self.root) {
            return Err(RegistryError::OutsideRoot { path: relative });
        }

        Ok(path)
    }
}

impl TemplateSource for FileSource {
    fn name(&self) -> &str {
        "file"
    }

    fn fetch(&self, template: &TemplateDecl) -> Result<String> {
        if !FILE_TYPES.contains(&template.kind.as_str()) {
            return Err(RegistryError::UnsupportedType {
                name: template.name.clone(),
                kind: template.kind.clone(),
            });
        }

        let path = self.resolve(template)?;
        tracing::debug!(template = %template.name, path = %path.display(), "reading template");

        std::fs::read_to_string(&path).map_err(|source| match source.kind() {
            ErrorKind::NotFound => RegistryError::TemplateNotFound {
                name: template.reference(),
            },
            _ => RegistryError::Read { path, source },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn decl(name: &str, source: &str, kind: &str) -> TemplateDecl {
        TemplateDecl {
            name: name.to_string(),
            source: source.to_string(),
            kind: kind.to_string(),
        }
    }

    fn registry() -> (TempDir, FileSource) {
        let dir = TempDir::new().unwrap();
        fs::create_dir(dir.path().join("templates")).unwrap();
        fs::write(dir.path().join("templates/go.yml"), "steps: []\n").unwrap();
        fs::write(dir.path().join("node.yml"), "steps: []\n").unwrap();
        fs::write(dir.path().join("README.md"), "ignored").unwrap();
        let source = FileSource::new(dir.path()).unwrap();
        (dir, source)
    }

    #[test]
    fn test_fetch_by_source() {
        let (_dir, source) = registry();
        let body = source.fetch(&decl("golang", "templates/go.yml", "file")).unwrap();
        assert_eq!(body, "steps: []\n");
    }

    #[test]
    fn test_fetch_by_name() {
        let (_dir, source) = registry();
        assert!(source.fetch(&decl("node", "", "")).is_ok());
    }

    #[test]
    fn test_fetch_missing() {
        let (_dir, source) = registry();
        let err = source.fetch(&decl("rust", "rust.yml", "file")).unwrap_err();
        assert!(matches!(err, RegistryError::TemplateNotFound { .. }));
    }

    #[test]
    fn test_refuses_parent_dir() {
        let (_dir, source) = registry();
        let err = source.fetch(&decl("x", "../etc/passwd", "file")).unwrap_err();
        assert!(matches!(err, RegistryError::OutsideRoot { .. }));
    }

    #[test]
    fn test_unsupported_type() {
        let (_dir, source) = registry();
        let err = source.fetch(&decl("x", "go.yml", "github")).unwrap_err();
        assert!(matches!(err, RegistryError::UnsupportedType { .. }));
    }

    #[cfg(unix)]
    #[test]
    fn test_refuses_symlink_out_of_root() {
        let (dir, source) = registry();
        let outside = TempDir::new().unwrap();
        fs::write(outside.path().join("secret.yml"), "token: hunter2\n").unwrap();
        std::os::unix::fs::symlink(
            outside.path().join("secret.yml"),
            dir.path().join("templates/leak.yml"),
        )
        .unwrap();

        let err = source.fetch(&decl("leak", "templates/leak.yml", "file")).unwrap_err();
        assert!(matches!(err, RegistryError::OutsideRoot { .. }));
    }

    #[cfg(unix)]
    #[test]
    fn test_follows_symlink_inside_root() {
        let (dir, source) = registry();
        std::os::unix::fs::symlink(
            dir.path().join("templates/go.yml"),
            dir.path().join("golang.yml"),
        )
        .unwrap();

        assert_eq!(source.fetch(&decl("golang", "", "")).unwrap(), "steps: []\n");
    }

    #[test]
    fn test_missing_root() {
        let err = FileSource::new("/definitely/not/here").unwrap_err();
        assert!(matches!(err, RegistryError::RootNotFound { .. }));
    }
}
