//! Output path resolution

use std::fs;
use std::path::{Path, PathBuf};

use crate::{Error, Result};

/// Resolved destination of the poster image
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputSpec {
    pub path: PathBuf,
}

/// Decides where the image is written.
///
/// Relative names and names derived from the input land in `dir`, which
/// defaults to `~/Downloads/markout`.
#[derive(Debug, Clone)]
pub struct OutputResolver {
    dir: PathBuf,
}

impl OutputResolver {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Resolver rooted at `~/Downloads/markout`.
    pub fn with_default_dir() -> Result<Self> {
        Ok(Self::new(default_output_dir()?))
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Resolve the image path for `input`.
    ///
    /// An absolute `output_arg` is used verbatim, a relative one is placed in
    /// the output directory, and without one the input's stem gets a `.png`
    /// extension. Missing parent directories are created; existing ones are
    /// fine, so repeated calls return the same path.
    pub fn resolve(&self, input: &Path, output_arg: Option<&str>) -> Result<OutputSpec> {
        let path = match output_arg.filter(|arg| !arg.is_empty()) {
            Some(arg) if Path::new(arg).is_absolute() => PathBuf::from(arg),
            Some(arg) => self.dir.join(arg),
            None => {
                let stem = input
                    .file_stem()
                    .ok_or_else(|| Error::OutputError(format!("cannot derive a file name from {}", input.display())))?;
                let mut name = stem.to_os_string();
                name.push(".png");
                self.dir.join(name)
            }
        };

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .map_err(|e| Error::OutputError(format!("failed to create {}: {}", parent.display(), e)))?;
        }

        Ok(OutputSpec { path })
    }
}

/// `~/Downloads/markout`
pub fn default_output_dir() -> Result<PathBuf> {
    let home = dirs::home_dir().ok_or_else(|| Error::OutputError("could not determine the home directory".into()))?;
    Ok(home.join("Downloads").join("markout"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derives_png_name_from_input() {
        let tmp = tempfile::tempdir().unwrap();
        let resolver = OutputResolver::new(tmp.path().join("markout"));
        let spec = resolver.resolve(Path::new("/notes/hello.md"), None).unwrap();
        assert_eq!(spec.path, tmp.path().join("markout").join("hello.png"));
        assert!(tmp.path().join("markout").is_dir());
    }

    #[test]
    fn empty_output_arg_counts_as_missing() {
        let tmp = tempfile::tempdir().unwrap();
        let resolver = OutputResolver::new(tmp.path());
        let spec = resolver.resolve(Path::new("talk.markdown"), Some("")).unwrap();
        assert_eq!(spec.path, tmp.path().join("talk.png"));
    }

    #[test]
    fn default_dir_lives_under_downloads() {
        if let Ok(dir) = default_output_dir() {
            assert!(dir.ends_with("Downloads/markout"));
        }
    }
}
