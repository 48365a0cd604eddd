//! Content staging for the dev server
//!
//! The dev server only sees what is on disk, so the job is written as
//! `content.json` into the front-end's public directory. The embedded server
//! serves the job from memory and never touches this file.

use std::fs;
use std::path::{Path, PathBuf};

use log::info;

use crate::{Error, RenderJob, Result};

/// File name the front-end fetches.
pub const CONTENT_FILE: &str = "content.json";

/// Write `job` to `<public_dir>/content.json`, replacing any earlier run.
pub fn stage(job: &RenderJob, public_dir: &Path) -> Result<PathBuf> {
    let path = public_dir.join(CONTENT_FILE);
    let stage_err = |source| Error::StageError { path: path.clone(), source };

    fs::create_dir_all(public_dir).map_err(stage_err)?;
    fs::write(&path, job.to_json()?).map_err(stage_err)?;

    info!("Content prepared at {}", path.display());
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn job(markdown: &str) -> RenderJob {
        RenderJob {
            markdown: markdown.into(),
            theme: "lapis".into(),
            size: "mobile".into(),
            template: Some("card".into()),
        }
    }

    #[test]
    fn creates_public_dir_and_writes_payload() {
        let tmp = tempfile::tempdir().unwrap();
        let public = tmp.path().join("vite-project").join("public");

        let path = stage(&job("# Hi"), &public).unwrap();
        assert_eq!(path, public.join("content.json"));

        let staged: RenderJob = serde_json::from_slice(&fs::read(&path).unwrap()).unwrap();
        assert_eq!(staged, job("# Hi"));
    }

    #[test]
    fn overwrites_previous_content() {
        let tmp = tempfile::tempdir().unwrap();
        stage(&job("first"), tmp.path()).unwrap();
        let path = stage(&job("second"), tmp.path()).unwrap();

        let staged: RenderJob = serde_json::from_slice(&fs::read(path).unwrap()).unwrap();
        assert_eq!(staged.markdown, "second");
    }

    #[test]
    fn unwritable_destination_is_a_stage_error() {
        let tmp = tempfile::tempdir().unwrap();
        let blocker = tmp.path().join("public");
        fs::write(&blocker, b"not a directory").unwrap();

        let err = stage(&job("x"), &blocker).unwrap_err();
        assert!(matches!(err, Error::StageError { .. }));
    }
}
