use candle_nn::VarMap;
use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{BoxError, Error};

/// Model state that can be written out as a snapshot.
pub trait Checkpoint {
    fn save(&self, path: &Path) -> Result<(), BoxError>;
}

impl Checkpoint for VarMap {
    fn save(&self, path: &Path) -> Result<(), BoxError> {
        VarMap::save(self, path)?;
        Ok(())
    }
}

/// Writes `model` next to `target` and renames it into place, so a failed
/// save leaves the previous snapshot intact.
pub fn write_atomic<C: Checkpoint + ?Sized>(model: &C, target: &Path) -> Result<(), Error> {
    let persistence = |source: BoxError| Error::Persistence {
        path: target.to_path_buf(),
        source,
    };

    if let Some(parent) = target.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|e| persistence(e.into()))?;
    }

    let tmp = tmp_path(target);
    if let Err(e) = model.save(&tmp) {
        let _ = fs::remove_file(&tmp);
        return Err(persistence(e));
    }

    fs::rename(&tmp, target).map_err(|e| {
        let _ = fs::remove_file(&tmp);
        persistence(e.into())
    })
}

/// Restores a snapshot written by [`write_atomic`] into `varmap`.
pub fn load(varmap: &mut VarMap, path: &Path) -> candle_core::Result<()> {
    varmap.load(path)
}

fn tmp_path(target: &Path) -> PathBuf {
    let mut name: OsString = target.file_name().map(OsString::from).unwrap_or_default();
    name.push(".tmp");
    target.with_file_name(name)
}
