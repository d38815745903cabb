/* Schema document loading with recursive `use` imports */

use ddl_types::DdlFile;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::debug;

#[derive(Debug, thiserror::Error)]
pub enum LoadError {
  #[error("failed to read {path}: {source}")]
  Io {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },

  #[error("failed to parse {path}: {source}")]
  Parse {
    path: PathBuf,
    #[source]
    source: serde_yml::Error,
  },

  #[error("import '{import}' not found relative to '{base}' or in include directories")]
  ImportNotFound { import: String, base: PathBuf },
}

/* One parsed document */
#[derive(Debug, Clone)]
pub struct Unit {
  pub path: PathBuf,
  pub file: DdlFile,
  /* Declarations of included units are referenced but never emitted */
  pub included: bool,
}

impl Unit {
  pub fn parse(path: impl Into<PathBuf>, contents: &str, included: bool) -> Result<Unit, LoadError> {
    let path = path.into();
    let file: DdlFile =
      serde_yml::from_str(contents).map_err(|source| LoadError::Parse { path: path.clone(), source })?;
    Ok(Unit { path, file, included })
  }
}

pub struct ImportResolver {
  /* Canonical path -> index into `units` */
  loaded: HashMap<PathBuf, usize>,
  include_dirs: Vec<PathBuf>,
  units: Vec<Unit>,
}

impl ImportResolver {
  pub fn new(include_dirs: Vec<PathBuf>) -> Self {
    Self { loaded: HashMap::new(), include_dirs, units: Vec::new() }
  }

  fn resolve_import_path(&self, import: &str, base_file: &Path) -> Result<PathBuf, LoadError> {
    /* First relative to the importing document, then each include directory */
    let relative = base_file.parent().map(|parent| parent.join(import));
    let candidates = relative.into_iter().chain(self.include_dirs.iter().map(|dir| dir.join(import)));
    for candidate in candidates {
      if candidate.exists() {
        return candidate.canonicalize().map_err(|source| LoadError::Io { path: candidate, source });
      }
    }
    Err(LoadError::ImportNotFound { import: import.to_string(), base: base_file.to_path_buf() })
  }

  /* Load a document given on the command line together with everything it imports */
  pub fn load_file_with_imports(&mut self, file_path: &Path) -> Result<(), LoadError> {
    self.load(file_path, false)
  }

  fn load(&mut self, file_path: &Path, included: bool) -> Result<(), LoadError> {
    let canonical = file_path
      .canonicalize()
      .map_err(|source| LoadError::Io { path: file_path.to_path_buf(), source })?;

    if let Some(&index) = self.loaded.get(&canonical) {
      /* A primary document that was first seen as an import becomes primary */
      if !included && self.units[index].included {
        self.units[index].included = false;
      }
      debug!(path = %file_path.display(), "skipping already loaded document");
      return Ok(());
    }

    let contents = std::fs::read_to_string(file_path)
      .map_err(|source| LoadError::Io { path: file_path.to_path_buf(), source })?;
    let unit = Unit::parse(file_path, &contents, included)?;
    debug!(
      path = %file_path.display(),
      included,
      imports = unit.file.uses.len(),
      "loaded schema document"
    );

    /* Reserve the slot before recursing so circular imports terminate */
    let index = self.units.len();
    self.loaded.insert(canonical, index);
    let imports: Vec<String> = unit.file.uses.iter().map(|u| u.file.clone()).collect();
    self.units.push(unit);

    for import in imports {
      let import_path = self.resolve_import_path(&import, file_path)?;
      self.load(&import_path, true)?;
    }
    Ok(())
  }

  pub fn loaded_file_count(&self) -> usize {
    self.units.len()
  }

  pub fn units(&self) -> &[Unit] {
    &self.units
  }

  pub fn into_units(self) -> Vec<Unit> {
    self.units
  }
}
