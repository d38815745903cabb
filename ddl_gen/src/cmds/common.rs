/* Common utilities shared between the codegen and dump commands */

use anyhow::Context;
use ddl_gen::ddl::{self, ImportResolver, Model};
use std::path::PathBuf;

/* Load every document with its imports and build the resolved model */
pub fn load_model(files: &[PathBuf], include_dirs: Vec<PathBuf>, verbose: bool) -> anyhow::Result<Model> {
  if verbose {
    println!("[~] Loading schema documents and resolving imports...");
    for dir in &include_dirs {
      println!("    include: {}", dir.display());
    }
  }

  let mut resolver = ImportResolver::new(include_dirs);
  for file in files {
    resolver
      .load_file_with_imports(file)
      .with_context(|| format!("failed to load {}", file.display()))?;
  }

  if verbose {
    println!("[~] Loaded {} file(s) total (including imports)", resolver.loaded_file_count());
    for unit in resolver.units() {
      let role = if unit.included { "import" } else { "primary" };
      println!("    - {} ({})", unit.path.display(), role);
    }
  }

  let model = ddl::build(resolver.units()).map_err(|e| {
    println!("[✗] {:?} error: {}", e.class(), e);
    anyhow::Error::new(e)
  })?;

  if verbose {
    println!(
      "[✓] Model built: {} package(s), {} type(s), {} emitted",
      model.packages.len(),
      model.types.len(),
      model.emitted_types().count()
    );
  }
  Ok(model)
}
