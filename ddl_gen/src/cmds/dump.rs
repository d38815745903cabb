/* Dump command - print the resolved model as a schema report */

use super::common::load_model;
use anyhow::Context;
use ddl_gen::codegen::dump;
use std::path::PathBuf;

#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum Format {
  Yaml,
  Json,
}

pub fn run(
  files: Vec<PathBuf>,
  include_dirs: Vec<PathBuf>,
  format: Format,
  output: Option<PathBuf>,
  verbose: bool,
) -> anyhow::Result<()> {
  let model = load_model(&files, include_dirs, verbose)?;
  let report = dump::report(&model);
  let text = match format {
    Format::Yaml => dump::to_yaml(&report).context("failed to serialize report as YAML")?,
    Format::Json => dump::to_json(&report).context("failed to serialize report as JSON")?,
  };

  match output {
    Some(path) => {
      std::fs::write(&path, text).with_context(|| format!("failed to write {}", path.display()))?;
      println!("[✓] Report written to {}", path.display());
    }
    None => println!("{}", text),
  }
  Ok(())
}
