/* Codegen command - generate C++ from schema documents */

use super::common::load_model;
use anyhow::Context;
use ddl_gen::codegen::{
  dump, Backend as _, BindingBackend, BindingOptions, DispatchBackend, DispatchOptions, Engine, Generated,
  NativeBackend, NativeOptions, SchemaBackend, SchemaOptions,
};
use std::path::{Path, PathBuf};

#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Debug)]
pub enum Backend {
  Native,
  Binding,
  Schema,
  Dispatch,
  DispatchHash,
}

/* Everything the codegen command needs besides the input files */
#[derive(Debug, Clone)]
pub struct Settings {
  pub backend: Backend,
  pub decl: PathBuf,
  pub def: PathBuf,
  pub include_prefix: Option<String>,
  pub top_namespace: Option<String>,
  pub interface_ns: Option<String>,
  pub native_ns: Option<String>,
  pub ignored_type_ids: Vec<u32>,
  pub dump_schema: bool,
}

/* Path the definition file uses to include the declaration file */
fn header_include(decl: &Path, prefix: Option<&str>) -> String {
  let name = decl
    .file_name()
    .map(|n| n.to_string_lossy().into_owned())
    .unwrap_or_else(|| decl.display().to_string());
  match prefix {
    Some(prefix) if !prefix.is_empty() => format!("{}/{}", prefix.trim_end_matches('/'), name),
    _ => name,
  }
}

fn generate(model: &ddl_gen::ddl::Model, settings: &Settings) -> anyhow::Result<Generated> {
  let header = header_include(&settings.decl, settings.include_prefix.as_deref());
  let engine = Engine::new(settings.top_namespace.clone());

  let mut backend: Box<dyn ddl_gen::codegen::Backend> = match settings.backend {
    Backend::Native => Box::new(NativeBackend::new(NativeOptions { header })),
    Backend::Binding => Box::new(BindingBackend::new(BindingOptions {
      header,
      native_ns: settings.native_ns.clone(),
    })),
    Backend::Schema => {
      let mut options = SchemaOptions { header, ..SchemaOptions::default() };
      if let Some(ns) = &settings.interface_ns {
        options.interface_ns = ns.clone();
      }
      Box::new(SchemaBackend::new(options))
    }
    Backend::Dispatch | Backend::DispatchHash => {
      let mut options = DispatchOptions {
        header,
        native_ns: settings.native_ns.clone(),
        ignored_type_ids: settings.ignored_type_ids.clone(),
        hashed: settings.backend == Backend::DispatchHash,
        ..DispatchOptions::default()
      };
      if let Some(ns) = &settings.interface_ns {
        options.interface_ns = ns.clone();
      }
      Box::new(DispatchBackend::new(options))
    }
  };

  engine
    .emit(model, backend.as_mut())
    .with_context(|| format!("backend '{}' failed", backend.name()))
}

/* Execute the codegen command */
pub fn run(files: Vec<PathBuf>, include_dirs: Vec<PathBuf>, settings: Settings, verbose: bool) -> anyhow::Result<()> {
  if verbose {
    println!("DDL Generator - Code Generation Tool");
    println!("====================================\n");
    println!("[~] Configuration:");
    println!("  Backend: {:?}", settings.backend);
    println!("  Declaration file: {}", settings.decl.display());
    println!("  Definition file: {}", settings.def.display());
    println!("  Input files: {}", files.len());
    for file in &files {
      println!("    - {}", file.display());
    }
    println!();
  }

  let model = load_model(&files, include_dirs, verbose)?;

  /* Dump mode replaces code generation */
  if settings.dump_schema {
    let report = dump::report(&model);
    println!("{}", dump::to_yaml(&report).context("failed to serialize schema report")?);
    return Ok(());
  }

  if verbose {
    println!("\n[*] Starting code generation for {:?}...", settings.backend);
  }
  let generated = generate(&model, &settings)?;

  /* Nothing is written unless generation succeeded */
  for (path, text) in [(&settings.decl, &generated.declaration), (&settings.def, &generated.definition)] {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
      std::fs::create_dir_all(parent).with_context(|| format!("failed to create {}", parent.display()))?;
    }
    std::fs::write(path, text).with_context(|| format!("failed to write {}", path.display()))?;
    if verbose {
      println!("[✓] Wrote {}", path.display());
    }
  }

  println!("[✓] Code generation complete");
  Ok(())
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn header_include_uses_prefix() {
    assert_eq!(header_include(Path::new("out/Acq.h"), Some("psddl/")), "psddl/Acq.h");
    assert_eq!(header_include(Path::new("out/Acq.h"), None), "Acq.h");
  }

  fn settings(dir: &Path, dump_schema: bool) -> Settings {
    Settings {
      backend: Backend::Native,
      decl: dir.join("out/Pkg.h"),
      def: dir.join("out/Pkg.cpp"),
      include_prefix: None,
      top_namespace: None,
      interface_ns: None,
      native_ns: None,
      ignored_type_ids: Vec::new(),
      dump_schema,
    }
  }

  #[test]
  fn dump_mode_writes_no_files() {
    let dir = tempfile::TempDir::new().unwrap();
    let input = dir.path().join("pkg.yaml");
    std::fs::write(&input, "packages:\n  - name: Pkg\n    types:\n      - name: T\n        attributes:\n          - { name: x, type: uint32_t }\n").unwrap();

    run(vec![input.clone()], Vec::new(), settings(dir.path(), true), false).unwrap();
    assert!(!dir.path().join("out").exists());

    run(vec![input], Vec::new(), settings(dir.path(), false), false).unwrap();
    assert!(dir.path().join("out/Pkg.h").exists());
    assert!(dir.path().join("out/Pkg.cpp").exists());
  }
}
