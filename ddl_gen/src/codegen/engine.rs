use crate::ddl::model::{ConstId, EnumId, Member, Model, PackageId, TypeId};
use std::fmt::Write;
use tracing::{debug, info};

/// The two text artifacts produced by one backend run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Generated {
    /// Header text (declarations, templates, inline definitions).
    pub declaration: String,
    /// Source text (out-of-line definitions).
    pub definition: String,
}

#[derive(Debug, thiserror::Error)]
pub enum CodegenError {
    #[error("unbalanced namespace scopes: {depth} left open")]
    UnbalancedScope { depth: usize },

    #[error("backend '{backend}': {reason}")]
    Backend { backend: &'static str, reason: String },

    #[error("formatting failed: {0}")]
    Format(#[from] std::fmt::Error),
}

/* Hooks called by the traversal; every default does nothing */
pub trait Backend {
    fn name(&self) -> &'static str;

    /* Whether the engine wraps each package in a namespace bracket */
    fn brackets_packages(&self) -> bool {
        true
    }

    fn prologue(&mut self, _model: &Model, _out: &mut Generated) -> Result<(), CodegenError> {
        Ok(())
    }

    fn enter_package(&mut self, _model: &Model, _pkg: PackageId, _out: &mut Generated) -> Result<(), CodegenError> {
        Ok(())
    }

    fn visit_constant(&mut self, _model: &Model, _id: ConstId, _out: &mut Generated) -> Result<(), CodegenError> {
        Ok(())
    }

    fn visit_enum(&mut self, _model: &Model, _id: EnumId, _out: &mut Generated) -> Result<(), CodegenError> {
        Ok(())
    }

    fn visit_type(&mut self, _model: &Model, _id: TypeId, _out: &mut Generated) -> Result<(), CodegenError> {
        Ok(())
    }

    /* Types that are not emitted (imported or external) but still visible to the backend */
    fn reference_type(&mut self, _model: &Model, _id: TypeId, _out: &mut Generated) -> Result<(), CodegenError> {
        Ok(())
    }

    fn leave_package(&mut self, _model: &Model, _pkg: PackageId, _out: &mut Generated) -> Result<(), CodegenError> {
        Ok(())
    }

    /* After the traversal, still inside the top-level namespace */
    fn finish(&mut self, _model: &Model, _out: &mut Generated) -> Result<(), CodegenError> {
        Ok(())
    }

    /* After the top-level namespace has been closed */
    fn epilogue(&mut self, _model: &Model, _out: &mut Generated) -> Result<(), CodegenError> {
        Ok(())
    }
}

/// Namespace name used for a package in generated C++.
pub fn package_namespace(model: &Model, pkg: PackageId) -> &str {
    let package = model.package(pkg);
    package.cpp_name.as_deref().unwrap_or(&package.name)
}

#[derive(Debug, Clone, Default)]
pub struct Engine {
    pub top_namespace: Option<String>,
}

struct Walk<'m, 'b> {
    model: &'m Model,
    backend: &'b mut dyn Backend,
    out: Generated,
    scopes: Vec<String>,
}

impl<'m, 'b> Walk<'m, 'b> {
    fn open_scope(&mut self, name: &str) -> Result<(), CodegenError> {
        writeln!(self.out.declaration, "namespace {} {{", name)?;
        writeln!(self.out.definition, "namespace {} {{", name)?;
        self.scopes.push(name.to_string());
        Ok(())
    }

    fn close_scope(&mut self) -> Result<(), CodegenError> {
        let name = self.scopes.pop().ok_or(CodegenError::UnbalancedScope { depth: 0 })?;
        writeln!(self.out.declaration, "}} // namespace {}", name)?;
        writeln!(self.out.definition, "}} // namespace {}", name)?;
        Ok(())
    }

    /* Imported packages are only referenced, never bracketed or emitted */
    fn reference_package(&mut self, pkg: PackageId) -> Result<(), CodegenError> {
        for member in self.model.package(pkg).members.values() {
            match *member {
                Member::Package(nested) => self.reference_package(nested)?,
                Member::Type(ty) => self.backend.reference_type(self.model, ty, &mut self.out)?,
                Member::Enum(_) | Member::Constant(_) => {}
            }
        }
        Ok(())
    }

    fn walk_package(&mut self, pkg: PackageId) -> Result<(), CodegenError> {
        let model = self.model;
        let package = model.package(pkg);
        if package.included || package.external {
            debug!(package = %package.name, "referencing package without emitting");
            return self.reference_package(pkg);
        }

        let depth = self.scopes.len();
        let bracket = self.backend.brackets_packages();
        if bracket {
            self.open_scope(package_namespace(model, pkg))?;
        }
        self.backend.enter_package(model, pkg, &mut self.out)?;

        for member in package.members.values() {
            if let Member::Constant(id) = *member {
                self.backend.visit_constant(model, id, &mut self.out)?;
            }
        }
        for member in package.members.values() {
            if let Member::Enum(id) = *member {
                self.backend.visit_enum(model, id, &mut self.out)?;
            }
        }
        for member in package.members.values() {
            match *member {
                Member::Package(nested) => self.walk_package(nested)?,
                Member::Type(ty) if model.is_emitted(ty) => {
                    self.backend.visit_type(model, ty, &mut self.out)?
                }
                Member::Type(ty) => self.backend.reference_type(model, ty, &mut self.out)?,
                Member::Enum(_) | Member::Constant(_) => {}
            }
        }

        self.backend.leave_package(model, pkg, &mut self.out)?;
        if bracket {
            self.close_scope()?;
        }
        if self.scopes.len() != depth {
            return Err(CodegenError::UnbalancedScope { depth: self.scopes.len() });
        }
        Ok(())
    }
}

impl Engine {
    pub fn new(top_namespace: Option<String>) -> Self {
        Self { top_namespace }
    }

    /// Runs one backend over the whole model: depth-first, packages in
    /// declaration order, constants then enums then nested packages and types.
    pub fn emit(&self, model: &Model, backend: &mut dyn Backend) -> Result<Generated, CodegenError> {
        info!(backend = backend.name(), "generating");
        let mut walk = Walk { model, backend, out: Generated::default(), scopes: Vec::new() };

        walk.backend.prologue(model, &mut walk.out)?;
        if let Some(top) = &self.top_namespace {
            walk.open_scope(top)?;
        }
        for pkg in model.roots.values() {
            walk.walk_package(*pkg)?;
        }
        walk.backend.finish(model, &mut walk.out)?;
        if self.top_namespace.is_some() {
            walk.close_scope()?;
        }
        if !walk.scopes.is_empty() {
            return Err(CodegenError::UnbalancedScope { depth: walk.scopes.len() });
        }
        walk.backend.epilogue(model, &mut walk.out)?;
        Ok(walk.out)
    }

    /// Runs several independent backends over the same model on scoped threads.
    /// Results come back in the order of `backends`.
    pub fn emit_all(
        &self,
        model: &Model,
        backends: Vec<Box<dyn Backend + Send>>,
    ) -> Vec<(&'static str, Result<Generated, CodegenError>)> {
        std::thread::scope(|scope| {
            let handles: Vec<_> = backends
                .into_iter()
                .map(|mut backend| {
                    scope.spawn(move || {
                        let name = backend.name();
                        (name, self.emit(model, backend.as_mut()))
                    })
                })
                .collect();
            handles
                .into_iter()
                .map(|handle| match handle.join() {
                    Ok(result) => result,
                    Err(_) => (
                        "unknown",
                        Err(CodegenError::Backend { backend: "unknown", reason: "backend thread panicked".to_string() }),
                    ),
                })
                .collect()
        })
    }
}
