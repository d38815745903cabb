use super::engine::{Backend, CodegenError, Generated};
use super::helpers::{cpp_class_name, cpp_type_name, in_namespace, index_names, index_params, return_type, cpp_type_ref};
use super::native::forwardable_methods;
use crate::ddl::model::{MethodBody, Model, PackageId, TypeId};
use std::fmt::Write;

#[derive(Debug, Clone)]
pub struct BindingOptions {
    pub header: String,
    /* Namespace wrapping the native accessor classes, if any */
    pub native_ns: Option<String>,
}

impl Default for BindingOptions {
    fn default() -> Self {
        Self { header: "wrappers.h".to_string(), native_ns: None }
    }
}

/// Forwarding wrappers around the accessor classes plus per-package
/// registration with the scripting runtime.
pub struct BindingBackend {
    options: BindingOptions,
    /* One registration buffer per open package */
    registrations: Vec<String>,
}

impl BindingBackend {
    pub fn new(options: BindingOptions) -> Self {
        Self { options, registrations: Vec::new() }
    }

    fn native_name(&self, model: &Model, id: TypeId) -> String {
        in_namespace(self.options.native_ns.as_deref(), &cpp_type_name(model, id))
    }

    fn wrapper(&mut self, model: &Model, id: TypeId, out: &mut Generated) -> Result<(), CodegenError> {
        let class = cpp_class_name(model, id);
        let native = self.native_name(model, id);
        let wrapper = format!("{}_Wrapper", class);

        let decl = &mut out.declaration;
        writeln!(decl, "class {} {{", wrapper)?;
        writeln!(decl, "  boost::shared_ptr<{}> o;", native)?;
        writeln!(decl, "public:")?;
        writeln!(decl, "  {}(boost::shared_ptr<{}> obj) : o(obj) {{}}", wrapper, native)?;

        let mut defs = Vec::new();
        for method_id in forwardable_methods(model, id) {
            let method = model.method(method_id);
            let rank = match method.body {
                MethodBody::Attribute(a) => model.attr(a).rank(),
                _ => 0,
            };
            let ret = match &method.ret {
                None => "void".to_string(),
                Some(ty) if method.rank > 0 && !matches!(method.body, MethodBody::Attribute(_)) => {
                    format!("const {}*", cpp_type_ref(model, ty))
                }
                Some(ty) => return_type(model, ty),
            };
            let mut params = index_params(rank);
            let mut args = index_names(rank);
            for arg in &method.args {
                let ty = arg.ty.as_ref().map(|t| cpp_type_ref(model, t)).unwrap_or_else(|| "uint32_t".to_string());
                params.push(format!("{} {}", ty, arg.name));
                args.push(arg.name.clone());
            }
            let keyword = if method.ret.is_some() { "return " } else { "" };
            writeln!(
                decl,
                "  {} {}({}) const {{ {}o->{}({}); }}",
                ret,
                method.name,
                params.join(", "),
                keyword,
                method.name,
                args.join(", ")
            )?;
            defs.push(format!(".def(\"{}\", &{}::{})", method.name, wrapper, method.name));
        }
        writeln!(decl, "}};\n")?;

        let version = model.ty(id).identity.map(|i| i64::from(i.version)).unwrap_or(-1);
        let getter = if model.ty(id).config_type { "EnvGetter" } else { "EventGetter" };
        writeln!(decl, "class {}_Getter : public psddl_python::{} {{", class, getter)?;
        writeln!(decl, "public:")?;
        writeln!(decl, "  const char* getTypeName() {{ return \"{}\"; }}", model.type_path(id))?;
        writeln!(decl, "  int getVersion() {{ return {}; }}", version)?;
        writeln!(decl, "}};\n")?;

        if let Some(buffer) = self.registrations.last_mut() {
            writeln!(buffer, "  boost::python::class_<{}>(\"{}\", boost::python::no_init)", wrapper, class)?;
            for def in defs {
                writeln!(buffer, "    {}", def)?;
            }
            writeln!(buffer, "  ;")?;
        }
        Ok(())
    }
}

impl Backend for BindingBackend {
    fn name(&self) -> &'static str {
        "binding"
    }

    fn prologue(&mut self, model: &Model, out: &mut Generated) -> Result<(), CodegenError> {
        self.registrations.clear();
        writeln!(out.declaration, "#pragma once\n")?;
        writeln!(out.declaration, "#include <boost/python.hpp>")?;
        writeln!(out.declaration, "#include <boost/shared_ptr.hpp>")?;
        writeln!(out.declaration, "#include \"psddl_python/Getter.h\"")?;
        for header in &model.use_headers {
            writeln!(out.declaration, "#include \"{}\"", header)?;
        }
        writeln!(out.declaration)?;
        writeln!(out.definition, "#include \"{}\"\n", self.options.header)?;
        Ok(())
    }

    fn enter_package(&mut self, _model: &Model, _pkg: PackageId, _out: &mut Generated) -> Result<(), CodegenError> {
        self.registrations.push(String::new());
        Ok(())
    }

    fn visit_type(&mut self, model: &Model, id: TypeId, out: &mut Generated) -> Result<(), CodegenError> {
        self.wrapper(model, id, out)
    }

    fn leave_package(&mut self, _model: &Model, _pkg: PackageId, out: &mut Generated) -> Result<(), CodegenError> {
        let buffer = self.registrations.pop().ok_or(CodegenError::Backend {
            backend: "binding",
            reason: "package registration stack underflow".to_string(),
        })?;
        if buffer.is_empty() {
            return Ok(());
        }
        writeln!(out.declaration, "void createWrappers(PyObject* module);")?;
        writeln!(out.definition, "void createWrappers(PyObject* module)\n{{")?;
        writeln!(out.definition, "  boost::python::scope mod = boost::python::object(boost::python::handle<>(boost::python::borrowed(module)));")?;
        out.definition.push_str(&buffer);
        writeln!(out.definition, "}}")?;
        Ok(())
    }
}
