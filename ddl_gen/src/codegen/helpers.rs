use super::engine::package_namespace;
use crate::ddl::expr::OperandRenderer;
use crate::ddl::model::{Attribute, EnumId, Model, PackageId, Scope, TypeId, TypeRef};

/// `Outer::Inner` namespace path of a package, honoring `cpp_name` overrides.
pub fn cpp_namespace(model: &Model, pkg: PackageId) -> String {
    let mut parts = Vec::new();
    let mut cursor = Some(pkg);
    while let Some(id) = cursor {
        parts.push(package_namespace(model, id));
        cursor = model.package(id).parent;
    }
    parts.reverse();
    parts.join("::")
}

pub fn cpp_class_name(model: &Model, ty: TypeId) -> &str {
    let t = model.ty(ty);
    t.cpp_name.as_deref().unwrap_or(&t.name)
}

/// Package-qualified C++ name of a type, e.g. `Acq::ConfigV1`.
pub fn cpp_type_name(model: &Model, ty: TypeId) -> String {
    format!("{}::{}", cpp_namespace(model, model.ty(ty).package), cpp_class_name(model, ty))
}

pub fn cpp_scope_name(model: &Model, scope: Scope) -> String {
    match scope {
        Scope::Package(pkg) => cpp_namespace(model, pkg),
        Scope::Type(ty) => cpp_type_name(model, ty),
    }
}

pub fn cpp_enum_name(model: &Model, id: EnumId) -> String {
    let e = model.enum_(id);
    format!("{}::{}", cpp_scope_name(model, e.scope), e.name)
}

pub fn cpp_type_ref(model: &Model, ty: &TypeRef) -> String {
    match ty {
        TypeRef::Builtin(b) => b.name().to_string(),
        TypeRef::Enum(e) => cpp_enum_name(model, *e),
        TypeRef::Type(t) => cpp_type_name(model, *t),
    }
}

/// Prefix a qualified name with an optional outer namespace.
pub fn in_namespace(ns: Option<&str>, name: &str) -> String {
    match ns {
        Some(ns) if !ns.is_empty() => format!("{}::{}", ns, name),
        _ => name.to_string(),
    }
}

/// Value types are returned by value; user record types by const reference.
pub fn return_type(model: &Model, ty: &TypeRef) -> String {
    match ty {
        TypeRef::Type(_) => format!("const {}&", cpp_type_ref(model, ty)),
        _ => cpp_type_ref(model, ty),
    }
}

pub fn index_names(rank: usize) -> Vec<String> {
    (0..rank).map(|i| format!("i{}", i)).collect()
}

pub fn index_params(rank: usize) -> Vec<String> {
    (0..rank).map(|i| format!("uint32_t i{}", i)).collect()
}

pub fn doc_comment(out: &mut String, indent: &str, comment: Option<&str>) {
    let Some(comment) = comment.map(str::trim).filter(|c| !c.is_empty()) else {
        return;
    };
    let lines: Vec<&str> = comment.lines().collect();
    if lines.len() == 1 {
        out.push_str(&format!("{}/** {} */\n", indent, lines[0]));
        return;
    }
    out.push_str(&format!("{}/**\n", indent));
    for line in lines {
        out.push_str(&format!("{} * {}\n", indent, line.trim_end()));
    }
    out.push_str(&format!("{} */\n", indent));
}

/// Renders expression operands for code living inside (or forwarding to) an
/// accessor class: instance members through `object`, config members through
/// the `cfg` argument.
pub struct CppRenderer<'m> {
    pub model: &'m Model,
    pub owner: TypeId,
    pub object: &'static str,
}

impl<'m> CppRenderer<'m> {
    pub fn this(model: &'m Model, owner: TypeId) -> Self {
        Self { model, owner, object: "this->" }
    }
}

impl CppRenderer<'_> {
    /// Whole-attribute value: the storage member when one exists, else the accessor call.
    pub fn attr_value(&self, attr: &Attribute) -> String {
        if attr.stored {
            return format!("{}{}", self.object, attr.field_name());
        }
        let accessor = attr
            .accessor
            .map(|m| self.model.method(m).name.as_str())
            .unwrap_or(attr.default_accessor_name());
        let args = if attr.config_dependent { "cfg" } else { "" };
        format!("{}{}({})", self.object, accessor, args)
    }
}

impl OperandRenderer for CppRenderer<'_> {
    fn self_attr(&self, name: &str) -> String {
        match self.model.find_attribute(self.owner, name) {
            Some(attr) => self.attr_value(self.model.attr(attr)),
            None => format!("{}{}", self.object, name),
        }
    }

    fn self_call(&self, name: &str) -> (String, Option<String>) {
        let dependent = self
            .model
            .find_method(self.owner, name)
            .is_some_and(|m| self.model.method(m).config_dependent);
        (format!("{}{}", self.object, name), dependent.then(|| "cfg".to_string()))
    }

    fn static_ref(&self, ty: TypeId, member: &str) -> String {
        format!("{}::{}", cpp_type_name(self.model, ty), member)
    }

    fn config_ref(&self, _config: TypeId, member: &str) -> String {
        format!("cfg.{}", member)
    }
}
