use super::engine::{Backend, CodegenError, Generated};
use super::helpers::{
    cpp_class_name, cpp_enum_name, cpp_type_name, cpp_type_ref, doc_comment, index_names,
    index_params, return_type, CppRenderer,
};
use crate::ddl::expr::{Expr, SourceRenderer};
use crate::ddl::model::{
    Access, AttrId, Attribute, ConstId, Ctor, Dest, Dim, EnumId, Method, MethodBody, MethodId, Model,
    Scope, TypeId, TypeRef,
};
use std::collections::BTreeMap;
use std::fmt::Write;

/* Method-body languages consulted in order */
const BODY_LANGUAGES: [&str; 2] = ["C++", "Any"];

#[derive(Debug, Clone)]
pub struct NativeOptions {
    /// Include path of the generated header, used by the definition file.
    pub header: String,
}

impl Default for NativeOptions {
    fn default() -> Self {
        Self { header: "generated.h".to_string() }
    }
}

/// Emits accessor classes that overlay the raw bytes of each record.
pub struct NativeBackend {
    options: NativeOptions,
}

/* Member text for one class, grouped by access level */
#[derive(Default)]
struct ClassText {
    public: String,
    protected: String,
    private: String,
}

impl ClassText {
    fn section(&mut self, access: Access) -> &mut String {
        match access {
            Access::Public => &mut self.public,
            Access::Protected => &mut self.protected,
            Access::Private => &mut self.private,
        }
    }
}

struct Signature {
    ret: String,
    name: String,
    params: Vec<String>,
    /* Config-dependent members are templated on the config type */
    template: bool,
}

impl NativeBackend {
    pub fn new(options: NativeOptions) -> Self {
        Self { options }
    }

    fn params(sig: &Signature) -> String {
        let mut params = Vec::with_capacity(sig.params.len() + 1);
        if sig.template {
            params.push("const Config& cfg".to_string());
        }
        params.extend(sig.params.iter().cloned());
        params.join(", ")
    }

    /* Declares the member in the class and places its body inline or in the definition stream */
    fn emit_member(
        out: &mut Generated,
        class: &mut ClassText,
        class_name: &str,
        access: Access,
        sig: &Signature,
        body: Option<&str>,
        inline: bool,
        comment: Option<&str>,
    ) -> Result<(), CodegenError> {
        let section = class.section(access);
        doc_comment(section, "  ", comment);
        let params = Self::params(sig);
        if sig.template {
            writeln!(section, "  template <typename Config>")?;
        }
        match body {
            Some(body) if sig.template || inline => {
                writeln!(section, "  {} {}({}) const {{ {} }}", sig.ret, sig.name, params, body)?;
            }
            Some(body) => {
                writeln!(section, "  {} {}({}) const;", sig.ret, sig.name, params)?;
                writeln!(out.definition, "{} {}::{}({}) const\n{{\n  {}\n}}", sig.ret, class_name, sig.name, params, body)?;
            }
            None => {
                writeln!(section, "  {} {}({}) const;", sig.ret, sig.name, params)?;
            }
        }
        Ok(())
    }

    /* Storage type of one element: enums are held in their base integer */
    fn storage_type(model: &Model, ty: &TypeRef) -> String {
        match ty {
            TypeRef::Enum(e) => model.enum_(*e).base.name().to_string(),
            _ => cpp_type_ref(model, ty),
        }
    }

    /* Byte offset of element (i0, i1, ...) relative to the start of the record */
    fn element_offset(attr: &Attribute) -> Expr {
        let mut offset = attr.offset.clone();
        for (k, index) in index_names(attr.rank()).into_iter().enumerate() {
            let stride = attr.shape[k + 1..].iter().fold(attr.elem_size.clone(), |stride, dim| match dim {
                Dim::Bounded(count) => Expr::mul(stride, count.clone()),
                Dim::Unbounded => stride,
            });
            offset = Expr::add(offset, Expr::mul(Expr::Opaque(index), stride));
        }
        offset
    }

    fn attribute_body(model: &Model, attr: &Attribute, renderer: &CppRenderer<'_>) -> String {
        let storage = Self::storage_type(model, &attr.ty);
        let read = if attr.stored {
            let subscripts: String = index_names(attr.rank()).iter().map(|i| format!("[{}]", i)).collect();
            format!("{}{}", attr.field_name(), subscripts)
        } else {
            let offset = Self::element_offset(attr).render(renderer);
            format!("*(const {}*)(((const char*)this)+{})", storage, offset)
        };
        match attr.ty {
            TypeRef::Enum(e) => format!("return {}({});", cpp_enum_name(model, e), read),
            _ => format!("return {};", read),
        }
    }

    fn method_body(model: &Model, method: &Method, renderer: &CppRenderer<'_>) -> Option<String> {
        match &method.body {
            MethodBody::Attribute(a) => Some(Self::attribute_body(model, model.attr(*a), renderer)),
            MethodBody::Bitfield(b) => {
                let bf = model.bitfield(*b);
                let storage = renderer.attr_value(model.attr(bf.attr));
                let ret = cpp_type_ref(model, &bf.ty);
                Some(format!("return {}(({} >> {}) & {:#x});", ret, storage, bf.offset, bf.mask()))
            }
            MethodBody::Expr(bodies) => {
                pick_language(bodies).map(|e| format!("return {};", e.render(renderer)))
            }
            MethodBody::Code(bodies) => pick_language(bodies).map(|e| e.render(renderer)),
            MethodBody::External => None,
        }
    }

    fn method_signature(model: &Model, method: &Method) -> Signature {
        let index_args = match method.body {
            MethodBody::Attribute(a) => index_params(model.attr(a).rank()),
            _ => Vec::new(),
        };
        let ret = match (&method.ret, &method.body) {
            (None, _) => "void".to_string(),
            (Some(ty), MethodBody::Attribute(_)) => return_type(model, ty),
            (Some(ty), _) if method.rank > 0 => format!("const {}*", cpp_type_ref(model, ty)),
            (Some(ty), _) => return_type(model, ty),
        };
        let declared = method.args.iter().map(|arg| {
            let ty = arg.ty.as_ref().map(|t| cpp_type_ref(model, t)).unwrap_or_else(|| "uint32_t".to_string());
            format!("{} {}", ty, arg.name)
        });
        Signature {
            ret,
            name: method.name.clone(),
            params: index_args.into_iter().chain(declared).collect(),
            template: method.config_dependent,
        }
    }

    fn emit_methods(
        model: &Model,
        id: TypeId,
        out: &mut Generated,
        class: &mut ClassText,
    ) -> Result<(), CodegenError> {
        let class_name = cpp_class_name(model, id);
        let renderer = CppRenderer::this(model, id);
        for method_id in &model.ty(id).methods {
            let method = model.method(*method_id);
            let sig = Self::method_signature(model, method);
            let body = Self::method_body(model, method, &renderer);
            Self::emit_member(
                out,
                class,
                class_name,
                method.access,
                &sig,
                body.as_deref(),
                method.inline,
                method.comment.as_deref(),
            )?;
        }
        Ok(())
    }

    fn dest_stored(model: &Model, dest: Dest) -> bool {
        match dest {
            Dest::Attribute(a) => model.attr(a).stored,
            Dest::Bitfield(b) => model.attr(model.bitfield(b).attr).stored,
        }
    }

    /* A constructor is defined only when every argument lands in a storage member */
    fn ctor_definable(model: &Model, ctor: &Ctor) -> bool {
        if ctor.external {
            return false;
        }
        if ctor.force_definition {
            return true;
        }
        ctor.args.iter().all(|a| a.dest.is_some_and(|d| Self::dest_stored(model, d)))
            && ctor.inits.iter().all(|i| Self::dest_stored(model, i.dest))
    }

    fn array_len(attr: &Attribute) -> Option<i64> {
        attr.shape.iter().try_fold(1i64, |acc, dim| match dim {
            Dim::Bounded(Expr::Const(n)) => Some(acc * n),
            _ => None,
        })
    }

    fn emit_ctor(
        model: &Model,
        id: TypeId,
        ctor: &Ctor,
        out: &mut Generated,
        class: &mut ClassText,
    ) -> Result<(), CodegenError> {
        let class_name = cpp_class_name(model, id);
        let section = class.section(Access::Public);
        doc_comment(section, "  ", ctor.comment.as_deref());
        if ctor.auto {
            writeln!(section, "  {}() {{}}", class_name)?;
            return Ok(());
        }

        let renderer = CppRenderer::this(model, id);
        let mut params = Vec::with_capacity(ctor.args.len());
        /* Attribute -> initializer text, ordered like the storage members */
        let mut inits: BTreeMap<AttrId, String> = BTreeMap::new();
        let mut bit_parts: BTreeMap<AttrId, Vec<String>> = BTreeMap::new();
        let mut body = Vec::new();

        let mut assign = |dest: Dest, value: String| match dest {
            Dest::Attribute(a) => {
                let attr = model.attr(a);
                if attr.rank() > 0 {
                    let len = Self::array_len(attr).unwrap_or(0);
                    body.push(format!(
                        "std::copy({v}, {v}+{n}, &{f}{z});",
                        v = value,
                        n = len,
                        f = attr.field_name(),
                        z = "[0]".repeat(attr.rank())
                    ));
                } else if attr.owner == id {
                    inits.insert(a, value);
                } else {
                    body.push(format!("{} = {};", attr.field_name(), value));
                }
            }
            Dest::Bitfield(b) => {
                let bf = model.bitfield(b);
                bit_parts
                    .entry(bf.attr)
                    .or_default()
                    .push(format!("(({}) & {:#x}) << {}", value, bf.mask(), bf.offset));
            }
        };

        for arg in &ctor.args {
            let array_dest = matches!(arg.dest, Some(Dest::Attribute(a)) if model.attr(a).rank() > 0);
            let ty = match arg.ty {
                TypeRef::Type(_) => format!("const {}&", cpp_type_ref(model, &arg.ty)),
                _ if array_dest => format!("const {}*", Self::storage_type(model, &arg.ty)),
                _ => cpp_type_ref(model, &arg.ty),
            };
            params.push(format!("{} {}", ty, arg.name));
            if let Some(dest) = arg.dest {
                let value = arg.expr.as_ref().map(|e| e.render(&renderer)).unwrap_or_else(|| arg.name.clone());
                assign(dest, value);
            }
        }
        for init in &ctor.inits {
            assign(init.dest, init.expr.render(&renderer));
        }
        for (attr, parts) in bit_parts {
            let value = parts.join(" | ");
            if model.attr(attr).owner == id {
                inits.insert(attr, value);
            } else {
                body.push(format!("{} = {};", model.attr(attr).field_name(), value));
            }
        }

        let params = params.join(", ");
        let section = class.section(Access::Public);
        if !Self::ctor_definable(model, ctor) {
            writeln!(section, "  {}({});", class_name, params)?;
            return Ok(());
        }

        let init_list = if inits.is_empty() {
            String::new()
        } else {
            let items: Vec<String> =
                inits.iter().map(|(a, v)| format!("{}({})", model.attr(*a).field_name(), v)).collect();
            format!("\n  : {}", items.join(", "))
        };
        let body_text: String = body.iter().map(|line| format!("\n  {}", line)).collect();
        if ctor.inline {
            writeln!(section, "  {}({}){}\n  {{{}\n  }}", class_name, params, init_list, body_text)?;
        } else {
            writeln!(section, "  {}({});", class_name, params)?;
            writeln!(out.definition, "{}::{}({}){}\n{{{}\n}}", class_name, class_name, params, init_list, body_text)?;
        }
        Ok(())
    }

    fn emit_storage(model: &Model, id: TypeId, class: &mut ClassText) -> Result<(), CodegenError> {
        let ty = model.ty(id);
        let mut cursor = match ty.base {
            Some(base) => model.ty(base).size.constant().unwrap_or(0),
            None => 0,
        };
        let mut pad = 0;
        for attr_id in &ty.attributes {
            let attr = model.attr(*attr_id);
            if !attr.stored {
                break;
            }
            let offset = attr.offset.constant().unwrap_or(cursor);
            if offset > cursor {
                writeln!(class.private, "  char\t__pad{}[{}];", pad, offset - cursor)?;
                pad += 1;
            }
            let dims: String = attr
                .shape
                .iter()
                .map(|d| match d {
                    Dim::Bounded(e) => format!("[{}]", e.render(&SourceRenderer)),
                    Dim::Unbounded => "[]".to_string(),
                })
                .collect();
            let comment = attr.comment.as_deref().map(|c| format!("\t/**< {} */", c.trim())).unwrap_or_default();
            writeln!(
                class.private,
                "  {}\t{}{};{}",
                Self::storage_type(model, &attr.ty),
                attr.field_name(),
                dims,
                comment
            )?;
            let count = Self::array_len(attr).unwrap_or(1);
            cursor = offset + attr.elem_size.constant().unwrap_or(0) * count;
        }
        Ok(())
    }

    fn emit_class(&self, model: &Model, id: TypeId, out: &mut Generated) -> Result<(), CodegenError> {
        let ty = model.ty(id);
        let class_name = cpp_class_name(model, id);
        let renderer = CppRenderer::this(model, id);
        let mut class = ClassText::default();

        if let Some(identity) = ty.identity {
            writeln!(class.public, "  enum {{ TypeId = {} /**< XTC type ID value */ }};", identity.type_id)?;
            writeln!(class.public, "  enum {{ Version = {} /**< XTC type version number */ }};", identity.version)?;
        }
        for constant in ty.constants.values() {
            let c = model.constant(*constant);
            doc_comment(&mut class.public, "  ", c.comment.as_deref());
            writeln!(class.public, "  enum {{ {} = {} }};", c.name, c.value.render(&renderer))?;
        }
        for e in ty.enums.values() {
            write_enum(model, *e, "  ", &mut class.public)?;
        }
        for ctor in &ty.ctors {
            Self::emit_ctor(model, id, ctor, out, &mut class)?;
        }
        Self::emit_methods(model, id, out, &mut class)?;
        if !ty.no_sizeof {
            let sig = Signature {
                ret: "uint32_t".to_string(),
                name: "_sizeof".to_string(),
                params: Vec::new(),
                template: ty.config_dependent,
            };
            let body = format!("return {};", ty.size.render(&renderer));
            Self::emit_member(out, &mut class, class_name, Access::Public, &sig, Some(&body), false, None)?;
        }
        Self::emit_storage(model, id, &mut class)?;

        let decl = &mut out.declaration;
        writeln!(decl)?;
        doc_comment(decl, "", ty.comment.as_deref());
        match ty.base {
            Some(base) => writeln!(decl, "class {} : public {} {{", class_name, cpp_type_name(model, base))?,
            None => writeln!(decl, "class {} {{", class_name)?,
        }
        writeln!(decl, "public:")?;
        decl.push_str(&class.public);
        if !class.protected.is_empty() {
            writeln!(decl, "protected:")?;
            decl.push_str(&class.protected);
        }
        if !class.private.is_empty() {
            writeln!(decl, "private:")?;
            decl.push_str(&class.private);
        }
        writeln!(decl, "}};")?;
        Ok(())
    }
}

/* Prefer the C++ body, then the language-neutral one */
fn pick_language(bodies: &BTreeMap<String, Expr>) -> Option<&Expr> {
    BODY_LANGUAGES.iter().find_map(|lang| bodies.get(*lang))
}

pub(crate) fn write_enum(model: &Model, id: EnumId, indent: &str, out: &mut String) -> Result<(), CodegenError> {
    let e = model.enum_(id);
    let renderer = match e.scope {
        Scope::Type(owner) => Some(CppRenderer::this(model, owner)),
        Scope::Package(_) => None,
    };
    doc_comment(out, indent, e.comment.as_deref());
    writeln!(out, "{}enum {} {{", indent, e.name)?;
    for constant in &e.constants {
        let value = match (&constant.value, &renderer) {
            (Some(v), Some(r)) => format!(" = {}", v.render(r)),
            (Some(v), None) => format!(" = {}", v.render(&SourceRenderer)),
            (None, _) => String::new(),
        };
        let comment = constant.comment.as_deref().map(|c| format!(" /**< {} */", c.trim())).unwrap_or_default();
        writeln!(out, "{}  {}{},{}", indent, constant.name, value, comment)?;
    }
    writeln!(out, "{}}};", indent)?;
    Ok(())
}

impl Backend for NativeBackend {
    fn name(&self) -> &'static str {
        "native"
    }

    fn prologue(&mut self, model: &Model, out: &mut Generated) -> Result<(), CodegenError> {
        writeln!(out.declaration, "#pragma once\n")?;
        writeln!(out.declaration, "#include <stdint.h>")?;
        writeln!(out.declaration, "#include <cstddef>")?;
        writeln!(out.declaration, "#include <algorithm>")?;
        for header in &model.use_headers {
            writeln!(out.declaration, "#include \"{}\"", header)?;
        }
        writeln!(out.declaration)?;
        writeln!(out.definition, "#include \"{}\"\n", self.options.header)?;
        Ok(())
    }

    fn visit_constant(&mut self, model: &Model, id: ConstId, out: &mut Generated) -> Result<(), CodegenError> {
        let c = model.constant(id);
        doc_comment(&mut out.declaration, "", c.comment.as_deref());
        writeln!(out.declaration, "enum {{ {} = {} }};", c.name, c.value.render(&SourceRenderer))?;
        Ok(())
    }

    fn visit_enum(&mut self, model: &Model, id: EnumId, out: &mut Generated) -> Result<(), CodegenError> {
        write_enum(model, id, "", &mut out.declaration)
    }

    fn visit_type(&mut self, model: &Model, id: TypeId, out: &mut Generated) -> Result<(), CodegenError> {
        self.emit_class(model, id, out)
    }
}

/* Methods a forwarding wrapper can expose without a config object */
pub(crate) fn forwardable_methods(model: &Model, id: TypeId) -> Vec<MethodId> {
    model
        .ty(id)
        .methods
        .iter()
        .copied()
        .filter(|m| {
            let method = model.method(*m);
            method.access == Access::Public && !method.config_dependent
        })
        .collect()
}
