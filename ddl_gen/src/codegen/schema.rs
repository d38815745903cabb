use super::engine::{Backend, CodegenError, Generated};
use super::helpers::{cpp_class_name, cpp_type_name, cpp_type_ref, in_namespace};
use crate::ddl::model::{Dataset, DatasetSource, Model, Schema, TypeId, TypeRef};
use std::fmt::Write;
use tracing::debug;

#[derive(Debug, Clone)]
pub struct SchemaOptions {
    pub header: String,
    pub interface_ns: String,
}

impl Default for SchemaOptions {
    fn default() -> Self {
        Self { header: "schema.h".to_string(), interface_ns: "Psana".to_string() }
    }
}

/// Emits per-version dataset structs, lazy readers, proxy factories and
/// store functions for the storage format.
pub struct SchemaBackend {
    options: SchemaOptions,
}

impl SchemaBackend {
    pub fn new(options: SchemaOptions) -> Self {
        Self { options }
    }

    fn interface_name(&self, model: &Model, id: TypeId) -> String {
        in_namespace(Some(&self.options.interface_ns), &cpp_type_name(model, id))
    }

    /* All schemas of a type, lowest version first */
    fn sorted_schemas(model: &Model, id: TypeId) -> Vec<&Schema> {
        let mut schemas: Vec<&Schema> = model.ty(id).schemas.iter().collect();
        schemas.sort_by_key(|s| s.version);
        schemas
    }

    fn member_type(model: &Model, ty: &TypeRef, rank: u32) -> String {
        let elem = match ty {
            TypeRef::Enum(e) => model.enum_(*e).base.name().to_string(),
            _ => cpp_type_ref(model, ty),
        };
        if rank == 0 { elem } else { format!("ndarray<const {}, {}>", elem, rank) }
    }

    fn dataset_struct(
        &self,
        model: &Model,
        id: TypeId,
        schema: &Schema,
        dataset: &Dataset,
        out: &mut Generated,
    ) -> Result<(), CodegenError> {
        let iface = self.interface_name(model, id);
        let ns = format!("ns_{}_v{}", dataset.name, schema.version);
        let name = format!("dataset_{}", dataset.name);

        let decl = &mut out.declaration;
        writeln!(decl, "namespace {} {{", ns)?;
        writeln!(decl, "struct {} {{", name)?;
        writeln!(decl, "  static hdf5pp::Type native_type();")?;
        writeln!(decl, "  static hdf5pp::Type stored_type();\n")?;
        writeln!(decl, "  {}();", name)?;
        writeln!(decl, "  {}(const {}& psanaobj);\n", name, iface)?;
        let mut initializers = Vec::new();
        for attr in &dataset.attributes {
            let ty = match attr.source {
                DatasetSource::Attribute(a) => model.attr(a).ty,
                DatasetSource::Method(m) => match model.method(m).ret {
                    Some(ty) => ty,
                    None => {
                        return Err(CodegenError::Backend {
                            backend: "schema",
                            reason: format!("{}: dataset attribute '{}' maps to a void method", model.type_path(id), attr.name),
                        });
                    }
                },
            };
            writeln!(decl, "  {} {};", Self::member_type(model, &ty, attr.rank), attr.name)?;
            initializers.push(format!("{}(psanaobj.{}())", attr.name, attr.method));
        }
        writeln!(decl, "}};")?;
        writeln!(decl, "}} // namespace {}\n", ns)?;

        let def = &mut out.definition;
        writeln!(def, "{}::{}::{}() {{}}", ns, name, name)?;
        write!(def, "{}::{}::{}(const {}& psanaobj)", ns, name, name, iface)?;
        if initializers.is_empty() {
            writeln!(def, " {{}}")?;
        } else {
            writeln!(def, "\n  : {}\n{{}}", initializers.join("\n  , "))?;
        }
        Ok(())
    }

    fn versioned_class(&self, model: &Model, id: TypeId, schema: &Schema, out: &mut Generated) -> Result<(), CodegenError> {
        let iface = self.interface_name(model, id);
        let class = format!("{}_v{}", cpp_class_name(model, id), schema.version);

        let decl = &mut out.declaration;
        writeln!(decl, "class {} : public {} {{", class, iface)?;
        writeln!(decl, "public:")?;
        writeln!(decl, "  {}() {{}}", class)?;
        writeln!(decl, "  {}(hdf5pp::Group group, hsize_t idx) : m_group(group), m_idx(idx) {{}}\n", class)?;
        writeln!(decl, "  static void store(const {}& obj, hdf5pp::Group group, bool append);", iface)?;
        writeln!(decl, "private:")?;
        writeln!(decl, "  mutable hdf5pp::Group m_group;")?;
        writeln!(decl, "  hsize_t m_idx;")?;
        for dataset in &schema.datasets {
            let ds = format!("ns_{}_v{}::dataset_{}", dataset.name, schema.version, dataset.name);
            writeln!(decl, "  mutable boost::shared_ptr<{}> m_ds_{};", ds, dataset.name)?;
            writeln!(decl, "  void read_ds_{}() const;", dataset.name)?;
        }
        writeln!(decl, "}};\n")?;

        let def = &mut out.definition;
        for dataset in &schema.datasets {
            let ds = format!("ns_{}_v{}::dataset_{}", dataset.name, schema.version, dataset.name);
            writeln!(def, "void {}::read_ds_{}() const\n{{", class, dataset.name)?;
            writeln!(def, "  if (m_ds_{}) return;", dataset.name)?;
            writeln!(def, "  m_ds_{} = hdf5pp::Utils::readGroup<{}>(m_group, \"{}\", m_idx);", dataset.name, ds, dataset.name)?;
            writeln!(def, "}}")?;
        }
        writeln!(def, "void {}::store(const {}& obj, hdf5pp::Group group, bool append)\n{{", class, iface)?;
        for dataset in &schema.datasets {
            let ds = format!("ns_{}_v{}::dataset_{}", dataset.name, schema.version, dataset.name);
            writeln!(def, "  hdf5pp::Utils::storeObject(group, \"{}\", {}(obj), append);", dataset.name, ds)?;
        }
        writeln!(def, "}}\n")?;
        Ok(())
    }

    fn factories(&self, model: &Model, id: TypeId, schemas: &[&Schema], out: &mut Generated) -> Result<(), CodegenError> {
        let ty = model.ty(id);
        let class = cpp_class_name(model, id);
        let iface = self.interface_name(model, id);

        let mut config_args: Vec<Option<String>> = ty
            .configs
            .iter()
            .map(|c| Some(format!(", const boost::shared_ptr<{}>& cfg", self.interface_name(model, *c))))
            .collect();
        if config_args.is_empty() {
            config_args.push(None);
        }

        if schemas.iter().all(|s| s.embedded) {
            debug!(ty = %model.type_path(id), "all schemas embedded, no proxy factory");
        } else {
            for cfg in &config_args {
                let cfg = cfg.as_deref().unwrap_or("");
                let signature = format!(
                    "boost::shared_ptr<PSEvt::Proxy<{}> > make_{}(int version, hdf5pp::Group group, hsize_t idx{})",
                    iface, class, cfg
                );
                writeln!(out.declaration, "{};", signature)?;
                let def = &mut out.definition;
                writeln!(def, "{}\n{{", signature)?;
                writeln!(def, "  switch (version) {{")?;
                for schema in schemas.iter().filter(|s| !s.embedded) {
                    writeln!(def, "  case {}:", schema.version)?;
                    writeln!(
                        def,
                        "    return boost::make_shared<PSEvt::DataProxy<{}> >(boost::make_shared<{}_v{}>(group, idx));",
                        iface, class, schema.version
                    )?;
                }
                writeln!(def, "  default:")?;
                writeln!(def, "    return boost::make_shared<PSEvt::DataProxy<{}> >(boost::shared_ptr<{}>());", iface, iface)?;
                writeln!(def, "  }}")?;
                writeln!(def, "}}\n")?;
            }
        }

        let highest = schemas.iter().map(|s| s.version).max().unwrap_or(0);
        let signature = format!(
            "void store_{}(const {}& obj, hdf5pp::Group group, int version, bool append)",
            class, iface
        );
        writeln!(out.declaration, "{};", signature)?;
        let def = &mut out.definition;
        writeln!(def, "{}\n{{", signature)?;
        writeln!(def, "  if (version < 0) version = {};", highest)?;
        writeln!(def, "  switch (version) {{")?;
        for schema in schemas {
            writeln!(def, "  case {}:", schema.version)?;
            writeln!(def, "    {}_v{}::store(obj, group, append);", class, schema.version)?;
            writeln!(def, "    break;")?;
        }
        writeln!(def, "  default:")?;
        writeln!(def, "    throw ExceptionSchemaVersion(ERR_LOC, \"{}\", version);", model.type_path(id))?;
        writeln!(def, "  }}")?;
        writeln!(def, "}}\n")?;
        Ok(())
    }
}

impl Backend for SchemaBackend {
    fn name(&self) -> &'static str {
        "schema"
    }

    fn prologue(&mut self, model: &Model, out: &mut Generated) -> Result<(), CodegenError> {
        writeln!(out.declaration, "#pragma once\n")?;
        writeln!(out.declaration, "#include \"hdf5pp/Group.h\"")?;
        writeln!(out.declaration, "#include \"PSEvt/Proxy.h\"")?;
        for header in &model.use_headers {
            writeln!(out.declaration, "#include \"{}\"", header)?;
        }
        /* Dataset structs are needed by the declarations, hand-written schema classes only by the factories */
        let mut schema_headers: Vec<&str> = Vec::new();
        let mut dataset_headers: Vec<&str> = Vec::new();
        for id in model.emitted_types() {
            for schema in &model.ty(id).schemas {
                schema_headers.extend(schema.external.as_deref().filter(|h| !h.is_empty()));
                for dataset in &schema.datasets {
                    dataset_headers.extend(dataset.external.as_deref().filter(|h| !h.is_empty()));
                }
            }
        }
        for headers in [&mut schema_headers, &mut dataset_headers] {
            headers.sort_unstable();
            headers.dedup();
        }
        for header in dataset_headers {
            writeln!(out.declaration, "#include \"{}\"", header)?;
        }
        writeln!(out.declaration)?;
        writeln!(out.definition, "#include \"{}\"\n", self.options.header)?;
        writeln!(out.definition, "#include <boost/make_shared.hpp>")?;
        writeln!(out.definition, "#include \"hdf5pp/Utils.h\"")?;
        for header in schema_headers {
            writeln!(out.definition, "#include \"{}\"", header)?;
        }
        writeln!(out.definition)?;
        Ok(())
    }

    fn visit_type(&mut self, model: &Model, id: TypeId, out: &mut Generated) -> Result<(), CodegenError> {
        let schemas = Self::sorted_schemas(model, id);
        for schema in &schemas {
            /* The versioned class of an external schema lives in its header */
            if schema.external.is_some() {
                debug!(ty = %model.type_path(id), version = schema.version, "external schema, no classes");
                continue;
            }
            for dataset in &schema.datasets {
                if dataset.external.is_some() {
                    continue;
                }
                self.dataset_struct(model, id, schema, dataset, out)?;
            }
            self.versioned_class(model, id, schema, out)?;
        }
        self.factories(model, id, &schemas, out)
    }
}
