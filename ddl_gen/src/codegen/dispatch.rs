use super::engine::{Backend, CodegenError, Generated};
use super::hash::{self, HashFunction};
use super::helpers::{cpp_class_name, cpp_namespace, cpp_type_name, in_namespace};
use crate::ddl::model::{Model, TypeId};
use std::collections::BTreeMap;
use std::fmt::Write;
use tracing::{debug, warn};

/* Version bit marking a compressed payload of an event type */
pub const COMPRESSED_VERSION_FLAG: u32 = 0x8000;

#[derive(Debug, Clone)]
pub struct DispatchOptions {
    pub header: String,
    /* Namespace of the abstract interface types handed to the event store */
    pub interface_ns: String,
    /* Namespace wrapping the native accessor classes, if any */
    pub native_ns: Option<String>,
    pub ignored_type_ids: Vec<u32>,
    /* Text dispatch buckets larger than this are reported */
    pub bucket_threshold: usize,
    /* Text-keyed dispatch instead of numeric type ids */
    pub hashed: bool,
}

impl Default for DispatchOptions {
    fn default() -> Self {
        Self {
            header: "dispatch.h".to_string(),
            interface_ns: "Psana".to_string(),
            native_ns: None,
            ignored_type_ids: Vec::new(),
            bucket_threshold: 3,
            hashed: false,
        }
    }
}

/// Collects every emitted type during the traversal and writes one
/// converter function at the end.
pub struct DispatchBackend {
    options: DispatchOptions,
    types: Vec<TypeId>,
    selected: Option<(HashFunction, usize)>,
}

impl DispatchBackend {
    pub fn new(options: DispatchOptions) -> Self {
        Self { options, types: Vec::new(), selected: None }
    }

    /// Hash function chosen by the last text-keyed run, with its collision count.
    pub fn selected_hash(&self) -> Option<(HashFunction, usize)> {
        self.selected
    }

    fn native_name(&self, model: &Model, id: TypeId) -> String {
        in_namespace(self.options.native_ns.as_deref(), &cpp_type_name(model, id))
    }

    fn interface_name(&self, model: &Model, id: TypeId) -> String {
        in_namespace(Some(&self.options.interface_ns), &cpp_type_name(model, id))
    }

    /* Per-type store code shared by both converter flavours */
    fn store_statements(&self, model: &Model, id: TypeId, indent: &str, out: &mut String) -> Result<(), CodegenError> {
        let ty = model.ty(id);
        let native = self.native_name(model, id);
        let iface = self.interface_name(model, id);
        if ty.config_type {
            writeln!(out, "{}cfgStore.put(boost::shared_ptr<const {}>(xtc, (const {}*)xtc->payload()), src);", indent, native, native)?;
        } else if ty.value_type {
            writeln!(out, "{}evt.put(boost::make_shared<{}>(*(const {}*)xtc->payload()), src);", indent, native, native)?;
        } else if ty.configs.is_empty() {
            writeln!(out, "{}evt.putProxy<{}>(boost::make_shared<EvtProxy<{}, {}> >(xtc), src);", indent, iface, iface, native)?;
        } else {
            for (i, config) in ty.configs.iter().enumerate() {
                let cfg = self.native_name(model, *config);
                let keyword = if i == 0 { "if" } else { "} else if" };
                writeln!(out, "{}{} (boost::shared_ptr<const {}> cfgPtr = cfgStore.get(src)) {{", indent, keyword, cfg)?;
                writeln!(
                    out,
                    "{}  evt.putProxy<{}>(boost::make_shared<EvtProxyCfg<{}, {}, {}> >(xtc, cfgPtr), src);",
                    indent, iface, iface, native, cfg
                )?;
            }
            writeln!(out, "{}}}", indent)?;
        }
        Ok(())
    }

    fn numeric(&self, model: &Model, out: &mut Generated) -> Result<(), CodegenError> {
        let mut by_id: BTreeMap<u32, Vec<(u32, TypeId)>> = BTreeMap::new();
        for id in &self.types {
            let ty = model.ty(*id);
            if let Some(identity) = ty.identity {
                let versions = by_id.entry(identity.type_id).or_default();
                versions.push((identity.version, *id));
                if !ty.config_type {
                    versions.push((identity.version | COMPRESSED_VERSION_FLAG, *id));
                }
            }
        }
        for ignored in &self.options.ignored_type_ids {
            if by_id.contains_key(ignored) {
                debug!(type_id = ignored, "ignored type id shadows declared types");
            }
        }

        let signature = "void xtcConvert(const boost::shared_ptr<Pds::Xtc>& xtc, PSEvt::Event& evt, PSEnv::EnvObjectStore& cfgStore)";
        writeln!(out.declaration, "{};", signature)?;

        let def = &mut out.definition;
        writeln!(def, "{}\n{{", signature)?;
        writeln!(def, "  const Pds::Src& src = xtc->src;")?;
        writeln!(def, "  switch (xtc->contains.id()) {{")?;
        let mut ids: Vec<u32> = by_id.keys().copied().chain(self.options.ignored_type_ids.iter().copied()).collect();
        ids.sort_unstable();
        ids.dedup();
        for type_id in ids {
            writeln!(def, "  case {}:", type_id)?;
            if self.options.ignored_type_ids.contains(&type_id) {
                writeln!(def, "    // ignored")?;
                writeln!(def, "    break;")?;
                continue;
            }
            let mut versions = by_id.remove(&type_id).unwrap_or_default();
            versions.sort_by_key(|(version, _)| *version);
            versions.dedup_by_key(|(version, _)| *version);
            writeln!(def, "    switch (xtc->contains.version()) {{")?;
            for (version, id) in versions {
                writeln!(def, "    case {}:", version)?;
                writeln!(def, "      {{")?;
                writeln!(def, "        // {}", model.type_path(id))?;
                self.store_statements(model, id, "        ", def)?;
                writeln!(def, "      }}")?;
                writeln!(def, "      break;")?;
            }
            writeln!(def, "    }}")?;
            writeln!(def, "    break;")?;
        }
        writeln!(def, "  }}")?;
        writeln!(def, "}}")?;
        Ok(())
    }

    /* Every spelling a type can be looked up by */
    fn candidates(&self, model: &Model) -> Vec<(String, TypeId)> {
        let mut names: Vec<(String, TypeId)> = Vec::new();
        for id in &self.types {
            let ty = model.ty(*id);
            if !ty.schemas.is_empty() && ty.schemas.iter().all(|s| s.skip_proxy) {
                debug!(ty = %model.type_path(*id), "all schemas skip proxy, not dispatched");
                continue;
            }
            let spellings = std::iter::once(cpp_type_name(model, *id)).chain(ty.aliases.iter().cloned());
            for name in spellings {
                match names.iter().find(|(seen, _)| *seen == name) {
                    /* one case per spelling; the first type to claim it wins */
                    Some((_, owner)) if owner != id => warn!(
                        name = %name,
                        kept = %model.type_path(*owner),
                        dropped = %model.type_path(*id),
                        "type name claimed twice, keeping the first"
                    ),
                    Some(_) => {}
                    None => names.push((name, *id)),
                }
            }
        }
        names
    }

    fn hashed(&mut self, model: &Model, out: &mut Generated) -> Result<(), CodegenError> {
        let candidates = self.candidates(model);
        let names: Vec<&str> = candidates.iter().map(|(name, _)| name.as_str()).collect();
        let (function, collisions) = hash::select(&names);
        debug!(hash = function.name(), collisions, "selected string hash");
        self.selected = Some((function, collisions));

        let lookup: BTreeMap<&str, TypeId> = candidates.iter().map(|(n, id)| (n.as_str(), *id)).collect();
        let signature = "void hdfConvert(const hdf5pp::Group& group, int64_t idx, const std::string& typeName, int schema_version, const Pds::Src& src, PSEvt::Event& evt, PSEnv::EnvObjectStore& cfgStore)";
        writeln!(out.declaration, "{};", signature)?;

        let def = &mut out.definition;
        writeln!(def, "namespace {{\n")?;
        def.push_str(function.cpp_definition());
        writeln!(def, "\n}} // namespace\n")?;
        writeln!(def, "{}\n{{", signature)?;
        writeln!(def, "  switch (str_hash(typeName)) {{")?;
        for (value, bucket) in function.buckets(names.iter().copied()) {
            if bucket.len() > self.options.bucket_threshold {
                warn!(
                    hash = function.name(),
                    value,
                    size = bucket.len(),
                    threshold = self.options.bucket_threshold,
                    "dispatch bucket exceeds threshold"
                );
            }
            writeln!(def, "  case {}u:", value)?;
            if let [name] = bucket.as_slice() {
                let id = lookup[name];
                writeln!(def, "    // {}", name)?;
                self.make_statements(model, id, "    ", def)?;
            } else {
                for (i, name) in bucket.iter().enumerate() {
                    let keyword = if i == 0 { "if" } else { "} else if" };
                    writeln!(def, "    {} (typeName == \"{}\") {{", keyword, name)?;
                    self.make_statements(model, lookup[name], "      ", def)?;
                }
                writeln!(def, "    }}")?;
            }
            writeln!(def, "    break;")?;
        }
        writeln!(def, "  }}")?;
        writeln!(def, "}}")?;
        Ok(())
    }

    /* Stored-data variant: proxies come from the schema factories */
    fn make_statements(&self, model: &Model, id: TypeId, indent: &str, out: &mut String) -> Result<(), CodegenError> {
        let ty = model.ty(id);
        let iface = self.interface_name(model, id);
        let factory = in_namespace(
            Some(&cpp_namespace(model, ty.package)),
            &format!("make_{}", cpp_class_name(model, id)),
        );
        let store = if ty.config_type { "cfgStore" } else { "evt" };
        if ty.configs.is_empty() {
            writeln!(out, "{}{}.putProxy<{}>({}(schema_version, group, idx), src);", indent, store, iface, factory)?;
            return Ok(());
        }
        for (i, config) in ty.configs.iter().enumerate() {
            let cfg = self.interface_name(model, *config);
            let keyword = if i == 0 { "if" } else { "} else if" };
            writeln!(out, "{}{} (boost::shared_ptr<{}> cfgPtr = cfgStore.get(src)) {{", indent, keyword, cfg)?;
            writeln!(out, "{}  {}.putProxy<{}>({}(schema_version, group, idx, cfgPtr), src);", indent, store, iface, factory)?;
        }
        writeln!(out, "{}}}", indent)?;
        Ok(())
    }
}

impl Backend for DispatchBackend {
    fn name(&self) -> &'static str {
        if self.options.hashed { "dispatch-hash" } else { "dispatch" }
    }

    fn brackets_packages(&self) -> bool {
        false
    }

    fn prologue(&mut self, model: &Model, out: &mut Generated) -> Result<(), CodegenError> {
        self.types.clear();
        writeln!(out.declaration, "#pragma once\n")?;
        writeln!(out.declaration, "#include <string>")?;
        writeln!(out.declaration, "#include <boost/shared_ptr.hpp>")?;
        writeln!(out.definition, "#include \"{}\"\n", self.options.header)?;
        writeln!(out.definition, "#include <boost/make_shared.hpp>")?;
        for header in &model.use_headers {
            writeln!(out.definition, "#include \"{}\"", header)?;
        }
        writeln!(out.definition)?;
        Ok(())
    }

    fn visit_type(&mut self, _model: &Model, id: TypeId, _out: &mut Generated) -> Result<(), CodegenError> {
        self.types.push(id);
        Ok(())
    }

    fn finish(&mut self, model: &Model, out: &mut Generated) -> Result<(), CodegenError> {
        if self.options.hashed {
            self.hashed(model, out)
        } else {
            self.numeric(model, out)
        }
    }
}
