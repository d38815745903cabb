/* Model builder: declarations -> resolved, cross-referenced model.
 *
 * Pass 1 registers every package, type, enum and constant name. Pass 2
 * resolves references and expressions, computes layouts in dependency order,
 * propagates config dependence and synthesizes default schemas.
 */

use super::errors::SchemaError;
use super::expr::{self, Expr, ExprContext};
use super::file::Unit;
use super::layout_graph::{LayoutGraph, LayoutGraphError};
use super::model::*;
use ddl_types::{
  AttributeDecl, ConstDecl, CtorDecl, DatasetAttrDecl, EnumDecl, MethodDecl, PackageDecl,
  SchemaDecl, Tag, TypeDecl,
};
use indexmap::IndexMap;
use std::collections::{BTreeMap, HashMap};
use tracing::{debug, info, warn};

pub const DEFAULT_SCHEMA_NAME: &str = "default";
pub const DEFAULT_DATASET_NAME: &str = "data";

/* Build the model from loaded units; imported units must be part of `units` */
pub fn build(units: &[Unit]) -> Result<Model, SchemaError> {
  let mut builder = ModelBuilder::default();
  for unit in units {
    builder.register_unit(unit)?;
  }
  builder.resolve()?;
  let model = builder.model;
  info!(
    packages = model.packages.len(),
    types = model.types.len(),
    emitted = model.emitted_types().count(),
    "schema model built"
  );
  Ok(model)
}

#[derive(Debug, Clone, Copy)]
enum Resolved {
  Member(Member),
  Builtin(Builtin),
}

struct PendingType<'a> {
  id: TypeId,
  decl: &'a TypeDecl,
  path: String,
}

struct PendingConst<'a> {
  id: ConstId,
  decl: &'a ConstDecl,
  path: String,
}

struct PendingEnum<'a> {
  id: EnumId,
  decl: &'a EnumDecl,
  path: String,
}

#[derive(Default)]
struct ModelBuilder<'a> {
  model: Model,
  types: Vec<PendingType<'a>>,
  constants: Vec<PendingConst<'a>>,
  enums: Vec<PendingEnum<'a>>,
  explicit_offsets: HashMap<AttrId, Expr>,
}

fn split_tags(raw: &[String]) -> Vec<(String, Option<String>)> {
  Tag::parse_all(raw).into_iter().map(|t| (t.name, t.arg)).collect()
}

fn missing(path: &str, field: &str) -> SchemaError {
  SchemaError::MissingField { path: path.to_string(), field: field.to_string() }
}

fn unresolved(path: &str, name: &str) -> SchemaError {
  SchemaError::UnresolvedReference { path: path.to_string(), name: name.to_string() }
}

fn parse_access(access: Option<&str>, path: &str) -> Result<Access, SchemaError> {
  match access {
    None => Ok(Access::Public),
    Some(text) => Access::parse(text).ok_or_else(|| unresolved(path, text)),
  }
}

impl<'a> ModelBuilder<'a> {
  /* ---- pass 1: names ---- */

  fn register_unit(&mut self, unit: &'a Unit) -> Result<(), SchemaError> {
    debug!(path = %unit.path.display(), included = unit.included, "registering unit");
    for package in &unit.file.packages {
      self.register_package(None, package, unit.included)?;
    }
    if !unit.included {
      for import in &unit.file.uses {
        for header in &import.headers {
          if !self.model.use_headers.contains(header) {
            self.model.use_headers.push(header.clone());
          }
        }
      }
    }
    Ok(())
  }

  fn register_package(
    &mut self,
    parent: Option<PackageId>,
    decl: &'a PackageDecl,
    included: bool,
  ) -> Result<PackageId, SchemaError> {
    let mut current = parent;
    for segment in decl.name.split('.').map(str::trim).filter(|s| !s.is_empty()) {
      current = Some(self.open_package(current, segment, included)?);
    }
    let Some(id) = current.filter(|id| Some(*id) != parent) else {
      let path = parent.map(|p| self.model.package_path(p).join(".")).unwrap_or_default();
      return Err(missing(&path, "name"));
    };
    let path = self.model.package_path(id).join(".");

    let package = &mut self.model.packages[id.0];
    if decl.comment.is_some() {
      package.comment = decl.comment.clone();
    }
    for (name, arg) in split_tags(&decl.tags) {
      match (name.as_str(), arg) {
        ("external", _) => package.external = true,
        ("cpp_name", Some(cpp)) => package.cpp_name = Some(cpp),
        (_, arg) => {
          package.tags.insert(name.clone(), arg);
        }
      }
    }

    for constant in &decl.constants {
      self.register_constant(Scope::Package(id), constant, &path)?;
    }
    for e in &decl.enums {
      self.register_enum(Scope::Package(id), e, &path)?;
    }
    for nested in &decl.packages {
      self.register_package(Some(id), nested, included)?;
    }
    for ty in &decl.types {
      self.register_type(id, ty, included)?;
    }
    Ok(id)
  }

  fn open_package(
    &mut self,
    parent: Option<PackageId>,
    name: &str,
    included: bool,
  ) -> Result<PackageId, SchemaError> {
    let existing = match parent {
      None => self.model.roots.get(name).copied(),
      Some(p) => match self.model.package(p).members.get(name) {
        Some(Member::Package(id)) => Some(*id),
        Some(_) => {
          return Err(SchemaError::DuplicateName {
            path: self.model.package_path(p).join("."),
            name: name.to_string(),
          });
        }
        None => None,
      },
    };
    if let Some(id) = existing {
      if !included {
        self.model.packages[id.0].included = false;
      }
      return Ok(id);
    }

    let id = PackageId(self.model.packages.len());
    self.model.packages.push(Package {
      name: name.to_string(),
      parent,
      members: IndexMap::new(),
      comment: None,
      included,
      external: false,
      cpp_name: None,
      tags: RawTags::new(),
    });
    match parent {
      None => {
        self.model.roots.insert(name.to_string(), id);
      }
      Some(p) => {
        self.model.packages[p.0].members.insert(name.to_string(), Member::Package(id));
      }
    }
    Ok(id)
  }

  fn insert_package_member(&mut self, pkg: PackageId, name: &str, member: Member) -> Result<(), SchemaError> {
    if self.model.package(pkg).members.contains_key(name) {
      return Err(SchemaError::DuplicateName {
        path: self.model.package_path(pkg).join("."),
        name: name.to_string(),
      });
    }
    self.model.packages[pkg.0].members.insert(name.to_string(), member);
    Ok(())
  }

  fn check_type_scope_free(&self, ty: TypeId, name: &str) -> Result<(), SchemaError> {
    let t = self.model.ty(ty);
    if t.constants.contains_key(name) || t.enums.contains_key(name) {
      return Err(SchemaError::DuplicateName { path: self.model.type_path(ty), name: name.to_string() });
    }
    Ok(())
  }

  fn register_type(&mut self, pkg: PackageId, decl: &'a TypeDecl, included: bool) -> Result<(), SchemaError> {
    let pkg_path = self.model.package_path(pkg).join(".");
    if decl.name.trim().is_empty() {
      return Err(missing(&pkg_path, "name"));
    }
    let id = TypeId(self.model.types.len());
    self.insert_package_member(pkg, &decl.name, Member::Type(id))?;
    self.model.types.push(Type {
      name: decl.name.clone(),
      package: pkg,
      identity: None,
      base: None,
      pack: decl.pack,
      comment: decl.comment.clone(),
      configs: Vec::new(),
      value_type: false,
      config_type: false,
      external: false,
      no_sizeof: false,
      cpp_name: None,
      aliases: Vec::new(),
      tags: RawTags::new(),
      constants: IndexMap::new(),
      enums: IndexMap::new(),
      ctors: Vec::new(),
      attributes: Vec::new(),
      methods: Vec::new(),
      schemas: Vec::new(),
      size: Expr::Const(0),
      align: 1,
      config_dependent: false,
      included,
    });
    let path = format!("{}.{}", pkg_path, decl.name);

    for constant in &decl.constants {
      self.register_constant(Scope::Type(id), constant, &path)?;
    }
    for e in &decl.enums {
      self.register_enum(Scope::Type(id), e, &path)?;
    }
    self.types.push(PendingType { id, decl, path });
    Ok(())
  }

  fn register_constant(&mut self, scope: Scope, decl: &'a ConstDecl, owner_path: &str) -> Result<(), SchemaError> {
    if decl.name.trim().is_empty() {
      return Err(missing(owner_path, "name"));
    }
    let path = format!("{}.{}", owner_path, decl.name);
    let id = ConstId(self.model.constants.len());
    match scope {
      Scope::Package(pkg) => self.insert_package_member(pkg, &decl.name, Member::Constant(id))?,
      Scope::Type(ty) => {
        self.check_type_scope_free(ty, &decl.name)?;
        self.model.types[ty.0].constants.insert(decl.name.clone(), id);
      }
    }
    self.model.constants.push(Constant {
      name: decl.name.clone(),
      scope,
      value: Expr::Const(0),
      comment: decl.comment.clone(),
    });
    self.constants.push(PendingConst { id, decl, path });
    Ok(())
  }

  fn register_enum(&mut self, scope: Scope, decl: &'a EnumDecl, owner_path: &str) -> Result<(), SchemaError> {
    let Some(name) = decl.name.as_deref().filter(|n| !n.trim().is_empty()) else {
      return Err(missing(owner_path, "name"));
    };
    let path = format!("{}.{}", owner_path, name);
    let id = EnumId(self.model.enums.len());
    match scope {
      Scope::Package(pkg) => self.insert_package_member(pkg, name, Member::Enum(id))?,
      Scope::Type(ty) => {
        self.check_type_scope_free(ty, name)?;
        self.model.types[ty.0].enums.insert(name.to_string(), id);
      }
    }
    self.model.enums.push(Enum {
      name: name.to_string(),
      scope,
      base: Builtin::I32,
      constants: Vec::new(),
      comment: decl.comment.clone(),
    });
    self.enums.push(PendingEnum { id, decl, path });
    Ok(())
  }

  /* ---- name lookup ---- */

  fn type_member(&self, ty: TypeId, name: &str) -> Option<Resolved> {
    let t = self.model.ty(ty);
    t.enums
      .get(name)
      .map(|e| Member::Enum(*e))
      .or_else(|| t.constants.get(name).map(|c| Member::Constant(*c)))
      .map(Resolved::Member)
  }

  fn lookup_first(&self, from: Scope, name: &str) -> Option<Resolved> {
    let mut pkg_scope = match from {
      Scope::Type(ty) => {
        for owner in self.model.lineage(ty) {
          if let Some(found) = self.type_member(owner, name) {
            return Some(found);
          }
        }
        Some(self.model.ty(ty).package)
      }
      Scope::Package(pkg) => Some(pkg),
    };
    while let Some(pkg) = pkg_scope {
      let package = self.model.package(pkg);
      if let Some(member) = package.members.get(name) {
        return Some(Resolved::Member(*member));
      }
      pkg_scope = package.parent;
    }
    if let Some(root) = self.model.roots.get(name) {
      return Some(Resolved::Member(Member::Package(*root)));
    }
    Builtin::from_name(name).map(Resolved::Builtin)
  }

  /* Dotted names walk nested package/type scopes from the first segment */
  fn lookup(&self, from: Scope, name: &str) -> Option<Resolved> {
    let mut segments = name.trim().split('.');
    let mut current = self.lookup_first(from, segments.next()?)?;
    for segment in segments {
      current = match current {
        Resolved::Member(Member::Package(pkg)) => {
          Resolved::Member(*self.model.package(pkg).members.get(segment)?)
        }
        Resolved::Member(Member::Type(ty)) => self.type_member(ty, segment)?,
        _ => return None,
      };
    }
    Some(current)
  }

  fn resolve_type_ref(&self, owner: TypeId, name: &str, path: &str) -> Result<TypeRef, SchemaError> {
    match self.lookup(Scope::Type(owner), name) {
      Some(Resolved::Member(Member::Type(ty))) => Ok(TypeRef::Type(ty)),
      Some(Resolved::Member(Member::Enum(e))) => Ok(TypeRef::Enum(e)),
      Some(Resolved::Builtin(b)) => Ok(TypeRef::Builtin(b)),
      _ => Err(unresolved(path, name)),
    }
  }

  fn resolve_user_type(&self, owner: TypeId, name: &str) -> Option<TypeId> {
    match self.lookup(Scope::Type(owner), name) {
      Some(Resolved::Member(Member::Type(ty))) => Some(ty),
      _ => None,
    }
  }

  fn expr_context<'p>(&self, owner: TypeId, path: &'p str) -> ExprContext<'p> {
    ExprContext { owner: Some(owner), config: self.model.ty(owner).configs.first().copied(), path }
  }

  /* ---- pass 2 ---- */

  fn resolve(&mut self) -> Result<(), SchemaError> {
    let pending = std::mem::take(&mut self.types);

    for p in &pending {
      self.resolve_type_header(p)?;
    }
    self.check_identities()?;
    self.check_inheritance()?;
    self.resolve_constants()?;
    self.resolve_enums()?;
    for p in &pending {
      self.build_attributes(p)?;
    }
    for p in &pending {
      self.build_methods(p)?;
    }
    for p in &pending {
      self.build_ctors(p)?;
    }
    self.validate_self_refs()?;
    let order = self.compute_layout()?;
    self.compute_config_dependence()?;
    self.compute_storage(&order);
    for p in &pending {
      self.build_schemas(p)?;
    }
    Ok(())
  }

  fn resolve_type_header(&mut self, p: &PendingType<'a>) -> Result<(), SchemaError> {
    let decl = p.decl;

    let base = match &decl.base {
      Some(base_name) => match self.resolve_user_type(p.id, base_name) {
        Some(base) => Some(base),
        None => {
          return Err(SchemaError::UnknownBase { path: p.path.clone(), base: base_name.clone() });
        }
      },
      None => None,
    };

    let mut configs = Vec::new();
    for config in &decl.config {
      let ty = self.resolve_user_type(p.id, config).ok_or_else(|| unresolved(&p.path, config))?;
      if !configs.contains(&ty) {
        configs.push(ty);
      }
    }

    let identity = match (decl.type_id, decl.version) {
      (Some(type_id), Some(version)) => Some(Identity { type_id, version }),
      (Some(_), None) => return Err(missing(&p.path, "version")),
      (None, Some(_)) => {
        debug!(path = %p.path, "version without type-id does not form an identity");
        None
      }
      (None, None) => None,
    };

    let ty = &mut self.model.types[p.id.0];
    ty.base = base;
    ty.configs = configs;
    ty.identity = identity;
    for (name, arg) in split_tags(&decl.tags) {
      match (name.as_str(), arg) {
        ("value_type", None) => ty.value_type = true,
        ("config_type", None) => ty.config_type = true,
        ("external", _) => ty.external = true,
        ("no_sizeof", None) => ty.no_sizeof = true,
        ("cpp_name", Some(cpp)) => ty.cpp_name = Some(cpp),
        ("alias", Some(alias)) => ty.aliases.push(alias),
        (_, arg) => {
          ty.tags.insert(name.clone(), arg);
        }
      }
    }
    Ok(())
  }

  fn check_identities(&self) -> Result<(), SchemaError> {
    let mut seen: BTreeMap<(u32, u32), TypeId> = BTreeMap::new();
    for id in self.model.type_ids() {
      let Some(identity) = self.model.ty(id).identity else { continue };
      let key = (identity.type_id, identity.version);
      if let Some(first) = seen.get(&key) {
        return Err(SchemaError::DuplicateIdentity {
          type_id: identity.type_id,
          version: identity.version,
          first: self.model.type_path(*first),
          second: self.model.type_path(id),
        });
      }
      seen.insert(key, id);
    }
    Ok(())
  }

  fn check_inheritance(&self) -> Result<(), SchemaError> {
    for id in self.model.type_ids() {
      let mut chain = vec![id];
      let mut cursor = self.model.ty(id).base;
      while let Some(base) = cursor {
        if chain.contains(&base) {
          let mut names: Vec<String> = chain.iter().map(|t| self.model.type_path(*t)).collect();
          names.push(self.model.type_path(base));
          return Err(SchemaError::InheritanceCycle { path: self.model.type_path(id), chain: names });
        }
        chain.push(base);
        cursor = self.model.ty(base).base;
      }
    }
    Ok(())
  }

  fn resolve_constants(&mut self) -> Result<(), SchemaError> {
    let pending = std::mem::take(&mut self.constants);
    for p in &pending {
      let raw = p.decl.value.as_deref().ok_or_else(|| missing(&p.path, "value"))?;
      let owner = match self.model.constant(p.id).scope {
        Scope::Type(ty) => Some(ty),
        Scope::Package(_) => None,
      };
      let ctx = ExprContext { owner, config: None, path: &p.path };
      let value = expr::parse(raw, &ctx)?;
      if !value.self_refs().is_empty() {
        return Err(SchemaError::InvalidExpression {
          path: p.path.clone(),
          reason: "constants cannot refer to {self}".to_string(),
        });
      }
      self.model.constants[p.id.0].value = value;
    }
    Ok(())
  }

  fn resolve_enums(&mut self) -> Result<(), SchemaError> {
    let pending = std::mem::take(&mut self.enums);
    for p in &pending {
      let scope = self.model.enum_(p.id).scope;
      let base = match &p.decl.base {
        None => Builtin::I32,
        Some(name) => match self.lookup(scope, name) {
          Some(Resolved::Builtin(b)) if b.is_integer() => b,
          _ => return Err(unresolved(&p.path, name)),
        },
      };
      let owner = match scope {
        Scope::Type(ty) => Some(ty),
        Scope::Package(_) => None,
      };
      let mut constants = Vec::with_capacity(p.decl.constants.len());
      for c in &p.decl.constants {
        if c.name.trim().is_empty() {
          return Err(missing(&p.path, "name"));
        }
        if constants.iter().any(|k: &EnumConstant| k.name == c.name) {
          return Err(SchemaError::DuplicateName { path: p.path.clone(), name: c.name.clone() });
        }
        let cpath = format!("{}.{}", p.path, c.name);
        let ctx = ExprContext { owner, config: None, path: &cpath };
        let value = c.value.as_deref().map(|v| expr::parse(v, &ctx)).transpose()?;
        constants.push(EnumConstant { name: c.name.clone(), value, comment: c.comment.clone() });
      }
      let e = &mut self.model.enums[p.id.0];
      e.base = base;
      e.constants = constants;
    }
    Ok(())
  }

  fn add_method(&mut self, method: Method, path: &str) -> Result<MethodId, SchemaError> {
    let owner = method.owner;
    let clash = self.model.ty(owner).methods.iter().any(|m| self.model.method(*m).name == method.name);
    if clash {
      return Err(SchemaError::DuplicateName { path: path.to_string(), name: method.name });
    }
    let id = MethodId(self.model.methods.len());
    self.model.methods.push(method);
    self.model.types[owner.0].methods.push(id);
    Ok(id)
  }

  fn build_attributes(&mut self, p: &PendingType<'a>) -> Result<(), SchemaError> {
    for decl in &p.decl.attributes {
      self.build_attribute(p.id, decl, &p.path)?;
    }
    Ok(())
  }

  fn build_attribute(&mut self, owner: TypeId, decl: &AttributeDecl, type_path: &str) -> Result<(), SchemaError> {
    if decl.name.trim().is_empty() {
      return Err(missing(type_path, "name"));
    }
    let path = format!("{}.{}", type_path, decl.name);
    if self.model.ty(owner).attributes.iter().any(|a| self.model.attr(*a).name == decl.name) {
      return Err(SchemaError::DuplicateName { path: type_path.to_string(), name: decl.name.clone() });
    }
    let type_name = decl.type_name.as_deref().ok_or_else(|| missing(&path, "type"))?;
    let ty = self.resolve_type_ref(owner, type_name, &path)?;
    let ctx = self.expr_context(owner, &path);

    let mut shape = Vec::with_capacity(decl.shape.len());
    for (index, dim) in decl.shape.iter().enumerate() {
      let dim = dim.trim();
      if dim == "*" {
        if index != 0 {
          return Err(SchemaError::InvalidShape {
            path,
            reason: format!("dimension {} is unbounded; only the leading dimension may be", index),
          });
        }
        shape.push(Dim::Unbounded);
      } else if dim.is_empty() {
        return Err(SchemaError::InvalidShape { path, reason: format!("dimension {} is empty", index) });
      } else {
        let count = expr::parse(dim, &ctx)?;
        if let Expr::Const(n) = count {
          if n <= 0 {
            return Err(SchemaError::InvalidShape { path, reason: format!("dimension {} has size {}", index, n) });
          }
        }
        shape.push(Dim::Bounded(count));
      }
    }

    let offset = decl.offset.as_deref().map(|o| expr::parse(o, &ctx)).transpose()?;
    let access = parse_access(decl.access.as_deref(), &path)?;
    let mut tags = RawTags::new();
    for (name, arg) in split_tags(&decl.tags) {
      tags.insert(name, arg);
    }

    let id = AttrId(self.model.attributes.len());
    let rank = shape.len() as u32;
    self.model.attributes.push(Attribute {
      name: decl.name.clone(),
      owner,
      ty,
      shape,
      bitfields: Vec::new(),
      accessor: None,
      offset: Expr::Const(0),
      elem_size: Expr::Const(0),
      access,
      comment: decl.comment.clone(),
      tags,
      config_dependent: false,
      stored: false,
    });
    self.model.types[owner.0].attributes.push(id);
    if let Some(offset) = offset {
      self.explicit_offsets.insert(id, offset);
    }

    let accessor_name = match &decl.accessor {
      Some(name) => name.clone(),
      None => self.model.attr(id).default_accessor_name().to_string(),
    };
    let accessor = self.add_method(
      Method {
        name: accessor_name,
        owner,
        ret: Some(ty),
        rank,
        args: Vec::new(),
        body: MethodBody::Attribute(id),
        access,
        inline: false,
        comment: decl.comment.clone(),
        tags: RawTags::new(),
        config_dependent: false,
      },
      &path,
    )?;
    self.model.attributes[id.0].accessor = Some(accessor);

    if !decl.bitfields.is_empty() {
      self.build_bitfields(owner, id, decl, type_name, &path)?;
    }
    Ok(())
  }

  fn build_bitfields(
    &mut self,
    owner: TypeId,
    attr: AttrId,
    decl: &AttributeDecl,
    type_name: &str,
    path: &str,
  ) -> Result<(), SchemaError> {
    let storage = match self.model.attr(attr).ty {
      TypeRef::Builtin(b) if b.is_integer() && decl.shape.is_empty() => b,
      _ => {
        return Err(SchemaError::BitfieldStorage { path: path.to_string(), storage: type_name.to_string() });
      }
    };

    let mut cursor = 0u32;
    let mut placed: Vec<(String, u32, u32)> = Vec::new();
    for bf in &decl.bitfields {
      let bpath = format!("{}.{}", path, bf.name);
      let width = bf.size.ok_or_else(|| missing(&bpath, "size"))?;
      if width == 0 {
        return Err(SchemaError::InvalidShape { path: bpath, reason: "bitfield width is zero".to_string() });
      }
      let offset = bf.offset.unwrap_or(cursor);
      let end = match offset.checked_add(width) {
        Some(end) if end <= storage.bits() => end,
        end => {
          return Err(SchemaError::BitfieldOverflow {
            path: bpath,
            end: end.unwrap_or(u32::MAX),
            width: storage.bits(),
          });
        }
      };
      if let Some((other, _, _)) = placed.iter().find(|(_, start, stop)| offset < *stop && *start < end) {
        return Err(SchemaError::BitfieldOverlap {
          path: path.to_string(),
          first: other.clone(),
          second: bf.name.clone(),
        });
      }
      placed.push((bf.name.clone(), offset, end));
      cursor = end;

      let ty = match &bf.type_name {
        Some(name) => self.resolve_type_ref(owner, name, &bpath)?,
        None => TypeRef::Builtin(storage),
      };
      let id = BitfieldId(self.model.bitfields.len());
      self.model.bitfields.push(Bitfield {
        name: bf.name.clone(),
        attr,
        offset,
        width,
        ty,
        accessor: None,
        comment: bf.comment.clone(),
      });
      self.model.attributes[attr.0].bitfields.push(id);

      let accessor = self.add_method(
        Method {
          name: bf.accessor.clone().unwrap_or_else(|| bf.name.clone()),
          owner,
          ret: Some(ty),
          rank: 0,
          args: Vec::new(),
          body: MethodBody::Bitfield(id),
          access: self.model.attr(attr).access,
          inline: false,
          comment: bf.comment.clone(),
          tags: RawTags::new(),
          config_dependent: false,
        },
        &bpath,
      )?;
      self.model.bitfields[id.0].accessor = Some(accessor);
    }
    Ok(())
  }

  fn build_methods(&mut self, p: &PendingType<'a>) -> Result<(), SchemaError> {
    for decl in &p.decl.methods {
      self.build_method(p.id, decl, &p.path)?;
    }
    Ok(())
  }

  fn build_method(&mut self, owner: TypeId, decl: &MethodDecl, type_path: &str) -> Result<(), SchemaError> {
    if decl.name.trim().is_empty() {
      return Err(missing(type_path, "name"));
    }
    let path = format!("{}.{}", type_path, decl.name);
    let ret = match decl.type_name.as_deref() {
      None | Some("void") => None,
      Some(name) => Some(self.resolve_type_ref(owner, name, &path)?),
    };
    let mut args = Vec::with_capacity(decl.args.len());
    for arg in &decl.args {
      let ty = arg.type_name.as_deref().map(|t| self.resolve_type_ref(owner, t, &path)).transpose()?;
      args.push(Arg { name: arg.name.clone(), ty });
    }

    let ctx = self.expr_context(owner, &path);
    let parse_bodies = |bodies: &BTreeMap<String, String>| -> Result<BTreeMap<String, Expr>, SchemaError> {
      bodies.iter().map(|(lang, text)| expr::parse(text, &ctx).map(|e| (lang.clone(), e))).collect()
    };
    let body = match (decl.expr.is_empty(), decl.code.is_empty()) {
      (true, true) => MethodBody::External,
      (false, true) => MethodBody::Expr(parse_bodies(&decl.expr)?),
      (true, false) => MethodBody::Code(parse_bodies(&decl.code)?),
      (false, false) => {
        return Err(SchemaError::InvalidExpression {
          path,
          reason: "method declares both expr and code bodies".to_string(),
        });
      }
    };

    let access = parse_access(decl.access.as_deref(), &path)?;
    let mut inline = false;
    let mut tags = RawTags::new();
    for (name, arg) in split_tags(&decl.tags) {
      match (name.as_str(), arg) {
        ("inline", None) => inline = true,
        (_, arg) => {
          tags.insert(name.clone(), arg);
        }
      }
    }

    self.add_method(
      Method {
        name: decl.name.clone(),
        owner,
        ret,
        rank: decl.rank,
        args,
        body,
        access,
        inline,
        comment: decl.comment.clone(),
        tags,
        config_dependent: false,
      },
      &path,
    )?;
    Ok(())
  }

  fn find_dest(&self, owner: TypeId, name: &str) -> Option<Dest> {
    if let Some(attr) = self.model.find_attribute(owner, name) {
      return Some(Dest::Attribute(attr));
    }
    self.model.lineage(owner).into_iter().find_map(|t| {
      self.model.ty(t).attributes.iter().find_map(|a| {
        self.model.attr(*a)
          .bitfields
          .iter()
          .copied()
          .find(|b| self.model.bitfield(*b).name == name)
          .map(Dest::Bitfield)
      })
    })
  }

  fn dest_type(&self, dest: Dest) -> TypeRef {
    match dest {
      Dest::Attribute(a) => self.model.attr(a).ty,
      Dest::Bitfield(b) => self.model.bitfield(b).ty,
    }
  }

  fn build_ctors(&mut self, p: &PendingType<'a>) -> Result<(), SchemaError> {
    for (index, decl) in p.decl.ctors.iter().enumerate() {
      let ctor = self.build_ctor(p.id, decl, &format!("{}.ctor[{}]", p.path, index))?;
      self.model.types[p.id.0].ctors.push(ctor);
    }
    Ok(())
  }

  fn build_ctor(&self, owner: TypeId, decl: &CtorDecl, path: &str) -> Result<Ctor, SchemaError> {
    let ctx = self.expr_context(owner, path);
    let mut ctor = Ctor { comment: decl.comment.clone(), ..Ctor::default() };

    for (name, arg) in split_tags(&decl.tags) {
      match (name.as_str(), arg) {
        ("auto", None) => ctor.auto = true,
        ("inline", None) => ctor.inline = true,
        ("external", None) => ctor.external = true,
        ("force_definition", None) => ctor.force_definition = true,
        (_, arg) => {
          ctor.tags.insert(name.clone(), arg);
        }
      }
    }

    for arg in &decl.args {
      let dest = match &arg.dest {
        Some(dest) => Some(self.find_dest(owner, dest).ok_or_else(|| SchemaError::UnknownDestination {
          path: path.to_string(),
          dest: dest.clone(),
        })?),
        None => None,
      };
      let ty = match (&arg.type_name, dest) {
        (Some(name), _) => self.resolve_type_ref(owner, name, path)?,
        (None, Some(dest)) => self.dest_type(dest),
        (None, None) => return Err(missing(&format!("{}.{}", path, arg.name), "type")),
      };
      let value = arg.expr.as_deref().map(|e| expr::parse(e, &ctx)).transpose()?;
      ctor.args.push(CtorArg { name: arg.name.clone(), ty, dest, expr: value, method: arg.method.clone() });
    }
    for init in &decl.init {
      let dest = self.find_dest(owner, &init.dest).ok_or_else(|| SchemaError::UnknownDestination {
        path: path.to_string(),
        dest: init.dest.clone(),
      })?;
      ctor.inits.push(CtorInit { dest, expr: expr::parse(&init.expr, &ctx)? });
    }

    if !ctor.force_definition && ctor.args.iter().any(|a| a.dest.is_none()) {
      warn!(path, "constructor argument without destination; only a declaration is generated");
    }
    Ok(ctor)
  }

  /* Every `{self}.name` must name an attribute or method of the type or its bases */
  fn validate_self_refs(&self) -> Result<(), SchemaError> {
    for id in self.model.type_ids() {
      let ty = self.model.ty(id);
      let mut exprs: Vec<(String, &Expr)> = Vec::new();
      for attr_id in &ty.attributes {
        let attr = self.model.attr(*attr_id);
        let path = format!("{}.{}", self.model.type_path(id), attr.name);
        for dim in &attr.shape {
          if let Dim::Bounded(e) = dim {
            exprs.push((path.clone(), e));
          }
        }
        if let Some(offset) = self.explicit_offsets.get(attr_id) {
          exprs.push((path, offset));
        }
      }
      for method_id in &ty.methods {
        let method = self.model.method(*method_id);
        if let MethodBody::Expr(bodies) | MethodBody::Code(bodies) = &method.body {
          let path = format!("{}.{}", self.model.type_path(id), method.name);
          exprs.extend(bodies.values().map(|e| (path.clone(), e)));
        }
      }
      for ctor in &ty.ctors {
        let path = format!("{}.ctor", self.model.type_path(id));
        exprs.extend(ctor.args.iter().filter_map(|a| a.expr.as_ref()).map(|e| (path.clone(), e)));
        exprs.extend(ctor.inits.iter().map(|i| (path.clone(), &i.expr)));
      }

      for (path, e) in exprs {
        for name in e.self_refs() {
          if self.model.find_attribute(id, name).is_none() && self.model.find_method(id, name).is_none() {
            return Err(unresolved(&path, name));
          }
        }
      }
    }
    Ok(())
  }

  /* ---- layout ---- */

  /* Lays out every type, bases and embedded types first; returns that order */
  fn compute_layout(&mut self) -> Result<Vec<TypeId>, SchemaError> {
    let order = LayoutGraph::build(&self.model).topo_order().map_err(|err| match err {
      LayoutGraphError::CircularDependency(cycle) => SchemaError::LayoutCycle {
        path: cycle.first().cloned().unwrap_or_default(),
        cycle,
      },
    })?;
    for id in &order {
      self.layout_type(*id)?;
    }
    Ok(order)
  }

  /* Size and alignment of one element of an attribute */
  fn element_layout(&self, attr: AttrId) -> (Expr, u32) {
    let a = self.model.attr(attr);
    match a.ty {
      TypeRef::Builtin(b) => (Expr::Const(b.size() as i64), b.size()),
      TypeRef::Enum(e) => {
        let base = self.model.enum_(e).base;
        (Expr::Const(base.size() as i64), base.size())
      }
      TypeRef::Type(target) => {
        let target = self.model.ty(target);
        if target.size.is_constant() {
          return (target.size.clone(), target.align);
        }
        /* Variable-size element: ask the first element for its size */
        let accessor = a.accessor.map(|m| self.model.method(m).name.clone()).unwrap_or_default();
        let zeros = vec!["0"; a.rank()].join(", ");
        let size = Expr::Concat(vec![Expr::SelfAttr(accessor), Expr::Opaque(format!("({})._sizeof()", zeros))]);
        (size, target.align)
      }
    }
  }

  fn layout_type(&mut self, id: TypeId) -> Result<(), SchemaError> {
    let ty = self.model.ty(id);
    let pack = ty.pack;
    let attributes = ty.attributes.clone();
    let (mut cursor, mut align) = match ty.base {
      Some(base) => (self.model.ty(base).size.clone(), self.model.ty(base).align),
      None => (Expr::Const(0), 1),
    };
    let type_path = self.model.type_path(id);
    let mut open_ended: Option<String> = None;

    for attr_id in attributes {
      let (elem_size, elem_align) = self.element_layout(attr_id);
      let attr = self.model.attr(attr_id);
      if let Some(previous) = &open_ended {
        return Err(SchemaError::InvalidShape {
          path: format!("{}.{}", type_path, attr.name),
          reason: format!("attribute follows unbounded attribute '{}'", previous),
        });
      }
      let effective_align = pack.map(|n| n.min(elem_align)).unwrap_or(1).max(1);
      let offset = match self.explicit_offsets.get(&attr_id) {
        Some(explicit) => explicit.clone(),
        None => match (&cursor, pack) {
          (Expr::Const(c), Some(_)) => {
            let a = effective_align as i64;
            Expr::Const((c + a - 1) / a * a)
          }
          _ => cursor.clone(),
        },
      };

      let mut counts = Vec::with_capacity(attr.shape.len());
      let mut unbounded = false;
      for dim in &attr.shape {
        match dim {
          Dim::Bounded(e) => counts.push(e.clone()),
          Dim::Unbounded => unbounded = true,
        }
      }
      if unbounded {
        open_ended = Some(attr.name.clone());
        cursor = offset.clone();
      } else {
        cursor = Expr::add(offset.clone(), Expr::mul(elem_size.clone(), Expr::product(counts)));
      }
      if pack.is_some() {
        align = align.max(effective_align);
      }

      let attr = &mut self.model.attributes[attr_id.0];
      attr.offset = offset;
      attr.elem_size = elem_size;
    }

    debug!(ty = %type_path, size = %cursor, "computed layout");
    let ty = &mut self.model.types[id.0];
    ty.size = cursor;
    ty.align = align;
    Ok(())
  }

  /* ---- config dependence ---- */

  fn member_depends(&self, owner: TypeId, name: &str) -> bool {
    if let Some(attr) = self.model.find_attribute(owner, name) {
      return self.model.attr(attr).config_dependent;
    }
    self.model.find_method(owner, name).is_some_and(|m| self.model.method(m).config_dependent)
  }

  fn expr_depends(&self, owner: TypeId, e: &Expr) -> bool {
    e.has_config_ref() || e.self_refs().into_iter().any(|name| self.member_depends(owner, name))
  }

  fn attr_depends(&self, id: AttrId) -> bool {
    let attr = self.model.attr(id);
    let owner = attr.owner;
    let dims = attr.shape.iter().any(|d| matches!(d, Dim::Bounded(e) if self.expr_depends(owner, e)));
    let nested = matches!(attr.ty, TypeRef::Type(t) if self.model.ty(t).config_dependent);
    dims || nested || self.expr_depends(owner, &attr.offset) || self.expr_depends(owner, &attr.elem_size)
  }

  fn method_depends(&self, id: MethodId) -> bool {
    let method = self.model.method(id);
    match &method.body {
      MethodBody::Attribute(a) => self.model.attr(*a).config_dependent,
      MethodBody::Bitfield(b) => self.model.attr(self.model.bitfield(*b).attr).config_dependent,
      MethodBody::Expr(bodies) | MethodBody::Code(bodies) => {
        bodies.values().any(|e| self.expr_depends(method.owner, e))
      }
      MethodBody::External => false,
    }
  }

  fn compute_config_dependence(&mut self) -> Result<(), SchemaError> {
    loop {
      let mut changed = false;
      for index in 0..self.model.attributes.len() {
        if !self.model.attributes[index].config_dependent && self.attr_depends(AttrId(index)) {
          self.model.attributes[index].config_dependent = true;
          changed = true;
        }
      }
      for index in 0..self.model.methods.len() {
        if !self.model.methods[index].config_dependent && self.method_depends(MethodId(index)) {
          self.model.methods[index].config_dependent = true;
          changed = true;
        }
      }
      for index in 0..self.model.types.len() {
        let id = TypeId(index);
        if !self.model.types[index].config_dependent && self.expr_depends(id, &self.model.ty(id).size) {
          self.model.types[index].config_dependent = true;
          changed = true;
        }
      }
      if !changed {
        break;
      }
    }

    /* Dependence reached through embedded types still needs a config to pass along */
    for id in self.model.type_ids() {
      let ty = self.model.ty(id);
      if !ty.configs.is_empty() {
        continue;
      }
      let dependent = ty
        .attributes
        .iter()
        .map(|a| self.model.attr(*a))
        .find(|a| a.config_dependent);
      if let Some(attr) = dependent {
        return Err(SchemaError::MissingConfig {
          path: format!("{}.{}", self.model.type_path(id), attr.name),
          expr: self.model.type_ref_name(&attr.ty),
        });
      }
    }
    Ok(())
  }

  /* Leading attributes with fixed, config-free layout get real storage members */
  fn compute_storage(&mut self, order: &[TypeId]) {
    for id in order {
      let ty = &self.model.types[id.0];
      let base_fully_stored = ty.base.is_none_or(|base| {
        self.model.ty(base).attributes.iter().all(|a| self.model.attr(*a).stored)
      });
      let mut storing = base_fully_stored;
      let mut end = match ty.base {
        Some(base) => self.model.ty(base).size.constant(),
        None => Some(0),
      };
      let attributes = ty.attributes.clone();
      for attr_id in attributes {
        let attr = &self.model.attributes[attr_id.0];
        let fixed = attr.offset.constant().zip(attr.elem_size.constant()).and_then(|(offset, size)| {
          let mut count = 1i64;
          for dim in &attr.shape {
            match dim {
              Dim::Bounded(Expr::Const(n)) => count *= n,
              _ => return None,
            }
          }
          Some((offset, offset + size * count))
        });
        storing = storing
          && !attr.config_dependent
          && matches!((fixed, end), (Some((offset, _)), Some(previous)) if offset >= previous);
        if !storing {
          break;
        }
        end = fixed.map(|(_, stop)| stop);
        self.model.attributes[attr_id.0].stored = true;
      }
    }
  }

  /* ---- schemas ---- */

  fn default_datasets(&self, id: TypeId) -> Vec<Dataset> {
    let attributes = self
      .model
      .ty(id)
      .attributes
      .iter()
      .map(|a| {
        let attr = self.model.attr(*a);
        let accessor = attr
          .accessor
          .map(|m| self.model.method(m).name.clone())
          .unwrap_or_else(|| attr.default_accessor_name().to_string());
        DatasetAttr {
          name: accessor.clone(),
          method: accessor,
          rank: attr.rank() as u32,
          tags: RawTags::new(),
          source: DatasetSource::Attribute(*a),
        }
      })
      .collect();
    vec![Dataset {
      name: DEFAULT_DATASET_NAME.to_string(),
      external: None,
      tags: RawTags::new(),
      attributes,
    }]
  }

  fn resolve_dataset_attr(&self, owner: TypeId, decl: &DatasetAttrDecl, path: &str) -> Result<DatasetAttr, SchemaError> {
    let lookup = decl.method.as_deref().unwrap_or(&decl.name);
    let source = match self.model.find_method(owner, lookup) {
      Some(m) => match self.model.method(m).body {
        MethodBody::Attribute(a) => DatasetSource::Attribute(a),
        _ => DatasetSource::Method(m),
      },
      None => match self.model.find_attribute(owner, lookup) {
        Some(a) => DatasetSource::Attribute(a),
        None => return Err(unresolved(path, lookup)),
      },
    };
    let (method, natural_rank) = match source {
      DatasetSource::Attribute(a) => {
        let attr = self.model.attr(a);
        let name = attr.accessor.map(|m| self.model.method(m).name.clone()).unwrap_or_else(|| lookup.to_string());
        (name, attr.rank() as u32)
      }
      DatasetSource::Method(m) => (self.model.method(m).name.clone(), self.model.method(m).rank),
    };
    let mut tags = RawTags::new();
    for (name, arg) in split_tags(&decl.tags) {
      tags.insert(name, arg);
    }
    Ok(DatasetAttr {
      name: decl.name.clone(),
      method,
      rank: decl.rank.unwrap_or(natural_rank),
      tags,
      source,
    })
  }

  fn build_schema(&self, owner: TypeId, decl: &SchemaDecl, type_path: &str) -> Result<Schema, SchemaError> {
    let name = decl.name.clone().unwrap_or_else(|| DEFAULT_SCHEMA_NAME.to_string());
    let path = format!("{}.{}", type_path, name);
    let mut schema = Schema {
      name,
      version: decl.version,
      external: None,
      embedded: false,
      skip_proxy: false,
      default: false,
      tags: RawTags::new(),
      datasets: Vec::new(),
    };
    for (tag, arg) in split_tags(&decl.tags) {
      match (tag.as_str(), arg) {
        ("external", header) => schema.external = Some(header.unwrap_or_default()),
        ("embedded", None) => schema.embedded = true,
        ("skip_proxy", None) => schema.skip_proxy = true,
        ("default", None) => schema.default = true,
        (_, arg) => {
          schema.tags.insert(tag.clone(), arg);
        }
      }
    }

    for ds in &decl.datasets {
      let ds_path = format!("{}.{}", path, ds.name);
      if schema.datasets.iter().any(|d| d.name == ds.name) {
        return Err(SchemaError::DuplicateName { path: path.clone(), name: ds.name.clone() });
      }
      let mut dataset = Dataset { name: ds.name.clone(), external: None, tags: RawTags::new(), attributes: Vec::new() };
      for (tag, arg) in split_tags(&ds.tags) {
        match (tag.as_str(), arg) {
          ("external", header) => dataset.external = Some(header.unwrap_or_default()),
          (_, arg) => {
            dataset.tags.insert(tag.clone(), arg);
          }
        }
      }
      for attr in &ds.attributes {
        dataset.attributes.push(self.resolve_dataset_attr(owner, attr, &ds_path)?);
      }
      schema.datasets.push(dataset);
    }

    /* A default-tagged schema without datasets takes over the default layout */
    if schema.default && schema.datasets.is_empty() {
      schema.datasets = self.default_datasets(owner);
    }
    Ok(schema)
  }

  fn build_schemas(&mut self, p: &PendingType<'a>) -> Result<(), SchemaError> {
    let mut schemas: Vec<Schema> = Vec::with_capacity(p.decl.schemas.len().max(1));
    for decl in &p.decl.schemas {
      let schema = self.build_schema(p.id, decl, &p.path)?;
      if schemas.iter().any(|s| s.name == schema.name && s.version == schema.version) {
        return Err(SchemaError::DuplicateSchema { path: p.path.clone(), name: schema.name, version: schema.version });
      }
      schemas.push(schema);
    }
    if schemas.is_empty() {
      schemas.push(Schema {
        name: DEFAULT_SCHEMA_NAME.to_string(),
        version: 0,
        external: None,
        embedded: false,
        skip_proxy: false,
        default: true,
        tags: RawTags::new(),
        datasets: self.default_datasets(p.id),
      });
    }
    self.model.types[p.id.0].schemas = schemas;
    Ok(())
  }
}
