/* Resolved schema model.
 *
 * The model is an arena: every node lives in one of the vectors of `Model`
 * and cross references are typed indices into those vectors. After the
 * builder returns, the model is never mutated again.
 */

use super::expr::Expr;
use indexmap::IndexMap;
use std::collections::BTreeMap;

macro_rules! arena_id {
  ($($name:ident),* $(,)?) => {
    $(
      #[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
      pub struct $name(pub usize);
    )*
  };
}

arena_id!(PackageId, TypeId, AttrId, BitfieldId, MethodId, EnumId, ConstId);

/* Tags nobody consumed, keyed by normalized tag name */
pub type RawTags = BTreeMap<String, Option<String>>;

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Member {
  Package(PackageId),
  Type(TypeId),
  Enum(EnumId),
  Constant(ConstId),
}

/* Owner of an enum or constant */
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Scope {
  Package(PackageId),
  Type(TypeId),
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Builtin {
  Char,
  I8,
  U8,
  I16,
  U16,
  I32,
  U32,
  I64,
  U64,
  F32,
  F64,
}

impl Builtin {
  pub const ALL: [Builtin; 11] = [
    Builtin::Char,
    Builtin::I8,
    Builtin::U8,
    Builtin::I16,
    Builtin::U16,
    Builtin::I32,
    Builtin::U32,
    Builtin::I64,
    Builtin::U64,
    Builtin::F32,
    Builtin::F64,
  ];

  pub fn from_name(name: &str) -> Option<Builtin> {
    Builtin::ALL.into_iter().find(|b| b.name() == name)
  }

  pub fn name(self) -> &'static str {
    match self {
      Builtin::Char => "char",
      Builtin::I8 => "int8_t",
      Builtin::U8 => "uint8_t",
      Builtin::I16 => "int16_t",
      Builtin::U16 => "uint16_t",
      Builtin::I32 => "int32_t",
      Builtin::U32 => "uint32_t",
      Builtin::I64 => "int64_t",
      Builtin::U64 => "uint64_t",
      Builtin::F32 => "float",
      Builtin::F64 => "double",
    }
  }

  pub fn size(self) -> u32 {
    match self {
      Builtin::Char | Builtin::I8 | Builtin::U8 => 1,
      Builtin::I16 | Builtin::U16 => 2,
      Builtin::I32 | Builtin::U32 | Builtin::F32 => 4,
      Builtin::I64 | Builtin::U64 | Builtin::F64 => 8,
    }
  }

  pub fn is_integer(self) -> bool {
    !matches!(self, Builtin::F32 | Builtin::F64)
  }

  pub fn bits(self) -> u32 {
    self.size() * 8
  }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum TypeRef {
  Type(TypeId),
  Enum(EnumId),
  Builtin(Builtin),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Dim {
  Bounded(Expr),
  Unbounded,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub enum Access {
  #[default]
  Public,
  Protected,
  Private,
}

impl Access {
  pub fn parse(text: &str) -> Option<Access> {
    match text {
      "public" => Some(Access::Public),
      "protected" => Some(Access::Protected),
      "private" => Some(Access::Private),
      _ => None,
    }
  }

  pub fn keyword(self) -> &'static str {
    match self {
      Access::Public => "public",
      Access::Protected => "protected",
      Access::Private => "private",
    }
  }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Identity {
  pub type_id: u32,
  pub version: u32,
}

#[derive(Debug, Clone)]
pub struct Package {
  pub name: String,
  pub parent: Option<PackageId>,
  pub members: IndexMap<String, Member>,
  pub comment: Option<String>,
  /* True when every declaration of the package comes from an imported file */
  pub included: bool,
  pub external: bool,
  pub cpp_name: Option<String>,
  pub tags: RawTags,
}

#[derive(Debug, Clone)]
pub struct Type {
  pub name: String,
  pub package: PackageId,
  pub identity: Option<Identity>,
  pub base: Option<TypeId>,
  pub pack: Option<u32>,
  pub comment: Option<String>,
  pub configs: Vec<TypeId>,
  pub value_type: bool,
  pub config_type: bool,
  pub external: bool,
  pub no_sizeof: bool,
  pub cpp_name: Option<String>,
  pub aliases: Vec<String>,
  pub tags: RawTags,
  pub constants: IndexMap<String, ConstId>,
  pub enums: IndexMap<String, EnumId>,
  pub ctors: Vec<Ctor>,
  pub attributes: Vec<AttrId>,
  pub methods: Vec<MethodId>,
  pub schemas: Vec<Schema>,
  pub size: Expr,
  pub align: u32,
  pub config_dependent: bool,
  pub included: bool,
}

#[derive(Debug, Clone)]
pub struct Attribute {
  pub name: String,
  pub owner: TypeId,
  pub ty: TypeRef,
  pub shape: Vec<Dim>,
  pub bitfields: Vec<BitfieldId>,
  pub accessor: Option<MethodId>,
  pub offset: Expr,
  /* Size of one element of the attribute */
  pub elem_size: Expr,
  pub access: Access,
  pub comment: Option<String>,
  pub tags: RawTags,
  pub config_dependent: bool,
  /* Part of the leading run of attributes with a fixed, config-free layout */
  pub stored: bool,
}

impl Attribute {
  pub fn rank(&self) -> usize {
    self.shape.len()
  }

  /* Name of the backing storage member */
  pub fn field_name(&self) -> String {
    if self.name.starts_with('_') {
      self.name.clone()
    } else {
      format!("_{}", self.name)
    }
  }

  pub fn default_accessor_name(&self) -> &str {
    self.name.trim_start_matches('_')
  }
}

#[derive(Debug, Clone)]
pub struct Bitfield {
  pub name: String,
  pub attr: AttrId,
  pub offset: u32,
  pub width: u32,
  pub ty: TypeRef,
  pub accessor: Option<MethodId>,
  pub comment: Option<String>,
}

impl Bitfield {
  pub fn mask(&self) -> u64 {
    if self.width >= 64 { u64::MAX } else { (1u64 << self.width) - 1 }
  }
}

#[derive(Debug, Clone)]
pub struct Arg {
  pub name: String,
  pub ty: Option<TypeRef>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MethodBody {
  Attribute(AttrId),
  Bitfield(BitfieldId),
  /* Language -> returned expression */
  Expr(BTreeMap<String, Expr>),
  /* Language -> statement block */
  Code(BTreeMap<String, Expr>),
  External,
}

#[derive(Debug, Clone)]
pub struct Method {
  pub name: String,
  pub owner: TypeId,
  pub ret: Option<TypeRef>,
  pub rank: u32,
  pub args: Vec<Arg>,
  pub body: MethodBody,
  pub access: Access,
  pub inline: bool,
  pub comment: Option<String>,
  pub tags: RawTags,
  pub config_dependent: bool,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Dest {
  Attribute(AttrId),
  Bitfield(BitfieldId),
}

#[derive(Debug, Clone)]
pub struct CtorArg {
  pub name: String,
  pub ty: TypeRef,
  pub dest: Option<Dest>,
  pub expr: Option<Expr>,
  pub method: Option<String>,
}

#[derive(Debug, Clone)]
pub struct CtorInit {
  pub dest: Dest,
  pub expr: Expr,
}

#[derive(Debug, Clone, Default)]
pub struct Ctor {
  pub args: Vec<CtorArg>,
  pub inits: Vec<CtorInit>,
  pub auto: bool,
  pub inline: bool,
  pub external: bool,
  pub force_definition: bool,
  pub comment: Option<String>,
  pub tags: RawTags,
}

#[derive(Debug, Clone)]
pub struct Constant {
  pub name: String,
  pub scope: Scope,
  pub value: Expr,
  pub comment: Option<String>,
}

#[derive(Debug, Clone)]
pub struct EnumConstant {
  pub name: String,
  pub value: Option<Expr>,
  pub comment: Option<String>,
}

#[derive(Debug, Clone)]
pub struct Enum {
  pub name: String,
  pub scope: Scope,
  pub base: Builtin,
  pub constants: Vec<EnumConstant>,
  pub comment: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Schema {
  pub name: String,
  pub version: u32,
  pub external: Option<String>,
  pub embedded: bool,
  pub skip_proxy: bool,
  pub default: bool,
  pub tags: RawTags,
  pub datasets: Vec<Dataset>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dataset {
  pub name: String,
  pub external: Option<String>,
  pub tags: RawTags,
  pub attributes: Vec<DatasetAttr>,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum DatasetSource {
  Attribute(AttrId),
  Method(MethodId),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatasetAttr {
  pub name: String,
  pub method: String,
  pub rank: u32,
  pub tags: RawTags,
  pub source: DatasetSource,
}

#[derive(Debug, Default)]
pub struct Model {
  pub packages: Vec<Package>,
  pub types: Vec<Type>,
  pub attributes: Vec<Attribute>,
  pub bitfields: Vec<Bitfield>,
  pub methods: Vec<Method>,
  pub enums: Vec<Enum>,
  pub constants: Vec<Constant>,
  /* Top-level packages in declaration order */
  pub roots: IndexMap<String, PackageId>,
  /* Headers of imported files, included by generated code */
  pub use_headers: Vec<String>,
}

impl Model {
  pub fn package(&self, id: PackageId) -> &Package {
    &self.packages[id.0]
  }

  pub fn ty(&self, id: TypeId) -> &Type {
    &self.types[id.0]
  }

  pub fn attr(&self, id: AttrId) -> &Attribute {
    &self.attributes[id.0]
  }

  pub fn bitfield(&self, id: BitfieldId) -> &Bitfield {
    &self.bitfields[id.0]
  }

  pub fn method(&self, id: MethodId) -> &Method {
    &self.methods[id.0]
  }

  pub fn enum_(&self, id: EnumId) -> &Enum {
    &self.enums[id.0]
  }

  pub fn constant(&self, id: ConstId) -> &Constant {
    &self.constants[id.0]
  }

  pub fn type_ids(&self) -> impl Iterator<Item = TypeId> + '_ {
    (0..self.types.len()).map(TypeId)
  }

  /* Package names from the root down to `id` */
  pub fn package_path(&self, id: PackageId) -> Vec<&str> {
    let mut path = Vec::new();
    let mut cursor = Some(id);
    while let Some(pkg) = cursor {
      path.push(self.package(pkg).name.as_str());
      cursor = self.package(pkg).parent;
    }
    path.reverse();
    path
  }

  /* Dotted declaration path such as `Acq.ConfigV1` */
  pub fn type_path(&self, id: TypeId) -> String {
    let ty = self.ty(id);
    let mut path = self.package_path(ty.package).join(".");
    path.push('.');
    path.push_str(&ty.name);
    path
  }

  /* A type is emitted unless it comes from an import or is external, directly or through a package */
  pub fn is_emitted(&self, id: TypeId) -> bool {
    let ty = self.ty(id);
    if ty.included || ty.external {
      return false;
    }
    let mut cursor = Some(ty.package);
    while let Some(pkg) = cursor {
      if self.package(pkg).external {
        return false;
      }
      cursor = self.package(pkg).parent;
    }
    true
  }

  pub fn emitted_types(&self) -> impl Iterator<Item = TypeId> + '_ {
    self.type_ids().filter(|id| self.is_emitted(*id))
  }

  /* Base chain starting with `id` itself */
  pub fn lineage(&self, id: TypeId) -> Vec<TypeId> {
    let mut chain = vec![id];
    let mut cursor = self.ty(id).base;
    while let Some(base) = cursor {
      if chain.contains(&base) {
        break;
      }
      chain.push(base);
      cursor = self.ty(base).base;
    }
    chain
  }

  pub fn find_method(&self, ty: TypeId, name: &str) -> Option<MethodId> {
    self.lineage(ty).into_iter().find_map(|t| {
      self.ty(t).methods.iter().copied().find(|m| self.method(*m).name == name)
    })
  }

  pub fn find_attribute(&self, ty: TypeId, name: &str) -> Option<AttrId> {
    self.lineage(ty).into_iter().find_map(|t| {
      self.ty(t).attributes.iter().copied().find(|a| self.attr(*a).name == name)
    })
  }

  pub fn scope_path(&self, scope: Scope) -> String {
    match scope {
      Scope::Package(pkg) => self.package_path(pkg).join("."),
      Scope::Type(ty) => self.type_path(ty),
    }
  }

  pub fn type_ref_name(&self, ty: &TypeRef) -> String {
    match ty {
      TypeRef::Type(id) => self.type_path(*id),
      TypeRef::Enum(id) => {
        let e = self.enum_(*id);
        format!("{}.{}", self.scope_path(e.scope), e.name)
      }
      TypeRef::Builtin(b) => b.name().to_string(),
    }
  }
}
