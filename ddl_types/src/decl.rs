use serde_derive::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One schema document: imports plus top-level package declarations.
#[derive(Serialize, Deserialize, Debug, PartialEq, Eq, Clone, Default)]
#[serde(rename_all = "kebab-case")]
pub struct DdlFile {
    #[serde(default, rename = "use")]
    pub uses: Vec<UseDecl>,
    #[serde(default)]
    pub packages: Vec<PackageDecl>,
}

/// Import of another schema document whose declarations are referenced but
/// not re-emitted.
#[derive(Serialize, Deserialize, Debug, PartialEq, Eq, Clone)]
#[serde(rename_all = "kebab-case")]
pub struct UseDecl {
    pub file: String,
    #[serde(default)]
    pub headers: Vec<String>,
}

#[derive(Serialize, Deserialize, Debug, PartialEq, Eq, Clone, Default)]
#[serde(rename_all = "kebab-case")]
pub struct PackageDecl {
    pub name: String,
    #[serde(default)]
    pub comment: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub constants: Vec<ConstDecl>,
    #[serde(default)]
    pub enums: Vec<EnumDecl>,
    #[serde(default)]
    pub packages: Vec<PackageDecl>,
    #[serde(default)]
    pub types: Vec<TypeDecl>,
}

#[derive(Serialize, Deserialize, Debug, PartialEq, Eq, Clone, Default)]
#[serde(rename_all = "kebab-case")]
pub struct ConstDecl {
    pub name: String,
    #[serde(default)]
    pub value: Option<String>,
    #[serde(default)]
    pub comment: Option<String>,
}

#[derive(Serialize, Deserialize, Debug, PartialEq, Eq, Clone, Default)]
#[serde(rename_all = "kebab-case")]
pub struct EnumDecl {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub base: Option<String>,
    #[serde(default)]
    pub comment: Option<String>,
    #[serde(default)]
    pub constants: Vec<ConstDecl>,
}

#[derive(Serialize, Deserialize, Debug, PartialEq, Eq, Clone, Default)]
#[serde(rename_all = "kebab-case")]
pub struct TypeDecl {
    pub name: String,
    #[serde(default)]
    pub type_id: Option<u32>,
    #[serde(default)]
    pub version: Option<u32>,
    #[serde(default)]
    pub base: Option<String>,
    #[serde(default)]
    pub pack: Option<u32>,
    #[serde(default)]
    pub comment: Option<String>,
    /* Names of the config types this record needs at conversion time */
    #[serde(default)]
    pub config: Vec<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub constants: Vec<ConstDecl>,
    #[serde(default)]
    pub enums: Vec<EnumDecl>,
    #[serde(default)]
    pub ctors: Vec<CtorDecl>,
    #[serde(default)]
    pub attributes: Vec<AttributeDecl>,
    #[serde(default)]
    pub methods: Vec<MethodDecl>,
    #[serde(default)]
    pub schemas: Vec<SchemaDecl>,
}

#[derive(Serialize, Deserialize, Debug, PartialEq, Eq, Clone, Default)]
#[serde(rename_all = "kebab-case")]
pub struct AttributeDecl {
    pub name: String,
    #[serde(default, rename = "type")]
    pub type_name: Option<String>,
    #[serde(default)]
    pub offset: Option<String>,
    /* One entry per dimension, "*" marks an unbounded dimension */
    #[serde(default)]
    pub shape: Vec<String>,
    #[serde(default)]
    pub accessor: Option<String>,
    #[serde(default)]
    pub access: Option<String>,
    #[serde(default)]
    pub comment: Option<String>,
    #[serde(default)]
    pub bitfields: Vec<BitfieldDecl>,
    #[serde(default)]
    pub tags: Vec<String>,
}

#[derive(Serialize, Deserialize, Debug, PartialEq, Eq, Clone, Default)]
#[serde(rename_all = "kebab-case")]
pub struct BitfieldDecl {
    pub name: String,
    #[serde(default)]
    pub size: Option<u32>,
    /// Explicit bit offset; when absent the field starts where the previous one ended.
    #[serde(default)]
    pub offset: Option<u32>,
    #[serde(default, rename = "type")]
    pub type_name: Option<String>,
    #[serde(default)]
    pub accessor: Option<String>,
    #[serde(default)]
    pub comment: Option<String>,
}

#[derive(Serialize, Deserialize, Debug, PartialEq, Eq, Clone, Default)]
#[serde(rename_all = "kebab-case")]
pub struct ArgDecl {
    pub name: String,
    #[serde(default, rename = "type")]
    pub type_name: Option<String>,
}

#[derive(Serialize, Deserialize, Debug, PartialEq, Eq, Clone, Default)]
#[serde(rename_all = "kebab-case")]
pub struct MethodDecl {
    pub name: String,
    #[serde(default, rename = "type")]
    pub type_name: Option<String>,
    #[serde(default)]
    pub rank: u32,
    #[serde(default)]
    pub args: Vec<ArgDecl>,
    /* Language name -> expression returned by the method */
    #[serde(default)]
    pub expr: BTreeMap<String, String>,
    /* Language name -> statement block forming the method body */
    #[serde(default)]
    pub code: BTreeMap<String, String>,
    #[serde(default)]
    pub access: Option<String>,
    #[serde(default)]
    pub comment: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
}

#[derive(Serialize, Deserialize, Debug, PartialEq, Eq, Clone, Default)]
#[serde(rename_all = "kebab-case")]
pub struct CtorDecl {
    #[serde(default)]
    pub args: Vec<CtorArgDecl>,
    #[serde(default)]
    pub init: Vec<CtorInitDecl>,
    #[serde(default)]
    pub comment: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
}

#[derive(Serialize, Deserialize, Debug, PartialEq, Eq, Clone, Default)]
#[serde(rename_all = "kebab-case")]
pub struct CtorArgDecl {
    pub name: String,
    #[serde(default, rename = "type")]
    pub type_name: Option<String>,
    /* Attribute or bitfield initialized from this argument */
    #[serde(default)]
    pub dest: Option<String>,
    #[serde(default)]
    pub expr: Option<String>,
    #[serde(default)]
    pub method: Option<String>,
}

#[derive(Serialize, Deserialize, Debug, PartialEq, Eq, Clone, Default)]
#[serde(rename_all = "kebab-case")]
pub struct CtorInitDecl {
    pub dest: String,
    pub expr: String,
}

#[derive(Serialize, Deserialize, Debug, PartialEq, Eq, Clone, Default)]
#[serde(rename_all = "kebab-case")]
pub struct SchemaDecl {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub version: u32,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub datasets: Vec<DatasetDecl>,
}

#[derive(Serialize, Deserialize, Debug, PartialEq, Eq, Clone, Default)]
#[serde(rename_all = "kebab-case")]
pub struct DatasetDecl {
    pub name: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub attributes: Vec<DatasetAttrDecl>,
}

#[derive(Serialize, Deserialize, Debug, PartialEq, Eq, Clone, Default)]
#[serde(rename_all = "kebab-case")]
pub struct DatasetAttrDecl {
    pub name: String,
    #[serde(default)]
    pub method: Option<String>,
    #[serde(default)]
    pub rank: Option<u32>,
    #[serde(default)]
    pub tags: Vec<String>,
}
