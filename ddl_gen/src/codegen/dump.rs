use crate::ddl::model::{Dim, Model, PackageId, RawTags, TypeId};
use serde_derive::{Deserialize, Serialize};

/* Schema report: a serializable view of the resolved model */

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelReport {
    pub packages: Vec<PackageReport>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageReport {
    /// Dotted package path.
    pub name: String,
    pub types: Vec<TypeReport>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct TypeReport {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub type_id: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<u32>,
    pub size: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub config: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    pub attributes: Vec<AttrReport>,
    pub schemas: Vec<SchemaReport>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttrReport {
    pub name: String,
    #[serde(rename = "type")]
    pub type_name: String,
    pub offset: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub shape: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub accessor: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaReport {
    pub name: String,
    pub version: u32,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    pub datasets: Vec<DatasetReport>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatasetReport {
    pub name: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    pub attributes: Vec<DatasetAttrReport>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatasetAttrReport {
    pub name: String,
    pub method: String,
    pub rank: u32,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
}

fn tag_list(tags: &RawTags) -> Vec<String> {
    tags.iter()
        .map(|(name, arg)| match arg {
            Some(arg) => format!("{}({})", name, arg),
            None => name.clone(),
        })
        .collect()
}

fn type_tags(model: &Model, id: TypeId) -> Vec<String> {
    let ty = model.ty(id);
    let mut tags = Vec::new();
    for (set, name) in [
        (ty.value_type, "value_type"),
        (ty.config_type, "config_type"),
        (ty.external, "external"),
        (ty.no_sizeof, "no_sizeof"),
    ] {
        if set {
            tags.push(name.to_string());
        }
    }
    tags.extend(ty.cpp_name.iter().map(|n| format!("cpp_name({})", n)));
    tags.extend(ty.aliases.iter().map(|a| format!("alias({})", a)));
    tags.extend(tag_list(&ty.tags));
    tags
}

fn type_report(model: &Model, id: TypeId) -> TypeReport {
    let ty = model.ty(id);
    let attributes = ty
        .attributes
        .iter()
        .map(|a| {
            let attr = model.attr(*a);
            AttrReport {
                name: attr.name.clone(),
                type_name: model.type_ref_name(&attr.ty),
                offset: attr.offset.to_string(),
                shape: attr
                    .shape
                    .iter()
                    .map(|d| match d {
                        Dim::Bounded(e) => e.to_string(),
                        Dim::Unbounded => "*".to_string(),
                    })
                    .collect(),
                accessor: attr.accessor.map(|m| model.method(m).name.clone()),
            }
        })
        .collect();

    let schemas = ty
        .schemas
        .iter()
        .map(|s| {
            let mut tags = Vec::new();
            if let Some(header) = &s.external {
                tags.push(if header.is_empty() { "external".to_string() } else { format!("external({})", header) });
            }
            for (set, name) in [(s.embedded, "embedded"), (s.skip_proxy, "skip_proxy"), (s.default, "default")] {
                if set {
                    tags.push(name.to_string());
                }
            }
            tags.extend(tag_list(&s.tags));
            SchemaReport {
                name: s.name.clone(),
                version: s.version,
                tags,
                datasets: s
                    .datasets
                    .iter()
                    .map(|d| {
                        let mut tags: Vec<String> =
                            d.external.iter().map(|h| format!("external({})", h)).collect();
                        tags.extend(tag_list(&d.tags));
                        DatasetReport {
                            name: d.name.clone(),
                            tags,
                            attributes: d
                                .attributes
                                .iter()
                                .map(|a| DatasetAttrReport {
                                    name: a.name.clone(),
                                    method: a.method.clone(),
                                    rank: a.rank,
                                    tags: tag_list(&a.tags),
                                })
                                .collect(),
                        }
                    })
                    .collect(),
            }
        })
        .collect();

    TypeReport {
        name: ty.name.clone(),
        type_id: ty.identity.map(|i| i.type_id),
        version: ty.identity.map(|i| i.version),
        size: ty.size.to_string(),
        config: ty.configs.iter().map(|c| model.type_path(*c)).collect(),
        tags: type_tags(model, id),
        attributes,
        schemas,
    }
}

/// Builds the report for every package and type that came from a primary file.
pub fn report(model: &Model) -> ModelReport {
    let packages = model
        .packages
        .iter()
        .enumerate()
        .filter(|(_, p)| !p.included)
        .map(|(index, _)| {
            let pkg = PackageId(index);
            PackageReport {
                name: model.package_path(pkg).join("."),
                types: model
                    .type_ids()
                    .filter(|id| model.ty(*id).package == pkg && !model.ty(*id).included)
                    .map(|id| type_report(model, id))
                    .collect(),
            }
        })
        .collect();
    ModelReport { packages }
}

pub fn to_yaml(report: &ModelReport) -> Result<String, serde_yml::Error> {
    serde_yml::to_string(report)
}

pub fn to_json(report: &ModelReport) -> Result<String, serde_json::Error> {
    serde_json::to_string_pretty(report)
}

pub fn from_yaml(text: &str) -> Result<ModelReport, serde_yml::Error> {
    serde_yml::from_str(text)
}

pub fn from_json(text: &str) -> Result<ModelReport, serde_json::Error> {
    serde_json::from_str(text)
}
