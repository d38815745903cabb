/* Schema Report Tests
 *
 * The report mirrors the resolved model and survives both text formats.
 */

use ddl_gen::codegen::dump::{self, ModelReport};
use ddl_gen::ddl::{build, Model, Unit};
use ddl_gen::ddl::model::Schema;
use std::collections::BTreeSet;

fn model_from(yaml: &str) -> Model {
    let unit = Unit::parse("test.yaml", yaml, false).expect("YAML should parse");
    build(&[unit]).expect("model should build")
}

const SOURCE: &str = r#"
packages:
  - name: Pkg
    types:
      - name: Cfg
        type-id: 3
        version: 2
        tags: [config_type, "alias(Old::Cfg)", "devel(yes)"]
        attributes:
          - { name: n, type: uint32_t }
      - name: Data
        config: [Cfg]
        attributes:
          - name: _flags
            type: uint16_t
            bitfields:
              - { name: lo, size: 4 }
          - { name: arr, type: float, shape: ["{xtc-config}.n()"] }
        schemas:
          - { version: 1, tags: [skip_proxy, default] }
"#;

fn report() -> ModelReport {
    dump::report(&model_from(SOURCE))
}

#[test]
fn test_report_contents() {
    let report = report();
    assert_eq!(report.packages.len(), 1);
    let pkg = &report.packages[0];
    assert_eq!(pkg.name, "Pkg");
    assert_eq!(pkg.types.len(), 2);

    let cfg = &pkg.types[0];
    assert_eq!(cfg.name, "Cfg");
    assert_eq!(cfg.type_id, Some(3));
    assert_eq!(cfg.version, Some(2));
    assert_eq!(cfg.size, "4");
    assert!(cfg.tags.contains(&"config_type".to_string()));
    assert!(cfg.tags.contains(&"alias(Old::Cfg)".to_string()));
    assert!(cfg.tags.contains(&"devel(yes)".to_string()));

    let data = &pkg.types[1];
    assert_eq!(data.config, vec!["Pkg.Cfg".to_string()]);
    assert_eq!(data.type_id, None);
    assert_eq!(data.attributes[0].name, "_flags");
    assert_eq!(data.attributes[0].accessor.as_deref(), Some("flags"));
    assert_eq!(data.attributes[1].offset, "2");
    assert_eq!(data.attributes[1].shape, vec!["{xtc-config}.n()".to_string()]);

    let schema = &data.schemas[0];
    assert_eq!(schema.version, 1);
    assert_eq!(schema.tags, vec!["skip_proxy".to_string(), "default".to_string()]);
    assert_eq!(schema.datasets[0].name, "data");
}

#[test]
fn test_yaml_and_json_round_trip() {
    let report = report();

    let yaml = dump::to_yaml(&report).unwrap();
    assert!(yaml.contains("type-id: 3"));
    assert_eq!(dump::from_yaml(&yaml).unwrap(), report);

    let json = dump::to_json(&report).unwrap();
    assert!(json.contains("\"type-id\": 3"));
    assert_eq!(dump::from_json(&json).unwrap(), report);
}

#[test]
fn test_included_units_are_left_out() {
    let common = Unit::parse(
        "common.yaml",
        "packages:\n  - name: Common\n    types:\n      - name: Base\n        attributes:\n          - { name: id, type: uint32_t }\n",
        true,
    )
    .unwrap();
    let primary = Unit::parse(
        "main.yaml",
        "packages:\n  - name: Pkg\n    types:\n      - name: T\n        base: Common.Base\n",
        false,
    )
    .unwrap();
    let report = dump::report(&build(&[primary, common]).unwrap());
    let names: Vec<&str> = report.packages.iter().map(|p| p.name.as_str()).collect();
    assert_eq!(names, vec!["Pkg"]);
    assert_eq!(report.packages[0].types[0].size, "4");
}

/* Typed schema flags and raw tags, spelled the way the report spells them */
fn schema_tags(schema: &Schema) -> BTreeSet<String> {
    let mut tags: BTreeSet<String> = schema.tags.iter().map(|(n, a)| tag_text(n, a.as_deref())).collect();
    if let Some(header) = &schema.external {
        tags.insert(if header.is_empty() { "external".to_string() } else { format!("external({})", header) });
    }
    for (set, name) in [(schema.embedded, "embedded"), (schema.skip_proxy, "skip_proxy"), (schema.default, "default")] {
        if set {
            tags.insert(name.to_string());
        }
    }
    tags
}

fn tag_text(name: &str, arg: Option<&str>) -> String {
    match arg {
        Some(arg) => format!("{}({})", name, arg),
        None => name.to_string(),
    }
}

#[test]
fn test_report_schemas_match_model() {
    let model = model_from(
        r#"
packages:
  - name: Pkg
    types:
      - name: Plain
        attributes:
          - { name: a, type: uint32_t }
          - { name: b, type: uint16_t, shape: ["3"] }
      - name: Rich
        attributes:
          - { name: a, type: uint32_t }
        methods:
          - { name: twice, type: uint32_t, expr: { "C++": "{self}.a()*2" } }
        schemas:
          - { version: 1, tags: ["external(pkg/RichV1.h)", "devel"] }
          - name: store
            version: 2
            tags: [embedded, "compress(6)"]
            datasets:
              - name: ext
                tags: ["external(pkg/ExtDs.h)", chunked]
                attributes:
                  - { name: a, tags: [vlen] }
              - name: derived
                attributes:
                  - { name: value, method: twice, rank: 0 }
          - { version: 3, tags: [default, skip_proxy] }
"#,
    );
    let report = dump::from_yaml(&dump::to_yaml(&dump::report(&model)).unwrap()).unwrap();
    assert_eq!(dump::from_json(&dump::to_json(&report).unwrap()).unwrap(), report);
    let pkg = &report.packages[0];

    let mut checked = 0;
    for id in model.type_ids() {
        let ty = model.ty(id);
        let reported = pkg.types.iter().find(|t| t.name == ty.name).expect("type in report");
        assert_eq!(reported.schemas.len(), ty.schemas.len());

        for (schema, rs) in ty.schemas.iter().zip(&reported.schemas) {
            assert_eq!(rs.name, schema.name);
            assert_eq!(rs.version, schema.version);
            assert_eq!(rs.tags.iter().cloned().collect::<BTreeSet<_>>(), schema_tags(schema));
            assert_eq!(rs.tags.len(), schema_tags(schema).len());
            assert_eq!(rs.datasets.len(), schema.datasets.len());

            for (dataset, rd) in schema.datasets.iter().zip(&rs.datasets) {
                assert_eq!(rd.name, dataset.name);
                let mut tags: BTreeSet<String> =
                    dataset.tags.iter().map(|(n, a)| tag_text(n, a.as_deref())).collect();
                tags.extend(dataset.external.iter().map(|h| format!("external({})", h)));
                assert_eq!(rd.tags.iter().cloned().collect::<BTreeSet<_>>(), tags);
                assert_eq!(rd.attributes.len(), dataset.attributes.len());

                for (attr, ra) in dataset.attributes.iter().zip(&rd.attributes) {
                    assert_eq!(ra.name, attr.name);
                    assert_eq!(ra.method, attr.method);
                    assert_eq!(ra.rank, attr.rank);
                    let attr_tags: BTreeSet<String> =
                        attr.tags.iter().map(|(n, a)| tag_text(n, a.as_deref())).collect();
                    assert_eq!(ra.tags.iter().cloned().collect::<BTreeSet<_>>(), attr_tags);
                }
            }
            checked += 1;
        }
    }
    assert_eq!(checked, 4);

    /* spot checks on the three interesting shapes */
    let plain = &pkg.types[0].schemas[0];
    assert_eq!((plain.name.as_str(), plain.version), ("default", 0));
    assert_eq!(plain.tags, vec!["default".to_string()]);
    let names: Vec<&str> = plain.datasets[0].attributes.iter().map(|a| a.name.as_str()).collect();
    assert_eq!(names, vec!["a", "b"]);
    assert_eq!(plain.datasets[0].attributes[1].rank, 1);

    let rich = &pkg.types[1].schemas;
    assert!(rich[0].tags.contains(&"external(pkg/RichV1.h)".to_string()));
    assert!(rich[0].tags.contains(&"devel".to_string()));
    assert!(rich[1].datasets[0].tags.contains(&"external(pkg/ExtDs.h)".to_string()));
    assert_eq!(rich[1].datasets[0].attributes[0].tags, vec!["vlen".to_string()]);
    assert_eq!(rich[1].datasets[1].attributes[0].method, "twice");
    assert_eq!(rich[2].datasets[0].name, "data");
}
