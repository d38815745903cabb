/* Converter Dispatch Tests
 *
 * Numeric (type id, version) dispatch and text-keyed dispatch with hash
 * function selection.
 */

use ddl_gen::codegen::{DispatchBackend, DispatchOptions, Engine, Generated, HashFunction};
use ddl_gen::ddl::{build, Model, Unit};

fn model_from(yaml: &str) -> Model {
    let unit = Unit::parse("test.yaml", yaml, false).expect("YAML should parse");
    build(&[unit]).expect("model should build")
}

fn dispatch(model: &Model, options: DispatchOptions) -> (Generated, DispatchBackend) {
    let mut backend = DispatchBackend::new(options);
    let out = Engine::default().emit(model, &mut backend).expect("dispatch generation should succeed");
    (out, backend)
}

const EVENTS: &str = r#"
packages:
  - name: Pkg
    types:
      - name: A
        type-id: 10
        version: 1
        attributes:
          - { name: x, type: uint32_t }
      - name: A2
        type-id: 10
        version: 2
        attributes:
          - { name: x, type: uint64_t }
      - name: Cfg
        type-id: 20
        version: 1
        tags: [config_type]
        attributes:
          - { name: n, type: uint32_t }
      - name: Val
        type-id: 30
        version: 1
        tags: [value_type]
        attributes:
          - { name: v, type: double }
      - name: Data
        type-id: 40
        version: 1
        config: [Cfg]
        attributes:
          - { name: d, type: uint16_t }
      - name: Unnumbered
        attributes:
          - { name: u, type: uint8_t }
"#;

#[test]
fn test_numeric_dispatch() {
    let options = DispatchOptions { ignored_type_ids: vec![99], ..Default::default() };
    let (out, backend) = dispatch(&model_from(EVENTS), options);
    let def = &out.definition;

    assert!(backend.selected_hash().is_none());
    assert!(out.declaration.contains("void xtcConvert("));
    assert!(!def.contains("namespace Pkg"));
    assert!(def.contains("  switch (xtc->contains.id()) {"));
    assert!(def.contains(
        "  case 10:\n    switch (xtc->contains.version()) {\n    case 1:\n      {\n        // Pkg.A\n        evt.putProxy<Psana::Pkg::A>(boost::make_shared<EvtProxy<Psana::Pkg::A, Pkg::A> >(xtc), src);\n      }\n      break;\n    case 2:"
    ));
    assert!(def.contains("        cfgStore.put(boost::shared_ptr<const Pkg::Cfg>(xtc, (const Pkg::Cfg*)xtc->payload()), src);"));
    assert!(def.contains("        evt.put(boost::make_shared<Pkg::Val>(*(const Pkg::Val*)xtc->payload()), src);"));
    assert!(def.contains("        if (boost::shared_ptr<const Pkg::Cfg> cfgPtr = cfgStore.get(src)) {"));
    assert!(def.contains("EvtProxyCfg<Psana::Pkg::Data, Pkg::Data, Pkg::Cfg>"));
    assert!(def.contains("  case 99:\n    // ignored\n    break;"));
    assert!(!def.contains("Unnumbered"));

    /* ids ascend */
    let positions: Vec<usize> = ["  case 10:", "  case 20:", "  case 30:", "  case 40:", "  case 99:"]
        .iter()
        .map(|c| def.find(c).unwrap())
        .collect();
    assert!(positions.windows(2).all(|w| w[0] < w[1]));
}

#[test]
fn test_compressed_versions_for_event_types() {
    let (out, _) = dispatch(&model_from(EVENTS), DispatchOptions::default());
    let def = &out.definition;

    /* event and value types also accept the compressed version */
    let a = &def[def.find("  case 10:").unwrap()..def.find("  case 20:").unwrap()];
    assert!(a.contains("    case 32769:\n      {\n        // Pkg.A\n"));
    assert!(a.contains("    case 32770:\n      {\n        // Pkg.A2\n"));
    let val = &def[def.find("  case 30:").unwrap()..def.find("  case 40:").unwrap()];
    assert!(val.contains("    case 32769:\n      {\n        // Pkg.Val\n        evt.put("));

    /* config types never arrive compressed */
    let cfg = &def[def.find("  case 20:").unwrap()..def.find("  case 30:").unwrap()];
    assert!(cfg.contains("    case 1:"));
    assert!(!cfg.contains("32769"));
}

#[test]
fn test_native_namespace_prefix() {
    let options = DispatchOptions { native_ns: Some("Psddl".to_string()), ..Default::default() };
    let (out, _) = dispatch(&model_from(EVENTS), options);
    assert!(out.definition.contains("EvtProxy<Psana::Pkg::A, Psddl::Pkg::A>"));
}

#[test]
fn test_hashed_dispatch_without_collisions_keeps_djb2a() {
    let options = DispatchOptions { hashed: true, ..Default::default() };
    let (out, backend) = dispatch(
        &model_from(
            r#"
packages:
  - name: Pkg
    types:
      - name: A
        attributes:
          - { name: x, type: uint32_t }
      - name: B
        attributes:
          - { name: x, type: uint32_t }
"#,
        ),
        options,
    );
    let def = &out.definition;

    assert_eq!(backend.selected_hash(), Some((HashFunction::Djb2a, 0)));
    assert!(out.declaration.contains("void hdfConvert("));
    assert!(def.contains("namespace {\n"));
    assert!(def.contains("  switch (str_hash(typeName)) {"));
    assert!(def.contains("  case 3388320632u:\n    // Pkg::A\n    evt.putProxy<Psana::Pkg::A>(Pkg::make_A(schema_version, group, idx), src);"));
    assert!(def.contains("  case 3388320635u:"));
}

#[test]
fn test_hashed_dispatch_falls_back_on_collision() {
    let options = DispatchOptions { hashed: true, ..Default::default() };
    let (out, backend) = dispatch(
        &model_from(
            r#"
packages:
  - name: Pkg
    types:
      - name: Taa3
        attributes:
          - { name: x, type: uint32_t }
      - name: TabP
        attributes:
          - { name: x, type: uint32_t }
"#,
        ),
        options,
    );
    let def = &out.definition;

    assert_eq!(backend.selected_hash(), Some((HashFunction::Sdbm, 0)));
    assert!(def.contains("  case 699639339u:"));
    assert!(def.contains("  case 699704967u:"));
    assert!(!def.contains("3755415582u"));
}

#[test]
fn test_hashed_dispatch_aliases_and_skipped_types() {
    let options = DispatchOptions { hashed: true, ..Default::default() };
    let (out, _) = dispatch(
        &model_from(
            r#"
packages:
  - name: Pkg
    types:
      - name: Cfg
        tags: [config_type, "alias(Old::Name)"]
        attributes:
          - { name: n, type: uint32_t }
      - name: Data
        config: [Cfg]
        attributes:
          - { name: d, type: uint16_t }
      - name: Hidden
        attributes:
          - { name: h, type: uint16_t }
        schemas:
          - { version: 1, tags: [skip_proxy, default] }
"#,
        ),
        options,
    );
    let def = &out.definition;

    /* the alias reaches the same factory as the real name */
    assert!(def.contains("  case 3255590629u:\n    // Old::Name\n    cfgStore.putProxy<Psana::Pkg::Cfg>(Pkg::make_Cfg(schema_version, group, idx), src);"));
    assert!(def.contains("    if (boost::shared_ptr<Psana::Pkg::Cfg> cfgPtr = cfgStore.get(src)) {"));
    assert!(def.contains("evt.putProxy<Psana::Pkg::Data>(Pkg::make_Data(schema_version, group, idx, cfgPtr), src);"));
    assert!(!def.contains("Hidden"));
}

#[test]
fn test_repeated_spellings_get_one_case() {
    let options = DispatchOptions { hashed: true, ..Default::default() };
    let (out, backend) = dispatch(
        &model_from(
            r#"
packages:
  - name: Pkg
    types:
      - name: A
        tags: ["alias(Pkg::A)"]
        attributes:
          - { name: x, type: uint32_t }
      - name: B
        tags: ["alias(Pkg::A)"]
        attributes:
          - { name: x, type: uint32_t }
"#,
        ),
        options,
    );
    let def = &out.definition;

    assert_eq!(backend.selected_hash(), Some((HashFunction::Djb2a, 0)));
    assert_eq!(def.matches("  case 3388320632u:").count(), 1);
    assert!(def.contains("  case 3388320632u:\n    // Pkg::A\n    evt.putProxy<Psana::Pkg::A>(Pkg::make_A("));
    assert!(!def.contains("typeName == \"Pkg::A\""));
    assert!(def.contains("  case 3388320635u:\n    // Pkg::B\n"));
}
