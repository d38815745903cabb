/* Storage Schema Code Generation Tests
 *
 * Dataset structs, versioned readers, proxy factories and store functions
 * produced by the schema backend.
 */

use ddl_gen::codegen::{CodegenError, Engine, Generated, SchemaBackend, SchemaOptions};
use ddl_gen::ddl::{build, Model, Unit};

fn model_from(yaml: &str) -> Model {
    let unit = Unit::parse("test.yaml", yaml, false).expect("YAML should parse");
    build(&[unit]).expect("model should build")
}

fn schema(model: &Model) -> Result<Generated, CodegenError> {
    let mut backend = SchemaBackend::new(SchemaOptions { header: "pkg/Schema.h".to_string(), ..Default::default() });
    Engine::default().emit(model, &mut backend)
}

#[test]
fn test_default_schema_output() {
    let model = model_from(
        r#"
packages:
  - name: Pkg
    types:
      - name: T
        attributes:
          - { name: x, type: uint32_t }
          - { name: y, type: float, shape: ["2"] }
"#,
    );
    let out = schema(&model).unwrap();
    let decl = &out.declaration;
    let def = &out.definition;

    assert!(decl.starts_with("#pragma once"));
    assert!(decl.contains("namespace ns_data_v0 {\nstruct dataset_data {"));
    assert!(decl.contains("  dataset_data(const Psana::Pkg::T& psanaobj);"));
    assert!(decl.contains("  uint32_t x;"));
    assert!(decl.contains("  ndarray<const float, 1> y;"));
    assert!(decl.contains("} // namespace ns_data_v0"));
    assert!(decl.contains("class T_v0 : public Psana::Pkg::T {"));
    assert!(decl.contains("  mutable boost::shared_ptr<ns_data_v0::dataset_data> m_ds_data;"));

    assert!(def.starts_with("#include \"pkg/Schema.h\""));
    assert!(def.contains(
        "ns_data_v0::dataset_data::dataset_data(const Psana::Pkg::T& psanaobj)\n  : x(psanaobj.x())\n  , y(psanaobj.y())\n{}"
    ));
    assert!(def.contains("void T_v0::read_ds_data() const\n{\n  if (m_ds_data) return;"));
    assert!(def.contains(
        "boost::shared_ptr<PSEvt::Proxy<Psana::Pkg::T> > make_T(int version, hdf5pp::Group group, hsize_t idx)\n{"
    ));
    assert!(def.contains("  case 0:\n    return boost::make_shared<PSEvt::DataProxy<Psana::Pkg::T> >(boost::make_shared<T_v0>(group, idx));"));
    assert!(def.contains("void store_T(const Psana::Pkg::T& obj, hdf5pp::Group group, int version, bool append)\n{\n  if (version < 0) version = 0;"));
    assert!(def.contains("throw ExceptionSchemaVersion(ERR_LOC, \"Pkg.T\", version);"));
}

#[test]
fn test_versions_are_emitted_in_order() {
    let model = model_from(
        r#"
packages:
  - name: Pkg
    types:
      - name: V
        attributes:
          - { name: x, type: uint32_t }
        schemas:
          - { version: 3, tags: [default] }
          - name: old
            version: 1
            datasets:
              - name: legacy
                attributes:
                  - { name: value, method: x }
"#,
    );
    let out = schema(&model).unwrap();
    let def = &out.definition;

    assert!(out.declaration.contains("class V_v1 : public Psana::Pkg::V {"));
    assert!(out.declaration.contains("class V_v3 : public Psana::Pkg::V {"));
    assert!(out.declaration.contains("namespace ns_legacy_v1 {"));
    assert!(out.declaration.contains("  uint32_t value;"));
    assert!(def.contains(": value(psanaobj.x())"));

    let store = &def[def.find("void store_V").unwrap()..];
    assert!(store.contains("  if (version < 0) version = 3;"));
    let first = store.find("  case 1:").unwrap();
    let second = store.find("  case 3:").unwrap();
    assert!(first < second);
}

#[test]
fn test_embedded_and_external_schemas() {
    let model = model_from(
        r#"
packages:
  - name: Pkg
    types:
      - name: E
        attributes:
          - { name: x, type: uint32_t }
        schemas:
          - version: 1
            tags: [embedded]
            datasets:
              - name: d
                attributes:
                  - { name: x }
      - name: X
        attributes:
          - { name: x, type: uint32_t }
        schemas:
          - { version: 1, tags: ["external(pkg/XSchema.h)"] }
      - name: D
        attributes:
          - { name: x, type: uint32_t }
        schemas:
          - version: 2
            datasets:
              - name: ext
                tags: ["external(pkg/ExtDataset.h)"]
                attributes:
                  - { name: x }
"#,
    );
    let out = schema(&model).unwrap();
    let decl = &out.declaration;

    /* embedded: storable but never proxied */
    assert!(!decl.contains("make_E("));
    assert!(decl.contains("void store_E("));
    assert!(decl.contains("class E_v1 "));

    /* external schema: hand-written class, generated factory and store */
    assert!(out.definition.contains("#include \"pkg/XSchema.h\""));
    assert!(!decl.contains("pkg/XSchema.h"));
    assert!(!decl.contains("class X_v1"));
    assert!(decl.contains("make_X(int version, hdf5pp::Group group, hsize_t idx);"));
    assert!(decl.contains("void store_X("));
    assert!(out.definition.contains("boost::make_shared<X_v1>(group, idx)"));
    assert!(out.definition.contains("    X_v1::store(obj, group, append);"));

    /* external dataset: the class still reads it, the struct comes from the header */
    assert!(decl.contains("#include \"pkg/ExtDataset.h\""));
    assert!(!decl.contains("namespace ns_ext_v2"));
    assert!(decl.contains("class D_v2 : public Psana::Pkg::D {"));
    assert!(!out.definition.contains("pkg/ExtDataset.h"));
    assert!(decl.contains("make_D("));
}

#[test]
fn test_config_types_get_one_factory_per_config() {
    let model = model_from(
        r#"
packages:
  - name: Pkg
    types:
      - name: CfgA
        attributes:
          - { name: n, type: uint32_t }
      - name: CfgB
        attributes:
          - { name: n, type: uint32_t }
      - name: Data
        config: [CfgA, CfgB]
        attributes:
          - { name: v, type: uint16_t }
"#,
    );
    let out = schema(&model).unwrap();
    let decl = &out.declaration;

    assert!(decl.contains(
        "make_Data(int version, hdf5pp::Group group, hsize_t idx, const boost::shared_ptr<Psana::Pkg::CfgA>& cfg);"
    ));
    assert!(decl.contains(
        "make_Data(int version, hdf5pp::Group group, hsize_t idx, const boost::shared_ptr<Psana::Pkg::CfgB>& cfg);"
    ));
    assert!(!decl.contains("make_Data(int version, hdf5pp::Group group, hsize_t idx);"));
    assert!(decl.contains("make_CfgA(int version, hdf5pp::Group group, hsize_t idx);"));
}

#[test]
fn test_void_method_dataset_is_rejected() {
    let model = model_from(
        r#"
packages:
  - name: Pkg
    types:
      - name: T
        attributes:
          - { name: x, type: uint32_t }
        methods:
          - { name: hook }
        schemas:
          - version: 1
            datasets:
              - name: d
                attributes:
                  - { name: h, method: hook }
"#,
    );
    let err = schema(&model).unwrap_err();
    assert!(matches!(err, CodegenError::Backend { backend: "schema", .. }));
}

#[test]
fn test_external_versions_join_factories() {
    let model = model_from(
        r#"
packages:
  - name: Pkg
    types:
      - name: Y
        attributes:
          - { name: y, type: uint16_t }
        schemas:
          - { version: 1, tags: ["external(pkg/YSchema.h)"] }
          - { version: 2, tags: [default] }
"#,
    );
    let out = schema(&model).unwrap();
    let def = &out.definition;

    assert!(!out.declaration.contains("class Y_v1"));
    assert!(out.declaration.contains("class Y_v2 : public Psana::Pkg::Y {"));

    let make = &def[def.find("make_Y(").unwrap()..def.find("void store_Y").unwrap()];
    assert!(make.contains("  case 1:\n    return boost::make_shared<PSEvt::DataProxy<Psana::Pkg::Y> >(boost::make_shared<Y_v1>(group, idx));"));
    assert!(make.contains("  case 2:"));

    let store = &def[def.find("void store_Y").unwrap()..];
    assert!(store.contains("  if (version < 0) version = 2;"));
    assert!(store.contains("  case 1:\n    Y_v1::store(obj, group, append);"));
}

#[test]
fn test_every_dispatched_factory_is_generated() {
    use ddl_gen::codegen::{DispatchBackend, DispatchOptions};

    let model = model_from(
        r#"
packages:
  - name: Pkg
    types:
      - name: X
        attributes:
          - { name: x, type: uint32_t }
        schemas:
          - { version: 1, tags: ["external(pkg/XSchema.h)"] }
      - name: T
        attributes:
          - { name: t, type: uint32_t }
"#,
    );
    let schema_out = schema(&model).unwrap();
    let mut dispatch = DispatchBackend::new(DispatchOptions { hashed: true, ..Default::default() });
    let dispatch_out = Engine::default().emit(&model, &mut dispatch).unwrap();

    for class in ["X", "T"] {
        let call = format!("Pkg::make_{}(schema_version", class);
        assert!(dispatch_out.definition.contains(&call));
        assert!(schema_out.declaration.contains(&format!(" make_{}(int version", class)));
    }
}
