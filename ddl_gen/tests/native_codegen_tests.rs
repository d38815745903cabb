/* Native Accessor Code Generation Tests
 *
 * Run the native backend over small models and check the generated
 * declaration and definition text.
 */

use ddl_gen::codegen::{Engine, Generated, NativeBackend, NativeOptions};
use ddl_gen::ddl::{build, Model, Unit};

fn model_from(yaml: &str) -> Model {
    let unit = Unit::parse("test.yaml", yaml, false).expect("YAML should parse");
    build(&[unit]).expect("model should build")
}

fn native(model: &Model) -> Generated {
    let mut backend = NativeBackend::new(NativeOptions { header: "pkg/Test.h".to_string() });
    Engine::default().emit(model, &mut backend).expect("native generation should succeed")
}

const SIMPLE: &str = r#"
packages:
  - name: Pkg
    types:
      - name: T
        type-id: 5
        version: 1
        attributes:
          - { name: x, type: uint32_t }
          - { name: y, type: uint8_t, shape: ["4"] }
"#;

#[test]
fn test_simple_accessors() {
    let out = native(&model_from(SIMPLE));
    let decl = &out.declaration;
    let def = &out.definition;

    assert!(decl.starts_with("#pragma once"));
    assert!(decl.contains("namespace Pkg {"));
    assert!(decl.contains("class T {\npublic:"));
    assert!(decl.contains("enum { TypeId = 5 /**< XTC type ID value */ };"));
    assert!(decl.contains("enum { Version = 1 /**< XTC type version number */ };"));
    assert!(decl.contains("  uint32_t x() const;"));
    assert!(decl.contains("  uint8_t y(uint32_t i0) const;"));
    assert!(decl.contains("  uint32_t _sizeof() const;"));
    assert!(decl.contains("private:\n  uint32_t\t_x;\n  uint8_t\t_y[4];"));
    assert!(decl.contains("} // namespace Pkg"));
    assert!(!decl.contains("cfg"));

    assert!(def.starts_with("#include \"pkg/Test.h\""));
    assert!(def.contains("uint32_t T::x() const\n{\n  return _x;\n}"));
    assert!(def.contains("uint8_t T::y(uint32_t i0) const\n{\n  return _y[i0];\n}"));
    assert!(def.contains("uint32_t T::_sizeof() const\n{\n  return 8;\n}"));
}

#[test]
fn test_namespaces_are_balanced() {
    let out = Engine::new(Some("Psddl".to_string()))
        .emit(&model_from(SIMPLE), &mut NativeBackend::new(NativeOptions::default()))
        .unwrap();
    for text in [&out.declaration, &out.definition] {
        assert_eq!(text.matches("namespace Psddl {").count(), 1);
        assert_eq!(text.matches("namespace Pkg {").count(), 1);
        assert!(text.contains("} // namespace Pkg\n} // namespace Psddl"));
    }
}

#[test]
fn test_config_dependent_members_are_templates() {
    let out = native(&model_from(
        r#"
packages:
  - name: Pkg
    types:
      - name: Cfg
        attributes:
          - { name: n, type: uint32_t }
      - name: Data
        config: [Cfg]
        attributes:
          - { name: a, type: uint32_t }
          - { name: arr, type: uint16_t, shape: ["{xtc-config}.n()"] }
"#,
    ));
    let decl = &out.declaration;

    assert!(decl.contains(
        "  template <typename Config>\n  uint16_t arr(const Config& cfg, uint32_t i0) const { return *(const uint16_t*)(((const char*)this)+(4+i0*2)); }"
    ));
    assert!(decl.contains(
        "  template <typename Config>\n  uint32_t _sizeof(const Config& cfg) const { return (4+2*(cfg.n())); }"
    ));
    /* the fixed leading attribute keeps a plain accessor and storage */
    assert!(decl.contains("  uint32_t a() const;"));
    assert!(decl.contains("  uint32_t\t_a;"));
    assert!(!decl.contains("_arr;"));
    assert!(out.definition.contains("uint32_t Data::a() const"));
}

#[test]
fn test_self_sized_array_uses_offset_arithmetic() {
    let out = native(&model_from(
        r#"
packages:
  - name: Pkg
    types:
      - name: T
        attributes:
          - { name: n, type: uint32_t }
          - { name: m, type: uint16_t, shape: ["{self}.n()", "3"] }
"#,
    ));
    assert!(out.definition.contains(
        "uint16_t T::m(uint32_t i0, uint32_t i1) const\n{\n  return *(const uint16_t*)(((const char*)this)+((4+i0*6)+i1*2));\n}"
    ));
    assert!(out.definition.contains("uint32_t T::_sizeof() const\n{\n  return (4+2*(this->n())*3);\n}"));
}

#[test]
fn test_bitfield_accessors() {
    let out = native(&model_from(
        r#"
packages:
  - name: Pkg
    types:
      - name: T
        attributes:
          - name: _bits
            type: uint32_t
            access: private
            bitfields:
              - { name: low, size: 2 }
              - { name: mode, size: 3, type: uint8_t }
"#,
    ));
    assert!(out.declaration.contains("private:\n  uint32_t bits() const;"));
    assert!(out.definition.contains("uint8_t T::mode() const\n{\n  return uint8_t((this->_bits >> 2) & 0x7);\n}"));
    assert!(out.definition.contains("return uint32_t((this->_bits >> 0) & 0x3);"));
}

#[test]
fn test_constructors() {
    let out = native(&model_from(
        r#"
packages:
  - name: Pkg
    types:
      - name: T
        attributes:
          - { name: _x, type: uint32_t }
          - name: _flags
            type: uint16_t
            bitfields:
              - { name: lo, size: 4 }
              - { name: hi, size: 4 }
        ctors:
          - tags: [auto]
          - args:
              - { name: x, dest: _x }
              - { name: lo, dest: lo }
              - { name: hi, dest: hi }
          - args:
              - { name: extra, type: uint32_t }
"#,
    ));
    let decl = &out.declaration;
    let def = &out.definition;

    assert!(decl.contains("  T() {}"));
    assert!(decl.contains("  T(uint32_t x, uint16_t lo, uint16_t hi);"));
    assert!(def.contains(
        "T::T(uint32_t x, uint16_t lo, uint16_t hi)\n  : _x(x), _flags(((lo) & 0xf) << 0 | ((hi) & 0xf) << 4)\n{\n}"
    ));

    /* no destination: declaration only */
    assert!(decl.contains("  T(uint32_t extra);"));
    assert!(!def.contains("T::T(uint32_t extra)"));
}

#[test]
fn test_methods_and_constants() {
    let out = native(&model_from(
        r#"
packages:
  - name: Pkg
    constants:
      - { name: MaxChan, value: "20" }
    enums:
      - name: Mode
        base: uint8_t
        constants:
          - { name: Fast, value: "1", comment: "fast readout" }
          - { name: Slow }
    types:
      - name: T
        constants:
          - { name: Chans, value: "4" }
        attributes:
          - { name: mode, type: Mode }
          - { name: gain, type: float, shape: ["{type}.Chans"] }
        methods:
          - name: total
            type: float
            expr: { "C++": "{self}.gain(0) + {self}.gain(1)" }
            tags: [inline]
          - name: scaled
            type: double
            args: [{ name: k, type: double }]
            code: { "Any": "return k * {self}.gain(0);" }
          - name: hook
            type: void
"#,
    ));
    let decl = &out.declaration;
    let def = &out.definition;

    assert!(decl.contains("enum { MaxChan = 20 };"));
    assert!(decl.contains("enum Mode {\n  Fast = 1, /**< fast readout */\n  Slow,\n};"));
    assert!(decl.contains("  enum { Chans = 4 };"));
    assert!(decl.contains("  uint8_t\t_mode;"));
    assert!(def.contains("Pkg::Mode T::mode() const\n{\n  return Pkg::Mode(_mode);\n}"));
    assert!(decl.contains("  float total() const { return this->gain(0) + this->gain(1); }"));
    assert!(def.contains("double T::scaled(double k) const\n{\n  return k * this->gain(0);\n}"));
    assert!(decl.contains("  void hook() const;"));
    assert!(!def.contains("T::hook"));
}

#[test]
fn test_imported_types_are_referenced_not_emitted() {
    let common = Unit::parse(
        "common.yaml",
        r#"
packages:
  - name: Common
    types:
      - name: Base
        attributes:
          - { name: id, type: uint32_t }
"#,
        true,
    )
    .unwrap();
    let primary = Unit::parse(
        "main.yaml",
        r#"
use:
  - { file: common.yaml, headers: ["common/Base.h"] }
packages:
  - name: Pkg
    types:
      - name: T
        base: Common.Base
        attributes:
          - { name: v, type: uint16_t }
"#,
        false,
    )
    .unwrap();
    let model = build(&[primary, common]).unwrap();
    let out = native(&model);

    assert!(out.declaration.contains("#include \"common/Base.h\""));
    assert!(out.declaration.contains("class T : public Common::Base {"));
    assert!(!out.declaration.contains("class Base"));
    assert!(!out.declaration.contains("namespace Common"));
    assert!(out.declaration.contains("private:\n  uint16_t\t_v;"));
}
