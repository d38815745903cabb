/* Symbolic size/offset/body expressions.
 *
 * Expression text may contain three placeholders that are resolved into typed
 * operands:
 *   {self}.name        member of the instance being accessed
 *   {type}.name        static member of the declaring type
 *   {xtc-config}.name  member of the config object supplied at call time
 * Everything else is kept as opaque text and passed through to the backends.
 */

use super::errors::SchemaError;
use super::model::TypeId;
use std::fmt;

const SELF_TOKEN: &str = "{self}";
const TYPE_TOKEN: &str = "{type}";
const CONFIG_TOKEN: &str = "{xtc-config}";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Expr {
  Const(i64),
  SelfAttr(String),
  StaticRef { ty: TypeId, member: String },
  ConfigRef { config: TypeId, member: String },
  Opaque(String),
  Add(Box<Expr>, Box<Expr>),
  Mul(Box<Expr>, Box<Expr>),
  Concat(Vec<Expr>),
}

/* Where an expression was declared; placeholders are resolved against it */
#[derive(Debug, Clone)]
pub struct ExprContext<'a> {
  /* None for package-level constants, which have no `{type}` */
  pub owner: Option<TypeId>,
  pub config: Option<TypeId>,
  pub path: &'a str,
}

pub fn parse(raw: &str, ctx: &ExprContext<'_>) -> Result<Expr, SchemaError> {
  let text = raw.trim();
  if text.is_empty() {
    return Err(SchemaError::InvalidExpression {
      path: ctx.path.to_string(),
      reason: "empty expression".to_string(),
    });
  }
  if let Ok(value) = text.parse::<i64>() {
    return Ok(Expr::Const(value));
  }

  let mut pieces: Vec<Expr> = Vec::new();
  let mut opaque = String::new();
  let mut rest = text;

  while let Some(open) = rest.find('{') {
    opaque.push_str(&rest[..open]);
    let tail = &rest[open..];

    let token = [SELF_TOKEN, TYPE_TOKEN, CONFIG_TOKEN]
      .into_iter()
      .find(|token| tail.starts_with(token));
    let Some(token) = token else {
      /* A brace that is not a placeholder belongs to the backend text */
      opaque.push('{');
      rest = &tail[1..];
      continue;
    };

    let Some(after) = tail[token.len()..].strip_prefix('.') else {
      return Err(SchemaError::InvalidExpression {
        path: ctx.path.to_string(),
        reason: format!("placeholder {} must be followed by '.member' in '{}'", token, text),
      });
    };
    let ident_len = after
      .find(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
      .unwrap_or(after.len());
    if ident_len == 0 {
      return Err(SchemaError::InvalidExpression {
        path: ctx.path.to_string(),
        reason: format!("placeholder {} without member name in '{}'", token, text),
      });
    }
    let member = after[..ident_len].to_string();

    if !opaque.is_empty() {
      pieces.push(Expr::Opaque(std::mem::take(&mut opaque)));
    }
    let operand = match token {
      SELF_TOKEN => Expr::SelfAttr(member),
      TYPE_TOKEN => match ctx.owner {
        Some(ty) => Expr::StaticRef { ty, member },
        None => {
          return Err(SchemaError::InvalidExpression {
            path: ctx.path.to_string(),
            reason: format!("{} used outside of a type in '{}'", TYPE_TOKEN, text),
          });
        }
      },
      _ => match ctx.config {
        Some(config) => Expr::ConfigRef { config, member },
        None => {
          return Err(SchemaError::MissingConfig {
            path: ctx.path.to_string(),
            expr: text.to_string(),
          });
        }
      },
    };
    pieces.push(operand);
    rest = &after[ident_len..];
  }
  opaque.push_str(rest);
  if !opaque.is_empty() {
    pieces.push(Expr::Opaque(opaque));
  }

  if pieces.len() == 1 {
    Ok(pieces.remove(0))
  } else {
    Ok(Expr::Concat(pieces))
  }
}

impl Expr {
  pub fn constant(&self) -> Option<i64> {
    match self {
      Expr::Const(v) => Some(*v),
      _ => None,
    }
  }

  pub fn is_constant(&self) -> bool {
    matches!(self, Expr::Const(_))
  }

  /* Sum with constant folding */
  pub fn add(lhs: Expr, rhs: Expr) -> Expr {
    match (lhs, rhs) {
      (Expr::Const(a), Expr::Const(b)) => Expr::Const(a + b),
      (Expr::Const(0), other) | (other, Expr::Const(0)) => other,
      (lhs, rhs) => Expr::Add(Box::new(lhs), Box::new(rhs)),
    }
  }

  /* Product with constant folding */
  pub fn mul(lhs: Expr, rhs: Expr) -> Expr {
    match (lhs, rhs) {
      (Expr::Const(a), Expr::Const(b)) => Expr::Const(a * b),
      (Expr::Const(0), _) | (_, Expr::Const(0)) => Expr::Const(0),
      (Expr::Const(1), other) | (other, Expr::Const(1)) => other,
      (lhs, rhs) => Expr::Mul(Box::new(lhs), Box::new(rhs)),
    }
  }

  pub fn product<I: IntoIterator<Item = Expr>>(factors: I) -> Expr {
    factors.into_iter().fold(Expr::Const(1), Expr::mul)
  }

  pub fn visit<'a>(&'a self, f: &mut impl FnMut(&'a Expr)) {
    f(self);
    match self {
      Expr::Add(a, b) | Expr::Mul(a, b) => {
        a.visit(f);
        b.visit(f);
      }
      Expr::Concat(parts) => {
        for part in parts {
          part.visit(f);
        }
      }
      Expr::Const(_)
      | Expr::SelfAttr(_)
      | Expr::StaticRef { .. }
      | Expr::ConfigRef { .. }
      | Expr::Opaque(_) => {}
    }
  }

  pub fn has_config_ref(&self) -> bool {
    let mut found = false;
    self.visit(&mut |e| {
      if matches!(e, Expr::ConfigRef { .. }) {
        found = true;
      }
    });
    found
  }

  pub fn self_refs(&self) -> Vec<&str> {
    let mut names = Vec::new();
    self.visit(&mut |e| {
      if let Expr::SelfAttr(name) = e {
        names.push(name.as_str());
      }
    });
    names
  }

  pub fn render(&self, renderer: &dyn OperandRenderer) -> String {
    match self {
      Expr::Const(v) => v.to_string(),
      Expr::SelfAttr(name) => renderer.self_attr(name),
      Expr::StaticRef { ty, member } => renderer.static_ref(*ty, member),
      Expr::ConfigRef { config, member } => renderer.config_ref(*config, member),
      Expr::Opaque(text) => text.clone(),
      Expr::Add(a, b) => format!("({}+{})", a.render(renderer), b.render(renderer)),
      Expr::Mul(a, b) => format!("{}*{}", a.render_factor(renderer), b.render_factor(renderer)),
      Expr::Concat(parts) => render_concat(parts, renderer),
    }
  }

  fn render_factor(&self, renderer: &dyn OperandRenderer) -> String {
    let simple = match self {
      Expr::Opaque(text) => text.chars().all(|c| c.is_ascii_alphanumeric() || c == '_'),
      Expr::Concat(_) => false,
      _ => true,
    };
    if simple {
      self.render(renderer)
    } else {
      format!("({})", self.render(renderer))
    }
  }
}

/* `{self}.name(...)` is a call; the renderer may add an implicit first argument */
fn render_concat(parts: &[Expr], renderer: &dyn OperandRenderer) -> String {
  let mut out = String::new();
  let mut implicit: Option<String> = None;
  for (index, part) in parts.iter().enumerate() {
    if let (Some(arg), Expr::Opaque(text)) = (implicit.take(), part) {
      let rest = &text[1..];
      let sep = if rest.trim_start().starts_with(')') { "" } else { ", " };
      out.push('(');
      out.push_str(&arg);
      out.push_str(sep);
      out.push_str(rest);
      continue;
    }
    match (part, parts.get(index + 1)) {
      (Expr::SelfAttr(name), Some(Expr::Opaque(next))) if next.starts_with('(') => {
        let (call, arg) = renderer.self_call(name);
        out.push_str(&call);
        implicit = arg;
      }
      _ => out.push_str(&part.render(renderer)),
    }
  }
  out
}

/* Backend-specific spelling of the placeholder operands */
pub trait OperandRenderer {
  /* `{self}.name` used as a value */
  fn self_attr(&self, name: &str) -> String;

  /* `{self}.name(` used as a call: callee text and optional implicit first argument */
  fn self_call(&self, name: &str) -> (String, Option<String>) {
    (self.self_attr(name), None)
  }

  fn static_ref(&self, ty: TypeId, member: &str) -> String;
  fn config_ref(&self, config: TypeId, member: &str) -> String;
}

/* Renders operands back into placeholder source form */
pub struct SourceRenderer;

impl OperandRenderer for SourceRenderer {
  fn self_attr(&self, name: &str) -> String {
    format!("{}.{}", SELF_TOKEN, name)
  }

  fn static_ref(&self, _ty: TypeId, member: &str) -> String {
    format!("{}.{}", TYPE_TOKEN, member)
  }

  fn config_ref(&self, _config: TypeId, member: &str) -> String {
    format!("{}.{}", CONFIG_TOKEN, member)
  }
}

impl fmt::Display for Expr {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(&self.render(&SourceRenderer))
  }
}
