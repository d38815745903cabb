use serde_derive::{Deserialize, Serialize};
use std::fmt;

/// A parsed declaration tag: `name` or `name(argument)`.
///
/// Tag names are normalized so that `skip-proxy` and `skip_proxy` compare equal.
#[derive(Serialize, Deserialize, Debug, PartialEq, Eq, Clone, PartialOrd, Ord)]
pub struct Tag {
    pub name: String,
    pub arg: Option<String>,
}

impl Tag {
    pub fn parse(raw: &str) -> Option<Tag> {
        let raw = raw.trim();
        if raw.is_empty() {
            return None;
        }
        match raw.find('(') {
            Some(open) => {
                /* Unterminated argument lists are taken literally up to the end */
                let inner = raw[open + 1..].strip_suffix(')').unwrap_or(&raw[open + 1..]);
                Some(Tag {
                    name: normalize_tag_name(&raw[..open]),
                    arg: Some(inner.trim().to_string()),
                })
            }
            None => Some(Tag { name: normalize_tag_name(raw), arg: None }),
        }
    }

    pub fn parse_all(raw: &[String]) -> Vec<Tag> {
        raw.iter().filter_map(|t| Tag::parse(t)).collect()
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.arg {
            Some(arg) => write!(f, "{}({})", self.name, arg),
            None => write!(f, "{}", self.name),
        }
    }
}

pub fn normalize_tag_name(name: &str) -> String {
    name.trim().replace('-', "_")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_bare_and_argument_tags() {
        assert_eq!(Tag::parse("value_type"), Some(Tag { name: "value_type".into(), arg: None }));
        assert_eq!(
            Tag::parse("external(Acq/ConfigV1.h)"),
            Some(Tag { name: "external".into(), arg: Some("Acq/ConfigV1.h".into()) })
        );
        assert_eq!(Tag::parse("skip-proxy").map(|t| t.name), Some("skip_proxy".to_string()));
        assert_eq!(Tag::parse("   "), None);
    }

    #[test]
    fn display_round_trips_argument() {
        let tag = Tag::parse("alias( Old::Name )").expect("tag");
        assert_eq!(tag.to_string(), "alias(Old::Name)");
    }
}
