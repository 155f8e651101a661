// SPDX-License-Identifier: MIT
//! YAML text form of the tree
//!
//! Tagged nodes become YAML local tags (`!core/integer-1.0.0`), and block
//! references use the reserved `!block` tag over the block index.

use serde_yaml::value::{Tag as YamlTag, TaggedValue};
use serde_yaml::{Mapping, Number, Value};

use super::node::Node;
use super::tag::Tag;
use super::{TreeError, TreeResult};
use crate::block::BlockRef;

/// YAML tag used for block references
pub const BLOCK_TAG: &str = "block";

/// Convert a tree into a YAML value
pub fn to_yaml_value(node: &Node) -> Value {
    match node {
        Node::Null => Value::Null,
        Node::Bool(b) => Value::Bool(*b),
        Node::Int(i) => Value::Number(Number::from(*i)),
        Node::Float(f) => Value::Number(Number::from(*f)),
        Node::Str(s) => Value::String(s.clone()),
        Node::Sequence(items) => Value::Sequence(items.iter().map(to_yaml_value).collect()),
        Node::Mapping(map) => {
            let mut mapping = Mapping::new();
            for (key, value) in map {
                mapping.insert(Value::String(key.clone()), to_yaml_value(value));
            }
            Value::Mapping(mapping)
        }
        Node::Tagged(tag, payload) => Value::Tagged(Box::new(TaggedValue {
            tag: YamlTag::new(tag.to_string()),
            value: to_yaml_value(payload),
        })),
        Node::Block(block) => Value::Tagged(Box::new(TaggedValue {
            tag: YamlTag::new(BLOCK_TAG),
            value: Value::Number(Number::from(block.index())),
        })),
    }
}

/// Convert a YAML value into a tree
pub fn from_yaml_value(value: Value) -> TreeResult<Node> {
    Ok(match value {
        Value::Null => Node::Null,
        Value::Bool(b) => Node::Bool(b),
        Value::Number(n) => number_node(&n)?,
        Value::String(s) => Node::Str(s),
        Value::Sequence(items) => Node::Sequence(
            items
                .into_iter()
                .map(from_yaml_value)
                .collect::<TreeResult<_>>()?,
        ),
        Value::Mapping(mapping) => {
            let mut map = std::collections::BTreeMap::new();
            for (key, value) in mapping {
                let key = match key {
                    Value::String(key) => key,
                    other => {
                        return Err(TreeError::Unsupported(format!(
                            "mapping key must be a string, got {:?}",
                            other
                        )))
                    }
                };
                map.insert(key, from_yaml_value(value)?);
            }
            Node::Mapping(map)
        }
        Value::Tagged(tagged) => {
            let TaggedValue { tag, value } = *tagged;
            let tag = tag.to_string();
            let tag = tag.trim_start_matches('!');
            if tag == BLOCK_TAG {
                block_node(&value)?
            } else {
                Node::tagged(tag.parse::<Tag>()?, from_yaml_value(value)?)
            }
        }
    })
}

fn number_node(n: &Number) -> TreeResult<Node> {
    if let Some(i) = n.as_i64() {
        Ok(Node::Int(i))
    } else if n.is_f64() {
        Ok(Node::Float(n.as_f64().unwrap_or(f64::NAN)))
    } else {
        // u64 beyond i64 range; large integers belong in core/integer
        Err(TreeError::Unsupported(format!(
            "integer {} exceeds the native integer range",
            n
        )))
    }
}

fn block_node(value: &Value) -> TreeResult<Node> {
    value
        .as_u64()
        .and_then(|index| u32::try_from(index).ok())
        .map(|index| Node::Block(BlockRef::new(index)))
        .ok_or_else(|| TreeError::Unsupported(format!("invalid block reference {:?}", value)))
}

/// Emit a tree as YAML text
pub fn emit(node: &Node) -> TreeResult<String> {
    Ok(serde_yaml::to_string(&to_yaml_value(node))?)
}

/// Parse YAML text into a tree
pub fn parse(text: &str) -> TreeResult<Node> {
    let value: Value = serde_yaml::from_str(text)?;
    from_yaml_value(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::TagVersion;
    use std::collections::BTreeMap;

    fn sample_tree() -> Node {
        let mut words = BTreeMap::new();
        words.insert("sign".to_string(), Node::from("-"));
        words.insert(
            "words".to_string(),
            Node::Sequence(vec![Node::Int(1), Node::Int(4_294_967_295)]),
        );

        let mut root = BTreeMap::new();
        root.insert("name".to_string(), Node::from("sample"));
        root.insert("flag".to_string(), Node::Bool(true));
        root.insert("ratio".to_string(), Node::Float(0.25));
        root.insert("nothing".to_string(), Node::Null);
        root.insert("data".to_string(), Node::Block(BlockRef::new(7)));
        root.insert(
            "big".to_string(),
            Node::tagged(
                Tag::new("core/integer", TagVersion::new(1, 0, 0)),
                Node::Mapping(words),
            ),
        );
        root.insert("complex".to_string(), Node::from("3+4j"));
        root.insert("inf_literal".to_string(), Node::from("inf"));
        Node::Mapping(root)
    }

    #[test]
    fn test_emit_then_parse() {
        let tree = sample_tree();
        let text = emit(&tree).unwrap();
        assert!(text.contains("!block 7"));
        assert!(text.contains("!core/integer-1.0.0"));
        assert_eq!(parse(&text).unwrap(), tree);
    }

    #[test]
    fn test_parse_handwritten_yaml() {
        let text = "a: !core/complex-1.0.0 3+4j\nb: !block 2\nc: [1, 2.5, x]\n";
        let tree = parse(text).unwrap();

        let (tag, payload) = tree.get("a").unwrap().as_tagged().unwrap();
        assert_eq!(tag.name, "core/complex");
        assert_eq!(payload.as_str(), Some("3+4j"));
        assert_eq!(tree.get("b").unwrap().as_block(), Some(BlockRef::new(2)));
        assert_eq!(
            tree.get("c").unwrap().as_sequence().unwrap(),
            &[Node::Int(1), Node::Float(2.5), Node::from("x")]
        );
    }

    #[test]
    fn test_rejects_non_string_keys() {
        assert!(matches!(
            parse("1: one\n"),
            Err(TreeError::Unsupported(_))
        ));
    }

    #[test]
    fn test_rejects_bad_block_reference() {
        assert!(parse("a: !block nope\n").is_err());
        assert!(parse("a: !block -1\n").is_err());
    }

    #[test]
    fn test_rejects_unversioned_tag() {
        assert!(matches!(
            parse("a: !core/integer {}\n"),
            Err(TreeError::InvalidTag(_))
        ));
    }
}
