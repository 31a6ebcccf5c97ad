//! Structural diff between two concept cards.
//!
//! Cards are compared as JSON trees. Paths are dotted (`definition.text`,
//! `claims.0.text`). Lists of equal length are compared element by element;
//! lists whose length differs are reported as one changed value.

use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::Value;

use crate::card::ConceptCard;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValueChange {
    pub old: Value,
    pub new: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CardDiff {
    pub slug: String,
    pub changed: BTreeMap<String, ValueChange>,
    pub added: BTreeMap<String, Value>,
    pub removed: BTreeMap<String, Value>,
    pub old_index_hash: String,
    pub new_index_hash: String,
    /// Whether the old card is stale against the live index.
    pub stale: bool,
}

impl CardDiff {
    pub fn is_empty(&self) -> bool {
        self.changed.is_empty() && self.added.is_empty() && self.removed.is_empty()
    }
}

/// Diff `old` against `new`; staleness is judged against `live_index_hash`.
pub fn diff_cards(
    old: &ConceptCard,
    new: &ConceptCard,
    live_index_hash: &str,
) -> serde_json::Result<CardDiff> {
    let old_v = serde_json::to_value(old)?;
    let new_v = serde_json::to_value(new)?;

    let mut diff = CardDiff {
        slug: new.slug.clone(),
        changed: BTreeMap::new(),
        added: BTreeMap::new(),
        removed: BTreeMap::new(),
        old_index_hash: old.provenance.index_hash.clone(),
        new_index_hash: new.provenance.index_hash.clone(),
        stale: old.is_stale(live_index_hash),
    };
    diff_values("", &old_v, &new_v, &mut diff);
    Ok(diff)
}

fn join(prefix: &str, key: &str) -> String {
    if prefix.is_empty() {
        key.to_string()
    } else {
        format!("{}.{}", prefix, key)
    }
}

fn diff_values(path: &str, old: &Value, new: &Value, out: &mut CardDiff) {
    match (old, new) {
        (Value::Object(a), Value::Object(b)) => {
            for (k, av) in a {
                let p = join(path, k);
                match b.get(k) {
                    Some(bv) => diff_values(&p, av, bv, out),
                    None => {
                        out.removed.insert(p, av.clone());
                    }
                }
            }
            for (k, bv) in b {
                if !a.contains_key(k) {
                    out.added.insert(join(path, k), bv.clone());
                }
            }
        }
        (Value::Array(a), Value::Array(b)) if a.len() == b.len() => {
            for (i, (av, bv)) in a.iter().zip(b).enumerate() {
                diff_values(&join(path, &i.to_string()), av, bv, out);
            }
        }
        _ if old != new => {
            out.changed.insert(
                path.to_string(),
                ValueChange {
                    old: old.clone(),
                    new: new.clone(),
                },
            );
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::card::fixtures::card;
    use serde_json::json;

    #[test]
    fn identical_cards_have_empty_diff() {
        let a = card("arp", "H");
        let d = diff_cards(&a, &a.clone(), "H").unwrap();
        assert!(d.is_empty());
        assert!(!d.stale);
    }

    #[test]
    fn nested_changes_use_dotted_paths() {
        let old = card("arp", "H1");
        let mut new = card("arp", "H2");
        new.claims[0].text = "changed".into();
        new.provenance.built_at = "2025-01-01T00:00:00Z".into();

        let d = diff_cards(&old, &new, "H2").unwrap();
        assert_eq!(
            d.changed.get("claims.0.text"),
            Some(&ValueChange {
                old: json!("ARP maps addresses."),
                new: json!("changed"),
            })
        );
        assert!(d.changed.contains_key("provenance.index_hash"));
        assert!(d.changed.contains_key("provenance.built_at"));
        assert_eq!(d.old_index_hash, "H1");
        assert_eq!(d.new_index_hash, "H2");
        assert!(d.stale);
    }

    #[test]
    fn lists_of_different_length_change_whole() {
        let old = card("arp", "H");
        let mut new = card("arp", "H");
        new.related = vec!["ip".into()];
        let d = diff_cards(&old, &new, "H").unwrap();
        assert_eq!(d.changed["related"].old, json!([]));
        assert_eq!(d.changed["related"].new, json!(["ip"]));
    }

    #[test]
    fn object_key_additions_and_removals() {
        let mut d = CardDiff {
            slug: "x".into(),
            changed: BTreeMap::new(),
            added: BTreeMap::new(),
            removed: BTreeMap::new(),
            old_index_hash: String::new(),
            new_index_hash: String::new(),
            stale: false,
        };
        diff_values(
            "",
            &json!({"a": 1, "b": {"c": 2}}),
            &json!({"b": {"c": 2, "d": 3}, "e": 4}),
            &mut d,
        );
        assert_eq!(d.removed.get("a"), Some(&json!(1)));
        assert_eq!(d.added.get("b.d"), Some(&json!(3)));
        assert_eq!(d.added.get("e"), Some(&json!(4)));
        assert!(d.changed.is_empty());
    }
}
