//! Router lexicon: keyword sets mapped to routing outcomes.
//!
//! The lexicon is plain data loaded once at startup and never mutated.
//! [`Lexicon::default`] carries the built-in networking vocabulary; an
//! override can be deserialized from TOML with the same field names, and
//! any field left out keeps its default.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// A phrase that pins a troubleshooting query to a specific case.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaseRule {
    pub phrase: String,
    pub case: String,
}

/// Immutable routing vocabulary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Lexicon {
    /// Protocol keywords that anchor a troubleshooting query.
    pub protocols: Vec<String>,
    /// Troubleshooting-state keywords and phrases.
    pub states: Vec<String>,
    /// Vendor alias → canonical vendor name.
    pub vendors: BTreeMap<String, String>,
    /// Canonical vendors the playbook engine accepts.
    pub supported_vendors: Vec<String>,
    /// Specific troubleshooting phrases → case id.
    pub cases: Vec<CaseRule>,
    /// Protocol → fallback case id.
    pub default_cases: BTreeMap<String, String>,
    /// Phrases that indicate a concept-card request.
    pub concept_phrases: Vec<String>,
    /// Slugs always considered known concepts.
    pub concept_slugs: Vec<String>,
    /// Term → canonical defining RFC.
    pub documents: BTreeMap<String, u32>,
    /// Phrases marking a definitional question.
    pub definition_cues: Vec<String>,
    /// Terms that mark a query as unrelated to networking.
    pub offtopic: Vec<String>,
    /// Default cross-links for compiled cards, by slug.
    pub related: BTreeMap<String, Vec<String>>,
    /// Default tags for compiled cards, by slug.
    pub tags: BTreeMap<String, Vec<String>>,
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

impl Default for Lexicon {
    fn default() -> Self {
        let vendors = [
            ("iosxe", "iosxe"),
            ("ios-xe", "iosxe"),
            ("ios", "iosxe"),
            ("cisco", "iosxe"),
            ("junos", "junos"),
            ("juniper", "junos"),
            ("nxos", "nxos"),
            ("nexus", "nxos"),
            ("eos", "eos"),
            ("arista", "eos"),
        ];
        let cases = [
            ("stuck in exstart", "ospf-neighbor-down"),
            ("exstart", "ospf-neighbor-down"),
            ("mtu mismatch", "ospf-neighbor-down"),
            ("not forming adjacency", "ospf-neighbor-down"),
            ("lsa storm", "ospf-lsa-storm"),
            ("bgp flap", "bgp-flap"),
            ("bgp flapping", "bgp-flap"),
            ("bgp idle", "bgp-neighbor-down"),
            ("bgp active", "bgp-neighbor-down"),
            ("bgp not established", "bgp-neighbor-down"),
            ("tcp handshake", "tcp-handshake"),
            ("tcp refused", "tcp-handshake"),
            ("arp incomplete", "arp-anomalies"),
            ("port channel", "lacp-port-channel-down"),
        ];
        let default_cases = [
            ("ospf", "ospf-neighbor-down"),
            ("bgp", "bgp-neighbor-down"),
            ("tcp", "tcp-handshake"),
            ("arp", "arp-anomalies"),
            ("lacp", "lacp-port-channel-down"),
        ];
        let documents = [
            ("ospf", 2328),
            ("arp", 826),
            ("bgp", 4271),
            ("tcp", 9293),
            ("ip", 791),
            ("icmp", 792),
            ("dns", 1035),
            ("dhcp", 2131),
            ("ipv6", 8200),
            ("private addressing", 1918),
            ("router requirements", 1812),
        ];
        let related = [
            ("arp", vec!["ip"]),
            ("ospf", vec!["ip"]),
            ("bgp", vec!["tcp"]),
            ("tcp", vec!["ip"]),
            ("icmp", vec!["ip"]),
            ("ipv6", vec!["ip"]),
        ];
        let tags = [
            ("arp", vec!["l2", "addressing"]),
            ("ospf", vec!["routing", "igp"]),
            ("bgp", vec!["routing", "egp"]),
            ("tcp", vec!["transport"]),
            ("ip", vec!["l3", "addressing"]),
            ("icmp", vec!["l3", "diagnostics"]),
            ("dns", vec!["naming"]),
            ("dhcp", vec!["addressing"]),
            ("ipv6", vec!["l3", "addressing"]),
        ];

        Self {
            protocols: strings(&[
                "ospf", "bgp", "eigrp", "isis", "rip", "arp", "tcp", "udp", "ip", "lacp",
            ]),
            states: strings(&[
                "down",
                "flap",
                "flapping",
                "stuck",
                "exstart",
                "incomplete",
                "mtu mismatch",
                "auth mismatch",
                "not working",
                "not forming adjacency",
                "idle",
                "active",
                "unreachable",
                "timeout",
                "refused",
                "reset",
                "broken",
                "failed",
                "storm",
            ]),
            vendors: vendors
                .iter()
                .map(|(a, c)| (a.to_string(), c.to_string()))
                .collect(),
            supported_vendors: strings(&["iosxe", "junos"]),
            cases: cases
                .iter()
                .map(|(p, c)| CaseRule {
                    phrase: p.to_string(),
                    case: c.to_string(),
                })
                .collect(),
            default_cases: default_cases
                .iter()
                .map(|(p, c)| (p.to_string(), c.to_string()))
                .collect(),
            concept_phrases: strings(&[
                "concept card",
                "concept",
                "compare",
                "difference between",
                "vs",
                "versus",
                "explain with evidence",
            ]),
            concept_slugs: Vec::new(),
            documents: documents
                .iter()
                .map(|(t, n)| (t.to_string(), *n))
                .collect(),
            definition_cues: strings(&[
                "what is",
                "what are",
                "what does",
                "define",
                "definition of",
                "meaning of",
            ]),
            offtopic: strings(&[
                "weather", "recipe", "cooking", "pizza", "movie", "horoscope", "lottery", "stock",
            ]),
            related: related
                .iter()
                .map(|(s, r)| (s.to_string(), strings(r)))
                .collect(),
            tags: tags
                .iter()
                .map(|(s, t)| (s.to_string(), strings(t)))
                .collect(),
        }
    }
}

impl Lexicon {
    /// Canonical vendor for an alias, if known.
    pub fn canonical_vendor(&self, word: &str) -> Option<&str> {
        self.vendors.get(&word.to_lowercase()).map(String::as_str)
    }

    pub fn is_supported_vendor(&self, vendor: &str) -> bool {
        self.supported_vendors.iter().any(|v| v == vendor)
    }

    /// Case id for a protocol when no specific phrase matched.
    pub fn default_case(&self, protocol: &str) -> String {
        self.default_cases
            .get(protocol)
            .cloned()
            .unwrap_or_else(|| format!("{}-troubleshoot", protocol))
    }
}

/// Lowercase `text` and collapse every run of non-alphanumeric characters
/// into a single space, padded at both ends for whole-word matching.
pub fn normalize_words(text: &str) -> String {
    let mut out = String::with_capacity(text.len() + 2);
    out.push(' ');
    let mut last_space = true;
    for c in text.chars().flat_map(char::to_lowercase) {
        if c.is_alphanumeric() {
            out.push(c);
            last_space = false;
        } else if !last_space {
            out.push(' ');
            last_space = true;
        }
    }
    if !last_space {
        out.push(' ');
    }
    out
}

/// Byte position of `phrase` as whole words in `normalized`, which must
/// come from [`normalize_words`].
pub fn find_phrase(normalized: &str, phrase: &str) -> Option<usize> {
    let needle = normalize_words(phrase);
    if needle.trim().is_empty() {
        return None;
    }
    normalized.find(&needle)
}
