//! Query router: intent classification and target resolution.
//!
//! Every query is classified into exactly one [`Intent`] by a fixed
//! priority order, first match wins:
//!
//! 1. **TROUBLESHOOT**: a protocol keyword, a state keyword, and a
//!    supported vendor (from the caller's context or the text itself).
//! 2. **CONCEPT**: the query *is* a known concept slug, or contains a
//!    concept phrase ("concept card", "compare X and Y", ...) together with
//!    a slug it mentions.
//! 3. **DEFINE**: the fallback. The lexicon maps protocol terms to their
//!    canonical RFC; failing that, the ranker's top hit over the whole
//!    corpus decides, with discounted confidence.
//!
//! Routing never fails. If nothing resolves, the decision is DEFINE with no
//! target and confidence `0.0`. The router is a pure function of the query,
//! the context, the lexicon, the known slugs, and the index.

use std::collections::BTreeSet;
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::card::slug_form;
use crate::index::Index;
use crate::lexicon::{find_phrase, normalize_words, Lexicon};
use crate::rank::{score_query, RankMode, RankParams, Scope};
use crate::tokenize::tokenize;

/// Confidence added per matched troubleshooting category.
const CATEGORY_WEIGHT: f64 = 0.3;
/// Bonus when a specific case phrase (not just a protocol default) matched.
const CASE_PHRASE_BONUS: f64 = 0.1;
const CONCEPT_EXACT_CONFIDENCE: f64 = 0.9;
const CONCEPT_PHRASE_CONFIDENCE: f64 = 0.8;
const LEXICON_CONFIDENCE: f64 = 0.8;
const DEFINITION_CUE_BONUS: f64 = 0.1;
/// Ranker fallback confidence is this factor times the top hit's TF-IDF cosine.
const FALLBACK_DISCOUNT: f64 = 0.5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Intent {
    Define,
    Concept,
    Troubleshoot,
}

impl Intent {
    pub fn as_str(&self) -> &'static str {
        match self {
            Intent::Define => "DEFINE",
            Intent::Concept => "CONCEPT",
            Intent::Troubleshoot => "TROUBLESHOOT",
        }
    }
}

/// What a decision points at; exactly one kind per intent.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "lowercase")]
pub enum RouteTarget {
    Document(u32),
    Concept(String),
    Case(String),
}

impl std::fmt::Display for RouteTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RouteTarget::Document(n) => write!(f, "{}", n),
            RouteTarget::Concept(s) | RouteTarget::Case(s) => f.write_str(s),
        }
    }
}

/// Troubleshooting hints passed through from the caller or extracted from the query.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RouteContext {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vendor: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interface: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub area: Option<String>,
}

fn interface_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)\b(?:[a-z]{1,16}-?\d+(?:/\d+)+(?:\.\d+)?|(?:eth|ens|eno|em)\d+)\b")
            .expect("interface pattern is valid")
    })
}

fn area_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)\barea\s+(\d+(?:\.\d+\.\d+\.\d+)?)\b").expect("area pattern is valid")
    })
}

impl RouteContext {
    /// Extract vendor, interface, and OSPF area hints from free text.
    ///
    /// ```rust
    /// use netref_core::lexicon::Lexicon;
    /// use netref_core::router::RouteContext;
    ///
    /// let ctx = RouteContext::from_query("ospf down on cisco g0/0 area 0", &Lexicon::default());
    /// assert_eq!(ctx.vendor.as_deref(), Some("iosxe"));
    /// assert_eq!(ctx.interface.as_deref(), Some("g0/0"));
    /// assert_eq!(ctx.area.as_deref(), Some("0"));
    /// ```
    pub fn from_query(query: &str, lexicon: &Lexicon) -> Self {
        let words = normalize_words(query);
        let vendor = first_match(&words, lexicon.vendors.keys())
            .and_then(|(alias, _)| lexicon.canonical_vendor(&alias).map(str::to_string));
        let interface = interface_re()
            .find(query)
            .map(|m| m.as_str().to_lowercase());
        let area = area_re()
            .captures(query)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str().to_string());
        Self {
            vendor,
            interface,
            area,
        }
    }

    /// Fill unset fields from `fallback`; explicit values win.
    pub fn or(self, fallback: RouteContext) -> Self {
        Self {
            vendor: self.vendor.or(fallback.vendor),
            interface: self.interface.or(fallback.interface),
            area: self.area.or(fallback.area),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.vendor.is_none() && self.interface.is_none() && self.area.is_none()
    }
}

/// The router's verdict for one query.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RouterDecision {
    pub intent: Intent,
    pub target: Option<RouteTarget>,
    pub confidence: f64,
    pub matched_terms: Vec<String>,
    pub rationale: String,
    /// Context forwarded to the troubleshooting engine.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<RouteContext>,
}

impl RouterDecision {
    fn unresolved(rationale: impl Into<String>) -> Self {
        Self {
            intent: Intent::Define,
            target: None,
            confidence: 0.0,
            matched_terms: Vec::new(),
            rationale: rationale.into(),
            context: None,
        }
    }

    /// Target RFC number for DEFINE decisions.
    pub fn document(&self) -> Option<u32> {
        match self.target {
            Some(RouteTarget::Document(n)) => Some(n),
            _ => None,
        }
    }
}

/// Borrowed view over everything routing needs.
pub struct Router<'a> {
    index: &'a Index,
    lexicon: &'a Lexicon,
    params: &'a RankParams,
    known_slugs: BTreeSet<String>,
}

impl<'a> Router<'a> {
    pub fn new(index: &'a Index, lexicon: &'a Lexicon, params: &'a RankParams) -> Self {
        let known_slugs = lexicon
            .concept_slugs
            .iter()
            .map(|s| slug_form(s))
            .collect();
        Self {
            index,
            lexicon,
            params,
            known_slugs,
        }
    }

    /// Register slugs of stored concept cards.
    pub fn with_known_slugs<I, S>(mut self, slugs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.known_slugs
            .extend(slugs.into_iter().map(|s| slug_form(s.as_ref())));
        self
    }

    /// Classify `query` and resolve its target.
    pub fn route(&self, query: &str, context: &RouteContext) -> RouterDecision {
        let words = normalize_words(query);
        if words.trim().is_empty() {
            return RouterDecision::unresolved("empty query");
        }

        let extracted = RouteContext::from_query(query, self.lexicon);
        let ctx = normalize_context(context.clone(), self.lexicon).or(extracted);

        let mut notes = Vec::new();
        match self.troubleshoot(&words, &ctx) {
            Troubleshoot::Matched(decision) => return decision,
            Troubleshoot::UnsupportedVendor(vendor) => notes.push(format!(
                "troubleshooting requested but vendor '{}' is not supported (supported: {})",
                vendor,
                self.lexicon.supported_vendors.join(", ")
            )),
            Troubleshoot::NoMatch => {}
        }

        if let Some(decision) = self.concept(query, &words) {
            return decision;
        }

        let mut decision = self.define(query, &words);
        if !notes.is_empty() {
            notes.push(decision.rationale);
            decision.rationale = notes.join("; ");
        }
        decision
    }

    /// DEFINE-path resolution only: lexicon lookup, then ranker fallback.
    ///
    /// Used directly by the concept compiler to map a slug to its document.
    pub fn define(&self, query: &str, words: &str) -> RouterDecision {
        let cue = self
            .lexicon
            .definition_cues
            .iter()
            .any(|c| find_phrase(words, c).is_some());

        // Longest term wins, then earliest position.
        let mut best: Option<(&str, u32, usize)> = None;
        for (term, &rfc) in &self.lexicon.documents {
            if let Some(pos) = find_phrase(words, term) {
                let better = match best {
                    None => true,
                    Some((t, _, p)) => {
                        term.len() > t.len() || (term.len() == t.len() && pos < p)
                    }
                };
                if better {
                    best = Some((term.as_str(), rfc, pos));
                }
            }
        }

        if let Some((term, rfc, _)) = best {
            let confidence = if cue {
                (LEXICON_CONFIDENCE + DEFINITION_CUE_BONUS).min(1.0)
            } else {
                LEXICON_CONFIDENCE
            };
            return RouterDecision {
                intent: Intent::Define,
                target: Some(RouteTarget::Document(rfc)),
                confidence,
                matched_terms: vec![term.to_string()],
                rationale: format!("lexicon maps '{}' to RFC {}", term, rfc),
                context: None,
            };
        }

        if let Some(term) = self
            .lexicon
            .offtopic
            .iter()
            .find(|t| find_phrase(words, t).is_some())
        {
            let mut d = RouterDecision::unresolved(format!("off-topic term '{}'", term));
            d.matched_terms.push(term.clone());
            return d;
        }

        let hits = score_query(
            self.index,
            query,
            RankMode::Hybrid,
            Scope::All,
            self.params,
            None,
        );
        match hits.first() {
            Some(top) if top.matched() => {
                let matched: Vec<String> = self
                    .index
                    .stats(top.position)
                    .map(|st| {
                        let mut seen = BTreeSet::new();
                        tokenize(query)
                            .into_iter()
                            .filter(|t| st.tf.contains_key(t) && seen.insert(t.clone()))
                            .collect()
                    })
                    .unwrap_or_default();
                RouterDecision {
                    intent: Intent::Define,
                    target: Some(RouteTarget::Document(top.section.rfc_number)),
                    confidence: (FALLBACK_DISCOUNT * top.tfidf).clamp(0.0, 1.0),
                    matched_terms: matched,
                    rationale: format!(
                        "no lexicon term; top ranked section is RFC {} section {}",
                        top.section.rfc_number, top.section.section
                    ),
                    context: None,
                }
            }
            _ => RouterDecision::unresolved("no lexicon term and no ranked match"),
        }
    }

    fn troubleshoot(&self, words: &str, ctx: &RouteContext) -> Troubleshoot {
        let Some((protocol, _)) = first_match(words, self.lexicon.protocols.iter()) else {
            return Troubleshoot::NoMatch;
        };
        let states: Vec<String> = self
            .lexicon
            .states
            .iter()
            .filter(|s| find_phrase(words, s).is_some())
            .cloned()
            .collect();
        if states.is_empty() {
            return Troubleshoot::NoMatch;
        }
        let Some(vendor) = ctx.vendor.clone() else {
            return Troubleshoot::NoMatch;
        };
        if !self.lexicon.is_supported_vendor(&vendor) {
            return Troubleshoot::UnsupportedVendor(vendor);
        }

        // Longest case phrase wins, then earliest position.
        let mut phrase: Option<(&str, &str, usize)> = None;
        for rule in &self.lexicon.cases {
            if let Some(pos) = find_phrase(words, &rule.phrase) {
                let better = match phrase {
                    None => true,
                    Some((p, _, at)) => {
                        rule.phrase.len() > p.len() || (rule.phrase.len() == p.len() && pos < at)
                    }
                };
                if better {
                    phrase = Some((rule.phrase.as_str(), rule.case.as_str(), pos));
                }
            }
        }

        let (case, mut confidence) = match phrase {
            Some((_, case, _)) => (case.to_string(), 3.0 * CATEGORY_WEIGHT + CASE_PHRASE_BONUS),
            None => (self.lexicon.default_case(&protocol), 3.0 * CATEGORY_WEIGHT),
        };
        confidence = confidence.min(1.0);

        let mut matched = vec![protocol.clone()];
        matched.extend(states);
        if let Some((p, _, _)) = phrase {
            if !matched.iter().any(|m| m == p) {
                matched.push(p.to_string());
            }
        }
        matched.push(vendor.clone());

        Troubleshoot::Matched(RouterDecision {
            intent: Intent::Troubleshoot,
            target: Some(RouteTarget::Case(case.clone())),
            confidence,
            matched_terms: matched,
            rationale: format!("{} troubleshooting on {} resolved to case {}", protocol, vendor, case),
            context: Some(ctx.clone()),
        })
    }

    fn concept(&self, query: &str, words: &str) -> Option<RouterDecision> {
        let normalized = slug_form(query);
        if self.known_slugs.contains(&normalized) {
            return Some(RouterDecision {
                intent: Intent::Concept,
                target: Some(RouteTarget::Concept(normalized.clone())),
                confidence: CONCEPT_EXACT_CONFIDENCE,
                matched_terms: vec![normalized.clone()],
                rationale: format!("query is the concept slug '{}'", normalized),
                context: None,
            });
        }

        let phrase = first_match(words, self.lexicon.concept_phrases.iter())?;

        // Slugs mentioned anywhere: stored cards plus lexicon terms.
        let candidates = self
            .known_slugs
            .iter()
            .cloned()
            .chain(self.lexicon.documents.keys().map(|t| slug_form(t)));
        let mut mentioned: Option<(String, usize)> = None;
        for slug in candidates {
            if let Some(pos) = find_phrase(words, &slug.replace(['-', '_'], " ")) {
                if mentioned.as_ref().map_or(true, |(_, p)| pos < *p) {
                    mentioned = Some((slug, pos));
                }
            }
        }
        let (slug, _) = mentioned?;

        Some(RouterDecision {
            intent: Intent::Concept,
            target: Some(RouteTarget::Concept(slug.clone())),
            confidence: CONCEPT_PHRASE_CONFIDENCE,
            matched_terms: vec![phrase.0, slug.clone()],
            rationale: format!("concept phrase with slug '{}'", slug),
            context: None,
        })
    }
}

enum Troubleshoot {
    Matched(RouterDecision),
    UnsupportedVendor(String),
    NoMatch,
}

/// Earliest-positioned phrase from `phrases` found in `words`.
fn first_match<'p, I>(words: &str, phrases: I) -> Option<(String, usize)>
where
    I: Iterator<Item = &'p String>,
{
    let mut best: Option<(String, usize)> = None;
    for p in phrases {
        if let Some(pos) = find_phrase(words, p) {
            if best.as_ref().map_or(true, |(_, b)| pos < *b) {
                best = Some((p.clone(), pos));
            }
        }
    }
    best
}

fn normalize_context(mut ctx: RouteContext, lexicon: &Lexicon) -> RouteContext {
    if let Some(v) = ctx.vendor.take() {
        let v = v.trim().to_lowercase();
        if !v.is_empty() {
            ctx.vendor = Some(
                lexicon
                    .canonical_vendor(&v)
                    .map(str::to_string)
                    .unwrap_or(v),
            );
        }
    }
    ctx
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SectionRecord;

    fn rec(rfc: u32, sec: &str, title: &str, text: &str) -> SectionRecord {
        SectionRecord {
            rfc_number: rfc,
            section: sec.to_string(),
            title: title.to_string(),
            text: text.to_string(),
        }
    }

    fn index() -> Index {
        Index::build(vec![
            rec(826, "1", "Introduction", "The Address Resolution Protocol (ARP) maps protocol addresses to hardware addresses."),
            rec(2328, "1", "Introduction", "OSPF is a link-state routing protocol. Neighbors form adjacencies."),
            rec(5227, "1", "Introduction", "IPv4 address conflict detection probes for duplicate addresses."),
        ])
        .unwrap()
    }

    fn route(query: &str, ctx: RouteContext) -> RouterDecision {
        let idx = index();
        let lex = Lexicon::default();
        let params = RankParams::default();
        Router::new(&idx, &lex, &params)
            .with_known_slugs(["default-route", "arp", "static_route"])
            .route(query, &ctx)
    }

    #[test]
    fn what_is_arp_defines_826() {
        let d = route("what is arp", RouteContext::default());
        assert_eq!(d.intent, Intent::Define);
        assert_eq!(d.target, Some(RouteTarget::Document(826)));
        assert!((d.confidence - 0.9).abs() < 1e-12);
        assert_eq!(d.matched_terms, vec!["arp"]);
    }

    #[test]
    fn troubleshoot_beats_define_with_vendor_in_text() {
        let d = route("ospf neighbor down on cisco g0/1", RouteContext::default());
        assert_eq!(d.intent, Intent::Troubleshoot);
        assert_eq!(d.target, Some(RouteTarget::Case("ospf-neighbor-down".into())));
        assert!((d.confidence - 0.9).abs() < 1e-12);
        let ctx = d.context.unwrap();
        assert_eq!(ctx.vendor.as_deref(), Some("iosxe"));
        assert_eq!(ctx.interface.as_deref(), Some("g0/1"));
    }

    #[test]
    fn troubleshoot_with_vendor_from_context_and_case_phrase() {
        let ctx = RouteContext {
            vendor: Some("juniper".into()),
            ..Default::default()
        };
        let d = route("ospf stuck in exstart", ctx);
        assert_eq!(d.intent, Intent::Troubleshoot);
        assert_eq!(d.target, Some(RouteTarget::Case("ospf-neighbor-down".into())));
        assert!((d.confidence - 1.0).abs() < 1e-12);
        assert!(d.matched_terms.contains(&"stuck in exstart".to_string()));
        assert!(d.matched_terms.contains(&"junos".to_string()));
    }

    #[test]
    fn troubleshoot_needs_a_vendor() {
        let d = route("ospf neighbor down", RouteContext::default());
        assert_eq!(d.intent, Intent::Define);
        assert_eq!(d.target, Some(RouteTarget::Document(2328)));
    }

    #[test]
    fn unsupported_vendor_falls_through_with_note() {
        let d = route("bgp session down on arista", RouteContext::default());
        assert_eq!(d.intent, Intent::Define);
        assert_eq!(d.target, Some(RouteTarget::Document(4271)));
        assert!(d.rationale.contains("not supported"));
    }

    #[test]
    fn exact_slug_routes_to_concept() {
        let d = route("  Default Route ", RouteContext::default());
        assert_eq!(d.intent, Intent::Concept);
        assert_eq!(d.target, Some(RouteTarget::Concept("default-route".into())));
        assert!((d.confidence - 0.9).abs() < 1e-12);
    }

    #[test]
    fn concept_phrase_with_mentioned_slug() {
        let d = route("compare ospf and bgp", RouteContext::default());
        assert_eq!(d.intent, Intent::Concept);
        assert_eq!(d.target, Some(RouteTarget::Concept("ospf".into())));

        let d = route("concept card for arp", RouteContext::default());
        assert_eq!(d.target, Some(RouteTarget::Concept("arp".into())));
    }

    #[test]
    fn concept_phrase_without_slug_falls_back_to_define() {
        let d = route("difference between the two", RouteContext::default());
        assert_eq!(d.intent, Intent::Define);
    }

    #[test]
    fn ranker_fallback_discounts_confidence() {
        let d = route("duplicate address conflict detection", RouteContext::default());
        assert_eq!(d.intent, Intent::Define);
        assert_eq!(d.target, Some(RouteTarget::Document(5227)));
        assert!(d.confidence > 0.0 && d.confidence <= 0.5);
        assert!(d.matched_terms.contains(&"duplicate".to_string()));
    }

    #[test]
    fn unresolvable_query_is_null_define() {
        let d = route("zzzz qqqq", RouteContext::default());
        assert_eq!(d.intent, Intent::Define);
        assert_eq!(d.target, None);
        assert_eq!(d.confidence, 0.0);

        let d = route("", RouteContext::default());
        assert_eq!(d.target, None);
    }

    #[test]
    fn offtopic_query_is_null_define() {
        let d = route("weather tomorrow", RouteContext::default());
        assert_eq!(d.target, None);
        assert_eq!(d.confidence, 0.0);
        assert_eq!(d.matched_terms, vec!["weather"]);
    }

    #[test]
    fn routing_is_deterministic() {
        for q in ["what is arp", "ospf down cisco", "compare arp and ip", "address probes"] {
            assert_eq!(route(q, RouteContext::default()), route(q, RouteContext::default()));
        }
    }

    #[test]
    fn longest_lexicon_term_wins() {
        let d = route("what is ipv6", RouteContext::default());
        assert_eq!(d.target, Some(RouteTarget::Document(8200)));
        let d = route("private addressing in ip networks", RouteContext::default());
        assert_eq!(d.target, Some(RouteTarget::Document(1918)));
    }

    #[test]
    fn context_extraction() {
        let lex = Lexicon::default();
        let ctx = RouteContext::from_query("bgp idle on junos ge-0/0/0.0 area 0.0.0.1", &lex);
        assert_eq!(ctx.vendor.as_deref(), Some("junos"));
        assert_eq!(ctx.interface.as_deref(), Some("ge-0/0/0.0"));
        assert_eq!(ctx.area.as_deref(), Some("0.0.0.1"));
        assert!(RouteContext::from_query("what is arp", &lex).is_empty());
    }

    #[test]
    fn stored_slug_with_underscore_routes_verbatim() {
        let d = route("Static_Route", RouteContext::default());
        assert_eq!(d.intent, Intent::Concept);
        assert_eq!(d.target, Some(RouteTarget::Concept("static_route".into())));
    }
}
