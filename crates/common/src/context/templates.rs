//! Graph query templates
//!
//! Four traversal shapes, one per [`TemplateKind`], plus the one-row probe.
//! Every template matches papers whose title or label contains the term,
//! walks one or two relations whose predicate IRI (lowercased) matches a
//! named pattern set, and reads the row text from the first non-empty of
//! `rdf:value`, `rdfs:label`, `dcterms:description`.

use serde::{Deserialize, Serialize};
use std::fmt;

const PREFIXES: &str = "PREFIX rdf:  <http://www.w3.org/1999/02/22-rdf-syntax-ns#>
PREFIX rdfs: <http://www.w3.org/2000/01/rdf-schema#>
PREFIX dcterms: <http://purl.org/dc/terms/>
";

/// Text-bearing properties, in preference order
const TEXT_PROPERTIES: &[&str] = &["rdf:value", "rdfs:label", "dcterms:description"];

pub const SECTION_PREDICATES: &[&str] = &["hassection", "section"];
pub const CONTENT_PREDICATES: &[&str] = &["hascontent", "content"];
pub const PROBLEM_WORDS: &[&str] = &["problem", "challenge", "issue", "limitation", "constraint"];

pub const ABSTRACT_DIRECT: &[&str] = &["abstract", "purpose", "hasabstract", "haspurpose", "section", "hassection"];
pub const ABSTRACT_NESTED: &[&str] = &["abstract", "purpose", "hasabstract", "haspurpose", "content", "hascontent"];
pub const ABSTRACT_TYPES: &[&str] = &["abstract", "purpose"];

pub const CONTENT_PART_DIRECT: &[&str] = &["contentpart", "content_part", "content", "hascontent", "section", "hassection"];
pub const CONTENT_PART_NESTED: &[&str] = &["contentpart", "content_part", "content", "hascontent"];
pub const CONTENT_PART_TYPES: &[&str] = &["contentpart", "content_part"];

pub const GOAL_DIRECT: &[&str] = &["goal", "hasgoal", "result", "outcome", "hasresult", "hasoutcome", "section", "hassection"];
pub const GOAL_NESTED: &[&str] = &["goal", "hasgoal", "result", "outcome", "content", "hascontent"];
pub const GOAL_TYPES: &[&str] = &["goal_achieved", "goalachieved", "goal achieved"];

/// The four content query shapes
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TemplateKind {
    Problem,
    AbstractPurpose,
    ContentPart,
    GoalAchieved,
}

impl TemplateKind {
    pub const ALL: [TemplateKind; 4] = [
        TemplateKind::Problem,
        TemplateKind::AbstractPurpose,
        TemplateKind::ContentPart,
        TemplateKind::GoalAchieved,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TemplateKind::Problem => "problem",
            TemplateKind::AbstractPurpose => "abstract_purpose",
            TemplateKind::ContentPart => "content_part",
            TemplateKind::GoalAchieved => "goal_achieved",
        }
    }

    /// Name of the kind-specific label variable in result rows
    pub fn label_var(&self) -> &'static str {
        match self {
            TemplateKind::Problem => "sectionLabel",
            TemplateKind::AbstractPurpose => "absLabel",
            TemplateKind::ContentPart => "cpLabel",
            TemplateKind::GoalAchieved => "goalLabel",
        }
    }

    /// LIMIT applied to the query
    pub fn row_limit(&self) -> usize {
        match self {
            TemplateKind::Problem | TemplateKind::AbstractPurpose => 1000,
            TemplateKind::ContentPart | TemplateKind::GoalAchieved => 200,
        }
    }

    fn index(&self) -> usize {
        *self as usize
    }
}

impl fmt::Display for TemplateKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Relation hops from a paper to the node carrying the text
#[derive(Debug, Clone)]
pub enum Hops {
    /// paper -section-> section -content-> node; the row label is the section label
    ViaSection {
        section: Vec<String>,
        content: Vec<String>,
    },
    /// paper -direct-> node, or paper -section-> section -nested-> node
    DirectOrSection {
        direct: Vec<String>,
        section: Vec<String>,
        nested: Vec<String>,
    },
}

/// One parameterized query shape
#[derive(Debug, Clone)]
pub struct QueryTemplate {
    pub kind: TemplateKind,
    pub hops: Hops,
    /// Node IRI or rdf:type must match one of these (empty: no type check)
    pub node_types: Vec<String>,
    /// Row text must match one of these (empty: no content filter)
    pub text_filter: Vec<String>,
    pub limit: usize,
}

fn owned(patterns: &[&str]) -> Vec<String> {
    patterns.iter().map(|p| p.to_string()).collect()
}

impl QueryTemplate {
    /// Built-in shape for a kind
    pub fn builtin(kind: TemplateKind) -> Self {
        let (hops, node_types, text_filter) = match kind {
            TemplateKind::Problem => (
                Hops::ViaSection {
                    section: owned(SECTION_PREDICATES),
                    content: owned(CONTENT_PREDICATES),
                },
                Vec::new(),
                owned(PROBLEM_WORDS),
            ),
            TemplateKind::AbstractPurpose => (
                Hops::DirectOrSection {
                    direct: owned(ABSTRACT_DIRECT),
                    section: owned(SECTION_PREDICATES),
                    nested: owned(ABSTRACT_NESTED),
                },
                owned(ABSTRACT_TYPES),
                Vec::new(),
            ),
            TemplateKind::ContentPart => (
                Hops::DirectOrSection {
                    direct: owned(CONTENT_PART_DIRECT),
                    section: owned(SECTION_PREDICATES),
                    nested: owned(CONTENT_PART_NESTED),
                },
                owned(CONTENT_PART_TYPES),
                Vec::new(),
            ),
            TemplateKind::GoalAchieved => (
                Hops::DirectOrSection {
                    direct: owned(GOAL_DIRECT),
                    section: owned(SECTION_PREDICATES),
                    nested: owned(GOAL_NESTED),
                },
                owned(GOAL_TYPES),
                Vec::new(),
            ),
        };

        Self {
            kind,
            hops,
            node_types,
            text_filter,
            limit: kind.row_limit(),
        }
    }

    /// Instantiate the template for one term
    pub fn render(&self, term: &str) -> String {
        let label = self.kind.label_var();
        let mut q = String::from(PREFIXES);
        q.push_str(&format!("\nSELECT ?paper ?paperLabel ?{label} ?text\nWHERE {{\n"));
        q.push_str(&paper_match(term));

        match &self.hops {
            Hops::ViaSection { section, content } => {
                q.push_str(&format!(
                    "  ?paper ?secPred ?section .\n  FILTER({})\n  OPTIONAL {{ ?section rdfs:label ?{label} }}\n",
                    regex_filter("?secPred", section)
                ));
                q.push_str(&format!(
                    "  ?section ?contPred ?node .\n  FILTER({})\n",
                    regex_filter("?contPred", content)
                ));
            }
            Hops::DirectOrSection { direct, section, nested } => {
                q.push_str(&format!(
                    "  {{\n    ?paper ?p1 ?node .\n    FILTER({})\n  }} UNION {{\n",
                    regex_filter("?p1", direct)
                ));
                q.push_str(&format!(
                    "    ?paper ?psec ?sec .\n    FILTER({})\n    ?sec ?p2 ?node .\n    FILTER({})\n  }}\n",
                    regex_filter("?psec", section),
                    regex_filter("?p2", nested)
                ));
            }
        }

        if !self.node_types.is_empty() {
            q.push_str(&format!(
                "  OPTIONAL {{ ?node rdf:type ?cls . }}\n  FILTER({} || {})\n",
                regex_filter("?node", &self.node_types),
                regex_filter("?cls", &self.node_types)
            ));
        }
        if let Hops::DirectOrSection { .. } = self.hops {
            q.push_str(&format!("  OPTIONAL {{ ?node rdfs:label ?{label} }}\n"));
        }

        q.push_str(&text_selection());

        if !self.text_filter.is_empty() {
            q.push_str(&format!("  FILTER({})\n", regex_filter("?text", &self.text_filter)));
        }

        q.push_str(&format!("}}\nLIMIT {}\n", self.limit));
        q
    }
}

/// The four content templates, addressable by kind
#[derive(Debug, Clone)]
pub struct TemplateSet {
    templates: [QueryTemplate; 4],
}

impl Default for TemplateSet {
    fn default() -> Self {
        Self {
            templates: TemplateKind::ALL.map(QueryTemplate::builtin),
        }
    }
}

impl TemplateSet {
    pub fn get(&self, kind: TemplateKind) -> &QueryTemplate {
        &self.templates[kind.index()]
    }

    /// Replace the template of `template.kind`
    pub fn with_template(mut self, template: QueryTemplate) -> Self {
        let index = template.kind.index();
        self.templates[index] = template;
        self
    }

    pub fn render(&self, kind: TemplateKind, term: &str) -> String {
        self.get(kind).render(term)
    }
}

/// Minimal existence check: does any paper title/label contain the term
pub fn probe_query(term: &str) -> String {
    format!("{PREFIXES}\nSELECT ?paper WHERE {{\n{}}}\nLIMIT 1\n", paper_match(term))
}

/// Escape a value for use inside a double-quoted SPARQL literal
pub fn escape_literal(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '\\' => escaped.push_str("\\\\"),
            '"' => escaped.push_str("\\\""),
            '\n' => escaped.push_str("\\n"),
            '\r' => escaped.push_str("\\r"),
            '\t' => escaped.push_str("\\t"),
            _ => escaped.push(c),
        }
    }
    escaped
}

fn paper_match(term: &str) -> String {
    let kw = escape_literal(term);
    format!(
        "  {{\n    ?paper dcterms:title ?paperLabel .\n    FILTER(CONTAINS(LCASE(STR(?paperLabel)), LCASE(\"{kw}\")))\n  }} UNION {{\n    ?paper rdfs:label ?paperLabel .\n    FILTER(CONTAINS(LCASE(STR(?paperLabel)), LCASE(\"{kw}\")))\n  }}\n"
    )
}

/// `REGEX(LCASE(STR(var)), "(a|b|c)")`, each pattern matched literally
fn regex_filter(var: &str, patterns: &[String]) -> String {
    let alternatives: Vec<String> = patterns
        .iter()
        .map(|p| escape_pattern(&p.to_lowercase()))
        .collect();
    format!(
        "REGEX(LCASE(STR({var})), \"{}\")",
        escape_literal(&format!("({})", alternatives.join("|")))
    )
}

/// Escape XPath regex metacharacters so a pattern matches literally
fn escape_pattern(pattern: &str) -> String {
    let mut escaped = String::with_capacity(pattern.len());
    for c in pattern.chars() {
        if matches!(c, '\\' | '|' | '.' | '?' | '*' | '+' | '(' | ')' | '{' | '}' | '[' | ']' | '^' | '$' | '-') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

/// Bind ?text to the first non-empty text property of ?node
fn text_selection() -> String {
    let mut q = String::new();
    for (i, property) in TEXT_PROPERTIES.iter().enumerate() {
        q.push_str(&format!("  OPTIONAL {{ ?node {property} ?t{i} }}\n"));
    }

    let mut expr = format!("?t{}", TEXT_PROPERTIES.len() - 1);
    for i in (0..TEXT_PROPERTIES.len() - 1).rev() {
        expr = format!("IF(BOUND(?t{i}) && STRLEN(STR(?t{i})) > 0, ?t{i}, {expr})");
    }
    q.push_str(&format!("  BIND({expr} AS ?text)\n  FILTER(BOUND(?text))\n"));
    q
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_problem_template_shape() {
        let q = QueryTemplate::builtin(TemplateKind::Problem).render("warpage");

        assert!(q.contains("SELECT ?paper ?paperLabel ?sectionLabel ?text"));
        assert!(q.contains("LCASE(\"warpage\")"));
        assert!(q.contains(r#"REGEX(LCASE(STR(?secPred)), "(hassection|section)")"#));
        assert!(q.contains(r#"REGEX(LCASE(STR(?contPred)), "(hascontent|content)")"#));
        assert!(q.contains("OPTIONAL { ?section rdfs:label ?sectionLabel }"));
        assert!(q.contains(
            r#"FILTER(REGEX(LCASE(STR(?text)), "(problem|challenge|issue|limitation|constraint)"))"#
        ));
        assert!(!q.contains("rdf:type"));
        assert!(q.trim_end().ends_with("LIMIT 1000"));
    }

    #[test]
    fn test_typed_templates_filter_node_not_text() {
        for kind in [TemplateKind::AbstractPurpose, TemplateKind::ContentPart, TemplateKind::GoalAchieved] {
            let q = QueryTemplate::builtin(kind).render("cte");
            assert!(q.contains(&format!("?{} ?text", kind.label_var())));
            assert!(q.contains("OPTIONAL { ?node rdf:type ?cls . }"));
            assert!(q.contains("} UNION {\n    ?paper ?psec ?sec ."));
            assert!(!q.contains("(problem|"));
            assert!(q.trim_end().ends_with(&format!("LIMIT {}", kind.row_limit())));
        }
        let goal = QueryTemplate::builtin(TemplateKind::GoalAchieved).render("cte");
        assert!(goal.contains(r#"REGEX(LCASE(STR(?cls)), "(goal_achieved|goalachieved|goal achieved)")"#));
    }

    #[test]
    fn test_text_prefers_first_non_empty_property() {
        let q = QueryTemplate::builtin(TemplateKind::ContentPart).render("voids");
        assert!(q.contains("OPTIONAL { ?node rdf:value ?t0 }"));
        assert!(q.contains("OPTIONAL { ?node dcterms:description ?t2 }"));
        assert!(q.contains(
            "BIND(IF(BOUND(?t0) && STRLEN(STR(?t0)) > 0, ?t0, IF(BOUND(?t1) && STRLEN(STR(?t1)) > 0, ?t1, ?t2)) AS ?text)"
        ));
    }

    #[test]
    fn test_term_cannot_escape_literal() {
        let q = probe_query("war\"page\\");
        assert!(q.contains(r#"LCASE("war\"page\\")"#));
        assert!(q.contains("SELECT ?paper WHERE {"));
        assert!(q.trim_end().ends_with("LIMIT 1"));
    }

    #[test]
    fn test_custom_patterns_are_literal_and_lowercased() {
        let template = QueryTemplate {
            hops: Hops::ViaSection {
                section: vec!["Has.Section".to_string()],
                content: vec!["body".to_string()],
            },
            ..QueryTemplate::builtin(TemplateKind::Problem)
        };
        let set = TemplateSet::default().with_template(template);
        let q = set.render(TemplateKind::Problem, "x");
        assert!(q.contains(r#"REGEX(LCASE(STR(?secPred)), "(has\\.section)")"#));
        // other kinds untouched
        assert!(set.render(TemplateKind::ContentPart, "x").contains("contentpart"));
    }

    #[test]
    fn test_kind_serializes_snake_case() {
        assert_eq!(serde_json::to_string(&TemplateKind::AbstractPurpose).unwrap(), "\"abstract_purpose\"");
        assert_eq!(TemplateKind::GoalAchieved.to_string(), "goal_achieved");
    }
}
