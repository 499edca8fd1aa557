//! Prompt assembly from vector hits and graph context

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Documents shown to the model from the vector index
pub const MAX_PROMPT_DOCUMENTS: usize = 5;

const NO_CONTEXT: &str = "(no context retrieved)";

const INSTRUCTIONS: &str = "\
Role:
Act as a Hybrid Bonding Expert.

Tasks:
Analyze the user query and extract the most accurate answers from the research paper context.
Identify solutions relevant to the query and represent them as ontology triples.
Extract all possible impacts described in the papers. For each impact, show the effect if the \
solution is implemented and give the source paper (title, section or line reference).

Ontology Knowledge Representation

Step 2: Solutions (S) as ontology triples (Subject - Predicate - Object)
Sx : <Solution Subject> - <Predicate> - <Solution Object>
  Source: \"<Paper Title>\" (<Section/Heading/Subsection>)

Step 3: Problem -> Solution Mapping (M)
Mx : Px - addressed -> Sy
  Source: \"<Paper Title>\" (<Table/Figure/Section>)

Step 4: Impacts (I), performance or benefit impacts of the solutions
Ix : Sy -> results in -> <Impact Statement>
  Source: \"<Paper Title>\" (<Section/Heading/Subsection>)

Requirements:
Ensure all extracted knowledge is factually correct and aligned with the paper context.
Represent impacts as ontology triples too, e.g.
  Hybrid Bonding -> Improves -> Electrical Conductivity
  Solution Implementation -> Leads to -> Thermal Reliability Issues
Use titles, section labels or text lines as evidence.
If information is found only in a title, inference is allowed but the title must be cited.
Do not hallucinate. Only use the provided research paper context.
Always present output in the sequence: Step 2 -> Step 3 -> Step 4.";

/// First result row of a vector index query
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VectorHits {
    pub documents: Vec<String>,
    pub metadatas: Vec<HashMap<String, String>>,
}

impl VectorHits {
    /// `source`, else `path`, else empty
    pub fn source(&self, index: usize) -> &str {
        self.metadatas
            .get(index)
            .and_then(|meta| {
                ["source", "path"]
                    .iter()
                    .filter_map(|key| meta.get(*key))
                    .find(|value| !value.is_empty())
            })
            .map(String::as_str)
            .unwrap_or("")
    }
}

/// Context block: cited documents, then the graph context
pub fn render_context_block(hits: &VectorHits, graph_context: &str) -> String {
    let mut parts: Vec<String> = hits
        .documents
        .iter()
        .take(MAX_PROMPT_DOCUMENTS)
        .enumerate()
        .map(|(i, doc)| format!("[Doc {}] {}\n{}", i + 1, hits.source(i), doc))
        .collect();

    if !graph_context.is_empty() {
        parts.push(format!("[GraphDB]\n{}", graph_context));
    }

    if parts.is_empty() {
        NO_CONTEXT.to_string()
    } else {
        parts.join("\n\n")
    }
}

/// Final instruction text for the answering model
pub fn build_prompt(question: &str, hits: &VectorHits, graph_context: &str) -> String {
    format!(
        "{INSTRUCTIONS}\n\nQuestion: {question}\n\nContext:\n{}\n\n\
         Answer concisely with citations like [Doc i] or [GraphDB] when used.\n",
        render_context_block(hits, graph_context)
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meta(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    #[test]
    fn test_empty_context_placeholder() {
        let prompt = build_prompt("What limits pitch?", &VectorHits::default(), "");
        assert!(prompt.contains("Question: What limits pitch?"));
        assert!(prompt.contains("Context:\n(no context retrieved)\n"));
    }

    #[test]
    fn test_documents_then_graph() {
        let hits = VectorHits {
            documents: vec!["Cu pads recess".to_string(), "Oxide activation".to_string()],
            metadatas: vec![meta(&[("path", "/docs/a.pdf")]), meta(&[("source", "b.pdf"), ("path", "x")])],
        };
        let block = render_context_block(&hits, "Keyword: voids");
        assert_eq!(
            block,
            "[Doc 1] /docs/a.pdf\nCu pads recess\n\n[Doc 2] b.pdf\nOxide activation\n\n[GraphDB]\nKeyword: voids"
        );
    }

    #[test]
    fn test_at_most_five_documents() {
        let hits = VectorHits {
            documents: (1..=7).map(|i| format!("doc {}", i)).collect(),
            metadatas: Vec::new(),
        };
        let block = render_context_block(&hits, "");
        assert!(block.contains("[Doc 5] \ndoc 5"));
        assert!(!block.contains("[Doc 6]"));
        assert!(!block.contains("[GraphDB]"));
    }

    #[test]
    fn test_hits_deserialize_with_missing_fields() {
        let hits: VectorHits = serde_json::from_str(r#"{"documents": ["only text"]}"#).unwrap();
        assert_eq!(hits.source(0), "");
        assert_eq!(render_context_block(&hits, ""), "[Doc 1] \nonly text");
    }
}
