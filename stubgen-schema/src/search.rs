//! Fuzzy lookup over schema names

use crate::types::SchemaSpec;
use strsim::levenshtein;

/// A fuzzy match suggestion with candidate name and edit distance.
#[derive(Debug, Clone)]
pub struct Suggestion {
    pub candidate: String,
    pub distance: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchemaSection {
    Type,
    Service,
    Method,
    Error,
    Scheme,
}

impl std::fmt::Display for SchemaSection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            SchemaSection::Type => "type",
            SchemaSection::Service => "service",
            SchemaSection::Method => "method",
            SchemaSection::Error => "error",
            SchemaSection::Scheme => "scheme",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MatchType {
    Exact,
    Contains,
    Fuzzy(usize),
}

#[derive(Debug, Clone)]
pub struct SearchResult {
    pub name: String,
    /// Enclosing service/method for nested entries.
    pub owner: Option<String>,
    pub section: SchemaSection,
    pub match_type: MatchType,
}

/// Suggest similar names from a list of candidates.
///
/// Returns candidates sorted by distance, closest first. Exact matches are
/// excluded; case-insensitive matches score 0 and substring matches 1.
pub fn suggest_similar(name: &str, candidates: &[&str], max_distance: usize) -> Vec<Suggestion> {
    let name_lower = name.to_lowercase();
    let mut suggestions: Vec<Suggestion> = candidates
        .iter()
        .filter(|&&candidate| candidate != name)
        .filter_map(|&candidate| {
            let candidate_lower = candidate.to_lowercase();
            let distance = if candidate_lower == name_lower {
                0
            } else if candidate_lower.contains(&name_lower) || name_lower.contains(&candidate_lower)
            {
                1
            } else {
                levenshtein(name, candidate)
            };
            (distance <= max_distance).then(|| Suggestion {
                candidate: candidate.to_string(),
                distance,
            })
        })
        .collect();
    suggestions.sort_by(|a, b| {
        a.distance
            .cmp(&b.distance)
            .then_with(|| a.candidate.cmp(&b.candidate))
    });
    suggestions
}

fn classify(name: &str, query: &str) -> Option<MatchType> {
    let lower = name.to_lowercase();
    if lower == query {
        Some(MatchType::Exact)
    } else if lower.contains(query) {
        Some(MatchType::Contains)
    } else {
        let dist = levenshtein(&lower, query);
        (dist <= 2).then_some(MatchType::Fuzzy(dist))
    }
}

/// Search types, services, methods, errors and security schemes.
pub fn search_schema(spec: &SchemaSpec, query: &str) -> Vec<SearchResult> {
    let q = query.to_lowercase();
    let mut results = Vec::new();
    let mut push = |name: &str, owner: Option<&str>, section: SchemaSection| {
        if let Some(match_type) = classify(name, &q) {
            results.push(SearchResult {
                name: name.to_string(),
                owner: owner.map(str::to_string),
                section,
                match_type,
            });
        }
    };

    for ty in &spec.types {
        push(&ty.name, None, SchemaSection::Type);
    }
    for scheme in &spec.schemes {
        push(&scheme.name, None, SchemaSection::Scheme);
    }
    for svc in &spec.services {
        push(&svc.name, None, SchemaSection::Service);
        for method in &svc.methods {
            push(&method.name, Some(&svc.name), SchemaSection::Method);
            for err in &method.errors {
                push(&err.name, Some(&method.name), SchemaSection::Error);
            }
        }
    }

    results.sort_by_key(|r| match r.match_type {
        MatchType::Exact => 0,
        MatchType::Contains => 1,
        MatchType::Fuzzy(d) => 1 + d,
    });
    results
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parse::parse_schema_content;

    #[test]
    fn test_fuzzy_suggestions() {
        let candidates = ["Address", "Customer", "Order"];
        let suggestions = suggest_similar("Adress", &candidates, 3);
        assert_eq!(suggestions[0].candidate, "Address");
    }

    #[test]
    fn test_fuzzy_no_exact_match() {
        let suggestions = suggest_similar("Order", &["Order"], 3);
        assert!(suggestions.is_empty(), "exact matches should be excluded");
    }

    #[test]
    fn test_case_insensitive_ranks_first() {
        let suggestions = suggest_similar("address", &["Addresses", "Address"], 3);
        assert_eq!(suggestions[0].candidate, "Address");
        assert_eq!(suggestions[0].distance, 0);
    }

    #[test]
    fn test_search_schema_sections() {
        let spec = parse_schema_content(
            r#"{
                "name": "shop",
                "types": [{ "name": "Order", "type": { "object": [] } }],
                "services": [{
                    "name": "orders",
                    "methods": [{ "name": "create_order", "errors": [{ "name": "order_exists" }] }]
                }]
            }"#,
        )
        .expect("should parse");
        let results = search_schema(&spec, "order");
        assert_eq!(results[0].section, SchemaSection::Type);
        assert_eq!(results[0].match_type, MatchType::Exact);
        assert!(results
            .iter()
            .any(|r| r.section == SchemaSection::Error && r.owner.as_deref() == Some("create_order")));
    }
}
