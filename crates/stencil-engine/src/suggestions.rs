//! Fuzzy matching for template error suggestions
//!
//! Uses Levenshtein distance to suggest the function or key a template
//! author most likely meant.

/// Maximum Levenshtein distance to consider for suggestions
const MAX_SUGGESTION_DISTANCE: usize = 3;

/// Suggestion result with confidence scoring
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Suggestion {
    /// The suggested correction
    pub text: String,
    /// Levenshtein distance (lower = better match)
    pub distance: usize,
}

/// Find closest matches from a list of candidates
pub fn find_closest_matches<'a, I>(input: &str, candidates: I, max_results: usize) -> Vec<Suggestion>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut suggestions: Vec<Suggestion> = candidates
        .into_iter()
        .filter_map(|candidate| {
            let distance = strsim::levenshtein(input, candidate);
            (distance <= MAX_SUGGESTION_DISTANCE && distance > 0).then(|| Suggestion {
                text: candidate.to_string(),
                distance,
            })
        })
        .collect();

    // Stable sort keeps candidate order for equal distances
    suggestions.sort_by_key(|s| s.distance);
    suggestions.truncate(max_results);
    suggestions
}

/// Suggest corrections for an unknown function
pub fn suggest_unknown_function<'a, I>(name: &str, available: I) -> String
where
    I: IntoIterator<Item = &'a str>,
{
    let matches = find_closest_matches(name, available, 3);

    if matches.is_empty() {
        format!("Function `{}` is not part of the template function catalogue", name)
    } else {
        let names: Vec<String> = matches.iter().map(|s| format!("`{}`", s.text)).collect();
        format!("Did you mean {}?", names.join(" or "))
    }
}

/// Suggest a key when a lookup misses in strict mode
pub fn suggest_key<'a, I>(key: &str, available: I) -> Option<String>
where
    I: IntoIterator<Item = &'a str>,
{
    let available: Vec<&str> = available.into_iter().collect();
    let matches = find_closest_matches(key, available.iter().copied(), 3);

    if !matches.is_empty() {
        let names: Vec<String> = matches.iter().map(|s| format!("`{}`", s.text)).collect();
        Some(format!("Did you mean {}?", names.join(" or ")))
    } else if !available.is_empty() {
        Some(format!("Available keys: {}", available.join(", ")))
    } else {
        None
    }
}
