//! "Did you mean" ranking for unrecognized commands

use crate::registry::{Owner, RegistryView};

/// Upper bound on suggestions per unrecognized command
pub const MAX_SUGGESTIONS: usize = 5;

/// One ranked candidate
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Suggestion {
    /// Name to show (and type)
    pub name: String,
    /// Storage key of the command
    pub key: String,
    pub description: String,
    pub owner: Owner,
    pub distance: usize,
}

/// Unit-cost edit distance over chars
pub fn levenshtein(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();

    if a.is_empty() {
        return b.len();
    }
    if b.is_empty() {
        return a.len();
    }

    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut curr = vec![0; b.len() + 1];

    for (i, ca) in a.iter().enumerate() {
        curr[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let cost = usize::from(ca != cb);
            curr[j + 1] = (prev[j + 1] + 1).min(curr[j] + 1).min(prev[j] + cost);
        }
        std::mem::swap(&mut prev, &mut curr);
    }

    prev[b.len()]
}

/// Closest commands to `input`, at most [`MAX_SUGGESTIONS`]
///
/// Distance is measured against each command's base name. Ties are broken by
/// the displayed name.
pub fn suggest(view: &RegistryView, input: &str) -> Vec<Suggestion> {
    let input = input.to_lowercase();

    let mut ranked: Vec<Suggestion> = view
        .entries()
        .iter()
        .map(|entry| Suggestion {
            name: view.display_name(entry),
            key: entry.key.clone(),
            description: entry.description_or_default().to_string(),
            owner: entry.owner.clone(),
            distance: levenshtein(&input, entry.base_name()),
        })
        .collect();

    ranked.sort_by(|a, b| a.distance.cmp(&b.distance).then_with(|| a.name.cmp(&b.name)));
    ranked.truncate(MAX_SUGGESTIONS);
    ranked
}
