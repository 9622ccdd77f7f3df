//! Text normalisation and string similarity used by the scorer.

use once_cell::sync::Lazy;
use regex::Regex;

static NON_WORD: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^\w\s]").expect("valid regex"));
static WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("valid regex"));

/// Uppercase and strip all whitespace: `de89 3704 0044` -> `DE8937040044`.
pub fn normalize_iban(iban: &str) -> String {
    iban.chars()
        .filter(|c| !c.is_whitespace())
        .flat_map(char::to_uppercase)
        .collect()
}

fn fold_char(c: char, out: &mut String) {
    match c {
        'ä' | 'á' | 'à' | 'â' | 'ã' => out.push('a'),
        'ö' | 'ó' | 'ò' | 'ô' | 'õ' => out.push('o'),
        'ü' | 'ú' | 'ù' | 'û' => out.push('u'),
        'é' | 'è' | 'ê' | 'ë' => out.push('e'),
        'í' | 'ì' | 'î' | 'ï' => out.push('i'),
        'ß' => out.push_str("ss"),
        other => out.push(other),
    }
}

/// Lowercase, fold accents and umlauts, replace punctuation with spaces and
/// collapse runs of whitespace.
pub fn normalize_text(text: &str) -> String {
    let lowered = text.trim().to_lowercase();
    let mut folded = String::with_capacity(lowered.len());
    for c in lowered.chars() {
        fold_char(c, &mut folded);
    }
    let spaced = NON_WORD.replace_all(&folded, " ");
    WHITESPACE.replace_all(spaced.trim(), " ").into_owned()
}

/// Name tokens worth comparing; initials and short particles are dropped.
pub fn name_tokens(name: &str) -> Vec<String> {
    normalize_text(name)
        .split(' ')
        .filter(|part| part.chars().count() > 2)
        .map(str::to_string)
        .collect()
}

/// Edit distance counted in characters, not bytes.
pub fn levenshtein(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    if a.is_empty() {
        return b.len();
    }
    if b.is_empty() {
        return a.len();
    }

    let mut previous: Vec<usize> = (0..=b.len()).collect();
    let mut current = vec![0; b.len() + 1];
    for (i, ca) in a.iter().enumerate() {
        current[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let substitution = previous[j] + usize::from(ca != cb);
            current[j + 1] = substitution.min(previous[j + 1] + 1).min(current[j] + 1);
        }
        std::mem::swap(&mut previous, &mut current);
    }
    previous[b.len()]
}

/// Similarity in `[0, 1]`; 1 means identical. Empty input scores 0.
pub fn similarity(a: &str, b: &str) -> f64 {
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    if a == b {
        return 1.0;
    }
    let max_len = a.chars().count().max(b.chars().count());
    1.0 - levenshtein(a, b) as f64 / max_len as f64
}

/// Best similarity of `token` against any token of `candidates`.
pub fn best_token_similarity(token: &str, candidates: &[String]) -> f64 {
    candidates
        .iter()
        .map(|c| similarity(token, c))
        .fold(0.0, f64::max)
}
