//! Title normalization shared by every title-based signal.

const ARTICLES: [&str; 3] = ["the", "a", "an"];

/// Canonical comparison form of a title.
///
/// Bracketed annotations (`(Season 2)`, `[Vol. 3]`, `{Official}`) are dropped,
/// the rest is lowercased, punctuation becomes whitespace, whitespace is
/// collapsed, and one leading and one trailing article are removed while
/// other words remain. A title that is nothing but a bracketed annotation
/// keeps its bracketed text.
pub fn normalize_title(title: &str) -> String {
    let without_annotations = strip_bracketed(title);
    let source = if without_annotations.trim().is_empty() {
        title
    } else {
        without_annotations.as_str()
    };

    let lowercase = source.to_lowercase();
    let cleaned: String = lowercase
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .collect();

    let mut words: Vec<&str> = cleaned.split_whitespace().collect();
    if words.len() > 1 && ARTICLES.contains(&words[0]) {
        words.remove(0);
    }
    if words.len() > 1 && words.last().is_some_and(|w| ARTICLES.contains(w)) {
        words.pop();
    }
    words.join(" ")
}

fn strip_bracketed(title: &str) -> String {
    let mut out = String::with_capacity(title.len());
    let mut depth = 0usize;

    for c in title.chars() {
        match c {
            '(' | '[' | '{' => {
                depth += 1;
                out.push(' ');
            }
            ')' | ']' | '}' if depth > 0 => {
                depth -= 1;
                out.push(' ');
            }
            _ if depth > 0 => {}
            _ => out.push(c),
        }
    }

    out
}
