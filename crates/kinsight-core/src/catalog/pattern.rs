//! Shell-style wildcard matching for symbol lookups.

/// Whether `pattern` contains `*` or `?`.
pub(crate) fn has_wildcards(pattern: &str) -> bool
{
    pattern.chars().any(|c| matches!(c, '*' | '?'))
}

/// Match `text` against `pattern`, where `*` matches any run of characters
/// (including none) and `?` matches exactly one.
pub(crate) fn glob_match(pattern: &str, text: &str) -> bool
{
    let pattern: Vec<char> = pattern.chars().collect();
    let text: Vec<char> = text.chars().collect();

    let (mut p, mut t) = (0, 0);
    // Position of the last `*` and the text index it currently absorbs up to
    let mut backtrack: Option<(usize, usize)> = None;

    while t < text.len() {
        match pattern.get(p) {
            Some('*') => {
                backtrack = Some((p, t));
                p += 1;
            }
            Some(&c) if c == '?' || c == text[t] => {
                p += 1;
                t += 1;
            }
            _ => match backtrack {
                Some((star, absorbed)) => {
                    p = star + 1;
                    t = absorbed + 1;
                    backtrack = Some((star, absorbed + 1));
                }
                None => return false,
            },
        }
    }

    pattern[p..].iter().all(|&c| c == '*')
}
