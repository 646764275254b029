//! Skip-list path matching.
//!
//! A pattern matches a request path when it is equal to it, when it matches
//! as a glob (`*` and `?` never cross `/`, `[a-z]` classes, `\` escapes), or
//! when it has the same number of `/`-separated segments and every non-`:param`
//! segment is equal.

/// Whether `path` matches any pattern in `patterns`.
pub fn is_skip_path(path: &str, patterns: &[String]) -> bool {
    patterns.iter().any(|pattern| matches_pattern(pattern, path))
}

/// Whether `path` matches a single skip-list pattern.
pub fn matches_pattern(pattern: &str, path: &str) -> bool {
    path == pattern || glob_match(pattern, path) || param_match(pattern, path)
}

/// Segment-wise match where `:name` segments accept any value.
pub fn param_match(pattern: &str, path: &str) -> bool {
    let expected: Vec<&str> = pattern.split('/').collect();
    let actual: Vec<&str> = path.split('/').collect();
    expected.len() == actual.len()
        && expected
            .iter()
            .zip(&actual)
            .all(|(e, a)| e.starts_with(':') || e == a)
}

/// Shell-style match over the whole path. Malformed patterns never match.
pub fn glob_match(pattern: &str, path: &str) -> bool {
    let pattern: Vec<char> = pattern.chars().collect();
    let name: Vec<char> = path.chars().collect();
    let (mut p, mut n) = (0, 0);
    // Position after the last `*` and the name index it is retried from.
    let mut retry: Option<(usize, usize)> = None;

    while n < name.len() {
        if p < pattern.len() {
            match pattern[p] {
                '*' => {
                    retry = Some((p + 1, n));
                    p += 1;
                    continue;
                }
                '?' if name[n] != '/' => {
                    p += 1;
                    n += 1;
                    continue;
                }
                '?' => {}
                '[' => match match_class(&pattern, p, name[n]) {
                    Some((true, end)) if name[n] != '/' => {
                        p = end;
                        n += 1;
                        continue;
                    }
                    Some(_) => {}
                    None => return false,
                },
                '\\' => match pattern.get(p + 1) {
                    Some(&escaped) if escaped == name[n] => {
                        p += 2;
                        n += 1;
                        continue;
                    }
                    Some(_) => {}
                    None => return false,
                },
                literal if literal == name[n] => {
                    p += 1;
                    n += 1;
                    continue;
                }
                _ => {}
            }
        }

        match retry {
            Some((after_star, from)) if name[from] != '/' => {
                retry = Some((after_star, from + 1));
                p = after_star;
                n = from + 1;
            }
            _ => return false,
        }
    }

    pattern[p..].iter().all(|&c| c == '*')
}

/// Match `c` against the class starting at `pattern[start] == '['`.
/// Returns whether it matched and the index just past `]`, or `None` for a
/// malformed class.
fn match_class(pattern: &[char], start: usize, c: char) -> Option<(bool, usize)> {
    let mut i = start + 1;
    let negated = matches!(pattern.get(i), Some('^'));
    if negated {
        i += 1;
    }
    let mut matched = false;
    let mut first = true;
    loop {
        let lo = *pattern.get(i)?;
        if lo == ']' && !first {
            return Some((matched != negated, i + 1));
        }
        first = false;
        let lo = if lo == '\\' {
            i += 1;
            *pattern.get(i)?
        } else {
            lo
        };
        i += 1;
        let hi = if pattern.get(i) == Some(&'-') && pattern.get(i + 1).is_some_and(|&h| h != ']') {
            let hi = if pattern[i + 1] == '\\' {
                i += 1;
                *pattern.get(i + 1)?
            } else {
                pattern[i + 1]
            };
            i += 2;
            hi
        } else {
            lo
        };
        if lo <= c && c <= hi {
            matched = true;
        }
    }
}
