//! Redis-style glob patterns for `KEYS`.
//!
//! `*` matches any run of bytes, `?` one byte, `[abc]`, `[^abc]` and `[a-z]`
//! match classes, and `\` makes the next byte literal, inside classes too.

/// Whether `key` matches `pattern`.
pub fn matches(pattern: &str, key: &str) -> bool {
    match_bytes(pattern.as_bytes(), key.as_bytes())
}

fn match_bytes(pattern: &[u8], key: &[u8]) -> bool {
    let (mut pi, mut ki) = (0, 0);
    // Pattern position after the last `*` and the key position it resumes from.
    let mut backtrack: Option<(usize, usize)> = None;

    while ki < key.len() {
        let step = match pattern.get(pi) {
            Some(b'*') => {
                backtrack = Some((pi + 1, ki));
                pi += 1;
                continue;
            }
            Some(b'?') => Some(1),
            Some(b'[') => match_class(&pattern[pi..], key[ki]),
            Some(b'\\') if pi + 1 < pattern.len() => (pattern[pi + 1] == key[ki]).then_some(2),
            Some(&c) => (c == key[ki]).then_some(1),
            None => None,
        };

        match (step, backtrack) {
            (Some(width), _) => {
                pi += width;
                ki += 1;
            }
            (None, Some((star_pi, star_ki))) => {
                pi = star_pi;
                ki = star_ki + 1;
                backtrack = Some((star_pi, star_ki + 1));
            }
            (None, None) => return false,
        }
    }

    pattern[pi..].iter().all(|&c| c == b'*')
}

/// Match one byte against the class at the start of `pattern`. Returns the
/// class width on a match. An unterminated class runs to the end of the pattern.
fn match_class(pattern: &[u8], b: u8) -> Option<usize> {
    let mut i = 1;
    let negate = pattern.get(i) == Some(&b'^');
    if negate {
        i += 1;
    }

    let mut hit = false;
    while i < pattern.len() && pattern[i] != b']' {
        if pattern[i] == b'\\' && i + 1 < pattern.len() {
            hit |= pattern[i + 1] == b;
            i += 2;
        } else if i + 2 < pattern.len() && pattern[i + 1] == b'-' && pattern[i + 2] != b']' {
            let (lo, hi) = if pattern[i] <= pattern[i + 2] {
                (pattern[i], pattern[i + 2])
            } else {
                (pattern[i + 2], pattern[i])
            };
            hit |= (lo..=hi).contains(&b);
            i += 3;
        } else {
            hit |= pattern[i] == b;
            i += 1;
        }
    }

    let width = (i + 1).min(pattern.len());
    (hit != negate).then_some(width)
}
