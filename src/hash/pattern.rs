//! Glob-style matching for HSCAN MATCH.
//!
//! Supported syntax:
//! - `*` matches any run of bytes, including none
//! - `?` matches exactly one byte
//! - `[abc]`, `[a-z]`, `[^a]` character classes (ranges may be reversed)
//! - `\x` matches `x` literally, also inside classes

/// A compiled-once glob pattern over raw bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GlobPattern {
    pattern: Vec<u8>,
}

impl GlobPattern {
    pub fn new(pattern: impl AsRef<[u8]>) -> Self {
        Self {
            pattern: pattern.as_ref().to_vec(),
        }
    }

    /// True for `*`, which lets scans skip matching entirely.
    pub fn matches_everything(&self) -> bool {
        self.pattern == b"*"
    }

    /// Runs in O(pattern * text). Only the most recent `*` is backtracked to.
    pub fn matches(&self, text: &[u8]) -> bool {
        let pattern = &self.pattern[..];
        let (mut p, mut t) = (0, 0);
        // Pattern position after the last `*`, and the text position it resumes from
        let mut star: Option<(usize, usize)> = None;

        while t < text.len() {
            if pattern.get(p) == Some(&b'*') {
                while pattern.get(p) == Some(&b'*') {
                    p += 1;
                }
                if p == pattern.len() {
                    return true;
                }
                star = Some((p, t));
                continue;
            }

            if let Some(used) = match_one(&pattern[p..], text[t]) {
                p += used;
                t += 1;
                continue;
            }

            // Let the last star swallow one more byte and retry.
            match star {
                Some((star_p, star_t)) => {
                    p = star_p;
                    t = star_t + 1;
                    star = Some((star_p, star_t + 1));
                }
                None => return false,
            }
        }

        pattern[p..].iter().all(|&c| c == b'*')
    }
}

/// Matches a single non-star token at the start of `pattern` against `c`.
///
/// Returns how many pattern bytes the token used, or None on a mismatch.
fn match_one(pattern: &[u8], c: u8) -> Option<usize> {
    match *pattern.first()? {
        b'?' => Some(1),
        // An unterminated class never matches
        b'[' => match match_class(&pattern[1..], c)? {
            (true, consumed) => Some(1 + consumed),
            (false, _) => None,
        },
        b'\\' if pattern.len() > 1 => (pattern[1] == c).then_some(2),
        literal => (literal == c).then_some(1),
    }
}

/// Matches `c` against a class body (the bytes after `[`).
///
/// Returns whether it matched and how many pattern bytes the class used,
/// including the closing `]`.
fn match_class(class: &[u8], c: u8) -> Option<(bool, usize)> {
    let mut i = 0;
    let negate = class.first() == Some(&b'^');
    if negate {
        i += 1;
    }

    let mut matched = false;
    while i < class.len() && class[i] != b']' {
        if class[i] == b'\\' && i + 1 < class.len() {
            i += 1;
            if class[i] == c {
                matched = true;
            }
        } else if i + 2 < class.len() && class[i + 1] == b'-' && class[i + 2] != b']' {
            let (lo, hi) = if class[i] <= class[i + 2] {
                (class[i], class[i + 2])
            } else {
                (class[i + 2], class[i])
            };
            if (lo..=hi).contains(&c) {
                matched = true;
            }
            i += 2;
        } else if class[i] == c {
            matched = true;
        }
        i += 1;
    }

    if i >= class.len() {
        return None;
    }
    Some((matched != negate, i + 1))
}
