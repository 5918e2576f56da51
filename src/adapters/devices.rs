//! Serial device discovery from shell-style patterns.
//!
//! Only the file-name component may contain wildcards (`*`, `?`), which
//! covers patterns like `/dev/ttyUSB?` and `/dev/ttyACM*`. A pattern
//! with no wildcard is kept if the path exists.

use std::fs;
use std::path::Path;

use log::debug;

/// Expand `patterns` into a sorted, de-duplicated list of existing paths.
pub fn expand_patterns<S: AsRef<str>>(patterns: &[S]) -> Vec<String> {
    let mut found: Vec<String> = patterns
        .iter()
        .flat_map(|p| expand_one(p.as_ref()))
        .collect();
    found.sort();
    found.dedup();
    found
}

fn expand_one(pattern: &str) -> Vec<String> {
    let path = Path::new(pattern);
    let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
        return Vec::new();
    };
    if !has_wildcard(name) {
        return if path.exists() {
            vec![pattern.to_string()]
        } else {
            Vec::new()
        };
    }

    let dir = match path.parent() {
        Some(d) if !d.as_os_str().is_empty() => d,
        _ => Path::new("."),
    };
    let entries = match fs::read_dir(dir) {
        Ok(e) => e,
        Err(e) => {
            debug!("bus: cannot read {}: {}", dir.display(), e);
            return Vec::new();
        }
    };

    entries
        .filter_map(|e| e.ok())
        .filter_map(|e| {
            let file = e.file_name().into_string().ok()?;
            wildcard_match(name, &file).then(|| dir.join(file).to_string_lossy().into_owned())
        })
        .collect()
}

fn has_wildcard(s: &str) -> bool {
    s.contains(['*', '?'])
}

/// Match `text` against `pattern`, where `*` is any run and `?` one char.
pub fn wildcard_match(pattern: &str, text: &str) -> bool {
    let p: Vec<char> = pattern.chars().collect();
    let t: Vec<char> = text.chars().collect();
    let (mut pi, mut ti) = (0, 0);
    let mut star: Option<(usize, usize)> = None;

    while ti < t.len() {
        match p.get(pi) {
            Some('*') => {
                star = Some((pi, ti));
                pi += 1;
            }
            Some(&c) if c == '?' || c == t[ti] => {
                pi += 1;
                ti += 1;
            }
            _ => match star {
                // Let the last `*` swallow one more char.
                Some((sp, st)) => {
                    pi = sp + 1;
                    ti = st + 1;
                    star = Some((sp, st + 1));
                }
                None => return false,
            },
        }
    }
    p[pi..].iter().all(|&c| c == '*')
}
