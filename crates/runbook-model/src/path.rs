//! Selector-path dialect used by model transforms.
//!
//! A selector is an optional `$` root marker followed by dot-separated
//! segments. A segment is a bare property name, a bracket-quoted name
//! (`['a.b']` or `["a.b"]`) for names containing separators, or a bracketed
//! numeric index into an array. `$` alone selects the whole model.

use serde_json::Value;

use crate::error::ModelError;

/// One step of a parsed selector.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    Name(String),
    Index(usize),
}

/// Parse a selector into segments. An empty segment list selects the root.
pub fn parse(path: &str) -> Result<Vec<Segment>, ModelError> {
    let invalid = || ModelError::InvalidPath(path.to_string());

    let trimmed = path.trim();
    if trimmed.is_empty() {
        return Err(invalid());
    }

    let chars: Vec<char> = trimmed.chars().collect();
    let len = chars.len();
    let mut segments = Vec::new();
    let mut i = 0;

    if chars[0] == '$' {
        i = 1;
        if i == len {
            return Ok(segments);
        }
        match chars[i] {
            '.' => {
                i += 1;
                if i == len {
                    return Err(invalid());
                }
            }
            '[' => {}
            _ => return Err(invalid()),
        }
    }

    while i < len {
        match chars[i] {
            '[' => {
                i += 1;
                if i >= len {
                    return Err(invalid());
                }
                if chars[i] == '\'' || chars[i] == '"' {
                    let quote = chars[i];
                    i += 1;
                    let start = i;
                    while i < len && chars[i] != quote {
                        i += 1;
                    }
                    if i >= len {
                        return Err(invalid());
                    }
                    let name: String = chars[start..i].iter().collect();
                    if name.trim().is_empty() {
                        return Err(invalid());
                    }
                    i += 1;
                    if i >= len || chars[i] != ']' {
                        return Err(invalid());
                    }
                    i += 1;
                    segments.push(Segment::Name(name));
                } else {
                    let start = i;
                    while i < len && chars[i] != ']' {
                        i += 1;
                    }
                    if i >= len {
                        return Err(invalid());
                    }
                    let digits: String = chars[start..i].iter().collect();
                    let index = digits.trim().parse::<usize>().map_err(|_| invalid())?;
                    i += 1;
                    segments.push(Segment::Index(index));
                }
            }
            '.' => return Err(invalid()),
            _ => {
                let start = i;
                while i < len && chars[i] != '.' && chars[i] != '[' {
                    i += 1;
                }
                let name: String = chars[start..i].iter().collect();
                let name = name.trim();
                if name.is_empty() {
                    return Err(invalid());
                }
                segments.push(Segment::Name(name.to_string()));
            }
        }

        // separator handling after a completed segment
        if i < len {
            match chars[i] {
                '.' => {
                    i += 1;
                    if i == len {
                        return Err(invalid());
                    }
                }
                '[' => {}
                _ => return Err(invalid()),
            }
        }
    }

    Ok(segments)
}

/// Walk the segments down from `root`. `None` when any step is missing or the
/// container shape does not match the segment.
pub fn select<'a>(root: &'a Value, segments: &[Segment]) -> Option<&'a Value> {
    let mut current = root;
    for segment in segments {
        current = match segment {
            Segment::Name(name) => current.as_object()?.get(name)?,
            Segment::Index(index) => current.as_array()?.get(*index)?,
        };
    }
    Some(current)
}

/// True when the selector is a single bare property name needing no parse.
pub fn is_simple_name(path: &str) -> bool {
    let trimmed = path.trim();
    !trimmed.is_empty()
        && !trimmed.starts_with('$')
        && !trimmed.contains('.')
        && !trimmed.contains('[')
}
