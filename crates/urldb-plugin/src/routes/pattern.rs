//! Route path patterns with `:param` segments.

use std::collections::BTreeMap;

const METHODS: [&str; 7] = ["GET", "POST", "PUT", "PATCH", "DELETE", "HEAD", "OPTIONS"];

/// Normalizes and validates an HTTP method.
pub fn normalize_method(method: &str) -> Result<String, String> {
    let upper = method.trim().to_ascii_uppercase();
    if METHODS.contains(&upper.as_str()) {
        Ok(upper)
    } else {
        Err(format!("unsupported method '{method}'"))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum Segment {
    Literal(String),
    Param(String),
}

/// A parsed route path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoutePattern {
    raw: String,
    segments: Vec<Segment>,
}

impl RoutePattern {
    /// Parses `/a/:id/b` style paths. Wildcards are not supported.
    pub fn parse(path: &str) -> Result<Self, String> {
        let path = path.trim();
        if !path.starts_with('/') {
            return Err("path must start with '/'".to_string());
        }

        let trimmed = path.trim_end_matches('/');
        let mut segments = Vec::new();
        if !trimmed.is_empty() {
            for part in trimmed[1..].split('/') {
                segments.push(parse_segment(part)?);
            }
        }

        let mut seen = Vec::new();
        for seg in &segments {
            if let Segment::Param(name) = seg {
                if seen.contains(&name) {
                    return Err(format!("parameter ':{name}' appears twice"));
                }
                seen.push(name);
            }
        }

        let raw = if trimmed.is_empty() { "/" } else { trimmed };
        Ok(Self {
            raw: raw.to_string(),
            segments,
        })
    }

    /// The normalized path as declared.
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// The path with parameter names erased; equal shapes are the same route.
    pub fn shape(&self) -> String {
        if self.segments.is_empty() {
            return "/".to_string();
        }
        self.segments
            .iter()
            .map(|s| match s {
                Segment::Literal(l) => format!("/{l}"),
                Segment::Param(_) => "/:".to_string(),
            })
            .collect()
    }

    /// Whether some concrete path could match both patterns.
    pub fn overlaps(&self, other: &RoutePattern) -> bool {
        self.segments.len() == other.segments.len()
            && self
                .segments
                .iter()
                .zip(&other.segments)
                .all(|pair| match pair {
                    (Segment::Literal(a), Segment::Literal(b)) => a == b,
                    _ => true,
                })
    }

    /// Matches a request path and extracts parameters.
    pub fn matches(&self, path: &str) -> Option<BTreeMap<String, String>> {
        let trimmed = path.trim_end_matches('/');
        let parts: Vec<&str> = if trimmed.is_empty() {
            Vec::new()
        } else {
            trimmed.strip_prefix('/')?.split('/').collect()
        };
        if parts.len() != self.segments.len() {
            return None;
        }

        let mut params = BTreeMap::new();
        for (seg, part) in self.segments.iter().zip(parts) {
            match seg {
                Segment::Literal(l) if l == part => {}
                Segment::Literal(_) => return None,
                Segment::Param(_) if part.is_empty() => return None,
                Segment::Param(name) => {
                    params.insert(name.clone(), part.to_string());
                }
            }
        }
        Some(params)
    }
}

fn parse_segment(part: &str) -> Result<Segment, String> {
    if part.is_empty() {
        return Err("empty path segment".to_string());
    }
    if part.contains('*') || part.contains('{') || part.contains('}') {
        return Err(format!("segment '{part}' uses unsupported wildcard syntax"));
    }
    match part.strip_prefix(':') {
        Some(name) => {
            if name.is_empty() || !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
                Err(format!("invalid parameter name in '{part}'"))
            } else {
                Ok(Segment::Param(name.to_string()))
            }
        }
        None => Ok(Segment::Literal(part.to_string())),
    }
}
