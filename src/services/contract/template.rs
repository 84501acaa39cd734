//! Path templates (`/users/{userId}`) and their structural matching.

use super::types::ContractError;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Param(String),
}

#[derive(Debug, Clone)]
pub struct PathTemplate {
    raw: String,
    segments: Vec<Segment>,
}

impl PathTemplate {
    pub fn parse(raw: &str) -> Result<Self, ContractError> {
        let invalid = |reason| ContractError::InvalidTemplate {
            template: raw.to_string(),
            reason,
        };

        let rest = raw.strip_prefix('/').ok_or_else(|| invalid("must start with '/'"))?;

        let mut segments = Vec::new();
        if !rest.is_empty() {
            for part in rest.split('/') {
                if part.is_empty() {
                    return Err(invalid("empty segment"));
                }
                let segment = match part.strip_prefix('{').and_then(|p| p.strip_suffix('}')) {
                    Some(name) if !name.is_empty() && !name.contains(['{', '}']) => {
                        Segment::Param(name.to_string())
                    }
                    Some(_) => return Err(invalid("malformed parameter segment")),
                    None if part.contains(['{', '}']) => {
                        return Err(invalid("parameters must span a whole segment"));
                    }
                    None => Segment::Literal(part.to_string()),
                };
                segments.push(segment);
            }
        }

        Ok(Self {
            raw: raw.to_string(),
            segments,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    pub fn param_names(&self) -> impl Iterator<Item = &str> {
        self.segments.iter().filter_map(|s| match s {
            Segment::Param(name) => Some(name.as_str()),
            Segment::Literal(_) => None,
        })
    }

    /// Match a concrete request path; returns the named segment values on success.
    pub fn matches(&self, path: &str) -> Option<Vec<(String, String)>> {
        let rest = path.strip_prefix('/')?;
        let parts: Vec<&str> = if rest.is_empty() {
            Vec::new()
        } else {
            rest.split('/').collect()
        };

        if parts.len() != self.segments.len() {
            return None;
        }

        let mut params = Vec::new();
        for (segment, part) in self.segments.iter().zip(parts) {
            match segment {
                Segment::Literal(lit) if lit == part => {}
                Segment::Literal(_) => return None,
                Segment::Param(_) if part.is_empty() => return None,
                Segment::Param(name) => params.push((name.clone(), part.to_string())),
            }
        }
        Some(params)
    }

    /// True when some concrete path would match both templates.
    pub fn collides_with(&self, other: &PathTemplate) -> bool {
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
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matches_named_segments() {
        let t = PathTemplate::parse("/users/{userId}").unwrap();

        let params = t.matches("/users/abc").unwrap();
        assert_eq!(params, vec![("userId".to_string(), "abc".to_string())]);

        assert!(t.matches("/users").is_none());
        assert!(t.matches("/users/").is_none());
        assert!(t.matches("/users/abc/posts").is_none());
        assert!(t.matches("/accounts/abc").is_none());
    }

    #[test]
    fn literal_template_is_exact() {
        let t = PathTemplate::parse("/users").unwrap();
        assert!(t.matches("/users").is_some());
        assert!(t.matches("/users/").is_none());
        assert!(t.matches("/Users").is_none());
    }

    #[test]
    fn rejects_malformed_templates() {
        assert!(PathTemplate::parse("users").is_err());
        assert!(PathTemplate::parse("/users//x").is_err());
        assert!(PathTemplate::parse("/users/{}").is_err());
        assert!(PathTemplate::parse("/users/id-{id}").is_err());
    }

    #[test]
    fn detects_structural_collisions() {
        let a = PathTemplate::parse("/users/{id}").unwrap();
        let b = PathTemplate::parse("/users/me").unwrap();
        let c = PathTemplate::parse("/users/{userId}").unwrap();
        let d = PathTemplate::parse("/users").unwrap();
        let e = PathTemplate::parse("/posts/{id}").unwrap();

        assert!(a.collides_with(&b));
        assert!(a.collides_with(&c));
        assert!(!a.collides_with(&d));
        assert!(!a.collides_with(&e));
    }
}
