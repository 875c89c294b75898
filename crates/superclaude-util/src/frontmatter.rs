//! YAML frontmatter splitting for agent and command files.
//!
//! Files are Markdown with a fenced metadata block at the top:
//!
//! ```text
//! ---
//! id: security-engineer
//! ---
//! body (opaque to the engine)
//! ```
//!
//! This module only splits; deserializing the YAML is the caller's concern.

/// Split a document into `(frontmatter, body)`.
///
/// Returns `None` when the document has no frontmatter block, which callers
/// treat as a malformed entry to skip, not an error.
#[must_use]
pub fn split_frontmatter(content: &str) -> Option<(&str, &str)> {
    let rest = content.strip_prefix("---")?;
    let rest = rest.strip_prefix('\n').or_else(|| rest.strip_prefix("\r\n"))?;

    // The closing fence must sit on its own line
    let mut offset = 0;
    for line in rest.split_inclusive('\n') {
        if line.trim_end() == "---" {
            let frontmatter = &rest[..offset];
            let body = &rest[offset + line.len()..];
            return Some((frontmatter, body));
        }
        offset += line.len();
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_frontmatter_and_body() {
        let doc = "---\nid: test\ncategory: demo\n---\n# Body\ncontent\n";
        let (front, body) = split_frontmatter(doc).unwrap();
        assert_eq!(front, "id: test\ncategory: demo\n");
        assert_eq!(body, "# Body\ncontent\n");
    }

    #[test]
    fn missing_opening_fence_is_none() {
        assert!(split_frontmatter("# Just markdown\n").is_none());
    }

    #[test]
    fn unterminated_fence_is_none() {
        assert!(split_frontmatter("---\nid: test\nno closing fence\n").is_none());
    }

    #[test]
    fn empty_body_is_fine() {
        let (front, body) = split_frontmatter("---\nid: x\n---\n").unwrap();
        assert_eq!(front, "id: x\n");
        assert_eq!(body, "");
    }

    #[test]
    fn dashes_inside_yaml_do_not_close_the_fence() {
        let doc = "---\ntriggers:\n  - security\n  - auth\n---\nbody";
        let (front, body) = split_frontmatter(doc).unwrap();
        assert!(front.contains("- security"));
        assert_eq!(body, "body");
    }
}
