//! MVP detection over roadmap markdown.

use regex::Regex;

/// True when the roadmap's MVP section has at least one checked item and no
/// unchecked ones.
///
/// The MVP section starts at the first `## ` heading containing `(MVP)`
/// (case-insensitive) and runs to the next `## ` heading or end of file.
pub fn mvp_reached(roadmap: &str) -> bool {
    let Some(section) = mvp_section(roadmap) else {
        return false;
    };
    if section.contains("[ ]") {
        return false;
    }
    section.contains("[x]") || section.contains("[X]")
}

fn mvp_section(roadmap: &str) -> Option<&str> {
    let header = Regex::new(r"(?mi)^## .*?\(MVP\).*?$").ok()?;
    let next = Regex::new(r"(?m)^## ").ok()?;

    let found = header.find(roadmap)?;
    let rest = &roadmap[found.end()..];
    let end = next.find(rest).map_or(rest.len(), |m| m.start());
    Some(&rest[..end])
}
