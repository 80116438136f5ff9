//! SKILL.md frontmatter parsing.

use crate::{Skill, SkillError};
use std::path::Path;

#[derive(Debug, serde::Deserialize)]
struct Frontmatter {
    name: Option<String>,
    description: Option<String>,
}

/// Read and parse a SKILL.md file at the given path.
pub fn parse_skill_file(path: &Path, dir: &Path) -> Result<Skill, SkillError> {
    let content = std::fs::read_to_string(path)?;
    parse_skill_content(&content, dir)
}

/// Parse SKILL.md content for the skill rooted at `dir`.
pub fn parse_skill_content(content: &str, dir: &Path) -> Result<Skill, SkillError> {
    let content = content.replace("\r\n", "\n");
    let content = content.strip_prefix('\u{feff}').unwrap_or(&content);

    if !content.starts_with("---\n") {
        return Err(SkillError::MissingFrontmatter);
    }

    let lines: Vec<&str> = content.split('\n').collect();
    let end = lines[1..]
        .iter()
        .position(|line| line.trim() == "---")
        .map(|i| i + 1)
        .ok_or(SkillError::UnterminatedFrontmatter)?;

    let yaml_block = lines[1..end].join("\n");
    let body = lines[end + 1..].join("\n");
    let body = body.strip_prefix('\n').unwrap_or(&body).to_string();

    let fm: Frontmatter = serde_yml::from_str(&yaml_block)
        .map_err(|err| SkillError::InvalidFrontmatter(err.to_string()))?;

    let name = fm
        .name
        .filter(|n| !n.is_empty())
        .ok_or(SkillError::MissingField("name"))?;
    let description = fm
        .description
        .filter(|d| !d.is_empty())
        .ok_or(SkillError::MissingField("description"))?;

    Ok(Skill {
        name,
        description,
        dir: dir.to_path_buf(),
        body,
    })
}
