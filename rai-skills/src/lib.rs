//! rai-skills - Agent Skills consumption for rai
//!
//! Skills are directories containing a `SKILL.md` file under
//! `.rai/skills/`. The frontmatter provides name and description
//! metadata; the body contains activation instructions for the LLM.

pub mod context;
pub mod discover;
pub mod parser;

pub use context::{format_context, format_list};
pub use discover::{discover, skills_dir};
pub use parser::{parse_skill_content, parse_skill_file};

use std::path::PathBuf;

/// Parsed metadata and instructions from a single SKILL.md file.
#[derive(Debug, Clone)]
pub struct Skill {
    /// Required; lowercase alphanumeric plus hyphens by convention.
    pub name: String,
    /// Required; what the skill does and when to use it.
    pub description: String,
    /// Path to the skill directory.
    pub dir: PathBuf,
    /// Markdown body (activation instructions).
    pub body: String,
}

#[derive(Debug, thiserror::Error)]
pub enum SkillError {
    #[error("SKILL.md missing required YAML frontmatter")]
    MissingFrontmatter,

    #[error("SKILL.md frontmatter missing closing delimiter")]
    UnterminatedFrontmatter,

    #[error("invalid SKILL.md frontmatter: {0}")]
    InvalidFrontmatter(String),

    #[error("SKILL.md missing required '{0}' field")]
    MissingField(&'static str),

    #[error("reading skills directory: {0}")]
    ReadDir(std::io::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
