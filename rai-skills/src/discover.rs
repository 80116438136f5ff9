//! Skill discovery under `.rai/skills/`.

use crate::parser::parse_skill_file;
use crate::{Skill, SkillError};
use std::path::{Path, PathBuf};

const RAI_DIR: &str = ".rai";
const SKILLS_DIR: &str = "skills";
const SKILL_FILE: &str = "SKILL.md";

/// Path of the skills directory for a base directory.
pub fn skills_dir(base_dir: &Path) -> PathBuf {
    base_dir.join(RAI_DIR).join(SKILLS_DIR)
}

/// Scan `.rai/skills/` for valid skill directories.
///
/// Each immediate subdirectory containing a `SKILL.md` is treated as a
/// skill. Invalid or unparseable skills are collected as warnings rather
/// than hard errors, so one bad skill does not prevent discovery of the
/// rest. A missing skills directory yields an empty result.
pub fn discover(base_dir: &Path) -> Result<(Vec<Skill>, Vec<String>), SkillError> {
    let dir = skills_dir(base_dir);
    let entries = match std::fs::read_dir(&dir) {
        Ok(entries) => entries,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            return Ok((Vec::new(), Vec::new()));
        }
        Err(err) => return Err(SkillError::ReadDir(err)),
    };

    let mut skills = Vec::new();
    let mut warnings = Vec::new();

    for entry in entries {
        let entry = entry.map_err(SkillError::ReadDir)?;
        let path = entry.path();
        if !path.is_dir() {
            continue;
        }

        let skill_file = path.join(SKILL_FILE);
        if !skill_file.is_file() {
            // Directory without SKILL.md, silently skip.
            continue;
        }

        match parse_skill_file(&skill_file, &path) {
            Ok(skill) => skills.push(skill),
            Err(err) => {
                let name = entry.file_name().to_string_lossy().into_owned();
                tracing::debug!(skill = %name, error = %err, "skipping unparseable skill");
                warnings.push(format!("skill {name}: {err}"));
            }
        }
    }

    Ok((skills, warnings))
}
