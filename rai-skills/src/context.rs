//! Skill rendering for system prompts and CLI listings.

use crate::Skill;
use std::fmt::Write;

/// Build the XML block describing available skills for injection into
/// system prompts. Output is sorted by skill name for determinism.
pub fn format_context(skills: &[Skill]) -> String {
    if skills.is_empty() {
        return String::new();
    }

    let mut sorted: Vec<&Skill> = skills.iter().collect();
    sorted.sort_by(|a, b| a.name.cmp(&b.name));

    let mut out = String::from("<available_skills>\n");
    for skill in sorted {
        out.push_str("  <skill>\n");
        let _ = writeln!(out, "    <name>{}</name>", skill.name);
        let _ = writeln!(out, "    <description>{}</description>", skill.description);
        let _ = writeln!(
            out,
            "    <location>{}/SKILL.md</location>",
            skill.dir.display()
        );
        out.push_str("  </skill>\n");
    }
    out.push_str("</available_skills>");
    out
}

/// Human-readable listing for `rai skills list`.
pub fn format_list(skills: &[Skill]) -> String {
    if skills.is_empty() {
        return "no skills found".to_string();
    }

    let mut sorted: Vec<&Skill> = skills.iter().collect();
    sorted.sort_by(|a, b| a.name.cmp(&b.name));

    let mut out = String::new();
    for (i, skill) in sorted.iter().enumerate() {
        if i > 0 {
            out.push('\n');
        }
        let _ = write!(
            out,
            "{}\n  {}\n  {}",
            skill.name,
            skill.description,
            skill.dir.display()
        );
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn skill(name: &str, description: &str) -> Skill {
        Skill {
            name: name.to_string(),
            description: description.to_string(),
            dir: PathBuf::from(format!("/base/.rai/skills/{name}")),
            body: String::new(),
        }
    }

    #[test]
    fn test_format_context_empty() {
        assert_eq!(format_context(&[]), "");
    }

    #[test]
    fn test_format_context_sorted_xml() {
        let skills = vec![skill("zeta", "last"), skill("alpha", "first")];
        let ctx = format_context(&skills);

        assert!(ctx.starts_with("<available_skills>\n"));
        assert!(ctx.ends_with("</available_skills>"));
        let alpha = ctx.find("<name>alpha</name>").unwrap();
        let zeta = ctx.find("<name>zeta</name>").unwrap();
        assert!(alpha < zeta);
        assert!(ctx.contains("<location>/base/.rai/skills/alpha/SKILL.md</location>"));
        assert!(ctx.contains("<description>first</description>"));
    }

    #[test]
    fn test_format_list_empty() {
        assert_eq!(format_list(&[]), "no skills found");
    }

    #[test]
    fn test_format_list_entries() {
        let listing = format_list(&[skill("b", "second"), skill("a", "first")]);
        let lines: Vec<&str> = listing.lines().collect();
        assert_eq!(lines[0], "a");
        assert_eq!(lines[1], "  first");
        assert_eq!(lines[3], "b");
    }
}
