//! `bonsai list`: registry contents.

use std::fmt::Write as _;

use crate::core::registry::Registry;

/// Render skills and/or bundles. Neither flag selects both sections.
pub fn render(registry: &Registry, skills: bool, bundles: bool) -> String {
    let (skills, bundles) = if skills || bundles {
        (skills, bundles)
    } else {
        (true, true)
    };
    let mut out = String::new();

    if skills {
        out.push_str("Skills:\n");
        for skill in &registry.skills {
            let mandatory = if skill.mandatory { " [mandatory]" } else { "" };
            let _ = writeln!(
                out,
                "  {:<45} {}/{}  {}{mandatory}",
                skill.name, skill.cost, skill.execution_mode, skill.domain
            );
        }
        out.push('\n');
    }

    if bundles {
        out.push_str("Bundles:\n");
        for (name, members) in &registry.bundles {
            let _ = writeln!(out, "  {name:<20} ({} skills)", members.len());
        }
        out.push('\n');
    }

    out
}
