use regex::Regex;
use std::sync::LazyLock;

use crate::types::ArtifactRef;

static REF_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    #[allow(clippy::expect_used)]
    Regex::new(r"@([A-Za-z0-9][A-Za-z0-9_-]*)/([A-Za-z0-9_*][A-Za-z0-9_*-]*)")
        .expect("reference-key pattern is a fixed valid regex")
});

/// Scans free text for `@agent/name` reference-key citations.
///
/// Order-preserving, duplicates removed. A name of `*` is kept as a literal
/// wildcard ref (all of that agent's artifacts), matching §6's
/// `@<agent-name>/*` convention.
pub fn parse_refs(free_text: &str) -> Vec<ArtifactRef> {
    let mut seen = std::collections::HashSet::new();
    let mut refs = Vec::new();

    for caps in REF_PATTERN.captures_iter(free_text) {
        let agent = &caps[1];
        let name = &caps[2];
        let key = format!("@{agent}/{name}");
        if !seen.insert(key.clone()) {
            continue;
        }
        if name == "*" {
            refs.push(ArtifactRef::AgentFilter {
                agent: agent.to_string(),
                artifact_type: None,
            });
        } else {
            refs.push(ArtifactRef::Key(key));
        }
    }

    refs
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_plain_refs_in_order() {
        let refs = parse_refs("see @system-architect/api-spec and @project-planner/tasks");
        assert_eq!(
            refs,
            vec![
                ArtifactRef::Key("@system-architect/api-spec".to_string()),
                ArtifactRef::Key("@project-planner/tasks".to_string()),
            ]
        );
    }

    #[test]
    fn dedups_preserving_first_occurrence() {
        let refs = parse_refs("@a/b then again @a/b then @c/d");
        assert_eq!(
            refs,
            vec![
                ArtifactRef::Key("@a/b".to_string()),
                ArtifactRef::Key("@c/d".to_string()),
            ]
        );
    }

    #[test]
    fn wildcard_becomes_agent_filter() {
        let refs = parse_refs("give me @qa-engineer/*");
        assert_eq!(
            refs,
            vec![ArtifactRef::AgentFilter {
                agent: "qa-engineer".to_string(),
                artifact_type: None,
            }]
        );
    }

    #[test]
    fn no_refs_in_plain_text() {
        assert!(parse_refs("no references here").is_empty());
    }
}
