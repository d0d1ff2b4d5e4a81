//! Review support: disclaimers and the approval gate.

use std::collections::HashSet;

use briefdesk_shared::{ComplianceFlag, EditionId, EditionStatus, Result};
use briefdesk_storage::Storage;

use crate::prompts;

/// One disclaimer block appended to a rendered edition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Disclaimer {
    pub name: &'static str,
    pub text: &'static str,
}

/// Decide which disclaimers an edition needs from its unresolved flag types
/// and the categories of its live articles. The general disclaimer is
/// always present.
pub fn compute_disclaimers(flags: &[ComplianceFlag], article_categories: &[String]) -> Vec<Disclaimer> {
    let flag_types: HashSet<&str> = flags
        .iter()
        .filter(|f| !f.is_resolved)
        .map(|f| f.flag_type.as_str())
        .collect();
    let categories: HashSet<&str> = article_categories.iter().map(String::as_str).collect();

    let mut disclaimers = vec![Disclaimer {
        name: "GENERAL",
        text: prompts::DISCLAIMER_GENERAL,
    }];

    if flag_types.contains("forward_looking") {
        disclaimers.push(Disclaimer {
            name: "FORWARD_LOOKING",
            text: prompts::DISCLAIMER_FORWARD_LOOKING,
        });
    }
    if flag_types.contains("performance_claim") {
        disclaimers.push(Disclaimer {
            name: "PERFORMANCE",
            text: prompts::DISCLAIMER_PERFORMANCE,
        });
    }
    if categories.contains("regional") {
        disclaimers.push(Disclaimer {
            name: "CROSS_BORDER",
            text: prompts::DISCLAIMER_CROSS_BORDER,
        });
    }
    if categories.contains("deals") {
        disclaimers.push(Disclaimer {
            name: "PRIVATE_PLACEMENT",
            text: prompts::DISCLAIMER_PRIVATE_PLACEMENT,
        });
    }

    disclaimers
}

/// Whether the edition can be approved right now. Always recomputed from
/// the store; the blocking count is never cached.
pub async fn can_approve(storage: &Storage, edition_id: &EditionId) -> Result<bool> {
    let Some(edition) = storage.get_edition(edition_id).await? else {
        return Ok(false);
    };
    if edition.status != EditionStatus::Reviewing {
        return Ok(false);
    }
    Ok(storage.count_unresolved_blocking(edition_id).await? == 0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use briefdesk_shared::Severity;

    fn flag(flag_type: &str, resolved: bool) -> ComplianceFlag {
        ComplianceFlag {
            id: uuid::Uuid::now_v7().to_string(),
            section_draft_id: "sd".into(),
            severity: Severity::AddDisclaimer,
            flag_type: flag_type.into(),
            matched_text: "m".into(),
            rule_reference: "r".into(),
            explanation: "e".into(),
            recommended_action: "a".into(),
            pass_number: 1,
            is_resolved: resolved,
            resolved_by: None,
            resolved_at: None,
            resolution_note: None,
        }
    }

    fn names(disclaimers: &[Disclaimer]) -> Vec<&str> {
        disclaimers.iter().map(|d| d.name).collect()
    }

    #[test]
    fn general_disclaimer_always_present() {
        let disclaimers = compute_disclaimers(&[], &[]);
        assert_eq!(names(&disclaimers), vec!["GENERAL"]);
    }

    #[test]
    fn flag_types_and_categories_add_disclaimers() {
        let flags = vec![flag("forward_looking", false), flag("performance_claim", false)];
        let categories = vec!["regional".to_string(), "deals".to_string(), "macro".to_string()];
        let disclaimers = compute_disclaimers(&flags, &categories);
        assert_eq!(
            names(&disclaimers),
            vec![
                "GENERAL",
                "FORWARD_LOOKING",
                "PERFORMANCE",
                "CROSS_BORDER",
                "PRIVATE_PLACEMENT"
            ]
        );
    }

    #[test]
    fn resolved_flags_no_longer_drive_disclaimers() {
        let flags = vec![flag("forward_looking", true)];
        let disclaimers = compute_disclaimers(&flags, &[]);
        assert_eq!(names(&disclaimers), vec!["GENERAL"]);
    }
}
