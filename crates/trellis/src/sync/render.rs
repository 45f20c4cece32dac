//! Translate a local issue into a remote draft.

use super::tracker::RemoteIssueDraft;
use crate::domain::{priority_name, Issue, IssueStatus, SessionId};

/// Marker identifying bodies written by the sync engine.
pub const SYNC_MARKER: &str = "Synced from the local issue tracker";

/// Label for a status, e.g. `status:in-progress`.
#[must_use]
pub fn status_label(status: IssueStatus) -> String {
    format!("status:{}", status.as_str().replace('_', "-"))
}

/// Label for a priority level, e.g. `priority:high`.
#[must_use]
pub fn priority_label(priority: u8) -> String {
    format!("priority:{}", priority_name(priority))
}

/// The `status:*`, `priority:*` and (when set) `area:*` labels for `issue`.
///
/// `issue` should carry its effective status.
#[must_use]
pub fn labels(issue: &Issue) -> Vec<String> {
    let mut labels = vec![status_label(issue.status), priority_label(issue.priority)];
    if let Some(area) = issue.area() {
        labels.push(format!("area:{area}"));
    }
    labels
}

/// Self-describing body: description, then a footer with local context.
#[must_use]
pub fn body(issue: &Issue, sessions: &[SessionId]) -> String {
    let mut body = String::new();

    let description = issue.description.trim();
    if description.is_empty() {
        body.push_str("_No description provided._");
    } else {
        body.push_str(description);
    }

    body.push_str("\n\n---\n\n");
    body.push_str(&format!(
        "**Local issue:** `{}`\n**Type:** {}\n**Created:** {}\n",
        issue.id,
        issue.issue_type,
        issue.created_at.to_rfc3339()
    ));

    body.push_str("\n**Linked sessions:**\n");
    if sessions.is_empty() {
        body.push_str("- _none_\n");
    }
    for session in sessions {
        body.push_str(&format!("- `{session}`\n"));
    }

    if !issue.metadata.is_empty() {
        let metadata = serde_json::to_string_pretty(&issue.metadata).unwrap_or_default();
        body.push_str(&format!("\n**Metadata:**\n```json\n{metadata}\n```\n"));
    }

    body.push_str(&format!("\n_{SYNC_MARKER}._"));
    body
}

/// Build the full remote draft for `issue`.
#[must_use]
pub fn draft(issue: &Issue, sessions: &[SessionId]) -> RemoteIssueDraft {
    RemoteIssueDraft {
        local_id: issue.id.clone(),
        title: issue.title.clone(),
        body: body(issue, sessions),
        labels: labels(issue),
        assignee: issue.assignee.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::IssueId;
    use chrono::Utc;
    use rstest::rstest;
    use serde_json::json;

    fn issue() -> Issue {
        let now = Utc::now();
        Issue {
            id: IssueId::new("proj-1"),
            title: "Fix login".into(),
            description: String::new(),
            issue_type: "bug".into(),
            status: IssueStatus::InProgress,
            priority: 1,
            assignee: None,
            blocking_notes: None,
            metadata: serde_json::Map::new(),
            created_at: now,
            updated_at: now,
            closed_at: None,
            resolution: None,
        }
    }

    #[rstest]
    #[case(IssueStatus::Open, "status:open")]
    #[case(IssueStatus::InProgress, "status:in-progress")]
    #[case(IssueStatus::Blocked, "status:blocked")]
    #[case(IssueStatus::Closed, "status:closed")]
    fn status_labels(#[case] status: IssueStatus, #[case] expected: &str) {
        assert_eq!(status_label(status), expected);
    }

    #[rstest]
    #[case(0, "priority:critical")]
    #[case(1, "priority:high")]
    #[case(2, "priority:normal")]
    #[case(3, "priority:low")]
    #[case(4, "priority:deferred")]
    fn priority_labels(#[case] priority: u8, #[case] expected: &str) {
        assert_eq!(priority_label(priority), expected);
    }

    #[test]
    fn area_label_only_when_set() {
        let mut issue = issue();
        assert_eq!(labels(&issue), vec!["status:in-progress", "priority:high"]);

        issue.metadata.insert("area".into(), json!("core"));
        assert!(labels(&issue).contains(&"area:core".to_string()));
    }

    #[test]
    fn body_without_description_uses_placeholder() {
        let body = body(&issue(), &[]);
        assert!(body.starts_with("_No description provided._"));
        assert!(body.contains("`proj-1`"));
        assert!(body.contains(SYNC_MARKER));
    }

    #[test]
    fn body_lists_sessions_and_metadata() {
        let mut issue = issue();
        issue.description = "Users are logged out".into();
        issue.metadata.insert("area".into(), json!("auth"));
        let sessions = vec![SessionId::parse("s-1").unwrap(), SessionId::parse("s-2").unwrap()];

        let body = body(&issue, &sessions);
        assert!(body.starts_with("Users are logged out"));
        assert!(body.contains("- `s-1`\n- `s-2`"));
        assert!(body.contains("\"area\": \"auth\""));
    }

    #[test]
    fn footer_lines_are_in_order() {
        let issue = issue();
        let body = body(&issue, &[]);
        let expected = format!(
            "_No description provided._\n\n---\n\n**Local issue:** `proj-1`\n**Type:** bug\n**Created:** {}\n\n**Linked sessions:**\n- _none_\n\n_{SYNC_MARKER}._",
            issue.created_at.to_rfc3339()
        );
        assert_eq!(body, expected);
    }
}
