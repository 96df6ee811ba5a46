use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::fmt;

/// Identifies one merge request: the project it lives in and its number.
/// Built by `parse_mr_url()` in mr/mod.rs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceLocator {
    /// Project path segments, e.g. ["group", "sub", "project"]. Never contains `-`.
    pub project_path: Vec<String>,
    /// The merge request number as written in the URL (e.g. "10")
    pub request_number: String,
}

impl ResourceLocator {
    /// The project path joined with `/`, e.g. "group/sub/project".
    pub fn project_path_string(&self) -> String {
        self.project_path.join("/")
    }
}

/// Lifecycle state reported by the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MergeRequestState {
    Opened,
    Closed,
    Merged,
    /// Transient state while the service is performing a merge.
    Locked,
}

impl MergeRequestState {
    /// Merged and closed requests accept no further mutations.
    pub fn is_terminal(self) -> bool {
        matches!(self, MergeRequestState::Merged | MergeRequestState::Closed)
    }
}

impl fmt::Display for MergeRequestState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MergeRequestState::Opened => write!(f, "opened"),
            MergeRequestState::Closed => write!(f, "closed"),
            MergeRequestState::Merged => write!(f, "merged"),
            MergeRequestState::Locked => write!(f, "locked"),
        }
    }
}

/// The authoritative merge request resource.
/// Note: Not Deserialize; built from the API response in api/wire.rs so
/// that a fresh response always replaces the whole value.
#[derive(Debug, Clone, PartialEq)]
pub struct MergeRequest {
    /// Service-internal id
    pub id: u64,
    /// Number shown in the UI and used in URLs (GitLab's `iid`)
    pub iid: u64,
    pub title: String,
    pub description: Option<String>,
    pub state: MergeRequestState,
    pub source_branch: String,
    pub target_branch: String,
    pub author_name: String,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
    /// Canonical web URL of the merge request
    pub web_url: String,
    /// Numeric project id, used for every call after the initial lookup
    pub project_id: u64,
}

/// Mergeability fields read by the merge pre-flight check.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MergeSignals {
    pub merge_status: Option<String>,
    pub detailed_merge_status: Option<String>,
    pub has_conflicts: bool,
    pub work_in_progress: bool,
    pub draft: bool,
    pub pipeline_status: Option<String>,
}

/// A user who approved the merge request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Approver {
    pub id: u64,
    pub username: String,
    pub email: Option<String>,
    pub name: String,
}

/// Approval status of a merge request. Recomputed on every fetch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ApprovalState {
    pub approved_by: Vec<Approver>,
    pub approvals_required: u32,
}

/// The user the token belongs to. Only used for identity comparison.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CurrentUser {
    pub id: u64,
    pub username: String,
    #[serde(default)]
    pub email: Option<String>,
    pub name: String,
}

/// A note on the merge request.
#[derive(Debug, Clone, PartialEq)]
pub struct Comment {
    pub author_name: String,
    pub created_at: Option<DateTime<Utc>>,
    pub body: String,
    /// Generated by the service (e.g. "added 1 commit"); hidden from display
    pub system: bool,
}

/// A file touched by the merge request, with its raw unified diff.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangedFile {
    pub path: String,
    /// Unified diff text; empty for binary files
    pub diff: String,
    pub new_file: bool,
    pub deleted_file: bool,
    pub renamed_file: bool,
}

/// Project metadata returned by the accessibility probe.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ProjectInfo {
    pub id: u64,
    pub name: String,
    pub path_with_namespace: String,
    #[serde(default)]
    pub visibility: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_project_path_string() {
        let locator = ResourceLocator {
            project_path: vec!["group".to_string(), "sub".to_string(), "repo".to_string()],
            request_number: "10".to_string(),
        };
        assert_eq!(locator.project_path_string(), "group/sub/repo");
    }

    #[test]
    fn test_terminal_states() {
        assert!(MergeRequestState::Merged.is_terminal());
        assert!(MergeRequestState::Closed.is_terminal());
        assert!(!MergeRequestState::Opened.is_terminal());
        assert!(!MergeRequestState::Locked.is_terminal());
    }

    #[test]
    fn test_state_deserializes_lowercase() {
        let state: MergeRequestState = serde_json::from_str("\"merged\"").unwrap();
        assert_eq!(state, MergeRequestState::Merged);
        assert_eq!(state.to_string(), "merged");
    }
}
