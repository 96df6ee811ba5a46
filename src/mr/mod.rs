pub mod diff;
pub mod encode;
pub mod types;

pub use types::{
    ApprovalState, Approver, ChangedFile, Comment, CurrentUser, MergeRequest, MergeRequestState,
    MergeSignals, ProjectInfo, ResourceLocator,
};

use std::fmt;
use thiserror::Error;

/// Path segment that names the merge request collection in web URLs.
const MERGE_REQUESTS_SEGMENT: &str = "merge_requests";

/// Reserved segment separating the project path from project sub-pages.
const SEPARATOR_SEGMENT: &str = "-";

/// Which resource a 404 most likely refers to, read from the server message.
/// Best effort only: the message text varies between service versions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotFoundTarget {
    Project,
    MergeRequest,
    Unknown,
}

impl fmt::Display for NotFoundTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NotFoundTarget::Project => write!(f, "project not found"),
            NotFoundTarget::MergeRequest => write!(f, "merge request not found"),
            NotFoundTarget::Unknown => write!(f, "project or merge request not found"),
        }
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum MrError {
    #[error("Invalid merge request URL: {0} (expected https://gitlab.com/group/project/-/merge_requests/123)")]
    MalformedUrl(String),

    #[error("Cannot access project \"{project}\". Check your personal access token permissions.")]
    ProjectInaccessible { project: String },

    #[error("Unauthorized. Check your personal access token.")]
    Unauthorized,

    #[error("Not found: {target}{}", .message.as_deref().map(|m| format!(" ({m})")).unwrap_or_default())]
    NotFound {
        target: NotFoundTarget,
        message: Option<String>,
    },

    #[error("HTTP {status}: {}", .message.as_deref().unwrap_or("request failed"))]
    HttpError { status: u16, message: Option<String> },

    #[error("Network error talking to GitLab: {0}")]
    TransportFailure(String),

    #[error("Unexpected response from GitLab: {0}")]
    InvalidResponse(String),

    #[error("{0}")]
    ValidationError(String),

    #[error("Cannot merge: {reason}")]
    MergeBlocked { reason: String },

    #[error("No merge request loaded")]
    NoMergeRequest,

    #[error("Superseded by a newer merge request load")]
    Superseded,
}

/// Parse a merge request web URL into its project path and request number.
///
/// Expected format: https://{host}/{group}/{...}/{project}/-/merge_requests/{number}
/// The `-` separator is optional; when absent the project path ends at the
/// `merge_requests` segment. Returns MrError::MalformedUrl for anything else.
pub fn parse_mr_url(url: &str) -> Result<ResourceLocator, MrError> {
    let malformed = || MrError::MalformedUrl(url.to_string());

    let parsed = reqwest::Url::parse(url.trim()).map_err(|_| malformed())?;
    let segments: Vec<&str> = parsed.path_segments().ok_or_else(malformed)?.collect();

    let keyword = segments
        .iter()
        .position(|segment| *segment == MERGE_REQUESTS_SEGMENT)
        .ok_or_else(malformed)?;

    let boundary = segments[..keyword]
        .iter()
        .rposition(|segment| *segment == SEPARATOR_SEGMENT)
        .unwrap_or(keyword);

    let project_path: Vec<String> = segments[..boundary]
        .iter()
        .filter(|segment| !segment.is_empty())
        .map(|segment| segment.to_string())
        .collect();

    let request_number = segments
        .get(keyword + 1)
        .filter(|segment| !segment.is_empty())
        .ok_or_else(malformed)?;

    if project_path.is_empty() {
        return Err(malformed());
    }

    Ok(ResourceLocator {
        project_path,
        request_number: request_number.to_string(),
    })
}
