//! JSON shapes returned by the GitLab v4 API, and their conversion into
//! domain types.

use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::mr::{
    ApprovalState, Approver, ChangedFile, Comment, MergeRequest, MergeRequestState, MergeSignals,
};

#[derive(Debug, Deserialize)]
pub(crate) struct UserRef {
    pub name: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct PipelineRef {
    #[serde(default)]
    pub status: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct MergeRequestResponse {
    pub id: u64,
    pub iid: u64,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    pub state: MergeRequestState,
    pub source_branch: String,
    pub target_branch: String,
    pub author: UserRef,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
    pub web_url: String,
    pub project_id: u64,
    #[serde(default)]
    pub merge_status: Option<String>,
    #[serde(default)]
    pub detailed_merge_status: Option<String>,
    #[serde(default)]
    pub has_conflicts: bool,
    #[serde(default)]
    pub work_in_progress: bool,
    #[serde(default)]
    pub draft: bool,
    #[serde(default)]
    pub pipeline: Option<PipelineRef>,
}

impl MergeRequestResponse {
    pub fn signals(&self) -> MergeSignals {
        MergeSignals {
            merge_status: self.merge_status.clone(),
            detailed_merge_status: self.detailed_merge_status.clone(),
            has_conflicts: self.has_conflicts,
            work_in_progress: self.work_in_progress,
            draft: self.draft,
            pipeline_status: self.pipeline.as_ref().and_then(|p| p.status.clone()),
        }
    }

    pub fn into_merge_request(self) -> MergeRequest {
        MergeRequest {
            id: self.id,
            iid: self.iid,
            title: self.title,
            description: self.description.filter(|d| !d.trim().is_empty()),
            state: self.state,
            source_branch: self.source_branch,
            target_branch: self.target_branch,
            author_name: self.author.name,
            created_at: self.created_at,
            updated_at: self.updated_at,
            web_url: self.web_url,
            project_id: self.project_id,
        }
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct ApprovalUser {
    pub id: u64,
    pub username: String,
    #[serde(default)]
    pub email: Option<String>,
    pub name: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ApprovedByEntry {
    pub user: ApprovalUser,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ApprovalsResponse {
    #[serde(default)]
    pub approved_by: Vec<ApprovedByEntry>,
    #[serde(default)]
    pub approvals_required: Option<u32>,
}

impl From<ApprovalsResponse> for ApprovalState {
    fn from(response: ApprovalsResponse) -> Self {
        ApprovalState {
            approved_by: response
                .approved_by
                .into_iter()
                .map(|entry| Approver {
                    id: entry.user.id,
                    username: entry.user.username,
                    email: entry.user.email,
                    name: entry.user.name,
                })
                .collect(),
            approvals_required: response.approvals_required.unwrap_or(0),
        }
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct NoteResponse {
    pub body: String,
    pub author: UserRef,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub system: bool,
}

impl From<NoteResponse> for Comment {
    fn from(note: NoteResponse) -> Self {
        Comment {
            author_name: note.author.name,
            created_at: note.created_at,
            body: note.body,
            system: note.system,
        }
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct ChangeEntry {
    #[serde(default)]
    pub old_path: String,
    #[serde(default)]
    pub new_path: String,
    #[serde(default)]
    pub diff: String,
    #[serde(default)]
    pub new_file: bool,
    #[serde(default)]
    pub deleted_file: bool,
    #[serde(default)]
    pub renamed_file: bool,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ChangesResponse {
    #[serde(default)]
    pub changes: Vec<ChangeEntry>,
}

impl From<ChangeEntry> for ChangedFile {
    fn from(entry: ChangeEntry) -> Self {
        let path = if entry.new_path.is_empty() {
            entry.old_path
        } else {
            entry.new_path
        };
        ChangedFile {
            path,
            diff: entry.diff,
            new_file: entry.new_file,
            deleted_file: entry.deleted_file,
            renamed_file: entry.renamed_file,
        }
    }
}
