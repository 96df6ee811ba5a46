//! Session context: the client plus the one merge request currently loaded.
//!
//! Starting a new view cancels the previous load. A load only writes the
//! session if it is still the newest one when it finishes.

use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, info_span, Instrument};

use crate::api::{GitLabClient, Transport};
use crate::mr::diff::{summarize, DiffSummary};
use crate::mr::{
    parse_mr_url, ApprovalState, Comment, CurrentUser, MergeRequest, MrError, ResourceLocator,
};
use crate::projector::{self, Eligibility, MergeCheck};

/// Result of a secondary fetch that must not block the main view.
#[derive(Debug, Clone, PartialEq)]
pub enum Secondary<T> {
    Loaded(T),
    Unavailable(String),
}

impl<T> Secondary<T> {
    pub fn loaded(&self) -> Option<&T> {
        match self {
            Secondary::Loaded(value) => Some(value),
            Secondary::Unavailable(_) => None,
        }
    }
}

impl<T> From<Result<T, MrError>> for Secondary<T> {
    fn from(result: Result<T, MrError>) -> Self {
        match result {
            Ok(value) => Secondary::Loaded(value),
            Err(err) => {
                debug!(error = %err, "secondary fetch unavailable");
                Secondary::Unavailable(err.to_string())
            }
        }
    }
}

/// Everything known about the current merge request.
#[derive(Debug, Clone, PartialEq)]
pub struct MergeRequestView {
    pub locator: ResourceLocator,
    pub merge_request: MergeRequest,
    pub current_user: Secondary<CurrentUser>,
    pub approvals: Secondary<ApprovalState>,
    pub comments: Secondary<Vec<Comment>>,
    /// Loaded on demand
    pub changes: Option<DiffSummary>,
}

impl MergeRequestView {
    pub fn eligibility(&self) -> Eligibility {
        projector::project(
            self.merge_request.state,
            self.approvals.loaded(),
            self.current_user.loaded(),
        )
    }

    /// Comments written by people, in service order.
    pub fn visible_comments(&self) -> Vec<&Comment> {
        self.comments
            .loaded()
            .map(|comments| comments.iter().filter(|c| !c.system).collect())
            .unwrap_or_default()
    }
}

struct InFlight {
    generation: u64,
    cancel: CancellationToken,
}

pub struct Session<T: Transport> {
    client: GitLabClient<T>,
    in_flight: Mutex<InFlight>,
    current: Mutex<Option<MergeRequestView>>,
}

impl<T: Transport> Session<T> {
    pub fn new(client: GitLabClient<T>) -> Self {
        Self {
            client,
            in_flight: Mutex::new(InFlight {
                generation: 0,
                cancel: CancellationToken::new(),
            }),
            current: Mutex::new(None),
        }
    }

    pub fn client(&self) -> &GitLabClient<T> {
        &self.client
    }

    #[cfg(test)]
    pub async fn current(&self) -> Option<MergeRequestView> {
        self.current.lock().await.clone()
    }

    /// Load a merge request by URL and make it current.
    ///
    /// Any load still running is cancelled and returns MrError::Superseded.
    pub async fn view(&self, url: &str) -> Result<MergeRequestView, MrError> {
        let locator = parse_mr_url(url)?;
        let (generation, cancel) = self.begin_load().await;
        let span = info_span!("view", project = %locator.project_path_string(), mr = %locator.request_number, generation);

        let loaded = tokio::select! {
            () = cancel.cancelled() => Err(MrError::Superseded),
            loaded = self.load(locator).instrument(span) => loaded,
        };

        self.commit(generation, loaded?).await
    }

    async fn begin_load(&self) -> (u64, CancellationToken) {
        let mut in_flight = self.in_flight.lock().await;
        in_flight.cancel.cancel();
        in_flight.generation += 1;
        in_flight.cancel = CancellationToken::new();

        // The previous request's approvals, comments and diffs are now stale
        *self.current.lock().await = None;

        (in_flight.generation, in_flight.cancel.clone())
    }

    async fn commit(&self, generation: u64, view: MergeRequestView) -> Result<MergeRequestView, MrError> {
        let in_flight = self.in_flight.lock().await;
        if in_flight.generation != generation {
            debug!(generation, newest = in_flight.generation, "discarding stale load");
            return Err(MrError::Superseded);
        }
        *self.current.lock().await = Some(view.clone());
        Ok(view)
    }

    async fn load(&self, locator: ResourceLocator) -> Result<MergeRequestView, MrError> {
        info!("fetching merge request");
        let merge_request = self.client.view(&locator).await?;
        info!(iid = merge_request.iid, state = %merge_request.state, "fetched merge request");

        let (current_user, approvals, comments) = tokio::join!(
            self.client.current_user(),
            self.client.approval_state(&merge_request),
            self.client.comments(&merge_request),
        );

        Ok(MergeRequestView {
            locator,
            merge_request,
            current_user: current_user.into(),
            approvals: approvals.into(),
            comments: comments.into(),
            changes: None,
        })
    }

    async fn loaded_merge_request(&self) -> Result<MergeRequest, MrError> {
        self.current
            .lock()
            .await
            .as_ref()
            .map(|view| view.merge_request.clone())
            .ok_or(MrError::NoMergeRequest)
    }

    /// Apply `update` to the current view if it still shows merge request `id`.
    async fn update_current(
        &self,
        id: u64,
        update: impl FnOnce(&mut MergeRequestView),
    ) -> Result<MergeRequestView, MrError> {
        let mut current = self.current.lock().await;
        match current.as_mut() {
            Some(view) if view.merge_request.id == id => {
                update(view);
                Ok(view.clone())
            }
            _ => Err(MrError::Superseded),
        }
    }

    async fn refresh_approvals(&self, mr: &MergeRequest) -> Result<MergeRequestView, MrError> {
        let approvals = Secondary::from(self.client.approval_state(mr).await);
        self.update_current(mr.id, |view| view.approvals = approvals).await
    }

    pub async fn approve(&self) -> Result<MergeRequestView, MrError> {
        let mr = self.loaded_merge_request().await?;
        self.client.approve(&mr).await?;
        info!(iid = mr.iid, "approved");
        self.refresh_approvals(&mr).await
    }

    /// Revoke the current user's approval. Needs the current user to be known.
    pub async fn unapprove(&self) -> Result<MergeRequestView, MrError> {
        let mr = self.loaded_merge_request().await?;
        let user_known = self
            .current
            .lock()
            .await
            .as_ref()
            .is_some_and(|view| view.current_user.loaded().is_some());
        if !user_known {
            return Err(MrError::ValidationError(
                "Cannot determine current user. Please refresh and try again.".to_string(),
            ));
        }

        self.client.unapprove(&mr).await?;
        info!(iid = mr.iid, "unapproved");
        self.refresh_approvals(&mr).await
    }

    pub async fn merge_check(&self) -> Result<MergeCheck, MrError> {
        let mr = self.loaded_merge_request().await?;
        Ok(self.client.check_mergeability(&mr).await)
    }

    /// Merge the current request. The service's response replaces it wholesale.
    /// Pass the result of `merge_check` to skip a second pre-flight fetch.
    pub async fn merge(&self, check: Option<&MergeCheck>) -> Result<MergeRequestView, MrError> {
        let mr = self.loaded_merge_request().await?;
        let merged = match check {
            Some(check) => self.client.merge_with_check(&mr, check).await?,
            None => self.client.merge(&mr).await?,
        };
        info!(iid = merged.iid, state = %merged.state, "merge complete");

        self.update_current(mr.id, |view| view.merge_request = merged).await?;
        self.refresh_approvals(&mr).await
    }

    pub async fn add_comment(&self, body: &str) -> Result<MergeRequestView, MrError> {
        let mr = self.loaded_merge_request().await?;
        self.client.add_comment(&mr, body).await?;
        let comments = Secondary::from(self.client.comments(&mr).await);
        self.update_current(mr.id, |view| view.comments = comments).await
    }

    pub async fn load_changes(&self) -> Result<MergeRequestView, MrError> {
        let mr = self.loaded_merge_request().await?;
        let files = self.client.changes(&mr).await?;
        let summary = summarize(&files);
        debug!(files = summary.files_changed(), additions = summary.additions, deletions = summary.deletions, "summarized changes");
        self.update_current(mr.id, |view| view.changes = Some(summary)).await
    }
}
