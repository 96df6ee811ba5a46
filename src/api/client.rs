use serde::de::DeserializeOwned;
use tracing::{debug, info, instrument, warn};

use super::strategy::{first_success, Step};
use super::transport::{ApiRequest, ApiResponse, Method, Transport};
use super::wire::{ApprovalsResponse, ChangesResponse, MergeRequestResponse, NoteResponse};
use crate::mr::encode::{encoding_candidates, standard_encoding};
use crate::mr::{
    ApprovalState, ChangedFile, Comment, CurrentUser, MergeRequest, MrError, NotFoundTarget,
    ProjectInfo, ResourceLocator,
};
use crate::projector::{assess_mergeability, MergeCheck};

/// Methods tried, in order, when merging. GitLab documents `PUT` without a
/// body, but some deployments and proxies only accept the later variants.
/// The order is a workaround for deployment differences, not a protocol rule.
const MERGE_ATTEMPTS: [MergeAttempt; 3] = [
    MergeAttempt { method: Method::Put, empty_body: false },
    MergeAttempt { method: Method::Put, empty_body: true },
    MergeAttempt { method: Method::Post, empty_body: false },
];

const METHOD_NOT_ALLOWED: u16 = 405;

#[derive(Debug, Clone, Copy)]
struct MergeAttempt {
    method: Method,
    empty_body: bool,
}

/// Sequences every call against the GitLab v4 API and classifies the outcome
/// into `MrError`. This is the only layer that retries.
pub struct GitLabClient<T: Transport> {
    api_base: String,
    token: String,
    transport: T,
}

impl<T: Transport> GitLabClient<T> {
    /// `endpoint` is the instance root, e.g. https://gitlab.com
    pub fn new(endpoint: &str, token: impl Into<String>, transport: T) -> Self {
        Self {
            api_base: format!("{}/api/v4", endpoint.trim_end_matches('/')),
            token: token.into(),
            transport,
        }
    }

    pub fn api_base(&self) -> &str {
        &self.api_base
    }

    #[cfg(test)]
    pub(crate) fn transport(&self) -> &T {
        &self.transport
    }

    fn request(&self, method: Method, path: &str, body: Option<serde_json::Value>) -> ApiRequest {
        let mut headers = vec![("PRIVATE-TOKEN".to_string(), self.token.clone())];
        if body.is_some() {
            headers.push(("Content-Type".to_string(), "application/json".to_string()));
        }
        ApiRequest {
            method,
            url: format!("{}{}", self.api_base, path),
            headers,
            body,
        }
    }

    async fn send(&self, request: ApiRequest) -> Result<ApiResponse, MrError> {
        debug!(method = %request.method, url = %request.url, "sending request");
        self.transport
            .send(request)
            .await
            .map_err(|err| MrError::TransportFailure(err.0))
    }

    async fn get_json<R: DeserializeOwned>(&self, path: &str) -> Result<R, MrError> {
        let response = self.send(self.request(Method::Get, path, None)).await?;
        read_json(&response)
    }

    /// Check that the token can read the project. Any failure, including
    /// network errors, is reported as ProjectInaccessible.
    #[instrument(skip(self))]
    pub async fn probe_project(&self, project_path: &str) -> Result<ProjectInfo, MrError> {
        let inaccessible = || MrError::ProjectInaccessible {
            project: project_path.to_string(),
        };
        let path = format!("/projects/{}", standard_encoding(project_path));

        let response = self
            .send(self.request(Method::Get, &path, None))
            .await
            .map_err(|err| {
                warn!(error = %err, "project access check failed");
                inaccessible()
            })?;

        if !response.is_success() {
            debug!(status = response.status, "project access denied");
            return Err(inaccessible());
        }

        let project: ProjectInfo = response.json().map_err(|_| inaccessible())?;
        debug!(name = %project.name, visibility = ?project.visibility, "project access confirmed");
        Ok(project)
    }

    /// Fetch the merge request, trying each project path encoding in turn.
    #[instrument(skip(self, locator), fields(project = %locator.project_path_string(), mr = %locator.request_number))]
    pub async fn fetch_merge_request(&self, locator: &ResourceLocator) -> Result<MergeRequest, MrError> {
        let number = locator.request_number.as_str();
        let mut attempt = 0;

        first_success(encoding_candidates(&locator.project_path_string()), |encoded| {
            attempt += 1;
            self.fetch_with_encoding(attempt, encoded, number)
        })
        .await
        .map_err(|last| {
            last.unwrap_or(MrError::NotFound {
                target: NotFoundTarget::Unknown,
                message: None,
            })
        })
    }

    async fn fetch_with_encoding(
        &self,
        attempt: usize,
        encoded: String,
        number: &str,
    ) -> Step<MergeRequest, MrError> {
        let path = format!("/projects/{encoded}/merge_requests/{number}");
        debug!(attempt, encoded = %encoded, "trying project path encoding");

        let response = match self.send(self.request(Method::Get, &path, None)).await {
            Ok(response) => response,
            Err(err) => return Step::Next(err),
        };

        if response.is_success() {
            return match response.json::<MergeRequestResponse>() {
                Ok(body) => {
                    info!(attempt, "fetched merge request");
                    Step::Done(body.into_merge_request())
                }
                Err(err) => Step::Next(MrError::InvalidResponse(err.to_string())),
            };
        }

        match response.status {
            401 => Step::Stop(MrError::Unauthorized),
            404 => Step::Next(not_found(&response)),
            status => Step::Next(MrError::HttpError {
                status,
                message: response.message(),
            }),
        }
    }

    /// Probe project access, then fetch the merge request.
    pub async fn view(&self, locator: &ResourceLocator) -> Result<MergeRequest, MrError> {
        self.probe_project(&locator.project_path_string()).await?;
        self.fetch_merge_request(locator).await
    }

    #[instrument(skip(self))]
    pub async fn current_user(&self) -> Result<CurrentUser, MrError> {
        self.get_json("/user").await
    }

    #[instrument(skip(self, mr), fields(project_id = mr.project_id, iid = mr.iid))]
    pub async fn approval_state(&self, mr: &MergeRequest) -> Result<ApprovalState, MrError> {
        let response: ApprovalsResponse = self.get_json(&mr_path(mr, "/approvals")).await?;
        Ok(response.into())
    }

    #[instrument(skip(self, mr), fields(project_id = mr.project_id, iid = mr.iid))]
    pub async fn comments(&self, mr: &MergeRequest) -> Result<Vec<Comment>, MrError> {
        let notes: Vec<NoteResponse> = self.get_json(&mr_path(mr, "/notes")).await?;
        Ok(notes.into_iter().map(Comment::from).collect())
    }

    #[instrument(skip(self, mr), fields(project_id = mr.project_id, iid = mr.iid))]
    pub async fn changes(&self, mr: &MergeRequest) -> Result<Vec<ChangedFile>, MrError> {
        let response: ChangesResponse = self.get_json(&mr_path(mr, "/changes")).await?;
        Ok(response.changes.into_iter().map(ChangedFile::from).collect())
    }

    #[instrument(skip(self, mr), fields(project_id = mr.project_id, iid = mr.iid))]
    pub async fn approve(&self, mr: &MergeRequest) -> Result<(), MrError> {
        let response = self
            .send(self.request(Method::Post, &mr_path(mr, "/approve"), None))
            .await?;
        expect_success(&response)
    }

    #[instrument(skip(self, mr), fields(project_id = mr.project_id, iid = mr.iid))]
    pub async fn unapprove(&self, mr: &MergeRequest) -> Result<(), MrError> {
        let response = self
            .send(self.request(Method::Post, &mr_path(mr, "/unapprove"), None))
            .await?;
        expect_success(&response)
    }

    /// Post a comment. Blank text is rejected before any request is made.
    #[instrument(skip(self, mr, body), fields(project_id = mr.project_id, iid = mr.iid))]
    pub async fn add_comment(&self, mr: &MergeRequest, body: &str) -> Result<Comment, MrError> {
        let body = body.trim();
        if body.is_empty() {
            return Err(MrError::ValidationError("Please enter a comment".to_string()));
        }

        let payload = serde_json::json!({ "body": body });
        let response = self
            .send(self.request(Method::Post, &mr_path(mr, "/notes"), Some(payload)))
            .await?;
        let note: NoteResponse = read_json(&response)?;
        Ok(note.into())
    }

    /// Advisory mergeability check against a fresh copy of the merge request.
    /// Fails open: if the check cannot complete, merging is allowed.
    #[instrument(skip(self, mr), fields(project_id = mr.project_id, iid = mr.iid))]
    pub async fn check_mergeability(&self, mr: &MergeRequest) -> MergeCheck {
        let response = match self.send(self.request(Method::Get, &mr_path(mr, ""), None)).await {
            Ok(response) if response.is_success() => response,
            Ok(response) => {
                debug!(status = response.status, "could not check merge status");
                return MergeCheck::fail_open();
            }
            Err(err) => {
                warn!(error = %err, "merge status check failed");
                return MergeCheck::fail_open();
            }
        };

        match response.json::<MergeRequestResponse>() {
            Ok(body) => {
                let signals = body.signals();
                debug!(
                    merge_status = ?signals.merge_status,
                    pipeline_status = ?signals.pipeline_status,
                    has_conflicts = signals.has_conflicts,
                    "merge status"
                );
                assess_mergeability(&signals)
            }
            Err(err) => {
                warn!(error = %err, "unreadable merge status response");
                MergeCheck::fail_open()
            }
        }
    }

    /// Merge the request and return the service's updated copy of it.
    #[instrument(skip(self, mr), fields(project_id = mr.project_id, iid = mr.iid))]
    pub async fn merge(&self, mr: &MergeRequest) -> Result<MergeRequest, MrError> {
        ensure_open(mr)?;
        let check = self.check_mergeability(mr).await;
        self.merge_with_check(mr, &check).await
    }

    /// Merge using a pre-flight result the caller already fetched.
    #[instrument(skip(self, mr, check), fields(project_id = mr.project_id, iid = mr.iid, can_merge = check.can_merge))]
    pub async fn merge_with_check(&self, mr: &MergeRequest, check: &MergeCheck) -> Result<MergeRequest, MrError> {
        ensure_open(mr)?;
        if !check.can_merge {
            return Err(MrError::MergeBlocked {
                reason: check.reason.clone(),
            });
        }

        let path = mr_path(mr, "/merge");
        first_success(MERGE_ATTEMPTS, |attempt| self.try_merge(&path, attempt))
            .await
            .map_err(|last| last.unwrap_or_else(merge_not_allowed))
    }

    async fn try_merge(&self, path: &str, attempt: MergeAttempt) -> Step<MergeRequest, MrError> {
        let body = attempt.empty_body.then(|| serde_json::json!({}));
        debug!(method = %attempt.method, empty_body = attempt.empty_body, "attempting merge");

        let response = match self.send(self.request(attempt.method, path, body)).await {
            Ok(response) => response,
            Err(err) => return Step::Stop(err),
        };

        if response.is_success() {
            return match response.json::<MergeRequestResponse>() {
                Ok(body) => {
                    info!(method = %attempt.method, "merge request merged");
                    Step::Done(body.into_merge_request())
                }
                Err(err) => Step::Stop(MrError::InvalidResponse(err.to_string())),
            };
        }

        match response.status {
            METHOD_NOT_ALLOWED => Step::Next(merge_not_allowed()),
            401 => Step::Stop(MrError::Unauthorized),
            406 => Step::Stop(MrError::MergeBlocked {
                reason: response
                    .message()
                    .unwrap_or_else(|| "conflicts or failed checks".to_string()),
            }),
            status => Step::Stop(MrError::HttpError {
                status,
                message: response.message(),
            }),
        }
    }
}

fn ensure_open(mr: &MergeRequest) -> Result<(), MrError> {
    if mr.state.is_terminal() {
        return Err(MrError::MergeBlocked {
            reason: format!("this merge request is {}", mr.state),
        });
    }
    Ok(())
}

fn mr_path(mr: &MergeRequest, suffix: &str) -> String {
    format!("/projects/{}/merge_requests/{}{}", mr.project_id, mr.iid, suffix)
}

fn merge_not_allowed() -> MrError {
    MrError::HttpError {
        status: METHOD_NOT_ALLOWED,
        message: Some(
            "Merge operation not allowed. This GitLab instance may have merge restrictions or the endpoint is disabled."
                .to_string(),
        ),
    }
}

/// Read a 404 body and guess which resource was missing.
fn not_found(response: &ApiResponse) -> MrError {
    let message = response.message();
    let target = match message.as_deref() {
        Some(text) if text.contains("Project Not Found") => NotFoundTarget::Project,
        Some(text) if text.contains("Merge Request Not Found") => NotFoundTarget::MergeRequest,
        _ => NotFoundTarget::Unknown,
    };
    MrError::NotFound { target, message }
}

/// Map a non-2xx response to an error, keeping the service's message.
fn classify_failure(response: &ApiResponse) -> MrError {
    match response.status {
        401 => MrError::Unauthorized,
        404 => not_found(response),
        status => MrError::HttpError {
            status,
            message: response.message(),
        },
    }
}

fn expect_success(response: &ApiResponse) -> Result<(), MrError> {
    if response.is_success() {
        Ok(())
    } else {
        Err(classify_failure(response))
    }
}

fn read_json<R: DeserializeOwned>(response: &ApiResponse) -> Result<R, MrError> {
    expect_success(response)?;
    response
        .json()
        .map_err(|err| MrError::InvalidResponse(err.to_string()))
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::api::transport::TransportError;
    use crate::mr::MergeRequestState;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// Replays canned responses in order and records every request.
    #[derive(Default)]
    pub(crate) struct ScriptedTransport {
        responses: Mutex<VecDeque<Result<ApiResponse, TransportError>>>,
        pub(crate) requests: Mutex<Vec<ApiRequest>>,
    }

    impl ScriptedTransport {
        pub(crate) fn new(responses: Vec<Result<ApiResponse, TransportError>>) -> Self {
            Self {
                responses: Mutex::new(responses.into()),
                requests: Mutex::new(Vec::new()),
            }
        }

        pub(crate) fn urls(&self) -> Vec<String> {
            self.requests.lock().unwrap().iter().map(|r| r.url.clone()).collect()
        }
    }

    #[async_trait]
    impl Transport for ScriptedTransport {
        async fn send(&self, request: ApiRequest) -> Result<ApiResponse, TransportError> {
            self.requests.lock().unwrap().push(request);
            self.responses
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(TransportError("no scripted response left".to_string())))
        }
    }

    pub(crate) fn ok(body: serde_json::Value) -> Result<ApiResponse, TransportError> {
        Ok(ApiResponse::new(200, body.to_string()))
    }

    pub(crate) fn status(code: u16, body: &str) -> Result<ApiResponse, TransportError> {
        Ok(ApiResponse::new(code, body))
    }

    pub(crate) fn mr_json(iid: u64, state: &str) -> serde_json::Value {
        serde_json::json!({
            "id": 1000 + iid,
            "iid": iid,
            "title": format!("MR {iid}"),
            "description": "Adds **things**",
            "state": state,
            "source_branch": "feature",
            "target_branch": "main",
            "author": { "name": "Alice" },
            "created_at": "2024-03-01T10:15:00Z",
            "updated_at": "2024-03-02T08:00:00Z",
            "web_url": format!("https://gitlab.com/org/repo/-/merge_requests/{iid}"),
            "project_id": 55
        })
    }

    pub(crate) fn project_json() -> serde_json::Value {
        serde_json::json!({
            "id": 55,
            "name": "repo",
            "path_with_namespace": "org/repo",
            "visibility": "private"
        })
    }

    fn client(responses: Vec<Result<ApiResponse, TransportError>>) -> GitLabClient<ScriptedTransport> {
        GitLabClient::new("https://gitlab.com/", "glpat-secret", ScriptedTransport::new(responses))
    }

    fn locator() -> ResourceLocator {
        crate::mr::parse_mr_url("https://gitlab.com/org/sub/repo/-/merge_requests/10").unwrap()
    }

    fn loaded_mr(state: &str) -> MergeRequest {
        serde_json::from_value::<MergeRequestResponse>(mr_json(10, state))
            .unwrap()
            .into_merge_request()
    }

    #[test]
    fn test_api_base_trims_slash() {
        let client = client(vec![]);
        assert_eq!(client.api_base(), "https://gitlab.com/api/v4");
    }

    #[tokio::test]
    async fn test_fetch_falls_through_to_third_candidate() {
        let client = client(vec![
            status(404, r#"{"message":"404 Project Not Found"}"#),
            status(404, r#"{"message":"404 Project Not Found"}"#),
            ok(mr_json(10, "opened")),
            ok(mr_json(99, "opened")),
        ]);

        let mr = client.fetch_merge_request(&locator()).await.unwrap();
        assert_eq!(mr.iid, 10);

        let urls = client.transport.urls();
        assert_eq!(
            urls,
            vec![
                "https://gitlab.com/api/v4/projects/org%2Fsub%2Frepo/merge_requests/10",
                "https://gitlab.com/api/v4/projects/org%252Fsub%252Frepo/merge_requests/10",
                "https://gitlab.com/api/v4/projects/org%2Fsub%2Frepo/merge_requests/10",
            ]
        );
    }

    #[tokio::test]
    async fn test_fetch_aborts_on_unauthorized() {
        let client = client(vec![
            status(404, "{}"),
            status(401, r#"{"message":"401 Unauthorized"}"#),
            ok(mr_json(10, "opened")),
        ]);

        let result = client.fetch_merge_request(&locator()).await;
        assert_eq!(result, Err(MrError::Unauthorized));
        assert_eq!(client.transport.urls().len(), 2);
    }

    #[tokio::test]
    async fn test_fetch_returns_last_error_after_exhaustion() {
        let client = client(vec![
            status(500, "oops"),
            Err(TransportError("connection reset".to_string())),
            status(404, r#"{"message":"404 Project Not Found"}"#),
            status(404, r#"{"message":"404 Merge Request Not Found"}"#),
        ]);

        let result = client.fetch_merge_request(&locator()).await;
        assert_eq!(
            result,
            Err(MrError::NotFound {
                target: NotFoundTarget::MergeRequest,
                message: Some("404 Merge Request Not Found".to_string()),
            })
        );
        assert_eq!(client.transport.urls().len(), 4);
    }

    #[tokio::test]
    async fn test_fetch_keeps_http_error_when_last() {
        let client = client(vec![
            status(404, "not json"),
            status(404, "not json"),
            status(404, "not json"),
            status(502, "Bad Gateway"),
        ]);
        let result = client.fetch_merge_request(&locator()).await;
        assert_eq!(result, Err(MrError::HttpError { status: 502, message: None }));
    }

    #[tokio::test]
    async fn test_requests_carry_private_token() {
        let client = client(vec![ok(mr_json(10, "opened"))]);
        client.fetch_merge_request(&locator()).await.unwrap();

        let requests = client.transport.requests.lock().unwrap();
        assert_eq!(requests[0].method, Method::Get);
        assert!(requests[0]
            .headers
            .contains(&("PRIVATE-TOKEN".to_string(), "glpat-secret".to_string())));
        assert!(requests[0].body.is_none());
    }

    #[tokio::test]
    async fn test_view_probes_before_fetch() {
        let client = client(vec![ok(project_json()), ok(mr_json(10, "opened"))]);
        let mr = client.view(&locator()).await.unwrap();
        assert_eq!(mr.project_id, 55);

        let urls = client.transport.urls();
        assert_eq!(urls[0], "https://gitlab.com/api/v4/projects/org%2Fsub%2Frepo");
        assert_eq!(urls.len(), 2);
    }

    #[tokio::test]
    async fn test_view_stops_when_project_inaccessible() {
        let client = client(vec![status(404, "{}"), ok(mr_json(10, "opened"))]);
        let result = client.view(&locator()).await;
        assert_eq!(
            result,
            Err(MrError::ProjectInaccessible {
                project: "org/sub/repo".to_string()
            })
        );
        assert_eq!(client.transport.urls().len(), 1);
    }

    #[tokio::test]
    async fn test_probe_network_failure_is_inaccessible() {
        let client = client(vec![Err(TransportError("dns".to_string()))]);
        let result = client.probe_project("org/repo").await;
        assert!(matches!(result, Err(MrError::ProjectInaccessible { .. })));
    }

    #[tokio::test]
    async fn test_secondary_endpoints_use_numeric_project_id() {
        let mr = loaded_mr("opened");
        let client = client(vec![
            ok(serde_json::json!({ "id": 1, "username": "alice", "name": "Alice" })),
            ok(serde_json::json!({ "approved_by": [], "approvals_required": 1 })),
            ok(serde_json::json!([
                { "body": "nice", "author": { "name": "Bob" }, "system": false },
                { "body": "added 1 commit", "author": { "name": "Bob" }, "system": true }
            ])),
            ok(serde_json::json!({ "changes": [ { "new_path": "a.rs", "diff": "+x\n" } ] })),
        ]);

        assert_eq!(client.current_user().await.unwrap().username, "alice");
        assert_eq!(client.approval_state(&mr).await.unwrap().approvals_required, 1);
        let comments = client.comments(&mr).await.unwrap();
        assert_eq!(comments.len(), 2);
        assert!(comments[1].system);
        assert_eq!(client.changes(&mr).await.unwrap()[0].path, "a.rs");

        let urls = client.transport.urls();
        assert_eq!(urls[0], "https://gitlab.com/api/v4/user");
        assert_eq!(urls[1], "https://gitlab.com/api/v4/projects/55/merge_requests/10/approvals");
        assert_eq!(urls[2], "https://gitlab.com/api/v4/projects/55/merge_requests/10/notes");
        assert_eq!(urls[3], "https://gitlab.com/api/v4/projects/55/merge_requests/10/changes");
    }

    #[tokio::test]
    async fn test_approve_surfaces_service_message() {
        let mr = loaded_mr("opened");
        let client = client(vec![status(403, r#"{"message":"You cannot approve your own merge request."}"#)]);
        let result = client.approve(&mr).await;
        assert_eq!(
            result,
            Err(MrError::HttpError {
                status: 403,
                message: Some("You cannot approve your own merge request.".to_string()),
            })
        );
    }

    #[tokio::test]
    async fn test_unapprove_generic_failure_keeps_status() {
        let mr = loaded_mr("opened");
        let client = client(vec![status(500, "")]);
        let err = client.unapprove(&mr).await.unwrap_err();
        assert_eq!(err.to_string(), "HTTP 500: request failed");
        let requests = client.transport.requests.lock().unwrap();
        assert_eq!(requests[0].method, Method::Post);
        assert!(requests[0].url.ends_with("/merge_requests/10/unapprove"));
    }

    #[tokio::test]
    async fn test_add_comment_posts_json_body() {
        let mr = loaded_mr("opened");
        let client = client(vec![ok(serde_json::json!({
            "body": "Looks good",
            "author": { "name": "Alice" },
            "created_at": "2024-03-03T12:00:00Z",
            "system": false
        }))]);

        let comment = client.add_comment(&mr, "  Looks good \n").await.unwrap();
        assert_eq!(comment.author_name, "Alice");

        let requests = client.transport.requests.lock().unwrap();
        assert_eq!(requests[0].body, Some(serde_json::json!({ "body": "Looks good" })));
        assert!(requests[0]
            .headers
            .contains(&("Content-Type".to_string(), "application/json".to_string())));
    }

    #[tokio::test]
    async fn test_blank_comment_is_rejected_locally() {
        let mr = loaded_mr("opened");
        let client = client(vec![]);
        let result = client.add_comment(&mr, "   ").await;
        assert!(matches!(result, Err(MrError::ValidationError(_))));
        assert!(client.transport.urls().is_empty());
    }

    #[tokio::test]
    async fn test_mergeability_fails_open_on_network_error() {
        let mr = loaded_mr("opened");
        let client = client(vec![Err(TransportError("timeout".to_string()))]);
        let check = client.check_mergeability(&mr).await;
        assert!(check.can_merge);
        assert_eq!(check, MergeCheck::fail_open());
    }

    #[tokio::test]
    async fn test_mergeability_fails_open_on_error_status() {
        let mr = loaded_mr("opened");
        let client = client(vec![status(500, "")]);
        assert!(client.check_mergeability(&mr).await.can_merge);
    }

    #[tokio::test]
    async fn test_merge_blocked_by_preflight() {
        let mr = loaded_mr("opened");
        let mut fresh = mr_json(10, "opened");
        fresh["has_conflicts"] = serde_json::json!(true);
        let client = client(vec![ok(fresh)]);

        let result = client.merge(&mr).await;
        assert_eq!(
            result,
            Err(MrError::MergeBlocked {
                reason: "Merge conflicts must be resolved".to_string()
            })
        );
        assert_eq!(client.transport.urls().len(), 1);
    }

    #[tokio::test]
    async fn test_merge_method_fallback_order() {
        let mr = loaded_mr("opened");
        let client = client(vec![
            ok(mr_json(10, "opened")),
            status(405, ""),
            status(405, ""),
            ok(mr_json(10, "merged")),
        ]);

        let merged = client.merge(&mr).await.unwrap();
        assert_eq!(merged.state, MergeRequestState::Merged);

        let requests = client.transport.requests.lock().unwrap();
        let attempts: Vec<(Method, Option<serde_json::Value>)> = requests[1..]
            .iter()
            .map(|r| (r.method, r.body.clone()))
            .collect();
        assert_eq!(
            attempts,
            vec![
                (Method::Put, None),
                (Method::Put, Some(serde_json::json!({}))),
                (Method::Post, None),
            ]
        );
        assert!(requests[1].url.ends_with("/projects/55/merge_requests/10/merge"));
    }

    #[tokio::test]
    async fn test_merge_proceeds_when_preflight_fails() {
        let mr = loaded_mr("opened");
        let client = client(vec![
            Err(TransportError("connection refused".to_string())),
            ok(mr_json(10, "merged")),
        ]);
        let merged = client.merge(&mr).await.unwrap();
        assert_eq!(merged.state, MergeRequestState::Merged);
    }

    #[tokio::test]
    async fn test_merge_all_methods_not_allowed() {
        let mr = loaded_mr("opened");
        let client = client(vec![
            ok(mr_json(10, "opened")),
            status(405, ""),
            status(405, ""),
            status(405, ""),
        ]);
        let err = client.merge(&mr).await.unwrap_err();
        assert!(matches!(err, MrError::HttpError { status: 405, .. }));
        assert_eq!(client.transport.urls().len(), 4);
    }

    #[tokio::test]
    async fn test_merge_non_405_failure_stops_fallback() {
        let mr = loaded_mr("opened");
        let client = client(vec![
            ok(mr_json(10, "opened")),
            status(406, r#"{"message":"Branch cannot be merged"}"#),
            ok(mr_json(10, "merged")),
        ]);
        let err = client.merge(&mr).await.unwrap_err();
        assert_eq!(
            err,
            MrError::MergeBlocked {
                reason: "Branch cannot be merged".to_string()
            }
        );
        assert_eq!(client.transport.urls().len(), 2);
    }

    #[tokio::test]
    async fn test_merge_with_check_skips_second_preflight() {
        let mr = loaded_mr("opened");
        let client = client(vec![ok(mr_json(10, "merged"))]);

        let merged = client.merge_with_check(&mr, &MergeCheck::ready()).await.unwrap();
        assert_eq!(merged.state, MergeRequestState::Merged);

        let requests = client.transport.requests.lock().unwrap();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].method, Method::Put);
    }

    #[tokio::test]
    async fn test_merge_with_blocked_check_sends_nothing() {
        let mr = loaded_mr("opened");
        let client = client(vec![ok(mr_json(10, "merged"))]);
        let check = assess_mergeability(&crate::mr::MergeSignals {
            draft: true,
            ..Default::default()
        });

        let result = client.merge_with_check(&mr, &check).await;
        assert_eq!(
            result,
            Err(MrError::MergeBlocked {
                reason: "Remove draft status first".to_string()
            })
        );
        assert!(client.transport.urls().is_empty());
    }

    #[tokio::test]
    async fn test_merge_refuses_terminal_states_without_network() {
        for state in ["merged", "closed"] {
            let client = client(vec![]);
            let result = client.merge(&loaded_mr(state)).await;
            assert_eq!(
                result,
                Err(MrError::MergeBlocked {
                    reason: format!("this merge request is {state}")
                })
            );
            assert!(client.transport.urls().is_empty());
        }
    }
}
