//! Derives what the user may do with the loaded merge request.
//!
//! Everything here is a pure function of already-fetched data; the service
//! stays the authority and rejects anything it does not allow.

use crate::mr::{ApprovalState, Approver, CurrentUser, MergeRequestState, MergeSignals};

/// How an action control should be presented.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Control {
    Hidden,
    Disabled,
    Enabled,
}

impl Control {
    pub fn is_visible(self) -> bool {
        self != Control::Hidden
    }
}

/// One-line approval status for display.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApprovalSummary {
    Merged,
    Closed,
    /// Display names of the approvers, in service order
    ApprovedBy(Vec<String>),
    Required(u32),
    NoneRequired,
    /// The approval status could not be fetched
    Unavailable,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Eligibility {
    pub approve: Control,
    pub unapprove: Control,
    pub merge: Control,
    pub merge_label: &'static str,
    pub summary: ApprovalSummary,
}

/// Compute action eligibility from the request state, its approvals and the
/// current user. `None` means the data could not be fetched.
pub fn project(
    state: MergeRequestState,
    approvals: Option<&ApprovalState>,
    user: Option<&CurrentUser>,
) -> Eligibility {
    match state {
        MergeRequestState::Merged => {
            return terminal("Already Merged", ApprovalSummary::Merged);
        }
        MergeRequestState::Closed => {
            return terminal("MR Closed", ApprovalSummary::Closed);
        }
        MergeRequestState::Opened | MergeRequestState::Locked => {}
    }

    let open = |approve, unapprove, summary| Eligibility {
        approve,
        unapprove,
        merge: Control::Enabled,
        merge_label: "Merge MR",
        summary,
    };

    let Some(approvals) = approvals else {
        return open(Control::Enabled, Control::Hidden, ApprovalSummary::Unavailable);
    };

    if !approvals.approved_by.is_empty() {
        let names = approvals.approved_by.iter().map(|a| a.name.clone()).collect();
        let own_approval = user.and_then(|user| find_own_approval(approvals, user));
        return match own_approval {
            Some(_) => open(Control::Hidden, Control::Enabled, ApprovalSummary::ApprovedBy(names)),
            // Others' approvals cannot be revoked, but more approvals are allowed
            None => open(Control::Enabled, Control::Disabled, ApprovalSummary::ApprovedBy(names)),
        };
    }

    if approvals.approvals_required > 0 {
        open(
            Control::Enabled,
            Control::Hidden,
            ApprovalSummary::Required(approvals.approvals_required),
        )
    } else {
        open(Control::Enabled, Control::Hidden, ApprovalSummary::NoneRequired)
    }
}

fn terminal(merge_label: &'static str, summary: ApprovalSummary) -> Eligibility {
    Eligibility {
        approve: Control::Hidden,
        unapprove: Control::Hidden,
        merge: Control::Disabled,
        merge_label,
        summary,
    }
}

/// Find the current user's entry among the approvers.
/// Matched by username first, then numeric id, then email.
pub fn find_own_approval<'a>(approvals: &'a ApprovalState, user: &CurrentUser) -> Option<&'a Approver> {
    let approvers = &approvals.approved_by;
    approvers
        .iter()
        .find(|a| a.username == user.username)
        .or_else(|| approvers.iter().find(|a| a.id == user.id))
        .or_else(|| {
            let email = user.email.as_deref()?;
            approvers.iter().find(|a| a.email.as_deref() == Some(email))
        })
}

/// Result of the advisory pre-merge check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeCheck {
    pub can_merge: bool,
    pub reason: String,
}

impl MergeCheck {
    fn blocked(reason: &str) -> Self {
        Self {
            can_merge: false,
            reason: reason.to_string(),
        }
    }

    pub fn ready() -> Self {
        Self {
            can_merge: true,
            reason: "Ready to merge".to_string(),
        }
    }

    /// Used when the check itself could not complete. Never blocks a merge.
    pub fn fail_open() -> Self {
        Self {
            can_merge: true,
            reason: "Status check failed, attempting merge".to_string(),
        }
    }
}

/// Classify the mergeability fields of a freshly fetched merge request.
pub fn assess_mergeability(signals: &MergeSignals) -> MergeCheck {
    if signals.merge_status.as_deref() == Some("cannot_be_merged") {
        return MergeCheck::blocked("Merge conflicts detected");
    }
    if signals.has_conflicts {
        return MergeCheck::blocked("Merge conflicts must be resolved");
    }
    if signals.work_in_progress || signals.draft {
        return MergeCheck::blocked("Remove draft status first");
    }
    match signals.pipeline_status.as_deref() {
        Some("failed") => return MergeCheck::blocked("Pipeline failed"),
        Some("running") => return MergeCheck::blocked("Pipeline is still running"),
        _ => {}
    }
    // Newer instances may report only the detailed status
    match signals.detailed_merge_status.as_deref() {
        Some("conflict") => MergeCheck::blocked("Merge conflicts must be resolved"),
        Some("broken_status") => MergeCheck::blocked("Source branch cannot be merged cleanly"),
        Some("draft_status") => MergeCheck::blocked("Remove draft status first"),
        Some("ci_still_running") => MergeCheck::blocked("Pipeline is still running"),
        _ => MergeCheck::ready(),
    }
}
