pub mod format;

use colored::Colorize;
use std::fmt::Write as _;
use std::path::Path;
use thiserror::Error;
use tracing::{debug, instrument};

use crate::mr::diff::{DiffSummary, FileDiff, LineKind};
use crate::mr::{MergeRequestState, ProjectInfo, ResourceLocator};
use crate::projector::{ApprovalSummary, Control, Eligibility, MergeCheck};
use crate::session::{MergeRequestView, Secondary};
use format::{format_date, render_inline};

#[derive(Debug, Error)]
pub enum ReportError {
    #[error("Failed to write report file: {0}")]
    FileWrite(#[from] std::io::Error),
}

/// Output the view to the terminal (default) or to a markdown file.
#[instrument(skip(view), fields(iid = view.merge_request.iid))]
pub fn output(view: &MergeRequestView, output_path: Option<&Path>) -> Result<(), ReportError> {
    match output_path {
        None => {
            debug!("writing merge request to terminal");
            print_terminal_view(view);
            Ok(())
        }
        Some(path) => {
            debug!(path = %path.display(), "writing merge request to file");
            std::fs::write(path, markdown_view(view))?;
            Ok(())
        }
    }
}

/// Print the merge request, its approval status, available actions,
/// comments and (if loaded) changes.
///
/// !10: "Add login"
/// opened | Alice | feature → main
/// Created: Mar 1, 2024, 10:15 | Updated: Mar 2, 2024, 08:00
fn print_terminal_view(view: &MergeRequestView) {
    let mr = &view.merge_request;
    println!();
    println!("!{}: \"{}\"", mr.iid, mr.title.bold());
    println!(
        "{} | {} | {} → {}",
        colorize_state(mr.state),
        mr.author_name,
        mr.source_branch.cyan(),
        mr.target_branch.cyan()
    );
    println!(
        "Created: {} | Updated: {}",
        format_date(mr.created_at.as_ref()),
        format_date(mr.updated_at.as_ref())
    );
    println!("{}", mr.web_url.dimmed());
    println!();

    match &mr.description {
        Some(description) => {
            for line in description.lines() {
                println!("  {}", render_inline(line));
            }
        }
        None => println!("  {}", "No description provided".italic()),
    }
    println!();

    let eligibility = view.eligibility();
    println!("═══ Approvals ═══");
    println!("{}", summary_line(&eligibility.summary));
    println!("{}", actions_line(&eligibility));
    println!();

    print_comments(view);

    if let Some(changes) = &view.changes {
        print_changes(changes);
    }
}

fn print_comments(view: &MergeRequestView) {
    println!("═══ Comments ═══");
    match &view.comments {
        Secondary::Unavailable(reason) => {
            println!("  {}", format!("Comments unavailable: {reason}").dimmed());
        }
        Secondary::Loaded(all) if all.is_empty() => println!("  {}", "No comments yet.".italic()),
        Secondary::Loaded(_) => {
            for comment in view.visible_comments() {
                println!(
                    "  {} {}",
                    comment.author_name.bold(),
                    format_date(comment.created_at.as_ref()).dimmed()
                );
                for line in comment.body.lines() {
                    println!("    {}", render_inline(line));
                }
            }
        }
    }
    println!();
}

/// Print the changes summary and each file's classified diff lines.
pub fn print_changes(changes: &DiffSummary) {
    println!(
        "═══ Changes: {} file(s) changed, {}, {} ═══",
        changes.files_changed(),
        format!("+{} additions", changes.additions).green(),
        format!("-{} deletions", changes.deletions).red()
    );
    for file in &changes.files {
        println!();
        println!("{}{}", file.path.bold(), file_badge(file));
        if file.is_binary() {
            println!("  {}", "Binary file or no changes to display".italic());
            continue;
        }
        for line in &file.lines {
            let number = match line.kind {
                LineKind::HunkMarker => String::new(),
                _ => line.line_number.to_string(),
            };
            let text = match line.kind {
                LineKind::Added => line.text.green(),
                LineKind::Removed => line.text.red(),
                LineKind::HunkMarker => line.text.cyan(),
                LineKind::Context => line.text.normal(),
            };
            println!("{:>5} {}", number.dimmed(), text);
        }
    }
    println!();
}

pub fn print_project(project: &ProjectInfo) {
    println!("{} Access confirmed for project \"{}\"", "✓".green(), project.path_with_namespace);
    println!(
        "  Name: {} | ID: {} | Visibility: {}",
        project.name,
        project.id,
        project.visibility.as_deref().unwrap_or("unknown")
    );
}

pub fn print_locator(locator: &ResourceLocator, candidates: &[String]) {
    println!("Project path: {}", locator.project_path_string());
    println!("Merge request: {}", locator.request_number);
    println!("Path segments: {}", locator.project_path.join(", "));
    println!("Encodings tried, in order:");
    for (index, candidate) in candidates.iter().enumerate() {
        println!("  {}. {}", index + 1, candidate);
    }
}

pub fn print_merge_check(check: &MergeCheck) {
    let verdict = if check.can_merge {
        "can merge".green().bold()
    } else {
        "blocked".red().bold()
    };
    println!("Merge status: {} ({})", verdict, check.reason);
}

pub fn print_success(message: &str) {
    println!("{} {}", "✓".green().bold(), message);
}

pub fn print_error(error: &dyn std::error::Error) {
    eprintln!("{} {}", "Error:".red().bold(), error);
}

fn summary_line(summary: &ApprovalSummary) -> String {
    match summary {
        ApprovalSummary::Merged => format!("{} Merge request is merged", "✓".green()),
        ApprovalSummary::Closed => format!("{} Merge request is closed", "✗".red()),
        ApprovalSummary::ApprovedBy(names) => {
            format!("{} Approved by: {}", "✓".green(), names.join(", "))
        }
        ApprovalSummary::Required(count) => format!("Requires {count} approval(s)"),
        ApprovalSummary::NoneRequired => "No approvals required".to_string(),
        ApprovalSummary::Unavailable => "Approval status unavailable".dimmed().to_string(),
    }
}

fn actions_line(eligibility: &Eligibility) -> String {
    let mut parts = Vec::new();
    let mut push = |label: &str, control: Control| {
        if !control.is_visible() {
            return;
        }
        let styled = if control == Control::Disabled {
            label.dimmed().strikethrough()
        } else {
            label.bold()
        };
        parts.push(styled.to_string());
    };
    push("approve", eligibility.approve);
    let unapprove_label = match eligibility.unapprove {
        Control::Disabled => "unapprove (cannot unapprove others)",
        _ => "unapprove",
    };
    push(unapprove_label, eligibility.unapprove);
    push(eligibility.merge_label, eligibility.merge);
    format!("Actions: {}", parts.join(" | "))
}

fn file_badge(file: &FileDiff) -> &'static str {
    if file.new_file {
        " (new)"
    } else if file.deleted_file {
        " (deleted)"
    } else if file.renamed_file {
        " (renamed)"
    } else {
        ""
    }
}

/// Helper to colorize a state for terminal output.
fn colorize_state(state: MergeRequestState) -> colored::ColoredString {
    match state {
        MergeRequestState::Opened => "opened".green().bold(),
        MergeRequestState::Merged => "merged".blue().bold(),
        MergeRequestState::Closed => "closed".red().bold(),
        MergeRequestState::Locked => "locked".yellow().bold(),
    }
}

/// Render the view as markdown.
///
/// # !10: "Add login"
/// **State:** opened | **Author:** Alice | **Branches:** `feature` → `main`
///
/// ## Approvals
/// ## Comments
/// ## Changes
fn markdown_view(view: &MergeRequestView) -> String {
    let mr = &view.merge_request;
    let mut md = String::new();
    let _ = writeln!(md, "# !{}: \"{}\"\n", mr.iid, mr.title);
    let _ = writeln!(
        md,
        "**State:** {} | **Author:** {} | **Branches:** `{}` → `{}`\n",
        mr.state, mr.author_name, mr.source_branch, mr.target_branch
    );
    let _ = writeln!(
        md,
        "**Created:** {} | **Updated:** {}\n",
        format_date(mr.created_at.as_ref()),
        format_date(mr.updated_at.as_ref())
    );
    let _ = writeln!(md, "<{}>\n", mr.web_url);
    md.push_str(mr.description.as_deref().unwrap_or("*No description provided*"));
    md.push_str("\n\n## Approvals\n\n");

    let summary = match &view.eligibility().summary {
        ApprovalSummary::Merged => "Merge request is merged".to_string(),
        ApprovalSummary::Closed => "Merge request is closed".to_string(),
        ApprovalSummary::ApprovedBy(names) => format!("Approved by: {}", names.join(", ")),
        ApprovalSummary::Required(count) => format!("Requires {count} approval(s)"),
        ApprovalSummary::NoneRequired => "No approvals required".to_string(),
        ApprovalSummary::Unavailable => "Approval status unavailable".to_string(),
    };
    let _ = writeln!(md, "{summary}\n");

    md.push_str("## Comments\n\n");
    match &view.comments {
        Secondary::Unavailable(reason) => {
            let _ = writeln!(md, "_Comments unavailable: {reason}_\n");
        }
        Secondary::Loaded(all) if all.is_empty() => md.push_str("_No comments yet._\n\n"),
        Secondary::Loaded(_) => {
            for comment in view.visible_comments() {
                let _ = writeln!(
                    md,
                    "- **{}** ({}): {}",
                    comment.author_name,
                    format_date(comment.created_at.as_ref()),
                    comment.body.replace('\n', " ")
                );
            }
            md.push('\n');
        }
    }

    if let Some(changes) = &view.changes {
        let _ = writeln!(
            md,
            "## Changes\n\n{} file(s) changed, +{} additions, -{} deletions\n",
            changes.files_changed(),
            changes.additions,
            changes.deletions
        );
        for file in &changes.files {
            let _ = writeln!(md, "### `{}`{}\n", file.path, file_badge(file));
            if file.is_binary() {
                md.push_str("_Binary file or no changes to display_\n\n");
                continue;
            }
            md.push_str("```diff\n");
            for line in &file.lines {
                md.push_str(&line.text);
                md.push('\n');
            }
            md.push_str("```\n\n");
        }
    }

    md
}
