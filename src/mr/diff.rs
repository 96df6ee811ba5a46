use super::types::ChangedFile;

/// Classification of a single line of unified diff text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineKind {
    Added,
    Removed,
    Context,
    HunkMarker,
}

/// One classified diff line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiffLine {
    /// 1-based position within the file's diff text (display only, not a source line)
    pub line_number: usize,
    pub kind: LineKind,
    pub text: String,
}

/// A changed file with its classified lines.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileDiff {
    pub path: String,
    pub new_file: bool,
    pub deleted_file: bool,
    pub renamed_file: bool,
    /// Lines added in this file
    pub additions: usize,
    /// Lines removed in this file
    pub deletions: usize,
    /// Empty when the service sent no textual diff (binary files)
    pub lines: Vec<DiffLine>,
}

impl FileDiff {
    pub fn is_binary(&self) -> bool {
        self.lines.is_empty()
    }
}

/// Line-classified view of every file in a merge request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DiffSummary {
    pub files: Vec<FileDiff>,
    /// Total lines added across all files
    pub additions: usize,
    /// Total lines removed across all files
    pub deletions: usize,
}

impl DiffSummary {
    pub fn files_changed(&self) -> usize {
        self.files.len()
    }
}

/// Classify one line of unified diff text.
///
/// The `+++`/`---` file header markers are context, not changes.
pub fn classify_line(line: &str) -> LineKind {
    if line.starts_with('+') && !line.starts_with("+++") {
        LineKind::Added
    } else if line.starts_with('-') && !line.starts_with("---") {
        LineKind::Removed
    } else if line.starts_with("@@") {
        LineKind::HunkMarker
    } else {
        LineKind::Context
    }
}

/// Split one file's diff text into classified lines, preserving order.
pub fn parse_file_diff(file: &ChangedFile) -> FileDiff {
    let mut additions = 0;
    let mut deletions = 0;

    let lines: Vec<DiffLine> = file
        .diff
        .lines()
        .enumerate()
        .map(|(index, text)| {
            let kind = classify_line(text);
            match kind {
                LineKind::Added => additions += 1,
                LineKind::Removed => deletions += 1,
                LineKind::Context | LineKind::HunkMarker => {}
            }
            DiffLine {
                line_number: index + 1,
                kind,
                text: text.to_string(),
            }
        })
        .collect();

    FileDiff {
        path: file.path.clone(),
        new_file: file.new_file,
        deleted_file: file.deleted_file,
        renamed_file: file.renamed_file,
        additions,
        deletions,
        lines,
    }
}

/// Summarize every changed file of a merge request.
pub fn summarize(files: &[ChangedFile]) -> DiffSummary {
    let files: Vec<FileDiff> = files.iter().map(parse_file_diff).collect();
    let additions = files.iter().map(|f| f.additions).sum();
    let deletions = files.iter().map(|f| f.deletions).sum();

    DiffSummary {
        files,
        additions,
        deletions,
    }
}
