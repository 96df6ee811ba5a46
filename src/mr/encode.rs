/// Percent-encode a project path as a single URI component (`a/b` -> `a%2Fb`).
pub fn standard_encoding(project_path: &str) -> String {
    urlencoding::encode(project_path).into_owned()
}

/// Build the ordered list of project path encodings to try against the API.
///
/// GitLab deployments (and the proxies in front of them) normalise encoded
/// slashes differently, so the same path is offered four ways, highest
/// priority first:
///   1. standard component encoding (`a/b` -> `a%2Fb`)
///   2. the standard encoding encoded again (`a%252Fb`)
///   3. literal `/` -> `%2F` replacement, other characters untouched
///   4. literal `/` -> `%252F` replacement
pub fn encoding_candidates(project_path: &str) -> Vec<String> {
    let standard = standard_encoding(project_path);
    let double = urlencoding::encode(&standard).into_owned();

    vec![
        standard,
        double,
        project_path.replace('/', "%2F"),
        project_path.replace('/', "%252F"),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_candidates_for_simple_path() {
        let candidates = encoding_candidates("a/b");
        assert_eq!(candidates, vec!["a%2Fb", "a%252Fb", "a%2Fb", "a%252Fb"]);
    }

    #[test]
    fn test_candidates_for_nested_path() {
        let candidates = encoding_candidates("chegginc/security/safe/iac/iac-sonic-workbench-service");
        assert_eq!(candidates.len(), 4);
        assert_eq!(
            candidates[0],
            "chegginc%2Fsecurity%2Fsafe%2Fiac%2Fiac-sonic-workbench-service"
        );
        assert_eq!(
            candidates[3],
            "chegginc%252Fsecurity%252Fsafe%252Fiac%252Fiac-sonic-workbench-service"
        );
    }

    #[test]
    fn test_manual_candidates_leave_other_characters() {
        let candidates = encoding_candidates("my group/repo");
        assert_eq!(candidates[0], "my%20group%2Frepo");
        assert_eq!(candidates[1], "my%2520group%252Frepo");
        assert_eq!(candidates[2], "my group%2Frepo");
        assert_eq!(candidates[3], "my group%252Frepo");
    }

    #[test]
    fn test_candidates_are_stable() {
        assert_eq!(encoding_candidates("x/y/z"), encoding_candidates("x/y/z"));
    }
}
