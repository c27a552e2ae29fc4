use regex::Regex;
use std::borrow::Cow;
use std::path::Path;
use std::sync::OnceLock;

/// Scrubs filesystem locations and credentials out of diagnostic text
/// before it reaches a caller.
#[derive(Debug, Clone, Default)]
pub struct RedactionPolicy {
    paths: Vec<String>,
    secrets: Vec<String>,
}

fn credential_pattern() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)\b(api[_-]?key|key|token|password|secret)(\s*[=:]\s*)[^\s&,;)\]]+").ok()
    })
    .as_ref()
}

impl RedactionPolicy {
    pub fn new() -> Self {
        Self::default()
    }

    /// Hides `path` and its parent directory.
    pub fn with_path(mut self, path: &Path) -> Self {
        let full = path.display().to_string();
        if !full.is_empty() {
            self.paths.push(full);
        }
        if let Some(parent) = path.parent() {
            let dir = parent.display().to_string();
            if dir.len() > 1 {
                self.paths.push(dir);
            }
        }
        // longest first so a file path is replaced before its directory
        self.paths.sort_by_key(|p| std::cmp::Reverse(p.len()));
        self
    }

    pub fn with_secret(mut self, secret: Option<&str>) -> Self {
        if let Some(s) = secret.filter(|s| s.len() >= 4) {
            self.secrets.push(s.to_string());
        }
        self
    }

    pub fn redact<'a>(&self, s: &'a str) -> Cow<'a, str> {
        let mut out: Cow<'a, str> = Cow::Borrowed(s);
        for secret in &self.secrets {
            if out.contains(secret.as_str()) {
                out = Cow::Owned(out.replace(secret.as_str(), "[REDACTED]"));
            }
        }
        for p in &self.paths {
            if out.contains(p.as_str()) {
                out = Cow::Owned(out.replace(p.as_str(), "<path>"));
            }
        }
        if let Some(re) = credential_pattern() {
            if re.is_match(&out) {
                out = Cow::Owned(re.replace_all(&out, "$1$2[REDACTED]").into_owned());
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clean_text_is_borrowed() {
        let p = RedactionPolicy::new().with_path(Path::new("/srv/data/app.db"));
        assert!(matches!(p.redact("no such column: nope"), Cow::Borrowed(_)));
    }

    #[test]
    fn paths_and_secrets_are_replaced() {
        let p = RedactionPolicy::new()
            .with_path(Path::new("/srv/data/app.db"))
            .with_secret(Some("sk-test-123456"));
        let out = p.redact("unable to open /srv/data/app.db (key sk-test-123456)");
        assert_eq!(out, "unable to open <path> (key [REDACTED])");

        let out = p.redact("file /srv/data/other.csv missing");
        assert_eq!(out, "file <path>/other.csv missing");
    }

    #[test]
    fn credential_assignments_are_masked() {
        let p = RedactionPolicy::new();
        let out = p.redact("request to https://host/v1?key=abc123 failed: password=hunter2");
        assert!(!out.contains("abc123"));
        assert!(!out.contains("hunter2"));
    }
}
