//! Commit-message target directives

/// Extracts extra target names from commit messages.
///
/// A directive is a line starting with the marker followed by whitespace,
/// e.g. `JARVIS: build lint`. Every directive line contributes its targets,
/// in order; later lines append to earlier ones.
#[derive(Debug, Clone)]
pub struct TargetParser {
    marker: String,
}

impl TargetParser {
    pub fn new(marker: impl Into<String>) -> Self {
        Self {
            marker: marker.into(),
        }
    }

    pub fn parse(&self, message: &str) -> Vec<String> {
        let mut targets = Vec::new();
        if self.marker.is_empty() {
            return targets;
        }

        for line in message.lines() {
            let Some(rest) = line.strip_prefix(self.marker.as_str()) else {
                continue;
            };
            if !rest.starts_with(char::is_whitespace) {
                continue;
            }
            targets.extend(rest.split_whitespace().map(str::to_string));
        }

        targets
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(message: &str) -> Vec<String> {
        TargetParser::new("JARVIS:").parse(message)
    }

    #[test]
    fn directive_lines_accumulate() {
        let message = "Ship it\n\nJARVIS: build lint\nsome notes\nJARVIS: deploy\n";
        assert_eq!(parse(message), vec!["build", "lint", "deploy"]);
    }

    #[test]
    fn message_without_directive_has_no_targets() {
        assert!(parse("Fix typo in README").is_empty());
        assert!(parse("").is_empty());
    }

    #[test]
    fn marker_must_start_the_line_and_be_followed_by_space() {
        assert!(parse("  JARVIS: build").is_empty());
        assert!(parse("JARVIS:build").is_empty());
        assert!(parse("see JARVIS: build").is_empty());
    }

    #[test]
    fn repeated_whitespace_and_crlf_are_ignored() {
        assert_eq!(parse("JARVIS:   build\t lint  \r\n"), vec!["build", "lint"]);
    }

    #[test]
    fn empty_directive_contributes_nothing() {
        assert_eq!(parse("JARVIS: \nJARVIS: deploy"), vec!["deploy"]);
    }
}
