// Lifecycle commands embedded in a sample's README.md
//
// A fenced code block directly preceded by the marker line
//
//     [//]: # ({sst-run-unix})
//
// is run instead of the default build and deploy steps. Lines ending in a
// backslash are joined with the next one; blank lines and `#` comments are
// skipped.

use std::path::Path;
use thiserror::Error;

pub const README_FILE: &str = "README.md";
pub const RUN_MARKER: &str = "[//]: # ({sst-run-unix})";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ReadmeError {
    #[error("line {line}: lifecycle marker is not followed by a code block")]
    MarkerWithoutBlock { line: usize },

    #[error("line {line}: lifecycle code block is never closed")]
    UnclosedBlock { line: usize },

    #[error("lifecycle marker found but the marked blocks contain no commands")]
    NoCommands,
}

/// Whether the README in `sample_dir` carries lifecycle markers
pub fn has_run_marker(sample_dir: &Path) -> bool {
    std::fs::read_to_string(sample_dir.join(README_FILE))
        .map(|content| content.lines().any(|l| l.trim() == RUN_MARKER))
        .unwrap_or(false)
}

/// Extract the marked commands from README content.
///
/// Returns Ok(None) if the README has no marker.
pub fn parse_commands(content: &str) -> Result<Option<Vec<String>>, ReadmeError> {
    let lines: Vec<&str> = content.lines().collect();
    let mut commands = Vec::new();
    let mut found_marker = false;
    let mut i = 0;

    while i < lines.len() {
        if lines[i].trim() != RUN_MARKER {
            i += 1;
            continue;
        }
        found_marker = true;
        let marker_line = i + 1;

        // Skip blank lines between the marker and the fence
        i += 1;
        while i < lines.len() && lines[i].trim().is_empty() {
            i += 1;
        }
        let Some(fence) = lines.get(i).map(|l| l.trim()).filter(|l| l.starts_with("```")) else {
            return Err(ReadmeError::MarkerWithoutBlock { line: marker_line });
        };
        let fence_len = fence.chars().take_while(|&c| c == '`').count();
        let fence_line = i + 1;
        i += 1;

        let mut pending = String::new();
        let mut closed = false;
        while i < lines.len() {
            let line = lines[i].trim();
            i += 1;

            if line.starts_with("```") && line.chars().take_while(|&c| c == '`').count() >= fence_len
            {
                closed = true;
                break;
            }
            if pending.is_empty() && (line.is_empty() || line.starts_with('#')) {
                continue;
            }

            if let Some(continued) = line.strip_suffix('\\') {
                pending.push_str(continued.trim_end());
                pending.push(' ');
            } else {
                pending.push_str(line);
                commands.push(std::mem::take(&mut pending).trim().to_string());
            }
        }

        if !closed {
            return Err(ReadmeError::UnclosedBlock { line: fence_line });
        }
        if !pending.trim().is_empty() {
            commands.push(pending.trim().to_string());
        }
    }

    if !found_marker {
        return Ok(None);
    }
    if commands.is_empty() {
        return Err(ReadmeError::NoCommands);
    }
    Ok(Some(commands))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_marker() {
        let readme = "# Hello\n\n```sh\ngcloud run deploy\n```\n";
        assert_eq!(parse_commands(readme), Ok(None));
    }

    #[test]
    fn test_marked_block_with_continuations() {
        let readme = r#"# Hello world

Build and deploy:

[//]: # ({sst-run-unix})
```sh
# Build the image
gcloud builds submit \
    --tag "${SAMPLE_IMAGE}"

gcloud run deploy "${SAMPLE_SERVICE}" \
    --image "${SAMPLE_IMAGE}" \
    --region "${SAMPLE_REGION}"
```

This block is documentation only:

```sh
rm -rf /
```
"#;

        let commands = parse_commands(readme).unwrap().unwrap();
        assert_eq!(
            commands,
            vec![
                r#"gcloud builds submit --tag "${SAMPLE_IMAGE}""#.to_string(),
                r#"gcloud run deploy "${SAMPLE_SERVICE}" --image "${SAMPLE_IMAGE}" --region "${SAMPLE_REGION}""#
                    .to_string(),
            ]
        );
    }

    #[test]
    fn test_multiple_marked_blocks_keep_order() {
        let readme = "[//]: # ({sst-run-unix})\n\n```\necho one\n```\ntext\n[//]: # ({sst-run-unix})\n````bash\necho two\n```\nstill inside\n````\n";
        let commands = parse_commands(readme).unwrap().unwrap();
        assert_eq!(commands, vec!["echo one", "echo two", "```", "still inside"]);
    }

    #[test]
    fn test_marker_without_block() {
        let readme = "intro\n[//]: # ({sst-run-unix})\nnot a fence\n";
        assert_eq!(
            parse_commands(readme),
            Err(ReadmeError::MarkerWithoutBlock { line: 2 })
        );
    }

    #[test]
    fn test_unclosed_block() {
        let readme = "[//]: # ({sst-run-unix})\n```sh\necho hi\n";
        assert_eq!(
            parse_commands(readme),
            Err(ReadmeError::UnclosedBlock { line: 2 })
        );
    }

    #[test]
    fn test_marked_block_without_commands() {
        let readme = "[//]: # ({sst-run-unix})\n```sh\n# nothing to do\n\n```\n";
        assert_eq!(parse_commands(readme), Err(ReadmeError::NoCommands));
    }

    #[test]
    fn test_has_run_marker() {
        let dir = tempfile::tempdir().unwrap();
        assert!(!has_run_marker(dir.path()));

        std::fs::write(dir.path().join(README_FILE), "# Title\n").unwrap();
        assert!(!has_run_marker(dir.path()));

        std::fs::write(
            dir.path().join(README_FILE),
            "# Title\n[//]: # ({sst-run-unix})\n```\nls\n```\n",
        )
        .unwrap();
        assert!(has_run_marker(dir.path()));
    }
}
