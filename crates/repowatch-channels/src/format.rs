//! Markdown rendering for an event batch.

use std::fmt::Write;

use repowatch_core::types::{Event, RepoIdentity};

const COMMIT_MESSAGE_MAX: usize = 100;

/// Title and body of a markdown chat message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MarkdownMessage {
    pub title: String,
    pub text: String,
}

/// Render `events` (oldest first) for a chat webhook.
/// At most `max_display` entries are listed; the rest are counted in a footer.
pub fn render_batch(repo: &RepoIdentity, events: &[Event], max_display: usize) -> MarkdownMessage {
    let title = format!("GitHub Monitor - {repo}");
    let mut text = String::new();

    if events.is_empty() {
        let _ = write!(text, "### GitHub Monitor - {repo}\n\nNo new events");
        return MarkdownMessage { title, text };
    }

    let _ = write!(
        text,
        "### GitHub Monitor\n\n**Repository**: [{repo}]({})\n\n**Events**: {}\n\n---\n\n",
        repo.html_url(),
        events.len()
    );

    for (idx, event) in events.iter().take(max_display).enumerate() {
        let _ = write!(
            text,
            "**{}. {}**\n\n- **Actor**: {}\n- **Time**: {}\n- **Details**: {}\n",
            idx + 1,
            event.event_type,
            event.actor,
            event.created_at.format("%Y-%m-%d %H:%M:%S UTC"),
            event.summary
        );
        if event.event_type == "PushEvent" {
            if let Some(msg) = event.first_commit_message() {
                let _ = writeln!(text, "- **Commit**: {}", truncate_chars(msg, COMMIT_MESSAGE_MAX));
            }
        } else {
            let _ = writeln!(text, "- **Link**: {}", event.url);
        }
        text.push('\n');
    }

    if events.len() > max_display {
        let _ = writeln!(
            text,
            "\n... {} more event(s) not shown",
            events.len() - max_display
        );
    }

    MarkdownMessage { title, text }
}

fn truncate_chars(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}
