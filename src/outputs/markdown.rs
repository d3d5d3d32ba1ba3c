//! Markdown outline of a snapshot.
//!
//! One section per post, in feed order, followed by its comment forest as a
//! nested list: each reply is indented one level below its parent and
//! listed before the parent's next sibling.
//!
//! ```text
//! ## Die Mitte & der Rand
//!
//! *www.zeit.de · 2 comments*
//! <https://www.zeit.de/politik/artikel>
//!
//! - **anna**: Erster
//!   - **bernd**: Antwort
//! ```

use crate::models::{Post, Snapshot};
use crate::tree::traverse;
use itertools::Itertools;
use std::fmt;

const HEADING_WIDTH: usize = 80;

/// Renders a snapshot as Markdown through [`fmt::Display`].
pub struct Outline<'a>(pub &'a Snapshot);

fn one_line(text: &str) -> String {
    text.split_whitespace().join(" ")
}

fn heading(post: &Post) -> String {
    let text = one_line(&post.text);
    if text.is_empty() {
        return post.identity().to_string();
    }
    match text.char_indices().nth(HEADING_WIDTH) {
        Some((cut, _)) => format!("{}…", &text[..cut]),
        None => text,
    }
}

fn byline(post: &Post, comments: usize) -> String {
    let mut parts: Vec<String> = Vec::new();
    if let Some(author) = &post.author_name {
        parts.push(author.clone());
    }
    if let Some(created) = &post.created_time {
        parts.push(created.clone());
    }
    if let Some(likes) = post.like_count {
        parts.push(format!("{likes} likes"));
    }
    if let Some(shares) = post.share_count {
        parts.push(format!("{shares} shares"));
    }
    parts.push(format!("{comments} comments"));
    parts.join(" · ")
}

impl fmt::Display for Outline<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let snapshot = self.0;
        writeln!(f, "# Run {}", snapshot.run_key)?;

        for post in &snapshot.posts {
            let comments = traverse(&post.comments).count();
            writeln!(f, "\n## {}\n", heading(post))?;
            writeln!(f, "*{}*", byline(post, comments))?;
            if let Some(url) = &post.source_url {
                writeln!(f, "<{url}>")?;
            }
            if comments > 0 {
                writeln!(f)?;
            }
            for (depth, comment) in traverse(&post.comments) {
                writeln!(
                    f,
                    "{}- **{}**: {}",
                    "  ".repeat(depth),
                    one_line(&comment.author_name),
                    one_line(&comment.text)
                )?;
            }
        }

        if !snapshot.failures.is_empty() {
            writeln!(f, "\n## Failed resources\n")?;
            for failure in &snapshot.failures {
                writeln!(f, "- `{}` ({}): {}", failure.resource, failure.kind, failure.cause)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Comment, Failure};

    fn comment(id: &str, author: &str, text: &str, replies: Vec<Comment>) -> Comment {
        Comment {
            id: id.to_string(),
            author_name: author.to_string(),
            text: text.to_string(),
            replies,
            ..Default::default()
        }
    }

    #[test]
    fn test_outline_nests_replies_depth_first() {
        let post = Post {
            source_url: Some("https://www.zeit.de/politik/artikel".to_string()),
            text: "Die Mitte & der Rand".to_string(),
            author_name: Some("www.zeit.de".to_string()),
            comments: vec![
                comment("1", "anna", "Erster", vec![comment("2", "bernd", "Ant-\nwort", vec![])]),
                comment("3", "carla", "Zweiter", vec![]),
            ],
            ..Default::default()
        };
        let snapshot = Snapshot {
            run_key: "2015-05-01T101500".to_string(),
            posts: vec![post],
            failures: vec![Failure {
                resource: "42".to_string(),
                kind: "transport".to_string(),
                cause: "HTTP 500".to_string(),
            }],
        };

        let md = Outline(&snapshot).to_string();
        let expected = "# Run 2015-05-01T101500\n\
            \n## Die Mitte & der Rand\n\n\
            *www.zeit.de · 3 comments*\n\
            <https://www.zeit.de/politik/artikel>\n\n\
            - **anna**: Erster\n\
            \x20\x20- **bernd**: Ant- wort\n\
            - **carla**: Zweiter\n\
            \n## Failed resources\n\n\
            - `42` (transport): HTTP 500\n";
        assert_eq!(md, expected);
    }

    #[test]
    fn test_long_titles_are_shortened_and_empty_ones_fall_back_to_identity() {
        let long = Post {
            id: Some("9".to_string()),
            text: "x".repeat(200),
            ..Default::default()
        };
        assert_eq!(heading(&long).chars().count(), HEADING_WIDTH + 1);
        let empty = Post {
            id: Some("9".to_string()),
            ..Default::default()
        };
        assert_eq!(heading(&empty), "9");
    }
}
