use serde::Deserialize;

use super::post::truncate;

/// A forgiving view of a comment (`t1`) or message (`t4`) payload.
#[derive(Deserialize, Debug, Clone, Default)]
pub struct CommentData {
    #[serde(default)]
    pub author: String,
    #[serde(default)]
    pub body: String,
    #[serde(default)]
    pub score: i32,
    #[serde(default)]
    pub created_utc: f64,
    /// Only set on messages.
    pub subject: Option<String>,
    pub distinguished: Option<String>,
}

impl CommentData {
    /// One display line: author, score and the first line of the body.
    pub fn format_line(&self, width: usize) -> String {
        let first_line = self.body.lines().next().unwrap_or("").trim();
        let marker = match self.distinguished.as_deref() {
            Some("moderator") => " [M]",
            Some("admin") => " [A]",
            _ => "",
        };
        match &self.subject {
            Some(subject) => format!(
                "u/{}{} re: {} | {}",
                self.author,
                marker,
                subject,
                truncate(first_line, width)
            ),
            None => format!(
                "u/{}{} ({} pts) {}",
                self.author,
                marker,
                self.score,
                truncate(first_line, width)
            ),
        }
    }
}
