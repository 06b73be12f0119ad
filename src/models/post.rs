use serde::Deserialize;

/// A forgiving view of a link (`t3`) payload.
/// Only the fields the CLI prints are modelled; everything is defaulted.
#[derive(Deserialize, Debug, Clone, Default)]
pub struct PostData {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub author: String,
    #[serde(default)]
    pub subreddit: String,
    #[serde(default)]
    pub subreddit_name_prefixed: String,
    #[serde(default)]
    pub permalink: String,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub created_utc: f64,

    // Post type and content
    #[serde(default)]
    pub is_self: bool,
    #[serde(default)]
    pub selftext: String,
    #[serde(default)]
    pub is_video: bool,
    #[serde(default)]
    pub is_original_content: bool,

    // Post metrics
    #[serde(default)]
    pub score: i32,
    #[serde(default)]
    pub upvote_ratio: f32,
    #[serde(default)]
    pub num_comments: i32,

    // Post status
    #[serde(default)]
    pub locked: bool,
    #[serde(default)]
    pub stickied: bool,
    #[serde(default)]
    pub spoiler: bool,
    #[serde(default)]
    pub over_18: bool,

    pub link_flair_text: Option<String>,
}

impl PostData {
    /// Format a post for display with important metadata
    pub fn format_summary(&self) -> String {
        let mut content = format!(
            "Title: {}\nAuthor: u/{}\nSubreddit: r/{}\nScore: {} ({}% upvoted) | Comments: {}\n",
            self.title,
            self.author,
            self.subreddit,
            self.score,
            (self.upvote_ratio * 100.0) as i32,
            self.num_comments,
        );

        let mut flags = Vec::new();
        if self.is_self {
            flags.push("Self Post");
        }
        if self.over_18 {
            flags.push("NSFW");
        }
        if self.spoiler {
            flags.push("Spoiler");
        }
        if self.is_video {
            flags.push("Video");
        }
        if self.is_original_content {
            flags.push("OC");
        }
        if self.stickied {
            flags.push("Stickied");
        }
        if self.locked {
            flags.push("Locked");
        }
        if !flags.is_empty() {
            content.push_str(&format!("Flags: [{}]\n", flags.join(", ")));
        }

        if let Some(flair) = self.link_flair_text.as_deref().filter(|f| !f.is_empty()) {
            content.push_str(&format!("Flair: {}\n", flair));
        }

        // Text posts get a truncated excerpt
        if self.is_self && !self.selftext.is_empty() {
            let text = truncate(&self.selftext, 500);
            content.push_str("\nContent:\n---------\n");
            content.push_str(&text);
            content.push_str("\n---------\n");
        }

        content.push_str(&format!("\nPermalink: https://reddit.com{}", self.permalink));
        if !self.is_self && self.url != format!("https://reddit.com{}", self.permalink) {
            content.push_str(&format!("\nExternal URL: {}", self.url));
        }

        content
    }

    /// Get a short summary for the post (title, author, score)
    pub fn format_short_summary(&self) -> String {
        format!(
            "[{} | {} pts] {} - by u/{}",
            self.subreddit_name_prefixed, self.score, self.title, self.author
        )
    }

    /// Single character post type indicator used by the brief format.
    pub fn type_code(&self) -> char {
        if self.is_self {
            'T'
        } else if self.is_video {
            'V'
        } else if self.url.contains("i.redd.it") || self.url.contains("imgur.com") {
            'I'
        } else if self.url.contains("reddit.com/gallery") {
            'G'
        } else {
            'L'
        }
    }
}

/// Truncate to `max` characters, respecting UTF-8 boundaries.
pub(crate) fn truncate(text: &str, max: usize) -> String {
    if text.chars().count() > max {
        let mut out: String = text.chars().take(max.saturating_sub(3)).collect();
        out.push_str("...");
        out
    } else {
        text.to_string()
    }
}
