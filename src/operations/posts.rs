use super::local_time;
use crate::client::{RedditClient, RedditClientError};
use crate::listing::Listing;
use crate::models::{Entry, Kind, PostData, Thing};
use log::{error, info, warn};

/// Configuration options for fetching posts
#[derive(Debug, Clone)]
pub struct PostsOptions {
    /// The number of posts to retrieve; negative pages until the server runs out
    pub count: i32,
    /// The name of the subreddit to fetch posts from (None for the frontpage)
    pub subreddit: Option<String>,
    /// Sort order: new, hot, top, rising, controversial
    pub sort: String,
    /// Display posts in a brief, one-line format
    pub brief: bool,
}

impl Default for PostsOptions {
    fn default() -> Self {
        Self {
            count: 10,
            subreddit: None,
            sort: "new".to_string(),
            brief: false,
        }
    }
}

impl PostsOptions {
    /// Listing path for these options, e.g. `/r/rust/new`.
    pub fn path(&self) -> String {
        match &self.subreddit {
            Some(sub) => format!("/r/{}/{}", sub.trim_start_matches("r/"), self.sort),
            None => format!("/{}", self.sort),
        }
    }
}

/// Result of a posts fetch operation
#[derive(Debug)]
pub struct PostsResult {
    /// The number of posts found
    pub post_count: usize,
    /// Formatted output (for CLI display)
    pub formatted_output: String,
    /// The posts, newest first as the server ordered them
    pub posts: Vec<Entry>,
}

/// Operation for paging backward through a subreddit's posts
pub struct PostsOperation {
    options: PostsOptions,
    client: RedditClient,
}

impl PostsOperation {
    pub fn with_client(options: PostsOptions, client: RedditClient) -> Self {
        Self { options, client }
    }

    pub async fn execute(&self) -> Result<PostsResult, RedditClientError> {
        let path = self.options.path();
        info!("Fetching up to {} posts from {}", self.options.count, path);

        let mut listing = Listing::new(
            self.client.transport(),
            path,
            self.client
                .listing_defaults()
                .clone()
                .with_maximum(self.options.count),
        );

        let posts: Vec<Entry> = listing
            .collect_all()
            .await?
            .into_iter()
            .filter_map(|thing| match thing {
                Thing::Entry(entry) if entry.kind == Kind::Link => Some(entry),
                other => {
                    warn!("Skipping non-post {} in listing", other.full_id());
                    None
                }
            })
            .collect();

        let mut output = String::new();
        if posts.is_empty() {
            output.push_str("No posts found.\n");
        } else {
            output.push_str(&format!("Found {} posts\n", posts.len()));
            if self.options.brief {
                format_brief_output(&posts, &mut output);
                output.push_str("\nPost Type Legend:\n");
                output.push_str("[T] = Text post\n");
                output.push_str("[V] = Video\n");
                output.push_str("[I] = Image\n");
                output.push_str("[G] = Gallery\n");
                output.push_str("[L] = Link\n");
            } else {
                format_detailed_output(&posts, &mut output);
            }
        }

        Ok(PostsResult {
            post_count: posts.len(),
            formatted_output: output,
            posts,
        })
    }
}

fn format_brief_output(posts: &[Entry], output: &mut String) {
    for (i, entry) in posts.iter().enumerate() {
        let post: PostData = entry.payload_as().unwrap_or_default();
        output.push_str(&format!(
            "{:2}. [{}] [{}] {} r/{} | ID: {} | https://reddit.com{}\n",
            i + 1,
            post.type_code(),
            local_time(post.created_utc, "%H:%M"),
            crate::models::post::truncate(&post.title, 30),
            post.subreddit,
            entry.full_id,
            post.permalink
        ));
    }
}

fn format_detailed_output(posts: &[Entry], output: &mut String) {
    for entry in posts {
        let post: PostData = entry.payload_as().unwrap_or_default();
        output.push_str("\n============ POST =============\n");
        output.push_str(&format!(
            "[{}] [Los Angeles time]\n",
            local_time(post.created_utc, "%Y-%m-%d %H:%M:%S")
        ));
        output.push_str(&format!(
            "Thing ID: {} (use this for commenting)\n",
            entry.full_id
        ));
        output.push_str(&post.format_summary());
        output.push_str("\n================================\n\n");
    }
}

/// CLI handler function for posts command that accepts a preconfigured client
pub async fn handle_posts_command_with_client(
    options: PostsOptions,
    client: RedditClient,
) -> Result<(), RedditClientError> {
    let operation = PostsOperation::with_client(options, client);
    match operation.execute().await {
        Ok(result) => {
            print!("{}", result.formatted_output);
            Ok(())
        }
        Err(err) => {
            error!("Error fetching posts: {}", err);
            Err(err)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn path_for_subreddit_and_frontpage() {
        let mut options = PostsOptions {
            subreddit: Some("r/rust".to_string()),
            ..Default::default()
        };
        assert_eq!(options.path(), "/r/rust/new");

        options.subreddit = None;
        options.sort = "hot".to_string();
        assert_eq!(options.path(), "/hot");
    }
}
