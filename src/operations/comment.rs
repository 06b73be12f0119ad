use crate::client::{RedditClient, RedditClientError};
use log::{error, info};

/// Configuration options for creating a comment on Reddit
#[derive(Debug, Clone)]
pub struct CommentOptions {
    /// The fullname of the parent thing (post or comment) to comment on
    /// Format is "t3_" followed by post ID for posts, or "t1_" followed by comment ID for comments
    pub thing_id: String,
    /// Text content of the comment
    pub text: String,
}

/// Result of a comment creation operation
#[derive(Debug)]
pub struct CommentResult {
    /// Whether the comment was successfully created
    pub success: bool,
    /// Full id of the created comment (if successful)
    pub comment_id: Option<String>,
    /// Formatted message for CLI output
    pub message: String,
}

/// Operation for creating a comment on a post or another comment
pub struct CommentOperation {
    options: CommentOptions,
    client: RedditClient,
}

impl CommentOperation {
    pub fn with_client(options: CommentOptions, client: RedditClient) -> Self {
        Self { options, client }
    }

    pub async fn execute(&self) -> CommentResult {
        info!(
            "Creating a new comment on thing_id: {}",
            self.options.thing_id
        );

        match self
            .client
            .submit_comment(&self.options.thing_id, &self.options.text)
            .await
        {
            Ok(entry) => {
                let permalink = entry.payload["permalink"].as_str().unwrap_or("");
                CommentResult {
                    success: true,
                    message: format!(
                        "Comment created successfully! ID: {} https://reddit.com{}",
                        entry.full_id, permalink
                    ),
                    comment_id: Some(entry.full_id),
                }
            }
            Err(err) => CommentResult {
                success: false,
                comment_id: None,
                message: format!(
                    "Error creating comment: {}\n\nNote: Commenting requires an OAuth token with the 'submit' scope (REDDIT_ACCESS_TOKEN).",
                    err
                ),
            },
        }
    }
}

/// CLI handler function for comment command with client
pub async fn handle_comment_command_with_client(
    thing_id: String,
    text: String,
    client: RedditClient,
) -> Result<(), RedditClientError> {
    let options = CommentOptions { thing_id, text };

    let result = CommentOperation::with_client(options, client).execute().await;
    if result.success {
        println!("{}", result.message);
        Ok(())
    } else {
        error!("{}", result.message);
        Err(RedditClientError::ApiError(result.message))
    }
}
