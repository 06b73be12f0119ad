use async_trait::async_trait;
use log::debug;
use serde_json::Value;
use std::sync::Arc;

use crate::client::{split_comments_response, RedditClientError, Transport};
use crate::models::{flatten, Continuation, Thing};

/// Most child ids `/api/morechildren` accepts per call.
pub const MORE_CHILDREN_BATCH: usize = 100;

/// Fetches whatever a continuation stands in for.
#[async_trait]
pub trait ContinuationSource: Send + Sync {
    /// Return the omitted things as a flat, pre-order sequence. The result
    /// may contain further continuations.
    async fn expand(&self, link_id: &str, more: &Continuation) -> Result<Vec<Thing>, RedditClientError>;
}

/// [`ContinuationSource`] backed by the API's own endpoints.
pub struct MoreChildren {
    transport: Arc<dyn Transport>,
    batch: usize,
}

impl MoreChildren {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self {
            transport,
            batch: MORE_CHILDREN_BATCH,
        }
    }

    pub fn with_batch(mut self, batch: usize) -> Self {
        self.batch = batch.clamp(1, MORE_CHILDREN_BATCH);
        self
    }

    async fn fetch_children(&self, link_id: &str, ids: &[String]) -> Result<Vec<Thing>, RedditClientError> {
        let query = vec![
            ("api_type".to_string(), "json".to_string()),
            ("link_id".to_string(), link_id.to_string()),
            ("children".to_string(), ids.join(",")),
        ];
        let json = self.transport.get("/api/morechildren", &query).await?;

        if let Some(errors) = json["json"]["errors"].as_array() {
            if !errors.is_empty() {
                return Err(RedditClientError::ApiError(format!(
                    "morechildren returned errors: {:?}",
                    errors
                )));
            }
        }

        let things = match json["json"]["data"]["things"].as_array() {
            Some(things) => things.clone(),
            None => return Err(RedditClientError::format("json.data.things", "missing")),
        };
        things.into_iter().map(Thing::from_value).collect()
    }

    /// "Continue this thread": refetch the parent comment's subtree.
    async fn fetch_thread(&self, link_id: &str, parent_id: &str) -> Result<Vec<Thing>, RedditClientError> {
        let link = short_id(link_id);
        let path = if parent_id == link_id || parent_id.starts_with("t3_") {
            format!("/comments/{}", link)
        } else {
            format!("/comments/{}/_/{}", link, short_id(parent_id))
        };

        let json: Value = self.transport.get(&path, &[]).await?;
        let (_, comments) = split_comments_response(json)?;

        Ok(flatten(comments)
            .into_iter()
            .filter(|thing| thing.full_id() != parent_id)
            .collect())
    }
}

#[async_trait]
impl ContinuationSource for MoreChildren {
    async fn expand(&self, link_id: &str, more: &Continuation) -> Result<Vec<Thing>, RedditClientError> {
        if more.is_continue_thread() {
            let parent = more
                .parent_id
                .as_deref()
                .ok_or_else(|| RedditClientError::format("continuation with a parent", "none"))?;
            debug!("Continuing thread below {}", parent);
            return self.fetch_thread(link_id, parent).await;
        }

        let mut out = Vec::new();
        for ids in more.children.chunks(self.batch) {
            debug!("Expanding {} children of {}", ids.len(), more.full_id);
            out.extend(self.fetch_children(link_id, ids).await?);
        }
        Ok(out)
    }
}

fn short_id(full_id: &str) -> &str {
    full_id.split_once('_').map(|(_, id)| id).unwrap_or(full_id)
}
