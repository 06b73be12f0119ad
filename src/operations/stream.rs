use super::local_time;
use crate::cancel::CancelToken;
use crate::client::{RedditClient, RedditClientError};
use crate::models::{CommentData, Entry, Kind, PostData, Thing};
use futures::{pin_mut, StreamExt};
use log::{error, info};

/// What to tail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamSource {
    /// New posts in a subreddit.
    Posts(String),
    /// New comments in a subreddit.
    Comments(String),
    /// The authenticated user's inbox.
    Inbox,
}

impl StreamSource {
    pub fn path(&self) -> String {
        match self {
            StreamSource::Posts(sub) => format!("/r/{}/new", sub.trim_start_matches("r/")),
            StreamSource::Comments(sub) => format!("/r/{}/comments", sub.trim_start_matches("r/")),
            StreamSource::Inbox => "/message/inbox".to_string(),
        }
    }
}

/// Tails a live collection and hands every new entry to a callback.
pub struct StreamOperation {
    source: StreamSource,
    /// Stop after this many entries; `None` runs until cancelled.
    limit: Option<usize>,
    client: RedditClient,
    cancel: CancelToken,
}

impl StreamOperation {
    pub fn with_client(source: StreamSource, limit: Option<usize>, client: RedditClient) -> Self {
        Self {
            source,
            limit,
            client,
            cancel: CancelToken::new(),
        }
    }

    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Run until the limit is reached, the token is cancelled or the stream
    /// fails. Returns the number of entries delivered.
    pub async fn run<F>(&self, mut on_entry: F) -> Result<usize, RedditClientError>
    where
        F: FnMut(&Entry),
    {
        let path = self.source.path();
        info!("Streaming {}", path);

        let listing = self.client.stream(&path).with_cancel(self.cancel.clone());

        let stream = listing.into_stream();
        pin_mut!(stream);

        let mut delivered = 0;
        while self.limit.map_or(true, |limit| delivered < limit) {
            match stream.next().await {
                Some(Ok(Thing::Entry(entry))) => {
                    on_entry(&entry);
                    delivered += 1;
                }
                Some(Ok(Thing::Continuation(_))) => {}
                Some(Err(RedditClientError::Cancelled)) | None => break,
                Some(Err(err)) => return Err(err),
            }
        }
        Ok(delivered)
    }
}

/// One display line for a streamed entry.
pub fn format_entry(entry: &Entry) -> String {
    match entry.kind {
        Kind::Link => {
            let post: PostData = entry.payload_as().unwrap_or_default();
            format!(
                "[{}] {} {}",
                local_time(post.created_utc, "%H:%M:%S"),
                entry.full_id,
                post.format_short_summary()
            )
        }
        Kind::Comment | Kind::Message => {
            let comment: CommentData = entry.payload_as().unwrap_or_default();
            format!(
                "[{}] {} {}",
                local_time(comment.created_utc, "%H:%M:%S"),
                entry.full_id,
                comment.format_line(80)
            )
        }
        _ => format!("{} ({})", entry.full_id, entry.tag),
    }
}

/// CLI handler for the stream command; stops on Ctrl-C.
pub async fn handle_stream_command_with_client(
    source: StreamSource,
    limit: Option<usize>,
    client: RedditClient,
) -> Result<(), RedditClientError> {
    let cancel = CancelToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Interrupted, stopping stream");
            on_signal.cancel();
        }
    });

    let operation = StreamOperation::with_client(source, limit, client).with_cancel(cancel);
    match operation.run(|entry| println!("{}", format_entry(entry))).await {
        Ok(count) => {
            info!("Stream delivered {} entries", count);
            Ok(())
        }
        Err(err) => {
            error!("Stream failed: {}", err);
            Err(err)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn source_paths() {
        assert_eq!(StreamSource::Posts("r/rust".into()).path(), "/r/rust/new");
        assert_eq!(StreamSource::Comments("rust".into()).path(), "/r/rust/comments");
        assert_eq!(StreamSource::Inbox.path(), "/message/inbox");
    }

    #[test]
    fn format_entry_for_message() {
        let thing = Thing::from_value(json!({
            "kind": "t4",
            "data": {"id": "m1", "name": "t4_m1", "author": "mod", "subject": "welcome", "body": "hi there", "created_utc": 0.0}
        }))
        .unwrap();
        let line = format_entry(thing.as_entry().unwrap());
        assert!(line.contains("t4_m1"));
        assert!(line.contains("u/mod re: welcome | hi there"));
    }
}
