//! Listing, streaming and comment-tree engine for Reddit's JSON API.
//!
//! [`client::RedditClient`] is the client context: it owns the HTTP pool,
//! an optional bearer token and the [`ratelimit::RateLimiter`] every request
//! goes through. [`listing::Listing`] pages through collections and
//! [`tree::TreeAssembler`] rebuilds comment trees, resolving `more`
//! placeholders as it goes.

pub mod cancel;
pub mod cli;
pub mod client;
pub mod config;
pub mod listing;
pub mod models;
pub mod operations;
pub mod ratelimit;
pub mod tree;

pub use cancel::CancelToken;
pub use client::{RedditClient, RedditClientError, Transport};
pub use listing::{Listing, ListingMode, ListingOptions, ListingState, RetryPolicy};
pub use models::{Continuation, Entry, Kind, Page, Thing};
pub use ratelimit::RateLimiter;
pub use tree::{CommentTree, ContinuationSource, MoreChildren, Root, TreeAssembler, TreeNode};

pub type Result<T> = std::result::Result<T, RedditClientError>;
