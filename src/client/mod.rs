use crate::config::AppConfig;
use crate::listing::{Listing, ListingOptions};
use crate::models::{flatten, CommentForm, Entry, Page, Thing};
use crate::ratelimit::RateLimiter;
use crate::tree::{CommentTree, MoreChildren, Root, TreeAssembler};
use async_trait::async_trait;
use log::{debug, info, warn};
use reqwest::{Client, Error as ReqwestError, RequestBuilder, StatusCode};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use url::Url;

pub mod transport;

pub use transport::{form_params, Params, Transport};

const OAUTH_BASE_URL: &str = "https://oauth.reddit.com";
const PUBLIC_BASE_URL: &str = "https://www.reddit.com";
const DEFAULT_USER_AGENT: &str = "redpager/0.1 (listing and comment tree client)";

// Define a custom error type for handling Reddit API errors
#[derive(Debug)]
pub enum RedditClientError {
    /// Network failure, timeout or a body that could not be read.
    RequestError(ReqwestError),
    /// The server answered with a non-success status.
    StatusError { status: u16, body: String },
    /// The server rejected the request for exceeding the rate budget.
    RateLimitError(Duration),
    /// A page or thing did not have the expected shape.
    FormatError { expected: String, found: String },
    ParseError(serde_json::Error),
    ApiError(String),
    ConfigError(String),
    Cancelled,
}

impl RedditClientError {
    /// Whether a streaming listing should back off and try again.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            RedditClientError::RequestError(_)
                | RedditClientError::StatusError { .. }
                | RedditClientError::RateLimitError(_)
        )
    }

    pub(crate) fn format(expected: impl Into<String>, found: impl Into<String>) -> Self {
        RedditClientError::FormatError {
            expected: expected.into(),
            found: found.into(),
        }
    }
}

impl fmt::Display for RedditClientError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            RedditClientError::RequestError(err) => write!(f, "Request error: {}", err),
            RedditClientError::StatusError { status, body } => {
                write!(f, "Server returned error status {}: {}", status, body)
            }
            RedditClientError::RateLimitError(reset) => write!(
                f,
                "Rate limit exceeded, window resets in {:.1}s",
                reset.as_secs_f64()
            ),
            RedditClientError::FormatError { expected, found } => {
                write!(f, "Format error: expected {}, found {}", expected, found)
            }
            RedditClientError::ParseError(err) => write!(f, "Parse error: {}", err),
            RedditClientError::ApiError(msg) => write!(f, "Reddit API error: {}", msg),
            RedditClientError::ConfigError(msg) => write!(f, "Configuration error: {}", msg),
            RedditClientError::Cancelled => write!(f, "Operation cancelled"),
        }
    }
}

impl std::error::Error for RedditClientError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            RedditClientError::RequestError(err) => Some(err),
            RedditClientError::ParseError(err) => Some(err),
            _ => None,
        }
    }
}

impl From<ReqwestError> for RedditClientError {
    fn from(err: ReqwestError) -> Self {
        RedditClientError::RequestError(err)
    }
}

impl From<serde_json::Error> for RedditClientError {
    fn from(err: serde_json::Error) -> Self {
        RedditClientError::ParseError(err)
    }
}

impl From<url::ParseError> for RedditClientError {
    fn from(err: url::ParseError) -> Self {
        RedditClientError::ConfigError(format!("Invalid URL: {}", err))
    }
}

/// Client context: one HTTP connection pool, one optional bearer token and
/// one rate limiter shared by every clone of the client.
#[derive(Clone)]
pub struct RedditClient {
    pub client: Client,
    pub access_token: Option<String>,
    pub user_agent: String,
    base_url: Option<Url>,
    rate_limiter: Arc<RateLimiter>,
    listing_defaults: ListingOptions,
}

impl RedditClient {
    pub fn new() -> Result<Self, RedditClientError> {
        Self::with_user_agent(DEFAULT_USER_AGENT.to_string())
    }

    pub fn with_user_agent(user_agent: String) -> Result<Self, RedditClientError> {
        Ok(Self {
            client: Self::get_client(&user_agent, None)?,
            access_token: None,
            user_agent,
            base_url: None,
            rate_limiter: Arc::new(RateLimiter::new()),
            listing_defaults: ListingOptions::default(),
        })
    }

    /// Create a client from a configuration object
    pub fn from_config(config: &AppConfig) -> Result<Self, RedditClientError> {
        let user_agent = if config.user_agent.is_empty() {
            DEFAULT_USER_AGENT.to_string()
        } else {
            config.user_agent.clone()
        };
        debug!("Creating RedditClient with user_agent: {}", user_agent);

        let base_url = match &config.base_url {
            Some(raw) => Some(Url::parse(raw)?),
            None => None,
        };

        let rate_limiter = if config.rate_limit {
            RateLimiter::new()
        } else {
            info!("Client-side rate limiting disabled by configuration");
            RateLimiter::disabled()
        };

        let mut listing_defaults = ListingOptions::default();
        if let Some(limit) = config.page_limit {
            listing_defaults = listing_defaults.with_limit(limit);
        }
        listing_defaults.dedup_capacity = config.dedup_capacity;

        Ok(Self {
            client: Self::get_client(&user_agent, config.timeout)?,
            access_token: config.access_token.clone(),
            user_agent,
            base_url,
            rate_limiter: Arc::new(rate_limiter),
            listing_defaults,
        })
    }

    /// Attach an already-obtained bearer token; requests then go to the
    /// OAuth host.
    pub fn with_access_token(mut self, token: impl Into<String>) -> Self {
        self.access_token = Some(token.into());
        self
    }

    /// Send every request to `base_url` instead of the Reddit hosts.
    pub fn with_base_url(mut self, base_url: Url) -> Self {
        self.base_url = Some(base_url);
        self
    }

    /// The limiter shared by this client and all of its clones.
    pub fn rate_limiter(&self) -> &Arc<RateLimiter> {
        &self.rate_limiter
    }

    /// Listing options applied by [`RedditClient::listing`] and
    /// [`RedditClient::stream`].
    pub fn listing_defaults(&self) -> &ListingOptions {
        &self.listing_defaults
    }

    fn get_client(user_agent: &str, timeout: Option<Duration>) -> Result<Client, RedditClientError> {
        let mut builder = Client::builder().user_agent(user_agent);
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        Ok(builder.build()?)
    }

    /// Resolve an API path against the active host. The public host only
    /// serves JSON for paths ending in `.json`.
    fn endpoint(&self, path: &str) -> Result<Url, RedditClientError> {
        let (base, public) = match (&self.base_url, &self.access_token) {
            (Some(base), _) => (base.clone(), false),
            (None, Some(_)) => (Url::parse(OAUTH_BASE_URL)?, false),
            (None, None) => (Url::parse(PUBLIC_BASE_URL)?, true),
        };

        let path = if public && !path.ends_with(".json") {
            format!("{}.json", path.trim_end_matches('/'))
        } else {
            path.to_string()
        };

        Ok(base.join(&path)?)
    }

    fn authorize(&self, req: RequestBuilder) -> RequestBuilder {
        match &self.access_token {
            Some(token) => req.header("Authorization", format!("Bearer {}", token)),
            None => req,
        }
    }

    /// Send a request through the rate limiter and decode the JSON body.
    async fn execute(&self, req: RequestBuilder) -> Result<Value, RedditClientError> {
        self.rate_limiter.throttle().await;

        let response = self.authorize(req).send().await?;
        let status = response.status();
        debug!("Response status: {}", status);

        self.rate_limiter.record_response(response.headers()).await;

        if status == StatusCode::TOO_MANY_REQUESTS {
            let reset = self.rate_limiter.time_until_reset().await;
            warn!(
                "Server rejected request for rate limit, resets in {:.1}s",
                reset.as_secs_f64()
            );
            return Err(RedditClientError::RateLimitError(reset));
        }

        let body = response.text().await?;
        debug!("Response body length: {} bytes", body.len());

        if !status.is_success() {
            return Err(RedditClientError::StatusError {
                status: status.as_u16(),
                body: body.chars().take(200).collect(),
            });
        }

        match serde_json::from_str::<Value>(&body) {
            Ok(json) => Ok(json),
            Err(e) => {
                debug!("Error parsing response: {}", e);
                debug!("First 100 chars: {}", body.chars().take(100).collect::<String>());
                Err(RedditClientError::ParseError(e))
            }
        }
    }

    /// This client as a shared transport for listings and tree assembly.
    pub fn transport(&self) -> Arc<dyn Transport> {
        Arc::new(self.clone())
    }

    /// Page backward through the collection at `path` (for example
    /// `/r/rust/new`) using this client's listing defaults.
    pub fn listing(&self, path: &str) -> Listing {
        Listing::new(self.transport(), path, self.listing_defaults.clone())
    }

    /// Tail the collection at `path`, yielding new things as they appear.
    pub fn stream(&self, path: &str) -> Listing {
        Listing::new(
            self.transport(),
            path,
            self.listing_defaults.clone().streaming(),
        )
    }

    /// Fetch the comments of a post and resolve every "more" placeholder.
    ///
    /// `link_id` may be given with or without the `t3_` prefix.
    pub async fn fetch_comment_tree(&self, link_id: &str) -> Result<CommentTree, RedditClientError> {
        let short_id = link_id.strip_prefix("t3_").unwrap_or(link_id);
        let full_id = format!("t3_{}", short_id);
        info!("Fetching comment tree for {}", full_id);

        let json = self
            .get(&format!("/comments/{}", short_id), &[])
            .await?;
        let (post, comments) = split_comments_response(json)?;

        let root = match post {
            Some(entry) => Root::from_entry(entry),
            None => Root::new(full_id.clone(), None),
        };

        let assembler = TreeAssembler::new(Arc::new(MoreChildren::new(self.transport())), full_id);
        assembler.assemble(root, flatten(comments)).await
    }

    /// Reply to a post or comment. Requires a token with the `submit`
    /// scope; obtaining one is up to the caller.
    pub async fn submit_comment(&self, thing_id: &str, text: &str) -> Result<Entry, RedditClientError> {
        if self.access_token.is_none() {
            return Err(RedditClientError::ConfigError(
                "No access token available; commenting requires an OAuth token".to_string(),
            ));
        }

        let form = CommentForm::new(thing_id, text);
        let json = self.post("/api/comment", &serde_json::to_value(&form)?).await?;
        debug!("Comment creation response: {:?}", json);

        if let Some(errors) = json["json"]["errors"].as_array() {
            if !errors.is_empty() {
                return Err(RedditClientError::ApiError(format!(
                    "Reddit API returned an error: {:?}",
                    errors
                )));
            }
        }

        let created = json["json"]["data"]["things"]
            .as_array()
            .and_then(|things| things.first())
            .cloned()
            .ok_or_else(|| RedditClientError::format("created comment thing", "none"))?;

        match Thing::from_value(created)? {
            Thing::Entry(entry) => Ok(entry),
            Thing::Continuation(more) => Err(RedditClientError::format("comment", more.full_id)),
        }
    }
}

#[async_trait]
impl Transport for RedditClient {
    async fn get(&self, path: &str, query: &[(String, String)]) -> Result<Value, RedditClientError> {
        let mut url = self.endpoint(path)?;
        {
            let mut pairs = url.query_pairs_mut();
            pairs.append_pair("raw_json", "1");
            for (key, value) in query {
                pairs.append_pair(key, value);
            }
        }
        debug!("GET {}", url);
        self.execute(self.client.get(url)).await
    }

    async fn post(&self, path: &str, body: &Value) -> Result<Value, RedditClientError> {
        let url = self.endpoint(path)?;
        debug!("POST {}", url);
        let form = form_params(body);
        self.execute(self.client.post(url).form(&form)).await
    }
}

/// Split a `/comments/{id}` response into the post and its top-level
/// comment things.
pub(crate) fn split_comments_response(
    json: Value,
) -> Result<(Option<Entry>, Vec<Thing>), RedditClientError> {
    let mut parts = match json {
        Value::Array(parts) if parts.len() == 2 => parts,
        Value::Array(parts) => {
            return Err(RedditClientError::format(
                "two listings",
                format!("{} listings", parts.len()),
            ))
        }
        _ => return Err(RedditClientError::format("array of listings", "other JSON")),
    };

    let comments = Page::from_value(parts.pop().unwrap_or(Value::Null))?;
    let post_page = Page::from_value(parts.pop().unwrap_or(Value::Null))?;

    let post = post_page.things.into_iter().find_map(|thing| match thing {
        Thing::Entry(entry) => Some(entry),
        Thing::Continuation(_) => None,
    });

    Ok((post, comments.things))
}
