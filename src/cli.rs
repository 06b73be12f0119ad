use clap::Parser;

#[derive(Parser, Debug)]
#[command(
    name = "redpager",
    version,
    about = "Page, stream and assemble Reddit listings and comment trees."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(clap::Subcommand, Debug)]
pub enum Commands {
    /// Page backward through a subreddit or the frontpage.
    Posts {
        /// The number of posts to retrieve (-1 pages until the server runs out).
        #[arg(long, short, help = "Number of posts to retrieve", default_value_t = 25, allow_negative_numbers = true)]
        count: i32,

        /// The name of the subreddit to fetch posts from.
        /// If not provided, posts from the frontpage will be retrieved.
        #[arg(long, short, help = "Subreddit name (optional)", required = false)]
        subreddit: Option<String>,

        /// Sort order of the listing.
        #[arg(long, help = "new, hot, top, rising or controversial", default_value = "new")]
        sort: String,

        /// Display posts in a brief, one-line format.
        #[arg(long, short, help = "Show posts in a brief one-line format", required = false)]
        brief: bool,
    },

    /// Tail new posts, new comments or the inbox until interrupted.
    Stream {
        /// Subreddit to follow. Omit together with --inbox to follow the inbox.
        #[arg(long, short, help = "Subreddit name", required_unless_present = "inbox")]
        subreddit: Option<String>,

        /// Follow new comments instead of new posts.
        #[arg(long, help = "Stream comments instead of posts")]
        comments: bool,

        /// Follow the authenticated user's inbox (needs REDDIT_ACCESS_TOKEN).
        #[arg(long, help = "Stream the inbox", conflicts_with = "subreddit")]
        inbox: bool,

        /// Stop after this many items.
        #[arg(long, short, help = "Maximum number of items to print")]
        limit: Option<usize>,
    },

    /// Print the full comment tree of a post, resolving "more" links.
    Comments {
        /// Post id, with or without the t3_ prefix.
        #[arg(help = "Post ID", required = true)]
        link_id: String,
    },

    /// Reply to a post or comment (needs REDDIT_ACCESS_TOKEN with submit scope).
    Comment {
        /// The fullname of the thing to reply to (t3_... or t1_...).
        #[arg(help = "Parent thing ID", required = true)]
        thing_id: String,

        /// Text content of the comment.
        #[arg(help = "Comment text", required = true)]
        text: String,
    },
}
