use clap::Parser;
use log::error;
use redpager::cli::{Cli, Commands};
use redpager::config::AppConfig;
use redpager::operations::comment::handle_comment_command_with_client;
use redpager::operations::comments::handle_comments_command_with_client;
use redpager::operations::posts::{handle_posts_command_with_client, PostsOptions};
use redpager::operations::stream::{handle_stream_command_with_client, StreamSource};
use std::process::ExitCode;

#[tokio::main]
async fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let config = AppConfig::load();

    let client = match config.create_client() {
        Ok(client) => client,
        Err(err) => {
            error!("Failed to create client: {}", err);
            return ExitCode::FAILURE;
        }
    };

    let result = match cli.command {
        Commands::Posts {
            count,
            subreddit,
            sort,
            brief,
        } => {
            let options = PostsOptions {
                count,
                subreddit,
                sort,
                brief,
            };
            handle_posts_command_with_client(options, client).await
        }
        Commands::Stream {
            subreddit,
            comments,
            inbox,
            limit,
        } => {
            let source = match (subreddit, inbox) {
                (Some(sub), _) if comments => StreamSource::Comments(sub),
                (Some(sub), _) => StreamSource::Posts(sub),
                (None, _) => StreamSource::Inbox,
            };
            handle_stream_command_with_client(source, limit, client).await
        }
        Commands::Comments { link_id } => handle_comments_command_with_client(link_id, client).await,
        Commands::Comment { thing_id, text } => {
            handle_comment_command_with_client(thing_id, text, client).await
        }
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(_) => ExitCode::FAILURE,
    }
}
