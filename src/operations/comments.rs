use crate::client::{RedditClient, RedditClientError};
use crate::models::{CommentData, PostData};
use crate::tree::CommentTree;
use log::{error, info};

/// Fetches a post's full comment tree and renders it as indented text.
pub struct CommentsOperation {
    link_id: String,
    client: RedditClient,
}

impl CommentsOperation {
    pub fn with_client(link_id: String, client: RedditClient) -> Self {
        Self { link_id, client }
    }

    pub async fn execute(&self) -> Result<CommentTree, RedditClientError> {
        let tree = self.client.fetch_comment_tree(&self.link_id).await?;
        info!(
            "Assembled {} comments with {} follow-up fetches",
            tree.root.descendants(),
            tree.fetches
        );
        Ok(tree)
    }
}

pub fn render_tree(tree: &CommentTree) -> String {
    let mut output = String::new();

    if let Some(entry) = &tree.root.entry {
        let post: PostData = entry.payload_as().unwrap_or_default();
        output.push_str(&post.format_short_summary());
        output.push('\n');
    }

    for (depth, node) in tree.root.iter().skip(1) {
        let indent = "  ".repeat(depth - 1);
        let line = match &node.entry {
            Some(entry) => entry
                .payload_as::<CommentData>()
                .unwrap_or_default()
                .format_line(100),
            None => "[unavailable]".to_string(),
        };
        output.push_str(&format!("{}- {}\n", indent, line));

        for more in &node.pending {
            output.push_str(&format!(
                "{}  ... {} more replies\n",
                indent,
                more.count.max(more.children.len() as i64)
            ));
        }
    }

    for more in &tree.root.pending {
        output.push_str(&format!("... {} more replies\n", more.count));
    }
    if !tree.orphans.is_empty() {
        output.push_str(&format!("({} replies could not be placed)\n", tree.orphans.len()));
    }
    if !tree.duplicates.is_empty() {
        output.push_str(&format!("({} repeated replies skipped)\n", tree.duplicates.len()));
    }

    output
}

/// CLI handler for the comments command
pub async fn handle_comments_command_with_client(
    link_id: String,
    client: RedditClient,
) -> Result<(), RedditClientError> {
    let operation = CommentsOperation::with_client(link_id, client);
    match operation.execute().await {
        Ok(tree) => {
            print!("{}", render_tree(&tree));
            Ok(())
        }
        Err(err) => {
            error!("Error fetching comments: {}", err);
            Err(err)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Entry, Thing};
    use crate::tree::TreeNode;
    use serde_json::json;

    fn comment(id: &str, author: &str, body: &str) -> Entry {
        match Thing::from_value(json!({
            "kind": "t1",
            "data": {"id": id, "author": author, "body": body, "score": 1}
        }))
        .unwrap()
        {
            Thing::Entry(entry) => entry,
            Thing::Continuation(_) => unreachable!(),
        }
    }

    fn node(entry: Entry, children: Vec<TreeNode>) -> TreeNode {
        TreeNode {
            full_id: entry.full_id.clone(),
            entry: Some(entry),
            children,
            pending: Vec::new(),
        }
    }

    #[test]
    fn renders_indented_replies() {
        let tree = CommentTree {
            root: TreeNode {
                full_id: "t3_p".to_string(),
                entry: None,
                children: vec![node(
                    comment("a", "alice", "top"),
                    vec![node(comment("b", "bob", "reply"), vec![])],
                )],
                pending: Vec::new(),
            },
            orphans: Vec::new(),
            duplicates: Vec::new(),
            unconsumed: Vec::new(),
            fetches: 0,
        };

        assert_eq!(
            render_tree(&tree),
            "- u/alice (1 pts) top\n  - u/bob (1 pts) reply\n"
        );
    }
}
