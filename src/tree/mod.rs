//! Reply tree reconstruction.
//!
//! Comment pages arrive as flat pre-order sequences in which some subtrees
//! are cut short by `more` placeholders. [`TreeAssembler`] consumes such a
//! sequence, fetches what each placeholder stands for and splices the
//! result in at the placeholder's position.
//!
//! Consumption is driven by an explicit stack of frames. The outermost
//! frame holds the caller's input; every resolved continuation pushes a
//! frame holding the fetched things, which is drained before the frame
//! below it resumes. A frame stops as soon as it meets a thing whose parent
//! is the frame root's own parent: that thing and everything after it
//! belong to a shallower frame and are handed back to it.

use log::{debug, warn};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;

use crate::cancel::CancelToken;
use crate::client::RedditClientError;
use crate::models::{Continuation, Entry, Thing};

mod more;

pub use more::{ContinuationSource, MoreChildren, MORE_CHILDREN_BATCH};

/// The node a tree is built under.
#[derive(Debug, Clone)]
pub struct Root {
    pub full_id: String,
    /// Parent of the root. Things carrying this parent are siblings of the
    /// root and end assembly.
    pub parent_id: Option<String>,
    pub entry: Option<Entry>,
}

impl Root {
    pub fn new(full_id: impl Into<String>, parent_id: Option<String>) -> Self {
        Self {
            full_id: full_id.into(),
            parent_id,
            entry: None,
        }
    }

    pub fn from_entry(entry: Entry) -> Self {
        Self {
            full_id: entry.full_id.clone(),
            parent_id: entry.parent_id.clone(),
            entry: Some(entry),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TreeNode {
    pub full_id: String,
    pub entry: Option<Entry>,
    /// In first-encounter order.
    pub children: Vec<TreeNode>,
    /// Continuations left unresolved below this node.
    pub pending: Vec<Continuation>,
}

impl TreeNode {
    pub fn child_ids(&self) -> Vec<&str> {
        self.children.iter().map(|c| c.full_id.as_str()).collect()
    }

    /// Number of nodes below this one.
    pub fn descendants(&self) -> usize {
        self.iter().count() - 1
    }

    pub fn find(&self, full_id: &str) -> Option<&TreeNode> {
        self.iter().map(|(_, node)| node).find(|node| node.full_id == full_id)
    }

    /// Depth-first, pre-order walk yielding `(depth, node)`; the node
    /// itself comes first at depth 0.
    pub fn iter(&self) -> Walk<'_> {
        Walk {
            stack: vec![(0, self)],
        }
    }
}

pub struct Walk<'a> {
    stack: Vec<(usize, &'a TreeNode)>,
}

impl<'a> Iterator for Walk<'a> {
    type Item = (usize, &'a TreeNode);

    fn next(&mut self) -> Option<Self::Item> {
        let (depth, node) = self.stack.pop()?;
        self.stack
            .extend(node.children.iter().rev().map(|child| (depth + 1, child)));
        Some((depth, node))
    }
}

/// Result of one assembly.
#[derive(Debug, Clone)]
pub struct CommentTree {
    pub root: TreeNode,
    /// Things whose parent never showed up.
    pub orphans: Vec<Thing>,
    /// Entries that arrived again after already being placed.
    pub duplicates: Vec<Thing>,
    /// Input left after the root's subtree ended.
    pub unconsumed: Vec<Thing>,
    /// Follow-up fetches issued.
    pub fetches: usize,
}

impl CommentTree {
    /// True when no continuation remains anywhere in the tree.
    pub fn is_complete(&self) -> bool {
        self.root.iter().all(|(_, node)| node.pending.is_empty())
    }
}

struct Slot {
    entry: Option<Entry>,
    parent_id: Option<String>,
    children: Vec<String>,
    pending: Vec<Continuation>,
}

impl Slot {
    fn new(entry: Option<Entry>, parent_id: Option<String>) -> Self {
        Self {
            entry,
            parent_id,
            children: Vec::new(),
            pending: Vec::new(),
        }
    }
}

struct Frame {
    scope: String,
    boundary: Option<String>,
    items: VecDeque<Thing>,
}

enum Step {
    Attach(Thing),
    /// The frame ran into a sibling of its root.
    Boundary(VecDeque<Thing>),
    Drained,
}

pub struct TreeAssembler {
    source: Arc<dyn ContinuationSource>,
    link_id: String,
    max_fetches: Option<usize>,
    cancel: CancelToken,
}

impl TreeAssembler {
    /// `link_id` is the full id of the post the comments belong to; every
    /// continuation is resolved against it.
    pub fn new(source: Arc<dyn ContinuationSource>, link_id: impl Into<String>) -> Self {
        Self {
            source,
            link_id: link_id.into(),
            max_fetches: None,
            cancel: CancelToken::new(),
        }
    }

    /// Stop resolving after `max_fetches` follow-up requests; later
    /// continuations stay attached to their parent as `pending`.
    pub fn with_max_fetches(mut self, max_fetches: usize) -> Self {
        self.max_fetches = Some(max_fetches);
        self
    }

    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub async fn assemble(&self, root: Root, input: Vec<Thing>) -> Result<CommentTree, RedditClientError> {
        let root_id = root.full_id.clone();
        let mut table: HashMap<String, Slot> = HashMap::new();
        table.insert(root_id.clone(), Slot::new(root.entry, root.parent_id.clone()));

        let mut stack = vec![Frame {
            scope: root_id.clone(),
            boundary: root.parent_id,
            items: input.into(),
        }];
        let mut expanded: HashSet<String> = HashSet::new();
        let mut orphans = Vec::new();
        let mut duplicates = Vec::new();
        let mut unconsumed = Vec::new();
        let mut fetches = 0usize;

        loop {
            let step = match stack.last_mut() {
                None => break,
                Some(frame) => next_step(frame),
            };

            let thing = match step {
                Step::Attach(thing) => thing,
                Step::Drained => {
                    stack.pop();
                    continue;
                }
                Step::Boundary(rest) => {
                    if let Some(frame) = stack.pop() {
                        debug!("Subtree of {} ended at a sibling", frame.scope);
                    }
                    match stack.last_mut() {
                        Some(outer) => {
                            for thing in rest.into_iter().rev() {
                                outer.items.push_front(thing);
                            }
                        }
                        None => {
                            unconsumed = rest.into();
                            break;
                        }
                    }
                    continue;
                }
            };

            let parent = thing
                .parent_id()
                .filter(|p| table.contains_key(*p))
                .map(str::to_string);

            match (thing, parent) {
                (Thing::Entry(entry), Some(parent)) => {
                    if table.contains_key(&entry.full_id) {
                        warn!("{} is already in the tree, keeping the first copy", entry.full_id);
                        duplicates.push(Thing::Entry(entry));
                        continue;
                    }
                    let id = entry.full_id.clone();
                    let parent_of_entry = entry.parent_id.clone();
                    if let Some(slot) = table.get_mut(&parent) {
                        slot.children.push(id.clone());
                    }
                    table.insert(id, Slot::new(Some(entry), parent_of_entry));
                }
                (Thing::Continuation(more), Some(parent)) => {
                    let over_budget = self.max_fetches.map_or(false, |max| fetches >= max);
                    if over_budget || !expanded.insert(more.full_id.clone()) {
                        if !over_budget {
                            warn!("Continuation {} came back again, leaving it pending", more.full_id);
                        }
                        if let Some(slot) = table.get_mut(&parent) {
                            slot.pending.push(more);
                        }
                        continue;
                    }

                    fetches += 1;
                    debug!(
                        "Resolving {} ({} children) under {}",
                        more.full_id,
                        more.children.len(),
                        parent
                    );
                    let things = self
                        .cancel
                        .guard(self.source.expand(&self.link_id, &more))
                        .await?;

                    let boundary = table.get(&parent).and_then(|slot| slot.parent_id.clone());
                    stack.push(Frame {
                        scope: parent,
                        boundary,
                        items: things.into(),
                    });
                }
                (thing, None) => {
                    debug!("No parent for {} in this tree", thing.full_id());
                    orphans.push(thing);
                }
            }
        }

        let root = build(&mut table, &root_id);
        Ok(CommentTree {
            root,
            orphans,
            duplicates,
            unconsumed,
            fetches,
        })
    }
}

fn next_step(frame: &mut Frame) -> Step {
    let thing = match frame.items.pop_front() {
        Some(thing) => thing,
        None => return Step::Drained,
    };

    let is_sibling = match (&frame.boundary, thing.parent_id()) {
        (Some(boundary), Some(parent)) => boundary == parent,
        _ => false,
    };

    if is_sibling {
        let mut rest = std::mem::take(&mut frame.items);
        rest.push_front(thing);
        Step::Boundary(rest)
    } else {
        Step::Attach(thing)
    }
}

/// Materialise the subtree under `root_id`, depth first on an explicit
/// stack so deep reply chains cannot exhaust the call stack.
fn build(table: &mut HashMap<String, Slot>, root_id: &str) -> TreeNode {
    let mut stack = vec![open_node(table, root_id)];

    while let Some((node, mut rest)) = stack.pop() {
        if let Some(child) = rest.next() {
            stack.push((node, rest));
            stack.push(open_node(table, &child));
            continue;
        }
        match stack.last_mut() {
            Some((parent, _)) => parent.children.push(node),
            None => return node,
        }
    }

    TreeNode {
        full_id: root_id.to_string(),
        entry: None,
        children: Vec::new(),
        pending: Vec::new(),
    }
}

fn open_node(table: &mut HashMap<String, Slot>, id: &str) -> (TreeNode, std::vec::IntoIter<String>) {
    let slot = table.remove(id).unwrap_or_else(|| Slot::new(None, None));
    let node = TreeNode {
        full_id: id.to_string(),
        entry: slot.entry,
        children: Vec::with_capacity(slot.children.len()),
        pending: slot.pending,
    };
    (node, slot.children.into_iter())
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::Mutex;

    fn entry(id: &str, parent: &str) -> Thing {
        Thing::from_value(json!({
            "kind": "t1",
            "data": {"id": id, "name": id, "parent_id": parent}
        }))
        .unwrap()
    }

    fn more(id: &str, parent: &str, children: &[&str]) -> Thing {
        Thing::from_value(json!({
            "kind": "more",
            "data": {"id": id, "name": id, "parent_id": parent, "children": children, "count": children.len()}
        }))
        .unwrap()
    }

    /// Answers each continuation id from a fixed table and records calls.
    struct FixedSource {
        answers: HashMap<String, Vec<Thing>>,
        calls: Mutex<Vec<String>>,
    }

    impl FixedSource {
        fn new(answers: Vec<(&str, Vec<Thing>)>) -> Arc<Self> {
            Arc::new(Self {
                answers: answers
                    .into_iter()
                    .map(|(k, v)| (k.to_string(), v))
                    .collect(),
                calls: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl ContinuationSource for FixedSource {
        async fn expand(&self, _link_id: &str, more: &Continuation) -> Result<Vec<Thing>, RedditClientError> {
            self.calls.lock().unwrap().push(more.full_id.clone());
            self.answers
                .get(&more.full_id)
                .cloned()
                .ok_or_else(|| RedditClientError::ApiError(format!("no answer for {}", more.full_id)))
        }
    }

    #[tokio::test]
    async fn continuation_is_spliced_in_place() {
        let source = FixedSource::new(vec![("M", vec![entry("B", "R"), entry("C", "R")])]);
        let assembler = TreeAssembler::new(source.clone(), "R");

        let tree = assembler
            .assemble(
                Root::new("R", None),
                vec![entry("A", "R"), more("M", "R", &["B", "C"]), entry("D", "R")],
            )
            .await
            .unwrap();

        assert_eq!(tree.root.child_ids(), vec!["A", "B", "C", "D"]);
        assert!(tree.is_complete());
        assert_eq!(tree.fetches, 1);
        assert_eq!(*source.calls.lock().unwrap(), vec!["M".to_string()]);
    }

    #[tokio::test]
    async fn nested_continuations_resolve_depth_first() {
        let source = FixedSource::new(vec![
            ("M1", vec![entry("B", "A"), more("M2", "B", &["C"]), entry("D", "A")]),
            ("M2", vec![entry("C", "B")]),
        ]);
        let assembler = TreeAssembler::new(source, "R");

        let tree = assembler
            .assemble(
                Root::new("R", None),
                vec![entry("A", "R"), more("M1", "A", &["B", "D"]), entry("E", "R")],
            )
            .await
            .unwrap();

        assert_eq!(tree.root.child_ids(), vec!["A", "E"]);
        let a = tree.root.find("A").unwrap();
        assert_eq!(a.child_ids(), vec!["B", "D"]);
        assert_eq!(tree.root.find("B").unwrap().child_ids(), vec!["C"]);
        assert_eq!(tree.fetches, 2);
        assert_eq!(tree.root.descendants(), 5);
    }

    #[tokio::test]
    async fn inner_frame_hands_siblings_back_to_outer_frame() {
        // M hangs off A, but its answer also carries E, a sibling of A.
        let source = FixedSource::new(vec![("M", vec![entry("B", "A"), entry("E", "R"), entry("F", "A")])]);
        let assembler = TreeAssembler::new(source, "R");

        let tree = assembler
            .assemble(
                Root::new("R", None),
                vec![entry("A", "R"), more("M", "A", &["B"]), entry("G", "R")],
            )
            .await
            .unwrap();

        assert_eq!(tree.root.child_ids(), vec!["A", "E", "G"]);
        // F came after the boundary and was consumed by the outer frame.
        assert_eq!(tree.root.find("A").unwrap().child_ids(), vec!["B", "F"]);
    }

    #[tokio::test]
    async fn outer_frame_stops_at_root_sibling() {
        let source = FixedSource::new(vec![]);
        let assembler = TreeAssembler::new(source, "t3_p");

        let tree = assembler
            .assemble(
                Root::new("X", Some("t3_p".to_string())),
                vec![entry("Y", "X"), entry("Z", "t3_p"), entry("W", "X")],
            )
            .await
            .unwrap();

        assert_eq!(tree.root.child_ids(), vec!["Y"]);
        let rest: Vec<_> = tree.unconsumed.iter().map(|t| t.full_id()).collect();
        assert_eq!(rest, vec!["Z", "W"]);
    }

    #[tokio::test]
    async fn fetch_budget_leaves_continuations_pending() {
        let source = FixedSource::new(vec![("M", vec![entry("B", "R")])]);
        let assembler = TreeAssembler::new(source.clone(), "R").with_max_fetches(0);

        let tree = assembler
            .assemble(Root::new("R", None), vec![entry("A", "R"), more("M", "R", &["B"])])
            .await
            .unwrap();

        assert_eq!(tree.root.child_ids(), vec!["A"]);
        assert_eq!(tree.root.pending.len(), 1);
        assert!(!tree.is_complete());
        assert!(source.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn repeated_continuation_is_not_fetched_twice() {
        let source = FixedSource::new(vec![("M", vec![entry("B", "R"), more("M", "R", &["B"])])]);
        let assembler = TreeAssembler::new(source.clone(), "R");

        let tree = assembler
            .assemble(Root::new("R", None), vec![more("M", "R", &["B"])])
            .await
            .unwrap();

        assert_eq!(tree.root.child_ids(), vec!["B"]);
        assert_eq!(tree.root.pending.len(), 1);
        assert_eq!(source.calls.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn orphans_and_duplicates_are_not_attached() {
        let source = FixedSource::new(vec![]);
        let assembler = TreeAssembler::new(source, "R");

        let tree = assembler
            .assemble(
                Root::new("R", None),
                vec![entry("A", "R"), entry("A", "R"), entry("Q", "nowhere")],
            )
            .await
            .unwrap();

        assert_eq!(tree.root.child_ids(), vec!["A"]);
        assert_eq!(tree.orphans.len(), 1);
        assert_eq!(tree.orphans[0].full_id(), "Q");
        assert_eq!(tree.duplicates.len(), 1);
        assert_eq!(tree.duplicates[0].full_id(), "A");
    }

    #[tokio::test]
    async fn fetch_failure_aborts_assembly() {
        let source = FixedSource::new(vec![]);
        let assembler = TreeAssembler::new(source, "R");

        let res = assembler
            .assemble(Root::new("R", None), vec![entry("A", "R"), more("M", "R", &["B"])])
            .await;

        assert!(matches!(res, Err(RedditClientError::ApiError(_))));
    }

    #[tokio::test]
    async fn cancelled_assembly_unwinds() {
        let source = FixedSource::new(vec![("M", vec![entry("B", "R")])]);
        let cancel = CancelToken::new();
        cancel.cancel();
        let assembler = TreeAssembler::new(source, "R").with_cancel(cancel);

        let res = assembler
            .assemble(Root::new("R", None), vec![more("M", "R", &["B"])])
            .await;

        assert!(matches!(res, Err(RedditClientError::Cancelled)));
    }

    #[tokio::test]
    async fn long_reply_chain_is_built_in_order() {
        let source = FixedSource::new(vec![]);
        let assembler = TreeAssembler::new(source, "R");

        let mut input = vec![entry("c0", "R")];
        for i in 1..2000 {
            input.push(entry(&format!("c{}", i), &format!("c{}", i - 1)));
        }

        let tree = assembler.assemble(Root::new("R", None), input).await.unwrap();

        assert_eq!(tree.root.descendants(), 2000);
        let (depth, deepest) = tree.root.iter().last().unwrap();
        assert_eq!(depth, 2000);
        assert_eq!(deepest.full_id, "c1999");
    }

    #[test]
    fn walk_is_preorder_with_depths() {
        let leaf = |id: &str| TreeNode {
            full_id: id.to_string(),
            entry: None,
            children: Vec::new(),
            pending: Vec::new(),
        };
        let tree = TreeNode {
            children: vec![
                TreeNode {
                    children: vec![leaf("b")],
                    ..leaf("a")
                },
                leaf("c"),
            ],
            ..leaf("r")
        };

        let walked: Vec<_> = tree.iter().map(|(d, n)| (d, n.full_id.as_str())).collect();
        assert_eq!(walked, vec![(0, "r"), (1, "a"), (2, "b"), (1, "c")]);
    }
}
