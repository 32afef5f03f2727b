use dombridge::ui_command::{decode_batch, encode_batch};
use dombridge::{NodeId, NodeTree, UICommandBuffer, UICommandKind};
use proptest::collection::vec;
use proptest::prelude::*;
use proptest::test_runner::TestCaseResult;

const DEFAULT_TREE_PROPTEST_CASES: u32 = 128;

fn tree_proptest_cases() -> u32 {
    std::env::var("DOMBRIDGE_PROPTEST_CASES")
        .ok()
        .and_then(|raw| raw.parse::<u32>().ok())
        .filter(|value| *value > 0)
        .unwrap_or(DEFAULT_TREE_PROPTEST_CASES)
}

#[derive(Clone, Debug)]
enum TreeOp {
    CreateElement(usize),
    CreateText,
    Append(usize, usize),
    InsertBefore(usize, usize, usize),
    Replace(usize, usize, usize),
    Remove(usize),
    SetAttribute(usize, String),
}

const TAGS: &[&str] = &["div", "span", "p", "ul", "li"];

fn tree_op_strategy() -> BoxedStrategy<TreeOp> {
    let idx = 0usize..32;
    prop_oneof![
        3 => (0..TAGS.len()).prop_map(TreeOp::CreateElement),
        1 => Just(TreeOp::CreateText),
        4 => (idx.clone(), idx.clone()).prop_map(|(p, c)| TreeOp::Append(p, c)),
        2 => (idx.clone(), idx.clone(), idx.clone()).prop_map(|(p, c, r)| TreeOp::InsertBefore(p, c, r)),
        1 => (idx.clone(), idx.clone(), idx.clone()).prop_map(|(p, n, o)| TreeOp::Replace(p, n, o)),
        2 => idx.clone().prop_map(TreeOp::Remove),
        1 => (idx, "[a-z]{0,6}").prop_map(|(n, v)| TreeOp::SetAttribute(n, v)),
    ]
    .boxed()
}

/// Picks an existing node by index, wrapping around
fn pick(ids: &[NodeId], idx: usize) -> NodeId {
    ids[idx % ids.len()]
}

/// Parent/child symmetry, no cycles, every child live
fn check_tree(tree: &NodeTree) -> TestCaseResult {
    for node in tree.iter() {
        let id = node.id();
        for child in node.children() {
            let child_node = tree.get(*child).map_err(|e| TestCaseError::fail(e.to_string()))?;
            prop_assert_eq!(child_node.parent(), Some(id));
        }
        let mut seen = std::collections::HashSet::new();
        prop_assert!(node.children().iter().all(|c| seen.insert(*c)), "duplicate child under {}", id);

        if let Some(parent) = node.parent() {
            let parent_node = tree.get(parent).map_err(|e| TestCaseError::fail(e.to_string()))?;
            prop_assert_eq!(parent_node.children().iter().filter(|c| **c == id).count(), 1);
        }

        let mut steps = 0;
        let mut current = node.parent();
        while let Some(p) = current {
            steps += 1;
            prop_assert!(steps <= tree.len(), "cycle through {}", id);
            current = tree.get(p).ok().and_then(|n| n.parent());
        }
    }
    prop_assert_eq!(tree.get(tree.document()).map(|d| d.parent()).ok(), Some(None));
    Ok(())
}

fn snapshot(tree: &NodeTree) -> Vec<(NodeId, Option<NodeId>, Vec<NodeId>)> {
    let mut nodes: Vec<_> = tree
        .iter()
        .map(|n| (n.id(), n.parent(), n.children().to_vec()))
        .collect();
    nodes.sort_by_key(|(id, _, _)| *id);
    nodes
}

/// The command a successful `op` records against the current tree, if any
fn expected_command(tree: &NodeTree, ids: &[NodeId], op: &TreeOp) -> Option<UICommandKind> {
    match op {
        TreeOp::CreateElement(_) | TreeOp::CreateText => Some(UICommandKind::Create),
        TreeOp::Append(..) => Some(UICommandKind::Append),
        TreeOp::InsertBefore(p, c, r) => {
            let (parent, child) = (pick(ids, *p), pick(ids, *c));
            // Inserting the last child before itself degrades to an append
            let to_end = child == pick(ids, *r) && tree.last_child(parent).ok().flatten() == Some(child);
            Some(if to_end {
                UICommandKind::Append
            } else {
                UICommandKind::InsertBefore
            })
        }
        TreeOp::Replace(_, n, o) => (pick(ids, *n) != pick(ids, *o)).then_some(UICommandKind::Replace),
        TreeOp::Remove(n) => tree
            .get(pick(ids, *n))
            .ok()
            .and_then(|node| node.parent())
            .map(|_| UICommandKind::Remove),
        TreeOp::SetAttribute(..) => Some(UICommandKind::SetProperty),
    }
}

fn run_ops(ops: &[TreeOp]) -> TestCaseResult {
    let mut commands = UICommandBuffer::new(1);
    let mut tree = NodeTree::new(&mut commands);
    let mut ids = vec![tree.document()];
    let mut log: Vec<UICommandKind> = commands.commands().iter().map(|c| c.kind).collect();

    for op in ops {
        let before = snapshot(&tree);
        let pending = commands.len();
        let expected = expected_command(&tree, &ids, op);
        let result = match op {
            TreeOp::CreateElement(tag) => tree.create_element(TAGS[*tag], &mut commands).map(|id| {
                ids.push(id);
            }),
            TreeOp::CreateText => {
                ids.push(tree.create_text("t", &mut commands));
                Ok(())
            }
            TreeOp::Append(p, c) => tree
                .append_child(pick(&ids, *p), pick(&ids, *c), &mut commands)
                .map(|_| ()),
            TreeOp::InsertBefore(p, c, r) => tree
                .insert_before(pick(&ids, *p), pick(&ids, *c), Some(pick(&ids, *r)), &mut commands)
                .map(|_| ()),
            TreeOp::Replace(p, n, o) => tree
                .replace_child(pick(&ids, *p), pick(&ids, *n), pick(&ids, *o), &mut commands)
                .map(|_| ()),
            TreeOp::Remove(n) => tree.remove(pick(&ids, *n), &mut commands),
            TreeOp::SetAttribute(n, value) => tree.set_attribute(pick(&ids, *n), "data-x", value, &mut commands),
        };

        if result.is_err() {
            prop_assert_eq!(snapshot(&tree), before, "failed {:?} mutated the tree", op);
            prop_assert_eq!(commands.len(), pending, "failed {:?} recorded a command", op);
        } else {
            let recorded: Vec<UICommandKind> = commands.commands()[pending..].iter().map(|c| c.kind).collect();
            prop_assert_eq!(recorded, expected.into_iter().collect::<Vec<_>>(), "{:?}", op);
            log.extend(expected);
        }
        check_tree(&tree)?;
    }

    let batch = commands.flush();
    prop_assert_eq!(batch.iter().map(|c| c.kind).collect::<Vec<_>>(), log);
    prop_assert_eq!(decode_batch(&encode_batch(&batch)), Ok(batch));
    Ok(())
}

proptest! {
    #![proptest_config(ProptestConfig {
        cases: tree_proptest_cases(),
        .. ProptestConfig::default()
    })]

    #[test]
    fn tree_mutations_keep_structure_consistent(ops in vec(tree_op_strategy(), 1..64)) {
        run_ops(&ops)?;
    }
}
