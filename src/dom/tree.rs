//! Node tree and the DOM mutation algorithms
//!
//! Parents own their children; the parent link is a plain id. Every
//! operation validates completely before touching the tree, so a failed
//! call leaves it exactly as it was. Each successful structural edit
//! records exactly one command.

use super::node::{Node, NodeId, NodeType};
use crate::error::BridgeError;
use crate::gc::{GcVisitor, Trace};
use crate::ui_command::UICommandBuffer;
use crate::value::ObjectId;
use lazy_static::lazy_static;
use regex::Regex;
use std::collections::HashMap;

lazy_static! {
    static ref TAG_NAME: Regex = Regex::new(r"^[A-Za-z][A-Za-z0-9\-_.:]*$").unwrap();
}

/// Arena of nodes rooted at one document
pub struct NodeTree {
    nodes: HashMap<NodeId, Node>,
    next_id: u32,
    document: NodeId,
    /// Detached nodes waiting for a reclamation check
    disposal_queue: Vec<NodeId>,
}

impl NodeTree {
    /// Create a tree holding only its document node
    pub fn new(commands: &mut UICommandBuffer) -> Self {
        let mut tree = NodeTree {
            nodes: HashMap::new(),
            next_id: 1,
            document: NodeId(0),
            disposal_queue: Vec::new(),
        };
        tree.document = tree.insert_node(NodeType::Document, "", "", commands);
        tree
    }

    fn insert_node(
        &mut self,
        node_type: NodeType,
        local_name: &str,
        data: &str,
        commands: &mut UICommandBuffer,
    ) -> NodeId {
        let id = NodeId(self.next_id);
        self.next_id += 1;
        self.nodes.insert(id, Node::new(id, node_type, local_name, data));
        commands.record_create(id, node_type, local_name);
        id
    }

    pub fn create_element(&mut self, tag: &str, commands: &mut UICommandBuffer) -> Result<NodeId, BridgeError> {
        if !TAG_NAME.is_match(tag) {
            return Err(BridgeError::Type(format!("'{}' is not a valid tag name", tag)));
        }
        Ok(self.insert_node(NodeType::Element, &tag.to_ascii_lowercase(), "", commands))
    }

    pub fn create_text(&mut self, data: &str, commands: &mut UICommandBuffer) -> NodeId {
        self.insert_node(NodeType::Text, "", data, commands)
    }

    pub fn create_comment(&mut self, data: &str, commands: &mut UICommandBuffer) -> NodeId {
        self.insert_node(NodeType::Comment, "", data, commands)
    }

    pub fn create_fragment(&mut self, commands: &mut UICommandBuffer) -> NodeId {
        self.insert_node(NodeType::DocumentFragment, "", "", commands)
    }

    pub fn create_doctype(&mut self, name: &str, commands: &mut UICommandBuffer) -> NodeId {
        self.insert_node(NodeType::DocumentType, name, "", commands)
    }

    #[inline]
    pub fn document(&self) -> NodeId {
        self.document
    }

    pub fn get(&self, id: NodeId) -> Result<&Node, BridgeError> {
        self.nodes.get(&id).ok_or(BridgeError::InvalidNode(id))
    }

    pub fn get_mut(&mut self, id: NodeId) -> Result<&mut Node, BridgeError> {
        self.nodes.get_mut(&id).ok_or(BridgeError::InvalidNode(id))
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.nodes.contains_key(&id)
    }

    /// Number of live nodes, the document included
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    // Traversal

    pub fn parent_node(&self, id: NodeId) -> Result<Option<NodeId>, BridgeError> {
        Ok(self.get(id)?.parent)
    }

    pub fn child_nodes(&self, id: NodeId) -> Result<&[NodeId], BridgeError> {
        Ok(&self.get(id)?.children)
    }

    pub fn first_child(&self, id: NodeId) -> Result<Option<NodeId>, BridgeError> {
        Ok(self.get(id)?.children.first().copied())
    }

    pub fn last_child(&self, id: NodeId) -> Result<Option<NodeId>, BridgeError> {
        Ok(self.get(id)?.children.last().copied())
    }

    pub fn previous_sibling(&self, id: NodeId) -> Result<Option<NodeId>, BridgeError> {
        self.sibling(id, -1)
    }

    pub fn next_sibling(&self, id: NodeId) -> Result<Option<NodeId>, BridgeError> {
        self.sibling(id, 1)
    }

    fn sibling(&self, id: NodeId, offset: isize) -> Result<Option<NodeId>, BridgeError> {
        let Some(parent) = self.get(id)?.parent else {
            return Ok(None);
        };
        let siblings = &self.get(parent)?.children;
        let idx = self.index_in_parent(siblings, id)? as isize + offset;
        if idx < 0 {
            return Ok(None);
        }
        Ok(siblings.get(idx as usize).copied())
    }

    fn index_in_parent(&self, siblings: &[NodeId], id: NodeId) -> Result<usize, BridgeError> {
        siblings
            .iter()
            .position(|&c| c == id)
            .ok_or_else(|| BridgeError::NotFound(format!("node {} is not a child of its parent", id)))
    }

    /// Walking parent links from `id` reaches the document
    pub fn is_connected(&self, id: NodeId) -> Result<bool, BridgeError> {
        let mut current = Some(id);
        while let Some(node) = current {
            if node == self.document {
                return Ok(true);
            }
            current = self.get(node)?.parent;
        }
        Ok(false)
    }

    /// `ancestor` is `node` or one of its ancestors
    pub fn is_inclusive_ancestor(&self, ancestor: NodeId, node: NodeId) -> bool {
        let mut current = Some(node);
        while let Some(id) = current {
            if id == ancestor {
                return true;
            }
            current = self.nodes.get(&id).and_then(|n| n.parent);
        }
        false
    }

    pub fn text_content(&self, id: NodeId) -> Result<Option<String>, BridgeError> {
        let node = self.get(id)?;
        Ok((node.node_type.ops().text_content)(self, node))
    }

    // Mutation

    /// Validation shared by every insertion
    fn ensure_pre_insertion_validity(&self, parent: NodeId, child: NodeId) -> Result<(), BridgeError> {
        let parent_node = self.get(parent)?;
        let child_node = self.get(child)?;
        if !parent_node.node_type.ops().accepts_children {
            return Err(BridgeError::HierarchyRequest(format!(
                "{} nodes may not have children",
                parent_node.node_name()
            )));
        }
        if child_node.node_type == NodeType::Document {
            return Err(BridgeError::HierarchyRequest(
                "a document cannot be inserted".to_string(),
            ));
        }
        if self.is_inclusive_ancestor(child, parent) {
            return Err(BridgeError::HierarchyRequest(
                "the new child contains the parent".to_string(),
            ));
        }
        Ok(())
    }

    /// Unlink `id` from its parent's children, if any
    fn ensure_detached(&mut self, id: NodeId) {
        let parent = self.nodes.get_mut(&id).and_then(|n| n.parent.take());
        if let Some(parent) = parent {
            if let Some(parent_node) = self.nodes.get_mut(&parent) {
                parent_node.children.retain(|&c| c != id);
            }
        }
    }

    pub fn append_child(
        &mut self,
        parent: NodeId,
        child: NodeId,
        commands: &mut UICommandBuffer,
    ) -> Result<NodeId, BridgeError> {
        self.ensure_pre_insertion_validity(parent, child)?;
        self.ensure_detached(child);
        self.link(parent, child, None);
        commands.record_append(parent, child);
        Ok(child)
    }

    pub fn insert_before(
        &mut self,
        parent: NodeId,
        child: NodeId,
        reference: Option<NodeId>,
        commands: &mut UICommandBuffer,
    ) -> Result<NodeId, BridgeError> {
        let Some(mut reference) = reference else {
            return self.append_child(parent, child, commands);
        };
        if self.get(reference)?.parent != Some(parent) {
            return Err(BridgeError::NotFound(format!(
                "node {} is not a child of node {}",
                reference, parent
            )));
        }
        self.ensure_pre_insertion_validity(parent, child)?;

        if reference == child {
            match self.next_sibling(child)? {
                Some(next) => reference = next,
                // Already the last child: a no-op move to the end
                None => return self.append_child(parent, child, commands),
            }
        }

        self.ensure_detached(child);
        self.link(parent, child, Some(reference));
        commands.record_insert_before(parent, child, reference);
        Ok(child)
    }

    /// Remove `id` from its parent. A parentless node is left alone.
    pub fn remove(&mut self, id: NodeId, commands: &mut UICommandBuffer) -> Result<(), BridgeError> {
        if self.get(id)?.parent.is_none() {
            return Ok(());
        }
        self.ensure_detached(id);
        self.disposal_queue.push(id);
        commands.record_remove(id);
        Ok(())
    }

    pub fn remove_child(
        &mut self,
        parent: NodeId,
        child: NodeId,
        commands: &mut UICommandBuffer,
    ) -> Result<NodeId, BridgeError> {
        self.get(parent)?;
        if self.get(child)?.parent != Some(parent) {
            return Err(BridgeError::NotFound(format!(
                "node {} is not a child of node {}",
                child, parent
            )));
        }
        self.remove(child, commands)?;
        Ok(child)
    }

    /// Put `new_child` at `old_child`'s index in one step. Returns the old child.
    pub fn replace_child(
        &mut self,
        parent: NodeId,
        new_child: NodeId,
        old_child: NodeId,
        commands: &mut UICommandBuffer,
    ) -> Result<NodeId, BridgeError> {
        if self.get(old_child)?.parent != Some(parent) {
            return Err(BridgeError::NotFound(format!(
                "node {} is not a child of node {}",
                old_child, parent
            )));
        }
        self.ensure_pre_insertion_validity(parent, new_child)?;
        if new_child == old_child {
            return Ok(old_child);
        }

        self.ensure_detached(new_child);
        let parent_node = self.get_mut(parent)?;
        let Some(idx) = parent_node.children.iter().position(|&c| c == old_child) else {
            return Err(BridgeError::NotFound(format!("node {} vanished", old_child)));
        };
        parent_node.children[idx] = new_child;
        self.get_mut(new_child)?.parent = Some(parent);
        self.get_mut(old_child)?.parent = None;
        self.disposal_queue.push(old_child);
        commands.record_replace(parent, new_child, old_child);
        Ok(old_child)
    }

    /// Attach a detached node before `reference`, or at the end
    fn link(&mut self, parent: NodeId, child: NodeId, reference: Option<NodeId>) {
        if let Some(parent_node) = self.nodes.get_mut(&parent) {
            let idx = reference
                .and_then(|r| parent_node.children.iter().position(|&c| c == r))
                .unwrap_or(parent_node.children.len());
            parent_node.children.insert(idx, child);
        }
        if let Some(child_node) = self.nodes.get_mut(&child) {
            child_node.parent = Some(parent);
        }
    }

    pub fn set_attribute(
        &mut self,
        id: NodeId,
        name: &str,
        value: &str,
        commands: &mut UICommandBuffer,
    ) -> Result<(), BridgeError> {
        let node = self.get_mut(id)?;
        if node.node_type != NodeType::Element {
            return Err(BridgeError::Type("setAttribute is only defined on elements".to_string()));
        }
        node.set_attribute(name, value);
        commands.record_set_property(id, name, value);
        Ok(())
    }

    /// Replace the character data of a text or comment node
    pub fn set_data(&mut self, id: NodeId, data: &str, commands: &mut UICommandBuffer) -> Result<(), BridgeError> {
        let node = self.get_mut(id)?;
        if !node.node_type.is_character_data() {
            return Err(BridgeError::Type(format!(
                "{} nodes carry no character data",
                node.node_name()
            )));
        }
        node.data = data.to_string();
        commands.record_set_property(id, "data", data);
        Ok(())
    }

    // Lifetime

    pub fn set_wrapper(&mut self, id: NodeId, wrapper: ObjectId) -> Result<(), BridgeError> {
        self.get_mut(id)?.wrapper = Some(wrapper);
        Ok(())
    }

    /// The collector swept the node's wrapper
    pub fn wrapper_finalized(&mut self, id: NodeId) {
        if let Some(node) = self.nodes.get_mut(&id) {
            node.wrapper = None;
            if node.parent.is_none() {
                self.disposal_queue.push(id);
            }
        }
    }

    pub fn pin(&mut self, id: NodeId) -> Result<u32, BridgeError> {
        let node = self.get_mut(id)?;
        node.pins += 1;
        Ok(node.pins)
    }

    pub fn unpin(&mut self, id: NodeId) -> Result<u32, BridgeError> {
        let node = self.get_mut(id)?;
        node.pins = node.pins.saturating_sub(1);
        let pins = node.pins;
        if pins == 0 && node.parent.is_none() {
            self.disposal_queue.push(id);
        }
        Ok(pins)
    }

    /// Nodes waiting for a reclamation check
    pub fn pending_disposal(&self) -> &[NodeId] {
        &self.disposal_queue
    }

    /// Release every queued node that is detached, unpinned and has no
    /// live wrapper, together with the children it solely owned. Returns
    /// the number of nodes released.
    pub fn dispose_unreachable(&mut self) -> usize {
        let queue = std::mem::take(&mut self.disposal_queue);
        let mut released = 0;
        for id in queue {
            let reclaimable = self.nodes.get(&id).is_some_and(|n| n.is_reclaimable());
            if reclaimable && id != self.document {
                released += self.dispose_subtree(id);
            }
        }
        released
    }

    fn dispose_subtree(&mut self, root: NodeId) -> usize {
        let mut released = 0;
        let mut stack = vec![root];
        while let Some(id) = stack.pop() {
            let Some(node) = self.nodes.remove(&id) else {
                continue;
            };
            released += 1;
            for child in node.children {
                if let Some(child_node) = self.nodes.get_mut(&child) {
                    child_node.parent = None;
                    if child_node.is_reclaimable() {
                        stack.push(child);
                    }
                }
            }
        }
        log::trace!("released {} node(s) rooted at {}", released, root);
        released
    }

    /// Drop every node. Used at context teardown.
    pub fn clear(&mut self) {
        self.nodes.clear();
        self.disposal_queue.clear();
    }

    /// Forward the wrappers of `id`'s children and its listener callbacks.
    ///
    /// An attached child without a wrapper means the reachability invariant
    /// is already broken; the process aborts rather than let the collector
    /// free objects that are still in use.
    pub fn trace_node(&self, id: NodeId, visitor: &mut GcVisitor<'_>) {
        let Some(node) = self.nodes.get(&id) else {
            return;
        };
        for child in &node.children {
            match self.nodes.get(child).and_then(|c| c.wrapper) {
                Some(wrapper) => visitor.trace_object(wrapper),
                None => {
                    log::error!("attached node {} has no script wrapper during tracing", child);
                    std::process::abort();
                }
            }
        }
        node.target.trace(visitor);
    }

    /// Iterate over all live nodes
    pub fn iter(&self) -> impl Iterator<Item = &Node> {
        self.nodes.values()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ui_command::UICommandKind;

    fn setup() -> (NodeTree, UICommandBuffer) {
        let mut commands = UICommandBuffer::new(1);
        let tree = NodeTree::new(&mut commands);
        commands.clear();
        (tree, commands)
    }

    fn record_mark(runtime: &mut dyn std::any::Any, object: ObjectId) {
        if let Some(marks) = runtime.downcast_mut::<Vec<ObjectId>>() {
            marks.push(object);
        }
    }

    #[test]
    fn test_trace_node_forwards_each_owned_child_once() {
        let (mut tree, mut cmds) = setup();
        let list = tree.create_element("ul", &mut cmds).unwrap();
        let items: Vec<NodeId> = (0..3)
            .map(|_| tree.create_element("li", &mut cmds).unwrap())
            .collect();
        for (n, item) in items.iter().enumerate() {
            tree.append_child(list, *item, &mut cmds).unwrap();
            tree.set_wrapper(*item, ObjectId(100 + n as u64)).unwrap();
        }
        tree.set_wrapper(list, ObjectId(50)).unwrap();
        let detached = tree.create_element("li", &mut cmds).unwrap();
        tree.set_wrapper(detached, ObjectId(999)).unwrap();

        let mut marks: Vec<ObjectId> = Vec::new();
        tree.trace_node(list, &mut GcVisitor::new(&mut marks, record_mark));
        assert_eq!(marks, vec![ObjectId(100), ObjectId(101), ObjectId(102)]);

        tree.remove(items[1], &mut cmds).unwrap();
        let mut marks: Vec<ObjectId> = Vec::new();
        tree.trace_node(list, &mut GcVisitor::new(&mut marks, record_mark));
        assert_eq!(marks, vec![ObjectId(100), ObjectId(102)]);
    }

    #[test]
    fn test_append_child() {
        let (mut tree, mut cmds) = setup();
        let doc = tree.document();
        let a = tree.create_element("div", &mut cmds).unwrap();
        let b = tree.create_element("span", &mut cmds).unwrap();
        tree.append_child(doc, a, &mut cmds).unwrap();
        tree.append_child(a, b, &mut cmds).unwrap();

        assert_eq!(tree.parent_node(b).unwrap(), Some(a));
        assert_eq!(tree.last_child(a).unwrap(), Some(b));
        assert!(tree.is_connected(b).unwrap());
    }

    #[test]
    fn test_append_moves_node() {
        let (mut tree, mut cmds) = setup();
        let a = tree.create_element("div", &mut cmds).unwrap();
        let c = tree.create_element("div", &mut cmds).unwrap();
        let b = tree.create_text("x", &mut cmds);
        tree.append_child(c, b, &mut cmds).unwrap();
        cmds.clear();

        tree.append_child(a, b, &mut cmds).unwrap();
        assert!(tree.child_nodes(c).unwrap().is_empty());
        assert_eq!(tree.child_nodes(a).unwrap(), &[b]);
        assert_eq!(cmds.len(), 1);
        assert_eq!(cmds.commands()[0].kind, UICommandKind::Append);
    }

    #[test]
    fn test_append_ancestor_fails() {
        let (mut tree, mut cmds) = setup();
        let a = tree.create_element("div", &mut cmds).unwrap();
        let b = tree.create_element("div", &mut cmds).unwrap();
        tree.append_child(a, b, &mut cmds).unwrap();
        cmds.clear();

        let err = tree.append_child(b, a, &mut cmds).unwrap_err();
        assert!(matches!(err, BridgeError::HierarchyRequest(_)));
        assert!(matches!(
            tree.append_child(a, a, &mut cmds),
            Err(BridgeError::HierarchyRequest(_))
        ));
        assert_eq!(tree.child_nodes(a).unwrap(), &[b]);
        assert!(tree.child_nodes(b).unwrap().is_empty());
        assert!(cmds.is_empty());
    }

    #[test]
    fn test_text_cannot_have_children() {
        let (mut tree, mut cmds) = setup();
        let text = tree.create_text("x", &mut cmds);
        let el = tree.create_element("p", &mut cmds).unwrap();
        assert!(matches!(
            tree.append_child(text, el, &mut cmds),
            Err(BridgeError::HierarchyRequest(_))
        ));
        assert_eq!(tree.parent_node(el).unwrap(), None);
    }

    #[test]
    fn test_document_cannot_be_inserted() {
        let (mut tree, mut cmds) = setup();
        let el = tree.create_element("p", &mut cmds).unwrap();
        let doc = tree.document();
        assert!(matches!(
            tree.append_child(el, doc, &mut cmds),
            Err(BridgeError::HierarchyRequest(_))
        ));
    }

    #[test]
    fn test_invalid_tag_name() {
        let (mut tree, mut cmds) = setup();
        assert!(matches!(
            tree.create_element("1div", &mut cmds),
            Err(BridgeError::Type(_))
        ));
        assert!(matches!(tree.create_element("", &mut cmds), Err(BridgeError::Type(_))));
        let div = tree.create_element("DIV", &mut cmds).unwrap();
        assert_eq!(tree.get(div).unwrap().local_name(), "div");
    }

    #[test]
    fn test_insert_before() {
        let (mut tree, mut cmds) = setup();
        let p = tree.create_element("ul", &mut cmds).unwrap();
        let a = tree.create_element("li", &mut cmds).unwrap();
        let b = tree.create_element("li", &mut cmds).unwrap();
        let c = tree.create_element("li", &mut cmds).unwrap();
        tree.append_child(p, a, &mut cmds).unwrap();
        tree.append_child(p, c, &mut cmds).unwrap();
        tree.insert_before(p, b, Some(c), &mut cmds).unwrap();
        assert_eq!(tree.child_nodes(p).unwrap(), &[a, b, c]);

        // Reference absent means append
        let d = tree.create_element("li", &mut cmds).unwrap();
        tree.insert_before(p, d, None, &mut cmds).unwrap();
        assert_eq!(tree.child_nodes(p).unwrap(), &[a, b, c, d]);

        // Moving within the same parent
        tree.insert_before(p, d, Some(a), &mut cmds).unwrap();
        assert_eq!(tree.child_nodes(p).unwrap(), &[d, a, b, c]);
    }

    #[test]
    fn test_insert_before_self_reference() {
        let (mut tree, mut cmds) = setup();
        let p = tree.create_element("ul", &mut cmds).unwrap();
        let a = tree.create_element("li", &mut cmds).unwrap();
        let b = tree.create_element("li", &mut cmds).unwrap();
        tree.append_child(p, a, &mut cmds).unwrap();
        tree.append_child(p, b, &mut cmds).unwrap();
        tree.insert_before(p, a, Some(a), &mut cmds).unwrap();
        assert_eq!(tree.child_nodes(p).unwrap(), &[a, b]);
    }

    #[test]
    fn test_insert_before_not_child() {
        let (mut tree, mut cmds) = setup();
        let p = tree.create_element("ul", &mut cmds).unwrap();
        let stranger = tree.create_element("li", &mut cmds).unwrap();
        let new = tree.create_element("li", &mut cmds).unwrap();
        cmds.clear();
        let err = tree.insert_before(p, new, Some(stranger), &mut cmds).unwrap_err();
        assert!(matches!(err, BridgeError::NotFound(_)));
        assert!(tree.child_nodes(p).unwrap().is_empty());
        assert!(cmds.is_empty());
    }

    #[test]
    fn test_replace_child_keeps_index() {
        let (mut tree, mut cmds) = setup();
        let p = tree.create_element("ul", &mut cmds).unwrap();
        let kids: Vec<_> = (0..3)
            .map(|_| {
                let li = tree.create_element("li", &mut cmds).unwrap();
                tree.append_child(p, li, &mut cmds).unwrap();
                li
            })
            .collect();
        let new = tree.create_element("li", &mut cmds).unwrap();

        let old = tree.replace_child(p, new, kids[1], &mut cmds).unwrap();
        assert_eq!(old, kids[1]);
        assert_eq!(tree.child_nodes(p).unwrap(), &[kids[0], new, kids[2]]);
        assert_eq!(tree.parent_node(kids[1]).unwrap(), None);
        assert_eq!(tree.parent_node(new).unwrap(), Some(p));
    }

    #[test]
    fn test_replace_with_sibling() {
        let (mut tree, mut cmds) = setup();
        let p = tree.create_element("ul", &mut cmds).unwrap();
        let a = tree.create_element("li", &mut cmds).unwrap();
        let b = tree.create_element("li", &mut cmds).unwrap();
        let c = tree.create_element("li", &mut cmds).unwrap();
        for id in [a, b, c] {
            tree.append_child(p, id, &mut cmds).unwrap();
        }
        tree.replace_child(p, a, c, &mut cmds).unwrap();
        assert_eq!(tree.child_nodes(p).unwrap(), &[b, a]);
    }

    #[test]
    fn test_replace_child_not_found() {
        let (mut tree, mut cmds) = setup();
        let p = tree.create_element("ul", &mut cmds).unwrap();
        let a = tree.create_element("li", &mut cmds).unwrap();
        let b = tree.create_element("li", &mut cmds).unwrap();
        assert!(matches!(
            tree.replace_child(p, a, b, &mut cmds),
            Err(BridgeError::NotFound(_))
        ));
    }

    #[test]
    fn test_remove_without_parent_is_noop() {
        let (mut tree, mut cmds) = setup();
        let a = tree.create_element("div", &mut cmds).unwrap();
        cmds.clear();
        tree.remove(a, &mut cmds).unwrap();
        assert!(cmds.is_empty());
        assert!(tree.pending_disposal().is_empty());
    }

    #[test]
    fn test_remove_child() {
        let (mut tree, mut cmds) = setup();
        let p = tree.create_element("div", &mut cmds).unwrap();
        let a = tree.create_element("div", &mut cmds).unwrap();
        let b = tree.create_element("div", &mut cmds).unwrap();
        tree.append_child(p, a, &mut cmds).unwrap();
        assert!(matches!(tree.remove_child(p, b, &mut cmds), Err(BridgeError::NotFound(_))));
        assert_eq!(tree.remove_child(p, a, &mut cmds).unwrap(), a);
        assert!(tree.child_nodes(p).unwrap().is_empty());
    }

    #[test]
    fn test_siblings() {
        let (mut tree, mut cmds) = setup();
        let p = tree.create_element("div", &mut cmds).unwrap();
        let a = tree.create_text("a", &mut cmds);
        let b = tree.create_text("b", &mut cmds);
        tree.append_child(p, a, &mut cmds).unwrap();
        tree.append_child(p, b, &mut cmds).unwrap();
        assert_eq!(tree.next_sibling(a).unwrap(), Some(b));
        assert_eq!(tree.previous_sibling(b).unwrap(), Some(a));
        assert_eq!(tree.previous_sibling(a).unwrap(), None);
        assert_eq!(tree.next_sibling(b).unwrap(), None);
        assert_eq!(tree.first_child(p).unwrap(), Some(a));
    }

    #[test]
    fn test_text_content() {
        let (mut tree, mut cmds) = setup();
        let p = tree.create_element("p", &mut cmds).unwrap();
        let span = tree.create_element("span", &mut cmds).unwrap();
        let hello = tree.create_text("hello ", &mut cmds);
        let world = tree.create_text("world", &mut cmds);
        let note = tree.create_comment("ignored", &mut cmds);
        tree.append_child(p, hello, &mut cmds).unwrap();
        tree.append_child(p, span, &mut cmds).unwrap();
        tree.append_child(span, world, &mut cmds).unwrap();
        tree.append_child(p, note, &mut cmds).unwrap();
        assert_eq!(tree.text_content(p).unwrap().as_deref(), Some("hello world"));
        assert_eq!(tree.text_content(tree.document()).unwrap(), None);
    }

    #[test]
    fn test_set_data() {
        let (mut tree, mut cmds) = setup();
        let t = tree.create_text("a", &mut cmds);
        let el = tree.create_element("p", &mut cmds).unwrap();
        tree.set_data(t, "b", &mut cmds).unwrap();
        assert_eq!(tree.get(t).unwrap().data(), "b");
        assert!(matches!(tree.set_data(el, "x", &mut cmds), Err(BridgeError::Type(_))));
    }

    #[test]
    fn test_dispose_unreachable() {
        let (mut tree, mut cmds) = setup();
        let doc = tree.document();
        let a = tree.create_element("div", &mut cmds).unwrap();
        let b = tree.create_element("div", &mut cmds).unwrap();
        let c = tree.create_element("div", &mut cmds).unwrap();
        tree.append_child(doc, a, &mut cmds).unwrap();
        tree.append_child(a, b, &mut cmds).unwrap();
        tree.append_child(a, c, &mut cmds).unwrap();
        // c keeps a live wrapper
        tree.set_wrapper(c, ObjectId(9)).unwrap();

        tree.remove(a, &mut cmds).unwrap();
        assert_eq!(tree.dispose_unreachable(), 2);
        assert!(!tree.contains(a));
        assert!(!tree.contains(b));
        assert!(tree.contains(c));
        assert_eq!(tree.parent_node(c).unwrap(), None);
    }

    #[test]
    fn test_pinned_node_survives() {
        let (mut tree, mut cmds) = setup();
        let doc = tree.document();
        let a = tree.create_element("div", &mut cmds).unwrap();
        tree.append_child(doc, a, &mut cmds).unwrap();
        tree.pin(a).unwrap();
        tree.remove(a, &mut cmds).unwrap();
        assert_eq!(tree.dispose_unreachable(), 0);
        assert!(tree.contains(a));

        assert_eq!(tree.unpin(a).unwrap(), 0);
        assert_eq!(tree.dispose_unreachable(), 1);
        assert!(!tree.contains(a));
    }
}
