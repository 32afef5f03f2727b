//! Node representation
//!
//! Every node kind shares one structural representation. Behaviour that
//! differs per kind (node name, whether children are allowed, text content)
//! lives in a static [`NodeKindOps`] table selected by [`NodeType::ops`].

use super::event_target::EventTargetData;
use super::tree::NodeTree;
use crate::value::ObjectId;
use std::fmt;

/// Identifier of a node
///
/// Allocated monotonically per tree and never reused, so the id stays
/// stable for the node's whole lifetime and is what the renderer sees.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub u32);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// DOM node type, with the standard numeric codes
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeType {
    Element = 1,
    Text = 3,
    Comment = 8,
    Document = 9,
    DocumentType = 10,
    DocumentFragment = 11,
}

impl NodeType {
    pub fn from_u8(code: u8) -> Option<Self> {
        match code {
            1 => Some(NodeType::Element),
            3 => Some(NodeType::Text),
            8 => Some(NodeType::Comment),
            9 => Some(NodeType::Document),
            10 => Some(NodeType::DocumentType),
            11 => Some(NodeType::DocumentFragment),
            _ => None,
        }
    }

    /// Kind-specific behaviour table
    pub fn ops(self) -> &'static NodeKindOps {
        match self {
            NodeType::Element => &ELEMENT_OPS,
            NodeType::Text => &TEXT_OPS,
            NodeType::Comment => &COMMENT_OPS,
            NodeType::Document => &DOCUMENT_OPS,
            NodeType::DocumentType => &DOCTYPE_OPS,
            NodeType::DocumentFragment => &FRAGMENT_OPS,
        }
    }

    /// Text and comment nodes carry character data
    #[inline]
    pub fn is_character_data(self) -> bool {
        matches!(self, NodeType::Text | NodeType::Comment)
    }
}

/// Per-kind function table
pub struct NodeKindOps {
    /// Value of `nodeName`
    pub node_name: fn(&Node) -> String,
    /// Whether nodes of this kind may have children
    pub accepts_children: bool,
    /// Value of `textContent`; `None` reads as `null`
    pub text_content: fn(&NodeTree, &Node) -> Option<String>,
}

static ELEMENT_OPS: NodeKindOps = NodeKindOps {
    node_name: |node| node.local_name.to_ascii_uppercase(),
    accepts_children: true,
    text_content: descendant_text,
};

static TEXT_OPS: NodeKindOps = NodeKindOps {
    node_name: |_| "#text".to_string(),
    accepts_children: false,
    text_content: |_, node| Some(node.data.clone()),
};

static COMMENT_OPS: NodeKindOps = NodeKindOps {
    node_name: |_| "#comment".to_string(),
    accepts_children: false,
    text_content: |_, node| Some(node.data.clone()),
};

static DOCUMENT_OPS: NodeKindOps = NodeKindOps {
    node_name: |_| "#document".to_string(),
    accepts_children: true,
    text_content: |_, _| None,
};

static DOCTYPE_OPS: NodeKindOps = NodeKindOps {
    node_name: |node| node.local_name.clone(),
    accepts_children: false,
    text_content: |_, _| None,
};

static FRAGMENT_OPS: NodeKindOps = NodeKindOps {
    node_name: |_| "#document-fragment".to_string(),
    accepts_children: true,
    text_content: descendant_text,
};

/// Concatenated data of all descendant text nodes, in document order
fn descendant_text(tree: &NodeTree, node: &Node) -> Option<String> {
    let mut out = String::new();
    let mut stack: Vec<NodeId> = node.children.iter().rev().copied().collect();
    while let Some(id) = stack.pop() {
        if let Ok(child) = tree.get(id) {
            if child.node_type == NodeType::Text {
                out.push_str(&child.data);
            }
            stack.extend(child.children.iter().rev().copied());
        }
    }
    Some(out)
}

/// A node of the native tree
pub struct Node {
    pub(crate) id: NodeId,
    pub(crate) node_type: NodeType,
    /// Tag name for elements, doctype name for document types
    pub(crate) local_name: String,
    /// Character data for text and comment nodes
    pub(crate) data: String,
    pub(crate) attributes: Vec<(String, String)>,
    /// Non-owning
    pub(crate) parent: Option<NodeId>,
    /// Owning, in document order
    pub(crate) children: Vec<NodeId>,
    pub(crate) target: EventTargetData,
    /// Paired script-visible object
    pub(crate) wrapper: Option<ObjectId>,
    /// Native references keeping a detached node alive
    pub(crate) pins: u32,
}

impl Node {
    pub(crate) fn new(id: NodeId, node_type: NodeType, local_name: &str, data: &str) -> Self {
        Node {
            id,
            node_type,
            local_name: local_name.to_string(),
            data: data.to_string(),
            attributes: Vec::new(),
            parent: None,
            children: Vec::new(),
            target: EventTargetData::default(),
            wrapper: None,
            pins: 0,
        }
    }

    #[inline]
    pub fn id(&self) -> NodeId {
        self.id
    }

    #[inline]
    pub fn node_type(&self) -> NodeType {
        self.node_type
    }

    pub fn node_name(&self) -> String {
        (self.node_type.ops().node_name)(self)
    }

    pub fn local_name(&self) -> &str {
        &self.local_name
    }

    pub fn data(&self) -> &str {
        &self.data
    }

    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    pub fn attributes(&self) -> &[(String, String)] {
        &self.attributes
    }

    #[inline]
    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    #[inline]
    pub fn children(&self) -> &[NodeId] {
        &self.children
    }

    #[inline]
    pub fn wrapper(&self) -> Option<ObjectId> {
        self.wrapper
    }

    pub fn event_target(&self) -> &EventTargetData {
        &self.target
    }

    pub fn event_target_mut(&mut self) -> &mut EventTargetData {
        &mut self.target
    }

    #[inline]
    pub fn pins(&self) -> u32 {
        self.pins
    }

    /// Not attached to any parent
    #[inline]
    pub fn is_detached(&self) -> bool {
        self.parent.is_none()
    }

    /// Detached, unpinned and without a live wrapper
    pub(crate) fn is_reclaimable(&self) -> bool {
        self.parent.is_none() && self.wrapper.is_none() && self.pins == 0
    }

    pub(crate) fn set_attribute(&mut self, name: &str, value: &str) {
        match self.attributes.iter_mut().find(|(key, _)| key == name) {
            Some(entry) => entry.1 = value.to_string(),
            None => self.attributes.push((name.to_string(), value.to_string())),
        }
    }
}

impl fmt::Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Node")
            .field("id", &self.id)
            .field("type", &self.node_type)
            .field("name", &self.node_name())
            .field("parent", &self.parent)
            .field("children", &self.children)
            .finish()
    }
}
