//! UI command buffer
//!
//! Append-only log of tree mutations destined for the external renderer.
//! The renderer only ever sees node ids, never native pointers.
//!
//! Wire layout of one entry (little-endian):
//! ```text
//! +--------+-----------+-------------+------------------+
//! | op: u8 | target:u32| length: u32 | operands[length] |
//! +--------+-----------+-------------+------------------+
//! ```
//! Strings inside operands are a `u32` byte length followed by UTF-8.

use crate::dom::{NodeId, NodeType};
use std::fmt;

/// Operation codes understood by the renderer
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UICommandKind {
    /// target = new node; operands = node type, name
    Create = 0,
    /// target = parent; operands = child
    Append = 1,
    /// target = removed node
    Remove = 2,
    /// target = parent; operands = child, reference
    InsertBefore = 3,
    /// target = parent; operands = new child, old child
    Replace = 4,
    /// target = node; operands = key, value
    SetProperty = 5,
}

impl UICommandKind {
    pub fn from_u8(op: u8) -> Option<Self> {
        match op {
            0 => Some(UICommandKind::Create),
            1 => Some(UICommandKind::Append),
            2 => Some(UICommandKind::Remove),
            3 => Some(UICommandKind::InsertBefore),
            4 => Some(UICommandKind::Replace),
            5 => Some(UICommandKind::SetProperty),
            _ => None,
        }
    }
}

/// Decoded operand payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operands {
    Create { node_type: NodeType, name: String },
    Append { child: NodeId },
    Remove,
    InsertBefore { child: NodeId, reference: NodeId },
    Replace { new_child: NodeId, old_child: NodeId },
    SetProperty { key: String, value: String },
}

/// Malformed wire input
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WireError {
    Truncated,
    UnknownOpcode(u8),
    UnknownNodeType(u8),
    InvalidUtf8,
}

impl fmt::Display for WireError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WireError::Truncated => write!(f, "truncated command"),
            WireError::UnknownOpcode(op) => write!(f, "unknown opcode: {}", op),
            WireError::UnknownNodeType(ty) => write!(f, "unknown node type: {}", ty),
            WireError::InvalidUtf8 => write!(f, "operand is not valid UTF-8"),
        }
    }
}

impl std::error::Error for WireError {}

/// One buffered instruction
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UICommand {
    pub target: NodeId,
    pub kind: UICommandKind,
    pub operands: Vec<u8>,
}

impl UICommand {
    /// Decode the operand payload
    pub fn decode_operands(&self) -> Result<Operands, WireError> {
        let mut reader = WireReader::new(&self.operands);
        let operands = match self.kind {
            UICommandKind::Create => {
                let code = reader.u8()?;
                let node_type = NodeType::from_u8(code).ok_or(WireError::UnknownNodeType(code))?;
                Operands::Create {
                    node_type,
                    name: reader.string()?,
                }
            }
            UICommandKind::Append => Operands::Append {
                child: NodeId(reader.u32()?),
            },
            UICommandKind::Remove => Operands::Remove,
            UICommandKind::InsertBefore => Operands::InsertBefore {
                child: NodeId(reader.u32()?),
                reference: NodeId(reader.u32()?),
            },
            UICommandKind::Replace => Operands::Replace {
                new_child: NodeId(reader.u32()?),
                old_child: NodeId(reader.u32()?),
            },
            UICommandKind::SetProperty => Operands::SetProperty {
                key: reader.string()?,
                value: reader.string()?,
            },
        };
        Ok(operands)
    }
}

/// Consumer of flushed commands (the external renderer)
pub trait UICommandSink {
    fn consume(&mut self, context_id: i32, commands: &[UICommand]);
}

impl<F> UICommandSink for F
where
    F: FnMut(i32, &[UICommand]),
{
    fn consume(&mut self, context_id: i32, commands: &[UICommand]) {
        self(context_id, commands)
    }
}

/// Per-context command log
#[derive(Debug)]
pub struct UICommandBuffer {
    context_id: i32,
    commands: Vec<UICommand>,
}

impl UICommandBuffer {
    pub fn new(context_id: i32) -> Self {
        UICommandBuffer {
            context_id,
            commands: Vec::new(),
        }
    }

    pub fn context_id(&self) -> i32 {
        self.context_id
    }

    pub fn record_create(&mut self, node: NodeId, node_type: NodeType, name: &str) {
        let mut operands = vec![node_type as u8];
        put_string(&mut operands, name);
        self.push(node, UICommandKind::Create, operands);
    }

    pub fn record_append(&mut self, parent: NodeId, child: NodeId) {
        self.push(parent, UICommandKind::Append, child.0.to_le_bytes().to_vec());
    }

    pub fn record_remove(&mut self, node: NodeId) {
        self.push(node, UICommandKind::Remove, Vec::new());
    }

    pub fn record_insert_before(&mut self, parent: NodeId, child: NodeId, reference: NodeId) {
        let mut operands = Vec::with_capacity(8);
        operands.extend_from_slice(&child.0.to_le_bytes());
        operands.extend_from_slice(&reference.0.to_le_bytes());
        self.push(parent, UICommandKind::InsertBefore, operands);
    }

    pub fn record_replace(&mut self, parent: NodeId, new_child: NodeId, old_child: NodeId) {
        let mut operands = Vec::with_capacity(8);
        operands.extend_from_slice(&new_child.0.to_le_bytes());
        operands.extend_from_slice(&old_child.0.to_le_bytes());
        self.push(parent, UICommandKind::Replace, operands);
    }

    pub fn record_set_property(&mut self, node: NodeId, key: &str, value: &str) {
        let mut operands = Vec::new();
        put_string(&mut operands, key);
        put_string(&mut operands, value);
        self.push(node, UICommandKind::SetProperty, operands);
    }

    fn push(&mut self, target: NodeId, kind: UICommandKind, operands: Vec<u8>) {
        self.commands.push(UICommand {
            target,
            kind,
            operands,
        });
    }

    /// Buffered commands, oldest first
    pub fn commands(&self) -> &[UICommand] {
        &self.commands
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    /// Take every buffered command, leaving the buffer empty
    pub fn flush(&mut self) -> Vec<UICommand> {
        std::mem::take(&mut self.commands)
    }

    pub fn clear(&mut self) {
        self.commands.clear();
    }
}

fn put_string(out: &mut Vec<u8>, s: &str) {
    out.extend_from_slice(&(s.len() as u32).to_le_bytes());
    out.extend_from_slice(s.as_bytes());
}

/// Serialize a batch for the command channel
pub fn encode_batch(commands: &[UICommand]) -> Vec<u8> {
    let size: usize = commands.iter().map(|c| 9 + c.operands.len()).sum();
    let mut out = Vec::with_capacity(size);
    for command in commands {
        out.push(command.kind as u8);
        out.extend_from_slice(&command.target.0.to_le_bytes());
        out.extend_from_slice(&(command.operands.len() as u32).to_le_bytes());
        out.extend_from_slice(&command.operands);
    }
    out
}

/// Parse a batch produced by [`encode_batch`]
pub fn decode_batch(bytes: &[u8]) -> Result<Vec<UICommand>, WireError> {
    let mut reader = WireReader::new(bytes);
    let mut commands = Vec::new();
    while !reader.is_at_end() {
        let op = reader.u8()?;
        let kind = UICommandKind::from_u8(op).ok_or(WireError::UnknownOpcode(op))?;
        let target = NodeId(reader.u32()?);
        let len = reader.u32()? as usize;
        let operands = reader.bytes(len)?.to_vec();
        commands.push(UICommand {
            target,
            kind,
            operands,
        });
    }
    Ok(commands)
}

struct WireReader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> WireReader<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        WireReader { bytes, pos: 0 }
    }

    fn is_at_end(&self) -> bool {
        self.pos >= self.bytes.len()
    }

    fn bytes(&mut self, len: usize) -> Result<&'a [u8], WireError> {
        let end = self.pos.checked_add(len).ok_or(WireError::Truncated)?;
        let slice = self.bytes.get(self.pos..end).ok_or(WireError::Truncated)?;
        self.pos = end;
        Ok(slice)
    }

    fn u8(&mut self) -> Result<u8, WireError> {
        Ok(self.bytes(1)?[0])
    }

    fn u32(&mut self) -> Result<u32, WireError> {
        let raw = self.bytes(4)?;
        Ok(u32::from_le_bytes([raw[0], raw[1], raw[2], raw[3]]))
    }

    fn string(&mut self) -> Result<String, WireError> {
        let len = self.u32()? as usize;
        let raw = self.bytes(len)?;
        String::from_utf8(raw.to_vec()).map_err(|_| WireError::InvalidUtf8)
    }
}
