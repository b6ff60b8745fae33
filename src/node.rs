//! Node header and payload variants.

use crate::alloc::RawBuf;
use crate::attr_map::AttrMap;
use crate::external::ForeignRef;
use crate::refcount::RefCount;
use crate::types::Closure;
use hashbrown::HashMap;
use slotmap::DefaultKey;

/// Generational id of a node inside a [`Heap`](crate::Heap).
///
/// Ids of freed nodes never resolve again, even if the arena slot is reused.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeId(DefaultKey);

impl NodeId {
    pub(crate) fn new(k: DefaultKey) -> Self {
        NodeId(k)
    }

    pub(crate) fn raw(&self) -> DefaultKey {
        self.0
    }
}

pub(crate) type MapData = HashMap<String, NodeId>;

/// The closed set of payload kinds.
#[derive(Debug)]
pub enum Payload {
    Empty,
    Map(MapData),
    Array(Vec<NodeId>),
    /// UTF-32 code points, without terminator.
    Str(Box<[char]>),
    Raw(RawBuf),
    External(ForeignRef),
    Closure(Closure),
}

/// Tag of a [`Payload`], used for capability dispatch.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Kind {
    Empty,
    Map,
    Array,
    Str,
    Raw,
    External,
    Closure,
}

impl Kind {
    pub fn name(self) -> &'static str {
        match self {
            Kind::Empty => "empty",
            Kind::Map => "map",
            Kind::Array => "array",
            Kind::Str => "string",
            Kind::Raw => "raw",
            Kind::External => "external",
            Kind::Closure => "closure",
        }
    }
}

impl Payload {
    pub fn kind(&self) -> Kind {
        match self {
            Payload::Empty => Kind::Empty,
            Payload::Map(_) => Kind::Map,
            Payload::Array(_) => Kind::Array,
            Payload::Str(_) => Kind::Str,
            Payload::Raw(_) => Kind::Raw,
            Payload::External(_) => Kind::External,
            Payload::Closure(_) => Kind::Closure,
        }
    }

    /// Strong edges held by the payload itself.
    pub(crate) fn children(&self) -> Vec<NodeId> {
        match self {
            Payload::Map(m) => m.values().copied().collect(),
            Payload::Array(v) => v.clone(),
            _ => Vec::new(),
        }
    }
}

/// Header of every node: attributes, parent back-link, payload, count, label.
#[derive(Debug)]
pub(crate) struct Node {
    pub(crate) attrs: AttrMap,
    /// Non-owning; may point at a node that has since been freed.
    pub(crate) parent: Option<NodeId>,
    pub(crate) payload: Payload,
    pub(crate) refcount: RefCount,
    pub(crate) debug_tag: Option<Box<str>>,
}

impl Node {
    pub(crate) fn new(payload: Payload, bucket_bits: u32) -> Self {
        Self {
            attrs: AttrMap::new(bucket_bits),
            parent: None,
            payload,
            refcount: RefCount::new(),
            debug_tag: None,
        }
    }

    /// Every strong edge out of this node: payload children, then attributes.
    pub(crate) fn edges(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.payload.children().into_iter().chain(self.attrs.values())
    }
}
