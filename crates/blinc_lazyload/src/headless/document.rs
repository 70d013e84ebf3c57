//! In-memory element tree

use rustc_hash::FxHashMap;
use slotmap::{new_key_type, Key, SlotMap};
use smallvec::SmallVec;

use crate::environment::ElementKind;
use crate::error::{LazyLoadError, Result};
use crate::geometry::Rect;
use crate::headless::selector::{Selector, SelectorSubject};

new_key_type! {
    /// Handle to an element in a headless [`Document`]
    pub struct NodeId;
}

impl NodeId {
    /// Convert to a raw u64 representation
    pub fn to_raw(self) -> u64 {
        self.data().as_ffi()
    }
}

/// A headless element
#[derive(Debug, Clone)]
pub struct Node {
    tag: String,
    kind: ElementKind,
    attributes: FxHashMap<String, String>,
    classes: SmallVec<[String; 4]>,
    background_image: Option<String>,
    /// Border box in viewport coordinates
    layout: Rect,
    hidden: bool,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
}

impl Node {
    fn new(tag: &str) -> Self {
        Self {
            tag: tag.to_ascii_lowercase(),
            kind: ElementKind::from_tag(tag),
            attributes: FxHashMap::default(),
            classes: SmallVec::new(),
            background_image: None,
            layout: Rect::ZERO,
            hidden: false,
            parent: None,
            children: Vec::new(),
        }
    }

    pub fn tag(&self) -> &str {
        &self.tag
    }

    pub fn kind(&self) -> ElementKind {
        self.kind
    }

    pub fn classes(&self) -> &[String] {
        &self.classes
    }

    pub fn background_image(&self) -> Option<&str> {
        self.background_image.as_deref()
    }

    pub fn layout(&self) -> Rect {
        self.layout
    }

    pub fn is_hidden(&self) -> bool {
        self.hidden
    }

    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    pub fn children(&self) -> &[NodeId] {
        &self.children
    }
}

impl SelectorSubject for Node {
    fn tag_name(&self) -> &str {
        &self.tag
    }

    fn attribute(&self, name: &str) -> Option<&str> {
        if name == "class" {
            return None;
        }
        self.attributes.get(name).map(String::as_str)
    }

    fn has_class(&self, class: &str) -> bool {
        self.classes.iter().any(|c| c == class)
    }
}

/// Element tree with document-order traversal
///
/// Nodes without a parent that are listed in the root set are attached;
/// detached nodes keep their handles but are invisible to queries and
/// layout.
#[derive(Debug, Default)]
pub struct Document {
    nodes: SlotMap<NodeId, Node>,
    roots: Vec<NodeId>,
}

impl Document {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn node(&self, id: NodeId) -> Result<&Node> {
        self.nodes
            .get(id)
            .ok_or_else(|| LazyLoadError::UnknownNode(format!("{:?}", id)))
    }

    fn node_mut(&mut self, id: NodeId) -> Result<&mut Node> {
        self.nodes
            .get_mut(id)
            .ok_or_else(|| LazyLoadError::UnknownNode(format!("{:?}", id)))
    }

    /// Create an element as the last child of `parent` (or as a new root)
    pub fn append(&mut self, parent: Option<NodeId>, tag: &str) -> Result<NodeId> {
        if let Some(parent) = parent {
            self.node(parent)?;
        }
        let id = self.nodes.insert(Node::new(tag));
        match parent {
            Some(parent) => {
                self.node_mut(parent)?.children.push(id);
                self.node_mut(id)?.parent = Some(parent);
            }
            None => self.roots.push(id),
        }
        Ok(id)
    }

    /// Remove a subtree from the tree without freeing it
    pub fn detach(&mut self, id: NodeId) -> Result<()> {
        let parent = self.node_mut(id)?.parent.take();
        match parent {
            Some(parent) => self.node_mut(parent)?.children.retain(|c| *c != id),
            None => self.roots.retain(|r| *r != id),
        }
        Ok(())
    }

    /// Whether the node is reachable from a root
    pub fn is_attached(&self, id: NodeId) -> bool {
        let mut current = id;
        loop {
            match self.nodes.get(current) {
                None => return false,
                Some(node) => match node.parent {
                    Some(parent) => current = parent,
                    None => return self.roots.contains(&current),
                },
            }
        }
    }

    /// Attached, and neither it nor an ancestor is hidden
    pub fn is_rendered(&self, id: NodeId) -> bool {
        if !self.is_attached(id) {
            return false;
        }
        let mut current = Some(id);
        while let Some(node_id) = current {
            match self.nodes.get(node_id) {
                Some(node) if !node.hidden => current = node.parent,
                _ => return false,
            }
        }
        true
    }

    /// Attached nodes in document order
    pub fn traverse(&self) -> Vec<NodeId> {
        let mut order = Vec::with_capacity(self.nodes.len());
        let mut stack: Vec<NodeId> = self.roots.iter().rev().copied().collect();
        while let Some(id) = stack.pop() {
            order.push(id);
            if let Some(node) = self.nodes.get(id) {
                stack.extend(node.children.iter().rev().copied());
            }
        }
        order
    }

    /// Attached nodes matching `selector`, in document order
    pub fn query(&self, selector: &Selector) -> Vec<NodeId> {
        self.traverse()
            .into_iter()
            .filter(|id| {
                self.nodes
                    .get(*id)
                    .is_some_and(|node| selector.matches(node))
            })
            .collect()
    }

    pub fn attribute(&self, id: NodeId, name: &str) -> Option<String> {
        let node = self.nodes.get(id)?;
        if name == "class" {
            return (!node.classes.is_empty()).then(|| node.classes.join(" "));
        }
        node.attributes.get(name).cloned()
    }

    pub fn set_attribute(&mut self, id: NodeId, name: &str, value: &str) -> Result<()> {
        let node = self.node_mut(id)?;
        if name == "class" {
            node.classes = value.split_whitespace().map(str::to_string).collect();
        } else {
            node.attributes.insert(name.to_string(), value.to_string());
        }
        Ok(())
    }

    pub fn add_class(&mut self, id: NodeId, class: &str) -> Result<()> {
        let node = self.node_mut(id)?;
        if !node.classes.iter().any(|c| c == class) {
            node.classes.push(class.to_string());
        }
        Ok(())
    }

    pub fn remove_class(&mut self, id: NodeId, class: &str) -> Result<()> {
        self.node_mut(id)?.classes.retain(|c| c != class);
        Ok(())
    }

    pub fn set_background_image(&mut self, id: NodeId, value: String) -> Result<()> {
        self.node_mut(id)?.background_image = Some(value);
        Ok(())
    }

    pub fn set_layout(&mut self, id: NodeId, layout: Rect) -> Result<()> {
        self.node_mut(id)?.layout = layout;
        Ok(())
    }

    pub fn set_hidden(&mut self, id: NodeId, hidden: bool) -> Result<()> {
        self.node_mut(id)?.hidden = hidden;
        Ok(())
    }

    /// Offset the layout of every descendant of `id` (or of every node when
    /// `id` is `None`) by the given delta
    pub fn offset_subtree(&mut self, id: Option<NodeId>, dx: f32, dy: f32) {
        let targets: Vec<NodeId> = match id {
            None => self.nodes.keys().collect(),
            Some(root) => {
                let mut targets = Vec::new();
                let mut stack: Vec<NodeId> = self
                    .nodes
                    .get(root)
                    .map(|n| n.children.clone())
                    .unwrap_or_default();
                while let Some(child) = stack.pop() {
                    targets.push(child);
                    if let Some(node) = self.nodes.get(child) {
                        stack.extend(node.children.iter().copied());
                    }
                }
                targets
            }
        };
        for target in targets {
            if let Some(node) = self.nodes.get_mut(target) {
                node.layout = node.layout.offset(dx, dy);
            }
        }
    }
}
