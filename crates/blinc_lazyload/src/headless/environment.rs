//! [`Environment`] implementation over the headless document

use std::cell::{Cell, Ref, RefCell};
use std::time::Duration;

use slotmap::SlotMap;
use tracing::{trace, warn};

use crate::environment::{
    Container, ElementKind, Environment, ListenerId, LoadOutcome, SignalHandler, TimerCallback,
    TimerId, ViewportEvent,
};
use crate::error::Result;
use crate::geometry::{Rect, Size};
use crate::headless::clock::TimerQueue;
use crate::headless::document::{Document, NodeId};
use crate::headless::selector::Selector;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ListenTarget {
    Viewport {
        event: ViewportEvent,
        container: Option<NodeId>,
    },
    Element {
        node: NodeId,
        outcome: LoadOutcome,
    },
}

struct Listener {
    target: ListenTarget,
    handler: SignalHandler,
}

/// Deterministic in-memory host
///
/// Time only moves when [`advance`](Self::advance) is called, events only
/// fire when dispatched explicitly, and every mutation made through the
/// [`Environment`] trait is recorded in a log.
///
/// No internal borrow is held while a timer or listener callback runs, so
/// callbacks may freely call back into the environment.
pub struct HeadlessEnvironment {
    document: RefCell<Document>,
    viewport: Cell<Size>,
    now: Cell<Duration>,
    timers: RefCell<TimerQueue>,
    listeners: RefCell<SlotMap<ListenerId, Listener>>,
    mutations: RefCell<Vec<String>>,
}

impl std::fmt::Debug for HeadlessEnvironment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HeadlessEnvironment")
            .field("nodes", &self.document.borrow().len())
            .field("viewport", &self.viewport.get())
            .field("now", &self.now.get())
            .field("timers", &self.timers.borrow().len())
            .field("listeners", &self.listeners.borrow().len())
            .finish()
    }
}

impl HeadlessEnvironment {
    /// Create an empty document with a viewport of the given size
    pub fn new(width: f32, height: f32) -> Self {
        Self {
            document: RefCell::new(Document::new()),
            viewport: Cell::new(Size::new(width, height)),
            now: Cell::new(Duration::ZERO),
            timers: RefCell::new(TimerQueue::new()),
            listeners: RefCell::new(SlotMap::with_key()),
            mutations: RefCell::new(Vec::new()),
        }
    }

    pub fn document(&self) -> Ref<'_, Document> {
        self.document.borrow()
    }

    // =========================================================================
    // Document setup
    // =========================================================================

    /// Append an element under `parent`, or as a new root
    ///
    /// An unknown parent is reported and the element becomes a root.
    pub fn append_element(&self, parent: Option<NodeId>, tag: &str) -> NodeId {
        let mut doc = self.document.borrow_mut();
        match doc.append(parent, tag) {
            Ok(id) => id,
            Err(e) => {
                warn!("{}; appending <{}> as a root", e, tag);
                // Appending a root cannot fail
                doc.append(None, tag).unwrap_or_default()
            }
        }
    }

    pub fn set_layout(&self, node: NodeId, layout: Rect) {
        self.report(self.document.borrow_mut().set_layout(node, layout));
    }

    pub fn set_hidden(&self, node: NodeId, hidden: bool) {
        self.report(self.document.borrow_mut().set_hidden(node, hidden));
    }

    pub fn detach(&self, node: NodeId) {
        self.report(self.document.borrow_mut().detach(node));
    }

    pub fn has_class(&self, node: NodeId, class: &str) -> bool {
        self.document
            .borrow()
            .node(node)
            .map(|n| n.classes().iter().any(|c| c == class))
            .unwrap_or(false)
    }

    pub fn classes(&self, node: NodeId) -> Vec<String> {
        self.document
            .borrow()
            .node(node)
            .map(|n| n.classes().to_vec())
            .unwrap_or_default()
    }

    pub fn background_image(&self, node: NodeId) -> Option<String> {
        self.document
            .borrow()
            .node(node)
            .ok()
            .and_then(|n| n.background_image().map(str::to_string))
    }

    // =========================================================================
    // Driving the host
    // =========================================================================

    pub fn viewport_size(&self) -> Size {
        self.viewport.get()
    }

    /// Move the clock forward, firing due timers in deadline order
    ///
    /// Each timer observes the clock at its own deadline. Timers scheduled by
    /// a callback fire in the same call if they fall due before the target.
    pub fn advance(&self, by: Duration) {
        let target = self.now.get() + by;
        loop {
            let due = self.timers.borrow_mut().pop_due(target);
            let Some((deadline, callback)) = due else {
                break;
            };
            self.now.set(deadline.max(self.now.get()));
            callback();
        }
        self.now.set(target);
    }

    /// Invoke every listener for `event`, whatever its container
    ///
    /// Returns the number of listeners invoked.
    pub fn dispatch(&self, event: ViewportEvent) -> usize {
        self.invoke(|target| matches!(target, ListenTarget::Viewport { event: e, .. } if *e == event))
    }

    /// Scroll `container` by the given delta and dispatch its scroll event
    pub fn scroll_by(&self, container: &Container<NodeId>, dx: f32, dy: f32) -> usize {
        let scrolled = match container {
            Container::Viewport => None,
            Container::Element(node) => Some(*node),
        };
        self.document
            .borrow_mut()
            .offset_subtree(scrolled, -dx, -dy);
        trace!("Scrolled {:?} by ({}, {})", container, dx, dy);

        self.invoke(|target| {
            matches!(
                target,
                ListenTarget::Viewport { event: ViewportEvent::Scroll, container: c }
                    if *c == scrolled
            )
        })
    }

    /// Resize the viewport and dispatch resize
    pub fn resize_viewport(&self, width: f32, height: f32) -> usize {
        self.viewport.set(Size::new(width, height));
        self.dispatch(ViewportEvent::Resize)
    }

    /// Deliver a load or error event to `node`
    pub fn complete(&self, node: NodeId, outcome: LoadOutcome) -> usize {
        self.invoke(|target| *target == ListenTarget::Element { node, outcome })
    }

    // =========================================================================
    // Inspection
    // =========================================================================

    pub fn viewport_listener_count(&self, event: ViewportEvent) -> usize {
        self.listeners
            .borrow()
            .values()
            .filter(|l| matches!(l.target, ListenTarget::Viewport { event: e, .. } if e == event))
            .count()
    }

    pub fn element_listener_count(&self, node: NodeId) -> usize {
        self.listeners
            .borrow()
            .values()
            .filter(|l| matches!(l.target, ListenTarget::Element { node: n, .. } if n == node))
            .count()
    }

    pub fn pending_timer_count(&self) -> usize {
        self.timers.borrow().len()
    }

    /// Every mutation made through the [`Environment`] trait, in order
    pub fn mutation_log(&self) -> Vec<String> {
        self.mutations.borrow().clone()
    }

    pub fn clear_mutation_log(&self) {
        self.mutations.borrow_mut().clear();
    }

    // =========================================================================
    // Internals
    // =========================================================================

    fn invoke(&self, mut wanted: impl FnMut(&ListenTarget) -> bool) -> usize {
        let handlers: Vec<SignalHandler> = self
            .listeners
            .borrow()
            .values()
            .filter(|l| wanted(&l.target))
            .map(|l| l.handler.clone())
            .collect();
        for handler in &handlers {
            handler();
        }
        handlers.len()
    }

    fn record(&self, entry: String) {
        trace!("{}", entry);
        self.mutations.borrow_mut().push(entry);
    }

    fn report(&self, result: Result<()>) {
        if let Err(e) = result {
            warn!("Headless document: {}", e);
        }
    }

    fn add_listener(&self, target: ListenTarget, handler: SignalHandler) -> ListenerId {
        self.listeners
            .borrow_mut()
            .insert(Listener { target, handler })
    }
}

impl Environment for HeadlessEnvironment {
    type Element = NodeId;

    fn query_matching_elements(&self, selector: &str) -> Result<Vec<NodeId>> {
        let selector = Selector::parse(selector)?;
        Ok(self.document.borrow().query(&selector))
    }

    fn kind(&self, element: &NodeId) -> ElementKind {
        self.document
            .borrow()
            .node(*element)
            .map(|n| n.kind())
            .unwrap_or(ElementKind::Other)
    }

    fn attribute(&self, element: &NodeId, name: &str) -> Option<String> {
        self.document.borrow().attribute(*element, name)
    }

    fn set_attribute(&self, element: &NodeId, name: &str, value: &str) {
        let result = self
            .document
            .borrow_mut()
            .set_attribute(*element, name, value);
        self.report(result);
        self.record(format!("{:?} {}={}", element, name, value));
    }

    fn add_class(&self, element: &NodeId, class: &str) {
        let result = self.document.borrow_mut().add_class(*element, class);
        self.report(result);
        self.record(format!("{:?} +class {}", element, class));
    }

    fn remove_class(&self, element: &NodeId, class: &str) {
        let result = self.document.borrow_mut().remove_class(*element, class);
        self.report(result);
        self.record(format!("{:?} -class {}", element, class));
    }

    fn set_background_image(&self, element: &NodeId, url: &str) {
        let value = format!("url({})", url);
        self.record(format!("{:?} background-image: {}", element, value));
        let result = self
            .document
            .borrow_mut()
            .set_background_image(*element, value);
        self.report(result);
    }

    fn parent(&self, element: &NodeId) -> Option<NodeId> {
        self.document.borrow().node(*element).ok()?.parent()
    }

    fn children(&self, element: &NodeId) -> Vec<NodeId> {
        self.document
            .borrow()
            .node(*element)
            .map(|n| n.children().to_vec())
            .unwrap_or_default()
    }

    fn bounding_rect(&self, element: &NodeId) -> Rect {
        self.document
            .borrow()
            .node(*element)
            .map(|n| n.layout())
            .unwrap_or(Rect::ZERO)
    }

    fn is_rendered(&self, element: &NodeId) -> bool {
        self.document.borrow().is_rendered(*element)
    }

    fn observe_visibility_region(&self, container: &Container<NodeId>) -> Rect {
        match container {
            Container::Viewport => Rect::from_origin_size(Default::default(), self.viewport.get()),
            Container::Element(node) => self.bounding_rect(node),
        }
    }

    fn now(&self) -> Duration {
        self.now.get()
    }

    fn schedule_after(&self, delay: Duration, callback: TimerCallback) -> TimerId {
        let deadline = self.now.get() + delay;
        self.timers.borrow_mut().schedule(deadline, callback)
    }

    fn cancel_scheduled(&self, timer: TimerId) {
        self.timers.borrow_mut().cancel(timer);
    }

    fn add_viewport_listener(
        &self,
        event: ViewportEvent,
        container: &Container<NodeId>,
        handler: SignalHandler,
    ) -> ListenerId {
        let container = match (event, container) {
            (ViewportEvent::Scroll, Container::Element(node)) => Some(*node),
            _ => None,
        };
        self.add_listener(ListenTarget::Viewport { event, container }, handler)
    }

    fn add_element_listener(
        &self,
        element: &NodeId,
        outcome: LoadOutcome,
        handler: SignalHandler,
    ) -> ListenerId {
        self.add_listener(
            ListenTarget::Element {
                node: *element,
                outcome,
            },
            handler,
        )
    }

    fn remove_listener(&self, listener: ListenerId) {
        self.listeners.borrow_mut().remove(listener);
    }
}
