//! Host environment abstraction
//!
//! Everything the lazy loader needs from its host (document queries, element
//! mutation, layout boxes, clock, timers and event listeners) goes through the
//! [`Environment`] trait. A browser binding, a native UI tree or the in-memory
//! [`HeadlessEnvironment`](crate::headless::HeadlessEnvironment) can all drive
//! the same scheduler.
//!
//! # Threading
//!
//! The loader is single-threaded and cooperative. Callbacks handed to the
//! environment are `Rc`/`Box` closures and are expected to run later on the
//! same event loop, never re-entrantly from inside the call that registered
//! them.

use std::fmt::Debug;
use std::hash::Hash;
use std::rc::Rc;
use std::time::Duration;

use slotmap::new_key_type;

use crate::error::Result;
use crate::geometry::Rect;

new_key_type! {
    /// Handle to a deferred callback registered with [`Environment::schedule_after`]
    pub struct TimerId;
    /// Handle to an event listener registered with the environment
    pub struct ListenerId;
}

/// Element categories the activator distinguishes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ElementKind {
    /// `<img>`
    Image,
    /// `<iframe>`
    Frame,
    /// `<picture>` grouping container
    Picture,
    /// `<source>` variant inside a grouping container
    Source,
    /// Anything else; receives a background image
    Other,
}

impl ElementKind {
    /// Map a tag name (any case) to its kind
    pub fn from_tag(tag: &str) -> Self {
        match tag.to_ascii_lowercase().as_str() {
            "img" => ElementKind::Image,
            "iframe" => ElementKind::Frame,
            "picture" => ElementKind::Picture,
            "source" => ElementKind::Source,
            _ => ElementKind::Other,
        }
    }

    /// Whether the element fires load/error events for its own resource
    pub fn reports_completion(self) -> bool {
        matches!(self, ElementKind::Image | ElementKind::Frame)
    }
}

/// Viewport-level signals that wake the scheduler
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ViewportEvent {
    /// Window resize (always registered on the window)
    Resize,
    /// Scroll of the observed container
    Scroll,
}

/// Per-element resource completion events
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LoadOutcome {
    /// The resource loaded
    Loaded,
    /// The resource failed to load
    Failed,
}

/// The scrollable region candidates are tested against
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Container<E> {
    /// The whole viewport
    Viewport,
    /// A scrollable element
    Element(E),
}

impl<E> Default for Container<E> {
    fn default() -> Self {
        Container::Viewport
    }
}

/// Listener callback for viewport and element events
///
/// Uses Rc since the loader is single-threaded.
pub type SignalHandler = Rc<dyn Fn()>;

/// One-shot deferred callback
pub type TimerCallback = Box<dyn FnOnce()>;

/// Capabilities the lazy loader requires from its host
pub trait Environment: 'static {
    /// Element identity. Equal handles must refer to the same element.
    type Element: Clone + Eq + Hash + Debug + 'static;

    // =========================================================================
    // Document
    // =========================================================================

    /// All elements matching `selector`, in document order
    fn query_matching_elements(&self, selector: &str) -> Result<Vec<Self::Element>>;

    /// Category of the element
    fn kind(&self, element: &Self::Element) -> ElementKind;

    /// Read an attribute
    fn attribute(&self, element: &Self::Element, name: &str) -> Option<String>;

    /// Write an attribute
    fn set_attribute(&self, element: &Self::Element, name: &str, value: &str);

    /// Add a CSS class
    fn add_class(&self, element: &Self::Element, class: &str);

    /// Remove a CSS class
    fn remove_class(&self, element: &Self::Element, class: &str);

    /// Set the element's background image to `url`
    fn set_background_image(&self, element: &Self::Element, url: &str);

    /// Parent element, if any
    fn parent(&self, element: &Self::Element) -> Option<Self::Element>;

    /// Child elements in document order
    fn children(&self, element: &Self::Element) -> Vec<Self::Element>;

    // =========================================================================
    // Layout
    // =========================================================================

    /// Border box of the element in viewport coordinates
    fn bounding_rect(&self, element: &Self::Element) -> Rect;

    /// Whether the element takes part in layout (not display-hidden or detached)
    fn is_rendered(&self, element: &Self::Element) -> bool;

    /// Visible region of `container` in viewport coordinates
    fn observe_visibility_region(&self, container: &Container<Self::Element>) -> Rect;

    // =========================================================================
    // Time
    // =========================================================================

    /// Monotonic time since an arbitrary origin
    fn now(&self) -> Duration;

    /// Run `callback` once after `delay`
    fn schedule_after(&self, delay: Duration, callback: TimerCallback) -> TimerId;

    /// Cancel a callback that has not fired yet. Unknown ids are ignored.
    fn cancel_scheduled(&self, timer: TimerId);

    // =========================================================================
    // Events
    // =========================================================================

    /// Listen for a viewport signal. Resize listens on the window; scroll
    /// listens on `container`.
    fn add_viewport_listener(
        &self,
        event: ViewportEvent,
        container: &Container<Self::Element>,
        handler: SignalHandler,
    ) -> ListenerId;

    /// Listen for the load or error event of a single element
    fn add_element_listener(
        &self,
        element: &Self::Element,
        outcome: LoadOutcome,
        handler: SignalHandler,
    ) -> ListenerId;

    /// Detach a listener. Unknown ids are ignored.
    fn remove_listener(&self, listener: ListenerId);
}
