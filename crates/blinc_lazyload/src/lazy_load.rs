//! Lazy loader instance
//!
//! [`LazyLoad`] ties the scheduling primitives to an [`Environment`]:
//!
//! ```text
//! resize / scroll signal
//!     ↓ Throttle (run now, defer once, or coalesce)
//! tick
//!     ↓ for each candidate, in discovery order
//!     ↓   skip if not rendered (skip_invisible)
//!     ↓   skip if outside the observation region
//! Activator::activate
//!     ↓ mark processed, remove from candidates
//! on_batch_processed per removal
//!     ↓ candidates empty?
//! stop listening to scroll
//! ```
//!
//! # Example
//!
//! ```rust
//! use std::rc::Rc;
//! use blinc_lazyload::prelude::*;
//! use blinc_lazyload::headless::HeadlessEnvironment;
//!
//! let env = Rc::new(HeadlessEnvironment::new(800.0, 600.0));
//! let img = env.append_element(None, "img");
//! env.set_attribute(&img, "data-original", "a.png");
//! env.set_layout(img, Rect::new(10.0, 10.0, 100.0, 100.0));
//!
//! let lazy = LazyLoad::new(env.clone(), LazyLoadSettings::default());
//! assert_eq!(env.attribute(&img, "src").as_deref(), Some("a.png"));
//! assert_eq!(lazy.pending_count(), 0);
//! ```

use std::cell::RefCell;
use std::rc::{Rc, Weak};

use rustc_hash::FxHashSet;
use tracing::{debug, trace, warn};

use crate::activator::Activator;
use crate::environment::{Environment, ListenerId, SignalHandler, ViewportEvent};
use crate::liveness::Liveness;
use crate::scheduler::{is_within_region, CandidateSet, Throttle, ThrottleDecision};
use crate::settings::{LazyLoadSettings, PROCESSED_MARKER_ATTR};

/// State shared between the public handle and the listeners/timers it
/// registers. Listeners hold it weakly.
struct Inner<E: Environment> {
    env: Rc<E>,
    /// Cleared on teardown
    settings: Option<Rc<LazyLoadSettings<E::Element>>>,
    activator: Option<Rc<Activator<E>>>,
    liveness: Liveness,
    candidates: CandidateSet<E::Element>,
    /// Elements this instance has activated
    processed: FxHashSet<E::Element>,
    throttle: Throttle,
    is_first_tick: bool,
    resize_listener: Option<ListenerId>,
    scroll_listener: Option<ListenerId>,
    tick_count: u64,
}

type Shared<E> = Rc<RefCell<Inner<E>>>;

/// A lazy loading instance
///
/// Construction registers a resize listener and runs the first
/// [`update`](Self::update). Dropping the instance tears it down.
pub struct LazyLoad<E: Environment> {
    inner: Shared<E>,
}

impl<E: Environment> LazyLoad<E> {
    /// Create an instance and run the initial scan
    pub fn new(env: Rc<E>, settings: LazyLoadSettings<E::Element>) -> Self {
        let settings = Rc::new(settings);
        let liveness = Liveness::new();
        let activator = Rc::new(Activator::new(
            env.clone(),
            settings.clone(),
            liveness.watch(),
        ));

        debug!(
            "Creating lazy loader: selector='{}' threshold={} throttle={:?}",
            settings.selector, settings.threshold, settings.throttle
        );

        let inner = Rc::new(RefCell::new(Inner {
            env: env.clone(),
            throttle: Throttle::new(settings.throttle),
            settings: Some(settings.clone()),
            activator: Some(activator),
            liveness,
            candidates: CandidateSet::new(),
            processed: FxHashSet::default(),
            is_first_tick: true,
            resize_listener: None,
            scroll_listener: None,
            tick_count: 0,
        }));

        let resize = env.add_viewport_listener(
            ViewportEvent::Resize,
            &settings.container,
            signal_handler(&inner),
        );
        inner.borrow_mut().resize_listener = Some(resize);

        let lazy = Self { inner };
        lazy.update();
        lazy
    }

    /// Re-scan the document and tick
    ///
    /// Matching elements already processed are discarded; the rest become the
    /// candidate set. The scroll listener is (re)started if candidates remain.
    pub fn update(&self) {
        let (env, settings) = {
            let inner = self.inner.borrow();
            let Some(settings) = inner.settings.clone() else {
                return;
            };
            (inner.env.clone(), settings)
        };

        let found = match env.query_matching_elements(&settings.selector) {
            Ok(found) => found,
            Err(e) => {
                warn!("Lazy load query failed, treating as empty: {}", e);
                Vec::new()
            }
        };

        {
            let mut inner = self.inner.borrow_mut();
            let fresh: Vec<_> = found
                .into_iter()
                .filter(|element| {
                    !inner.processed.contains(element)
                        && env.attribute(element, PROCESSED_MARKER_ATTR).is_none()
                })
                .collect();
            debug!("Lazy load update: {} candidates", fresh.len());
            inner.candidates.replace(fresh);
        }

        run_tick(&self.inner);

        if !self.inner.borrow().candidates.is_empty() {
            start_scroll_listener(&self.inner);
        }
    }

    /// Throttled entry point for scroll and resize signals
    pub fn handle_viewport_signal(&self) {
        handle_signal(&self.inner);
    }

    /// A handler bound to this instance, usable as an event listener
    pub fn signal_handler(&self) -> SignalHandler {
        signal_handler(&self.inner)
    }

    /// Run one visibility pass immediately, bypassing the throttle
    pub fn tick(&self) {
        run_tick(&self.inner);
    }

    /// Release listeners, timers, elements and settings
    ///
    /// The instance is inert afterwards. Completion events for elements
    /// activated earlier are ignored.
    pub fn teardown(&self) {
        let (env, resize, scroll, deferred) = {
            let mut inner = self.inner.borrow_mut();
            if inner.settings.is_none() {
                return;
            }
            inner.liveness.kill();
            inner.settings = None;
            inner.activator = None;
            inner.candidates.clear();
            inner.processed.clear();
            (
                inner.env.clone(),
                inner.resize_listener.take(),
                inner.scroll_listener.take(),
                inner.throttle.take_deferred(),
            )
        };

        for listener in [resize, scroll].into_iter().flatten() {
            env.remove_listener(listener);
        }
        if let Some(timer) = deferred {
            env.cancel_scheduled(timer);
        }
        debug!("Lazy loader torn down");
    }

    // =========================================================================
    // Introspection
    // =========================================================================

    /// Number of candidates still awaiting activation
    pub fn pending_count(&self) -> usize {
        self.inner.borrow().candidates.len()
    }

    /// Candidates still awaiting activation, in discovery order
    pub fn pending(&self) -> Vec<E::Element> {
        self.inner.borrow().candidates.snapshot()
    }

    /// Whether this instance has activated `element`
    pub fn is_processed(&self, element: &E::Element) -> bool {
        self.inner.borrow().processed.contains(element)
    }

    /// Whether a scroll listener is registered on the container
    pub fn is_listening_scroll(&self) -> bool {
        self.inner.borrow().scroll_listener.is_some()
    }

    /// Whether a deferred tick is scheduled
    pub fn has_deferred_tick(&self) -> bool {
        self.inner.borrow().throttle.deferred().is_some()
    }

    /// Number of visibility passes run so far
    pub fn tick_count(&self) -> u64 {
        self.inner.borrow().tick_count
    }

    pub fn is_torn_down(&self) -> bool {
        self.inner.borrow().settings.is_none()
    }

    /// Active settings; `None` after teardown
    pub fn settings(&self) -> Option<Rc<LazyLoadSettings<E::Element>>> {
        self.inner.borrow().settings.clone()
    }
}

impl<E: Environment> Drop for LazyLoad<E> {
    fn drop(&mut self) {
        self.teardown();
    }
}

impl<E: Environment> std::fmt::Debug for LazyLoad<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.borrow();
        f.debug_struct("LazyLoad")
            .field("pending", &inner.candidates.len())
            .field("processed", &inner.processed.len())
            .field("listening_scroll", &inner.scroll_listener.is_some())
            .field("torn_down", &inner.settings.is_none())
            .finish()
    }
}

// ============================================================================
// Scheduling
// ============================================================================

fn signal_handler<E: Environment>(shared: &Shared<E>) -> SignalHandler {
    let weak = Rc::downgrade(shared);
    Rc::new(move || {
        if let Some(shared) = weak.upgrade() {
            handle_signal(&shared);
        }
    })
}

fn handle_signal<E: Environment>(shared: &Shared<E>) {
    let (env, decision) = {
        let mut inner = shared.borrow_mut();
        if inner.settings.is_none() {
            return;
        }
        let now = inner.env.now();
        let decision = inner.throttle.on_signal(now);
        (inner.env.clone(), decision)
    };

    match decision {
        ThrottleDecision::RunNow { cancel } => {
            if let Some(timer) = cancel {
                env.cancel_scheduled(timer);
            }
            run_tick(shared);
        }
        ThrottleDecision::Defer(wait) => {
            trace!("Deferring lazy load tick by {:?}", wait);
            let weak: Weak<RefCell<Inner<E>>> = Rc::downgrade(shared);
            let timer = env.schedule_after(
                wait,
                Box::new(move || {
                    if let Some(shared) = weak.upgrade() {
                        run_deferred_tick(&shared);
                    }
                }),
            );
            shared.borrow_mut().throttle.set_deferred(timer);
        }
        ThrottleDecision::Coalesce => {
            trace!("Lazy load signal coalesced into pending tick");
        }
    }
}

fn run_deferred_tick<E: Environment>(shared: &Shared<E>) {
    {
        let mut inner = shared.borrow_mut();
        if inner.settings.is_none() {
            return;
        }
        let now = inner.env.now();
        inner.throttle.deferred_fired(now);
    }
    run_tick(shared);
}

/// One visibility pass over the candidate set
///
/// No borrow of the shared state is held while user callbacks run, so a
/// callback may call back into the instance (including teardown).
fn run_tick<E: Environment>(shared: &Shared<E>) {
    let (env, settings, activator, candidates, first_tick) = {
        let mut inner = shared.borrow_mut();
        let (Some(settings), Some(activator)) = (inner.settings.clone(), inner.activator.clone())
        else {
            return;
        };
        inner.tick_count += 1;
        let first_tick = std::mem::replace(&mut inner.is_first_tick, false);
        (
            inner.env.clone(),
            settings,
            activator,
            inner.candidates.snapshot(),
            first_tick,
        )
    };

    if candidates.is_empty() {
        trace!("Lazy load tick: no candidates");
    }

    let region = env.observe_visibility_region(&settings.container);
    let mut activated = Vec::new();

    for element in &candidates {
        if settings.skip_invisible && !env.is_rendered(element) {
            continue;
        }
        if !is_within_region(&env.bounding_rect(element), &region, settings.threshold) {
            continue;
        }
        // Callbacks earlier in this pass may have torn the instance down or
        // re-entered update() and claimed this element already. Claim it
        // before activation so a re-entrant scan from on_set skips it.
        {
            let mut inner = shared.borrow_mut();
            if inner.settings.is_none() {
                return;
            }
            if !inner.processed.insert(element.clone()) {
                continue;
            }
        }

        if first_tick {
            env.add_class(element, &settings.classes.initial);
        }
        activator.activate(element);
        env.set_attribute(element, PROCESSED_MARKER_ATTR, "true");
        activated.push(element.clone());
    }

    let (remaining, now_empty) = {
        let mut inner = shared.borrow_mut();
        if inner.settings.is_none() {
            return;
        }
        let remaining = inner.candidates.remove_batch(&activated);
        (remaining, inner.candidates.is_empty())
    };

    trace!(
        "Lazy load tick: activated {} of {} candidates",
        activated.len(),
        candidates.len()
    );

    for count in remaining {
        settings.callbacks.batch_processed(count);
    }

    if now_empty {
        stop_scroll_listener(shared);
    }
}

fn start_scroll_listener<E: Environment>(shared: &Shared<E>) {
    let (env, settings) = {
        let inner = shared.borrow();
        if inner.scroll_listener.is_some() {
            return;
        }
        let Some(settings) = inner.settings.clone() else {
            return;
        };
        (inner.env.clone(), settings)
    };

    let listener = env.add_viewport_listener(
        ViewportEvent::Scroll,
        &settings.container,
        signal_handler(shared),
    );
    shared.borrow_mut().scroll_listener = Some(listener);
    debug!("Lazy load scroll listener started");
}

fn stop_scroll_listener<E: Environment>(shared: &Shared<E>) {
    let (env, listener) = {
        let mut inner = shared.borrow_mut();
        let Some(listener) = inner.scroll_listener.take() else {
            return;
        };
        (inner.env.clone(), listener)
    };
    env.remove_listener(listener);
    debug!("Lazy load scroll listener stopped");
}
