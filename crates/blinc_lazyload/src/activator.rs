//! Element activation
//!
//! Activation is the one-time swap from placeholder attributes to live
//! resource references:
//!
//! | Element                     | Assignment                                          |
//! |-----------------------------|-----------------------------------------------------|
//! | `<img>` inside `<picture>`  | every `<source>` srcset, then the image (as below)  |
//! | `<img>`                     | `srcset` then `src`, each only if a placeholder exists |
//! | `<iframe>`                  | `src`                                               |
//! | anything else               | `background-image: url(src)`                        |
//!
//! Images and frames get load/error listeners and the loading class before
//! any source is assigned, so a cached resource completing synchronously is
//! still observed.

use std::cell::RefCell;
use std::rc::{Rc, Weak};

use smallvec::SmallVec;
use tracing::trace;

use crate::environment::{ElementKind, Environment, ListenerId, LoadOutcome};
use crate::liveness::LivenessWatch;
use crate::settings::LazyLoadSettings;

/// Performs activation for one lazy loader instance
pub struct Activator<E: Environment> {
    env: Rc<E>,
    settings: Rc<LazyLoadSettings<E::Element>>,
    liveness: LivenessWatch,
    source_attr: String,
    source_set_attr: String,
}

impl<E: Environment> Activator<E> {
    pub fn new(
        env: Rc<E>,
        settings: Rc<LazyLoadSettings<E::Element>>,
        liveness: LivenessWatch,
    ) -> Self {
        let source_attr = settings.source_attribute();
        let source_set_attr = settings.source_set_attribute();
        Self {
            env,
            settings,
            liveness,
            source_attr,
            source_set_attr,
        }
    }

    /// Swap placeholders for live references and fire `on_set`
    pub fn activate(&self, element: &E::Element) {
        let kind = self.env.kind(element);
        trace!("Activating {:?} ({:?})", element, kind);

        if kind.reports_completion() {
            PendingCompletion::attach(
                &self.env,
                &self.settings,
                self.liveness.clone(),
                element.clone(),
            );
            self.env
                .add_class(element, &self.settings.classes.loading);
        }

        self.assign_sources(element, kind);
        self.settings.callbacks.set(element);
    }

    fn assign_sources(&self, element: &E::Element, kind: ElementKind) {
        let src = self.placeholder(element, &self.source_attr);

        match kind {
            ElementKind::Image => {
                self.assign_picture_sources(element);
                if let Some(srcset) = self.placeholder(element, &self.source_set_attr) {
                    self.env.set_attribute(element, "srcset", &srcset);
                }
                if let Some(src) = src {
                    self.env.set_attribute(element, "src", &src);
                }
            }
            ElementKind::Frame => {
                if let Some(src) = src {
                    self.env.set_attribute(element, "src", &src);
                }
            }
            _ => {
                if let Some(src) = src {
                    self.env.set_background_image(element, &src);
                }
            }
        }
    }

    /// Resolve `<source>` variants before the image itself
    fn assign_picture_sources(&self, image: &E::Element) {
        let Some(parent) = self.env.parent(image) else {
            return;
        };
        if self.env.kind(&parent) != ElementKind::Picture {
            return;
        }

        for child in self.env.children(&parent) {
            if self.env.kind(&child) != ElementKind::Source {
                continue;
            }
            if let Some(srcset) = self.placeholder(&child, &self.source_set_attr) {
                self.env.set_attribute(&child, "srcset", &srcset);
            }
        }
    }

    fn placeholder(&self, element: &E::Element, attr: &str) -> Option<String> {
        self.env
            .attribute(element, attr)
            .filter(|value| !value.is_empty())
    }
}

/// Load/error observation for one activated image or frame
///
/// Both listeners share this state; whichever fires first detaches both.
/// Holds only weak references to the environment and settings so a torn-down
/// instance is not kept alive by in-flight resources.
struct PendingCompletion<E: Environment> {
    element: E::Element,
    env: Weak<E>,
    settings: Weak<LazyLoadSettings<E::Element>>,
    liveness: LivenessWatch,
    listeners: RefCell<SmallVec<[ListenerId; 2]>>,
}

impl<E: Environment> PendingCompletion<E> {
    fn attach(
        env: &Rc<E>,
        settings: &Rc<LazyLoadSettings<E::Element>>,
        liveness: LivenessWatch,
        element: E::Element,
    ) {
        let pending = Rc::new(Self {
            element: element.clone(),
            env: Rc::downgrade(env),
            settings: Rc::downgrade(settings),
            liveness,
            listeners: RefCell::new(SmallVec::new()),
        });

        for outcome in [LoadOutcome::Loaded, LoadOutcome::Failed] {
            let handler_state = pending.clone();
            let id = env.add_element_listener(
                &element,
                outcome,
                Rc::new(move || handler_state.finish(outcome)),
            );
            pending.listeners.borrow_mut().push(id);
        }
    }

    fn finish(&self, outcome: LoadOutcome) {
        // Completion may arrive after teardown
        if !self.liveness.is_alive() {
            return;
        }
        let (Some(env), Some(settings)) = (self.env.upgrade(), self.settings.upgrade()) else {
            return;
        };

        let listeners = std::mem::take(&mut *self.listeners.borrow_mut());
        for id in listeners {
            env.remove_listener(id);
        }

        env.remove_class(&self.element, &settings.classes.loading);
        match outcome {
            LoadOutcome::Loaded => {
                trace!("Loaded {:?}", self.element);
                env.add_class(&self.element, &settings.classes.loaded);
                settings.callbacks.load(&self.element);
            }
            LoadOutcome::Failed => {
                trace!("Failed to load {:?}", self.element);
                env.add_class(&self.element, &settings.classes.error);
                settings.callbacks.error(&self.element);
            }
        }
    }
}
