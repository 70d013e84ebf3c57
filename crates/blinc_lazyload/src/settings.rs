//! Lazy loader configuration
//!
//! [`LazyLoadSettings`] is the immutable record an instance is built from.
//! Start from `LazyLoadSettings::default()`, override fields with the builder
//! methods, or merge a deserialized [`LazyLoadOptions`] on top:
//!
//! ```rust
//! use std::time::Duration;
//! use blinc_lazyload::headless::NodeId;
//! use blinc_lazyload::{LazyLoadOptions, LazyLoadSettings};
//!
//! let options = LazyLoadOptions::from_toml_str(r#"
//!     selector = "img.lazy"
//!     throttleIntervalMs = 50
//! "#).unwrap();
//!
//! let settings = LazyLoadSettings::<NodeId>::default()
//!     .with_options(options)
//!     .on_load(|node| println!("loaded {:?}", node));
//!
//! assert_eq!(settings.selector, "img.lazy");
//! assert_eq!(settings.throttle, Duration::from_millis(50));
//! assert_eq!(settings.threshold, 300.0);
//! ```

use std::fmt;
use std::rc::Rc;
use std::time::Duration;

use serde::Deserialize;

use crate::environment::Container;
use crate::error::Result;

/// Attribute written on every activated element
pub const PROCESSED_MARKER_ATTR: &str = "data-was-processed";

/// Callback receiving an element
///
/// Uses Rc since the loader is single-threaded.
pub type ElementCallback<E> = Rc<dyn Fn(&E)>;

/// Callback receiving the remaining candidate count
pub type BatchCallback = Rc<dyn Fn(usize)>;

/// CSS class names applied through the element lifecycle
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassNames {
    /// Added to elements already visible on the first pass
    pub initial: String,
    /// Present while the resource is in flight
    pub loading: String,
    /// Added when the resource loaded
    pub loaded: String,
    /// Added when the resource failed
    pub error: String,
}

impl Default for ClassNames {
    fn default() -> Self {
        Self {
            initial: "initial".to_string(),
            loading: "loading".to_string(),
            loaded: "loaded".to_string(),
            error: "error".to_string(),
        }
    }
}

/// Optional lifecycle callbacks
pub struct Callbacks<E> {
    /// Fired synchronously right after an element's sources are assigned
    pub on_set: Option<ElementCallback<E>>,
    /// Fired when an image or frame finished loading
    pub on_load: Option<ElementCallback<E>>,
    /// Fired when an image or frame failed to load
    pub on_error: Option<ElementCallback<E>>,
    /// Fired once per element removed from the candidate set
    pub on_batch_processed: Option<BatchCallback>,
}

impl<E> Default for Callbacks<E> {
    fn default() -> Self {
        Self {
            on_set: None,
            on_load: None,
            on_error: None,
            on_batch_processed: None,
        }
    }
}

impl<E> Clone for Callbacks<E> {
    fn clone(&self) -> Self {
        Self {
            on_set: self.on_set.clone(),
            on_load: self.on_load.clone(),
            on_error: self.on_error.clone(),
            on_batch_processed: self.on_batch_processed.clone(),
        }
    }
}

impl<E> fmt::Debug for Callbacks<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Callbacks")
            .field("on_set", &self.on_set.is_some())
            .field("on_load", &self.on_load.is_some())
            .field("on_error", &self.on_error.is_some())
            .field("on_batch_processed", &self.on_batch_processed.is_some())
            .finish()
    }
}

impl<E> Callbacks<E> {
    pub(crate) fn set(&self, element: &E) {
        if let Some(cb) = &self.on_set {
            cb(element);
        }
    }

    pub(crate) fn load(&self, element: &E) {
        if let Some(cb) = &self.on_load {
            cb(element);
        }
    }

    pub(crate) fn error(&self, element: &E) {
        if let Some(cb) = &self.on_error {
            cb(element);
        }
    }

    pub(crate) fn batch_processed(&self, remaining: usize) {
        if let Some(cb) = &self.on_batch_processed {
            cb(remaining);
        }
    }
}

/// Configuration of a lazy loader instance
#[derive(Debug, Clone)]
pub struct LazyLoadSettings<E> {
    /// Selector identifying candidate elements
    pub selector: String,
    /// Region candidates are tested against
    pub container: Container<E>,
    /// Margin in pixels added around the observation region
    pub threshold: f32,
    /// Minimum spacing between signal-driven ticks; zero disables throttling
    pub throttle: Duration,
    /// Dataset key of the deferred `src` (`original` → `data-original`)
    pub source_attr: String,
    /// Dataset key of the deferred `srcset` (`originalSet` → `data-original-set`)
    pub source_set_attr: String,
    /// Skip elements that are not rendered
    pub skip_invisible: bool,
    /// Lifecycle class names
    pub classes: ClassNames,
    /// Lifecycle callbacks
    pub callbacks: Callbacks<E>,
}

impl<E> Default for LazyLoadSettings<E> {
    fn default() -> Self {
        Self {
            selector: "img".to_string(),
            container: Container::Viewport,
            threshold: 300.0,
            throttle: Duration::from_millis(150),
            source_attr: "original".to_string(),
            source_set_attr: "originalSet".to_string(),
            skip_invisible: true,
            classes: ClassNames::default(),
            callbacks: Callbacks::default(),
        }
    }
}

impl<E> LazyLoadSettings<E> {
    /// Merge every field present in `options` over the current values
    pub fn with_options(mut self, options: LazyLoadOptions) -> Self {
        let LazyLoadOptions {
            selector,
            threshold,
            throttle_interval_ms,
            source_attr,
            source_set_attr,
            skip_invisible,
            class_initial,
            class_loading,
            class_loaded,
            class_error,
        } = options;

        if let Some(v) = selector {
            self.selector = v;
        }
        if let Some(v) = threshold {
            self.threshold = v;
        }
        if let Some(v) = throttle_interval_ms {
            self.throttle = Duration::from_millis(v);
        }
        if let Some(v) = source_attr {
            self.source_attr = v;
        }
        if let Some(v) = source_set_attr {
            self.source_set_attr = v;
        }
        if let Some(v) = skip_invisible {
            self.skip_invisible = v;
        }
        if let Some(v) = class_initial {
            self.classes.initial = v;
        }
        if let Some(v) = class_loading {
            self.classes.loading = v;
        }
        if let Some(v) = class_loaded {
            self.classes.loaded = v;
        }
        if let Some(v) = class_error {
            self.classes.error = v;
        }
        self
    }

    pub fn with_selector(mut self, selector: impl Into<String>) -> Self {
        self.selector = selector.into();
        self
    }

    pub fn with_container(mut self, container: Container<E>) -> Self {
        self.container = container;
        self
    }

    pub fn with_threshold(mut self, threshold: f32) -> Self {
        self.threshold = threshold;
        self
    }

    pub fn with_throttle(mut self, throttle: Duration) -> Self {
        self.throttle = throttle;
        self
    }

    /// Set both placeholder dataset keys
    pub fn with_source_attrs(
        mut self,
        source_attr: impl Into<String>,
        source_set_attr: impl Into<String>,
    ) -> Self {
        self.source_attr = source_attr.into();
        self.source_set_attr = source_set_attr.into();
        self
    }

    pub fn with_skip_invisible(mut self, skip: bool) -> Self {
        self.skip_invisible = skip;
        self
    }

    pub fn with_classes(mut self, classes: ClassNames) -> Self {
        self.classes = classes;
        self
    }

    pub fn on_set(mut self, f: impl Fn(&E) + 'static) -> Self {
        self.callbacks.on_set = Some(Rc::new(f));
        self
    }

    pub fn on_load(mut self, f: impl Fn(&E) + 'static) -> Self {
        self.callbacks.on_load = Some(Rc::new(f));
        self
    }

    pub fn on_error(mut self, f: impl Fn(&E) + 'static) -> Self {
        self.callbacks.on_error = Some(Rc::new(f));
        self
    }

    pub fn on_batch_processed(mut self, f: impl Fn(usize) + 'static) -> Self {
        self.callbacks.on_batch_processed = Some(Rc::new(f));
        self
    }

    /// Attribute holding the deferred `src`
    pub fn source_attribute(&self) -> String {
        dataset_attribute_name(&self.source_attr)
    }

    /// Attribute holding the deferred `srcset`
    pub fn source_set_attribute(&self) -> String {
        dataset_attribute_name(&self.source_set_attr)
    }
}

/// Serializable overrides for [`LazyLoadSettings`]
///
/// Every field is optional; absent fields keep their current value when
/// merged with [`LazyLoadSettings::with_options`]. Unknown keys are ignored.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LazyLoadOptions {
    pub selector: Option<String>,
    pub threshold: Option<f32>,
    pub throttle_interval_ms: Option<u64>,
    pub source_attr: Option<String>,
    pub source_set_attr: Option<String>,
    pub skip_invisible: Option<bool>,
    pub class_initial: Option<String>,
    pub class_loading: Option<String>,
    pub class_loaded: Option<String>,
    pub class_error: Option<String>,
}

impl LazyLoadOptions {
    /// Parse overrides from a TOML document
    pub fn from_toml_str(source: &str) -> Result<Self> {
        Ok(toml::from_str(source)?)
    }
}

/// Convert a dataset key to its attribute name
///
/// `original` → `data-original`, `originalSet` → `data-original-set`.
pub fn dataset_attribute_name(key: &str) -> String {
    let mut name = String::with_capacity(key.len() + 8);
    name.push_str("data-");
    for c in key.chars() {
        if c.is_ascii_uppercase() {
            name.push('-');
            name.push(c.to_ascii_lowercase());
        } else {
            name.push(c);
        }
    }
    name
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[test]
    fn test_defaults() {
        let s = LazyLoadSettings::<u32>::default();
        assert_eq!(s.selector, "img");
        assert_eq!(s.container, Container::Viewport);
        assert_eq!(s.threshold, 300.0);
        assert_eq!(s.throttle, Duration::from_millis(150));
        assert_eq!(s.source_attribute(), "data-original");
        assert_eq!(s.source_set_attribute(), "data-original-set");
        assert!(s.skip_invisible);
        assert_eq!(s.classes, ClassNames::default());
        assert!(s.callbacks.on_set.is_none());
        assert!(s.callbacks.on_batch_processed.is_none());
    }

    #[test]
    fn test_dataset_attribute_name() {
        assert_eq!(dataset_attribute_name("src"), "data-src");
        assert_eq!(dataset_attribute_name("lazySrcSet"), "data-lazy-src-set");
    }

    #[test]
    fn test_options_merge_only_present_fields() {
        let options = LazyLoadOptions::from_toml_str(
            r#"
            threshold = 0.0
            throttleIntervalMs = 0
            classLoaded = "done"
            "#,
        )
        .unwrap();

        let s = LazyLoadSettings::<u32>::default()
            .with_selector("img.lazy")
            .with_options(options);

        assert_eq!(s.selector, "img.lazy");
        assert_eq!(s.threshold, 0.0);
        assert_eq!(s.throttle, Duration::ZERO);
        assert_eq!(s.classes.loaded, "done");
        assert_eq!(s.classes.loading, "loading");
    }

    #[test]
    fn test_options_ignore_unknown_keys() {
        let options = LazyLoadOptions::from_toml_str("future_option = true").unwrap();
        assert_eq!(options, LazyLoadOptions::default());
    }

    #[test]
    fn test_options_type_error() {
        let err = LazyLoadOptions::from_toml_str("threshold = \"far\"").unwrap_err();
        assert!(matches!(err, crate::LazyLoadError::Options(_)));
    }

    #[test]
    fn test_callbacks_invoke() {
        let hits = Rc::new(Cell::new(0));
        let h = hits.clone();
        let s = LazyLoadSettings::<u32>::default().on_batch_processed(move |n| h.set(h.get() + n));
        s.callbacks.batch_processed(3);
        s.callbacks.batch_processed(2);
        s.callbacks.set(&1);
        assert_eq!(hits.get(), 5);
    }
}
