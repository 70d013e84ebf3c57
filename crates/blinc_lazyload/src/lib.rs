//! Blinc Lazy Loading
//!
//! Defers fetching images, frames and background media until they are about
//! to enter the visible region of a scroll container.
//!
//! Two pieces cooperate:
//!
//! - **Scheduler** ([`LazyLoad`]): keeps the set of pending elements, listens
//!   for scroll and resize signals at a throttled rate, and on each tick picks
//!   the candidates whose bounding box lies inside the observation region.
//! - **Activator** ([`Activator`]): swaps placeholder attributes for live
//!   resource references and reports the load or error outcome.
//!
//! The host document, its clock and its event dispatch are reached only
//! through the [`Environment`] trait. [`headless::HeadlessEnvironment`] is a
//! deterministic in-memory implementation.
//!
//! # Example
//!
//! ```rust
//! use std::rc::Rc;
//! use std::time::Duration;
//! use blinc_lazyload::prelude::*;
//! use blinc_lazyload::headless::HeadlessEnvironment;
//!
//! let env = Rc::new(HeadlessEnvironment::new(800.0, 600.0));
//! let below = env.append_element(None, "img");
//! env.set_attribute(&below, "data-original", "below.png");
//! env.set_layout(below, Rect::new(0.0, 1200.0, 200.0, 200.0));
//!
//! let lazy = LazyLoad::new(
//!     env.clone(),
//!     LazyLoadSettings::default()
//!         .with_threshold(0.0)
//!         .with_throttle(Duration::ZERO),
//! );
//! assert_eq!(lazy.pending_count(), 1);
//!
//! env.scroll_by(&Container::Viewport, 0.0, 800.0);
//! assert_eq!(env.attribute(&below, "src").as_deref(), Some("below.png"));
//! assert!(!lazy.is_listening_scroll());
//! ```

pub mod activator;
pub mod environment;
pub mod error;
pub mod geometry;
pub mod headless;
pub mod lazy_load;
pub mod liveness;
pub mod scheduler;
pub mod settings;

#[cfg(test)]
mod tests;

pub use activator::Activator;
pub use environment::{
    Container, ElementKind, Environment, ListenerId, LoadOutcome, SignalHandler, TimerCallback,
    TimerId, ViewportEvent,
};
pub use error::{LazyLoadError, Result};
pub use geometry::{Point, Rect, Size};
pub use lazy_load::LazyLoad;
pub use liveness::{Liveness, LivenessWatch};
pub use scheduler::{is_within_region, CandidateSet, Throttle, ThrottleDecision};
pub use settings::{
    dataset_attribute_name, BatchCallback, Callbacks, ClassNames, ElementCallback,
    LazyLoadOptions, LazyLoadSettings, PROCESSED_MARKER_ATTR,
};

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::environment::{Container, ElementKind, Environment, LoadOutcome, ViewportEvent};
    pub use crate::error::LazyLoadError;
    pub use crate::geometry::{Point, Rect, Size};
    pub use crate::lazy_load::LazyLoad;
    pub use crate::settings::{ClassNames, LazyLoadOptions, LazyLoadSettings};
}
