//! Headless host
//!
//! An in-memory document, a CSS-subset selector engine and a manual clock,
//! wired together as [`HeadlessEnvironment`]. Nothing here touches a real
//! display: layout boxes are assigned explicitly, time moves only through
//! [`HeadlessEnvironment::advance`], and events fire only when dispatched.

pub mod clock;
pub mod document;
pub mod environment;
pub mod selector;

pub use clock::TimerQueue;
pub use document::{Document, Node, NodeId};
pub use environment::HeadlessEnvironment;
pub use selector::{AttributeSelector, CompoundSelector, Selector, SelectorSubject};
