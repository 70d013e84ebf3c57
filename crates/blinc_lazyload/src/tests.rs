//! End-to-end scenarios over the headless environment

use std::cell::{Cell, RefCell};
use std::rc::Rc;
use std::time::Duration;

use crate::environment::{Container, Environment, LoadOutcome, ViewportEvent};
use crate::geometry::Rect;
use crate::headless::{HeadlessEnvironment, NodeId};
use crate::lazy_load::LazyLoad;
use crate::settings::{LazyLoadSettings, PROCESSED_MARKER_ATTR};

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
}

fn ms(v: u64) -> Duration {
    Duration::from_millis(v)
}

fn env() -> Rc<HeadlessEnvironment> {
    init_tracing();
    Rc::new(HeadlessEnvironment::new(800.0, 600.0))
}

fn image(env: &HeadlessEnvironment, parent: Option<NodeId>, src: &str, layout: Rect) -> NodeId {
    let img = env.append_element(parent, "img");
    env.set_attribute(&img, "data-original", src);
    env.set_layout(img, layout);
    img
}

/// Fully inside an 800x600 viewport
fn visible() -> Rect {
    Rect::new(10.0, 10.0, 200.0, 100.0)
}

/// Entirely below an 800x600 viewport
fn below() -> Rect {
    Rect::new(10.0, 700.0, 200.0, 100.0)
}

/// `{threshold: 0, throttleIntervalMs: 0}`
fn instant() -> LazyLoadSettings<NodeId> {
    LazyLoadSettings::default()
        .with_threshold(0.0)
        .with_throttle(Duration::ZERO)
}

#[derive(Clone, Default)]
struct Calls {
    set: Rc<Cell<usize>>,
    load: Rc<Cell<usize>>,
    error: Rc<Cell<usize>>,
    batches: Rc<RefCell<Vec<usize>>>,
}

impl Calls {
    fn attach(&self, settings: LazyLoadSettings<NodeId>) -> LazyLoadSettings<NodeId> {
        let (set, load, error, batches) = (
            self.set.clone(),
            self.load.clone(),
            self.error.clone(),
            self.batches.clone(),
        );
        settings
            .on_set(move |_| set.set(set.get() + 1))
            .on_load(move |_| load.set(load.get() + 1))
            .on_error(move |_| error.set(error.get() + 1))
            .on_batch_processed(move |n| batches.borrow_mut().push(n))
    }
}

#[test]
fn test_visible_image_activates_then_loads() {
    let env = env();
    let img = image(&env, None, "a.png", visible());
    let calls = Calls::default();

    let lazy = LazyLoad::new(env.clone(), calls.attach(instant()));

    assert_eq!(env.attribute(&img, "src").as_deref(), Some("a.png"));
    assert!(env.has_class(img, "loading"));
    assert_eq!(calls.set.get(), 1);
    assert_eq!(calls.load.get(), 0);
    assert!(lazy.is_processed(&img));
    assert_eq!(lazy.pending_count(), 0);
    assert_eq!(
        env.attribute(&img, PROCESSED_MARKER_ATTR).as_deref(),
        Some("true")
    );

    env.complete(img, LoadOutcome::Loaded);

    assert!(!env.has_class(img, "loading"));
    assert!(env.has_class(img, "loaded"));
    assert_eq!(calls.load.get(), 1);
    assert_eq!(calls.error.get(), 0);
    assert_eq!(env.element_listener_count(img), 0);
}

#[test]
fn test_image_outside_region_stays_pending() {
    let env = env();
    let img = image(&env, None, "a.png", below());
    let calls = Calls::default();

    let lazy = LazyLoad::new(env.clone(), calls.attach(instant()));

    assert_eq!(env.attribute(&img, "src"), None);
    assert!(env.classes(img).is_empty());
    assert_eq!(calls.set.get(), 0);
    assert_eq!(lazy.pending(), vec![img]);
    assert!(!lazy.is_processed(&img));
    assert!(lazy.is_listening_scroll());
}

#[test]
fn test_load_failure_reports_error_once() {
    let env = env();
    let img = image(&env, None, "missing.png", visible());
    let calls = Calls::default();

    let _lazy = LazyLoad::new(env.clone(), calls.attach(instant()));
    env.complete(img, LoadOutcome::Failed);
    // Observers are gone after the first outcome
    env.complete(img, LoadOutcome::Failed);
    env.complete(img, LoadOutcome::Loaded);

    assert!(env.has_class(img, "error"));
    assert!(!env.has_class(img, "loading"));
    assert!(!env.has_class(img, "loaded"));
    assert_eq!(calls.error.get(), 1);
    assert_eq!(calls.load.get(), 0);
}

#[test]
fn test_empty_candidate_set_stops_scroll_ticks_until_rescan() {
    let env = env();
    image(&env, None, "a.png", visible());

    let lazy = LazyLoad::new(env.clone(), instant());
    assert!(!lazy.is_listening_scroll());
    assert_eq!(env.viewport_listener_count(ViewportEvent::Scroll), 0);
    let ticks = lazy.tick_count();

    assert_eq!(env.scroll_by(&Container::Viewport, 0.0, 50.0), 0);
    assert_eq!(env.dispatch(ViewportEvent::Scroll), 0);
    assert_eq!(lazy.tick_count(), ticks);

    let late = image(&env, None, "late.png", below());
    lazy.update();
    assert_eq!(lazy.pending(), vec![late]);
    assert!(lazy.is_listening_scroll());
    assert_eq!(env.viewport_listener_count(ViewportEvent::Scroll), 1);

    let before = lazy.tick_count();
    env.scroll_by(&Container::Viewport, 0.0, 300.0);
    assert_eq!(lazy.tick_count(), before + 1);
    assert_eq!(env.attribute(&late, "src").as_deref(), Some("late.png"));
    assert!(!lazy.is_listening_scroll());
}

#[test]
fn test_update_is_idempotent() {
    let env = env();
    let a = image(&env, None, "a.png", visible());
    let b = image(&env, None, "b.png", Rect::new(300.0, 10.0, 100.0, 100.0));
    let calls = Calls::default();

    let lazy = LazyLoad::new(env.clone(), calls.attach(instant()));
    assert_eq!(calls.set.get(), 2);

    env.clear_mutation_log();
    lazy.update();
    lazy.update();

    assert_eq!(calls.set.get(), 2);
    assert_eq!(lazy.pending_count(), 0);
    assert!(lazy.is_processed(&a) && lazy.is_processed(&b));
    assert!(env.mutation_log().is_empty());
}

#[test]
fn test_signals_within_interval_coalesce_into_one_deferred_tick() {
    let env = env();
    image(&env, None, "a.png", below());
    let lazy = LazyLoad::new(
        env.clone(),
        LazyLoadSettings::default()
            .with_threshold(0.0)
            .with_throttle(ms(150)),
    );

    // Opens the throttle window at t=0
    env.dispatch(ViewportEvent::Scroll);
    let ticks = lazy.tick_count();

    for _ in 0..5 {
        env.advance(ms(10));
        env.dispatch(ViewportEvent::Scroll);
    }
    assert_eq!(lazy.tick_count(), ticks);
    assert!(lazy.has_deferred_tick());
    assert_eq!(env.pending_timer_count(), 1);

    // First signal in the window arrived at t=10, so the tick is due at 150
    env.advance(ms(99));
    assert_eq!(lazy.tick_count(), ticks);
    env.advance(ms(1));
    assert_eq!(lazy.tick_count(), ticks + 1);
    assert!(!lazy.has_deferred_tick());
    assert_eq!(env.pending_timer_count(), 0);
}

#[test]
fn test_deferred_tick_records_fire_time() {
    let env = env();
    image(&env, None, "a.png", below());
    let lazy = LazyLoad::new(
        env.clone(),
        LazyLoadSettings::default()
            .with_threshold(0.0)
            .with_throttle(ms(150)),
    );

    env.dispatch(ViewportEvent::Scroll);
    env.advance(ms(10));
    env.dispatch(ViewportEvent::Scroll);
    env.advance(ms(140));
    let ticks = lazy.tick_count();

    // Window restarts at 150, so a signal at 210 waits until 300
    env.advance(ms(60));
    env.dispatch(ViewportEvent::Scroll);
    assert_eq!(lazy.tick_count(), ticks);
    env.advance(ms(89));
    assert_eq!(lazy.tick_count(), ticks);
    env.advance(ms(1));
    assert_eq!(lazy.tick_count(), ticks + 1);
}

#[test]
fn test_zero_throttle_ticks_on_every_signal() {
    let env = env();
    image(&env, None, "a.png", below());
    let lazy = LazyLoad::new(env.clone(), instant());
    let ticks = lazy.tick_count();

    for _ in 0..7 {
        env.dispatch(ViewportEvent::Scroll);
    }

    assert_eq!(lazy.tick_count(), ticks + 7);
    assert_eq!(env.pending_timer_count(), 0);
}

#[test]
fn test_teardown_cancels_deferred_tick() {
    let env = env();
    image(&env, None, "a.png", below());
    let lazy = LazyLoad::new(
        env.clone(),
        LazyLoadSettings::default()
            .with_threshold(0.0)
            .with_throttle(ms(150)),
    );

    env.dispatch(ViewportEvent::Scroll);
    env.advance(ms(10));
    env.dispatch(ViewportEvent::Scroll);
    assert!(lazy.has_deferred_tick());
    let ticks = lazy.tick_count();

    lazy.teardown();
    assert!(lazy.is_torn_down());
    assert_eq!(env.pending_timer_count(), 0);
    assert_eq!(env.viewport_listener_count(ViewportEvent::Resize), 0);
    assert_eq!(env.viewport_listener_count(ViewportEvent::Scroll), 0);

    env.advance(ms(1000));
    lazy.handle_viewport_signal();
    lazy.update();
    assert_eq!(lazy.tick_count(), ticks);
    assert_eq!(lazy.pending_count(), 0);
    assert!(lazy.settings().is_none());
}

#[test]
fn test_picture_sources_precede_image() {
    let env = env();
    let picture = env.append_element(None, "picture");
    let avif = env.append_element(Some(picture), "source");
    env.set_attribute(&avif, "data-original-set", "a.avif");
    let webp = env.append_element(Some(picture), "source");
    env.set_attribute(&webp, "data-original-set", "a.webp");
    let img = image(&env, Some(picture), "a.jpg", visible());
    env.set_attribute(&img, "data-original-set", "a.jpg 1x, a@2x.jpg 2x");
    env.clear_mutation_log();

    let _lazy = LazyLoad::new(env.clone(), instant());

    let log = env.mutation_log();
    let position = |suffix: &str| log.iter().position(|m| m.ends_with(suffix));
    let avif_at = position("srcset=a.avif").unwrap();
    let webp_at = position("srcset=a.webp").unwrap();
    let img_srcset_at = position("srcset=a.jpg 1x, a@2x.jpg 2x").unwrap();
    let img_src_at = position(" src=a.jpg").unwrap();
    assert!(avif_at < webp_at);
    assert!(webp_at < img_srcset_at);
    assert!(img_srcset_at < img_src_at);
}

#[test]
fn test_initial_class_only_on_first_tick() {
    let env = env();
    let first = image(&env, None, "a.png", visible());
    let later = image(&env, None, "b.png", below());

    let _lazy = LazyLoad::new(env.clone(), instant());
    assert!(env.has_class(first, "initial"));

    env.scroll_by(&Container::Viewport, 0.0, 300.0);
    assert_eq!(env.attribute(&later, "src").as_deref(), Some("b.png"));
    assert!(!env.has_class(later, "initial"));
    assert!(env.has_class(later, "loading"));
}

#[test]
fn test_skip_invisible() {
    let env = env();
    let wrapper = env.append_element(None, "div");
    let img = image(&env, Some(wrapper), "a.png", visible());
    env.set_hidden(wrapper, true);

    let lazy = LazyLoad::new(env.clone(), instant());
    assert_eq!(lazy.pending(), vec![img]);

    env.set_hidden(wrapper, false);
    lazy.tick();
    assert!(lazy.is_processed(&img));

    let hidden = image(&env, Some(wrapper), "b.png", visible());
    env.set_hidden(wrapper, true);
    let eager = LazyLoad::new(env.clone(), instant().with_skip_invisible(false));
    assert!(eager.is_processed(&hidden));
}

#[test]
fn test_marker_attribute_honored_by_second_instance() {
    let env = env();
    let img = image(&env, None, "a.png", visible());
    let first = LazyLoad::new(env.clone(), instant());
    assert!(first.is_processed(&img));
    drop(first);

    let calls = Calls::default();
    let second = LazyLoad::new(env.clone(), calls.attach(instant()));
    assert_eq!(second.pending_count(), 0);
    assert!(!second.is_processed(&img));
    assert_eq!(calls.set.get(), 0);
}

#[test]
fn test_completion_after_teardown_is_ignored() {
    let env = env();
    let img = image(&env, None, "a.png", visible());
    let calls = Calls::default();

    let lazy = LazyLoad::new(env.clone(), calls.attach(instant()));
    drop(lazy);
    assert_eq!(env.viewport_listener_count(ViewportEvent::Resize), 0);

    env.complete(img, LoadOutcome::Loaded);
    assert_eq!(calls.load.get(), 0);
    assert!(env.has_class(img, "loading"));
    assert!(!env.has_class(img, "loaded"));
}

#[test]
fn test_batch_callback_reports_decreasing_counts() {
    let env = env();
    let imgs: Vec<NodeId> = (0..3)
        .map(|i| {
            image(
                &env,
                None,
                &format!("{i}.png"),
                Rect::new(i as f32 * 210.0, 10.0, 200.0, 100.0),
            )
        })
        .collect();
    let offscreen = image(&env, None, "x.png", below());
    let calls = Calls::default();

    let lazy = LazyLoad::new(env.clone(), calls.attach(instant()));

    assert_eq!(*calls.batches.borrow(), vec![3, 2, 1]);
    for img in imgs.iter().chain([&offscreen]) {
        assert_ne!(lazy.is_processed(img), lazy.pending().contains(img));
    }
}

#[test]
fn test_container_region() {
    let env = env();
    let scroller = env.append_element(None, "div");
    env.set_layout(scroller, Rect::new(0.0, 0.0, 300.0, 300.0));
    let near = image(&env, Some(scroller), "near.png", Rect::new(0.0, 100.0, 100.0, 100.0));
    let far = image(&env, Some(scroller), "far.png", Rect::new(0.0, 500.0, 100.0, 100.0));

    let lazy = LazyLoad::new(
        env.clone(),
        instant().with_container(Container::Element(scroller)),
    );
    assert!(lazy.is_processed(&near));
    assert_eq!(lazy.pending(), vec![far]);

    // Scrolling the window does not reach a container listener
    assert_eq!(env.scroll_by(&Container::Viewport, 0.0, 0.0), 0);

    assert_eq!(env.scroll_by(&Container::Element(scroller), 0.0, 300.0), 1);
    assert_eq!(env.attribute(&far, "src").as_deref(), Some("far.png"));
    assert_eq!(lazy.pending_count(), 0);
}

#[test]
fn test_threshold_extends_region() {
    let env = env();
    let img = image(&env, None, "a.png", Rect::new(0.0, 650.0, 100.0, 50.0));

    let strict = LazyLoad::new(env.clone(), instant());
    assert!(!strict.is_processed(&img));
    strict.teardown();

    let generous = LazyLoad::new(env.clone(), instant().with_threshold(100.0));
    assert!(generous.is_processed(&img));
}

#[test]
fn test_resize_ticks() {
    let env = env();
    let img = image(&env, None, "a.png", below());
    let lazy = LazyLoad::new(env.clone(), instant());

    assert_eq!(env.resize_viewport(800.0, 1000.0), 1);
    assert!(lazy.is_processed(&img));
}

#[test]
fn test_invalid_selector_matches_nothing() {
    let env = env();
    image(&env, None, "a.png", visible());

    let lazy = LazyLoad::new(env.clone(), instant().with_selector("img["));

    assert_eq!(lazy.pending_count(), 0);
    assert!(!lazy.is_listening_scroll());
    assert_eq!(lazy.tick_count(), 1);
}

#[test]
fn test_background_and_frame_through_loader() {
    let env = env();
    let hero = env.append_element(None, "section");
    env.set_attribute(&hero, "data-original", "hero.jpg");
    env.set_layout(hero, visible());
    let frame = env.append_element(None, "iframe");
    env.set_attribute(&frame, "data-original", "map.html");
    env.set_layout(frame, Rect::new(300.0, 10.0, 200.0, 200.0));
    let calls = Calls::default();

    let _lazy = LazyLoad::new(
        env.clone(),
        calls.attach(instant().with_selector("section, iframe")),
    );

    assert_eq!(env.background_image(hero).as_deref(), Some("url(hero.jpg)"));
    assert_eq!(env.attribute(&frame, "src").as_deref(), Some("map.html"));
    assert_eq!(calls.set.get(), 2);

    env.complete(frame, LoadOutcome::Loaded);
    assert!(env.has_class(frame, "loaded"));
    assert_eq!(calls.load.get(), 1);
}

#[test]
fn test_callback_may_reenter_update() {
    let env = env();
    let a = image(&env, None, "a.png", visible());
    let b = image(&env, None, "b.png", Rect::new(300.0, 10.0, 100.0, 100.0));

    let slot: Rc<RefCell<Option<LazyLoad<HeadlessEnvironment>>>> = Rc::new(RefCell::new(None));
    let reentered = Rc::new(Cell::new(0));
    let (s, r) = (slot.clone(), reentered.clone());
    let settings = instant().on_set(move |_| {
        // Absent during construction, present once stored below
        if let Ok(guard) = s.try_borrow() {
            if let Some(lazy) = guard.as_ref() {
                r.set(r.get() + 1);
                lazy.update();
            }
        }
    });

    let lazy = LazyLoad::new(env.clone(), settings);
    assert!(lazy.is_processed(&a) && lazy.is_processed(&b));
    *slot.borrow_mut() = Some(lazy);

    let c = image(&env, None, "c.png", Rect::new(600.0, 10.0, 100.0, 100.0));
    if let Some(lazy) = slot.borrow().as_ref() {
        lazy.update();
        assert!(lazy.is_processed(&c));
    }
    assert_eq!(reentered.get(), 1);
    assert_eq!(env.attribute(&c, "src").as_deref(), Some("c.png"));

    // Break the settings -> slot -> instance cycle
    slot.borrow_mut().take();
}
