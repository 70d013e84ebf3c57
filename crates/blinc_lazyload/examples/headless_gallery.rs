//! Headless Gallery Demo
//!
//! A tall page of lazily loaded media driven without a display:
//! - A column of plain images
//! - A picture group with AVIF/WebP sources
//! - An embedded frame
//! - A section with a background image
//!
//! The page is scrolled in steps, resources "complete" on a fake network
//! delay, and every lifecycle callback is reported through tracing.
//!
//! Run with: RUST_LOG=blinc_lazyload=debug cargo run -p blinc_lazyload --example headless_gallery

use std::rc::Rc;
use std::time::Duration;

use blinc_lazyload::headless::{HeadlessEnvironment, NodeId};
use blinc_lazyload::prelude::*;
use tracing::info;

const OPTIONS: &str = r#"
selector = "img, iframe, section.hero"
threshold = 100.0
throttleIntervalMs = 100
classLoaded = "is-loaded"
"#;

const ROW_HEIGHT: f32 = 400.0;

fn main() -> Result<(), LazyLoadError> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let env = Rc::new(HeadlessEnvironment::new(1024.0, 768.0));
    let media = build_page(&env);

    let options = LazyLoadOptions::from_toml_str(OPTIONS)?;
    let settings = LazyLoadSettings::default()
        .with_options(options)
        .on_set(|node: &NodeId| info!("set     {:?}", node))
        .on_load(|node: &NodeId| info!("loaded  {:?}", node))
        .on_error(|node: &NodeId| info!("failed  {:?}", node))
        .on_batch_processed(|remaining| info!("{} candidates remaining", remaining));

    let lazy = LazyLoad::new(env.clone(), settings);
    info!("Initial pass left {} pending", lazy.pending_count());
    settle(&env, &media);

    let mut step = 0;
    while lazy.is_listening_scroll() {
        step += 1;
        env.scroll_by(&Container::Viewport, 0.0, 300.0);
        // Let any deferred tick fire
        env.advance(Duration::from_millis(120));
        info!(
            "Scroll step {}: {} pending, {} ticks",
            step,
            lazy.pending_count(),
            lazy.tick_count()
        );
        settle(&env, &media);
    }

    info!(
        "Gallery fully loaded after {} scroll steps ({} ticks)",
        step,
        lazy.tick_count()
    );
    lazy.teardown();
    Ok(())
}

/// Builds the page and returns every image and frame in document order
fn build_page(env: &HeadlessEnvironment) -> Vec<NodeId> {
    let mut media = Vec::new();
    let mut y = 0.0;
    let mut next_row = || {
        let rect = Rect::new(32.0, y, 960.0, ROW_HEIGHT - 32.0);
        y += ROW_HEIGHT;
        rect
    };

    let body = env.append_element(None, "body");

    for i in 0..6 {
        let img = env.append_element(Some(body), "img");
        env.set_attribute(&img, "data-original", &format!("photos/{i}.jpg"));
        env.set_attribute(
            &img,
            "data-original-set",
            &format!("photos/{i}.jpg 1x, photos/{i}@2x.jpg 2x"),
        );
        env.set_layout(img, next_row());
        media.push(img);
    }

    let picture = env.append_element(Some(body), "picture");
    for (tag, set) in [("source", "cover.avif"), ("source", "cover.webp")] {
        let source = env.append_element(Some(picture), tag);
        env.set_attribute(&source, "data-original-set", set);
    }
    let cover = env.append_element(Some(picture), "img");
    env.set_attribute(&cover, "data-original", "cover.jpg");
    env.set_layout(cover, next_row());
    media.push(cover);

    let frame = env.append_element(Some(body), "iframe");
    env.set_attribute(&frame, "data-original", "https://maps.example/embed");
    env.set_layout(frame, next_row());
    media.push(frame);

    let hero = env.append_element(Some(body), "section");
    env.set_attribute(&hero, "class", "hero");
    env.set_attribute(&hero, "data-original", "hero.jpg");
    env.set_layout(hero, next_row());

    media
}

/// Completes every in-flight resource; the frame fails to show the error path
fn settle(env: &HeadlessEnvironment, media: &[NodeId]) {
    for node in media {
        if !env.has_class(*node, "loading") {
            continue;
        }
        let outcome = match env.kind(node) {
            ElementKind::Frame => LoadOutcome::Failed,
            _ => LoadOutcome::Loaded,
        };
        env.complete(*node, outcome);
    }
}
