use std::{
    sync::{Arc, atomic::Ordering},
    time::Duration,
};

use webgrade::{
    CodeBundle, EngineError,
    render::{RenderPool, StaticRenderer},
};


use render_support::{Behavior, ScriptedRenderer, list_page, test_config};

fn bundle(marker: &str) -> CodeBundle {
    CodeBundle::new(format!("<!-- {marker} --><p>hi</p>"), "", "")
}

async fn settle(pool: &RenderPool) {
    for _ in 0..200 {
        let stats = pool.stats();
        if stats.in_flight == 0 && stats.available == stats.capacity {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("renders never finished: {:?}", pool.stats());
}

#[tokio::test]
async fn static_render_extracts_dom_and_text() {
    let pool = RenderPool::new(Arc::new(StaticRenderer::new()), &test_config());
    let artifact = pool.render(list_page()).await.expect("render");

    assert_eq!(artifact.dom_tree.tag, "body");
    assert!(artifact.screenshot.is_none(), "the static backend takes no screenshot");
    assert_eq!(
        artifact.text_content,
        vec!["Shopping list", "Things to buy this week", "Apples", "Bread", "Coffee", "Updated on Sunday"]
    );
    assert!(artifact.dom_tree.find_all("script").is_empty(), "injected nodes are stripped");
    assert!(artifact.dom_tree.find_all("style").is_empty());

    let stats = pool.stats();
    assert_eq!(stats.completed, 1);
    assert_eq!(stats.available, stats.capacity);
}

#[tokio::test]
async fn deadline_tears_the_context_down() {
    let renderer = ScriptedRenderer::new().when("hang", Behavior::Hang(Duration::from_secs(10)));
    let torn = Arc::clone(&renderer.torn);
    let config = test_config().with_render_timeout(Duration::from_millis(100));
    let pool = RenderPool::new(Arc::new(renderer), &config);

    let err = pool.render(bundle("hang")).await.expect_err("too slow");
    assert!(matches!(err, EngineError::RenderTimeout(_)));
    assert_eq!(torn.load(Ordering::SeqCst), 1);

    settle(&pool).await;
    let stats = pool.stats();
    assert_eq!(stats.timed_out, 1);
    assert_eq!(stats.available, stats.capacity, "the context is released after teardown");
}

#[tokio::test]
async fn renderer_panic_becomes_a_crash() {
    let renderer = ScriptedRenderer::new().when("boom", Behavior::Panic);
    let pool = RenderPool::new(Arc::new(renderer), &test_config());

    let err = pool.render(bundle("boom")).await.expect_err("panicked");
    assert!(matches!(err, EngineError::RenderCrash(_)));
    assert_eq!(pool.stats().failed, 1);

    pool.render(bundle("fine")).await.expect("pool still usable");
}

#[tokio::test]
async fn waiting_too_long_for_a_context_is_exhaustion() {
    let renderer =
        ScriptedRenderer::new().when("slow", Behavior::Hang(Duration::from_millis(300)));
    let config = test_config()
        .with_pool_size(1)
        .with_acquire_timeout(Duration::from_millis(30));
    let pool = RenderPool::new(Arc::new(renderer), &config);

    let busy = {
        let pool = pool.clone();
        tokio::spawn(async move { pool.render(bundle("slow")).await })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;

    let err = pool.render(bundle("fine")).await.expect_err("no free context");
    assert!(matches!(err, EngineError::PoolExhausted(_)));
    assert_eq!(pool.stats().exhausted, 1);

    busy.await.expect("join").expect("slow render still completes");
}

#[tokio::test]
async fn abandoned_render_finishes_and_frees_its_context() {
    let renderer =
        ScriptedRenderer::new().when("slow", Behavior::Hang(Duration::from_millis(150)));
    let calls = Arc::clone(&renderer.calls);
    let torn = Arc::clone(&renderer.torn);
    let pool = RenderPool::new(Arc::new(renderer), &test_config().with_pool_size(1));

    let abandoned =
        tokio::time::timeout(Duration::from_millis(20), pool.render(bundle("slow"))).await;
    assert!(abandoned.is_err());

    settle(&pool).await;
    assert_eq!(torn.load(Ordering::SeqCst), 0, "abandoning does not kill the render");
    assert_eq!(pool.stats().available, 1);

    pool.render(bundle("fine")).await.expect("context reused");
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}
