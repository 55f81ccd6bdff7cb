use std::sync::Arc;
use std::thread;

use tg_compiler::{compile_filter_list, CompileOptions};
use tg_core::engine::Engine;
use tg_core::index::RuleIndex;
use tg_core::matcher::Matcher;
use tg_core::types::{RequestContext, RequestType};

const BLOCKING: &str = "||ads.com^\n||tracker.com^";
const PERMISSIVE: &str = "||unrelated.net^";

fn build(text: &str) -> RuleIndex {
    compile_filter_list(text, &CompileOptions::default()).index
}

#[test]
fn readers_never_see_a_partial_generation() {
    let engine = Arc::new(Engine::new(build(BLOCKING)));
    let mut handles = vec![];

    for _ in 0..4 {
        let engine = Arc::clone(&engine);
        handles.push(thread::spawn(move || {
            for _ in 0..2000 {
                let index = engine.load();
                let matcher = Matcher::new(&index);
                let ads = matcher.match_request(&RequestContext::new(
                    "https://ads.com/a.js",
                    "site.com",
                    RequestType::SCRIPT,
                ));
                let tracker = matcher.match_request(&RequestContext::new(
                    "https://tracker.com/p",
                    "site.com",
                    RequestType::PING,
                ));
                assert_eq!(ads.decision, tracker.decision);
                assert_eq!(ads.generation, index.generation());
                assert_eq!(tracker.generation, index.generation());
                // Odd generations block, even ones allow.
                assert_eq!(ads.is_blocked(), index.generation() % 2 == 1);
            }
        }));
    }

    {
        let engine = Arc::clone(&engine);
        handles.push(thread::spawn(move || {
            for i in 2..50u64 {
                let text = if i % 2 == 0 { PERMISSIVE } else { BLOCKING };
                let replaced = engine.reload(build(text));
                assert_eq!(replaced, i - 1);
                thread::yield_now();
            }
        }));
    }

    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(engine.generation(), 49);
    assert!(engine.request("https://ads.com/a.js", "site.com", RequestType::SCRIPT).is_blocked());
}

#[test]
fn concurrent_writers_never_reinstall_an_older_generation() {
    let engine = Arc::new(Engine::new(build(BLOCKING)));
    let mut handles = vec![];

    for w in 0..4 {
        let engine = Arc::clone(&engine);
        handles.push(thread::spawn(move || {
            let mut replaced_seen = Vec::with_capacity(2000);
            for i in 0..2000 {
                let text = if (w + i) % 2 == 0 { PERMISSIVE } else { BLOCKING };
                let replaced = engine.reload(build(text));
                assert!(engine.generation() > replaced);
                replaced_seen.push(replaced);
            }
            replaced_seen
        }));
    }

    let mut replaced: Vec<u64> = handles
        .into_iter()
        .flat_map(|h| h.join().unwrap())
        .collect();
    replaced.sort_unstable();

    // Each reload replaced a distinct generation, covering 1..=8000 exactly.
    assert_eq!(replaced, (1..=8000).collect::<Vec<u64>>());
    assert_eq!(engine.generation(), 8001);
}

#[test]
fn held_guard_outlives_reload() {
    let engine = Engine::new(build(BLOCKING));
    let old = engine.load();
    engine.reload(build(PERMISSIVE));

    let ctx = RequestContext::new("https://ads.com/a.js", "site.com", RequestType::SCRIPT);
    assert!(Matcher::new(&old).match_request(&ctx).is_blocked());
    assert!(!engine.check(&ctx).is_blocked());
}
