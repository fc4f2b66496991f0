//! End-to-end tests for graph compilation and execution
//!
//! Every model and classifier here is a mock; nothing leaves the process.

use async_trait::async_trait;
use once_cell::sync::Lazy;
use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use switchboard_rs::adk::error::{ClassifierError, GraphDefinitionError, SwitchboardError};
use switchboard_rs::switchboard::checkpoint::{Checkpointer, FileCheckpointer, InMemoryCheckpointer};
use switchboard_rs::switchboard::config::EngineConfig;
use switchboard_rs::switchboard::dispatch::{Classifier, DispatcherBuilder, KeywordClassifier, OverrideRule};
use switchboard_rs::switchboard::workflow::builder::Builder;
use switchboard_rs::switchboard::workflow::graph::{CompiledGraph, GraphBuilder, RunConfig, END};
use switchboard_rs::switchboard::workflow::loader::GraphLoader;
use switchboard_rs::switchboard::workflow::registry::StepRegistry;
use switchboard_rs::switchboard::workflow::retry::{add_verify_loop, GiveUp, VerifyLoop, VerifyRouter};
use switchboard_rs::switchboard::workflow::state::{
    merge, FieldType, Message, PartialState, State, StateFieldDef, StateSchema,
};
use switchboard_rs::switchboard::workflow::step::{step_fn, sync_step, Constant};

// ============================================================================
// Mock Components
// ============================================================================

/// Classifier that always errors
struct FailingClassifier;

#[async_trait]
impl Classifier for FailingClassifier {
    async fn classify(&self, _text: &str, _state: &State) -> Result<String, ClassifierError> {
        Err(ClassifierError::Other("classifier backend is down".into()))
    }
}

static HISTORY_SCHEMA: Lazy<StateSchema> = Lazy::new(|| {
    StateSchema::new()
        .field("history", StateFieldDef::new(FieldType::Messages).append(Some(4)))
        .field("visits", StateFieldDef::new(FieldType::Integer).with_default(0))
});

fn mark(key: &str) -> Constant {
    Constant(PartialState::new().set(key, true))
}

/// `greet` records the request in the history and counts visits
fn chat_graph(checkpointer: Arc<dyn Checkpointer>) -> CompiledGraph {
    let mut b = GraphBuilder::new("chat")
        .with_schema(HISTORY_SCHEMA.clone())
        .with_checkpointer(checkpointer);
    b.register_step(
        "greet",
        sync_step(|s: &State| {
            let query = s.text("query").unwrap_or_default().to_string();
            PartialState::new()
                .set("history", serde_json::to_value(Message::user(query)).unwrap_or_default())
                .set("visits", s.integer("visits").unwrap_or(0) + 1)
        }),
    )
    .unwrap();
    b.set_entry("greet").unwrap();
    b.add_edge("greet", END);
    b.compile().unwrap()
}

// ============================================================================
// Compilation
// ============================================================================

#[test]
fn test_dangling_edges_never_compile() {
    for target in ["ghost", "study_end", "Greet"] {
        let mut b = GraphBuilder::new("broken");
        b.register_step("greet", mark("x")).unwrap();
        b.set_entry("greet").unwrap();
        b.add_edge("greet", target);
        assert!(
            matches!(b.compile(), Err(GraphDefinitionError::DanglingEdge { ref to, .. }) if to == target),
            "edge to {} compiled",
            target
        );
    }

    let mut b = GraphBuilder::new("broken");
    b.register_step("classify", mark("x")).unwrap();
    b.register_step("study", mark("y")).unwrap();
    b.set_entry("classify").unwrap();
    b.add_conditional_edges(
        "classify",
        |_: &State| "study",
        [("study", "study"), ("work", "work_end")],
    );
    assert!(matches!(
        b.compile(),
        Err(GraphDefinitionError::DanglingLabel { ref target, .. }) if target == "work_end"
    ));
}

#[tokio::test]
async fn test_yaml_definition_errors_surface_at_build() {
    let yaml = r#"
name: broken
entry: start
steps:
  - id: start
    set: { ready: true }
edges:
  - { from: start, to: nowhere }
"#;
    let def = GraphLoader::parse_yaml(yaml).unwrap();
    let builder = Builder::new(StepRegistry::new(), EngineConfig::default());
    let err = builder.build_definition(&def, ".").await.unwrap_err();
    assert!(matches!(err, SwitchboardError::Graph(GraphDefinitionError::DanglingEdge { .. })));
}

// ============================================================================
// Merge rules
// ============================================================================

#[test]
fn test_merge_leaves_omitted_keys_alone() {
    let schema = HISTORY_SCHEMA.clone();
    let start = merge(
        &State::from_schema(&schema),
        &PartialState::new()
            .set("query", "hello")
            .set("profile", json!({"name": "Ada"}))
            .set("visits", 3),
        &schema,
    )
    .unwrap();

    let updates = [
        PartialState::new(),
        PartialState::new().set("visits", 4),
        PartialState::new().set("other", json!([1, 2])),
    ];
    for update in &updates {
        let next = merge(&start, update, &schema).unwrap();
        for key in start.keys() {
            if !update.contains_key(key) {
                assert_eq!(next.get(key), start.get(key), "key {} changed", key);
            }
        }
    }
}

#[test]
fn test_append_cap_holds_across_many_updates() {
    let schema = HISTORY_SCHEMA.clone();
    let mut state = State::from_schema(&schema);
    for i in 0..25 {
        let batch: Vec<Message> = (0..(i % 3 + 1))
            .map(|j| Message::assistant(format!("{}-{}", i, j)))
            .collect();
        state
            .apply(
                &PartialState::new().set("history", serde_json::to_value(batch).unwrap()),
                &schema,
            )
            .unwrap();
        assert!(state.list("history").len() <= 4);
    }
    // newest items are kept
    let last = state.messages("history");
    assert_eq!(last.last().unwrap().content, "24-0");
}

// ============================================================================
// Bounded retry
// ============================================================================

#[tokio::test]
async fn test_verify_loop_stops_after_three_trials() {
    let generated = Arc::new(AtomicUsize::new(0));
    let counter = generated.clone();

    let mut b = GraphBuilder::new("draft_email");
    add_verify_loop(
        &mut b,
        &VerifyLoop {
            generate: "generate".into(),
            verify: "verify".into(),
            accept_to: "send".into(),
            give_up_to: "give_up".into(),
        },
        sync_step(move |_: &State| {
            counter.fetch_add(1, Ordering::SeqCst);
            PartialState::new().set("draft", "Dear team, ...")
        }),
        sync_step(|_: &State| PartialState::new().set("sendable", false)),
        VerifyRouter::new(3),
    )
    .unwrap();
    b.register_step("send", mark("sent")).unwrap();
    b.register_step("give_up", GiveUp::default()).unwrap();
    b.add_edge("send", END);
    b.add_edge("give_up", END);
    b.set_entry("generate").unwrap();
    let graph = b.compile().unwrap();

    let state = graph
        .ainvoke(PartialState::new(), &RunConfig::new("retry"))
        .await
        .unwrap();
    assert_eq!(generated.load(Ordering::SeqCst), 3);
    assert_eq!(state.flag("sendable"), Some(false));
    assert_eq!(state.flag("sent"), None);
}

// ============================================================================
// Threads and checkpoints
// ============================================================================

#[tokio::test]
async fn test_threads_are_isolated_and_resume() {
    let graph = chat_graph(Arc::new(InMemoryCheckpointer::new()));

    let a = graph
        .ainvoke(
            PartialState::new().set("query", "from a").set("a_only", 1),
            &RunConfig::new("A"),
        )
        .await
        .unwrap();
    let b = graph
        .ainvoke(PartialState::new().set("query", "from b"), &RunConfig::new("B"))
        .await
        .unwrap();

    assert_eq!(a.integer("a_only"), Some(1));
    assert!(!b.contains("a_only"));
    assert_eq!(b.messages("history"), vec![Message::user("from b")]);
    assert_eq!(b.integer("visits"), Some(1));

    let again = graph
        .ainvoke(PartialState::new().set("query", "a again"), &RunConfig::new("A"))
        .await
        .unwrap();
    assert_eq!(again.integer("visits"), Some(2));
    assert_eq!(again.integer("a_only"), Some(1));
    assert_eq!(
        again.messages("history"),
        vec![Message::user("from a"), Message::user("a again")]
    );
}

#[tokio::test]
async fn test_file_store_survives_a_new_graph_instance() {
    let dir = tempfile::tempdir().unwrap();

    let first = chat_graph(Arc::new(FileCheckpointer::new(dir.path())));
    first
        .ainvoke(PartialState::new().set("query", "hi"), &RunConfig::new("user:42"))
        .await
        .unwrap();
    drop(first);

    let store: Arc<dyn Checkpointer> = Arc::new(FileCheckpointer::new(dir.path()));
    let second = chat_graph(store.clone());
    let state = second
        .ainvoke(PartialState::new().set("query", "hi again"), &RunConfig::new("user:42"))
        .await
        .unwrap();
    assert_eq!(state.integer("visits"), Some(2));
    assert_eq!(store.list_threads().await.unwrap(), vec!["user:42".to_string()]);

    assert!(store.delete("user:42").await.unwrap());
    assert!(second.get_state("user:42").await.unwrap().is_none());
}

#[tokio::test]
async fn test_concurrent_threads_share_one_graph() {
    let graph = Arc::new(chat_graph(Arc::new(InMemoryCheckpointer::new())));

    let handles: Vec<_> = (0..8)
        .map(|i| {
            let graph = graph.clone();
            tokio::spawn(async move {
                graph
                    .ainvoke(
                        PartialState::new().set("query", format!("request {}", i)),
                        &RunConfig::new(format!("thread-{}", i)),
                    )
                    .await
            })
        })
        .collect();
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    for i in 0..8 {
        let state = graph.get_state(&format!("thread-{}", i)).await.unwrap().unwrap();
        assert_eq!(state.messages("history"), vec![Message::user(format!("request {}", i))]);
    }
}

#[tokio::test]
async fn test_cancelled_run_saves_nothing() {
    let store: Arc<dyn Checkpointer> = Arc::new(InMemoryCheckpointer::new());
    let mut b = GraphBuilder::new("slow").with_checkpointer(store.clone());
    b.register_step("quick", mark("started")).unwrap();
    b.register_step(
        "slow",
        step_fn(|_: State| async {
            tokio::time::sleep(Duration::from_secs(30)).await;
            PartialState::new().set("finished", true)
        }),
    )
    .unwrap();
    b.set_entry("quick").unwrap();
    b.add_edge("quick", "slow");
    b.add_edge("slow", END);
    let graph = b.compile().unwrap();

    let config = RunConfig::new("cancel-me");
    let run = graph.ainvoke(PartialState::new(), &config);
    assert!(tokio::time::timeout(Duration::from_millis(50), run).await.is_err());
    assert!(store.load("cancel-me").await.unwrap().is_none());
}

// ============================================================================
// Sub-graphs
// ============================================================================

fn tutoring_graph(checkpointer: Option<Arc<dyn Checkpointer>>) -> CompiledGraph {
    let schema = StateSchema::new().field("notes", StateFieldDef::new(FieldType::List).append(None));
    let mut b = GraphBuilder::new("tutoring").with_schema(schema);
    if let Some(cp) = checkpointer {
        b = b.with_checkpointer(cp);
    }
    b.register_step(
        "outline",
        sync_step(|s: &State| {
            let topic = s.text("query").unwrap_or("nothing").to_string();
            PartialState::new()
                .set("topic", topic.clone())
                .set("notes", json!([format!("outline {}", topic)]))
        }),
    )
    .unwrap();
    b.register_step(
        "quiz",
        sync_step(|s: &State| {
            PartialState::new()
                .set("questions", s.list("notes").len() as i64 * 2)
                .set("notes", json!(["quiz"]))
        }),
    )
    .unwrap();
    b.set_entry("outline").unwrap();
    b.add_edge("outline", "quiz");
    b.add_edge("quiz", END);
    b.compile().unwrap()
}

#[tokio::test]
async fn test_subgraph_produces_what_it_would_alone() {
    let store: Arc<dyn Checkpointer> = Arc::new(InMemoryCheckpointer::new());
    let alone = tutoring_graph(Some(store));

    let child = Arc::new(tutoring_graph(None));
    let mut b = GraphBuilder::new("assistant").with_checkpointer(Arc::new(InMemoryCheckpointer::new()));
    b.register_step("receive", mark("received")).unwrap();
    b.register_step("tutor", child.as_step()).unwrap();
    b.register_step("reply", mark("replied")).unwrap();
    b.set_entry("receive").unwrap();
    b.add_edge("receive", "tutor");
    b.add_edge("tutor", "reply");
    b.add_edge("reply", END);
    let parent = b.compile().unwrap();

    // the second turn resumes the same thread on both sides
    for query in ["fractions", "decimals"] {
        let input = PartialState::new().set("query", query);
        let solo = alone.ainvoke(input.clone(), &RunConfig::new("lesson")).await.unwrap();
        let nested = parent.ainvoke(input, &RunConfig::new("lesson")).await.unwrap();
        for key in ["topic", "notes", "questions"] {
            assert_eq!(nested.get(key), solo.get(key), "key {} after {}", key, query);
        }
        assert_eq!(nested.flag("replied"), Some(true));
    }

    let stored = parent.get_state("lesson").await.unwrap().unwrap();
    assert_eq!(
        stored.list("notes"),
        &[
            json!("outline fractions"),
            json!("quiz"),
            json!("outline decimals"),
            json!("quiz")
        ]
    );
    assert_eq!(stored.integer("questions"), Some(6));
}

// ============================================================================
// Dispatch
// ============================================================================

#[tokio::test]
async fn test_exam_request_ends_at_study() {
    let mut b = GraphBuilder::new("router");
    b.register_step(
        "classify",
        sync_step(|s: &State| {
            let text = s.text("query").unwrap_or_default();
            let category = if text.contains("exam") { "study" } else { "personal" };
            PartialState::new().set("category", category)
        }),
    )
    .unwrap();
    for end in ["study_end", "work_end", "personal_end"] {
        b.register_step(end, mark(end)).unwrap();
        b.add_edge(end, END);
    }
    b.set_entry("classify").unwrap();
    b.add_conditional_edges(
        "classify",
        |s: &State| s.text("category").unwrap_or("personal").to_string(),
        [
            ("study", "study_end"),
            ("work", "work_end"),
            ("personal", "personal_end"),
        ],
    );
    let graph = b.compile().unwrap();

    let out = graph
        .invoke_traced(
            PartialState::new().set("query", "help me study for my exam"),
            &RunConfig::new("exam"),
        )
        .await
        .unwrap();
    assert_eq!(out.steps.last().unwrap().step, "study_end");
    assert_eq!(out.state.flag("study_end"), Some(true));
}

#[tokio::test]
async fn test_dispatcher_routes_exam_to_study() {
    let classifier = KeywordClassifier::new()
        .category("study", ["exam", "homework"])
        .category("work", ["meeting"]);
    let graph = DispatcherBuilder::new("dispatch", Arc::new(classifier))
        .category("study", mark("study_end"))
        .category("work", mark("work_end"))
        .category("personal", mark("personal_end"))
        .compile()
        .unwrap();

    let state = graph
        .ainvoke(
            PartialState::new().set("query", "help me study for my exam"),
            &RunConfig::new("t"),
        )
        .await
        .unwrap();
    assert_eq!(state.text("category"), Some("study"));
    assert_eq!(state.flag("study_end"), Some(true));
}

#[tokio::test]
async fn test_override_beats_failing_classifier() {
    let graph = DispatcherBuilder::new("dispatch", Arc::new(FailingClassifier))
        .category("study", mark("study_end"))
        .category("work", mark("work_end"))
        .category("personal", mark("personal_end"))
        .override_rule(
            OverrideRule::contains_any("pending-draft", ["send the draft"], "work").requires_key("draft_id"),
        )
        .compile()
        .unwrap();

    let out = graph
        .invoke_traced(
            PartialState::new()
                .set("query", "please send the draft")
                .set("draft_id", "d1"),
            &RunConfig::new("with-draft"),
        )
        .await
        .unwrap();
    assert_eq!(out.state.text("category"), Some("work"));
    assert_eq!(out.state.text("category_source"), Some("override:pending-draft"));
    assert_eq!(out.steps.last().unwrap().step, "work");
    assert_eq!(out.degraded().count(), 0);

    // without a pending draft the classifier failure falls back to personal
    let out = graph
        .invoke_traced(
            PartialState::new().set("query", "please send the draft"),
            &RunConfig::new("no-draft"),
        )
        .await
        .unwrap();
    assert_eq!(out.state.text("category"), Some("personal"));
    assert_eq!(out.state.flag("personal_end"), Some(true));
    assert_eq!(out.degraded().count(), 1);
    assert!(out.state.text("observation").unwrap().contains("classifier failed"));
}
