//! End-to-end stage behavior against scripted collaborators.

mod common;

use common::{stage_context, FakeChat, FakeCitation, FakeEngine, FakeRetrieval};
use std::sync::Arc;

use ragcanvas::component::{
    build_component, Component, ComponentOutcome, ExeSqlParam, Generate, GenerateParam, Relevant,
    RelevantParam, Retrieval, RetrievalParam, RewriteQuestion, RewriteQuestionParam, RunOptions,
};
use ragcanvas::engine::EngineComponent;
use ragcanvas::message::Message;
use ragcanvas::output::{OutputRow, OutputTable};
use ragcanvas::reference::{Chunk, RetrievalSet};

fn gen_param(prompt: &str) -> GenerateParam {
    GenerateParam {
        llm_id: "model@factory".to_string(),
        prompt: prompt.to_string(),
        ..Default::default()
    }
}

fn finalized(outcome: ComponentOutcome) -> OutputTable {
    match outcome {
        ComponentOutcome::Finalized(table) => table,
        ComponentOutcome::Streaming(_) => panic!("expected a finalized outcome"),
    }
}

#[tokio::test]
async fn empty_retrieval_short_circuits_without_backend_calls() {
    let engine = Arc::new(
        FakeEngine::new()
            .with_component(
                "kb1",
                EngineComponent {
                    component_name: "Retrieval".to_string(),
                    output: Some(OutputTable::default()),
                    ..Default::default()
                },
            )
            .with_component(
                "gen:0",
                EngineComponent {
                    component_name: "Generate".to_string(),
                    upstream: vec!["kb1".to_string()],
                    ..Default::default()
                },
            ),
    );
    let chat = Arc::new(FakeChat::replying("should never be used"));
    let ctx = stage_context(engine, chat.clone());
    let stage = Generate::new("gen:0", gen_param("Answer using {kb1}"), ctx);

    let table = finalized(
        stage
            .run(&[], RunOptions::default())
            .await
            .expect("run succeeds"),
    );

    assert_eq!(
        table.rows()[0].content,
        "Nothing found in knowledgebase (mock response)."
    );
    assert_eq!(
        table.rows()[0].reference,
        Some(ragcanvas::reference::Reference::empty())
    );
    assert_eq!(chat.calls(), 0, "no backend call on empty retrieval");
}

#[tokio::test]
async fn configured_empty_response_wins_over_default() {
    let retrieval_output = OutputTable::from_rows(vec![OutputRow {
        content: String::new(),
        empty_response: Some("Sorry, the library is closed.".to_string()),
        ..Default::default()
    }]);
    let engine = Arc::new(
        FakeEngine::new()
            .with_component(
                "kb1",
                EngineComponent {
                    component_name: "Retrieval".to_string(),
                    output: Some(retrieval_output),
                    ..Default::default()
                },
            )
            .with_component(
                "gen:0",
                EngineComponent {
                    component_name: "Generate".to_string(),
                    ..Default::default()
                },
            ),
    );
    let chat = Arc::new(FakeChat::replying("unused"));
    let ctx = stage_context(engine, chat.clone());
    let stage = Generate::new("gen:0", gen_param("Answer using {kb1}"), ctx);

    let table = finalized(stage.run(&[], RunOptions::default()).await.unwrap());
    assert_eq!(table.rows()[0].content, "Sorry, the library is closed.");
    assert_eq!(chat.calls(), 0);
}

#[tokio::test]
async fn generation_records_component_info_and_strips_reasoning() {
    let engine = Arc::new(
        FakeEngine::new()
            .with_component(
                "gen:0",
                EngineComponent {
                    component_name: "Generate".to_string(),
                    ..Default::default()
                },
            )
            .with_history(vec![Message::user("What is Rust?")]),
    );
    let chat = Arc::new(FakeChat::replying(
        "<think>systems language, memory safety</think>Rust is a systems language.",
    ));
    let ctx = stage_context(engine.clone(), chat.clone());
    let stage = Generate::new("gen:0", gen_param("You are concise."), ctx);

    let table = finalized(stage.run(&[], RunOptions::default()).await.unwrap());
    assert_eq!(table.rows()[0].content, "Rust is a systems language.");
    assert_eq!(chat.calls(), 1);

    let info = engine.info("gen:0").expect("component info recorded");
    assert_eq!(info.prompt, "You are concise.");
    assert_eq!(info.messages, vec![Message::user("What is Rust?")]);
}

#[tokio::test]
async fn citation_dedups_documents_in_used_order() {
    let chunks = vec![
        Chunk::new("fragment one", "d1", "Doc One"),
        Chunk::new("fragment two", "d1", "Doc One"),
        Chunk::new("fragment three", "d2", "Doc Two"),
    ];
    let retrieval_output = OutputTable::from_rows(vec![OutputRow {
        content: "knowledge".to_string(),
        chunks: Some(serde_json::to_string(&chunks).unwrap()),
        ..Default::default()
    }]);
    let engine = Arc::new(
        FakeEngine::new()
            .with_component(
                "kb1",
                EngineComponent {
                    component_name: "Retrieval".to_string(),
                    output: Some(retrieval_output),
                    ..Default::default()
                },
            )
            .with_component(
                "gen:0",
                EngineComponent {
                    component_name: "Generate".to_string(),
                    ..Default::default()
                },
            ),
    );
    let chat = Arc::new(FakeChat::replying("cited answer"));
    let mut ctx = stage_context(engine, chat);
    ctx.citation = Arc::new(FakeCitation::using(&[0, 1, 2]));
    let stage = Generate::new("gen:0", gen_param("Answer using {kb1}"), ctx);

    let table = finalized(stage.run(&[], RunOptions::default()).await.unwrap());
    let reference = table.rows()[0].reference.clone().expect("reference attached");
    assert_eq!(reference.doc_aggs.len(), 2);
    assert_eq!(reference.doc_aggs[0].doc_id, "d1");
    assert_eq!(reference.doc_aggs[1].doc_id, "d2");
    assert!(table.rows()[0].content.contains("cited answer"));
}

#[tokio::test]
async fn citation_failure_degrades_to_uncited_answer() {
    let chunks = vec![Chunk::new("fragment", "d1", "Doc One")];
    let retrieval_output = OutputTable::from_rows(vec![OutputRow {
        content: "knowledge".to_string(),
        chunks: Some(serde_json::to_string(&chunks).unwrap()),
        ..Default::default()
    }]);
    let engine = Arc::new(
        FakeEngine::new()
            .with_component(
                "kb1",
                EngineComponent {
                    component_name: "Retrieval".to_string(),
                    output: Some(retrieval_output),
                    ..Default::default()
                },
            )
            .with_component(
                "gen:0",
                EngineComponent {
                    component_name: "Generate".to_string(),
                    ..Default::default()
                },
            ),
    );
    let chat = Arc::new(FakeChat::replying("plain answer"));
    let mut ctx = stage_context(engine, chat);
    ctx.citation = Arc::new(FakeCitation::failing());
    let stage = Generate::new("gen:0", gen_param("Answer using {kb1}"), ctx);

    let table = finalized(stage.run(&[], RunOptions::default()).await.unwrap());
    assert_eq!(table.rows()[0].content, "plain answer");
    assert_eq!(
        table.rows()[0].reference,
        Some(ragcanvas::reference::Reference::empty())
    );
}

#[tokio::test]
async fn retrieval_merges_sources_in_fixed_order_and_isolates_failures() {
    let engine = Arc::new(FakeEngine::new().with_input("kb1", OutputTable::be_output("query")));
    let chat = Arc::new(FakeChat::replying("unused"));
    let mut ctx = stage_context(engine, chat);
    ctx.graph_source = Some(Arc::new(FakeRetrieval::returning(RetrievalSet {
        chunks: vec![Chunk::new("graph fact", "g1", "Graph Doc")],
        doc_aggs: vec![],
    })));
    ctx.web_source = Some(Arc::new(FakeRetrieval::returning(RetrievalSet {
        chunks: vec![Chunk::new("web fact", "w1", "Web Doc")],
        doc_aggs: vec![],
    })));

    let stage = Retrieval::new(
        "kb1",
        RetrievalParam {
            use_kg: true,
            ..Default::default()
        },
        ctx,
    );
    let table = finalized(stage.run(&[], RunOptions::default()).await.unwrap());
    let row = &table.rows()[0];
    let chunks: Vec<Chunk> = serde_json::from_str(row.chunks.as_deref().unwrap()).unwrap();
    assert_eq!(chunks[0].doc_id, "g1", "graph source merges first");
    assert_eq!(chunks[1].doc_id, "w1");
    assert!(row.content.starts_with("Relevant information from knowledge base:"));

    // A failing web source keeps the graph results.
    let engine = Arc::new(FakeEngine::new().with_input("kb1", OutputTable::be_output("query")));
    let mut ctx = stage_context(engine, Arc::new(FakeChat::replying("unused")));
    ctx.graph_source = Some(Arc::new(FakeRetrieval::returning(RetrievalSet {
        chunks: vec![Chunk::new("graph fact", "g1", "Graph Doc")],
        doc_aggs: vec![],
    })));
    ctx.web_source = Some(Arc::new(FakeRetrieval::failing()));
    let stage = Retrieval::new(
        "kb1",
        RetrievalParam {
            use_kg: true,
            ..Default::default()
        },
        ctx,
    );
    let table = finalized(stage.run(&[], RunOptions::default()).await.unwrap());
    let chunks: Vec<Chunk> =
        serde_json::from_str(table.rows()[0].chunks.as_deref().unwrap()).unwrap();
    assert_eq!(chunks.len(), 1);
    assert_eq!(chunks[0].doc_id, "g1");
}

#[tokio::test]
async fn retrieval_empty_carries_configured_message() {
    let engine = Arc::new(FakeEngine::new().with_input("kb1", OutputTable::be_output("query")));
    let ctx = stage_context(engine, Arc::new(FakeChat::replying("unused")));
    let stage = Retrieval::new(
        "kb1",
        RetrievalParam {
            empty_response: "Nothing in the archive.".to_string(),
            ..Default::default()
        },
        ctx,
    );
    let table = finalized(stage.run(&[], RunOptions::default()).await.unwrap());
    let row = &table.rows()[0];
    assert!(row.content.is_empty());
    assert_eq!(row.empty_response.as_deref(), Some("Nothing in the archive."));
}

#[tokio::test]
async fn relevance_grader_maps_verdicts_to_branch_values() {
    let param = RelevantParam {
        gen: gen_param(""),
        yes: "Relevant".to_string(),
        no: "Irrelevant".to_string(),
    };

    let engine = Arc::new(FakeEngine::new().with_input("rel", OutputTable::be_output("doc text")));
    let ctx = stage_context(engine, Arc::new(FakeChat::replying("Yes, relevant.")));
    let stage = Relevant::new("rel", param.clone(), ctx);
    let history = vec![Message::user("what is rust?")];
    let table = finalized(stage.run(&history, RunOptions::default()).await.unwrap());
    assert_eq!(table.rows()[0].content, "Relevant");

    let engine = Arc::new(FakeEngine::new().with_input("rel", OutputTable::be_output("doc text")));
    let ctx = stage_context(engine, Arc::new(FakeChat::replying("hard to say")));
    let stage = Relevant::new("rel", param.clone(), ctx);
    let table = finalized(stage.run(&history, RunOptions::default()).await.unwrap());
    assert_eq!(table.rows()[0].content, "Irrelevant", "ambiguity defaults to no");

    // Blank upstream skips the backend entirely.
    let engine = Arc::new(FakeEngine::new());
    let chat = Arc::new(FakeChat::replying("unused"));
    let ctx = stage_context(engine, chat.clone());
    let stage = Relevant::new("rel", param, ctx);
    let table = finalized(stage.run(&history, RunOptions::default()).await.unwrap());
    assert_eq!(table.rows()[0].content, "Irrelevant");
    assert_eq!(chat.calls(), 0);
}

#[tokio::test]
async fn rewrite_passes_through_and_owns_the_user_turn() {
    let engine = Arc::new(
        FakeEngine::new()
            .with_history(vec![Message::user("original phrasing")])
            .with_input("rw", OutputTable::be_output("follow-up question")),
    );
    let ctx = stage_context(engine.clone(), Arc::new(FakeChat::replying("unused")));
    let stage = RewriteQuestion::new("rw", RewriteQuestionParam::default(), ctx);

    let table = finalized(stage.run(&[], RunOptions::default()).await.unwrap());
    assert_eq!(table.rows()[0].content, "follow-up question");

    let history = engine.history();
    assert_eq!(history.last().unwrap().content, "follow-up question");
    assert_eq!(history.len(), 1, "trailing user turn replaced, not appended");
}

#[tokio::test]
async fn exesql_parses_but_never_executes() {
    let engine = Arc::new(FakeEngine::new().with_input(
        "sql",
        OutputTable::be_output("```sql\nSELECT name FROM users;\n```"),
    ));
    let ctx = stage_context(engine, Arc::new(FakeChat::replying("unused")));
    let param = ExeSqlParam {
        gen: gen_param(""),
        database: "analytics".to_string(),
        username: "reader".to_string(),
        host: "db.internal".to_string(),
        password: "secret".to_string(),
        ..Default::default()
    };
    assert!(param.check().is_ok());
    let stage = ragcanvas::component::ExeSql::new("sql", param, ctx);

    let table = finalized(stage.run(&[], RunOptions::default()).await.unwrap());
    let content = &table.rows()[0].content;
    assert!(content.contains("SELECT name FROM users;"));
    assert!(content.contains("not executed"));
}

#[tokio::test]
async fn factory_rejects_unknown_types_and_bad_params() {
    let engine = Arc::new(FakeEngine::new());
    let ctx = stage_context(engine, Arc::new(FakeChat::replying("unused")));

    let err = build_component("Teleporter", "x", &serde_json::json!({}), ctx.clone()).unwrap_err();
    assert!(err.to_string().contains("Teleporter"));

    let built = build_component(
        "Generate",
        "gen:0",
        &serde_json::json!({"llm_id": "m@f", "prompt": "hello"}),
        ctx,
    )
    .unwrap();
    assert_eq!(built.component_name(), "Generate");
    assert!(built.check().is_ok());
}
