//! Failure-path and policy coverage for the streaming ingestion controller.

mod common;

use common::{FaultyStore, ScriptedTransport};
use mimir_chat::chat_store::ChatStore;
use mimir_chat::controller::{
    CancelToken, ChatController, ChatEvent, SendPhase, SendRequest, ERROR_REPLY,
};
use mimir_chat::error::Error;
use mimir_chat::frame::StreamFrame;
use mimir_chat::node::Role;

async fn fresh(store: &FaultyStore) -> ChatController {
    let meta = store.create_chat().await.unwrap();
    ChatController::new(meta)
}

#[tokio::test]
async fn error_frame_inserts_synthetic_reply() {
    let store = FaultyStore::new();
    let mut controller = fresh(&store).await;
    let transport = ScriptedTransport::new();
    transport.script(vec![
        Ok(StreamFrame::Chunk {
            content: "half an ans".into(),
        }),
        Ok(StreamFrame::Error {
            content: "model overloaded".into(),
        }),
    ]);

    let outcome = controller
        .send(
            SendRequest::text("hello"),
            &transport,
            &store,
            &CancelToken::new(),
            |_| {},
        )
        .await
        .unwrap();

    assert!(outcome.errored);
    assert_eq!(controller.phase(), SendPhase::Errored);

    // ephemeral node is gone; the synthetic reply hangs under the user turn
    let nodes = controller.nodes();
    assert_eq!(nodes.len(), 2);
    assert_eq!(nodes[1].role, Role::Assistant);
    assert_eq!(nodes[1].content, ERROR_REPLY);
    assert!(!nodes.iter().any(|n| n.content.contains("half an ans")));
    assert_eq!(
        controller.active_node_id(),
        Some(nodes[1].id.as_str())
    );
    // the synthetic reply is durable too
    let durable = store.load_nodes(controller.chat_id()).await.unwrap();
    assert_eq!(durable.len(), 2);
}

#[tokio::test]
async fn transport_failure_takes_error_path() {
    let store = FaultyStore::new();
    let mut controller = fresh(&store).await;
    let transport = ScriptedTransport::new(); // no script => transport error

    let outcome = controller
        .send(
            SendRequest::text("hello"),
            &transport,
            &store,
            &CancelToken::new(),
            |_| {},
        )
        .await
        .unwrap();
    assert!(outcome.errored);
    assert_eq!(controller.nodes()[1].content, ERROR_REPLY);
}

#[tokio::test]
async fn decode_failure_mid_stream_takes_error_path() {
    let store = FaultyStore::new();
    let mut controller = fresh(&store).await;
    let transport = ScriptedTransport::new();
    transport.script(vec![
        Ok(StreamFrame::Chunk { content: "a".into() }),
        Err(Error::frame_decode("bad line")),
    ]);

    let outcome = controller
        .send(
            SendRequest::text("hello"),
            &transport,
            &store,
            &CancelToken::new(),
            |_| {},
        )
        .await
        .unwrap();
    assert!(outcome.errored);
}

#[tokio::test]
async fn stream_ending_without_terminal_frame_is_a_failure() {
    let store = FaultyStore::new();
    let mut controller = fresh(&store).await;
    let transport = ScriptedTransport::new();
    transport.script(vec![Ok(StreamFrame::Chunk {
        content: "never finished".into(),
    })]);

    let outcome = controller
        .send(
            SendRequest::text("hello"),
            &transport,
            &store,
            &CancelToken::new(),
            |_| {},
        )
        .await
        .unwrap();
    assert!(outcome.errored);
}

#[tokio::test]
async fn cancellation_behaves_like_error_frame() {
    let store = FaultyStore::new();
    let mut controller = fresh(&store).await;
    let transport = ScriptedTransport::new();
    transport.script_reply(&["will", " not", " land"], "will not land");

    let cancel = CancelToken::new();
    cancel.cancel(); // fired before the first frame is consumed

    let outcome = controller
        .send(
            SendRequest::text("hello"),
            &transport,
            &store,
            &cancel,
            |_| {},
        )
        .await
        .unwrap();
    assert!(outcome.errored);
    assert_eq!(controller.nodes()[1].content, ERROR_REPLY);
}

#[tokio::test]
async fn user_node_save_failure_aborts_the_send() {
    let store = FaultyStore::new();
    let mut controller = fresh(&store).await;
    store.fail_saves(true);
    let transport = ScriptedTransport::new();
    transport.script_reply(&[], "unreachable");

    let err = controller
        .send(
            SendRequest::text("hello"),
            &transport,
            &store,
            &CancelToken::new(),
            |_| {},
        )
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Persistence(_)));
    assert!(controller.nodes().is_empty());
    assert_eq!(controller.phase(), SendPhase::Errored);
}

#[tokio::test]
async fn final_save_failure_keeps_local_content() {
    let store = FaultyStore::new();
    let mut controller = fresh(&store).await;
    let transport = ScriptedTransport::new();
    transport.script_reply(&["str", "eamed"], "streamed");

    // user save succeeds, the final assistant save does not
    let failing = &store;
    let mut saw_streaming = false;
    let outcome = controller
        .send(
            SendRequest::text("hello"),
            &transport,
            failing,
            &CancelToken::new(),
            |e| {
                if e == ChatEvent::Phase(SendPhase::Streaming) {
                    store.fail_saves(true);
                    saw_streaming = true;
                }
            },
        )
        .await
        .unwrap();

    assert!(saw_streaming);
    // local-authoritative: content stands under the local id
    assert!(!outcome.errored);
    assert!(!outcome.persisted);
    assert_eq!(controller.phase(), SendPhase::Complete);
    let nodes = controller.nodes();
    assert_eq!(nodes.len(), 2);
    assert_eq!(nodes[1].content, "streamed");
    assert!(nodes[1].is_local());
    assert_eq!(controller.active_node_id(), Some(nodes[1].id.as_str()));

    // only the user node made it to the durable store
    store.fail_saves(false);
    let durable = store.load_nodes(controller.chat_id()).await.unwrap();
    assert_eq!(durable.len(), 1);
    assert_eq!(durable[0].role, Role::User);
}

#[tokio::test]
async fn sequential_sends_grow_one_branch() {
    let store = FaultyStore::new();
    let mut controller = fresh(&store).await;
    let transport = ScriptedTransport::new();
    transport.script_reply(&[], "ok");
    controller
        .send(
            SendRequest::text("first"),
            &transport,
            &store,
            &CancelToken::new(),
            |_| {},
        )
        .await
        .unwrap();
    // after a completed cycle another send is fine
    transport.script_reply(&[], "ok again");
    controller
        .send(
            SendRequest::text("second"),
            &transport,
            &store,
            &CancelToken::new(),
            |_| {},
        )
        .await
        .unwrap();
    assert_eq!(controller.nodes().len(), 4);
}

#[tokio::test]
async fn first_exchange_derives_title_and_respects_user_rename() {
    let store = FaultyStore::new();
    let mut controller = fresh(&store).await;
    let transport = ScriptedTransport::new();
    transport.script_reply(&[], "4");

    controller
        .send(
            SendRequest::text("What is 2+2?"),
            &transport,
            &store,
            &CancelToken::new(),
            |_| {},
        )
        .await
        .unwrap();
    assert_eq!(controller.title(), "What is 2+2?");
    let listed = store.list_chats().await.unwrap();
    assert_eq!(listed[0].title, "What is 2+2?");

    // an async refinement may supersede the heuristic
    controller.refine_title("Arithmetic basics", &store).await;
    assert_eq!(controller.title(), "Arithmetic basics");

    // but never a user rename
    controller.rename("my maths chat");
    controller.refine_title("ignored", &store).await;
    assert_eq!(controller.title(), "my maths chat");
}

#[tokio::test]
async fn second_exchange_does_not_touch_the_title() {
    let store = FaultyStore::new();
    let mut controller = fresh(&store).await;
    let transport = ScriptedTransport::new();
    transport.script_reply(&[], "first");
    transport.script_reply(&[], "second");

    controller
        .send(
            SendRequest::text("short"),
            &transport,
            &store,
            &CancelToken::new(),
            |_| {},
        )
        .await
        .unwrap();
    let title_after_first = controller.title().to_string();

    controller
        .send(
            SendRequest::text("a completely different follow-up"),
            &transport,
            &store,
            &CancelToken::new(),
            |_| {},
        )
        .await
        .unwrap();
    assert_eq!(controller.title(), title_after_first);
}

#[tokio::test]
async fn chunks_append_monotonically_during_streaming() {
    let store = FaultyStore::new();
    let mut controller = fresh(&store).await;
    let transport = ScriptedTransport::new();
    transport.script_reply(&["The answer", " is", " 4."], "The answer is 4.");

    let mut deltas = Vec::new();
    controller
        .send(
            SendRequest::text("2+2?"),
            &transport,
            &store,
            &CancelToken::new(),
            |e| {
                if let ChatEvent::Chunk { delta, .. } = e {
                    deltas.push(delta);
                }
            },
        )
        .await
        .unwrap();
    assert_eq!(deltas, vec!["The answer", " is", " 4."]);
    assert_eq!(controller.nodes()[1].content, "The answer is 4.");
}

#[tokio::test]
async fn independent_controllers_stream_concurrently() {
    let store = FaultyStore::new();
    let mut doc_chat = fresh(&store).await;
    let mut general_chat = fresh(&store).await;

    let doc_transport = ScriptedTransport::new();
    doc_transport.script_reply(&["doc"], "doc answer");
    let general_transport = ScriptedTransport::new();
    general_transport.script_reply(&["gen"], "general answer");

    let cancel = CancelToken::new();
    let (a, b) = tokio::join!(
        doc_chat.send(
            SendRequest::text("about the pdf"),
            &doc_transport,
            &store,
            &cancel,
            |_| {},
        ),
        general_chat.send(
            SendRequest::text("general question"),
            &general_transport,
            &store,
            &cancel,
            |_| {},
        ),
    );
    assert!(!a.unwrap().errored);
    assert!(!b.unwrap().errored);
    assert_eq!(doc_chat.nodes()[1].content, "doc answer");
    assert_eq!(general_chat.nodes()[1].content, "general answer");
}
