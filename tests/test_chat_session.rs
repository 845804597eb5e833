//! End-to-end session flow on the offline dummy backend, plus exports.

use std::path::Path;

use primus_chat::chat::ChatSession;
use primus_chat::config::{self, EnvOverrides, LlmConfig};
use primus_chat::error::ChatError;
use primus_chat::llm::providers;
use primus_chat::session::export::{export_file_name, write_exports};
use primus_chat::session::{Message, Parameters, Role, Transcript};
use serde_json::Value;

fn dummy_session(system_prompt: &str) -> ChatSession {
    let llm = LlmConfig { provider: "dummy".into(), ..LlmConfig::default() };
    let chain = providers::build(&llm, None).unwrap();
    ChatSession::new(Transcript::initialize(system_prompt, Parameters::default()), chain, true)
}

#[tokio::test]
async fn conversation_grows_in_order() {
    let mut s = dummy_session("be brief");
    for q in ["one", "two", "three"] {
        s.submit(q, &mut |_: &str| {}).await.unwrap();
    }

    let msgs = s.transcript().messages();
    assert_eq!(msgs.len(), 7);
    assert_eq!(msgs[0], Message::new(Role::System, "be brief"));
    assert_eq!(msgs[5], Message::new(Role::User, "three"));
    assert_eq!(msgs[6], Message::new(Role::Assistant, "[echo] three"));
    assert_eq!(msgs.iter().filter(|m| m.role == Role::System).count(), 1);
}

#[tokio::test]
async fn whitespace_input_is_a_validation_error() {
    let mut s = dummy_session("be brief");
    for input in ["", "   ", "\n\t"] {
        let err = s.submit(input, &mut |_: &str| {}).await.unwrap_err();
        assert!(matches!(err, ChatError::Validation(_)));
    }
    assert_eq!(s.transcript().len(), 1);
}

#[tokio::test]
async fn system_prompt_change_applies_to_next_request() {
    let mut s = dummy_session("old prompt");
    s.submit("hi", &mut |_: &str| {}).await.unwrap();
    s.set_system_prompt("new prompt").unwrap();

    let request = s.transcript().build_request(true);
    assert_eq!(request.messages[0], Message::new(Role::System, "new prompt"));
    assert_eq!(request.messages.len(), 3);
}

#[tokio::test]
async fn new_chat_starts_clean_with_new_run_id() {
    let mut s = dummy_session("keep me");
    s.parameters_mut().set_max_output_tokens(512).unwrap();
    s.submit("hi", &mut |_: &str| {}).await.unwrap();
    let old = s.transcript().run_id().clone();

    s.new_chat().await;
    assert_eq!(s.transcript().messages(), &[Message::new(Role::System, "keep me")]);
    assert_eq!(s.transcript().parameters().max_output_tokens(), 512);
    assert_ne!(s.transcript().run_id(), &old);
}

#[tokio::test]
async fn exports_reflect_the_transcript() {
    let mut s = dummy_session("line one\nline two");
    s.submit("a, \"quoted\" question", &mut |_: &str| {}).await.unwrap();

    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("nested/exports");
    let (json_path, csv_path) = write_exports(s.transcript(), &out, "primus_chat").unwrap();

    let run_id = s.transcript().run_id().as_str();
    assert_eq!(json_path, out.join(format!("primus_chat_{run_id}.json")));
    assert_eq!(csv_path.file_name().unwrap().to_str().unwrap(), export_file_name("primus_chat", s.transcript(), "csv"));

    let doc: Value = serde_json::from_slice(&std::fs::read(&json_path).unwrap()).unwrap();
    assert_eq!(doc["run_id"], run_id);
    assert_eq!(doc["model"], "gpt-4o-mini");
    assert_eq!(doc["max_output_tokens"], 1024);
    assert_eq!(doc["messages"].as_array().unwrap().len(), 3);
    assert_eq!(doc["messages"][2]["role"], "assistant");
    assert!(doc["exported_at_utc"].as_str().unwrap().ends_with('Z'));

    let csv = std::fs::read_to_string(&csv_path).unwrap();
    let lines: Vec<&str> = csv.lines().collect();
    assert_eq!(lines[0], "idx,role,content");
    assert_eq!(lines[1], r"0,system,line one\nline two");
    assert_eq!(lines[2], r#"1,user,"a, ""quoted"" question""#);
    assert_eq!(lines[3], r#"2,assistant,"[echo] a, ""quoted"" question""#);
    assert_eq!(lines.len(), 4);
}

#[test]
fn shipped_config_loads() {
    let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("config/default.toml");
    let cfg = config::load_from(&path, &EnvOverrides::default()).unwrap();
    assert_eq!(cfg.llm.provider, "openai");
    assert_eq!(cfg.chat.parameters, Parameters::default());
    assert_eq!(cfg.export.name, "primus_chat");
    assert!(cfg.ui.banner.is_some());
}
