use arcana::auth::AuthError;
use arcana::catalog::{CardCatalog, CardDefinition};
use arcana::db::{self, service::DbService, DbPool};
use arcana::llm::models::{ChatOptions, ChatResponse, Message, Role};
use arcana::llm::{LlmError, LlmProvider};
use arcana::reading::archive::ReadingArchive;
use arcana::reading::{
    ContextWindow, DrawPolicy, DrawRequest, Interpreter, Lookup, ReadingError, ReadingPolicy,
    ReadingService, ReadingSession, SessionStore,
};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

enum Step {
    Reply(&'static str),
    Fail,
    Hang,
}

/// Provider double: replays scripted steps, then answers "reading #N".
struct ScriptedProvider {
    steps: Mutex<VecDeque<Step>>,
    prompts: Mutex<Vec<Vec<Message>>>,
}

impl ScriptedProvider {
    fn with_steps(steps: Vec<Step>) -> Arc<Self> {
        Arc::new(Self {
            steps: Mutex::new(steps.into()),
            prompts: Mutex::new(Vec::new()),
        })
    }

    fn prompts(&self) -> Vec<Vec<Message>> {
        self.prompts.lock().unwrap().clone()
    }
}

#[async_trait]
impl LlmProvider for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn chat(&self, messages: &[Message], _options: ChatOptions) -> Result<ChatResponse, LlmError> {
        let call = {
            let mut prompts = self.prompts.lock().unwrap();
            prompts.push(messages.to_vec());
            prompts.len()
        };
        let step = self.steps.lock().unwrap().pop_front();

        let content = match step {
            Some(Step::Reply(text)) => text.to_string(),
            Some(Step::Fail) => return Err(LlmError::Api("scripted failure".to_string())),
            Some(Step::Hang) => {
                tokio::time::sleep(Duration::from_secs(30)).await;
                return Err(LlmError::Network("hung".to_string()));
            }
            None => format!("reading #{}", call),
        };

        Ok(ChatResponse {
            content,
            model: "scripted-1".to_string(),
            usage: None,
        })
    }
}

const PROMPT: &str = "You are a tarot reader.";

fn names(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| s.to_string()).collect()
}

fn roles(history: &[Message]) -> Vec<Role> {
    history.iter().map(|m| m.role).collect()
}

fn setup() -> (DbPool, SessionStore, CardCatalog) {
    let pool = db::open_in_memory().unwrap();
    let store = SessionStore::new(pool.clone());
    (pool, store, CardCatalog::builtin())
}

fn service_with(llm: Arc<ScriptedProvider>, policy: ReadingPolicy) -> (DbPool, ReadingService) {
    let pool = db::open_in_memory().unwrap();
    let service = ReadingService::new(
        Arc::new(SessionStore::new(pool.clone())),
        Arc::new(CardCatalog::builtin()),
        Interpreter::new(llm, PROMPT),
        ReadingArchive::new(pool.clone()),
        policy,
    );
    (pool, service)
}

#[tokio::test]
async fn test_question_draw_interpret_scenario() {
    let (_pool, store, catalog) = setup();
    let llm = ScriptedProvider::with_steps(vec![Step::Reply("The Lovers speak of union.")]);
    let interpreter = Interpreter::new(llm.clone(), PROMPT);

    store.create("s1", None).unwrap();
    store
        .update("s1", Lookup::Strict, |s| Ok(s.submit_questions(&names(&["Will I find love?"]))))
        .await
        .unwrap();
    store
        .update("s1", Lookup::Strict, |s| s.draw(&catalog, &names(&["The Lovers"])))
        .await
        .unwrap();

    let reply = interpreter.interpret(&store, "s1", Lookup::Strict).await.unwrap();
    assert_eq!(reply, "The Lovers speak of union.");

    let session = store.load("s1").unwrap();
    assert_eq!(
        roles(&session.history),
        vec![Role::User, Role::System, Role::System, Role::Assistant]
    );
    assert_eq!(session.history[0].content, "Will I find love?");
    assert_eq!(session.history[1].content, "Selected cards: The Lovers");
    assert_eq!(
        session.history[2].content,
        "Card details: Card: The Lovers, type: Major Arcana"
    );

    // The provider saw the system instruction first, then the transcript in order.
    let prompts = llm.prompts();
    assert_eq!(prompts.len(), 1);
    assert_eq!(prompts[0][0], Message::system(PROMPT));
    assert_eq!(&prompts[0][1..], &session.history[..3]);
}

#[tokio::test]
async fn test_interpret_before_ready_adds_no_card_entries() {
    let (_pool, store, _catalog) = setup();
    let llm = ScriptedProvider::with_steps(vec![Step::Reply("Welcome, seeker.")]);
    let interpreter = Interpreter::new(llm.clone(), PROMPT);

    store.create("s1", None).unwrap();
    interpreter.interpret(&store, "s1", Lookup::Strict).await.unwrap();

    let session = store.load("s1").unwrap();
    assert_eq!(session.history, vec![Message::assistant("Welcome, seeker.")]);
    assert_eq!(llm.prompts()[0], vec![Message::system(PROMPT)]);
}

#[tokio::test]
async fn test_every_interpretation_repeats_the_card_summary() {
    let (_pool, store, catalog) = setup();
    let interpreter = Interpreter::new(ScriptedProvider::with_steps(vec![]), PROMPT);

    store.create("s1", None).unwrap();
    store
        .update("s1", Lookup::Strict, |s| {
            s.submit_questions(&names(&["Career?"]));
            s.draw(&catalog, &names(&["The Tower", "Ace of Pentacles"]))
        })
        .await
        .unwrap();

    interpreter.interpret(&store, "s1", Lookup::Strict).await.unwrap();
    interpreter.interpret(&store, "s1", Lookup::Strict).await.unwrap();

    let session = store.load("s1").unwrap();
    let system_entries = session
        .history
        .iter()
        .filter(|m| m.role == Role::System)
        .count();
    assert_eq!(system_entries, 4);
    assert_eq!(session.history.len(), 1 + 2 + 1 + 2 + 1);
}

#[test]
fn test_saved_session_reloads_byte_identical() {
    let (_pool, store, catalog) = setup();
    let mut session = ReadingSession::new("s1", Some(4));
    session.submit_questions(&names(&["First?", "Second?"]));
    session.draw(&catalog, &names(&["The Fool"])).unwrap();
    store.save(&session).unwrap();

    let raw = store.snapshot("s1").unwrap().unwrap();
    let reloaded = store.load("s1").unwrap();
    assert_eq!(reloaded, session);

    store.save(&reloaded).unwrap();
    assert_eq!(store.snapshot("s1").unwrap().unwrap(), raw);
}

#[test]
fn test_strict_lookup_vs_create_missing() {
    let (_pool, store, _catalog) = setup();

    let err = store.load("ghost").unwrap_err();
    assert!(matches!(err, ReadingError::NotFound(_)));
    assert!(store.snapshot("ghost").unwrap().is_none());

    // Peeking never writes, even when the session would be created.
    let peeked = store.peek("ghost", Lookup::CreateMissing).unwrap();
    assert!(peeked.history.is_empty());
    assert!(store.snapshot("ghost").unwrap().is_none());

    let created = store.load_or_create("ghost").unwrap();
    assert_eq!(created.session_id, "ghost");
    assert!(created.history.is_empty());
    assert!(store.snapshot("ghost").unwrap().is_some());
}

#[tokio::test]
async fn test_corrupt_snapshot_is_reported_not_reset() {
    let (pool, store, _catalog) = setup();
    {
        let conn = pool.lock().unwrap();
        DbService::upsert_snapshot(&conn, "bad", "{ this is not json").unwrap();
    }

    assert!(matches!(store.load("bad"), Err(ReadingError::CorruptSession { .. })));
    assert!(matches!(
        store.load_or_create("bad"),
        Err(ReadingError::CorruptSession { .. })
    ));

    let result = store
        .update("bad", Lookup::CreateMissing, |s| {
            s.record_user_response("hello");
            Ok(())
        })
        .await;
    assert!(matches!(result, Err(ReadingError::CorruptSession { .. })));
    assert_eq!(store.snapshot("bad").unwrap().unwrap(), "{ this is not json");
}

#[tokio::test]
async fn test_provider_failure_keeps_state_and_allows_retry() {
    let (_pool, store, catalog) = setup();
    let llm = ScriptedProvider::with_steps(vec![Step::Fail, Step::Reply("Second time lucky.")]);
    let interpreter = Interpreter::new(llm, PROMPT);

    store.create("s1", None).unwrap();
    store
        .update("s1", Lookup::Strict, |s| {
            s.submit_questions(&names(&["Health?"]));
            s.draw(&catalog, &names(&["The Star"]))
        })
        .await
        .unwrap();

    let err = interpreter.interpret(&store, "s1", Lookup::Strict).await.unwrap_err();
    assert!(matches!(err, ReadingError::Provider(_)));
    assert!(err.is_retryable());

    let after_failure = store.load("s1").unwrap();
    assert_eq!(
        roles(&after_failure.history),
        vec![Role::User, Role::System, Role::System]
    );

    let reply = interpreter.interpret(&store, "s1", Lookup::Strict).await.unwrap();
    assert_eq!(reply, "Second time lucky.");
    let session = store.load("s1").unwrap();
    assert_eq!(session.history.len(), 6);
    assert_eq!(session.history.last().unwrap().role, Role::Assistant);
}

#[tokio::test]
async fn test_provider_timeout() {
    let (_pool, store, _catalog) = setup();
    let llm = ScriptedProvider::with_steps(vec![Step::Hang]);
    let interpreter = Interpreter::new(llm, PROMPT).with_timeout(Duration::from_millis(50));

    store.create("s1", None).unwrap();
    let err = interpreter.interpret(&store, "s1", Lookup::Strict).await.unwrap_err();
    assert!(matches!(err, ReadingError::ProviderTimeout(_)));
    assert!(err.is_retryable());
    assert!(store.load("s1").unwrap().history.is_empty());
}

#[tokio::test]
async fn test_context_window_limits_prompt() {
    let (_pool, store, _catalog) = setup();
    let llm = ScriptedProvider::with_steps(vec![]);
    let interpreter = Interpreter::new(llm.clone(), PROMPT).with_window(ContextWindow::Recent(2));

    store.create("s1", None).unwrap();
    store
        .update("s1", Lookup::Strict, |s| {
            for text in ["one", "two", "three", "four"] {
                s.record_user_response(text);
            }
            Ok(())
        })
        .await
        .unwrap();

    interpreter.interpret(&store, "s1", Lookup::Strict).await.unwrap();

    let prompt = &llm.prompts()[0];
    assert_eq!(prompt.len(), 3);
    assert_eq!(prompt[0].content, PROMPT);
    assert_eq!(prompt[1].content, "three");
    assert_eq!(prompt[2].content, "four");
    // The stored transcript is never trimmed.
    assert_eq!(store.load("s1").unwrap().history.len(), 5);
}

#[tokio::test]
async fn test_anonymous_session_is_not_archived() {
    let (pool, store, catalog) = setup();
    let archive = ReadingArchive::new(pool.clone());

    let mut session = store.create("s1", None).unwrap();
    session.submit_questions(&names(&["Money?"]));
    session.draw(&catalog, &names(&["The Sun"])).unwrap();

    assert_eq!(archive.persist(&session, "Tarot Reading", None).unwrap(), None);

    let conn = pool.lock().unwrap();
    let rows: i64 = conn
        .query_row("SELECT COUNT(*) FROM tarot_readings", [], |row| row.get(0))
        .unwrap();
    assert_eq!(rows, 0);
}

#[tokio::test]
async fn test_service_flow_with_save() {
    let llm = ScriptedProvider::with_steps(vec![Step::Reply("Greetings."), Step::Reply("Your cards...")]);
    let (_pool, service) = service_with(llm, ReadingPolicy::default());

    let created = service.new_session(None).await.unwrap();
    assert_eq!(created.greeting, "Greetings.");
    assert!(!created.is_authenticated);

    service
        .submit_questions(&created.session_id, names(&["Should I change jobs?"]), None)
        .await
        .unwrap();

    let result = service
        .draw_cards(
            DrawRequest {
                session_id: created.session_id.clone(),
                cards: names(&["The Fool", "Bogus"]),
                detail: Some("brief".to_string()),
                save_to_account: true,
                reading_name: None,
            },
            Some(11),
        )
        .await
        .unwrap();

    assert_eq!(result.interpretation, "Your cards...");
    // Lenient policy: unknown cards vanish silently.
    assert!(result.warnings.is_empty());

    let reading_id = result.reading_id.expect("bound user gets a saved reading");
    let record = service.reading(11, reading_id).unwrap();
    assert_eq!(record.name, "Tarot Reading");
    assert_eq!(record.description.as_deref(), Some("Should I change jobs?"));
    assert_eq!(record.reading_data["cards"][0]["name"], "The Fool");
    assert_eq!(service.reading_count(11).unwrap(), 1);

    let session = service.session(&created.session_id).unwrap();
    assert_eq!(session.user_id, Some(11));
    assert_eq!(session.cards.len(), 1);
    assert_eq!(session.user_responses, names(&["Should I change jobs?"]));

    // Another user may not claim the session.
    let err = service
        .save_reading(&created.session_id, None, None, 12)
        .await
        .unwrap_err();
    assert!(matches!(err, ReadingError::Auth(AuthError::SessionOwnedByAnotherUser)));
}

#[tokio::test]
async fn test_strict_draw_policy_reports_unknown_cards() {
    let policy = ReadingPolicy {
        draw: DrawPolicy::Strict,
        ..ReadingPolicy::default()
    };
    let (_pool, service) = service_with(ScriptedProvider::with_steps(vec![]), policy);
    let created = service.new_session(None).await.unwrap();

    let result = service
        .draw_cards(
            DrawRequest {
                session_id: created.session_id.clone(),
                cards: names(&["The Fool", "Bogus"]),
                ..Default::default()
            },
            None,
        )
        .await
        .unwrap();
    assert_eq!(result.warnings, names(&["Bogus"]));
    assert_eq!(result.reading_id, None);

    let err = service
        .draw_cards(
            DrawRequest {
                session_id: created.session_id.clone(),
                cards: names(&["Nope"]),
                ..Default::default()
            },
            None,
        )
        .await
        .unwrap_err();
    assert!(matches!(err, ReadingError::Validation(_)));
}

#[tokio::test]
async fn test_service_rejects_unknown_and_blank_sessions() {
    let (_pool, service) = service_with(ScriptedProvider::with_steps(vec![]), ReadingPolicy::default());

    let err = service
        .submit_questions("missing", names(&["Q?"]), None)
        .await
        .unwrap_err();
    assert!(matches!(err, ReadingError::NotFound(_)));

    let err = service.send_message("", "hello").await.unwrap_err();
    assert!(matches!(err, ReadingError::Validation(_)));

    let lenient = ReadingPolicy {
        lookup: Lookup::CreateMissing,
        ..ReadingPolicy::default()
    };
    let (_pool, service) = service_with(ScriptedProvider::with_steps(vec![]), lenient);
    service
        .submit_questions("missing", names(&["Q?"]), None)
        .await
        .unwrap();
    assert!(service.session("missing").unwrap().questions_asked);
}

#[tokio::test]
async fn test_concurrent_messages_are_all_recorded() {
    let (_pool, service) = service_with(ScriptedProvider::with_steps(vec![]), ReadingPolicy::default());
    let service = Arc::new(service);
    let created = service.new_session(None).await.unwrap();

    let a = {
        let service = service.clone();
        let id = created.session_id.clone();
        tokio::spawn(async move { service.send_message(&id, "first").await })
    };
    let b = {
        let service = service.clone();
        let id = created.session_id.clone();
        tokio::spawn(async move { service.send_message(&id, "second").await })
    };
    a.await.unwrap().unwrap();
    b.await.unwrap().unwrap();

    let session = service.session(&created.session_id).unwrap();
    // Greeting plus two user messages and two replies.
    assert_eq!(session.history.len(), 5);
    assert_eq!(session.user_responses.len(), 2);
    assert!(session.user_responses.contains(&"first".to_string()));
    assert!(session.user_responses.contains(&"second".to_string()));
}

#[test]
fn test_draw_against_single_card_catalog() {
    let catalog = CardCatalog::new(vec![CardDefinition {
        name: "Fool".to_string(),
        card_type: "Major Arcana".to_string(),
        image: "fool.jpg".to_string(),
    }])
    .unwrap();

    let mut session = ReadingSession::new("s1", None);
    let outcome = session.draw(&catalog, &names(&["Fool", "Bogus"])).unwrap();

    assert!(session.cards_drawn);
    assert_eq!(session.cards.len(), 1);
    assert_eq!(session.cards[0].name, "Fool");
    assert_eq!(outcome.unresolved, names(&["Bogus"]));
}

/// Applies one mutation and returns how many history entries it added,
/// checking that earlier entries were left alone.
async fn grow<F: FnOnce(&mut ReadingSession)>(store: &SessionStore, f: F) -> usize {
    let before = store.load("s1").unwrap().history;
    let (after, _) = store
        .update("s1", Lookup::Strict, |s| {
            f(s);
            Ok(())
        })
        .await
        .unwrap();
    assert_eq!(&after.history[..before.len()], &before[..]);
    after.history.len() - before.len()
}

#[tokio::test]
async fn test_history_grows_by_each_call_contribution() {
    let (_pool, store, catalog) = setup();
    store.create("s1", None).unwrap();

    let added = grow(&store, |s| {
        s.submit_questions(&names(&["a?", "b?"]));
    })
    .await;
    assert_eq!(added, 2);

    let added = grow(&store, |s| {
        s.draw_cards(&catalog, &names(&["The Hermit"]), "brief").unwrap();
    })
    .await;
    assert_eq!(added, 2);

    assert_eq!(grow(&store, |s| s.add_message(Role::Assistant, "reply")).await, 1);
    assert_eq!(
        grow(&store, |s| {
            s.submit_questions(&[]);
        })
        .await,
        0
    );
    assert_eq!(grow(&store, |s| s.record_user_response("c?")).await, 1);

    assert_eq!(store.load("s1").unwrap().history.len(), 6);
}

#[tokio::test]
async fn test_failed_update_of_missing_session_writes_nothing() {
    let (_pool, store, catalog) = setup();

    let err = store
        .update("ghost", Lookup::CreateMissing, |s| s.draw(&catalog, &names(&["Bogus"])))
        .await
        .unwrap_err();
    assert!(matches!(err, ReadingError::Validation(_)));
    assert!(store.snapshot("ghost").unwrap().is_none());

    store
        .update("ghost", Lookup::CreateMissing, |s| s.draw(&catalog, &names(&["The Moon"])))
        .await
        .unwrap();
    let session = store.load("ghost").unwrap();
    assert_eq!(session.cards[0].name, "The Moon");
}

#[tokio::test]
async fn test_reads_under_create_missing_do_not_persist() {
    let lenient = ReadingPolicy {
        lookup: Lookup::CreateMissing,
        ..ReadingPolicy::default()
    };
    let (pool, service) = service_with(ScriptedProvider::with_steps(vec![]), lenient);
    let store = SessionStore::new(pool);

    assert!(service.history("ghost").unwrap().is_empty());
    assert!(!service.session("ghost").unwrap().questions_asked);
    service.submit_questions("ghost", Vec::new(), None).await.unwrap();
    assert!(store.snapshot("ghost").unwrap().is_none());

    // Binding is a real mutation and does persist.
    service.submit_questions("ghost", Vec::new(), Some(3)).await.unwrap();
    assert_eq!(store.load("ghost").unwrap().user_id, Some(3));
}
