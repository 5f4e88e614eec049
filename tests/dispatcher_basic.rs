use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chatrelay::config::{ClientConfig, build_dispatcher};
use chatrelay::http::{
    DynHttpTransport, HttpRequest, HttpResponse, HttpStreamResponse, HttpTransport,
};
use chatrelay::{
    AdapterKind, ChatError, ChatResult, CredentialStore, MemoryCredentialStore, Provider,
    ReplyPayload, Role,
};
use futures_util::stream;
use serde_json::{Value, json};

/// In-memory transport that counts requests and replays canned JSON bodies.
struct MockTransport {
    replies: Mutex<VecDeque<(u16, Value)>>,
    requests: Mutex<Vec<HttpRequest>>,
}

impl MockTransport {
    fn new(replies: Vec<(u16, Value)>) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(replies.into()),
            requests: Mutex::new(Vec::new()),
        })
    }

    fn request_count(&self) -> usize {
        self.requests.lock().expect("lock").len()
    }

    fn body(&self, index: usize) -> Value {
        let requests = self.requests.lock().expect("lock");
        serde_json::from_slice(&requests[index].body).expect("json")
    }

    fn next(&self, request: HttpRequest) -> HttpResponse {
        self.requests.lock().expect("lock").push(request);
        let (status, body) = self
            .replies
            .lock()
            .expect("lock")
            .pop_front()
            .expect("unexpected extra request");
        HttpResponse {
            status,
            body: body.to_string().into_bytes(),
        }
    }
}

#[async_trait]
impl HttpTransport for MockTransport {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, ChatError> {
        Ok(self.next(request))
    }

    async fn send_stream(&self, request: HttpRequest) -> Result<HttpStreamResponse, ChatError> {
        let response = self.next(request);
        Ok(HttpStreamResponse {
            status: response.status,
            body: Box::pin(stream::iter(vec![Ok(response.body)])),
        })
    }
}

fn config(adapter: AdapterKind, provider: Provider) -> ClientConfig {
    ClientConfig {
        adapter,
        active_provider: provider,
        ..ClientConfig::default()
    }
}

/// Missing keys are rejected before any request leaves the process.
#[tokio::test]
async fn empty_credential_fails_without_network() {
    for adapter in [AdapterKind::Rest, AdapterKind::Graphql] {
        for provider in Provider::ALL {
            let transport = MockTransport::new(Vec::new());
            let store = Arc::new(MemoryCredentialStore::new());
            store.set(provider, "");
            let mut dispatcher = build_dispatcher(
                &config(adapter, provider),
                transport.clone() as DynHttpTransport,
                store,
            )
            .expect("dispatcher");

            let err = dispatcher.send_message("hi").await.unwrap_err();
            match &err {
                ChatError::Config { provider: reported, message } => {
                    assert_eq!(*reported, provider);
                    assert!(
                        message.contains(provider.display_name()),
                        "message should name the provider: {message}"
                    );
                }
                other => panic!("expected config error, got {other:?}"),
            }
            assert_eq!(transport.request_count(), 0);
        }
    }
}

/// REST path with an explicit model returns the first choice.
#[tokio::test]
async fn rest_reply_content_is_returned() {
    let transport = MockTransport::new(vec![(
        200,
        json!({"choices": [{"message": {"content": "hello"}}]}),
    )]);
    let store = Arc::new(MemoryCredentialStore::with_keys([(Provider::OpenAi, "sk-test")]));
    let mut cfg = config(AdapterKind::Rest, Provider::OpenAi);
    cfg.models.insert(Provider::OpenAi, "model-x".to_string());
    let mut dispatcher =
        build_dispatcher(&cfg, transport.clone() as DynHttpTransport, store).expect("dispatcher");

    let reply = dispatcher.send_message("hi").await.expect("reply");
    assert_eq!(reply.content, "hello");
    assert_eq!(transport.request_count(), 1);
    assert_eq!(transport.body(0)["model"], "model-x");

    let result: ChatResult = Ok(reply);
    let payload = ReplyPayload::from(&result);
    assert_eq!(
        serde_json::to_value(payload).expect("payload"),
        json!({"content": "hello"})
    );
}

/// The gateway's `error` field becomes a provider error and a visible error entry.
#[tokio::test]
async fn graphql_error_field_is_provider_error() {
    let transport = MockTransport::new(vec![(
        200,
        json!({"data": {"sendMessage": {"content": "", "error": "rate limited"}}}),
    )]);
    let store = Arc::new(MemoryCredentialStore::with_keys([(Provider::DeepSeek, "sk-test")]));
    let mut dispatcher = build_dispatcher(
        &config(AdapterKind::Graphql, Provider::DeepSeek),
        transport.clone() as DynHttpTransport,
        store,
    )
    .expect("dispatcher");

    let err = dispatcher.send_message("hi").await.unwrap_err();
    match &err {
        ChatError::Provider { message, .. } => assert_eq!(message, "rate limited"),
        other => panic!("expected provider error, got {other:?}"),
    }

    let last = dispatcher.messages().last().expect("error entry");
    assert_eq!(last.role, Role::Assistant);
    assert!(last.is_error);
    assert!(last.content.contains("rate limited"));
}

/// Every send is exactly one round trip; history reaches the gateway.
#[tokio::test]
async fn each_send_is_one_round_trip() {
    let reply = |text: &str| {
        (
            200u16,
            json!({"data": {"sendMessage": {"id": "1", "content": text, "error": null}}}),
        )
    };
    let transport = MockTransport::new(vec![reply("first"), reply("second"), reply("third")]);
    let store = Arc::new(MemoryCredentialStore::with_keys([
        (Provider::OpenAi, "sk-open"),
        (Provider::DeepSeek, "sk-deep"),
    ]));
    let mut dispatcher = build_dispatcher(
        &config(AdapterKind::Graphql, Provider::DeepSeek),
        transport.clone() as DynHttpTransport,
        store.clone(),
    )
    .expect("dispatcher");

    dispatcher.send_message("one").await.expect("first");
    assert_eq!(transport.request_count(), 1);
    dispatcher.send_message("two").await.expect("second");
    assert_eq!(transport.request_count(), 2);

    let body = transport.body(1);
    let input = &body["variables"]["input"];
    assert_eq!(input["apiKey"], "sk-deep");
    assert_eq!(
        input["conversationHistory"],
        json!([
            {"role": "user", "content": "one"},
            {"role": "assistant", "content": "first"}
        ])
    );

    dispatcher.switch_provider();
    dispatcher.clear_history();
    dispatcher.send_message("three").await.expect("third");
    assert_eq!(transport.request_count(), 3);

    let body = transport.body(2);
    let input = &body["variables"]["input"];
    assert_eq!(input["provider"], "OPENAI");
    assert_eq!(input["model"], "gpt-3.5-turbo");
    assert_eq!(input["conversationHistory"], json!([]));
    assert_eq!(store.get(Provider::DeepSeek).as_deref(), Some("sk-deep"));
}

/// Switching twice is a no-op and performs no I/O.
#[tokio::test]
async fn switch_provider_round_trips() {
    let transport = MockTransport::new(Vec::new());
    let mut dispatcher = build_dispatcher(
        &ClientConfig::default(),
        transport.clone() as DynHttpTransport,
        Arc::new(MemoryCredentialStore::new()),
    )
    .expect("dispatcher");

    let original = dispatcher.active_provider();
    dispatcher.switch_provider();
    dispatcher.switch_provider();
    assert_eq!(dispatcher.active_provider(), original);
    assert_eq!(transport.request_count(), 0);
}
