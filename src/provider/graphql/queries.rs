pub(crate) const HEALTH_QUERY: &str = r#"query Health {
  health
}"#;

pub(crate) const SUPPORTED_MODELS_QUERY: &str = r#"query SupportedModels($provider: AIProvider!) {
  supportedModels(provider: $provider)
}"#;

pub(crate) const SEND_MESSAGE_MUTATION: &str = r#"mutation SendMessage($input: ChatRequest!) {
  sendMessage(input: $input) {
    id
    content
    provider
    model
    timestamp
    error
  }
}"#;
