// esbflow/src/core/event.rs

//! The message event that travels through a flow.

use std::collections::HashMap;

/// How the originating source expects the flow to answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MessageExchangePattern {
  /// The caller waits for the processed event.
  #[default]
  RequestResponse,
  /// The caller does not expect a response.
  OneWay,
}

/// A message event: a payload plus the flow variables attached to it.
///
/// Events are moved through a chain by value. Each processor receives the event
/// produced by its predecessor and returns the event handed to its successor.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Event {
  payload: String,
  variables: HashMap<String, String>,
  exchange_pattern: MessageExchangePattern,
}

impl Event {
  pub fn new(payload: impl Into<String>) -> Self {
    Self {
      payload: payload.into(),
      variables: HashMap::new(),
      exchange_pattern: MessageExchangePattern::RequestResponse,
    }
  }

  /// Creates an event whose source does not wait for a response.
  pub fn one_way(payload: impl Into<String>) -> Self {
    Self {
      exchange_pattern: MessageExchangePattern::OneWay,
      ..Self::new(payload)
    }
  }

  pub fn payload(&self) -> &str {
    &self.payload
  }

  pub fn set_payload(&mut self, payload: impl Into<String>) {
    self.payload = payload.into();
  }

  pub fn append_payload(mut self, suffix: &str) -> Self {
    self.payload.push_str(suffix);
    self
  }

  pub fn into_payload(self) -> String {
    self.payload
  }

  pub fn variable(&self, key: &str) -> Option<&str> {
    self.variables.get(key).map(String::as_str)
  }

  pub fn variables(&self) -> &HashMap<String, String> {
    &self.variables
  }

  pub fn set_variable(&mut self, key: impl Into<String>, value: impl Into<String>) {
    self.variables.insert(key.into(), value.into());
  }

  pub fn with_variable(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
    self.set_variable(key, value);
    self
  }

  pub fn exchange_pattern(&self) -> MessageExchangePattern {
    self.exchange_pattern
  }

  pub fn with_exchange_pattern(mut self, pattern: MessageExchangePattern) -> Self {
    self.exchange_pattern = pattern;
    self
  }

  pub fn is_one_way(&self) -> bool {
    self.exchange_pattern == MessageExchangePattern::OneWay
  }
}

impl From<&str> for Event {
  fn from(payload: &str) -> Self {
    Event::new(payload)
  }
}

impl From<String> for Event {
  fn from(payload: String) -> Self {
    Event::new(payload)
  }
}
