//! Verb dispatch.
//!
//! Maps an uppercased verb to a [`Handler`]. Dispatch always yields a
//! [`Response`]: verbs without a handler get a DENY.

use crate::protocol::{Command, Response};
use std::collections::HashMap;
use std::sync::Arc;

/// Business logic for one verb.
pub trait Handler: Send + Sync {
    fn handle(&self, command: &Command) -> Response;
}

impl<F> Handler for F
where
    F: Fn(&Command) -> Response + Send + Sync,
{
    fn handle(&self, command: &Command) -> Response {
        self(command)
    }
}

/// Handler that completes every command with fixed text.
#[derive(Debug, Clone)]
pub struct CannedHandler {
    text: String,
}

impl CannedHandler {
    pub fn new(text: impl Into<String>) -> Self {
        CannedHandler { text: text.into() }
    }
}

impl Handler for CannedHandler {
    fn handle(&self, command: &Command) -> Response {
        Response::completed(command, self.text.as_str())
    }
}

/// Verbs served out of the box, with their canned replies.
const DEFAULT_HANDLERS: [(&str, &str); 6] = [
    (
        "RTRV",
        "Network Element Status: ACTIVE, Type: OC-48, Location: Site-A",
    ),
    ("ED", "Configuration updated successfully"),
    ("ENT", "New entry created successfully"),
    ("DLT", "Entry deleted successfully"),
    ("ACT", "Service activated successfully"),
    ("CANC", "Operation cancelled successfully"),
];

/// Verb to handler lookup table
#[derive(Clone, Default)]
pub struct Dispatcher {
    handlers: HashMap<String, Arc<dyn Handler>>,
}

impl Dispatcher {
    /// Create a dispatcher with no verbs registered.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a dispatcher serving RTRV, ED, ENT, DLT, ACT and CANC.
    pub fn with_defaults() -> Self {
        let mut dispatcher = Self::new();
        for (verb, text) in DEFAULT_HANDLERS {
            dispatcher.register(verb, CannedHandler::new(text));
        }
        dispatcher
    }

    /// Register `handler` for `verb`, replacing any previous one.
    pub fn register<H>(&mut self, verb: &str, handler: H)
    where
        H: Handler + 'static,
    {
        self.handlers
            .insert(verb.to_ascii_uppercase(), Arc::new(handler));
    }

    pub fn is_registered(&self, verb: &str) -> bool {
        self.handlers.contains_key(&verb.to_ascii_uppercase())
    }

    /// Route a command to its handler.
    pub fn dispatch(&self, command: &Command) -> Response {
        match self.handlers.get(&command.verb.to_ascii_uppercase()) {
            Some(handler) => handler.handle(command),
            None => Response::denied(command, format!("Unknown command: {}", command.verb)),
        }
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut verbs: Vec<_> = self.handlers.keys().collect();
        verbs.sort();
        f.debug_struct("Dispatcher").field("verbs", &verbs).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::CompletionCode;

    #[test]
    fn test_retrieve_completes() {
        let dispatcher = Dispatcher::with_defaults();
        let cmd = Command::parse("RTRV-NE:TID001::001;").unwrap();
        let resp = dispatcher.dispatch(&cmd);

        assert_eq!(resp.code, CompletionCode::Compld);
        assert_eq!(resp.tid, "TID001");
        assert_eq!(resp.ctag, "001");
        assert!(!resp.text.unwrap().is_empty());
    }

    #[test]
    fn test_all_default_verbs_complete() {
        let dispatcher = Dispatcher::with_defaults();
        for verb in ["RTRV", "ED", "ENT", "DLT", "ACT", "CANC"] {
            let cmd = Command::parse(&format!("{}-X:T:A:9;", verb)).unwrap();
            let resp = dispatcher.dispatch(&cmd);
            assert_eq!(resp.code, CompletionCode::Compld, "verb {}", verb);
            assert!(resp.text.is_some_and(|t| !t.is_empty()));
        }
    }

    #[test]
    fn test_verb_is_case_insensitive() {
        let dispatcher = Dispatcher::with_defaults();
        let cmd = Command::parse("rtrv-ne:TID001::001;").unwrap();
        assert_eq!(dispatcher.dispatch(&cmd).code, CompletionCode::Compld);
        assert!(dispatcher.is_registered("canc"));
    }

    #[test]
    fn test_unknown_verb_denied() {
        let dispatcher = Dispatcher::with_defaults();
        let cmd = Command::parse("ZZZZ:TID001::001;").unwrap();
        let resp = dispatcher.dispatch(&cmd);

        assert_eq!(resp.code, CompletionCode::Deny);
        assert_eq!(resp.tid, "TID001");
        assert_eq!(resp.ctag, "001");
        assert_eq!(resp.text.as_deref(), Some("Unknown command: ZZZZ"));
    }

    #[test]
    fn test_empty_verb_denied() {
        let dispatcher = Dispatcher::with_defaults();
        let resp = dispatcher.dispatch(&Command::new(""));
        assert_eq!(resp.code, CompletionCode::Deny);
    }

    #[test]
    fn test_register_closure_handler() {
        let mut dispatcher = Dispatcher::new();
        assert!(!dispatcher.is_registered("RTRV"));

        dispatcher.register("init", |cmd: &Command| {
            Response::completed(cmd, format!("initialized {}", cmd.aid))
        });
        let cmd = Command::parse("INIT-SYS:TID:SLOT-3:5;").unwrap();
        let resp = dispatcher.dispatch(&cmd);

        assert_eq!(resp.code, CompletionCode::Compld);
        assert_eq!(resp.text.as_deref(), Some("initialized SLOT-3"));
    }

    #[test]
    fn test_register_replaces_existing() {
        let mut dispatcher = Dispatcher::with_defaults();
        dispatcher.register("DLT", |cmd: &Command| Response::denied(cmd, "locked"));

        let cmd = Command::parse("DLT-T1:TID001:AID002:004;").unwrap();
        let resp = dispatcher.dispatch(&cmd);
        assert_eq!(resp.code, CompletionCode::Deny);
        assert_eq!(resp.text.as_deref(), Some("locked"));
    }
}
