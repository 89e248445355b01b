//! Builtin command registry.
//!
//! Commands are external collaborators: this core owns only the
//! lookup-and-invoke contract and the scoping/error-prefix environment each
//! handler executes within. Implement [`Command`] and register it via
//! [`CommandRegistry::register`]:
//!
//! ```rust
//! use logkit::{async_trait, Command, CommandRegistry, ExecContext, Result};
//!
//! struct Version;
//!
//! #[async_trait]
//! impl Command for Version {
//!     async fn execute(&self, _ec: &mut ExecContext, _args: &[String]) -> Result<String> {
//!         Ok("logkit 0.2".to_string())
//!     }
//! }
//!
//! let mut registry = CommandRegistry::with_defaults();
//! registry.register("version", Box::new(Version));
//! ```

mod echo;
mod redirect;
mod vars;

pub use echo::Echo;
pub use redirect::RedirectTo;
pub use vars::{SetVar, UnsetVar};

use std::collections::HashMap;

use async_trait::async_trait;

use crate::context::ExecContext;
use crate::error::Result;

/// A builtin command handler.
#[async_trait]
pub trait Command: Send + Sync {
    /// Execute with variable-substituted arguments, returning the
    /// human-readable result string. Handlers must honor `ec.dry_run`.
    async fn execute(&self, ec: &mut ExecContext, args: &[String]) -> Result<String>;
}

/// Name-to-handler mapping consulted by the dispatcher.
#[derive(Default)]
pub struct CommandRegistry {
    commands: HashMap<String, Box<dyn Command>>,
}

impl CommandRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry with the default command set.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register("echo", Box::new(Echo));
        registry.register("set", Box::new(SetVar));
        registry.register("unset", Box::new(UnsetVar));
        registry.register("redirect-to", Box::new(RedirectTo));
        registry
    }

    /// Register (or replace) a command handler.
    pub fn register(&mut self, name: impl Into<String>, command: Box<dyn Command>) {
        self.commands.insert(name.into(), command);
    }

    /// Look up a handler by name.
    pub fn get(&self, name: &str) -> Option<&dyn Command> {
        self.commands.get(name).map(Box::as_ref)
    }

    /// Registered command names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.commands.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}
