//! Variable manipulation builtins: set, unset

use async_trait::async_trait;

use super::Command;
use crate::context::ExecContext;
use crate::error::Result;

/// set builtin - assign a global variable
pub struct SetVar;

#[async_trait]
impl Command for SetVar {
    async fn execute(&self, ec: &mut ExecContext, args: &[String]) -> Result<String> {
        let [name, value] = args else {
            return Err(ec.make_error("expecting a variable name and value"));
        };

        if ec.dry_run {
            return Ok(format!("would set {name} = {value}"));
        }

        ec.global_vars.insert(name.clone(), value.clone());
        Ok(String::new())
    }
}

/// unset builtin - remove a global variable
///
/// Removing a name that was never set is not an error.
pub struct UnsetVar;

#[async_trait]
impl Command for UnsetVar {
    async fn execute(&self, ec: &mut ExecContext, args: &[String]) -> Result<String> {
        if args.is_empty() {
            return Err(ec.make_error("expecting a variable name"));
        }

        if ec.dry_run {
            return Ok(format!("would unset {}", args.join(", ")));
        }

        for name in args {
            ec.global_vars.remove(name);
        }
        Ok(String::new())
    }
}
