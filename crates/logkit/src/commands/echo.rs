//! echo builtin command

use async_trait::async_trait;

use super::Command;
use crate::context::ExecContext;
use crate::error::Result;

/// The echo builtin: returns its arguments joined by spaces.
pub struct Echo;

#[async_trait]
impl Command for Echo {
    async fn execute(&self, _ec: &mut ExecContext, args: &[String]) -> Result<String> {
        Ok(args.join(" "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn joins_arguments() {
        let mut ec = ExecContext::new();
        let args = vec!["hello".to_string(), "world".to_string()];
        assert_eq!(Echo.execute(&mut ec, &args).await.unwrap(), "hello world");
    }
}
