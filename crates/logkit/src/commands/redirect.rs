//! redirect-to builtin command

use std::path::{Path, PathBuf};

use async_trait::async_trait;

use super::Command;
use crate::context::ExecContext;
use crate::error::Result;

/// redirect-to builtin: install an output sink in the current redirection
/// frame, or deactivate it when called without a path.
///
/// The sink only covers the current execution nesting level; the guard in
/// the script executor pops the frame when the script finishes, restoring
/// any enclosing redirection.
pub struct RedirectTo;

#[async_trait]
impl Command for RedirectTo {
    async fn execute(&self, ec: &mut ExecContext, args: &[String]) -> Result<String> {
        let Some(path) = args.first() else {
            if let Some(top) = ec.output_stack.last_mut() {
                *top = None;
            }
            return Ok(String::new());
        };

        let base = ec
            .path_stack
            .last()
            .cloned()
            .unwrap_or_else(|| PathBuf::from("."));
        let resolved = if Path::new(path).is_absolute() {
            PathBuf::from(path)
        } else {
            base.join(path)
        };

        if ec.dry_run {
            return Ok(format!("would redirect output to {}", resolved.display()));
        }

        let file = std::fs::File::create(&resolved).map_err(|e| {
            ec.make_error(format!("unable to open '{}': {}", resolved.display(), e))
        })?;
        if let Some(top) = ec.output_stack.last_mut() {
            *top = Some(Box::new(file));
        }
        Ok(String::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn installs_and_clears_the_sink() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("out.txt");
        let mut ec = ExecContext::builder().cwd(dir.path()).build();

        RedirectTo
            .execute(&mut ec, &["out.txt".to_string()])
            .await
            .unwrap();
        assert!(ec.get_output().is_some());
        assert!(target.exists());

        RedirectTo.execute(&mut ec, &[]).await.unwrap();
        assert!(ec.get_output().is_none());
    }

    #[tokio::test]
    async fn unwritable_path_is_a_resource_error() {
        let mut ec = ExecContext::builder().cwd("/").build();
        let err = RedirectTo
            .execute(&mut ec, &["no-such-dir/out.txt".to_string()])
            .await
            .unwrap_err();
        assert!(err.to_string().starts_with("error: unable to open"));
    }
}
