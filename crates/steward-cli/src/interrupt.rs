use std::future::Future;
use std::io;
use std::thread;
use steward_core::CancelToken;
use tracing::{error, warn};

/// Cancel `token` on the first Ctrl-C so the run stops between files and
/// can be resumed. A second Ctrl-C exits immediately.
pub fn cancel_on_interrupt(token: CancelToken) -> io::Result<()> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_io()
        .build()?;

    thread::Builder::new()
        .name("interrupt".to_string())
        .spawn(move || {
            runtime.block_on(async {
                if !cancel_when(&token, tokio::signal::ctrl_c()).await {
                    return;
                }
                if tokio::signal::ctrl_c().await.is_ok() {
                    error!("Interrupted again; exiting without finishing the current file");
                    std::process::exit(130);
                }
            })
        })?;
    Ok(())
}

/// Wait for `interrupt` and cancel the token when it fires. Returns whether
/// the token was cancelled.
async fn cancel_when<F>(token: &CancelToken, interrupt: F) -> bool
where
    F: Future<Output = io::Result<()>>,
{
    match interrupt.await {
        Ok(()) => {
            warn!("Interrupt received; stopping after the current file (press Ctrl-C again to abort)");
            token.cancel();
            true
        }
        Err(err) => {
            warn!("Unable to listen for Ctrl-C: {}", err);
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_interrupt_cancels_token() {
        let token = CancelToken::new();
        assert!(cancel_when(&token, async { Ok(()) }).await);
        assert!(token.is_cancelled());
    }

    #[tokio::test]
    async fn test_listener_failure_leaves_token_alone() {
        let token = CancelToken::new();
        let failed = async { Err(io::Error::new(io::ErrorKind::Other, "no signal support")) };
        assert!(!cancel_when(&token, failed).await);
        assert!(!token.is_cancelled());
    }
}
