//! Keeps a panicking background task from taking anything else down.

use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;

use futures_util::FutureExt;
use tracing::error;

/// Runs `future`, logging instead of propagating a panic.
pub async fn run_guarded<F>(task: &'static str, future: F)
where
    F: Future<Output = ()>,
{
    if let Err(panic) = AssertUnwindSafe(future).catch_unwind().await {
        error!(task, panic = %panic_message(panic.as_ref()), "Task panicked");
    }
}

/// Extracts the payload text of a caught panic.
#[must_use]
pub fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "Unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_panic_is_contained() {
        run_guarded("test", async {
            panic!("boom");
        })
        .await;
    }

    #[test]
    fn test_panic_message() {
        let caught = std::panic::catch_unwind(|| panic!("static message")).unwrap_err();
        assert_eq!(panic_message(caught.as_ref()), "static message");

        let caught = std::panic::catch_unwind(|| panic!("{}", String::from("owned"))).unwrap_err();
        assert_eq!(panic_message(caught.as_ref()), "owned");
    }
}
