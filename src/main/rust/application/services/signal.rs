use tokio::sync::watch;

/// Resolves once the flag is set or its sender is dropped
pub(crate) async fn wait_for_signal(rx: &mut watch::Receiver<bool>) {
    loop {
        if *rx.borrow_and_update() {
            return;
        }
        if rx.changed().await.is_err() {
            return;
        }
    }
}
