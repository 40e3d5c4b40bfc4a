use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::session::SessionStatus;

use super::manager::ChannelManager;

/// Close the chat channel every time the session ends up signed out, whether
/// by logout or by an authorization failure on any HTTP request.
///
/// The task ends when the session's sender is dropped.
pub fn disconnect_on_sign_out(
    manager: ChannelManager,
    mut session: watch::Receiver<SessionStatus>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while session.changed().await.is_ok() {
            let status = *session.borrow_and_update();
            if status == SessionStatus::Anonymous {
                tracing::debug!("session signed out; closing chat channel");
                manager.disconnect().await;
            }
        }
    })
}
