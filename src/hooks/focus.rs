//! "Regained foreground focus" notifications for revalidating hooks.

use tokio::sync::broadcast;

/// Broadcasts focus events to every hook that has bound a listener.
#[derive(Debug, Clone)]
pub struct FocusSignal {
  tx: broadcast::Sender<()>,
}

impl FocusSignal {
  pub fn new() -> Self {
    let (tx, _rx) = broadcast::channel(16);
    Self { tx }
  }

  /// Tell listening hooks that focus came back. Returns how many were listening.
  pub fn notify(&self) -> usize {
    // No listeners is not an error
    self.tx.send(()).unwrap_or(0)
  }

  pub fn listeners(&self) -> usize {
    self.tx.receiver_count()
  }

  pub(crate) fn subscribe(&self) -> FocusListener {
    FocusListener {
      rx: self.tx.subscribe(),
    }
  }
}

impl Default for FocusSignal {
  fn default() -> Self {
    Self::new()
  }
}

/// A bound listener; dropping it unbinds.
#[derive(Debug)]
pub(crate) struct FocusListener {
  rx: broadcast::Receiver<()>,
}

impl FocusListener {
  /// Drain pending notifications, returning whether any arrived.
  pub(crate) fn take(&mut self) -> bool {
    let mut focused = false;
    loop {
      match self.rx.try_recv() {
        Ok(()) | Err(broadcast::error::TryRecvError::Lagged(_)) => focused = true,
        Err(_) => return focused,
      }
    }
  }

  /// Wait for the next notification.
  pub(crate) async fn recv(&mut self) {
    loop {
      match self.rx.recv().await {
        Ok(()) | Err(broadcast::error::RecvError::Lagged(_)) => return,
        // Sender gone, focus can never arrive again
        Err(broadcast::error::RecvError::Closed) => std::future::pending::<()>().await,
      }
    }
  }
}
