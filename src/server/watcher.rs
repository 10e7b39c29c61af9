use std::path::{Path, PathBuf};

use tokio::sync::mpsc::{self, Receiver, Sender};
use tracing::{debug, error};

use crate::error::ConfigError;

pub struct Watcher {
  path: PathBuf,
  watcher: Option<notify::RecommendedWatcher>,
  rx: Option<Receiver<()>>,
  tx: Sender<()>,
}

impl Watcher {
  pub fn new(path: &Path) -> Self {
    let (tx, rx) = mpsc::channel(1);

    // sometimes the editor may touch the file multiple times in quick
    // succession when saving, so we debounce the events
    let rx = debounce(std::time::Duration::from_millis(500), rx);

    Self {
      path: path.to_owned(),
      watcher: None,
      rx: Some(rx),
      tx,
    }
  }

  pub fn take_change_alert(&mut self) -> Option<Receiver<()>> {
    self.rx.take()
  }

  pub fn setup(&mut self) -> Result<(), ConfigError> {
    use notify::{Event, EventKind, RecursiveMode, Watcher};

    let tx = self.tx.clone();
    let file_name = self.path.file_name().map(|n| n.to_owned());
    let event_handler = move |event: Result<Event, notify::Error>| match event
    {
      Ok(event) => {
        let relevant = matches!(
          event.kind,
          EventKind::Modify(_) | EventKind::Create(_)
        ) && event
          .paths
          .iter()
          .any(|p| p.file_name() == file_name.as_deref());

        if relevant {
          // a full channel already has a pending reload
          let _ = tx.try_send(());
        } else {
          debug!("ignored file event: {:?}", event);
        }
      }
      Err(e) => {
        error!("file watcher error: {:?}", e);
      }
    };

    let mut watcher =
      notify::recommended_watcher(event_handler).map_err(|e| {
        ConfigError::Message(format!("failed to create file watcher: {:?}", e))
      })?;

    // editors often replace the file on save, so watch its directory
    let dir = match self.path.parent() {
      Some(dir) if !dir.as_os_str().is_empty() => dir,
      _ => Path::new("."),
    };
    watcher.watch(dir, RecursiveMode::NonRecursive).map_err(|e| {
      ConfigError::Message(format!("failed to watch file: {:?}", e))
    })?;

    self.watcher = Some(watcher);
    Ok(())
  }
}

fn debounce<T: Send + 'static>(
  duration: std::time::Duration,
  mut rx: Receiver<T>,
) -> Receiver<T> {
  let (debounced_tx, debounced_rx) = mpsc::channel(1);
  tokio::task::spawn(async move {
    let mut last = None;
    loop {
      tokio::select! {
        val = rx.recv() => {
          match val {
            Some(val) => last = Some(val),
            None => break,
          }
        }
        _ = tokio::time::sleep(duration) => {
          if let Some(val) = last.take() {
            if debounced_tx.send(val).await.is_err() {
              break;
            }
          }
        }
      }
    }
  });
  debounced_rx
}
