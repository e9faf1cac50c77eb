//! File watching functionality using the notify crate.

use crate::error::Result;
use notify::event::ModifyKind;
use notify::{Config, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::Path;
use tokio::sync::mpsc;

/// The file operations the follower reacts to.
///
/// Everything that is not a rename or a removal counts as write activity:
/// data writes, metadata changes, and creations all mean the file may have
/// grown and the reader should take another pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum FileEvent {
    Write,
    Rename,
    Remove,
}

/// Collapse a notify event kind into the operation the follower cares about.
pub(crate) fn classify(kind: &EventKind) -> FileEvent {
    match kind {
        EventKind::Remove(_) => FileEvent::Remove,
        EventKind::Modify(ModifyKind::Name(_)) => FileEvent::Rename,
        _ => FileEvent::Write,
    }
}

/// A watcher over the paths a single follower tracks.
///
/// Notify delivers events on its own thread; the callback forwards them into
/// a tokio channel so the follower can select on them. Dropping the watcher
/// deregisters everything.
pub(crate) struct FileWatcher {
    watcher: RecommendedWatcher,
    receiver: mpsc::UnboundedReceiver<notify::Result<Event>>,
}

impl FileWatcher {
    /// Creates a watcher with no paths registered yet.
    pub(crate) fn new() -> Result<Self> {
        let (tx, rx) = mpsc::unbounded_channel();

        let watcher = RecommendedWatcher::new(
            move |res| {
                let _ = tx.send(res);
            },
            Config::default(),
        )?;

        Ok(Self {
            watcher,
            receiver: rx,
        })
    }

    /// Starts watching a path. Called again after a rename to also track the
    /// file under its new name.
    pub(crate) fn watch(&mut self, path: &Path) -> Result<()> {
        self.watcher.watch(path, RecursiveMode::NonRecursive)?;
        Ok(())
    }

    /// Returns the next file system event, or `None` if the notify backend
    /// shut down.
    pub(crate) async fn next(&mut self) -> Option<notify::Result<Event>> {
        self.receiver.recv().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use notify::event::{
        CreateKind, DataChange, MetadataKind, ModifyKind, RemoveKind, RenameMode,
    };
    use std::time::Duration;
    use tokio::io::AsyncWriteExt;

    #[test]
    fn test_classify_data_write() {
        let kind = EventKind::Modify(ModifyKind::Data(DataChange::Content));
        assert_eq!(classify(&kind), FileEvent::Write);
    }

    #[test]
    fn test_classify_metadata_change_as_write() {
        let kind = EventKind::Modify(ModifyKind::Metadata(MetadataKind::WriteTime));
        assert_eq!(classify(&kind), FileEvent::Write);
    }

    #[test]
    fn test_classify_create_as_write() {
        let kind = EventKind::Create(CreateKind::File);
        assert_eq!(classify(&kind), FileEvent::Write);
    }

    #[test]
    fn test_classify_rename() {
        for mode in [
            RenameMode::Any,
            RenameMode::From,
            RenameMode::To,
            RenameMode::Both,
        ] {
            let kind = EventKind::Modify(ModifyKind::Name(mode));
            assert_eq!(classify(&kind), FileEvent::Rename);
        }
    }

    #[test]
    fn test_classify_remove() {
        let kind = EventKind::Remove(RemoveKind::File);
        assert_eq!(classify(&kind), FileEvent::Remove);
    }

    #[tokio::test]
    async fn test_watcher_creation() {
        assert!(FileWatcher::new().is_ok());
    }

    #[tokio::test]
    async fn test_watch_missing_path_fails() {
        let dir = tempfile::tempdir().unwrap();
        let mut watcher = FileWatcher::new().unwrap();
        assert!(watcher.watch(&dir.path().join("nope.log")).is_err());
    }

    #[tokio::test]
    async fn test_watcher_sees_appends() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("watched.log");
        tokio::fs::File::create(&path).await.unwrap();

        let mut watcher = FileWatcher::new().unwrap();
        watcher.watch(&path).unwrap();

        let mut file = tokio::fs::OpenOptions::new()
            .append(true)
            .open(&path)
            .await
            .unwrap();
        file.write_all(b"hello\n").await.unwrap();
        file.flush().await.unwrap();

        let event = tokio::time::timeout(Duration::from_secs(5), watcher.next())
            .await
            .expect("no event within timeout")
            .expect("watcher channel closed")
            .expect("watcher reported an error");
        assert_eq!(classify(&event.kind), FileEvent::Write);
    }
}
