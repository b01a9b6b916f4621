//! Queue of the files that make up one map.

use std::collections::{HashSet, VecDeque};
use std::path::{Path, PathBuf};

/// The role of a file inside a load.
#[derive(Debug, PartialEq, Eq, Hash, Copy, Clone)]
pub enum DocumentKind {
    Map,
    Tileset,
    Template,
}

impl DocumentKind {
    /// Classify a file by its extension, `fallback` is used for unknown extensions.
    pub fn classify(url: &Path, fallback: DocumentKind) -> Self {
        match url.extension().and_then(|e| e.to_str()) {
            Some("tmx") => DocumentKind::Map,
            Some("tsx") => DocumentKind::Tileset,
            Some("tx") | Some("template") => DocumentKind::Template,
            _ => fallback,
        }
    }
}

/// A file that was discovered while loading a map.
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct DocumentReference {
    pub url: PathBuf,
    pub kind: DocumentKind,
    /// Set once the file was parsed without errors.
    pub resolved: bool,
}

impl DocumentReference {
    pub fn new(url: impl Into<PathBuf>, kind: DocumentKind) -> Self {
        let url = url.into();
        let kind = DocumentKind::classify(&url, kind);
        Self { url, kind, resolved: false }
    }
}

/// FIFO of files still to parse.
///
/// Every file is queued at most once per load, which also breaks reference cycles.
#[derive(Debug, Default)]
pub struct Worklist {
    queue: VecDeque<DocumentReference>,
    visited: HashSet<(DocumentKind, PathBuf)>,
    completed: Vec<DocumentReference>,
}

impl Worklist {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a file. Returns false if it was queued before.
    pub fn push(&mut self, reference: DocumentReference) -> bool {
        let key = (reference.kind, reference.url.clone());
        if !self.visited.insert(key) {
            return false;
        }
        self.queue.push_back(reference);
        true
    }

    /// Take the next file to parse out of the queue.
    pub fn pop(&mut self) -> Option<DocumentReference> {
        self.queue.pop_front()
    }

    /// Record a file that was taken out of the queue and parsed.
    pub fn complete(&mut self, reference: DocumentReference) {
        self.completed.push(reference);
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub(crate) fn into_completed(self) -> Vec<DocumentReference> {
        self.completed
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_classify() {
        assert_eq!(DocumentKind::classify(Path::new("a/b.tsx"), DocumentKind::Map), DocumentKind::Tileset);
        assert_eq!(DocumentKind::classify(Path::new("door.tx"), DocumentKind::Map), DocumentKind::Template);
        assert_eq!(DocumentKind::classify(Path::new("tiles.xml"), DocumentKind::Tileset), DocumentKind::Tileset);
    }

    #[test]
    fn test_fifo_and_dedup() {
        let mut list = Worklist::new();
        assert!(list.push(DocumentReference::new("/m/map.tmx", DocumentKind::Map)));
        assert!(list.push(DocumentReference::new("/m/a.tsx", DocumentKind::Tileset)));
        assert!(list.push(DocumentReference::new("/m/door.tx", DocumentKind::Template)));
        assert!(!list.push(DocumentReference::new("/m/a.tsx", DocumentKind::Tileset)));
        assert_eq!(list.len(), 3);

        let first = list.pop().unwrap();
        assert_eq!(first.kind, DocumentKind::Map);
        list.complete(first);

        // popped files are never queued again
        assert!(!list.push(DocumentReference::new("/m/map.tmx", DocumentKind::Map)));

        assert_eq!(list.pop().unwrap().url, PathBuf::from("/m/a.tsx"));
        assert_eq!(list.pop().unwrap().url, PathBuf::from("/m/door.tx"));
        assert!(list.pop().is_none());
        assert!(list.is_empty());
        assert_eq!(list.into_completed().len(), 1);
    }
}
