//! In-memory caches for rendered previews.
//!
//! All three tiers (plain preview, diff, image) share one generic [`Cache`].
//! The store never decides staleness on its own: every entry carries a
//! validity value and the caller compares it against the current file state.

use lru::LruCache;
use std::fs;
use std::hash::Hash;
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use crate::git_diff_loader::DiffContext;
use crate::image_render::{ImageTarget, RenderedImage};
use crate::preview_loader::PreviewContent;

/// Last-modified time of a file, `None` when it cannot be read (deleted files).
pub type Mtime = Option<SystemTime>;

pub fn file_mtime(path: &Path) -> Mtime {
    fs::metadata(path).and_then(|m| m.modified()).ok()
}

/// A cached payload together with the value that decides whether it may be reused.
#[derive(Clone, Debug)]
pub struct Cached<T, V> {
    pub content: T,
    pub validity: V,
}

impl<T, V: PartialEq> Cached<T, V> {
    /// Exact match only: a different timestamp is a change, even an older one.
    pub fn is_valid_for(&self, current: &V) -> bool {
        self.validity == *current
    }
}

/// Key-value store with an optional LRU cap.
///
/// Unbounded unless a capacity is configured; entries are only replaced by a
/// newer `put` for the same key or dropped at process exit.
pub struct Cache<K: Hash + Eq, V> {
    inner: LruCache<K, V>,
}

impl<K: Hash + Eq, V> Cache<K, V> {
    pub fn new(capacity: Option<usize>) -> Self {
        let inner = match capacity.and_then(NonZeroUsize::new) {
            Some(cap) => LruCache::new(cap),
            None => LruCache::unbounded(),
        };
        Self { inner }
    }

    pub fn get(&mut self, key: &K) -> Option<&V> {
        self.inner.get(key)
    }

    pub fn put(&mut self, key: K, entry: V) {
        self.inner.put(key, entry);
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

pub type PreviewCache = Cache<PathBuf, Cached<PreviewContent, Mtime>>;

/// Identifies one diff: the same file can have a staged and an unstaged
/// diff, each in a quick and a full variant.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct DiffKey {
    pub path: PathBuf,
    pub staged: bool,
    pub context: DiffContext,
}

pub struct DiffCache {
    inner: Cache<DiffKey, Cached<Vec<String>, Mtime>>,
}

impl DiffCache {
    pub fn new(capacity: Option<usize>) -> Self {
        Self {
            inner: Cache::new(capacity),
        }
    }

    pub fn put(&mut self, key: DiffKey, lines: Vec<String>, mtime: Mtime) {
        self.inner.put(
            key,
            Cached {
                content: lines,
                validity: mtime,
            },
        );
    }

    /// The best valid entry for a file: full context wins over quick.
    pub fn best(
        &mut self,
        path: &Path,
        staged: bool,
        mtime: &Mtime,
    ) -> Option<(DiffContext, Vec<String>)> {
        for context in [DiffContext::Full, DiffContext::Quick] {
            let key = DiffKey {
                path: path.to_path_buf(),
                staged,
                context,
            };
            if let Some(entry) = self.inner.get(&key)
                && entry.is_valid_for(mtime)
            {
                return Some((context, entry.content.clone()));
            }
        }
        None
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.inner.len()
    }
}

/// Validity of a rendered image: the source mtime plus the viewport it was
/// rendered for.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ImageValidity {
    pub mtime: Mtime,
    pub viewport_w: u16,
    pub viewport_h: u16,
}

impl ImageValidity {
    /// Same source and a viewport within `tolerance` cells on both axes.
    pub fn matches(&self, current: &ImageValidity, tolerance: u16) -> bool {
        self.mtime == current.mtime
            && self.viewport_w.abs_diff(current.viewport_w) <= tolerance
            && self.viewport_h.abs_diff(current.viewport_h) <= tolerance
    }
}

pub struct ImageCache {
    inner: Cache<(PathBuf, ImageTarget), Cached<RenderedImage, ImageValidity>>,
    tolerance: u16,
}

impl ImageCache {
    pub fn new(capacity: Option<usize>, tolerance: u16) -> Self {
        Self {
            inner: Cache::new(capacity),
            tolerance,
        }
    }

    pub fn get(
        &mut self,
        path: &Path,
        target: ImageTarget,
        current: &ImageValidity,
    ) -> Option<&RenderedImage> {
        let tolerance = self.tolerance;
        self.inner
            .get(&(path.to_path_buf(), target))
            .filter(|entry| entry.validity.matches(current, tolerance))
            .map(|entry| &entry.content)
    }

    pub fn put(
        &mut self,
        path: PathBuf,
        target: ImageTarget,
        image: RenderedImage,
        validity: ImageValidity,
    ) {
        self.inner.put(
            (path, target),
            Cached {
                content: image,
                validity,
            },
        );
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.inner.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn t(secs: u64) -> Mtime {
        Some(SystemTime::UNIX_EPOCH + Duration::from_secs(secs))
    }

    #[test]
    fn test_cached_requires_exact_mtime() {
        let entry = Cached {
            content: "x",
            validity: t(10),
        };
        assert!(entry.is_valid_for(&t(10)));
        assert!(!entry.is_valid_for(&t(11)));
        assert!(!entry.is_valid_for(&t(9)));
        assert!(!entry.is_valid_for(&None));
    }

    #[test]
    fn test_capped_cache_evicts_least_recent() {
        let mut cache: Cache<u32, &str> = Cache::new(Some(2));
        cache.put(1, "a");
        cache.put(2, "b");
        assert_eq!(cache.get(&1), Some(&"a"));
        cache.put(3, "c");
        assert!(cache.get(&2).is_none());
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn test_unbounded_cache_keeps_everything() {
        let mut cache: Cache<u32, u32> = Cache::new(None);
        assert!(cache.is_empty());
        for i in 0..1000 {
            cache.put(i, i);
        }
        assert_eq!(cache.len(), 1000);
        cache.put(5, 50);
        assert_eq!(cache.get(&5), Some(&50));
    }

    #[test]
    fn test_diff_cache_prefers_full() {
        let mut cache = DiffCache::new(None);
        let path = PathBuf::from("/repo/a.rs");
        let key = |context| DiffKey {
            path: path.clone(),
            staged: true,
            context,
        };
        cache.put(key(DiffContext::Quick), vec!["quick".into()], t(1));
        assert_eq!(
            cache.best(&path, true, &t(1)),
            Some((DiffContext::Quick, vec!["quick".to_string()]))
        );

        cache.put(key(DiffContext::Full), vec!["full".into()], t(1));
        assert_eq!(
            cache.best(&path, true, &t(1)),
            Some((DiffContext::Full, vec!["full".to_string()]))
        );
        assert!(cache.best(&path, false, &t(1)).is_none());
        assert!(cache.best(&path, true, &t(2)).is_none());
    }

    #[test]
    fn test_diff_cache_skips_stale_full_for_valid_quick() {
        let mut cache = DiffCache::new(None);
        let path = PathBuf::from("/repo/a.rs");
        cache.put(
            DiffKey {
                path: path.clone(),
                staged: false,
                context: DiffContext::Full,
            },
            vec!["old full".into()],
            t(1),
        );
        cache.put(
            DiffKey {
                path: path.clone(),
                staged: false,
                context: DiffContext::Quick,
            },
            vec!["new quick".into()],
            t(2),
        );
        assert_eq!(
            cache.best(&path, false, &t(2)),
            Some((DiffContext::Quick, vec!["new quick".to_string()]))
        );
    }

    #[test]
    fn test_image_validity_tolerance() {
        let rendered = ImageValidity {
            mtime: t(5),
            viewport_w: 80,
            viewport_h: 24,
        };
        let resized = |w, h| ImageValidity {
            mtime: t(5),
            viewport_w: w,
            viewport_h: h,
        };
        assert!(rendered.matches(&resized(82, 25), 5));
        assert!(rendered.matches(&resized(75, 29), 5));
        assert!(!rendered.matches(&resized(90, 30), 5));
        assert!(!rendered.matches(&resized(80, 30), 5));
        let edited = ImageValidity {
            mtime: t(6),
            ..rendered
        };
        assert!(!rendered.matches(&edited, 5));
    }

    #[test]
    fn test_image_cache_hit_and_miss_by_viewport() {
        let mut cache = ImageCache::new(None, 5);
        let path = PathBuf::from("/repo/logo.svg");
        let validity = |w, h| ImageValidity {
            mtime: t(1),
            viewport_w: w,
            viewport_h: h,
        };
        cache.put(
            path.clone(),
            ImageTarget::Overlay,
            RenderedImage::Blocks(Vec::new()),
            validity(80, 24),
        );
        assert!(cache.get(&path, ImageTarget::Overlay, &validity(82, 25)).is_some());
        assert!(cache.get(&path, ImageTarget::Overlay, &validity(90, 30)).is_none());
        assert!(cache.get(&path, ImageTarget::Pane, &validity(80, 24)).is_none());
    }
}
