//! Decoded-image cache
//!
//! Process-wide, keyed by absolute path and bounded by total byte size with
//! least-recently-used eviction. Entries are filled lazily on first access; a
//! miss is never fatal, callers re-decode.

use lru::LruCache;
use patlabel_common::{Error, Record, Result};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, warn};

/// Decoded pixel data (or whatever the decoder produces)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedImage {
    pub path: PathBuf,
    pub bytes: Vec<u8>,
}

impl DecodedImage {
    pub fn size(&self) -> usize {
        self.bytes.len()
    }
}

/// Turns an image file into a [`DecodedImage`]
pub trait ImageDecoder {
    fn decode(&self, path: &Path) -> Result<DecodedImage>;
}

/// Loads the raw file bytes
#[derive(Debug, Clone, Copy, Default)]
pub struct FileBytesDecoder;

impl ImageDecoder for FileBytesDecoder {
    fn decode(&self, path: &Path) -> Result<DecodedImage> {
        Ok(DecodedImage {
            path: path.to_path_buf(),
            bytes: std::fs::read(path)?,
        })
    }
}

struct CacheInner {
    entries: LruCache<PathBuf, Arc<DecodedImage>>,
    used: usize,
}

/// Byte-bounded LRU cache shared across threads
pub struct ImageCache {
    inner: Mutex<CacheInner>,
    capacity: usize,
}

impl ImageCache {
    /// Cache holding at most `capacity` bytes
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(CacheInner {
                entries: LruCache::unbounded(),
                used: 0,
            }),
            capacity,
        }
    }

    /// Cache sized from a KiB figure (the config unit)
    pub fn with_capacity_kib(kib: u64) -> Self {
        let bytes = usize::try_from(kib.saturating_mul(1024)).unwrap_or(usize::MAX);
        Self::new(bytes)
    }

    fn lock(&self) -> MutexGuard<'_, CacheInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Bytes currently held
    pub fn used(&self) -> usize {
        self.lock().used
    }

    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, path: &Path) -> bool {
        self.lock().entries.contains(path)
    }

    /// Cached image, marking it most recently used
    pub fn get(&self, path: &Path) -> Result<Arc<DecodedImage>> {
        self.lock()
            .entries
            .get(path)
            .cloned()
            .ok_or_else(|| Error::CacheMiss(path.to_path_buf()))
    }

    /// Insert an image, evicting least recently used entries to fit
    ///
    /// An image larger than the whole cache is returned but not stored.
    pub fn insert(&self, image: DecodedImage) -> Arc<DecodedImage> {
        let image = Arc::new(image);
        let size = image.size();
        if size > self.capacity {
            debug!(
                "{} ({} bytes) exceeds cache capacity, not cached",
                image.path.display(),
                size
            );
            return image;
        }

        let mut inner = self.lock();
        if let Some(old) = inner.entries.pop(&image.path) {
            inner.used -= old.size();
        }
        while inner.used + size > self.capacity {
            match inner.entries.pop_lru() {
                Some((path, evicted)) => {
                    inner.used -= evicted.size();
                    debug!("Evicted {} from image cache", path.display());
                }
                None => break,
            }
        }
        inner.used += size;
        inner.entries.put(image.path.clone(), Arc::clone(&image));
        image
    }

    /// Cached image, decoding and caching it on a miss
    pub fn get_or_decode(&self, path: &Path, decoder: &dyn ImageDecoder) -> Result<Arc<DecodedImage>> {
        match self.get(path) {
            Ok(image) => Ok(image),
            Err(Error::CacheMiss(_)) => Ok(self.insert(decoder.decode(path)?)),
            Err(e) => Err(e),
        }
    }

    /// First image of `record`, from `start` on, that can be decoded
    ///
    /// Images that fail to decode are skipped with a warning.
    pub fn first_decodable(
        &self,
        record: &Record,
        start: usize,
        decoder: &dyn ImageDecoder,
    ) -> Option<(usize, Arc<DecodedImage>)> {
        record
            .images
            .iter()
            .enumerate()
            .skip(start)
            .find_map(|(index, path)| match self.get_or_decode(path, decoder) {
                Ok(image) => Some((index, image)),
                Err(e) => {
                    warn!("Skipping image {}: {}", path.display(), e);
                    None
                }
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use patlabel_common::TypeRegistry;
    use std::cell::Cell;

    /// Decoder producing `n` bytes per path, counting calls
    struct FixedDecoder {
        size: usize,
        calls: Cell<usize>,
    }

    impl ImageDecoder for FixedDecoder {
        fn decode(&self, path: &Path) -> Result<DecodedImage> {
            self.calls.set(self.calls.get() + 1);
            if path.extension().is_some_and(|e| e == "bad") {
                return Err(Error::InvalidInput("corrupt image".to_string()));
            }
            Ok(DecodedImage {
                path: path.to_path_buf(),
                bytes: vec![0; self.size],
            })
        }
    }

    fn decoder(size: usize) -> FixedDecoder {
        FixedDecoder {
            size,
            calls: Cell::new(0),
        }
    }

    #[test]
    fn test_miss_then_hit() {
        let cache = ImageCache::new(100);
        let dec = decoder(10);
        let path = Path::new("/img/a.jpg");

        assert!(matches!(cache.get(path), Err(Error::CacheMiss(_))));
        cache.get_or_decode(path, &dec).unwrap();
        cache.get_or_decode(path, &dec).unwrap();
        assert_eq!(dec.calls.get(), 1);
        assert_eq!(cache.used(), 10);
    }

    #[test]
    fn test_evicts_least_recently_used() {
        let cache = ImageCache::new(30);
        let dec = decoder(10);
        let (a, b, c, d) = (
            Path::new("/a.jpg"),
            Path::new("/b.jpg"),
            Path::new("/c.jpg"),
            Path::new("/d.jpg"),
        );
        for p in [a, b, c] {
            cache.get_or_decode(p, &dec).unwrap();
        }
        // touch a so b becomes the oldest
        cache.get(a).unwrap();
        cache.get_or_decode(d, &dec).unwrap();

        assert!(cache.contains(a));
        assert!(!cache.contains(b));
        assert!(cache.contains(c));
        assert!(cache.contains(d));
        assert_eq!(cache.used(), 30);
    }

    #[test]
    fn test_oversized_image_not_cached() {
        let cache = ImageCache::new(5);
        let image = cache.get_or_decode(Path::new("/big.jpg"), &decoder(10)).unwrap();
        assert_eq!(image.size(), 10);
        assert!(cache.is_empty());
        assert_eq!(cache.used(), 0);
    }

    #[test]
    fn test_first_decodable_skips_failures() {
        let reg = TypeRegistry::from_types([("color", vec!["unknown"])]).unwrap();
        let mut record = Record::new(&reg, "img001");
        record.images = vec![
            PathBuf::from("/img001/front.bad"),
            PathBuf::from("/img001/back.jpg"),
            PathBuf::from("/img001/side.jpg"),
        ];
        let cache = ImageCache::new(100);
        let dec = decoder(4);

        let (index, image) = cache.first_decodable(&record, 0, &dec).unwrap();
        assert_eq!(index, 1);
        assert_eq!(image.path, PathBuf::from("/img001/back.jpg"));

        let (index, _) = cache.first_decodable(&record, 2, &dec).unwrap();
        assert_eq!(index, 2);
        assert!(cache.first_decodable(&record, 3, &dec).is_none());
    }
}
