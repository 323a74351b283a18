//! Track Resource Loader: fetches a track's bytes and decodes them into PCM
//! at the playback engine's native rate, memoized by URL.

mod fetch;

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use quartet_decode::{DecodeError, decode_bytes, extension_hint};
use quartet_transport::AudioArc;
use tokio::sync::OnceCell;

pub use fetch::{FetchError, Fetcher, FileFetcher, HttpFetcher, SchemeFetcher};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LoadError {
    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Decode(#[from] DecodeError),
}

/// Settlement status of one track slot.
#[derive(Debug, Clone)]
pub enum TrackLoad {
    /// No location assigned; never loading, never an error.
    Absent,
    Loading,
    Ready(AudioArc),
    Failed(LoadError),
}

impl TrackLoad {
    pub fn is_settled(&self) -> bool {
        !matches!(self, TrackLoad::Loading)
    }

    pub fn audio(&self) -> Option<&AudioArc> {
        match self {
            TrackLoad::Ready(audio) => Some(audio),
            _ => None,
        }
    }
}

type LoadResult = Result<AudioArc, LoadError>;
type Slot = Arc<OnceCell<LoadResult>>;

pub struct TrackLoader<F> {
    fetcher: F,
    sample_rate: u32,
    memo: Mutex<HashMap<String, Slot>>,
}

impl<F: Fetcher> TrackLoader<F> {
    /// `sample_rate` is the rate every decoded track is converted to.
    pub fn new(fetcher: F, sample_rate: u32) -> Self {
        Self {
            fetcher,
            sample_rate,
            memo: Mutex::new(HashMap::new()),
        }
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Load the track at `url`.
    ///
    /// Concurrent and repeated calls for the same URL share one fetch. Failed
    /// loads are handed to every waiter of that attempt and then forgotten, so
    /// the next call for the URL starts a fresh attempt.
    pub async fn load(&self, url: Option<&str>) -> TrackLoad {
        let Some(url) = url.filter(|u| !u.is_empty()) else {
            return TrackLoad::Absent;
        };

        let slot = self.slot(url);
        let result = slot
            .get_or_init(|| self.fetch_and_decode(url))
            .await
            .clone();

        match result {
            Ok(audio) => TrackLoad::Ready(audio),
            Err(err) => {
                self.forget(url, &slot);
                log::warn!("track '{url}' failed to load: {err}");
                TrackLoad::Failed(err)
            }
        }
    }

    /// Whether a successful result for `url` is already memoized.
    pub fn is_cached(&self, url: &str) -> bool {
        self.lock_memo()
            .get(url)
            .and_then(|slot| slot.get())
            .is_some_and(Result::is_ok)
    }

    fn slot(&self, url: &str) -> Slot {
        self.lock_memo()
            .entry(url.to_string())
            .or_insert_with(|| Arc::new(OnceCell::new()))
            .clone()
    }

    fn forget(&self, url: &str, slot: &Slot) {
        let mut memo = self.lock_memo();
        if memo.get(url).is_some_and(|current| Arc::ptr_eq(current, slot)) {
            memo.remove(url);
        }
    }

    fn lock_memo(&self) -> std::sync::MutexGuard<'_, HashMap<String, Slot>> {
        // The map holds no invariants a panicking holder could break.
        self.memo.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    async fn fetch_and_decode(&self, url: &str) -> LoadResult {
        log::debug!("fetching track '{url}'");
        let bytes = self.fetcher.fetch(url).await?;

        let hint = extension_hint(url).map(str::to_string);
        let sample_rate = self.sample_rate;
        let decoded = tokio::task::spawn_blocking(move || {
            let audio = decode_bytes(bytes, hint.as_deref())?;
            audio
                .resample(sample_rate)
                .map_err(|e| DecodeError::Codec(format!("resampling failed: {e}")))
        })
        .await
        .map_err(|e| DecodeError::Codec(format!("decode task failed: {e}")))??;

        log::debug!("track '{url}' ready: {decoded:?}");
        Ok(decoded)
    }
}
