use std::sync::Arc;
use std::sync::mpsc as std_mpsc;

use quartet_loader::{Fetcher, TrackLoad, TrackLoader};
use quartet_transport::{Output, Part};
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::coordinator::Coordinator;
use crate::track::TrackState;

/// A change of a part's playing flag, for the presentation layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PartUpdate {
    pub part: Part,
    pub playing: bool,
}

struct Settled {
    generation: u64,
    slot: usize,
    load: TrackLoad,
}

/// Keeps a [`Coordinator`] in step with a set of track locations.
///
/// When the locations change, the current coordinator is stopped and discarded
/// before a new one is built. When a single track finishes loading only that
/// part's state is swapped, so parts already sounding keep playing. Dropping
/// the session aborts pending loads and stops every sounding instance.
pub struct PlayerSession<F: Fetcher, O: Output> {
    loader: Arc<TrackLoader<F>>,
    output: O,
    runtime: Handle,
    urls: Vec<Option<String>>,
    loads: Vec<TrackLoad>,
    generation: u64,
    tasks: Vec<JoinHandle<()>>,
    settled_tx: mpsc::UnboundedSender<Settled>,
    settled_rx: mpsc::UnboundedReceiver<Settled>,
    updates_tx: std_mpsc::Sender<PartUpdate>,
    updates_rx: std_mpsc::Receiver<PartUpdate>,
    coordinator: Option<Coordinator<O>>,
    group_started: bool,
}

impl<F: Fetcher, O: Output> PlayerSession<F, O> {
    pub fn new(loader: Arc<TrackLoader<F>>, output: O, runtime: Handle) -> Self {
        let (settled_tx, settled_rx) = mpsc::unbounded_channel();
        let (updates_tx, updates_rx) = std_mpsc::channel();
        Self {
            loader,
            output,
            runtime,
            urls: Vec::new(),
            loads: Vec::new(),
            generation: 0,
            tasks: Vec::new(),
            settled_tx,
            settled_rx,
            updates_tx,
            updates_rx,
            coordinator: None,
            group_started: false,
        }
    }

    /// Supply the track locations, one per real part in part order. A `None`,
    /// empty or missing entry leaves that part without audio. Supplying the same
    /// list again is a no-op; use [`PlayerSession::reload`] to force a rebuild.
    pub fn set_tracks(&mut self, mut urls: Vec<Option<String>>) {
        if urls.len() > Part::REAL.len() {
            log::warn!("ignoring {} track(s) beyond the four parts", urls.len() - Part::REAL.len());
            urls.truncate(Part::REAL.len());
        }
        urls.resize(Part::REAL.len(), None);
        for url in &mut urls {
            if url.as_deref().is_some_and(str::is_empty) {
                *url = None;
            }
        }

        if urls == self.urls && self.coordinator.is_some() {
            return;
        }
        self.urls = urls;
        self.restart();
    }

    /// Rebuild from the current locations, retrying any that failed.
    pub fn reload(&mut self) {
        self.restart();
    }

    fn restart(&mut self) {
        self.teardown();
        self.generation += 1;
        self.group_started = false;

        self.loads = self
            .urls
            .iter()
            .map(|url| match url {
                Some(_) => TrackLoad::Loading,
                None => TrackLoad::Absent,
            })
            .collect();

        for (slot, url) in self.urls.iter().enumerate() {
            let Some(url) = url.clone() else { continue };
            let loader = self.loader.clone();
            let tx = self.settled_tx.clone();
            let generation = self.generation;
            self.tasks.push(self.runtime.spawn(async move {
                let load = loader.load(Some(&url)).await;
                let _ = tx.send(Settled {
                    generation,
                    slot,
                    load,
                });
            }));
        }

        log::debug!(
            "track set {} supplied, {} load(s) pending",
            self.generation,
            self.tasks.len()
        );
        self.rebuild();
    }

    fn teardown(&mut self) {
        for task in self.tasks.drain(..) {
            task.abort();
        }
        // the old coordinator releases its instances before a new one exists
        drop(self.coordinator.take());
    }

    fn rebuild(&mut self) {
        let states = Part::REAL
            .iter()
            .zip(&self.loads)
            .map(|(&part, load)| self.state_for(part, load))
            .chain(std::iter::once(
                TrackState::aggregate().with_updates(self.update_sink()),
            ))
            .collect();

        self.coordinator = Some(Coordinator::new(states, self.output.clone()));
    }

    fn state_for(&self, part: Part, load: &TrackLoad) -> TrackState<O> {
        TrackState::new(part, load.audio().cloned(), !load.is_settled())
            .with_updates(self.update_sink())
    }

    fn update_sink(&self) -> crate::track::UpdateFn {
        let tx = self.updates_tx.clone();
        Box::new(move |part, playing| {
            let _ = tx.send(PartUpdate { part, playing });
        })
    }

    /// Apply finished loads and natural track ends. Call regularly.
    pub fn poll(&mut self) {
        while let Ok(settled) = self.settled_rx.try_recv() {
            if settled.generation != self.generation {
                continue;
            }
            let Some(&part) = Part::REAL.get(settled.slot) else {
                continue;
            };
            log::debug!("{part} settled");
            let state = self.state_for(part, &settled.load);
            if let Some(load) = self.loads.get_mut(settled.slot) {
                *load = settled.load;
            }
            if let Some(coordinator) = self.coordinator.as_mut() {
                coordinator.replace(state);
            }
        }

        if let Some(coordinator) = self.coordinator.as_mut() {
            coordinator.poll();
        }
    }

    pub fn is_playing(&self, part: Part) -> bool {
        self.coordinator.as_ref().is_some_and(|c| c.is_playing(part))
    }

    pub fn is_load_ended(&self, part: Part) -> bool {
        self.coordinator.as_ref().is_some_and(|c| c.is_load_ended(part))
    }

    pub fn has_audio(&self, part: Part) -> bool {
        self.coordinator.as_ref().is_some_and(|c| c.has_audio(part))
    }

    pub fn all_loaded(&self) -> bool {
        self.coordinator.as_ref().is_some_and(Coordinator::all_loaded)
    }

    pub fn toggle_play_pause(&mut self, part: Part) {
        if let Some(coordinator) = self.coordinator.as_mut() {
            coordinator.toggle_play_pause(part);
            self.group_started |= coordinator.is_playing_all();
        }
    }

    pub fn toggle_play_pause_all(&mut self) {
        if let Some(coordinator) = self.coordinator.as_mut() {
            coordinator.toggle_play_pause_all();
            self.group_started |= coordinator.is_playing_all();
        }
    }

    /// Whether the whole group has played at least once since the tracks were
    /// last supplied.
    pub fn group_started(&self) -> bool {
        self.group_started
    }

    /// Load status of a slot, in part order.
    pub fn load(&self, part: Part) -> Option<&TrackLoad> {
        self.loads.get(part.index())
    }

    pub fn coordinator(&self) -> Option<&Coordinator<O>> {
        self.coordinator.as_ref()
    }

    /// Playing-state changes since the last call.
    pub fn updates(&self) -> Vec<PartUpdate> {
        self.updates_rx.try_iter().collect()
    }
}

impl<F: Fetcher, O: Output> Drop for PlayerSession<F, O> {
    fn drop(&mut self) {
        self.teardown();
    }
}
