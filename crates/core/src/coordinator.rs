//! Arbitration of which parts sound together.
//!
//! Outside of "all" mode at most one real part plays at a time. Toggling the
//! aggregate starts every real part in phase: the first real part that actually
//! starts an instance becomes the phase reference and its start time is kept
//! as the group offset, so parts re-joining later seek to `now - offset`.

use quartet_transport::{InstanceId, Output, Part};

use crate::track::{StartMode, TrackState};

pub struct Coordinator<O: Output> {
    states: Vec<TrackState<O>>,
    output: O,
    offset: Option<f64>,
}

impl<O: Output> Coordinator<O> {
    /// Takes ownership of the per-part states. An aggregate state is added
    /// when the list has none.
    pub fn new(mut states: Vec<TrackState<O>>, output: O) -> Self {
        states.sort_by_key(TrackState::part);
        states.dedup_by_key(|s| s.part());
        if !states.iter().any(|s| s.part().is_aggregate()) {
            states.push(TrackState::aggregate());
        }

        Self {
            states,
            output,
            offset: None,
        }
    }

    fn state(&self, part: Part) -> Option<&TrackState<O>> {
        self.states.iter().find(|s| s.part() == part)
    }

    pub fn is_playing(&self, part: Part) -> bool {
        self.state(part).is_some_and(TrackState::is_playing)
    }

    pub fn is_playing_all(&self) -> bool {
        self.is_playing(Part::All)
    }

    pub fn is_load_ended(&self, part: Part) -> bool {
        if part.is_aggregate() {
            return true;
        }
        self.state(part).is_some_and(TrackState::is_load_ended)
    }

    pub fn has_audio(&self, part: Part) -> bool {
        self.state(part).is_some_and(TrackState::has_audio)
    }

    /// True once every real part present has settled.
    pub fn all_loaded(&self) -> bool {
        let mut real = self.states.iter().filter(|s| !s.part().is_aggregate()).peekable();
        real.peek().is_some() && real.all(TrackState::is_load_ended)
    }

    /// Clock time the current group started at, if one is running.
    pub fn offset(&self) -> Option<f64> {
        self.offset
    }

    pub fn instance(&self, part: Part) -> Option<InstanceId> {
        self.state(part).and_then(TrackState::instance)
    }

    /// Swap in a new state for its part, as when the part's track finished
    /// loading. Only the replaced part is stopped; every other part keeps
    /// sounding and the group offset is kept.
    pub fn replace(&mut self, state: TrackState<O>) {
        let part = state.part();
        match self.states.iter_mut().find(|s| s.part() == part) {
            Some(current) => {
                if current.is_playing() {
                    current.set_playing(false, StartMode::Solo, &self.output);
                }
                *current = state;
            }
            None => {
                self.states.push(state);
                self.states.sort_by_key(TrackState::part);
            }
        }
    }

    /// Flip a single part. Toggling the aggregate is the same as
    /// [`Coordinator::toggle_play_pause_all`].
    pub fn toggle_play_pause(&mut self, part: Part) {
        if part.is_aggregate() {
            self.toggle_play_pause_all();
            return;
        }

        let play = !self.is_playing(part);

        if self.is_playing_all() {
            let others_sounding = self
                .states
                .iter()
                .any(|s| s.part() != part && s.has_audio() && s.is_playing());

            if !play && !others_sounding {
                log::debug!("{part} was the last sounding part, ending group");
                self.toggle_play_pause_all();
            } else if let Some(state) = self.states.iter_mut().find(|s| s.part() == part) {
                state.set_playing(play, StartMode::Follow(self.offset), &self.output);
            }
        } else {
            for state in &mut self.states {
                if state.part() == part {
                    state.set_playing(play, StartMode::Solo, &self.output);
                } else if !state.part().is_aggregate() {
                    state.set_playing(false, StartMode::Solo, &self.output);
                }
            }
        }
    }

    /// Start every part in phase, or stop everything if the group is playing.
    pub fn toggle_play_pause_all(&mut self) {
        let play = !self.is_playing_all();
        self.offset = None;

        if !play {
            log::debug!("stopping group");
            for state in &mut self.states {
                state.set_playing(false, StartMode::Solo, &self.output);
            }
            return;
        }

        let mut offset = None;
        for state in &mut self.states {
            if !state.part().is_aggregate() && offset.is_none() {
                offset = state.set_playing(true, StartMode::Lead, &self.output);
            } else {
                state.set_playing(true, StartMode::Follow(offset), &self.output);
            }
        }
        log::debug!("group started, offset {offset:?}");
        self.offset = offset;
    }

    /// Apply natural-completion notifications from the output. Returns how many
    /// belonged to a live instance of this coordinator.
    pub fn poll(&mut self) -> usize {
        let mut handled = 0;
        for id in self.output.drain_ended() {
            let ended = self
                .states
                .iter_mut()
                .find_map(|s| s.finish(id).then(|| s.part()));
            match ended {
                Some(part) => {
                    handled += 1;
                    self.on_ended(part);
                }
                None => log::trace!("ignoring end of superseded {id:?}"),
            }
        }
        handled
    }

    fn on_ended(&mut self, part: Part) {
        log::debug!("{part} reached its end");
        if self.is_playing_all() {
            let others_sounding = self
                .states
                .iter()
                .any(|s| !s.part().is_aggregate() && s.part() != part && s.has_audio() && s.is_playing());
            if !others_sounding {
                self.toggle_play_pause_all();
                return;
            }
        }

        if let Some(state) = self.states.iter_mut().find(|s| s.part() == part) {
            state.set_playing(false, StartMode::Solo, &self.output);
        }
    }

    /// Stop every part and release every sounding instance.
    pub fn stop_all(&mut self) {
        self.offset = None;
        for state in &mut self.states {
            state.set_playing(false, StartMode::Solo, &self.output);
        }
    }
}

impl<O: Output> Drop for Coordinator<O> {
    fn drop(&mut self) {
        self.stop_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{Event, FakeOutput, audio_secs};

    const ALL_AUDIO: [bool; 4] = [true; 4];

    fn coordinator(with_audio: [bool; 4], output: &FakeOutput) -> Coordinator<FakeOutput> {
        let states = Part::REAL
            .iter()
            .zip(with_audio)
            .map(|(&part, has)| TrackState::new(part, has.then(|| audio_secs(60.0)), false))
            .chain(std::iter::once(TrackState::aggregate()))
            .collect();
        Coordinator::new(states, output.clone())
    }

    fn playing(c: &Coordinator<FakeOutput>) -> Vec<Part> {
        Part::REAL.into_iter().filter(|&p| c.is_playing(p)).collect()
    }

    #[test]
    fn test_all_starts_every_part() {
        let output = FakeOutput::new();
        let mut c = coordinator(ALL_AUDIO, &output);

        c.toggle_play_pause_all();

        assert_eq!(playing(&c), Part::REAL.to_vec());
        assert!(c.is_playing_all());
        assert_eq!(output.live().len(), 4);
    }

    #[test]
    fn test_toggle_one_part_out_of_group() {
        let output = FakeOutput::new();
        let mut c = coordinator(ALL_AUDIO, &output);
        c.toggle_play_pause_all();
        let drum = c.instance(Part::Drum).unwrap();

        c.toggle_play_pause(Part::Drum);

        assert!(!c.is_playing(Part::Drum));
        assert_eq!(playing(&c), vec![Part::Bass, Part::Guitar, Part::Melody]);
        assert!(c.is_playing_all());
        assert!(output.events().contains(&Event::Stop(drum)));
    }

    #[test]
    fn test_removing_last_member_ends_group() {
        let output = FakeOutput::new();
        let mut c = coordinator(ALL_AUDIO, &output);
        c.toggle_play_pause_all();

        for part in Part::REAL {
            assert!(c.is_playing_all(), "group ended before {part} was removed");
            c.toggle_play_pause(part);
        }

        assert!(!c.is_playing_all());
        assert!(playing(&c).is_empty());
        assert!(output.live().is_empty());
        assert_eq!(c.offset(), None);
    }

    #[test]
    fn test_replace_leaves_other_parts_sounding() {
        let output = FakeOutput::new();
        let mut c = coordinator([true, false, false, false], &output);
        c.toggle_play_pause_all();
        let drum = c.instance(Part::Drum).unwrap();

        c.replace(TrackState::new(Part::Bass, Some(audio_secs(60.0)), false));

        assert_eq!(c.instance(Part::Drum), Some(drum));
        assert_eq!(output.live(), vec![drum]);
        assert!(c.is_playing_all());
        assert!(!c.is_playing(Part::Bass));
        assert!(c.has_audio(Part::Bass));
        assert_eq!(c.offset(), Some(0.0));
    }

    #[test]
    fn test_replace_stops_only_the_replaced_part() {
        let output = FakeOutput::new();
        let mut c = coordinator(ALL_AUDIO, &output);
        c.toggle_play_pause_all();
        let bass = c.instance(Part::Bass).unwrap();

        c.replace(TrackState::new(Part::Bass, Some(audio_secs(30.0)), false));

        assert!(output.events().contains(&Event::Stop(bass)));
        assert_eq!(output.live().len(), 3);
        assert_eq!(playing(&c), vec![Part::Drum, Part::Guitar, Part::Melody]);
    }

    #[test]
    fn test_refused_start_does_not_keep_group_alive() {
        let output = FakeOutput::new();
        let mut c = coordinator(ALL_AUDIO, &output);
        c.toggle_play_pause_all();

        c.toggle_play_pause(Part::Drum);
        output.refuse_starts(true);
        c.toggle_play_pause(Part::Drum);
        assert!(!c.is_playing(Part::Drum));
        assert_eq!(c.instance(Part::Drum), None);

        c.toggle_play_pause(Part::Bass);
        c.toggle_play_pause(Part::Guitar);
        c.toggle_play_pause(Part::Melody);

        assert!(!c.is_playing_all());
        assert!(output.live().is_empty());
    }

    #[test]
    fn test_single_loaded_part_plays_unsynchronized() {
        let output = FakeOutput::new();
        output.set_now(8.0);
        let mut c = coordinator([false, false, true, false], &output);

        c.toggle_play_pause(Part::Guitar);

        assert!(c.is_playing(Part::Guitar));
        assert!(!c.is_playing_all());
        assert_eq!(output.position_of(c.instance(Part::Guitar).unwrap()), Some(0.0));
        assert_eq!(c.offset(), None);

        c.toggle_play_pause(Part::Guitar);
        assert!(!c.is_playing(Part::Guitar));
        assert!(!c.is_playing_all());
    }

    #[test]
    fn test_at_most_one_part_outside_group() {
        let output = FakeOutput::new();
        let mut c = coordinator(ALL_AUDIO, &output);
        let sequence = [
            Part::Drum,
            Part::Bass,
            Part::Bass,
            Part::Melody,
            Part::Guitar,
            Part::Drum,
            Part::Drum,
        ];

        for part in sequence {
            c.toggle_play_pause(part);
            assert!(playing(&c).len() <= 1, "after toggling {part}: {:?}", playing(&c));
            assert!(output.live().len() <= 1);
        }
    }

    #[test]
    fn test_rejoin_seeks_to_group_position() {
        let output = FakeOutput::new();
        output.set_now(10.0);
        let mut c = coordinator(ALL_AUDIO, &output);
        c.toggle_play_pause_all();
        assert_eq!(c.offset(), Some(10.0));

        output.advance(3.0);
        c.toggle_play_pause(Part::Bass);
        output.advance(2.0);
        c.toggle_play_pause(Part::Bass);

        let bass = c.instance(Part::Bass).unwrap();
        assert_eq!(output.position_of(bass), Some(5.0));
        assert!(c.is_playing(Part::Bass));
    }

    #[test]
    fn test_group_members_start_in_phase() {
        let output = FakeOutput::new();
        output.set_now(2.0);
        let mut c = coordinator(ALL_AUDIO, &output);

        c.toggle_play_pause_all();

        for part in Part::REAL {
            let id = c.instance(part).unwrap();
            assert_eq!(output.position_of(id), Some(0.0), "{part}");
        }
    }

    #[test]
    fn test_removing_last_sounding_part_ignores_silent_parts() {
        let output = FakeOutput::new();
        let mut c = coordinator([true, true, false, false], &output);
        c.toggle_play_pause_all();
        assert!(c.is_playing(Part::Guitar));

        c.toggle_play_pause(Part::Drum);
        assert!(c.is_playing_all());
        c.toggle_play_pause(Part::Bass);

        assert!(!c.is_playing_all());
        assert!(playing(&c).is_empty());
    }

    #[test]
    fn test_natural_end_of_last_member_ends_group() {
        let output = FakeOutput::new();
        let mut c = coordinator(ALL_AUDIO, &output);
        c.toggle_play_pause_all();
        c.toggle_play_pause(Part::Drum);
        c.toggle_play_pause(Part::Bass);

        output.end_naturally(c.instance(Part::Guitar).unwrap());
        assert_eq!(c.poll(), 1);
        assert!(!c.is_playing(Part::Guitar));
        assert!(c.is_playing(Part::Melody));
        assert!(c.is_playing_all());

        output.end_naturally(c.instance(Part::Melody).unwrap());
        assert_eq!(c.poll(), 1);
        assert!(!c.is_playing_all());
        assert!(playing(&c).is_empty());
    }

    #[test]
    fn test_natural_end_outside_group() {
        let output = FakeOutput::new();
        let mut c = coordinator(ALL_AUDIO, &output);
        c.toggle_play_pause(Part::Melody);
        let id = c.instance(Part::Melody).unwrap();

        output.end_naturally(id);
        c.poll();

        assert!(!c.is_playing(Part::Melody));
        assert!(!output.events().contains(&Event::Stop(id)));
    }

    #[test]
    fn test_end_of_superseded_instance_is_ignored() {
        let output = FakeOutput::new();
        let mut c = coordinator(ALL_AUDIO, &output);
        c.toggle_play_pause(Part::Drum);
        let solo = c.instance(Part::Drum).unwrap();

        c.toggle_play_pause_all();
        output.push_ended(solo);

        assert_eq!(c.poll(), 0);
        assert!(c.is_playing(Part::Drum));
        assert!(c.is_playing_all());
    }

    #[test]
    fn test_missing_audio_does_not_shift_offset() {
        let output = FakeOutput::new();
        output.set_now(7.0);
        let mut c = coordinator([false, true, true, false], &output);

        c.toggle_play_pause_all();

        assert_eq!(c.offset(), Some(7.0));
        assert!(c.is_playing(Part::Drum));
        assert_eq!(c.instance(Part::Drum), None);
        assert_eq!(output.position_of(c.instance(Part::Guitar).unwrap()), Some(0.0));

        output.advance(1.5);
        c.toggle_play_pause(Part::Guitar);
        c.toggle_play_pause(Part::Guitar);
        assert_eq!(output.position_of(c.instance(Part::Guitar).unwrap()), Some(1.5));
    }

    #[test]
    fn test_group_without_any_audio() {
        let output = FakeOutput::new();
        let mut c = coordinator([false; 4], &output);

        c.toggle_play_pause_all();
        assert!(c.is_playing_all());
        assert_eq!(c.offset(), None);
        assert!(output.events().is_empty());

        c.toggle_play_pause_all();
        assert!(!c.is_playing_all());
    }

    #[test]
    fn test_all_restarts_a_solo_part_in_phase() {
        let output = FakeOutput::new();
        let mut c = coordinator(ALL_AUDIO, &output);
        c.toggle_play_pause(Part::Guitar);
        let solo = c.instance(Part::Guitar).unwrap();

        output.advance(4.0);
        c.toggle_play_pause_all();

        let grouped = c.instance(Part::Guitar).unwrap();
        assert_ne!(solo, grouped);
        assert_eq!(output.position_of(grouped), Some(0.0));
        assert!(!output.live().contains(&solo));
    }

    #[test]
    fn test_load_queries() {
        let output = FakeOutput::new();
        let states = vec![
            TrackState::new(Part::Drum, Some(audio_secs(1.0)), false),
            TrackState::new(Part::Bass, None, true),
        ];
        let c = Coordinator::new(states, output);

        assert!(c.is_load_ended(Part::Drum));
        assert!(!c.is_load_ended(Part::Bass));
        assert!(!c.is_load_ended(Part::Guitar));
        assert!(c.is_load_ended(Part::All));
        assert!(!c.all_loaded());
        assert!(c.has_audio(Part::Drum));
        assert!(!c.is_playing(Part::Melody));
    }

    #[test]
    fn test_drop_stops_everything() {
        let output = FakeOutput::new();
        let mut c = coordinator(ALL_AUDIO, &output);
        c.toggle_play_pause_all();
        assert_eq!(output.live().len(), 4);

        drop(c);

        assert!(output.live().is_empty());
    }
}
