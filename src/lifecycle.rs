//! Voice lifecycle — the set of registered voices shared with the render path.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};

use tracing::{trace, warn};

use crate::dsp::voice::{VoiceGraph, VoiceId};

/// Registry handle shared between the scheduler and the render path.
pub type SharedRegistry = Arc<Mutex<VoiceRegistry>>;

/// Active voices, keyed by id in creation order.
///
/// Only the scheduler adds and removes entries; the render path reads
/// snapshots.
#[derive(Debug, Default)]
pub struct VoiceRegistry {
    voices: BTreeMap<VoiceId, Arc<VoiceGraph>>,
    next_id: VoiceId,
    created: u64,
}

impl VoiceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shared() -> SharedRegistry {
        Arc::new(Mutex::new(Self::new()))
    }

    /// Reserve the id for the next voice.
    pub fn next_id(&mut self) -> VoiceId {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    pub fn register(&mut self, graph: VoiceGraph) -> Arc<VoiceGraph> {
        let graph = Arc::new(graph);
        self.voices.insert(graph.id, graph.clone());
        self.created += 1;
        graph
    }

    /// Release every voice whose stop time plus tail has passed.
    pub fn reclaim(&mut self, now: f64) -> usize {
        let before = self.voices.len();
        self.voices.retain(|id, v| {
            let keep = !v.is_expired(now);
            if !keep {
                trace!(voice = id, "voice reclaimed");
            }
            keep
        });
        before - self.voices.len()
    }

    /// Release all voices immediately.
    pub fn clear(&mut self) -> usize {
        let n = self.voices.len();
        self.voices.clear();
        n
    }

    pub fn len(&self) -> usize {
        self.voices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.voices.is_empty()
    }

    /// Total voices ever registered.
    pub fn created(&self) -> u64 {
        self.created
    }

    pub fn get(&self, id: VoiceId) -> Option<&Arc<VoiceGraph>> {
        self.voices.get(&id)
    }

    pub fn snapshot(&self) -> Vec<Arc<VoiceGraph>> {
        self.voices.values().cloned().collect()
    }
}

/// Lock a mutex, recovering the data if a previous holder panicked.
pub(crate) fn lock_or_recover<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => {
            warn!("mutex poisoned; continuing with inner state");
            poisoned.into_inner()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dsp::envelope::EnvelopeShape;
    use crate::dsp::filter::FilterSettings;
    use crate::dsp::oscillator::Waveform;
    use crate::dsp::voice::{SendLevels, VoiceAssembler, VoiceRole};
    use crate::pitch::Pitch;
    use crate::sequencer::NoteRequest;

    fn register(reg: &mut VoiceRegistry, start: f64, duration: f64, tail: f64) -> VoiceId {
        let assembler = VoiceAssembler::new(SendLevels::default(), Some(tail));
        let note = NoteRequest {
            role: VoiceRole::Bass,
            pitch: Pitch(43),
            waveform: Waveform::Sine,
            start,
            duration,
            level: 0.06,
            shape: EnvelopeShape::default(),
            filter: FilterSettings::RHYTHM,
        };
        let id = reg.next_id();
        reg.register(assembler.assemble(id, &note).unwrap());
        id
    }

    #[test]
    fn ids_are_unique_and_increasing() {
        let mut reg = VoiceRegistry::new();
        let a = register(&mut reg, 0.0, 1.0, 0.0);
        let b = register(&mut reg, 0.0, 1.0, 0.0);
        assert!(b > a);
        assert_eq!(reg.len(), 2);
        assert_eq!(reg.created(), 2);
    }

    #[test]
    fn reclaims_after_stop_plus_tail() {
        let mut reg = VoiceRegistry::new();
        let short = register(&mut reg, 0.0, 0.4, 2.0);
        let long = register(&mut reg, 0.0, 6.0, 2.0);

        assert_eq!(reg.reclaim(2.0), 0);
        assert_eq!(reg.reclaim(2.5), 1);
        assert!(reg.get(short).is_none());
        assert!(reg.get(long).is_some());
        assert_eq!(reg.reclaim(8.0), 1);
        assert!(reg.is_empty());
        assert_eq!(reg.created(), 2);
    }

    #[test]
    fn clear_releases_everything() {
        let mut reg = VoiceRegistry::new();
        for i in 0..5 {
            register(&mut reg, i as f64, 6.0, 5.0);
        }
        assert_eq!(reg.clear(), 5);
        assert!(reg.snapshot().is_empty());
        assert_eq!(reg.clear(), 0);
    }
}
