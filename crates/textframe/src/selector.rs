use textframe_hash::Fingerprint;
use textframe_types::RgbFrame;

/// Collapses consecutive similar text-dense frames into a single
/// representative keyframe per run.
///
/// The selector sits after detection and hashing. Each frame fed to
/// [`observe`](KeyframeSelector::observe) has already passed the density
/// gate; the selector only decides run membership. A frame within the
/// similarity threshold of the current run replaces the run's
/// representative, so the last similar frame wins. A frame beyond the
/// threshold closes the current run, emits its representative, and opens a
/// new run. The final run is emitted by [`flush`](KeyframeSelector::flush).
pub struct KeyframeSelector {
    similarity_threshold: u32,
    active: Option<Run>,
}

struct Run {
    frame: RgbFrame,
    fingerprint: Fingerprint,
}

impl KeyframeSelector {
    pub fn new(similarity_threshold: u32) -> Self {
        Self {
            similarity_threshold,
            active: None,
        }
    }

    /// Feeds one text-dense frame. Returns the representative of the run
    /// that just closed, if this frame opened a new run.
    pub fn observe(&mut self, frame: RgbFrame, fingerprint: Fingerprint) -> Option<RgbFrame> {
        match self.active.take() {
            None => {
                self.active = Some(Run { frame, fingerprint });
                None
            }
            Some(run) => {
                if run.fingerprint.distance(&fingerprint) <= self.similarity_threshold {
                    self.active = Some(Run { frame, fingerprint });
                    None
                } else {
                    self.active = Some(Run { frame, fingerprint });
                    Some(run.frame)
                }
            }
        }
    }

    /// Closes the selector at end of stream, yielding the open run's
    /// representative if one exists.
    pub fn flush(&mut self) -> Option<RgbFrame> {
        self.active.take().map(|run| run.frame)
    }
}
