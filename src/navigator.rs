//! Reading position and swipe navigation over a pagination session.

use heapless::Deque;
use serde::{Deserialize, Serialize};

use crate::measure::MeasurementOracle;
use crate::packer::Page;
use crate::session::PaginationSession;

/// Samples kept for release-velocity estimation.
const GESTURE_WINDOW: usize = 8;

/// Drag direction that advances to the next page.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SwipeDirection {
    /// Dragging content leftwards (negative displacement) advances.
    Left,
    /// Dragging content rightwards advances, for right-to-left books.
    Right,
}

impl SwipeDirection {
    fn forward_sign(self) -> f32 {
        match self {
            Self::Left => -1.0,
            Self::Right => 1.0,
        }
    }
}

/// Swipe interpretation settings.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GestureConfig {
    /// Displacement in pixels that commits a page turn.
    pub distance_threshold: f32,
    /// Release velocity in pixels per millisecond that commits a page turn.
    pub velocity_threshold: f32,
    /// Weight of the newest instantaneous velocity in the smoothed estimate.
    pub smoothing: f32,
    /// A pause longer than this before release zeroes the velocity.
    pub stale_after_ms: u64,
    pub forward: SwipeDirection,
}

impl Default for GestureConfig {
    fn default() -> Self {
        Self {
            distance_threshold: 60.0,
            velocity_threshold: 0.5,
            smoothing: 0.6,
            stale_after_ms: 120,
            forward: SwipeDirection::Left,
        }
    }
}

impl GestureConfig {
    pub fn with_forward(mut self, forward: SwipeDirection) -> Self {
        self.forward = forward;
        self
    }

    pub fn with_thresholds(mut self, distance: f32, velocity: f32) -> Self {
        self.distance_threshold = distance;
        self.velocity_threshold = velocity;
        self
    }
}

/// Outcome of a gesture release.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum GestureDecision {
    Forward,
    Backward,
    SnapBack,
}

/// Decide a release from its displacement and velocity.
///
/// Displacement is consulted first; velocity only decides when the
/// displacement stayed within the threshold.
pub fn decide_release(cfg: &GestureConfig, displacement: f32, velocity: f32) -> GestureDecision {
    let sign = cfg.forward.forward_sign();
    let along = displacement * sign;
    if along > cfg.distance_threshold {
        return GestureDecision::Forward;
    }
    if along < -cfg.distance_threshold {
        return GestureDecision::Backward;
    }
    let speed = velocity * sign;
    if speed > cfg.velocity_threshold {
        GestureDecision::Forward
    } else if speed < -cfg.velocity_threshold {
        GestureDecision::Backward
    } else {
        GestureDecision::SnapBack
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
struct Sample {
    t_ms: u64,
    x: f32,
}

/// Turns `(timestamp, position)` samples into release displacement and
/// smoothed velocity.
#[derive(Clone, Debug)]
pub struct GestureTracker {
    smoothing: f32,
    stale_after_ms: u64,
    origin: Option<Sample>,
    window: Deque<Sample, GESTURE_WINDOW>,
}

impl GestureTracker {
    pub fn new(cfg: &GestureConfig) -> Self {
        Self {
            smoothing: cfg.smoothing.clamp(0.0, 1.0),
            stale_after_ms: cfg.stale_after_ms,
            origin: None,
            window: Deque::new(),
        }
    }

    pub fn is_active(&self) -> bool {
        self.origin.is_some()
    }

    /// Start a gesture at `x`.
    pub fn begin(&mut self, t_ms: u64, x: f32) {
        let sample = Sample { t_ms, x };
        self.origin = Some(sample);
        self.window.clear();
        self.push(sample);
    }

    /// Record a move. Returns the displacement from the gesture origin.
    pub fn update(&mut self, t_ms: u64, x: f32) -> Option<f32> {
        let origin = self.origin?;
        self.push(Sample { t_ms, x });
        Some(x - origin.x)
    }

    /// Finish the gesture. Returns `(displacement, velocity)`.
    pub fn release(&mut self, t_ms: u64, x: f32) -> Option<(f32, f32)> {
        let displacement = self.update(t_ms, x)?;
        let velocity = self.velocity();
        self.cancel();
        Some((displacement, velocity))
    }

    /// Abandon the current gesture.
    pub fn cancel(&mut self) {
        self.origin = None;
        self.window.clear();
    }

    fn push(&mut self, sample: Sample) {
        if let Some(last) = self.window.back() {
            if sample.t_ms < last.t_ms {
                return;
            }
        }
        if self.window.is_full() {
            self.window.pop_front();
        }
        let _ = self.window.push_back(sample);
    }

    /// Exponentially smoothed velocity over the sample window, in px/ms.
    fn velocity(&self) -> f32 {
        let mut smoothed: Option<f32> = None;
        let mut prev: Option<Sample> = None;
        let mut last_gap = 0;
        for sample in self.window.iter().copied() {
            if let Some(p) = prev {
                let dt = sample.t_ms - p.t_ms;
                last_gap = dt;
                if dt > 0 {
                    let instant = (sample.x - p.x) / dt as f32;
                    smoothed = Some(match smoothed {
                        Some(v) => self.smoothing * instant + (1.0 - self.smoothing) * v,
                        None => instant,
                    });
                }
            }
            prev = Some(sample);
        }
        if last_gap > self.stale_after_ms {
            return 0.0;
        }
        smoothed.unwrap_or(0.0)
    }
}

/// Result of a navigation request.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Transition {
    Advanced { from: usize, to: usize },
    Retreated { from: usize, to: usize },
    /// A drag that did not commit; the page returns to rest.
    SnapBack,
    Unchanged,
}

/// Snapshot of the reading position.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NavigatorState {
    pub current_index: usize,
    /// Pages built so far.
    pub total_known: usize,
    /// `true` once `total_known` is the final page count.
    pub is_final: bool,
}

impl NavigatorState {
    pub fn can_retreat(&self) -> bool {
        self.current_index > 0
    }

    pub fn can_advance(&self) -> bool {
        !self.is_final || self.current_index + 1 < self.total_known
    }

    /// `"i/n"`, or `"i/n+"` while more pages may follow.
    pub fn counter_label(&self) -> String {
        let suffix = if self.is_final { "" } else { "+" };
        format!(
            "{}/{}{suffix}",
            self.current_index + 1,
            self.total_known.max(1)
        )
    }

    /// Position in `[0, 1]` over the known pages.
    pub fn progress(&self) -> f32 {
        page_progress_from_count(self.current_index, self.total_known)
    }
}

fn page_progress_from_count(page_index: usize, page_count: usize) -> f32 {
    if page_count <= 1 {
        return 1.0;
    }
    let clamped = page_index.min(page_count - 1);
    (clamped as f32 / (page_count - 1) as f32).clamp(0.0, 1.0)
}

/// Current page, page turns, and gesture interpretation.
#[derive(Debug)]
pub struct Navigator<O> {
    session: PaginationSession<O>,
    current: usize,
    gesture: GestureConfig,
    tracker: GestureTracker,
}

impl<O: MeasurementOracle> Navigator<O> {
    /// Wrap `session`, building page 0 and its look-ahead eagerly.
    pub fn new(mut session: PaginationSession<O>, gesture: GestureConfig) -> Self {
        session.ensure_built(session.options().look_ahead);
        Self {
            session,
            current: 0,
            tracker: GestureTracker::new(&gesture),
            gesture,
        }
    }

    pub fn session(&self) -> &PaginationSession<O> {
        &self.session
    }

    /// Mutable access for background building.
    pub fn session_mut(&mut self) -> &mut PaginationSession<O> {
        &mut self.session
    }

    pub fn into_session(self) -> PaginationSession<O> {
        self.session
    }

    pub fn gesture_config(&self) -> &GestureConfig {
        &self.gesture
    }

    pub fn current_index(&self) -> usize {
        self.current
    }

    pub fn current_page(&self) -> Option<&Page> {
        self.session.built_page(self.current)
    }

    pub fn state(&self) -> NavigatorState {
        NavigatorState {
            current_index: self.current,
            total_known: self.session.built_len(),
            is_final: self.session.is_final(),
        }
    }

    /// Move to the next page if one exists. No-op on the final page.
    pub fn advance(&mut self) -> Transition {
        let from = self.current;
        if !self.session.ensure_built(from + 1) {
            return Transition::Unchanged;
        }
        self.current = from + 1;
        self.prefetch();
        Transition::Advanced {
            from,
            to: self.current,
        }
    }

    /// Move to the previous page. No-op on page 0.
    pub fn retreat(&mut self) -> Transition {
        let from = self.current;
        if from == 0 {
            return Transition::Unchanged;
        }
        self.current = from - 1;
        Transition::Retreated {
            from,
            to: self.current,
        }
    }

    /// Jump to `index`, clamped to the document. Returns the new index.
    pub fn go_to(&mut self, index: usize) -> usize {
        self.current = if self.session.ensure_built(index) {
            index
        } else {
            self.session.built_len().saturating_sub(1)
        };
        self.prefetch();
        self.current
    }

    /// Re-paginate under a new oracle, staying on the page that holds the
    /// start of the page currently shown.
    pub fn resize(&mut self, oracle: O) -> usize {
        self.tracker.cancel();
        let anchor = self.current_page().map(|page| page.start);
        self.current = self.session.reconfigure(oracle, anchor);
        self.prefetch();
        self.current
    }

    pub fn begin_gesture(&mut self, t_ms: u64, x: f32) {
        self.tracker.begin(t_ms, x);
    }

    /// Record a drag sample. Returns the displacement for the drag offset.
    pub fn update_gesture(&mut self, t_ms: u64, x: f32) -> Option<f32> {
        self.tracker.update(t_ms, x)
    }

    /// Finish a drag and apply the resulting decision.
    pub fn release_gesture(&mut self, t_ms: u64, x: f32) -> Transition {
        match self.tracker.release(t_ms, x) {
            Some((displacement, velocity)) => self.gesture_release(displacement, velocity),
            None => Transition::Unchanged,
        }
    }

    /// Apply a release with known displacement and velocity.
    ///
    /// A committed turn that cannot happen (next on the final page, back on
    /// page 0) snaps back.
    pub fn gesture_release(&mut self, displacement: f32, velocity: f32) -> Transition {
        let transition = match decide_release(&self.gesture, displacement, velocity) {
            GestureDecision::Forward => self.advance(),
            GestureDecision::Backward => self.retreat(),
            GestureDecision::SnapBack => return Transition::SnapBack,
        };
        if transition == Transition::Unchanged {
            log::trace!("gesture committed at a document edge; snapping back");
            return Transition::SnapBack;
        }
        transition
    }

    fn prefetch(&mut self) {
        let look_ahead = self.session.options().look_ahead;
        self.session.ensure_built(self.current + look_ahead);
    }
}
