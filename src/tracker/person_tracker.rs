//! Track store and greedy centroid matcher.

use std::collections::{BTreeMap, HashSet};

use image::Rgb;
use nalgebra::Point2;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::debug;

use crate::report::TrackSummary;
use crate::risk::RiskTier;
use crate::tracker::matching::{self, Detection};
use crate::tracker::person_track::{PersonTrack, TrackedDetection};

/// Configuration for the PersonTracker.
#[derive(Debug, Clone)]
pub struct TrackerConfig {
    /// Centroid distance (pixels) below which a detection continues a track
    pub max_distance: f64,
    /// A track is dropped once its consecutive missed frames exceed this
    pub max_frames_skip: u32,
    /// Used to turn matched frame counts into seconds
    pub frame_rate: f64,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            max_distance: 50.0,
            max_frames_skip: 30,
            frame_rate: 30.0,
        }
    }
}

/// Owns every live track of one pipeline run.
///
/// Ids are handed out in increasing order and never reused, so a person who
/// reappears after their track expired gets a new id.
pub struct PersonTracker {
    tracks: BTreeMap<u64, PersonTrack>,
    next_id: u64,
    frame_id: u64,
    config: TrackerConfig,
    rng: StdRng,
}

impl PersonTracker {
    pub fn new(config: TrackerConfig) -> Self {
        Self::with_rng(config, StdRng::from_entropy())
    }

    /// Tracker whose track colours are reproducible.
    pub fn with_seed(config: TrackerConfig, seed: u64) -> Self {
        Self::with_rng(config, StdRng::seed_from_u64(seed))
    }

    fn with_rng(config: TrackerConfig, rng: StdRng) -> Self {
        Self {
            tracks: BTreeMap::new(),
            next_id: 1,
            frame_id: 0,
            config,
            rng,
        }
    }

    pub fn config(&self) -> &TrackerConfig {
        &self.config
    }

    /// Number of `update` calls so far.
    pub fn frame_id(&self) -> u64 {
        self.frame_id
    }

    /// Number of distinct tracks ever created in this run.
    pub fn total_created(&self) -> u64 {
        self.next_id - 1
    }

    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }

    pub fn get(&self, track_id: u64) -> Option<&PersonTrack> {
        self.tracks.get(&track_id)
    }

    /// Live tracks in ascending id order.
    pub fn tracks(&self) -> impl Iterator<Item = &PersonTrack> {
        self.tracks.values()
    }

    /// Consume one frame of detections and return them with track identities.
    ///
    /// Detections are matched in the order given. Every live track that did
    /// not receive a detection this frame has its missed counter advanced,
    /// and tracks past `max_frames_skip` are removed.
    pub fn update(&mut self, detections: Vec<Detection>) -> Vec<TrackedDetection> {
        self.frame_id += 1;

        if detections.is_empty() {
            self.age_unmatched(&HashSet::new());
            return Vec::new();
        }

        // Candidate tracks are the ones alive before this frame; tracks born
        // from this frame's detections already count as matched.
        let track_ids: Vec<u64> = self.tracks.keys().copied().collect();
        let track_points: Vec<Point2<f64>> =
            self.tracks.values().map(|t| t.centroid()).collect();
        let det_points: Vec<Point2<f64>> = detections.iter().map(|d| d.centroid()).collect();

        let dists = matching::centroid_distance(&det_points, &track_points);
        let assignment = matching::greedy_assignment(&dists, self.config.max_distance);
        let assigned = assignment.by_detection(detections.len());

        let mut matched = HashSet::with_capacity(detections.len());
        let mut output = Vec::with_capacity(detections.len());

        for (det, slot) in detections.into_iter().zip(assigned) {
            match slot {
                Some(col) => {
                    let track_id = track_ids[col];
                    if let Some(track) = self.tracks.get_mut(&track_id) {
                        track.mark_matched(det.bbox);
                        let duration = track.duration_seconds(self.config.frame_rate);
                        output.push(TrackedDetection::new(det, track, duration));
                        matched.insert(track_id);
                    }
                }
                None => {
                    let track = self.create_track(&det);
                    matched.insert(track.track_id());
                    output.push(TrackedDetection::new(det, &track, 0.0));
                    self.tracks.insert(track.track_id(), track);
                }
            }
        }

        self.age_unmatched(&matched);
        output
    }

    /// One summary per live track, longest on-screen time first.
    pub fn summary(&self, frame_rate: f64) -> Vec<TrackSummary> {
        let mut summary: Vec<TrackSummary> = self
            .tracks
            .values()
            .map(|track| {
                let duration = track.duration_seconds(frame_rate);
                TrackSummary::new(track, duration, RiskTier::classify(duration))
            })
            .collect();
        summary.sort_by(|a, b| b.duration_seconds.total_cmp(&a.duration_seconds));
        summary
    }

    fn create_track(&mut self, det: &Detection) -> PersonTrack {
        let track_id = self.next_id;
        self.next_id += 1;

        let color = Rgb([
            self.rng.gen_range(0..255),
            self.rng.gen_range(0..255),
            self.rng.gen_range(0..255),
        ]);
        debug!(track_id, frame = self.frame_id, "new track");
        PersonTrack::new(track_id, det.bbox, color, self.frame_id)
    }

    fn age_unmatched(&mut self, matched: &HashSet<u64>) {
        let max_frames_skip = self.config.max_frames_skip;
        let frame_id = self.frame_id;
        self.tracks.retain(|track_id, track| {
            if matched.contains(track_id) {
                return true;
            }
            track.mark_missed();
            let keep = track.frames_missed() <= max_frames_skip;
            if !keep {
                debug!(track_id, frame = frame_id, "track expired");
            }
            keep
        });
    }
}
