use serde::{Deserialize, Serialize};

/// Landmarks per detected hand.
pub const LANDMARK_COUNT: usize = 21;

/// One normalized image-space point. Smaller `y` is higher on screen.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Landmark {
    pub x: f32,
    pub y: f32,
    #[serde(default)]
    pub z: f32,
}

/// The four tracked fingers. The thumb folds sideways and is ignored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Finger {
    Index,
    Middle,
    Ring,
    Little,
}

impl Finger {
    pub const ALL: [Finger; 4] = [Self::Index, Self::Middle, Self::Ring, Self::Little];

    pub fn tip(self) -> usize {
        match self {
            Self::Index => 8,
            Self::Middle => 12,
            Self::Ring => 16,
            Self::Little => 20,
        }
    }

    /// Middle (PIP) joint the tip is compared against.
    pub fn joint(self) -> usize {
        self.tip() - 2
    }
}

/// A hand as emitted by the pose estimator, 21 points in the usual
/// wrist / thumb / index / middle / ring / little ordering.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct HandSkeleton {
    landmarks: [Landmark; LANDMARK_COUNT],
}

impl HandSkeleton {
    #[cfg(test)]
    pub fn new(landmarks: [Landmark; LANDMARK_COUNT]) -> Self {
        Self { landmarks }
    }

    pub fn landmarks(&self) -> &[Landmark; LANDMARK_COUNT] {
        &self.landmarks
    }

    pub fn landmark(&self, index: usize) -> Landmark {
        self.landmarks[index]
    }

    /// Flip left/right to match a mirrored frame. Heights are untouched.
    pub fn mirror(&mut self) {
        for p in &mut self.landmarks {
            p.x = 1.0 - p.x;
        }
    }

    pub fn is_curled(&self, finger: Finger) -> bool {
        self.landmarks[finger.tip()].y >= self.landmarks[finger.joint()].y
    }
}

/// Closed iff every tracked fingertip sits at or below its joint.
pub fn is_fist_closed(hand: &HandSkeleton) -> bool {
    Finger::ALL.iter().all(|&f| hand.is_curled(f))
}

/// First closed fist in source order. `scanned` sees every hand up to and
/// including the match, nothing after it.
pub fn first_fist<'a, I, F>(hands: I, mut scanned: F) -> Option<(usize, &'a HandSkeleton)>
where
    I: IntoIterator<Item = &'a HandSkeleton>,
    F: FnMut(&HandSkeleton),
{
    hands
        .into_iter()
        .enumerate()
        .inspect(|(_, hand)| scanned(hand))
        .find(|(_, hand)| is_fist_closed(hand))
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;

    /// Every tip above its joint.
    pub fn open_hand() -> HandSkeleton {
        let mut pts = [Landmark::default(); LANDMARK_COUNT];
        for (i, p) in pts.iter_mut().enumerate() {
            p.x = 0.4 + i as f32 * 0.01;
            p.y = 0.8 - i as f32 * 0.02;
        }
        HandSkeleton::new(pts)
    }

    /// Every tip below its joint.
    pub fn fist() -> HandSkeleton {
        let mut hand = open_hand();
        for f in Finger::ALL {
            let joint_y = hand.landmarks[f.joint()].y;
            hand.landmarks[f.tip()].y = joint_y + 0.05;
        }
        hand
    }
}

#[cfg(test)]
mod tests {
    use super::fixtures::{fist, open_hand};
    use super::*;

    #[test]
    fn test_open_hand_is_not_fist() {
        assert!(!is_fist_closed(&open_hand()));
    }

    #[test]
    fn test_fist() {
        assert!(is_fist_closed(&fist()));
    }

    #[test]
    fn test_single_raised_finger_opens_hand() {
        for raised in Finger::ALL {
            let mut hand = fist();
            let joint_y = hand.landmarks[raised.joint()].y;
            hand.landmarks[raised.tip()].y = joint_y - 0.01;
            assert!(!is_fist_closed(&hand), "{raised:?} raised");
        }
    }

    #[test]
    fn test_equal_height_counts_as_closed() {
        let mut hand = open_hand();
        for f in Finger::ALL {
            hand.landmarks[f.tip()].y = hand.landmarks[f.joint()].y;
        }
        assert!(is_fist_closed(&hand));
    }

    #[test]
    fn test_thumb_and_depth_ignored() {
        let mut hand = fist();
        for i in 1..=4 {
            hand.landmarks[i].y = 0.0;
        }
        for p in hand.landmarks.iter_mut() {
            p.z = -3.0;
        }
        assert!(is_fist_closed(&hand));
    }

    #[test]
    fn test_finger_indices() {
        let tips: Vec<_> = Finger::ALL.iter().map(|f| f.tip()).collect();
        let joints: Vec<_> = Finger::ALL.iter().map(|f| f.joint()).collect();
        assert_eq!(tips, [8, 12, 16, 20]);
        assert_eq!(joints, [6, 10, 14, 18]);
    }

    #[test]
    fn test_first_fist_skips_open_hands() {
        let hands = [open_hand(), fist(), fist()];
        let mut seen = 0;
        let (idx, _) = first_fist(&hands, |_| seen += 1).unwrap();
        assert_eq!(idx, 1);
        assert_eq!(seen, 2);
    }

    #[test]
    fn test_first_fist_none() {
        let hands = [open_hand(), open_hand()];
        let mut seen = 0;
        assert!(first_fist(&hands, |_| seen += 1).is_none());
        assert_eq!(seen, 2);
    }

    #[test]
    fn test_deserialize_requires_21_points() {
        let pts: Vec<_> = (0..21)
            .map(|i| serde_json::json!({"x": 0.5, "y": i as f32 / 21.0, "z": 0.0}))
            .collect();
        let hand: HandSkeleton = serde_json::from_value(serde_json::json!(pts)).unwrap();
        assert_eq!(hand.landmark(20).y, 20.0 / 21.0);

        let short: Vec<_> = pts[..20].to_vec();
        assert!(serde_json::from_value::<HandSkeleton>(serde_json::json!(short)).is_err());
    }

    #[test]
    fn test_mirror_flips_x_and_keeps_classification() {
        let fist = fixtures::fist();
        let mut flipped = fist.clone();
        flipped.mirror();
        for (a, b) in fist.landmarks().iter().zip(flipped.landmarks()) {
            assert!((a.x + b.x - 1.0).abs() < 1e-6);
            assert_eq!(a.y, b.y);
        }
        assert!(is_fist_closed(&flipped));
    }
}
