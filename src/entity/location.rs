use std::fmt;
use std::f64::consts::PI;

use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::Rng;
use rand::SeedableRng;
use serde::Deserialize;
use serde::Serialize;

use crate::MotionConfig;

/// Standard deviations between the map centre and its edge.
const STRETCH: f64 = 2.0;

/// A point on the unit map, `[-0.5, 0.5]` on both axes.
#[derive(Clone, Copy, Debug, PartialEq, Default, Serialize, Deserialize)]
pub struct Location {
    pub x: f64,
    pub y: f64,
}

impl Location {
    pub const CENTER: Location = Location { x: 0.0, y: 0.0 };

    pub fn new(
        x: f64,
        y: f64,
    ) -> Self {
        Self { x, y }
    }

    pub fn distance_to(
        &self,
        other: &Location,
    ) -> f64 {
        (other.x - self.x).hypot(other.y - self.y)
    }

    /// Point `distance` along the segment towards `destination`.
    ///
    /// Reaching or overshooting the destination returns it exactly, so
    /// callers can detect arrival with `==`.
    pub fn part_way(
        &self,
        distance: f64,
        destination: &Location,
    ) -> Location {
        let total = self.distance_to(destination);
        if total == 0.0 || distance >= total {
            return *destination;
        }
        let portion = distance / total;
        Location {
            x: self.x + (destination.x - self.x) * portion,
            y: self.y + (destination.y - self.y) * portion,
        }
    }
}

impl fmt::Display for Location {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        write!(f, "[{:+.3} {:+.3}]", self.x, self.y)
    }
}

/// Draws random map locations and coin flips from one shared RNG.
///
/// Locations follow a Gaussian centred on the map, clipped to the map and
/// quantised to its pixel grid.
pub struct LocationSampler {
    rng: Mutex<StdRng>,
    width_px: f64,
    height_px: f64,
}

impl LocationSampler {
    pub fn new(
        seed: Option<u64>,
        width_px: u32,
        height_px: u32,
    ) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self {
            rng: Mutex::new(rng),
            width_px: f64::from(width_px),
            height_px: f64::from(height_px),
        }
    }

    pub fn from_config(config: &MotionConfig) -> Self {
        Self::new(config.seed, config.map_width_px, config.map_height_px)
    }

    pub fn random(&self) -> Location {
        let mut rng = self.rng.lock();
        let x = clipped_gaussian(&mut *rng);
        let y = clipped_gaussian(&mut *rng);
        Location {
            x: (x * self.width_px).trunc() / self.width_px,
            y: (y * self.height_px).trunc() / self.height_px,
        }
    }

    /// `true` with the given probability.
    pub fn chance(
        &self,
        probability: f64,
    ) -> bool {
        if probability <= 0.0 {
            return false;
        }
        self.rng.lock().gen::<f64>() < probability
    }
}

fn clipped_gaussian<R: Rng>(rng: &mut R) -> f64 {
    // Box-Muller; u1 is kept away from zero for the logarithm
    let u1 = 1.0 - rng.gen::<f64>();
    let u2 = rng.gen::<f64>();
    let z = (-2.0 * u1.ln()).sqrt() * (2.0 * PI * u2).cos();
    (z / (2.0 * STRETCH)).clamp(-0.5, 0.5)
}
