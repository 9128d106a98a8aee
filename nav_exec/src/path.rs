//! # Path Intake
//!
//! Waypoints arrive from the producer in raw integer units. They are scaled into meters and
//! appended to the [`Path`], which is marked complete once the goal waypoint has been appended.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use log::info;
use serde::{Deserialize, Serialize};

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// A point the vehicle drives to.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Waypoint {
    pub x_m: f64,
    pub y_m: f64,
}

/// Parameters of the path intake, the `[path]` table of `nav_exec.toml`.
#[derive(Debug, Clone, Deserialize)]
pub struct PathParams {
    /// Factor converting raw producer units into meters
    pub scale_m: f64,

    /// The final waypoint of the path, in meters.
    ///
    /// The path is complete when a waypoint exactly equal to this is appended.
    pub goal_m: [f64; 2],
}

/// An append-only sequence of waypoints.
#[derive(Debug, Clone)]
pub struct Path {
    points: Vec<Waypoint>,
    goal: Waypoint,
    scale_m: f64,
    complete: bool,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl Waypoint {
    pub fn new(x_m: f64, y_m: f64) -> Self {
        Self { x_m, y_m }
    }

    pub fn as_array(&self) -> [f64; 2] {
        [self.x_m, self.y_m]
    }
}

impl Default for PathParams {
    fn default() -> Self {
        Self {
            scale_m: 0.05,
            goal_m: [4.75, 4.75],
        }
    }
}

impl Path {
    /// Create a new empty path.
    pub fn new(params: &PathParams) -> Self {
        Self {
            points: Vec::new(),
            goal: Waypoint::new(params.goal_m[0], params.goal_m[1]),
            scale_m: params.scale_m,
            complete: false,
        }
    }

    /// Scale and append a raw waypoint.
    ///
    /// Returns true if this waypoint completed the path. Points appended after completion are
    /// kept but never complete the path a second time.
    pub fn ingest(&mut self, x_raw: i32, y_raw: i32) -> bool {
        let wp = Waypoint::new(
            x_raw as f64 * self.scale_m,
            y_raw as f64 * self.scale_m
        );
        self.points.push(wp);

        info!(
            "Waypoint {}: ({}, {}) -> ({:.3}, {:.3}) m",
            self.points.len() - 1, x_raw, y_raw, wp.x_m, wp.y_m
        );

        // Exact comparison, the goal is reached by scaling the same raw value
        if !self.complete && self.is_goal(&wp) {
            self.complete = true;
            info!("Goal waypoint received, path complete with {} points", self.points.len());
            return true;
        }

        false
    }

    /// True once the goal waypoint has been appended.
    pub fn is_complete(&self) -> bool {
        self.complete
    }

    pub fn is_goal(&self, wp: &Waypoint) -> bool {
        *wp == self.goal
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn get(&self, idx: usize) -> Option<&Waypoint> {
        self.points.get(idx)
    }

    /// The start and end points of the given segment, if both exist.
    pub fn segment(&self, idx: usize) -> Option<(Waypoint, Waypoint)> {
        match (self.points.get(idx), self.points.get(idx + 1)) {
            (Some(s), Some(e)) => Some((*s, *e)),
            _ => None
        }
    }
}

impl Default for Path {
    fn default() -> Self {
        Self::new(&PathParams::default())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_ingest_scales_points() {
        let mut path = Path::default();

        assert!(!path.ingest(2, 2));
        assert!(!path.ingest(-20, 40));

        assert_eq!(path.len(), 2);
        assert_eq!(path.get(0), Some(&Waypoint::new(0.1, 0.1)));
        assert_eq!(path.get(1), Some(&Waypoint::new(-1.0, 2.0)));
        assert!(!path.is_complete());
    }

    #[test]
    fn test_goal_completes_once() {
        let mut path = Path::default();

        assert!(!path.ingest(2, 2));
        assert!(path.ingest(95, 95));
        assert!(path.is_complete());

        // Appending the goal again stores the point but doesn't complete again
        assert!(!path.ingest(95, 95));
        assert!(path.is_complete());
        assert_eq!(path.len(), 3);
    }

    #[test]
    fn test_segments() {
        let mut path = Path::default();
        assert_eq!(path.segment(0), None);

        path.ingest(2, 2);
        assert_eq!(path.segment(0), None);

        path.ingest(95, 95);
        assert_eq!(
            path.segment(0),
            Some((Waypoint::new(0.1, 0.1), Waypoint::new(4.75, 4.75)))
        );
        assert_eq!(path.segment(1), None);
    }
}
