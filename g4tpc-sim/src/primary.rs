//! Primary particles injected at the start of each event
//!
//! Genie runs replay the tracker-file daughters from the event vertex.
//! Particle-gun runs fire particles across the detector: start and end are
//! random points on the box surface, and the direction joins them.

use crate::detector::DetectorGeometry;
use g4tpc_common::config::ParticleGunConfig;
use g4tpc_common::{Error, GenieEvent, PrimarySource, Result, RunSetup};
use rand::Rng;
use serde::Serialize;
use tracing::warn;

/// Attempts at finding a gun end point that differs from the start on every axis
const MAX_SURFACE_DRAWS: usize = 1000;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ParticleKind {
    Pdg(i32),
    /// Particle name understood by the transport engine, e.g. "mu-"
    Species(String),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PrimaryParticle {
    pub particle: ParticleKind,
    /// GeV
    pub energy: f64,
    /// mm
    pub position: [f64; 3],
    /// Unit vector for genie primaries; gun directions are start-to-end
    pub direction: [f64; 3],
}

/// Daughters of a genie event, fired from its vertex
///
/// Tracks without a usable direction are skipped.
pub fn genie_primaries(event: &GenieEvent) -> Vec<PrimaryParticle> {
    event
        .daughter_tracks()
        .iter()
        .filter_map(|track| match track.unit_direction() {
            Some(direction) => Some(PrimaryParticle {
                particle: ParticleKind::Pdg(track.pdg()),
                energy: track.energy(),
                position: event.vertex(),
                direction,
            }),
            None => {
                warn!("Genie track pdg {} has no direction; not fired", track.pdg());
                None
            }
        })
        .collect()
}

/// Uniform point on the surface of the detector box
pub fn point_on_surface<R: Rng>(detector: &DetectorGeometry, rng: &mut R) -> [f64; 3] {
    let [wx, wy, wz] = detector.width();
    let low = detector.low_corner();
    let high = detector.high_corner();

    // Face pairs normal to x, y and z, weighted by area
    let areas = [wy * wz, wx * wz, wx * wy];
    let total: f64 = areas.iter().sum();
    let mut pick = rng.gen::<f64>() * total;
    let mut normal_axis = 2;
    for (axis, area) in areas.iter().enumerate() {
        if pick < *area {
            normal_axis = axis;
            break;
        }
        pick -= area;
    }

    let mut point = [0.0; 3];
    for axis in 0..3 {
        point[axis] = if axis == normal_axis {
            if rng.gen_bool(0.5) {
                low[axis]
            } else {
                high[axis]
            }
        } else {
            low[axis] + rng.gen::<f64>() * (high[axis] - low[axis])
        };
    }
    point
}

/// Gun primaries for one event
pub fn gun_primaries<R: Rng>(
    gun: &ParticleGunConfig,
    detector: &DetectorGeometry,
    rng: &mut R,
) -> Result<Vec<PrimaryParticle>> {
    let energy = gun
        .energy
        .ok_or_else(|| Error::ConfigInvalid("particle_gun.energy not specified".to_string()))?;
    let count = usize::try_from(gun.particles_per_event).unwrap_or(0);

    (0..count)
        .map(|_| {
            let start = point_on_surface(detector, rng);
            let end = (0..MAX_SURFACE_DRAWS)
                .map(|_| point_on_surface(detector, rng))
                .find(|end| (0..3).all(|axis| (end[axis] - start[axis]).abs() >= f64::EPSILON))
                .ok_or_else(|| {
                    Error::ConfigInvalid(format!(
                        "no gun end point differing from {:?} on every axis after {} draws",
                        start, MAX_SURFACE_DRAWS
                    ))
                })?;

            Ok(PrimaryParticle {
                particle: ParticleKind::Species(gun.species.clone()),
                energy,
                position: start,
                direction: [end[0] - start[0], end[1] - start[1], end[2] - start[2]],
            })
        })
        .collect()
}

/// Primaries for event `event_number` of a prepared run
pub fn plan_primaries<R: Rng>(
    setup: &RunSetup,
    event_number: usize,
    rng: &mut R,
) -> Result<Vec<PrimaryParticle>> {
    match setup.config.primary_source() {
        PrimarySource::Genie => setup
            .genie_events
            .get(event_number)
            .map(genie_primaries)
            .ok_or_else(|| {
                Error::ConfigInvalid(format!(
                    "event {} requested but only {} genie events loaded",
                    event_number,
                    setup.genie_events.len()
                ))
            }),
        PrimarySource::ParticleGun => gun_primaries(
            &setup.config.particle_gun,
            &DetectorGeometry::from(&setup.config.detector),
            rng,
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use g4tpc_common::Track;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn detector() -> DetectorGeometry {
        DetectorGeometry::new([0.0, 0.0, 500.0], [200.0, 300.0, 1000.0], 10)
    }

    fn on_surface(detector: &DetectorGeometry, point: [f64; 3]) -> bool {
        let low = detector.low_corner();
        let high = detector.high_corner();
        detector.contains(point) && (0..3).any(|axis| point[axis] == low[axis] || point[axis] == high[axis])
    }

    #[test]
    fn test_genie_primaries_from_vertex() {
        let event = GenieEvent::new(
            1,
            [1.0, 2.0, 3.0],
            Track::new(14, 3.244, [0.0, 0.0, 1.0]),
            vec![Track::new(13, 3.15622, [0.0, 0.0, 2.0]), Track::new(2212, 0.9, [0.0, 0.0, 0.0])],
        );

        let primaries = genie_primaries(&event);
        assert_eq!(primaries.len(), 1);
        assert_eq!(primaries[0].particle, ParticleKind::Pdg(13));
        assert_eq!(primaries[0].position, [1.0, 2.0, 3.0]);
        assert_eq!(primaries[0].direction, [0.0, 0.0, 1.0]);
        assert!((primaries[0].energy - 3.15622).abs() < 1e-12);
    }

    #[test]
    fn test_surface_points() {
        let detector = detector();
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..500 {
            assert!(on_surface(&detector, point_on_surface(&detector, &mut rng)));
        }
    }

    #[test]
    fn test_gun_crosses_detector() {
        let detector = detector();
        let gun = ParticleGunConfig {
            enabled: true,
            species: "mu-".to_string(),
            energy: Some(2.0),
            particles_per_event: 3,
            n_events: None,
        };
        let mut rng = StdRng::seed_from_u64(42);

        let primaries = gun_primaries(&gun, &detector, &mut rng).unwrap();
        assert_eq!(primaries.len(), 3);
        for primary in &primaries {
            assert_eq!(primary.particle, ParticleKind::Species("mu-".to_string()));
            assert_eq!(primary.energy, 2.0);
            assert!(on_surface(&detector, primary.position));
            assert!(primary.direction.iter().all(|c| c.abs() >= f64::EPSILON));
        }
    }
}
