// src/smoothing.rs - exponential pose smoothing
use crate::error::TryOnError;
use crate::pose::Pose;

/// Blends `current` toward `target`: lerp for position and scale, slerp for orientation.
///
/// A component already equal to its target is returned untouched, so a pose at
/// rest stays bit-for-bit identical.
pub fn smooth(current: &Pose, target: &Pose, factor: f64) -> Pose {
    let position = if current.position == target.position {
        current.position
    } else {
        current.position.lerp(&target.position, factor)
    };
    let scale = if current.scale == target.scale {
        current.scale
    } else {
        current.scale.lerp(&target.scale, factor)
    };
    let orientation = if current.orientation == target.orientation {
        current.orientation
    } else {
        current.orientation.slerp(&target.orientation, factor)
    };

    Pose {
        position,
        orientation,
        scale,
    }
}

pub fn validate_factor(name: &str, factor: f64) -> Result<(), TryOnError> {
    if factor > 0.0 && factor <= 1.0 {
        Ok(())
    } else {
        Err(TryOnError::InvalidConfig(format!(
            "{} must be in (0, 1], got {}",
            name, factor
        )))
    }
}

/// One smoothed object. Holds nothing until the first target arrives, then only
/// ever moves from its previous output.
#[derive(Debug, Clone)]
pub struct PoseSmoother {
    factor: f64,
    state: Option<Pose>,
}

impl PoseSmoother {
    pub fn new(factor: f64) -> Self {
        Self { factor, state: None }
    }

    pub fn factor(&self) -> f64 {
        self.factor
    }

    pub fn current(&self) -> Option<&Pose> {
        self.state.as_ref()
    }

    pub fn update(&mut self, target: &Pose) -> Pose {
        let next = match &self.state {
            Some(current) => smooth(current, target, self.factor),
            None => *target,
        };
        self.state = Some(next);
        next
    }
}
