use crate::map::CollisionGrid;

///Represents a vector in 2D space.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Vector2 {
    ///Value along the x-axis.
    /// Positive direction is to the right.
    pub x: f32,
    ///Value along the y-axis.
    /// Positive direction is down, matching the level's pixel rows.
    pub y: f32,
}

impl Vector2 {
    pub const ZERO: Vector2 = Vector2 { x: 0.0, y: 0.0 };

    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    ///Returns the magnitude of the vector.
    pub fn magnitude(&self) -> f32 {
        (self.x * self.x + self.y * self.y).sqrt()
    }

    ///Returns the normalized vector.
    pub fn normalize(&self) -> Vector2 {
        let mag = self.magnitude();
        if mag == 0.0 {
            Vector2::ZERO
        } else {
            Vector2 {
                x: self.x / mag,
                y: self.y / mag,
            }
        }
    }

    ///Returns the scaled vector.
    pub fn scale(&self, scalar: f32) -> Vector2 {
        Vector2 {
            x: self.x * scalar,
            y: self.y * scalar,
        }
    }

    ///Returns the sum of two vectors.
    pub fn add(&self, other: &Vector2) -> Vector2 {
        Vector2 {
            x: self.x + other.x,
            y: self.y + other.y,
        }
    }

    /// Position truncated to the `i16` wire coordinates.
    pub fn to_wire(&self) -> (i16, i16) {
        (
            self.x.clamp(i16::MIN as f32, i16::MAX as f32) as i16,
            self.y.clamp(i16::MIN as f32, i16::MAX as f32) as i16,
        )
    }
}

/// Downward acceleration applied to airborne worms, in pixels per second squared.
pub const WORM_GRAVITY: f32 = 100.0;
/// Speed cap for worms.
pub const WORM_MAX_SPEED: f32 = 300.0;

///Advances a body by one step against the collision grid.
///Returns true if the step was blocked by rock.
pub fn step_body(
    position: &mut Vector2,
    velocity: &mut Vector2,
    grid: &dyn CollisionGrid,
    dt: f32,
) -> bool {
    // Apply gravity to vertical velocity
    velocity.y += WORM_GRAVITY * dt;

    // Clamp velocity to max speed
    if velocity.magnitude() > WORM_MAX_SPEED {
        *velocity = velocity.normalize().scale(WORM_MAX_SPEED);
    }

    let next = position.add(&velocity.scale(dt));
    if grid.is_solid_at(next) {
        // Resolve along the axis that is still free, stop the other
        let horizontal = Vector2::new(next.x, position.y);
        let vertical = Vector2::new(position.x, next.y);
        if !grid.is_solid_at(horizontal) {
            position.x = horizontal.x;
            velocity.y = 0.0;
        } else if !grid.is_solid_at(vertical) {
            position.y = vertical.y;
            velocity.x = 0.0;
        } else {
            *velocity = Vector2::ZERO;
        }
        return true;
    }

    *position = next;
    false
}
