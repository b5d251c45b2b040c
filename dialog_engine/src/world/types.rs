#[derive(Debug, Default, Copy, Clone, PartialEq)]
pub struct Vec3 {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Vec3 {
    pub const ZERO: Vec3 = Vec3 {
        x: 0.0,
        y: 0.0,
        z: 0.0,
    };

    pub fn new(x: f32, y: f32, z: f32) -> Self {
        Vec3 { x, y, z }
    }

    pub fn add(self, other: Vec3) -> Vec3 {
        Vec3::new(self.x + other.x, self.y + other.y, self.z + other.z)
    }

    pub fn sub(self, other: Vec3) -> Vec3 {
        Vec3::new(self.x - other.x, self.y - other.y, self.z - other.z)
    }

    pub fn scale(self, factor: f32) -> Vec3 {
        Vec3::new(self.x * factor, self.y * factor, self.z * factor)
    }

    pub fn dot(self, other: Vec3) -> f32 {
        self.x * other.x + self.y * other.y + self.z * other.z
    }

    pub fn length_sq(self) -> f32 {
        self.dot(self)
    }

    pub fn length(self) -> f32 {
        self.length_sq().sqrt()
    }

    /// Unit vector, or the fallback when the input is too short to normalize.
    pub fn normalized_or(self, fallback: Vec3) -> Vec3 {
        let len = self.length();
        if len <= f32::EPSILON {
            fallback
        } else {
            self.scale(1.0 / len)
        }
    }

    /// Same vector with z dropped; gaze and awareness work in the ground plane.
    pub fn flattened(self) -> Vec3 {
        Vec3::new(self.x, self.y, 0.0)
    }

    pub fn distance_sq(self, other: Vec3) -> f32 {
        self.sub(other).length_sq()
    }
}

/// Axis-aligned box grown point by point, used for the awareness group volume.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Aabb {
    pub min: Vec3,
    pub max: Vec3,
}

impl Aabb {
    /// Inverted empty box; adding any point or box makes it valid.
    pub fn empty() -> Self {
        Aabb {
            min: Vec3::new(f32::MAX, f32::MAX, f32::MAX),
            max: Vec3::new(f32::MIN, f32::MIN, f32::MIN),
        }
    }

    pub fn from_center_half_extents(center: Vec3, half: Vec3) -> Self {
        Aabb {
            min: center.sub(half),
            max: center.add(half),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.min.x > self.max.x || self.min.y > self.max.y || self.min.z > self.max.z
    }

    pub fn add_point(&mut self, point: Vec3) {
        self.min.x = self.min.x.min(point.x);
        self.min.y = self.min.y.min(point.y);
        self.min.z = self.min.z.min(point.z);
        self.max.x = self.max.x.max(point.x);
        self.max.y = self.max.y.max(point.y);
        self.max.z = self.max.z.max(point.z);
    }

    pub fn add_box(&mut self, other: &Aabb) {
        if other.is_empty() {
            return;
        }
        self.add_point(other.min);
        self.add_point(other.max);
    }

    pub fn center(&self) -> Vec3 {
        self.min.add(self.max).scale(0.5)
    }

    pub fn corners(&self) -> [Vec3; 8] {
        let (lo, hi) = (self.min, self.max);
        [
            Vec3::new(lo.x, lo.y, lo.z),
            Vec3::new(hi.x, lo.y, lo.z),
            Vec3::new(lo.x, hi.y, lo.z),
            Vec3::new(hi.x, hi.y, lo.z),
            Vec3::new(lo.x, lo.y, hi.z),
            Vec3::new(hi.x, lo.y, hi.z),
            Vec3::new(lo.x, hi.y, hi.z),
            Vec3::new(hi.x, hi.y, hi.z),
        ]
    }
}

/// View camera reduced to a cone test; stands in for the engine frustum when
/// deciding whether the awareness group volume is on screen.
#[derive(Debug, Clone, PartialEq)]
pub struct Camera {
    pub position: Vec3,
    pub forward: Vec3,
    pub half_angle_deg: f32,
}

impl Default for Camera {
    fn default() -> Self {
        Camera {
            position: Vec3::ZERO,
            forward: Vec3::new(0.0, 1.0, 0.0),
            half_angle_deg: 45.0,
        }
    }
}

impl Camera {
    pub fn is_aabb_visible(&self, bounds: &Aabb) -> bool {
        if bounds.is_empty() {
            return false;
        }
        let forward = self.forward.normalized_or(Vec3::new(0.0, 1.0, 0.0));
        let cos_limit = self.half_angle_deg.to_radians().cos();

        let mut points = bounds.corners().to_vec();
        points.push(bounds.center());
        points.into_iter().any(|point| {
            let to_point = point.sub(self.position);
            if to_point.length_sq() <= f32::EPSILON {
                return true;
            }
            forward.dot(to_point.normalized_or(Vec3::ZERO)) >= cos_limit
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_box_grows_around_points() {
        let mut bounds = Aabb::empty();
        assert!(bounds.is_empty());
        bounds.add_point(Vec3::new(-1.0, 0.0, 0.0));
        bounds.add_point(Vec3::new(3.0, 2.0, 1.0));
        assert!(!bounds.is_empty());
        assert_eq!(bounds.center(), Vec3::new(1.0, 1.0, 0.5));
    }

    #[test]
    fn camera_cone_accepts_box_ahead_and_rejects_box_behind() {
        let camera = Camera {
            position: Vec3::ZERO,
            forward: Vec3::new(0.0, 1.0, 0.0),
            half_angle_deg: 30.0,
        };
        let ahead = Aabb::from_center_half_extents(
            Vec3::new(0.0, 5.0, 0.0),
            Vec3::new(0.5, 0.5, 0.5),
        );
        let behind = Aabb::from_center_half_extents(
            Vec3::new(0.0, -5.0, 0.0),
            Vec3::new(0.5, 0.5, 0.5),
        );
        assert!(camera.is_aabb_visible(&ahead));
        assert!(!camera.is_aabb_visible(&behind));
    }

    #[test]
    fn normalize_falls_back_on_degenerate_input() {
        let fallback = Vec3::new(1.0, 0.0, 0.0);
        assert_eq!(Vec3::ZERO.normalized_or(fallback), fallback);
    }
}
