use glam::{Mat4, Quat, Vec2, Vec3};

const PARALLEL_EPSILON: f32 = 1e-6;

/// Half-line used for pointer picking.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Ray {
    pub origin: Vec3,
    pub direction: Vec3,
}

impl Ray {
    /// Builds a ray; the direction is normalised, a zero direction stays zero.
    pub fn new(origin: Vec3, direction: Vec3) -> Self {
        Self {
            origin,
            direction: normalize_or_zero(direction),
        }
    }

    /// Unprojects a point in normalised device coordinates through the
    /// inverse view-projection matrix of a GL-style camera.
    pub fn from_ndc(ndc: Vec2, inverse_view_proj: Mat4) -> Self {
        let near = inverse_view_proj.project_point3(ndc.extend(-1.0));
        let far = inverse_view_proj.project_point3(ndc.extend(1.0));
        Self::new(near, far - near)
    }

    pub fn at(&self, t: f32) -> Vec3 {
        self.origin + self.direction * t
    }
}

/// Result of a successful ray query: the candidate index and ray parameter.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RayHit {
    pub index: usize,
    pub t: f32,
}

/// Normalises `v`, returning the zero vector instead of NaNs.
pub fn normalize_or_zero(v: Vec3) -> Vec3 {
    let length_squared = v.length_squared();
    if length_squared <= f32::EPSILON * f32::EPSILON {
        Vec3::ZERO
    } else {
        v / length_squared.sqrt()
    }
}

/// Intersects a ray with a double-sided rectangle lying in the local XY plane
/// of `rotation`, centred on `center`. Returns the ray parameter on a hit.
pub fn intersect_quad(ray: &Ray, center: Vec3, rotation: Quat, size: Vec2) -> Option<f32> {
    let normal = rotation * Vec3::Z;
    let denom = ray.direction.dot(normal);
    if denom.abs() < PARALLEL_EPSILON {
        return None;
    }
    let t = (center - ray.origin).dot(normal) / denom;
    if t < 0.0 {
        return None;
    }
    let local = ray.at(t) - center;
    let right = rotation * Vec3::X;
    let up = rotation * Vec3::Y;
    let half = size * 0.5;
    if local.dot(right).abs() <= half.x && local.dot(up).abs() <= half.y {
        Some(t)
    } else {
        None
    }
}

/// Builds a rotation from Euler angles in degrees, applied Y, then X, then Z.
pub fn rotation_from_degrees(euler: Vec3) -> Quat {
    Quat::from_euler(
        glam::EulerRot::YXZ,
        euler.y.to_radians(),
        euler.x.to_radians(),
        euler.z.to_radians(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_vector_normalises_to_zero() {
        assert_eq!(normalize_or_zero(Vec3::ZERO), Vec3::ZERO);
        let n = normalize_or_zero(Vec3::new(3.0, 0.0, 4.0));
        assert!((n.length() - 1.0).abs() < 1e-6);
    }

    #[test]
    fn quad_hit_reports_distance() {
        let ray = Ray::new(Vec3::new(0.0, 1.0, 5.0), Vec3::NEG_Z);
        let t = intersect_quad(&ray, Vec3::new(0.0, 1.0, 0.0), Quat::IDENTITY, Vec2::new(2.0, 2.0));
        assert!((t.unwrap() - 5.0).abs() < 1e-5);
    }

    #[test]
    fn quad_is_double_sided() {
        let ray = Ray::new(Vec3::new(0.0, 0.0, -3.0), Vec3::Z);
        let t = intersect_quad(&ray, Vec3::ZERO, Quat::IDENTITY, Vec2::ONE);
        assert!(t.is_some());
    }

    #[test]
    fn quad_miss_outside_footprint() {
        let ray = Ray::new(Vec3::new(2.0, 0.0, 5.0), Vec3::NEG_Z);
        assert!(intersect_quad(&ray, Vec3::ZERO, Quat::IDENTITY, Vec2::ONE).is_none());
    }

    #[test]
    fn quad_behind_origin_is_missed() {
        let ray = Ray::new(Vec3::new(0.0, 0.0, 5.0), Vec3::Z);
        assert!(intersect_quad(&ray, Vec3::ZERO, Quat::IDENTITY, Vec2::ONE).is_none());
    }

    #[test]
    fn rotated_quad_faces_the_x_axis() {
        let rotation = rotation_from_degrees(Vec3::new(0.0, 90.0, 0.0));
        let ray = Ray::new(Vec3::new(4.0, 0.0, 0.0), Vec3::NEG_X);
        let t = intersect_quad(&ray, Vec3::ZERO, rotation, Vec2::new(2.0, 1.0));
        assert!((t.unwrap() - 4.0).abs() < 1e-5);
    }

    #[test]
    fn centre_ndc_unprojects_along_view_direction() {
        let view = Mat4::look_to_rh(Vec3::new(0.0, 1.6, 0.0), Vec3::NEG_Z, Vec3::Y);
        let proj = Mat4::perspective_rh_gl(75f32.to_radians(), 1.5, 0.1, 100.0);
        let ray = Ray::from_ndc(Vec2::ZERO, (proj * view).inverse());
        assert!(ray.direction.abs_diff_eq(Vec3::NEG_Z, 1e-4));
        assert!((ray.origin.y - 1.6).abs() < 1e-4);
    }
}
