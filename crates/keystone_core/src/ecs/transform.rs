//! # Transforms
//!
//! Local transforms are authored relative to the parent. Absolute transforms
//! are derived, cached per entity and only valid while the entity's dirty bit
//! is clear.

use keystone_shared::{Affine, Quat, Vec3};

/// Position, rotation and scale relative to the parent.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LocalTransform {
    /// Translation.
    pub position: Vec3,
    /// Rotation.
    pub rotation: Quat,
    /// Per-axis scale.
    pub scale: Vec3,
}

impl LocalTransform {
    /// Zero position, identity rotation, unit scale.
    pub const IDENTITY: Self = Self {
        position: Vec3::ZERO,
        rotation: Quat::IDENTITY,
        scale: Vec3::ONE,
    };

    /// Creates a transform from its parts.
    #[must_use]
    pub const fn new(position: Vec3, rotation: Quat, scale: Vec3) -> Self {
        Self {
            position,
            rotation,
            scale,
        }
    }

    /// Pure translation.
    #[must_use]
    pub const fn from_position(position: Vec3) -> Self {
        Self {
            position,
            ..Self::IDENTITY
        }
    }

    /// The local `T * R * S` matrix.
    #[must_use]
    pub fn to_matrix(&self) -> Affine {
        Affine::from_scale_rotation_translation(self.scale, self.rotation, self.position)
    }
}

impl Default for LocalTransform {
    fn default() -> Self {
        Self::IDENTITY
    }
}

/// Cached world-space transform.
///
/// Rotation and scale are accumulated alongside the matrix instead of being
/// decomposed from it, so they stay exact under non-uniform parent scale.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct AbsTransform {
    /// World matrix.
    pub matrix: Affine,
    /// Accumulated world rotation.
    pub rotation: Quat,
    /// Accumulated world scale.
    pub scale: Vec3,
}

impl AbsTransform {
    /// The world origin.
    pub const IDENTITY: Self = Self {
        matrix: Affine::IDENTITY,
        rotation: Quat::IDENTITY,
        scale: Vec3::ONE,
    };

    /// Absolute transform of a root entity.
    #[must_use]
    pub fn from_local(local: &LocalTransform) -> Self {
        Self {
            matrix: local.to_matrix(),
            rotation: local.rotation,
            scale: local.scale,
        }
    }

    /// Absolute transform of a child given its parent's absolute transform.
    #[must_use]
    pub fn compose(parent: &Self, local: &LocalTransform) -> Self {
        Self {
            matrix: parent.matrix * local.to_matrix(),
            rotation: (parent.rotation * local.rotation).normalize(),
            scale: parent.scale.mul_elem(local.scale),
        }
    }

    /// World position.
    #[inline]
    #[must_use]
    pub const fn position(&self) -> Vec3 {
        self.matrix.translation
    }

    /// Interpolates between two poses.
    ///
    /// Position and scale are lerped, rotation is slerped, and the matrix is
    /// rebuilt from the blended parts. `alpha` is clamped to `[0, 1]`.
    #[must_use]
    pub fn blend(previous: &Self, current: &Self, alpha: f32) -> Self {
        let alpha = alpha.clamp(0.0, 1.0);
        let position = previous.position().lerp(current.position(), alpha);
        let rotation = previous.rotation.slerp(current.rotation, alpha);
        let scale = previous.scale.lerp(current.scale, alpha);
        Self {
            matrix: Affine::from_scale_rotation_translation(scale, rotation, position),
            rotation,
            scale,
        }
    }
}

impl Default for AbsTransform {
    fn default() -> Self {
        Self::IDENTITY
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPS: f32 = 1.0e-5;

    #[test]
    fn test_local_default_is_unit_scale() {
        let local = LocalTransform::default();
        assert_eq!(local.scale, Vec3::ONE);
        assert_eq!(local.rotation, Quat::IDENTITY);
        assert!(local.to_matrix().abs_diff_eq(&Affine::IDENTITY, EPS));
    }

    #[test]
    fn test_compose_translates_child() {
        let parent = AbsTransform::from_local(&LocalTransform::from_position(Vec3::new(5.0, 0.0, 0.0)));
        let child = AbsTransform::compose(&parent, &LocalTransform::from_position(Vec3::X));
        assert!(child.position().abs_diff_eq(Vec3::new(6.0, 0.0, 0.0), EPS));
    }

    #[test]
    fn test_compose_rotated_scaled_parent() {
        let parent = AbsTransform::from_local(&LocalTransform::new(
            Vec3::ZERO,
            Quat::from_axis_angle(Vec3::Z, std::f32::consts::FRAC_PI_2),
            Vec3::splat(2.0),
        ));
        let child = AbsTransform::compose(&parent, &LocalTransform::from_position(Vec3::X));

        assert!(child.position().abs_diff_eq(Vec3::new(0.0, 2.0, 0.0), EPS));
        assert!(child.scale.abs_diff_eq(Vec3::splat(2.0), EPS));
        assert!(child.rotation.abs_diff_eq(parent.rotation, EPS));
    }

    #[test]
    fn test_blend_endpoints() {
        let a = AbsTransform::IDENTITY;
        let b = AbsTransform::from_local(&LocalTransform::new(
            Vec3::new(10.0, 0.0, 0.0),
            Quat::from_axis_angle(Vec3::Y, 1.0),
            Vec3::splat(3.0),
        ));

        let start = AbsTransform::blend(&a, &b, 0.0);
        let end = AbsTransform::blend(&a, &b, 1.0);
        let mid = AbsTransform::blend(&a, &b, 0.5);

        assert!(start.matrix.abs_diff_eq(&a.matrix, EPS));
        assert!(end.matrix.abs_diff_eq(&b.matrix, 1.0e-4));
        assert!(mid.position().abs_diff_eq(Vec3::new(5.0, 0.0, 0.0), EPS));
        assert!(mid.scale.abs_diff_eq(Vec3::splat(2.0), EPS));
        assert!(mid.rotation.abs_diff_eq(Quat::from_axis_angle(Vec3::Y, 0.5), 1.0e-4));
    }

    #[test]
    fn test_blend_clamps_alpha() {
        let a = AbsTransform::IDENTITY;
        let b = AbsTransform::from_local(&LocalTransform::from_position(Vec3::X));
        assert_eq!(AbsTransform::blend(&a, &b, 7.0).position(), Vec3::X);
        assert_eq!(AbsTransform::blend(&a, &b, -1.0).position(), Vec3::ZERO);
    }
}
