//! Mathematical types shared between the simulation and render threads.
//!
//! These are the canonical representations stored in the entity tables and
//! carried by render events.

use bytemuck::{Pod, Zeroable};
use serde::{Deserialize, Serialize};

/// Below this determinant a linear part is treated as non-invertible.
const DEGENERATE_DET: f32 = 1.0e-12;

/// 3D Vector - position, scale, direction
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable, Serialize, Deserialize)]
pub struct Vec3 {
    /// X component
    pub x: f32,
    /// Y component
    pub y: f32,
    /// Z component
    pub z: f32,
}

impl Vec3 {
    /// Creates a new Vec3
    #[must_use]
    pub const fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    /// Vector with all three components set to `v`
    #[must_use]
    pub const fn splat(v: f32) -> Self {
        Self::new(v, v, v)
    }

    /// Zero vector
    pub const ZERO: Self = Self::new(0.0, 0.0, 0.0);

    /// All ones (unit scale)
    pub const ONE: Self = Self::new(1.0, 1.0, 1.0);

    /// Unit X vector
    pub const X: Self = Self::new(1.0, 0.0, 0.0);

    /// Unit Y vector
    pub const Y: Self = Self::new(0.0, 1.0, 0.0);

    /// Unit Z vector
    pub const Z: Self = Self::new(0.0, 0.0, 1.0);

    /// Converts to array
    #[must_use]
    pub const fn to_array(self) -> [f32; 3] {
        [self.x, self.y, self.z]
    }

    /// Creates from array
    #[must_use]
    pub const fn from_array(arr: [f32; 3]) -> Self {
        Self::new(arr[0], arr[1], arr[2])
    }

    /// Dot product
    #[must_use]
    pub fn dot(self, other: Self) -> f32 {
        self.x * other.x + self.y * other.y + self.z * other.z
    }

    /// Cross product
    #[must_use]
    pub fn cross(self, other: Self) -> Self {
        Self::new(
            self.y * other.z - self.z * other.y,
            self.z * other.x - self.x * other.z,
            self.x * other.y - self.y * other.x,
        )
    }

    /// Length squared (avoids sqrt)
    #[must_use]
    pub fn length_squared(self) -> f32 {
        self.dot(self)
    }

    /// Length
    #[must_use]
    pub fn length(self) -> f32 {
        self.length_squared().sqrt()
    }

    /// Distance to another point
    #[must_use]
    pub fn distance(self, other: Self) -> f32 {
        (self - other).length()
    }

    /// Distance squared (avoids sqrt)
    #[must_use]
    pub fn distance_squared(self, other: Self) -> f32 {
        (self - other).length_squared()
    }

    /// Unit-length copy, or zero if the vector has no length.
    #[must_use]
    pub fn normalize_or_zero(self) -> Self {
        let len = self.length();
        if len > 0.0 {
            self * (1.0 / len)
        } else {
            Self::ZERO
        }
    }

    /// Component-wise product.
    #[must_use]
    pub fn mul_elem(self, other: Self) -> Self {
        Self::new(self.x * other.x, self.y * other.y, self.z * other.z)
    }

    /// Component-wise quotient.
    ///
    /// Components of `other` that are zero yield zero rather than infinity.
    #[must_use]
    pub fn div_elem(self, other: Self) -> Self {
        fn div(a: f32, b: f32) -> f32 {
            if b == 0.0 {
                0.0
            } else {
                a / b
            }
        }
        Self::new(div(self.x, other.x), div(self.y, other.y), div(self.z, other.z))
    }

    /// Linear interpolation: `self` at `t = 0`, `other` at `t = 1`.
    #[must_use]
    pub fn lerp(self, other: Self, t: f32) -> Self {
        self + (other - self) * t
    }

    /// True if every component differs by at most `epsilon`.
    #[must_use]
    pub fn abs_diff_eq(self, other: Self, epsilon: f32) -> bool {
        (self.x - other.x).abs() <= epsilon
            && (self.y - other.y).abs() <= epsilon
            && (self.z - other.z).abs() <= epsilon
    }
}

impl std::ops::Add for Vec3 {
    type Output = Self;
    fn add(self, rhs: Self) -> Self {
        Self::new(self.x + rhs.x, self.y + rhs.y, self.z + rhs.z)
    }
}

impl std::ops::Sub for Vec3 {
    type Output = Self;
    fn sub(self, rhs: Self) -> Self {
        Self::new(self.x - rhs.x, self.y - rhs.y, self.z - rhs.z)
    }
}

impl std::ops::Mul<f32> for Vec3 {
    type Output = Self;
    fn mul(self, rhs: f32) -> Self {
        Self::new(self.x * rhs, self.y * rhs, self.z * rhs)
    }
}

impl std::ops::Neg for Vec3 {
    type Output = Self;
    fn neg(self) -> Self {
        Self::new(-self.x, -self.y, -self.z)
    }
}

/// Quaternion for rotations (x, y, z vector part, w scalar part)
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable, Serialize, Deserialize)]
pub struct Quat {
    /// X component
    pub x: f32,
    /// Y component
    pub y: f32,
    /// Z component
    pub z: f32,
    /// W component
    pub w: f32,
}

impl Quat {
    /// Creates a new quaternion
    #[must_use]
    pub const fn new(x: f32, y: f32, z: f32, w: f32) -> Self {
        Self { x, y, z, w }
    }

    /// Identity rotation
    pub const IDENTITY: Self = Self::new(0.0, 0.0, 0.0, 1.0);

    /// Rotation of `angle` radians around `axis` (need not be normalized).
    #[must_use]
    pub fn from_axis_angle(axis: Vec3, angle: f32) -> Self {
        let axis = axis.normalize_or_zero();
        let (s, c) = (angle * 0.5).sin_cos();
        Self::new(axis.x * s, axis.y * s, axis.z * s, c)
    }

    /// Builds a rotation from three orthonormal basis columns.
    #[must_use]
    pub fn from_rotation_axes(x_axis: Vec3, y_axis: Vec3, z_axis: Vec3) -> Self {
        let (r00, r10, r20) = (x_axis.x, x_axis.y, x_axis.z);
        let (r01, r11, r21) = (y_axis.x, y_axis.y, y_axis.z);
        let (r02, r12, r22) = (z_axis.x, z_axis.y, z_axis.z);
        let trace = r00 + r11 + r22;

        let q = if trace > 0.0 {
            let s = (trace + 1.0).sqrt() * 2.0;
            Self::new((r21 - r12) / s, (r02 - r20) / s, (r10 - r01) / s, 0.25 * s)
        } else if r00 > r11 && r00 > r22 {
            let s = (1.0 + r00 - r11 - r22).sqrt() * 2.0;
            Self::new(0.25 * s, (r01 + r10) / s, (r02 + r20) / s, (r21 - r12) / s)
        } else if r11 > r22 {
            let s = (1.0 + r11 - r00 - r22).sqrt() * 2.0;
            Self::new((r01 + r10) / s, 0.25 * s, (r12 + r21) / s, (r02 - r20) / s)
        } else {
            let s = (1.0 + r22 - r00 - r11).sqrt() * 2.0;
            Self::new((r02 + r20) / s, (r12 + r21) / s, 0.25 * s, (r10 - r01) / s)
        };
        q.normalize()
    }

    /// Converts to array `[x, y, z, w]`
    #[must_use]
    pub const fn to_array(self) -> [f32; 4] {
        [self.x, self.y, self.z, self.w]
    }

    /// 4D dot product
    #[must_use]
    pub fn dot(self, other: Self) -> f32 {
        self.x * other.x + self.y * other.y + self.z * other.z + self.w * other.w
    }

    /// Length squared
    #[must_use]
    pub fn length_squared(self) -> f32 {
        self.dot(self)
    }

    /// Unit-length copy. A zero quaternion normalizes to identity.
    #[must_use]
    pub fn normalize(self) -> Self {
        let len = self.length_squared().sqrt();
        if len > 0.0 {
            let inv = 1.0 / len;
            Self::new(self.x * inv, self.y * inv, self.z * inv, self.w * inv)
        } else {
            Self::IDENTITY
        }
    }

    /// Conjugate (the inverse of a unit quaternion)
    #[must_use]
    pub fn conjugate(self) -> Self {
        Self::new(-self.x, -self.y, -self.z, self.w)
    }

    /// Inverse rotation.
    #[must_use]
    pub fn inverse(self) -> Self {
        let len_sq = self.length_squared();
        if len_sq > 0.0 {
            let c = self.conjugate();
            let inv = 1.0 / len_sq;
            Self::new(c.x * inv, c.y * inv, c.z * inv, c.w * inv)
        } else {
            Self::IDENTITY
        }
    }

    /// Rotates a vector.
    #[must_use]
    pub fn rotate(self, v: Vec3) -> Vec3 {
        let u = Vec3::new(self.x, self.y, self.z);
        let t = u.cross(v) * 2.0;
        v + t * self.w + u.cross(t)
    }

    /// Spherical interpolation along the shortest arc.
    #[must_use]
    pub fn slerp(self, other: Self, t: f32) -> Self {
        let mut end = other;
        let mut cos = self.dot(other);
        if cos < 0.0 {
            end = Self::new(-end.x, -end.y, -end.z, -end.w);
            cos = -cos;
        }

        // Nearly parallel: fall back to normalized lerp
        if cos > 0.9995 {
            return Self::new(
                self.x + (end.x - self.x) * t,
                self.y + (end.y - self.y) * t,
                self.z + (end.z - self.z) * t,
                self.w + (end.w - self.w) * t,
            )
            .normalize();
        }

        let theta = cos.acos();
        let sin = theta.sin();
        let wa = ((1.0 - t) * theta).sin() / sin;
        let wb = (t * theta).sin() / sin;
        Self::new(
            self.x * wa + end.x * wb,
            self.y * wa + end.y * wb,
            self.z * wa + end.z * wb,
            self.w * wa + end.w * wb,
        )
    }

    /// True if both quaternions describe the same rotation within `epsilon`.
    ///
    /// `q` and `-q` are treated as equal.
    #[must_use]
    pub fn abs_diff_eq(self, other: Self, epsilon: f32) -> bool {
        let close = |a: Self, b: Self| {
            (a.x - b.x).abs() <= epsilon
                && (a.y - b.y).abs() <= epsilon
                && (a.z - b.z).abs() <= epsilon
                && (a.w - b.w).abs() <= epsilon
        };
        close(self, other) || close(self, Self::new(-other.x, -other.y, -other.z, -other.w))
    }
}

impl Default for Quat {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl std::ops::Mul for Quat {
    type Output = Self;

    /// Hamilton product: `self * rhs` applies `rhs` first.
    fn mul(self, rhs: Self) -> Self {
        Self::new(
            self.w * rhs.x + self.x * rhs.w + self.y * rhs.z - self.z * rhs.y,
            self.w * rhs.y - self.x * rhs.z + self.y * rhs.w + self.z * rhs.x,
            self.w * rhs.z + self.x * rhs.y - self.y * rhs.x + self.z * rhs.w,
            self.w * rhs.w - self.x * rhs.x - self.y * rhs.y - self.z * rhs.z,
        )
    }
}

/// 4x3 affine matrix: a 3x3 linear part (three basis columns) plus a translation column.
///
/// Column-major, 12 floats. This is the matrix layout carried in render events.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable, Serialize, Deserialize)]
pub struct Affine {
    /// First basis column
    pub x_axis: Vec3,
    /// Second basis column
    pub y_axis: Vec3,
    /// Third basis column
    pub z_axis: Vec3,
    /// Translation column
    pub translation: Vec3,
}

impl Affine {
    /// Identity transform
    pub const IDENTITY: Self = Self {
        x_axis: Vec3::X,
        y_axis: Vec3::Y,
        z_axis: Vec3::Z,
        translation: Vec3::ZERO,
    };

    /// Builds `T * R * S`.
    #[must_use]
    pub fn from_scale_rotation_translation(scale: Vec3, rotation: Quat, translation: Vec3) -> Self {
        Self {
            x_axis: rotation.rotate(Vec3::X) * scale.x,
            y_axis: rotation.rotate(Vec3::Y) * scale.y,
            z_axis: rotation.rotate(Vec3::Z) * scale.z,
            translation,
        }
    }

    /// Applies only the linear part.
    #[must_use]
    pub fn transform_vector(&self, v: Vec3) -> Vec3 {
        self.x_axis * v.x + self.y_axis * v.y + self.z_axis * v.z
    }

    /// Applies the full transform to a point.
    #[must_use]
    pub fn transform_point(&self, p: Vec3) -> Vec3 {
        self.transform_vector(p) + self.translation
    }

    /// Determinant of the linear part.
    #[must_use]
    pub fn determinant(&self) -> f32 {
        self.x_axis.dot(self.y_axis.cross(self.z_axis))
    }

    /// Inverse transform, or `None` when the linear part is singular.
    #[must_use]
    pub fn try_inverse(&self) -> Option<Self> {
        let det = self.determinant();
        if det.abs() < DEGENERATE_DET {
            return None;
        }
        let inv_det = 1.0 / det;
        let r0 = self.y_axis.cross(self.z_axis) * inv_det;
        let r1 = self.z_axis.cross(self.x_axis) * inv_det;
        let r2 = self.x_axis.cross(self.y_axis) * inv_det;

        let linear = Self {
            x_axis: Vec3::new(r0.x, r1.x, r2.x),
            y_axis: Vec3::new(r0.y, r1.y, r2.y),
            z_axis: Vec3::new(r0.z, r1.z, r2.z),
            translation: Vec3::ZERO,
        };
        Some(Self {
            translation: -linear.transform_vector(self.translation),
            ..linear
        })
    }

    /// Per-axis scale. A mirrored basis reports a negative X scale.
    #[must_use]
    pub fn scale(&self) -> Vec3 {
        let sign = if self.determinant() < 0.0 { -1.0 } else { 1.0 };
        Vec3::new(
            self.x_axis.length() * sign,
            self.y_axis.length(),
            self.z_axis.length(),
        )
    }

    /// Rotation of the orthonormalized basis.
    #[must_use]
    pub fn rotation(&self) -> Quat {
        let scale = self.scale();
        let inv = |axis: Vec3, s: f32| if s == 0.0 { axis } else { axis * (1.0 / s) };
        Quat::from_rotation_axes(
            inv(self.x_axis, scale.x),
            inv(self.y_axis, scale.y),
            inv(self.z_axis, scale.z),
        )
    }

    /// Flat column-major array.
    #[must_use]
    pub fn to_cols_array(&self) -> [f32; 12] {
        bytemuck::cast(*self)
    }

    /// True if every element differs by at most `epsilon`.
    #[must_use]
    pub fn abs_diff_eq(&self, other: &Self, epsilon: f32) -> bool {
        self.x_axis.abs_diff_eq(other.x_axis, epsilon)
            && self.y_axis.abs_diff_eq(other.y_axis, epsilon)
            && self.z_axis.abs_diff_eq(other.z_axis, epsilon)
            && self.translation.abs_diff_eq(other.translation, epsilon)
    }
}

impl Default for Affine {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl std::ops::Mul for Affine {
    type Output = Self;

    /// Composition: `self * rhs` applies `rhs` first.
    fn mul(self, rhs: Self) -> Self {
        Self {
            x_axis: self.transform_vector(rhs.x_axis),
            y_axis: self.transform_vector(rhs.y_axis),
            z_axis: self.transform_vector(rhs.z_axis),
            translation: self.transform_point(rhs.translation),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPS: f32 = 1.0e-5;

    #[test]
    fn test_vec3_operations() {
        let a = Vec3::new(1.0, 2.0, 3.0);
        let b = Vec3::new(4.0, 5.0, 6.0);

        let sum = a + b;
        assert_eq!(sum.x, 5.0);
        assert_eq!(sum.y, 7.0);
        assert_eq!(sum.z, 9.0);

        let dot = a.dot(b);
        assert_eq!(dot, 32.0); // 1*4 + 2*5 + 3*6

        assert_eq!(Vec3::X.cross(Vec3::Y), Vec3::Z);
        assert_eq!(a.lerp(b, 0.5), Vec3::new(2.5, 3.5, 4.5));
    }

    #[test]
    fn test_vec3_bytemuck() {
        let v = Vec3::new(1.0, 2.0, 3.0);
        let bytes: &[u8] = bytemuck::bytes_of(&v);
        assert_eq!(bytes.len(), 12); // 3 * 4 bytes
        assert_eq!(std::mem::size_of::<Affine>(), 48);
    }

    #[test]
    fn test_quat_rotate_quarter_turn() {
        let q = Quat::from_axis_angle(Vec3::Z, std::f32::consts::FRAC_PI_2);
        assert!(q.rotate(Vec3::X).abs_diff_eq(Vec3::Y, EPS));
        assert!(q.inverse().rotate(Vec3::Y).abs_diff_eq(Vec3::X, EPS));
    }

    #[test]
    fn test_quat_product_composes() {
        let a = Quat::from_axis_angle(Vec3::Z, 0.4);
        let b = Quat::from_axis_angle(Vec3::Z, 0.6);
        assert!((a * b).abs_diff_eq(Quat::from_axis_angle(Vec3::Z, 1.0), EPS));
    }

    #[test]
    fn test_slerp_midpoint() {
        let a = Quat::IDENTITY;
        let b = Quat::from_axis_angle(Vec3::Y, 1.0);
        let mid = a.slerp(b, 0.5);
        assert!(mid.abs_diff_eq(Quat::from_axis_angle(Vec3::Y, 0.5), EPS));
        assert!(a.slerp(b, 0.0).abs_diff_eq(a, EPS));
        assert!(a.slerp(b, 1.0).abs_diff_eq(b, EPS));
    }

    #[test]
    fn test_affine_inverse_roundtrip() {
        let m = Affine::from_scale_rotation_translation(
            Vec3::new(2.0, 3.0, 0.5),
            Quat::from_axis_angle(Vec3::new(1.0, 1.0, 0.0), 0.7),
            Vec3::new(4.0, -2.0, 9.0),
        );
        let inv = m.try_inverse().unwrap();
        let p = Vec3::new(0.3, -7.0, 2.0);
        assert!(inv.transform_point(m.transform_point(p)).abs_diff_eq(p, 1.0e-4));
        assert!((m * inv).abs_diff_eq(&Affine::IDENTITY, 1.0e-4));
    }

    #[test]
    fn test_affine_singular_has_no_inverse() {
        let m = Affine::from_scale_rotation_translation(Vec3::new(0.0, 1.0, 1.0), Quat::IDENTITY, Vec3::ZERO);
        assert!(m.try_inverse().is_none());
    }

    #[test]
    fn test_affine_decompose() {
        let rotation = Quat::from_axis_angle(Vec3::X, 1.2);
        let scale = Vec3::new(2.0, 2.0, 4.0);
        let m = Affine::from_scale_rotation_translation(scale, rotation, Vec3::ONE);
        assert!(m.scale().abs_diff_eq(scale, 1.0e-4));
        assert!(m.rotation().abs_diff_eq(rotation, 1.0e-4));
    }

    #[test]
    fn test_affine_cols_array() {
        let m = Affine::from_scale_rotation_translation(Vec3::ONE, Quat::IDENTITY, Vec3::new(1.0, 2.0, 3.0));
        let cols = m.to_cols_array();
        assert_eq!(&cols[9..], &[1.0, 2.0, 3.0]);
        assert_eq!(cols[0], 1.0);
    }
}
